use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use revgrad_core::{
    log_density_gradient, normal_log, normal_rng, sample, Density, LogDensity, Result, SamplerConfig,
    Tape, Value, Var,
};

/// y ~ Normal(mu, exp(log_sigma)) with weak normal priors on both
/// parameters.
struct NormalModel {
    data: Vec<f64>,
}

impl LogDensity for NormalModel {
    fn dim(&self) -> usize {
        2
    }

    fn log_density<'t>(&self, theta: &[Var<'t>]) -> Result<Value<'t>> {
        let mu = theta[0];
        let sigma = theta[1].exp();
        let prior = normal_log(theta, &0.0, &10.0, Density::Proportional)?;
        let likelihood = normal_log(&self.data[..], &mu, &sigma, Density::Proportional)?;
        Ok(prior + likelihood)
    }

    fn param_names(&self) -> Vec<String> {
        vec!["mu".to_string(), "log_sigma".to_string()]
    }
}

fn simulated(n: usize, mu: f64, sigma: f64, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| normal_rng(mu, sigma, &mut rng).unwrap())
        .collect()
}

#[test]
fn gradient_of_composite_model_matches_finite_differences() {
    let model = NormalModel {
        data: simulated(20, 1.0, 2.0, 9),
    };
    let mut tape = Tape::new();
    let q = [0.4, 0.3];
    let (logp, grad) = log_density_gradient(&model, &mut tape, &q).unwrap();

    let eps = 1e-6;
    for i in 0..2 {
        let mut plus = q;
        let mut minus = q;
        plus[i] += eps;
        minus[i] -= eps;
        let (lp, _) = log_density_gradient(&model, &mut tape, &plus).unwrap();
        let (lm, _) = log_density_gradient(&model, &mut tape, &minus).unwrap();
        let numerical = (lp - lm) / (2.0 * eps);
        assert!(
            (grad[i] - numerical).abs() < 1e-4,
            "analytic={}, numerical={}",
            grad[i],
            numerical
        );
    }
    assert!(logp.is_finite());
}

#[test]
fn sampler_recovers_location_and_scale() {
    let model = NormalModel {
        data: simulated(200, 1.0, 2.0, 17),
    };
    let config = SamplerConfig {
        num_chains: 2,
        num_draws: 600,
        num_warmup: 300,
        num_leapfrog_steps: 10,
        seed: 2024,
        ..SamplerConfig::default()
    };
    let result = sample(&model, &config).unwrap();
    assert_eq!(result.param_names, vec!["mu", "log_sigma"]);
    assert_eq!(result.samples.len(), 2);
    assert_eq!(result.samples[0].len(), 600);

    let mean = result.mean();
    assert!((mean[0] - 1.0).abs() < 0.5, "mu = {}", mean[0]);
    assert!((mean[1].exp() - 2.0).abs() < 0.4, "sigma = {}", mean[1].exp());
    for rate in &result.accept_rates {
        assert!(*rate > 0.2, "accept rate {rate}");
    }
}
