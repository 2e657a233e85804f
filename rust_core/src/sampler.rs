use crate::error::Result;
use crate::hmc::{self, ChainResult, HmcConfig, LogDensity};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Configuration for the multi-chain sampler.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub num_chains: usize,
    pub num_draws: usize,
    pub num_warmup: usize,
    /// 0.0 searches for a reasonable initial step size per chain.
    pub step_size: f64,
    pub num_leapfrog_steps: usize,
    pub target_accept: f64,
    pub seed: u64,
    /// Number of threads. 0 means use Rayon's default (all cores).
    pub num_threads: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_chains: 4,
            num_draws: 1000,
            num_warmup: 500,
            step_size: 0.0,
            num_leapfrog_steps: 15,
            target_accept: 0.65,
            seed: 42,
            num_threads: 0,
        }
    }
}

/// Result of sampling across all chains.
#[derive(Debug, Clone)]
pub struct SampleResult {
    /// samples[chain][draw][param]
    pub samples: Vec<Vec<Vec<f64>>>,
    pub accept_rates: Vec<f64>,
    pub step_sizes: Vec<f64>,
    pub num_divergent: Vec<usize>,
    pub param_names: Vec<String>,
}

impl SampleResult {
    /// Pooled per-parameter mean and population variance over every chain,
    /// accumulated in one pass (Welford).
    fn moments(&self) -> (Vec<f64>, Vec<f64>) {
        let dim = self.param_names.len();
        let (mut mean, mut m2) = (vec![0.0; dim], vec![0.0; dim]);
        for (n, draw) in self.samples.iter().flatten().enumerate() {
            let k = (n + 1) as f64;
            for (j, &x) in draw.iter().enumerate().take(dim) {
                let delta = x - mean[j];
                mean[j] += delta / k;
                m2[j] += delta * (x - mean[j]);
            }
        }
        let count = self.samples.iter().map(Vec::len).sum::<usize>() as f64;
        let variance = m2.into_iter().map(|s| s / count).collect();
        (mean, variance)
    }

    /// Posterior mean of each parameter, pooled across chains.
    pub fn mean(&self) -> Vec<f64> {
        self.moments().0
    }

    /// Posterior standard deviation of each parameter, pooled across chains.
    pub fn std(&self) -> Vec<f64> {
        self.moments().1.into_iter().map(f64::sqrt).collect()
    }
}

/// Run parallel HMC chains against one shared model.
///
/// Each chain records onto its own tape on its worker thread and gets a
/// deterministic RNG seeded from `config.seed + chain_index`, so results
/// do not depend on thread scheduling. The first chain to fail at its
/// initial point aborts the run.
pub fn sample<M: LogDensity + Sync + ?Sized>(
    model: &M,
    config: &SamplerConfig,
) -> Result<SampleResult> {
    if config.num_threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build_global()
            .ok();
    }

    let hmc_config = HmcConfig {
        step_size: config.step_size,
        num_leapfrog_steps: config.num_leapfrog_steps,
        num_draws: config.num_draws,
        num_warmup: config.num_warmup,
        target_accept: config.target_accept,
    };

    let chain_indices: Vec<usize> = (0..config.num_chains).collect();

    let results: Vec<ChainResult> = chain_indices
        .par_iter()
        .map(|&chain_idx| -> Result<ChainResult> {
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed + chain_idx as u64);
            let result = hmc::run_chain(model, &hmc_config, &mut rng, None)?;
            log::debug!(
                "chain {chain_idx} finished: accept rate {:.3}, step size {:.4}, {} divergent",
                result.accept_rate,
                result.step_size,
                result.num_divergent
            );
            Ok(result)
        })
        .collect::<Result<_>>()?;

    Ok(SampleResult {
        accept_rates: results.iter().map(|r| r.accept_rate).collect(),
        step_sizes: results.iter().map(|r| r.step_size).collect(),
        num_divergent: results.iter().map(|r| r.num_divergent).collect(),
        samples: results.into_iter().map(|r| r.samples).collect(),
        param_names: model.param_names(),
    })
}
