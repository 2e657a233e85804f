use crate::error::Result;
use crate::scalar::Value;
use crate::tape::{Tape, Var};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// A differentiable log density over unconstrained real parameters.
pub trait LogDensity {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Log density at `theta`, built from operations on the handles so the
    /// tape records it.
    fn log_density<'t>(&self, theta: &[Var<'t>]) -> Result<Value<'t>>;

    fn param_names(&self) -> Vec<String> {
        (0..self.dim()).map(|i| format!("theta[{i}]")).collect()
    }
}

/// Evaluate `model` at `q` on a freshly reset `tape` and return the log
/// density with its gradient.
///
/// A model that ignores its parameters yields a zero gradient.
pub fn log_density_gradient<M: LogDensity + ?Sized>(
    model: &M,
    tape: &mut Tape,
    q: &[f64],
) -> Result<(f64, Vec<f64>)> {
    tape.reset();
    let theta: Vec<Var<'_>> = q.iter().map(|&x| tape.var(x)).collect();
    let logp = model.log_density(&theta)?;
    let grad = match logp.as_var() {
        Some(out) => {
            tape.seed_gradient(out, 1.0);
            tape.run_backward_pass(0);
            theta.iter().map(|v| v.adjoint()).collect()
        }
        None => vec![0.0; q.len()],
    };
    Ok((logp.value(), grad))
}

/// Configuration for the HMC sampler.
#[derive(Debug, Clone)]
pub struct HmcConfig {
    /// Leapfrog step size. 0.0 searches for a reasonable one at the start
    /// of the chain.
    pub step_size: f64,
    pub num_leapfrog_steps: usize,
    pub num_draws: usize,
    pub num_warmup: usize,
    /// Mean acceptance probability targeted by warmup adaptation.
    pub target_accept: f64,
}

impl Default for HmcConfig {
    fn default() -> Self {
        Self {
            step_size: 0.0,
            num_leapfrog_steps: 20,
            num_draws: 1000,
            num_warmup: 500,
            target_accept: 0.65,
        }
    }
}

/// Result of a single HMC chain run.
#[derive(Debug, Clone)]
pub struct ChainResult {
    pub samples: Vec<Vec<f64>>,
    pub accept_rate: f64,
    /// Step size used after warmup.
    pub step_size: f64,
    /// Post-warmup transitions whose energy error exceeded the divergence
    /// threshold or whose trajectory hit a domain error.
    pub num_divergent: usize,
}

/// Energy error above which a transition counts as divergent.
const MAX_ENERGY_ERROR: f64 = 1000.0;

#[derive(Debug, Clone)]
struct State {
    q: Vec<f64>,
    logp: f64,
    grad: Vec<f64>,
}

fn hamiltonian(logp: f64, p: &[f64]) -> f64 {
    let kinetic: f64 = p.iter().map(|pi| 0.5 * pi * pi).sum();
    -logp + kinetic
}

fn leapfrog<M: LogDensity + ?Sized>(
    model: &M,
    tape: &mut Tape,
    start: &State,
    momentum: &[f64],
    step_size: f64,
    num_steps: usize,
) -> Result<(State, Vec<f64>)> {
    let mut q = start.q.clone();
    let mut p = momentum.to_vec();
    let mut logp = start.logp;
    let mut grad = start.grad.clone();

    for _ in 0..num_steps {
        for (pi, gi) in p.iter_mut().zip(&grad) {
            *pi += 0.5 * step_size * gi;
        }
        for (qi, pi) in q.iter_mut().zip(&p) {
            *qi += step_size * pi;
        }
        (logp, grad) = log_density_gradient(model, tape, &q)?;
        for (pi, gi) in p.iter_mut().zip(&grad) {
            *pi += 0.5 * step_size * gi;
        }
    }

    Ok((State { q, logp, grad }, p))
}

/// Double or halve a unit step size until one leapfrog step crosses an
/// acceptance probability of 0.5.
fn find_initial_step_size<M: LogDensity + ?Sized>(
    model: &M,
    tape: &mut Tape,
    start: &State,
    rng: &mut ChaCha8Rng,
) -> f64 {
    let p0: Vec<f64> = (0..start.q.len())
        .map(|_| StandardNormal.sample(rng))
        .collect();
    let h0 = hamiltonian(start.logp, &p0);
    let log_ratio = |tape: &mut Tape, eps: f64| match leapfrog(model, tape, start, &p0, eps, 1) {
        Ok((state, p)) => h0 - hamiltonian(state.logp, &p),
        Err(_) => f64::NAN,
    };

    let threshold = 0.5_f64.ln();
    let mut eps = 1.0;
    let direction = if log_ratio(&mut *tape, eps) > threshold {
        1.0
    } else {
        -1.0
    };

    for _ in 0..50 {
        let lr = log_ratio(&mut *tape, eps);
        if !lr.is_finite() {
            eps *= 0.5;
            break;
        }
        if direction > 0.0 && lr < threshold {
            break;
        }
        if direction < 0.0 && lr > threshold {
            break;
        }
        eps *= 2.0_f64.powf(direction);
    }

    eps.clamp(1e-10, 1e3)
}

/// Nesterov dual averaging of the log step size toward a target
/// acceptance probability.
#[derive(Debug, Clone)]
struct StepSizeAdaptation {
    /// Shrinkage point, log(10·ε₀).
    shrink_to: f64,
    target_accept: f64,
    mean_error: f64,
    log_averaged: f64,
    count: f64,
}

impl StepSizeAdaptation {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    fn new(initial: f64, target_accept: f64) -> Self {
        Self {
            shrink_to: (10.0 * initial).ln(),
            target_accept,
            mean_error: 0.0,
            log_averaged: initial.ln(),
            count: 0.0,
        }
    }

    /// Fold in one acceptance probability and return the next step size.
    fn observe(&mut self, accept_prob: f64) -> f64 {
        self.count += 1.0;
        let m = self.count;
        let w = 1.0 / (m + Self::T0);
        self.mean_error += w * (self.target_accept - accept_prob - self.mean_error);
        let log_step = self.shrink_to - m.sqrt() / Self::GAMMA * self.mean_error;
        let decay = m.powf(-Self::KAPPA);
        self.log_averaged += decay * (log_step - self.log_averaged);
        log_step.exp()
    }

    /// Step size to keep once warmup ends.
    fn adapted(&self) -> f64 {
        self.log_averaged.exp()
    }
}

/// Run a single HMC chain.
///
/// The chain owns its own tape, so several chains can run on separate
/// threads against one shared model. A domain error at the initial point
/// is returned; a domain error along a trajectory rejects that proposal.
pub fn run_chain<M: LogDensity + ?Sized>(
    model: &M,
    config: &HmcConfig,
    rng: &mut ChaCha8Rng,
    init: Option<Vec<f64>>,
) -> Result<ChainResult> {
    let dim = model.dim();
    let mut tape = Tape::new();
    let q0 = init.unwrap_or_else(|| vec![0.0; dim]);
    let (logp0, grad0) = log_density_gradient(model, &mut tape, &q0)?;
    let mut current = State {
        q: q0,
        logp: logp0,
        grad: grad0,
    };

    let total_iters = config.num_warmup + config.num_draws;
    let mut samples = Vec::with_capacity(config.num_draws);
    let mut accepted = 0u64;
    let mut total = 0u64;
    let mut num_divergent = 0usize;

    let mut step_size = if config.step_size > 0.0 {
        config.step_size
    } else {
        find_initial_step_size(model, &mut tape, &current, rng)
    };

    let mut adaptation = StepSizeAdaptation::new(step_size, config.target_accept);

    for iter in 0..total_iters {
        let is_warmup = iter < config.num_warmup;

        let p: Vec<f64> = (0..dim).map(|_| StandardNormal.sample(rng)).collect();
        let h_current = hamiltonian(current.logp, &p);

        let (log_accept_ratio, proposal) = match leapfrog(
            model,
            &mut tape,
            &current,
            &p,
            step_size,
            config.num_leapfrog_steps,
        ) {
            Ok((proposal, p_prop)) => {
                let h_proposal = hamiltonian(proposal.logp, &p_prop);
                (h_current - h_proposal, Some(proposal))
            }
            Err(err) => {
                log::warn!("iteration {iter}: trajectory left the support: {err}");
                (f64::NEG_INFINITY, None)
            }
        };

        // Also catches NaN.
        let divergent = !(log_accept_ratio > -MAX_ENERGY_ERROR);
        if divergent && !is_warmup {
            num_divergent += 1;
            log::warn!("iteration {iter}: divergent transition at step size {step_size:.3e}");
        }

        let accept_prob = if log_accept_ratio.is_nan() {
            0.0
        } else {
            log_accept_ratio.min(0.0).exp()
        };

        total += 1;
        if let Some(proposal) = proposal {
            if log_accept_ratio.is_finite() && rng.gen::<f64>().ln() < log_accept_ratio {
                current = proposal;
                accepted += 1;
            }
        }

        if is_warmup {
            step_size = adaptation.observe(accept_prob);
            if iter + 1 == config.num_warmup {
                step_size = adaptation.adapted();
                log::debug!("warmup finished with step size {step_size:.4}");
            }
        }

        if !is_warmup {
            samples.push(current.q.clone());
        }
    }

    Ok(ChainResult {
        samples,
        accept_rate: if total > 0 {
            accepted as f64 / total as f64
        } else {
            0.0
        },
        step_size,
        num_divergent,
    })
}
