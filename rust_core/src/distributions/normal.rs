//! Normal distribution: log density, sufficient-statistic log density,
//! CDF, log CDF, log complementary CDF and variate generation.
//!
//! Every statistic sums (or, for the CDF, multiplies) over the broadcast
//! elements of its arguments and records at most one tape node.

use super::{any_included, Density, Summand};
use crate::error::{DomainError, Requirement, Result};
use crate::partials::OperandsAndPartials;
use crate::scalar::{any_empty, max_size, Operand, Value};
use crate::validation::{check_consistent_sizes, check_finite, check_not_nan, check_positive};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use statrs::function::erf::{erf, erfc};
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_2_SQRT_PI, LN_2, SQRT_2};

/// -0.5 * ln(2π)
pub const NEG_LOG_SQRT_TWO_PI: f64 = -0.918_938_533_204_672_7;

/// sqrt(2 / π)
const SQRT_TWO_OVER_PI: f64 = 0.797_884_560_802_865_4;

/// Scaled differences below this give a CDF of exactly zero in double
/// precision.
pub const UNDERFLOW_CUTOFF: f64 = -37.5 * FRAC_1_SQRT_2;

/// Scaled differences below this take the CDF from `erfc`, since `1 + erf`
/// cancels catastrophically.
pub const LOWER_TAIL_CUTOFF: f64 = -5.0 * FRAC_1_SQRT_2;

/// Scaled differences above this give a CDF of exactly one.
pub const SATURATION_CUTOFF: f64 = 8.25 * FRAC_1_SQRT_2;

const RANDOM_VARIABLE: &str = "Random variable";
const LOCATION: &str = "Location parameter";
const SCALE: &str = "Scale parameter";
const LOCATION_STATISTIC: &str = "Location parameter sufficient statistic";
const SCALE_STATISTIC: &str = "Scale parameter sufficient statistic";
const NUM_OBSERVATIONS: &str = "Number of observations";

// ── Term tables ─────────────────────────────────────────────────────

const Y: usize = 0;
const MU: usize = 1;
const SIGMA: usize = 2;

/// -0.5 ln(2π), -ln σ, -0.5 ((y - μ) / σ)^2
const NORMAL_LOG_TERMS: [Summand; 3] = [
    Summand::new(&[]),
    Summand::new(&[SIGMA]),
    Summand::new(&[Y, MU, SIGMA]),
];

const SS_Y_BAR: usize = 0;
const SS_S_SQUARED: usize = 1;
const SS_MU: usize = 2;
const SS_SIGMA: usize = 3;

/// -0.5 n ln(2π), -n ln σ, -(s² + n (ȳ - μ)^2) / (2σ²)
const NORMAL_SS_LOG_TERMS: [Summand; 3] = [
    Summand::new(&[]),
    Summand::new(&[SS_SIGMA]),
    Summand::new(&[SS_Y_BAR, SS_S_SQUARED, SS_MU, SS_SIGMA]),
];

// ── Tail regimes ────────────────────────────────────────────────────

/// Which formula evaluates the CDF at a given scaled difference
/// `(y - μ) / (σ √2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailRegime {
    Underflow,
    LowerTail,
    Interior,
    Saturated,
}

impl TailRegime {
    pub fn classify(scaled_diff: f64) -> Self {
        if scaled_diff < UNDERFLOW_CUTOFF {
            TailRegime::Underflow
        } else if scaled_diff < LOWER_TAIL_CUTOFF {
            TailRegime::LowerTail
        } else if scaled_diff > SATURATION_CUTOFF {
            TailRegime::Saturated
        } else {
            TailRegime::Interior
        }
    }
}

#[inline]
fn scaled_diff(y: f64, mu: f64, sigma: f64) -> f64 {
    (y - mu) / (sigma * SQRT_2)
}

/// ln Φ(√2 t) and its derivative with respect to `t`.
///
/// In the underflow regime the asymptotic expansion
/// Φ(z) ≈ φ(z) / (-z) · (1 - z⁻² + 3z⁻⁴ - 15z⁻⁶) keeps the logarithm finite.
fn log_phi(t: f64) -> (f64, f64) {
    let one_p_erf = match TailRegime::classify(t) {
        TailRegime::Underflow => {
            let z = t * SQRT_2;
            let inv_z2 = 1.0 / (z * z);
            let series = 1.0 - inv_z2 + 3.0 * inv_z2 * inv_z2 - 15.0 * inv_z2 * inv_z2 * inv_z2;
            let series_slope = (2.0 - 12.0 * inv_z2 + 90.0 * inv_z2 * inv_z2) * inv_z2 / z;
            let value = -0.5 * z * z + NEG_LOG_SQRT_TWO_PI - (-z).ln() + series.ln();
            let slope = -z - 1.0 / z + series_slope / series;
            return (value, slope * SQRT_2);
        }
        TailRegime::Saturated => return (0.0, 0.0),
        TailRegime::LowerTail => erfc(-t),
        TailRegime::Interior => 1.0 + erf(t),
    };
    let value = -LN_2 + one_p_erf.ln();
    let slope = FRAC_2_SQRT_PI * (-t * t).exp() / one_p_erf;
    (value, slope)
}

/// The CDF family needs a finite scale: an infinite σ against an infinite
/// `y` leaves the scaled difference undefined.
fn check_cdf_arguments<'t, Y, M, S>(function: &'static str, y: &Y, mu: &M, sigma: &S) -> Result<()>
where
    Y: Operand<'t> + ?Sized,
    M: Operand<'t> + ?Sized,
    S: Operand<'t> + ?Sized,
{
    check_not_nan(function, y, RANDOM_VARIABLE)?;
    check_finite(function, mu, LOCATION)?;
    check_finite(function, sigma, SCALE)?;
    check_positive(function, sigma, SCALE)?;
    check_consistent_sizes(function, &[&y, &mu, &sigma], &[RANDOM_VARIABLE, LOCATION, SCALE])
}

// ── Log density ─────────────────────────────────────────────────────

/// Sum of the normal log densities of each `(y, μ, σ)` element triple.
///
/// Each argument is a scalar or a sequence; scalars repeat across the
/// length of the longest sequence. If any sequence is empty the result is
/// 0.0 and no argument is validated.
///
/// With [`Density::Proportional`] terms that are constant in every
/// differentiated argument are dropped, so an all-constant call returns
/// 0.0.
///
/// σ may be `+∞`. Paired with an infinite `y` the density is undefined and
/// the result is NaN rather than an error.
pub fn normal_log<'t, Y, M, S>(y: &Y, mu: &M, sigma: &S, density: Density) -> Result<Value<'t>>
where
    Y: Operand<'t> + ?Sized,
    M: Operand<'t> + ?Sized,
    S: Operand<'t> + ?Sized,
{
    const FUNCTION: &str = "normal_log";

    if any_empty(&[&y, &mu, &sigma]) {
        return Ok(Value::Constant(0.0));
    }

    check_not_nan(FUNCTION, y, RANDOM_VARIABLE)?;
    check_finite(FUNCTION, mu, LOCATION)?;
    check_positive(FUNCTION, sigma, SCALE)?;
    check_consistent_sizes(FUNCTION, &[&y, &mu, &sigma], &[RANDOM_VARIABLE, LOCATION, SCALE])?;

    let differentiated = [
        y.is_differentiated(),
        mu.is_differentiated(),
        sigma.is_differentiated(),
    ];
    if !any_included(&NORMAL_LOG_TERMS, density, &differentiated) {
        return Ok(Value::Constant(0.0));
    }
    let [constant, log_scale, quadratic] =
        NORMAL_LOG_TERMS.map(|term| term.included(density, &differentiated));

    let mut ops = OperandsAndPartials::new();
    let d_y = ops.edge(y);
    let d_mu = ops.edge(mu);
    let d_sigma = ops.edge(sigma);

    let mut logp = 0.0;
    for n in 0..max_size(&[&y, &mu, &sigma]) {
        let y_dbl = y.value_of(n);
        let mu_dbl = mu.value_of(n);
        let sigma_dbl = sigma.value_of(n);

        let inv_sigma = 1.0 / sigma_dbl;
        let z = (y_dbl - mu_dbl) * inv_sigma;
        let z_squared = z * z;

        if constant {
            logp += NEG_LOG_SQRT_TWO_PI;
        }
        if log_scale {
            logp -= sigma_dbl.ln();
        }
        if quadratic {
            logp += -0.5 * z_squared;
        }

        let scaled = inv_sigma * z;
        ops.accumulate(d_y, n, -scaled);
        ops.accumulate(d_mu, n, scaled);
        ops.accumulate(d_sigma, n, -inv_sigma + inv_sigma * z_squared);
    }
    Ok(ops.build(logp))
}

/// Normal log density from sufficient statistics: the sample mean `y_bar`,
/// the sum of squared deviations `s_squared` and the observation count
/// `n_obs` (data only, never differentiated).
///
/// With `n_obs = 1` and `s_squared = 0` this is [`normal_log`] at `y_bar`.
pub fn normal_ss_log<'t, YB, S2, N, M, S>(
    y_bar: &YB,
    s_squared: &S2,
    n_obs: &N,
    mu: &M,
    sigma: &S,
    density: Density,
) -> Result<Value<'t>>
where
    YB: Operand<'t> + ?Sized,
    S2: Operand<'t> + ?Sized,
    N: Operand<'t, Elem = f64> + ?Sized,
    M: Operand<'t> + ?Sized,
    S: Operand<'t> + ?Sized,
{
    const FUNCTION: &str = "normal_ss_log";

    if any_empty(&[&y_bar, &s_squared, &n_obs, &mu, &sigma]) {
        return Ok(Value::Constant(0.0));
    }

    check_not_nan(FUNCTION, y_bar, LOCATION_STATISTIC)?;
    check_not_nan(FUNCTION, s_squared, SCALE_STATISTIC)?;
    check_not_nan(FUNCTION, n_obs, NUM_OBSERVATIONS)?;
    check_finite(FUNCTION, n_obs, NUM_OBSERVATIONS)?;
    check_positive(FUNCTION, n_obs, NUM_OBSERVATIONS)?;
    check_finite(FUNCTION, mu, LOCATION)?;
    check_positive(FUNCTION, sigma, SCALE)?;
    check_consistent_sizes(
        FUNCTION,
        &[&y_bar, &s_squared, &n_obs, &mu, &sigma],
        &[LOCATION_STATISTIC, SCALE_STATISTIC, NUM_OBSERVATIONS, LOCATION, SCALE],
    )?;

    let differentiated = [
        y_bar.is_differentiated(),
        s_squared.is_differentiated(),
        mu.is_differentiated(),
        sigma.is_differentiated(),
    ];
    if !any_included(&NORMAL_SS_LOG_TERMS, density, &differentiated) {
        return Ok(Value::Constant(0.0));
    }
    let [constant, log_scale, quadratic] =
        NORMAL_SS_LOG_TERMS.map(|term| term.included(density, &differentiated));

    let mut ops = OperandsAndPartials::new();
    let d_y_bar = ops.edge(y_bar);
    let d_s_squared = ops.edge(s_squared);
    let d_mu = ops.edge(mu);
    let d_sigma = ops.edge(sigma);

    let mut logp = 0.0;
    for i in 0..max_size(&[&y_bar, &s_squared, &n_obs, &mu, &sigma]) {
        let y_bar_dbl = y_bar.value_of(i);
        let s_squared_dbl = s_squared.value_of(i);
        let n_obs_dbl = n_obs.value_of(i);
        let mu_dbl = mu.value_of(i);
        let sigma_dbl = sigma.value_of(i);
        let sigma_squared = sigma_dbl * sigma_dbl;

        let diff = y_bar_dbl - mu_dbl;
        let cons_expr = s_squared_dbl + n_obs_dbl * diff * diff;

        if constant {
            logp += NEG_LOG_SQRT_TWO_PI * n_obs_dbl;
        }
        if log_scale {
            logp -= n_obs_dbl * sigma_dbl.ln();
        }
        if quadratic {
            logp -= cons_expr / (2.0 * sigma_squared);
        }

        let common = n_obs_dbl * (mu_dbl - y_bar_dbl) / sigma_squared;
        ops.accumulate(d_y_bar, i, common);
        ops.accumulate(d_mu, i, -common);
        ops.accumulate(d_s_squared, i, -1.0 / (2.0 * sigma_squared));
        ops.accumulate(
            d_sigma,
            i,
            cons_expr / (sigma_squared * sigma_dbl) - n_obs_dbl / sigma_dbl,
        );
    }
    Ok(ops.build(logp))
}

// ── Cumulative distribution ─────────────────────────────────────────

/// Product of the normal CDFs of each element triple. Empty sequences give
/// 1.0 without validation.
pub fn normal_cdf<'t, Y, M, S>(y: &Y, mu: &M, sigma: &S) -> Result<Value<'t>>
where
    Y: Operand<'t> + ?Sized,
    M: Operand<'t> + ?Sized,
    S: Operand<'t> + ?Sized,
{
    const FUNCTION: &str = "normal_cdf";

    if any_empty(&[&y, &mu, &sigma]) {
        return Ok(Value::Constant(1.0));
    }
    check_cdf_arguments(FUNCTION, y, mu, sigma)?;

    let mut ops = OperandsAndPartials::new();
    let d_y = ops.edge(y);
    let d_mu = ops.edge(mu);
    let d_sigma = ops.edge(sigma);

    let mut cdf = 1.0;
    for n in 0..max_size(&[&y, &mu, &sigma]) {
        let sigma_dbl = sigma.value_of(n);
        let t = scaled_diff(y.value_of(n), mu.value_of(n), sigma_dbl);

        let regime = TailRegime::classify(t);
        let cdf_n = match regime {
            TailRegime::Underflow => 0.0,
            TailRegime::LowerTail => 0.5 * erfc(-t),
            TailRegime::Saturated => 1.0,
            TailRegime::Interior => 0.5 * (1.0 + erf(t)),
        };
        cdf *= cdf_n;

        // Flat in both saturated regimes.
        if matches!(regime, TailRegime::Underflow | TailRegime::Saturated) {
            continue;
        }

        // Relative to this element's own factor; rescaled by the product below.
        let rep_deriv = SQRT_TWO_OVER_PI * 0.5 * (-t * t).exp() / cdf_n / sigma_dbl;
        ops.accumulate(d_y, n, rep_deriv);
        ops.accumulate(d_mu, n, -rep_deriv);
        ops.accumulate(d_sigma, n, -rep_deriv * t * SQRT_2);
    }

    ops.scale_partials(d_y, cdf);
    ops.scale_partials(d_mu, cdf);
    ops.scale_partials(d_sigma, cdf);

    Ok(ops.build(cdf))
}

/// Sum of the normal log CDFs of each element triple.
///
/// Stays finite and non-positive far in the lower tail, where the CDF
/// itself underflows.
pub fn normal_cdf_log<'t, Y, M, S>(y: &Y, mu: &M, sigma: &S) -> Result<Value<'t>>
where
    Y: Operand<'t> + ?Sized,
    M: Operand<'t> + ?Sized,
    S: Operand<'t> + ?Sized,
{
    const FUNCTION: &str = "normal_cdf_log";

    if any_empty(&[&y, &mu, &sigma]) {
        return Ok(Value::Constant(0.0));
    }
    check_cdf_arguments(FUNCTION, y, mu, sigma)?;

    let mut ops = OperandsAndPartials::new();
    let d_y = ops.edge(y);
    let d_mu = ops.edge(mu);
    let d_sigma = ops.edge(sigma);

    let mut cdf_log = 0.0;
    for n in 0..max_size(&[&y, &mu, &sigma]) {
        let sigma_dbl = sigma.value_of(n);
        let t = scaled_diff(y.value_of(n), mu.value_of(n), sigma_dbl);

        let (value, slope) = log_phi(t);
        cdf_log += value;

        let d_location = slope / (sigma_dbl * SQRT_2);
        ops.accumulate(d_y, n, d_location);
        ops.accumulate(d_mu, n, -d_location);
        ops.accumulate(d_sigma, n, -slope * t / sigma_dbl);
    }
    Ok(ops.build(cdf_log))
}

/// Sum of the normal log complementary CDFs of each element triple,
/// computed as the log CDF at the reflected scaled difference.
pub fn normal_ccdf_log<'t, Y, M, S>(y: &Y, mu: &M, sigma: &S) -> Result<Value<'t>>
where
    Y: Operand<'t> + ?Sized,
    M: Operand<'t> + ?Sized,
    S: Operand<'t> + ?Sized,
{
    const FUNCTION: &str = "normal_ccdf_log";

    if any_empty(&[&y, &mu, &sigma]) {
        return Ok(Value::Constant(0.0));
    }
    check_cdf_arguments(FUNCTION, y, mu, sigma)?;

    let mut ops = OperandsAndPartials::new();
    let d_y = ops.edge(y);
    let d_mu = ops.edge(mu);
    let d_sigma = ops.edge(sigma);

    let mut ccdf_log = 0.0;
    for n in 0..max_size(&[&y, &mu, &sigma]) {
        let sigma_dbl = sigma.value_of(n);
        let t = scaled_diff(y.value_of(n), mu.value_of(n), sigma_dbl);

        let (value, slope) = log_phi(-t);
        ccdf_log += value;

        let d_location = slope / (sigma_dbl * SQRT_2);
        ops.accumulate(d_y, n, -d_location);
        ops.accumulate(d_mu, n, d_location);
        ops.accumulate(d_sigma, n, slope * t / sigma_dbl);
    }
    Ok(ops.build(ccdf_log))
}

// ── Variate generation ──────────────────────────────────────────────

/// Draw one variate from Normal(μ, σ).
pub fn normal_rng<R: Rng + ?Sized>(mu: f64, sigma: f64, rng: &mut R) -> Result<f64> {
    const FUNCTION: &str = "normal_rng";

    check_finite(FUNCTION, &mu, LOCATION)?;
    check_not_nan(FUNCTION, &mu, LOCATION)?;
    check_positive(FUNCTION, &sigma, SCALE)?;
    check_not_nan(FUNCTION, &sigma, SCALE)?;

    let normal = Normal::new(mu, sigma).map_err(|_| DomainError::InvalidArgument {
        function: FUNCTION,
        label: SCALE.to_string(),
        value: sigma,
        requirement: Requirement::Positive,
    })?;
    Ok(normal.sample(rng))
}
