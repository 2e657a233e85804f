//! Reverse-mode automatic differentiation for log densities.
//!
//! Arithmetic on [`Var`] handles records nodes on an explicit [`Tape`];
//! a single reverse scan of the tape propagates adjoints back to the
//! leaves. Distribution statistics such as [`normal_log`] accept plain
//! numbers, handles, or sequences of either, and fold their analytic
//! partial derivatives into one tape node.
//!
//! ```
//! use revgrad_core::{normal_log, Density, Tape};
//!
//! let tape = Tape::new();
//! let mu = tape.var(0.5);
//! let logp = normal_log(&[1.0, 2.0, 0.0][..], &mu, &1.0, Density::Full).unwrap();
//! let grad = tape.gradient(logp.as_var().unwrap(), &[mu]);
//! assert!((grad[0] - 1.5).abs() < 1e-12);
//! ```

pub mod arena;
pub mod distributions;
pub mod error;
pub mod finite_diff;
pub mod hmc;
pub mod ops;
pub mod partials;
pub mod sampler;
pub mod scalar;
pub mod tape;
pub mod validation;

pub use arena::Arena;
pub use distributions::{
    normal_ccdf_log, normal_cdf, normal_cdf_log, normal_log, normal_rng, normal_ss_log, Density,
};
pub use error::{DomainError, Requirement, Result};
pub use hmc::{log_density_gradient, HmcConfig, LogDensity};
pub use partials::{EdgeId, OperandsAndPartials, Partials};
pub use sampler::{sample, SampleResult, SamplerConfig};
pub use scalar::{Operand, Scalar, Shape, Value};
pub use tape::{Node, Op, Phase, Tape, Var};
pub use validation::{
    check_3f2_converges, check_consistent_sizes, check_finite, check_not_nan, check_positive,
    ErrorPolicy,
};
