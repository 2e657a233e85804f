//! Distribution statistics written once over [`Operand`](crate::Operand)
//! arguments: plain numbers give a plain number back, handles under
//! differentiation give a single precomputed-gradients node.

pub mod normal;

pub use normal::{
    normal_ccdf_log, normal_cdf, normal_cdf_log, normal_log, normal_rng, normal_ss_log, TailRegime,
};

/// Normalization requested from a log density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Density {
    /// Every term, including normalizing constants.
    #[default]
    Full,
    /// Only terms that vary with a differentiated argument; the result is
    /// the log density up to an additive constant.
    Proportional,
}

/// One additive term of a log density together with the arguments it
/// varies with.
#[derive(Debug, Clone, Copy)]
pub struct Summand {
    depends_on: &'static [usize],
}

impl Summand {
    /// A term that varies with the arguments at positions `depends_on`.
    pub const fn new(depends_on: &'static [usize]) -> Self {
        Self { depends_on }
    }

    /// Whether the term must be computed, given which arguments are under
    /// differentiation.
    pub fn included(&self, density: Density, differentiated: &[bool]) -> bool {
        density == Density::Full || self.depends_on.iter().any(|&arg| differentiated[arg])
    }
}

/// Whether at least one term of `table` must be computed.
pub fn any_included(table: &[Summand], density: Density, differentiated: &[bool]) -> bool {
    table.iter().any(|s| s.included(density, differentiated))
}
