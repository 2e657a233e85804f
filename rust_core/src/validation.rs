//! Precondition checks run before a formula computes any summand.

use crate::error::{DomainError, Requirement, Result};
use crate::scalar::{Operand, Shape, Value};

fn element_label(label: &str, is_vector: bool, i: usize) -> String {
    if is_vector {
        format!("{label}[{i}]")
    } else {
        label.to_string()
    }
}

fn check_each<'t, O: Operand<'t> + ?Sized>(
    function: &'static str,
    arg: &O,
    label: &str,
    requirement: Requirement,
    ok: impl Fn(f64) -> bool,
) -> Result<()> {
    for i in 0..arg.length() {
        let value = arg.value_of(i);
        if !ok(value) {
            return Err(DomainError::InvalidArgument {
                function,
                label: element_label(label, arg.is_vector(), i),
                value,
                requirement,
            });
        }
    }
    Ok(())
}

pub fn check_not_nan<'t, O: Operand<'t> + ?Sized>(
    function: &'static str,
    arg: &O,
    label: &str,
) -> Result<()> {
    check_each(function, arg, label, Requirement::NotNan, |v| !v.is_nan())
}

pub fn check_finite<'t, O: Operand<'t> + ?Sized>(
    function: &'static str,
    arg: &O,
    label: &str,
) -> Result<()> {
    check_each(function, arg, label, Requirement::Finite, f64::is_finite)
}

/// Strictly greater than zero; NaN fails.
pub fn check_positive<'t, O: Operand<'t> + ?Sized>(
    function: &'static str,
    arg: &O,
    label: &str,
) -> Result<()> {
    check_each(function, arg, label, Requirement::Positive, |v| v > 0.0)
}

/// Every sequence argument must have the length of the first sequence.
/// Scalars are compatible with any length.
pub fn check_consistent_sizes(
    function: &'static str,
    args: &[&dyn Shape],
    labels: &[&'static str],
) -> Result<()> {
    debug_assert_eq!(args.len(), labels.len());
    let mut expected: Option<(usize, &'static str)> = None;
    for (arg, &label) in args.iter().zip(labels.iter()) {
        if !arg.is_vector() {
            continue;
        }
        match expected {
            None => expected = Some((arg.length(), label)),
            Some((size, expected_label)) if arg.length() != size => {
                return Err(DomainError::InconsistentSizes {
                    function,
                    label,
                    size: arg.length(),
                    expected_label,
                    expected: size,
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn is_negative_integer(x: f64) -> bool {
    x < 0.0 && x.floor() == x
}

/// Check that the generalized hypergeometric series 3F2(a1, a2, a3; b1, b2; z)
/// converges for finite coefficients.
///
/// A negative integer among the `a` coefficients truncates the series to a
/// polynomial, which converges unless a `b` coefficient hits a pole within
/// its terms. Otherwise the series needs `|z| < 1`, or `|z| == 1` with
/// `b1 + b2 > a1 + a2 + a3`. A NaN `z` never passes.
pub fn check_3f2_converges(
    function: &'static str,
    a1: f64,
    a2: f64,
    a3: f64,
    b1: f64,
    b2: f64,
    z: f64,
) -> Result<()> {
    let mut num_terms = 0.0_f64;
    let is_polynomial = [a1, a2, a3].into_iter().any(is_negative_integer);
    if is_polynomial {
        for a in [a1, a2, a3] {
            if is_negative_integer(a) && a.abs() > num_terms {
                num_terms = a.abs().floor();
            }
        }
    }

    let is_undefined = [b1, b2]
        .into_iter()
        .any(|b| is_negative_integer(b) && b.abs() <= num_terms);

    if !is_undefined {
        if is_polynomial || z.abs() < 1.0 {
            return Ok(());
        }
        if z.abs() == 1.0 && b1 + b2 > a1 + a2 + a3 {
            return Ok(());
        }
    }

    Err(DomainError::HypergeometricDivergence {
        function,
        a1,
        a2,
        a3,
        b1,
        b2,
        z,
    })
}

/// What a caller does with a domain error raised by a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Propagate the error to the caller.
    #[default]
    Raise,
    /// Log the error and continue with a NaN result.
    Recover,
}

impl ErrorPolicy {
    pub fn apply<'t>(self, result: Result<Value<'t>>) -> Result<Value<'t>> {
        match (self, result) {
            (ErrorPolicy::Recover, Err(err)) => {
                log::warn!("recovered from domain error: {err}");
                Ok(Value::Constant(f64::NAN))
            }
            (_, result) => result,
        }
    }
}
