//! Adaptors that let one formula read plain numbers, AD handles, and
//! sequences of either through the same interface.

use crate::tape::Var;
use std::ops::Add;

/// A single number that is either a constant or a handle under
/// differentiation.
pub trait Scalar<'t>: Copy {
    /// Forward value with any AD wrapping stripped.
    fn value(&self) -> f64;

    /// The handle to differentiate through, if any.
    fn as_var(&self) -> Option<Var<'t>>;
}

impl<'t> Scalar<'t> for f64 {
    #[inline]
    fn value(&self) -> f64 {
        *self
    }

    #[inline]
    fn as_var(&self) -> Option<Var<'t>> {
        None
    }
}

impl<'t> Scalar<'t> for Var<'t> {
    #[inline]
    fn value(&self) -> f64 {
        Var::value(self)
    }

    #[inline]
    fn as_var(&self) -> Option<Var<'t>> {
        Some(*self)
    }
}

/// Size information of an argument, independent of its element type.
pub trait Shape {
    /// Number of elements; 1 for a scalar.
    fn length(&self) -> usize;

    /// Whether the argument is a sequence (even of length one).
    fn is_vector(&self) -> bool;
}

/// Scalar-or-sequence argument of a distribution formula.
///
/// A scalar repeats for every index, so `element(i)` is valid for any `i`
/// below the broadcast length of the call.
pub trait Operand<'t>: Shape {
    type Elem: Scalar<'t>;

    fn element(&self, i: usize) -> Self::Elem;

    #[inline]
    fn value_of(&self, i: usize) -> f64 {
        self.element(i).value()
    }

    /// Whether any element carries a handle under differentiation.
    fn is_differentiated(&self) -> bool {
        (0..self.length()).any(|i| self.element(i).as_var().is_some())
    }
}

impl<T: Shape + ?Sized> Shape for &T {
    #[inline]
    fn length(&self) -> usize {
        (**self).length()
    }

    #[inline]
    fn is_vector(&self) -> bool {
        (**self).is_vector()
    }
}

impl Shape for Var<'_> {
    #[inline]
    fn length(&self) -> usize {
        1
    }

    #[inline]
    fn is_vector(&self) -> bool {
        false
    }
}

impl<'t> Operand<'t> for Var<'t> {
    type Elem = Var<'t>;

    #[inline]
    fn element(&self, _i: usize) -> Var<'t> {
        *self
    }

    #[inline]
    fn is_differentiated(&self) -> bool {
        true
    }
}

impl Shape for Value<'_> {
    #[inline]
    fn length(&self) -> usize {
        1
    }

    #[inline]
    fn is_vector(&self) -> bool {
        false
    }
}

impl<'t> Operand<'t> for Value<'t> {
    type Elem = Value<'t>;

    #[inline]
    fn element(&self, _i: usize) -> Value<'t> {
        *self
    }
}

impl Shape for f64 {
    #[inline]
    fn length(&self) -> usize {
        1
    }

    #[inline]
    fn is_vector(&self) -> bool {
        false
    }
}

impl<'t> Operand<'t> for f64 {
    type Elem = f64;

    #[inline]
    fn element(&self, _i: usize) -> f64 {
        *self
    }

    #[inline]
    fn is_differentiated(&self) -> bool {
        false
    }
}

impl<T> Shape for [T] {
    #[inline]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline]
    fn is_vector(&self) -> bool {
        true
    }
}

impl<'t, T: Scalar<'t>> Operand<'t> for [T] {
    type Elem = T;

    #[inline]
    fn element(&self, i: usize) -> T {
        self[i]
    }
}

impl<T> Shape for Vec<T> {
    #[inline]
    fn length(&self) -> usize {
        self.len()
    }

    #[inline]
    fn is_vector(&self) -> bool {
        true
    }
}

impl<'t, T: Scalar<'t>> Operand<'t> for Vec<T> {
    type Elem = T;

    #[inline]
    fn element(&self, i: usize) -> T {
        self[i]
    }
}

impl<T, const N: usize> Shape for [T; N] {
    #[inline]
    fn length(&self) -> usize {
        N
    }

    #[inline]
    fn is_vector(&self) -> bool {
        true
    }
}

impl<'t, T: Scalar<'t>, const N: usize> Operand<'t> for [T; N] {
    type Elem = T;

    #[inline]
    fn element(&self, i: usize) -> T {
        self[i]
    }
}

/// Largest element count across the arguments of one call.
pub fn max_size(args: &[&dyn Shape]) -> usize {
    args.iter().map(|a| a.length()).max().unwrap_or(0)
}

/// Whether any argument is an empty sequence.
pub fn any_empty(args: &[&dyn Shape]) -> bool {
    args.iter().any(|a| a.length() == 0)
}

/// Result of a formula: a plain number when nothing was differentiated,
/// otherwise a handle to the node that carries the gradient.
#[derive(Debug, Clone, Copy)]
pub enum Value<'t> {
    Constant(f64),
    Var(Var<'t>),
}

impl<'t> Value<'t> {
    pub fn value(&self) -> f64 {
        match self {
            Value::Constant(v) => *v,
            Value::Var(v) => v.value(),
        }
    }

    pub fn as_var(&self) -> Option<Var<'t>> {
        match self {
            Value::Constant(_) => None,
            Value::Var(v) => Some(*v),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }
}

impl<'t> Scalar<'t> for Value<'t> {
    #[inline]
    fn value(&self) -> f64 {
        Value::value(self)
    }

    #[inline]
    fn as_var(&self) -> Option<Var<'t>> {
        Value::as_var(self)
    }
}

impl From<f64> for Value<'_> {
    fn from(v: f64) -> Self {
        Value::Constant(v)
    }
}

impl<'t> From<Var<'t>> for Value<'t> {
    fn from(v: Var<'t>) -> Self {
        Value::Var(v)
    }
}

impl<'t> Add for Value<'t> {
    type Output = Value<'t>;

    fn add(self, rhs: Value<'t>) -> Value<'t> {
        match (self, rhs) {
            (Value::Constant(a), Value::Constant(b)) => Value::Constant(a + b),
            (Value::Var(a), Value::Constant(b)) | (Value::Constant(b), Value::Var(a)) => {
                Value::Var(a + b)
            }
            (Value::Var(a), Value::Var(b)) => Value::Var(a + b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tape::Tape;

    #[test]
    fn test_scalar_broadcasts() {
        let x = 2.5_f64;
        assert_eq!(x.length(), 1);
        assert!(!x.is_vector());
        assert_eq!(x.value_of(17), 2.5);
        assert!(!x.is_differentiated());
    }

    #[test]
    fn test_sequence_indexes() {
        let xs = vec![1.0_f64, 2.0, 3.0];
        assert_eq!(xs.length(), 3);
        assert!(xs.is_vector());
        assert_eq!(xs.value_of(2), 3.0);

        let arr = [4.0_f64];
        assert!(arr.is_vector());
        assert_eq!(arr.length(), 1);
    }

    #[test]
    fn test_var_sequences_are_differentiated() {
        let tape = Tape::new();
        let vs = vec![tape.var(1.0), tape.var(2.0)];
        assert!(vs.is_differentiated());
        assert_eq!(vs.value_of(1), 2.0);

        let mixed = [Value::Constant(1.0), Value::Var(tape.var(3.0))];
        assert!(mixed.is_differentiated());
        let constants = [Value::Constant(1.0)];
        assert!(!constants.is_differentiated());
    }

    #[test]
    fn test_max_size_and_empty() {
        let a = 1.0_f64;
        let b = vec![1.0_f64, 2.0, 3.0];
        let c: Vec<f64> = Vec::new();
        assert_eq!(max_size(&[&a, &b]), 3);
        assert!(!any_empty(&[&a, &b]));
        assert!(any_empty(&[&a, &c]));
    }

    #[test]
    fn test_value_addition_promotes() {
        let tape = Tape::new();
        let x = tape.var(1.0);
        let c = Value::Constant(2.0) + Value::Constant(3.0);
        assert!(c.is_constant());
        assert_eq!(c.value(), 5.0);

        let v = Value::Constant(2.0) + Value::Var(x);
        assert!(!v.is_constant());
        assert_eq!(v.value(), 3.0);
    }
}
