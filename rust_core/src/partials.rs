use crate::scalar::{Operand, Scalar, Value};
use crate::tape::{Tape, Var};
use std::ops::{Index, IndexMut};

/// Identifies one argument registered with [`OperandsAndPartials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeId(usize);

/// Per-element partial derivatives for one differentiated argument.
///
/// Indexing broadcasts like the argument does: for a scalar every index
/// lands in the single slot, so contributions from all elements sum up.
#[derive(Debug, Clone)]
pub struct Partials {
    values: Vec<f64>,
    is_vector: bool,
}

impl Partials {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Multiply every stored partial by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for d in &mut self.values {
            *d *= factor;
        }
    }
}

impl Index<usize> for Partials {
    type Output = f64;

    #[inline]
    fn index(&self, n: usize) -> &f64 {
        if self.is_vector {
            &self.values[n]
        } else {
            &self.values[0]
        }
    }
}

impl IndexMut<usize> for Partials {
    #[inline]
    fn index_mut(&mut self, n: usize) -> &mut f64 {
        if self.is_vector {
            &mut self.values[n]
        } else {
            &mut self.values[0]
        }
    }
}

#[derive(Debug)]
struct Edge<'t> {
    operands: Vec<Option<Var<'t>>>,
    partials: Partials,
}

/// Collects analytic partial derivatives for the arguments of one formula
/// call and folds them into a single precomputed-gradients node.
///
/// Arguments that are not differentiated get no buffer at all. When no
/// argument is differentiated, [`OperandsAndPartials::build`] returns the
/// plain number and records nothing.
#[derive(Debug, Default)]
pub struct OperandsAndPartials<'t> {
    tape: Option<&'t Tape>,
    edges: Vec<Option<Edge<'t>>>,
}

impl<'t> OperandsAndPartials<'t> {
    pub fn new() -> Self {
        Self {
            tape: None,
            edges: Vec::new(),
        }
    }

    /// Register the next argument and return its id.
    pub fn edge<O: Operand<'t> + ?Sized>(&mut self, arg: &O) -> EdgeId {
        let id = EdgeId(self.edges.len());
        if !arg.is_differentiated() {
            self.edges.push(None);
            return id;
        }

        let len = arg.length();
        let operands: Vec<Option<Var<'t>>> = (0..len).map(|i| arg.element(i).as_var()).collect();
        if self.tape.is_none() {
            self.tape = operands.iter().flatten().next().map(|v| v.tape());
        }
        self.edges.push(Some(Edge {
            operands,
            partials: Partials {
                values: vec![0.0; len],
                is_vector: arg.is_vector(),
            },
        }));
        id
    }

    pub fn is_differentiated(&self, id: EdgeId) -> bool {
        self.edges[id.0].is_some()
    }

    /// Whether at least one registered argument is differentiated.
    pub fn any_differentiated(&self) -> bool {
        self.tape.is_some()
    }

    pub fn partials(&self, id: EdgeId) -> Option<&Partials> {
        self.edges[id.0].as_ref().map(|e| &e.partials)
    }

    pub fn partials_mut(&mut self, id: EdgeId) -> Option<&mut Partials> {
        self.edges[id.0].as_mut().map(|e| &mut e.partials)
    }

    /// Add `delta` to the partial of element `n` of argument `id`. Does
    /// nothing for a constant argument.
    #[inline]
    pub fn accumulate(&mut self, id: EdgeId, n: usize, delta: f64) {
        if let Some(edge) = self.edges[id.0].as_mut() {
            edge.partials[n] += delta;
        }
    }

    /// Multiply every partial of argument `id` by `factor`.
    pub fn scale_partials(&mut self, id: EdgeId, factor: f64) {
        if let Some(edge) = self.edges[id.0].as_mut() {
            edge.partials.scale(factor);
        }
    }

    /// Materialize the result with `value` as its forward value.
    pub fn build(self, value: f64) -> Value<'t> {
        let Some(tape) = self.tape else {
            return Value::Constant(value);
        };
        let edges = self.edges.iter().flatten().flat_map(move |edge| {
            edge.operands
                .iter()
                .zip(edge.partials.values.iter())
                .filter_map(move |(v, &d)| v.as_ref().map(|v| (tape.own(v), d)))
        });
        Value::Var(tape.push_precomputed(value, edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constants_build_plain_value() {
        let tape = Tape::new();
        let mut ops = OperandsAndPartials::new();
        let a = ops.edge(&1.0_f64);
        let b = ops.edge(&vec![1.0_f64, 2.0]);
        assert!(!ops.is_differentiated(a));
        assert!(ops.partials_mut(b).is_none());
        assert!(!ops.any_differentiated());

        let out = ops.build(3.5);
        assert!(out.is_constant());
        assert_eq!(out.value(), 3.5);
        assert!(tape.is_empty());
    }

    #[test]
    fn test_scalar_operand_sums_broadcast_contributions() {
        let tape = Tape::new();
        let mu = tape.var(0.5);
        let ys = vec![1.0_f64, 2.0, 3.0];

        let mut ops = OperandsAndPartials::new();
        let d_y = ops.edge(&ys);
        let d_mu = ops.edge(&mu);
        assert!(!ops.is_differentiated(d_y));
        for n in 0..ys.len() {
            if let Some(d) = ops.partials_mut(d_mu) {
                d[n] += ys[n];
            }
        }
        assert_eq!(ops.partials(d_mu).map(|p| p.len()), Some(1));

        let out = ops.build(-1.0).as_var().expect("differentiated result");
        assert_eq!(out.value(), -1.0);
        tape.backward(out);
        assert_relative_eq!(mu.adjoint(), 6.0);
    }

    #[test]
    fn test_vector_operand_keeps_per_element_partials() {
        let tape = Tape::new();
        let xs = vec![tape.var(1.0), tape.var(2.0), tape.var(3.0)];
        let mut ops = OperandsAndPartials::new();
        let d_x = ops.edge(&xs);
        for n in 0..3 {
            if let Some(d) = ops.partials_mut(d_x) {
                d[n] -= n as f64;
            }
        }
        if let Some(d) = ops.partials_mut(d_x) {
            d.scale(2.0);
        }

        let out = ops.build(0.0);
        let grad = tape.gradient(out.as_var().expect("differentiated result"), &xs);
        assert_eq!(grad, vec![0.0, -2.0, -4.0]);
    }

    #[test]
    fn test_accumulate_skips_constants() {
        let tape = Tape::new();
        let x = tape.var(2.0);
        let mut ops = OperandsAndPartials::new();
        let d_c = ops.edge(&5.0_f64);
        let d_x = ops.edge(&x);
        for n in 0..4 {
            ops.accumulate(d_c, n, 100.0);
            ops.accumulate(d_x, n, 0.5);
        }
        ops.scale_partials(d_x, 3.0);
        assert_eq!(ops.partials(d_x).map(|p| p.as_slice().to_vec()), Some(vec![6.0]));
        assert!(ops.partials(d_c).is_none());
    }

    #[test]
    fn test_same_var_in_two_arguments_accumulates() {
        let tape = Tape::new();
        let x = tape.var(1.0);
        let mut ops = OperandsAndPartials::new();
        let first = ops.edge(&x);
        let second = ops.edge(&x);
        if let Some(d) = ops.partials_mut(first) {
            d[0] += 2.0;
        }
        if let Some(d) = ops.partials_mut(second) {
            d[0] += 5.0;
        }
        let out = ops.build(0.0).as_var().expect("differentiated result");
        tape.backward(out);
        assert_eq!(x.adjoint(), 7.0);
    }

    #[test]
    fn test_mixed_value_sequence_skips_constant_elements() {
        let tape = Tape::new();
        let v = tape.var(4.0);
        let args = [Value::Constant(1.0), Value::Var(v)];
        let mut ops = OperandsAndPartials::new();
        let d = ops.edge(&args);
        if let Some(p) = ops.partials_mut(d) {
            p[0] = 10.0;
            p[1] = 3.0;
        }
        let out = ops.build(0.0).as_var().expect("differentiated result");
        tape.backward(out);
        assert_eq!(v.adjoint(), 3.0);
    }
}
