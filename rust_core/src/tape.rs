use crate::arena::Arena;
use std::cell::RefCell;
use std::f64::consts::FRAC_2_SQRT_PI;
use std::fmt;

/// Elementary operation recorded by a node. Operands are tape indices of
/// earlier nodes; the forward value of the node itself is kept on the node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// Independent variable.
    Leaf,
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    Div(usize, usize),
    /// `scale * a + offset`. The offset only affects the forward value.
    Affine { a: usize, scale: f64 },
    /// `numerator / a`
    Recip { a: usize, numerator: f64 },
    Exp(usize),
    Ln(usize),
    Sqrt(usize),
    Square(usize),
    Powf(usize, f64),
    Pow(usize, usize),
    Erf(usize),
    Erfc(usize),
    /// Weighted sum over `len` (operand, partial) pairs stored contiguously
    /// in the tape's side arenas starting at `start`.
    Precomputed { start: usize, len: usize },
}

impl Op {
    /// Direct operands stored inline in the op.
    fn inline_operands(&self) -> [Option<usize>; 2] {
        match *self {
            Op::Leaf | Op::Precomputed { .. } => [None, None],
            Op::Add(a, b) | Op::Sub(a, b) | Op::Mul(a, b) | Op::Div(a, b) | Op::Pow(a, b) => {
                [Some(a), Some(b)]
            }
            Op::Affine { a, .. }
            | Op::Recip { a, .. }
            | Op::Exp(a)
            | Op::Ln(a)
            | Op::Sqrt(a)
            | Op::Square(a)
            | Op::Powf(a, _)
            | Op::Erf(a)
            | Op::Erfc(a) => [Some(a), None],
        }
    }
}

/// One recorded result: forward value, accumulated adjoint, and the
/// operation that knows how to push the adjoint to its operands.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub value: f64,
    pub adjoint: f64,
    pub op: Op,
}

/// Whether adjoints are still untouched or a backward sweep has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Forward,
    /// Adjoints over `earliest..end` have been propagated.
    Backward { earliest: usize, end: usize },
}

#[derive(Debug)]
struct Stack {
    nodes: Arena<Node>,
    operands: Arena<usize>,
    weights: Arena<f64>,
    phase: Phase,
}

/// Execution-time expression graph for one evaluation.
///
/// Nodes are appended in creation order, so every operand index is smaller
/// than the index of the node that refers to it and a single reverse scan
/// is a valid topological order for the backward pass.
///
/// A `Tape` is `!Sync`; concurrent evaluations each need their own tape.
/// [`Var`] handles borrow the tape, so [`Tape::reset`] (which takes
/// `&mut self`) cannot run while any handle is alive.
pub struct Tape {
    stack: RefCell<Stack>,
}

impl Tape {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Reserve room for `capacity` nodes up front.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: RefCell::new(Stack {
                nodes: Arena::with_capacity(capacity),
                operands: Arena::new(),
                weights: Arena::new(),
                phase: Phase::Forward,
            }),
        }
    }

    /// Record an independent variable.
    pub fn var(&self, value: f64) -> Var<'_> {
        self.push(value, Op::Leaf)
    }

    pub(crate) fn push(&self, value: f64, op: Op) -> Var<'_> {
        let mut stack = self.stack.borrow_mut();
        let index = stack.nodes.len();
        debug_assert!(
            op.inline_operands().iter().flatten().all(|&o| o < index),
            "node {index} refers to a node that is not earlier on the tape"
        );
        stack.nodes.push(Node {
            value,
            adjoint: 0.0,
            op,
        });
        Var { tape: self, index }
    }

    /// Record a node whose adjoint is distributed to each operand scaled by
    /// the matching partial derivative.
    pub fn precomputed_gradients<'t>(
        &'t self,
        value: f64,
        operands: &[Var<'t>],
        partials: &[f64],
    ) -> Var<'t> {
        debug_assert_eq!(operands.len(), partials.len());
        self.push_precomputed(
            value,
            operands
                .iter()
                .zip(partials.iter())
                .map(|(v, &d)| (self.own(v), d)),
        )
    }

    /// Sum of `terms` as a single node.
    pub fn sum<'t>(&'t self, terms: &[Var<'t>]) -> Var<'t> {
        let value = terms.iter().map(|v| v.value()).sum();
        self.push_precomputed(value, terms.iter().map(|v| (self.own(v), 1.0)))
    }

    pub(crate) fn push_precomputed(
        &self,
        value: f64,
        edges: impl IntoIterator<Item = (usize, f64)>,
    ) -> Var<'_> {
        let mut stack = self.stack.borrow_mut();
        let index = stack.nodes.len();
        let start = stack.operands.len();
        for (operand, partial) in edges {
            debug_assert!(
                operand < index,
                "node {index} refers to a node that is not earlier on the tape"
            );
            stack.operands.push(operand);
            stack.weights.push(partial);
        }
        let len = stack.operands.len() - start;
        stack.nodes.push(Node {
            value,
            adjoint: 0.0,
            op: Op::Precomputed { start, len },
        });
        Var { tape: self, index }
    }

    /// Index of `v`, checking that it was recorded on this tape.
    pub(crate) fn own(&self, v: &Var<'_>) -> usize {
        debug_assert!(
            std::ptr::eq(self, v.tape),
            "handle belongs to a different tape"
        );
        v.index
    }

    /// Number of nodes recorded since the last reset.
    pub fn len(&self) -> usize {
        self.stack.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self) -> Phase {
        self.stack.borrow().phase
    }

    /// Copy of the node at `index`.
    pub fn node(&self, index: usize) -> Node {
        *self.stack.borrow().nodes.get(index)
    }

    /// Add `gradient` to the adjoint of `v`, normally the final scalar
    /// result with a gradient of 1.0.
    pub fn seed_gradient(&self, v: Var<'_>, gradient: f64) {
        let index = self.own(&v);
        self.stack.borrow_mut().nodes.get_mut(index).adjoint += gradient;
    }

    pub fn read_gradient(&self, v: Var<'_>) -> f64 {
        let index = self.own(&v);
        self.stack.borrow().nodes.get(index).adjoint
    }

    /// Propagate adjoints from the newest node back to `earliest`.
    ///
    /// Running a second sweep over an already swept segment without calling
    /// [`Tape::zero_adjoints`] would double-count contributions.
    pub fn run_backward_pass(&self, earliest: usize) {
        let mut guard = self.stack.borrow_mut();
        let Stack {
            nodes,
            operands,
            weights,
            phase,
        } = &mut *guard;
        let end = nodes.len();
        if let Phase::Backward { end: swept, .. } = *phase {
            debug_assert!(
                earliest >= swept,
                "backward pass over {earliest}..{end} overlaps a previous sweep ending at {swept}"
            );
        }
        log::debug!("backward pass over nodes {earliest}..{end}");

        for i in (earliest..end).rev() {
            let Node { value, adjoint: g, op } = *nodes.get(i);
            match op {
                Op::Leaf => {}
                Op::Add(a, b) => {
                    nodes.get_mut(a).adjoint += g;
                    nodes.get_mut(b).adjoint += g;
                }
                Op::Sub(a, b) => {
                    nodes.get_mut(a).adjoint += g;
                    nodes.get_mut(b).adjoint -= g;
                }
                Op::Mul(a, b) => {
                    let va = nodes.get(a).value;
                    let vb = nodes.get(b).value;
                    nodes.get_mut(a).adjoint += g * vb;
                    nodes.get_mut(b).adjoint += g * va;
                }
                Op::Div(a, b) => {
                    let va = nodes.get(a).value;
                    let vb = nodes.get(b).value;
                    nodes.get_mut(a).adjoint += g / vb;
                    nodes.get_mut(b).adjoint -= g * va / (vb * vb);
                }
                Op::Affine { a, scale } => {
                    nodes.get_mut(a).adjoint += g * scale;
                }
                Op::Recip { a, .. } => {
                    let va = nodes.get(a).value;
                    nodes.get_mut(a).adjoint -= g * value / va;
                }
                Op::Exp(a) => {
                    nodes.get_mut(a).adjoint += g * value;
                }
                Op::Ln(a) => {
                    let va = nodes.get(a).value;
                    nodes.get_mut(a).adjoint += g / va;
                }
                Op::Sqrt(a) => {
                    nodes.get_mut(a).adjoint += g * 0.5 / value;
                }
                Op::Square(a) => {
                    let va = nodes.get(a).value;
                    nodes.get_mut(a).adjoint += g * 2.0 * va;
                }
                Op::Powf(a, p) => {
                    let va = nodes.get(a).value;
                    nodes.get_mut(a).adjoint += g * p * va.powf(p - 1.0);
                }
                Op::Pow(a, b) => {
                    let va = nodes.get(a).value;
                    let vb = nodes.get(b).value;
                    nodes.get_mut(a).adjoint += g * vb * va.powf(vb - 1.0);
                    // d/db of 0^b is taken as 0.
                    if va != 0.0 {
                        nodes.get_mut(b).adjoint += g * value * va.ln();
                    }
                }
                Op::Erf(a) => {
                    let va = nodes.get(a).value;
                    nodes.get_mut(a).adjoint += g * FRAC_2_SQRT_PI * (-va * va).exp();
                }
                Op::Erfc(a) => {
                    let va = nodes.get(a).value;
                    nodes.get_mut(a).adjoint -= g * FRAC_2_SQRT_PI * (-va * va).exp();
                }
                Op::Precomputed { start, len } => {
                    for k in start..start + len {
                        let operand = *operands.get(k);
                        nodes.get_mut(operand).adjoint += g * *weights.get(k);
                    }
                }
            }
        }

        *phase = match *phase {
            Phase::Backward { earliest: e, .. } => Phase::Backward {
                earliest: e.min(earliest),
                end,
            },
            Phase::Forward => Phase::Backward { earliest, end },
        };
    }

    /// Seed `output` with 1.0 and sweep the whole tape.
    pub fn backward(&self, output: Var<'_>) {
        self.seed_gradient(output, 1.0);
        self.run_backward_pass(0);
    }

    /// Set every adjoint back to zero, keeping the recorded nodes.
    pub fn zero_adjoints(&self) {
        let mut stack = self.stack.borrow_mut();
        for node in stack.nodes.iter_mut() {
            node.adjoint = 0.0;
        }
        stack.phase = Phase::Forward;
    }

    /// Gradient of `output` with respect to each of `wrt`.
    pub fn gradient<'t>(&'t self, output: Var<'t>, wrt: &[Var<'t>]) -> Vec<f64> {
        self.zero_adjoints();
        self.backward(output);
        wrt.iter().map(|v| v.adjoint()).collect()
    }

    /// Invalidate every node. Storage is kept for the next evaluation.
    pub fn reset(&mut self) {
        let stack = self.stack.get_mut();
        log::trace!(
            "resetting tape with {} nodes in {} blocks",
            stack.nodes.len(),
            stack.nodes.block_count()
        );
        stack.nodes.reset();
        stack.operands.reset();
        stack.weights.reset();
        stack.phase = Phase::Forward;
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.stack.borrow();
        f.debug_struct("Tape")
            .field("num_nodes", &stack.nodes.len())
            .field("num_edges", &stack.operands.len())
            .field("phase", &stack.phase)
            .finish()
    }
}

/// Handle to one node of a [`Tape`].
///
/// Copying a `Var` aliases the same node; reading it in several places
/// makes all of those paths accumulate into the one adjoint.
#[derive(Clone, Copy)]
pub struct Var<'t> {
    pub(crate) tape: &'t Tape,
    pub(crate) index: usize,
}

impl<'t> Var<'t> {
    pub fn value(&self) -> f64 {
        self.tape.stack.borrow().nodes.get(self.index).value
    }

    pub fn adjoint(&self) -> f64 {
        self.tape.stack.borrow().nodes.get(self.index).adjoint
    }

    /// Position of the node on its tape.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tape(&self) -> &'t Tape {
        self.tape
    }
}

impl fmt::Debug for Var<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("index", &self.index)
            .field("value", &self.value())
            .field("adjoint", &self.adjoint())
            .finish()
    }
}
