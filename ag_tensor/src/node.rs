//! Backward graph nodes and the edges that connect them.
//!
//! Every differentiable forward op records one [`Node`]. The node carries the
//! data its local derivative needs (copied out of the forward operands) and an
//! ordered list of [`Edge`]s, one per operand that required gradients.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::array::{self, Array};
use crate::error::Result;
use crate::shape::Shape;
use crate::tensor::{Tensor, TensorInner};

/// Shared handle to a graph node.
pub type NodeRef = Rc<Node>;

/// Link from a node to the node that receives one of its gradient outputs.
#[derive(Clone)]
pub struct Edge {
    node: NodeRef,
    input_nr: usize,
}

impl Edge {
    pub fn new(node: NodeRef) -> Self {
        Edge { node, input_nr: 0 }
    }

    /// Target node.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Output slot on the target. Nodes have a single gradient input, so this is always 0.
    pub fn input_nr(&self) -> usize {
        self.input_nr
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("node", &self.node.name())
            .field("input_nr", &self.input_nr)
            .finish()
    }
}

/// Operand captured for a product rule: the operand's own shape (to
/// unbroadcast into) and a copy of the *other* operand's data.
#[derive(Clone)]
pub(crate) struct Factor {
    pub shape: Shape,
    pub other: Array,
}

/// Backward rule of a node, with its captured payload.
///
/// `Option` fields are `Some` exactly for the operands that required
/// gradients, in forward-argument order, so the number of gradients `apply`
/// produces always equals the number of edges.
pub(crate) enum Backward {
    /// Terminal node depositing gradients into a leaf tensor.
    AccumulateGrad { leaf: Weak<TensorInner> },
    Add {
        lhs: Option<Shape>,
        rhs: Option<Shape>,
    },
    Sub {
        lhs: Option<Shape>,
        rhs: Option<Shape>,
    },
    Mul {
        lhs: Option<Factor>,
        rhs: Option<Factor>,
    },
    Div {
        lhs: Option<Shape>,
        /// Shape of the denominator plus a copy of the numerator.
        rhs: Option<Factor>,
        denominator: Array,
    },
    /// `rhs_t` is the transposed right operand (needed for the left gradient)
    /// and vice versa.
    MatMul {
        rhs_t: Option<Array>,
        lhs_t: Option<Array>,
    },
    Pow {
        base: Array,
        exponent: f64,
    },
    Neg,
    Sum {
        input_shape: Shape,
        axes: Vec<usize>,
    },
    Mean {
        input_shape: Shape,
        axes: Vec<usize>,
    },
    Transpose,
    Exp {
        output: Array,
    },
    Relu {
        input: Array,
    },
}

/// A node of the backward graph.
pub struct Node {
    backward: Backward,
    next_edges: Vec<Edge>,
}

impl Node {
    pub(crate) fn new(backward: Backward, next_edges: Vec<Edge>) -> NodeRef {
        Rc::new(Node {
            backward,
            next_edges,
        })
    }

    pub(crate) fn accumulate_grad(leaf: Weak<TensorInner>) -> NodeRef {
        Node::new(Backward::AccumulateGrad { leaf }, Vec::new())
    }

    /// Name of the backward rule, e.g. `"MulBackward"`.
    pub fn name(&self) -> &'static str {
        match &self.backward {
            Backward::AccumulateGrad { .. } => "AccumulateGrad",
            Backward::Add { .. } => "AddBackward",
            Backward::Sub { .. } => "SubBackward",
            Backward::Mul { .. } => "MulBackward",
            Backward::Div { .. } => "DivBackward",
            Backward::MatMul { .. } => "MatMulBackward",
            Backward::Pow { .. } => "PowBackward",
            Backward::Neg => "NegBackward",
            Backward::Sum { .. } => "SumBackward",
            Backward::Mean { .. } => "MeanBackward",
            Backward::Transpose => "TransposeBackward",
            Backward::Exp { .. } => "ExpBackward",
            Backward::Relu { .. } => "ReluBackward",
        }
    }

    /// Edges to the nodes of the differentiable inputs, in forward-argument order.
    pub fn next_edges(&self) -> &[Edge] {
        &self.next_edges
    }

    pub fn is_accumulate_grad(&self) -> bool {
        matches!(self.backward, Backward::AccumulateGrad { .. })
    }

    /// Map the gradient of this node's output to the gradients owed to its
    /// inputs, one per entry of [`Node::next_edges`].
    pub(crate) fn apply(&self, grad: Array) -> Result<Vec<Array>> {
        match &self.backward {
            Backward::AccumulateGrad { leaf } => {
                // A dropped leaf has nobody left to read its gradient.
                if let Some(inner) = leaf.upgrade() {
                    Tensor::from_inner(inner).accumulate_grad(grad)?;
                }
                Ok(Vec::new())
            }

            Backward::Add { lhs, rhs } => [lhs, rhs]
                .into_iter()
                .flatten()
                .map(|shape| array::unbroadcast(grad.clone(), shape))
                .collect(),

            Backward::Sub { lhs, rhs } => {
                let mut grads = Vec::with_capacity(2);
                if let Some(shape) = lhs {
                    grads.push(array::unbroadcast(grad.clone(), shape)?);
                }
                if let Some(shape) = rhs {
                    grads.push(array::unbroadcast(grad.mapv(|g| -g), shape)?);
                }
                Ok(grads)
            }

            Backward::Mul { lhs, rhs } => [lhs, rhs]
                .into_iter()
                .flatten()
                .map(|factor| {
                    let local = array::binary_op_broadcast(&factor.other, &grad, |x, g| x * g)?;
                    array::unbroadcast(local, &factor.shape)
                })
                .collect(),

            Backward::Div {
                lhs,
                rhs,
                denominator,
            } => {
                let mut grads = Vec::with_capacity(2);
                if let Some(shape) = lhs {
                    let local = array::binary_op_broadcast(&grad, denominator, |g, d| g / d)?;
                    grads.push(array::unbroadcast(local, shape)?);
                }
                if let Some(factor) = rhs {
                    let ratio =
                        array::binary_op_broadcast(&factor.other, denominator, |n, d| -n / (d * d))?;
                    let local = array::binary_op_broadcast(&ratio, &grad, |r, g| r * g)?;
                    grads.push(array::unbroadcast(local, &factor.shape)?);
                }
                Ok(grads)
            }

            Backward::MatMul { rhs_t, lhs_t } => {
                let mut grads = Vec::with_capacity(2);
                if let Some(rhs_t) = rhs_t {
                    grads.push(array::matmul(&grad, rhs_t)?);
                }
                if let Some(lhs_t) = lhs_t {
                    grads.push(array::matmul(lhs_t, &grad)?);
                }
                Ok(grads)
            }

            Backward::Pow { base, exponent } => {
                let c = *exponent;
                let local = base.mapv(|x| c * x.powf(c - 1.0));
                Ok(vec![array::binary_op_broadcast(&grad, &local, |g, l| g * l)?])
            }

            Backward::Neg => Ok(vec![grad.mapv(|g| -g)]),

            Backward::Sum { input_shape, axes } => {
                Ok(vec![array::expand_reduced(&grad, input_shape, axes)?])
            }

            Backward::Mean { input_shape, axes } => {
                // numel(out) / numel(in) is 1 / (number of elements averaged).
                let scale = grad.len() as f64 / input_shape.numel().max(1) as f64;
                let expanded = array::expand_reduced(&grad, input_shape, axes)?;
                Ok(vec![expanded.mapv(|g| g * scale)])
            }

            Backward::Transpose => Ok(vec![array::transpose(&grad)]),

            Backward::Exp { output } => {
                Ok(vec![array::binary_op_broadcast(&grad, output, |g, y| g * y)?])
            }

            Backward::Relu { input } => Ok(vec![array::binary_op_broadcast(
                &grad,
                input,
                |g, x| if x > 0.0 { g } else { 0.0 },
            )?]),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("next_edges", &self.next_edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn leaf_edge() -> Edge {
        Edge::new(Node::accumulate_grad(Weak::new()))
    }

    #[test]
    fn test_edge_slot_is_zero() {
        let edge = leaf_edge();
        assert_eq!(edge.input_nr(), 0);
        assert_eq!(edge.node().name(), "AccumulateGrad");
    }

    #[test]
    fn test_accumulate_grad_is_terminal() {
        let node = Node::accumulate_grad(Weak::new());
        assert!(node.next_edges().is_empty());
        assert!(node.is_accumulate_grad());
        let grads = node.apply(array::scalar(1.0)).unwrap();
        assert!(grads.is_empty());
    }

    #[test]
    fn test_add_only_returns_differentiable_inputs() {
        let node = Node::new(
            Backward::Add {
                lhs: None,
                rhs: Some(Shape::scalar()),
            },
            vec![leaf_edge()],
        );
        let grads = node.apply(arr1(&[1.0, 1.0, 1.0]).into_dyn()).unwrap();
        assert_eq!(grads.len(), node.next_edges().len());
        assert_eq!(grads[0], array::scalar(3.0));
    }

    #[test]
    fn test_sub_negates_rhs() {
        let node = Node::new(
            Backward::Sub {
                lhs: Some(Shape::new(vec![2])),
                rhs: Some(Shape::new(vec![2])),
            },
            vec![leaf_edge(), leaf_edge()],
        );
        let grads = node.apply(arr1(&[1.0, 2.0]).into_dyn()).unwrap();
        assert_eq!(grads[0], arr1(&[1.0, 2.0]).into_dyn());
        assert_eq!(grads[1], arr1(&[-1.0, -2.0]).into_dyn());
    }

    #[test]
    fn test_div_rule() {
        // a / b with a = 1, b = 2: d/da = 1/2, d/db = -1/4
        let node = Node::new(
            Backward::Div {
                lhs: Some(Shape::scalar()),
                rhs: Some(Factor {
                    shape: Shape::scalar(),
                    other: array::scalar(1.0),
                }),
                denominator: array::scalar(2.0),
            },
            vec![leaf_edge(), leaf_edge()],
        );
        let grads = node.apply(array::scalar(1.0)).unwrap();
        assert_eq!(grads[0], array::scalar(0.5));
        assert_eq!(grads[1], array::scalar(-0.25));
    }

    #[test]
    fn test_mean_scales_by_reduced_count() {
        let node = Node::new(
            Backward::Mean {
                input_shape: Shape::new(vec![2, 4]),
                axes: vec![1],
            },
            vec![leaf_edge()],
        );
        let grads = node.apply(arr1(&[1.0, 2.0]).into_dyn()).unwrap();
        assert_eq!(
            grads[0],
            arr2(&[[0.25, 0.25, 0.25, 0.25], [0.5, 0.5, 0.5, 0.5]]).into_dyn()
        );
    }

    #[test]
    fn test_relu_masks_non_positive_inputs() {
        let node = Node::new(
            Backward::Relu {
                input: arr1(&[-1.0, 0.0, 2.0]).into_dyn(),
            },
            vec![leaf_edge()],
        );
        let grads = node.apply(arr1(&[5.0, 5.0, 5.0]).into_dyn()).unwrap();
        assert_eq!(grads[0], arr1(&[0.0, 0.0, 5.0]).into_dyn());
    }
}
