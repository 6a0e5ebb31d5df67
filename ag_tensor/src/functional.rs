//! Differentiable forward ops.
//!
//! Each op computes its result eagerly. If no operand requires gradients the
//! result is a plain constant and nothing is recorded; otherwise a backward
//! [`Node`] is attached that captures copies of the forward data it needs.

use crate::array::{self, Array};
use crate::error::Result;
use crate::node::{Backward, Edge, Factor, Node};
use crate::tensor::Tensor;

/// One edge per operand that requires gradients, in argument order.
pub(crate) fn collect_next_edges(inputs: &[&Tensor]) -> Vec<Edge> {
    inputs
        .iter()
        .filter(|t| t.requires_grad())
        .map(|t| Edge::new(t.ensure_grad_fn()))
        .collect()
}

fn any_requires_grad(inputs: &[&Tensor]) -> bool {
    inputs.iter().any(|t| t.requires_grad())
}

fn record(data: Array, backward: Backward, inputs: &[&Tensor]) -> Tensor {
    let node = Node::new(backward, collect_next_edges(inputs));
    Tensor::from_node(data, node)
}

/// Shape of `t` if it requires gradients.
fn tracked_shape(t: &Tensor) -> Option<crate::shape::Shape> {
    t.requires_grad().then(|| t.shape())
}

pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let out = array::binary_op_broadcast(&a.data(), &b.data(), |x, y| x + y)?;
    if !any_requires_grad(&[a, b]) {
        return Ok(Tensor::constant(out));
    }
    let backward = Backward::Add {
        lhs: tracked_shape(a),
        rhs: tracked_shape(b),
    };
    Ok(record(out, backward, &[a, b]))
}

pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let out = array::binary_op_broadcast(&a.data(), &b.data(), |x, y| x - y)?;
    if !any_requires_grad(&[a, b]) {
        return Ok(Tensor::constant(out));
    }
    let backward = Backward::Sub {
        lhs: tracked_shape(a),
        rhs: tracked_shape(b),
    };
    Ok(record(out, backward, &[a, b]))
}

pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let out = array::binary_op_broadcast(&a.data(), &b.data(), |x, y| x * y)?;
    if !any_requires_grad(&[a, b]) {
        return Ok(Tensor::constant(out));
    }
    let factor = |this: &Tensor, other: &Tensor| {
        this.requires_grad().then(|| Factor {
            shape: this.shape(),
            other: other.to_array(),
        })
    };
    let backward = Backward::Mul {
        lhs: factor(a, b),
        rhs: factor(b, a),
    };
    Ok(record(out, backward, &[a, b]))
}

/// Element-wise division. Division by zero follows IEEE-754.
pub fn div(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let out = array::binary_op_broadcast(&a.data(), &b.data(), |x, y| x / y)?;
    if !any_requires_grad(&[a, b]) {
        return Ok(Tensor::constant(out));
    }
    let backward = Backward::Div {
        lhs: tracked_shape(a),
        rhs: b.requires_grad().then(|| Factor {
            shape: b.shape(),
            other: a.to_array(),
        }),
        denominator: b.to_array(),
    };
    Ok(record(out, backward, &[a, b]))
}

/// Matrix product of two 2-D tensors.
pub fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let out = array::matmul(&a.data(), &b.data())?;
    if !any_requires_grad(&[a, b]) {
        return Ok(Tensor::constant(out));
    }
    let backward = Backward::MatMul {
        rhs_t: a.requires_grad().then(|| array::transpose(&b.data())),
        lhs_t: b.requires_grad().then(|| array::transpose(&a.data())),
    };
    Ok(record(out, backward, &[a, b]))
}

pub fn neg(a: &Tensor) -> Tensor {
    let out = a.data().mapv(|x| -x);
    if !a.requires_grad() {
        return Tensor::constant(out);
    }
    record(out, Backward::Neg, &[a])
}

/// Element-wise `a^exponent` with a constant exponent.
pub fn pow(a: &Tensor, exponent: f64) -> Tensor {
    let out = a.data().mapv(|x| x.powf(exponent));
    if !a.requires_grad() {
        return Tensor::constant(out);
    }
    let backward = Backward::Pow {
        base: a.to_array(),
        exponent,
    };
    record(out, backward, &[a])
}

pub fn exp(a: &Tensor) -> Tensor {
    let out = a.data().mapv(f64::exp);
    if !a.requires_grad() {
        return Tensor::constant(out);
    }
    let backward = Backward::Exp {
        output: out.clone(),
    };
    record(out, backward, &[a])
}

pub fn relu(a: &Tensor) -> Tensor {
    let out = a.data().mapv(|x| x.max(0.0));
    if !a.requires_grad() {
        return Tensor::constant(out);
    }
    let backward = Backward::Relu {
        input: a.to_array(),
    };
    record(out, backward, &[a])
}

pub fn sum(a: &Tensor, axes: Option<&[usize]>, keepdims: bool) -> Result<Tensor> {
    let input_shape = a.shape();
    let axes = input_shape.normalize_axes(axes)?;
    let out = array::sum_axes(&a.data(), &axes, keepdims);
    if !a.requires_grad() {
        return Ok(Tensor::constant(out));
    }
    Ok(record(out, Backward::Sum { input_shape, axes }, &[a]))
}

pub fn mean(a: &Tensor, axes: Option<&[usize]>, keepdims: bool) -> Result<Tensor> {
    let input_shape = a.shape();
    let axes = input_shape.normalize_axes(axes)?;
    let count: usize = axes.iter().map(|&ax| input_shape.dim(ax)).product();
    let out = array::sum_axes(&a.data(), &axes, keepdims).mapv(|x| x / count as f64);
    if !a.requires_grad() {
        return Ok(Tensor::constant(out));
    }
    Ok(record(out, Backward::Mean { input_shape, axes }, &[a]))
}

/// Reverse all axes.
pub fn transpose(a: &Tensor) -> Tensor {
    let out = array::transpose(&a.data());
    if !a.requires_grad() {
        return Tensor::constant(out);
    }
    record(out, Backward::Transpose, &[a])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_skip_constants() {
        let a = Tensor::new(1.0, true);
        let b = Tensor::new(2.0, false);
        let c = Tensor::new(3.0, true);
        let edges = collect_next_edges(&[&a, &b, &c]);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.node().is_accumulate_grad()));
    }

    #[test]
    fn test_edges_reuse_leaf_node() {
        let a = Tensor::new(1.0, true);
        let first = collect_next_edges(&[&a]);
        let second = collect_next_edges(&[&a]);
        assert!(std::rc::Rc::ptr_eq(first[0].node(), second[0].node()));
    }

    #[test]
    fn test_node_records_one_edge_per_tracked_operand() {
        let a = Tensor::new([1.0, 2.0], true);
        let b = Tensor::new([3.0, 4.0], false);
        let c = mul(&a, &b).unwrap();
        let node = c.grad_fn().unwrap();
        assert_eq!(node.name(), "MulBackward");
        assert_eq!(node.next_edges().len(), 1);
    }

    #[test]
    fn test_forward_values() {
        let a = Tensor::new([[1.0, 2.0], [3.0, 4.0]], false);
        assert_eq!(sum(&a, None, false).unwrap().item().unwrap(), 10.0);
        assert_eq!(mean(&a, Some(&[0]), false).unwrap().to_vec(), vec![2.0, 3.0]);
        assert_eq!(
            mean(&a, Some(&[1]), true).unwrap().shape().dims(),
            &[2, 1]
        );
        assert_eq!(transpose(&a).to_vec(), vec![1.0, 3.0, 2.0, 4.0]);
        assert_eq!(pow(&a, 2.0).to_vec(), vec![1.0, 4.0, 9.0, 16.0]);
        assert_eq!(neg(&a).to_vec(), vec![-1.0, -2.0, -3.0, -4.0]);
        assert_eq!(relu(&neg(&a)).to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_div_by_zero_is_ieee() {
        let a = Tensor::new([1.0, -1.0, 0.0], false);
        let out = div(&a, &Tensor::scalar(0.0)).unwrap().to_vec();
        assert_eq!(out[0], f64::INFINITY);
        assert_eq!(out[1], f64::NEG_INFINITY);
        assert!(out[2].is_nan());
    }

    #[test]
    fn test_matmul_shape() {
        let a = Tensor::new([[1.0, 2.0, 3.0]], false);
        let b = Tensor::new([[1.0], [1.0], [1.0]], false);
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c.shape().dims(), &[1, 1]);
        assert_eq!(c.item().unwrap(), 6.0);
    }
}
