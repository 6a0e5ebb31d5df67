//! Dense `f64` array kernels used by the forward ops and the backward rules.
//!
//! Everything here works on plain [`ndarray::ArrayD`] values; no graph
//! bookkeeping happens at this level.

use ndarray::{ArrayD, ArrayViewD, Axis, Ix2, IxDyn, Zip};

use crate::error::{Error, Result};
use crate::shape::Shape;

/// Dense storage for tensor data and gradients.
pub type Array = ArrayD<f64>;

/// Shape of an array as a [`Shape`].
pub fn shape_of(a: &Array) -> Shape {
    Shape::from(a.shape())
}

/// 0-dimensional array holding `value`.
pub fn scalar(value: f64) -> Array {
    ArrayD::from_elem(IxDyn(&[]), value)
}

/// Element-wise binary op with NumPy broadcasting.
pub fn binary_op_broadcast<F>(a: &Array, b: &Array, op: F) -> Result<Array>
where
    F: Fn(f64, f64) -> f64,
{
    let out_shape = shape_of(a).broadcast_or_err(&shape_of(b))?;
    let a_view = broadcast_view(a, &out_shape)?;
    let b_view = broadcast_view(b, &out_shape)?;
    Ok(Zip::from(a_view)
        .and(b_view)
        .map_collect(|&x, &y| op(x, y)))
}

fn broadcast_view<'a>(a: &'a Array, shape: &Shape) -> Result<ArrayViewD<'a, f64>> {
    a.broadcast(IxDyn(shape.dims())).ok_or_else(|| {
        Error::shape(format!(
            "cannot broadcast array of shape {} to {}",
            shape_of(a),
            shape
        ))
    })
}

/// Materialize `a` broadcast up to `shape`.
pub fn broadcast_to(a: &Array, shape: &Shape) -> Result<Array> {
    Ok(broadcast_view(a, shape)?.to_owned())
}

/// Reinterpret the elements of `a` (in logical order) under a new shape.
pub fn reshape(a: &Array, shape: &Shape) -> Result<Array> {
    ArrayD::from_shape_vec(IxDyn(shape.dims()), a.iter().copied().collect()).map_err(|_| {
        Error::shape(format!(
            "cannot reshape array of shape {} into shape {}",
            shape_of(a),
            shape
        ))
    })
}

/// Sum over `axes` (sorted ascending, no duplicates).
pub fn sum_axes(a: &Array, axes: &[usize], keepdims: bool) -> Array {
    let mut out = a.clone();
    for &ax in axes.iter().rev() {
        out = out.sum_axis(Axis(ax));
    }
    if keepdims {
        for &ax in axes {
            out = out.insert_axis(Axis(ax));
        }
    }
    out
}

/// Reverse NumPy broadcasting: sum `grad` down to `target`.
///
/// Leading axes that `target` lacks are summed away; axes where `target` has
/// size 1 are summed with the dimension kept.
pub fn unbroadcast(grad: Array, target: &Shape) -> Result<Array> {
    let grad_shape = shape_of(&grad);
    if grad_shape == *target {
        return Ok(grad);
    }
    if target.ndim() > grad_shape.ndim() {
        return Err(Error::shape(format!(
            "cannot reduce gradient of shape {} to larger rank shape {}",
            grad_shape, target
        )));
    }

    let offset = grad_shape.ndim() - target.ndim();
    let mut out = grad;
    for &ax in target.reduction_axes_from(&grad_shape).iter().rev() {
        out = out.sum_axis(Axis(ax));
        if ax >= offset {
            out = out.insert_axis(Axis(ax));
        }
    }

    if shape_of(&out) != *target {
        return Err(Error::shape(format!(
            "gradient of shape {} is not a broadcast of {}",
            grad_shape, target
        )));
    }
    Ok(out)
}

/// Spread a reduced gradient back over `input_shape` along `axes`.
pub fn expand_reduced(grad: &Array, input_shape: &Shape, axes: &[usize]) -> Result<Array> {
    let kept = input_shape.reduced(axes, true);
    let grad = reshape(grad, &kept)?;
    broadcast_to(&grad, input_shape)
}

/// Matrix product of two 2-D arrays.
pub fn matmul(a: &Array, b: &Array) -> Result<Array> {
    let lhs = as_matrix(a)?;
    let rhs = as_matrix(b)?;
    if lhs.ncols() != rhs.nrows() {
        return Err(Error::shape(format!(
            "matmul: inner dimensions differ, {} @ {}",
            shape_of(a),
            shape_of(b)
        )));
    }
    Ok(lhs.dot(&rhs).into_dyn())
}

fn as_matrix(a: &Array) -> Result<ndarray::ArrayView2<'_, f64>> {
    a.view().into_dimensionality::<Ix2>().map_err(|_| {
        Error::shape(format!(
            "matmul expects 2-D operands, got shape {}",
            shape_of(a)
        ))
    })
}

/// Reverse all axes, returning a standard-layout copy.
pub fn transpose(a: &Array) -> Array {
    a.t().as_standard_layout().into_owned()
}

/// `dst += src` for arrays of identical shape.
pub fn accumulate_into(dst: &mut Array, src: &Array) -> Result<()> {
    if dst.shape() != src.shape() {
        return Err(Error::shape(format!(
            "cannot accumulate gradient of shape {} into shape {}",
            shape_of(src),
            shape_of(dst)
        )));
    }
    *dst += src;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_binary_broadcasting() {
        let a = arr2(&[[1.0, 2.0], [3.0, 4.0]]).into_dyn();
        let b = arr1(&[10.0, 20.0]).into_dyn();
        let c = binary_op_broadcast(&a, &b, |x, y| x + y).unwrap();
        assert_eq!(c, arr2(&[[11.0, 22.0], [13.0, 24.0]]).into_dyn());

        let s = scalar(2.0);
        let d = binary_op_broadcast(&a, &s, |x, y| x * y).unwrap();
        assert_eq!(d, arr2(&[[2.0, 4.0], [6.0, 8.0]]).into_dyn());
    }

    #[test]
    fn test_binary_incompatible_shapes() {
        let a = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        let b = arr1(&[1.0, 2.0]).into_dyn();
        assert!(matches!(
            binary_op_broadcast(&a, &b, |x, y| x + y),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn test_sum_axes() {
        let a = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn();
        assert_eq!(sum_axes(&a, &[0], false), arr1(&[5.0, 7.0, 9.0]).into_dyn());
        assert_eq!(sum_axes(&a, &[1], true), arr2(&[[6.0], [15.0]]).into_dyn());
        assert_eq!(sum_axes(&a, &[0, 1], false), scalar(21.0));
    }

    #[test]
    fn test_unbroadcast_leading_and_kept_axes() {
        let grad = ArrayD::from_elem(IxDyn(&[2, 3, 4]), 1.0);

        let to_row = unbroadcast(grad.clone(), &Shape::new(vec![4])).unwrap();
        assert_eq!(to_row, ArrayD::from_elem(IxDyn(&[4]), 6.0));

        let to_col = unbroadcast(grad.clone(), &Shape::new(vec![3, 1])).unwrap();
        assert_eq!(to_col, ArrayD::from_elem(IxDyn(&[3, 1]), 8.0));

        let to_scalar = unbroadcast(grad, &Shape::scalar()).unwrap();
        assert_eq!(to_scalar, scalar(24.0));
    }

    #[test]
    fn test_unbroadcast_identity() {
        let grad = arr1(&[1.0, 2.0]).into_dyn();
        let out = unbroadcast(grad.clone(), &Shape::new(vec![2])).unwrap();
        assert_eq!(out, grad);
    }

    #[test]
    fn test_unbroadcast_rejects_unrelated_shape() {
        let grad = arr1(&[1.0, 2.0, 3.0]).into_dyn();
        assert!(unbroadcast(grad, &Shape::new(vec![2])).is_err());
    }

    #[test]
    fn test_expand_reduced() {
        let grad = arr1(&[1.0, 2.0]).into_dyn();
        let out = expand_reduced(&grad, &Shape::new(vec![2, 3]), &[1]).unwrap();
        assert_eq!(out, arr2(&[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]).into_dyn());
    }

    #[test]
    fn test_matmul() {
        let a = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn();
        let b = arr2(&[[1.0, 0.0], [0.0, 2.0]]).into_dyn();
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c, arr2(&[[1.0, 4.0], [3.0, 8.0], [5.0, 12.0]]).into_dyn());

        assert!(matmul(&b, &a).is_err());
        assert!(matmul(&arr1(&[1.0, 2.0]).into_dyn(), &b).is_err());
    }

    #[test]
    fn test_transpose() {
        let a = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn();
        let t = transpose(&a);
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.iter().copied().collect::<Vec<_>>(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_accumulate_into() {
        let mut dst = arr1(&[1.0, 2.0]).into_dyn();
        accumulate_into(&mut dst, &arr1(&[0.5, 0.5]).into_dyn()).unwrap();
        assert_eq!(dst, arr1(&[1.5, 2.5]).into_dyn());
        assert!(accumulate_into(&mut dst, &scalar(1.0)).is_err());
    }
}
