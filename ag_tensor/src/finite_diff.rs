//! Central-difference gradients for checking the backward engine.
//!
//! `ag gradcheck` and the test suites compare [`analytic_grad`] against
//! [`numerical_grad`] through [`gradcheck`].

use crate::array::Array;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Central-difference gradient of `f` at `point`:
/// `(f(x + eps e_i) - f(x - eps e_i)) / 2 eps` for every coordinate `i`.
///
/// ```
/// use ag_tensor::finite_diff::central_difference;
///
/// // f(a, b) = a * b^2, so df/da = b^2 and df/db = 2ab
/// let grad = central_difference(|p| p[0] * p[1] * p[1], &[2.0, 3.0], 1e-6);
/// assert!((grad[0] - 9.0).abs() < 1e-5);
/// assert!((grad[1] - 12.0).abs() < 1e-5);
/// ```
pub fn central_difference<F>(f: F, point: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    try_central_difference(|p| Ok(f(p)), point, eps).unwrap_or_default()
}

fn try_central_difference<F>(f: F, point: &[f64], eps: f64) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    let mut shifted = point.to_vec();
    let mut grad = Vec::with_capacity(point.len());
    for (i, &x) in point.iter().enumerate() {
        shifted[i] = x + eps;
        let up = f(&shifted)?;
        shifted[i] = x - eps;
        let down = f(&shifted)?;
        shifted[i] = x;
        grad.push((up - down) / (2.0 * eps));
    }
    Ok(grad)
}

/// Largest element-wise `|a - b|`. Extra elements of the longer slice are
/// ignored.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).fold(0.0, |worst, (x, y)| worst.max((x - y).abs()))
}

fn scalar_output(out: &Tensor) -> Result<f64> {
    out.item().map_err(|_| {
        Error::Shape(format!(
            "gradient check needs a scalar output, got shape {}",
            out.shape()
        ))
    })
}

fn flatten(arrays: &[Array]) -> Vec<f64> {
    arrays.iter().flat_map(|a| a.iter().copied()).collect()
}

/// Rebuild arrays shaped like `like` from the flat values in `flat`.
fn unflatten(flat: &[f64], like: &[Array]) -> Vec<Array> {
    let mut offset = 0;
    like.iter()
        .map(|a| {
            let mut out = a.clone();
            for (dst, &src) in out.iter_mut().zip(&flat[offset..]) {
                *dst = src;
            }
            offset += a.len();
            out
        })
        .collect()
}

/// Numerical gradient of a scalar-valued tensor function with respect to
/// each of `inputs`.
///
/// `f` only ever sees constant tensors here, so no graph is recorded.
pub fn numerical_grad<F>(f: F, inputs: &[Array], eps: f64) -> Result<Vec<Array>>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    let eval = |flat: &[f64]| -> Result<f64> {
        let tensors: Vec<Tensor> = unflatten(flat, inputs)
            .into_iter()
            .map(|a| Tensor::new(a, false))
            .collect();
        scalar_output(&f(&tensors)?)
    };
    let grad = try_central_difference(eval, &flatten(inputs), eps)?;
    Ok(unflatten(&grad, inputs))
}

/// Gradients of `f` at `inputs` from a backward pass. Inputs the output does
/// not depend on get a zero gradient.
pub fn analytic_grad<F>(f: F, inputs: &[Array]) -> Result<Vec<Array>>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    let tensors: Vec<Tensor> = inputs.iter().map(|a| Tensor::new(a.clone(), true)).collect();
    let out = f(&tensors)?;
    scalar_output(&out)?;
    out.backward(None)?;
    Ok(tensors
        .iter()
        .map(|t| match t.grad() {
            Some(g) => g.to_array(),
            None => Array::zeros(t.data().raw_dim()),
        })
        .collect())
}

/// Largest absolute difference between the analytic and numerical
/// gradients of `f`, over every element of every input.
pub fn gradcheck<F>(f: F, inputs: &[Array], eps: f64) -> Result<f64>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    let analytic = analytic_grad(&f, inputs)?;
    let numerical = numerical_grad(&f, inputs, eps)?;
    Ok(max_abs_diff(&flatten(&analytic), &flatten(&numerical)))
}
