//! The [`Tensor`] handle: data, gradient slot and link to the producing node.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use ndarray::{Array1, Array2, ArrayBase, ArrayD, ArrayViewMutD, Data, Dimension, IxDyn};

use crate::array::{self, Array};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::functional;
use crate::node::{Node, NodeRef};
use crate::shape::Shape;

/// Values that can be turned into tensor data.
pub trait TensorData {
    fn into_array(self) -> Array;
}

impl TensorData for f64 {
    fn into_array(self) -> Array {
        array::scalar(self)
    }
}

impl TensorData for Vec<f64> {
    fn into_array(self) -> Array {
        Array1::from(self).into_dyn()
    }
}

impl TensorData for &[f64] {
    fn into_array(self) -> Array {
        Array1::from(self.to_vec()).into_dyn()
    }
}

impl<const N: usize> TensorData for [f64; N] {
    fn into_array(self) -> Array {
        Array1::from(self.to_vec()).into_dyn()
    }
}

impl<const N: usize, const M: usize> TensorData for [[f64; N]; M] {
    fn into_array(self) -> Array {
        Array2::from_shape_fn((M, N), |(i, j)| self[i][j]).into_dyn()
    }
}

impl<S, D> TensorData for ArrayBase<S, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    fn into_array(self) -> Array {
        self.to_owned().into_dyn()
    }
}

pub(crate) struct TensorInner {
    data: RefCell<Array>,
    requires_grad: bool,
    grad: RefCell<Option<Tensor>>,
    grad_fn: RefCell<Option<NodeRef>>,
}

/// A dense `f64` tensor that can take part in reverse-mode differentiation.
///
/// `Tensor` is a reference-counted handle: cloning it is O(1) and the clone
/// shares the same data, gradient slot and graph link. Operations never
/// mutate their operands; they return new tensors, and when any operand has
/// `requires_grad` set the result records a backward [`Node`].
#[derive(Clone)]
pub struct Tensor(Rc<TensorInner>);

impl Tensor {
    fn build(data: Array, requires_grad: bool, grad_fn: Option<NodeRef>) -> Self {
        Tensor(Rc::new(TensorInner {
            data: RefCell::new(data),
            requires_grad,
            grad: RefCell::new(None),
            grad_fn: RefCell::new(grad_fn),
        }))
    }

    pub(crate) fn from_inner(inner: Rc<TensorInner>) -> Self {
        Tensor(inner)
    }

    /// Result of an op whose operands did not require gradients.
    pub(crate) fn constant(data: Array) -> Self {
        Self::build(data, false, None)
    }

    /// Result of a tracked op, produced by `node`.
    pub(crate) fn from_node(data: Array, node: NodeRef) -> Self {
        tracing::trace!(
            node = node.name(),
            edges = node.next_edges().len(),
            shape = ?data.shape(),
            "recorded backward node"
        );
        Self::build(data, true, Some(node))
    }

    // === Constructors ===

    /// Create a tensor from a scalar, an array, a nested array or an
    /// `ndarray` array.
    pub fn new(data: impl TensorData, requires_grad: bool) -> Self {
        Self::build(data.into_array(), requires_grad, None)
    }

    /// Create a tensor from flat data in row-major order.
    pub fn from_shape_vec(shape: &[usize], data: Vec<f64>, requires_grad: bool) -> Result<Self> {
        let len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            Error::Shape(format!(
                "data of length {} does not fit shape {}",
                len,
                Shape::from(shape)
            ))
        })?;
        Ok(Self::new(array, requires_grad))
    }

    /// Non-trainable scalar tensor.
    pub fn scalar(value: f64) -> Self {
        Self::new(value, false)
    }

    /// Non-trainable tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::constant(ArrayD::zeros(IxDyn(shape)))
    }

    /// Non-trainable tensor of ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::constant(ArrayD::ones(IxDyn(shape)))
    }

    // === Accessors ===

    /// Borrow the tensor data.
    ///
    /// # Panics
    ///
    /// Panics if the data is currently borrowed through [`Tensor::update_data`].
    pub fn data(&self) -> Ref<'_, Array> {
        self.0.data.borrow()
    }

    /// Mutably borrow the tensor data, e.g. for an optimizer update.
    ///
    /// # Panics
    ///
    /// Panics if the data is already borrowed.
    pub fn data_mut(&self) -> RefMut<'_, Array> {
        self.0.data.borrow_mut()
    }

    /// Copy of the tensor data.
    pub fn to_array(&self) -> Array {
        self.data().clone()
    }

    /// Tensor data flattened in row-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data().iter().copied().collect()
    }

    /// Mutate the data in place. The shape cannot change.
    ///
    /// Nodes hold their own copies of forward data, so updates here do not
    /// affect a backward pass over an already-recorded graph.
    pub fn update_data<F>(&self, f: F)
    where
        F: FnOnce(ArrayViewMutD<'_, f64>),
    {
        let mut data = self.0.data.borrow_mut();
        f(data.view_mut());
    }

    pub fn shape(&self) -> Shape {
        Shape::from(self.data().shape())
    }

    pub fn ndim(&self) -> usize {
        self.data().ndim()
    }

    pub fn numel(&self) -> usize {
        self.data().len()
    }

    /// Value of a single-element tensor.
    pub fn item(&self) -> Result<f64> {
        let data = self.data();
        match data.len() {
            1 => Ok(data.iter().copied().sum()),
            n => Err(Error::InvalidState(format!(
                "only one element tensors can be converted to a scalar, got {} elements",
                n
            ))),
        }
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// Accumulated gradient, `None` until a backward pass reaches this tensor.
    pub fn grad(&self) -> Option<Tensor> {
        self.0.grad.borrow().clone()
    }

    /// The node that produced this tensor, or the `AccumulateGrad` node
    /// attached to a leaf once it has been used by a tracked op.
    pub fn grad_fn(&self) -> Option<NodeRef> {
        self.0.grad_fn.borrow().clone()
    }

    /// True if this tensor was not produced by a tracked op.
    pub fn is_leaf(&self) -> bool {
        self.0
            .grad_fn
            .borrow()
            .as_ref()
            .map_or(true, |node| node.is_accumulate_grad())
    }

    /// Whether two handles refer to the same tensor.
    pub fn ptr_eq(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // === Gradient slot ===

    /// Clear the accumulated gradient.
    pub fn zero_grad(&self) {
        self.0.grad.borrow_mut().take();
    }

    /// Add `grad` into the gradient slot, creating it on first use.
    pub(crate) fn accumulate_grad(&self, grad: Array) -> Result<()> {
        if grad.shape() != self.data().shape() {
            return Err(Error::Shape(format!(
                "gradient of shape {} does not match tensor of shape {}",
                array::shape_of(&grad),
                self.shape()
            )));
        }

        let mut slot = self.0.grad.borrow_mut();
        match slot.as_ref() {
            None => *slot = Some(Tensor::constant(grad)),
            Some(existing) => array::accumulate_into(&mut existing.0.data.borrow_mut(), &grad)?,
        }
        Ok(())
    }

    /// The node gradients for this tensor should flow into. Leaves get an
    /// `AccumulateGrad` node attached on first call.
    pub(crate) fn ensure_grad_fn(&self) -> NodeRef {
        let mut grad_fn = self.0.grad_fn.borrow_mut();
        grad_fn
            .get_or_insert_with(|| Node::accumulate_grad(Rc::downgrade(&self.0)))
            .clone()
    }

    // === Backward ===

    /// Compute gradients of this tensor with respect to every leaf that
    /// requires them, accumulating into their `grad` slots.
    ///
    /// `seed` is the gradient of some downstream scalar with respect to this
    /// tensor. It may be omitted only for scalar tensors (it defaults to 1.0)
    /// and must otherwise broadcast to this tensor's shape.
    pub fn backward(&self, seed: Option<&Tensor>) -> Result<()> {
        if !self.requires_grad() {
            return Err(Error::InvalidState(
                "tensor does not require grad and does not have a grad_fn".to_string(),
            ));
        }

        let shape = self.shape();
        let seed = match seed {
            Some(seed) => {
                let seed_shape = seed.shape();
                if seed_shape.broadcast_with(&shape).as_ref() != Some(&shape) {
                    return Err(Error::Shape(format!(
                        "seed gradient of shape {} does not match output of shape {}",
                        seed_shape, shape
                    )));
                }
                array::broadcast_to(&seed.data(), &shape)?
            }
            None if shape.is_scalar() => array::scalar(1.0),
            None => {
                return Err(Error::Shape(
                    "gradient can be implicitly created only for scalar outputs".to_string(),
                ))
            }
        };

        let root = self.ensure_grad_fn();
        Engine::new().execute(&root, seed)
    }

    // === Operations ===

    pub fn add(&self, rhs: impl Into<Tensor>) -> Result<Tensor> {
        functional::add(self, &rhs.into())
    }

    pub fn sub(&self, rhs: impl Into<Tensor>) -> Result<Tensor> {
        functional::sub(self, &rhs.into())
    }

    pub fn mul(&self, rhs: impl Into<Tensor>) -> Result<Tensor> {
        functional::mul(self, &rhs.into())
    }

    pub fn div(&self, rhs: impl Into<Tensor>) -> Result<Tensor> {
        functional::div(self, &rhs.into())
    }

    /// Matrix product of two 2-D tensors.
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        functional::matmul(self, rhs)
    }

    pub fn neg(&self) -> Tensor {
        functional::neg(self)
    }

    /// Element-wise power with a constant exponent.
    pub fn pow(&self, exponent: f64) -> Tensor {
        functional::pow(self, exponent)
    }

    pub fn exp(&self) -> Tensor {
        functional::exp(self)
    }

    pub fn relu(&self) -> Tensor {
        functional::relu(self)
    }

    /// Sum over `axes` (`None` = all axes).
    pub fn sum(&self, axes: Option<&[usize]>, keepdims: bool) -> Result<Tensor> {
        functional::sum(self, axes, keepdims)
    }

    /// Mean over `axes` (`None` = all axes).
    pub fn mean(&self, axes: Option<&[usize]>, keepdims: bool) -> Result<Tensor> {
        functional::mean(self, axes, keepdims)
    }

    /// Reverse all axes.
    pub fn transpose(&self) -> Tensor {
        functional::transpose(self)
    }

    /// Shorthand for [`Tensor::transpose`].
    pub fn t(&self) -> Tensor {
        self.transpose()
    }
}

impl From<f64> for Tensor {
    fn from(value: f64) -> Self {
        Tensor::scalar(value)
    }
}

impl From<&Tensor> for Tensor {
    fn from(t: &Tensor) -> Self {
        t.clone()
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor({}, requires_grad={})",
            self.data(),
            if self.requires_grad() { "True" } else { "False" }
        )
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad())
            .field("grad_fn", &self.grad_fn().map(|node| node.name()))
            .finish()
    }
}

// === Operator overloads ===
//
// The operators panic where the named methods return an error, the same
// convention ndarray uses for arithmetic on incompatible shapes.

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $func:path) => {
        impl std::ops::$trait<&Tensor> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                $func(self, rhs).unwrap_or_else(|e| panic!("{}", e))
            }
        }

        impl std::ops::$trait<Tensor> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                std::ops::$trait::$method(self, &rhs)
            }
        }

        impl std::ops::$trait<&Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                std::ops::$trait::$method(&self, rhs)
            }
        }

        impl std::ops::$trait<Tensor> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                std::ops::$trait::$method(&self, &rhs)
            }
        }

        impl std::ops::$trait<f64> for &Tensor {
            type Output = Tensor;
            fn $method(self, rhs: f64) -> Tensor {
                std::ops::$trait::$method(self, &Tensor::scalar(rhs))
            }
        }

        impl std::ops::$trait<f64> for Tensor {
            type Output = Tensor;
            fn $method(self, rhs: f64) -> Tensor {
                std::ops::$trait::$method(&self, &Tensor::scalar(rhs))
            }
        }

        impl std::ops::$trait<&Tensor> for f64 {
            type Output = Tensor;
            fn $method(self, rhs: &Tensor) -> Tensor {
                std::ops::$trait::$method(&Tensor::scalar(self), rhs)
            }
        }

        impl std::ops::$trait<Tensor> for f64 {
            type Output = Tensor;
            fn $method(self, rhs: Tensor) -> Tensor {
                std::ops::$trait::$method(&Tensor::scalar(self), &rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, functional::add);
impl_binary_op!(Sub, sub, functional::sub);
impl_binary_op!(Mul, mul, functional::mul);
impl_binary_op!(Div, div, functional::div);

// === In-place updates ===
//
// `+=` and `-=` rewrite the data of the left handle without recording a
// node, so they never appear in a backward pass. The right side broadcasts
// to the left shape; anything else panics.

impl Tensor {
    fn apply_in_place<F>(&self, rhs: &Tensor, op: F) -> Result<()>
    where
        F: Fn(&mut f64, f64),
    {
        // Copy first so `t += &t` does not alias the RefCell.
        let rhs = rhs.to_array();
        let shape = self.shape();
        let rhs_shape = array::shape_of(&rhs);
        if rhs_shape.broadcast_with(&shape).as_ref() != Some(&shape) {
            return Err(Error::Shape(format!(
                "in-place update of shape {} cannot take an operand of shape {}",
                shape, rhs_shape
            )));
        }
        let rhs = array::broadcast_to(&rhs, &shape)?;
        ndarray::Zip::from(&mut *self.data_mut())
            .and(&rhs)
            .for_each(|x, &y| op(x, y));
        Ok(())
    }
}

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&Tensor> for Tensor {
            fn $method(&mut self, rhs: &Tensor) {
                self.apply_in_place(rhs, $op)
                    .unwrap_or_else(|e| panic!("{}", e));
            }
        }

        impl std::ops::$trait<f64> for Tensor {
            fn $method(&mut self, rhs: f64) {
                std::ops::$trait::$method(self, &Tensor::scalar(rhs));
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, |x: &mut f64, y: f64| *x += y);
impl_assign_op!(SubAssign, sub_assign, |x: &mut f64, y: f64| *x -= y);

impl std::ops::Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        functional::neg(self)
    }
}

impl std::ops::Neg for Tensor {
    type Output = Tensor;
    fn neg(self) -> Tensor {
        functional::neg(&self)
    }
}
