//! Indexed collections of samples.

use ag_tensor::prelude::*;
use ag_tensor::Array;
use ndarray::Axis;

/// A map from indices `0..len()` to samples.
pub trait Dataset {
    type Item;

    fn len(&self) -> usize;

    /// Sample at `index`, or `None` if it is out of range.
    fn get(&self, index: usize) -> Option<Self::Item>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Dataset for Vec<T> {
    type Item = T;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<T> {
        self.as_slice().get(index).cloned()
    }
}

/// Paired inputs and targets sliced along their first axis.
#[derive(Debug, Clone)]
pub struct TensorDataset {
    inputs: Array,
    targets: Array,
}

impl TensorDataset {
    /// Both arrays must have at least one axis and the same length along it.
    pub fn new(inputs: Array, targets: Array) -> Result<Self> {
        let n_inputs = inputs.shape().first().copied();
        let n_targets = targets.shape().first().copied();
        match (n_inputs, n_targets) {
            (Some(a), Some(b)) if a == b => Ok(TensorDataset { inputs, targets }),
            _ => Err(Error::Shape(format!(
                "inputs of shape {:?} and targets of shape {:?} differ in sample count",
                inputs.shape(),
                targets.shape()
            ))),
        }
    }
}

impl Dataset for TensorDataset {
    type Item = (Array, Array);

    fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    fn get(&self, index: usize) -> Option<(Array, Array)> {
        if index >= self.len() {
            return None;
        }
        Some((
            self.inputs.index_axis(Axis(0), index).to_owned(),
            self.targets.index_axis(Axis(0), index).to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_vec_dataset() {
        let ds = vec![10, 20, 30];
        assert_eq!(Dataset::len(&ds), 3);
        assert_eq!(Dataset::get(&ds, 1), Some(20));
        assert_eq!(Dataset::get(&ds, 3), None);
    }

    #[test]
    fn test_tensor_dataset_rows() {
        let ds = TensorDataset::new(
            arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn(),
            arr1(&[1.0, 2.0, 3.0]).into_dyn(),
        )
        .unwrap();
        assert_eq!(ds.len(), 3);
        let (x, y) = ds.get(1).unwrap();
        assert_eq!(x, arr1(&[3.0, 4.0]).into_dyn());
        assert_eq!(y.shape(), &[] as &[usize]);
        assert!(ds.get(3).is_none());
    }

    #[test]
    fn test_tensor_dataset_length_mismatch() {
        let res = TensorDataset::new(
            arr2(&[[1.0], [2.0]]).into_dyn(),
            arr1(&[1.0, 2.0, 3.0]).into_dyn(),
        );
        assert!(matches!(res, Err(Error::Shape(_))));
    }
}
