//! Mini-batch iteration over a dataset.

use ag_tensor::prelude::*;
use ag_tensor::Array;
use ndarray::Axis;

use super::dataset::Dataset;
use super::sampler::{BatchSampler, Sampler, SequentialSampler};

/// Iterates a [`Dataset`] in batches chosen by a [`BatchSampler`].
pub struct DataLoader<'a, D, S = SequentialSampler> {
    dataset: &'a D,
    batch_sampler: BatchSampler<S>,
}

impl<'a, D: Dataset> DataLoader<'a, D, SequentialSampler> {
    /// Sequential batches of `batch_size` samples.
    pub fn new(dataset: &'a D, batch_size: usize, drop_last: bool) -> Result<Self> {
        let sampler = SequentialSampler::new(dataset.len());
        Ok(DataLoader {
            dataset,
            batch_sampler: BatchSampler::new(sampler, batch_size, drop_last)?,
        })
    }
}

impl<'a, D: Dataset, S: Sampler> DataLoader<'a, D, S> {
    pub fn with_batch_sampler(dataset: &'a D, batch_sampler: BatchSampler<S>) -> Self {
        DataLoader {
            dataset,
            batch_sampler,
        }
    }

    /// Number of batches per pass.
    pub fn len(&self) -> usize {
        self.batch_sampler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch_sampler.is_empty()
    }

    /// One pass over the dataset. Indices the dataset does not hold are skipped.
    pub fn iter(&self) -> impl Iterator<Item = Vec<D::Item>> + '_ {
        self.batch_sampler
            .batches()
            .into_iter()
            .map(move |batch| batch.into_iter().filter_map(|i| self.dataset.get(i)).collect())
    }
}

/// Stack equally shaped samples along a new leading axis into one
/// non-trainable tensor. 1-D samples become rows of a matrix; scalar samples
/// become a column.
pub fn collate(samples: &[Array]) -> Result<Tensor> {
    let rows: Vec<Array> = samples
        .iter()
        .map(|s| match s.ndim() {
            0 => s.clone().insert_axis(Axis(0)),
            _ => s.clone(),
        })
        .collect();
    let views: Vec<_> = rows.iter().map(|r| r.view()).collect();
    let stacked = ndarray::stack(Axis(0), &views)
        .map_err(|e| Error::Shape(format!("cannot collate samples: {}", e)))?;
    Ok(Tensor::new(stacked, false))
}
