//! Datasets, samplers and batched loading.

mod dataloader;
mod dataset;
mod sampler;

pub use dataloader::{collate, DataLoader};
pub use dataset::{Dataset, TensorDataset};
pub use sampler::{BatchSampler, Sampler, SequentialSampler};
