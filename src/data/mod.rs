mod csv;
mod dataloader;
mod dataset;

pub use csv::{CsvDatasetConfig, load_csv};
pub use dataloader::{Batch, DataLoader};
pub use dataset::{Dataset, InMemoryDataset, InMemoryDatasetConfig, Sample};
