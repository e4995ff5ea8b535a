use serde::{Deserialize, Serialize};

use crate::{PreglyphErr, Result};

/// A single supervised sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
}

/// Random access over a set of samples.
///
/// Datasets are shared with the dataloader's worker threads, so they must be `Send + Sync`.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sample at `idx`, panics if it's out of bounds.
    fn get(&self, idx: usize) -> Sample;
}

/// The params `data.InMemoryDataset` is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InMemoryDatasetConfig {
    pub data: Vec<f32>,
    pub x_size: usize,
    pub y_size: usize,
}

/// A dataset of rows stored contiguously, each row being `x_size` inputs then `y_size`
/// targets.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    data: Vec<f32>,
    x_size: usize,
    y_size: usize,
}

impl InMemoryDataset {
    /// Creates a new `InMemoryDataset`.
    ///
    /// # Arguments
    /// * `data` - The flattened rows.
    /// * `x_size` - Amount of inputs per row.
    /// * `y_size` - Amount of targets per row.
    ///
    /// # Returns
    /// The dataset or an `InvalidConfig` if rows are empty or `data` isn't made of whole
    /// rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let row_size = x_size + y_size;
        if row_size == 0 {
            return Err(PreglyphErr::InvalidConfig(
                "x_size + y_size must be greater than 0".into(),
            ));
        }

        if data.len() % row_size != 0 {
            return Err(PreglyphErr::InvalidConfig(format!(
                "dataset length ({}) is not divisible by x_size + y_size ({row_size})",
                data.len()
            )));
        }

        Ok(Self {
            data,
            x_size,
            y_size,
        })
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    fn row_size(&self) -> usize {
        self.x_size + self.y_size
    }
}

impl TryFrom<InMemoryDatasetConfig> for InMemoryDataset {
    type Error = PreglyphErr;

    fn try_from(value: InMemoryDatasetConfig) -> Result<Self> {
        Self::new(value.data, value.x_size, value.y_size)
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.data.len() / self.row_size()
    }

    fn get(&self, idx: usize) -> Sample {
        let start = idx * self.row_size();
        let row = &self.data[start..start + self.row_size()];
        let (x, y) = row.split_at(self.x_size);

        Sample {
            x: x.to_vec(),
            y: y.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_split_into_x_and_y() {
        let ds = InMemoryDataset::new(vec![0., 1., 2., 3., 4., 5.], 2, 1).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(
            ds.get(1),
            Sample {
                x: vec![3., 4.],
                y: vec![5.]
            }
        );
    }

    #[test]
    fn partial_rows_are_rejected() {
        assert!(InMemoryDataset::new(vec![0.; 5], 1, 1).is_err());
        assert!(InMemoryDataset::new(vec![], 0, 0).is_err());
    }

    #[test]
    fn empty_dataset() {
        let ds = InMemoryDataset::new(vec![], 1, 1).unwrap();
        assert!(ds.is_empty());
    }
}
