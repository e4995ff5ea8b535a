use std::{num::NonZeroUsize, ops::Range, sync::Arc};

use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};

use super::{Dataset, Sample};
use crate::{PreglyphErr, Result};

/// A batch of samples, inputs and targets flattened row after row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub xs: Vec<f32>,
    pub ys: Vec<f32>,
    pub len: usize,
}

impl Batch {
    fn from_samples(samples: Vec<Sample>) -> Self {
        let len = samples.len();
        let mut xs = Vec::new();
        let mut ys = Vec::new();

        for Sample { x, y } in samples {
            xs.extend(x);
            ys.extend(y);
        }

        Self { xs, ys, len }
    }
}

/// Iterates a dataset in order, `batch_size` samples at a time.
///
/// The last batch is shorter when the dataset length isn't a multiple of the batch size.
/// With `num_workers > 0` each batch is gathered on a pool of that many threads.
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    batch_size: NonZeroUsize,
    num_workers: usize,
    pool: Option<ThreadPool>,
    cursor: usize,
}

impl DataLoader {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `dataset` - The dataset to iterate.
    /// * `batch_size` - How many samples each batch holds.
    /// * `num_workers` - Threads gathering samples, `0` loads on the calling thread.
    ///
    /// # Returns
    /// The dataloader or an `InvalidConfig` if the worker pool can't be spawned.
    pub fn new(
        dataset: Arc<dyn Dataset>,
        batch_size: NonZeroUsize,
        num_workers: usize,
    ) -> Result<Self> {
        let pool = match num_workers {
            0 => None,
            n => Some(
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("dataloader-{i}"))
                    .build()
                    .map_err(|e| PreglyphErr::InvalidConfig(format!("dataloader workers: {e}")))?,
            ),
        };

        Ok(Self {
            dataset,
            batch_size,
            num_workers,
            pool,
            cursor: 0,
        })
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Samples are always visited in dataset order.
    pub fn shuffle(&self) -> bool {
        false
    }

    /// Returns the amount of batches in a full pass.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size.get())
    }

    /// Rewinds to the first batch.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Returns the next batch, or `None` once the dataset is exhausted.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let total = self.dataset.len();
        if self.cursor >= total {
            return None;
        }

        let end = (self.cursor + self.batch_size.get()).min(total);
        let range = self.cursor..end;
        self.cursor = end;

        Some(self.gather(range))
    }

    fn gather(&self, range: Range<usize>) -> Batch {
        let dataset = &self.dataset;
        let samples: Vec<Sample> = match &self.pool {
            Some(pool) => pool.install(|| range.into_par_iter().map(|i| dataset.get(i)).collect()),
            None => range.map(|i| dataset.get(i)).collect(),
        };

        Batch::from_samples(samples)
    }
}

impl Iterator for DataLoader {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryDataset;

    fn dataset(len: usize) -> Arc<dyn Dataset> {
        let data = (0..len).flat_map(|i| [i as f32, i as f32 + 100.]).collect();
        Arc::new(InMemoryDataset::new(data, 1, 1).unwrap())
    }

    fn batch_size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn batches_in_order_with_short_tail() {
        let mut dl = DataLoader::new(dataset(5), batch_size(2), 0).unwrap();
        assert_eq!(dl.num_batches(), 3);

        let b1 = dl.next_batch().unwrap();
        assert_eq!(b1.xs, [0., 1.]);
        assert_eq!(b1.ys, [100., 101.]);

        assert_eq!(dl.next_batch().unwrap().xs, [2., 3.]);

        let tail = dl.next_batch().unwrap();
        assert_eq!(tail.len, 1);
        assert_eq!(tail.xs, [4.]);

        assert!(dl.next_batch().is_none());

        dl.reset();
        assert_eq!(dl.next_batch().unwrap().xs, [0., 1.]);
    }

    #[test]
    fn workers_keep_order() {
        let sequential: Vec<_> = DataLoader::new(dataset(37), batch_size(8), 0)
            .unwrap()
            .collect();
        let parallel: Vec<_> = DataLoader::new(dataset(37), batch_size(8), 4)
            .unwrap()
            .collect();

        assert_eq!(sequential.len(), 5);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn never_shuffles() {
        let dl = DataLoader::new(dataset(3), batch_size(1), 2).unwrap();
        assert!(!dl.shuffle());
        assert_eq!(dl.num_workers(), 2);
    }
}
