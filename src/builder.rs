use std::sync::Arc;

use crate::{
    Result,
    config::RunConfig,
    data::{CsvDatasetConfig, DataLoader, Dataset, InMemoryDataset, InMemoryDatasetConfig, load_csv},
    model::{Module, Sequential, SequentialConfig},
    registry::Registry,
};

pub type ModelRegistry = Registry<Box<dyn Module>>;
pub type DatasetRegistry = Registry<Arc<dyn Dataset>>;

/// Returns a registry holding the models this crate ships with.
pub fn default_models() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    models.register_typed("model.Sequential", |config: SequentialConfig| {
        Ok(Box::new(Sequential::new(config)?) as Box<dyn Module>)
    });

    models
}

/// Returns a registry holding the datasets this crate ships with.
pub fn default_datasets() -> DatasetRegistry {
    let mut datasets = DatasetRegistry::new();
    datasets
        .register_typed("data.InMemoryDataset", |config: InMemoryDatasetConfig| {
            Ok(Arc::new(InMemoryDataset::try_from(config)?) as Arc<dyn Dataset>)
        })
        .register_typed("data.CsvDataset", |config: CsvDatasetConfig| {
            Ok(Arc::new(load_csv(&config)?) as Arc<dyn Dataset>)
        });

    datasets
}

/// Builds the model and the dataloader of a run out of its configuration.
pub struct RunBuilder {
    models: ModelRegistry,
    datasets: DatasetRegistry,
}

impl RunBuilder {
    /// Creates a new `RunBuilder`.
    ///
    /// # Arguments
    /// * `models` - The models configs may refer to.
    /// * `datasets` - The datasets configs may refer to.
    ///
    /// # Returns
    /// A new `RunBuilder` instance.
    pub fn new(models: ModelRegistry, datasets: DatasetRegistry) -> Self {
        Self { models, datasets }
    }

    /// Creates a `RunBuilder` knowing only about the built-in models and datasets.
    pub fn with_defaults() -> Self {
        Self::new(default_models(), default_datasets())
    }

    pub fn models_mut(&mut self) -> &mut ModelRegistry {
        &mut self.models
    }

    pub fn datasets_mut(&mut self) -> &mut DatasetRegistry {
        &mut self.datasets
    }

    /// Instantiates the run's model.
    pub fn build_model(&self, cfgs: &RunConfig) -> Result<Box<dyn Module>> {
        let model = self.models.instantiate(&cfgs.model)?;
        log::info!("built model {}", model.name());
        Ok(model)
    }

    /// Instantiates the run's dataset.
    pub fn build_dataset(&self, cfgs: &RunConfig) -> Result<Arc<dyn Dataset>> {
        let dataset = self.datasets.instantiate(&cfgs.dataset)?;
        log::info!("built dataset with {} sample(s)", dataset.len());
        Ok(dataset)
    }

    /// Instantiates the run's dataset and wraps it in an unshuffled `DataLoader`.
    ///
    /// # Arguments
    /// * `cfgs` - The run configuration, `batch_size` and `num_workers` are taken from it.
    ///
    /// # Returns
    /// The dataloader or the error raised while building the dataset.
    pub fn build_dataloader(&self, cfgs: &RunConfig) -> Result<DataLoader> {
        let dataset = self.build_dataset(cfgs)?;
        DataLoader::new(dataset, cfgs.batch_size, cfgs.num_workers)
    }
}

impl Default for RunBuilder {
    fn default() -> Self {
        Self::with_defaults()
    }
}
