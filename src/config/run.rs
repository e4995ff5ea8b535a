use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ObjectConfig;
use crate::{PreglyphErr, Result};

/// The trainer section of a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub default_root_dir: PathBuf,
    pub max_epochs: usize,
    pub devices: NonZeroUsize,
    pub accumulate_grad_batches: NonZeroUsize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            default_root_dir: PathBuf::from("."),
            max_epochs: 1,
            devices: NonZeroUsize::MIN,
            accumulate_grad_batches: NonZeroUsize::MIN,
            extra: Map::new(),
        }
    }
}

/// A whole run configuration: what model and dataset to build and how to feed the trainer.
///
/// Keys this crate doesn't know about are kept in `extra` so saving the config doesn't
/// lose them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: ObjectConfig,
    pub dataset: ObjectConfig,
    pub batch_size: NonZeroUsize,
    #[serde(default)]
    pub num_workers: usize,
    #[serde(default)]
    pub lightning: TrainerConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Loads a `RunConfig` from a json file.
///
/// # Arguments
/// * `path` - The path of the config file.
///
/// # Returns
/// The parsed config or an `Io`/`Json` error.
pub fn load_run_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| PreglyphErr::io(path, e))?;

    serde_json::from_str(&content).map_err(|source| PreglyphErr::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves a copy of the run's config into the log directory.
///
/// # Arguments
/// * `cfgs` - The run configuration.
/// * `config_path` - The path the config was loaded from, only its file name is used.
/// * `log_dir` - The directory to write into, created if missing.
///
/// # Returns
/// The path of the written copy.
pub fn save_config<P, Q>(cfgs: &RunConfig, config_path: P, log_dir: Q) -> Result<PathBuf>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let log_dir = log_dir.as_ref();
    let file_name = config_path.as_ref().file_name().ok_or_else(|| {
        PreglyphErr::InvalidConfig(format!(
            "config path {} has no file name",
            config_path.as_ref().display()
        ))
    })?;

    fs::create_dir_all(log_dir).map_err(|e| PreglyphErr::io(log_dir, e))?;

    let dst = log_dir.join(file_name);
    let content = serde_json::to_string_pretty(cfgs).map_err(|source| PreglyphErr::Json {
        path: dst.clone(),
        source,
    })?;

    fs::write(&dst, content).map_err(|e| PreglyphErr::io(&dst, e))?;
    log::debug!("saved config copy to {}", dst.display());
    Ok(dst)
}
