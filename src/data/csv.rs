use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::InMemoryDataset;
use crate::{PreglyphErr, Result};

/// The params `data.CsvDataset` is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvDatasetConfig {
    pub path: PathBuf,
    pub x_size: usize,
    pub y_size: usize,
}

/// Loads a headerless csv of numbers, one sample per line, into memory.
///
/// Blank lines are ignored.
///
/// # Arguments
/// * `config` - Where the file is and how each line splits into inputs and targets.
///
/// # Returns
/// The dataset, an `Io` error if the file can't be read or an `InvalidConfig` naming the
/// first malformed line.
pub fn load_csv(config: &CsvDatasetConfig) -> Result<InMemoryDataset> {
    let CsvDatasetConfig {
        path,
        x_size,
        y_size,
    } = config;

    let row_size = x_size + y_size;
    let content = fs::read_to_string(path).map_err(|e| PreglyphErr::io(path, e))?;
    let mut data = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let values = line
            .split(',')
            .map(|v| {
                v.trim().parse::<f32>().map_err(|_| {
                    PreglyphErr::InvalidConfig(format!(
                        "{} line {}: cannot parse '{v}' as f32",
                        path.display(),
                        i + 1
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if values.len() != row_size {
            return Err(PreglyphErr::InvalidConfig(format!(
                "{} line {}: expected {row_size} values (x_size={x_size} + y_size={y_size}), got {}",
                path.display(),
                i + 1,
                values.len()
            )));
        }

        data.extend(values);
    }

    log::debug!("loaded {} value(s) from {}", data.len(), path.display());
    InMemoryDataset::new(data, *x_size, *y_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;

    fn write_csv(content: &str) -> (tempfile::TempDir, CsvDatasetConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        fs::write(&path, content).unwrap();

        let config = CsvDatasetConfig {
            path,
            x_size: 2,
            y_size: 1,
        };
        (dir, config)
    }

    #[test]
    fn loads_rows() {
        let (_dir, config) = write_csv("1, 2, 3\n\n4,5,6\n");
        let ds = load_csv(&config).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).y, [6.]);
    }

    #[test]
    fn reports_bad_lines() {
        let (_dir, config) = write_csv("1,2,3\n4,x,6\n");
        let err = load_csv(&config).unwrap_err().to_string();
        assert!(err.contains("line 2"), "{err}");

        let (_dir, config) = write_csv("1,2\n");
        assert!(load_csv(&config).is_err());
    }
}
