use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::{PreglyphErr, Result};

/// Suffixes of the files a code snapshot is made of.
pub const CODE_SUFFIXES: [&str; 3] = [".py", ".ipynb", ".yaml"];

/// A logging backend able to store a snapshot of the source tree.
pub trait CodeSink {
    /// Stores `files`, every one of them living under `root`.
    fn log_code(&mut self, root: &Path, files: &[PathBuf]) -> Result<()>;
}

/// A logging backend able to record hyperparameters.
pub trait HyperparamSink {
    fn log_hyperparams(&mut self, hparams: &Map<String, Value>) -> Result<()>;
}

/// The experiment logger attached to a run.
pub enum ExperimentLogger<'a> {
    /// Receives a snapshot of the working directory's code.
    CodeUpload(&'a mut dyn CodeSink),
    /// Receives the current git version as a hyperparameter.
    Versioned(&'a mut dyn HyperparamSink),
    Disabled,
}

/// Lists every file under `root` ending with one of `CODE_SUFFIXES`, sorted by path.
pub fn collect_code_files<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.to_str()
                .is_some_and(|p| CODE_SUFFIXES.iter().any(|suffix| p.ends_with(suffix)))
        })
        .collect()
}

/// Returns the first line of `git log -1` run inside `dir`.
///
/// `None` when git isn't installed, `dir` isn't a repository or it has no commits.
pub fn git_version<P: AsRef<Path>>(dir: P) -> Option<String> {
    let output = match Command::new("git")
        .args(["log", "-1"])
        .current_dir(dir)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            log::debug!("cannot run git: {e}");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Copies the snapshot into a directory, keeping the files' paths relative to the root.
#[derive(Debug, Clone)]
pub struct DirCodeSink {
    dest: PathBuf,
}

impl DirCodeSink {
    pub fn new<P: Into<PathBuf>>(dest: P) -> Self {
        Self { dest: dest.into() }
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

impl CodeSink for DirCodeSink {
    fn log_code(&mut self, root: &Path, files: &[PathBuf]) -> Result<()> {
        for file in files {
            let Ok(relative) = file.strip_prefix(root) else {
                log::warn!("{} is not under {}, skipping", file.display(), root.display());
                continue;
            };

            let target = self.dest.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| PreglyphErr::io(parent, e))?;
            }

            fs::copy(file, &target).map_err(|e| PreglyphErr::io(file, e))?;
        }

        log::info!("saved {} code file(s) to {}", files.len(), self.dest.display());
        Ok(())
    }
}

/// Merges hyperparameters into a pretty printed json file.
#[derive(Debug, Clone)]
pub struct JsonHparamsSink {
    path: PathBuf,
}

impl JsonHparamsSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let raw = fs::read_to_string(&self.path).map_err(|e| PreglyphErr::io(&self.path, e))?;
        serde_json::from_str(&raw).map_err(|source| PreglyphErr::Json {
            path: self.path.clone(),
            source,
        })
    }
}

impl HyperparamSink for JsonHparamsSink {
    fn log_hyperparams(&mut self, hparams: &Map<String, Value>) -> Result<()> {
        let mut all = self.read()?;
        all.extend(hparams.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PreglyphErr::io(parent, e))?;
        }

        let raw = serde_json::to_string_pretty(&all).map_err(|source| PreglyphErr::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, raw).map_err(|e| PreglyphErr::io(&self.path, e))
    }
}
