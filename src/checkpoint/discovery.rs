use std::{
    fs,
    path::{Path, PathBuf},
};

const CHECKPOINT_EXTENSION: &str = "ckpt";

const LOGS_DIR: &str = "lightning_logs";
const VERSION_PREFIX: &str = "version_";

/// Returns `root/lightning_logs/version_<version>`.
pub fn version_dir<P: AsRef<Path>>(root: P, version: usize) -> PathBuf {
    root.as_ref()
        .join(LOGS_DIR)
        .join(format!("{VERSION_PREFIX}{version}"))
}

/// Returns `root/lightning_logs/version_<version>/checkpoints`.
pub fn checkpoint_dir<P: AsRef<Path>>(root: P, version: usize) -> PathBuf {
    version_dir(root, version).join("checkpoints")
}

/// Returns the version following the highest `version_<n>` directory under `root`, `0`
/// when there's none.
pub fn next_version<P: AsRef<Path>>(root: P) -> usize {
    let Ok(entries) = fs::read_dir(root.as_ref().join(LOGS_DIR)) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name();
            name.to_str()?.strip_prefix(VERSION_PREFIX)?.parse::<usize>().ok()
        })
        .max()
        .map_or(0, |v| v + 1)
}

/// Extracts the index a checkpoint's file name encodes.
///
/// The index is the integer after the last `=` of whatever comes before the first `-`,
/// so `epoch=5-step=20.ckpt` yields `5`.
pub fn checkpoint_index(file_name: &str) -> Option<u64> {
    let head = file_name.split('-').next()?;
    head.rsplit('=').next()?.parse().ok()
}

/// Finds the checkpoint with the highest index of a run's version.
///
/// Ties are resolved in favour of the first file the directory listing yields.
///
/// # Arguments
/// * `root` - The run's root directory.
/// * `version` - The version whose checkpoints to scan.
///
/// # Returns
/// The path of the latest checkpoint, `None` if there's no checkpoint at all.
pub fn find_latest_checkpoint<P: AsRef<Path>>(root: P, version: usize) -> Option<PathBuf> {
    let dir = checkpoint_dir(root, version);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("cannot list {}: {e}", dir.display());
            return None;
        }
    };

    let mut latest: Option<(u64, PathBuf)> = None;

    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        let is_checkpoint = !file_name.starts_with('.')
            && path.extension().is_some_and(|ext| ext == CHECKPOINT_EXTENSION);

        if !is_checkpoint {
            continue;
        }

        let Some(index) = checkpoint_index(file_name) else {
            log::warn!("skipping {file_name}, it doesn't encode a checkpoint index");
            continue;
        };

        if latest.as_ref().is_none_or(|(max, _)| index > *max) {
            latest = Some((index, path));
        }
    }

    latest.map(|(_, path)| path)
}
