use std::{
    fmt::{self, Display},
    io::Write,
    num::NonZeroUsize,
    path::Path,
};

use serde_json::{Map, Value};

use super::experiment::{ExperimentLogger, collect_code_files, git_version};
use crate::{PreglyphErr, Result, config::TrainerConfig};

/// What the trainer knows about the run once training starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunState {
    pub num_samples: usize,
    pub max_epochs: usize,
    pub estimated_stepping_batches: NonZeroUsize,
    pub num_devices: NonZeroUsize,
    pub accumulate_grad_batches: NonZeroUsize,
}

impl RunState {
    /// Estimates the optimizer steps of a run.
    ///
    /// Every device gets `ceil(num_samples / (batch_size * devices))` batches per epoch and
    /// steps once every `accumulate_grad_batches` of them, the last partial group included.
    /// Products saturate at `usize::MAX`.
    ///
    /// # Arguments
    /// * `num_samples` - The length of the training dataset.
    /// * `batch_size` - The per device batch size.
    /// * `trainer` - The trainer section of the run configuration.
    ///
    /// # Returns
    /// The run state, with at least one stepping batch.
    pub fn estimate(num_samples: usize, batch_size: NonZeroUsize, trainer: &TrainerConfig) -> Self {
        let per_step = batch_size.get().saturating_mul(trainer.devices.get());
        let batches = num_samples.div_ceil(per_step);
        let steps_per_epoch = batches.div_ceil(trainer.accumulate_grad_batches.get());
        let total = steps_per_epoch.saturating_mul(trainer.max_epochs);

        Self {
            num_samples,
            max_epochs: trainer.max_epochs,
            estimated_stepping_batches: NonZeroUsize::new(total).unwrap_or(NonZeroUsize::MIN),
            num_devices: trainer.devices,
            accumulate_grad_batches: trainer.accumulate_grad_batches,
        }
    }

    /// Samples consumed per optimizer step, across devices and accumulation.
    pub fn total_batch_size(&self) -> u64 {
        let seen = self.num_samples as f64 * self.max_epochs as f64;
        (seen / self.estimated_stepping_batches.get() as f64).round_ties_even() as u64
    }

    pub fn instant_batch_size(&self) -> u64 {
        self.total_batch_size()
            .saturating_mul(self.num_devices.get() as u64)
    }

    pub fn summary(&self) -> TrainingSummary<'_> {
        TrainingSummary(self)
    }
}

/// The block printed right before the first step.
pub struct TrainingSummary<'a>(&'a RunState);

impl Display for TrainingSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0;

        writeln!(f, "***** Start training *****")?;
        writeln!(f, "  Num examples = {}", state.num_samples)?;
        writeln!(f, "  Num Epochs = {}", state.max_epochs)?;
        writeln!(f, "  Total GPU device number: {}", state.num_devices)?;
        writeln!(
            f,
            "  Gradient Accumulation steps = {}",
            state.accumulate_grad_batches
        )?;
        writeln!(f, "  Instant batch size: {}", state.instant_batch_size())?;
        writeln!(
            f,
            "  Total train batch size (w. parallel, distributed & accumulation) = {}",
            state.total_batch_size()
        )?;
        write!(
            f,
            "  Total optimization steps = {}",
            state.estimated_stepping_batches
        )
    }
}

/// Reports the start of training, only on the coordinator (`rank == 0`).
///
/// A code upload logger receives every code file under `workdir`, a versioned logger gets
/// the current git version. The training summary is written to `out` afterwards.
///
/// # Arguments
/// * `rank` - The global rank of this process.
/// * `logger` - The experiment logger of the run.
/// * `state` - The run state exposed by the trainer.
/// * `workdir` - The directory code and git info are taken from.
/// * `out` - Where status lines are written.
///
/// # Returns
/// Whether anything was reported, or the error raised by the logger or by `out`.
pub fn on_train_start<W: Write>(
    rank: usize,
    logger: ExperimentLogger<'_>,
    state: &RunState,
    workdir: &Path,
    out: &mut W,
) -> Result<bool> {
    if rank != 0 {
        log::debug!("rank {rank} is not the coordinator, skipping train start report");
        return Ok(false);
    }

    match logger {
        ExperimentLogger::CodeUpload(sink) => {
            writeln!(out, "Logging code").map_err(PreglyphErr::Report)?;
            let files = collect_code_files(workdir);
            sink.log_code(workdir, &files)?;
        }
        ExperimentLogger::Versioned(sink) => {
            writeln!(out, "Logging git info").map_err(PreglyphErr::Report)?;
            match git_version(workdir) {
                Some(version) => {
                    let mut hparams = Map::new();
                    hparams.insert("git_version".to_string(), Value::String(version));
                    sink.log_hyperparams(&hparams)?;
                }
                None => log::warn!("no git info available in {}", workdir.display()),
            }
        }
        ExperimentLogger::Disabled => {}
    }

    writeln!(out, "{}", state.summary()).map_err(PreglyphErr::Report)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, process::Command};

    use tempfile::tempdir;

    use super::*;
    use crate::reporting::{CodeSink, HyperparamSink};

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn state() -> RunState {
        RunState {
            num_samples: 1000,
            max_epochs: 2,
            estimated_stepping_batches: nz(250),
            num_devices: nz(2),
            accumulate_grad_batches: nz(1),
        }
    }

    #[derive(Default)]
    struct Recorder {
        files: Vec<PathBuf>,
        hparams: Vec<Map<String, Value>>,
    }

    impl CodeSink for Recorder {
        fn log_code(&mut self, _: &Path, files: &[PathBuf]) -> Result<()> {
            self.files.extend_from_slice(files);
            Ok(())
        }
    }

    impl HyperparamSink for Recorder {
        fn log_hyperparams(&mut self, hparams: &Map<String, Value>) -> Result<()> {
            self.hparams.push(hparams.clone());
            Ok(())
        }
    }

    #[test]
    fn summary_block() {
        let expected = "\
***** Start training *****
  Num examples = 1000
  Num Epochs = 2
  Total GPU device number: 2
  Gradient Accumulation steps = 1
  Instant batch size: 16
  Total train batch size (w. parallel, distributed & accumulation) = 8
  Total optimization steps = 250";

        assert_eq!(state().summary().to_string(), expected);
    }

    #[test]
    fn estimate_rounds_up() {
        let trainer = TrainerConfig {
            max_epochs: 3,
            devices: nz(2),
            accumulate_grad_batches: nz(2),
            ..Default::default()
        };

        // 10 samples over 2 devices of 2 samples is 3 batches, so 2 steps per epoch.
        let state = RunState::estimate(10, nz(2), &trainer);
        assert_eq!(state.estimated_stepping_batches.get(), 6);
        assert_eq!(state.num_devices.get(), 2);

        let empty = RunState::estimate(0, nz(2), &trainer);
        assert_eq!(empty.estimated_stepping_batches.get(), 1);
        assert_eq!(empty.total_batch_size(), 0);
    }

    #[test]
    fn estimate_saturates_instead_of_overflowing() {
        let trainer = TrainerConfig {
            max_epochs: usize::MAX,
            devices: nz(usize::MAX),
            ..Default::default()
        };

        let state = RunState::estimate(10, nz(4), &trainer);
        assert_eq!(state.estimated_stepping_batches.get(), usize::MAX);

        let state = RunState::estimate(10, nz(1), &TrainerConfig {
            max_epochs: usize::MAX,
            ..Default::default()
        });
        assert_eq!(state.estimated_stepping_batches.get(), usize::MAX);
        assert_eq!(state.summary().to_string().lines().count(), 8);
    }

    #[test]
    fn only_the_coordinator_reports() {
        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        let dir = tempdir().unwrap();

        let reported = on_train_start(
            1,
            ExperimentLogger::CodeUpload(&mut recorder),
            &state(),
            dir.path(),
            &mut out,
        )
        .unwrap();

        assert!(!reported);
        assert!(out.is_empty());
        assert!(recorder.files.is_empty());
    }

    #[test]
    fn code_upload_logger_gets_code_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("train.py"), "print()").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        let reported = on_train_start(
            0,
            ExperimentLogger::CodeUpload(&mut recorder),
            &state(),
            dir.path(),
            &mut out,
        )
        .unwrap();

        assert!(reported);
        assert_eq!(recorder.files, [dir.path().join("train.py")]);

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Logging code\n***** Start training *****\n"));
        assert!(out.ends_with("Total optimization steps = 250\n"));
    }

    fn git(dir: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .args(["-c", "user.name=glyph", "-c", "user.email=glyph@localhost"])
            .args(["-c", "commit.gpgsign=false"])
            .args(args)
            .current_dir(dir)
            .output()
            .is_ok_and(|out| out.status.success())
    }

    #[test]
    fn versioned_logger_records_the_git_version() {
        let dir = tempdir().unwrap();
        let committed = git(dir.path(), &["init", "-q"])
            && git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "first"]);
        if !committed {
            eprintln!("git is unavailable, skipping");
            return;
        }

        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        on_train_start(
            0,
            ExperimentLogger::Versioned(&mut recorder),
            &state(),
            dir.path(),
            &mut out,
        )
        .unwrap();

        assert_eq!(recorder.hparams.len(), 1);
        let version = recorder.hparams[0]["git_version"].as_str().unwrap();
        assert!(version.starts_with("commit "));
        assert_eq!(Some(version.to_string()), git_version(dir.path()));
    }

    #[test]
    fn versioned_logger_without_git_still_reports() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");

        let mut out = Vec::new();
        let mut recorder = Recorder::default();
        on_train_start(
            0,
            ExperimentLogger::Versioned(&mut recorder),
            &state(),
            &missing,
            &mut out,
        )
        .unwrap();

        assert!(recorder.hparams.is_empty());
        assert!(String::from_utf8(out).unwrap().starts_with("Logging git info\n"));
    }
}
