use std::{
    env,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use log::{info, warn};

use preglyph::{
    builder::RunBuilder,
    checkpoint::{self, Device},
    config::{load_run_config, save_config},
    reporting::{
        ExperimentLogger, JsonHparamsSink, RunState, module_requires_grad, on_train_start,
        report_params,
    },
};

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => Ok(Some(
            raw.parse().with_context(|| format!("invalid {key}: {raw}"))?,
        )),
        Err(_) => Ok(None),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config_path: PathBuf = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: preglyph <config.json>")?;

    let cfgs = load_run_config(&config_path)?;
    let rank: usize = env_parse("RANK")?.unwrap_or(0);
    let device: Device = env_parse("DEVICE")?.unwrap_or_default();
    let resume: Option<usize> = env_parse("RESUME_VERSION")?;

    let builder = RunBuilder::with_defaults();
    let mut model = builder.build_model(&cfgs)?;
    let dataloader = builder.build_dataloader(&cfgs)?;

    let mut stdout = io::stdout().lock();
    report_params(&*model, &mut stdout)?;
    if !module_requires_grad(&*model) {
        warn!("{} has frozen parameters", model.name());
    }

    let root = &cfgs.lightning.default_root_dir;
    let version = match resume {
        Some(version) => {
            match checkpoint::find_latest_checkpoint(root, version) {
                Some(ckpt) => {
                    let state_dict = checkpoint::load_state_dict(&ckpt, device)?;
                    writeln!(stdout, "Loaded state_dict from [{}]", ckpt.display())?;
                    let report = model.load_state_dict(&state_dict, false)?;
                    if !report.missing.is_empty() {
                        warn!("missing keys: {:?}", report.missing);
                    }
                    if !report.unexpected.is_empty() {
                        warn!("unexpected keys: {:?}", report.unexpected);
                    }
                    info!("resuming from {}", ckpt.display());
                }
                None => warn!("no checkpoint found for version {version}, starting over"),
            }
            version
        }
        None => checkpoint::next_version(root),
    };

    let log_dir = checkpoint::version_dir(root, version);
    if rank == 0 {
        let saved = save_config(&cfgs, &config_path, &log_dir)?;
        info!("saved config to {}", saved.display());
    }

    let state = RunState::estimate(dataloader.dataset().len(), cfgs.batch_size, &cfgs.lightning);
    info!("{} batch(es) per epoch", dataloader.num_batches());

    let workdir = env::current_dir().context("cannot read the working directory")?;
    let mut hparams = JsonHparamsSink::new(log_dir.join("hparams.json"));

    on_train_start(
        rank,
        ExperimentLogger::Versioned(&mut hparams),
        &state,
        &workdir,
        &mut stdout,
    )?;
    stdout.flush()?;

    Ok(())
}
