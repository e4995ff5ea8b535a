mod object;
mod run;

pub use object::{ObjectConfig, Params, Target};
pub use run::{RunConfig, TrainerConfig, load_run_config, save_config};
