mod experiment;
mod params;
mod train_start;

pub use experiment::{
    CODE_SUFFIXES, CodeSink, DirCodeSink, ExperimentLogger, HyperparamSink, JsonHparamsSink,
    collect_code_files, git_version,
};
pub use params::{ParamCount, count_params, module_requires_grad, report_params};
pub use train_start::{RunState, TrainingSummary, on_train_start};
