use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use ndarray::ShapeError;
use safetensors::SafeTensorError;

/// The result type used across the entire crate.
pub type Result<T> = std::result::Result<T, PreglyphErr>;

/// The crate's error type.
///
/// Configuration errors (`MissingTarget`, `InvalidTarget`, `UnknownTarget`, `InvalidParams`,
/// `InvalidConfig` and `Init`) are raised before anything gets built, the rest are
/// propagated from the filesystem or from the checkpoint decoders.
#[derive(Debug)]
pub enum PreglyphErr {
    MissingTarget,
    InvalidTarget {
        target: String,
    },
    UnknownTarget {
        container: String,
        member: String,
    },
    InvalidParams {
        target: String,
        source: serde_json::Error,
    },
    InvalidConfig(String),
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    SafeTensors {
        path: PathBuf,
        source: SafeTensorError,
    },
    InvalidCheckpoint {
        path: PathBuf,
        reason: String,
    },
    UnsupportedDtype {
        name: String,
        dtype: String,
    },
    InvalidTensor {
        name: String,
    },
    Shape {
        name: String,
        source: ShapeError,
    },
    ShapeMismatch {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    MissingKeys(Vec<String>),
    UnexpectedKeys(Vec<String>),
    Init(String),
    Report(io::Error),
}

impl PreglyphErr {
    /// Wraps an io error together with the path that caused it.
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns whether this error was caused by an invalid configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingTarget
                | Self::InvalidTarget { .. }
                | Self::UnknownTarget { .. }
                | Self::InvalidParams { .. }
                | Self::InvalidConfig(_)
                | Self::Init(_)
        )
    }
}

impl Display for PreglyphErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget => write!(f, "expected key `target` to instantiate"),
            Self::InvalidTarget { target } => write!(
                f,
                "invalid target `{target}`, expected a dotted identifier such as `module.Name`"
            ),
            Self::UnknownTarget { container, member } => {
                write!(f, "nothing named `{member}` is registered in `{container}`")
            }
            Self::InvalidParams { target, source } => {
                write!(f, "invalid params for `{target}`: {source}")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "cannot deserialize {}: {source}", path.display())
            }
            Self::SafeTensors { path, source } => {
                write!(f, "cannot decode safetensors {}: {source}", path.display())
            }
            Self::InvalidCheckpoint { path, reason } => {
                write!(f, "invalid checkpoint {}: {reason}", path.display())
            }
            Self::UnsupportedDtype { name, dtype } => {
                write!(f, "tensor `{name}` has an unsupported dtype {dtype}")
            }
            Self::InvalidTensor { name } => {
                write!(f, "tensor `{name}` is not a rectangular array of numbers")
            }
            Self::Shape { name, source } => write!(f, "tensor `{name}`: {source}"),
            Self::ShapeMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for `{name}`, got shape {got:?} and expected {expected:?}"
            ),
            Self::MissingKeys(keys) => write!(f, "missing keys in state_dict: {keys:?}"),
            Self::UnexpectedKeys(keys) => write!(f, "unexpected keys in state_dict: {keys:?}"),
            Self::Init(msg) => write!(f, "cannot initialize parameters: {msg}"),
            Self::Report(e) => write!(f, "cannot write report: {e}"),
        }
    }
}

impl Error for PreglyphErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidParams { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::SafeTensors { source, .. } => Some(source),
            Self::Shape { source, .. } => Some(source),
            Self::Report(e) => Some(e),
            _ => None,
        }
    }
}

