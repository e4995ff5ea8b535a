use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::PreglyphErr;

/// Where loaded tensors should live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
    Mps,
}

impl FromStr for Device {
    type Err = PreglyphErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PreglyphErr::InvalidConfig(format!("unknown device `{s}`"));

        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "mps" => Ok(Self::Mps),
            "cuda" => Ok(Self::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(invalid),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            Self::Mps => f.write_str("mps"),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = PreglyphErr;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(value: Device) -> Self {
        value.to_string()
    }
}
