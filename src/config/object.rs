use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{PreglyphErr, Result};

/// The keyword arguments handed to a factory.
pub type Params = Map<String, Value>;

/// A configuration node naming something to build and the params to build it with.
///
/// `target` is kept optional while deserializing so that a node without it is reported as
/// a configuration error when it's instantiated instead of as a generic parsing error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default)]
    params: Params,
}

impl ObjectConfig {
    /// Creates a new `ObjectConfig`.
    ///
    /// # Arguments
    /// * `target` - The dotted identifier of the entity to build.
    /// * `params` - The keyword arguments for its factory.
    ///
    /// # Returns
    /// A new `ObjectConfig` instance.
    pub fn new(target: impl Into<String>, params: Params) -> Self {
        Self {
            target: Some(target.into()),
            params,
        }
    }

    /// Parses a configuration node out of an arbitrary json value.
    ///
    /// # Errors
    /// `InvalidConfig` if the value is not a mapping or `params` is not a mapping.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| PreglyphErr::InvalidConfig(e.to_string()))
    }

    /// Returns the parsed target of this node.
    ///
    /// # Errors
    /// `MissingTarget` if the node has no target, `InvalidTarget` if it isn't dotted.
    pub fn target(&self) -> Result<Target<'_>> {
        let target = self.target.as_deref().ok_or(PreglyphErr::MissingTarget)?;
        Target::parse(target)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// A dotted identifier split on its last `.`, like `model.Sequential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target<'a> {
    full: &'a str,
    split: usize,
}

impl<'a> Target<'a> {
    /// Parses a dotted identifier.
    ///
    /// # Errors
    /// `InvalidTarget` if there's no `.` or either side of the last one is empty.
    pub fn parse(full: &'a str) -> Result<Self> {
        match full.rfind('.') {
            Some(split) if split > 0 && split + 1 < full.len() => Ok(Self { full, split }),
            _ => Err(PreglyphErr::InvalidTarget {
                target: full.to_string(),
            }),
        }
    }

    /// The whole identifier, used as the registry key.
    pub fn as_str(&self) -> &'a str {
        self.full
    }

    /// Everything before the last `.`.
    pub fn container(&self) -> &'a str {
        &self.full[..self.split]
    }

    /// Everything after the last `.`.
    pub fn member(&self) -> &'a str {
        &self.full[self.split + 1..]
    }
}
