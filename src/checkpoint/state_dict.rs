use std::collections::{BTreeMap, btree_map};

use ndarray::{ArrayD, IxDyn};
use serde_json::Value;

use super::Device;
use crate::{PreglyphErr, Result};

/// The key checkpoints nest their parameters under.
pub const STATE_DICT_KEY: &str = "state_dict";

/// Unwraps a checkpoint document one level.
///
/// A mapping holding a `state_dict` entry yields that entry, anything else is returned as is,
/// so applying it to an already unwrapped document changes nothing.
pub fn unwrap_state_dict(document: Value) -> Value {
    match document {
        Value::Object(mut map) => match map.remove(STATE_DICT_KEY) {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    }
}

/// A mapping from parameter name to tensor, bound to the device it was loaded for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, ArrayD<f32>>,
    device: Device,
}

impl StateDict {
    /// Creates a new empty `StateDict`.
    ///
    /// # Arguments
    /// * `device` - The device the tensors belong to.
    ///
    /// # Returns
    /// A new `StateDict` instance.
    pub fn new(device: Device) -> Self {
        Self {
            tensors: BTreeMap::new(),
            device,
        }
    }

    /// Builds a `StateDict` out of an already unwrapped checkpoint document.
    ///
    /// Numbers and booleans become scalars, rectangular nested arrays of them keep their
    /// shape and `{"shape": [..], "data": [..]}` objects get reshaped. Entries that are none
    /// of those (strings, nulls, other mappings, arrays holding any of them) don't hold
    /// tensors and are skipped.
    ///
    /// # Arguments
    /// * `document` - The unwrapped document, must be a mapping.
    /// * `device` - The device to bind the tensors to.
    ///
    /// # Returns
    /// The state dict, or `None` if the document isn't a mapping.
    pub(crate) fn from_document(document: Value, device: Device) -> Option<Result<Self>> {
        let Value::Object(entries) = document else {
            return None;
        };

        let mut state_dict = Self::new(device);
        for (name, value) in entries {
            match tensor_from_value(&name, &value) {
                Ok(Some(tensor)) => {
                    state_dict.insert(name, tensor);
                }
                Ok(None) => log::warn!("skipping `{name}`, it doesn't hold a tensor"),
                Err(e) => return Some(Err(e)),
            }
        }

        Some(Ok(state_dict))
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.tensors.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ArrayD<f32>> {
        self.tensors.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Iterates over `(name, tensor)` pairs sorted by name.
    pub fn iter(&self) -> btree_map::Iter<'_, String, ArrayD<f32>> {
        self.tensors.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Total amount of elements over every tensor.
    pub fn numel(&self) -> usize {
        self.tensors.values().map(ArrayD::len).sum()
    }
}

impl IntoIterator for StateDict {
    type Item = (String, ArrayD<f32>);
    type IntoIter = btree_map::IntoIter<String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.into_iter()
    }
}

impl<'a> IntoIterator for &'a StateDict {
    type Item = (&'a String, &'a ArrayD<f32>);
    type IntoIter = btree_map::Iter<'a, String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.iter()
    }
}

fn tensor_from_value(name: &str, value: &Value) -> Result<Option<ArrayD<f32>>> {
    let invalid = || PreglyphErr::InvalidTensor {
        name: name.to_string(),
    };

    match value {
        Value::Number(n) => {
            let scalar = n.as_f64().ok_or_else(invalid)? as f32;
            Ok(Some(ArrayD::from_elem(IxDyn(&[]), scalar)))
        }
        Value::Bool(b) => Ok(Some(ArrayD::from_elem(IxDyn(&[]), *b as u8 as f32))),
        Value::Array(_) if !has_tensor_leaves(value) => Ok(None),
        Value::Array(_) => {
            let shape = infer_shape(value);
            let mut data = Vec::new();
            collect(value, &shape, &mut data).ok_or_else(invalid)?;
            reshape(name, &shape, data).map(Some)
        }
        Value::Object(fields) => match (fields.get("shape"), fields.get("data")) {
            (Some(Value::Array(dims)), Some(Value::Array(values))) => {
                let shape = dims
                    .iter()
                    .map(|d| d.as_u64().map(|d| d as usize))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(invalid)?;
                let data = values
                    .iter()
                    .map(|v| v.as_f64().map(|v| v as f32))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(invalid)?;
                reshape(name, &shape, data).map(Some)
            }
            _ => Ok(None),
        },
        Value::String(_) | Value::Null => Ok(None),
    }
}

/// Returns whether every leaf of a nested array is a number or a boolean.
fn has_tensor_leaves(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(has_tensor_leaves),
        Value::Number(_) | Value::Bool(_) => true,
        _ => false,
    }
}

/// Follows the first element of every nesting level.
fn infer_shape(value: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut curr = value;

    while let Value::Array(items) = curr {
        shape.push(items.len());
        match items.first() {
            Some(first) => curr = first,
            None => break,
        }
    }

    shape
}

/// Flattens `value` in row-major order, failing if it doesn't match `shape` everywhere.
fn collect(value: &Value, shape: &[usize], out: &mut Vec<f32>) -> Option<()> {
    match (value, shape.split_first()) {
        (Value::Array(items), Some((&len, rest))) if items.len() == len => {
            items.iter().try_for_each(|item| collect(item, rest, out))
        }
        (Value::Number(n), None) => {
            out.push(n.as_f64()? as f32);
            Some(())
        }
        (Value::Bool(b), None) => {
            out.push(*b as u8 as f32);
            Some(())
        }
        _ => None,
    }
}

fn reshape(name: &str, shape: &[usize], data: Vec<f32>) -> Result<ArrayD<f32>> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|source| PreglyphErr::Shape {
        name: name.to_string(),
        source,
    })
}
