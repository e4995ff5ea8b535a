use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};

use bytemuck::AnyBitPattern;
use half::{bf16, f16};
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensorError, SafeTensors, tensor::TensorView};
use serde_json::Value;

use super::{Device, StateDict, unwrap_state_dict};
use crate::{PreglyphErr, Result};

/// Files with this extension (compared case-insensitively) are read as safetensors.
pub const SAFETENSORS_EXTENSION: &str = "safetensors";

/// Loads the state dict stored in a checkpoint file.
///
/// `.safetensors` files are decoded as a flat tensor archive, every other extension is
/// read as a json checkpoint document whose parameters may be nested under `state_dict`.
///
/// # Arguments
/// * `path` - The checkpoint file.
/// * `location` - The device to bind the loaded tensors to.
///
/// # Returns
/// The state dict, or the io / decoding error that prevented loading it.
pub fn load_state_dict<P: AsRef<Path>>(path: P, location: Device) -> Result<StateDict> {
    let path = path.as_ref();

    let state_dict = if is_safetensors(path) {
        read_safetensors(path, location)?
    } else {
        // Checkpoints have been seen wrapped twice, unwrapping an unwrapped one is a no-op.
        let document = unwrap_state_dict(read_document(path)?);
        let document = unwrap_state_dict(document);

        StateDict::from_document(document, location).ok_or_else(|| {
            PreglyphErr::InvalidCheckpoint {
                path: path.to_path_buf(),
                reason: "expected a mapping of parameter names to tensors".into(),
            }
        })??
    };

    log::info!("Loaded state_dict from [{}]", path.display());
    Ok(state_dict)
}

/// Saves a state dict as a safetensors file of `f32` tensors.
///
/// # Arguments
/// * `state_dict` - The tensors to save.
/// * `path` - The destination file.
pub fn save_safetensors<P: AsRef<Path>>(state_dict: &StateDict, path: P) -> Result<()> {
    let path = path.as_ref();
    let st_err = |source| PreglyphErr::SafeTensors {
        path: path.to_path_buf(),
        source,
    };

    let buffers: Vec<_> = state_dict
        .iter()
        .map(|(name, tensor)| {
            let data: Vec<u8> = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.as_str(), tensor.shape().to_vec(), data)
        })
        .collect();

    let views = buffers
        .iter()
        .map(|(name, shape, data)| {
            TensorView::new(Dtype::F32, shape.clone(), data).map(|view| (*name, view))
        })
        .collect::<std::result::Result<Vec<_>, SafeTensorError>>()
        .map_err(st_err)?;

    safetensors::serialize_to_file(views, &None, path).map_err(st_err)?;
    log::debug!("saved {} tensor(s) to {}", state_dict.len(), path.display());
    Ok(())
}

fn is_safetensors(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SAFETENSORS_EXTENSION))
}

fn read_document(path: &Path) -> Result<Value> {
    let file = File::open(path).map_err(|e| PreglyphErr::io(path, e))?;

    serde_json::from_reader(BufReader::new(file)).map_err(|source| PreglyphErr::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_safetensors(path: &Path, location: Device) -> Result<StateDict> {
    let bytes = fs::read(path).map_err(|e| PreglyphErr::io(path, e))?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|source| PreglyphErr::SafeTensors {
        path: path.to_path_buf(),
        source,
    })?;

    let mut state_dict = StateDict::new(location);
    for (name, view) in tensors.tensors() {
        let data = decode(&name, view.dtype(), view.data())?;
        let tensor = ArrayD::from_shape_vec(IxDyn(view.shape()), data).map_err(|source| {
            PreglyphErr::Shape {
                name: name.clone(),
                source,
            }
        })?;

        state_dict.insert(name, tensor);
    }

    Ok(state_dict)
}

/// Converts the raw little-endian bytes of a tensor into `f32`s.
fn decode(name: &str, dtype: Dtype, bytes: &[u8]) -> Result<Vec<f32>> {
    match dtype {
        Dtype::F32 => cast(name, bytes, |v: f32| v),
        Dtype::F64 => cast(name, bytes, |v: f64| v as f32),
        Dtype::F16 => cast(name, bytes, |v: f16| v.to_f32()),
        Dtype::BF16 => cast(name, bytes, |v: bf16| v.to_f32()),
        Dtype::I64 => cast(name, bytes, |v: i64| v as f32),
        Dtype::I32 => cast(name, bytes, |v: i32| v as f32),
        Dtype::I16 => cast(name, bytes, |v: i16| v as f32),
        Dtype::I8 => cast(name, bytes, |v: i8| v as f32),
        Dtype::U64 => cast(name, bytes, |v: u64| v as f32),
        Dtype::U32 => cast(name, bytes, |v: u32| v as f32),
        Dtype::U16 => cast(name, bytes, |v: u16| v as f32),
        Dtype::U8 | Dtype::BOOL => Ok(bytes.iter().map(|&v| v as f32).collect()),
        other => Err(PreglyphErr::UnsupportedDtype {
            name: name.to_string(),
            dtype: format!("{other:?}"),
        }),
    }
}

fn cast<T, F>(name: &str, bytes: &[u8], convert: F) -> Result<Vec<f32>>
where
    T: AnyBitPattern,
    F: Fn(T) -> f32,
{
    let size = size_of::<T>();
    if bytes.len() % size != 0 {
        return Err(PreglyphErr::InvalidTensor {
            name: name.to_string(),
        });
    }

    Ok(bytes
        .chunks_exact(size)
        .map(|chunk| convert(bytemuck::pod_read_unaligned(chunk)))
        .collect())
}
