mod device;
mod discovery;
mod loader;
mod state_dict;

pub use device::Device;
pub use discovery::{
    checkpoint_dir, checkpoint_index, find_latest_checkpoint, next_version, version_dir,
};
pub use loader::{SAFETENSORS_EXTENSION, load_state_dict, save_safetensors};
pub use state_dict::{STATE_DICT_KEY, StateDict, unwrap_state_dict};
