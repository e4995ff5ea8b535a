use std::fs;

use ndarray::{ArrayD, IxDyn, arr0};
use preglyph::{
    PreglyphErr,
    checkpoint::{
        Device, StateDict, checkpoint_dir, find_latest_checkpoint, load_state_dict,
        save_safetensors,
    },
};
use tempfile::tempdir;

#[test]
fn wrapped_and_raw_documents_load_the_same() {
    let dir = tempdir().unwrap();
    let wrapped = dir.path().join("wrapped.ckpt");
    let raw = dir.path().join("raw.ckpt");
    fs::write(&wrapped, r#"{"state_dict": {"a": 1}}"#).unwrap();
    fs::write(&raw, r#"{"a": 1}"#).unwrap();

    let expected = arr0(1f32).into_dyn();
    for path in [wrapped, raw] {
        let sd = load_state_dict(&path, Device::Cpu).unwrap();
        assert_eq!(sd.len(), 1);
        assert_eq!(sd.get("a"), Some(&expected));
    }
}

#[test]
fn doubly_wrapped_documents_are_unwrapped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("double.ckpt");
    fs::write(&path, r#"{"state_dict": {"state_dict": {"w": [[1, 2], [3, 4]]}}}"#).unwrap();

    let sd = load_state_dict(&path, Device::Cuda(1)).unwrap();
    assert_eq!(sd.device(), Device::Cuda(1));
    assert_eq!(sd.get("w").unwrap().shape(), &[2, 2]);
}

#[test]
fn safetensors_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.SafeTensors");

    let mut sd = StateDict::default();
    let w = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0., 1., 2., 3., 4., 5.]).unwrap();
    sd.insert("layers.0.weight", w.clone());
    sd.insert("layers.0.bias", ArrayD::zeros(IxDyn(&[3])));
    save_safetensors(&sd, &path).unwrap();

    let loaded = load_state_dict(&path, Device::Mps).unwrap();
    assert_eq!(loaded.device(), Device::Mps);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get("layers.0.weight"), Some(&w));
}

#[test]
fn missing_checkpoint_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_state_dict(dir.path().join("nope.ckpt"), Device::Cpu).unwrap_err();
    assert!(matches!(err, PreglyphErr::Io { .. }));
}

#[test]
fn latest_checkpoint_has_the_highest_index() {
    let dir = tempdir().unwrap();
    let ckpts = checkpoint_dir(dir.path(), 0);
    fs::create_dir_all(&ckpts).unwrap();

    for name in [
        "epoch=2-step=10.ckpt",
        "epoch=5-step=20.ckpt",
        "epoch=1-step=5.ckpt",
        "last.ckpt",
        "notes.txt",
    ] {
        fs::write(ckpts.join(name), "{}").unwrap();
    }

    assert_eq!(
        find_latest_checkpoint(dir.path(), 0),
        Some(ckpts.join("epoch=5-step=20.ckpt"))
    );
}

#[test]
fn no_latest_checkpoint_in_empty_or_missing_dirs() {
    let dir = tempdir().unwrap();
    assert_eq!(find_latest_checkpoint(dir.path(), 0), None);

    fs::create_dir_all(checkpoint_dir(dir.path(), 1)).unwrap();
    assert_eq!(find_latest_checkpoint(dir.path(), 1), None);
}

#[test]
fn entries_without_tensors_do_not_fail_the_load() {
    let dir = tempdir().unwrap();
    let labels = dir.path().join("labels.ckpt");
    let masks = dir.path().join("masks.ckpt");
    fs::write(&labels, r#"{"a": 1, "name": "glyph", "classes": ["cat", "dog"]}"#).unwrap();
    fs::write(&masks, r#"{"flag": true, "mask": [true, false]}"#).unwrap();

    let sd = load_state_dict(&labels, Device::Cpu).unwrap();
    assert_eq!(sd.keys().collect::<Vec<_>>(), ["a"]);

    let sd = load_state_dict(&masks, Device::Cpu).unwrap();
    assert_eq!(sd.get("flag"), Some(&arr0(1f32).into_dyn()));
    assert_eq!(sd.get("mask").unwrap().as_slice(), Some(&[1f32, 0.][..]));
}

#[test]
fn ties_go_to_the_first_listed_checkpoint() {
    let dir = tempdir().unwrap();
    let ckpts = checkpoint_dir(dir.path(), 2);
    fs::create_dir_all(&ckpts).unwrap();

    for name in ["epoch=5-step=1.ckpt", "epoch=3-step=4.ckpt", "epoch=5-step=9.ckpt"] {
        fs::write(ckpts.join(name), "{}").unwrap();
    }

    let first_tied = fs::read_dir(&ckpts)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("epoch=5-"))
        });

    assert!(first_tied.is_some());
    assert_eq!(find_latest_checkpoint(dir.path(), 2), first_tied);
}
