use ndarray::ArrayD;

use crate::{PreglyphErr, Result, checkpoint::StateDict};

/// A trainable tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub value: ArrayD<f32>,
    pub requires_grad: bool,
}

impl Parameter {
    /// Creates a new `Parameter` that requires grad.
    pub fn new(value: ArrayD<f32>) -> Self {
        Self {
            value,
            requires_grad: true,
        }
    }

    pub fn numel(&self) -> usize {
        self.value.len()
    }
}

/// The keys a non strict `load_state_dict` couldn't match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

/// Anything that owns named parameters.
pub trait Module {
    /// The name reports refer to the module by.
    fn name(&self) -> &str;

    /// Returns every parameter with its dotted name, in a stable order.
    fn named_parameters(&self) -> Vec<(String, &Parameter)>;

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Parameter)>;

    /// Copies every parameter into a new cpu state dict.
    fn state_dict(&self) -> StateDict {
        let mut state_dict = StateDict::default();
        for (name, param) in self.named_parameters() {
            state_dict.insert(name, param.value.clone());
        }

        state_dict
    }

    /// Overwrites the parameters with the tensors of a state dict.
    ///
    /// Shapes must always match. When `strict`, missing and unexpected keys are errors and
    /// nothing is modified, otherwise they're reported back.
    ///
    /// # Arguments
    /// * `state_dict` - The tensors to load.
    /// * `strict` - Whether the keys must match exactly.
    ///
    /// # Returns
    /// The unmatched keys or an error.
    fn load_state_dict(&mut self, state_dict: &StateDict, strict: bool) -> Result<LoadReport> {
        let mut params = self.named_parameters_mut();

        let missing: Vec<_> = params
            .iter()
            .filter(|(name, _)| !state_dict.contains(name))
            .map(|(name, _)| name.clone())
            .collect();

        let unexpected: Vec<_> = state_dict
            .keys()
            .filter(|key| params.iter().all(|(name, _)| name.as_str() != *key))
            .map(str::to_string)
            .collect();

        if strict && !missing.is_empty() {
            return Err(PreglyphErr::MissingKeys(missing));
        }
        if strict && !unexpected.is_empty() {
            return Err(PreglyphErr::UnexpectedKeys(unexpected));
        }

        for (name, param) in params.iter() {
            if let Some(tensor) = state_dict.get(name) {
                if tensor.shape() != param.value.shape() {
                    return Err(PreglyphErr::ShapeMismatch {
                        name: name.clone(),
                        got: tensor.shape().to_vec(),
                        expected: param.value.shape().to_vec(),
                    });
                }
            }
        }

        for (name, param) in params.iter_mut() {
            if let Some(tensor) = state_dict.get(name) {
                param.value.assign(tensor);
            }
        }

        Ok(LoadReport {
            missing,
            unexpected,
        })
    }
}
