use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{Dense, DenseConfig, Module, Parameter};
use crate::{PreglyphErr, Result, initialization::seeded_rng};

/// The params `model.Sequential` is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialConfig {
    pub layers: Vec<DenseConfig>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// A stack of dense layers, each feeding the next one.
#[derive(Debug, Clone)]
pub struct Sequential {
    name: String,
    layers: Vec<Dense>,
}

impl Sequential {
    /// Builds and initializes a `Sequential` model.
    ///
    /// Layers draw their values in order from a single rng, so a seed fixes the whole model.
    ///
    /// # Arguments
    /// * `config` - The layers and the optional seed.
    ///
    /// # Returns
    /// The model, an `InvalidConfig` if it has no layers or adjacent layers don't fit, or an
    /// `Init` error if a layer's initialization can't be sampled.
    pub fn new(config: SequentialConfig) -> Result<Self> {
        Self::validate(&config.layers)?;

        let mut rng = seeded_rng(config.seed);
        let layers = config
            .layers
            .iter()
            .map(|layer| {
                let values = layer.init.sample(&mut rng, layer.size(), layer.dim)?;
                Dense::new(layer, values)
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            name: "Sequential".into(),
            layers,
        })
    }

    fn validate(layers: &[DenseConfig]) -> Result<()> {
        if layers.is_empty() {
            return Err(PreglyphErr::InvalidConfig(
                "model must have at least one layer".into(),
            ));
        }

        for (i, pair) in layers.windows(2).enumerate() {
            let (_, prev_m) = pair[0].dim;
            let (curr_n, _) = pair[1].dim;
            if prev_m != curr_n {
                return Err(PreglyphErr::InvalidConfig(format!(
                    "layer {}: input size ({curr_n}) does not match previous layer output size ({prev_m})",
                    i + 1
                )));
            }
        }

        Ok(())
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Makes a forward pass through every layer.
    ///
    /// # Arguments
    /// * `x` - A `batch x n` input where `n` is the first layer's input size.
    ///
    /// # Returns
    /// The model's prediction.
    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut layers = self.layers.iter();
        let Some(first) = layers.next() else {
            return Ok(x.to_owned());
        };

        let mut y = first.forward(x)?;
        for layer in layers {
            y = layer.forward(y.view())?;
        }

        Ok(y)
    }
}

impl Module for Sequential {
    fn name(&self) -> &str {
        &self.name
    }

    fn named_parameters(&self) -> Vec<(String, &Parameter)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                [
                    (format!("layers.{i}.weight"), layer.weight()),
                    (format!("layers.{i}.bias"), layer.bias()),
                ]
            })
            .collect()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Parameter)> {
        self.layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .params_mut()
                    .map(|(kind, param)| (format!("layers.{i}.{kind}"), param))
            })
            .collect()
    }
}
