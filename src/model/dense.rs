use ndarray::{Array1, Array2, ArrayView2, Ix1, Ix2};
use serde::{Deserialize, Serialize};

use super::Parameter;
use crate::{PreglyphErr, Result, initialization::InitConfig};

/// The activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnConfig {
    Sigmoid { amp: f32 },
    Relu,
}

impl ActFnConfig {
    fn f(&self, z: f32) -> f32 {
        match *self {
            Self::Sigmoid { amp } => amp / (1. + (-z).exp()),
            Self::Relu => z.max(0.),
        }
    }
}

fn trainable_by_default() -> bool {
    true
}

/// The params of a single dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DenseConfig {
    /// `(inputs, outputs)`.
    pub dim: (usize, usize),
    #[serde(default)]
    pub init: InitConfig,
    #[serde(default)]
    pub act_fn: Option<ActFnConfig>,
    #[serde(default = "trainable_by_default")]
    pub trainable: bool,
}

impl DenseConfig {
    /// The amount of values a dense layer of this shape holds, weights then bias.
    pub fn size(&self) -> usize {
        let (n, m) = self.dim;
        (n + 1) * m
    }
}

/// A fully connected layer computing `act_fn(x · W + b)`.
#[derive(Debug, Clone)]
pub struct Dense {
    weight: Parameter,
    bias: Parameter,
    act_fn: Option<ActFnConfig>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `config` - The layer's shape, activation and whether it's trainable.
    /// * `values` - Exactly `config.size()` values, the `n x m` weights then the `m` biases.
    ///
    /// # Returns
    /// The layer or a `ShapeMismatch` if `values` has the wrong length.
    pub fn new(config: &DenseConfig, mut values: Vec<f32>) -> Result<Self> {
        let (n, m) = config.dim;
        if values.len() != config.size() {
            return Err(PreglyphErr::ShapeMismatch {
                name: "dense".into(),
                got: vec![values.len()],
                expected: vec![config.size()],
            });
        }

        let bias = values.split_off(n * m);
        let weight = Array2::from_shape_vec((n, m), values).map_err(|source| PreglyphErr::Shape {
            name: "dense.weight".into(),
            source,
        })?;

        let mut weight = Parameter::new(weight.into_dyn());
        let mut bias = Parameter::new(Array1::from_vec(bias).into_dyn());
        weight.requires_grad = config.trainable;
        bias.requires_grad = config.trainable;

        Ok(Self {
            weight,
            bias,
            act_fn: config.act_fn,
        })
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> &Parameter {
        &self.bias
    }

    pub(super) fn params_mut(&mut self) -> [(&'static str, &mut Parameter); 2] {
        [("weight", &mut self.weight), ("bias", &mut self.bias)]
    }

    /// Computes the layer's output for a batch of rows.
    ///
    /// # Arguments
    /// * `x` - A `batch x n` input.
    ///
    /// # Returns
    /// The `batch x m` output or a `ShapeMismatch` if `x` has the wrong width.
    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let as_shape_err = |source| PreglyphErr::Shape {
            name: "dense".into(),
            source,
        };

        let w = self.weight.value.view().into_dimensionality::<Ix2>().map_err(as_shape_err)?;
        let b = self.bias.value.view().into_dimensionality::<Ix1>().map_err(as_shape_err)?;

        if x.ncols() != w.nrows() {
            return Err(PreglyphErr::ShapeMismatch {
                name: "dense.input".into(),
                got: x.shape().to_vec(),
                expected: vec![x.nrows(), w.nrows()],
            });
        }

        let mut z = x.dot(&w) + &b;
        if let Some(act_fn) = &self.act_fn {
            z.mapv_inplace(|z| act_fn.f(z));
        }

        Ok(z)
    }
}
