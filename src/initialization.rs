use std::fmt::Display;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::{PreglyphErr, Result};

/// How a layer's parameters should be initialized.
///
/// Fan-in and fan-out based variants take them from the layer they're attached to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitConfig {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    UniformInclusive { low: f32, high: f32 },
    /// Glorot uniform, `U(-a, a)` with `a = sqrt(6 / (fan_in + fan_out))`.
    XavierUniform,
    /// `U(-a, a)` with `a = sqrt(3 / fan_in)`.
    LecunUniform,
    Normal { mean: f32, std_dev: f32 },
    /// He normal, `N(0, 2 / fan_in)`.
    Kaiming,
    /// Glorot normal, `N(0, 2 / (fan_in + fan_out))`.
    Xavier,
    /// `N(0, 1 / fan_in)`.
    Lecun,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self::Const { value: 0. }
    }
}

impl InitConfig {
    /// Draws the initial values of a layer.
    ///
    /// # Arguments
    /// * `rng` - The generator shared by every layer of the model.
    /// * `n` - How many values to draw.
    /// * `fan_in` - Input units of the layer.
    /// * `fan_out` - Output units of the layer.
    ///
    /// # Returns
    /// `n` values, or an `Init` error if the distribution can't be built out of this config
    /// and the layer's fans.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n: usize,
        (fan_in, fan_out): (usize, usize),
    ) -> Result<Vec<f32>> {
        let fan_sum = (fan_in + fan_out) as f32;
        let fan_in = fan_in as f32;

        let values = match *self {
            Self::Const { value } => vec![value; n],
            Self::Uniform { low, high } => {
                draw(rng, n, Uniform::new(low, high).map_err(|e| self.invalid(e))?)
            }
            Self::UniformInclusive { low, high } => draw(
                rng,
                n,
                Uniform::new_inclusive(low, high).map_err(|e| self.invalid(e))?,
            ),
            Self::XavierUniform => self.symmetric_uniform(rng, n, (6. / fan_sum).sqrt())?,
            Self::LecunUniform => self.symmetric_uniform(rng, n, (3. / fan_in).sqrt())?,
            Self::Normal { mean, std_dev } => self.normal(rng, n, mean, std_dev)?,
            Self::Kaiming => self.normal(rng, n, 0., (2. / fan_in).sqrt())?,
            Self::Xavier => self.normal(rng, n, 0., (2. / fan_sum).sqrt())?,
            Self::Lecun => self.normal(rng, n, 0., (1. / fan_in).sqrt())?,
        };

        Ok(values)
    }

    fn symmetric_uniform<R: Rng + ?Sized>(&self, rng: &mut R, n: usize, a: f32) -> Result<Vec<f32>> {
        let dist = Uniform::new(-a, a).map_err(|e| self.invalid(e))?;
        Ok(draw(rng, n, dist))
    }

    fn normal<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        n: usize,
        mean: f32,
        std_dev: f32,
    ) -> Result<Vec<f32>> {
        let dist = Normal::new(mean, std_dev).map_err(|e| self.invalid(e))?;
        Ok(draw(rng, n, dist))
    }

    fn invalid(&self, reason: impl Display) -> PreglyphErr {
        PreglyphErr::Init(format!("{self:?}: {reason}"))
    }
}

fn draw<R: Rng + ?Sized, D: Distribution<f32>>(rng: &mut R, n: usize, dist: D) -> Vec<f32> {
    (0..n).map(|_| dist.sample(rng)).collect()
}

/// Creates the model's rng, seeded when a seed is given.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_snake_case() {
        let init: InitConfig = serde_json::from_value(json!({ "const": { "value": 1.5 } })).unwrap();
        assert_eq!(init, InitConfig::Const { value: 1.5 });

        let init: InitConfig = serde_json::from_value(json!("xavier_uniform")).unwrap();
        assert_eq!(init, InitConfig::XavierUniform);
    }

    #[test]
    fn const_fills_every_value() {
        let values = InitConfig::Const { value: 2. }
            .sample(&mut seeded_rng(Some(0)), 3, (1, 1))
            .unwrap();

        assert_eq!(values, [2., 2., 2.]);
    }

    #[test]
    fn same_seed_same_values() {
        let init = InitConfig::Kaiming;
        let a = init.sample(&mut seeded_rng(Some(42)), 16, (4, 4)).unwrap();
        let b = init.sample(&mut seeded_rng(Some(42)), 16, (4, 4)).unwrap();
        let c = init.sample(&mut seeded_rng(Some(43)), 16, (4, 4)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn xavier_uniform_stays_in_range() {
        let a = (6f32 / 5.).sqrt();
        let values = InitConfig::XavierUniform
            .sample(&mut seeded_rng(Some(1)), 1000, (2, 3))
            .unwrap();

        assert_eq!(values.len(), 1000);
        assert!(values.iter().all(|v| (-a..=a).contains(v)));
    }

    #[test]
    fn uniform_inclusive_allows_a_point() {
        let values = InitConfig::UniformInclusive { low: 1., high: 1. }
            .sample(&mut seeded_rng(Some(1)), 4, (1, 1))
            .unwrap();

        assert_eq!(values, [1.; 4]);
    }

    #[test]
    fn invalid_distributions_are_errors() {
        let mut rng = seeded_rng(Some(0));

        let err = InitConfig::Uniform { low: 2., high: 1. }
            .sample(&mut rng, 3, (1, 1))
            .unwrap_err();
        assert!(matches!(err, PreglyphErr::Init(_)));

        let err = InitConfig::Normal {
            mean: 0.,
            std_dev: f32::NAN,
        }
        .sample(&mut rng, 3, (1, 1))
        .unwrap_err();
        assert!(err.is_config());

        // Fan based variants need a non empty layer.
        assert!(InitConfig::Lecun.sample(&mut rng, 3, (0, 1)).is_err());
    }
}
