use std::{
    fmt::{self, Display},
    io::Write,
};

use crate::{PreglyphErr, Result, model::Module};

/// The amount of scalars a model holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamCount {
    pub model: String,
    pub total: usize,
}

impl ParamCount {
    /// Returns the total in millions.
    pub fn millions(&self) -> f64 {
        self.total as f64 * 1e-6
    }
}

impl Display for ParamCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} has {:.2} M params.", self.model, self.millions())
    }
}

/// Counts the elements of every parameter of `model` and logs the result.
///
/// # Arguments
/// * `model` - The model to count.
///
/// # Returns
/// The count, formatted as `<Name> has <x.xx> M params.` when displayed.
pub fn count_params(model: &dyn Module) -> ParamCount {
    let total = model
        .named_parameters()
        .iter()
        .map(|(_, param)| param.numel())
        .sum();

    let count = ParamCount {
        model: model.name().to_string(),
        total,
    };

    log::info!("{count}");
    count
}

/// Counts the parameters of `model` and writes the count as a status line to `out`.
pub fn report_params<W: Write>(model: &dyn Module, out: &mut W) -> Result<ParamCount> {
    let count = count_params(model);
    writeln!(out, "{count}").map_err(PreglyphErr::Report)?;
    Ok(count)
}

/// Returns whether every parameter of `model` requires grad.
pub fn module_requires_grad(model: &dyn Module) -> bool {
    model
        .named_parameters()
        .iter()
        .all(|(_, param)| param.requires_grad)
}

#[cfg(test)]
mod tests {
    use ndarray::ArrayD;

    use super::*;
    use crate::model::Parameter;

    struct Fixed {
        params: Vec<(String, Parameter)>,
    }

    impl Fixed {
        fn new(sizes: &[usize]) -> Self {
            let params = sizes
                .iter()
                .enumerate()
                .map(|(i, &n)| (format!("p{i}"), Parameter::new(ArrayD::zeros(vec![n]))))
                .collect();

            Self { params }
        }
    }

    impl Module for Fixed {
        fn name(&self) -> &str {
            "Fixed"
        }

        fn named_parameters(&self) -> Vec<(String, &Parameter)> {
            self.params.iter().map(|(n, p)| (n.clone(), p)).collect()
        }

        fn named_parameters_mut(&mut self) -> Vec<(String, &mut Parameter)> {
            self.params.iter_mut().map(|(n, p)| (n.clone(), p)).collect()
        }
    }

    #[test]
    fn reports_millions_with_two_decimals() {
        let model = Fixed::new(&[1_000_000, 500_000]);
        let count = count_params(&model);

        assert_eq!(count.total, 1_500_000);
        assert_eq!(count.to_string(), "Fixed has 1.50 M params.");
    }

    #[test]
    fn report_writes_the_status_line() {
        let mut out = Vec::new();
        let count = report_params(&Fixed::new(&[1_000_000, 500_000]), &mut out).unwrap();

        assert_eq!(count.total, 1_500_000);
        assert_eq!(String::from_utf8(out).unwrap(), "Fixed has 1.50 M params.\n");
    }

    #[test]
    fn empty_model_has_no_params() {
        let count = count_params(&Fixed::new(&[]));
        assert_eq!(count.to_string(), "Fixed has 0.00 M params.");
    }

    #[test]
    fn requires_grad_needs_every_param() {
        let mut model = Fixed::new(&[2, 3]);
        assert!(module_requires_grad(&model));

        model.params[1].1.requires_grad = false;
        assert!(!module_requires_grad(&model));

        assert!(module_requires_grad(&Fixed::new(&[])));
    }
}
