use crate::error::OptimizerError;
use crate::simulation::FoxTemplate;
use crate::types::{Parameter, ParameterKind};

/// The named, bounded design variables of the instrument, in canonical
/// order. The order is fixed at construction and every parameter vector
/// in the engine follows it.
#[derive(Clone, Debug)]
pub struct ParameterSpace {
    params: Vec<Parameter>,
}

impl ParameterSpace {
    /// Build the space from the declared names, reading each parameter's
    /// nominal value from the template's assignment statement and its
    /// bounds from the kind table.
    ///
    /// Fails with `UnknownParameterKind` if a name matches no naming
    /// convention, and with a placeholder error if the template does not
    /// assign it exactly once. Both are startup bugs, not run-time
    /// conditions.
    pub fn from_template(names: &[&str], template: &FoxTemplate) -> Result<Self, OptimizerError> {
        let mut params = Vec::with_capacity(names.len());
        for &name in names {
            let kind = ParameterKind::from_name(name)?;
            let (min_val, max_val) = kind.bounds();
            let value = template.nominal(name)?;
            params.push(Parameter {
                name: name.to_string(),
                kind,
                value,
                min_val,
                max_val,
            });
        }
        Ok(Self { params })
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Nominal design values, in canonical order.
    pub fn defaults(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    /// One `(lower, upper)` pair per parameter, in canonical order.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.params.iter().map(|p| (p.min_val, p.max_val)).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}
