pub mod report;
mod runner;
mod template;

pub use report::SimulationReport;
pub use runner::FoxRunner;
pub use template::{FoxTemplate, ORDER_KNOB, STREAMLINE_KNOB};

use indexmap::IndexMap;

use crate::error::OptimizerError;

/// A physics engine that turns a parameter vector into a report.
///
/// The real implementation shells out to the external simulator; tests
/// substitute a stub. Implementations must be pure functions of the
/// vector apart from the process invocation itself — all memoization
/// lives in the cache, never here.
pub trait Evaluator {
    fn evaluate(&self, values: &[f64]) -> Result<SimulationReport, OptimizerError>;
}

/// Execution-mode overrides applied when the template exposes the knobs.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Force the streamlined execution mode.
    pub streamline: bool,
    /// Fix the perturbation expansion order.
    pub order: Option<u32>,
}

/// The simulation adapter: renders the template for a parameter vector and
/// runs the external code on it.
pub struct Simulator {
    template: FoxTemplate,
    runner: FoxRunner,
    names: Vec<String>,
    options: RunOptions,
}

impl Simulator {
    /// Validates the parameter list against the template's assignment set
    /// once, so a mismatch surfaces here and not miles into a run.
    pub fn new(
        template: FoxTemplate,
        runner: FoxRunner,
        names: Vec<String>,
        options: RunOptions,
    ) -> Result<Self, OptimizerError> {
        template.validate(&names)?;
        Ok(Self {
            template,
            runner,
            names,
            options,
        })
    }

    fn render(&self, values: &[f64]) -> Result<String, OptimizerError> {
        assert_eq!(
            values.len(),
            self.names.len(),
            "parameter vector length does not match the declared parameter list"
        );
        let mut map: IndexMap<String, f64> = IndexMap::with_capacity(self.names.len() + 2);
        for (name, &value) in self.names.iter().zip(values) {
            map.insert(name.clone(), value);
        }
        if self.options.streamline && self.template.has_assignment(STREAMLINE_KNOB) {
            map.insert(STREAMLINE_KNOB.to_string(), 1.0);
        }
        if let Some(order) = self.options.order {
            if self.template.has_assignment(ORDER_KNOB) {
                map.insert(ORDER_KNOB.to_string(), f64::from(order));
            }
        }
        self.template.render(&map)
    }
}

impl Evaluator for Simulator {
    fn evaluate(&self, values: &[f64]) -> Result<SimulationReport, OptimizerError> {
        let script = self.render(values)?;
        let text = self.runner.run(&script)?;
        Ok(SimulationReport::new(text))
    }
}
