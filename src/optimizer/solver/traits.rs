use crate::error::OptimizerError;

#[derive(Clone, Debug)]
pub struct SolverResult {
    pub success: bool,
    pub cost: f64,
    pub iterations: u32,
    pub message: String,
    pub params: Vec<f64>,
    pub cost_evals: usize,
}

/// Callback interface for optimization progress
pub trait OptimizationCallback {
    /// Called at each iteration with the current best vertex and cost
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64)
    -> Result<(), OptimizerError>;

    /// Check if optimization should stop early
    fn should_stop(&self) -> bool {
        false
    }
}

/// Core problem definition - just the essentials
///
/// The solver treats `cost` as opaque and blocking; it knows nothing of
/// the cache, the adapter, or the inner constraint solve beneath it.
pub trait Problem {
    /// Evaluate cost for given parameters (runs the simulator)
    fn cost(&self, params: &[f64]) -> Result<f64, OptimizerError>;

    /// Number of parameters
    fn num_params(&self) -> usize;

    /// Initial parameter values
    fn initial_params(&self) -> &[f64];

    /// Parameter bounds (min, max) for each parameter
    fn bounds(&self) -> &[(f64, f64)];
}

/// Solver interface - takes problem and callback
pub trait Solver {
    fn name(&self) -> &str;

    /// Solve the optimization problem with callback for progress tracking
    fn solve(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult, OptimizerError>;
}
