mod problem;
pub mod solver;

pub use problem::{DesignProblem, FreeParameter, ObjectiveWeights};
pub use solver::{
    BracketPolicy, NelderMead, OptimizationCallback, Problem, Solver, SolverResult, find_root,
};

use crate::error::OptimizerError;
use crate::types::{OptimizationResult, Parameter};

/// Run configuration for the outer search.
pub struct Optimizer {
    pub max_iterations: u32,
    /// Simplex-diameter convergence threshold.
    pub xtol: f64,
    /// Cost-spread convergence threshold.
    pub ftol: f64,
    pub verbose: bool,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            xtol: 1e-6,
            ftol: 1e-4,
            verbose: false,
        }
    }
}

impl Optimizer {
    /// Search the design space and report the converged full parameter
    /// vector (tuned free parameter included) with its cost.
    pub fn optimize(&self, problem: &DesignProblem) -> Result<OptimizationResult, OptimizerError> {
        if self.verbose {
            println!("\n=== OPTIMIZATION START ===");
            println!("Parameters: {}", problem.space().len());
            println!("Search dimensions: {}", problem.num_params());
        }

        let mut solver = NelderMead::new(self.max_iterations, self.xtol, self.ftol);
        let mut callback = LogCallback::new(self.verbose, self.max_iterations);
        let result = solver.solve(problem, &mut callback)?;

        if self.verbose {
            callback.print_summary(result.success, &result.message);
            println!("Simulator cost evaluations: {}", result.cost_evals);
        }

        // splice the tuned free parameter back in; every evaluation this
        // needs is already cached
        let full = problem.expand(&result.params)?;
        let parameters: Vec<Parameter> = problem
            .space()
            .params()
            .iter()
            .zip(full.iter())
            .map(|(def, &value)| Parameter {
                value,
                ..def.clone()
            })
            .collect();

        Ok(OptimizationResult {
            success: result.success,
            cost: result.cost,
            iterations: result.iterations,
            message: result.message,
            parameters,
        })
    }
}

/// Iteration record kept by the callback.
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub params: Vec<f64>,
    pub cost: f64,
}

/// Tracks iteration history and prints progress when verbose.
pub struct LogCallback {
    verbose: bool,
    max_iterations: u32,
    iteration_count: u32,
    history: Vec<IterationResult>,
}

impl LogCallback {
    pub fn new(verbose: bool, max_iterations: u32) -> Self {
        Self {
            verbose,
            max_iterations,
            iteration_count: 0,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[IterationResult] {
        &self.history
    }

    pub fn print_summary(&self, success: bool, stop_reason: &str) {
        println!("\n{}", "=".repeat(60));
        println!("OPTIMIZATION SUMMARY");
        println!("{}", "=".repeat(60));
        println!(
            "Status: {}",
            if success { "converged" } else { "not converged" }
        );
        println!("Stop reason: {}", stop_reason);
        println!("Iterations: {}", self.history.len());
        if let Some(last) = self.history.last() {
            println!("Final cost: {:.4} ps", last.cost);
        }
        println!("{}", "=".repeat(60));
    }
}

impl OptimizationCallback for LogCallback {
    fn on_iteration(
        &mut self,
        iteration: u32,
        params: &[f64],
        cost: f64,
    ) -> Result<(), OptimizerError> {
        self.iteration_count = iteration;
        self.history.push(IterationResult {
            params: params.to_vec(),
            cost,
        });
        if self.verbose {
            println!("iter {:4}: {:?} -> {:.2} ps", iteration, params, cost);
        }
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }
}
