use std::cell::RefCell;

use super::solver::{BracketPolicy, Problem, find_root};
use crate::cache::EvalCache;
use crate::core::ParameterSpace;
use crate::error::OptimizerError;
use crate::simulation::report::{ENERGY_RESOLUTION, TILT_ANGLE, TIME_RESOLUTION, TIME_SKEW};
use crate::simulation::{Evaluator, SimulationReport};

/// Coefficients of the composite figure of merit.
#[derive(Clone, Copy, Debug)]
pub struct ObjectiveWeights {
    /// Tilt magnitude (deg) below which the penalty stays negligible.
    pub tilt_soft_limit: f64,
    /// Scale (ps) of the exponential tilt penalty.
    pub tilt_weight: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            tilt_soft_limit: 1.0,
            tilt_weight: 1.0,
        }
    }
}

/// A parameter tuned per evaluation instead of searched by the outer
/// optimizer: before each cost evaluation it is root-found so `metric`
/// hits `target` over `bracket`, with the remaining parameters held
/// fixed.
#[derive(Clone, Debug)]
pub struct FreeParameter {
    /// Position in the canonical parameter order.
    pub index: usize,
    /// Report label of the observable the tuning drives.
    pub metric: String,
    pub target: f64,
    pub bracket: (f64, f64),
    /// Relative tolerance on the tuned value.
    pub rtol: f64,
    pub policy: BracketPolicy,
}

/// The spectrometer design problem.
///
/// Owns the adapter and the cache; the outer optimizer sees only the
/// `Problem` trait and works on the reduced vector (the free parameter,
/// when one is declared, is excluded from the search space and solved
/// inside every cost evaluation).
pub struct DesignProblem {
    space: ParameterSpace,
    evaluator: Box<dyn Evaluator>,
    cache: RefCell<EvalCache>,
    free: Option<FreeParameter>,
    weights: ObjectiveWeights,
    // reduced views, free parameter excluded
    initial: Vec<f64>,
    bounds: Vec<(f64, f64)>,
}

impl DesignProblem {
    pub fn new(
        space: ParameterSpace,
        evaluator: Box<dyn Evaluator>,
        cache: EvalCache,
        free: Option<FreeParameter>,
        weights: ObjectiveWeights,
    ) -> Result<Self, OptimizerError> {
        if let Some(free) = &free {
            assert!(
                free.index < space.len(),
                "free parameter index {} out of range for {} parameters",
                free.index,
                space.len()
            );
        }
        let skip = free.as_ref().map(|f| f.index);
        let initial = reduced(&space.defaults(), skip);
        let bounds = reduced(&space.bounds(), skip);
        Ok(Self {
            space,
            evaluator,
            cache: RefCell::new(cache),
            free,
            weights,
            initial,
            bounds,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// One memoized simulator run for a full parameter vector.
    fn evaluate(&self, params: &[f64]) -> Result<SimulationReport, OptimizerError> {
        let evaluator = &self.evaluator;
        self.cache
            .borrow_mut()
            .get_or_compute(params, |values| evaluator.evaluate(values))
    }

    /// Splice a tuned value into the reduced vector at the free index.
    fn full_vector(params: &[f64], index: usize, free_value: f64) -> Vec<f64> {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.extend_from_slice(&params[..index]);
        full.push(free_value);
        full.extend_from_slice(&params[index..]);
        full
    }

    /// Tune the free parameter so its observable hits the target, with
    /// the reduced vector held fixed. Every trial value is a full
    /// simulator run through the cache. A failed or saturated trial
    /// report yields an infinite residual, which disables interpolation
    /// for that step without aborting the solve.
    pub fn solve_free_parameter(
        &self,
        params: &[f64],
        free: &FreeParameter,
    ) -> Result<f64, OptimizerError> {
        let residual = |value: f64| -> Result<f64, OptimizerError> {
            let full = Self::full_vector(params, free.index, value);
            let report = self.evaluate(&full)?;
            if report.failure().is_some() {
                return Ok(f64::INFINITY);
            }
            Ok(report.metric(&free.metric)?.as_cost() - free.target)
        };
        find_root(residual, free.bracket, free.rtol, &free.metric, free.policy)
    }

    /// The full design vector for a reduced one, with the free parameter
    /// tuned. Cheap after an optimization run: every evaluation it needs
    /// is already cached.
    pub fn expand(&self, params: &[f64]) -> Result<Vec<f64>, OptimizerError> {
        match &self.free {
            Some(free) => {
                let tuned = self.solve_free_parameter(params, free)?;
                Ok(Self::full_vector(params, free.index, tuned))
            }
            None => Ok(params.to_vec()),
        }
    }

    /// Exponential soft penalty on the focal-plane tilt. Continuous and
    /// strictly increasing in |tilt|; negligible below the soft limit,
    /// dominant far above it, so the search space stays smooth while
    /// large tilts are effectively forbidden.
    fn tilt_penalty(&self, tilt: f64) -> f64 {
        self.weights.tilt_weight * ((tilt.abs() / self.weights.tilt_soft_limit).exp() - 1.0)
    }

    /// Composite figure of merit (ps) for a completed report: the time-
    /// and energy-domain widths combined in quadrature through the
    /// reported time-skew factor, plus the tilt penalty. Saturation in
    /// any input makes the whole cost infinite — a barely-overflowing
    /// region must not look attractive.
    fn figure_of_merit(&self, report: &SimulationReport) -> Result<f64, OptimizerError> {
        if report.failure().is_some() {
            return Ok(f64::INFINITY);
        }
        let tof_width = report.metric(TIME_RESOLUTION)?;
        let energy_width = report.metric(ENERGY_RESOLUTION)?;
        let tilt = report.metric(TILT_ANGLE)?;
        let time_skew = report.metric(TIME_SKEW)?;
        let (Some(tof_width), Some(energy_width), Some(tilt), Some(time_skew)) = (
            tof_width.finite(),
            energy_width.finite(),
            tilt.finite(),
            time_skew.finite(),
        ) else {
            return Ok(f64::INFINITY);
        };

        let resolution = (tof_width.powi(2) + (energy_width * time_skew).powi(2)).sqrt();
        Ok(resolution + self.tilt_penalty(tilt))
    }
}

fn reduced<T: Copy>(values: &[T], skip: Option<usize>) -> Vec<T> {
    values
        .iter()
        .enumerate()
        .filter(|&(i, _)| Some(i) != skip)
        .map(|(_, &v)| v)
        .collect()
}

impl Problem for DesignProblem {
    fn cost(&self, params: &[f64]) -> Result<f64, OptimizerError> {
        let full = self.expand(params)?;
        let report = self.evaluate(&full)?;
        self.figure_of_merit(&report)
    }

    fn num_params(&self) -> usize {
        self.initial.len()
    }

    fn initial_params(&self) -> &[f64] {
        &self.initial
    }

    fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }
}
