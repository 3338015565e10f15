use crate::cache::EvalCache;
use crate::core::ParameterSpace;
use crate::error::OptimizerError;
use crate::simulation::Evaluator;

/// Probes per parameter before giving up; each probe shrinks the step by
/// a third of a decade, so this spans ten decades of perturbation.
const MAX_PROBES: u32 = 30;

/// Acceptance band for one observable around the unperturbed baseline.
#[derive(Clone, Debug)]
pub struct Margin {
    /// Report label of the observable.
    pub label: String,
    /// Allowed excursion below baseline (typically negative or -inf).
    pub lower: f64,
    /// Allowed excursion above baseline.
    pub upper: f64,
    /// Parameter that actively corrects this observable during alignment.
    /// While a *different* parameter is being perturbed, excursions here
    /// are ignored — the controller will absorb them.
    pub controller: Option<String>,
}

impl Margin {
    pub fn new(label: &str, lower: f64, upper: f64) -> Self {
        Self {
            label: label.to_string(),
            lower,
            upper,
            controller: None,
        }
    }

    pub fn controlled_by(mut self, parameter: &str) -> Self {
        self.controller = Some(parameter.to_string());
        self
    }
}

/// Engineering-tolerance analysis around the nominal design.
///
/// Answers "how far can each parameter drift before some observable
/// leaves its band?" — every probe is a full simulator run through the
/// cache, so reruns of the analysis are cheap.
pub struct ToleranceFinder<'a> {
    space: &'a ParameterSpace,
    evaluator: &'a dyn Evaluator,
    cache: &'a mut EvalCache,
    margins: Vec<Margin>,
    /// Observable values at the nominal design, one per margin.
    baseline: Vec<f64>,
}

impl std::fmt::Debug for ToleranceFinder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToleranceFinder")
            .field("margins", &self.margins)
            .field("baseline", &self.baseline)
            .finish_non_exhaustive()
    }
}

impl<'a> ToleranceFinder<'a> {
    /// Evaluates the nominal design once to fix the baseline. A failed or
    /// saturated baseline makes the whole analysis meaningless and is
    /// fatal here, unlike during optimization.
    pub fn new(
        space: &'a ParameterSpace,
        evaluator: &'a dyn Evaluator,
        cache: &'a mut EvalCache,
        margins: Vec<Margin>,
    ) -> Result<Self, OptimizerError> {
        let defaults = space.defaults();
        let report = cache.get_or_compute(&defaults, |values| evaluator.evaluate(values))?;
        if let Some(line) = report.failure() {
            return Err(OptimizerError::SimulationFailed(format!(
                "nominal design failed: {line}"
            )));
        }
        let mut baseline = Vec::with_capacity(margins.len());
        for margin in &margins {
            let value = report.metric(&margin.label)?;
            match value.finite() {
                Some(v) => baseline.push(v),
                None => {
                    return Err(OptimizerError::SimulationFailed(format!(
                        "baseline value for '{}' is saturated",
                        margin.label
                    )));
                }
            }
        }
        Ok(Self {
            space,
            evaluator,
            cache,
            margins,
            baseline,
        })
    }

    pub fn baseline(&self) -> &[f64] {
        &self.baseline
    }

    /// The nominal design with parameter `index` displaced by `step`.
    fn perturbed(&self, index: usize, step: f64) -> Vec<f64> {
        let mut values = self.space.defaults();
        values[index] += step;
        values
    }

    /// Margined observable values at `values`; saturation maps to +inf so
    /// it can never pass an acceptance check.
    fn observables(&mut self, values: &[f64]) -> Result<Vec<f64>, OptimizerError> {
        let evaluator = self.evaluator;
        let report = self
            .cache
            .get_or_compute(values, |v| evaluator.evaluate(v))?;
        if report.failure().is_some() {
            return Ok(vec![f64::INFINITY; self.margins.len()]);
        }
        self.margins
            .iter()
            .map(|m| report.metric(&m.label).map(|v| v.as_cost()))
            .collect()
    }

    /// Does this set of observables keep every margin that matters while
    /// `perturbed` is the parameter being moved?
    fn is_acceptable(&self, observables: &[f64], perturbed: &str) -> bool {
        for ((margin, &value), &base) in self
            .margins
            .iter()
            .zip(observables)
            .zip(&self.baseline)
        {
            if let Some(controller) = &margin.controller {
                if controller != perturbed {
                    continue;
                }
            }
            if !value.is_finite() {
                return false;
            }
            let excursion = value - base;
            if excursion < margin.lower || excursion > margin.upper {
                return false;
            }
        }
        true
    }

    /// Largest |step| at or below |initial_step| that keeps every margined
    /// observable in band. Probes shrink by 0.1^(1/3) per rejection and
    /// keep the sign of `initial_step`.
    pub fn find_tolerance(
        &mut self,
        index: usize,
        initial_step: f64,
    ) -> Result<f64, OptimizerError> {
        let name = self.space.params()[index].name.clone();
        let mut step = initial_step;
        for _ in 0..MAX_PROBES {
            let values = self.perturbed(index, step);
            let observables = self.observables(&values)?;
            if self.is_acceptable(&observables, &name) {
                return Ok(step.abs());
            }
            step *= 0.1_f64.powf(1.0 / 3.0);
        }
        Err(OptimizerError::ToleranceNotFound {
            parameter: name,
            probes: MAX_PROBES,
        })
    }

    /// Central-difference slope of each margined observable with respect
    /// to parameter `index`, at the nominal design.
    pub fn sensitivity(&mut self, index: usize, step: f64) -> Result<Vec<f64>, OptimizerError> {
        let up = self.perturbed(index, step);
        let down = self.perturbed(index, -step);
        let plus = self.observables(&up)?;
        let minus = self.observables(&down)?;
        Ok(plus
            .iter()
            .zip(&minus)
            .map(|(p, m)| (p - m) / (2.0 * step))
            .collect())
    }

    /// Worst-case range of each observable when every parameter moves by
    /// its tolerance simultaneously, each in the direction its slope
    /// indicates. Returns one `(minimum, maximum)` pair per margin.
    pub fn compound_extremes(
        &mut self,
        tolerances: &[f64],
    ) -> Result<Vec<(f64, f64)>, OptimizerError> {
        assert_eq!(tolerances.len(), self.space.len());

        let mut slopes = Vec::with_capacity(tolerances.len());
        for (i, &tol) in tolerances.iter().enumerate() {
            slopes.push(self.sensitivity(i, tol)?);
        }

        let defaults = self.space.defaults();
        let mut extremes = Vec::with_capacity(self.margins.len());
        for j in 0..self.margins.len() {
            let shifted = |direction: f64| -> Vec<f64> {
                defaults
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| v + direction * tolerances[i] * slopes[i][j].signum())
                    .collect()
            };
            let low = self.observables(&shifted(-1.0))?[j];
            let high = self.observables(&shifted(1.0))?[j];
            extremes.push((low.min(high), low.max(high)));
        }
        Ok(extremes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{FoxTemplate, SimulationReport};
    use tempfile::TempDir;

    // Linear surrogate: tilt responds to both multipoles, bend distance
    // to the octupole alone, and the time width to both.
    struct LinearSimulator;

    impl Evaluator for LinearSimulator {
        fn evaluate(&self, values: &[f64]) -> Result<SimulationReport, OptimizerError> {
            let (hex, oct) = (values[0], values[1]);
            Ok(SimulationReport::new(format!(
                "Tilt Angle(deg)     {}\n\
                 p-dist(mm)          {}\n\
                 Time Resol.(ps)     {}\n",
                10.0 * hex + 100.0 * oct,
                50.0 * oct,
                10.0 + hex.abs() + oct.abs(),
            )))
        }
    }

    fn space() -> ParameterSpace {
        let template = FoxTemplate::from_text("strength_H2 := 0.0;\nstrength_O := 0.0;\n");
        ParameterSpace::from_template(&["strength_H2", "strength_O"], &template).unwrap()
    }

    fn margins() -> Vec<Margin> {
        vec![
            Margin::new("Tilt Angle(deg)", -1.0, 1.0).controlled_by("strength_H2"),
            Margin::new("p-dist(mm)", -1.0, 1.0).controlled_by("strength_O"),
            Margin::new("Time Resol.(ps)", f64::NEG_INFINITY, 3.0),
        ]
    }

    #[test]
    fn baseline_is_the_nominal_design() {
        let space = space();
        let dir = TempDir::new().unwrap();
        let mut cache = EvalCache::open(dir.path().join("cache.json")).unwrap();
        let finder = ToleranceFinder::new(&space, &LinearSimulator, &mut cache, margins()).unwrap();
        assert_eq!(finder.baseline(), &[0.0, 0.0, 10.0]);
    }

    #[test]
    fn tolerance_shrinks_until_observables_stay_in_band() {
        let space = space();
        let dir = TempDir::new().unwrap();
        let mut cache = EvalCache::open(dir.path().join("cache.json")).unwrap();
        let mut finder =
            ToleranceFinder::new(&space, &LinearSimulator, &mut cache, margins()).unwrap();

        // tilt = 10 * hex must stay within ±1, so |hex| <= 0.1; starting
        // from 1.0 the probe shrinks by 10^(-1/3) per step and first
        // passes at 10^(-1/3 * 4) ≈ 0.0464
        let tol = finder.find_tolerance(0, 1.0).unwrap();
        assert!(tol <= 0.1);
        assert!(tol > 0.1 * 0.1_f64.powf(1.0 / 3.0));
    }

    #[test]
    fn controlled_observables_are_ignored_for_other_parameters() {
        let space = space();
        let dir = TempDir::new().unwrap();
        let mut cache = EvalCache::open(dir.path().join("cache.json")).unwrap();
        let mut finder =
            ToleranceFinder::new(&space, &LinearSimulator, &mut cache, margins()).unwrap();

        // perturbing the octupole by 0.02 drives tilt to 2.0, far out of
        // its band — but tilt belongs to the hexapole and is not
        // consulted here, so the probe passes on the first try
        let tol = finder.find_tolerance(1, 0.02).unwrap();
        assert_eq!(tol, 0.02);
    }

    #[test]
    fn sensitivity_recovers_linear_slopes() {
        let space = space();
        let dir = TempDir::new().unwrap();
        let mut cache = EvalCache::open(dir.path().join("cache.json")).unwrap();
        let mut finder =
            ToleranceFinder::new(&space, &LinearSimulator, &mut cache, margins()).unwrap();

        let slopes = finder.sensitivity(0, 0.01).unwrap();
        assert!((slopes[0] - 10.0).abs() < 1e-9);
        assert!(slopes[1].abs() < 1e-9);
    }

    #[test]
    fn compound_extremes_bracket_the_baseline() {
        let space = space();
        let dir = TempDir::new().unwrap();
        let mut cache = EvalCache::open(dir.path().join("cache.json")).unwrap();
        let mut finder =
            ToleranceFinder::new(&space, &LinearSimulator, &mut cache, margins()).unwrap();

        // tilt slopes are +10 (hex) and +100 (oct), so the worst case is
        // both tolerances in the same direction: 10*0.05 + 100*0.01
        let extremes = finder.compound_extremes(&[0.05, 0.01]).unwrap();
        let (tilt_min, tilt_max) = extremes[0];
        assert!(tilt_min <= 0.0 && 0.0 <= tilt_max);
        assert!((tilt_max - 1.5).abs() < 1e-9);
    }

    #[test]
    fn failed_nominal_design_is_fatal() {
        struct Broken;
        impl Evaluator for Broken {
            fn evaluate(&self, _: &[f64]) -> Result<SimulationReport, OptimizerError> {
                Ok(SimulationReport::new(" *** ERROR: LOST RAY ***\n"))
            }
        }
        let space = space();
        let dir = TempDir::new().unwrap();
        let mut cache = EvalCache::open(dir.path().join("cache.json")).unwrap();
        let err = ToleranceFinder::new(&space, &Broken, &mut cache, margins()).unwrap_err();
        assert!(matches!(err, OptimizerError::SimulationFailed(_)));
    }
}
