use crate::error::OptimizerError;

// ===== ENUMS =====

/// Physical family of a design parameter. The family fixes the bound
/// interval: an unbounded or mis-bounded design variable can drive the
/// simulator into configurations with no physical meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    /// Relative multipole excitation (dimensionless).
    FieldStrength,
    /// Drift or aperture gap (m).
    GapLength,
    /// Dipole bend angle (deg).
    BendAngle,
    /// Focal-plane tilt (deg).
    PlaneTilt,
    /// Focal-plane curvature (1/m).
    PlaneCurvature,
}

impl ParameterKind {
    /// Infer the kind from the parameter's name.
    ///
    /// The convention is the template's: `strength_Q1`, `length_H2`,
    /// `aperture_distance`, `tiltx_O`, and so on. A name matching no
    /// family is fatal at startup.
    pub fn from_name(name: &str) -> Result<Self, OptimizerError> {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("strength_") {
            Ok(Self::FieldStrength)
        } else if lower.starts_with("length_")
            || lower.starts_with("gap_")
            || lower.starts_with("aperture_")
        {
            Ok(Self::GapLength)
        } else if lower.starts_with("bend_") || lower.starts_with("angle_") {
            Ok(Self::BendAngle)
        } else if lower.starts_with("tilt") {
            Ok(Self::PlaneTilt)
        } else if lower.starts_with("curv") {
            Ok(Self::PlaneCurvature)
        } else {
            Err(OptimizerError::UnknownParameterKind(name.to_string()))
        }
    }

    /// Bound interval for this kind.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Self::FieldStrength => (-0.05, 0.05),
            Self::GapLength => (0.0, 5.0),
            Self::BendAngle => (0.0, 90.0),
            Self::PlaneTilt => (-45.0, 45.0),
            Self::PlaneCurvature => (-1.0, 1.0),
        }
    }
}

// ===== CORE DATA TYPES =====

/// One tunable physical property of the instrument.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub value: f64,
    pub min_val: f64,
    pub max_val: f64,
}

impl Parameter {
    pub fn clamp(&mut self) {
        self.value = self.value.clamp(self.min_val, self.max_val);
    }

    pub fn is_within_bounds(&self) -> bool {
        self.value >= self.min_val && self.value <= self.max_val
    }
}

/// A scalar the simulator reported: either a number, or the saturation
/// placeholder it prints as a field of asterisks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Value(f64),
    Overflow,
}

impl MetricValue {
    /// The value as a minimization cost; saturation is worst-case.
    pub fn as_cost(self) -> f64 {
        match self {
            Self::Value(v) => v,
            Self::Overflow => f64::INFINITY,
        }
    }

    pub fn is_overflow(self) -> bool {
        matches!(self, Self::Overflow)
    }

    pub fn finite(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Overflow => None,
        }
    }
}

/// Outcome of an optimization run.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
    pub success: bool,
    pub cost: f64,
    pub iterations: u32,
    pub message: String,
    pub parameters: Vec<Parameter>,
}

impl OptimizationResult {
    pub fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}
