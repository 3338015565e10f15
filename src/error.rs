use thiserror::Error;

/// Everything that can go wrong between a parameter vector and a cost.
///
/// Two families matter to callers: misconfiguration (`MetricNotFound`,
/// `UnknownParameterKind`, the placeholder variants) is never recovered
/// automatically, while "this design point is bad" conditions are folded
/// into an infinite cost upstream so the search continues past them.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// The external simulator process itself failed (non-zero exit).
    /// Never cached; the captured output is attached for diagnosis.
    #[error("simulator exited with {status}:\n{output}")]
    InvocationFailed {
        status: std::process::ExitStatus,
        output: String,
    },

    /// The simulator completed but its report is unusable where a valid
    /// report is mandatory (e.g. the tolerance baseline).
    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    /// A metric's label anchor is absent from the report. This is a
    /// template/report mismatch, not a bad design point.
    #[error("metric '{label}' not found in simulator report")]
    MetricNotFound { label: String },

    /// A metric's numeric field is neither a number nor a saturation
    /// placeholder.
    #[error("metric '{label}' has malformed value '{token}'")]
    MalformedMetric { label: String, token: String },

    /// The constraint observable does not change sign across the bracket
    /// and the caller declared that it must (strict policy).
    #[error("'{metric}' does not change sign over [{lo}, {hi}]")]
    NoRootInBracket { metric: String, lo: f64, hi: f64 },

    /// A parameter name matches no recognized naming convention, so no
    /// bounds can be assigned to it.
    #[error("parameter '{0}' does not match any known naming convention")]
    UnknownParameterKind(String),

    /// The template has no assignment statement for a declared parameter.
    #[error("template has no assignment for parameter '{0}'")]
    PlaceholderMissing(String),

    /// The template assigns a declared parameter more than once.
    #[error("template assigns parameter '{0}' more than once")]
    PlaceholderDuplicated(String),

    /// No perturbation probe of a parameter stayed within the margins.
    #[error("no acceptable perturbation of '{parameter}' found within {probes} probes")]
    ToleranceNotFound { parameter: String, probes: u32 },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
