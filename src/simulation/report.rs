use regex::Regex;

use crate::error::OptimizerError;
use crate::types::MetricValue;

// Label anchors of the focal-plane design block, as the simulator prints
// them. The time-skew factor that converts an energy width into a time
// width is reported too, not hard-coded here.
pub const TIME_RESOLUTION: &str = "Time Resol.(ps)";
pub const ENERGY_RESOLUTION: &str = "HO Resol.RAY(keV)";
pub const P_DISTANCE: &str = "p-dist(mm)";
pub const TILT_ANGLE: &str = "Tilt Angle(deg)";
pub const TIME_SKEW: &str = "Time Skew(ps/keV)";

/// In-band marker the simulator prints when a run fails outright.
pub const ERROR_MARKER: &str = "ERROR";

/// The simulator's textual report, parsed lazily.
///
/// Each metric sits on a line with a fixed label anchor followed by a
/// numeric field. A saturated field is printed as a run of asterisks and
/// parses to `Overflow`; an absent anchor is a template/report mismatch
/// and always an error, because the objective has no lawful default for a
/// missing metric.
#[derive(Clone, Debug)]
pub struct SimulationReport {
    text: String,
}

impl SimulationReport {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The first line carrying the in-band error marker, if any.
    pub fn failure(&self) -> Option<&str> {
        self.text
            .lines()
            .find(|line| line.contains(ERROR_MARKER))
            .map(str::trim)
    }

    /// Look up a metric by its label anchor.
    pub fn metric(&self, label: &str) -> Result<MetricValue, OptimizerError> {
        let pattern = format!(r"{}\s+(\S+)", regex::escape(label));
        let re = Regex::new(&pattern).expect("escaped metric label forms a valid pattern");
        let caps = re
            .captures(&self.text)
            .ok_or_else(|| OptimizerError::MetricNotFound {
                label: label.to_string(),
            })?;
        let token = &caps[1];

        if token.chars().all(|c| c == '*') {
            return Ok(MetricValue::Overflow);
        }
        token
            .parse::<f64>()
            .map(MetricValue::Value)
            .map_err(|_| OptimizerError::MalformedMetric {
                label: label.to_string(),
                token: token.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
 COSY INFINITY
 N 3 FPDESIGN p-dist(mm)          -0.0341
 N 4 FPDESIGN HO Resol.RAY(keV)    1.8312
 N 5 FPDESIGN Time Resol.(ps)     11.0724
 N 6 FPDESIGN Tilt Angle(deg)      0.5120
 N 7 FPDESIGN Time Skew(ps/keV)    8.1000
";

    #[test]
    fn metric_found_by_label_anchor() {
        let report = SimulationReport::new(REPORT);
        assert_eq!(
            report.metric(TIME_RESOLUTION).unwrap(),
            MetricValue::Value(11.0724)
        );
        assert_eq!(
            report.metric(P_DISTANCE).unwrap(),
            MetricValue::Value(-0.0341)
        );
        assert_eq!(report.metric(TIME_SKEW).unwrap(), MetricValue::Value(8.1));
    }

    #[test]
    fn saturated_field_is_overflow_not_a_parse_failure() {
        let report =
            SimulationReport::new(" N 5 FPDESIGN Time Resol.(ps)     **********\n");
        assert_eq!(report.metric(TIME_RESOLUTION).unwrap(), MetricValue::Overflow);
    }

    #[test]
    fn missing_anchor_is_fatal() {
        let report = SimulationReport::new("nothing to see here\n");
        let err = report.metric(TILT_ANGLE).unwrap_err();
        assert!(matches!(err, OptimizerError::MetricNotFound { label } if label == TILT_ANGLE));
    }

    #[test]
    fn malformed_field_is_distinguished_from_overflow() {
        let report = SimulationReport::new(" N 6 FPDESIGN Tilt Angle(deg)    up\n");
        let err = report.metric(TILT_ANGLE).unwrap_err();
        assert!(matches!(err, OptimizerError::MalformedMetric { token, .. } if token == "up"));
    }

    #[test]
    fn in_band_error_marker_is_detected() {
        let ok = SimulationReport::new(REPORT);
        assert!(ok.failure().is_none());

        let bad = SimulationReport::new("stuff\n *** ERROR: DIVERGENT RAY ***\nmore\n");
        assert_eq!(bad.failure(), Some("*** ERROR: DIVERGENT RAY ***"));
    }

    #[test]
    fn label_punctuation_is_matched_literally() {
        // "Time Resol.(ps)" must not match "Time Resolx(ps)" through the dot
        let report = SimulationReport::new(" Time Resolx(ps)   3.0\n");
        assert!(report.metric(TIME_RESOLUTION).is_err());
    }
}
