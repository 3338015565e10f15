use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use regex::{NoExpand, Regex};

use crate::error::OptimizerError;

/// Template knob forcing the simulator's streamlined execution mode.
pub const STREAMLINE_KNOB: &str = "STREAMLINE";
/// Template knob fixing the perturbation expansion order.
pub const ORDER_KNOB: &str = "ORDER";

/// The simulator's declarative input script.
///
/// Every tunable quantity appears exactly once as an assignment statement
/// `name := value;`. Rendering replaces the value fields textually and
/// leaves the rest of the script untouched, exactly as a human editing the
/// nominal design would.
#[derive(Clone, Debug)]
pub struct FoxTemplate {
    text: String,
}

impl FoxTemplate {
    pub fn load(path: &Path) -> Result<Self, OptimizerError> {
        Ok(Self {
            text: fs::read_to_string(path)?,
        })
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Matcher for `name := <number>;`, anchored on the exact name.
    fn assignment_pattern(name: &str) -> Regex {
        let pattern = format!(
            r"\b{}\s*:=\s*[-+]?[0-9.]+(?:[Ee][-+]?[0-9]+)?\s*;",
            regex::escape(name)
        );
        Regex::new(&pattern).expect("escaped parameter name forms a valid pattern")
    }

    fn assignment_count(&self, name: &str) -> usize {
        Self::assignment_pattern(name).find_iter(&self.text).count()
    }

    /// Does the template expose this assignment at all? Used for the
    /// optional execution knobs, which are not an error to omit.
    pub fn has_assignment(&self, name: &str) -> bool {
        self.assignment_count(name) > 0
    }

    /// Check that every declared parameter is assigned exactly once.
    /// Run once at startup so a template/parameter mismatch surfaces
    /// before the first expensive simulator call.
    pub fn validate(&self, names: &[String]) -> Result<(), OptimizerError> {
        for name in names {
            match self.assignment_count(name) {
                0 => return Err(OptimizerError::PlaceholderMissing(name.clone())),
                1 => {}
                _ => return Err(OptimizerError::PlaceholderDuplicated(name.clone())),
            }
        }
        Ok(())
    }

    /// The nominal value embedded in the template for `name`.
    pub fn nominal(&self, name: &str) -> Result<f64, OptimizerError> {
        let pattern = format!(
            r"\b{}\s*:=\s*([-+]?[0-9.]+(?:[Ee][-+]?[0-9]+)?)\s*;",
            regex::escape(name)
        );
        let re = Regex::new(&pattern).expect("escaped parameter name forms a valid pattern");
        let mut matches = re.captures_iter(&self.text);
        let caps = matches
            .next()
            .ok_or_else(|| OptimizerError::PlaceholderMissing(name.to_string()))?;
        if matches.next().is_some() {
            return Err(OptimizerError::PlaceholderDuplicated(name.to_string()));
        }
        let token = &caps[1];
        token
            .parse::<f64>()
            .map_err(|_| OptimizerError::MalformedMetric {
                label: name.to_string(),
                token: token.to_string(),
            })
    }

    /// Render the full document with each named assignment replaced by the
    /// mapped value. The map's order is the canonical parameter order.
    pub fn render(&self, values: &IndexMap<String, f64>) -> Result<String, OptimizerError> {
        let mut text = self.text.clone();
        for (name, value) in values {
            let re = Self::assignment_pattern(name);
            if re.find(&text).is_none() {
                return Err(OptimizerError::PlaceholderMissing(name.clone()));
            }
            let replacement = format!("{} := {};", name, value);
            text = re.replace(&text, NoExpand(&replacement)).into_owned();
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
INCLUDE 'COSY';
PROCEDURE RUN;
  strength_Q1 := 0.0123;
  strength_O := -2.5e-3;
  length_D1 := 1.25;
  STREAMLINE := 0;
ENDPROCEDURE;
";

    fn map(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|&(n, v)| (n.to_string(), v)).collect()
    }

    #[test]
    fn render_substitutes_each_assignment_in_place() {
        let template = FoxTemplate::from_text(TEMPLATE);
        let rendered = template
            .render(&map(&[("strength_Q1", 0.5), ("length_D1", 2.0)]))
            .unwrap();
        assert!(rendered.contains("strength_Q1 := 0.5;"));
        assert!(rendered.contains("length_D1 := 2;"));
        // untouched assignments keep their nominal values
        assert!(rendered.contains("strength_O := -2.5e-3;"));
    }

    #[test]
    fn render_unknown_name_is_an_error() {
        let template = FoxTemplate::from_text(TEMPLATE);
        let err = template.render(&map(&[("strength_Q9", 1.0)])).unwrap_err();
        assert!(matches!(err, OptimizerError::PlaceholderMissing(name) if name == "strength_Q9"));
    }

    #[test]
    fn nominal_reads_the_embedded_design() {
        let template = FoxTemplate::from_text(TEMPLATE);
        assert_eq!(template.nominal("strength_Q1").unwrap(), 0.0123);
        assert_eq!(template.nominal("strength_O").unwrap(), -2.5e-3);
    }

    #[test]
    fn validate_rejects_missing_and_duplicated_assignments() {
        let template = FoxTemplate::from_text(TEMPLATE);
        assert!(template.validate(&["strength_Q1".to_string()]).is_ok());

        let err = template.validate(&["strength_H7".to_string()]).unwrap_err();
        assert!(matches!(err, OptimizerError::PlaceholderMissing(_)));

        let doubled = format!("{TEMPLATE}strength_Q1 := 0.2;\n");
        let template = FoxTemplate::from_text(doubled);
        let err = template.validate(&["strength_Q1".to_string()]).unwrap_err();
        assert!(matches!(err, OptimizerError::PlaceholderDuplicated(_)));
    }

    #[test]
    fn similar_names_do_not_collide() {
        let template = FoxTemplate::from_text("strength_Q1 := 1;\nstrength_Q12 := 2;\n");
        let rendered = template.render(&map(&[("strength_Q1", 9.0)])).unwrap();
        assert!(rendered.contains("strength_Q1 := 9;"));
        assert!(rendered.contains("strength_Q12 := 2;"));
    }

    #[test]
    fn knob_detection() {
        let template = FoxTemplate::from_text(TEMPLATE);
        assert!(template.has_assignment(STREAMLINE_KNOB));
        assert!(!template.has_assignment(ORDER_KNOB));
    }
}
