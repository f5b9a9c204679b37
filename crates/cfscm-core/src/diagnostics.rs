//! Recoverable data-quality issues.
//!
//! The pipeline never stops for these. Each one is logged as a structured
//! `tracing` warning when it is recorded and kept in a [`Diagnostics`]
//! collector so callers can report or assert on them after a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::timeseries::Year;

/// How a length mismatch between two series was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// The longer series was cut down to the shorter length.
    Truncate,
    /// The shorter series was extended with its last value.
    Pad,
}

impl fmt::Display for LengthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthPolicy::Truncate => write!(f, "truncate"),
            LengthPolicy::Pad => write!(f, "pad"),
        }
    }
}

/// Where a year was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStage {
    /// The adjusted series had no entry for a year of the adjustment table.
    Adjustment,
    /// No engine timepoint matched `year + 0.5`.
    Timegrid,
}

/// A single recovered issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Fewer than two known points; the horizon was filled with a constant.
    SparseData {
        variable: String,
        known_points: usize,
        fill_value: f64,
    },
    /// One or more years were skipped.
    SkippedYear {
        variable: String,
        stage: SkipStage,
        count: usize,
        first: Year,
        last: Year,
    },
    /// Two series that should line up had different lengths.
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
        policy: Option<LengthPolicy>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SparseData {
                variable,
                known_points,
                fill_value,
            } => write!(
                f,
                "{variable}: only {known_points} known point(s), filled with {fill_value}"
            ),
            Diagnostic::SkippedYear {
                variable,
                stage,
                count,
                first,
                last,
            } => write!(
                f,
                "{variable}: skipped {count} year(s) in {first}..={last} during {stage:?}"
            ),
            Diagnostic::ShapeMismatch {
                context,
                expected,
                actual,
                policy,
            } => match policy {
                Some(policy) => write!(
                    f,
                    "{context}: length {actual} != {expected}, applied {policy}"
                ),
                None => write!(f, "{context}: length {actual} != {expected}"),
            },
        }
    }
}

/// Collector for [`Diagnostic`]s raised during a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue and emit it as a warning.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::SparseData {
                variable,
                known_points,
                fill_value,
            } => warn!(
                variable = %variable,
                known_points,
                fill_value,
                "Insufficient data for interpolation; filling horizon with a constant"
            ),
            Diagnostic::SkippedYear {
                variable,
                stage,
                count,
                first,
                last,
            } => warn!(
                variable = %variable,
                stage = ?stage,
                count,
                first,
                last,
                "Skipped years with no matching target entry"
            ),
            Diagnostic::ShapeMismatch {
                context,
                expected,
                actual,
                policy,
            } => warn!(
                context = %context,
                expected,
                actual,
                policy = ?policy,
                "Series length mismatch"
            ),
        }
        self.entries.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of years skipped at the given stage.
    pub fn skipped_years(&self, stage: SkipStage) -> usize {
        self.entries
            .iter()
            .filter_map(|d| match d {
                Diagnostic::SkippedYear {
                    stage: s, count, ..
                } if *s == stage => Some(*count),
                _ => None,
            })
            .sum()
    }

    pub fn sparse_variables(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|d| match d {
                Diagnostic::SparseData { variable, .. } => Some(variable.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_years_are_summed_per_stage() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record(Diagnostic::SkippedYear {
            variable: "Emissions|CO2".to_string(),
            stage: SkipStage::Timegrid,
            count: 1,
            first: 2023,
            last: 2023,
        });
        diagnostics.record(Diagnostic::SkippedYear {
            variable: "Emissions|CH4".to_string(),
            stage: SkipStage::Timegrid,
            count: 2,
            first: 2022,
            last: 2023,
        });
        diagnostics.record(Diagnostic::SkippedYear {
            variable: "Emissions|CO2".to_string(),
            stage: SkipStage::Adjustment,
            count: 4,
            first: 2020,
            last: 2023,
        });

        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics.skipped_years(SkipStage::Timegrid), 3);
        assert_eq!(diagnostics.skipped_years(SkipStage::Adjustment), 4);
    }

    #[test]
    fn display_mentions_policy() {
        let diagnostic = Diagnostic::ShapeMismatch {
            context: "temperature".to_string(),
            expected: 273,
            actual: 274,
            policy: Some(LengthPolicy::Truncate),
        };
        assert_eq!(
            diagnostic.to_string(),
            "temperature: length 274 != 273, applied truncate"
        );
    }
}
