//! Calendar years to engine timepoints.
//!
//! Engines integrate on timepoints placed at the middle of each annual step,
//! so the value for calendar year `y` belongs at timepoint `y + 0.5`. Matching
//! is exact: a year whose midpoint is not one of the engine's timepoints
//! cannot be represented and is skipped.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::diagnostics::{Diagnostic, Diagnostics, SkipStage};
use crate::timeseries::{DenseSeries, FloatValue, Horizon, Time, Year};

/// Offset of a timepoint from the start of its calendar year.
pub const MIDPOINT_OFFSET: Time = 0.5;

pub fn timepoint_of(year: Year) -> Time {
    Time::from(year) + MIDPOINT_OFFSET
}

/// Bijection between calendar years and engine timepoint indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTimeline {
    timepoints: Array1<Time>,
    indices: BTreeMap<Year, usize>,
}

impl ScenarioTimeline {
    pub fn new(timepoints: Array1<Time>) -> Self {
        let indices = timepoints
            .iter()
            .enumerate()
            .filter_map(|(i, &t)| {
                let year = (t - MIDPOINT_OFFSET).floor();
                (year.is_finite() && timepoint_of(year as Year) == t).then_some((year as Year, i))
            })
            .collect();
        Self {
            timepoints,
            indices,
        }
    }

    /// Timeline of an engine stepping annually between the bounds of `horizon`.
    ///
    /// The bounds span `horizon.len()` years, so there is one timepoint fewer
    /// than there are calendar years and the final year is left unmatched.
    pub fn from_bounds(horizon: Horizon) -> Self {
        let timepoints = (horizon.start()..horizon.end()).map(timepoint_of).collect();
        Self::new(timepoints)
    }

    pub fn timepoints(&self) -> &Array1<Time> {
        &self.timepoints
    }

    pub fn len(&self) -> usize {
        self.timepoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timepoints.is_empty()
    }

    pub fn index_of(&self, year: Year) -> Option<usize> {
        self.indices.get(&year).copied()
    }

    /// Calendar years with a matching timepoint, ascending.
    pub fn years(&self) -> impl Iterator<Item = Year> + '_ {
        self.indices.keys().copied()
    }

    /// Place `dense × scale` on the timeline.
    ///
    /// Timepoints without a matching year stay `NaN`.
    pub fn map(
        &self,
        dense: &DenseSeries,
        scale: FloatValue,
        diagnostics: &mut Diagnostics,
    ) -> MappedSeries {
        if dense.len() != self.len() {
            diagnostics.record(Diagnostic::ShapeMismatch {
                context: format!("{} timegrid", dense.variable()),
                expected: self.len(),
                actual: dense.len(),
                policy: None,
            });
        }

        let mut values = Array1::from_elem(self.len(), FloatValue::NAN);
        let mut written = 0usize;
        let mut skipped: Vec<Year> = Vec::new();
        for (year, value) in dense.iter() {
            match self.index_of(year) {
                Some(i) => {
                    values[i] = value * scale;
                    written += 1;
                }
                None => skipped.push(year),
            }
        }

        if let (Some(&first), Some(&last)) = (skipped.first(), skipped.last()) {
            diagnostics.record(Diagnostic::SkippedYear {
                variable: dense.variable().to_string(),
                stage: SkipStage::Timegrid,
                count: skipped.len(),
                first,
                last,
            });
        }

        debug!(
            variable = dense.variable(),
            written,
            skipped = skipped.len(),
            scale,
            "Mapped series onto engine timepoints"
        );

        MappedSeries {
            variable: dense.variable().to_string(),
            values,
            written,
            skipped: skipped.len(),
        }
    }

    /// Read an engine-indexed array back as `(year, value)` pairs.
    ///
    /// Only matched years whose value is not `NaN` are returned.
    pub fn recover_annual(&self, values: &Array1<FloatValue>) -> Vec<(Year, FloatValue)> {
        self.indices
            .iter()
            .filter_map(|(&year, &i)| {
                values
                    .get(i)
                    .copied()
                    .filter(|v| !v.is_nan())
                    .map(|v| (year, v))
            })
            .collect()
    }
}

/// A dense series placed on engine timepoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedSeries {
    pub variable: String,
    /// One entry per timepoint, `NaN` where nothing was written.
    pub values: Array1<FloatValue>,
    pub written: usize,
    pub skipped: usize,
}

impl MappedSeries {
    /// Indices and values of the timepoints that received data.
    pub fn filled(&self) -> impl Iterator<Item = (usize, FloatValue)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(i, v)| (i, *v))
    }
}

/// Map a dense series with the given unit scale.
pub fn map_to_timepoints(
    dense: &DenseSeries,
    timeline: &ScenarioTimeline,
    scale: FloatValue,
    diagnostics: &mut Diagnostics,
) -> MappedSeries {
    timeline.map(dense, scale, diagnostics)
}
