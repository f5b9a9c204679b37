//! Differences between a baseline and a counterfactual run.

use std::collections::BTreeMap;

use cfscm_core::diagnostics::{Diagnostic, Diagnostics, LengthPolicy};
use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::timeseries::{FloatValue, Year};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::driver::{RunResult, SpeciesTrace};

/// One quantity in both runs and `counterfactual - baseline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceSeries {
    pub baseline: Array1<FloatValue>,
    pub counterfactual: Array1<FloatValue>,
    pub difference: Array1<FloatValue>,
}

impl DifferenceSeries {
    fn new(baseline: Array1<FloatValue>, counterfactual: Array1<FloatValue>) -> Self {
        let difference = &counterfactual - &baseline;
        Self {
            baseline,
            counterfactual,
            difference,
        }
    }

    /// Difference at the last year, `NaN` if there is none.
    pub fn final_difference(&self) -> FloatValue {
        self.difference.last().copied().unwrap_or(FloatValue::NAN)
    }

    /// Largest signed difference, ignoring `NaN`.
    pub fn max_difference(&self) -> FloatValue {
        if self.difference.is_empty() {
            return FloatValue::NAN;
        }
        self.difference
            .iter()
            .copied()
            .fold(FloatValue::NEG_INFINITY, FloatValue::max)
    }

    pub fn cumulative_difference(&self) -> FloatValue {
        self.difference.sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesDifference {
    pub concentration: DifferenceSeries,
    pub emissions: DifferenceSeries,
}

/// Scalar results of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub baseline_scenario: String,
    pub counterfactual_scenario: String,
    pub primary_species: String,
    pub first_year: Option<Year>,
    pub last_year: Option<Year>,
    pub final_temperature_difference: FloatValue,
    pub max_temperature_difference: FloatValue,
    pub final_concentration_difference: FloatValue,
    pub max_concentration_difference: FloatValue,
    pub cumulative_emissions_difference: FloatValue,
    pub concentration_unit: String,
    pub emissions_unit: String,
    /// Set when the two runs had different lengths.
    pub length_policy: Option<LengthPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub years: Vec<Year>,
    pub temperature: DifferenceSeries,
    pub concentration: DifferenceSeries,
    pub emissions: DifferenceSeries,
    /// Species other than the primary one present in both runs.
    pub additional: BTreeMap<String, SpeciesDifference>,
    pub summary: ComparisonSummary,
}

impl ComparisonReport {
    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// Bring `values` to length `n`, cutting or repeating the last value.
fn fit(values: &Array1<FloatValue>, n: usize) -> Array1<FloatValue> {
    let last = values.last().copied().unwrap_or(FloatValue::NAN);
    (0..n)
        .map(|i| values.get(i).copied().unwrap_or(last))
        .collect()
}

fn fit_years(years: &[Year], n: usize) -> Vec<Year> {
    let mut fitted: Vec<Year> = years.iter().copied().take(n).collect();
    let mut next = fitted.last().map_or(0, |y| y + 1);
    while fitted.len() < n {
        fitted.push(next);
        next += 1;
    }
    fitted
}

fn pair(
    baseline: &Array1<FloatValue>,
    counterfactual: &Array1<FloatValue>,
    n: usize,
) -> DifferenceSeries {
    DifferenceSeries::new(fit(baseline, n), fit(counterfactual, n))
}

fn pair_species(
    baseline: &SpeciesTrace,
    counterfactual: &SpeciesTrace,
    n: usize,
) -> SpeciesDifference {
    SpeciesDifference {
        concentration: pair(&baseline.concentration, &counterfactual.concentration, n),
        emissions: pair(&baseline.emissions, &counterfactual.emissions, n),
    }
}

/// Compare two runs of the same species setup.
///
/// Runs of different length are reconciled with `policy` and reported as a
/// [`Diagnostic::ShapeMismatch`].
pub fn compare(
    baseline: &RunResult,
    counterfactual: &RunResult,
    policy: LengthPolicy,
    diagnostics: &mut Diagnostics,
) -> CfscmResult<ComparisonReport> {
    if baseline.primary_species != counterfactual.primary_species {
        return Err(CfscmError::Configuration(format!(
            "cannot compare runs of '{}' with runs of '{}'",
            baseline.primary_species, counterfactual.primary_species
        )));
    }
    if baseline.emissions_unit != counterfactual.emissions_unit
        || baseline.concentration_unit != counterfactual.concentration_unit
    {
        return Err(CfscmError::Configuration(format!(
            "runs report different units ({}, {} vs {}, {})",
            baseline.emissions_unit,
            baseline.concentration_unit,
            counterfactual.emissions_unit,
            counterfactual.concentration_unit
        )));
    }

    let (n, length_policy) = if baseline.len() == counterfactual.len() {
        (baseline.len(), None)
    } else {
        diagnostics.record(Diagnostic::ShapeMismatch {
            context: format!("{} vs {}", baseline.scenario, counterfactual.scenario),
            expected: baseline.len(),
            actual: counterfactual.len(),
            policy: Some(policy),
        });
        let n = match policy {
            LengthPolicy::Truncate => baseline.len().min(counterfactual.len()),
            LengthPolicy::Pad => baseline.len().max(counterfactual.len()),
        };
        (n, Some(policy))
    };

    let longer = if baseline.len() >= counterfactual.len() {
        &baseline.years
    } else {
        &counterfactual.years
    };
    let years = fit_years(longer, n);

    let temperature = pair(&baseline.temperature, &counterfactual.temperature, n);
    let concentration = pair(&baseline.concentration, &counterfactual.concentration, n);
    let emissions = pair(&baseline.emissions, &counterfactual.emissions, n);

    let additional: BTreeMap<String, SpeciesDifference> = baseline
        .additional
        .iter()
        .filter_map(|(species, trace)| {
            counterfactual
                .additional
                .get(species)
                .map(|other| (species.clone(), pair_species(trace, other, n)))
        })
        .collect();

    let summary = ComparisonSummary {
        baseline_scenario: baseline.scenario.clone(),
        counterfactual_scenario: counterfactual.scenario.clone(),
        primary_species: baseline.primary_species.clone(),
        first_year: years.first().copied(),
        last_year: years.last().copied(),
        final_temperature_difference: temperature.final_difference(),
        max_temperature_difference: temperature.max_difference(),
        final_concentration_difference: concentration.final_difference(),
        max_concentration_difference: concentration.max_difference(),
        cumulative_emissions_difference: emissions.cumulative_difference(),
        concentration_unit: baseline.concentration_unit.clone(),
        emissions_unit: baseline.emissions_unit.clone(),
        length_policy,
    };

    info!(
        years = n,
        final_temperature_difference = summary.final_temperature_difference,
        max_temperature_difference = summary.max_temperature_difference,
        cumulative_emissions_difference = summary.cumulative_emissions_difference,
        "Compared scenarios"
    );

    Ok(ComparisonReport {
        years,
        temperature,
        concentration,
        emissions,
        additional,
        summary,
    })
}
