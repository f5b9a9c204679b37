//! Counterfactual delta injection.
//!
//! The counterfactual scenario is the baseline scenario with one variable
//! shifted, year by year, by the gap between two reference columns: the
//! observed quantity and the quantity under the counterfactual assumption
//! (e.g. emissions had carbon intensity stayed at its 1975 level).
//!
//! $$ E_{cf}(y) = E(y) + s \cdot (R_{cf}(y) - R_{actual}(y)), \quad y \in [w_0, w_1] $$
//!
//! where $s$ converts the reference unit into the unit of the adjusted series.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, Diagnostics, SkipStage};
use crate::errors::{CfscmError, CfscmResult};
use crate::timeseries::{DenseSeries, FloatValue, Horizon, Year, YearLookup};

/// Relative tolerance of the reconciliation check.
const RECONCILIATION_RTOL: FloatValue = 1e-9;

/// Per-year additive deltas, in reference units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentTable {
    window: Horizon,
    deltas: BTreeMap<Year, FloatValue>,
}

/// What an adjustment did to its target series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentSummary {
    pub years_applied: usize,
    pub years_skipped: usize,
    /// Unit factor applied to every delta.
    pub scale: FloatValue,
    /// Total change of the target, in target units.
    pub applied_total: FloatValue,
    /// `scale × Σ delta` over the applied years.
    pub expected_total: FloatValue,
}

impl AdjustmentSummary {
    /// Mean change per adjusted year, in target units.
    pub fn mean_adjustment(&self) -> FloatValue {
        if self.years_applied == 0 {
            0.0
        } else {
            self.applied_total / self.years_applied as FloatValue
        }
    }
}

impl AdjustmentTable {
    /// Derive the table from the two reference series.
    ///
    /// Only years inside `window` where both references hold a finite value
    /// produce a row.
    pub fn derive(
        actual: &impl YearLookup,
        counterfactual_reference: &impl YearLookup,
        window: Horizon,
    ) -> Self {
        let deltas: BTreeMap<Year, FloatValue> = window
            .years()
            .filter_map(|year| {
                let a = actual.value_at(year).filter(|v| v.is_finite())?;
                let c = counterfactual_reference
                    .value_at(year)
                    .filter(|v| v.is_finite())?;
                Some((year, c - a))
            })
            .collect();

        debug!(
            window = %window,
            rows = deltas.len(),
            dropped = window.len() - deltas.len(),
            "Derived adjustment table"
        );

        Self { window, deltas }
    }

    /// A table that changes nothing.
    pub fn empty(window: Horizon) -> Self {
        Self {
            window,
            deltas: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> Horizon {
        self.window
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, FloatValue)> + '_ {
        self.deltas.iter().map(|(y, d)| (*y, *d))
    }

    pub fn delta(&self, year: Year) -> Option<FloatValue> {
        self.deltas.get(&year).copied()
    }

    /// Sum of all deltas, in reference units.
    pub fn total(&self) -> FloatValue {
        self.deltas.values().sum()
    }

    /// Apply the table to `target`, returning the adjusted copy.
    ///
    /// Years of the table that `target` does not cover are skipped and
    /// reported. The change in the target's total is reconciled against
    /// `scale × Σ delta` over the applied years.
    pub fn apply(
        &self,
        target: &DenseSeries,
        scale: FloatValue,
        diagnostics: &mut Diagnostics,
    ) -> CfscmResult<(DenseSeries, AdjustmentSummary)> {
        let horizon = target.horizon();
        let mut values = target.values().clone();
        let mut expected_total = 0.0;
        let mut years_applied = 0usize;
        let mut skipped: Vec<Year> = Vec::new();

        for (year, delta) in self.iter() {
            match horizon.index_of(year) {
                Some(i) => {
                    let scaled = delta * scale;
                    values[i] += scaled;
                    expected_total += scaled;
                    years_applied += 1;
                }
                None => skipped.push(year),
            }
        }

        if let (Some(first), Some(last)) = (skipped.first(), skipped.last()) {
            diagnostics.record(Diagnostic::SkippedYear {
                variable: target.variable().to_string(),
                stage: SkipStage::Adjustment,
                count: skipped.len(),
                first: *first,
                last: *last,
            });
        }

        let adjusted = target.with_values(values)?;
        let applied_total = adjusted.sum() - target.sum();

        let tolerance =
            RECONCILIATION_RTOL * (1.0 + expected_total.abs() + target.values().mapv(f64::abs).sum());
        if (applied_total - expected_total).abs() > tolerance {
            return Err(CfscmError::Adjustment {
                applied: applied_total,
                expected: expected_total,
            });
        }

        let summary = AdjustmentSummary {
            years_applied,
            years_skipped: skipped.len(),
            scale,
            applied_total,
            expected_total,
        };

        info!(
            variable = target.variable(),
            years_applied,
            years_skipped = skipped.len(),
            total = expected_total,
            mean = summary.mean_adjustment(),
            "Applied counterfactual adjustment"
        );

        Ok((adjusted, summary))
    }
}

/// Adjust one variable of a scenario, leaving every other series untouched.
pub fn adjust_scenario(
    series: &[DenseSeries],
    target_variable: &str,
    table: &AdjustmentTable,
    scale: FloatValue,
    diagnostics: &mut Diagnostics,
) -> CfscmResult<(Vec<DenseSeries>, AdjustmentSummary)> {
    let position = series
        .iter()
        .position(|s| s.variable() == target_variable)
        .ok_or_else(|| CfscmError::missing_variable(target_variable, "scenario series"))?;

    let (adjusted, summary) = table.apply(&series[position], scale, diagnostics)?;

    let mut out = series.to_vec();
    out[position] = adjusted;
    Ok((out, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::EmissionsSeries;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn target(horizon: Horizon) -> DenseSeries {
        let values: Array1<FloatValue> = horizon.years().map(|y| FloatValue::from(y)).collect();
        DenseSeries::new("Emissions|CO2", "Mt CO2/yr", horizon, values).unwrap()
    }

    #[test]
    fn single_year_window() {
        let window = Horizon::new(1980, 1980).unwrap();
        let actual = EmissionsSeries::from_pairs("a", "Gt CO2/yr", [(1979, 19.0), (1980, 20.0)]);
        let counterfactual =
            EmissionsSeries::from_pairs("c", "Gt CO2/yr", [(1979, 30.0), (1980, 25.0)]);
        let table = AdjustmentTable::derive(&actual, &counterfactual, window);
        assert_eq!(table.len(), 1);
        assert_eq!(table.delta(1980), Some(5.0));

        let horizon = Horizon::new(1970, 1990).unwrap();
        let before = target(horizon);
        let (after, summary) = table.apply(&before, 1000.0, &mut Diagnostics::new()).unwrap();

        assert_eq!(after.value_at(1980), Some(before.value_at(1980).unwrap() + 5000.0));
        assert_eq!(after.value_at(1979), before.value_at(1979));
        assert_eq!(after.value_at(1981), before.value_at(1981));
        assert_eq!(summary.years_applied, 1);
        assert_relative_eq!(summary.applied_total, 5000.0);
    }

    #[test]
    fn rows_need_both_references() {
        let window = Horizon::new(1976, 1980).unwrap();
        let actual = EmissionsSeries::from_pairs(
            "a",
            "Gt",
            [(1976, 1.0), (1977, 1.0), (1978, f64::NAN), (1980, 1.0), (1981, 1.0)],
        );
        let counterfactual = EmissionsSeries::from_pairs(
            "c",
            "Gt",
            [(1976, 2.0), (1978, 2.0), (1979, 2.0), (1980, 3.0), (1981, 9.0)],
        );
        let table = AdjustmentTable::derive(&actual, &counterfactual, window);
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![(1976, 1.0), (1980, 2.0)]);
    }

    #[test]
    fn only_window_years_change_and_sums_reconcile() {
        let window = Horizon::new(1976, 2023).unwrap();
        let actual = EmissionsSeries::from_pairs(
            "a",
            "Gt",
            window.years().map(|y| (y, 17.0 + 0.3 * FloatValue::from(y - 1976))),
        );
        let counterfactual = EmissionsSeries::from_pairs(
            "c",
            "Gt",
            window.years().map(|y| (y, 17.0 + 0.55 * FloatValue::from(y - 1976))),
        );
        let table = AdjustmentTable::derive(&actual, &counterfactual, window);

        let horizon = Horizon::new(1750, 2023).unwrap();
        let before = target(horizon);
        let (after, summary) = table.apply(&before, 1000.0, &mut Diagnostics::new()).unwrap();

        for (year, value) in after.iter() {
            if !window.contains(year) {
                assert_eq!(Some(value), before.value_at(year), "year {year} changed");
            }
        }
        assert_relative_eq!(summary.applied_total, table.total() * 1000.0, max_relative = 1e-9);
        assert_eq!(summary.years_skipped, 0);
    }

    #[test]
    fn years_outside_the_target_are_skipped() {
        let window = Horizon::new(2020, 2025).unwrap();
        let reference = EmissionsSeries::from_pairs("a", "Gt", window.years().map(|y| (y, 1.0)));
        let shifted = EmissionsSeries::from_pairs("c", "Gt", window.years().map(|y| (y, 2.0)));
        let table = AdjustmentTable::derive(&reference, &shifted, window);

        let mut diagnostics = Diagnostics::new();
        let (after, summary) = table
            .apply(&target(Horizon::new(2000, 2023).unwrap()), 1.0, &mut diagnostics)
            .unwrap();
        assert_eq!(summary.years_applied, 4);
        assert_eq!(summary.years_skipped, 2);
        assert_eq!(after.value_at(2023), Some(2024.0));
        assert_eq!(diagnostics.skipped_years(SkipStage::Adjustment), 2);
    }

    #[test]
    fn only_the_target_variable_is_modified() {
        let horizon = Horizon::new(1975, 1985).unwrap();
        let other = DenseSeries::constant("Emissions|CH4", "Mt CH4/yr", horizon, 300.0);
        let series = vec![other.clone(), target(horizon)];
        let window = Horizon::new(1980, 1981).unwrap();
        let a = EmissionsSeries::from_pairs("a", "Gt", [(1980, 1.0), (1981, 1.0)]);
        let c = EmissionsSeries::from_pairs("c", "Gt", [(1980, 2.0), (1981, 3.0)]);
        let table = AdjustmentTable::derive(&a, &c, window);

        let (adjusted, summary) =
            adjust_scenario(&series, "Emissions|CO2", &table, 1000.0, &mut Diagnostics::new())
                .unwrap();
        assert_eq!(adjusted[0], other);
        assert_eq!(adjusted[1].value_at(1981), Some(1981.0 + 2000.0));
        assert_relative_eq!(summary.mean_adjustment(), 1500.0);
    }

    #[test]
    fn missing_target_variable() {
        let horizon = Horizon::new(1975, 1985).unwrap();
        let series = vec![DenseSeries::constant("Emissions|CH4", "Mt", horizon, 1.0)];
        let table = AdjustmentTable::empty(horizon);
        assert!(matches!(
            adjust_scenario(&series, "Emissions|CO2", &table, 1.0, &mut Diagnostics::new()),
            Err(CfscmError::MissingVariable { .. })
        ));
    }

    #[test]
    fn empty_table_is_identity() {
        let horizon = Horizon::new(1975, 1985).unwrap();
        let before = target(horizon);
        let (after, summary) = AdjustmentTable::empty(horizon)
            .apply(&before, 1000.0, &mut Diagnostics::new())
            .unwrap();
        assert_eq!(after, before);
        assert_eq!(summary.applied_total, 0.0);
    }
}
