//! Sparse to dense interpolation.
//!
//! Inside the range of known years values are linearly interpolated between
//! the neighbouring known points. Outside that range the nearest boundary
//! value is held constant. Series with fewer than two known points are filled
//! with a constant and reported as [`Diagnostic::SparseData`].

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::timeseries::{DenseSeries, EmissionsSeries, FloatValue, Horizon, Year};

/// Counts describing how a series was densified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpolationSummary {
    /// Known points in the source series.
    pub known_points: usize,
    /// Years in the output series.
    pub horizon_years: usize,
    /// Output years that were not present in the source.
    pub filled_years: usize,
}

/// Piecewise-linear interpolation with flat extrapolation.
///
/// `points` must be sorted by year. Returns `None` when there are no points.
pub fn interpolate_at(points: &[(Year, FloatValue)], year: Year) -> Option<FloatValue> {
    let &(first_year, first_value) = points.first()?;
    let &(last_year, last_value) = points.last()?;
    if year <= first_year {
        return Some(first_value);
    }
    if year >= last_year {
        return Some(last_value);
    }

    // First known point strictly after `year`; it exists and has index >= 1 given the
    // checks above.
    let upper = points.partition_point(|(y, _)| *y <= year);
    let (y0, v0) = points[upper - 1];
    let (y1, v1) = points[upper];
    if y0 == year {
        return Some(v0);
    }

    let weight = FloatValue::from(year - y0) / FloatValue::from(y1 - y0);
    Some(v0 + (v1 - v0) * weight)
}

/// Densify `series` over `horizon`.
pub fn interpolate(
    series: &EmissionsSeries,
    horizon: Horizon,
    diagnostics: &mut Diagnostics,
) -> DenseSeries {
    interpolate_with_summary(series, horizon, diagnostics).0
}

pub fn interpolate_with_summary(
    series: &EmissionsSeries,
    horizon: Horizon,
    diagnostics: &mut Diagnostics,
) -> (DenseSeries, InterpolationSummary) {
    let points: Vec<(Year, FloatValue)> = series.iter().filter(|(_, v)| v.is_finite()).collect();

    let values: Array1<FloatValue> = if points.len() < 2 {
        let fill_value = points.first().map(|(_, v)| *v).unwrap_or(0.0);
        diagnostics.record(Diagnostic::SparseData {
            variable: series.variable().to_string(),
            known_points: points.len(),
            fill_value,
        });
        Array1::from_elem(horizon.len(), fill_value)
    } else {
        horizon
            .years()
            .map(|year| interpolate_at(&points, year).unwrap_or(FloatValue::NAN))
            .collect()
    };

    let filled_years = horizon
        .years()
        .filter(|y| points.binary_search_by_key(y, |(py, _)| *py).is_err())
        .count();

    let summary = InterpolationSummary {
        known_points: points.len(),
        horizon_years: horizon.len(),
        filled_years,
    };

    (
        DenseSeries::from_horizon(series.variable(), series.unit(), horizon, values),
        summary,
    )
}

/// Densify every series of a table, preserving order.
pub fn interpolate_all<'a>(
    series: impl IntoIterator<Item = &'a EmissionsSeries>,
    horizon: Horizon,
    diagnostics: &mut Diagnostics,
) -> Vec<DenseSeries> {
    series
        .into_iter()
        .map(|s| interpolate(s, horizon, diagnostics))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::YearLookup;

    fn series(points: &[(Year, FloatValue)]) -> EmissionsSeries {
        EmissionsSeries::from_pairs("Emissions|CO2", "Mt CO2/yr", points.iter().copied())
    }

    #[test]
    fn midpoint_and_flat_extrapolation() {
        let horizon = Horizon::new(1700, 2050).unwrap();
        let mut diagnostics = Diagnostics::new();
        let dense = interpolate(&series(&[(1850, 0.0), (2000, 100.0)]), horizon, &mut diagnostics);

        assert_eq!(dense.len(), horizon.len());
        assert_eq!(dense.value_at(1925), Some(50.0));
        assert_eq!(dense.value_at(1700), Some(0.0));
        assert_eq!(dense.value_at(2050), Some(100.0));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn no_points_has_no_value() {
        assert_eq!(interpolate_at(&[], 2000), None);
        assert_eq!(interpolate_at(&[(1990, 4.0)], 2000), Some(4.0));
    }

    #[test]
    fn known_years_are_exact() {
        let points = [(1750, 0.003), (1760, 1.7), (1771, -0.25), (1800, 1e-9)];
        let horizon = Horizon::new(1750, 1800).unwrap();
        let dense = interpolate(&series(&points), horizon, &mut Diagnostics::new());
        for (year, value) in points {
            assert_eq!(dense.value_at(year), Some(value));
        }
    }

    #[test]
    fn midpoint_is_the_arithmetic_mean() {
        let points = [(2000, 3.0), (2002, 8.0), (2010, -4.0), (2012, 4.5)];
        let horizon = Horizon::new(2000, 2012).unwrap();
        let dense = interpolate(&series(&points), horizon, &mut Diagnostics::new());
        assert_eq!(dense.value_at(2001), Some((3.0 + 8.0) / 2.0));
        assert_eq!(dense.value_at(2011), Some((-4.0 + 4.5) / 2.0));
        assert_eq!(dense.value_at(2006), Some((8.0 + -4.0) / 2.0));
    }

    #[test]
    fn single_point_fills_the_horizon() {
        let horizon = Horizon::new(2000, 2004).unwrap();
        let mut diagnostics = Diagnostics::new();
        let dense = interpolate(&series(&[(1990, 7.0)]), horizon, &mut diagnostics);

        assert!(dense.values().iter().all(|v| *v == 7.0));
        assert_eq!(diagnostics.sparse_variables(), vec!["Emissions|CO2"]);
    }

    #[test]
    fn empty_series_fills_with_zero() {
        let horizon = Horizon::new(2000, 2004).unwrap();
        let mut diagnostics = Diagnostics::new();
        let dense = interpolate(&series(&[]), horizon, &mut diagnostics);

        assert!(dense.values().iter().all(|v| *v == 0.0));
        assert_eq!(
            diagnostics.iter().next(),
            Some(&Diagnostic::SparseData {
                variable: "Emissions|CO2".to_string(),
                known_points: 0,
                fill_value: 0.0,
            })
        );
    }

    #[test]
    fn summary_counts_filled_years() {
        let horizon = Horizon::new(1750, 1760).unwrap();
        let (_, summary) = interpolate_with_summary(
            &series(&[(1750, 1.0), (1755, 2.0), (1770, 3.0)]),
            horizon,
            &mut Diagnostics::new(),
        );
        assert_eq!(summary.known_points, 3);
        assert_eq!(summary.horizon_years, 11);
        assert_eq!(summary.filled_years, 9);
    }

    #[test]
    fn deterministic() {
        let points = [(1850, 0.0), (1901, 13.0), (1999, 77.7)];
        let horizon = Horizon::new(1800, 2023).unwrap();
        let a = interpolate(&series(&points), horizon, &mut Diagnostics::new());
        let b = interpolate(&series(&points), horizon, &mut Diagnostics::new());
        assert_eq!(a, b);
    }
}
