//! Annual series types shared by every pipeline stage.
//!
//! Raw inputs are [`EmissionsSeries`]: sparse, keyed by calendar year. After
//! interpolation they become [`DenseSeries`]: one value per year of a
//! [`Horizon`], stored in an `ndarray` vector.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{CfscmError, CfscmResult};

pub type FloatValue = f64;
pub type Time = f64;
pub type Year = i32;

/// Inclusive range of calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    start: Year,
    end: Year,
}

impl Horizon {
    pub fn new(start: Year, end: Year) -> CfscmResult<Self> {
        if start > end {
            return Err(CfscmError::InvalidHorizon { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Year {
        self.start
    }

    pub fn end(&self) -> Year {
        self.end
    }

    /// Number of years in the horizon, both ends included.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always false: a valid horizon holds at least one year.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, year: Year) -> bool {
        year >= self.start && year <= self.end
    }

    pub fn years(&self) -> impl Iterator<Item = Year> {
        self.start..=self.end
    }

    /// Position of `year` within the horizon.
    pub fn index_of(&self, year: Year) -> Option<usize> {
        self.contains(year).then(|| (year - self.start) as usize)
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Anything that can be asked for a value at a calendar year.
pub trait YearLookup {
    fn value_at(&self, year: Year) -> Option<FloatValue>;
}

/// A sparse series as read from a wide table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionsSeries {
    variable: String,
    unit: String,
    values: BTreeMap<Year, FloatValue>,
}

impl EmissionsSeries {
    pub fn new(variable: &str, unit: &str, values: BTreeMap<Year, FloatValue>) -> Self {
        Self {
            variable: variable.to_string(),
            unit: unit.to_string(),
            values,
        }
    }

    pub fn from_pairs(
        variable: &str,
        unit: &str,
        pairs: impl IntoIterator<Item = (Year, FloatValue)>,
    ) -> Self {
        Self::new(variable, unit, pairs.into_iter().collect())
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Known `(year, value)` pairs in ascending year order.
    pub fn iter(&self) -> impl Iterator<Item = (Year, FloatValue)> + '_ {
        self.values.iter().map(|(y, v)| (*y, *v))
    }

    pub fn first_year(&self) -> Option<Year> {
        self.values.keys().next().copied()
    }

    pub fn last_year(&self) -> Option<Year> {
        self.values.keys().next_back().copied()
    }
}

impl YearLookup for EmissionsSeries {
    fn value_at(&self, year: Year) -> Option<FloatValue> {
        self.values.get(&year).copied()
    }
}

/// A gap-free annual series covering a [`Horizon`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseSeries {
    variable: String,
    unit: String,
    horizon: Horizon,
    values: Array1<FloatValue>,
}

impl DenseSeries {
    /// Build a dense series, checking that there is exactly one value per year.
    pub fn new(
        variable: &str,
        unit: &str,
        horizon: Horizon,
        values: Array1<FloatValue>,
    ) -> CfscmResult<Self> {
        if values.len() != horizon.len() {
            return Err(CfscmError::parse(
                format!("dense series '{variable}'"),
                format!(
                    "{} values supplied for horizon {} ({} years)",
                    values.len(),
                    horizon,
                    horizon.len()
                ),
            ));
        }
        Ok(Self {
            variable: variable.to_string(),
            unit: unit.to_string(),
            horizon,
            values,
        })
    }

    /// Internal constructor for values already built over `horizon`.
    pub(crate) fn from_horizon(
        variable: &str,
        unit: &str,
        horizon: Horizon,
        values: Array1<FloatValue>,
    ) -> Self {
        debug_assert_eq!(values.len(), horizon.len());
        Self {
            variable: variable.to_string(),
            unit: unit.to_string(),
            horizon,
            values,
        }
    }

    pub fn constant(variable: &str, unit: &str, horizon: Horizon, value: FloatValue) -> Self {
        Self {
            variable: variable.to_string(),
            unit: unit.to_string(),
            horizon,
            values: Array1::from_elem(horizon.len(), value),
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn values(&self) -> &Array1<FloatValue> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, FloatValue)> + '_ {
        self.horizon.years().zip(self.values.iter().copied())
    }

    /// Same variable and horizon, different values.
    pub fn with_values(&self, values: Array1<FloatValue>) -> CfscmResult<Self> {
        Self::new(&self.variable, &self.unit, self.horizon, values)
    }

    pub fn sum(&self) -> FloatValue {
        self.values.sum()
    }
}

impl YearLookup for DenseSeries {
    fn value_at(&self, year: Year) -> Option<FloatValue> {
        self.horizon.index_of(year).map(|i| self.values[i])
    }
}
