use thiserror::Error;

use crate::timeseries::Year;

/// Error type for the scenario pipeline.
///
/// Only structural problems end up here. Data-quality issues that the pipeline
/// can recover from are recorded as [`crate::diagnostics::Diagnostic`]s instead.
#[derive(Error, Debug)]
pub enum CfscmError {
    #[error("Required variable '{variable}' is missing from {source_name}")]
    MissingVariable {
        variable: String,
        source_name: String,
    },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Uninitialised state: {count} NaN value(s) in '{array}' for species '{species}'")]
    UninitializedState {
        array: String,
        species: String,
        count: usize,
    },
    #[error("Invalid horizon: start year {start} is after end year {end}")]
    InvalidHorizon { start: Year, end: Year },
    #[error("Could not parse {what}: {details}")]
    Parse { what: String, details: String },
    #[error("Unit error for '{unit}': {details}")]
    Unit { unit: String, details: String },
    #[error("Adjustment reconciliation failed: applied {applied}, expected {expected}")]
    Adjustment { applied: f64, expected: f64 },
    #[error("Engine error: {0}")]
    Engine(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Workbook(#[from] calamine::XlsxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CfscmError {
    pub fn missing_variable(variable: &str, source_name: &str) -> Self {
        CfscmError::MissingVariable {
            variable: variable.to_string(),
            source_name: source_name.to_string(),
        }
    }

    pub fn parse(what: impl Into<String>, details: impl Into<String>) -> Self {
        CfscmError::Parse {
            what: what.into(),
            details: details.into(),
        }
    }
}

/// Convenience type for `Result<T, CfscmError>`.
pub type CfscmResult<T> = Result<T, CfscmError>;
