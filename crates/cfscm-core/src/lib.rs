//! Scenario construction for counterfactual emissions experiments.
//!
//! Sparse tables are read by [`loader`], densified by [`interpolate`],
//! shifted by [`adjust`] and finally placed on an engine's timepoints by
//! [`timegrid`]. Recoverable data-quality issues are collected in
//! [`diagnostics::Diagnostics`].

pub mod adjust;
pub mod diagnostics;
pub mod errors;
pub mod interpolate;
pub mod loader;
pub mod stitch;
pub mod timegrid;
pub mod timeseries;
pub mod units;
