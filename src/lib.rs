//! Counterfactual emissions scenarios driven through a reduced-complexity
//! climate model.
//!
//! A [`pipeline::Pipeline`] reads a wide emissions table and a reference
//! table, builds a baseline and a counterfactual scenario with `cfscm-core`,
//! drives both through a [`cfscm_engine::ClimateEngine`] with
//! [`driver::ModelDriver`], and compares the runs. Everything is configured
//! from one TOML file, see [`config::PipelineConfig`].

pub mod compare;
pub mod config;
pub mod driver;
pub mod export;
pub mod pipeline;
