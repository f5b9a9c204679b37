//! A small climate engine for driving emissions scenarios.
//!
//! The [`engine::ClimateEngine`] trait is the surface a scenario driver talks
//! to. [`engine::ReferenceEngine`] implements it with one-box gas cycles and a
//! three-layer ocean energy balance.
//!
//! # Module Organisation
//!
//! - `species`: the species registry and declared properties
//! - `parameters`: species and climate parameters with defaults
//! - `state`: the state arrays shared between driver and engine
//! - `engine`: allocation, parameterisation and forward integration

pub mod engine;
pub mod parameters;
pub mod species;
pub mod state;

pub use engine::{ClimateEngine, EngineSetup, ReferenceEngine, SolverOptions};
pub use parameters::{ClimateParameters, PhysicalParameter, SpeciesParameters, N_LAYERS};
pub use species::{standard_species, SpeciesDefinition, SpeciesKind};
pub use state::{EngineState, StateArray};
