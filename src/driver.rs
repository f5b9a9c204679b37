//! Driving a climate engine with one scenario.
//!
//! A run always goes through the same steps: allocate the engine from an
//! [`EngineSetup`], populate default species parameters and apply the fixed
//! physical parameters, load the scenario's emissions onto the engine's
//! timepoints, initialise every state array, run, and read back a
//! [`RunResult`].

use std::collections::BTreeMap;
use std::marker::PhantomData;

use cfscm_core::diagnostics::Diagnostics;
use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::timegrid::ScenarioTimeline;
use cfscm_core::timeseries::{DenseSeries, FloatValue, Horizon, Time, Year};
use cfscm_core::units::conversion_factor;
use cfscm_engine::{
    ClimateEngine, ClimateParameters, EngineSetup, PhysicalParameter, ReferenceEngine,
    SolverOptions, SpeciesDefinition, StateArray, N_LAYERS,
};
use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{default_fallback_concentrations, PipelineConfig};

/// Immutable description of how every run is set up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub horizon: Horizon,
    pub step: Time,
    /// Step of the energy-balance ODE solver.
    pub solver_step: Time,
    pub config_name: String,
    pub species: Vec<SpeciesDefinition>,
    pub primary_species: String,
    pub climate: ClimateParameters,
    pub fallback_concentrations: BTreeMap<String, FloatValue>,
}

impl DriverConfig {
    /// The standard six-species setup over `horizon`.
    pub fn standard(horizon: Horizon) -> Self {
        Self {
            horizon,
            step: 1.0,
            solver_step: SolverOptions::default().step_size,
            config_name: "default".to_string(),
            species: cfscm_engine::standard_species(),
            primary_species: "CO2".to_string(),
            climate: ClimateParameters::default(),
            fallback_concentrations: default_fallback_concentrations(),
        }
    }

    pub fn from_pipeline(config: &PipelineConfig) -> CfscmResult<Self> {
        Ok(Self {
            horizon: config.horizon()?,
            step: config.engine.step,
            solver_step: config.engine.solver_step,
            config_name: config.engine.config_name.clone(),
            species: config.engine.species_definitions()?,
            primary_species: config.engine.primary_species.clone(),
            climate: config.climate.clone(),
            fallback_concentrations: config.engine.fallback_concentrations.clone(),
        })
    }

    pub fn engine_setup(&self, scenario: &str) -> EngineSetup {
        EngineSetup {
            start: Time::from(self.horizon.start()),
            end: Time::from(self.horizon.end()),
            step: self.step,
            scenarios: vec![scenario.to_string()],
            configs: vec![self.config_name.clone()],
            species: self.species.clone(),
        }
    }
}

/// A scenario ready to be driven: dense emissions per engine species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivenScenario {
    pub name: String,
    pub emissions: BTreeMap<String, DenseSeries>,
}

/// Where an initial concentration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcentrationSource {
    EngineBaseline,
    Fallback,
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConcentration {
    pub species: String,
    pub value: FloatValue,
    pub source: ConcentrationSource,
}

/// Concentration and emissions of one species over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesTrace {
    pub concentration: Array1<FloatValue>,
    pub emissions: Array1<FloatValue>,
}

/// What a run produced for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub scenario: String,
    pub primary_species: String,
    /// Calendar year of each timepoint.
    pub years: Vec<Year>,
    /// Surface-layer temperature anomaly at the end of each step (K).
    pub temperature: Array1<FloatValue>,
    pub concentration: Array1<FloatValue>,
    pub emissions: Array1<FloatValue>,
    pub concentration_unit: String,
    pub emissions_unit: String,
    /// Every other species, keyed by engine name.
    pub additional: BTreeMap<String, SpeciesTrace>,
}

impl RunResult {
    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// Apply every physical parameter of `climate`, failing if the engine's
/// species parameters have not been populated.
pub fn configure_engine<E: ClimateEngine>(
    engine: &mut E,
    climate: &ClimateParameters,
) -> CfscmResult<()> {
    for species in &engine.setup().species {
        if engine.species_parameters(&species.name).is_none() {
            return Err(CfscmError::Configuration(format!(
                "engine has no parameters for species '{}'",
                species.name
            )));
        }
    }
    for parameter in PhysicalParameter::all(climate) {
        debug!(parameter = parameter.name(), "Setting physical parameter");
        engine.set_physical_parameter(parameter);
    }
    Ok(())
}

/// Write the scenario's emissions onto the engine timepoints.
///
/// Emissions are converted into each species' native unit. Timepoints without
/// a matching year keep the engine's default.
pub fn load_emissions<E: ClimateEngine>(
    engine: &mut E,
    scenario: &DrivenScenario,
    diagnostics: &mut Diagnostics,
) -> CfscmResult<()> {
    let timeline = ScenarioTimeline::new(engine.timepoints().clone());
    let scenario_index = engine.scenario_index(&scenario.name)?;
    let species = engine.setup().species.clone();

    for (k, definition) in species.iter().enumerate() {
        let Some(series) = scenario.emissions.get(&definition.name) else {
            debug!(species = %definition.name, "No emissions supplied");
            continue;
        };
        let scale = conversion_factor(series.unit(), definition.kind.emissions_unit())?;
        let mapped = timeline.map(series, scale, diagnostics);

        let emissions = &mut engine.state_mut().emissions;
        for (i, value) in mapped.filled() {
            emissions.slice_mut(s![i, scenario_index, .., k]).fill(value);
        }
        info!(
            species = %definition.name,
            filled = mapped.written,
            skipped = mapped.skipped,
            scale,
            "Loaded emissions"
        );
    }
    Ok(())
}

/// Zero the derived state and set every concentration to its initial value.
///
/// The initial concentration of a species is the engine's baseline when it
/// has one, otherwise the configured fallback, otherwise zero.
pub fn initialise_state<E: ClimateEngine>(
    engine: &mut E,
    fallback_concentrations: &BTreeMap<String, FloatValue>,
) -> CfscmResult<Vec<InitialConcentration>> {
    let species = engine.setup().species.clone();
    let mut initial = Vec::with_capacity(species.len());

    for (k, definition) in species.iter().enumerate() {
        let baseline = engine
            .species_parameters(&definition.name)
            .ok_or_else(|| {
                CfscmError::Configuration(format!(
                    "engine has no parameters for species '{}'",
                    definition.name
                ))
            })?
            .baseline_concentration;

        let (value, source) = match (baseline, fallback_concentrations.get(&definition.name)) {
            (Some(v), _) => (v, ConcentrationSource::EngineBaseline),
            (None, Some(&v)) => (v, ConcentrationSource::Fallback),
            (None, None) => (0.0, ConcentrationSource::Zero),
        };

        let state = engine.state_mut();
        state.fill(StateArray::Concentration, k, value);
        for which in [
            StateArray::Forcing,
            StateArray::CumulativeEmissions,
            StateArray::AirborneEmissions,
        ] {
            state.fill(which, k, 0.0);
        }

        debug!(species = %definition.name, value, source = ?source, "Initial concentration");
        initial.push(InitialConcentration {
            species: definition.name.clone(),
            value,
            source,
        });
    }

    for layer in 0..N_LAYERS {
        engine.state_mut().fill(StateArray::Temperature, layer, 0.0);
    }
    Ok(initial)
}

/// Read the configured scenario back from a finished engine.
pub fn extract_result<E: ClimateEngine>(
    engine: &E,
    scenario: &str,
    config_name: &str,
    primary_species: &str,
) -> CfscmResult<RunResult> {
    let s = engine.scenario_index(scenario)?;
    let c = engine.config_index(config_name)?;
    let primary = engine.species_index(primary_species)?;
    let state = engine.state();

    let years: Vec<Year> = engine
        .timepoints()
        .iter()
        .map(|t| t.floor() as Year)
        .collect();

    let trace = |k: usize| SpeciesTrace {
        concentration: state.series(StateArray::Concentration, s, c, k).to_owned(),
        emissions: state.series(StateArray::Emissions, s, c, k).to_owned(),
    };

    let additional = engine
        .setup()
        .species
        .iter()
        .enumerate()
        .filter(|(k, _)| *k != primary)
        .map(|(k, definition)| (definition.name.clone(), trace(k)))
        .collect();

    let primary_trace = trace(primary);
    let kind = engine.setup().species[primary].kind;

    Ok(RunResult {
        scenario: scenario.to_string(),
        primary_species: primary_species.to_string(),
        years,
        temperature: state.series(StateArray::Temperature, s, c, 0).to_owned(),
        concentration: primary_trace.concentration,
        emissions: primary_trace.emissions,
        concentration_unit: kind.concentration_unit().to_string(),
        emissions_unit: kind.emissions_unit().to_string(),
        additional,
    })
}

/// Runs scenarios through a fresh engine of type `E` each time.
#[derive(Debug, Clone)]
pub struct ModelDriver<E: ClimateEngine = ReferenceEngine> {
    config: DriverConfig,
    engine: PhantomData<E>,
}

impl<E: ClimateEngine> ModelDriver<E> {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            engine: PhantomData,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Allocate and fully initialise an engine for `scenario`, without running it.
    pub fn prepare(
        &self,
        scenario: &DrivenScenario,
        diagnostics: &mut Diagnostics,
    ) -> CfscmResult<(E, Vec<InitialConcentration>)> {
        let mut engine = E::allocate(self.config.engine_setup(&scenario.name))?;
        engine.populate_default_species_parameters();
        configure_engine(&mut engine, &self.config.climate)?;
        engine.set_solver_options(SolverOptions {
            step_size: self.config.solver_step,
        });
        load_emissions(&mut engine, scenario, diagnostics)?;
        let initial = initialise_state(&mut engine, &self.config.fallback_concentrations)?;
        engine.state().check_initialised()?;
        Ok((engine, initial))
    }

    pub fn run(
        &self,
        scenario: &DrivenScenario,
        diagnostics: &mut Diagnostics,
    ) -> CfscmResult<RunResult> {
        let (mut engine, _) = self.prepare(scenario, diagnostics)?;
        info!(scenario = %scenario.name, "Running climate engine");
        engine.run()?;
        extract_result(
            &engine,
            &scenario.name,
            &self.config.config_name,
            &self.config.primary_species,
        )
    }
}
