//! The climate engine interface and its reference implementation.
//!
//! An engine is allocated once from an [`EngineSetup`], parameterised, given
//! emissions and an initial state through its state arrays, and then run over
//! the whole horizon in one go.
//!
//! [`ReferenceEngine`] keeps the physics deliberately small. Greenhouse gases
//! follow a one-box cycle towards their baseline concentration,
//!
//! $$ \frac{dC}{dt} = k (E - E_0) - \frac{C - C_0}{\tau} $$
//!
//! CO2 forcing is logarithmic in concentration, CH4 and N2O forcing scales with
//! the difference of square roots, and aerosol precursors force linearly in
//! their emissions. The total forcing drives a three-layer ocean:
//!
//! $$ C_1 \frac{dT_1}{dt} = F - \kappa_1 T_1 - \kappa_2 (T_1 - T_2) $$
//! $$ C_2 \frac{dT_2}{dt} = \kappa_2 (T_1 - T_2) - \epsilon \kappa_3 (T_2 - T_3) $$
//! $$ C_3 \frac{dT_3}{dt} = \kappa_3 (T_2 - T_3) $$

use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::timeseries::{FloatValue, Time};
use ndarray::Array1;
use ode_solvers::{Rk4, System, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::parameters::{ClimateParameters, PhysicalParameter, SpeciesParameters, N_LAYERS};
use crate::species::{SpeciesDefinition, SpeciesKind};
use crate::state::EngineState;

type ModelState = Vector3<FloatValue>;

/// Everything needed to allocate an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSetup {
    /// First time bound.
    pub start: Time,
    /// Last time bound.
    pub end: Time,
    pub step: Time,
    pub scenarios: Vec<String>,
    pub configs: Vec<String>,
    pub species: Vec<SpeciesDefinition>,
}

fn position<S: AsRef<str>>(
    kind: &str,
    mut names: impl Iterator<Item = S>,
    name: &str,
) -> CfscmResult<usize> {
    names
        .position(|n| n.as_ref() == name)
        .ok_or_else(|| CfscmError::Configuration(format!("unknown {kind} '{name}'")))
}

impl EngineSetup {
    pub fn validate(&self) -> CfscmResult<()> {
        if !(self.step > 0.0) || !(self.end > self.start) {
            return Err(CfscmError::Configuration(format!(
                "cannot step from {} to {} by {}",
                self.start, self.end, self.step
            )));
        }
        for (kind, empty) in [
            ("scenarios", self.scenarios.is_empty()),
            ("configs", self.configs.is_empty()),
            ("species", self.species.is_empty()),
        ] {
            if empty {
                return Err(CfscmError::Configuration(format!("no {kind} declared")));
            }
        }
        Ok(())
    }

    /// Number of steps between the time bounds.
    pub fn n_timepoints(&self) -> usize {
        ((self.end - self.start) / self.step).round() as usize
    }

    /// Midpoints of each step.
    pub fn timepoints(&self) -> Array1<Time> {
        (0..self.n_timepoints())
            .map(|i| self.start + (i as Time + 0.5) * self.step)
            .collect()
    }

    pub fn scenario_index(&self, name: &str) -> CfscmResult<usize> {
        position("scenario", self.scenarios.iter(), name)
    }

    pub fn config_index(&self, name: &str) -> CfscmResult<usize> {
        position("config", self.configs.iter(), name)
    }

    pub fn species_index(&self, name: &str) -> CfscmResult<usize> {
        position("species", self.species.iter().map(|s| s.name.as_str()), name)
    }
}

/// The surface a scenario driver needs from a climate engine.
pub trait ClimateEngine {
    /// Configure the horizon, scenarios, configs and species, and reserve
    /// every state array.
    fn allocate(setup: EngineSetup) -> CfscmResult<Self>
    where
        Self: Sized;

    fn setup(&self) -> &EngineSetup;

    fn timepoints(&self) -> &Array1<Time>;

    /// Fill species parameters with the engine's defaults.
    fn populate_default_species_parameters(&mut self);

    /// `None` until parameters have been populated.
    fn species_parameters(&self, species: &str) -> Option<&SpeciesParameters>;

    fn species_parameters_mut(&mut self, species: &str) -> Option<&mut SpeciesParameters>;

    fn climate_parameters(&self) -> &ClimateParameters;

    fn set_physical_parameter(&mut self, parameter: PhysicalParameter);

    fn set_solver_options(&mut self, options: SolverOptions);

    fn state(&self) -> &EngineState;

    fn state_mut(&mut self) -> &mut EngineState;

    /// Integrate every scenario and config over the whole horizon.
    fn run(&mut self) -> CfscmResult<()>;

    fn scenario_index(&self, name: &str) -> CfscmResult<usize> {
        self.setup().scenario_index(name)
    }

    fn config_index(&self, name: &str) -> CfscmResult<usize> {
        self.setup().config_index(name)
    }

    fn species_index(&self, name: &str) -> CfscmResult<usize> {
        self.setup().species_index(name)
    }
}

/// Solver options for the ODE integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub step_size: FloatValue,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self { step_size: 0.1 }
    }
}

/// The ocean energy balance under a constant forcing.
struct ThreeLayer {
    forcing: FloatValue,
    heat_capacity: [FloatValue; N_LAYERS],
    heat_transfer: [FloatValue; N_LAYERS],
    efficacy: FloatValue,
}

impl System<Time, ModelState> for ThreeLayer {
    fn system(&self, _t: Time, y: &ModelState, dy: &mut ModelState) {
        let [c1, c2, c3] = self.heat_capacity;
        let [k1, k2, k3] = self.heat_transfer;

        let upper_exchange = k2 * (y[0] - y[1]);
        let lower_exchange = k3 * (y[1] - y[2]);

        dy[0] = (self.forcing - k1 * y[0] - upper_exchange) / c1;
        dy[1] = (upper_exchange - self.efficacy * lower_exchange) / c2;
        dy[2] = lower_exchange / c3;
    }
}

/// Advance the layer temperatures over `[t_current, t_next]`.
pub(crate) fn step_energy_balance(
    climate: &ClimateParameters,
    layers: ModelState,
    forcing: FloatValue,
    t_current: Time,
    t_next: Time,
    step_size: FloatValue,
) -> CfscmResult<ModelState> {
    let system = ThreeLayer {
        forcing,
        heat_capacity: climate.ocean_heat_capacity,
        heat_transfer: climate.ocean_heat_transfer,
        efficacy: climate.deep_ocean_efficacy,
    };

    let mut solver = Rk4::new(system, t_current, layers, t_next, step_size);
    solver
        .integrate()
        .map_err(|e| CfscmError::Engine(format!("energy balance failed at {t_current}: {e:?}")))?;

    solver
        .y_out()
        .last()
        .copied()
        .ok_or_else(|| CfscmError::Engine(format!("energy balance produced no step at {t_current}")))
}

/// Concentration after `dt` under constant emissions, solved exactly.
fn step_gas(
    concentration: FloatValue,
    reference: FloatValue,
    excess_emissions: FloatValue,
    parameters: &SpeciesParameters,
    dt: Time,
) -> FloatValue {
    let equilibrium =
        reference + parameters.concentration_per_emission * excess_emissions * parameters.lifetime;
    equilibrium + (concentration - equilibrium) * (-dt / parameters.lifetime).exp()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEngine {
    setup: EngineSetup,
    timepoints: Array1<Time>,
    species_parameters: Vec<Option<SpeciesParameters>>,
    climate: ClimateParameters,
    solver_options: SolverOptions,
    state: EngineState,
}

impl ReferenceEngine {
    fn gas_forcing(
        &self,
        kind: SpeciesKind,
        parameters: &SpeciesParameters,
        concentration: FloatValue,
        reference: FloatValue,
    ) -> CfscmResult<FloatValue> {
        match kind {
            SpeciesKind::Co2 => {
                if concentration <= 0.0 || reference <= 0.0 {
                    return Err(CfscmError::Engine(format!(
                        "CO2 concentration {concentration} (baseline {reference}) must be positive"
                    )));
                }
                Ok(parameters.radiative_efficiency
                    * self.climate.co2_log_coefficient()
                    * (concentration / reference).ln())
            }
            _ => Ok(parameters.radiative_efficiency
                * (concentration.max(0.0).sqrt() - reference.max(0.0).sqrt())),
        }
    }

    fn run_member(
        &mut self,
        scenario: usize,
        config: usize,
        parameters: &[SpeciesParameters],
    ) -> CfscmResult<()> {
        let dt = self.setup.step;
        let kinds: Vec<SpeciesKind> = self.setup.species.iter().map(|s| s.kind).collect();

        let initial_concentration: Vec<FloatValue> = (0..kinds.len())
            .map(|k| self.state.concentration[[0, scenario, config, k]])
            .collect();
        let mut concentration = initial_concentration.clone();
        let mut cumulative: Vec<FloatValue> = (0..kinds.len())
            .map(|k| self.state.cumulative_emissions[[0, scenario, config, k]])
            .collect();
        let mut layers = ModelState::new(
            self.state.temperature[[0, scenario, config, 0]],
            self.state.temperature[[0, scenario, config, 1]],
            self.state.temperature[[0, scenario, config, 2]],
        );

        for i in 0..self.timepoints.len() {
            let t_current = self.setup.start + i as Time * dt;
            let mut total_forcing = 0.0;

            for (k, (&kind, p)) in kinds.iter().zip(parameters).enumerate() {
                let emissions = self.state.emissions[[i, scenario, config, k]];
                let excess = emissions - p.baseline_emissions;
                cumulative[k] += emissions * dt;

                let reference = p.baseline_concentration.unwrap_or(initial_concentration[k]);
                let (forcing, airborne) = if kind.is_greenhouse_gas() {
                    concentration[k] = step_gas(concentration[k], reference, excess, p, dt);
                    let forcing = self.gas_forcing(kind, p, concentration[k], reference)?;
                    let airborne = if p.concentration_per_emission > 0.0 {
                        (concentration[k] - reference) / p.concentration_per_emission
                    } else {
                        0.0
                    };
                    (forcing, airborne)
                } else {
                    (p.radiative_efficiency * excess, 0.0)
                };

                self.state.concentration[[i, scenario, config, k]] = concentration[k];
                self.state.forcing[[i, scenario, config, k]] = forcing;
                self.state.cumulative_emissions[[i, scenario, config, k]] = cumulative[k];
                self.state.airborne_emissions[[i, scenario, config, k]] = airborne;
                total_forcing += forcing;
            }

            layers = step_energy_balance(
                &self.climate,
                layers,
                total_forcing,
                t_current,
                t_current + dt,
                self.solver_options.step_size,
            )?;
            for layer in 0..N_LAYERS {
                self.state.temperature[[i, scenario, config, layer]] = layers[layer];
            }
        }
        Ok(())
    }
}

impl ClimateEngine for ReferenceEngine {
    fn allocate(setup: EngineSetup) -> CfscmResult<Self> {
        setup.validate()?;
        let timepoints = setup.timepoints();
        let state = EngineState::allocate(
            timepoints.len(),
            setup.scenarios.len(),
            setup.configs.len(),
            setup.species.iter().map(|s| s.name.clone()).collect(),
        );
        debug!(
            timepoints = timepoints.len(),
            scenarios = setup.scenarios.len(),
            species = setup.species.len(),
            "Allocated reference engine"
        );
        Ok(Self {
            species_parameters: vec![None; setup.species.len()],
            setup,
            timepoints,
            climate: ClimateParameters::default(),
            solver_options: SolverOptions::default(),
            state,
        })
    }

    fn setup(&self) -> &EngineSetup {
        &self.setup
    }

    fn timepoints(&self) -> &Array1<Time> {
        &self.timepoints
    }

    fn populate_default_species_parameters(&mut self) {
        self.species_parameters = self
            .setup
            .species
            .iter()
            .map(|s| Some(SpeciesParameters::default_for(s.kind)))
            .collect();
    }

    fn species_parameters(&self, species: &str) -> Option<&SpeciesParameters> {
        let index = self.setup.species_index(species).ok()?;
        self.species_parameters[index].as_ref()
    }

    fn species_parameters_mut(&mut self, species: &str) -> Option<&mut SpeciesParameters> {
        let index = self.setup.species_index(species).ok()?;
        self.species_parameters[index].as_mut()
    }

    fn climate_parameters(&self) -> &ClimateParameters {
        &self.climate
    }

    fn set_physical_parameter(&mut self, parameter: PhysicalParameter) {
        self.climate.apply(parameter);
    }

    fn set_solver_options(&mut self, options: SolverOptions) {
        self.solver_options = options;
    }

    fn state(&self) -> &EngineState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    fn run(&mut self) -> CfscmResult<()> {
        self.state.check_initialised()?;

        let parameters: Vec<SpeciesParameters> = self
            .setup
            .species
            .iter()
            .zip(&self.species_parameters)
            .map(|(species, p)| {
                p.clone().ok_or_else(|| {
                    CfscmError::Configuration(format!(
                        "no parameters for species '{}'",
                        species.name
                    ))
                })
            })
            .collect::<CfscmResult<_>>()?;

        if let Some((species, _)) = self
            .setup
            .species
            .iter()
            .zip(&parameters)
            .find(|(s, p)| s.kind.is_greenhouse_gas() && !(p.lifetime > 0.0))
        {
            return Err(CfscmError::Configuration(format!(
                "species '{}' needs a positive lifetime",
                species.name
            )));
        }

        for scenario in 0..self.setup.scenarios.len() {
            for config in 0..self.setup.configs.len() {
                self.run_member(scenario, config, &parameters)?;
            }
        }

        info!(
            scenarios = self.setup.scenarios.len(),
            timepoints = self.timepoints.len(),
            "Reference engine run complete"
        );
        Ok(())
    }
}
