//! Engine state arrays.
//!
//! Every array is indexed `[timepoint, scenario, config, species]`, except
//! temperature whose last axis is the ocean layer. Arrays start out `NaN` so
//! that anything left uninitialised is caught before a run.

use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::timeseries::FloatValue;
use ndarray::{s, Array4, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parameters::N_LAYERS;

/// Names of the state arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateArray {
    Emissions,
    Concentration,
    Forcing,
    Temperature,
    CumulativeEmissions,
    AirborneEmissions,
}

impl StateArray {
    pub const ALL: [StateArray; 6] = [
        StateArray::Emissions,
        StateArray::Concentration,
        StateArray::Forcing,
        StateArray::Temperature,
        StateArray::CumulativeEmissions,
        StateArray::AirborneEmissions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StateArray::Emissions => "emissions",
            StateArray::Concentration => "concentration",
            StateArray::Forcing => "forcing",
            StateArray::Temperature => "temperature",
            StateArray::CumulativeEmissions => "cumulative_emissions",
            StateArray::AirborneEmissions => "airborne_emissions",
        }
    }
}

impl fmt::Display for StateArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub emissions: Array4<FloatValue>,
    pub concentration: Array4<FloatValue>,
    pub forcing: Array4<FloatValue>,
    pub temperature: Array4<FloatValue>,
    pub cumulative_emissions: Array4<FloatValue>,
    pub airborne_emissions: Array4<FloatValue>,
    species_names: Vec<String>,
}

impl EngineState {
    pub fn allocate(
        n_timepoints: usize,
        n_scenarios: usize,
        n_configs: usize,
        species_names: Vec<String>,
    ) -> Self {
        let species_shape = (n_timepoints, n_scenarios, n_configs, species_names.len());
        let layer_shape = (n_timepoints, n_scenarios, n_configs, N_LAYERS);
        let nan = |shape: (usize, usize, usize, usize)| Array4::from_elem(shape, FloatValue::NAN);
        Self {
            emissions: nan(species_shape),
            concentration: nan(species_shape),
            forcing: nan(species_shape),
            temperature: nan(layer_shape),
            cumulative_emissions: nan(species_shape),
            airborne_emissions: nan(species_shape),
            species_names,
        }
    }

    pub fn array(&self, which: StateArray) -> &Array4<FloatValue> {
        match which {
            StateArray::Emissions => &self.emissions,
            StateArray::Concentration => &self.concentration,
            StateArray::Forcing => &self.forcing,
            StateArray::Temperature => &self.temperature,
            StateArray::CumulativeEmissions => &self.cumulative_emissions,
            StateArray::AirborneEmissions => &self.airborne_emissions,
        }
    }

    pub fn array_mut(&mut self, which: StateArray) -> &mut Array4<FloatValue> {
        match which {
            StateArray::Emissions => &mut self.emissions,
            StateArray::Concentration => &mut self.concentration,
            StateArray::Forcing => &mut self.forcing,
            StateArray::Temperature => &mut self.temperature,
            StateArray::CumulativeEmissions => &mut self.cumulative_emissions,
            StateArray::AirborneEmissions => &mut self.airborne_emissions,
        }
    }

    pub fn n_timepoints(&self) -> usize {
        self.emissions.shape()[0]
    }

    /// Time series of one species (or layer) of one array.
    pub fn series(
        &self,
        which: StateArray,
        scenario: usize,
        config: usize,
        index: usize,
    ) -> ArrayView1<'_, FloatValue> {
        self.array(which).slice(s![.., scenario, config, index])
    }

    /// Fill one species (or layer) of an array for every scenario and config.
    pub fn fill(&mut self, which: StateArray, index: usize, value: FloatValue) {
        self.array_mut(which)
            .slice_mut(s![.., .., .., index])
            .fill(value);
    }

    fn label(&self, which: StateArray, index: usize) -> String {
        match which {
            StateArray::Temperature => format!("layer {index}"),
            _ => self
                .species_names
                .get(index)
                .cloned()
                .unwrap_or_else(|| index.to_string()),
        }
    }

    /// `NaN` counts per array and species (or layer), skipping clean entries.
    pub fn uninitialised(&self) -> Vec<(StateArray, String, usize)> {
        let mut found = Vec::new();
        for which in StateArray::ALL {
            let array = self.array(which);
            for index in 0..array.shape()[3] {
                let count = array
                    .slice(s![.., .., .., index])
                    .iter()
                    .filter(|v| v.is_nan())
                    .count();
                if count > 0 {
                    found.push((which, self.label(which, index), count));
                }
            }
        }
        found
    }

    /// Fail on the first array holding a `NaN`.
    pub fn check_initialised(&self) -> CfscmResult<()> {
        match self.uninitialised().into_iter().next() {
            None => Ok(()),
            Some((which, species, count)) => Err(CfscmError::UninitializedState {
                array: which.name().to_string(),
                species,
                count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> EngineState {
        EngineState::allocate(4, 1, 1, vec!["CO2".to_string(), "CH4".to_string()])
    }

    #[test]
    fn allocated_arrays_are_nan() {
        let state = state();
        assert_eq!(state.emissions.shape(), &[4, 1, 1, 2]);
        assert_eq!(state.temperature.shape(), &[4, 1, 1, N_LAYERS]);
        assert!(state.concentration.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn names_the_first_uninitialised_array() {
        let mut state = state();
        for which in StateArray::ALL {
            state.array_mut(which).fill(0.0);
        }
        state.concentration[[2, 0, 0, 1]] = FloatValue::NAN;
        state.concentration[[3, 0, 0, 1]] = FloatValue::NAN;

        match state.check_initialised() {
            Err(CfscmError::UninitializedState {
                array,
                species,
                count,
            }) => {
                assert_eq!(array, "concentration");
                assert_eq!(species, "CH4");
                assert_eq!(count, 2);
            }
            other => panic!("expected UninitializedState, got {other:?}"),
        }
    }

    #[test]
    fn fill_covers_every_timepoint() {
        let mut state = state();
        state.fill(StateArray::Emissions, 0, 1.5);
        assert!(state.series(StateArray::Emissions, 0, 0, 0).iter().all(|v| *v == 1.5));
        assert_eq!(state.uninitialised()[0], (StateArray::Emissions, "CH4".to_string(), 4));
    }
}
