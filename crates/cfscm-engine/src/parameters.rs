//! Engine parameters
//!
//! Species parameters describe the gas cycle and forcing of one species.
//! Climate parameters describe the three-layer ocean energy balance shared by
//! all species.

use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

use crate::species::{AerosolPrecursor, SpeciesKind};

/// Number of ocean layers in the energy balance.
pub const N_LAYERS: usize = 3;

/// Gas-cycle and forcing parameters of a single species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesParameters {
    /// Pre-industrial concentration. `None` for species without one.
    /// unit: ppm (CO2) or ppb (CH4, N2O)
    pub baseline_concentration: Option<FloatValue>,

    /// Emissions that hold the species at its baseline.
    /// unit: native emissions unit of the species
    pub baseline_emissions: FloatValue,

    /// e-folding time of the concentration anomaly.
    /// unit: yr
    pub lifetime: FloatValue,

    /// Concentration increase per unit of emitted mass.
    /// unit: concentration unit / emissions unit yr
    pub concentration_per_emission: FloatValue,

    /// Forcing coefficient.
    ///
    /// For CO2 the forcing is logarithmic in concentration with the slope
    /// implied by `forcing_4co2`, which this scales; for CH4 and N2O it
    /// multiplies the difference of square roots; for aerosol precursors it is
    /// the forcing per unit of emissions above the baseline.
    pub radiative_efficiency: FloatValue,
}

impl SpeciesParameters {
    /// Reference-engine defaults for a species kind.
    pub fn default_for(kind: SpeciesKind) -> Self {
        match kind {
            SpeciesKind::Co2 => Self {
                baseline_concentration: Some(278.3),
                baseline_emissions: 0.0,
                lifetime: 120.0,
                // 1 ppm CO2 = 2.124 GtC = 7.782 GtCO2
                concentration_per_emission: 1.0 / 7.782,
                radiative_efficiency: 1.0,
            },
            SpeciesKind::Ch4 => Self {
                baseline_concentration: Some(729.2),
                baseline_emissions: 19.0,
                lifetime: 9.3,
                concentration_per_emission: 1.0 / 2.75,
                radiative_efficiency: 0.036,
            },
            SpeciesKind::N2o => Self {
                baseline_concentration: Some(270.1),
                baseline_emissions: 0.0,
                lifetime: 109.0,
                concentration_per_emission: 1.0 / 7.53,
                radiative_efficiency: 0.12,
            },
            SpeciesKind::Aerosol(precursor) => {
                let (baseline_emissions, radiative_efficiency) = match precursor {
                    AerosolPrecursor::Sulfur => (2.44, -0.0036),
                    AerosolPrecursor::BlackCarbon => (2.10, 0.0508),
                    AerosolPrecursor::OrganicCarbon => (15.4, -0.0062),
                };
                Self {
                    baseline_concentration: None,
                    baseline_emissions,
                    lifetime: 0.0,
                    concentration_per_emission: 0.0,
                    radiative_efficiency,
                }
            }
        }
    }
}

/// Three-layer energy balance parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClimateParameters {
    /// Heat capacity of each layer, surface first.
    /// unit: W yr / m^2 / K
    pub ocean_heat_capacity: [FloatValue; N_LAYERS],

    /// Heat transfer coefficients. The first entry is the climate feedback
    /// parameter, the others couple neighbouring layers.
    /// unit: W / m^2 / K
    pub ocean_heat_transfer: [FloatValue; N_LAYERS],

    /// Efficacy of heat uptake by the deepest layer.
    pub deep_ocean_efficacy: FloatValue,

    /// Effective radiative forcing of a quadrupling of CO2.
    /// unit: W / m^2
    pub forcing_4co2: FloatValue,
}

impl Default for ClimateParameters {
    fn default() -> Self {
        Self {
            ocean_heat_capacity: [2.92, 11.28, 73.25],
            ocean_heat_transfer: [0.73, 0.70, 0.70],
            deep_ocean_efficacy: 1.28,
            forcing_4co2: 7.32,
        }
    }
}

impl ClimateParameters {
    pub fn apply(&mut self, parameter: PhysicalParameter) {
        match parameter {
            PhysicalParameter::OceanHeatCapacity(v) => self.ocean_heat_capacity = v,
            PhysicalParameter::OceanHeatTransfer(v) => self.ocean_heat_transfer = v,
            PhysicalParameter::DeepOceanEfficacy(v) => self.deep_ocean_efficacy = v,
            PhysicalParameter::Forcing4co2(v) => self.forcing_4co2 = v,
        }
    }

    /// Forcing per e-fold of CO2 concentration implied by `forcing_4co2`.
    pub fn co2_log_coefficient(&self) -> FloatValue {
        self.forcing_4co2 / 4.0_f64.ln()
    }
}

/// A single physical parameter setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PhysicalParameter {
    OceanHeatCapacity([FloatValue; N_LAYERS]),
    OceanHeatTransfer([FloatValue; N_LAYERS]),
    DeepOceanEfficacy(FloatValue),
    Forcing4co2(FloatValue),
}

fn layers(name: &str, values: &[FloatValue]) -> CfscmResult<[FloatValue; N_LAYERS]> {
    values.try_into().map_err(|_| {
        CfscmError::Configuration(format!(
            "'{name}' takes {N_LAYERS} values, got {}",
            values.len()
        ))
    })
}

fn scalar(name: &str, values: &[FloatValue]) -> CfscmResult<FloatValue> {
    match values {
        [v] => Ok(*v),
        _ => Err(CfscmError::Configuration(format!(
            "'{name}' takes a single value, got {}",
            values.len()
        ))),
    }
}

impl PhysicalParameter {
    /// Look a parameter up by its configuration name.
    pub fn from_name(name: &str, values: &[FloatValue]) -> CfscmResult<Self> {
        match name {
            "ocean_heat_capacity" => layers(name, values).map(Self::OceanHeatCapacity),
            "ocean_heat_transfer" => layers(name, values).map(Self::OceanHeatTransfer),
            "deep_ocean_efficacy" => scalar(name, values).map(Self::DeepOceanEfficacy),
            "forcing_4co2" => scalar(name, values).map(Self::Forcing4co2),
            other => Err(CfscmError::Configuration(format!(
                "unknown climate parameter '{other}'"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OceanHeatCapacity(_) => "ocean_heat_capacity",
            Self::OceanHeatTransfer(_) => "ocean_heat_transfer",
            Self::DeepOceanEfficacy(_) => "deep_ocean_efficacy",
            Self::Forcing4co2(_) => "forcing_4co2",
        }
    }

    /// Every parameter of `parameters`, in a fixed order.
    pub fn all(parameters: &ClimateParameters) -> [Self; 4] {
        [
            Self::OceanHeatCapacity(parameters.ocean_heat_capacity),
            Self::OceanHeatTransfer(parameters.ocean_heat_transfer),
            Self::DeepOceanEfficacy(parameters.deep_ocean_efficacy),
            Self::Forcing4co2(parameters.forcing_4co2),
        ]
    }
}
