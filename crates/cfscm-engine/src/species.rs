//! Species registry.
//!
//! Every species the engine understands is one of a fixed set of kinds. The
//! kind decides how the species is driven, whether it is a greenhouse gas and
//! which aerosol chemistry it takes part in.

use cfscm_core::errors::{CfscmError, CfscmResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precursors whose emissions act through aerosol chemistry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AerosolPrecursor {
    Sulfur,
    BlackCarbon,
    OrganicCarbon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeciesKind {
    Co2,
    Ch4,
    N2o,
    Aerosol(AerosolPrecursor),
}

/// How a species is prescribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Emissions,
    Concentration,
}

/// Capability flags declared for a species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesProperties {
    pub input_mode: InputMode,
    pub greenhouse_gas: bool,
    pub aerosol_chemistry_from_emissions: bool,
    pub aerosol_chemistry_from_concentration: bool,
}

impl SpeciesKind {
    /// Kind of a species from its engine name, e.g. `CO2` or `Sulfur`.
    pub fn from_name(name: &str) -> CfscmResult<Self> {
        match name {
            "CO2" => Ok(SpeciesKind::Co2),
            "CH4" => Ok(SpeciesKind::Ch4),
            "N2O" => Ok(SpeciesKind::N2o),
            "Sulfur" => Ok(SpeciesKind::Aerosol(AerosolPrecursor::Sulfur)),
            "BC" => Ok(SpeciesKind::Aerosol(AerosolPrecursor::BlackCarbon)),
            "OC" => Ok(SpeciesKind::Aerosol(AerosolPrecursor::OrganicCarbon)),
            other => Err(CfscmError::Configuration(format!(
                "unknown species '{other}'"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpeciesKind::Co2 => "CO2",
            SpeciesKind::Ch4 => "CH4",
            SpeciesKind::N2o => "N2O",
            SpeciesKind::Aerosol(AerosolPrecursor::Sulfur) => "Sulfur",
            SpeciesKind::Aerosol(AerosolPrecursor::BlackCarbon) => "BC",
            SpeciesKind::Aerosol(AerosolPrecursor::OrganicCarbon) => "OC",
        }
    }

    pub fn is_greenhouse_gas(&self) -> bool {
        !matches!(self, SpeciesKind::Aerosol(_))
    }

    pub fn properties(&self) -> SpeciesProperties {
        let greenhouse_gas = self.is_greenhouse_gas();
        SpeciesProperties {
            input_mode: InputMode::Emissions,
            greenhouse_gas,
            aerosol_chemistry_from_emissions: !greenhouse_gas,
            aerosol_chemistry_from_concentration: false,
        }
    }

    /// Unit the engine expects emissions of this species in.
    pub fn emissions_unit(&self) -> &'static str {
        match self {
            SpeciesKind::Co2 => "Gt CO2/yr",
            SpeciesKind::Ch4 => "Mt CH4/yr",
            SpeciesKind::N2o => "Mt N2O/yr",
            SpeciesKind::Aerosol(AerosolPrecursor::Sulfur) => "Mt SO2/yr",
            SpeciesKind::Aerosol(AerosolPrecursor::BlackCarbon) => "Mt BC/yr",
            SpeciesKind::Aerosol(AerosolPrecursor::OrganicCarbon) => "Mt OC/yr",
        }
    }

    pub fn concentration_unit(&self) -> &'static str {
        match self {
            SpeciesKind::Co2 => "ppm",
            SpeciesKind::Ch4 | SpeciesKind::N2o => "ppb",
            SpeciesKind::Aerosol(_) => "",
        }
    }
}

impl fmt::Display for SpeciesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A species declared to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesDefinition {
    pub name: String,
    pub kind: SpeciesKind,
    pub properties: SpeciesProperties,
}

impl SpeciesDefinition {
    pub fn new(kind: SpeciesKind) -> Self {
        Self {
            name: kind.name().to_string(),
            kind,
            properties: kind.properties(),
        }
    }

    pub fn from_name(name: &str) -> CfscmResult<Self> {
        SpeciesKind::from_name(name).map(Self::new)
    }
}

/// The six species of the standard experiment, in engine order.
pub fn standard_species() -> Vec<SpeciesDefinition> {
    [
        SpeciesKind::Co2,
        SpeciesKind::Ch4,
        SpeciesKind::N2o,
        SpeciesKind::Aerosol(AerosolPrecursor::Sulfur),
        SpeciesKind::Aerosol(AerosolPrecursor::BlackCarbon),
        SpeciesKind::Aerosol(AerosolPrecursor::OrganicCarbon),
    ]
    .into_iter()
    .map(SpeciesDefinition::new)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for definition in standard_species() {
            assert_eq!(SpeciesKind::from_name(&definition.name).unwrap(), definition.kind);
        }
    }

    #[test]
    fn aerosols_are_not_greenhouse_gases() {
        let sulfur = SpeciesKind::from_name("Sulfur").unwrap().properties();
        assert!(!sulfur.greenhouse_gas);
        assert!(sulfur.aerosol_chemistry_from_emissions);
        assert!(!sulfur.aerosol_chemistry_from_concentration);

        let co2 = SpeciesKind::Co2.properties();
        assert!(co2.greenhouse_gas);
        assert!(!co2.aerosol_chemistry_from_emissions);
        assert_eq!(co2.input_mode, InputMode::Emissions);
    }

    #[test]
    fn unknown_species() {
        assert!(matches!(
            SpeciesKind::from_name("CFC-11"),
            Err(CfscmError::Configuration(_))
        ));
    }
}
