//! TOML pipeline configuration.
//!
//! Every field has a default reproducing the standard experiment: SSP2-4.5
//! emissions from 1750 to 2023, with CO2 emissions from 1976 onwards shifted
//! to a world where carbon intensity stayed at its 1975 level. Load from TOML
//! with [`PipelineConfig::from_toml_file`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cfscm_core::diagnostics::LengthPolicy;
use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::loader::ReferenceColumns;
use cfscm_core::timeseries::{FloatValue, Horizon, Year};
use cfscm_engine::{ClimateParameters, SpeciesDefinition};
use serde::{Deserialize, Serialize};

/// Top-level pipeline configuration parsed from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Calendar years covered by the dense series and the engine.
    pub horizon: HorizonConfig,
    /// Input tables.
    pub inputs: InputsConfig,
    /// The counterfactual adjustment.
    pub counterfactual: CounterfactualConfig,
    /// Engine setup and state initialisation.
    pub engine: EngineConfig,
    /// Physical parameters of the energy balance.
    pub climate: ClimateParameters,
    /// Output files.
    pub output: OutputConfig,
    /// Scenario comparison.
    pub compare: CompareConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HorizonConfig {
    pub start: Year,
    pub end: Year,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            start: 1750,
            end: 2023,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    /// Wide emissions table of the baseline scenario.
    pub emissions: PathBuf,
    /// Reference workbook, `.xlsx` or a CSV export of it.
    pub reference: PathBuf,
    /// Unit of both reference columns.
    pub reference_unit: String,
    /// Zero-based positions of the reference columns.
    pub reference_columns: ReferenceColumns,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            emissions: PathBuf::from("inputs/emissions_ssp245.csv"),
            reference: PathBuf::from("inputs/reference.csv"),
            reference_unit: "Gt CO2/yr".to_string(),
            reference_columns: ReferenceColumns::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CounterfactualConfig {
    /// Variable receiving the adjustment.
    pub target_variable: String,
    pub window_start: Year,
    pub window_end: Year,
    /// Reference-to-target unit factor. Derived from the units when unset.
    pub scale: Option<FloatValue>,
}

impl Default for CounterfactualConfig {
    fn default() -> Self {
        Self {
            target_variable: "Emissions|CO2".to_string(),
            window_start: 1976,
            window_end: 2023,
            scale: None,
        }
    }
}

/// Which engine species an input variable drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeciesMapping {
    pub variable: String,
    pub species: String,
}

impl SpeciesMapping {
    fn new(variable: &str, species: &str) -> Self {
        Self {
            variable: variable.to_string(),
            species: species.to_string(),
        }
    }
}

/// Concentrations used when the engine has no baseline for a species.
pub fn default_fallback_concentrations() -> BTreeMap<String, FloatValue> {
    [
        ("CO2", 278.0),
        ("CO2 FFI", 278.0),
        ("CO2 AFOLU", 278.0),
        ("CH4", 729.2),
        ("N2O", 270.0),
    ]
    .into_iter()
    .map(|(species, value)| (species.to_string(), value))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub baseline_scenario: String,
    pub counterfactual_scenario: String,
    pub config_name: String,
    /// Engine step (yr). Only annual steps are supported.
    pub step: FloatValue,
    /// Step of the energy-balance ODE solver (yr), at most `step`.
    pub solver_step: FloatValue,
    /// Species whose concentration and emissions are reported first.
    pub primary_species: String,
    pub species: Vec<SpeciesMapping>,
    pub fallback_concentrations: BTreeMap<String, FloatValue>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_scenario: "baseline_ssp245".to_string(),
            counterfactual_scenario: "counterfactual_1975".to_string(),
            config_name: "default".to_string(),
            step: 1.0,
            solver_step: 0.1,
            primary_species: "CO2".to_string(),
            species: vec![
                SpeciesMapping::new("Emissions|CO2", "CO2"),
                SpeciesMapping::new("Emissions|CH4", "CH4"),
                SpeciesMapping::new("Emissions|N2O", "N2O"),
                SpeciesMapping::new("Emissions|Sulfur", "Sulfur"),
                SpeciesMapping::new("Emissions|BC", "BC"),
                SpeciesMapping::new("Emissions|OC", "OC"),
            ],
            fallback_concentrations: default_fallback_concentrations(),
        }
    }
}

impl EngineConfig {
    pub fn species_definitions(&self) -> CfscmResult<Vec<SpeciesDefinition>> {
        self.species
            .iter()
            .map(|m| SpeciesDefinition::from_name(&m.species))
            .collect()
    }

    pub fn species_for(&self, variable: &str) -> Option<&str> {
        self.species
            .iter()
            .find(|m| m.variable == variable)
            .map(|m| m.species.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Tidy comparison table.
    pub results: PathBuf,
    /// Summary of the comparison as TOML.
    pub summary: Option<PathBuf>,
    /// Dense baseline table, written before the adjustment.
    pub interpolated: Option<PathBuf>,
    /// Dense counterfactual table.
    pub counterfactual: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results: PathBuf::from("outputs/comparison_results.csv"),
            summary: None,
            interpolated: None,
            counterfactual: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompareConfig {
    pub length_policy: LengthPolicy,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            length_policy: LengthPolicy::Truncate,
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> CfscmResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string, rejecting unknown fields.
    pub fn from_toml_str(s: &str) -> CfscmResult<Self> {
        toml::from_str(s).map_err(|e| CfscmError::Configuration(e.to_string()))
    }

    pub fn horizon(&self) -> CfscmResult<Horizon> {
        Horizon::new(self.horizon.start, self.horizon.end)
    }

    pub fn window(&self) -> CfscmResult<Horizon> {
        Horizon::new(self.counterfactual.window_start, self.counterfactual.window_end)
    }

    /// Check the configuration as a whole, reporting every problem at once.
    pub fn validate(&self) -> CfscmResult<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.horizon.start > self.horizon.end {
            problems.push(format!(
                "horizon: start {} is after end {}",
                self.horizon.start, self.horizon.end
            ));
        }
        if self.counterfactual.window_start > self.counterfactual.window_end {
            problems.push(format!(
                "counterfactual: window_start {} is after window_end {}",
                self.counterfactual.window_start, self.counterfactual.window_end
            ));
        }
        if self.engine.species_for(&self.counterfactual.target_variable).is_none() {
            problems.push(format!(
                "counterfactual.target_variable: '{}' is not mapped to an engine species",
                self.counterfactual.target_variable
            ));
        }
        if !self
            .engine
            .species
            .iter()
            .any(|m| m.species == self.engine.primary_species)
        {
            problems.push(format!(
                "engine.primary_species: '{}' is not among the mapped species",
                self.engine.primary_species
            ));
        }
        if let Err(e) = self.engine.species_definitions() {
            problems.push(format!("engine.species: {e}"));
        }
        for (i, mapping) in self.engine.species.iter().enumerate() {
            if self.engine.species[..i]
                .iter()
                .any(|m| m.species == mapping.species || m.variable == mapping.variable)
            {
                problems.push(format!(
                    "engine.species: '{}' -> '{}' is mapped twice",
                    mapping.variable, mapping.species
                ));
            }
        }
        // Timepoints must land on year + 0.5 for the timeline to match them.
        if self.engine.step != 1.0 {
            problems.push(format!(
                "engine.step: {} is not supported, only annual steps (1.0)",
                self.engine.step
            ));
        }
        if !(self.engine.solver_step > 0.0) || self.engine.solver_step > self.engine.step {
            problems.push(format!(
                "engine.solver_step: {} must be > 0 and no larger than engine.step",
                self.engine.solver_step
            ));
        }
        if self.engine.baseline_scenario == self.engine.counterfactual_scenario {
            problems.push("engine: scenario names must differ".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CfscmError::Configuration(problems.join("; ")))
        }
    }
}
