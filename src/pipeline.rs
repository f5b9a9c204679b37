//! The end-to-end pipeline.
//!
//! One [`PipelineConfig`] drives every stage: the emissions table is densified
//! over the horizon, a counterfactual copy is built by shifting the target
//! variable, both scenarios are driven through a fresh engine, and the two
//! runs are compared. Recovered issues from every stage end up in one
//! [`Diagnostics`] collector.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use cfscm_core::adjust::{adjust_scenario, AdjustmentSummary, AdjustmentTable};
use cfscm_core::diagnostics::Diagnostics;
use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::interpolate::interpolate_all;
use cfscm_core::loader::{
    read_reference_table_path, write_wide_table_path, ReferenceSeries, SeriesTable,
};
use cfscm_core::timeseries::{DenseSeries, FloatValue};
use cfscm_core::units::conversion_factor;
use cfscm_engine::{ClimateEngine, ReferenceEngine};
use tracing::info;

use crate::compare::{compare, ComparisonReport};
use crate::config::PipelineConfig;
use crate::driver::{DriverConfig, DrivenScenario, ModelDriver, RunResult};
use crate::export::{export_results, export_summary};

/// Dense baseline and counterfactual series, before any engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioInputs {
    /// Every row of the emissions table, densified over the horizon.
    pub interpolated: Vec<DenseSeries>,
    /// `interpolated` with the target variable adjusted.
    pub counterfactual: Vec<DenseSeries>,
    pub table: AdjustmentTable,
    pub adjustment: AdjustmentSummary,
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub inputs: ScenarioInputs,
    pub baseline: RunResult,
    pub counterfactual: RunResult,
    pub report: ComparisonReport,
    pub diagnostics: Diagnostics,
}

fn ensure_parent(path: &Path) -> CfscmResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub struct Pipeline<E: ClimateEngine = ReferenceEngine> {
    config: PipelineConfig,
    driver: ModelDriver<E>,
}

impl<E: ClimateEngine> Pipeline<E> {
    /// Validate `config` and prepare a driver for it.
    pub fn new(config: PipelineConfig) -> CfscmResult<Self> {
        config.validate()?;
        let driver = ModelDriver::new(DriverConfig::from_pipeline(&config)?);
        Ok(Self { config, driver })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn load_emissions(&self) -> CfscmResult<SeriesTable> {
        SeriesTable::from_path(&self.config.inputs.emissions)
    }

    pub fn load_reference(&self) -> CfscmResult<ReferenceSeries> {
        let inputs = &self.config.inputs;
        read_reference_table_path(
            &inputs.reference,
            inputs.reference_columns,
            &inputs.reference_unit,
        )
    }

    /// Factor taking reference units into the unit of `target`.
    pub fn adjustment_scale(
        &self,
        reference_unit: &str,
        target: &DenseSeries,
    ) -> CfscmResult<FloatValue> {
        match self.config.counterfactual.scale {
            Some(scale) => Ok(scale),
            None => conversion_factor(reference_unit, target.unit()),
        }
    }

    /// Densify the table and build the counterfactual copy.
    ///
    /// Every variable mapped to an engine species must be present.
    pub fn build_scenarios(
        &self,
        emissions: &SeriesTable,
        reference: &ReferenceSeries,
        diagnostics: &mut Diagnostics,
    ) -> CfscmResult<ScenarioInputs> {
        for mapping in &self.config.engine.species {
            emissions.require(&mapping.variable)?;
        }

        let horizon = self.config.horizon()?;
        let interpolated = interpolate_all(emissions.series(), horizon, diagnostics);

        let window = self.config.window()?;
        let table = AdjustmentTable::derive(&reference.actual, &reference.counterfactual, window);
        let target_variable = &self.config.counterfactual.target_variable;
        let target = interpolated
            .iter()
            .find(|s| s.variable() == target_variable.as_str())
            .ok_or_else(|| CfscmError::missing_variable(target_variable, emissions.source_name()))?;
        let scale = self.adjustment_scale(reference.actual.unit(), target)?;

        let (counterfactual, adjustment) =
            adjust_scenario(&interpolated, target_variable, &table, scale, diagnostics)?;

        info!(
            rows = table.len(),
            scale,
            applied_total = adjustment.applied_total,
            mean_adjustment = adjustment.mean_adjustment(),
            "Built counterfactual scenario"
        );

        Ok(ScenarioInputs {
            interpolated,
            counterfactual,
            table,
            adjustment,
        })
    }

    /// Key `series` by the engine species their variables are mapped to.
    fn driven(&self, name: &str, series: &[DenseSeries]) -> DrivenScenario {
        let emissions: BTreeMap<String, DenseSeries> = series
            .iter()
            .filter_map(|s| {
                self.config
                    .engine
                    .species_for(s.variable())
                    .map(|species| (species.to_string(), s.clone()))
            })
            .collect();
        DrivenScenario {
            name: name.to_string(),
            emissions,
        }
    }

    /// Run every stage on tables that are already loaded. Writes nothing.
    pub fn run_with_inputs(
        &self,
        emissions: &SeriesTable,
        reference: &ReferenceSeries,
    ) -> CfscmResult<PipelineOutcome> {
        let mut diagnostics = Diagnostics::new();
        let inputs = self.build_scenarios(emissions, reference, &mut diagnostics)?;

        let engine = &self.config.engine;
        let baseline = self.driver.run(
            &self.driven(&engine.baseline_scenario, &inputs.interpolated),
            &mut diagnostics,
        )?;
        let counterfactual = self.driver.run(
            &self.driven(&engine.counterfactual_scenario, &inputs.counterfactual),
            &mut diagnostics,
        )?;

        let report = compare(
            &baseline,
            &counterfactual,
            self.config.compare.length_policy,
            &mut diagnostics,
        )?;

        if !diagnostics.is_empty() {
            info!(count = diagnostics.len(), "Pipeline recovered from data issues");
        }

        Ok(PipelineOutcome {
            inputs,
            baseline,
            counterfactual,
            report,
            diagnostics,
        })
    }

    /// Write the configured output files.
    pub fn write_outputs(
        &self,
        outcome: &PipelineOutcome,
        scenario_label: &str,
    ) -> CfscmResult<()> {
        let output = &self.config.output;

        export_results(&outcome.report, &output.results)?;
        info!(
            path = %output.results.display(),
            rows = outcome.report.len(),
            "Wrote comparison results"
        );

        if let Some(path) = &output.summary {
            export_summary(&outcome.report.summary, path)?;
            info!(path = %path.display(), "Wrote comparison summary");
        }
        if let Some(path) = &output.interpolated {
            ensure_parent(path)?;
            write_wide_table_path(path, scenario_label, &outcome.inputs.interpolated)?;
        }
        if let Some(path) = &output.counterfactual {
            ensure_parent(path)?;
            write_wide_table_path(
                path,
                &self.config.engine.counterfactual_scenario,
                &outcome.inputs.counterfactual,
            )?;
        }
        Ok(())
    }

    /// Load the configured inputs, run every stage and write the outputs.
    pub fn run(&self) -> CfscmResult<PipelineOutcome> {
        let emissions = self.load_emissions()?;
        let reference = self.load_reference()?;
        info!(
            emissions = %self.config.inputs.emissions.display(),
            rows = emissions.rows().len(),
            reference = %self.config.inputs.reference.display(),
            "Loaded inputs"
        );

        let outcome = self.run_with_inputs(&emissions, &reference)?;
        let label = emissions
            .scenario()
            .unwrap_or(&self.config.engine.baseline_scenario)
            .to_string();
        self.write_outputs(&outcome, &label)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfscm_core::timeseries::{EmissionsSeries, YearLookup};
    use std::io::Cursor;

    const EMISSIONS: &str = "\
Scenario,Variable,Unit,1850,1900,1950,2000
ssp245,Emissions|CO2,Mt CO2/yr,200,2000,6000,25000
ssp245,Emissions|CH4,Mt CH4/yr,30,60,150,300
ssp245,Emissions|N2O,kt N2O/yr,2000,4000,6000,8000
ssp245,Emissions|Sulfur,Mt SO2/yr,2,20,60,90
ssp245,Emissions|BC,Mt BC/yr,2.1,3,5,7
ssp245,Emissions|OC,Mt OC/yr,15,18,25,30
";

    fn config() -> PipelineConfig {
        PipelineConfig::from_toml_str(
            r#"
            [horizon]
            start = 1850
            end = 2000

            [counterfactual]
            window_start = 1960
            window_end = 2000
            "#,
        )
        .unwrap()
    }

    fn reference() -> ReferenceSeries {
        ReferenceSeries {
            actual: EmissionsSeries::from_pairs(
                "Reference|Actual",
                "Gt CO2/yr",
                (1950..=2000).map(|y| (y, 10.0)),
            ),
            counterfactual: EmissionsSeries::from_pairs(
                "Reference|Counterfactual",
                "Gt CO2/yr",
                (1950..=2000).map(|y| (y, 14.0)),
            ),
        }
    }

    fn table() -> SeriesTable {
        SeriesTable::from_reader(Cursor::new(EMISSIONS), "emissions").unwrap()
    }

    #[test]
    fn counterfactual_shifts_only_the_window() {
        let pipeline: Pipeline = Pipeline::new(config()).unwrap();
        let inputs = pipeline
            .build_scenarios(&table(), &reference(), &mut Diagnostics::new())
            .unwrap();

        let baseline = &inputs.interpolated[0];
        let shifted = &inputs.counterfactual[0];
        assert_eq!(shifted.value_at(1959), baseline.value_at(1959));
        assert_eq!(
            shifted.value_at(1960).unwrap() - baseline.value_at(1960).unwrap(),
            4000.0
        );
        assert_eq!(inputs.adjustment.years_applied, 41);
        assert_eq!(inputs.adjustment.scale, 1000.0);
        assert_eq!(inputs.counterfactual[1], inputs.interpolated[1]);
    }

    #[test]
    fn missing_mapped_variable_stops_the_run() {
        let pipeline: Pipeline = Pipeline::new(config()).unwrap();
        let partial = SeriesTable::from_reader(
            Cursor::new(EMISSIONS.replace("Emissions|OC", "Emissions|NH3")),
            "emissions",
        )
        .unwrap();

        match pipeline.run_with_inputs(&partial, &reference()) {
            Err(CfscmError::MissingVariable { variable, .. }) => {
                assert_eq!(variable, "Emissions|OC")
            }
            other => panic!("expected MissingVariable, got {other:?}"),
        }
    }

    #[test]
    fn full_run_warms_the_counterfactual() {
        let pipeline: Pipeline = Pipeline::new(config()).unwrap();
        let outcome = pipeline.run_with_inputs(&table(), &reference()).unwrap();

        assert_eq!(outcome.report.len(), 150);
        assert_eq!(outcome.report.years.last(), Some(&1999));
        assert!(outcome.report.summary.final_temperature_difference > 0.0);
        assert!(outcome.report.summary.cumulative_emissions_difference > 0.0);
        assert_eq!(outcome.report.summary.length_policy, None);
        assert_eq!(outcome.report.additional.len(), 5);
    }

    #[test]
    fn invalid_configuration_is_rejected_up_front() {
        let mut config = config();
        config.engine.counterfactual_scenario = config.engine.baseline_scenario.clone();
        assert!(matches!(
            Pipeline::<ReferenceEngine>::new(config),
            Err(CfscmError::Configuration(_))
        ));
    }
}
