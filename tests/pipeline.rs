//! End-to-end runs of the pipeline against files on disk.

use std::fs;
use std::path::Path;

use cfscm::compare::ComparisonSummary;
use cfscm::config::PipelineConfig;
use cfscm::pipeline::Pipeline;
use cfscm_core::loader::SeriesTable;
use cfscm_core::timeseries::YearLookup;
use is_close::is_close;

const EMISSIONS: &str = "\
Model,Scenario,Variable,Unit,1850,1900,1950,2000,2010
IAM,ssp245,Emissions|CO2,Mt CO2/yr,200,2000,6000,25000,33000
IAM,ssp245,Emissions|CH4,Mt CH4/yr,30,60,150,300,350
IAM,ssp245,Emissions|N2O,kt N2O/yr,2000,4000,6000,8000,8500
IAM,ssp245,Emissions|Sulfur,Mt SO2/yr,2,20,60,90,80
IAM,ssp245,Emissions|BC,Mt BC/yr,2.1,3,5,7,7.5
IAM,ssp245,Emissions|OC,Mt OC/yr,15,18,25,30,31
IAM,ssp245,Emissions|NH3,Mt NH3/yr,,,,50,
";

/// Reference export with a title row, a header row and the data in columns
/// B to D.
fn reference_csv(gap: f64) -> String {
    let mut out = String::from("Carbon intensity workbook,,,\n,Year,Actual,Counterfactual\n");
    for year in 1970..=2010 {
        let actual = 15.0 + 0.3 * f64::from(year - 1970);
        out.push_str(&format!(",{year},{actual},{}\n", actual + gap));
    }
    out
}

fn write_inputs(dir: &Path, gap: f64) -> PipelineConfig {
    let emissions = dir.join("emissions.csv");
    let reference = dir.join("reference.csv");
    fs::write(&emissions, EMISSIONS).unwrap();
    fs::write(&reference, reference_csv(gap)).unwrap();

    let toml = format!(
        r#"
        [horizon]
        start = 1850
        end = 2010

        [inputs]
        emissions = "{emissions}"
        reference = "{reference}"

        [inputs.reference_columns]
        year = 1
        actual = 2
        counterfactual = 3

        [counterfactual]
        window_start = 1976
        window_end = 2010

        [output]
        results = "{results}"
        summary = "{summary}"
        interpolated = "{interpolated}"
        counterfactual = "{counterfactual}"
        "#,
        emissions = emissions.display(),
        reference = reference.display(),
        results = dir.join("out/results.csv").display(),
        summary = dir.join("out/summary.toml").display(),
        interpolated = dir.join("out/interpolated.csv").display(),
        counterfactual = dir.join("out/counterfactual.csv").display(),
    );
    PipelineConfig::from_toml_str(&toml).unwrap()
}

#[test]
fn writes_every_configured_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), 2.5);
    let pipeline: Pipeline = Pipeline::new(config).unwrap();
    let outcome = pipeline.run().unwrap();

    let results = fs::read_to_string(dir.path().join("out/results.csv")).unwrap();
    // 1 header + one row per engine timepoint (1850..=2009)
    assert_eq!(results.lines().count(), 161);

    let summary: ComparisonSummary =
        toml::from_str(&fs::read_to_string(dir.path().join("out/summary.toml")).unwrap()).unwrap();
    assert_eq!(summary, outcome.report.summary);
    assert!(summary.final_temperature_difference > 0.0);

    let interpolated =
        SeriesTable::from_path(&dir.path().join("out/interpolated.csv")).unwrap();
    assert_eq!(interpolated.rows().len(), 7);
    assert_eq!(interpolated.scenario(), Some("ssp245"));
    let nh3 = interpolated.require("Emissions|NH3").unwrap();
    assert_eq!(nh3.value_at(1850), Some(50.0));

    let counterfactual =
        SeriesTable::from_path(&dir.path().join("out/counterfactual.csv")).unwrap();
    let before = interpolated.require("Emissions|CO2").unwrap();
    let after = counterfactual.require("Emissions|CO2").unwrap();
    assert_eq!(after.value_at(1975), before.value_at(1975));
    assert_eq!(
        after.value_at(1990).unwrap() - before.value_at(1990).unwrap(),
        2500.0
    );
    assert_eq!(outcome.inputs.adjustment.years_applied, 35);
    assert!(is_close!(outcome.inputs.adjustment.mean_adjustment(), 2500.0));

    // Sparse NH3 and the unmatched final year are recovered, not fatal.
    assert!(outcome
        .diagnostics
        .sparse_variables()
        .contains(&"Emissions|NH3"));
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), 2.5);
    let pipeline: Pipeline = Pipeline::new(config).unwrap();

    pipeline.run().unwrap();
    let first = fs::read(dir.path().join("out/results.csv")).unwrap();
    pipeline.run().unwrap();
    let second = fs::read(dir.path().join("out/results.csv")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn zero_gap_gives_zero_differences() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), 0.0);
    let pipeline: Pipeline = Pipeline::new(config).unwrap();
    let outcome = pipeline.run().unwrap();

    assert_eq!(outcome.inputs.interpolated, outcome.inputs.counterfactual);
    let report = &outcome.report;
    assert!(report.temperature.difference.iter().all(|d| *d == 0.0));
    assert!(report.concentration.difference.iter().all(|d| *d == 0.0));
    assert!(report.emissions.difference.iter().all(|d| *d == 0.0));
    for species in report.additional.values() {
        assert!(species.concentration.difference.iter().all(|d| *d == 0.0));
    }
    assert_eq!(report.summary.cumulative_emissions_difference, 0.0);
}

#[test]
fn missing_reference_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_inputs(dir.path(), 1.0);
    config.inputs.reference = dir.path().join("absent.csv");
    let pipeline: Pipeline = Pipeline::new(config).unwrap();

    assert!(matches!(
        pipeline.run(),
        Err(cfscm_core::errors::CfscmError::Io(_))
    ));
    assert!(!dir.path().join("out/results.csv").exists());
}
