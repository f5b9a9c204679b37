//! Tidy CSV export of a scenario comparison.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use cfscm_core::errors::{CfscmError, CfscmResult};
use cfscm_core::timeseries::FloatValue;

use crate::compare::{ComparisonReport, ComparisonSummary, DifferenceSeries};

/// Leading columns, always present.
const HEADER: &str = "Year,Baseline_Temperature_K,Counterfactual_Temperature_K,\
                      Temperature_Difference_K,Baseline_Concentration,\
                      Counterfactual_Concentration,Concentration_Difference,\
                      Baseline_Emissions,Counterfactual_Emissions,Emissions_Difference";

fn format_value(value: FloatValue) -> String {
    format!("{value}")
}

fn push_triplet(row: &mut Vec<String>, series: &DifferenceSeries, i: usize) {
    for values in [&series.baseline, &series.counterfactual, &series.difference] {
        row.push(format_value(values[i]));
    }
}

/// Full header of `report`: the fixed columns, then a concentration and an
/// emissions triplet for each additional species in name order.
pub fn header(report: &ComparisonReport) -> Vec<String> {
    let mut columns: Vec<String> = HEADER.split(',').map(|c| c.trim().to_string()).collect();
    for species in report.additional.keys() {
        for quantity in ["Concentration", "Emissions"] {
            columns.push(format!("Baseline_{species}_{quantity}"));
            columns.push(format!("Counterfactual_{species}_{quantity}"));
            columns.push(format!("{species}_{quantity}_Difference"));
        }
    }
    columns
}

/// Write the comparison as CSV, one row per year.
///
/// Values use the shortest representation that reads back to the same
/// `f64`, so identical reports give identical bytes.
pub fn write_results(report: &ComparisonReport, writer: impl Write) -> CfscmResult<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(header(report))?;

    for (i, year) in report.years.iter().enumerate() {
        let mut row = vec![year.to_string()];
        push_triplet(&mut row, &report.temperature, i);
        push_triplet(&mut row, &report.concentration, i);
        push_triplet(&mut row, &report.emissions, i);
        for difference in report.additional.values() {
            push_triplet(&mut row, &difference.concentration, i);
            push_triplet(&mut row, &difference.emissions, i);
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

fn create(path: &Path) -> CfscmResult<io::BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(io::BufWriter::new(File::create(path)?))
}

/// Write the comparison CSV to `path`, creating parent directories.
pub fn export_results(report: &ComparisonReport, path: &Path) -> CfscmResult<()> {
    write_results(report, create(path)?)
}

pub fn summary_toml(summary: &ComparisonSummary) -> CfscmResult<String> {
    toml::to_string(summary).map_err(|e| CfscmError::parse("comparison summary", e.to_string()))
}

/// Write the summary as a TOML document to `path`.
pub fn export_summary(summary: &ComparisonSummary, path: &Path) -> CfscmResult<()> {
    let mut file = create(path)?;
    file.write_all(summary_toml(summary)?.as_bytes())?;
    file.flush()?;
    Ok(())
}
