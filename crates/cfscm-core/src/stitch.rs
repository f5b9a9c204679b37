//! Stitching RCMIP-style tables into a single scenario.
//!
//! RCMIP publishes the historical period and each future pathway as separate
//! scenarios of one large table. The pipeline wants a single wide table per
//! scenario, so the historical rows are kept up to a cutoff year and the
//! future rows are used after it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{CfscmError, CfscmResult};
use crate::loader::{SeriesTable, COLUMN_SCENARIO, COLUMN_UNIT, COLUMN_VARIABLE};
use crate::timeseries::{EmissionsSeries, Year, YearLookup};

/// Which rows to combine and where to cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StitchSettings {
    pub region: String,
    pub variables: Vec<String>,
    pub historical: String,
    pub future: String,
    /// Last year taken from the historical scenario.
    pub cutoff: Year,
}

impl Default for StitchSettings {
    fn default() -> Self {
        Self {
            region: "World".to_string(),
            variables: [
                "Emissions|CO2",
                "Emissions|CH4",
                "Emissions|N2O",
                "Emissions|Sulfur",
                "Emissions|BC",
                "Emissions|OC",
            ]
            .map(String::from)
            .to_vec(),
            historical: "historical".to_string(),
            future: "ssp245".to_string(),
            cutoff: 2014,
        }
    }
}

/// A sparse wide table labelled with a single scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchedTable {
    pub scenario: String,
    pub series: Vec<EmissionsSeries>,
}

impl StitchedTable {
    /// Union of the years present in any row, ascending.
    pub fn years(&self) -> Vec<Year> {
        self.series
            .iter()
            .flat_map(|s| s.iter().map(|(y, _)| y))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Write as `Scenario,Variable,Unit,<years>`, leaving absent cells empty.
    pub fn write<W: Write>(&self, writer: W) -> CfscmResult<()> {
        let years = self.years();
        let mut wtr = csv::WriterBuilder::new().from_writer(writer);

        let mut header = vec![
            COLUMN_SCENARIO.to_string(),
            COLUMN_VARIABLE.to_string(),
            COLUMN_UNIT.to_string(),
        ];
        header.extend(years.iter().map(|y| y.to_string()));
        wtr.write_record(&header)?;

        for series in &self.series {
            let mut record = vec![
                self.scenario.clone(),
                series.variable().to_string(),
                series.unit().to_string(),
            ];
            record.extend(years.iter().map(|&y| {
                series
                    .value_at(y)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            }));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn write_path(&self, path: &Path) -> CfscmResult<()> {
        self.write(io::BufWriter::new(File::create(path)?))?;
        info!(
            path = %path.display(),
            scenario = %self.scenario,
            rows = self.series.len(),
            "Wrote stitched emissions table"
        );
        Ok(())
    }
}

fn find_row<'a>(
    table: &'a SeriesTable,
    settings: &StitchSettings,
    scenario: &str,
    variable: &str,
) -> Option<&'a EmissionsSeries> {
    table
        .rows()
        .iter()
        .filter(|row| row.scenario.as_deref() == Some(scenario))
        .filter(|row| {
            row.region
                .as_deref()
                .map_or(true, |region| region == settings.region)
        })
        .map(|row| &row.series)
        .find(|series| series.variable() == variable)
}

/// Combine the historical and future rows of `table`.
///
/// Variables with neither a historical nor a future row are an error; a
/// variable present in only one of the two scenarios keeps the years it has.
pub fn stitch(table: &SeriesTable, settings: &StitchSettings) -> CfscmResult<StitchedTable> {
    let mut series = Vec::with_capacity(settings.variables.len());

    for variable in &settings.variables {
        let historical = find_row(table, settings, &settings.historical, variable);
        let future = find_row(table, settings, &settings.future, variable);

        let unit = match (historical, future) {
            (None, None) => {
                return Err(CfscmError::missing_variable(
                    variable,
                    &format!(
                        "{} ({} / {}, region {})",
                        table.source_name(),
                        settings.historical,
                        settings.future,
                        settings.region
                    ),
                ))
            }
            (Some(h), Some(f)) if h.unit() != f.unit() => {
                return Err(CfscmError::parse(
                    table.source_name(),
                    format!(
                        "'{variable}' is in '{}' historically but '{}' in {}",
                        h.unit(),
                        f.unit(),
                        settings.future
                    ),
                ))
            }
            (Some(h), _) => h.unit(),
            (None, Some(f)) => f.unit(),
        };

        if historical.is_none() || future.is_none() {
            warn!(
                variable = %variable,
                historical = historical.is_some(),
                future = future.is_some(),
                "Stitching a variable present in only one scenario"
            );
        }

        let mut values = BTreeMap::new();
        if let Some(h) = historical {
            values.extend(h.iter().filter(|(y, _)| *y <= settings.cutoff));
        }
        if let Some(f) = future {
            values.extend(f.iter().filter(|(y, _)| *y > settings.cutoff));
        }

        debug!(variable = %variable, years = values.len(), "Stitched variable");
        series.push(EmissionsSeries::new(variable, unit, values));
    }

    Ok(StitchedTable {
        scenario: settings.future.clone(),
        series,
    })
}
