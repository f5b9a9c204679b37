//! Reading and writing the tabular inputs of the pipeline.
//!
//! Two layouts are supported:
//!
//! * the *wide* emissions table, with `Scenario, Variable, Unit` metadata
//!   columns followed by one column per calendar year, and
//! * the *reference* table, the reference workbook (`.xlsx`) or a CSV export of
//!   it, where fixed column positions hold the year, the observed quantity and
//!   the counterfactual quantity.

use calamine::{Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{CfscmError, CfscmResult};
use crate::timeseries::{DenseSeries, EmissionsSeries, FloatValue, Year};

pub const COLUMN_SCENARIO: &str = "Scenario";
pub const COLUMN_VARIABLE: &str = "Variable";
pub const COLUMN_UNIT: &str = "Unit";
pub const COLUMN_REGION: &str = "Region";

/// Cell contents that mean "no data for this year".
const MISSING_TOKENS: [&str; 5] = ["", "nan", "NaN", "NA", "N/A"];

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell.trim())
}

/// Parse a cell that must hold a number, treating the missing tokens as absent.
fn parse_cell(cell: &str) -> Result<Option<FloatValue>, std::num::ParseFloatError> {
    if is_missing(cell) {
        return Ok(None);
    }
    let value: FloatValue = cell.trim().parse()?;
    Ok(value.is_finite().then_some(value))
}

/// One row of a wide emissions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub scenario: Option<String>,
    pub region: Option<String>,
    pub series: EmissionsSeries,
}

/// The parsed contents of a wide emissions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    source_name: String,
    years: Vec<Year>,
    rows: Vec<SeriesRow>,
}

impl SeriesTable {
    pub fn from_path(path: &Path) -> CfscmResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, &path.display().to_string())
    }

    /// Parse a wide table from any reader.
    ///
    /// `source_name` is only used in error messages.
    pub fn from_reader<R: Read>(reader: R, source_name: &str) -> CfscmResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
        let headers = rdr.headers()?.clone();

        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let variable_idx = position(COLUMN_VARIABLE).ok_or_else(|| {
            CfscmError::parse(source_name, format!("no '{COLUMN_VARIABLE}' column"))
        })?;
        let unit_idx = position(COLUMN_UNIT)
            .ok_or_else(|| CfscmError::parse(source_name, format!("no '{COLUMN_UNIT}' column")))?;
        let scenario_idx = position(COLUMN_SCENARIO);
        let region_idx = position(COLUMN_REGION);

        // Only numeral headers are year columns; anything else is metadata.
        let year_columns: Vec<(usize, Year)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.trim().parse::<Year>().ok().map(|y| (i, y)))
            .collect();

        let mut rows = Vec::new();
        for (row_number, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or("").trim();

            let mut values = BTreeMap::new();
            for &(i, year) in &year_columns {
                let cell = field(i);
                let value = parse_cell(cell).map_err(|e| {
                    CfscmError::parse(
                        source_name,
                        format!("row {}, year {year}: '{cell}' ({e})", row_number + 1),
                    )
                })?;
                if let Some(value) = value {
                    values.insert(year, value);
                }
            }

            rows.push(SeriesRow {
                scenario: scenario_idx.map(|i| field(i).to_string()),
                region: region_idx.map(|i| field(i).to_string()),
                series: EmissionsSeries::new(field(variable_idx), field(unit_idx), values),
            });
        }

        debug!(
            source = source_name,
            rows = rows.len(),
            year_columns = year_columns.len(),
            "Parsed wide emissions table"
        );

        let mut years: Vec<Year> = year_columns.into_iter().map(|(_, y)| y).collect();
        years.sort_unstable();

        Ok(Self {
            source_name: source_name.to_string(),
            years,
            rows,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Year columns present in the table header, ascending.
    pub fn years(&self) -> &[Year] {
        &self.years
    }

    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    pub fn series(&self) -> impl Iterator<Item = &EmissionsSeries> {
        self.rows.iter().map(|r| &r.series)
    }

    /// Scenario label of the first row that carries one.
    pub fn scenario(&self) -> Option<&str> {
        self.rows
            .iter()
            .find_map(|r| r.scenario.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn get(&self, variable: &str) -> Option<&EmissionsSeries> {
        self.series().find(|s| s.variable() == variable)
    }

    /// Look up a row that the pipeline cannot do without.
    pub fn require(&self, variable: &str) -> CfscmResult<&EmissionsSeries> {
        self.get(variable)
            .ok_or_else(|| CfscmError::missing_variable(variable, &self.source_name))
    }
}

/// Write dense series as a wide table.
///
/// Every series must share the horizon of the first one. Values are written
/// with Rust's shortest round-trip formatting so that reading the table back
/// reproduces them exactly.
pub fn write_wide_table<W: Write>(
    writer: W,
    scenario: &str,
    series: &[DenseSeries],
) -> CfscmResult<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let Some(first) = series.first() else {
        wtr.write_record([COLUMN_SCENARIO, COLUMN_VARIABLE, COLUMN_UNIT])?;
        wtr.flush()?;
        return Ok(());
    };
    let horizon = first.horizon();

    let mut header = vec![
        COLUMN_SCENARIO.to_string(),
        COLUMN_VARIABLE.to_string(),
        COLUMN_UNIT.to_string(),
    ];
    header.extend(horizon.years().map(|y| y.to_string()));
    wtr.write_record(&header)?;

    for s in series {
        if s.horizon() != horizon {
            return Err(CfscmError::Configuration(format!(
                "cannot write '{}' over {} in a table spanning {}",
                s.variable(),
                s.horizon(),
                horizon
            )));
        }
        let mut record = vec![
            scenario.to_string(),
            s.variable().to_string(),
            s.unit().to_string(),
        ];
        record.extend(s.values().iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_wide_table_path(
    path: &Path,
    scenario: &str,
    series: &[DenseSeries],
) -> CfscmResult<()> {
    let file = File::create(path)?;
    write_wide_table(io::BufWriter::new(file), scenario, series)?;
    info!(path = %path.display(), rows = series.len(), "Wrote wide emissions table");
    Ok(())
}

/// Zero-based column positions within the reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReferenceColumns {
    pub year: usize,
    pub actual: usize,
    pub counterfactual: usize,
}

impl Default for ReferenceColumns {
    /// Spreadsheet columns Z, AA and AC.
    fn default() -> Self {
        Self {
            year: 25,
            actual: 26,
            counterfactual: 28,
        }
    }
}

/// The two reference columns, as sparse series sharing one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSeries {
    pub actual: EmissionsSeries,
    pub counterfactual: EmissionsSeries,
}

pub const REFERENCE_ACTUAL: &str = "Reference|Actual";
pub const REFERENCE_COUNTERFACTUAL: &str = "Reference|Counterfactual";

/// Accumulates reference rows by position, whatever the file format.
#[derive(Default)]
struct ReferenceRows {
    actual: BTreeMap<Year, FloatValue>,
    counterfactual: BTreeMap<Year, FloatValue>,
    year_rows: usize,
}

impl ReferenceRows {
    /// Rows whose year cell is not a whole number are skipped.
    fn push(
        &mut self,
        year: Option<FloatValue>,
        actual: Option<FloatValue>,
        counterfactual: Option<FloatValue>,
    ) {
        let year = match year {
            Some(y) if y.is_finite() && y.fract() == 0.0 => y as Year,
            _ => return,
        };
        self.year_rows += 1;

        if let Some(v) = actual {
            self.actual.insert(year, v);
        }
        if let Some(v) = counterfactual {
            self.counterfactual.insert(year, v);
        }
    }

    fn finish(
        self,
        source_name: &str,
        columns: ReferenceColumns,
        unit: &str,
    ) -> CfscmResult<ReferenceSeries> {
        if self.year_rows == 0 {
            return Err(CfscmError::parse(
                source_name,
                format!("no rows with a year in column {}", columns.year),
            ));
        }

        debug!(
            source = source_name,
            year_rows = self.year_rows,
            actual = self.actual.len(),
            counterfactual = self.counterfactual.len(),
            "Parsed reference table"
        );

        Ok(ReferenceSeries {
            actual: EmissionsSeries::new(REFERENCE_ACTUAL, unit, self.actual),
            counterfactual: EmissionsSeries::new(
                REFERENCE_COUNTERFACTUAL,
                unit,
                self.counterfactual,
            ),
        })
    }
}

/// Read the reference columns from a CSV export of the reference workbook.
///
/// Rows whose year cell is not a whole number (headers, notes, blank lines)
/// are skipped. Non-numeric value cells are treated as missing for that row.
pub fn read_reference_table<R: Read>(
    reader: R,
    columns: ReferenceColumns,
    unit: &str,
) -> CfscmResult<ReferenceSeries> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = ReferenceRows::default();
    for record in rdr.records() {
        let record = record?;
        let cell = |i: usize| parse_cell(record.get(i).unwrap_or("")).ok().flatten();
        rows.push(
            cell(columns.year),
            cell(columns.actual),
            cell(columns.counterfactual),
        );
    }
    rows.finish("reference table", columns, unit)
}

fn workbook_number(cell: Option<&Data>) -> Option<FloatValue> {
    let value = match cell? {
        Data::Float(v) => *v,
        Data::Int(v) => *v as FloatValue,
        Data::String(s) => parse_cell(s).ok().flatten()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Read the reference columns from the first worksheet of an `.xlsx` workbook.
///
/// Column positions count from column A, whatever the used range of the sheet.
/// The rules for skipped rows and missing values match
/// [`read_reference_table`].
pub fn read_reference_workbook<RS: Read + Seek>(
    reader: RS,
    columns: ReferenceColumns,
    unit: &str,
) -> CfscmResult<ReferenceSeries> {
    let mut workbook: Xlsx<RS> = Xlsx::new(reader)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| CfscmError::parse("reference workbook", "workbook has no worksheets"))??;

    let first_column = range.start().map_or(0, |(_, col)| col as usize);
    let mut rows = ReferenceRows::default();
    for row in range.rows() {
        let cell = |i: usize| {
            i.checked_sub(first_column)
                .and_then(|offset| workbook_number(row.get(offset)))
        };
        rows.push(
            cell(columns.year),
            cell(columns.actual),
            cell(columns.counterfactual),
        );
    }
    rows.finish("reference workbook", columns, unit)
}

/// Read the reference table at `path`, as a workbook when the extension is
/// `xlsx` and as CSV otherwise.
pub fn read_reference_table_path(
    path: &Path,
    columns: ReferenceColumns,
    unit: &str,
) -> CfscmResult<ReferenceSeries> {
    let file = File::open(path)?;
    let is_workbook = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));

    if is_workbook {
        read_reference_workbook(io::BufReader::new(file), columns, unit)
    } else {
        read_reference_table(file, columns, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::{Horizon, YearLookup};
    use ndarray::array;

    const WIDE: &str = "\
Scenario,Variable,Unit,1750,1800,notes,1850
ssp245,Emissions|CO2,Mt CO2/yr,0,,x,100.5
ssp245,Emissions|CH4,Mt CH4/yr,NaN,20,,30
";

    #[test]
    fn keeps_only_numeral_columns_with_values() {
        let table = SeriesTable::from_reader(WIDE.as_bytes(), "inline").unwrap();
        assert_eq!(table.years(), &[1750, 1800, 1850]);
        assert_eq!(table.scenario(), Some("ssp245"));

        let co2 = table.require("Emissions|CO2").unwrap();
        assert_eq!(co2.unit(), "Mt CO2/yr");
        assert_eq!(co2.iter().collect::<Vec<_>>(), vec![(1750, 0.0), (1850, 100.5)]);

        let ch4 = table.require("Emissions|CH4").unwrap();
        assert_eq!(ch4.iter().collect::<Vec<_>>(), vec![(1800, 20.0), (1850, 30.0)]);
    }

    #[test]
    fn missing_required_variable() {
        let table = SeriesTable::from_reader(WIDE.as_bytes(), "inline").unwrap();
        match table.require("Emissions|N2O") {
            Err(CfscmError::MissingVariable {
                variable,
                source_name,
            }) => {
                assert_eq!(variable, "Emissions|N2O");
                assert_eq!(source_name, "inline");
            }
            other => panic!("expected MissingVariable, got {other:?}"),
        }
    }

    #[test]
    fn garbage_cell_is_a_parse_error() {
        let input = "Scenario,Variable,Unit,2000\ns,Emissions|CO2,Mt CO2/yr,lots\n";
        assert!(matches!(
            SeriesTable::from_reader(input.as_bytes(), "inline"),
            Err(CfscmError::Parse { .. })
        ));
    }

    #[test]
    fn missing_unit_column_is_rejected() {
        let input = "Scenario,Variable,2000\ns,Emissions|CO2,1\n";
        assert!(SeriesTable::from_reader(input.as_bytes(), "inline").is_err());
    }

    #[test]
    fn wide_table_round_trip() {
        let horizon = Horizon::new(2000, 2002).unwrap();
        let series = vec![
            DenseSeries::new("Emissions|CO2", "Mt CO2/yr", horizon, array![0.1, 1.0 / 3.0, 2.5])
                .unwrap(),
            DenseSeries::new("Emissions|CH4", "Mt CH4/yr", horizon, array![1.0, 2.0, 3.0])
                .unwrap(),
        ];
        let mut buf = Vec::new();
        write_wide_table(&mut buf, "ssp245", &series).unwrap();

        let table = SeriesTable::from_reader(buf.as_slice(), "roundtrip").unwrap();
        assert_eq!(table.rows().len(), 2);
        let co2 = table.require("Emissions|CO2").unwrap();
        assert_eq!(co2.value_at(2001), Some(1.0 / 3.0));
        assert_eq!(table.rows()[1].series.variable(), "Emissions|CH4");
    }

    #[test]
    fn wide_table_rejects_mixed_horizons() {
        let a = DenseSeries::constant("a", "u", Horizon::new(2000, 2001).unwrap(), 1.0);
        let b = DenseSeries::constant("b", "u", Horizon::new(2000, 2002).unwrap(), 1.0);
        let mut buf = Vec::new();
        assert!(write_wide_table(&mut buf, "s", &[a, b]).is_err());
    }

    #[test]
    fn reference_table_by_position() {
        let input = "\
Year,Actual,Note,Counterfactual
1975,17.0,,17.0
1976,18.0,x,19.5
1977,,x,20.0
1978.0,19.0,x,n/a
";
        let columns = ReferenceColumns {
            year: 0,
            actual: 1,
            counterfactual: 3,
        };
        let reference = read_reference_table(input.as_bytes(), columns, "Gt CO2/yr").unwrap();
        assert_eq!(reference.actual.unit(), "Gt CO2/yr");
        assert_eq!(reference.actual.value_at(1976), Some(18.0));
        assert_eq!(reference.actual.value_at(1977), None);
        assert_eq!(reference.actual.value_at(1978), Some(19.0));
        assert_eq!(reference.counterfactual.value_at(1977), Some(20.0));
        assert_eq!(reference.counterfactual.value_at(1978), None);
    }

    #[test]
    fn reference_table_without_years() {
        let input = "a,b,c\nd,e,f\n";
        assert!(read_reference_table(input.as_bytes(), ReferenceColumns::default(), "Gt").is_err());
    }

    /// Title row, header row, then data in columns B to E with a spare column.
    fn write_reference_workbook(path: &Path) {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            sheet.write_string(0, 1, "Carbon intensity").unwrap();
            for (col, title) in ["Year", "Actual", "Note", "Counterfactual"].iter().enumerate() {
                sheet.write_string(1, col as u16 + 1, *title).unwrap();
            }
            sheet.write_number(2, 1, 1975.0).unwrap();
            sheet.write_number(2, 2, 17.0).unwrap();
            sheet.write_number(2, 4, 17.0).unwrap();
            sheet.write_number(3, 1, 1976.0).unwrap();
            sheet.write_number(3, 2, 18.0).unwrap();
            sheet.write_string(3, 4, "19.5").unwrap();
            sheet.write_number(4, 1, 1977.0).unwrap();
            sheet.write_string(4, 2, "n/a").unwrap();
            sheet.write_number(4, 4, 20.0).unwrap();
            sheet.write_string(5, 1, "Source: national inventories").unwrap();
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn reference_workbook_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.xlsx");
        write_reference_workbook(&path);

        let columns = ReferenceColumns {
            year: 1,
            actual: 2,
            counterfactual: 4,
        };
        let reference = read_reference_table_path(&path, columns, "Gt CO2/yr").unwrap();
        assert_eq!(reference.actual.unit(), "Gt CO2/yr");
        assert_eq!(
            reference.actual.iter().collect::<Vec<_>>(),
            vec![(1975, 17.0), (1976, 18.0)]
        );
        assert_eq!(
            reference.counterfactual.iter().collect::<Vec<_>>(),
            vec![(1975, 17.0), (1976, 19.5), (1977, 20.0)]
        );
    }

    #[test]
    fn reference_workbook_without_years() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.xlsx");
        write_reference_workbook(&path);

        let columns = ReferenceColumns {
            year: 0,
            actual: 2,
            counterfactual: 4,
        };
        assert!(matches!(
            read_reference_table_path(&path, columns, "Gt CO2/yr"),
            Err(CfscmError::Parse { .. })
        ));
    }

    #[test]
    fn csv_extension_keeps_the_csv_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.csv");
        std::fs::write(&path, "1975,17,17\n1976,18,19.5\n").unwrap();
        let columns = ReferenceColumns {
            year: 0,
            actual: 1,
            counterfactual: 2,
        };
        let reference = read_reference_table_path(&path, columns, "Gt CO2/yr").unwrap();
        assert_eq!(reference.counterfactual.value_at(1976), Some(19.5));
    }
}
