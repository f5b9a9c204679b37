//! Scenario construction from raw tables through to engine timepoints.

use std::fs;

use approx::assert_relative_eq;
use cfscm_core::adjust::{adjust_scenario, AdjustmentTable};
use cfscm_core::diagnostics::{Diagnostics, SkipStage};
use cfscm_core::interpolate::interpolate_all;
use cfscm_core::loader::{
    read_reference_table_path, write_wide_table_path, ReferenceColumns, SeriesTable,
};
use cfscm_core::stitch::{stitch, StitchSettings};
use cfscm_core::timegrid::ScenarioTimeline;
use cfscm_core::timeseries::{Horizon, YearLookup};
use cfscm_core::units::conversion_factor;

const RCMIP: &str = "\
Model,Scenario,Region,Variable,Unit,2000,2010,2014,2020,2030
CEDS,historical,World,Emissions|CO2,Mt CO2/yr,25000,33000,35000,,
CEDS,historical,World|R5ASIA,Emissions|CO2,Mt CO2/yr,9000,15000,18000,,
MESSAGE,ssp245,World,Emissions|CO2,Mt CO2/yr,,,36000,38000,40000
CEDS,historical,World,Emissions|CH4,Mt CH4/yr,300,330,340,,
MESSAGE,ssp245,World,Emissions|CH4,Mt CH4/yr,,,,380,390
";

const REFERENCE: &str = "\
year,actual,frozen
2010,33,36
2011,34,37.5
2012,35,
2013,35.5,39.5
";

#[test]
fn stitched_table_becomes_a_counterfactual_on_the_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let rcmip = dir.path().join("rcmip.csv");
    fs::write(&rcmip, RCMIP).unwrap();

    let settings = StitchSettings {
        variables: vec!["Emissions|CO2".to_string(), "Emissions|CH4".to_string()],
        ..StitchSettings::default()
    };
    let stitched = stitch(&SeriesTable::from_path(&rcmip).unwrap(), &settings).unwrap();
    let stitched_path = dir.path().join("stitched.csv");
    stitched.write_path(&stitched_path).unwrap();

    let table = SeriesTable::from_path(&stitched_path).unwrap();
    assert_eq!(table.scenario(), Some("ssp245"));
    // The regional row and the 2014 future value are not used.
    assert_eq!(table.require("Emissions|CO2").unwrap().value_at(2014), Some(35000.0));

    let mut diagnostics = Diagnostics::new();
    let horizon = Horizon::new(2000, 2030).unwrap();
    let dense = interpolate_all(table.series(), horizon, &mut diagnostics);
    assert!(diagnostics.is_empty());
    assert_eq!(dense[0].value_at(2005), Some(29000.0));

    let reference_path = dir.path().join("reference.csv");
    fs::write(&reference_path, REFERENCE).unwrap();
    let columns = ReferenceColumns {
        year: 0,
        actual: 1,
        counterfactual: 2,
    };
    let reference = read_reference_table_path(&reference_path, columns, "Gt CO2/yr").unwrap();

    let window = Horizon::new(2010, 2013).unwrap();
    let adjustments = AdjustmentTable::derive(&reference.actual, &reference.counterfactual, window);
    // 2012 has no counterfactual value.
    assert_eq!(adjustments.len(), 3);

    let scale = conversion_factor("Gt CO2/yr", dense[0].unit()).unwrap();
    let (counterfactual, summary) =
        adjust_scenario(&dense, "Emissions|CO2", &adjustments, scale, &mut diagnostics).unwrap();
    assert_relative_eq!(summary.applied_total, 10_500.0, max_relative = 1e-12);
    assert_eq!(counterfactual[1], dense[1]);

    let out = dir.path().join("counterfactual.csv");
    write_wide_table_path(&out, "counterfactual", &counterfactual).unwrap();
    let reread = SeriesTable::from_path(&out).unwrap();
    assert_eq!(
        reread.require("Emissions|CO2").unwrap().value_at(2011),
        counterfactual[0].value_at(2011)
    );

    let timeline = ScenarioTimeline::from_bounds(horizon);
    let mapped = timeline.map(&counterfactual[0], 1e-3, &mut diagnostics);
    assert_eq!(mapped.written, 30);
    assert_eq!(diagnostics.skipped_years(SkipStage::Timegrid), 1);
    assert_relative_eq!(mapped.values[0], 25.0, max_relative = 1e-12);
}
