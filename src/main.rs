//! Command-line entry point for the counterfactual scenario pipeline.

use std::path::{Path, PathBuf};

use cfscm::config::PipelineConfig;
use cfscm::driver::DriverConfig;
use cfscm::pipeline::Pipeline;
use cfscm_core::diagnostics::Diagnostics;
use cfscm_core::errors::CfscmResult;
use cfscm_core::interpolate::interpolate_with_summary;
use cfscm_core::loader::{write_wide_table_path, SeriesTable};
use cfscm_core::stitch::{stitch, StitchSettings};
use cfscm_core::timeseries::{Horizon, Year};
use cfscm_engine::{ClimateEngine, ReferenceEngine};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full pipeline and write the comparison
    Run {
        #[arg(long)]
        config: PathBuf,
    },

    /// Densify every row of a wide table over a horizon
    Interpolate {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value_t = 1750)]
        start: Year,

        #[arg(long, default_value_t = 2023)]
        end: Year,
    },

    /// Write the counterfactual wide table without running the engine
    Counterfactual {
        #[arg(long)]
        input: PathBuf,

        /// Reference workbook (.xlsx) or a CSV export of it
        #[arg(long)]
        reference: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Pipeline configuration; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Join historical and future rows of an RCMIP-style table
    Stitch {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value = "historical")]
        historical: String,

        #[arg(long, default_value = "ssp245")]
        future: String,

        /// Last year taken from the historical scenario
        #[arg(long, default_value_t = 2014)]
        cutoff: Year,

        #[arg(long, default_value = "World")]
        region: String,
    },

    /// List the engine species with their initial concentrations
    Species {
        /// Pipeline configuration; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<&Path>) -> CfscmResult<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_toml_file(path),
        None => Ok(PipelineConfig::default()),
    }
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        println!("  ! {diagnostic}");
    }
}

fn cmd_run(config: &Path) -> CfscmResult<()> {
    let config = PipelineConfig::from_toml_file(config)?;
    let pipeline: Pipeline = Pipeline::new(config)?;
    let outcome = pipeline.run()?;
    let summary = &outcome.report.summary;

    println!(
        "{} vs {} ({} years)",
        summary.baseline_scenario,
        summary.counterfactual_scenario,
        outcome.report.len()
    );
    println!(
        "  mean adjustment:               {:.4} {}",
        outcome.inputs.adjustment.mean_adjustment(),
        outcome
            .inputs
            .counterfactual
            .iter()
            .find(|s| s.variable() == pipeline.config().counterfactual.target_variable)
            .map(|s| s.unit())
            .unwrap_or("")
    );
    println!(
        "  final temperature difference:  {:.4} K",
        summary.final_temperature_difference
    );
    println!(
        "  max temperature difference:    {:.4} K",
        summary.max_temperature_difference
    );
    println!(
        "  final {} difference:           {:.4} {}",
        summary.primary_species,
        summary.final_concentration_difference,
        summary.concentration_unit
    );
    println!(
        "  cumulative emissions difference: {:.4} {}",
        summary.cumulative_emissions_difference, summary.emissions_unit
    );
    print_diagnostics(&outcome.diagnostics);
    println!(
        "results written to {}",
        pipeline.config().output.results.display()
    );
    Ok(())
}

fn cmd_interpolate(input: &Path, output: &Path, start: Year, end: Year) -> CfscmResult<()> {
    let horizon = Horizon::new(start, end)?;
    let table = SeriesTable::from_path(input)?;
    let mut diagnostics = Diagnostics::new();
    let (dense, summaries): (Vec<_>, Vec<_>) = table
        .series()
        .map(|s| interpolate_with_summary(s, horizon, &mut diagnostics))
        .unzip();

    let scenario = table.scenario().unwrap_or("unknown");
    write_wide_table_path(output, scenario, &dense)?;
    info!(rows = dense.len(), horizon = %horizon, "Interpolated emissions table");

    println!("original years:     {}", table.years().len());
    println!("interpolated years: {}", horizon.len());
    for (series, summary) in dense.iter().zip(&summaries) {
        println!(
            "  {:<24} {:>4} known, {:>4} filled",
            series.variable(),
            summary.known_points,
            summary.filled_years
        );
    }
    print_diagnostics(&diagnostics);
    Ok(())
}

fn cmd_counterfactual(
    input: &Path,
    reference: &Path,
    output: &Path,
    config: Option<&Path>,
) -> CfscmResult<()> {
    let mut config = load_config(config)?;
    config.inputs.emissions = input.to_path_buf();
    config.inputs.reference = reference.to_path_buf();

    let pipeline: Pipeline = Pipeline::new(config)?;
    let emissions = pipeline.load_emissions()?;
    let reference = pipeline.load_reference()?;
    let mut diagnostics = Diagnostics::new();
    let inputs = pipeline.build_scenarios(&emissions, &reference, &mut diagnostics)?;

    write_wide_table_path(
        output,
        &pipeline.config().engine.counterfactual_scenario,
        &inputs.counterfactual,
    )?;
    println!(
        "adjusted {} year(s), skipped {}, total change {:.4}",
        inputs.adjustment.years_applied,
        inputs.adjustment.years_skipped,
        inputs.adjustment.applied_total
    );
    print_diagnostics(&diagnostics);
    Ok(())
}

fn cmd_stitch(input: &Path, output: &Path, settings: StitchSettings) -> CfscmResult<()> {
    let table = SeriesTable::from_path(input)?;
    let stitched = stitch(&table, &settings)?;
    stitched.write_path(output)
}

fn cmd_species(config: Option<&Path>) -> CfscmResult<()> {
    let config = load_config(config)?;
    config.validate()?;

    let driver = DriverConfig::from_pipeline(&config)?;
    let mut engine =
        ReferenceEngine::allocate(driver.engine_setup(&config.engine.baseline_scenario))?;
    engine.populate_default_species_parameters();

    println!(
        "{:<8} {:<18} {:<6} {:>10} {:>10}",
        "species", "variable", "ghg", "baseline", "fallback"
    );
    for mapping in &config.engine.species {
        let Ok(index) = engine.species_index(&mapping.species) else {
            continue;
        };
        let kind = engine.setup().species[index].kind;
        let baseline = engine
            .species_parameters(&mapping.species)
            .and_then(|p| p.baseline_concentration)
            .map_or("-".to_string(), |v| v.to_string());
        let fallback = config
            .engine
            .fallback_concentrations
            .get(&mapping.species)
            .map_or("-".to_string(), |v| v.to_string());
        println!(
            "{:<8} {:<18} {:<6} {:>10} {:>10}",
            mapping.species,
            mapping.variable,
            kind.is_greenhouse_gas(),
            baseline,
            fallback
        );
    }
    Ok(())
}

fn run() -> CfscmResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Command::Run { config } => cmd_run(&config),
        Command::Interpolate {
            input,
            output,
            start,
            end,
        } => cmd_interpolate(&input, &output, start, end),
        Command::Counterfactual {
            input,
            reference,
            output,
            config,
        } => cmd_counterfactual(&input, &reference, &output, config.as_deref()),
        Command::Stitch {
            input,
            output,
            historical,
            future,
            cutoff,
            region,
        } => cmd_stitch(
            &input,
            &output,
            StitchSettings {
                region,
                historical,
                future,
                cutoff,
                ..StitchSettings::default()
            },
        ),
        Command::Species { config } => cmd_species(config.as_deref()),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
