use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use storm_effect::config::load_config;
use storm_effect::ingest::gauge_csv::read_gauge_dir;
use storm_effect::ingest::storms::load_gauge_storms;
use storm_effect::logging::{self, LogLevel, Stage};
use storm_effect::parameters::resolve_directions;
use storm_effect::pipeline::{resolve_events, run_batch};
use storm_effect::report::{print_summary, write_json, write_parameter_tables};

#[derive(Parser, Debug)]
#[command(name = "storm-effect")]
#[command(version)]
#[command(about = "Measures how long river gauge parameters stay disturbed after a storm", long_about = None)]
struct Cli {
    /// Run configuration (TOML)
    #[arg(short, long, env = "STORM_EFFECT_CONFIG", default_value = "storm_effect.toml")]
    config: PathBuf,

    /// Output directory for the parameter tables (overrides `paths.output_dir`)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Also write the full report as JSON to this file
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Append log entries to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<String>,

    /// Show debug messages
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    logging::init_logger(level, cli.log_file.as_deref(), false);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            logging::error(Stage::System, None, &message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = load_config(&cli.config).map_err(|e| e.to_string())?;
    let directions = resolve_directions(&config.parameters).map_err(|e| e.to_string())?;
    logging::info(
        Stage::System,
        None,
        &format!("Loaded {} ({} parameters)", cli.config.display(), directions.len()),
    );

    let gauge_storms = load_gauge_storms(&config.paths.storms_file, &config.paths.storm_gauges_dir)
        .map_err(|e| e.to_string())?;
    let gauge_ids: Vec<String> = gauge_storms.keys().cloned().collect();

    let (gauges, failed) = read_gauge_dir(&config.paths.data_dir, &gauge_ids, config.paths.nodata);
    if !failed.is_empty() {
        logging::warn(
            Stage::Ingest,
            None,
            &format!("{} of {} gauges could not be read", failed.len(), gauge_ids.len()),
        );
    }

    let events = resolve_events(&gauges, &gauge_storms, &config.onset);
    let report = run_batch(&gauges, &events, &directions, &config);

    let output_dir = cli.output.clone().unwrap_or_else(|| config.paths.output_dir.clone());
    let written = write_parameter_tables(&report, &output_dir)
        .map_err(|e| format!("Cannot write tables to {}: {}", output_dir.display(), e))?;
    logging::info(
        Stage::System,
        None,
        &format!("Wrote {} tables to {}", written.len(), output_dir.display()),
    );

    if let Some(path) = &cli.json {
        write_json(&report, path).map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
        logging::info(Stage::System, None, &format!("Wrote report to {}", path.display()));
    }

    print_summary(&report);
    Ok(())
}
