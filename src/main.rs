use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod classifier;
mod config;
mod constraints;
mod datatypes;
mod error;
#[cfg(test)]
mod fixtures;
mod pairing;
mod parser;
mod pipeline;
mod quadrature;
mod report;
mod writer;

use config::RunParameters;
use datatypes::Tolerance;
use error::{CouplerError, Result};
use quadrature::QuadratureChoice;

/// Embeds a periodic unit cell at every integration point of a macro mesh
/// and writes the coupled deck.
#[derive(Debug, Parser)]
#[command(name = "directfe2", version)]
struct Cli {
    /// Macro mesh deck
    macro_deck: String,
    /// Unit-cell deck
    cell_deck: String,
    /// Coupled deck to write
    output: String,

    /// JSON file with run parameters; flags below override it
    #[arg(long)]
    params: Option<String>,
    /// Coordinate matching tolerance
    #[arg(long)]
    tolerance: Option<f64>,
    /// Integration rule: auto, reduced or full
    #[arg(long)]
    quadrature: Option<String>,
    /// Unit-cell part carrying coupling and periodicity
    #[arg(long)]
    primary_part: Option<String>,
    /// Decimal places for coordinates and coefficients
    #[arg(long)]
    precision: Option<usize>,
    /// Point mass added on every macro node
    #[arg(long)]
    anchor_mass: Option<f64>,
    /// Write a JSON generation summary to this path
    #[arg(long)]
    summary: Option<String>,
    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn parameters(&self) -> Result<RunParameters> {
        let mut params = match &self.params {
            Some(path) => config::load_parameters(path)?,
            None => RunParameters::default(),
        };

        if let Some(tolerance) = self.tolerance {
            params.tolerance = Tolerance::new(tolerance)?;
        }
        if let Some(quadrature) = &self.quadrature {
            params.quadrature = QuadratureChoice::parse(quadrature).ok_or_else(|| {
                CouplerError::Input(format!(
                    "Unknown quadrature '{quadrature}', expected auto, reduced or full"
                ))
            })?;
        }
        if let Some(part) = &self.primary_part {
            params.primary_part = Some(part.clone());
        }
        if let Some(precision) = self.precision {
            if !(1..=17).contains(&precision) {
                return Err(CouplerError::Input(format!(
                    "Precision must be between 1 and 17, got {precision}"
                )));
            }
            params.precision = precision;
        }
        if let Some(mass) = self.anchor_mass {
            if !(mass > 0.0) || !mass.is_finite() {
                return Err(CouplerError::Input(format!(
                    "Anchor mass must be positive, got {mass}"
                )));
            }
            params.anchor_mass = Some(mass);
        }
        if self.no_progress {
            params.show_progress = false;
        }

        Ok(params)
    }
}

/// `RUST_LOG` when set, otherwise warnings plus this crate at info or debug.
fn log_filter(verbose: bool, env: Option<&str>) -> EnvFilter {
    match env.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None if verbose => EnvFilter::new("warn,directfe2=debug"),
        None => EnvFilter::new("warn,directfe2=info"),
    }
}

fn init_logging(verbose: bool) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, env.as_deref()))
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let params = cli.parameters()?;

    let summary = pipeline::run(&cli.macro_deck, &cli.cell_deck, &cli.output, &params)?;
    summary.log();
    if let Some(path) = &cli.summary {
        summary.write_json(path)?;
    }

    info!("done");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
