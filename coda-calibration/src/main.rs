//! coda-calibration maintenance tool
//!
//! Inspects and maintains the calibration database: summary counts, path
//! fit diagnostics, clearing results and moving events between the
//! reference and validation sets. Calibration runs themselves are driven
//! by an embedding process that supplies the measurement collaborators.

use anyhow::Result;
use clap::{Parser, Subcommand};
use coda_calibration::db::{self, CalibrationStore, SqliteCalibrationStore};
use coda_calibration::services::toggle_validation;
use coda_common::config::CodaConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "coda-calibration")]
#[command(about = "Coda calibration database maintenance")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "CODA_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the configured path
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print record counts
    Status,
    /// Print per-band path fit residuals
    Paths,
    /// Delete velocities, synthetics, path diagnostics, site terms and measured Mws
    Clear,
    /// Move events between the reference and validation sets
    Toggle {
        #[arg(required = true)]
        event_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CodaConfig::load(args.config.as_deref())?;
    coda_common::logging::init_tracing(&config.logging)?;

    let db_path = args.database.unwrap_or(config.database_path);
    info!("Database path: {}", db_path.display());

    let pool = db::init_database_pool(&db_path).await?;
    let store = SqliteCalibrationStore::new(pool.clone());

    match args.command {
        Command::Status => print_status(&store).await?,
        Command::Paths => {
            for m in store.path_measurements().await? {
                println!(
                    "{}\tinitial {:.6}\tfinal {:.6}",
                    m.band, m.initial_residual, m.final_residual
                );
            }
        }
        Command::Clear => {
            store.clear_results().await?;
            println!("Calibration results cleared");
        }
        Command::Toggle { event_ids } => {
            for message in toggle_validation(&store, &event_ids).await? {
                println!("{}", message);
            }
        }
    }

    pool.close().await;
    Ok(())
}

async fn print_status(store: &dyn CalibrationStore) -> Result<()> {
    let shared = store.shared_parameters().await?;
    let sites = store.site_parameters().await?;
    let site_terms: usize = sites.values().map(|stations| stations.len()).sum();

    println!("shared bands:       {}", shared.len());
    println!("site terms:         {} across {} bands", site_terms, sites.len());
    println!("measured Mws:       {}", store.measured_mws().await?.len());
    println!("reference Mws:      {}", store.reference_mws().await?.len());
    println!("validation Mws:     {}", store.validation_mws().await?.len());
    println!("path diagnostics:   {}", store.path_measurements().await?.len());
    println!("velocity records:   {}", store.velocity_measurements().await?.len());
    println!("synthetics:         {}", store.synthetics().await?.len());
    Ok(())
}
