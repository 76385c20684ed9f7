//!
//! src/bin/hits-presenter.rs  Andrew Belles  Oct 18th, 2026
//!
//! Presenter entry point. Loads the yearly tables once and either
//! serves the local dashboard or prints one dashboard as JSON (or the
//! filtered rows as CSV)
//!

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hits_panorama::{
    EtlError,
    config::{self, AppConfig},
    logging,
    presenter::{DashboardParams, dashboard, export_csv, load_dataset, server}
};

#[derive(Debug, Parser)]
#[command(name = "hits-presenter", version, about = "Dashboard over the yearly hit tables")]
struct Cli {
    #[arg(long, global = true, default_value = "raw_data")]
    data_dir: PathBuf,

    #[arg(long, global = true, default_value = "spotify_hits_brasil")]
    prefix: String,

    /// Years to load, defaults to every file found
    #[arg(long, global = true, num_args = 1..)]
    years: Vec<i32>,

    #[command(subcommand)]
    command: Command
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the dashboard on a local address
    Serve {
        #[arg(long)]
        bind: Option<String>
    },
    /// Print the dashboard for one set of filters as JSON
    Report {
        /// Print the filtered rows as CSV instead
        #[arg(long)]
        csv: bool,
        #[arg(long)]
        year_from: Option<i32>,
        #[arg(long)]
        year_to: Option<i32>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        min_popularity: Option<u8>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        max_popularity: Option<u8>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        hit_threshold: Option<u8>
    }
}

async fn run(cli: Cli, cfgs: AppConfig) -> Result<(), EtlError> {
    let presenter = cfgs.presenter;
    let dataset = load_dataset(&cli.data_dir, &cli.prefix, &cli.years, &presenter);
    if dataset.is_empty() {
        warn!(dir = %cli.data_dir.display(), "presenter.no_data");
    }

    match cli.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| presenter.bind.clone());
            let listener = server::bind(&addr).await?;
            println!("dashboard on http://{}", listener.local_addr()?);

            let shutdown = CancellationToken::new();
            let trigger = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(msg = "shutting dashboard down", "presenter.signal");
                    trigger.cancel();
                }
            });

            let state = server::AppState::new(dataset, presenter);
            server::serve(listener, state, shutdown).await
        }
        Command::Report {
            csv, year_from, year_to, min_popularity, max_popularity, genre, hit_threshold
        } => {
            let params = DashboardParams {
                year_from, year_to, min_popularity, max_popularity, genre, hit_threshold
            };
            if csv {
                let rows = export_csv(&dataset, &params.filter(), std::io::stdout().lock())?;
                info!(rows, "presenter.export");
                return Ok(());
            }
            let view = dashboard(&dataset, &params, &presenter);
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfgs = match config::load_config() {
        Ok(cfgs) => cfgs,
        Err(e) => {
            eprintln!("hits-presenter: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = match logging::init_logging(&cfgs.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("hits-presenter: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "hits-presenter",
        version = %env!("CARGO_PKG_VERSION"),
        data_dir = %cli.data_dir.display(),
        "starting"
    );

    match run(cli, cfgs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "presenter.abort");
            ExitCode::FAILURE
        }
    }
}
