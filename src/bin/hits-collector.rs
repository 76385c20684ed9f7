//!
//! src/bin/hits-collector.rs  Andrew Belles  Oct 18th, 2026
//!
//! Collector entry point. Pulls the configured years from the catalog
//! and writes `<out-dir>/<prefix>_<year>.csv` for each of them. The
//! `artists` subcommand runs the artist explorer instead.
//!
//! Exits non-zero only when nothing could be collected at all: bad
//! configuration or a rejected token exchange
//!

use std::{path::PathBuf, process::ExitCode};

use chrono::Datelike;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use hits_panorama::{
    EtlError,
    collector::{CollectOptions, Collector, ShardMode, Source},
    config::{self, PlaylistCatalog},
    explorer::{self, ExploreOptions},
    fetch::{CatalogApi, SpotifyClient},
    logging,
    sink::{CsvSink, RawArchive}
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    /// Curated playlists listed in the playlist catalog
    Playlists,
    /// Album search sharded by artist prefix
    Search
}

#[derive(Debug, Parser)]
#[command(
    name = "hits-collector",
    version,
    about = "Collects yearly hit tables from the Spotify catalog",
    args_conflicts_with_subcommands = true
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Years to collect, defaults to the current year
    #[arg(long, num_args = 1..)]
    years: Vec<i32>,

    /// Output file prefix, files are named <prefix>_<year>.csv
    #[arg(long, default_value = "spotify_hits_brasil")]
    prefix: String,

    #[arg(long, default_value = "raw_data")]
    out_dir: PathBuf,

    /// Track budget per year
    #[arg(long)]
    max_tracks: Option<usize>,

    /// Playlist catalog (TOML)
    #[arg(long, default_value = "playlists.toml")]
    playlists: PathBuf,

    #[arg(long, value_enum, default_value_t = SourceArg::Playlists)]
    source: SourceArg,

    /// Markets walked for every year, merged into one table (BR US GB)
    #[arg(long, alias = "market", num_args = 1..)]
    markets: Vec<String>,

    #[arg(long, value_enum, default_value_t = ShardMode::Letters)]
    shards: ShardMode,

    #[arg(long)]
    max_pages_per_shard: Option<u32>,

    /// Archive every raw response under this directory (zstd json)
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Skip the artist lookups, genre and followers get sentinels
    #[arg(long)]
    no_enrich_artists: bool,

    /// Skip the popularity lookups of search mode, popularity becomes 0
    #[arg(long)]
    no_enrich_track_pop: bool
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search artists and accumulate them into one CSV
    Artists {
        /// Search query, e.g. "genre:rock year:2020"
        #[arg(long, default_value = "genre:pop")]
        query: String,
        /// Results per page
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..=50))]
        limit: u32,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=10))]
        pages: u32,
        #[arg(long, default_value_t = 40, value_parser = clap::value_parser!(u8).range(0..=100))]
        min_popularity: u8,
        /// Offset of the first page, use the one printed by the last run
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value = "raw_data/spotify_artists.csv")]
        out: PathBuf,
        /// Overwrite the output instead of adding to it
        #[arg(long)]
        fresh: bool
    }
}

const RAW_ZSTD_LEVEL: i32 = 3;

async fn run(args: Args, cfgs: config::AppConfig) -> Result<(), EtlError> {
    let years = if args.years.is_empty() {
        vec![chrono::Utc::now().year()]
    } else {
        args.years.clone()
    };

    let mut opts = CollectOptions::from_config(&cfgs.collector);
    if let Some(max) = args.max_tracks {
        opts.max_tracks = max;
    }
    opts.set_markets(&args.markets, &cfgs.collector.market);
    opts.enrich_artists = !args.no_enrich_artists;
    opts.enrich_track_popularity = !args.no_enrich_track_pop;

    let catalog = match args.source {
        SourceArg::Playlists => {
            opts.source = Source::Playlists;
            let catalog = PlaylistCatalog::load(&args.playlists)?;
            for &year in &years {
                info!(year, playlists = catalog.for_year(year).len(), "catalog.year");
            }
            catalog
        }
        SourceArg::Search => {
            opts.source = Source::Search {
                shards: args.shards,
                max_pages_per_shard: args.max_pages_per_shard
            };
            PlaylistCatalog::default()
        }
    };

    let spotify = config::build_spotify()?;
    let client  = SpotifyClient::new(&cfgs.http, &spotify, &cfgs.collector)?;
    let sink    = CsvSink::new(&args.out_dir, &args.prefix);
    let archive = args.raw_dir.as_ref().map(|dir| RawArchive::new(dir, RAW_ZSTD_LEVEL));

    let collector = Collector::new(&client, &cfgs.collector, catalog, sink, archive);

    let shutdown = collector.shutdown();
    let trigger = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(msg = "stopping after the current request", "collector.signal");
            shutdown.cancel();
        }
    });

    let reports = collector.run(&years, &opts).await;
    trigger.abort();
    let reports = reports?;

    for r in &reports {
        info!(
            year = r.year,
            tracks = r.tracks,
            walked = r.listings_walked,
            failed = r.listings_failed,
            failed_batches = r.batches_failed,
            skipped = r.skipped,
            cancelled = r.cancelled,
            path = ?r.path,
            "collector.summary"
        );
    }
    Ok(())
}

async fn run_artists(command: Command, cfgs: config::AppConfig) -> Result<(), EtlError> {
    let Command::Artists { query, limit, pages, min_popularity, offset, out, fresh } = command;

    let spotify = config::build_spotify()?;
    let client  = SpotifyClient::new(&cfgs.http, &spotify, &cfgs.collector)?;
    client.authenticate().await?;

    let opts = ExploreOptions { query, limit, pages, min_popularity, offset };
    let found = explorer::explore(&client, &opts).await?;
    if found.artists.is_empty() {
        warn!(query = %opts.query, "explore.empty");
    }

    let existing = if fresh { Vec::new() } else { explorer::read_artists(&out)? };
    let before = existing.len();
    let merged = explorer::merge(existing, found.artists);
    explorer::write_artists(&out, &merged)?;
    info!(path = %out.display(), added = merged.len() - before, total = merged.len(),
        "explore.written");

    match found.next_offset {
        Some(next) => println!("{} artists in {}, continue with --offset {next}",
            merged.len(), out.display()),
        None => println!("{} artists in {}, no more results", merged.len(), out.display())
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let mut args = Args::parse();

    let cfgs = match config::load_config() {
        Ok(cfgs) => cfgs,
        Err(e) => {
            eprintln!("hits-collector: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = match logging::init_logging(&cfgs.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("hits-collector: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "hits-collector",
        version = %env!("CARGO_PKG_VERSION"),
        years = ?args.years,
        source = ?args.source,
        "starting"
    );

    let result = match args.command.take() {
        Some(command) => run_artists(command, cfgs).await,
        None => run(args, cfgs).await
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "collector.abort");
            ExitCode::FAILURE
        }
    }
}
