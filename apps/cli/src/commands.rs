//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use stationgeo_core::backup::FileSnapshot;
use stationgeo_core::pipeline::{
    ProgressReporter, SilentProgress, StationOutcome, run_update,
};
use stationgeo_geocoder::Resolver;
use stationgeo_shared::{
    GeocoderConfig, PipelineConfig, RunSummary, StationRecord, Train, init_config, load_config,
};
use stationgeo_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// stationgeo — enrich railway stations with geographic coordinates.
#[derive(Parser)]
#[command(
    name = "stationgeo",
    version,
    about = "Resolve railway station coordinates and persist them into the train database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the coordinate update pipeline over the train dataset.
    Update {
        /// Path to the train database (defaults to config value).
        #[arg(long)]
        db: Option<String>,

        /// Where to write the run summary artifact.
        #[arg(long)]
        summary: Option<String>,

        /// Directory receiving the pre-run database snapshot.
        #[arg(long)]
        backup_dir: Option<String>,

        /// Geocoding endpoint base URL.
        #[arg(long)]
        endpoint: Option<String>,

        /// Attempts per query pattern before it is abandoned.
        #[arg(long)]
        retry_count: Option<u32>,

        /// Process at most this many stations (useful for trial runs).
        #[arg(long)]
        limit: Option<usize>,

        /// Disable the interactive spinner (plain log output only).
        #[arg(long)]
        quiet: bool,
    },

    /// Import a JSON array of train documents into the database.
    Import {
        /// Path to the JSON file.
        file: String,

        /// Path to the train database (defaults to config value).
        #[arg(long)]
        db: Option<String>,
    },

    /// Show the stored coordinate record for one station code.
    Show {
        /// Station code (e.g. NDLS).
        code: String,

        /// Path to the train database (defaults to config value).
        #[arg(long)]
        db: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "stationgeo=info",
        1 => "stationgeo=debug",
        _ => "stationgeo=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Update {
            db,
            summary,
            backup_dir,
            endpoint,
            retry_count,
            limit,
            quiet,
        } => {
            cmd_update(
                db.as_deref(),
                summary.as_deref(),
                backup_dir.as_deref(),
                endpoint.as_deref(),
                retry_count,
                limit,
                quiet,
            )
            .await
        }
        Command::Import { file, db } => cmd_import(&file, db.as_deref()).await,
        Command::Show { code, db } => cmd_show(&code, db.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

async fn cmd_update(
    db: Option<&str>,
    summary: Option<&str>,
    backup_dir: Option<&str>,
    endpoint: Option<&str>,
    retry_count: Option<u32>,
    limit: Option<usize>,
    quiet: bool,
) -> Result<()> {
    let config = load_config()?;

    let db_path = PathBuf::from(db.unwrap_or(&config.defaults.db_path));
    if !db_path.exists() {
        return Err(eyre!(
            "database not found at '{}' — run `stationgeo import` first or pass --db",
            db_path.display()
        ));
    }

    let mut geocoder_config = GeocoderConfig::from(&config);
    if let Some(endpoint) = endpoint {
        geocoder_config.endpoint = endpoint.to_string();
    }
    if let Some(retry_count) = retry_count {
        geocoder_config.retry_count = retry_count;
    }

    let mut pipeline_config = PipelineConfig::from(&config);
    if let Some(summary) = summary {
        pipeline_config.summary_path = PathBuf::from(summary);
    }
    pipeline_config.limit = limit;

    let backup_dir = backup_dir.unwrap_or(&config.defaults.backup_dir);

    info!(
        db = %db_path.display(),
        endpoint = %geocoder_config.endpoint,
        "starting coordinate update"
    );

    let storage = Storage::open(&db_path).await?;
    let resolver = Resolver::new(geocoder_config)?;
    let snapshot = FileSnapshot::new(&db_path, backup_dir);

    // Ctrl-C requests a cooperative stop between stations; the run still
    // writes its summary for the work completed so far.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current station");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let summary = if quiet {
        run_update(
            &pipeline_config,
            &storage,
            &resolver,
            &snapshot,
            &SilentProgress,
            &cancel,
        )
        .await?
    } else {
        let reporter = CliProgress::new();
        run_update(
            &pipeline_config,
            &storage,
            &resolver,
            &snapshot,
            &reporter,
            &cancel,
        )
        .await?
    };

    print_summary(&summary, &pipeline_config.summary_path);
    Ok(())
}

fn print_summary(summary: &RunSummary, summary_path: &std::path::Path) {
    println!();
    println!("  Coordinate update complete!");
    println!("  Stations: {}", summary.total_stations);
    println!("  Updated:  {}", summary.successful_updates);
    println!("  Failed:   {}", summary.failed_updates);
    println!("  Summary:  {}", summary_path.display());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn station_processed(
        &self,
        station: &StationRecord,
        outcome: StationOutcome,
        current: usize,
        total: usize,
    ) {
        let label = match outcome {
            StationOutcome::AlreadyResolved => "skipped",
            StationOutcome::Updated => "updated",
            StationOutcome::NotFound => "not found",
            StationOutcome::StoreFailed => "store error",
        };
        self.spinner
            .set_message(format!("[{current}/{total}] {} — {label}", station.code));
    }

    fn checkpoint(&self, processed: usize, success: usize, failed: usize) {
        self.spinner.println(format!(
            "  progress: {processed} processed ({success} ok, {failed} failed)"
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// import / show
// ---------------------------------------------------------------------------

async fn cmd_import(file: &str, db: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let db_path = PathBuf::from(db.unwrap_or(&config.defaults.db_path));

    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{file}': {e}"))?;
    let trains: Vec<Train> = serde_json::from_str(&content)
        .map_err(|e| eyre!("'{file}' is not a train document array: {e}"))?;

    info!(count = trains.len(), db = %db_path.display(), "importing trains");

    let storage = Storage::open(&db_path).await?;
    let mut imported = 0usize;
    let mut skipped = 0usize;
    for train in &trains {
        match storage.insert_train(train).await {
            Ok(()) => imported += 1,
            Err(e) => {
                warn!(train_number = train.train_number, error = %e, "skipping train");
                skipped += 1;
            }
        }
    }

    println!("Imported {imported} trains ({skipped} skipped) into {}", db_path.display());
    Ok(())
}

async fn cmd_show(code: &str, db: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let db_path = PathBuf::from(db.unwrap_or(&config.defaults.db_path));

    let storage = Storage::open_readonly(&db_path).await?;
    match storage.get_coordinate(code).await? {
        Some(stored) => match &stored.coordinates {
            Some(coords) => {
                println!("{} — {}", stored.station_code, stored.station_name);
                println!("  lat:        {}", coords.lat);
                println!("  lon:        {}", coords.lon);
                println!("  source:     {}", coords.source);
                println!("  updated_at: {}", stored.updated_at.to_rfc3339());
            }
            None => {
                println!(
                    "{} — {} (no coordinates resolved yet)",
                    stored.station_code, stored.station_name
                );
            }
        },
        None => println!("no record for station code '{code}'"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config file at {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
