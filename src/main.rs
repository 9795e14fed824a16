use anyhow::Context;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use notemate_analytics::analytics::reporter::{self, MemoryUsage};
use notemate_analytics::analytics::{
    AggregateState, AnalyticsApiServer, AnalyticsService, FileSnapshotStore, MemorySnapshotStore,
    SnapshotStore, Timeframe,
};
use notemate_analytics::config::AnalyticsConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Request analytics and admin reports for the NoteMate backend
#[derive(Parser)]
#[command(name = "notemate-analytics")]
#[command(about = "Record NoteMate request analytics and report on them", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analytics API server
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Snapshot file to load and checkpoint to
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Keep the aggregate in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Print a report computed from the snapshot file
    Report {
        #[arg(value_enum)]
        view: ReportView,

        /// Activity window: 24h or 7d
        #[arg(long, default_value = "7d")]
        timeframe: String,

        /// Snapshot file to read
        #[arg(long)]
        data_file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportView {
    Dashboard,
    Activity,
    Insights,
    Health,
    Raw,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Environment overrides are merged after the subscriber is installed so
    // that ignored values are reported.
    let mut config = match AnalyticsConfig::from_optional_file(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let configured_level =
        std::env::var("NOTEMATE_LOG_LEVEL").unwrap_or_else(|_| config.log_level.clone());
    let log_level = match cli.verbose {
        0 => configured_level.as_str(),
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,tower=debug", // -vvv shows everything including dependencies
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    config.merge_env_vars();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    debug!("notemate-analytics started with verbosity level: {}", cli.verbose);
    trace!("Effective configuration: {:?}", config);

    let result = match cli.command {
        Commands::Serve {
            port,
            data_file,
            ephemeral,
        } => run_serve(config, port, data_file, ephemeral).await,
        Commands::Report {
            view,
            timeframe,
            data_file,
        } => run_report(config, view, &timeframe, data_file).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_serve(
    mut config: AnalyticsConfig,
    port: Option<u16>,
    data_file: Option<PathBuf>,
    ephemeral: bool,
) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_file) = data_file {
        config.data_file = data_file;
    }

    let store: Arc<dyn SnapshotStore> = if ephemeral {
        info!("Running with an in-memory analytics store");
        Arc::new(MemorySnapshotStore::new())
    } else {
        info!("Analytics snapshot: {}", config.data_file.display());
        Arc::new(FileSnapshotStore::new(&config.data_file))
    };

    let service = AnalyticsService::load(store, &config).await;
    let server = AnalyticsApiServer::new(service, config.listen_address());

    server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await
}

async fn run_report(
    config: AnalyticsConfig,
    view: ReportView,
    timeframe: &str,
    data_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let path = data_file.unwrap_or(config.data_file);
    let store = FileSnapshotStore::new(&path);

    let state = match store
        .load()
        .await
        .with_context(|| format!("Failed to read analytics snapshot {}", path.display()))?
    {
        Some(state) => state,
        None => {
            warn!("No snapshot at {}, reporting on an empty aggregate", path.display());
            AggregateState::new(Utc::now())
        }
    };

    let now = Local::now();
    let json = match view {
        ReportView::Dashboard => serde_json::to_string_pretty(&reporter::dashboard(&state, now))?,
        ReportView::Activity => serde_json::to_string_pretty(&reporter::user_activity(
            &state,
            Timeframe::parse(timeframe),
            now,
        ))?,
        ReportView::Insights => serde_json::to_string_pretty(&reporter::business_insights(&state))?,
        ReportView::Health => serde_json::to_string_pretty(&reporter::system_health(
            &state,
            MemoryUsage::current(),
            now,
        ))?,
        ReportView::Raw => serde_json::to_string_pretty(&state)?,
    };

    println!("{json}");
    Ok(())
}
