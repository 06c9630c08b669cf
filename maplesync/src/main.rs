mod config;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use roster::RosterError;
use roster::sync_engine::SyncEngine;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(version, about = "Keeps MapleStory character records in sync with the Nexon Open API")]
struct Cli {
    #[arg(long, env = "MAPLESYNC_CONFIG", default_value = "maplesync.yaml")]
    config_file: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the roster API and the admin listener
    Serve,
    /// Sync the named characters once and print the results
    Sync {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Seed records for names taken from a ranking list
    Seed {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the stored record for an ocid
    Show { ocid: String },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not set up statsd exporter: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
    #[error("{0} of {1} characters failed")]
    PartialFailure(usize, usize),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "maplesync failed");
            eprintln!("maplesync: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::from_file(&cli.config_file)?;

    let _sentry = init_logging(config.common.logging.as_ref());
    if let Some(metrics_config) = &config.common.metrics {
        init_metrics(metrics_config)?;
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(execute(cli.command, config))
}

async fn execute(command: CliCommand, config: Config) -> Result<(), CliError> {
    match command {
        CliCommand::Serve => {
            tracing::info!("starting roster");
            roster::run(config.roster).await?;
            Ok(())
        }
        CliCommand::Sync { names } => {
            let engine = roster::build_engine(&config.roster).await?;
            sync(&engine, &names).await
        }
        CliCommand::Seed { names } => {
            let engine = roster::build_engine(&config.roster).await?;
            seed(&engine, &names).await
        }
        CliCommand::Show { ocid } => {
            let engine = roster::build_engine(&config.roster).await?;
            match engine.get_record(&ocid).await {
                Ok(record) => {
                    print_json(&record);
                    Ok(())
                }
                Err(err) => {
                    eprintln!("{ocid}: {err}");
                    Err(CliError::PartialFailure(1, 1))
                }
            }
        }
    }
}

async fn sync(engine: &SyncEngine, names: &[String]) -> Result<(), CliError> {
    let mut failed = 0;
    for (name, result) in engine.sync_characters(names).await {
        match result {
            Ok(synced) => print_json(&synced),
            Err(err) => {
                failed += 1;
                eprintln!("{name}: {err}");
            }
        }
    }

    match failed {
        0 => Ok(()),
        n => Err(CliError::PartialFailure(n, names.len())),
    }
}

async fn seed(engine: &SyncEngine, names: &[String]) -> Result<(), CliError> {
    let mut failed = 0;
    for name in names {
        match engine.sync_from_ranking_entry(name).await {
            Ok(Some(record)) => print_json(&record),
            Ok(None) => println!("{name}: skipped"),
            Err(err) => {
                failed += 1;
                eprintln!("{name}: {err}");
            }
        }
    }

    match failed {
        0 => Ok(()),
        n => Err(CliError::PartialFailure(n, names.len())),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("could not render output: {err}"),
    }
}

/// Installs the fmt subscriber, plus the Sentry layer when a DSN is
/// configured. The returned guard flushes Sentry on drop.
fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let default_filter = logging.map_or("info", |l| l.filter.as_str());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let sentry_guard = logging
        .and_then(|l| l.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            sentry_guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    sentry_guard
}

fn init_metrics(metrics_config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
        .build(Some(&metrics_config.prefix))?;
    metrics::set_global_recorder(recorder).map_err(|_| CliError::RecorderInstalled)?;
    shared::metrics_defs::describe_all(roster::metrics_defs::ALL_METRICS);

    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "statsd exporter installed"
    );
    Ok(())
}
