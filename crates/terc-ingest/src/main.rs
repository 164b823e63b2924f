//! terc-ingest - outsourced-worker open data pipeline

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use terc_common::logging::{init_logging, LogConfig, LogLevel};
use terc_common::storage::{connect, StorageConfig};
use terc_common::{Layer, ReportingPeriod};
use terc_ingest::{
    filter_by_window, FailurePolicy, IngestConfig, IngestPipeline, LoadWindow, TransformCommand,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "terc-ingest")]
#[command(author, version, about = "Terceirizados open data ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the files published on the portal
    Discover {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Download, normalize and publish raw partitions
    Load {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Run the transformation project
    Transform {
        #[arg(value_enum, default_value = "build")]
        command: TransformCommand,
    },

    /// Upload derived layers as standalone databases
    Promote {
        /// Layers to promote (default: bronze, silver, gold)
        #[arg(short, long, value_delimiter = ',')]
        layers: Vec<String>,
    },

    /// Full run: bucket, raw load, transformation, promotion
    Run {
        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        load: LoadArgs,
    },
}

#[derive(Args, Debug)]
struct WindowArgs {
    /// First reporting period to load (YYYY-MM)
    #[arg(long)]
    start: Option<ReportingPeriod>,

    /// Last reporting period to load (YYYY-MM)
    #[arg(long)]
    end: Option<ReportingPeriod>,
}

impl WindowArgs {
    fn window(&self) -> Result<LoadWindow> {
        Ok(LoadWindow::from_bounds(self.start, self.end)?)
    }
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Files processed at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// What to do when a file fails
    #[arg(long, value_enum)]
    on_failure: Option<FailurePolicy>,
}

impl LoadArgs {
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(n) = self.concurrency {
            config.max_concurrent_files = n;
        }
        if let Some(policy) = self.on_failure {
            config.failure_policy = policy;
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("terc-ingest")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env()?;
    if let Command::Load { load, .. } | Command::Run { load, .. } = &cli.command {
        load.apply(&mut config);
    }
    config.validate()?;

    let store = connect(StorageConfig::from_env()?).await?;
    let pipeline = IngestPipeline::new(config, store)?;

    match cli.command {
        Command::Discover { window } => {
            let files = pipeline.discover().await?;
            let selected = filter_by_window(&files, &window.window()?);
            info!("{} of {} files inside the window", selected.len(), files.len());
            print_json(&selected)?;
        },
        Command::Load { window, .. } => {
            let report = pipeline.load_raw(&window.window()?).await?;
            print_json(&report)?;
            if !report.is_clean() {
                bail!("{} file(s) failed to load", report.failures.len());
            }
        },
        Command::Transform { command } => {
            pipeline.transform(command).await?;
        },
        Command::Promote { layers } => {
            let layers: Vec<Layer> = if layers.is_empty() {
                Layer::DERIVED.to_vec()
            } else {
                layers
                    .iter()
                    .map(|l| l.parse())
                    .collect::<terc_common::Result<_>>()?
            };
            let report = pipeline.promote(&layers).await;
            print_json(&report)?;
            if !report.all_promoted() {
                bail!("{} layer(s) failed to promote", report.failures.len());
            }
        },
        Command::Run { window, .. } => {
            let report = pipeline.run(&window.window()?).await?;
            print_json(&report)?;
            if !report.stages.is_success() {
                bail!("pipeline finished with failed stages");
            }
        },
    }

    info!("Done");
    Ok(())
}
