//! Clipflow command line front-end.
//!
//! Uploads a recording (or reuses a registered one), drives the analysis
//! workflow to completion and prints the resulting clip gallery.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipflow_analysis_client::{AnalysisClient, AnalysisService};
use clipflow_models::{MediaAssetId, MediaFilter, WorkflowEvent};
use clipflow_pipeline::{
    CreditLedgerAdapter, MediaFile, PipelineConfig, Workflow, WorkflowHandle, WorkflowInput,
    WorkflowOutcome, WorkflowServices,
};
use clipflow_platform::{ClipRepository, CreditLedgerRepository, MediaRepository, PlatformClient};
use clipflow_storage::{
    DeliveryConfig, HttpResumableTransport, R2MultipartTransport, UploadTransport,
};

#[derive(Parser)]
#[command(name = "clipflow", about = "Turn long recordings into short clips")]
struct Cli {
    /// User the workflow runs for
    #[arg(long, global = true, env = "CLIPFLOW_USER_ID")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a recording and generate clips from it
    Upload {
        /// Path to an audio or video file
        file: PathBuf,
        /// Duration in seconds, used for the credit estimate
        #[arg(long)]
        duration: Option<f64>,
        /// Display name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Generate clips from an already uploaded recording
    Resume {
        /// Media asset ID
        asset_id: String,
    },
    /// List uploaded recordings, most recent first
    List {
        /// all, video or audio
        #[arg(long, default_value = "all")]
        filter: String,
    },
    /// Show the credit balance
    Balance,
    /// Check that the analysis service is reachable
    Health,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipflow=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// R2 when its bucket is configured, the HTTP resumable endpoint otherwise.
fn upload_transport() -> anyhow::Result<Arc<dyn UploadTransport>> {
    if std::env::var("R2_BUCKET_NAME").is_ok() {
        info!("Using R2 multipart upload transport");
        Ok(Arc::new(R2MultipartTransport::from_env()?))
    } else {
        Ok(Arc::new(
            HttpResumableTransport::from_env().context("Set UPLOAD_API_URL or the R2_* variables")?,
        ))
    }
}

fn build_workflow(user_id: String) -> anyhow::Result<Workflow> {
    let platform = PlatformClient::from_env().context("Set PLATFORM_API_URL and PLATFORM_API_KEY")?;

    let services = WorkflowServices {
        transport: upload_transport()?,
        delivery: DeliveryConfig::from_env(),
        registry: Arc::new(MediaRepository::new(platform.clone())),
        clip_store: Arc::new(ClipRepository::new(platform.clone())),
        analysis: Arc::new(AnalysisClient::from_env()?),
        ledger: Arc::new(CreditLedgerAdapter::new(Arc::new(CreditLedgerRepository::new(
            platform,
        )))),
    };

    Ok(Workflow::new(user_id, services, PipelineConfig::from_env()))
}

fn print_event(event: &WorkflowEvent) {
    match &event.error {
        Some(error) => eprintln!("[{}] {}", event.phase.as_str(), error),
        None => eprintln!(
            "[{}] {:>3}% {}",
            event.phase.as_str(),
            event.progress_percent,
            event.stage_label
        ),
    }
}

/// Print progress until the pass ends; Ctrl-C cancels it.
async fn follow(mut handle: WorkflowHandle) -> anyhow::Result<()> {
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("Interrupted, cancelling workflow {}", handle.id());
                handle.cancel();
                interrupted = true;
            }
        }
    }

    match handle.outcome().await? {
        WorkflowOutcome::Gallery { asset, job_id, clips, deduction } => {
            info!(
                asset_id = %asset.id,
                job_id = ?job_id.as_ref().map(|id| id.to_string()),
                deduction = ?deduction.as_ref().map(|d| d.as_str()),
                "Workflow finished"
            );
            print_json(&clips)
        }
        WorkflowOutcome::Intake { asset, error } => {
            if let Some(asset) = asset {
                eprintln!("Retry with: clipflow resume {}", asset.id);
            }
            bail!(error)
        }
    }
}

async fn health() -> anyhow::Result<()> {
    let client = AnalysisClient::from_env()?;
    if client.health_check().await? {
        println!("analysis service: healthy");
        return Ok(());
    }
    bail!("analysis service: unhealthy")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Health = cli.command {
        return health().await;
    }

    let Some(user_id) = cli.user else {
        bail!("No user given. Pass --user or set CLIPFLOW_USER_ID");
    };
    let workflow = build_workflow(user_id)?;

    match cli.command {
        Commands::Upload { file, duration, name } => {
            let mut media = MediaFile::new(file);
            if let Some(secs) = duration {
                media = media.with_duration(secs);
            }
            if let Some(name) = name {
                media = media.with_display_name(name);
            }
            follow(workflow.submit(WorkflowInput::File(media))?).await?;
        }
        Commands::Resume { asset_id } => {
            let input = WorkflowInput::ExistingAsset(MediaAssetId::from_string(asset_id));
            follow(workflow.submit(input)?).await?;
        }
        Commands::List { filter } => {
            let Some(filter) = MediaFilter::parse(&filter) else {
                bail!("Unknown filter '{}': expected all, video or audio", filter);
            };
            print_json(&workflow.list_media(filter).await?)?;
        }
        Commands::Balance => {
            println!("{}", workflow.balance().await?);
        }
        Commands::Health => health().await?,
    }

    Ok(())
}
