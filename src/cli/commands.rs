//! CLI command definitions for iac-forge.
//!
//! The CLI drives the same pipeline the hosted dispatcher does: `process`
//! runs one step across one or more resources, `copy` assembles the final
//! artifact tree, and `dispatch` answers a single hosted-style JSON request.

use clap::Parser;
use std::sync::Arc;
use tracing::info;

use crate::artifact::{ArtifactBuilder, ArtifactConfig};
use crate::config::ForgeConfig;
use crate::llm::{InferenceProvider, MessagesClient};
use crate::pipeline::{
    BatchReport, Dispatcher, DispatcherConfig, ProcessorConfig, ResourceProcessor, RunStatus,
    Step, StepRequest,
};
use crate::transfer::{
    download_prefix, upload_prefix, ObjectStore, S3Store, TransferFilter, TransferOptions,
};

/// Marker-driven Terraform example pipeline for the awscc provider.
#[derive(Parser)]
#[command(name = "iac-forge")]
#[command(about = "Generate, verify and publish Terraform provider examples")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one pipeline step for one or more resources.
    #[command(alias = "run")]
    Process(ProcessArgs),

    /// Assemble the published artifact tree from finished resources.
    Copy(CopyArgs),

    /// Handle a single hosted-style dispatch request and print the response.
    Dispatch(DispatchArgs),
}

#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Pipeline step to run.
    #[arg(long, value_enum)]
    pub step: Step,

    /// Target resource names, e.g. awscc_s3_bucket.
    #[arg(long = "resource", required = true)]
    pub resources: Vec<String>,

    /// Reset all markers and process from scratch (CREATE/UPDATE only).
    #[arg(long)]
    pub re_run: bool,

    /// Work purely against the local working directories; skip object-store
    /// synchronization even when buckets are configured.
    #[arg(long)]
    pub local: bool,

    /// Override the configured model identifier.
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CopyArgs {
    /// Resources to assemble.
    #[arg(long = "resource", required = true)]
    pub resources: Vec<String>,

    /// Re-copy resources that already carry the COPIED marker.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct DispatchArgs {
    /// The dispatch request as a JSON object.
    #[arg(long)]
    pub request: String,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the selected command with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Process(args) => run_process(args).await,
        Commands::Copy(args) => run_copy(args).await,
        Commands::Dispatch(args) => run_dispatch(args).await,
    }
}

async fn run_process(args: ProcessArgs) -> anyhow::Result<()> {
    let mut config = ForgeConfig::from_env()?;
    if let Some(model) = args.model {
        config.model = model;
    }

    if args.step == Step::Copy {
        // COPY is the artifact builder's job, not a sampling step.
        return run_copy(CopyArgs {
            resources: args.resources,
            force: args.re_run,
        })
        .await;
    }

    let provider: Arc<dyn InferenceProvider> = Arc::new(MessagesClient::from_env()?);
    let processor = ResourceProcessor::new(
        provider,
        ProcessorConfig::default()
            .with_model(config.model.clone())
            .with_step_timeout(config.step_timeout)
            .with_log_level(config.log_level),
    );
    let options = TransferOptions::default().with_max_workers(config.max_workers);

    let assets: Option<S3Store> = if args.local {
        None
    } else if let Some(bucket) = &config.assets_bucket {
        Some(S3Store::connect(&config.region, config.profile.as_deref(), bucket).await)
    } else {
        None
    };

    let mut records = Vec::with_capacity(args.resources.len());
    for resource in &args.resources {
        let work_dir = config.work_root.join(resource);

        if let Some(store) = &assets {
            download_prefix(
                store,
                &format!("{resource}/"),
                &work_dir,
                &TransferFilter::new(),
                &options,
            )
            .await?;
        }

        let record = processor
            .process(resource, &work_dir, args.step, args.re_run)
            .await;

        if let Some(store) = &assets {
            if work_dir.is_dir() {
                upload_prefix(
                    store,
                    &work_dir,
                    resource,
                    &[".terraform/*".to_string()],
                    &options,
                )
                .await?;
            }
        }

        records.push(record);
    }

    BatchReport::from_records(&records).log();
    let failed = records
        .iter()
        .filter(|r| r.status == RunStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} steps failed", records.len());
    }
    Ok(())
}

async fn run_copy(args: CopyArgs) -> anyhow::Result<()> {
    let config = ForgeConfig::from_env()?;
    let builder = ArtifactBuilder::new(
        ArtifactConfig::default()
            .with_provider_prefix(config.provider_prefix.clone())
            .with_force(args.force),
    );
    let report = builder.build(&config.work_root, &config.output_root, &args.resources);
    info!(
        successful = report.successful,
        skipped = report.skipped,
        failed = report.failed,
        "copy finished"
    );
    if report.failed > 0 {
        anyhow::bail!("{} of {} resources failed artifact assembly", report.failed, report.total());
    }
    Ok(())
}

async fn run_dispatch(args: DispatchArgs) -> anyhow::Result<()> {
    let request: StepRequest = serde_json::from_str(&args.request)?;
    let config = ForgeConfig::from_env()?.hosted();

    let assets: Arc<dyn ObjectStore> = Arc::new(
        S3Store::connect(
            &config.region,
            config.profile.as_deref(),
            config.require_assets_bucket()?,
        )
        .await,
    );
    let artifacts: Arc<dyn ObjectStore> = Arc::new(
        S3Store::connect(
            &config.region,
            config.profile.as_deref(),
            config.require_artifacts_bucket()?,
        )
        .await,
    );
    let provider: Arc<dyn InferenceProvider> = Arc::new(MessagesClient::from_env()?);

    let dispatcher = Dispatcher::new(
        assets,
        artifacts,
        provider,
        ProcessorConfig::default()
            .with_model(config.model.clone())
            .with_step_timeout(config.step_timeout)
            .with_log_level(config.log_level),
        DispatcherConfig {
            work_root: config.work_root.clone(),
            output_root: config.output_root.clone(),
            transfer: TransferOptions::default().with_max_workers(config.max_workers),
            artifact: ArtifactConfig::default()
                .with_provider_prefix(config.provider_prefix.clone()),
            ..DispatcherConfig::default()
        },
    );

    let response = dispatcher.handle(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
