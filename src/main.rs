use anyhow::{Context, Result};
use catalog_image_sync::config::{Credentials, ProcessingConfig, ProcessingOptions};
use catalog_image_sync::job::JobRunner;
use catalog_image_sync::local::LocalProcessor;
use catalog_image_sync::progress::{ProgressSink, TracingSink};
use catalog_image_sync::sync::{ItemRef, SyncOrchestrator};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "catalog-image-sync")]
#[command(about = "Re-render catalog product images onto a uniform canvas")]
struct CliArgs {
    #[command(flatten)]
    render: RenderArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// JSON options file; flags below override its values.
    #[arg(long, global = true, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Canvas width in pixels (1-2540).
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Canvas height in pixels (1-2540).
    #[arg(long, global = true)]
    height: Option<u32>,

    /// "transparent" or a "#rrggbb" color.
    #[arg(long, global = true)]
    background: Option<String>,

    /// "contain" or "cover".
    #[arg(long, global = true)]
    size_mode: Option<String>,

    /// AUTO, JPEG, PNG, GIF, WEBP, AVIF or DZI (local only).
    #[arg(long, global = true)]
    format: Option<String>,

    /// Output filename template, e.g. "{slug}_{sku}_{width}x{height}".
    #[arg(long, global = true)]
    template: Option<String>,

    /// Delete local source images after they are processed.
    #[arg(long, global = true)]
    delete_source: bool,

    /// Output directory for local processing.
    #[arg(long, global = true, value_name = "DIR")]
    destination: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process a single product by id.
    Product { id: u64 },
    /// Process every product in the catalog.
    All,
    /// Search products; optionally process every match.
    Search {
        query: String,
        #[arg(long)]
        process: bool,
    },
    /// Process a local image file or directory.
    Local { path: PathBuf },
    /// Render the first image found under a path.
    Preview {
        path: PathBuf,
        /// Output path without extension.
        #[arg(long, default_value = "preview")]
        output: PathBuf,
    },
}

impl Command {
    fn job_name(&self) -> String {
        match self {
            Command::Product { id } => format!("product {}", id),
            Command::All => "all products".to_string(),
            Command::Search { query, .. } => format!("search '{}'", query),
            Command::Local { path } => format!("local {}", path.display()),
            Command::Preview { path, .. } => format!("preview {}", path.display()),
        }
    }
}

fn load_config(args: &RenderArgs) -> Result<ProcessingConfig> {
    let mut options = match &args.options {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read options file {}", path.display()))?;
            ProcessingOptions::from_json(&json)?
        }
        None => ProcessingOptions::default(),
    };

    if let Some(width) = args.width {
        options.canvas_width = width;
    }
    if let Some(height) = args.height {
        options.canvas_height = height;
    }
    if let Some(background) = &args.background {
        options.background_color = background.clone();
    }
    if let Some(size_mode) = &args.size_mode {
        options.image_size = size_mode.clone();
    }
    if let Some(format) = &args.format {
        options.image_format = format.clone();
    }
    if let Some(template) = &args.template {
        options.template = template.clone();
    }
    if args.delete_source {
        options.delete_images = true;
    }
    if let Some(destination) = &args.destination {
        options.destination_path = Some(destination.clone());
    }

    Ok(ProcessingConfig::try_from(options)?)
}

async fn run(command: Command, config: ProcessingConfig) -> Result<()> {
    let progress: Arc<dyn ProgressSink> = Arc::new(TracingSink);

    match command {
        Command::Product { id } => {
            let orchestrator = SyncOrchestrator::new(&Credentials::from_env()?, progress)?;
            let summary = orchestrator.process_one(&config, ItemRef::Id(id)).await?;
            info!(
                "Product {}: {:?}, {} images replaced, {} deletions failed",
                summary.item_id,
                summary.outcome,
                summary.new_ids.len(),
                summary.failed_deletions.len()
            );
        }
        Command::All => {
            let orchestrator = SyncOrchestrator::new(&Credentials::from_env()?, progress)?;
            let summary = orchestrator.process_all(&config).await;
            info!("Catalog run finished: {:?}", summary);
        }
        Command::Search { query, process } => {
            let orchestrator = SyncOrchestrator::new(&Credentials::from_env()?, progress)?;
            let items = orchestrator.search(&query).await?;
            for item in &items {
                info!("{}: {} (sku {}, {} images)", item.id, item.name, item.sku, item.images.len());
            }
            if process {
                for item in items {
                    let id = item.id;
                    if let Err(e) = orchestrator.process_one(&config, ItemRef::Item(item)).await {
                        error!("Product {} failed: {}", id, e);
                    }
                }
            }
        }
        Command::Local { path } => {
            let summary = LocalProcessor::new(progress).process(&config, &path).await?;
            info!(
                "Wrote {} images to {} ({} failed, {} sources deleted)",
                summary.processed,
                summary.output_dir.display(),
                summary.failed,
                summary.deleted
            );
        }
        Command::Preview { path, output } => {
            match LocalProcessor::new(progress).preview(&config, &path, &output).await? {
                Some(result) => info!("Preview: {}", result.output_path.display()),
                None => info!("No images found under {}", path.display()),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_image_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match load_config(&args.render) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid processing settings: {:#}", e);
            std::process::exit(2);
        }
    };

    let runner = JobRunner::new();
    let handle = runner.submit(args.command.job_name(), run(args.command, config))?;
    info!("Job '{}' ({}) started", handle.name, handle.id);

    match handle.wait().await? {
        Ok(()) => {
            info!("Job completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Job failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
