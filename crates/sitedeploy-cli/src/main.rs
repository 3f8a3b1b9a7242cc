//! sitedeploy - package, upload and invalidate static sites
//!
//! ## Commands
//!
//! - `archive`: split a build directory into size-bounded zips
//! - `build-id`: print the structural fingerprint of a directory
//! - `package`: archive the configured site (or the placeholder) into the artifacts dir
//! - `handle-deployment` / `handle-invalidation`: answer one custom-resource request
//! - `resume-invalidation`: continue a suspended invalidation wait
//! - `deploy` / `destroy`: run the whole pipeline locally

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use sitedeploy_core::config::{dev_mode, CONFIG_ENV, CONFIG_FILE_NAME};
use sitedeploy_core::protocol;
use sitedeploy_core::{
    archive_directory, build_id_for_dir, init_tracing, CdnClient, DeploymentEvent,
    DeploymentHandler, HandlerOutcome, HttpCdnClient, InvalidationEvent,
    InvalidationOrchestrator, LocalDriver, LogFormat, ResumeToken, SiteConfig,
};
use sitedeploy_store::StoreRegistry;

#[derive(Parser)]
#[command(name = "sitedeploy")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Static site packaging, upload and CDN invalidation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the site configuration
    #[arg(long, global = true, env = CONFIG_ENV, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive SOURCE_DIR into OUTPUT_DIR as part0.zip, part1.zip, ... plus `filenames`
    Archive {
        source_dir: PathBuf,
        output_dir: PathBuf,
        /// Maximum uncompressed bytes per archive
        max_archive_bytes: u64,
    },

    /// Print the BuildId of a directory
    BuildId {
        dir: PathBuf,

        /// Subdirectory to leave out of the fingerprint (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },

    /// Package the configured site into the artifacts directory
    Package {
        /// Package the placeholder instead of the real build
        #[arg(long)]
        dev: bool,
    },

    /// Handle one deployment request
    HandleDeployment {
        /// Request JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },

    /// Handle one invalidation request
    HandleInvalidation {
        /// Request JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: PathBuf,

        /// Where to write the resume token if the wait is suspended
        #[arg(long)]
        token_out: Option<PathBuf>,
    },

    /// Continue a suspended invalidation wait
    ResumeInvalidation {
        /// Token written by a suspended handle-invalidation
        token: PathBuf,

        /// Where to write the next token if the wait is suspended again
        #[arg(long)]
        token_out: Option<PathBuf>,
    },

    /// Package, publish, deploy and invalidate in one go
    Deploy {
        /// Deploy the placeholder instead of the real build
        #[arg(long)]
        dev: bool,
    },

    /// Remove everything the last deploy uploaded
    Destroy,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    match cli.command {
        Commands::Archive {
            source_dir,
            output_dir,
            max_archive_bytes,
        } => cmd_archive(&source_dir, &output_dir, max_archive_bytes),
        Commands::BuildId { dir, exclude } => cmd_build_id(&dir, &exclude),
        Commands::Package { dev } => cmd_package(&cli.config, dev).await,
        Commands::HandleDeployment { event } => cmd_handle_deployment(&cli.config, &event).await,
        Commands::HandleInvalidation { event, token_out } => {
            cmd_handle_invalidation(&cli.config, &event, token_out.as_deref()).await
        }
        Commands::ResumeInvalidation { token, token_out } => {
            cmd_resume_invalidation(&cli.config, &token, token_out.as_deref()).await
        }
        Commands::Deploy { dev } => cmd_deploy(&cli.config, dev).await,
        Commands::Destroy => cmd_destroy(&cli.config).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = read_input(path)?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn load_config(path: &Path) -> Result<SiteConfig> {
    SiteConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config {}", path.display()))
}

async fn registry_for(config: &SiteConfig) -> Result<StoreRegistry> {
    StoreRegistry::from_configs(&config.bucket_configs())
        .await
        .context("Failed to open configured stores")
}

fn cdn_client(config: &SiteConfig) -> Result<Option<Arc<dyn CdnClient>>> {
    let Some(cdn) = config.cdn_config() else {
        return Ok(None);
    };
    let client: Arc<dyn CdnClient> =
        Arc::new(HttpCdnClient::new(cdn).context("Failed to build CDN client")?);
    Ok(Some(client))
}

fn require_cdn_client(config: &SiteConfig) -> Result<Arc<dyn CdnClient>> {
    match cdn_client(config)? {
        Some(client) => Ok(client),
        None => bail!(
            "No CDN endpoint configured; set [cdn].endpoint or {}",
            sitedeploy_core::CdnConfig::ENDPOINT_ENV
        ),
    }
}

/// Archiver script interface
fn cmd_archive(source_dir: &Path, output_dir: &Path, max_archive_bytes: u64) -> Result<()> {
    if max_archive_bytes == 0 {
        bail!("MAX_ARCHIVE_BYTES must be positive");
    }
    let output = archive_directory(source_dir, output_dir, max_archive_bytes)
        .with_context(|| format!("Failed to archive {}", source_dir.display()))?;

    for part in &output.parts {
        println!("{}", part.display());
    }
    println!("{}", output.filenames_path.display());
    Ok(())
}

fn cmd_build_id(dir: &Path, exclude: &[String]) -> Result<()> {
    let build_id = build_id_for_dir(dir, exclude)
        .with_context(|| format!("Failed to fingerprint {}", dir.display()))?;
    println!("{build_id}");
    Ok(())
}

async fn cmd_package(config_path: &Path, dev: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let options = config.package_options(dev_mode(dev));
    let package = tokio::task::spawn_blocking(move || {
        sitedeploy_core::package::package_site(&options)
    })
    .await?
    .with_context(|| format!("Failed to package {}", config.source_dir().display()))?;
    print_json(&package)
}

async fn cmd_handle_deployment(config_path: &Path, event_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let event: DeploymentEvent = read_json(event_path)?;
    let registry = registry_for(&config).await?;

    let response = DeploymentHandler::new(registry).handle(&event).await;
    protocol::respond(&reqwest::Client::new(), &event, &response).await;
    print_json(&response)
}

/// Send the final response, or persist the token for the next invocation.
async fn finish_invalidation(
    event: &InvalidationEvent,
    outcome: HandlerOutcome,
    token_out: Option<&Path>,
) -> Result<()> {
    match outcome {
        HandlerOutcome::Complete(response) => {
            protocol::respond(&reqwest::Client::new(), event, &response).await;
            print_json(&response)
        }
        HandlerOutcome::Suspended(token) => {
            info!(
                pending = token.invalidation_ids.len(),
                deadline = %token.deadline,
                "invalidation wait suspended"
            );
            match token_out {
                Some(path) => {
                    let body = serde_json::to_vec_pretty(&token)?;
                    std::fs::write(path, body)
                        .with_context(|| format!("Failed to write token {}", path.display()))?;
                    println!("{}", path.display());
                    Ok(())
                }
                None => print_json(&token),
            }
        }
    }
}

async fn cmd_handle_invalidation(
    config_path: &Path,
    event_path: &Path,
    token_out: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let event: InvalidationEvent = read_json(event_path)?;
    let orchestrator = InvalidationOrchestrator::new(
        require_cdn_client(&config)?,
        config.waiter_config(),
    );

    let outcome = orchestrator.handle(&event).await;
    finish_invalidation(&event, outcome, token_out).await
}

async fn cmd_resume_invalidation(
    config_path: &Path,
    token_path: &Path,
    token_out: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let token: ResumeToken = read_json(token_path)?;
    let event = token.request.clone();
    let orchestrator = InvalidationOrchestrator::new(
        require_cdn_client(&config)?,
        config.waiter_config(),
    );

    let outcome = orchestrator.resume(token).await;
    finish_invalidation(&event, outcome, token_out).await
}

async fn cmd_deploy(config_path: &Path, dev: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = registry_for(&config).await?;
    let cdn = cdn_client(&config)?;

    let driver = LocalDriver::new(config, registry, cdn);
    let outcome = driver.deploy(dev_mode(dev)).await.context("Deploy failed")?;
    print_json(&outcome)
}

async fn cmd_destroy(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = registry_for(&config).await?;

    let driver = LocalDriver::new(config, registry, None);
    if driver.destroy().await.context("Destroy failed")? {
        println!("Deployment removed");
    } else {
        println!("Nothing deployed");
    }
    Ok(())
}
