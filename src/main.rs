use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sheet_staging::config::StagingConfig;
use sheet_staging::service::StagingService;

/// Validate a workbook against a site's schema, print a preview, and optionally store it.
#[derive(Parser, Debug)]
struct CliArgs {
    /// Workbook to upload (.xlsx, .xlsm, .xlsb, .xls or .ods).
    pub file: PathBuf,

    /// Destination site, by name ("North Campus") or key (north_campus).
    #[clap(long)]
    pub site: Option<String>,

    /// Path to a TOML config file.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Store the staged CSV after validation.
    #[clap(long)]
    pub commit: bool,

    /// Directory for committed objects. Overrides `storage.root` from the config file.
    #[clap(long)]
    pub storage_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let mut config = StagingConfig::load(cli_args.config.as_deref())?;
    if let Some(root) = cli_args.storage_root {
        config.storage.root = Some(root);
    }
    if cli_args.commit {
        if cli_args.site.is_none() {
            bail!("--commit needs a destination: pass --site");
        }
        if config.storage.root.is_none() {
            warn!("No storage root configured, committed objects are kept in memory only");
        }
    }

    let service = StagingService::from_config(&config, config.sink())?;

    let file_name = cli_args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {:?}", cli_args.file))?
        .to_string();
    let bytes = std::fs::read(&cli_args.file)
        .with_context(|| format!("Failed to read workbook: {:?}", cli_args.file))?;

    let receipt = service
        .upload(&bytes, &file_name, cli_args.site.as_deref())
        .map_err(|e| anyhow::anyhow!(e.public_message()))
        .with_context(|| format!("Upload of {file_name} rejected"))?;

    for row in &receipt.preview {
        println!("{}", row.join("\t"));
    }
    info!(token = %receipt.token, rows = receipt.data_rows, "Upload staged");

    if let (true, Some(site)) = (cli_args.commit, cli_args.site.as_deref()) {
        let stored = service
            .commit(&receipt.token, site)
            .map_err(|e| anyhow::anyhow!(e.public_message()))
            .context("Commit failed")?;
        println!("{}", stored.key);
    } else {
        println!("token: {}", receipt.token);
    }

    Ok(())
}
