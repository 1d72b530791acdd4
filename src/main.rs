//! CodeFRAME CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use codeframe_core::cli::commands::{dispatch, open_default_handle};
use codeframe_core::cli::Cli;
use codeframe_core::infrastructure::config::ConfigLoader;
use codeframe_core::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config)).context("failed to initialize logger")?;
    let handle = open_default_handle(config).await.context("failed to open core handle")?;

    dispatch(&handle, cli.command, cli.json).await
}
