//! `zdte config`: dump the configuration the other commands would use.

use anyhow::{Context, Result};
use clap::Args;
use zdte_core::config_loader::DEFAULT_CONFIG_PATH;
use zdte_core::ConfigLoader;

#[derive(Args, Debug)]
pub struct ShowConfigArgs {
    /// Config file path (missing file falls back to defaults + env)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub path: String,
}

pub fn run(args: &ShowConfigArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.path)?;
    let json = serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{json}");
    Ok(())
}
