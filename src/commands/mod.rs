pub mod config;
pub mod sign;

use anyhow::Result;

use crate::cli::Cli;
use crate::config::Config;

/// Load the config file and apply global CLI overrides on top.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
	let mut config = Config::load()?;
	if let Some(url) = &cli.api_url {
		config.api.base_url = url.clone();
	}
	if let Some(url) = &cli.web_url {
		config.web.base_url = url.clone();
	}
	Ok(config)
}
