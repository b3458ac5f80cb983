use anyhow::Result;
use clap::Parser;

use txsign::cli::{Cli, Command};
use txsign::commands;

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let default_filter = match cli.verbose {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
		.init();

	match &cli.command {
		Command::Sign {
			transaction,
			token,
			callback_url,
			browser,
		} => {
			commands::sign::run(
				&cli,
				transaction,
				token,
				callback_url.as_deref(),
				browser.as_deref(),
			)
			.await
		}
		Command::Config { command } => commands::config::run(&cli, command),
	}
}
