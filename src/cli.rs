use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
	name = "txsign",
	about = "Keyless transaction signing through a browser approval window.",
	version
)]
pub struct Cli {
	/// Override the transaction API base URL.
	#[arg(long, global = true)]
	pub api_url: Option<String>,

	/// Override the approval web base URL.
	#[arg(long, global = true)]
	pub web_url: Option<String>,

	/// Raise log verbosity (-v debug, -vv trace).
	#[arg(short, long, action = ArgAction::Count, global = true)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
	/// Submit a transaction and wait for the user to approve it.
	Sign {
		/// JSON file with the unsigned transaction, or `-` for stdin.
		transaction: PathBuf,

		/// Access token for the transaction API.
		#[arg(long, env = "TXSIGN_ACCESS_TOKEN", hide_env_values = true)]
		token: String,

		/// Use the redirect flow, returning the user to this URL.
		#[arg(long)]
		callback_url: Option<String>,

		/// Browser used for the approval window.
		#[arg(long)]
		browser: Option<String>,
	},

	/// Inspect or change the stored configuration.
	Config {
		#[command(subcommand)]
		command: ConfigCommand,
	},
}

// -- Config subcommands --

#[derive(Subcommand)]
pub enum ConfigCommand {
	/// Show the effective configuration.
	Show,

	/// Write the default configuration file.
	Init,

	/// Set or clear the redirect callback URL.
	SetCallback {
		/// Callback URL; omit to go back to the popup flow.
		url: Option<String>,
	},
}
