use anyhow::Result;

use crate::cli::{Cli, ConfigCommand};
use crate::commands::resolve_config;
use crate::config::Config;

pub fn run(cli: &Cli, cmd: &ConfigCommand) -> Result<()> {
	match cmd {
		ConfigCommand::Show => show(cli),
		ConfigCommand::Init => init(),
		ConfigCommand::SetCallback { url } => set_callback(url.as_deref()),
	}
}

fn show(cli: &Cli) -> Result<()> {
	let config = resolve_config(cli)?;
	let flow = match &config.signer.callback_url {
		Some(url) => format!("redirect -> {url}"),
		None => "popup".into(),
	};

	println!("Config ({})", Config::path()?.display());
	println!("  API:       {}", config.api.base_url);
	println!("  Web:       {}", config.web.base_url);
	println!("  Trusted:   *{}*", config.web.trusted_origin);
	println!("  Loopback:  {}", if config.web.allow_loopback { "allowed" } else { "denied" });
	println!("  Flow:      {flow}");
	println!("  Browser:   {}", config.signer.browser);
	println!("  Listener:  {}", config.signer.listen);
	Ok(())
}

fn init() -> Result<()> {
	let path = Config::path()?;
	if path.exists() {
		anyhow::bail!("{} already exists", path.display());
	}
	Config::default().save()?;
	println!("Wrote {}", path.display());
	Ok(())
}

fn set_callback(url: Option<&str>) -> Result<()> {
	if let Some(url) = url {
		url::Url::parse(url).map_err(|e| anyhow::anyhow!("invalid callback URL: {e}"))?;
	}

	let mut config = Config::load()?;
	config.signer.callback_url = url.map(str::to_owned);
	config.save()?;
	match url {
		Some(url) => println!("Redirect flow enabled, returning to: {url}"),
		None => println!("Callback cleared; using the popup flow."),
	}
	Ok(())
}
