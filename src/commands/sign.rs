use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::warn;
use serde_json::Value;

use crate::api::HttpTransactionApi;
use crate::callback::CallbackListener;
use crate::cli::Cli;
use crate::commands::resolve_config;
use crate::coordinator::{Coordinator, SigningMode};
use crate::error::SignerError;
use crate::surface::browser::BrowserSurface;
use crate::transaction::Transaction;

/// Submit -> open the approval window -> wait for the result (or hand off
/// to the browser in the redirect flow).
pub async fn run(
	cli: &Cli,
	transaction: &Path,
	token: &str,
	callback_url: Option<&str>,
	browser: Option<&str>,
) -> Result<()> {
	let mut config = resolve_config(cli)?;
	if let Some(url) = callback_url {
		config.signer.callback_url = Some(url.to_owned());
	}
	if let Some(browser) = browser {
		config.signer.browser = browser.to_owned();
	}

	let tx = read_transaction(transaction)?;
	let api = HttpTransactionApi::new(
		&config.api.base_url,
		&config.api.default_headers,
		config.request_timeout(),
	)?;
	let surface = BrowserSurface::new(config.signer.browser.clone());
	let coordinator = Coordinator::new(Arc::new(api), Arc::new(surface), config.signer_options());

	let mode = coordinator.mode();
	// Only the popup flow gets a result back in-process.
	let _listener = match mode {
		SigningMode::Modal => {
			Some(CallbackListener::start(&config.signer.listen, coordinator.channel()).await?)
		}
		SigningMode::Redirect { .. } => None,
	};

	println!("Submitting transaction...");
	let outcome = until_interrupted(
		coordinator.sign(&tx, token),
		tokio::signal::ctrl_c(),
		|| {
			coordinator.cancel();
		},
	)
	.await;

	match (outcome, mode) {
		(Ok(_), SigningMode::Redirect { callback_url }) => {
			println!("Approval continues in the browser.");
			println!("The result will be delivered to: {callback_url}");
			Ok(())
		}
		(Ok(Value::String(s)), SigningMode::Modal) if s.is_empty() => {
			println!("A signing request is already in progress.");
			Ok(())
		}
		(Ok(result), SigningMode::Modal) => {
			println!("Signed.");
			match result {
				Value::String(s) => println!("{s}"),
				other => println!("{}", serde_json::to_string_pretty(&other)?),
			}
			Ok(())
		}
		(Err(SignerError::UserCancelled), _) => anyhow::bail!("signing cancelled"),
		(Err(e), _) => Err(e.into()),
	}
}

/// Drive `signing` to completion, calling `cancel` if `interrupt` fires
/// first.  An interrupt source that fails to install is logged and
/// ignored.
async fn until_interrupted<F, I>(signing: F, interrupt: I, cancel: impl FnOnce()) -> F::Output
where
	F: Future,
	I: Future<Output = std::io::Result<()>>,
{
	tokio::pin!(signing);
	tokio::select! {
		outcome = &mut signing => outcome,
		interrupted = interrupt => {
			match interrupted {
				Ok(()) => cancel(),
				Err(e) => warn!("could not listen for Ctrl-C: {e}"),
			}
			signing.await
		}
	}
}

fn read_transaction(path: &Path) -> Result<Transaction> {
	let raw = if path.as_os_str() == "-" {
		std::io::read_to_string(std::io::stdin()).context("could not read transaction from stdin")?
	} else {
		std::fs::read_to_string(path)
			.with_context(|| format!("could not read {}", path.display()))?
	};

	let value: Value = serde_json::from_str(&raw).context("transaction is not valid JSON")?;
	Transaction::from_value(value)
		.ok_or_else(|| anyhow::anyhow!("transaction must be a JSON object"))
}
