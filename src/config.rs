use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_REQUEST_TIMEOUT;
use crate::channel::OriginPolicy;
use crate::coordinator::SignerOptions;
use crate::surface::Viewport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub api: ApiConfig,
	pub web: WebConfig,
	pub signer: SignerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
	pub base_url: String,
	/// Per-attempt limit for a submission.
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
	/// Sent with every submission, underneath the auth headers.
	#[serde(default)]
	pub default_headers: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
	DEFAULT_REQUEST_TIMEOUT.as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
	pub base_url: String,
	/// Substring that identifies a trusted approval-page origin.
	pub trusted_origin: String,
	pub allow_loopback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
	/// When set, signing uses the redirect flow.
	pub callback_url: Option<String>,
	pub poll_interval_ms: u64,
	pub popup_width: u32,
	pub popup_height: u32,
	pub viewport_width: u32,
	pub viewport_height: u32,
	/// Chromium-compatible browser used for approval windows.
	pub browser: String,
	/// Address of the loopback callback listener.
	pub listen: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			api: ApiConfig {
				base_url: "https://krypteo.corexchain.io/service".into(),
				timeout_secs: default_timeout_secs(),
				default_headers: BTreeMap::new(),
			},
			web: WebConfig {
				base_url: "https://krypteo.corexchain.io".into(),
				trusted_origin: "krypteo.corexchain".into(),
				allow_loopback: true,
			},
			signer: SignerConfig {
				callback_url: None,
				poll_interval_ms: 500,
				popup_width: 400,
				popup_height: 400,
				viewport_width: 1280,
				viewport_height: 800,
				browser: "chromium".into(),
				listen: "127.0.0.1:8765".into(),
			},
		}
	}
}

impl Config {
	/// Directory where CLI state is stored (~/.txsign/).
	pub fn dir() -> anyhow::Result<PathBuf> {
		dirs::home_dir()
			.map(|home| home.join(".txsign"))
			.ok_or_else(|| anyhow!("could not determine home directory"))
	}

	/// Path to the config file.
	pub fn path() -> anyhow::Result<PathBuf> {
		Ok(Self::dir()?.join("config.toml"))
	}

	/// Load config from disk, falling back to defaults if no file exists.
	pub fn load() -> anyhow::Result<Self> {
		let path = Self::path()?;
		if path.exists() {
			let content = std::fs::read_to_string(&path)?;
			Ok(toml::from_str(&content)?)
		} else {
			Ok(Self::default())
		}
	}

	/// Persist the current config to disk, creating the directory if needed.
	pub fn save(&self) -> anyhow::Result<()> {
		let path = Self::path()?;
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&path, toml::to_string_pretty(self)?)?;
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.api.timeout_secs)
	}

	pub fn origin_policy(&self) -> OriginPolicy {
		OriginPolicy {
			trusted_fragment: self.web.trusted_origin.clone(),
			allow_loopback: self.web.allow_loopback,
		}
	}

	/// Coordinator settings derived from this config.
	pub fn signer_options(&self) -> SignerOptions {
		let mut options = SignerOptions::new(self.web.base_url.clone(), self.origin_policy());
		options.callback_url = self.signer.callback_url.clone();
		options.poll_interval = Duration::from_millis(self.signer.poll_interval_ms);
		options.popup_width = self.signer.popup_width;
		options.popup_height = self.signer.popup_height;
		options.viewport = Viewport {
			width: self.signer.viewport_width,
			height: self.signer.viewport_height,
		};
		options
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coordinator::SigningMode;

	#[test]
	fn defaults_are_sensible() {
		let c = Config::default();
		assert_eq!(c.web.trusted_origin, "krypteo.corexchain");
		assert!(c.web.allow_loopback);
		assert_eq!(c.signer.poll_interval_ms, 500);
		assert!(c.signer.callback_url.is_none());
		assert!(c.api.default_headers.is_empty());
		assert_eq!(c.request_timeout(), Duration::from_secs(30));
	}

	#[test]
	fn older_files_without_a_timeout_still_load() {
		let mut c = Config::default();
		c.api.timeout_secs = 5;
		let serialized = toml::to_string_pretty(&c)
			.unwrap()
			.replace("timeout_secs = 5\n", "");
		let parsed: Config = toml::from_str(&serialized).unwrap();
		assert_eq!(parsed.api.timeout_secs, 30);
	}

	#[test]
	fn toml_roundtrip() {
		let mut c = Config::default();
		c.signer.callback_url = Some("https://dapp.example.com/signed".into());
		c.api
			.default_headers
			.insert("X-Client".into(), "txsign/0.1".into());

		let serialized = toml::to_string_pretty(&c).unwrap();
		let parsed: Config = toml::from_str(&serialized).unwrap();

		assert_eq!(
			parsed.signer.callback_url.as_deref(),
			Some("https://dapp.example.com/signed")
		);
		assert_eq!(parsed.api.default_headers["X-Client"], "txsign/0.1");
	}

	#[test]
	fn callback_url_selects_redirect_flow() {
		let mut c = Config::default();
		assert_eq!(
			SigningMode::from_callback(c.signer_options().callback_url.as_deref()),
			SigningMode::Modal
		);

		c.signer.callback_url = Some("https://dapp.example.com/signed".into());
		let options = c.signer_options();
		assert_eq!(
			SigningMode::from_callback(options.callback_url.as_deref()),
			SigningMode::Redirect {
				callback_url: "https://dapp.example.com/signed".into()
			}
		);
		assert_eq!(options.poll_interval, Duration::from_millis(500));
		assert_eq!(options.viewport, Viewport { width: 1280, height: 800 });
	}
}
