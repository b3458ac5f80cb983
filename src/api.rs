use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{Result, SignerError};
use crate::transaction::{PersistedTransactionRecord, SubmitBody, Transaction};

/// Total submission attempts before the last failure is surfaced.
pub const SUBMIT_ATTEMPTS: u32 = 5;

/// Per-attempt limit on the whole request, response body included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Persists unsigned transactions with the backend so the approval
/// surface can address them by id.
#[async_trait::async_trait]
pub trait TransactionApi: Send + Sync {
	async fn submit(
		&self,
		transaction: &Transaction,
		access_token: &str,
	) -> Result<PersistedTransactionRecord>;
}

/// `POST {base}/transactions` over HTTPS with bounded retry.
pub struct HttpTransactionApi {
	url: String,
	default_headers: HeaderMap,
	http: reqwest::Client,
}

impl HttpTransactionApi {
	pub fn new(
		base_url: &str,
		default_headers: &BTreeMap<String, String>,
		timeout: Duration,
	) -> Result<Self> {
		let mut headers = HeaderMap::new();
		for (name, value) in default_headers {
			match (
				HeaderName::from_bytes(name.as_bytes()),
				HeaderValue::from_str(value),
			) {
				(Ok(n), Ok(v)) => {
					headers.insert(n, v);
				}
				_ => warn!("ignoring invalid default header {name:?}"),
			}
		}

		let http = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| SignerError::Transport(format!("could not build HTTP client: {e}")))?;

		Ok(Self {
			url: format!("{}/transactions", base_url.trim_end_matches('/')),
			default_headers: headers,
			http,
		})
	}

	/// Defaults first, then the bearer token and content type on top.
	fn headers_for(&self, access_token: &str) -> Result<HeaderMap> {
		let mut headers = self.default_headers.clone();
		let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
			.map_err(|_| SignerError::Transport("access token is not a valid header value".into()))?;
		headers.insert(AUTHORIZATION, bearer);
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		Ok(headers)
	}

	async fn attempt(
		&self,
		headers: &HeaderMap,
		body: &SubmitBody<'_>,
	) -> anyhow::Result<PersistedTransactionRecord> {
		let resp = self
			.http
			.post(&self.url)
			.headers(headers.clone())
			.json(body)
			.send()
			.await?;

		let status = resp.status();
		let text = resp.text().await?;
		if !status.is_success() {
			bail!("backend returned {status}: {text}");
		}

		let record: PersistedTransactionRecord =
			serde_json::from_str(&text).context("malformed submission response")?;
		if record.id().is_none() {
			bail!("submission response carries no transaction id");
		}
		Ok(record)
	}
}

#[async_trait::async_trait]
impl TransactionApi for HttpTransactionApi {
	async fn submit(
		&self,
		transaction: &Transaction,
		access_token: &str,
	) -> Result<PersistedTransactionRecord> {
		let headers = self.headers_for(access_token)?;
		let body = SubmitBody { transaction };

		let mut last_error = String::new();
		for attempt in 1..=SUBMIT_ATTEMPTS {
			match self.attempt(&headers, &body).await {
				Ok(record) => {
					debug!(
						"transaction persisted as {} (attempt {attempt})",
						record.id().unwrap_or_default()
					);
					return Ok(record);
				}
				Err(e) => {
					warn!("submission attempt {attempt}/{SUBMIT_ATTEMPTS} failed: {e:#}");
					last_error = format!("{e:#}");
				}
			}
		}

		Err(SignerError::Transport(last_error))
	}
}
