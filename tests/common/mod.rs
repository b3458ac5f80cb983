//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;
use txsign::api::TransactionApi;
use txsign::channel::OriginPolicy;
use txsign::coordinator::{Coordinator, RequestState, SignerOptions};
use txsign::error::{Result, SignerError};
use txsign::surface::{ApprovalSurface, SurfaceHandle, WindowGeometry};
use txsign::transaction::{PersistedTransactionRecord, Transaction};
use url::Url;

pub const WEB_BASE: &str = "https://wallet.example.com";
pub const TRUSTED: &str = "https://wallet.example.com";

/// Backend double: assigns `id` or fails every call, optionally holding
/// each call until released.
pub struct FakeApi {
	pub id: String,
	pub fail: bool,
	pub calls: AtomicU32,
	pub gate: Option<Arc<Notify>>,
}

impl FakeApi {
	pub fn accepting(id: &str) -> Self {
		Self {
			id: id.into(),
			fail: false,
			calls: AtomicU32::new(0),
			gate: None,
		}
	}

	pub fn failing() -> Self {
		Self {
			fail: true,
			..Self::accepting("unused")
		}
	}

	pub fn gated(id: &str, gate: Arc<Notify>) -> Self {
		Self {
			gate: Some(gate),
			..Self::accepting(id)
		}
	}
}

#[async_trait::async_trait]
impl TransactionApi for FakeApi {
	async fn submit(
		&self,
		transaction: &Transaction,
		_access_token: &str,
	) -> Result<PersistedTransactionRecord> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if let Some(gate) = &self.gate {
			gate.notified().await;
		}
		if self.fail {
			return Err(SignerError::Transport("backend returned 503".into()));
		}
		let mut persisted = transaction.clone();
		persisted.id = Some(self.id.clone());
		Ok(PersistedTransactionRecord {
			transaction: persisted,
		})
	}
}

/// Approval-surface double.  Windows stay open until the test "closes"
/// them as the user would.
#[derive(Default)]
pub struct FakeSurface {
	pub opened: Mutex<Vec<(String, WindowGeometry)>>,
	pub open_windows: Mutex<HashSet<u64>>,
	pub closed: Mutex<Vec<u64>>,
	pub focused: AtomicU32,
	pub navigated: Mutex<Vec<String>>,
	pub refuse_open: bool,
	pub next: AtomicU64,
}

impl FakeSurface {
	pub fn user_closes_everything(&self) {
		self.open_windows.lock().unwrap().clear();
	}

	pub fn opened_urls(&self) -> Vec<String> {
		self.opened.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
	}

	pub fn any_open(&self) -> bool {
		!self.open_windows.lock().unwrap().is_empty()
	}
}

impl ApprovalSurface for FakeSurface {
	fn open(&self, url: &Url, geometry: WindowGeometry) -> Result<SurfaceHandle> {
		if self.refuse_open {
			return Err(SignerError::Surface("popup blocked".into()));
		}
		let id = self.next.fetch_add(1, Ordering::SeqCst);
		self.opened.lock().unwrap().push((url.to_string(), geometry));
		self.open_windows.lock().unwrap().insert(id);
		Ok(SurfaceHandle(id))
	}

	fn is_open(&self, handle: SurfaceHandle) -> bool {
		self.open_windows.lock().unwrap().contains(&handle.0)
	}

	fn focus(&self, _handle: SurfaceHandle) {
		self.focused.fetch_add(1, Ordering::SeqCst);
	}

	fn close(&self, handle: SurfaceHandle) {
		self.open_windows.lock().unwrap().remove(&handle.0);
		self.closed.lock().unwrap().push(handle.0);
	}

	fn navigate(&self, url: &Url) -> Result<()> {
		self.navigated.lock().unwrap().push(url.to_string());
		Ok(())
	}
}

pub fn options() -> SignerOptions {
	let mut options = SignerOptions::new(
		WEB_BASE,
		OriginPolicy {
			trusted_fragment: "wallet.example".into(),
			allow_loopback: false,
		},
	);
	options.poll_interval = Duration::from_millis(20);
	options
}

pub fn coordinator(api: FakeApi, surface: Arc<FakeSurface>) -> Arc<Coordinator> {
	Arc::new(Coordinator::new(Arc::new(api), surface, options()))
}

pub fn transaction() -> Transaction {
	Transaction::from_value(json!({ "amount": 1 })).unwrap()
}

/// Poll until the coordinator reaches `state`, panicking after a second.
pub async fn wait_for(coordinator: &Coordinator, state: RequestState) {
	tokio::time::timeout(Duration::from_secs(1), async {
		while coordinator.state() != state {
			tokio::time::sleep(Duration::from_millis(2)).await;
		}
	})
	.await
	.unwrap_or_else(|_| panic!("coordinator never reached {state:?}"));
}
