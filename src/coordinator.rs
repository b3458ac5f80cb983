//! The signing-request state machine.
//!
//! One coordinator owns one request slot.  A request moves
//! `Idle -> Submitting -> AwaitingApproval` and is settled exactly once,
//! by whichever comes first: a screened result message, detected closure
//! of the approval surface, a submission failure, or [`Coordinator::cancel`].
//! Settling empties the slot before the caller is woken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::TransactionApi;
use crate::channel::{OriginPolicy, ResultChannel};
use crate::error::{Result, SignerError};
use crate::surface::{self, ApprovalSurface, SurfaceHandle, Viewport, WindowGeometry};
use crate::transaction::{PersistedTransactionRecord, Transaction};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_POPUP_SIZE: u32 = 400;

/// How a `sign` call reaches the approval surface.  Decided once per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningMode {
	/// Supervised popup; the result comes back over the result channel.
	Modal,
	/// Hand the whole flow to the approval page, which later sends the
	/// user to `callback_url`.  Nothing comes back in-process.
	Redirect { callback_url: String },
}

impl SigningMode {
	pub fn from_callback(callback_url: Option<&str>) -> Self {
		match callback_url {
			Some(url) if !url.is_empty() => Self::Redirect {
				callback_url: url.to_owned(),
			},
			_ => Self::Modal,
		}
	}
}

/// Observable state of the request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
	Idle,
	Submitting,
	AwaitingApproval,
}

#[derive(Debug, Clone)]
pub struct SignerOptions {
	pub web_base_url: String,
	pub callback_url: Option<String>,
	pub origin_policy: OriginPolicy,
	pub poll_interval: Duration,
	pub popup_width: u32,
	pub popup_height: u32,
	pub viewport: Viewport,
}

impl SignerOptions {
	pub fn new(web_base_url: impl Into<String>, origin_policy: OriginPolicy) -> Self {
		Self {
			web_base_url: web_base_url.into(),
			callback_url: None,
			origin_policy,
			poll_interval: DEFAULT_POLL_INTERVAL,
			popup_width: DEFAULT_POPUP_SIZE,
			popup_height: DEFAULT_POPUP_SIZE,
			viewport: Viewport {
				width: 1280,
				height: 800,
			},
		}
	}
}

// -- Request slot --

struct PendingRequest {
	number: u64,
	completion: oneshot::Sender<Result<Value>>,
	surface: Option<SurfaceHandle>,
	watcher: Option<JoinHandle<()>>,
}

/// The single in-flight request, shared by the coordinator, its closure
/// watcher and its result channel.
pub(crate) struct Slot {
	pending: Mutex<Option<PendingRequest>>,
	surface: Arc<dyn ApprovalSurface>,
}

impl Slot {
	fn new(surface: Arc<dyn ApprovalSurface>) -> Self {
		Self {
			pending: Mutex::new(None),
			surface,
		}
	}

	fn lock(&self) -> MutexGuard<'_, Option<PendingRequest>> {
		self.pending.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn state(&self) -> RequestState {
		match self.lock().as_ref() {
			None => RequestState::Idle,
			Some(p) if p.surface.is_some() => RequestState::AwaitingApproval,
			Some(_) => RequestState::Submitting,
		}
	}

	fn is_current(&self, number: u64) -> bool {
		self.lock().as_ref().is_some_and(|p| p.number == number)
	}

	/// Record the open surface and its watcher on request `number`.  If
	/// that request has settled in the meantime both are torn down.
	fn attach(&self, number: u64, handle: SurfaceHandle, watcher: JoinHandle<()>) {
		let mut pending = self.lock();
		if let Some(p) = pending.as_mut().filter(|p| p.number == number) {
			p.surface = Some(handle);
			p.watcher = Some(watcher);
			return;
		}
		drop(pending);
		watcher.abort();
		self.surface.close(handle);
	}

	/// Settle whichever request is current.
	pub(crate) fn settle_current(&self, outcome: Result<Value>) -> bool {
		self.settle_where(|_| true, outcome)
	}

	/// Settle request `number` only; a no-op once it is gone.
	fn settle_request(&self, number: u64, outcome: Result<Value>) -> bool {
		self.settle_where(|p| p.number == number, outcome)
	}

	fn settle_where(&self, matches: impl FnOnce(&PendingRequest) -> bool, outcome: Result<Value>) -> bool {
		let taken = {
			let mut pending = self.lock();
			if pending.as_ref().is_some_and(matches) {
				pending.take()
			} else {
				None
			}
		};
		let Some(request) = taken else {
			return false;
		};

		if let Some(watcher) = request.watcher {
			watcher.abort();
		}
		if let Some(handle) = request.surface {
			self.surface.close(handle);
		}
		debug!(
			"request {} settled ({})",
			request.number,
			if outcome.is_ok() { "fulfilled" } else { "rejected" }
		);
		// The caller may have stopped waiting; nothing to do then.
		let _ = request.completion.send(outcome);
		true
	}
}

/// Settles its request as cancelled if the `sign` future is dropped
/// before the request ends.
struct AbandonGuard<'a> {
	slot: &'a Slot,
	number: u64,
}

impl Drop for AbandonGuard<'_> {
	fn drop(&mut self) {
		if self.slot.settle_request(self.number, Err(SignerError::UserCancelled)) {
			debug!("request {} abandoned by its caller", self.number);
		}
	}
}

fn spawn_watcher(slot: Arc<Slot>, number: u64, handle: SurfaceHandle, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// The first tick completes immediately.
		ticker.tick().await;
		loop {
			ticker.tick().await;
			if !slot.surface.is_open(handle) {
				info!("approval window closed before a result arrived");
				slot.settle_request(number, Err(SignerError::UserCancelled));
				return;
			}
		}
	})
}

// -- Coordinator --

pub struct Coordinator {
	api: Arc<dyn TransactionApi>,
	surface: Arc<dyn ApprovalSurface>,
	options: SignerOptions,
	slot: Arc<Slot>,
	channel: ResultChannel,
	next_request: AtomicU64,
}

impl Coordinator {
	pub fn new(
		api: Arc<dyn TransactionApi>,
		surface: Arc<dyn ApprovalSurface>,
		options: SignerOptions,
	) -> Self {
		let slot = Arc::new(Slot::new(surface.clone()));
		let channel = ResultChannel::new(options.origin_policy.clone(), slot.clone());
		Self {
			api,
			surface,
			options,
			slot,
			channel,
			next_request: AtomicU64::new(1),
		}
	}

	/// The result channel bound to this coordinator.  Every clone feeds the
	/// same request slot.
	pub fn channel(&self) -> ResultChannel {
		self.channel.clone()
	}

	pub fn mode(&self) -> SigningMode {
		SigningMode::from_callback(self.options.callback_url.as_deref())
	}

	pub fn state(&self) -> RequestState {
		self.slot.state()
	}

	/// Obtain approval for `transaction`.
	///
	/// Resolves with the approval surface's result in the modal flow.  The
	/// redirect flow, and a modal call made while another request is in
	/// flight, resolve with an empty string.
	pub async fn sign(&self, transaction: &Transaction, access_token: &str) -> Result<Value> {
		match self.mode() {
			SigningMode::Redirect { callback_url } => {
				self.sign_redirect(transaction, access_token, &callback_url).await
			}
			SigningMode::Modal => self.sign_modal(transaction, access_token).await,
		}
	}

	/// Settle the in-flight request as cancelled.  Returns `false` when
	/// there was nothing to cancel.
	pub fn cancel(&self) -> bool {
		self.slot.settle_current(Err(SignerError::UserCancelled))
	}

	async fn sign_redirect(
		&self,
		transaction: &Transaction,
		access_token: &str,
		callback_url: &str,
	) -> Result<Value> {
		// The redirect URL needs the backend-assigned id, so persist first.
		let record = self.api.submit(transaction, access_token).await?;
		let id = persisted_id(&record)?;
		let url = surface::redirect_url(&self.options.web_base_url, id, callback_url)?;
		info!("redirecting to the approval page for transaction {id}");
		self.surface.navigate(&url)?;
		Ok(Value::String(String::new()))
	}

	async fn sign_modal(&self, transaction: &Transaction, access_token: &str) -> Result<Value> {
		let number = self.next_request.fetch_add(1, Ordering::Relaxed);
		let (completion, done) = oneshot::channel();

		{
			let mut pending = self.slot.lock();
			if let Some(current) = pending.as_ref() {
				if let Some(handle) = current.surface.filter(|h| self.surface.is_open(*h)) {
					self.surface.focus(handle);
				}
				info!("request {} is still in flight; not starting another", current.number);
				return Ok(Value::String(String::new()));
			}
			*pending = Some(PendingRequest {
				number,
				completion,
				surface: None,
				watcher: None,
			});
		}
		let _guard = AbandonGuard {
			slot: &self.slot,
			number,
		};
		debug!("request {number} submitting");

		match self.api.submit(transaction, access_token).await {
			Ok(record) => {
				if let Err(e) = self.present(number, &record) {
					self.slot.settle_request(number, Err(e));
				}
			}
			Err(e) => {
				self.slot.settle_request(number, Err(e));
			}
		}

		done.await.unwrap_or(Err(SignerError::UserCancelled))
	}

	/// Open the approval popup for a persisted transaction and start
	/// watching it.
	fn present(&self, number: u64, record: &PersistedTransactionRecord) -> Result<()> {
		let id = persisted_id(record)?;
		let url = surface::approval_url(&self.options.web_base_url, id)?;

		if !self.slot.is_current(number) {
			debug!("request {number} settled during submission; not opening a window");
			return Ok(());
		}

		let geometry = WindowGeometry::centered(
			self.options.viewport,
			self.options.popup_width,
			self.options.popup_height,
		);
		let handle = self.surface.open(&url, geometry)?;
		info!("waiting for approval of transaction {id}");

		let watcher = spawn_watcher(self.slot.clone(), number, handle, self.options.poll_interval);
		self.slot.attach(number, handle, watcher);
		Ok(())
	}
}

fn persisted_id(record: &PersistedTransactionRecord) -> Result<&str> {
	record
		.id()
		.ok_or_else(|| SignerError::Transport("backend assigned no transaction id".into()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use url::Url;

	struct NoSurface;

	impl ApprovalSurface for NoSurface {
		fn open(&self, _url: &Url, _geometry: WindowGeometry) -> Result<SurfaceHandle> {
			Err(SignerError::Surface("headless".into()))
		}
		fn is_open(&self, _handle: SurfaceHandle) -> bool {
			false
		}
		fn focus(&self, _handle: SurfaceHandle) {}
		fn close(&self, _handle: SurfaceHandle) {}
		fn navigate(&self, _url: &Url) -> Result<()> {
			Ok(())
		}
	}

	fn reserve(slot: &Slot, number: u64) -> oneshot::Receiver<Result<Value>> {
		let (completion, done) = oneshot::channel();
		*slot.lock() = Some(PendingRequest {
			number,
			completion,
			surface: None,
			watcher: None,
		});
		done
	}

	#[test]
	fn mode_follows_callback_presence() {
		assert_eq!(SigningMode::from_callback(None), SigningMode::Modal);
		assert_eq!(SigningMode::from_callback(Some("")), SigningMode::Modal);
		assert_eq!(
			SigningMode::from_callback(Some("https://dapp.example.com/cb")),
			SigningMode::Redirect {
				callback_url: "https://dapp.example.com/cb".into()
			}
		);
	}

	#[test]
	fn second_settlement_is_a_no_op() {
		let slot = Slot::new(Arc::new(NoSurface));
		let mut done = reserve(&slot, 1);

		assert!(slot.settle_current(Ok(Value::from("first"))));
		assert!(!slot.settle_current(Ok(Value::from("second"))));
		assert!(!slot.settle_request(1, Err(SignerError::UserCancelled)));

		assert_eq!(done.try_recv().unwrap().unwrap(), Value::from("first"));
		assert_eq!(slot.state(), RequestState::Idle);
	}

	#[test]
	fn stale_request_numbers_do_not_settle_newer_requests() {
		let slot = Slot::new(Arc::new(NoSurface));
		let _done = reserve(&slot, 2);

		assert!(!slot.settle_request(1, Err(SignerError::UserCancelled)));
		assert_eq!(slot.state(), RequestState::Submitting);
	}

	#[test]
	fn settling_an_empty_slot_is_harmless() {
		let slot = Slot::new(Arc::new(NoSurface));
		assert!(!slot.settle_current(Ok(Value::Null)));
	}
}
