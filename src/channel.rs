//! Inbound results from the approval surface.
//!
//! The approval page runs in a context we do not control, so every
//! message is screened (sender, origin, payload) before it may settle
//! anything.  Rejected messages are dropped quietly; they are never
//! errors.

use std::sync::Arc;

use log::debug;
use serde_json::Value;
use url::Url;

use crate::coordinator::Slot;
use crate::error::{Result, SignerError};

/// Who posted a message.  Messages echoed by the local context itself are
/// never results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
	Local,
	Remote,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
	pub origin: String,
	pub source: MessageSource,
	pub data: Option<Value>,
}

impl InboundMessage {
	pub fn remote(origin: impl Into<String>, data: Value) -> Self {
		Self {
			origin: origin.into(),
			source: MessageSource::Remote,
			data: Some(data),
		}
	}
}

/// The two shapes a result message can take.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackPayload {
	/// `{ "error": ... }` with a truthy error.
	Error(Value),
	/// `{ "result": ... }`.
	Result(Value),
}

impl CallbackPayload {
	/// Classify message data.  A truthy `error` wins over `result`; data
	/// with neither (or that is not an object) is malformed.
	pub fn from_data(data: &Value) -> Option<Self> {
		let obj = data.as_object()?;
		match (obj.get("error"), obj.get("result")) {
			(Some(err), _) if is_truthy(err) => Some(Self::Error(err.clone())),
			(_, Some(result)) => Some(Self::Result(result.clone())),
			_ => None,
		}
	}

	pub fn into_outcome(self) -> Result<Value> {
		match self {
			Self::Error(err) => Err(SignerError::Delegated(err)),
			Self::Result(result) => Ok(result),
		}
	}
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}

/// Which origins may deliver results.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
	/// Substring every trusted origin contains.  Empty trusts nothing.
	pub trusted_fragment: String,
	/// Also accept `localhost`, `127.0.0.1` and `[::1]` (development).
	pub allow_loopback: bool,
}

impl OriginPolicy {
	pub fn accepts(&self, origin: &str) -> bool {
		if !self.trusted_fragment.is_empty() && origin.contains(&self.trusted_fragment) {
			return true;
		}
		self.allow_loopback && is_loopback(origin)
	}
}

fn is_loopback(origin: &str) -> bool {
	Url::parse(origin)
		.ok()
		.and_then(|u| u.host_str().map(str::to_owned))
		.is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
}

/// The single listener shared by every request of one coordinator.  It
/// holds no request of its own: accepted messages settle whichever
/// request is current at delivery time.
#[derive(Clone)]
pub struct ResultChannel {
	policy: Arc<OriginPolicy>,
	slot: Arc<Slot>,
}

impl ResultChannel {
	pub(crate) fn new(policy: OriginPolicy, slot: Arc<Slot>) -> Self {
		Self {
			policy: Arc::new(policy),
			slot,
		}
	}

	/// Apply the sender, origin and payload filters.
	pub fn screen(&self, message: &InboundMessage) -> Option<CallbackPayload> {
		if message.source == MessageSource::Local {
			debug!("dropping message posted by the local context");
			return None;
		}
		if !self.policy.accepts(&message.origin) {
			debug!("dropping message from untrusted origin {:?}", message.origin);
			return None;
		}
		let Some(data) = message.data.as_ref().filter(|d| !d.is_null()) else {
			debug!("dropping empty message from {}", message.origin);
			return None;
		};
		let payload = CallbackPayload::from_data(data);
		if payload.is_none() {
			debug!("dropping malformed message from {}", message.origin);
		}
		payload
	}

	/// Screen `message` and, if it passes, settle the current request with
	/// it.  Returns whether a request was settled.
	pub fn deliver(&self, message: InboundMessage) -> bool {
		match self.screen(&message) {
			Some(payload) => self.slot.settle_current(payload.into_outcome()),
			None => false,
		}
	}
}
