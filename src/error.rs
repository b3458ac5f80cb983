use serde_json::Value;
use thiserror::Error;

/// Every way a signing request can end other than success.
#[derive(Debug, Error)]
pub enum SignerError {
	/// The backend refused or never accepted the transaction, even after
	/// the full attempt budget.
	#[error("transaction submission failed: {0}")]
	Transport(String),

	/// The user closed the approval surface (or the request was abandoned)
	/// before any result arrived.
	#[error("user cancelled the signing request")]
	UserCancelled,

	/// The approval surface reported its own error; carried verbatim.
	#[error("approval surface returned an error: {0}")]
	Delegated(Value),

	/// The approval surface could not be opened or navigated to.
	#[error("approval surface unavailable: {0}")]
	Surface(String),
}

impl SignerError {
	pub fn is_user_cancelled(&self) -> bool {
		matches!(self, Self::UserCancelled)
	}
}

pub type Result<T> = std::result::Result<T, SignerError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancellation_is_distinguishable() {
		assert!(SignerError::UserCancelled.is_user_cancelled());
		assert!(!SignerError::Transport("boom".into()).is_user_cancelled());
		assert!(!SignerError::Delegated(Value::String("declined".into())).is_user_cancelled());
	}

	#[test]
	fn delegated_error_keeps_payload() {
		let err = SignerError::Delegated(serde_json::json!({ "code": 4001 }));
		assert_eq!(err.to_string(), r#"approval surface returned an error: {"code":4001}"#);
	}
}
