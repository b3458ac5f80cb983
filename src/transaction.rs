use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// An unsigned transaction.  Only the backend-assigned `id` is
/// interpreted here; every chain-specific field is carried verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
	#[serde(
		default,
		deserialize_with = "id_from_string_or_number",
		skip_serializing_if = "Option::is_none"
	)]
	pub id: Option<String>,

	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

impl Transaction {
	/// Wrap an arbitrary JSON object as a transaction.  Non-object values
	/// are rejected.
	pub fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::Object(_) => serde_json::from_value(value).ok(),
			_ => None,
		}
	}
}

// Some backends hand out numeric ids.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Ok(Some(s)),
		Some(Value::Number(n)) => Ok(Some(n.to_string())),
		Some(other) => Err(de::Error::custom(format!("invalid transaction id: {other}"))),
	}
}

/// The backend's view of a transaction after it has been accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTransactionRecord {
	pub transaction: Transaction,
}

impl PersistedTransactionRecord {
	/// The identifier the approval surface is addressed by.
	pub fn id(&self) -> Option<&str> {
		self.transaction.id.as_deref()
	}
}

/// Request body for the submission endpoint: `{ "transaction": ... }`.
#[derive(Debug, Serialize)]
pub(crate) struct SubmitBody<'a> {
	pub transaction: &'a Transaction,
}
