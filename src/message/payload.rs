//! Payload envelope
//!
//! The JSON body of every job record:
//!
//! ```json
//! {"uuid": "...", "displayName": "send_email", "job": "send_email",
//!  "data": {...}, "attempts": 0, "pushedAt": 1725000000}
//! ```
//!
//! `displayName` is the key the task registry resolves. `attempts` in the
//! body is informational only; the header value is authoritative.
//!
//! Decoding only fails on bytes that are not JSON. Missing or mistyped
//! fields fall back to empty values, and a non-object body lands in `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub uuid: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub job: Value,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub attempts: u32,
    #[serde(rename = "pushedAt", default)]
    pub pushed_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl Payload {
    pub fn new(display_name: &str, data: Value, pushed_at: i64) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            job: Value::String(display_name.to_string()),
            data,
            attempts: 0,
            pushed_at,
            delay: None,
        }
    }

    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay = Some(seconds);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(value))
    }

    fn from_value(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Self {
                    uuid: String::new(),
                    display_name: String::new(),
                    job: Value::Null,
                    data: other,
                    attempts: 0,
                    pushed_at: 0,
                    delay: None,
                };
            }
        };

        Self {
            uuid: string_field(&fields, "uuid"),
            display_name: string_field(&fields, "displayName"),
            job: fields.remove("job").unwrap_or(Value::Null),
            data: fields.remove("data").unwrap_or(Value::Null),
            attempts: fields
                .get("attempts")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            pushed_at: fields.get("pushedAt").and_then(Value::as_i64).unwrap_or(0),
            delay: fields.get("delay").and_then(Value::as_u64),
        }
    }
}

fn string_field(fields: &serde_json::Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
