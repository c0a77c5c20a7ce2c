//! Record headers
//!
//! Brokers carry headers as opaque key/value pairs, so every value is stored
//! as a string and the numeric ones are parsed on read. A value that fails to
//! parse reads as absent.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Message identity, assigned once at first publish.
pub const ID: &str = "id";
/// First-publish time, epoch seconds.
pub const TIMESTAMP: &str = "timestamp";
/// Redelivery counter, starts at 0 and only grows on release.
pub const ATTEMPTS: &str = "attempts";
pub const RELEASED_AT: &str = "released_at";
/// Epoch seconds before which the record must not be handed out.
pub const DELAY_UNTIL: &str = "delay_until";
pub const ORIGINAL_TOPIC: &str = "original_topic";
pub const FAILED_AT: &str = "failed_at";
pub const FAILURE_REASON: &str = "failure_reason";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Display) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn with(mut self, key: &str, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Copies every entry of `other` over `self`.
    pub fn extend(&mut self, other: Headers) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.get(ID)
    }

    /// Defaults to 0 when the header is missing or unreadable.
    pub fn attempts(&self) -> u32 {
        self.get_i64(ATTEMPTS)
            .map(|n| n.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(0)
    }

    pub fn delay_until(&self) -> Option<i64> {
        self.get_i64(DELAY_UNTIL)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
