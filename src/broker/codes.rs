//! Broker status codes
//!
//! Numeric codes follow the Kafka protocol: positive values are broker-side
//! errors, negative values are client-local conditions.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrokerCode(pub i32);

impl BrokerCode {
    pub const NO_ERROR: BrokerCode = BrokerCode(0);
    pub const UNKNOWN: BrokerCode = BrokerCode(-1);
    pub const OFFSET_OUT_OF_RANGE: BrokerCode = BrokerCode(1);
    pub const UNKNOWN_TOPIC_OR_PARTITION: BrokerCode = BrokerCode(3);
    pub const MESSAGE_TOO_LARGE: BrokerCode = BrokerCode(10);
    pub const COORDINATOR_NOT_AVAILABLE: BrokerCode = BrokerCode(15);
    pub const NOT_ENOUGH_REPLICAS: BrokerCode = BrokerCode(19);
    pub const INVALID_GROUP_ID: BrokerCode = BrokerCode(24);
    pub const UNKNOWN_MEMBER_ID: BrokerCode = BrokerCode(25);
    pub const TRANSPORT: BrokerCode = BrokerCode(-195);
    pub const PARTITION_EOF: BrokerCode = BrokerCode(-191);
    pub const TIMED_OUT: BrokerCode = BrokerCode(-185);
    pub const AUTHENTICATION: BrokerCode = BrokerCode(-169);

    pub fn is_success(self) -> bool {
        self == Self::NO_ERROR
    }

    /// Human-readable cause for a status code.
    pub fn describe(self) -> String {
        let text = match self {
            Self::NO_ERROR => "success",
            Self::TRANSPORT => "broker transport failure (connection refused or lost)",
            Self::AUTHENTICATION => "authentication failed",
            Self::TIMED_OUT => "operation timed out",
            Self::PARTITION_EOF => "reached end of partition",
            Self::UNKNOWN_TOPIC_OR_PARTITION => "unknown topic or partition",
            Self::NOT_ENOUGH_REPLICAS => "not enough in-sync replicas",
            Self::MESSAGE_TOO_LARGE => "message size too large",
            Self::OFFSET_OUT_OF_RANGE => "offset out of range",
            Self::UNKNOWN_MEMBER_ID => "unknown consumer group member",
            Self::COORDINATOR_NOT_AVAILABLE => "group coordinator not available",
            Self::INVALID_GROUP_ID => "invalid group id",
            Self::UNKNOWN => "unknown broker error",
            BrokerCode(code) => return format!("unknown broker error code: {code}"),
        };
        text.to_string()
    }
}

impl fmt::Display for BrokerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A code plus whatever text the broker attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatus {
    pub code: BrokerCode,
    pub message: String,
}

impl BrokerStatus {
    pub fn new(code: BrokerCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status whose text is the classification of its code.
    pub fn from_code(code: BrokerCode) -> Self {
        Self::new(code, code.describe())
    }
}

impl fmt::Display for BrokerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
