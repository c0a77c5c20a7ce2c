use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration settings for the application.
///
/// Includes the queue connection map, the bundled broker, the worker loop
/// and logging.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub queue: QueueSettings,
    pub broker: BrokerSettings,
    pub worker: WorkerSettings,
    pub logging: LoggingSettings,
}

/// Connection, delivery and retry settings for one queue connection.
///
/// `bootstrap_servers` and `group_id` have no defaults; the connection
/// builder refuses to start without them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct QueueSettings {
    pub bootstrap_servers: Option<String>,
    pub group_id: Option<String>,
    pub client_id: String,
    pub default_topic: String,
    pub dead_letter_queue: Option<String>,

    pub security_protocol: SecurityProtocol,
    pub sasl_mechanisms: String,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<Secret>,
    pub ssl_ca_location: Option<String>,
    pub ssl_certificate_location: Option<String>,
    pub ssl_key_location: Option<String>,
    pub ssl_ca_pem: Option<String>,
    pub ssl_certificate_pem: Option<String>,
    pub ssl_key_pem: Option<Secret>,
    pub ssl_verify_hostname: bool,

    pub message_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub delivery_timeout_ms: u64,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub consume_timeout_ms: u64,
    pub flush_timeout_ms: u64,
    pub dead_letter_timeout_ms: u64,

    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub batch_size: u64,
    pub linger_ms: u64,
    pub compression_type: Compression,
    pub acks: Acks,
    pub enable_idempotence: bool,
    pub max_in_flight: u32,

    pub auto_offset_reset: OffsetReset,
    pub enable_auto_commit: bool,
    pub enable_partition_eof: bool,
    pub fetch_wait_max_ms: u64,
    pub fetch_min_bytes: u64,

    pub max_attempts: u32,
    /// Seconds to back off after a transport failure while polling.
    pub sleep_on_error: u64,
}

impl QueueSettings {
    pub fn consume_timeout(&self) -> Duration {
        Duration::from_millis(self.consume_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn dead_letter_timeout(&self) -> Duration {
        Duration::from_millis(self.dead_letter_timeout_ms)
    }

    pub fn sleep_on_error(&self) -> Duration {
        Duration::from_secs(self.sleep_on_error)
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            bootstrap_servers: None,
            group_id: None,
            client_id: "popqueue-client".to_string(),
            default_topic: "default".to_string(),
            dead_letter_queue: None,

            security_protocol: SecurityProtocol::Plaintext,
            sasl_mechanisms: "PLAIN".to_string(),
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            ssl_certificate_location: None,
            ssl_key_location: None,
            ssl_ca_pem: None,
            ssl_certificate_pem: None,
            ssl_key_pem: None,
            ssl_verify_hostname: true,

            message_timeout_ms: 300_000,
            request_timeout_ms: 30_000,
            delivery_timeout_ms: 300_000,
            session_timeout_ms: 30_000,
            heartbeat_interval_ms: 3_000,
            consume_timeout_ms: 3_000,
            flush_timeout_ms: 10_000,
            dead_letter_timeout_ms: 1_000,

            retries: 2_147_483_647,
            retry_backoff_ms: 100,
            batch_size: 16_384,
            linger_ms: 5,
            compression_type: Compression::None,
            acks: Acks::All,
            enable_idempotence: true,
            max_in_flight: 5,

            auto_offset_reset: OffsetReset::Earliest,
            enable_auto_commit: true,
            enable_partition_eof: false,
            fetch_wait_max_ms: 500,
            fetch_min_bytes: 1,

            max_attempts: 3,
            sleep_on_error: 5,
        }
    }
}

/// Settings for the bundled local log broker.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerSettings {
    /// sled directory; the log stays in memory when unset.
    pub data_dir: Option<String>,
    pub partitions: u32,
    pub max_message_bytes: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            partitions: 1,
            max_message_bytes: 1_048_576,
        }
    }
}

/// Worker loop limits. Zero means unbounded for `max_jobs` and `max_time`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WorkerSettings {
    pub sleep: u64,
    pub max_jobs: u64,
    pub max_time: u64,
    pub stop_when_empty: bool,
    pub backoff: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            sleep: 3,
            max_jobs: 0,
            max_time: 0,
            stop_when_empty: false,
            backoff: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Sections that are missing entirely fall back to their defaults; fields
/// missing inside a present section fall back through `#[serde(default)]`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub queue: Option<QueueSettings>,
    pub broker: Option<BrokerSettings>,
    pub worker: Option<WorkerSettings>,
    pub logging: Option<LoggingSettings>,
}

impl PartialSettings {
    pub fn merge(self, default: Settings) -> Settings {
        Settings {
            queue: self.queue.unwrap_or(default.queue),
            broker: self.broker.unwrap_or(default.broker),
            worker: self.worker.unwrap_or(default.worker),
            logging: self.logging.unwrap_or(default.logging),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    #[serde(alias = "plaintext")]
    Plaintext,
    #[serde(alias = "ssl")]
    Ssl,
    #[serde(alias = "sasl_plaintext")]
    SaslPlaintext,
    #[serde(alias = "sasl_ssl")]
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }

    pub fn uses_sasl(self) -> bool {
        matches!(
            self,
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
        )
    }

    pub fn uses_tls(self) -> bool {
        matches!(self, SecurityProtocol::Ssl | SecurityProtocol::SaslSsl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Earliest,
    Latest,
}

impl OffsetReset {
    pub fn as_str(self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

/// Producer acknowledgment mode. Accepts `0`, `1` and `all` (also `-1`),
/// either as text or as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "AcksValue")]
pub enum Acks {
    None,
    Leader,
    All,
}

impl Acks {
    pub fn as_str(self) -> &'static str {
        match self {
            Acks::None => "0",
            Acks::Leader => "1",
            Acks::All => "all",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AcksValue {
    Number(i64),
    Text(String),
}

impl TryFrom<AcksValue> for Acks {
    type Error = String;

    fn try_from(value: AcksValue) -> Result<Self, Self::Error> {
        let text = match value {
            AcksValue::Number(n) => n.to_string(),
            AcksValue::Text(t) => t.trim().to_ascii_lowercase(),
        };
        match text.as_str() {
            "0" => Ok(Acks::None),
            "1" => Ok(Acks::Leader),
            "all" | "-1" => Ok(Acks::All),
            other => Err(format!("invalid acks value `{other}`, expected 0, 1 or all")),
        }
    }
}

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
