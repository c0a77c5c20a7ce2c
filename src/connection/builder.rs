use std::sync::Arc;

use crate::broker::ClientConfig;
use crate::config::{Acks, QueueSettings, SecurityProtocol};
use crate::connection::Connection;
use crate::connection::certs::CertificateFiles;
use crate::utils::error::{QueueError, Result};

/// Highest in-flight request count the broker client allows for an
/// idempotent producer.
const MAX_IDEMPOTENT_IN_FLIGHT: u32 = 5;

/// Turns `QueueSettings` into the producer and consumer client
/// configurations, after checking that the settings are usable.
pub fn build(settings: &QueueSettings) -> Result<Connection> {
    validate(settings)?;

    let certificates = CertificateFiles::materialize(settings)?;
    let common = common_config(settings, &certificates);

    let mut producer = common.clone();
    producer
        .set("message.timeout.ms", settings.message_timeout_ms)
        .set("request.timeout.ms", settings.request_timeout_ms)
        .set("delivery.timeout.ms", settings.delivery_timeout_ms)
        .set("retries", settings.retries)
        .set("retry.backoff.ms", settings.retry_backoff_ms)
        .set("batch.size", settings.batch_size)
        .set("linger.ms", settings.linger_ms)
        .set("compression.type", settings.compression_type.as_str())
        .set("acks", settings.acks.as_str())
        .set("enable.idempotence", settings.enable_idempotence)
        .set(
            "max.in.flight.requests.per.connection",
            settings.max_in_flight,
        );

    let mut consumer = common;
    consumer
        .set("group.id", required(&settings.group_id, "group_id")?)
        .set("auto.offset.reset", settings.auto_offset_reset.as_str())
        .set("enable.auto.commit", settings.enable_auto_commit)
        .set("enable.auto.offset.store", false)
        .set("enable.partition.eof", settings.enable_partition_eof)
        .set("session.timeout.ms", settings.session_timeout_ms)
        .set("heartbeat.interval.ms", settings.heartbeat_interval_ms)
        .set("fetch.wait.max.ms", settings.fetch_wait_max_ms)
        .set("fetch.min.bytes", settings.fetch_min_bytes);

    Ok(Connection {
        producer,
        consumer,
        certificates: Arc::new(certificates),
    })
}

/// Rejects settings the broker client would refuse or misuse.
pub fn validate(settings: &QueueSettings) -> Result<()> {
    required(&settings.bootstrap_servers, "bootstrap_servers")?;
    required(&settings.group_id, "group_id")?;

    if settings.security_protocol != SecurityProtocol::Plaintext {
        let has_username = settings
            .sasl_username
            .as_deref()
            .is_some_and(|u| !u.is_empty());
        let has_password = settings
            .sasl_password
            .as_ref()
            .is_some_and(|p| !p.expose().is_empty());
        if !has_username || !has_password {
            return Err(QueueError::ConfigurationInvalid(
                "SASL credentials required for non-PLAINTEXT security protocol".to_string(),
            ));
        }
    }

    if settings.enable_idempotence {
        if settings.acks != Acks::All {
            return Err(QueueError::ConfigurationInvalid(format!(
                "enable_idempotence requires acks=all, got acks={}",
                settings.acks.as_str()
            )));
        }
        if settings.max_in_flight > MAX_IDEMPOTENT_IN_FLIGHT {
            return Err(QueueError::ConfigurationInvalid(format!(
                "enable_idempotence requires max_in_flight <= {MAX_IDEMPOTENT_IN_FLIGHT}, got {}",
                settings.max_in_flight
            )));
        }
    }

    Ok(())
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(QueueError::ConfigurationInvalid(format!(
            "Missing required configuration: {name}"
        ))),
    }
}

fn common_config(settings: &QueueSettings, certificates: &CertificateFiles) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set(
            "bootstrap.servers",
            settings.bootstrap_servers.as_deref().unwrap_or_default(),
        )
        .set("client.id", &settings.client_id)
        .set("security.protocol", settings.security_protocol.as_str());

    let protocol = settings.security_protocol;
    if protocol == SecurityProtocol::Plaintext {
        return config;
    }

    config.set("sasl.mechanisms", &settings.sasl_mechanisms);
    if let Some(username) = &settings.sasl_username {
        config.set("sasl.username", username);
    }
    if let Some(password) = &settings.sasl_password {
        config.set("sasl.password", password.expose());
    }

    if protocol.uses_tls() {
        if let Some(path) = certificates.resolve_ca(settings) {
            config.set("ssl.ca.location", path.display());
        }
        if let Some(path) = certificates.resolve_certificate(settings) {
            config.set("ssl.certificate.location", path.display());
        }
        if let Some(path) = certificates.resolve_key(settings) {
            config.set("ssl.key.location", path.display());
        }
        let algorithm = if settings.ssl_verify_hostname {
            "https"
        } else {
            "none"
        };
        config.set("ssl.endpoint.identification.algorithm", algorithm);
    }

    config
}
