//! The `connection` module turns settings into a working queue.
//!
//! `build` validates `QueueSettings` and produces the two broker client
//! configurations (producer and consumer). `connect` then asks a
//! `Transport` for the client handles and wires them into a `Queue`.

pub mod builder;
pub mod certs;

use std::sync::Arc;

use tracing::{error, info};

use crate::broker::{ClientConfig, Transport};
use crate::clock::{Clock, SystemClock};
use crate::config::QueueSettings;
use crate::queue::{Queue, QueueOptions};
use crate::utils::error::{QueueError, Result};

pub use builder::{build, validate};
pub use certs::CertificateFiles;

/// Producer and consumer client configurations for one queue connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub producer: ClientConfig,
    pub consumer: ClientConfig,
    /// Temporary certificate files referenced by the configurations above.
    pub certificates: Arc<CertificateFiles>,
}

/// Validates `settings`, creates the broker clients and returns a queue
/// that uses the system clock.
pub fn connect(settings: &QueueSettings, transport: &dyn Transport) -> Result<Queue> {
    connect_with_clock(settings, transport, Arc::new(SystemClock))
}

pub fn connect_with_clock(
    settings: &QueueSettings,
    transport: &dyn Transport,
    clock: Arc<dyn Clock>,
) -> Result<Queue> {
    let connection = build(settings)?;

    let clients = transport
        .create_producer(&connection.producer)
        .and_then(|producer| {
            transport
                .create_consumer(&connection.consumer)
                .map(|consumer| (producer, consumer))
        });

    let (producer, consumer) = match clients {
        Ok(clients) => clients,
        Err(e) => {
            error!(
                error = %e,
                bootstrap_servers = ?settings.bootstrap_servers,
                group_id = ?settings.group_id,
                "failed to establish queue connection"
            );
            return Err(QueueError::ConnectionFailed(e.to_string()));
        }
    };

    info!(
        bootstrap_servers = ?settings.bootstrap_servers,
        group_id = ?settings.group_id,
        security_protocol = settings.security_protocol.as_str(),
        "queue connection established"
    );

    Ok(
        Queue::new(producer, consumer, QueueOptions::from(settings), clock)
            .with_certificates(connection.certificates),
    )
}

#[cfg(test)]
mod tests;
