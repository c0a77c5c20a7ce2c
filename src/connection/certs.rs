//! Certificate material for TLS connections.
//!
//! Inline PEM content from the settings is written to owner-only temporary
//! files so the broker client can be handed a path. The files live as long
//! as the `CertificateFiles` value; every queue built from one connection
//! shares it through an `Arc`, so the files are removed exactly once, when
//! the last queue goes away.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::debug;

use crate::config::QueueSettings;
use crate::utils::error::{QueueError, Result};

#[derive(Debug, Default)]
pub struct CertificateFiles {
    ca: Option<TempPath>,
    certificate: Option<TempPath>,
    key: Option<TempPath>,
}

impl CertificateFiles {
    /// Write every inline PEM value of a TLS protocol to a temporary file.
    /// Plaintext protocols never produce files.
    pub fn materialize(settings: &QueueSettings) -> Result<Self> {
        if !settings.security_protocol.uses_tls() {
            return Ok(Self::default());
        }

        Ok(Self {
            ca: write_pem("ca", settings.ssl_ca_pem.as_deref())?,
            certificate: write_pem("cert", settings.ssl_certificate_pem.as_deref())?,
            key: write_pem("key", settings.ssl_key_pem.as_ref().map(|k| k.expose()))?,
        })
    }

    pub fn ca_path(&self) -> Option<&Path> {
        self.ca.as_deref()
    }

    pub fn certificate_path(&self) -> Option<&Path> {
        self.certificate.as_deref()
    }

    pub fn key_path(&self) -> Option<&Path> {
        self.key.as_deref()
    }

    /// Number of files currently on disk.
    pub fn len(&self) -> usize {
        [&self.ca, &self.certificate, &self.key]
            .iter()
            .filter(|f| f.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The CA location for the broker client: a materialized file if inline
    /// content was given, otherwise the configured path.
    pub fn resolve_ca(&self, settings: &QueueSettings) -> Option<PathBuf> {
        resolve(self.ca_path(), settings.ssl_ca_location.as_deref())
    }

    pub fn resolve_certificate(&self, settings: &QueueSettings) -> Option<PathBuf> {
        resolve(
            self.certificate_path(),
            settings.ssl_certificate_location.as_deref(),
        )
    }

    pub fn resolve_key(&self, settings: &QueueSettings) -> Option<PathBuf> {
        resolve(self.key_path(), settings.ssl_key_location.as_deref())
    }
}

fn resolve(materialized: Option<&Path>, configured: Option<&str>) -> Option<PathBuf> {
    materialized
        .map(Path::to_path_buf)
        .or_else(|| configured.filter(|p| !p.trim().is_empty()).map(PathBuf::from))
}

fn write_pem(kind: &str, content: Option<&str>) -> Result<Option<TempPath>> {
    let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
        return Ok(None);
    };

    // NamedTempFile is created with 0600 permissions on unix.
    let mut file = Builder::new()
        .prefix(&format!("popqueue-{kind}-"))
        .suffix(".pem")
        .tempfile()
        .map_err(|e| cert_error(kind, e))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| cert_error(kind, e))?;

    let path = file.into_temp_path();
    debug!(kind, path = %path.display(), "materialized certificate");
    Ok(Some(path))
}

fn cert_error(kind: &str, err: std::io::Error) -> QueueError {
    QueueError::ConfigurationInvalid(format!("failed to write {kind} certificate: {err}"))
}
