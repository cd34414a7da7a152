//! TLS configuration, certificate loading and the pipeline's TLS terminator.
//!
//! # Responsibilities
//! - Load PEM certificate chain and private key from disk
//! - Build a rustls server config advertising the configured ALPN tokens
//! - Record what the handshake agreed on (`TlsHandler`)

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

use crate::config::TlsConfig;
use crate::negotiation::Protocol;
use crate::pipeline::{Event, Handler, HandlerContext, PipelineError};

/// Errors raised while building the TLS server configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0:?}")]
    CertificateNotFound(PathBuf),

    #[error("private key file not found: {0:?}")]
    KeyNotFound(PathBuf),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Load the TLS server configuration described by `config`.
pub fn load_tls_config(config: &TlsConfig) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    if !cert_path.exists() {
        return Err(TlsError::CertificateNotFound(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.to_path_buf()));
    }

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let server_config = server_config(certs, key, &config.alpn_protocols)?;
    tracing::info!(
        cert_path = %config.cert_path,
        alpn = ?config.alpn_protocols.iter().map(Protocol::as_str).collect::<Vec<_>>(),
        "TLS configuration loaded"
    );
    Ok(server_config)
}

/// Build a rustls server config for the given identity and ALPN tokens,
/// in order of server preference.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    alpn_protocols: &[Protocol],
) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    config.alpn_protocols = alpn_protocols.iter().map(|p| p.as_bytes().to_vec()).collect();
    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Pipeline entry standing for the TLS session of a connection.
///
/// The negotiation gate requires one of these upstream of itself.
#[derive(Debug, Clone, Default)]
pub struct TlsHandler {
    application_protocol: Option<Protocol>,
    server_name: Option<String>,
    handshake_complete: bool,
}

impl TlsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A terminator whose session already agreed on `protocol`.
    pub fn with_application_protocol(protocol: Protocol) -> Self {
        Self {
            application_protocol: Some(protocol),
            ..Self::default()
        }
    }

    /// Record what a finished rustls handshake agreed on.
    pub fn record_session(&mut self, session: &rustls::ServerConnection) {
        self.application_protocol = session.alpn_protocol().and_then(Protocol::from_alpn);
        self.server_name = session.server_name().map(str::to_owned);
    }

    /// ALPN token agreed during the handshake.
    pub fn application_protocol(&self) -> Option<&Protocol> {
        self.application_protocol.as_ref()
    }

    /// SNI host name sent by the client.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete
    }
}

impl Handler for TlsHandler {
    fn on_event(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        event: Event,
    ) -> Result<(), PipelineError> {
        if let Event::HandshakeCompleted(completion) = &event {
            if completion.is_success() {
                self.handshake_complete = true;
                if self.application_protocol.is_none() {
                    self.application_protocol = completion.negotiated_protocol().cloned();
                }
                tracing::debug!(
                    alpn = ?self.application_protocol.as_ref().map(Protocol::as_str),
                    sni = ?self.server_name,
                    "TLS handshake completed"
                );
            }
        }

        ctx.fire_event(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use crate::pipeline::{HandshakeCompletion, Pipeline};

    #[test]
    fn missing_certificate_reported() {
        let config = TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
            alpn_protocols: vec![Protocol::HTTP_2],
        };

        let err = load_tls_config(&config).unwrap_err();
        assert!(matches!(err, TlsError::CertificateNotFound(_)));
    }

    #[test]
    fn handler_records_completion() {
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last("tls", TlsHandler::new()).unwrap();

        pipeline.fire_event(Event::HandshakeCompleted(HandshakeCompletion::succeeded(Some(
            Protocol::HTTP_2,
        ))));

        let tls = pipeline.get::<TlsHandler>().unwrap();
        assert!(tls.is_handshake_complete());
        assert_eq!(tls.application_protocol(), Some(&Protocol::HTTP_2));
    }

    #[test]
    fn handler_ignores_failed_handshake() {
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last("tls", TlsHandler::new()).unwrap();

        pipeline.fire_event(Event::HandshakeCompleted(HandshakeCompletion::failed("timeout")));

        let tls = pipeline.get::<TlsHandler>().unwrap();
        assert!(!tls.is_handshake_complete());
        assert_eq!(tls.application_protocol(), None);
    }
}
