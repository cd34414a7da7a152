//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alpn_gateway::config::{GatewayConfig, ListenerConfig};
use alpn_gateway::lifecycle::Shutdown;
use alpn_gateway::net::listener::Listener;
use alpn_gateway::net::tls::server_config;
use alpn_gateway::{HttpServer, Protocol};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// A self-signed identity for `localhost`.
pub struct Identity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

pub fn generate_self_signed() -> Identity {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    Identity {
        certs: vec![cert.cert.der().clone()],
        key: key.into(),
    }
}

/// A rustls server configuration for a fresh self-signed identity.
pub fn tls_config(alpn: &[Protocol]) -> Arc<rustls::ServerConfig> {
    let identity = generate_self_signed();
    server_config(identity.certs, identity.key, alpn).unwrap()
}

/// A gateway running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub certs: Vec<CertificateDer<'static>>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a gateway advertising `alpn` with otherwise default settings.
    pub async fn start(alpn: &[Protocol]) -> Self {
        Self::start_with(GatewayConfig::default(), alpn).await
    }

    pub async fn start_with(mut config: GatewayConfig, alpn: &[Protocol]) -> Self {
        let identity = generate_self_signed();
        let tls = server_config(identity.certs.clone(), identity.key, alpn).unwrap();

        config.listener = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            ..ListenerConfig::default()
        };
        config.timeouts.shutdown_grace_secs = 2;
        let listener = Listener::bind(&config.listener).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = HttpServer::new(config, tls).unwrap();
        let shutdown = Shutdown::new();
        let receiver = shutdown.subscribe();
        let handle = tokio::spawn(async move {
            server.run(listener, receiver).await.unwrap();
        });

        Self {
            addr,
            certs: identity.certs,
            shutdown,
            handle,
        }
    }

    /// Open a TLS connection offering `alpn` (nothing offered when empty).
    pub async fn connect(&self, alpn: &[&str]) -> TlsStream<TcpStream> {
        let mut roots = rustls::RootCertStore::empty();
        for cert in &self.certs {
            roots.add(cert.clone()).unwrap();
        }
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();

        let tcp = TcpStream::connect(self.addr).await.unwrap();
        let name = ServerName::try_from("localhost").unwrap();
        TlsConnector::from(Arc::new(config))
            .connect(name, tcp)
            .await
            .unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}

/// The ALPN token the server selected on `stream`.
pub fn negotiated(stream: &TlsStream<TcpStream>) -> Option<String> {
    stream
        .get_ref()
        .1
        .alpn_protocol()
        .map(|p| String::from_utf8_lossy(p).into_owned())
}

/// Send one request over HTTP/2 and collect the response body.
pub async fn send_h2(
    stream: TlsStream<TcpStream>,
    request: Request<Full<Bytes>>,
) -> (Response<()>, Bytes) {
    let (mut sender, conn) =
        hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
            .await
            .unwrap();
    tokio::spawn(conn);

    collect(sender.send_request(request).await.unwrap()).await
}

/// Send one request over HTTP/1.1 and collect the response body.
pub async fn send_http1(
    stream: TlsStream<TcpStream>,
    request: Request<Full<Bytes>>,
) -> (Response<()>, Bytes) {
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(conn);

    collect(sender.send_request(request).await.unwrap()).await
}

async fn collect(response: Response<hyper::body::Incoming>) -> (Response<()>, Bytes) {
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (Response::from_parts(parts, ()), body)
}
