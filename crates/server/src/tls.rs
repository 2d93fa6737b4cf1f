// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mTLS wiring: load the server's certificate/key/CA bundle into a
//! `rustls::ServerConfig` requiring client auth, and adapt accepted
//! `tokio_rustls` connections so `tonic` can see each connection's peer
//! certificate chain.

use crate::auth::TlsConnectInfo;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tonic::transport::server::Connected;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("reading {0}: {1}")]
    Read(String, std::io::Error),
    #[error("no private key found in {0}")]
    NoKey(String),
    #[error("rustls: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("building client cert verifier: {0}")]
    Verifier(String),
}

/// Load the server's leaf certificate + key and a CA pool used to verify
/// client certificates, mirroring `NewCertificates` in the original
/// service's `certs.go`: a leaf X509 key pair plus a CA pool, read from
/// PEM files, minimum TLS 1.3, client auth required.
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: &Path,
) -> Result<rustls::ServerConfig, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    let roots = load_ca_pool(ca_path)?;

    let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| TlsError::Verifier(e.to_string()))?;

    let config = rustls::ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)?;

    Ok(config)
}

fn load_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Read(path.display().to_string(), e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Read(path.display().to_string(), e))
}

fn load_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Read(path.display().to_string(), e))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::Read(path.display().to_string(), e))?
        .ok_or_else(|| TlsError::NoKey(path.display().to_string()))
}

fn load_ca_pool(path: &Path) -> Result<rustls::RootCertStore, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::Read(path.display().to_string(), e))?;
    let mut reader = BufReader::new(file);
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| TlsError::Read(path.display().to_string(), e))?;
        roots
            .add(cert)
            .map_err(|e| TlsError::Rustls(rustls::Error::General(e.to_string())))?;
    }
    Ok(roots)
}

/// Wraps an accepted `tokio_rustls` stream so `tonic` can carry its peer
/// certificate chain alongside every request made on that connection.
/// The orphan rule forces this newtype: neither `Connected` nor
/// `tokio_rustls::server::TlsStream` belongs to this crate.
pub struct TlsStream {
    inner: tokio_rustls::server::TlsStream<TcpStream>,
}

impl TlsStream {
    pub fn new(inner: tokio_rustls::server::TlsStream<TcpStream>) -> Self {
        Self { inner }
    }
}

impl Connected for TlsStream {
    type ConnectInfo = TlsConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        let (_, session) = self.inner.get_ref();
        let peer_certs = session
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default();
        TlsConnectInfo { peer_certs }
    }
}

impl AsyncRead for TlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Accepts raw TCP connections and performs the TLS handshake on each,
/// yielding a stream of connections `tonic::transport::Server` can serve
/// directly via `serve_with_incoming`. Connections that fail the
/// handshake are dropped rather than terminating the listener.
pub fn tls_incoming(
    listener: tokio::net::TcpListener,
    acceptor: tokio_rustls::TlsAcceptor,
) -> impl tokio_stream::Stream<Item = std::io::Result<TlsStream>> {
    use tokio_stream::wrappers::TcpListenerStream;
    use tokio_stream::StreamExt;

    TcpListenerStream::new(listener).then(move |conn| {
        let acceptor = acceptor.clone();
        async move {
            let tcp = conn?;
            let tls = acceptor.accept(tcp).await?;
            Ok(TlsStream::new(tls))
        }
    })
}
