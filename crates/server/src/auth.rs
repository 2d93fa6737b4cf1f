// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller identity: extracting the Subject Common Name from a connected
//! peer's TLS certificate chain and scoping every RPC to it.

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("no peer connection info")]
    NoPeer,
    #[error("no TLS info on this connection")]
    NoTlsInfo,
    #[error("no peer certificates presented")]
    NoPeerCertificates,
}

impl From<AuthError> for tonic::Status {
    fn from(err: AuthError) -> Self {
        tonic::Status::unauthenticated(err.to_string())
    }
}

/// Per-connection info `tonic` attaches to every request on a connection
/// (via [`crate::tls::TlsStream`]'s `Connected` impl), carrying the
/// peer's raw DER certificate chain as presented during the TLS
/// handshake.
#[derive(Debug, Clone, Default)]
pub struct TlsConnectInfo {
    pub peer_certs: Vec<Vec<u8>>,
}

/// Extract the caller's identity: the first peer certificate's Subject
/// Common Name. Mirrors `userOf` in the original service, which reads
/// `peer.FromContext` → `credentials.TLSInfo` → `PeerCertificates[0]`.
pub fn caller_cn<T>(request: &tonic::Request<T>) -> Result<String, AuthError> {
    let info = request
        .extensions()
        .get::<TlsConnectInfo>()
        .ok_or(AuthError::NoPeer)?;

    let leaf = info
        .peer_certs
        .first()
        .ok_or(AuthError::NoPeerCertificates)?;

    // `NoTlsInfo` is unreachable via our own acceptor (every accepted
    // connection is already TLS), but is also what a cert lacking a
    // usable Subject CN maps to here, since the original taxonomy has
    // no separate "unparsable certificate" kind.
    common_name(leaf).ok_or(AuthError::NoTlsInfo)
}

fn common_name(der: &[u8]) -> Option<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned)
}
