use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::rustls;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::common::phys::PhysLayer;
use crate::decode::PhysDecodeLevel;

/// Minimum TLS version to allow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinTlsVersion {
    /// TLS 1.2
    V1_2,
    /// TLS 1.3
    V1_3,
}

impl MinTlsVersion {
    fn to_rustls(self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        static MIN_TLS12_VERSIONS: &[&rustls::SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static MIN_TLS13_VERSIONS: &[&rustls::SupportedProtocolVersion] =
            &[&rustls::version::TLS13];

        match self {
            Self::V1_2 => MIN_TLS12_VERSIONS,
            Self::V1_3 => MIN_TLS13_VERSIONS,
        }
    }
}

/// TLS-related errors
#[derive(Debug)]
pub enum TlsError {
    /// Invalid peer certificate
    InvalidPeerCertificate(std::io::Error),
    /// Invalid local certificate
    InvalidLocalCertificate(std::io::Error),
    /// Invalid private key
    InvalidPrivateKey(std::io::Error),
    /// Error building TLS configuration
    BadConfig(String),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPeerCertificate(err) => {
                write!(f, "invalid peer certificate file: {err}")
            }
            Self::InvalidLocalCertificate(err) => {
                write!(f, "invalid local certificate file: {err}")
            }
            Self::InvalidPrivateKey(err) => write!(f, "invalid private key file: {err}"),
            Self::BadConfig(err) => write!(f, "bad config: {err}"),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<rustls::Error> for TlsError {
    fn from(err: rustls::Error) -> Self {
        Self::BadConfig(err.to_string())
    }
}

/// TLS configuration for a listener.
///
/// The Modbus framing inside the session is identical to plain TCP.
#[derive(Clone)]
pub struct TlsServerConfig {
    inner: Arc<rustls::ServerConfig>,
}

impl TlsServerConfig {
    /// Create a TLS server config.
    ///
    /// `local_cert_path` and `private_key_path` supply this server's own
    /// certificate chain and key. When `peer_cert_path` is present, clients
    /// must present a certificate that chains to one of the anchors in that
    /// file; otherwise client certificates are not requested.
    pub fn new(
        peer_cert_path: Option<&Path>,
        local_cert_path: &Path,
        private_key_path: &Path,
        min_tls_version: MinTlsVersion,
    ) -> Result<Self, TlsError> {
        let local_certs =
            load_certs(local_cert_path).map_err(TlsError::InvalidLocalCertificate)?;
        let private_key =
            load_private_key(private_key_path).map_err(TlsError::InvalidPrivateKey)?;

        let builder =
            rustls::ServerConfig::builder_with_protocol_versions(min_tls_version.to_rustls());

        let config = match peer_cert_path {
            Some(path) => {
                let peer_certs = load_certs(path).map_err(TlsError::InvalidPeerCertificate)?;
                let mut roots = rustls::RootCertStore::empty();
                for cert in peer_certs {
                    roots.add(cert)?;
                }
                let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
                    .build()
                    .map_err(|err| TlsError::BadConfig(err.to_string()))?;
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(local_certs, private_key)?
            }
            None => builder
                .with_no_client_auth()
                .with_single_cert(local_certs, private_key)?,
        };

        Ok(TlsServerConfig {
            inner: Arc::new(config),
        })
    }

    pub(crate) async fn handle_connection(
        &self,
        socket: TcpStream,
        level: PhysDecodeLevel,
    ) -> Result<PhysLayer, String> {
        let connector = tokio_rustls::TlsAcceptor::from(self.inner.clone());
        match connector.accept(socket).await {
            Err(err) => Err(format!("failed to establish TLS session: {err}")),
            Ok(stream) => Ok(PhysLayer::new_tls(
                tokio_rustls::TlsStream::from(stream),
                level,
            )),
        }
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, std::io::Error> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "no certificates found in file",
        ));
    }

    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, std::io::Error> {
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "no private key found in file",
        )
    })
}
