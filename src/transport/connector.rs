//! BoringSSL TLS connector.

use std::time::Duration;

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslVersion};
use boring::x509::X509;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::options::RequestOptions;
use crate::transport::tcp;

/// TLS stream over TCP; the only transport the client speaks.
pub type TlsStream = SslStream<TcpStream>;

/// BoringSSL-based TLS connector.
///
/// Verifies peers against the system roots plus any extra roots supplied at
/// construction, and always sends SNI for the target host.
#[derive(Clone)]
pub struct TlsConnector {
    connector: SslConnector,
}

impl TlsConnector {
    /// Create a connector trusting the default roots.
    pub fn new() -> Result<Self> {
        Self::with_root_certificates(&[])
    }

    /// Create a connector that also trusts `certs` (DER or PEM).
    pub fn with_root_certificates(certs: &[Vec<u8>]) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("Failed to create SSL connector: {}", e)))?;

        for cert_bytes in certs {
            let cert = X509::from_der(cert_bytes)
                .or_else(|_| X509::from_pem(cert_bytes))
                .map_err(|e| Error::tls(format!("Invalid root certificate: {}", e)))?;
            builder
                .cert_store_mut()
                .add_cert(cert)
                .map_err(|e| Error::tls(format!("Failed to add root certificate: {}", e)))?;
        }

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| Error::tls(format!("Failed to set min TLS version: {}", e)))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| Error::tls(format!("Failed to set max TLS version: {}", e)))?;

        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

        // HTTP/1.1 only
        builder
            .set_alpn_protos(b"\x08http/1.1")
            .map_err(|e| Error::tls(format!("Failed to set ALPN: {}", e)))?;

        Ok(Self {
            connector: builder.build(),
        })
    }

    /// TLS handshake over an established TCP stream, bounded by `limit`.
    pub async fn handshake(&self, host: &str, tcp: TcpStream, limit: Duration) -> Result<TlsStream> {
        let config = self
            .connector
            .configure()
            .map_err(|e| Error::tls(format!("Failed to configure SSL: {}", e)))?;

        // SNI and hostname verification use the bare host
        let server_name = host.trim_start_matches('[').trim_end_matches(']');
        match timeout(limit, tokio_boring::connect(config, server_name, tcp)).await {
            Ok(Ok(stream)) => {
                tracing::debug!(host, "TLS handshake complete");
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::tls(format!("TLS handshake with {} failed: {}", host, e))),
            Err(_) => Err(Error::HandshakeTimeout(limit)),
        }
    }

    /// Resolve, connect and handshake, each step under its own timeout.
    pub async fn connect(&self, host: &str, port: u16, opts: &RequestOptions) -> Result<TlsStream> {
        let tcp = tcp::connect(host, port, opts.tcp_connect_timeout).await?;
        self.handshake(host, tcp, opts.tls_handshake_timeout).await
    }
}
