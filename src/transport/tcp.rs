//! DNS resolution and TCP connect.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Resolve `host:port`. The lookup is bounded by `limit`.
pub async fn resolve(host: &str, port: u16, limit: Duration) -> Result<Vec<SocketAddr>> {
    // bracketed IPv6 literals resolve without brackets
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = timeout(limit, lookup_host((bare, port)))
        .await
        .map_err(|_| Error::ConnectTimeout(limit))?
        .map_err(|e| Error::Dns(format!("{}:{}: {}", host, port, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Dns(format!("no addresses found for {}:{}", host, port)));
    }
    Ok(addrs)
}

/// Connect to the first reachable address with Nagle disabled.
///
/// Each address gets its own `limit`; the last failure is reported.
pub async fn connect(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    let addrs = resolve(host, port, limit).await?;

    let mut last_err = Error::connection(format!("no addresses for {}:{}", host, port));
    for addr in addrs {
        match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream
                    .set_nodelay(true)
                    .map_err(|e| Error::connection(format!("Failed to set TCP_NODELAY: {}", e)))?;
                tracing::debug!(%addr, "TCP connected");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                tracing::debug!(%addr, error = %e, "TCP connect failed");
                last_err = Error::connection(format!("Failed to connect to {}: {}", addr, e));
            }
            Err(_) => {
                tracing::debug!(%addr, "TCP connect timed out");
                last_err = Error::ConnectTimeout(limit);
            }
        }
    }
    Err(last_err)
}
