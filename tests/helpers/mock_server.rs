//! Scripted HTTPS/1.1 server on 127.0.0.1 for integration tests.
//!
//! Each request is parsed, recorded and answered with the raw bytes the
//! handler returns. Connections stay open between requests unless the
//! response says `Connection: close` or the idle timeout passes. An empty
//! response closes the connection without replying.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use outbound::{Client, ClientBuilder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::tls::loopback_tls;

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// 1-based index of the TCP connection that carried it.
    pub connection: usize,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> Vec<u8> + Send + Sync>;

pub struct MockTlsServer {
    port: u16,
    ca_pem: Vec<u8>,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl MockTlsServer {
    /// Start a server whose idle connections live for 5s.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::start_with_idle_timeout(handler, Duration::from_secs(5)).await
    }

    /// Start a server that closes a connection after `idle` without a request.
    pub async fn start_with_idle_timeout<F>(handler: F, idle: Duration) -> Self
    where
        F: Fn(&RecordedRequest) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::spawn(Some(Arc::new(handler)), idle).await
    }

    /// Start a server that completes the TLS handshake and records requests
    /// but never answers them.
    pub async fn start_silent() -> Self {
        Self::spawn(None, Duration::from_secs(30)).await
    }

    async fn spawn(handler: Option<Handler>, idle: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let tls = loopback_tls();
        let acceptor = Arc::new(tls.acceptor);
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let connections = Arc::clone(&connections);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                loop {
                    let Ok((tcp, _)) = listener.accept().await else {
                        break;
                    };
                    let id = connections.fetch_add(1, Ordering::SeqCst) + 1;
                    let acceptor = Arc::clone(&acceptor);
                    let handler = handler.clone();
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        match tokio_boring::accept(&acceptor, tcp).await {
                            Ok(stream) => serve(stream, id, handler, requests, idle).await,
                            Err(e) => tracing::debug!("mock handshake failed: {}", e),
                        }
                    });
                }
            })
        };

        Self {
            port,
            ca_pem: tls.ca_pem,
            connections,
            requests,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// PEM of this server's self-signed certificate.
    pub fn ca_pem(&self) -> Vec<u8> {
        self.ca_pem.clone()
    }

    /// Builder that trusts this server's certificate.
    pub fn client_builder(&self) -> ClientBuilder {
        Client::builder().add_root_certificate(self.ca_pem.clone())
    }

    pub fn client(&self) -> Client {
        self.client_builder().build().expect("client")
    }

    /// TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockTlsServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(
    mut stream: S,
    connection: usize,
    handler: Option<Handler>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    idle: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let Some(request) = read_request(&mut stream, &mut buf, connection, idle).await else {
            break;
        };
        requests.lock().unwrap().push(request.clone());

        let Some(handler) = &handler else {
            continue;
        };
        let response = handler(&request);
        if response.is_empty() {
            let _ = stream.shutdown().await;
            break;
        }
        if stream.write_all(&response).await.is_err() || stream.flush().await.is_err() {
            break;
        }
        if wants_close(&response) {
            let _ = stream.shutdown().await;
            break;
        }
    }
}

async fn read_request<S>(
    stream: &mut S,
    buf: &mut Vec<u8>,
    connection: usize,
    idle: Duration,
) -> Option<RecordedRequest>
where
    S: AsyncRead + Unpin,
{
    loop {
        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut headers);
        if let Ok(httparse::Status::Complete(head_len)) = req.parse(&buf[..]) {
            let headers: Vec<(String, String)> = req
                .headers
                .iter()
                .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
                .collect();
            let body_len = headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_len + body_len {
                let request = RecordedRequest {
                    method: req.method.unwrap_or_default().to_string(),
                    target: req.path.unwrap_or_default().to_string(),
                    headers,
                    body: buf[head_len..head_len + body_len].to_vec(),
                    connection,
                };
                buf.drain(..head_len + body_len);
                return Some(request);
            }
        }

        let mut chunk = [0u8; 8192];
        match timeout(idle, stream.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => buf.extend_from_slice(&chunk[..n]),
            _ => return None,
        }
    }
}

fn wants_close(response: &[u8]) -> bool {
    let head_end = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(response.len());
    String::from_utf8_lossy(&response[..head_end])
        .lines()
        .any(|l| l.to_ascii_lowercase().replace(' ', "") == "connection:close")
}

/// `HTTP/1.1 <status>` with the given headers, a Content-Length and `body`.
pub fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {} {}\r\n", status, reason(status)).into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Chunked response carrying `chunks` in order, then an optional trailer.
pub fn chunked_response(headers: &[(&str, &str)], chunks: &[&[u8]], trailer: Option<&str>) -> Vec<u8> {
    let mut out = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n".to_vec();
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    for chunk in chunks {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n");
    if let Some(trailer) = trailer {
        out.extend_from_slice(trailer.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Redirect to `location` with an empty body.
pub fn redirect(status: u16, location: &str) -> Vec<u8> {
    response(status, &[("Location", location)], b"")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
