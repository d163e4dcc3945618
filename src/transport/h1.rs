//! HTTP/1.1 over one TLS connection (RFC 9112).
//!
//! Uses httparse for the response head and raw I/O for everything else, so
//! the request bytes go out exactly as built and body framing stays under
//! our control. A [`Connection`] is reusable only after a response has been
//! read to its framed end with nothing left over and no `Connection: close`.

use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use http::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::chunked::{Chunk, ChunkDecoder};
use crate::error::{Error, Result};
use crate::transport::connector::TlsStream;
use crate::url::Url;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Bytes requested from the socket per read.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// How a response body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// HEAD, 1xx, 204 and 304 carry no body.
    Empty,
    Length(u64),
    Chunked,
    /// Read until the server closes; the connection cannot be reused.
    UntilClose,
}

/// Status line and headers of a final response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    /// Minor HTTP version (`0` or `1`).
    pub version: u8,
    pub headers: Vec<(String, String)>,
    pub framing: BodyFraming,
    keep_alive: bool,
}

impl ResponseHead {
    /// First header value with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header_value(&self.headers, name)
    }

    /// Every value of the named header, in arrival order.
    pub fn headers_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the server allows another request on this connection.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive && self.framing != BodyFraming::UntilClose
    }

    /// `HTTP/1.x` as text.
    pub fn version_str(&self) -> &'static str {
        if self.version == 0 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        }
    }
}

/// One HTTP/1.1 connection over TLS.
pub struct Connection {
    stream: TlsStream,
    /// Bytes read from the socket but not yet consumed.
    buf: BytesMut,
    last_used: Instant,
    /// Set once a response has been fully consumed and the server allows reuse.
    reusable: bool,
}

impl Connection {
    pub fn new(stream: TlsStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            last_used: Instant::now(),
            reusable: false,
        }
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Time since the connection last finished an exchange.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Zero-wait read check used before reusing an idle connection.
    ///
    /// A healthy idle socket has nothing to read. EOF, an error or unexpected
    /// bytes (a stray response, a close alert) all mean the server has moved
    /// on and the connection must be discarded.
    pub async fn is_open(&mut self) -> bool {
        if !self.buf.is_empty() {
            return false;
        }
        let mut peek = [0u8; 1];
        // only a read that would block proves the socket is still idle
        timeout(Duration::ZERO, self.stream.read(&mut peek))
            .await
            .is_err()
    }

    /// Write a fully built request under `limit`.
    pub async fn write_request(&mut self, request: &[u8], limit: Duration) -> Result<()> {
        self.reusable = false;
        let write = async {
            self.stream.write_all(request).await?;
            self.stream.flush().await
        };
        match timeout(limit, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::WriteTimeout(limit)),
        }
    }

    /// Read the head of the final response, skipping any 1xx responses.
    ///
    /// Each socket read is bounded by `limit`.
    pub async fn read_head(&mut self, method: &Method, limit: Duration) -> Result<ResponseHead> {
        loop {
            let parsed = loop {
                if let Some(parsed) = parse_head(&self.buf, method)? {
                    break parsed;
                }
                if self.buf.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("Response headers too large"));
                }
                if self.fill(limit).await? == 0 {
                    return Err(Error::connection(
                        "Connection closed before response head complete",
                    ));
                }
            };
            let (head, consumed) = parsed;
            self.buf.advance(consumed);

            // Per RFC 9112 Section 6: skip interim responses
            if (100..200).contains(&head.status) {
                tracing::trace!(status = head.status, "skipping interim response");
                continue;
            }
            return Ok(head);
        }
    }

    /// Read the body framed by `head`, handing each decoded slice to `on_data`.
    ///
    /// Returns the number of body bytes read off the wire (chunk framing
    /// excluded). The connection becomes reusable when the body ends cleanly
    /// and the server allows keep-alive.
    pub async fn read_body<F>(&mut self, head: &ResponseHead, limit: Duration, mut on_data: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let received = match head.framing {
            BodyFraming::Empty => 0,
            BodyFraming::Length(len) => self.read_fixed(len, limit, &mut on_data).await?,
            BodyFraming::Chunked => self.read_chunked(limit, &mut on_data).await?,
            BodyFraming::UntilClose => self.read_until_close(limit, &mut on_data).await?,
        };

        // leftover bytes would be a pipelined response we never asked for
        self.reusable = head.keep_alive() && self.buf.is_empty();
        self.touch();
        Ok(received)
    }

    /// Read more bytes into the buffer. `Ok(0)` means the peer closed.
    async fn fill(&mut self, limit: Duration) -> Result<usize> {
        self.buf.reserve(READ_CHUNK_SIZE);
        match timeout(limit, self.stream.read_buf(&mut self.buf)).await {
            Ok(Ok(n)) => Ok(n),
            // peers that skip close_notify
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::ReadTimeout(limit)),
        }
    }

    async fn read_fixed<F>(&mut self, len: u64, limit: Duration, on_data: &mut F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut remaining = len;
        while remaining > 0 {
            if self.buf.is_empty() && self.fill(limit).await? == 0 {
                return Err(Error::connection(format!(
                    "Connection closed before receiving full body (got {} of {} bytes)",
                    len - remaining,
                    len
                )));
            }
            let take = usize::try_from(remaining).map_or(self.buf.len(), |r| r.min(self.buf.len()));
            on_data(&self.buf[..take])?;
            self.buf.advance(take);
            remaining -= take as u64;
        }
        Ok(len)
    }

    async fn read_chunked<F>(&mut self, limit: Duration, on_data: &mut F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut decoder = ChunkDecoder::with_trailers();
        let mut received = 0u64;
        loop {
            let mut input = &self.buf[..];
            let before = input.len();
            let mut finished = false;
            while let Some(chunk) = decoder.decode(&mut input)? {
                match chunk {
                    Chunk::Data(data) => {
                        received += data.len() as u64;
                        on_data(data)?;
                    }
                    Chunk::End => {
                        finished = true;
                        break;
                    }
                }
            }
            let consumed = before - input.len();
            self.buf.advance(consumed);

            if finished {
                return Ok(received);
            }
            if self.fill(limit).await? == 0 {
                return Err(Error::connection("Connection closed mid chunked body"));
            }
        }
    }

    async fn read_until_close<F>(&mut self, limit: Duration, on_data: &mut F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut received = 0u64;
        loop {
            if !self.buf.is_empty() {
                on_data(&self.buf[..])?;
                received += self.buf.len() as u64;
                self.buf.clear();
            }
            if self.fill(limit).await? == 0 {
                return Ok(received);
            }
        }
    }
}

/// Serialize a request: request line, `Host`, the given headers in order,
/// `Connection: keep-alive` and `Content-Length` when missing, then the body.
pub fn build_request(
    method: &Method,
    url: &Url,
    headers: &[(String, String)],
    body: Option<&[u8]>,
) -> Result<Vec<u8>> {
    for (name, value) in headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let target = url.request_target();
    let authority = url.authority();
    let mut request = Vec::with_capacity(256 + body.map_or(0, <[u8]>::len));

    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    request.extend_from_slice(target.as_bytes());
    request.extend_from_slice(b" HTTP/1.1\r\n");

    request.extend_from_slice(b"Host: ");
    request.extend_from_slice(authority.as_bytes());
    request.extend_from_slice(b"\r\n");

    let mut has_connection = false;
    let mut has_length = false;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        has_connection |= name.eq_ignore_ascii_case("connection");
        has_length |= name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("transfer-encoding");
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    if !has_connection {
        request.extend_from_slice(b"Connection: keep-alive\r\n");
    }

    if let Some(body) = body {
        if !has_length {
            request.extend_from_slice(b"Content-Length: ");
            request.extend_from_slice(body.len().to_string().as_bytes());
            request.extend_from_slice(b"\r\n");
        }
    }

    request.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        request.extend_from_slice(body);
    }
    Ok(request)
}

/// Parse a response head out of `buf`. `Ok(None)` means more bytes are needed.
fn parse_head(buf: &[u8], method: &Method) -> Result<Option<(ResponseHead, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut headers);

    let headers_len = match response
        .parse(buf)
        .map_err(|e| Error::http_protocol(format!("Failed to parse response: {}", e)))?
    {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let status = response
        .code
        .ok_or_else(|| Error::http_protocol("Missing status code"))?;
    let version = response.version.unwrap_or(1);

    let headers: Vec<(String, String)> = response
        .headers
        .iter()
        .filter(|h| !h.name.is_empty())
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    let framing = body_framing(status, method, &headers)?;
    let keep_alive = connection_keep_alive(version, &headers);

    Ok(Some((
        ResponseHead {
            status,
            version,
            headers,
            framing,
            keep_alive,
        },
        headers_len,
    )))
}

/// Per RFC 9112 Section 6.3: decide how the body is delimited.
fn body_framing(status: u16, method: &Method, headers: &[(String, String)]) -> Result<BodyFraming> {
    if matches!(status, 100..=199 | 204 | 304) || *method == Method::HEAD {
        return Ok(BodyFraming::Empty);
    }

    // Transfer-Encoding overrides Content-Length; chunked must be the final coding
    if let Some(te) = find_header_value(headers, "transfer-encoding") {
        let chunked = te
            .split(',')
            .next_back()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("chunked"));
        return Ok(if chunked {
            BodyFraming::Chunked
        } else {
            BodyFraming::UntilClose
        });
    }

    // repeated Content-Length lines are checked like one comma-joined list
    let lengths: Vec<&str> = headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.as_str())
        .collect();
    if lengths.is_empty() {
        return Ok(BodyFraming::UntilClose);
    }
    Ok(BodyFraming::Length(parse_content_length(&lengths.join(","))?))
}

/// HTTP/1.1 defaults to keep-alive unless `close` is listed; HTTP/1.0 needs
/// an explicit `keep-alive`.
fn connection_keep_alive(version: u8, headers: &[(String, String)]) -> bool {
    let has_token = |token: &str| {
        headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case("connection"))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    if version == 0 {
        has_token("keep-alive")
    } else {
        !has_token("close")
    }
}

/// Find a header value by name (case-insensitive).
pub(crate) fn find_header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Validate a header name per RFC 9110 Section 5.1.
///
/// Header names must be tokens: 1*tchar where tchar excludes
/// delimiters, control characters, and whitespace.
pub(crate) fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidHeader("empty header name".into()));
    }
    if !name.bytes().all(is_tchar) {
        return Err(Error::InvalidHeader(format!(
            "invalid character in header name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Check if a byte is a valid token character per RFC 9110.
fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Validate a header value per RFC 9110 Section 5.5.
///
/// Header values must not contain NUL, CR, or LF (prevents header injection).
pub(crate) fn validate_header_value(value: &str) -> Result<()> {
    if value.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(Error::InvalidHeader(
            "CR/LF/NUL not allowed in header value".into(),
        ));
    }
    Ok(())
}

/// Parse and validate Content-Length header value per RFC 9112 Section 6.2.
///
/// Content-Length must be a non-negative integer. If multiple values are
/// present (comma-separated), they must all be identical.
fn parse_content_length(value: &str) -> Result<u64> {
    let mut parts = value.split(',').map(str::trim);
    let parse = |s: &str| {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::http_protocol(format!("Invalid Content-Length: {}", value)));
        }
        s.parse::<u64>()
            .map_err(|_| Error::http_protocol(format!("Invalid Content-Length: {}", value)))
    };

    let first = parse(parts.next().unwrap_or(""))?;
    for part in parts {
        if parse(part)? != first {
            return Err(Error::http_protocol(format!(
                "Conflicting Content-Length values: {}",
                value
            )));
        }
    }
    Ok(first)
}
