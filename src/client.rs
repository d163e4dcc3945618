//! HTTPS client: connection reuse, cookies, redirects, retry and metrics.
//!
//! Every call goes through one executor loop. A hop borrows a connection
//! from the pool inside a [`Checkout`] guard, so it is handed back (or
//! dropped, when not reusable) on every exit path including errors and
//! cancelled futures.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use http::Method;

use crate::cookie::{Cookie, CookieJar};
use crate::decode::decode_body;
use crate::error::{Error, Result};
use crate::headers::{self, HeaderSet, DEFAULT_USER_AGENT};
use crate::metrics::{MetricsCallback, RequestMetrics};
use crate::options::{RequestOptions, RetryOptions};
use crate::pool::{
    Checkout, ConnectionPool, PoolKey, PoolStats, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_IDLE_PER_HOST,
};
use crate::redirect::{is_redirect_status, next_verb, RedirectPolicy};
use crate::response::Response;
use crate::transport::connector::TlsConnector;
use crate::transport::h1::{self, Connection, ResponseHead};
use crate::url::{path_of, Url};

/// Borrowed streaming body handler: `(bytes, is_final)`.
type StreamHandler<'h> = &'h mut (dyn FnMut(&[u8], bool) + Send);

/// Builder for [`Client`].
pub struct ClientBuilder {
    user_agent: String,
    pool_idle_timeout: Duration,
    expected_conns_per_host: usize,
    redirect_policy: RedirectPolicy,
    cookies: bool,
    root_certificates: Vec<Vec<u8>>,
    request_options: RequestOptions,
    metrics_callback: Option<MetricsCallback>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pool_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            expected_conns_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            redirect_policy: RedirectPolicy::default(),
            cookies: true,
            root_certificates: Vec::new(),
            request_options: RequestOptions::default(),
            metrics_callback: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// How long an idle pooled connection stays reusable.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Idle connections kept per `(host, port)`; extra ones are closed.
    pub fn expected_conns_per_host(mut self, count: usize) -> Self {
        self.expected_conns_per_host = count;
        self
    }

    pub fn redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.redirect_policy = policy;
        self
    }

    /// Enable or disable the cookie jar (on by default).
    pub fn cookies(mut self, enabled: bool) -> Self {
        self.cookies = enabled;
        self
    }

    /// Trust an extra root certificate, PEM or DER encoded.
    pub fn add_root_certificate(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.root_certificates.push(cert.into());
        self
    }

    /// Options used by calls that do not pass their own.
    pub fn request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = options;
        self
    }

    pub fn metrics_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestMetrics) + Send + Sync + 'static,
    {
        self.metrics_callback = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<Client> {
        let connector = TlsConnector::with_root_certificates(&self.root_certificates)?;
        Ok(Client {
            connector,
            pool: ConnectionPool::with_config(self.pool_idle_timeout, self.expected_conns_per_host),
            jar: Mutex::new(CookieJar::new()),
            cookies_enabled: self.cookies,
            redirect_policy: self.redirect_policy,
            user_agent: self.user_agent,
            request_options: self.request_options,
            metrics_callback: self.metrics_callback,
        })
    }
}

/// One logical call: the first hop of a redirect chain.
struct Call<'a> {
    method: Method,
    host: &'a str,
    port: u16,
    target: &'a str,
    headers: &'a [(&'a str, &'a str)],
    body: Option<Bytes>,
    options: &'a RequestOptions,
    attempt: u32,
}

/// HTTPS-only HTTP/1.1 client.
///
/// Requests are addressed as `(host, port, target)` where `target` is the
/// origin-form path plus query. Successful calls return a [`Response`];
/// a final status outside 2xx is returned as [`Error::HttpStatus`].
pub struct Client {
    connector: TlsConnector,
    pool: ConnectionPool,
    jar: Mutex<CookieJar>,
    cookies_enabled: bool,
    redirect_policy: RedirectPolicy,
    user_agent: String,
    request_options: RequestOptions,
    metrics_callback: Option<MetricsCallback>,
}

impl Client {
    /// Client with default settings.
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub async fn get(&self, host: &str, port: u16, target: &str, headers: &[(&str, &str)]) -> Result<Response> {
        self.get_with_opts(host, port, target, headers, &self.request_options).await
    }

    pub async fn get_with_opts(
        &self,
        host: &str,
        port: u16,
        target: &str,
        headers: &[(&str, &str)],
        options: &RequestOptions,
    ) -> Result<Response> {
        self.execute(
            Call {
                method: Method::GET,
                host,
                port,
                target,
                headers,
                body: None,
                options,
                attempt: 1,
            },
            None,
        )
        .await
    }

    /// POST `body`. `Content-Type` defaults to `application/json`.
    pub async fn post(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: impl Into<Bytes>,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.post_with_opts(host, port, target, body, headers, &self.request_options)
            .await
    }

    pub async fn post_with_opts(
        &self,
        host: &str,
        port: u16,
        target: &str,
        body: impl Into<Bytes>,
        headers: &[(&str, &str)],
        options: &RequestOptions,
    ) -> Result<Response> {
        self.execute(
            Call {
                method: Method::POST,
                host,
                port,
                target,
                headers,
                body: Some(body.into()),
                options,
                attempt: 1,
            },
            None,
        )
        .await
    }

    /// GET with retry and exponential backoff.
    ///
    /// Only transport failures (when `retry_on_network_error`) and a final
    /// 5xx (when `retry_on_5xx`) are retried; every other error is returned
    /// at once. Each attempt reports its own metrics.
    pub async fn get_with_retry(
        &self,
        host: &str,
        port: u16,
        target: &str,
        headers: &[(&str, &str)],
        retry: &RetryOptions,
        options: Option<&RequestOptions>,
    ) -> Result<Response> {
        let options = options.unwrap_or(&self.request_options);
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self
                .execute(
                    Call {
                        method: Method::GET,
                        host,
                        port,
                        target,
                        headers,
                        body: None,
                        options,
                        attempt,
                    },
                    None,
                )
                .await;

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            let retryable = match &error {
                Error::HttpStatus { status, .. } => retry.retry_on_5xx && (500..600).contains(status),
                e => retry.retry_on_network_error && e.is_transport(),
            };
            if !retryable || attempt >= max_attempts {
                return Err(error);
            }

            let delay = retry.backoff_delay(attempt);
            tracing::warn!(
                host,
                port,
                target,
                attempt,
                ?delay,
                error = %error,
                "request failed, retrying"
            );
            drop(error);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// GET that hands the body to `handler` as it arrives instead of buffering it.
    ///
    /// `handler` gets `(bytes, false)` per slice and one final `(&[], true)`.
    /// The body is passed through undecoded and `Accept-Encoding` is not sent
    /// unless the caller adds it. A non-2xx final response is buffered and
    /// returned as [`Error::HttpStatus`] without calling `handler`. The
    /// returned [`Response`] carries status and headers with an empty body.
    pub async fn stream_get<F>(
        &self,
        host: &str,
        port: u16,
        target: &str,
        headers: &[(&str, &str)],
        handler: F,
    ) -> Result<Response>
    where
        F: FnMut(&[u8], bool) + Send,
    {
        let options = self.request_options.clone().accept_encoding("");
        self.stream_get_with_opts(host, port, target, headers, &options, handler)
            .await
    }

    pub async fn stream_get_with_opts<F>(
        &self,
        host: &str,
        port: u16,
        target: &str,
        headers: &[(&str, &str)],
        options: &RequestOptions,
        mut handler: F,
    ) -> Result<Response>
    where
        F: FnMut(&[u8], bool) + Send,
    {
        let handler: StreamHandler<'_> = &mut handler;
        self.execute(
            Call {
                method: Method::GET,
                host,
                port,
                target,
                headers,
                body: None,
                options,
                attempt: 1,
            },
            Some(handler),
        )
        .await
    }

    pub fn cookies_enabled(&self) -> bool {
        self.cookies_enabled
    }

    /// Turn the cookie jar on or off. Stored cookies are kept.
    pub fn enable_cookies(&mut self, enabled: bool) {
        self.cookies_enabled = enabled;
    }

    pub fn add_cookie(&self, cookie: Cookie) {
        self.jar().store(cookie, Utc::now());
    }

    pub fn clear_cookies(&self) {
        self.jar().clear();
    }

    /// Snapshot of the cookie jar.
    pub fn cookie_jar(&self) -> CookieJar {
        self.jar().clone()
    }

    pub fn set_metrics_callback<F>(&mut self, callback: F)
    where
        F: Fn(&RequestMetrics) + Send + Sync + 'static,
    {
        self.metrics_callback = Some(std::sync::Arc::new(callback));
    }

    pub fn clear_metrics_callback(&mut self) {
        self.metrics_callback = None;
    }

    pub fn set_redirect_policy(&mut self, policy: RedirectPolicy) {
        self.redirect_policy = policy;
    }

    pub fn redirect_policy(&self) -> RedirectPolicy {
        self.redirect_policy
    }

    /// Idle connections pooled for `(host, port)`.
    pub fn idle_connections(&self, host: &str, port: u16) -> usize {
        self.pool.idle_count(&PoolKey::new(host.to_ascii_lowercase(), port))
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Close every pooled connection. The client stays usable.
    pub fn shutdown(&self) {
        self.pool.clear();
    }

    fn jar(&self) -> MutexGuard<'_, CookieJar> {
        self.jar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one call and report its metrics, whatever the outcome.
    async fn execute(&self, call: Call<'_>, stream: Option<StreamHandler<'_>>) -> Result<Response> {
        let started = Instant::now();
        let mut metrics = RequestMetrics::new(call.method.clone(), call.host, call.port, call.target);
        metrics.attempt = call.attempt;

        let result = self.run(call, stream, &mut metrics).await;

        metrics.elapsed = started.elapsed();
        match &result {
            Ok(response) => metrics.status = Some(response.status),
            Err(e) => {
                metrics.error = Some(e.kind());
                if let Some(status) = e.status() {
                    metrics.status = Some(status);
                }
            }
        }
        if let Some(callback) = &self.metrics_callback {
            callback(&metrics);
        }
        result
    }

    /// The redirect loop.
    async fn run(
        &self,
        call: Call<'_>,
        mut stream: Option<StreamHandler<'_>>,
        metrics: &mut RequestMetrics,
    ) -> Result<Response> {
        let options = call.options;
        let mut url = Url::from_parts("https", call.host, call.port, call.target)?;
        let mut method = call.method;
        let mut body = call.body;
        let mut caller = headers::headers_to_owned(call.headers);
        let mut hops = 0u32;

        loop {
            let mut conn = self
                .acquire(PoolKey::new(url.host(), url.port()), options)
                .await?;
            metrics.reused_connection = conn.reused();

            let cookie = self.cookie_header_for(&url);
            let request_headers = HeaderSet {
                user_agent: &self.user_agent,
                options,
                method: &method,
                has_body: body.is_some(),
                cookie: &cookie,
                caller: &caller,
            }
            .build();
            let request = h1::build_request(&method, &url, &request_headers, body.as_deref())?;

            conn.write_request(&request, options.write_timeout).await?;
            let head = conn.read_head(&method, options.read_timeout).await?;
            metrics.status = Some(head.status);
            self.absorb_cookies(&url, &head);

            if is_redirect_status(head.status) {
                // drain so the connection can go back to the pool
                metrics.bytes_received += conn
                    .read_body(&head, options.read_timeout, |_| Ok(()))
                    .await?;
                drop(conn);

                let location = head
                    .header("location")
                    .ok_or(Error::MissingLocation { status: head.status })?;
                let next = url.resolve(location)?;
                let verb = next_verb(&method, head.status);

                if !self.redirect_policy.allow_hop(&url, &next, &verb) {
                    return Err(Error::RedirectDenied {
                        from: url.to_string(),
                        to: next.to_string(),
                    });
                }
                if !next.is_https() {
                    return Err(Error::InsecureRedirect(next.to_string()));
                }
                if hops >= self.redirect_policy.max_hops {
                    return Err(Error::RedirectLimit { count: hops });
                }

                tracing::debug!(status = head.status, from = %url, to = %next, method = %verb, "following redirect");
                if verb != method && verb == Method::GET {
                    body = None;
                    headers::strip_body_headers(&mut caller);
                }
                if !url.same_origin(&next) {
                    headers::strip_credentials(&mut caller);
                }
                hops += 1;
                metrics.redirects = hops;
                url = next;
                method = verb;
                continue;
            }

            let success = (200..300).contains(&head.status);

            if let (true, Some(handler)) = (success, stream.as_deref_mut()) {
                metrics.bytes_received += conn
                    .read_body(&head, options.read_timeout, |data| {
                        handler(data, false);
                        Ok(())
                    })
                    .await?;
                drop(conn);
                handler(&[], true);
                return Ok(Response::from_head(head, Bytes::new(), url));
            }

            let mut raw = BytesMut::new();
            metrics.bytes_received += conn
                .read_body(&head, options.read_timeout, |data| {
                    raw.extend_from_slice(data);
                    Ok(())
                })
                .await?;
            drop(conn);

            let raw = raw.freeze();
            let content_encoding = head.header("content-encoding").map(str::to_owned);
            if !success {
                // best effort: callers usually want the readable error body
                let body = if options.disable_auto_decode {
                    raw
                } else {
                    decode_body(content_encoding.as_deref(), raw.clone()).unwrap_or(raw)
                };
                return Err(Error::http_status(head.status, body));
            }

            let body = if options.disable_auto_decode {
                raw
            } else {
                decode_body(content_encoding.as_deref(), raw)?
            };
            return Ok(Response::from_head(head, body, url));
        }
    }

    /// Pooled connection for `key` if one is idle and still open, else a new one.
    async fn acquire(&self, key: PoolKey, options: &RequestOptions) -> Result<Checkout<'_>> {
        while let Some(mut conn) = self.pool.take(&key) {
            if conn.is_open().await {
                return Ok(self.pool.checkout(key, conn, true));
            }
            tracing::debug!(host = %key.host, port = key.port, "discarding closed pooled connection");
        }

        let stream = self.connector.connect(&key.host, key.port, options).await?;
        tracing::debug!(host = %key.host, port = key.port, "opened new connection");
        Ok(self.pool.checkout(key, Connection::new(stream), false))
    }

    fn cookie_header_for(&self, url: &Url) -> String {
        if !self.cookies_enabled {
            return String::new();
        }
        let target = url.request_target();
        self.jar()
            .cookie_header_for(url.host(), path_of(&target), url.is_https(), Utc::now())
    }

    /// Store every `Set-Cookie` of a hop, then evict expired cookies.
    fn absorb_cookies(&self, url: &Url, head: &ResponseHead) {
        if !self.cookies_enabled {
            return;
        }
        let target = url.request_target();
        let default_path = path_of(&target);
        let now = Utc::now();
        let mut jar = self.jar();
        let mut stored = 0usize;
        for line in head.headers_all("set-cookie") {
            if jar.store_from_set_cookie(line, url.host(), default_path, url.is_https(), now) {
                stored += 1;
            }
        }
        jar.purge_expired(now);
        if stored > 0 {
            tracing::debug!(host = url.host(), stored, "absorbed cookies");
        }
    }
}
