//! Request header assembly.
//!
//! The client builds every request's headers in one place: its defaults
//! first, then the jar's `Cookie`, then whatever the caller passed, with
//! caller headers replacing defaults of the same name. `Host`,
//! `Connection` and `Content-Length` are added by the HTTP/1.1 writer.

use http::Method;

use crate::options::RequestOptions;

/// `User-Agent` sent when the builder does not set one.
pub const DEFAULT_USER_AGENT: &str = concat!("outbound/", env!("CARGO_PKG_VERSION"));

/// `Content-Type` for request bodies unless the caller overrides it.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Headers that carry caller credentials; dropped on cross-origin redirects.
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization"];

/// Headers that describe a request body; dropped when a redirect turns the
/// request into a bodiless GET.
const BODY_HEADERS: &[&str] = &["content-type", "content-length", "transfer-encoding"];

/// Inputs for one hop's headers.
pub struct HeaderSet<'a> {
    pub user_agent: &'a str,
    pub options: &'a RequestOptions,
    pub method: &'a Method,
    pub has_body: bool,
    /// Serialized jar cookies for this hop; empty for none.
    pub cookie: &'a str,
    pub caller: &'a [(String, String)],
}

impl HeaderSet<'_> {
    /// Final header list in send order.
    pub fn build(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = Vec::with_capacity(6 + self.caller.len());
        headers.push(("User-Agent".into(), self.user_agent.into()));
        if !self.options.accept.is_empty() {
            headers.push(("Accept".into(), self.options.accept.clone()));
        }
        if !self.options.accept_encoding.is_empty() {
            headers.push(("Accept-Encoding".into(), self.options.accept_encoding.clone()));
        }
        if !self.cookie.is_empty() {
            headers.push(("Cookie".into(), self.cookie.into()));
        }
        if self.has_body && *self.method != Method::GET {
            headers.push(("Content-Type".into(), DEFAULT_CONTENT_TYPE.into()));
        }
        with_overrides(headers, self.caller)
    }
}

/// Append `overrides`, first removing defaults with the same names.
///
/// A caller `Host` is ignored; the request line's authority always wins.
pub fn with_overrides(
    mut defaults: Vec<(String, String)>,
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    defaults.retain(|(name, _)| !overrides.iter().any(|(o, _)| o.eq_ignore_ascii_case(name)));
    defaults.extend(
        overrides
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
            .cloned(),
    );
    defaults
}

/// Remove caller credentials before following a redirect to another origin.
pub fn strip_credentials(headers: &mut Vec<(String, String)>) {
    remove_named(headers, CREDENTIAL_HEADERS);
}

/// Remove body-describing headers once a redirect has dropped the body.
pub fn strip_body_headers(headers: &mut Vec<(String, String)>) {
    remove_named(headers, BODY_HEADERS);
}

fn remove_named(headers: &mut Vec<(String, String)>, names: &[&str]) {
    headers.retain(|(name, _)| !names.iter().any(|n| name.eq_ignore_ascii_case(n)));
}

/// Convert borrowed header pairs to owned.
pub fn headers_to_owned(headers: &[(&str, &str)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}
