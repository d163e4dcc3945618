//! Final HTTP response returned to callers.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::transport::h1::ResponseHead;
use crate::url::Url;

/// A successful (2xx) response with its body already content-decoded,
/// unless decoding was disabled for the request.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body: Bytes,
    http_version: &'static str,
    url: Url,
}

impl Response {
    pub(crate) fn from_head(head: ResponseHead, body: Bytes, url: Url) -> Self {
        Self {
            status: head.status,
            http_version: head.version_str(),
            headers: head.headers,
            body,
            url,
        }
    }

    pub fn http_version(&self) -> &str {
        self.http_version
    }

    /// URL that produced this response, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of the named header, in arrival order.
    pub fn headers_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(Error::from)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}
