//! RFC 6265 style cookies.
//!
//! `Set-Cookie` parsing and `Cookie` header assembly. Storage and selection
//! live in [`jar`].

mod jar;

pub use jar::CookieJar;

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

/// SameSite attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "lax" => Some(Self::Lax),
            "strict" => Some(Self::Strict),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// A single cookie as stored in the jar.
///
/// `domain` never carries a leading dot and `path` defaults to `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub partitioned: bool,
    pub same_site: Option<SameSite>,
    pub max_age: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            partitioned: false,
            same_site: None,
            max_age: None,
            expires: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        if same_site == SameSite::None {
            self.secure = true;
        }
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Expired when `max_age <= 0` or `now >= expires`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if matches!(self.max_age, Some(age) if age <= 0) {
            return true;
        }
        matches!(self.expires, Some(expires) if now >= expires)
    }

    /// Exact host equality.
    ///
    /// No RFC 6265 suffix matching: a `Domain=example.com` cookie is not
    /// sent to `api.example.com`.
    pub fn domain_matches(&self, host: &str) -> bool {
        self.domain == normalize_domain(host)
    }

    /// RFC 6265 Section 5.1.4 path-match.
    pub fn path_matches(&self, request_path: &str) -> bool {
        if request_path == self.path {
            return true;
        }
        if !request_path.starts_with(&self.path) {
            return false;
        }
        self.path.ends_with('/') || request_path.as_bytes().get(self.path.len()) == Some(&b'/')
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Parse one `Set-Cookie` value, using the current time for `Max-Age`.
///
/// See [`parse_set_cookie_at`].
pub fn parse_set_cookie(
    line: &str,
    default_domain: &str,
    default_path: &str,
    from_https: bool,
) -> Option<Cookie> {
    parse_set_cookie_at(line, default_domain, default_path, from_https, Utc::now())
}

/// Parse one `Set-Cookie` value.
///
/// Returns `None` when the first segment has no `=`, the name is empty, or a
/// `Secure` cookie arrives over plain HTTP. A positive `Max-Age` is turned
/// into an absolute `expires` relative to `now` and takes precedence over
/// `Expires`.
pub fn parse_set_cookie_at(
    line: &str,
    default_domain: &str,
    default_path: &str,
    from_https: bool,
    now: DateTime<Utc>,
) -> Option<Cookie> {
    let mut parts = line.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie::new(name, value.trim(), default_domain);
    cookie.path = if default_path.starts_with('/') {
        default_path.to_string()
    } else {
        "/".to_string()
    };

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "expires" => {
                if let Some(dt) = parse_cookie_date(val) {
                    cookie.expires = Some(dt);
                }
            }
            "max-age" => {
                if let Ok(age) = val.parse::<i64>() {
                    cookie.max_age = Some(age);
                }
            }
            "domain" if !val.is_empty() => cookie.domain = normalize_domain(val),
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            "samesite" => {
                if let Some(same_site) = SameSite::parse(val) {
                    cookie = cookie.with_same_site(same_site);
                }
            }
            "partitioned" => {
                cookie.partitioned = true;
                cookie.secure = true;
            }
            _ => {}
        }
    }

    if let Some(age) = cookie.max_age.filter(|age| *age > 0) {
        cookie.expires = Duration::try_seconds(age).and_then(|d| now.checked_add_signed(d));
    }

    if cookie.secure && !from_https {
        return None;
    }
    Some(cookie)
}

/// Join `name=value` pairs with `"; "`, keeping input order and skipping empty names.
pub fn build_cookie_header<'a>(cookies: impl IntoIterator<Item = &'a Cookie>) -> String {
    cookies
        .into_iter()
        .filter(|c| !c.name.is_empty())
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim();
    let domain = domain.strip_prefix('.').unwrap_or(domain);
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    domain.to_ascii_lowercase()
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        // two-digit years first: %Y would read "94" as year 94
        "%a, %d-%b-%y %H:%M:%S GMT",
        "%a, %d-%b-%Y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(naive.and_utc());
        }
    }
    date_str
        .parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}
