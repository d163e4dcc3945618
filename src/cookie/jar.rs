//! Per-domain cookie storage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{build_cookie_header, normalize_domain, parse_set_cookie_at, Cookie};

/// Cookie jar keyed by exact domain.
///
/// Holds at most one cookie per `(domain, name, path)`; storing again replaces it.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: HashMap<String, Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a cookie.
    ///
    /// A cookie that is already expired at `now` is not stored; instead any
    /// existing cookie with the same key is deleted. This is how servers clear
    /// cookies.
    pub fn store(&mut self, mut cookie: Cookie, now: DateTime<Utc>) {
        cookie.domain = normalize_domain(&cookie.domain);
        if cookie.path.is_empty() {
            cookie.path = "/".to_string();
        }

        if cookie.is_expired(now) {
            if self.remove(&cookie.domain, &cookie.name, &cookie.path).is_some() {
                tracing::debug!(domain = %cookie.domain, name = %cookie.name, "cookie cleared by expired Set-Cookie");
            }
            return;
        }

        let bucket = self.cookies.entry(cookie.domain.clone()).or_default();
        match bucket
            .iter_mut()
            .find(|c| c.name == cookie.name && c.path == cookie.path)
        {
            Some(existing) => *existing = cookie,
            None => bucket.push(cookie),
        }
    }

    /// Parse a `Set-Cookie` value and store it. Returns false when the line was rejected.
    ///
    /// Matching is exact, so a `Domain` attribute naming any host other than
    /// `default_domain` could only plant cookies for that other host. Such
    /// lines are rejected.
    pub fn store_from_set_cookie(
        &mut self,
        line: &str,
        default_domain: &str,
        default_path: &str,
        from_https: bool,
        now: DateTime<Utc>,
    ) -> bool {
        match parse_set_cookie_at(line, default_domain, default_path, from_https, now) {
            Some(cookie) if cookie.domain != normalize_domain(default_domain) => {
                tracing::warn!(
                    domain = default_domain,
                    cookie_domain = %cookie.domain,
                    "ignoring Set-Cookie for a foreign domain"
                );
                false
            }
            Some(cookie) => {
                self.store(cookie, now);
                true
            }
            None => {
                tracing::warn!(domain = default_domain, "ignoring malformed Set-Cookie");
                false
            }
        }
    }

    /// Cookies to send for a request, most specific path first.
    pub fn matching(&self, host: &str, path: &str, is_https: bool, now: DateTime<Utc>) -> Vec<&Cookie> {
        let mut found: Vec<&Cookie> = self
            .cookies
            .values()
            .flatten()
            .filter(|c| c.domain_matches(host))
            .filter(|c| c.path_matches(path))
            .filter(|c| !c.is_expired(now))
            .filter(|c| is_https || !c.secure)
            .collect();
        // stable: equal-length paths keep insertion order
        found.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        found
    }

    /// `Cookie` header value for a request; empty when nothing matches.
    pub fn cookie_header_for(&self, host: &str, path: &str, is_https: bool, now: DateTime<Utc>) -> String {
        build_cookie_header(self.matching(host, path, is_https, now))
    }

    /// Drop expired cookies and empty domain buckets.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        for bucket in self.cookies.values_mut() {
            bucket.retain(|c| !c.is_expired(now));
        }
        self.cookies.retain(|_, bucket| !bucket.is_empty());
    }

    pub fn get(&self, domain: &str, name: &str, path: &str) -> Option<&Cookie> {
        self.cookies
            .get(&normalize_domain(domain))?
            .iter()
            .find(|c| c.name == name && c.path == path)
    }

    pub fn remove(&mut self, domain: &str, name: &str, path: &str) -> Option<Cookie> {
        let domain = normalize_domain(domain);
        let bucket = self.cookies.get_mut(&domain)?;
        let idx = bucket.iter().position(|c| c.name == name && c.path == path)?;
        let removed = bucket.remove(idx);
        if bucket.is_empty() {
            self.cookies.remove(&domain);
        }
        Some(removed)
    }

    pub fn cookies(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.values().flatten()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn len(&self) -> usize {
        self.cookies.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}
