//! Minimal absolute URL model and RFC 3986 reference resolution.
//!
//! Only what the client needs: `scheme://authority/path?query`. Fragments
//! are dropped, userinfo is ignored.

use std::fmt;

use crate::error::{Error, Result};

/// Absolute URL split into the pieces a request needs.
///
/// `path` always starts with `/`; `query`, when present, keeps its leading `?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    scheme: String,
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
}

/// Default port for a scheme, if it has one.
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    }
}

impl Url {
    /// Parse an absolute URL.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| Error::invalid_url(format!("missing scheme: {}", input)))?;
        if scheme.is_empty() || !scheme.bytes().all(|b| b.is_ascii_alphanumeric() || b"+-.".contains(&b)) {
            return Err(Error::invalid_url(format!("bad scheme: {}", input)));
        }
        let scheme = scheme.to_ascii_lowercase();

        let rest = strip_fragment(rest);
        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, target) = rest.split_at(authority_end);

        // userinfo is never sent
        let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);
        let (host, port) = split_authority(authority)?;
        if host.is_empty() {
            return Err(Error::invalid_url(format!("missing host: {}", input)));
        }
        let port = match port {
            Some(p) => p,
            None => default_port(&scheme)
                .ok_or_else(|| Error::invalid_url(format!("no port for scheme {}", scheme)))?,
        };

        let (path, query) = split_target(target);
        Ok(Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
            path,
            query,
        })
    }

    /// Build a URL from the `(host, port, target)` triple the client API takes.
    pub fn from_parts(scheme: &str, host: &str, port: u16, target: &str) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::invalid_url("empty host"));
        }
        let (path, query) = split_target(strip_fragment(target));
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
            path,
            query,
        })
    }

    /// Resolve a `Location`-style reference against `self`.
    ///
    /// Absolute and scheme-relative references are parsed directly; absolute
    /// paths replace the path; relative paths are merged with the base
    /// directory. Dot segments are removed in every path case.
    pub fn resolve(&self, location: &str) -> Result<Self> {
        let location = strip_fragment(location.trim());

        if has_scheme(location) {
            return Self::parse(location);
        }
        if location.starts_with("//") {
            return Self::parse(&format!("{}:{}", self.scheme, location));
        }

        let mut next = self.clone();
        if location.is_empty() {
            return Ok(next);
        }
        if location.starts_with('?') {
            next.query = Some(location.to_string());
            return Ok(next);
        }

        let (path, query) = split_target(location);
        let merged = if location.starts_with('/') {
            path
        } else {
            // split_target prefixed '/', undo that for the merge
            let relative = &path[1..];
            let dir_end = self.path.rfind('/').map_or(0, |i| i + 1);
            format!("{}{}", &self.path[..dir_end], relative)
        };
        next.path = remove_dot_segments(&merged);
        next.query = query;
        Ok(next)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// Origin-form request target: path plus query.
    pub fn request_target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// `host[:port]`, omitting the port when it is the scheme default.
    pub fn authority(&self) -> String {
        if default_port(&self.scheme) == Some(self.port) {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Same scheme, host and port.
    pub fn same_origin(&self, other: &Url) -> bool {
        self.scheme == other.scheme && self.host == other.host && self.port == other.port
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority(), self.path)?;
        if let Some(q) = &self.query {
            f.write_str(q)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Url {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Path component of an origin-form target (everything before `?`).
pub fn path_of(target: &str) -> &str {
    let path = target.split(['?', '#']).next().unwrap_or("");
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// True when `s` begins with `scheme://` (the scheme appears before any path or query).
fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(i) => i > 0 && !s[..i].contains(['/', '?']),
        None => false,
    }
}

fn strip_fragment(s: &str) -> &str {
    s.split_once('#').map_or(s, |(before, _)| before)
}

/// Split `host[:port]` on the last colon. Bracketed IPv6 literals keep their brackets.
fn split_authority(authority: &str) -> Result<(&str, Option<u16>)> {
    let (host, port) = if authority.starts_with('[') {
        match authority.find(']') {
            Some(end) => {
                let host = &authority[..=end];
                match authority[end + 1..].strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => (host, None),
                }
            }
            None => return Err(Error::invalid_url(format!("unterminated IPv6 literal: {}", authority))),
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = match port {
        Some("") | None => None,
        Some(p) => Some(
            p.parse::<u16>()
                .map_err(|_| Error::invalid_url(format!("bad port: {}", p)))?,
        ),
    };
    Ok((host, port))
}

/// Split a target into a `/`-prefixed path and an optional `?query`.
fn split_target(target: &str) -> (String, Option<String>) {
    let (path, query) = match target.find('?') {
        Some(i) => (&target[..i], Some(target[i..].to_string())),
        None => (target, None),
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    (path, query)
}

/// RFC 3986 Section 5.2.4.
fn remove_dot_segments(path: &str) -> String {
    let mut input = path;
    let mut output: Vec<&str> = Vec::new();

    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix("../") {
            input = rest;
        } else if let Some(rest) = input.strip_prefix("./") {
            input = rest;
        } else if input.starts_with("/./") {
            input = &input[2..];
        } else if input == "/." {
            input = "/";
        } else if input.starts_with("/../") {
            input = &input[3..];
            output.pop();
        } else if input == "/.." {
            input = "/";
            output.pop();
        } else if input == "." || input == ".." {
            input = "";
        } else {
            let start = usize::from(input.starts_with('/'));
            let end = input[start..].find('/').map_or(input.len(), |i| i + start);
            output.push(&input[..end]);
            input = &input[end..];
        }
    }

    let joined = output.concat();
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}
