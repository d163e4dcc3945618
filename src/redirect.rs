//! Redirect following rules.
//!
//! Method rewriting follows browsers rather than strict RFC 9110: a POST
//! answered with 301 or 302 is replayed as GET.

use http::Method;

use crate::url::Url;

/// Which redirect hops the client may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    /// Never follow.
    FollowNone,
    /// Follow only when the next request is GET or HEAD.
    SafeOnly,
    /// Follow only when scheme, host and port are unchanged.
    SameOrigin,
    /// Follow every hop.
    #[default]
    FollowAll,
}

/// Redirect policy: hop budget plus a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub max_hops: u32,
    pub mode: RedirectMode,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            max_hops: 5,
            mode: RedirectMode::FollowAll,
        }
    }
}

impl RedirectPolicy {
    pub fn new(max_hops: u32, mode: RedirectMode) -> Self {
        Self { max_hops, mode }
    }

    /// Policy that never follows.
    pub fn none() -> Self {
        Self::new(0, RedirectMode::FollowNone)
    }

    /// Whether the hop `from -> to` may be taken with `verb`.
    pub fn allow_hop(&self, from: &Url, to: &Url, verb: &Method) -> bool {
        match self.mode {
            RedirectMode::FollowNone => false,
            RedirectMode::SafeOnly => *verb == Method::GET || *verb == Method::HEAD,
            RedirectMode::SameOrigin => from.same_origin(to),
            RedirectMode::FollowAll => true,
        }
    }
}

/// 301, 302, 303, 307 or 308.
pub fn is_redirect_status(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Method for the next hop.
///
/// 307/308 keep the method, 303 always becomes GET, 301/302 turn POST into GET.
pub fn next_verb(current: &Method, status: u16) -> Method {
    match status {
        307 | 308 => current.clone(),
        303 => Method::GET,
        _ if *current == Method::POST => Method::GET,
        _ => current.clone(),
    }
}
