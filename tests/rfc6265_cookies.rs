//! RFC 6265 Cookie Compliance Tests
//!
//! https://www.rfc-editor.org/rfc/rfc6265

use chrono::{Duration, TimeZone, Utc};
use outbound::cookie::{parse_set_cookie, Cookie, CookieJar, SameSite};

mod helpers;
use helpers::mock_server::{redirect, response, MockTlsServer};

fn now() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_750_000_000, 0).unwrap()
}

#[test]
fn test_secure_flag_enforcement_rfc6265_section_5_4() {
    let mut jar = CookieJar::new();
    jar.store(Cookie::new("secure_cookie", "val", "example.com").with_secure(true), now());

    assert_eq!(jar.cookie_header_for("example.com", "/foo", false, now()), "");
    assert_eq!(
        jar.cookie_header_for("example.com", "/foo", true, now()),
        "secure_cookie=val"
    );
}

#[test]
fn test_samesite_none_requires_secure_rfc6265bis() {
    let c = parse_set_cookie("name=val; SameSite=None; Domain=example.com", "example.com", "/", true)
        .unwrap();
    assert_eq!(c.same_site, Some(SameSite::None));
    assert!(c.secure, "SameSite=None cookie stored without Secure flag");
}

#[test]
fn test_cookie_parsing_rfc6265_section_5_2() {
    let c = parse_set_cookie("SID=31d4d96e407aad42", "example.com", "/test", true).unwrap();
    assert_eq!(c.name, "SID");
    assert_eq!(c.value, "31d4d96e407aad42");
    assert_eq!(c.domain, "example.com");
    assert_eq!(c.path, "/test");

    let c = parse_set_cookie(
        "SID=31d4d96e407aad42; Path=/; Domain=example.com; Secure; HttpOnly",
        "other.example",
        "/test",
        true,
    )
    .unwrap();
    assert_eq!(c.path, "/");
    assert_eq!(c.domain, "example.com");
    assert!(c.secure);
    assert!(c.http_only);
}

#[test]
fn test_date_formats_rfc6265_section_5_1_1() {
    let expected = Utc.timestamp_opt(784111777, 0).unwrap();
    for line in [
        "a=b; Expires=Sun, 06 Nov 1994 08:49:37 GMT",
        "a=b; Expires=Sunday, 06-Nov-94 08:49:37 GMT",
        "a=b; Expires=Sun Nov  6 08:49:37 1994",
    ] {
        let c = parse_set_cookie(line, "example.com", "/", true).unwrap();
        assert_eq!(c.expires, Some(expected), "{}", line);
    }
}

#[test]
fn test_domain_matching_is_exact_host() {
    let c = Cookie::new("a", "b", "example.com");
    assert!(c.domain_matches("example.com"));
    assert!(!c.domain_matches("foo.example.com"));
    assert!(!c.domain_matches("example.org"));
}

#[test]
fn test_path_matching_rfc6265_section_5_1_4() {
    let c = Cookie::new("a", "b", "example.com").with_path("/foo");
    assert!(c.path_matches("/foo"));
    assert!(c.path_matches("/foo/bar"));
    assert!(c.path_matches("/foo/"));
    assert!(!c.path_matches("/bar"));
    assert!(!c.path_matches("/fo"));
    assert!(!c.path_matches("/foobar"));
}

#[test]
fn test_cookie_round_trip() {
    let mut jar = CookieJar::new();
    assert!(jar.store_from_set_cookie(
        "id=42; Domain=example.com; Path=/; Max-Age=60",
        "example.com",
        "/",
        true,
        now(),
    ));
    assert_eq!(jar.cookie_header_for("example.com", "/foo", true, now()), "id=42");
}

#[test]
fn test_cookie_expiry_removes_prior_entry() {
    let mut jar = CookieJar::new();
    jar.store_from_set_cookie("id=42; Domain=example.com; Path=/; Max-Age=60", "example.com", "/", true, now());
    jar.store_from_set_cookie("id=42; Domain=example.com; Path=/; Max-Age=0", "example.com", "/", true, now());
    assert!(jar.matching("example.com", "/foo", true, now()).is_empty());
    assert!(jar.is_empty());
}

#[test]
fn test_cookie_jar_path_order_rfc6265_section_5_4() {
    let mut jar = CookieJar::new();
    jar.store_from_set_cookie("outer=1; Path=/a", "example.com", "/", true, now());
    jar.store_from_set_cookie("inner=2; Path=/a/b", "example.com", "/", true, now());
    jar.store_from_set_cookie("other=3; Path=/z", "example.com", "/", true, now());

    let names: Vec<&str> = jar
        .matching("example.com", "/a/b/c", true, now())
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["inner", "outer"]);
    assert_eq!(jar.cookie_header_for("example.com", "/a/b/c", true, now()), "inner=2; outer=1");
}

#[test]
fn test_expired_cookies_not_sent() {
    let mut jar = CookieJar::new();
    jar.store_from_set_cookie("short=1; Max-Age=10", "example.com", "/", true, now());
    assert_eq!(jar.cookie_header_for("example.com", "/", true, now()), "short=1");
    let later = now() + Duration::seconds(11);
    assert_eq!(jar.cookie_header_for("example.com", "/", true, later), "");
    jar.purge_expired(later);
    assert!(jar.is_empty());
}

// --- Client integration ---

#[tokio::test]
async fn test_client_stores_and_sends_cookies() {
    let server = MockTlsServer::start(|req| match req.target.as_str() {
        "/login" => response(200, &[("Set-Cookie", "session=abc; Path=/; HttpOnly")], b"{}"),
        _ => response(200, &[], b"{}"),
    })
    .await;
    let client = server.client();

    client.get("127.0.0.1", server.port(), "/login", &[]).await.unwrap();
    client.get("127.0.0.1", server.port(), "/me", &[]).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].header("cookie"), None);
    assert_eq!(requests[1].header("cookie"), Some("session=abc"));
    assert_eq!(client.cookie_jar().len(), 1);
}

#[tokio::test]
async fn test_client_max_age_zero_clears_cookie() {
    let server = MockTlsServer::start(|req| match req.target.as_str() {
        "/login" => response(200, &[("Set-Cookie", "session=abc; Path=/")], b""),
        "/logout" => response(200, &[("Set-Cookie", "session=; Path=/; Max-Age=0")], b""),
        _ => response(200, &[], b""),
    })
    .await;
    let client = server.client();
    let port = server.port();

    client.get("127.0.0.1", port, "/login", &[]).await.unwrap();
    client.get("127.0.0.1", port, "/logout", &[]).await.unwrap();
    client.get("127.0.0.1", port, "/me", &[]).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[1].header("cookie"), Some("session=abc"));
    assert_eq!(requests[2].header("cookie"), None);
    assert!(client.cookie_jar().is_empty());
}

#[tokio::test]
async fn test_cookies_absorbed_on_redirect_hop() {
    let server = MockTlsServer::start(|req| match req.target.as_str() {
        "/start" => {
            let mut r = redirect(302, "/landing");
            // splice a Set-Cookie into the redirect head
            let at = r.windows(2).position(|w| w == b"\r\n").unwrap() + 2;
            r.splice(at..at, b"Set-Cookie: hop=1; Path=/\r\n".iter().copied());
            r
        }
        _ => response(200, &[], b"done"),
    })
    .await;
    let client = server.client();

    let resp = client.get("127.0.0.1", server.port(), "/start", &[]).await.unwrap();
    assert_eq!(resp.text().unwrap(), "done");
    assert_eq!(server.requests()[1].header("cookie"), Some("hop=1"));
}

#[tokio::test]
async fn test_disabled_cookies_are_neither_stored_nor_sent() {
    let server =
        MockTlsServer::start(|_| response(200, &[("Set-Cookie", "a=1; Path=/")], b"")).await;
    let mut client = server.client();
    client.enable_cookies(false);
    client.add_cookie(Cookie::new("manual", "x", "127.0.0.1"));

    client.get("127.0.0.1", server.port(), "/", &[]).await.unwrap();
    client.get("127.0.0.1", server.port(), "/", &[]).await.unwrap();

    assert!(server.requests().iter().all(|r| r.header("cookie").is_none()));
    assert_eq!(client.cookie_jar().len(), 1);

    client.enable_cookies(true);
    client.get("127.0.0.1", server.port(), "/", &[]).await.unwrap();
    assert_eq!(server.requests()[2].header("cookie"), Some("manual=x"));
}

#[tokio::test]
async fn test_add_and_clear_cookies() {
    let server = MockTlsServer::start(|_| response(200, &[], b"")).await;
    let client = server.client();
    client.add_cookie(Cookie::new("token", "t1", "127.0.0.1").with_path("/api"));

    client.get("127.0.0.1", server.port(), "/api/x", &[]).await.unwrap();
    client.get("127.0.0.1", server.port(), "/other", &[]).await.unwrap();
    client.clear_cookies();
    client.get("127.0.0.1", server.port(), "/api/x", &[]).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].header("cookie"), Some("token=t1"));
    assert_eq!(requests[1].header("cookie"), None);
    assert_eq!(requests[2].header("cookie"), None);
}

#[tokio::test]
async fn test_client_ignores_cookie_for_other_domain() {
    let server = MockTlsServer::start(|_| {
        response(
            200,
            &[
                ("Set-Cookie", "planted=1; Domain=api.example.com; Path=/"),
                ("Set-Cookie", "own=2; Path=/"),
            ],
            b"",
        )
    })
    .await;
    let client = server.client();

    client.get("127.0.0.1", server.port(), "/", &[]).await.unwrap();

    let jar = client.cookie_jar();
    assert_eq!(jar.len(), 1);
    assert!(jar.get("api.example.com", "planted", "/").is_none());
    assert!(jar.get("127.0.0.1", "own", "/").is_some());
}

#[tokio::test]
async fn test_client_default_cookie_path_is_request_path() {
    let server = MockTlsServer::start(|req| match req.target.as_str() {
        "/api/login?next=/home" => response(200, &[("Set-Cookie", "sid=1")], b""),
        _ => response(200, &[], b""),
    })
    .await;
    let client = server.client();
    let port = server.port();

    client.get("127.0.0.1", port, "/api/login?next=/home", &[]).await.unwrap();
    client.get("127.0.0.1", port, "/api/login/step2", &[]).await.unwrap();
    client.get("127.0.0.1", port, "/api/other", &[]).await.unwrap();

    assert!(client.cookie_jar().get("127.0.0.1", "sid", "/api/login").is_some());
    let requests = server.requests();
    assert_eq!(requests[1].header("cookie"), Some("sid=1"));
    assert_eq!(requests[2].header("cookie"), None);
}
