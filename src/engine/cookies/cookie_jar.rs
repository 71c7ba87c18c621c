//! Cookie jar abstraction and a simple in-memory implementation.
//!
//! A **cookie jar** represents all cookies visible to the page the widget runs
//! in. It is fed from two directions:
//!
//! - `Set-Cookie` headers on responses to the widget's own requests, and
//! - `document.cookie = "..."` style assignments made by the widget itself when
//!   it records a decision.
//!
//! It answers two questions: which `Cookie` header goes out with a request, and
//! what the *document cookie string* looks like (the same thing without
//! `HttpOnly` cookies).
//!
//! ## Notes & limitations
//! - Parsing is intentionally **minimal**: `Path`, `Domain`, `Expires`,
//!   `Max-Age`, `Secure`, `HttpOnly` and `SameSite` are understood. `Expires` is
//!   stored but not enforced; `Max-Age <= 0` removes the cookie.
//! - Cookies are bucketed by **origin** (`url.origin().ascii_serialization()`).
//!   Within a bucket, simple host/subdomain and path prefix checks are applied.
//!
//! See also: RFC 6265bis (HTTP State Management Mechanism).
//!
use crate::engine::cookies::Cookie;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// A cookie jar keeps the cookies for the page the widget lives on.
pub trait CookieJar: Send {
    /// Stores cookies found in response `headers` for the given `url`.
    ///
    /// Existing entries are replaced when names collide ("last write wins").
    fn store_response_cookies(&mut self, url: &Url, headers: &HeaderMap);

    /// Applies a single `document.cookie = raw` assignment for `url`.
    ///
    /// `HttpOnly` cannot be set from the document and is ignored.
    fn set_document_cookie(&mut self, url: &Url, raw: &str);

    /// Returns the `Cookie` request header value to send for `url`, if any.
    fn get_request_cookies(&self, url: &Url) -> Option<String>;

    /// Returns the document cookie string for `url` (`"a=1; b=2"`), excluding
    /// `HttpOnly` cookies. Empty when nothing matches.
    fn document_cookie(&self, url: &Url) -> String;
}

/// Default cookie jar, **in-memory only**.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultCookieJar {
    /// Cookies bucketed by **origin**.
    ///
    /// Key: origin string from `Url::origin().ascii_serialization()`.
    pub entries: HashMap<String, Vec<Cookie>>,
}

impl DefaultCookieJar {
    /// Creates an empty in-memory cookie jar.
    pub fn new() -> Self {
        DefaultCookieJar {
            entries: HashMap::new(),
        }
    }

    /// Creates a jar pre-filled from a document cookie string such as
    /// `"csrftoken=abc; consent_status=1"`.
    pub fn from_document_cookie(url: &Url, cookie_string: &str) -> Self {
        let mut jar = Self::new();
        for part in cookie_string.split(';') {
            let part = part.trim();
            if !part.is_empty() {
                jar.set_document_cookie(url, &format!("{}; Path=/", part));
            }
        }
        jar
    }

    fn insert(&mut self, url: &Url, cookie: Cookie) {
        let origin = url.origin().ascii_serialization();
        let bucket = self.entries.entry(origin).or_default();

        if cookie.is_expired() {
            bucket.retain(|c| c.name != cookie.name);
            return;
        }

        // Replace existing cookie with same name
        if let Some(existing) = bucket.iter_mut().find(|c| c.name == cookie.name) {
            *existing = cookie;
        } else {
            bucket.push(cookie);
        }
    }

    fn matching<'a>(&'a self, url: &Url) -> impl Iterator<Item = &'a Cookie> + 'a {
        let origin = url.origin().ascii_serialization();
        let host = url.host_str().unwrap_or_default().to_string();
        let path = url.path().to_string();
        let is_https = url.scheme() == "https";

        self.entries
            .get(&origin)
            .into_iter()
            .flatten()
            .filter(move |cookie| {
                // Check domain match
                match &cookie.domain {
                    Some(domain) => host == *domain || host.ends_with(&format!(".{}", domain)),
                    None => true,
                }
            })
            .filter(move |cookie| {
                // Check path match
                match &cookie.path {
                    Some(cookie_path) => path.starts_with(cookie_path.as_str()),
                    None => true,
                }
            })
            .filter(move |cookie| !cookie.secure || is_https)
    }
}

/// Parses a single `Set-Cookie` style string. Returns `None` when there is no
/// `name=value` pair.
fn parse_set_cookie(raw: &str, url: &Url) -> Option<Cookie> {
    let default_path = url
        .path()
        .rsplit_once('/')
        .map_or("/", |(a, _)| if a.is_empty() { "/" } else { a });

    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        path: None,
        domain: None,
        secure: false,
        expires: None,
        max_age: None,
        same_site: None,
        http_only: false,
    };

    for part in parts {
        let part = part.trim();
        if let Some((k, v)) = part.split_once('=') {
            let v = v.trim();
            match k.trim().to_ascii_lowercase().as_str() {
                "path" => cookie.path = Some(v.to_string()),
                "domain" => cookie.domain = Some(v.trim_start_matches('.').to_string()),
                "expires" => cookie.expires = Some(v.to_string()),
                // An unparsable Max-Age is ignored, as browsers do
                "max-age" => cookie.max_age = v.parse().ok(),
                "samesite" => {
                    // normalize to "Lax" | "Strict" | "None"
                    cookie.same_site = Some(if v.eq_ignore_ascii_case("lax") {
                        "Lax".to_string()
                    } else if v.eq_ignore_ascii_case("strict") {
                        "Strict".to_string()
                    } else if v.eq_ignore_ascii_case("none") {
                        "None".to_string()
                    } else {
                        v.to_string()
                    });
                }
                _ => {}
            }
        } else if part.eq_ignore_ascii_case("secure") {
            cookie.secure = true;
        } else if part.eq_ignore_ascii_case("httponly") {
            cookie.http_only = true;
        }
    }

    if cookie.path.is_none() {
        cookie.path = Some(default_path.to_string());
    }

    Some(cookie)
}

impl CookieJar for DefaultCookieJar {
    fn store_response_cookies(&mut self, url: &Url, headers: &HeaderMap) {
        for header in headers.get_all(http::header::SET_COOKIE) {
            let Ok(header_str) = header.to_str() else {
                continue;
            };
            if let Some(cookie) = parse_set_cookie(header_str, url) {
                self.insert(url, cookie);
            }
        }
    }

    fn set_document_cookie(&mut self, url: &Url, raw: &str) {
        if let Some(mut cookie) = parse_set_cookie(raw, url) {
            cookie.http_only = false;
            self.insert(url, cookie);
        }
    }

    fn get_request_cookies(&self, url: &Url) -> Option<String> {
        let header = self
            .matching(url)
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            Some(header)
        }
    }

    fn document_cookie(&self, url: &Url) -> String {
        self.matching(url)
            .filter(|c| !c.http_only)
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
