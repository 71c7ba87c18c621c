//! Cookie core type.
//!
//! The [`Cookie`] struct is what the page cookie jar stores. It can be
//! (de)serialized via `serde`, which makes it easy to snapshot a jar in tests or
//! hand it to a host that mirrors cookies somewhere else.
//!
//! ```rust
//! use consent_engine::cookies::Cookie;
//!
//! let c = Cookie::new("consent_status", "1").with_path("/").with_max_age(31_536_000);
//! assert_eq!(c.to_set_cookie(), "consent_status=1; Path=/; Max-Age=31536000; SameSite=Lax");
//! ```

use serde::{Deserialize, Serialize};

/// A cookie as stored by the page cookie jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value (not URL-decoded).
    pub value: String,

    /// Path scoping (e.g., `"/"`). If `None`, every path on the origin matches.
    pub path: Option<String>,

    /// Domain scoping (host-only if `None`).
    pub domain: Option<String>,

    /// If `true`, cookie is sent only over HTTPS.
    pub secure: bool,

    /// Raw `Expires` attribute, if any. Stored, not enforced.
    pub expires: Option<String>,

    /// `Max-Age` in seconds, if any. A value `<= 0` deletes the cookie.
    pub max_age: Option<i64>,

    /// SameSite policy (`"Strict"`, `"Lax"`, or `"None"`).
    pub same_site: Option<String>,

    /// If `true`, the cookie is invisible to the document cookie string.
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            secure: false,
            expires: None,
            max_age: None,
            same_site: Some("Lax".to_string()),
            http_only: false,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Returns true when the cookie asks to be removed from the jar.
    pub fn is_expired(&self) -> bool {
        matches!(self.max_age, Some(age) if age <= 0)
    }

    /// Serializes the cookie the way a `document.cookie = ...` assignment or a
    /// `Set-Cookie` header would carry it.
    pub fn to_set_cookie(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            out.push_str(&format!("; Path={}", path));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={}", domain));
        }
        if let Some(expires) = &self.expires {
            out.push_str(&format!("; Expires={}", expires));
        }
        if let Some(age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", age));
        }
        if let Some(same_site) = &self.same_site {
            out.push_str(&format!("; SameSite={}", same_site));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}
