use crate::engine::errors::NetError;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use url::Url;

/// Identifies one outbound request until its response is delivered back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Why a request was issued. Decides how its response is handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// GET of the banner fragment
    Banner,
    /// Accept-all form post
    AcceptAll,
    /// Reject-all form post
    RejectAll,
    /// Debounced granular save
    SavePreferences,
    /// Consent status query
    Status,
}

impl Display for RequestKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Banner => write!(f, "banner"),
            RequestKind::AcceptAll => write!(f, "accept-all"),
            RequestKind::RejectAll => write!(f, "reject-all"),
            RequestKind::SavePreferences => write!(f, "save-preferences"),
            RequestKind::Status => write!(f, "status"),
        }
    }
}

/// A fully resolved HTTP request, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, NetError> {
        let invalid = || NetError::InvalidHeader { name: name.to_string() };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn with_form(mut self, pairs: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = Some(body.into_bytes());
        self
    }

    /// JSON body.
    pub fn with_json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self, NetError> {
        let body = serde_json::to_vec(payload).map_err(|e| NetError::Encode(e.to_string()))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(body);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text, for logging and tests.
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// A request the widget wants sent. Collected by the driver and answered with
/// the matching [`RequestId`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub request: Request,
}
