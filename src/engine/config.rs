//! Widget configuration.
//!
//! `WidgetConfig` controls where the consent widget talks to and which DOM ids it
//! owns. It is built once when the widget is created and never changes afterwards.
//!
//! There are two ways to customize the defaults:
//!
//! - A JSON override, the same shape a page would embed:
//!   `{"cookieName": "...", "endpoints": {"banner": "..."}, "autoLoad": false}`.
//!   Top-level keys replace the defaults, `endpoints` is merged key by key.
//!   Unknown keys make the whole override invalid. [`resolve_config_json`] never
//!   fails: anything malformed falls back to the defaults.
//! - The fluent [`WidgetConfig::builder()`] for the options that are not part of
//!   the page-facing override surface (CSRF names, durations).
//!
//! # Examples
//!
//! ```rust
//! use consent_engine::config::{resolve_config_json, WidgetConfig};
//!
//! let cfg = resolve_config_json(&WidgetConfig::default(), r#"{"endpoints": {"banner": "/c/b/"}}"#);
//! assert_eq!(cfg.endpoints.banner, "/c/b/");
//! assert_eq!(cfg.endpoints.accept_all, "/consent/accept_all/");
//! ```

use crate::engine::errors::ConfigError;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_COOKIE_NAME: &str = "consent_status";
const DEFAULT_BANNER_ENDPOINT: &str = "/consent/banner/";
const DEFAULT_ACCEPT_ALL_ENDPOINT: &str = "/consent/accept_all/";
const DEFAULT_REJECT_ALL_ENDPOINT: &str = "/consent/reject_all/";
const DEFAULT_ACCEPT_ENDPOINT: &str = "/consent/accept/";
const DEFAULT_STATUS_ENDPOINT: &str = "/consent/status/";

/// Server endpoints used by the widget. Relative paths are resolved against the
/// page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// GET, returns the banner fragment (or nothing)
    pub banner: String,
    /// POST, records "accept everything"
    pub accept_all: String,
    /// POST, records "reject everything optional"
    pub reject_all: String,
    /// POST, records a granular category map
    pub accept: String,
    /// GET, returns the current consent status as JSON
    pub status: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            banner: DEFAULT_BANNER_ENDPOINT.to_string(),
            accept_all: DEFAULT_ACCEPT_ALL_ENDPOINT.to_string(),
            reject_all: DEFAULT_REJECT_ALL_ENDPOINT.to_string(),
            accept: DEFAULT_ACCEPT_ENDPOINT.to_string(),
            status: DEFAULT_STATUS_ENDPOINT.to_string(),
        }
    }
}

/// Where the CSRF token comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfConfig {
    /// Cookie holding the token (checked first)
    pub cookie_name: String,
    /// `<meta name=...>` holding the token in its `content` attribute
    pub meta_name: String,
    /// Hidden form field holding the token in its `value` attribute
    pub form_field: String,
    /// Request header the token is sent in
    pub header_name: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrftoken".to_string(),
            meta_name: "csrf-token".to_string(),
            form_field: "csrfmiddlewaretoken".to_string(),
            header_name: "X-CSRFToken".to_string(),
        }
    }
}

/// Complete widget configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetConfig {
    /// Name of the cookie holding the consent decision
    pub cookie_name: String,
    /// Server endpoints
    pub endpoints: Endpoints,
    /// Id of the mount point the banner is rendered into
    pub banner_slot_id: String,
    /// Id of the banner root element
    pub banner_id: String,
    /// Id of the toast container
    pub toasts_id: String,
    /// Fetch the banner as soon as the page is ready
    pub auto_load: bool,
    /// CSRF token sources
    pub csrf: CsrfConfig,
    /// Lifetime of toasts originating from banner actions
    pub banner_toast_duration: Duration,
    /// Lifetime of toasts shown through the general toast API
    pub toast_duration: Duration,
    /// Quiet period before a granular save is submitted
    pub save_debounce: Duration,
    /// Max-Age of the decision cookie written by the widget
    pub decision_max_age: Duration,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            endpoints: Endpoints::default(),
            banner_slot_id: "consent-banner-slot".to_string(),
            banner_id: "consent-banner".to_string(),
            toasts_id: "app-toasts".to_string(),
            auto_load: true,
            csrf: CsrfConfig::default(),
            banner_toast_duration: Duration::from_millis(3500),
            toast_duration: Duration::from_millis(5000),
            save_debounce: Duration::from_millis(250),
            decision_max_age: Duration::from_secs(31_536_000),
        }
    }
}

impl WidgetConfig {
    pub fn builder() -> WidgetConfigBuilder {
        WidgetConfigBuilder::default()
    }
}

/// Page-facing override. Every field is optional; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverride {
    pub cookie_name: Option<String>,
    pub endpoints: Option<EndpointsOverride>,
    pub banner_slot_id: Option<String>,
    pub banner_id: Option<String>,
    pub toasts_id: Option<String>,
    pub auto_load: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndpointsOverride {
    pub banner: Option<String>,
    pub accept_all: Option<String>,
    pub reject_all: Option<String>,
    pub accept: Option<String>,
    pub status: Option<String>,
}

impl ConfigOverride {
    /// Parses an override from JSON.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

/// Merges `ov` over `defaults`. Pure; the result is validated and any invalid
/// outcome is reported instead of returned.
pub fn resolve_config(defaults: &WidgetConfig, ov: &ConfigOverride) -> Result<WidgetConfig, ConfigError> {
    let mut cfg = defaults.clone();

    if let Some(v) = &ov.cookie_name {
        cfg.cookie_name = v.clone();
    }
    if let Some(v) = &ov.banner_slot_id {
        cfg.banner_slot_id = v.clone();
    }
    if let Some(v) = &ov.banner_id {
        cfg.banner_id = v.clone();
    }
    if let Some(v) = &ov.toasts_id {
        cfg.toasts_id = v.clone();
    }
    if let Some(v) = ov.auto_load {
        cfg.auto_load = v;
    }

    if let Some(ep) = &ov.endpoints {
        let target = &mut cfg.endpoints;
        for (slot, value) in [
            (&mut target.banner, &ep.banner),
            (&mut target.accept_all, &ep.accept_all),
            (&mut target.reject_all, &ep.reject_all),
            (&mut target.accept, &ep.accept),
            (&mut target.status, &ep.status),
        ] {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
    }

    validate(&cfg)?;
    Ok(cfg)
}

/// Resolves a JSON override. Never fails: a malformed override, an unknown key or
/// an invalid merged value all result in `defaults`.
pub fn resolve_config_json(defaults: &WidgetConfig, raw: &str) -> WidgetConfig {
    match ConfigOverride::from_json(raw).and_then(|ov| resolve_config(defaults, &ov)) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!("WidgetConfig: ignoring override, using defaults: {}", e);
            defaults.clone()
        }
    }
}

/// Builder for [`WidgetConfig`].
#[derive(Debug, Clone, Default)]
pub struct WidgetConfigBuilder {
    inner: WidgetConfig,
}

impl WidgetConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut WidgetConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn cookie_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.cookie_name = name.into()) }
    pub fn banner_endpoint<S: Into<String>>(self, path: S) -> Self { self.map(|c| c.endpoints.banner = path.into()) }
    pub fn accept_all_endpoint<S: Into<String>>(self, path: S) -> Self { self.map(|c| c.endpoints.accept_all = path.into()) }
    pub fn reject_all_endpoint<S: Into<String>>(self, path: S) -> Self { self.map(|c| c.endpoints.reject_all = path.into()) }
    pub fn accept_endpoint<S: Into<String>>(self, path: S) -> Self { self.map(|c| c.endpoints.accept = path.into()) }
    pub fn status_endpoint<S: Into<String>>(self, path: S) -> Self { self.map(|c| c.endpoints.status = path.into()) }
    pub fn banner_slot_id<S: Into<String>>(self, id: S) -> Self { self.map(|c| c.banner_slot_id = id.into()) }
    pub fn banner_id<S: Into<String>>(self, id: S) -> Self { self.map(|c| c.banner_id = id.into()) }
    pub fn toasts_id<S: Into<String>>(self, id: S) -> Self { self.map(|c| c.toasts_id = id.into()) }
    pub fn auto_load(self, on: bool) -> Self { self.map(|c| c.auto_load = on) }
    pub fn csrf(self, csrf: CsrfConfig) -> Self { self.map(|c| c.csrf = csrf) }
    pub fn banner_toast_duration(self, d: Duration) -> Self { self.map(|c| c.banner_toast_duration = d) }
    pub fn toast_duration(self, d: Duration) -> Self { self.map(|c| c.toast_duration = d) }
    pub fn save_debounce(self, d: Duration) -> Self { self.map(|c| c.save_debounce = d) }
    pub fn decision_max_age(self, d: Duration) -> Self { self.map(|c| c.decision_max_age = d) }

    /// Apply a page-facing override on top of what has been set so far.
    pub fn apply(self, ov: &ConfigOverride) -> Result<Self, ConfigError> {
        let inner = resolve_config(&self.inner, ov)?;
        Ok(Self { inner })
    }

    /// Validate and build the final config.
    pub fn build(self) -> Result<WidgetConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

fn validate(c: &WidgetConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("cookieName", &c.cookie_name),
        ("bannerSlotId", &c.banner_slot_id),
        ("bannerId", &c.banner_id),
        ("toastsId", &c.toasts_id),
        ("csrf.cookieName", &c.csrf.cookie_name),
        ("csrf.headerName", &c.csrf.header_name),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue { field });
        }
    }

    for (field, value) in [
        ("endpoints.banner", &c.endpoints.banner),
        ("endpoints.acceptAll", &c.endpoints.accept_all),
        ("endpoints.rejectAll", &c.endpoints.reject_all),
        ("endpoints.accept", &c.endpoints.accept),
        ("endpoints.status", &c.endpoints.status),
    ] {
        if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidEndpoint { field, value: value.clone() });
        }
    }

    if http::HeaderName::from_bytes(c.csrf.header_name.as_bytes()).is_err() {
        return Err(ConfigError::EmptyValue { field: "csrf.headerName" });
    }

    for (field, d) in [
        ("bannerToastDuration", c.banner_toast_duration),
        ("toastDuration", c.toast_duration),
        ("saveDebounce", c.save_debounce),
    ] {
        if d.is_zero() {
            return Err(ConfigError::ZeroDuration { field });
        }
    }

    Ok(())
}
