//! The consent widget core.
//!
//! [`ConsentWidget`] is a sans-IO state machine. It never touches the network
//! or a clock on its own: the driver feeds it commands, responses and ticks
//! together with the current [`Instant`], then collects the requests it wants
//! sent with [`ConsentWidget::take_outbound`] and its notifications with
//! [`ConsentWidget::drain_events`].
//!
//! Lifecycle:
//!
//! ```text
//! Unloaded -> Checking -> NoBannerNeeded
//!                      -> Fetching -> Mounted -> Dismissed
//!                                  -> Dismissed
//!          (decision recorded)     -> Dismissed
//! ```
//!
//! No public entry point returns an error. Internal failures are logged and
//! reported as [`WidgetEvent::Warning`], and the widget carries on.

use crate::engine::banner::{BannerController, BannerState, ControlKind, RenderOutcome};
use crate::engine::config::WidgetConfig;
use crate::engine::cookies::{has_recorded_decision, ConsentDecision, Cookie, CookieJar, DefaultCookieJar};
use crate::engine::dom::{Document, NodeId};
use crate::engine::errors::{NetError, WidgetError};
use crate::engine::events::{WidgetCommand, WidgetEvent};
use crate::engine::net::{PendingRequest, Request, RequestClient, RequestId, RequestKind, Response};
use crate::engine::preferences::{collect_preferences, set_checked, PreferenceSaver};
use crate::engine::status::ConsentStatus;
use crate::engine::tick::TickResult;
use crate::engine::toast::{ToastBridge, ToastHost};
use crate::engine::triggers::{self, TriggerActions};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use url::Url;

pub const ACCEPTED_ALL_MESSAGE: &str = "You have accepted all optional cookies.";
pub const REJECTED_MESSAGE: &str = "You rejected optional cookies.";
pub const SAVED_MESSAGE: &str = "Your preferences have been saved.";
pub const SAVE_FAILED_MESSAGE: &str = "We could not save your choice. Please try again.";

/// Category that is always on, whatever the user picks.
const REQUIRED_CATEGORY: &str = "functional";

pub struct ConsentWidget {
    config: WidgetConfig,
    document: Document,
    jar: Box<dyn CookieJar>,
    client: RequestClient,
    banner: BannerController,
    toasts: ToastBridge,
    saver: PreferenceSaver,

    next_request: u64,
    outbound: Vec<PendingRequest>,
    in_flight: HashMap<RequestId, RequestKind>,
    // Payload of each in-flight granular save
    pending_saves: HashMap<RequestId, BTreeMap<String, bool>>,
    // Only the latest banner fetch may render
    banner_request: Option<RequestId>,
    // Outstanding accept-all / reject-all post
    decision_request: Option<RequestId>,

    events: Vec<WidgetEvent>,
    unloaded: bool,
}

impl ConsentWidget {
    /// Creates a widget for the page at `page_url`, rendering into `document`.
    pub fn new(config: WidgetConfig, page_url: Url, document: Document) -> Self {
        Self::with_cookie_jar(config, page_url, document, Box::new(DefaultCookieJar::new()))
    }

    pub fn with_cookie_jar(config: WidgetConfig, page_url: Url, document: Document, jar: Box<dyn CookieJar>) -> Self {
        Self {
            client: RequestClient::new(page_url, config.csrf.clone()),
            banner: BannerController::new(&config),
            toasts: ToastBridge::new(config.toasts_id.clone()),
            saver: PreferenceSaver::new(config.save_debounce),
            config,
            document,
            jar,
            next_request: 1,
            outbound: Vec::new(),
            in_flight: HashMap::new(),
            pending_saves: HashMap::new(),
            banner_request: None,
            decision_request: None,
            events: Vec::new(),
            unloaded: false,
        }
    }

    /// Hands toasts to the page's own toast system.
    pub fn with_toast_host(mut self, host: Box<dyn ToastHost>) -> Self {
        self.toasts = ToastBridge::new(self.config.toasts_id.clone()).with_host(host);
        self
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Direct access for hosts mirroring the page. Nodes the widget holds on to
    /// are re-validated before every use.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn cookie_jar(&self) -> &dyn CookieJar {
        self.jar.as_ref()
    }

    /// `document.cookie` of the page.
    pub fn document_cookie(&self) -> String {
        self.jar.document_cookie(self.client.page_url())
    }

    pub fn state(&self) -> BannerState {
        self.banner.state()
    }

    pub fn banner_node(&self) -> Option<NodeId> {
        self.banner.live_banner(&self.document)
    }

    pub fn controls(&self) -> Vec<(NodeId, ControlKind)> {
        self.banner.controls()
    }

    pub fn toasts(&self) -> &ToastBridge {
        &self.toasts
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    pub fn has_requests_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Requests queued since the last call.
    pub fn take_outbound(&mut self) -> Vec<PendingRequest> {
        std::mem::take(&mut self.outbound)
    }

    /// Events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<WidgetEvent> {
        std::mem::take(&mut self.events)
    }

    /// Earliest timer the widget is waiting on.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.unloaded {
            return None;
        }
        match (self.saver.deadline(), self.toasts.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle_command(&mut self, cmd: WidgetCommand, now: Instant) {
        if self.unloaded {
            log::debug!("ConsentWidget: ignoring {:?} after unload", cmd);
            return;
        }
        if let Err(e) = self.dispatch(cmd, now) {
            self.warn(format!("command failed: {}", e));
        }
    }

    /// Delivers the outcome of a request previously taken from
    /// [`take_outbound`](Self::take_outbound).
    pub fn on_response(&mut self, id: RequestId, result: Result<Response, NetError>, now: Instant) {
        if let Err(e) = self.complete(id, result, now) {
            self.warn(format!("response {} not handled: {}", id, e));
        }
    }

    /// Runs due timers: toast expiry and the debounced preference save.
    pub fn tick(&mut self, now: Instant) -> TickResult {
        let mut result = TickResult {
            state: self.state(),
            ..Default::default()
        };
        if self.unloaded {
            return result;
        }

        match self.toasts.expire(&mut self.document, now) {
            Ok(ids) => {
                result.expired_toasts = ids.len();
                self.events.extend(ids.into_iter().map(|id| WidgetEvent::ToastRemoved { id }));
            }
            Err(e) => self.warn(format!("toast expiry failed: {}", e)),
        }

        if self.saver.take_due(now) {
            result.save_fired = true;
            if let Err(e) = self.submit_preferences() {
                self.warn(format!("preference save failed: {}", e));
            }
        }

        result.state = self.state();
        result.next_tick_in = self.next_deadline().map(|d| d.saturating_duration_since(now));
        result
    }

    fn dispatch(&mut self, cmd: WidgetCommand, now: Instant) -> Result<(), WidgetError> {
        match cmd {
            WidgetCommand::PageReady => {
                if self.state() != BannerState::Unloaded {
                    log::debug!("ConsentWidget: page already started ({})", self.state());
                    return Ok(());
                }
                self.check(false)
            }
            WidgetCommand::LoadBanner => match self.state() {
                BannerState::Checking | BannerState::Fetching => {
                    log::debug!("ConsentWidget: banner load already in progress");
                    Ok(())
                }
                _ => self.check(true),
            },
            WidgetCommand::Unload => self.unload(),
            WidgetCommand::Click { target } => self.click(target),
            WidgetCommand::Change { target, checked } => self.change(target, checked, now),
            WidgetCommand::ServerTrigger { header } => match triggers::parse_trigger(&header) {
                Some(actions) => self.apply_trigger(actions, now),
                None => Ok(()),
            },
            WidgetCommand::ShowToast { message, title } => {
                let duration = self.config.toast_duration;
                self.show_toast(&message, title.as_deref(), duration, now)
            }
            WidgetCommand::InjectToast { html } => {
                let duration = self.config.toast_duration;
                if !self.inject_toast(&html, duration, now)? {
                    log::debug!("ConsentWidget: no toast element in injected fragment");
                }
                Ok(())
            }
            WidgetCommand::DismissToast(id) => {
                if self.toasts.dismiss(&mut self.document, id)? {
                    self.events.push(WidgetEvent::ToastRemoved { id });
                }
                Ok(())
            }
            WidgetCommand::RefreshStatus => {
                let request = self.client.get(&self.config.endpoints.status)?;
                self.queue(RequestKind::Status, request)?;
                Ok(())
            }
        }
    }

    /// Checking: a recorded decision dismisses, otherwise fetch unless auto
    /// loading is off and the load was not asked for explicitly.
    fn check(&mut self, explicit: bool) -> Result<(), WidgetError> {
        self.transition(BannerState::Checking);

        if has_recorded_decision(&self.document_cookie(), &self.config.cookie_name) {
            log::debug!("ConsentWidget: decision already recorded, no banner");
            return self.dismiss();
        }

        if !self.config.auto_load && !explicit {
            self.transition(BannerState::NoBannerNeeded);
            return Ok(());
        }

        let request = self.client.get(&self.config.endpoints.banner)?;
        self.banner_request = Some(self.queue(RequestKind::Banner, request)?);
        self.transition(BannerState::Fetching);
        Ok(())
    }

    fn click(&mut self, target: NodeId) -> Result<(), WidgetError> {
        let Some((control, kind)) = self.banner.control_at(&self.document, target) else {
            log::debug!("ConsentWidget: click on {} is not a banner control", target);
            return Ok(());
        };

        if kind.is_action() && self.banner.is_busy() {
            log::debug!("ConsentWidget: ignoring {:?} on {} while a decision is being saved", kind, control);
            return Ok(());
        }

        match kind {
            ControlKind::AcceptAll => self.post_decision(RequestKind::AcceptAll),
            ControlKind::RejectAll => self.post_decision(RequestKind::RejectAll),
            ControlKind::Close => self.dismiss(),
            // Toggles arrive as Change commands
            ControlKind::Preference => Ok(()),
        }
    }

    fn post_decision(&mut self, kind: RequestKind) -> Result<(), WidgetError> {
        let (endpoint, field) = match kind {
            RequestKind::AcceptAll => (&self.config.endpoints.accept_all, "accept_all"),
            _ => (&self.config.endpoints.reject_all, "reject_all"),
        };
        let request = self.client.post(endpoint)?.with_form(&[(field, "1")]);

        let id = self.queue(kind, request)?;
        self.decision_request = Some(id);
        self.banner.set_busy(&mut self.document, true)
    }

    fn change(&mut self, target: NodeId, checked: bool, now: Instant) -> Result<(), WidgetError> {
        match self.banner.control_at(&self.document, target) {
            Some((node, ControlKind::Preference)) => {
                set_checked(&mut self.document, node, checked)?;
                self.saver.schedule(now);
                Ok(())
            }
            _ => {
                log::debug!("ConsentWidget: change on {} is not a preference control", target);
                Ok(())
            }
        }
    }

    fn submit_preferences(&mut self) -> Result<(), WidgetError> {
        let Some(banner) = self.banner.live_banner(&self.document) else {
            log::debug!("ConsentWidget: banner gone before the preference save fired");
            return Ok(());
        };

        let preferences = collect_preferences(&self.document, banner);
        let request = self
            .client
            .post(&self.config.endpoints.accept)?
            .with_json(&preferences)?;

        let id = self.queue(RequestKind::SavePreferences, request)?;
        self.pending_saves.insert(id, preferences);
        Ok(())
    }

    fn apply_trigger(&mut self, actions: TriggerActions, now: Instant) -> Result<(), WidgetError> {
        if actions.remove_banner {
            self.dismiss()?;
        }
        if let Some(html) = actions.toast_html {
            let duration = self.config.banner_toast_duration;
            if !self.inject_toast(&html, duration, now)? {
                log::debug!("ConsentWidget: trigger toast has no toast element");
            }
        }
        Ok(())
    }

    fn unload(&mut self) -> Result<(), WidgetError> {
        self.saver.cancel();
        self.outbound.clear();
        let removed = self.toasts.clear(&mut self.document)?;
        self.events.extend(removed.into_iter().map(|id| WidgetEvent::ToastRemoved { id }));
        self.unloaded = true;
        self.events.push(WidgetEvent::Unloaded);
        Ok(())
    }

    fn complete(&mut self, id: RequestId, result: Result<Response, NetError>, now: Instant) -> Result<(), WidgetError> {
        let kind = self.in_flight.remove(&id).ok_or(WidgetError::UnknownRequest(id))?;
        if self.unloaded {
            log::debug!("ConsentWidget: dropping {} response {} after unload", kind, id);
            return Ok(());
        }

        if let Ok(response) = &result {
            self.client.absorb(response, self.jar.as_mut());
        }

        match kind {
            RequestKind::Banner => self.on_banner(id, result, now),
            RequestKind::AcceptAll | RequestKind::RejectAll => self.on_decision(id, kind, result, now),
            RequestKind::SavePreferences => self.on_saved(id, result, now),
            RequestKind::Status => self.on_status(result),
        }
    }

    fn on_banner(&mut self, id: RequestId, result: Result<Response, NetError>, now: Instant) -> Result<(), WidgetError> {
        if self.banner_request != Some(id) || self.state() != BannerState::Fetching {
            log::debug!("ConsentWidget: discarding late banner response {} in state {}", id, self.state());
            return Ok(());
        }
        self.banner_request = None;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                log::warn!("ConsentWidget: banner fetch failed: {}", e);
                return self.dismiss();
            }
        };
        if !response.is_success() {
            log::debug!("ConsentWidget: banner endpoint answered {}", response.status);
            return self.dismiss();
        }

        match self.banner.render(&mut self.document, &response.text())? {
            RenderOutcome::Empty => self.dismiss()?,
            RenderOutcome::Unchanged(_) => self.transition(BannerState::Mounted),
            RenderOutcome::Mounted(node) => {
                self.transition(BannerState::Mounted);
                self.events.push(WidgetEvent::BannerMounted {
                    node,
                    html: self.document.outer_html(node),
                    controls: self.banner.controls(),
                });
            }
        }

        match triggers::from_headers(&response.headers) {
            Some(actions) => self.apply_trigger(actions, now),
            None => Ok(()),
        }
    }

    fn on_decision(
        &mut self,
        id: RequestId,
        kind: RequestKind,
        result: Result<Response, NetError>,
        now: Instant,
    ) -> Result<(), WidgetError> {
        if self.decision_request == Some(id) {
            self.decision_request = None;
        }
        self.banner.set_busy(&mut self.document, false)?;
        self.dismiss()?;

        let duration = self.config.banner_toast_duration;
        let response = match result {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                self.warn(format!("{} was answered with {}", kind, response.status));
                return self.show_toast(SAVE_FAILED_MESSAGE, None, duration, now);
            }
            Err(e) => {
                self.warn(format!("{} failed: {}", kind, e));
                return self.show_toast(SAVE_FAILED_MESSAGE, None, duration, now);
            }
        };

        let decision = match kind {
            RequestKind::AcceptAll => ConsentDecision::AcceptedAll,
            _ => ConsentDecision::Categories(BTreeMap::from([(REQUIRED_CATEGORY.to_string(), true)])),
        };
        self.record_decision(decision)?;

        let default_message = match kind {
            RequestKind::AcceptAll => ACCEPTED_ALL_MESSAGE,
            _ => REJECTED_MESSAGE,
        };
        self.response_toast(&response, default_message, duration, now)
    }

    /// Exactly one toast per decision response: a structured `message`, else a
    /// toast element in the body, else the trigger header toast, else the
    /// default message.
    fn response_toast(
        &mut self,
        response: &Response,
        default_message: &str,
        duration: Duration,
        now: Instant,
    ) -> Result<(), WidgetError> {
        if let Ok(Value::Object(map)) = response.json::<Value>() {
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(default_message);
            return self.show_toast(message, None, duration, now);
        }

        let body = response.text();
        if !body.trim().is_empty() && self.inject_toast(&body, duration, now)? {
            return Ok(());
        }

        let trigger_html = triggers::from_headers(&response.headers).and_then(|t| t.toast_html);
        if let Some(html) = trigger_html {
            if self.inject_toast(&html, duration, now)? {
                return Ok(());
            }
        }

        self.show_toast(default_message, None, duration, now)
    }

    fn on_saved(&mut self, id: RequestId, result: Result<Response, NetError>, now: Instant) -> Result<(), WidgetError> {
        let mut preferences = self.pending_saves.remove(&id).unwrap_or_default();

        let response = match result {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                log::warn!("ConsentWidget: preference save answered {}", response.status);
                return Ok(());
            }
            Err(e) => {
                self.warn(format!("preference save failed: {}", e));
                return Ok(());
            }
        };

        preferences.insert(REQUIRED_CATEGORY.to_string(), true);
        self.record_decision(ConsentDecision::Categories(preferences.clone()))?;
        self.events.push(WidgetEvent::PreferencesSaved { preferences });

        // Only structured replies carry a message; anything else stays silent
        let Ok(Value::Object(map)) = response.json::<Value>() else {
            return Ok(());
        };
        let message = map
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(SAVED_MESSAGE);
        let duration = self.config.banner_toast_duration;
        self.show_toast(message, None, duration, now)
    }

    fn on_status(&mut self, result: Result<Response, NetError>) -> Result<(), WidgetError> {
        let response = result?;
        if !response.is_success() {
            self.warn(format!("status endpoint answered {}", response.status));
            return Ok(());
        }

        let status: ConsentStatus = response.json()?;
        self.events.push(WidgetEvent::StatusLoaded { status });
        Ok(())
    }

    fn record_decision(&mut self, decision: ConsentDecision) -> Result<(), WidgetError> {
        let max_age = i64::try_from(self.config.decision_max_age.as_secs()).unwrap_or(i64::MAX);
        let cookie = Cookie::new(self.config.cookie_name.clone(), decision.cookie_value())
            .with_path("/")
            .with_max_age(max_age);

        self.jar
            .set_document_cookie(self.client.page_url(), &cookie.to_set_cookie());
        log::debug!("ConsentWidget: recorded decision {:?}", decision);
        self.events.push(WidgetEvent::DecisionRecorded { decision });
        Ok(())
    }

    /// Tears the banner down and moves to `Dismissed`.
    fn dismiss(&mut self) -> Result<(), WidgetError> {
        self.saver.cancel();
        let removed = self.banner.teardown(&mut self.document)?;
        if removed {
            self.events.push(WidgetEvent::BannerRemoved);
        }
        self.transition(BannerState::Dismissed);
        Ok(())
    }

    fn show_toast(&mut self, message: &str, title: Option<&str>, duration: Duration, now: Instant) -> Result<(), WidgetError> {
        let id = self.toasts.show(&mut self.document, message, title, duration, now)?;
        self.events.push(WidgetEvent::ToastShown {
            id,
            message: message.to_string(),
        });
        Ok(())
    }

    /// Returns whether a toast was found and shown.
    fn inject_toast(&mut self, html: &str, duration: Duration, now: Instant) -> Result<bool, WidgetError> {
        match self.toasts.inject_from_fragment(&mut self.document, html, duration, now)? {
            Some(entry) => {
                self.events.push(WidgetEvent::ToastShown {
                    id: entry.id,
                    message: entry.message,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn queue(&mut self, kind: RequestKind, request: Request) -> Result<RequestId, WidgetError> {
        let request = self.client.prepare(request, &self.document, self.jar.as_ref())?;
        if self.client.missing_csrf(&request) {
            self.warn(format!("no CSRF token available for {} request", kind));
        }

        let id = RequestId::new(self.next_request);
        self.next_request += 1;

        log::debug!("ConsentWidget: queueing {} {} {} ({})", id, request.method, request.url, kind);
        self.in_flight.insert(id, kind);
        self.outbound.push(PendingRequest { id, kind, request });
        Ok(id)
    }

    fn transition(&mut self, to: BannerState) {
        if let Some(from) = self.banner.set_state(to) {
            log::debug!("ConsentWidget: {} -> {}", from, to);
            self.events.push(WidgetEvent::StateChanged { from, to });
        }
    }

    fn warn(&mut self, message: String) {
        log::warn!("ConsentWidget: {}", message);
        self.events.push(WidgetEvent::Warning { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cookies::read_cookie;
    use crate::engine::preferences::{checkbox_selector, preference_slug};
    use pretty_assertions::assert_eq;

    const MS: Duration = Duration::from_millis(1);

    const BANNER: &str = r#"<div id="consent-banner" class="consent">
        <p>We use cookies.</p>
        <button data-consent-action="accept-all">Accept all</button>
        <button data-consent-action="reject-all">Reject all</button>
        <button data-consent-action="close">Close</button>
        <input type="checkbox" data-consent-slug="analytics">
        <input type="checkbox" data-consent-slug="marketing">
        <input type="checkbox" name="ads">
        <input type="checkbox" data-consent-slug="personalisation">
        <input type="checkbox" data-consent-slug="social">
    </div>"#;

    fn page() -> Url {
        Url::parse("https://shop.example/products/").unwrap()
    }

    fn widget_on(config: WidgetConfig, document: Document, cookies: &str) -> ConsentWidget {
        let jar = DefaultCookieJar::from_document_cookie(&page(), cookies);
        ConsentWidget::with_cookie_jar(config, page(), document, Box::new(jar))
    }

    fn widget(cookies: &str) -> ConsentWidget {
        widget_on(WidgetConfig::default(), Document::new(), cookies)
    }

    fn reply(req: &PendingRequest, status: u16, body: &str) -> Result<Response, NetError> {
        Ok(Response::new(req.request.url.clone(), status).with_body(body))
    }

    fn single(w: &mut ConsentWidget) -> PendingRequest {
        let mut out = w.take_outbound();
        assert_eq!(out.len(), 1, "expected exactly one request, got {:?}", out);
        out.remove(0)
    }

    /// Starts the page and answers the banner fetch with [`BANNER`].
    fn mounted(t0: Instant) -> ConsentWidget {
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::PageReady, t0);
        let fetch = single(&mut w);
        w.on_response(fetch.id, reply(&fetch, 200, BANNER), t0);
        assert_eq!(w.state(), BannerState::Mounted);
        w.drain_events();
        w
    }

    fn control(w: &ConsentWidget, kind: ControlKind) -> NodeId {
        w.controls()
            .into_iter()
            .find(|(_, k)| *k == kind)
            .map(|(n, _)| n)
            .unwrap()
    }

    fn checkbox(w: &ConsentWidget, slug: &str) -> NodeId {
        let doc = w.document();
        doc.query_all(doc.body(), &checkbox_selector())
            .into_iter()
            .find(|n| doc.element(*n).and_then(preference_slug) == Some(slug))
            .unwrap()
    }

    fn toasts_shown(events: &[WidgetEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                WidgetEvent::ToastShown { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn has_warning(events: &[WidgetEvent]) -> bool {
        events.iter().any(|e| matches!(e, WidgetEvent::Warning { .. }))
    }

    fn decision_cookie(w: &ConsentWidget) -> Option<String> {
        read_cookie(&w.document_cookie(), "consent_status")
    }

    #[test]
    fn recorded_decision_skips_fetch_and_removes_stray_banner() {
        let doc = Document::parse(r#"<div id="consent-banner-slot"><div id="consent-banner">stale</div></div>"#);
        let mut w = widget_on(WidgetConfig::default(), doc, "consent_status=%7B%22analytics%22%3Atrue%7D");

        w.handle_command(WidgetCommand::PageReady, Instant::now());

        assert!(w.take_outbound().is_empty());
        assert_eq!(w.state(), BannerState::Dismissed);
        assert!(w.document().get_element_by_id("consent-banner").is_none());
        assert!(w.document().get_element_by_id("consent-banner-slot").is_none());
        assert!(w.drain_events().contains(&WidgetEvent::BannerRemoved));
    }

    #[test]
    fn page_ready_fetches_banner_with_credentials() {
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::PageReady, Instant::now());

        let fetch = single(&mut w);
        assert_eq!(fetch.kind, RequestKind::Banner);
        assert_eq!(fetch.request.method, http::Method::GET);
        assert_eq!(fetch.request.url.as_str(), "https://shop.example/consent/banner/");
        assert_eq!(fetch.request.header("X-Requested-With"), Some("XMLHttpRequest"));
        assert_eq!(fetch.request.header("X-CSRFToken"), Some("tok"));
        assert_eq!(fetch.request.header("Cookie"), Some("csrftoken=tok"));
        assert_eq!(w.state(), BannerState::Fetching);

        let events = w.drain_events();
        assert!(!has_warning(&events));
        assert_eq!(
            events,
            vec![
                WidgetEvent::StateChanged { from: BannerState::Unloaded, to: BannerState::Checking },
                WidgetEvent::StateChanged { from: BannerState::Checking, to: BannerState::Fetching },
            ]
        );
    }

    #[test]
    fn missing_csrf_token_still_sends_request() {
        let mut w = widget("");
        w.handle_command(WidgetCommand::PageReady, Instant::now());

        let fetch = single(&mut w);
        assert!(fetch.request.header("X-CSRFToken").is_none());
        assert_eq!(fetch.request.header("X-Requested-With"), Some("XMLHttpRequest"));
        assert!(has_warning(&w.drain_events()));
    }

    #[test]
    fn mounted_banner_is_announced_with_its_controls() {
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::PageReady, Instant::now());
        let fetch = single(&mut w);
        w.on_response(fetch.id, reply(&fetch, 200, BANNER), Instant::now());

        let banner = w.banner_node().unwrap();
        let mounted = w.drain_events().into_iter().find_map(|e| match e {
            WidgetEvent::BannerMounted { node, html, controls } => Some((node, html, controls)),
            _ => None,
        });
        let (node, html, controls) = mounted.unwrap();
        assert_eq!(node, banner);
        assert!(html.starts_with(r#"<div id="consent-banner""#));
        assert_eq!(controls.len(), 8);
    }

    #[test]
    fn identical_rerender_keeps_mounted_node() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        let banner = w.banner_node().unwrap();

        w.handle_command(WidgetCommand::LoadBanner, t0);
        let refetch = single(&mut w);
        let same = BANNER.replace(r#"id="consent-banner" class="consent""#, r#"class="consent"   id="consent-banner""#);
        w.on_response(refetch.id, reply(&refetch, 200, &same), t0);

        assert_eq!(w.banner_node(), Some(banner));
        assert_eq!(w.state(), BannerState::Mounted);
        let events = w.drain_events();
        assert!(!events.iter().any(|e| matches!(e, WidgetEvent::BannerMounted { .. })));
    }

    #[test]
    fn accept_all_flow() {
        let t0 = Instant::now();
        let mut w = mounted(t0);

        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::AcceptAll) }, t0);
        let post = single(&mut w);
        assert_eq!(post.kind, RequestKind::AcceptAll);
        assert_eq!(post.request.method, http::Method::POST);
        assert_eq!(post.request.url.path(), "/consent/accept_all/");
        assert_eq!(post.request.body_text().as_deref(), Some("accept_all=1"));
        assert_eq!(post.request.header("X-CSRFToken"), Some("tok"));

        let response = Response::new(post.request.url.clone(), 200)
            .with_body(r#"{"message":"Saved"}"#)
            .with_header("Set-Cookie", "sessionid=abc; Path=/; HttpOnly");
        w.on_response(post.id, Ok(response), t0 + 10 * MS);

        assert_eq!(w.state(), BannerState::Dismissed);
        assert!(w.banner_node().is_none());
        assert!(w.document().get_element_by_id("consent-banner-slot").is_none());

        let toasts = w.document().get_element_by_id("app-toasts").unwrap();
        assert_eq!(w.document().text_content(toasts), "Saved");

        let events = w.drain_events();
        assert_eq!(toasts_shown(&events), vec!["Saved".to_string()]);
        assert!(events.contains(&WidgetEvent::DecisionRecorded { decision: ConsentDecision::AcceptedAll }));
        assert!(events.contains(&WidgetEvent::BannerRemoved));

        assert_eq!(decision_cookie(&w).as_deref(), Some("1"));
        // HttpOnly cookies reach the jar but not the document
        assert!(!w.document_cookie().contains("sessionid"));
        assert!(w
            .cookie_jar()
            .get_request_cookies(&page())
            .unwrap()
            .contains("sessionid=abc"));
    }

    #[test]
    fn double_submit_is_ignored_while_decision_is_pending() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        let accept = control(&w, ControlKind::AcceptAll);
        let reject = control(&w, ControlKind::RejectAll);

        w.handle_command(WidgetCommand::Click { target: accept }, t0);
        let post = single(&mut w);
        assert_eq!(w.document().attr(accept, "disabled"), Some(""));
        assert_eq!(w.document().attr(reject, "aria-busy"), Some("true"));

        w.handle_command(WidgetCommand::Click { target: reject }, t0);
        w.handle_command(WidgetCommand::Click { target: accept }, t0);
        assert!(w.take_outbound().is_empty());

        w.on_response(post.id, reply(&post, 200, "{}"), t0);
        assert_eq!(toasts_shown(&w.drain_events()), vec![ACCEPTED_ALL_MESSAGE.to_string()]);
    }

    #[test]
    fn reject_all_uses_trigger_toast_for_empty_reply() {
        let t0 = Instant::now();
        let mut w = mounted(t0);

        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::RejectAll) }, t0);
        let post = single(&mut w);
        assert_eq!(post.request.url.path(), "/consent/reject_all/");
        assert_eq!(post.request.body_text().as_deref(), Some("reject_all=1"));

        let response = Response::new(post.request.url.clone(), 200).with_header(
            "HX-Trigger",
            r#"{"removeConsentBanner": true, "showToast": {"html": "<div class=\"toast\"><p>You rejected optional cookies.</p></div>"}}"#,
        );
        w.on_response(post.id, Ok(response), t0);

        let events = w.drain_events();
        assert_eq!(toasts_shown(&events), vec![REJECTED_MESSAGE.to_string()]);
        assert!(w.banner_node().is_none());
        assert_eq!(decision_cookie(&w).as_deref(), Some(r#"{"functional":true}"#));
        assert!(has_recorded_decision(&w.document_cookie(), "consent_status"));
    }

    #[test]
    fn reply_without_usable_toast_falls_back_to_default_message() {
        for body in ["<p>done</p>", r#"{"ok": true}"#, ""] {
            let t0 = Instant::now();
            let mut w = mounted(t0);
            w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::AcceptAll) }, t0);
            let post = single(&mut w);
            w.on_response(post.id, reply(&post, 200, body), t0);

            assert_eq!(toasts_shown(&w.drain_events()), vec![ACCEPTED_ALL_MESSAGE.to_string()], "{}", body);
        }
    }

    #[test]
    fn fragment_reply_toast_is_used() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::AcceptAll) }, t0);
        let post = single(&mut w);
        w.on_response(post.id, reply(&post, 200, r#"<div class="toast" onmouseover="x()">Thanks!</div>"#), t0);

        assert_eq!(toasts_shown(&w.drain_events()), vec!["Thanks!".to_string()]);
        let container = w.document().get_element_by_id("app-toasts").unwrap();
        assert_eq!(w.document().inner_html(container), r#"<div class="toast">Thanks!</div>"#);
    }

    #[test]
    fn decision_failure_tears_down_with_error_toast() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::AcceptAll) }, t0);
        let post = single(&mut w);

        w.on_response(post.id, Err(NetError::Transport("connection reset".into())), t0);

        let events = w.drain_events();
        assert!(w.banner_node().is_none());
        assert_eq!(toasts_shown(&events), vec![SAVE_FAILED_MESSAGE.to_string()]);
        assert!(has_warning(&events));
        assert_eq!(decision_cookie(&w), None);
    }

    #[test]
    fn decision_error_status_is_not_recorded() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::RejectAll) }, t0);
        let post = single(&mut w);

        w.on_response(post.id, reply(&post, 500, r#"{"error":"internal_error"}"#), t0);

        assert_eq!(toasts_shown(&w.drain_events()), vec![SAVE_FAILED_MESSAGE.to_string()]);
        assert_eq!(decision_cookie(&w), None);
    }

    #[test]
    fn close_removes_banner_without_decision() {
        let t0 = Instant::now();
        let mut w = mounted(t0);

        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::Close) }, t0);

        assert!(w.take_outbound().is_empty());
        assert!(w.banner_node().is_none());
        assert_eq!(w.state(), BannerState::Dismissed);
        assert_eq!(decision_cookie(&w), None);
    }

    #[test]
    fn rapid_toggles_produce_a_single_save() {
        let t0 = Instant::now();
        let mut w = mounted(t0);

        let toggles = [
            ("analytics", true),
            ("marketing", true),
            ("ads", false),
            ("personalisation", true),
            ("social", false),
        ];
        for (i, (slug, checked)) in toggles.into_iter().enumerate() {
            let target = checkbox(&w, slug);
            w.handle_command(WidgetCommand::Change { target, checked }, t0 + (i as u32) * 25 * MS);
        }

        assert!(!w.tick(t0 + 100 * MS).save_fired);
        assert!(!w.tick(t0 + 349 * MS).save_fired);
        assert!(w.take_outbound().is_empty());

        let result = w.tick(t0 + 350 * MS);
        assert!(result.save_fired);
        let save = single(&mut w);
        assert_eq!(save.kind, RequestKind::SavePreferences);
        assert_eq!(save.request.url.path(), "/consent/accept/");
        assert_eq!(save.request.header("Content-Type"), Some("application/json"));
        assert_eq!(
            save.request.body_text().as_deref(),
            Some(r#"{"ads":false,"analytics":true,"marketing":true,"personalisation":true,"social":false}"#)
        );

        w.on_response(save.id, reply(&save, 200, r#"{"ok":true}"#), t0 + 400 * MS);
        let events = w.drain_events();
        assert_eq!(toasts_shown(&events), vec![SAVED_MESSAGE.to_string()]);
        assert!(events.iter().any(|e| matches!(
            e,
            WidgetEvent::PreferencesSaved { preferences } if preferences.get("functional") == Some(&true)
        )));

        // Banner stays; the decision is remembered for the next page load
        assert_eq!(w.state(), BannerState::Mounted);
        let cookie = decision_cookie(&w).unwrap();
        assert!(cookie.contains(r#""functional":true"#));
        assert!(cookie.contains(r#""analytics":true"#));
    }

    #[test]
    fn failed_save_keeps_banner_and_records_nothing() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        let target = checkbox(&w, "analytics");
        w.handle_command(WidgetCommand::Change { target, checked: true }, t0);
        w.tick(t0 + 250 * MS);
        let save = single(&mut w);

        w.on_response(save.id, reply(&save, 400, ""), t0 + 300 * MS);
        assert_eq!(w.state(), BannerState::Mounted);
        assert_eq!(decision_cookie(&w), None);
        assert!(toasts_shown(&w.drain_events()).is_empty());
    }

    #[test]
    fn teardown_cancels_pending_save() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        let target = checkbox(&w, "analytics");
        w.handle_command(WidgetCommand::Change { target, checked: true }, t0);
        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::Close) }, t0 + 10 * MS);

        assert!(!w.tick(t0 + 500 * MS).save_fired);
        assert!(w.take_outbound().is_empty());
        assert_eq!(w.next_deadline(), None);
    }

    #[test]
    fn server_trigger_requires_strict_json() {
        let t0 = Instant::now();
        let mut w = mounted(t0);

        w.handle_command(WidgetCommand::ServerTrigger { header: "{removeConsentBanner:true}".into() }, t0);
        assert_eq!(w.state(), BannerState::Mounted);
        assert!(w.banner_node().is_some());

        w.handle_command(WidgetCommand::ServerTrigger { header: r#"{"removeConsentBanner": true}"#.into() }, t0);
        assert_eq!(w.state(), BannerState::Dismissed);
        assert!(w.banner_node().is_none());
    }

    #[test]
    fn server_trigger_can_remove_and_toast_at_once() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        let header = r#"{"removeConsentBanner": 1, "showToast": {"html": "<div data-toast>Bye</div>"}}"#;

        w.handle_command(WidgetCommand::ServerTrigger { header: header.into() }, t0);

        assert!(w.banner_node().is_none());
        assert_eq!(toasts_shown(&w.drain_events()), vec!["Bye".to_string()]);
        assert_eq!(w.toasts().next_deadline(), Some(t0 + 3500 * MS));
    }

    #[test]
    fn late_banner_response_is_discarded() {
        let t0 = Instant::now();
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::PageReady, t0);
        let fetch = single(&mut w);

        w.handle_command(WidgetCommand::ServerTrigger { header: r#"{"removeConsentBanner": true}"#.into() }, t0);
        w.on_response(fetch.id, reply(&fetch, 200, BANNER), t0);

        assert_eq!(w.state(), BannerState::Dismissed);
        assert!(w.banner_node().is_none());
        assert!(!has_warning(&w.drain_events()));
    }

    #[test]
    fn superseded_banner_fetch_is_discarded() {
        let t0 = Instant::now();
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::PageReady, t0);
        let first = single(&mut w);
        w.handle_command(WidgetCommand::ServerTrigger { header: r#"{"removeConsentBanner": true}"#.into() }, t0);
        w.handle_command(WidgetCommand::LoadBanner, t0);
        let second = single(&mut w);

        w.on_response(first.id, reply(&first, 200, "<div id=\"consent-banner\">old</div>"), t0);
        assert!(w.banner_node().is_none());

        w.on_response(second.id, reply(&second, 200, BANNER), t0);
        assert_eq!(w.state(), BannerState::Mounted);
    }

    #[test]
    fn auto_load_off_waits_for_explicit_load() {
        let config = WidgetConfig::builder().auto_load(false).build().unwrap();
        let mut w = widget_on(config, Document::new(), "");

        w.handle_command(WidgetCommand::PageReady, Instant::now());
        assert_eq!(w.state(), BannerState::NoBannerNeeded);
        assert!(w.take_outbound().is_empty());

        w.handle_command(WidgetCommand::LoadBanner, Instant::now());
        assert_eq!(w.state(), BannerState::Fetching);
        assert_eq!(single(&mut w).kind, RequestKind::Banner);
    }

    #[test]
    fn failed_or_empty_banner_fetch_dismisses_quietly() {
        for (status, body) in [(500, "<div id=\"consent-banner\">x</div>"), (200, ""), (204, ""), (200, "<script>x</script>")] {
            let mut w = widget("csrftoken=tok");
            w.handle_command(WidgetCommand::PageReady, Instant::now());
            let fetch = single(&mut w);
            w.on_response(fetch.id, reply(&fetch, status, body), Instant::now());

            assert_eq!(w.state(), BannerState::Dismissed, "{} {:?}", status, body);
            assert!(w.banner_node().is_none());
            assert!(!has_warning(&w.drain_events()));
        }
    }

    #[test]
    fn legacy_controls_are_wired() {
        let t0 = Instant::now();
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::PageReady, t0);
        let fetch = single(&mut w);
        let legacy = r#"<div id="consent-banner"><button id="consent-accept-all">Yes</button><button data-reject-all>No</button></div>"#;
        w.on_response(fetch.id, reply(&fetch, 200, legacy), t0);

        let reject = control(&w, ControlKind::RejectAll);
        w.handle_command(WidgetCommand::Click { target: reject }, t0);
        assert_eq!(single(&mut w).request.url.path(), "/consent/reject_all/");
    }

    #[test]
    fn sanitized_banner_has_no_handlers() {
        let t0 = Instant::now();
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::PageReady, t0);
        let fetch = single(&mut w);
        let hostile = r#"<div id="consent-banner"><img src=x onerror="alert(1)"><a href="javascript:alert(1)" onclick="x()">Policy</a></div>"#;
        w.on_response(fetch.id, reply(&fetch, 200, hostile), t0);

        let banner = w.banner_node().unwrap();
        assert_eq!(
            w.document().outer_html(banner),
            r#"<div id="consent-banner"><a>Policy</a></div>"#
        );
    }

    #[test]
    fn toasts_expire_on_tick() {
        let t0 = Instant::now();
        let mut w = widget("");
        w.handle_command(WidgetCommand::ShowToast { message: "Hello".into(), title: Some("Hi".into()) }, t0);
        assert_eq!(w.toasts().entries().len(), 1);

        let early = w.tick(t0 + 4999 * MS);
        assert_eq!(early.expired_toasts, 0);
        assert_eq!(early.next_tick_in, Some(MS));

        let due = w.tick(t0 + 5000 * MS);
        assert_eq!(due.expired_toasts, 1);
        assert_eq!(due.next_tick_in, None);
        assert!(w.toasts().entries().is_empty());
    }

    #[test]
    fn dismiss_and_inject_toast_commands() {
        let t0 = Instant::now();
        let mut w = widget("");
        w.handle_command(WidgetCommand::InjectToast { html: r#"<section><div class="toast">Hey</div></section>"#.into() }, t0);

        let id = w
            .drain_events()
            .into_iter()
            .find_map(|e| match e {
                WidgetEvent::ToastShown { id, .. } => Some(id),
                _ => None,
            })
            .unwrap();

        w.handle_command(WidgetCommand::DismissToast(id), t0);
        assert_eq!(w.drain_events(), vec![WidgetEvent::ToastRemoved { id }]);
        w.handle_command(WidgetCommand::DismissToast(id), t0);
        assert!(w.drain_events().is_empty());
    }

    #[test]
    fn refresh_status_emits_status_loaded() {
        let mut w = widget("csrftoken=tok");
        w.handle_command(WidgetCommand::RefreshStatus, Instant::now());
        let query = single(&mut w);
        assert_eq!(query.request.url.path(), "/consent/status/");

        let body = r#"{"consent_active": true, "consent_version": "3", "categories": {"functional": {"name": "Functional", "required": true, "accepted": true}}}"#;
        w.on_response(query.id, reply(&query, 200, body), Instant::now());

        let status = w.drain_events().into_iter().find_map(|e| match e {
            WidgetEvent::StatusLoaded { status } => Some(status),
            _ => None,
        });
        assert_eq!(status.unwrap().consent_version, "3");

        w.handle_command(WidgetCommand::RefreshStatus, Instant::now());
        let query = single(&mut w);
        w.on_response(query.id, reply(&query, 200, "not json"), Instant::now());
        assert!(has_warning(&w.drain_events()));
    }

    #[test]
    fn unknown_response_is_a_warning() {
        let mut w = widget("");
        let url = Url::parse("https://shop.example/").unwrap();
        w.on_response(RequestId::new(99), Ok(Response::new(url, 200)), Instant::now());
        assert!(has_warning(&w.drain_events()));
    }

    #[test]
    fn invalid_endpoint_degrades_to_warning() {
        let config = WidgetConfig::builder()
            .banner_endpoint("https://other.example/banner/")
            .build()
            .unwrap();
        let mut w = widget_on(config, Document::new(), "");

        w.handle_command(WidgetCommand::PageReady, Instant::now());
        assert!(w.take_outbound().is_empty());
        assert!(has_warning(&w.drain_events()));
    }

    #[test]
    fn unload_clears_toasts_and_ignores_later_input() {
        let t0 = Instant::now();
        let mut w = mounted(t0);
        w.handle_command(WidgetCommand::ShowToast { message: "a".into(), title: None }, t0);
        w.handle_command(WidgetCommand::Click { target: control(&w, ControlKind::AcceptAll) }, t0);
        let post = single(&mut w);

        w.handle_command(WidgetCommand::Unload, t0);
        assert!(w.is_unloaded());
        assert!(w.toasts().entries().is_empty());
        assert!(w.drain_events().contains(&WidgetEvent::Unloaded));

        w.handle_command(WidgetCommand::LoadBanner, t0);
        w.on_response(post.id, reply(&post, 200, "{}"), t0);
        assert!(w.take_outbound().is_empty());
        assert!(w.drain_events().is_empty());
        assert_eq!(decision_cookie(&w), None);
    }
}
