//! Same-origin request client.
//!
//! Every request the widget makes goes through [`RequestClient::prepare`], which
//! attaches the ajax marker, the CSRF header and the page cookies. Targets are
//! resolved against the page URL and anything that leaves the page origin is
//! refused, so credentials never travel cross-origin.

use crate::engine::config::CsrfConfig;
use crate::engine::cookies::{read_cookie, CookieJar};
use crate::engine::dom::{Document, NodeData};
use crate::engine::errors::NetError;
use crate::engine::net::{Request, Response};
use http::header::COOKIE;
use http::{HeaderValue, Method};
use url::Url;

pub const AJAX_HEADER: &str = "X-Requested-With";
pub const AJAX_VALUE: &str = "XMLHttpRequest";

#[derive(Debug, Clone)]
pub struct RequestClient {
    page_url: Url,
    csrf: CsrfConfig,
}

impl RequestClient {
    pub fn new(page_url: Url, csrf: CsrfConfig) -> Self {
        Self { page_url, csrf }
    }

    pub fn page_url(&self) -> &Url {
        &self.page_url
    }

    /// Resolves `endpoint` (path or absolute URL) against the page.
    pub fn resolve(&self, endpoint: &str) -> Result<Url, NetError> {
        let url = self.page_url.join(endpoint).map_err(|e| NetError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        self.ensure_same_origin(&url)?;
        Ok(url)
    }

    pub fn get(&self, endpoint: &str) -> Result<Request, NetError> {
        Ok(Request::new(Method::GET, self.resolve(endpoint)?))
    }

    pub fn post(&self, endpoint: &str) -> Result<Request, NetError> {
        Ok(Request::new(Method::POST, self.resolve(endpoint)?))
    }

    /// CSRF token: the CSRF cookie first, then a `<meta>` tag, then a hidden
    /// form field. Empty values do not count.
    pub fn csrf_token(&self, doc: &Document, jar: &dyn CookieJar) -> Option<String> {
        let from_cookie = read_cookie(&jar.document_cookie(&self.page_url), &self.csrf.cookie_name)
            .filter(|t| !t.is_empty());
        if from_cookie.is_some() {
            return from_cookie;
        }

        let elements: Vec<_> = doc
            .descendants(doc.body())
            .into_iter()
            .filter_map(|n| match doc.node(n).map(|n| &n.data) {
                Some(NodeData::Element(el)) => Some(el),
                _ => None,
            })
            .collect();

        let from_meta = elements
            .iter()
            .filter(|el| el.tag == "meta" && el.attr("name") == Some(self.csrf.meta_name.as_str()))
            .find_map(|el| el.attr("content").filter(|t| !t.is_empty()));

        let from_form = || {
            elements
                .iter()
                .filter(|el| el.tag == "input" && el.attr("name") == Some(self.csrf.form_field.as_str()))
                .find_map(|el| el.attr("value").filter(|t| !t.is_empty()))
        };

        from_meta.or_else(from_form).map(str::to_string)
    }

    /// Adds the ajax marker, CSRF and cookie headers unless the caller already
    /// set them. A missing CSRF token only logs; the request still goes out.
    pub fn prepare(&self, mut request: Request, doc: &Document, jar: &dyn CookieJar) -> Result<Request, NetError> {
        self.ensure_same_origin(&request.url)?;

        if !request.headers.contains_key(AJAX_HEADER) {
            request = request.with_header(AJAX_HEADER, AJAX_VALUE)?;
        }

        if !request.headers.contains_key(self.csrf.header_name.as_str()) {
            match self.csrf_token(doc, jar) {
                Some(token) => request = request.with_header(&self.csrf.header_name, &token)?,
                None => log::warn!(
                    "RequestClient: no CSRF token found for {} {}, sending without {}",
                    request.method,
                    request.url,
                    self.csrf.header_name
                ),
            }
        }

        if !request.headers.contains_key(COOKIE) {
            if let Some(cookies) = jar.get_request_cookies(&request.url) {
                match HeaderValue::from_str(&cookies) {
                    Ok(value) => {
                        request.headers.insert(COOKIE, value);
                    }
                    Err(_) => log::warn!("RequestClient: cookie header for {} is not valid, skipping", request.url),
                }
            }
        }

        Ok(request)
    }

    /// True when `request` goes out without a CSRF header.
    pub fn missing_csrf(&self, request: &Request) -> bool {
        !request.headers.contains_key(self.csrf.header_name.as_str())
    }

    /// Stores the cookies a response sets.
    pub fn absorb(&self, response: &Response, jar: &mut dyn CookieJar) {
        if self.ensure_same_origin(&response.url).is_err() {
            log::warn!("RequestClient: ignoring cookies from cross-origin response {}", response.url);
            return;
        }
        jar.store_response_cookies(&response.url, &response.headers);
    }

    fn ensure_same_origin(&self, url: &Url) -> Result<(), NetError> {
        if url.origin() == self.page_url.origin() {
            Ok(())
        } else {
            Err(NetError::CrossOrigin { url: url.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cookies::DefaultCookieJar;

    fn page() -> Url {
        Url::parse("https://shop.example/products/").unwrap()
    }

    fn client() -> RequestClient {
        RequestClient::new(page(), CsrfConfig::default())
    }

    #[test]
    fn resolves_paths_and_refuses_other_origins() {
        let c = client();
        assert_eq!(c.resolve("/consent/banner/").unwrap().as_str(), "https://shop.example/consent/banner/");
        assert_eq!(c.resolve("https://shop.example/x").unwrap().path(), "/x");
        assert!(matches!(c.resolve("https://evil.example/x"), Err(NetError::CrossOrigin { .. })));
        assert!(matches!(c.resolve("http://shop.example/x"), Err(NetError::CrossOrigin { .. })));
    }

    #[test]
    fn missing_token_still_sends_without_header() {
        let c = client();
        let doc = Document::new();
        let jar = DefaultCookieJar::new();

        let req = c.prepare(c.post("/consent/accept_all/").unwrap(), &doc, &jar).unwrap();
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));
        assert!(req.header("X-CSRFToken").is_none());
        assert!(c.missing_csrf(&req));
    }

    #[test]
    fn cookie_token_wins_over_page_token() {
        let c = client();
        let doc = Document::parse(r#"<meta name="csrf-token" content="from-meta">"#);
        let jar = DefaultCookieJar::from_document_cookie(&page(), "csrftoken=from-cookie; other=1");

        let req = c.prepare(c.post("/consent/accept/").unwrap(), &doc, &jar).unwrap();
        assert_eq!(req.header("X-CSRFToken"), Some("from-cookie"));
        assert_eq!(req.header("cookie"), Some("csrftoken=from-cookie; other=1"));
    }

    #[test]
    fn page_token_fallbacks() {
        let c = client();
        let jar = DefaultCookieJar::new();

        let meta = Document::parse(r#"<meta name="csrf-token" content="m"><input name="csrfmiddlewaretoken" value="f">"#);
        assert_eq!(c.csrf_token(&meta, &jar).as_deref(), Some("m"));

        let form = Document::parse(r#"<form><input type="hidden" name="csrfmiddlewaretoken" value="f"></form>"#);
        assert_eq!(c.csrf_token(&form, &jar).as_deref(), Some("f"));

        let empty = Document::parse(r#"<meta name="csrf-token" content="">"#);
        assert_eq!(c.csrf_token(&empty, &jar), None);
    }

    #[test]
    fn caller_headers_are_kept() {
        let c = client();
        let doc = Document::new();
        let jar = DefaultCookieJar::from_document_cookie(&page(), "csrftoken=abc");

        let req = c
            .post("/consent/accept/")
            .unwrap()
            .with_header("X-CSRFToken", "mine")
            .unwrap();
        let req = c.prepare(req, &doc, &jar).unwrap();
        assert_eq!(req.header("X-CSRFToken"), Some("mine"));
        assert_eq!(req.headers.get_all("X-CSRFToken").iter().count(), 1);
    }

    #[test]
    fn absorbs_set_cookie() {
        let c = client();
        let mut jar = DefaultCookieJar::new();
        let resp = Response::new(c.resolve("/consent/accept_all/").unwrap(), 200)
            .with_header("Set-Cookie", "consent_status=1; Path=/; Max-Age=31536000");
        c.absorb(&resp, &mut jar);
        assert_eq!(jar.document_cookie(&page()), "consent_status=1");

        let foreign = Response::new(Url::parse("https://evil.example/").unwrap(), 200)
            .with_header("Set-Cookie", "x=1; Path=/");
        c.absorb(&foreign, &mut jar);
        assert_eq!(jar.document_cookie(&page()), "consent_status=1");
    }
}
