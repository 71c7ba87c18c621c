use crate::engine::errors::NetError;
use crate::engine::net::{Request, Response};
use url::Url;

const MAX_REDIRECTS: usize = 5;

/// Sends a prepared request and buffers the whole response.
///
/// Implementations must not follow cross-origin redirects or add credentials of
/// their own: cookies and CSRF headers are already on the request.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&self, request: Request) -> Result<Response, NetError>;
}

/// What to do with a redirect, given the URLs requested so far in the chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RedirectAction {
    Follow,
    /// Hand the redirect response back to the caller unfollowed
    Stop,
    TooMany,
}

fn redirect_action(previous: &[Url], next: &Url) -> RedirectAction {
    let same_origin = previous.first().is_some_and(|first| first.origin() == next.origin());
    if !same_origin {
        RedirectAction::Stop
    } else if previous.len() > MAX_REDIRECTS {
        RedirectAction::TooMany
    } else {
        RedirectAction::Follow
    }
}

/// [`Transport`] backed by a `reqwest` client that only follows same-origin
/// redirects. [`ReqwestTransport::new`] is the only way to build one.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                let action = redirect_action(attempt.previous(), attempt.url());
                match action {
                    RedirectAction::Follow => attempt.follow(),
                    RedirectAction::Stop => {
                        log::warn!("ReqwestTransport: not following cross-origin redirect to {}", attempt.url());
                        attempt.stop()
                    }
                    RedirectAction::TooMany => attempt.error("too many redirects"),
                }
            }))
            .build()
            .map_err(|e| NetError::Transport(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, NetError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let res = builder
            .send()
            .await
            .map_err(|e| NetError::Transport(e.to_string()))?;

        // Fetch results
        let final_url = res.url().clone();
        let status = res.status().as_u16();
        let status_text = res.status().canonical_reason().unwrap_or("Unknown").to_string();
        let headers = res.headers().clone();

        // Fetch body. We don't do streaming
        let body = res
            .bytes()
            .await
            .map_err(|e| NetError::Transport(e.to_string()))?
            .to_vec();

        Ok(Response {
            url: final_url,
            status,
            status_text,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn cross_origin_redirects_are_not_followed() {
        let start = [url("https://shop.example/consent/accept_all/")];
        assert_eq!(redirect_action(&start, &url("https://evil.example/collect")), RedirectAction::Stop);
        assert_eq!(redirect_action(&start, &url("http://shop.example/consent/")), RedirectAction::Stop);
        assert_eq!(redirect_action(&start, &url("https://shop.example:8443/")), RedirectAction::Stop);
        assert_eq!(redirect_action(&[], &url("https://shop.example/")), RedirectAction::Stop);
    }

    #[test]
    fn same_origin_redirects_are_followed_up_to_the_limit() {
        let next = url("https://shop.example/consent/banner/?v=2");
        let mut chain = vec![url("https://shop.example/consent/banner/")];
        while chain.len() <= MAX_REDIRECTS {
            assert_eq!(redirect_action(&chain, &next), RedirectAction::Follow);
            chain.push(next.clone());
        }
        assert_eq!(redirect_action(&chain, &next), RedirectAction::TooMany);
    }

    #[test]
    fn transport_builds_with_the_redirect_policy() {
        assert!(ReqwestTransport::new().is_ok());
    }
}
