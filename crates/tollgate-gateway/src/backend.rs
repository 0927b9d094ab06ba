//! HTTP backend adapter.
//!
//! Sends approved operations to the upstream API over `reqwest`. The
//! outbound URL is the route's base URL followed by the full canonical path,
//! so `/gmail/v1/users/me/messages` with base `https://gmail.googleapis.com`
//! goes to `https://gmail.googleapis.com/gmail/v1/users/me/messages`.
//! Canonical segments are decoded, so each one is escaped again on the way
//! out; a calendar id containing `#` travels as `%23`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method as HttpMethod};
use tollgate_config::BackendSection;
use tollgate_core::{Backend, BackendError, BackendResponse, ForwardRequest};
use tracing::debug;
use url::Url;

use crate::error::{GatewayError, GatewayResult};

// ── Routing ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Route {
    prefix: String,
    base: String,
}

/// [`Backend`] that performs real HTTP calls.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    routes: Vec<Route>,
}

impl HttpBackend {
    /// Build from `(prefix, base_url)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] for an unusable base URL and
    /// [`GatewayError::Client`] if the HTTP client cannot be built.
    pub fn new<I, P, B>(routes: I, timeout: Duration) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = (P, B)>,
        P: Into<String>,
        B: AsRef<str>,
    {
        let routes = routes
            .into_iter()
            .map(|(prefix, base)| {
                let base = base.as_ref();
                let parsed = Url::parse(base)
                    .map_err(|e| GatewayError::Config(format!("invalid base URL '{base}': {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(GatewayError::Config(format!(
                        "base URL '{base}' must be http or https"
                    )));
                }
                Ok(Route {
                    prefix: prefix.into(),
                    base: base.trim_end_matches('/').to_owned(),
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self { client, routes })
    }

    /// Build from the `[backend]` config section.
    ///
    /// # Errors
    ///
    /// See [`HttpBackend::new`].
    pub fn from_config(section: &BackendSection) -> GatewayResult<Self> {
        Self::new(
            section
                .routes
                .iter()
                .map(|r| (r.prefix.clone(), r.base_url.as_str())),
            Duration::from_secs(section.request_timeout_secs),
        )
    }

    fn route(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|r| path.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
    }

    fn url_for(&self, request: &ForwardRequest) -> Result<Url, BackendError> {
        let route = self.route(&request.path).ok_or_else(|| {
            BackendError::Transport(format!("no backend route for {}", request.path))
        })?;
        let mut url = Url::parse(&route.base)
            .map_err(|e| BackendError::Transport(format!("invalid backend URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Transport("backend URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(request.path.split('/').filter(|s| !s.is_empty()));
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn forward(&self, request: &ForwardRequest) -> Result<BackendResponse, BackendError> {
        let url = self.url_for(request)?;
        let method = HttpMethod::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| BackendError::Transport(format!("invalid method: {e}")))?;

        let mut bearer = HeaderValue::try_from(format!("Bearer {}", request.credential.token()))
            .map_err(|_| BackendError::Credential("credential is not a valid header value".into()))?;
        bearer.set_sensitive(true);

        let mut builder = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, bearer);
        if let Some(content_type) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.without_url().to_string()))?;

        debug!(status = status.as_u16(), bytes = body.len(), "backend responded");

        if status.is_client_error() || status.is_server_error() {
            return Err(upstream_error(status.as_u16(), &body));
        }

        Ok(BackendResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Wrap a backend 4xx/5xx, keeping its status and JSON payload.
fn upstream_error(status: u16, body: &[u8]) -> BackendError {
    let details = serde_json::from_slice::<serde_json::Value>(body).ok();
    let message = details
        .as_ref()
        .and_then(|v| v.pointer("/error/message"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| format!("backend returned status {status}"), str::to_owned);
    BackendError::Upstream {
        status,
        message,
        details,
    }
}
