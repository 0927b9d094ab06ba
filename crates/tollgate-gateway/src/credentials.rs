//! Backend credentials from an OAuth authorized-user token file.
//!
//! The file holds `token`, `refresh_token`, `token_uri`, `client_id`,
//! `client_secret` and `expiry`. The access token is cached in memory and
//! refreshed through the token endpoint when it has expired or is about to.
//! Refreshed tokens are written back atomically; fields this module does not
//! know about are kept as they were.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tollgate_config::CredentialsSection;
use tollgate_core::{BackendError, Credential, CredentialProvider};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};

/// Token endpoint used when the file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct Cached {
    token: String,
    expiry: Option<DateTime<Utc>>,
}

fn credential_error(message: impl Into<String>) -> BackendError {
    BackendError::Credential(message.into())
}

/// Parse an `expiry` value. Timestamps without an offset are UTC.
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// [`CredentialProvider`] backed by an authorized-user token file.
///
/// All reads and refreshes go through one async mutex, so concurrent
/// requests that find the token stale cause a single refresh.
pub struct TokenFileCredentialProvider {
    path: PathBuf,
    skew: TimeDelta,
    client: Client,
    cache: Mutex<Option<Cached>>,
}

impl TokenFileCredentialProvider {
    /// Provider for the token file at `path`, refreshing `skew` before expiry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] for an out-of-range skew and
    /// [`GatewayError::Client`] if the HTTP client cannot be built.
    pub fn new(path: impl Into<PathBuf>, skew: Duration, timeout: Duration) -> GatewayResult<Self> {
        let skew = TimeDelta::from_std(skew)
            .map_err(|e| GatewayError::Config(format!("refresh skew out of range: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        Ok(Self {
            path: path.into(),
            skew,
            client,
            cache: Mutex::new(None),
        })
    }

    /// Provider from the `[credentials]` config section.
    ///
    /// # Errors
    ///
    /// See [`TokenFileCredentialProvider::new`].
    pub fn from_config(section: &CredentialsSection, timeout: Duration) -> GatewayResult<Self> {
        Self::new(
            &section.token_file,
            Duration::from_secs(section.refresh_skew_secs),
            timeout,
        )
    }

    /// Path of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_fresh(&self, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match expiry {
            None => true,
            Some(expiry) => now
                .checked_add_signed(self.skew)
                .is_some_and(|deadline| deadline < expiry),
        }
    }

    async fn load(&self) -> Result<TokenFile, BackendError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            credential_error(format!(
                "cannot read token file {}: {e}",
                self.path.display()
            ))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            credential_error(format!(
                "token file {} is not valid JSON: {e}",
                self.path.display()
            ))
        })
    }

    async fn exchange(&self, file: &TokenFile) -> Result<TokenResponse, BackendError> {
        let missing = |field: &str| credential_error(format!("token file has no {field}"));
        let refresh_token = file
            .refresh_token
            .as_deref()
            .ok_or_else(|| missing("refresh_token"))?;
        let client_id = file.client_id.as_deref().ok_or_else(|| missing("client_id"))?;
        let client_secret = file
            .client_secret
            .as_deref()
            .ok_or_else(|| missing("client_secret"))?;
        let uri = file.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);

        let response = self
            .client
            .post(uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| credential_error(format!("token endpoint unreachable: {}", e.without_url())))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| credential_error(format!("token endpoint read failed: {}", e.without_url())))?;

        if !status.is_success() {
            let reason = serde_json::from_slice::<TokenErrorBody>(&body)
                .ok()
                .and_then(|b| b.error_description.or(b.error))
                .unwrap_or_else(|| status.to_string());
            return Err(credential_error(format!("token refresh failed: {reason}")));
        }

        serde_json::from_slice(&body)
            .map_err(|e| credential_error(format!("invalid token endpoint response: {e}")))
    }

    async fn persist(&self, file: TokenFile) -> Result<(), String> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &file))
            .await
            .map_err(|e| format!("write task failed: {e}"))?
    }

    /// Exchange the refresh token and update cache and file. Caller holds
    /// the cache lock.
    async fn refresh_with(
        &self,
        cache: &mut Option<Cached>,
        mut file: TokenFile,
    ) -> Result<Credential, BackendError> {
        let response = self.exchange(&file).await?;
        let expiry = response
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        file.token = Some(response.access_token.clone());
        file.expiry = expiry.map(|e| e.to_rfc3339_opts(SecondsFormat::Micros, true));
        if let Some(rotated) = response.refresh_token {
            file.refresh_token = Some(rotated);
        }

        if let Err(e) = self.persist(file).await {
            warn!(path = %self.path.display(), error = %e, "failed to write refreshed token");
        }
        info!(expiry = ?expiry, "backend token refreshed");

        *cache = Some(Cached {
            token: response.access_token.clone(),
            expiry,
        });
        Ok(Credential::new(response.access_token))
    }
}

fn write_atomic(path: &Path, file: &TokenFile) -> Result<(), String> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let body = serde_json::to_vec_pretty(file).map_err(|e| e.to_string())?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| e.to_string())?;
    tmp.write_all(&body).map_err(|e| e.to_string())?;
    tmp.as_file().sync_all().map_err(|e| e.to_string())?;
    tmp.persist(path).map_err(|e| e.error.to_string())?;
    Ok(())
}

#[async_trait]
impl CredentialProvider for TokenFileCredentialProvider {
    async fn valid_credential(&self) -> Result<Credential, BackendError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();

        if let Some(cached) = cache.as_ref().filter(|c| self.is_fresh(c.expiry, now)) {
            return Ok(Credential::new(cached.token.clone()));
        }

        let file = self.load().await?;
        let expiry = match file.expiry.as_deref() {
            Some(raw) => match parse_expiry(raw) {
                Some(expiry) => Some(expiry),
                None => {
                    warn!(expiry = raw, "unreadable token expiry, refreshing");
                    Some(DateTime::<Utc>::MIN_UTC)
                },
            },
            None => None,
        };

        if let Some(token) = file.token.as_ref().filter(|_| self.is_fresh(expiry, now)) {
            debug!("using token from file");
            *cache = Some(Cached {
                token: token.clone(),
                expiry,
            });
            return Ok(Credential::new(token.clone()));
        }

        debug!("backend token expired, refreshing");
        self.refresh_with(&mut cache, file).await
    }

    async fn refresh(&self, stale: &Credential) -> Result<Credential, BackendError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.token != stale.token()) {
            debug!("token already replaced by a concurrent refresh");
            return Ok(Credential::new(cached.token.clone()));
        }

        *cache = None;
        let file = self.load().await?;
        self.refresh_with(&mut cache, file).await
    }
}

impl std::fmt::Debug for TokenFileCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenFileCredentialProvider")
            .field("path", &self.path)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const UNREACHABLE: &str = "http://127.0.0.1:9/token";

    #[derive(Clone, Default)]
    struct Endpoint {
        calls: Arc<AtomicUsize>,
    }

    async fn token_endpoint(
        State(endpoint): State<Endpoint>,
        Form(form): Form<HashMap<String, String>>,
    ) -> impl IntoResponse {
        endpoint.calls.fetch_add(1, Ordering::SeqCst);
        if form.get("refresh_token").map(String::as_str) != Some("1//refresh") {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."})),
            )
                .into_response();
        }
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["client_id"], "client.apps");
        assert_eq!(form["client_secret"], "shh");
        Json(json!({"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer"}))
            .into_response()
    }

    async fn serve_endpoint() -> (String, Endpoint) {
        let endpoint = Endpoint::default();
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .with_state(endpoint.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/token"), endpoint)
    }

    fn write_token(dir: &TempDir, token_uri: &str, expiry: &str) -> PathBuf {
        let path = dir.path().join("token.json");
        let body = json!({
            "token": "ya29.stale",
            "refresh_token": "1//refresh",
            "token_uri": token_uri,
            "client_id": "client.apps",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/gmail.modify"],
            "universe_domain": "googleapis.com",
            "expiry": expiry,
        });
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    fn provider(path: &Path) -> TokenFileCredentialProvider {
        TokenFileCredentialProvider::new(path, Duration::from_secs(60), Duration::from_secs(5)).unwrap()
    }

    fn in_an_hour() -> String {
        Utc::now()
            .checked_add_signed(TimeDelta::hours(1))
            .unwrap()
            .to_rfc3339()
    }

    #[test]
    fn test_parse_expiry_forms() {
        let aware = parse_expiry("2026-03-01T10:00:00Z").unwrap();
        let naive = parse_expiry("2026-03-01T10:00:00.123456").unwrap();
        let offset = parse_expiry("2026-03-01T12:00:00+02:00").unwrap();
        assert_eq!(aware, offset);
        assert_eq!(naive.timestamp(), aware.timestamp());
        assert!(parse_expiry("next tuesday").is_none());
    }

    #[tokio::test]
    async fn test_fresh_token_used_without_refresh() {
        let dir = TempDir::new().unwrap();
        let path = write_token(&dir, UNREACHABLE, &in_an_hour());
        let provider = provider(&path);

        let credential = provider.valid_credential().await.unwrap();
        assert_eq!(credential.token(), "ya29.stale");

        // Served from memory once loaded.
        std::fs::remove_file(&path).unwrap();
        assert_eq!(provider.valid_credential().await.unwrap().token(), "ya29.stale");
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_written_back() {
        let (uri, endpoint) = serve_endpoint().await;
        let dir = TempDir::new().unwrap();
        let path = write_token(&dir, &uri, "2020-01-01T00:00:00.000000");
        let provider = provider(&path);

        let credential = provider.valid_credential().await.unwrap();
        assert_eq!(credential.token(), "ya29.fresh");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);

        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["token"], "ya29.fresh");
        assert_eq!(saved["refresh_token"], "1//refresh");
        assert_eq!(saved["universe_domain"], "googleapis.com");
        assert_eq!(saved["scopes"][0], "https://www.googleapis.com/auth/gmail.modify");
        let expiry = parse_expiry(saved["expiry"].as_str().unwrap()).unwrap();
        assert!(expiry > Utc::now());

        // Now fresh; no second refresh.
        provider.valid_credential().await.unwrap();
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_inside_skew_is_refreshed() {
        let (uri, endpoint) = serve_endpoint().await;
        let dir = TempDir::new().unwrap();
        let soon = Utc::now()
            .checked_add_signed(TimeDelta::seconds(30))
            .unwrap()
            .to_rfc3339();
        let path = write_token(&dir, &uri, &soon);

        assert_eq!(provider(&path).valid_credential().await.unwrap().token(), "ya29.fresh");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forced_refresh_ignores_freshness() {
        let (uri, endpoint) = serve_endpoint().await;
        let dir = TempDir::new().unwrap();
        let path = write_token(&dir, &uri, &in_an_hour());
        let provider = provider(&path);

        assert_eq!(provider.valid_credential().await.unwrap().token(), "ya29.stale");
        let stale = Credential::new("ya29.stale");
        assert_eq!(provider.refresh(&stale).await.unwrap().token(), "ya29.fresh");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.valid_credential().await.unwrap().token(), "ya29.fresh");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let (uri, endpoint) = serve_endpoint().await;
        let dir = TempDir::new().unwrap();
        let path = write_token(&dir, &uri, "2020-01-01T00:00:00Z");
        let provider = Arc::new(provider(&path));

        let calls = (0..8).map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.valid_credential().await })
        });
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().unwrap().token(), "ya29.fresh");
        }
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_forced_refreshes_share_one_exchange() {
        let (uri, endpoint) = serve_endpoint().await;
        let dir = TempDir::new().unwrap();
        let path = write_token(&dir, &uri, &in_an_hour());
        let provider = Arc::new(provider(&path));
        let stale = provider.valid_credential().await.unwrap();
        assert_eq!(stale.token(), "ya29.stale");

        let calls = (0..8).map(|_| {
            let provider = Arc::clone(&provider);
            let stale = stale.clone();
            tokio::spawn(async move { provider.refresh(&stale).await })
        });
        for result in futures::future::join_all(calls).await {
            assert_eq!(result.unwrap().unwrap().token(), "ya29.fresh");
        }
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_of_current_token_exchanges_again() {
        let (uri, endpoint) = serve_endpoint().await;
        let dir = TempDir::new().unwrap();
        let path = write_token(&dir, &uri, &in_an_hour());
        let provider = provider(&path);

        let first = provider.refresh(&Credential::new("ya29.stale")).await.unwrap();
        // The backend refused the refreshed token as well.
        let second = provider.refresh(&first).await.unwrap();
        assert_eq!(second.token(), "ya29.fresh");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_is_credential_error() {
        let (uri, _endpoint) = serve_endpoint().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            json!({
                "token": "ya29.stale",
                "refresh_token": "1//revoked",
                "token_uri": uri,
                "client_id": "client.apps",
                "client_secret": "shh",
                "expiry": "2020-01-01T00:00:00Z",
            })
            .to_string(),
        )
        .unwrap();

        let err = provider(&path).valid_credential().await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Credential("token refresh failed: Token has been expired or revoked.".into())
        );
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token": "t", "expiry": "2020-01-01T00:00:00Z"}"#).unwrap();

        let err = provider(&path).valid_credential().await.unwrap_err();
        assert_eq!(err, BackendError::Credential("token file has no refresh_token".into()));
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        assert!(matches!(
            provider(&path).valid_credential().await,
            Err(BackendError::Credential(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        let err = provider(&path).valid_credential().await.unwrap_err();
        assert!(matches!(err, BackendError::Credential(m) if m.contains("not valid JSON")));
    }

    #[tokio::test]
    async fn test_token_without_expiry_is_used() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token": "ya29.forever"}"#).unwrap();
        assert_eq!(provider(&path).valid_credential().await.unwrap().token(), "ya29.forever");
    }
}
