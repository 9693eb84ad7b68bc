//! OAuth access tokens minted from a long-lived refresh token.
//!
//! The current token is kept in memory and mirrored to
//! `<resource_path>/oauth_token.json` so restarts reuse it until it expires.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const TOKEN_CACHE_FILE: &str = "oauth_token.json";
const REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("oauth token request failed: {0}")]
    Request(String),
    #[error("oauth token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("oauth token endpoint denied the refresh: {0}")]
    Denied(String),
    #[error("failed to decode oauth token response: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CachedToken {
    /// Usable for at least another minute at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

pub struct TokenManager {
    http: reqwest::Client,
    token_url: String,
    credentials: OAuthCredentials,
    cache_path: PathBuf,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        credentials: OAuthCredentials,
        resource_dir: &Path,
    ) -> Self {
        let cache_path = resource_dir.join(TOKEN_CACHE_FILE);
        let cached = load_cached_token(&cache_path);
        Self {
            http,
            token_url: token_url.into(),
            credentials,
            cache_path,
            cached: Mutex::new(cached),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Returns a token valid for at least the refresh margin, refreshing if needed.
    pub async fn access_token(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        let token = self.refresh().await?;
        self.persist(&token).await;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Forgets the current token, in memory and on disk, so the next call refreshes.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        *cached = None;
        match tokio::fs::remove_file(&self.cache_path).await {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!(
                event_name = "crm.oauth.cache.remove_failed",
                path = %self.cache_path.display(),
                error = %error,
                "stale token cache not removed"
            ),
        }
        info!(event_name = "crm.oauth.token.invalidated", "crm access token discarded");
    }

    async fn refresh(&self) -> Result<CachedToken, TokenError> {
        debug!(event_name = "crm.oauth.refresh.started", token_url = %self.token_url);
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.expose_secret()),
                ("refresh_token", self.credentials.refresh_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(|error| TokenError::Request(error.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| TokenError::Request(error.to_string()))?;
        if !status.is_success() {
            return Err(TokenError::Rejected { status: status.as_u16(), body });
        }

        let token = parse_token_response(&body, Utc::now())?;
        info!(
            event_name = "crm.oauth.refresh.completed",
            expires_at = %token.expires_at,
            "crm access token refreshed"
        );
        Ok(token)
    }

    async fn persist(&self, token: &CachedToken) {
        let serialized = match serde_json::to_vec_pretty(token) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(event_name = "crm.oauth.cache.write_failed", error = %error);
                return;
            }
        };
        if let Err(error) = tokio::fs::write(&self.cache_path, serialized).await {
            warn!(
                event_name = "crm.oauth.cache.write_failed",
                path = %self.cache_path.display(),
                error = %error,
                "token cache not persisted"
            );
        }
    }
}

/// Decodes a token endpoint body. The endpoint reports failures such as
/// `invalid_code` with a 200 status, so an `error` key wins over everything else.
pub fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<CachedToken, TokenError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|error| TokenError::Decode(error.to_string()))?;
    if let Some(error) = response.error {
        return Err(TokenError::Denied(error));
    }
    let access_token = response
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| TokenError::Decode("missing access_token".to_string()))?;
    let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS).clamp(0, 86_400);
    Ok(CachedToken { access_token, expires_at: now + Duration::seconds(expires_in) })
}

fn load_cached_token(path: &Path) -> Option<CachedToken> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(token) => Some(token),
        Err(error) => {
            warn!(
                event_name = "crm.oauth.cache.unreadable",
                path = %path.display(),
                error = %error,
                "ignoring token cache"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use secrecy::SecretString;

    use super::{
        parse_token_response, CachedToken, OAuthCredentials, TokenError, TokenManager,
        TOKEN_CACHE_FILE,
    };

    fn credentials() -> OAuthCredentials {
        OAuthCredentials {
            client_id: "1000.CLIENT".to_string(),
            client_secret: SecretString::from("shh".to_string()),
            refresh_token: SecretString::from("1000.refresh".to_string()),
        }
    }

    fn manager(dir: &std::path::Path) -> TokenManager {
        TokenManager::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/oauth/v2/token",
            credentials(),
            dir,
        )
    }

    #[test]
    fn token_response_sets_expiry_from_expires_in() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid time");
        let token = parse_token_response(
            r#"{"access_token":"1000.abc","api_domain":"https://www.zohoapis.in","token_type":"Bearer","expires_in":3600}"#,
            now,
        )
        .expect("token parses");

        assert_eq!(token.access_token, "1000.abc");
        assert_eq!(token.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn error_key_in_successful_response_is_denial() {
        let error = parse_token_response(r#"{"error":"invalid_code"}"#, Utc::now())
            .expect_err("should be denied");
        assert_eq!(error, TokenError::Denied("invalid_code".to_string()));
    }

    #[test]
    fn missing_access_token_is_decode_error() {
        assert!(matches!(
            parse_token_response(r#"{"expires_in":3600}"#, Utc::now()),
            Err(TokenError::Decode(_))
        ));
        assert!(matches!(parse_token_response("<html>", Utc::now()), Err(TokenError::Decode(_))));
    }

    #[test]
    fn freshness_keeps_a_one_minute_margin() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + Duration::seconds(90),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::seconds(30)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", credentials());
        assert!(!rendered.contains("shh"));
        assert!(!rendered.contains("1000.refresh"));

        let token = CachedToken { access_token: "1000.secret".to_string(), expires_at: Utc::now() };
        assert!(!format!("{token:?}").contains("1000.secret"));
    }

    #[tokio::test]
    async fn fresh_cached_token_is_reused_without_refresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = CachedToken {
            access_token: "1000.cached".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        std::fs::write(
            dir.path().join(TOKEN_CACHE_FILE),
            serde_json::to_string(&token).expect("serialize"),
        )
        .expect("write cache");

        let manager = manager(dir.path());

        assert_eq!(manager.access_token().await, Ok("1000.cached".to_string()));
    }

    #[tokio::test]
    async fn stale_cache_triggers_refresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = CachedToken {
            access_token: "1000.stale".to_string(),
            expires_at: Utc::now() + Duration::seconds(10),
        };
        std::fs::write(
            dir.path().join(TOKEN_CACHE_FILE),
            serde_json::to_string(&token).expect("serialize"),
        )
        .expect("write cache");

        let error =
            manager(dir.path()).access_token().await.expect_err("refresh must be attempted");

        assert!(matches!(error, TokenError::Request(_)));
    }

    #[tokio::test]
    async fn invalidate_drops_memory_and_disk_copies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let token = CachedToken {
            access_token: "1000.rejected".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        std::fs::write(
            dir.path().join(TOKEN_CACHE_FILE),
            serde_json::to_string(&token).expect("serialize"),
        )
        .expect("write cache");
        let manager = manager(dir.path());
        assert_eq!(manager.access_token().await, Ok("1000.rejected".to_string()));

        manager.invalidate().await;
        manager.invalidate().await;

        assert!(manager.cached.lock().await.is_none());
        assert!(!dir.path().join(TOKEN_CACHE_FILE).exists());
        assert!(matches!(manager.access_token().await, Err(TokenError::Request(_))));
    }

    #[tokio::test]
    async fn corrupt_cache_file_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(TOKEN_CACHE_FILE), "not json").expect("write cache");

        let manager = manager(dir.path());

        assert_eq!(manager.cache_path(), dir.path().join(TOKEN_CACHE_FILE));
        assert!(manager.cached.lock().await.is_none());
    }
}
