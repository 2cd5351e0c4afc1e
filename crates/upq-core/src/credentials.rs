//! Access tokens for the drive API.
//!
//! The worker asks its provider for a token once per job; a provider backed
//! by a credential file refreshes and rewrites it when the token is close to
//! expiry.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::remote::http::{self, HttpOptions, Method};

/// Tokens expiring within this many seconds are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 300;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A bearer token valid for at least the next few minutes.
    async fn access_token(&self) -> Result<String>;
}

/// Fixed token, for tests and for tokens minted outside this process.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Credential file contents (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds; 0 or absent means unknown (never refreshed proactively).
    #[serde(default)]
    pub expires_at: i64,
    pub token_url: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl StoredCredentials {
    pub fn needs_refresh(&self, now: i64) -> bool {
        self.refresh_token.is_some() && self.expires_at > 0 && self.expires_at - now <= REFRESH_MARGIN_SECS
    }

    /// `application/x-www-form-urlencoded` body of a refresh_token grant.
    fn refresh_form(&self) -> Option<String> {
        let refresh_token = self.refresh_token.as_deref()?;
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .append_pair("client_id", &self.client_id);
        if let Some(secret) = &self.client_secret {
            form.append_pair("client_secret", secret);
        }
        if let Some(uri) = &self.redirect_uri {
            form.append_pair("redirect_uri", uri);
        }
        Some(form.finish())
    }

    fn apply(&mut self, grant: TokenResponse, now: i64) {
        self.access_token = grant.access_token;
        if let Some(rt) = grant.refresh_token {
            self.refresh_token = Some(rt);
        }
        self.expires_at = now + grant.expires_in.unwrap_or(3600);
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Provider backed by a JSON credential file on disk.
pub struct SessionFileCredentials {
    path: PathBuf,
    http: HttpOptions,
    cached: Mutex<Option<StoredCredentials>>,
}

impl SessionFileCredentials {
    pub fn new(path: impl Into<PathBuf>, http: HttpOptions) -> Self {
        Self {
            path: path.into(),
            http,
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoredCredentials> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read credentials {}", self.path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parse credentials {}", self.path.display()))
    }

    async fn save(&self, creds: &StoredCredentials) -> Result<()> {
        let data = serde_json::to_string_pretty(creds)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }

    async fn refresh(&self, creds: &mut StoredCredentials, now: i64) -> Result<()> {
        let Some(form) = creds.refresh_form() else {
            bail!("credentials have no refresh token");
        };
        let url = creds.token_url.clone();
        let opts = self.http;
        let resp = tokio::task::spawn_blocking(move || {
            let headers = ["Content-Type: application/x-www-form-urlencoded".to_string()];
            http::request(Method::Post, &url, &headers, Some(form.as_bytes()), &opts)
        })
        .await
        .context("token refresh task")??;
        if resp.status != 200 {
            return Err(resp.into_error()).context("token refresh rejected");
        }
        let grant: TokenResponse = resp.json()?;
        creds.apply(grant, now);
        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for SessionFileCredentials {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let mut creds = match cached.take() {
            Some(c) => c,
            None => self.load().await?,
        };
        let now = unix_now();
        if creds.needs_refresh(now) {
            tracing::debug!(path = %self.path.display(), "refreshing access token");
            match self.refresh(&mut creds, now).await {
                Ok(()) => self.save(&creds).await?,
                Err(e) if creds.expires_at > now => {
                    // Still valid for a little while; try again on the next job.
                    tracing::warn!(error = %e, "token refresh failed, using current token");
                }
                Err(e) => return Err(e),
            }
        }
        let token = creds.access_token.clone();
        *cached = Some(creds);
        Ok(token)
    }
}
