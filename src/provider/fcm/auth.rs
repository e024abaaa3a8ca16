//! Service account credentials and OAuth2 access tokens.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::ProviderConfig;
use crate::provider::ProviderError;

const SCOPES: &str = "https://www.googleapis.com/auth/firebase.messaging \
                      https://www.googleapis.com/auth/cloud-platform";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for the signed assertion
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the access token actually expires
const REFRESH_MARGIN_SECS: i64 = 60;

/// Google service account key, as found in the downloaded JSON key file
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl ServiceAccountKey {
    /// Resolve credentials from settings.
    ///
    /// Inline credentials (project ID, client email and private key) win over
    /// a key file path. Literal `\n` sequences in an inline key are expanded,
    /// since keys passed through environment variables usually arrive that way.
    pub fn from_settings(settings: &ProviderConfig) -> Result<Self, ProviderError> {
        if let (Some(project_id), Some(client_email), Some(private_key)) = (
            settings.project_id.as_ref(),
            settings.client_email.as_ref(),
            settings.private_key.as_ref(),
        ) {
            return Ok(Self {
                project_id: project_id.clone(),
                client_email: client_email.clone(),
                private_key: private_key.replace("\\n", "\n"),
                private_key_id: None,
            });
        }

        if let Some(path) = settings.service_account_path.as_deref() {
            return Self::from_file(path);
        }

        Err(ProviderError::Authentication(
            "Firebase configuration not found. Set FIREBASE_PROJECT_ID, FIREBASE_CLIENT_EMAIL \
             and FIREBASE_PRIVATE_KEY or provide a service account key file"
                .to_string(),
        ))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Authentication(format!(
                "Failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProviderError> {
        serde_json::from_str(raw).map_err(|e| {
            ProviderError::Authentication(format!("Invalid service account key: {}", e))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Exchanges signed service account assertions for OAuth2 access tokens and
/// caches them until shortly before expiry.
pub struct AccessTokenProvider {
    http: reqwest::Client,
    client_email: String,
    private_key_id: Option<String>,
    token_uri: String,
    encoding_key: EncodingKey,
    cached: RwLock<Option<CachedToken>>,
}

impl AccessTokenProvider {
    pub fn new(
        http: reqwest::Client,
        key: &ServiceAccountKey,
        token_uri: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ProviderError::Authentication(format!("Invalid service account private key: {}", e))
        })?;

        Ok(Self {
            http,
            client_email: key.client_email.clone(),
            private_key_id: key.private_key_id.clone(),
            token_uri: token_uri.into(),
            encoding_key,
            cached: RwLock::new(None),
        })
    }

    /// Current access token, fetching a new one when the cached one is stale
    pub async fn access_token(&self) -> Result<String, ProviderError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, ProviderError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key).map_err(|e| {
            ProviderError::Authentication(format!("Failed to sign token assertion: {}", e))
        })
    }

    async fn fetch(&self) -> Result<CachedToken, ProviderError> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "OAuth token exchange failed");
            return Err(ProviderError::Authentication(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("token response: {}", e)))?;

        tracing::debug!(expires_in = token.expires_in, "Obtained FCM access token");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}
