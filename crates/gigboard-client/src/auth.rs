//! Token providers and access-token verification.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use gigboard_core::{defaults, Error, Identity, Result, TokenProvider};

/// Static bearer token (already obtained externally). Cannot be refreshed.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }

    async fn refresh(&self) -> Result<String> {
        Err(Error::Unauthorized(
            "static token cannot be refreshed".to_string(),
        ))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

/// Exchanges a long-lived refresh token for access tokens at
/// `POST {api}/auth/refresh`.
///
/// Uses its own HTTP client so that refreshing never re-enters the
/// `ApiClient` retry path.
pub struct RefreshTokenProvider {
    http: Client,
    api_url: String,
    refresh_token: String,
    access: RwLock<Option<String>>,
}

impl RefreshTokenProvider {
    pub fn new(
        api_url: impl Into<String>,
        refresh_token: impl Into<String>,
        initial_access: Option<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            refresh_token: refresh_token.into(),
            access: RwLock::new(initial_access),
        })
    }
}

#[async_trait]
impl TokenProvider for RefreshTokenProvider {
    async fn access_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.access.read().await.clone() {
            return Ok(Some(token));
        }
        self.refresh().await.map(Some)
    }

    async fn refresh(&self) -> Result<String> {
        let url = format!("{}/auth/refresh", self.api_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": self.refresh_token }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Unauthorized(format!(
                "refresh rejected ({}): {}",
                status.as_u16(),
                body
            )));
        }

        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("refresh response: {}", e)))?;
        *self.access.write().await = Some(body.access_token.clone());
        debug!("Obtained new access token");
        Ok(body.access_token)
    }
}

/// Claims read from an identity-provider access token.
#[derive(Debug, Deserialize)]
struct IdentityClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies RS256 access tokens with the identity provider's public key.
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    /// Build a verifier from a PEM-encoded RSA public key.
    pub fn from_rsa_pem(pem: &str) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| Error::Config(format!("invalid identity provider key: {}", e)))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        info!("Identity verifier initialized");
        Ok(Self { key, validation })
    }

    /// Verify signature and expiry, returning the asserted identity.
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let data = decode::<IdentityClaims>(token, &self.key, &self.validation)
            .map_err(|e| Error::Unauthorized(format!("invalid access token: {}", e)))?;
        Ok(Identity {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}
