//! Firebase ID token verification.
//!
//! ID tokens are RS256 JWTs signed with keys Google publishes as a JWK set.
//! A shared-secret (HS256) key source is available for local development and
//! the auth emulator; it checks the same claims.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{IdentityClaim, IdentityVerifier, VerifyError};
use crate::config::Config;

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Minimum gap between refetches triggered by an unknown key id.
const UNKNOWN_KID_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Claims of a Firebase ID token that the backend relies on.
#[derive(Debug, Clone, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl FirebaseClaims {
    fn into_identity(self) -> Result<IdentityClaim, VerifyError> {
        if self.sub.trim().is_empty() {
            return Err(VerifyError::InvalidCredential("empty subject".into()));
        }
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| VerifyError::InvalidCredential("token carries no email".into()))?;

        Ok(IdentityClaim {
            external_id: self.sub,
            email,
            display_name: self.name.filter(|n| !n.trim().is_empty()),
        })
    }
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// Signing keys fetched from a JWK set endpoint and cached.
struct JwksCache {
    url: String,
    client: reqwest::Client,
    refresh_interval: Duration,
    cached: RwLock<Option<CachedKeys>>,
}

impl JwksCache {
    /// Look up the key for `kid`, refetching when the cache is stale or the kid is unknown.
    async fn key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        {
            let cached = self.cached.read().await;
            if let Some(cached) = cached.as_ref() {
                let fresh = cached.fetched_at.elapsed() < self.refresh_interval;
                match cached.keys.get(kid) {
                    Some(key) if fresh => return Ok(key.clone()),
                    None if fresh && cached.fetched_at.elapsed() < UNKNOWN_KID_COOLDOWN => {
                        return Err(VerifyError::InvalidCredential(format!(
                            "unknown signing key '{}'",
                            kid
                        )));
                    }
                    _ => {}
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another request may have refreshed while we waited for the lock
        let stale = cached.as_ref().map_or(true, |c| {
            let age = c.fetched_at.elapsed();
            age >= self.refresh_interval
                || (!c.keys.contains_key(kid) && age >= UNKNOWN_KID_COOLDOWN)
        });
        if stale {
            tracing::info!(url = %self.url, "Fetching identity provider signing keys");
            let keys = self.fetch().await?;
            *cached = Some(CachedKeys {
                keys,
                fetched_at: Instant::now(),
            });
        }

        cached
            .as_ref()
            .and_then(|c| c.keys.get(kid).cloned())
            .ok_or_else(|| VerifyError::InvalidCredential(format!("unknown signing key '{}'", kid)))
    }

    async fn fetch(&self) -> Result<HashMap<String, DecodingKey>, VerifyError> {
        let jwks: JwksResponse = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| VerifyError::Unavailable(format!("JWKS fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| VerifyError::Unavailable(format!("JWKS decode failed: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys.into_iter().filter(|k| k.kty == "RSA") {
            let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .map_err(|e| VerifyError::Unavailable(format!("Invalid RSA key: {}", e)))?;
            keys.insert(jwk.kid, key);
        }

        if keys.is_empty() {
            return Err(VerifyError::Unavailable(
                "No RSA keys found in JWKS".to_string(),
            ));
        }

        Ok(keys)
    }
}

enum KeySource {
    Jwks(JwksCache),
    Shared(DecodingKey),
}

/// Verifies Firebase ID tokens for one project.
pub struct FirebaseVerifier {
    project_id: String,
    keys: KeySource,
}

impl FirebaseVerifier {
    /// Verifier backed by the JWK set at `jwks_url`.
    pub fn with_jwks(
        project_id: impl Into<String>,
        jwks_url: impl Into<String>,
        refresh_interval: Duration,
        http_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(http_timeout).build()?;
        Ok(Self {
            project_id: project_id.into(),
            keys: KeySource::Jwks(JwksCache {
                url: jwks_url.into(),
                client,
                refresh_interval,
                cached: RwLock::new(None),
            }),
        })
    }

    /// Verifier that accepts HS256 tokens signed with `secret`.
    pub fn with_shared_secret(project_id: impl Into<String>, secret: &[u8]) -> Self {
        Self {
            project_id: project_id.into(),
            keys: KeySource::Shared(DecodingKey::from_secret(secret)),
        }
    }

    /// Build the verifier selected by configuration.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let project_id = config
            .firebase_project_id
            .clone()
            .ok_or_else(|| "FIREBASE_PROJECT_ID must be set".to_string())?;

        match &config.auth_hs256_secret {
            Some(secret) => {
                tracing::warn!("Using shared-secret token verification; not for production");
                Ok(Self::with_shared_secret(project_id, secret.as_bytes()))
            }
            None => Self::with_jwks(
                project_id,
                config.jwks_url.clone(),
                config.jwks_refresh,
                config.verifier_timeout,
            )
            .map_err(|e| format!("Failed to build HTTP client: {}", e)),
        }
    }

    /// The `iss` value tokens for this project carry.
    pub fn issuer(&self) -> String {
        format!("{}{}", ISSUER_PREFIX, self.project_id)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, credential: &str) -> Result<IdentityClaim, VerifyError> {
        let header = decode_header(credential)
            .map_err(|e| VerifyError::InvalidCredential(format!("malformed token: {}", e)))?;

        let (key, algorithm) = match &self.keys {
            KeySource::Jwks(cache) => {
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| VerifyError::InvalidCredential("token has no key id".into()))?;
                (cache.key(kid).await?, Algorithm::RS256)
            }
            KeySource::Shared(key) => (key.clone(), Algorithm::HS256),
        };

        if header.alg != algorithm {
            return Err(VerifyError::InvalidCredential(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }

        let data = decode::<FirebaseClaims>(credential, &key, &self.validation(algorithm))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => VerifyError::ExpiredCredential,
                _ => VerifyError::InvalidCredential(e.to_string()),
            })?;

        data.claims.into_identity()
    }
}
