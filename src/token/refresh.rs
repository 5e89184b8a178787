//! Credential refresh handshake.
//!
//! Exchanging an expiring token for a fresh one is a two-step protocol:
//! request a challenge message, sign it, and submit the signed challenge to
//! the verify endpoint. The signing algorithm itself is an external trust
//! capability behind [`ChallengeSigner`]; this module only shapes the
//! requests.
//!
//! The refresher never retries internally. Callers (the worker's credential
//! check, the fleet sweep) decide whether and when to try again.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RefreshError;
use crate::token::claims;

/// External signing capability for auth challenges.
///
/// The real wallet signature algorithm is supplied by the trust component
/// that owns the private key; implementations only need to return an opaque
/// signature string and the matching public key.
pub trait ChallengeSigner: Send + Sync {
    /// Public key submitted alongside the signature.
    fn public_key(&self) -> &str;

    /// Sign a challenge message issued at `timestamp`.
    fn sign(&self, message: &str, timestamp: i64) -> Result<String, RefreshError>;
}

/// Signer backed by the configured signing secret.
///
/// Produces a deterministic opaque signature by hashing
/// secret ‖ message ‖ timestamp. This satisfies the handshake's wire shape;
/// swap in a real wallet signer behind the same trait when one exists.
pub struct SecretSigner {
    secret: SecretString,
    public_key: String,
}

impl SecretSigner {
    pub fn new(secret: SecretString, public_key: String) -> Self {
        Self { secret, public_key }
    }
}

impl ChallengeSigner for SecretSigner {
    fn public_key(&self) -> &str {
        &self.public_key
    }

    fn sign(&self, message: &str, timestamp: i64) -> Result<String, RefreshError> {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.expose_secret().as_bytes());
        hasher.update(message.as_bytes());
        hasher.update(timestamp.to_be_bytes());
        Ok(STANDARD.encode(hasher.finalize()))
    }
}

impl std::fmt::Debug for SecretSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSigner")
            .field("secret", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Seam for exchanging an old credential for a new one.
#[async_trait]
pub trait TokenRefresh: Send + Sync {
    /// Run one refresh handshake and return the new credential.
    ///
    /// The caller is responsible for persisting it.
    async fn refresh(&self, old_token: &str) -> Result<String, RefreshError>;
}

/// Production refresher talking to the auth endpoints.
pub struct TokenRefresher {
    http: Client,
    base_url: String,
    signer: Arc<dyn ChallengeSigner>,
}

impl TokenRefresher {
    pub fn new(http: Client, base_url: impl Into<String>, signer: Arc<dyn ChallengeSigner>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            signer,
        }
    }
}

#[async_trait]
impl TokenRefresh for TokenRefresher {
    async fn refresh(&self, old_token: &str) -> Result<String, RefreshError> {
        let token_label = claims::label(old_token);
        tracing::debug!(token = %token_label, "requesting auth challenge");

        let challenge_url = format!("{}/api/auth/challenge", self.base_url);
        let resp = self.http.get(&challenge_url).send().await?;
        if !resp.status().is_success() {
            return Err(RefreshError::ChallengeUnavailable {
                status: resp.status().as_u16(),
            });
        }
        let challenge: ChallengeResponse = resp.json().await?;

        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.signer.sign(&challenge.message, timestamp)?;
        let payload = SignedChallenge {
            message: challenge.message,
            timestamp,
            signature,
            public_key: self.signer.public_key().to_string(),
        };

        let verify_url = format!("{}/api/auth/verify", self.base_url);
        let resp = self.http.post(&verify_url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(RefreshError::ExchangeRejected {
                reason: format!("HTTP {}", resp.status().as_u16()),
            });
        }
        let body: VerifyResponse = resp.json().await?;

        match body.token {
            Some(token) if !token.is_empty() => {
                tracing::info!(token = %token_label, "credential refreshed");
                Ok(token)
            }
            _ => Err(RefreshError::ExchangeRejected {
                reason: "no token in verify response".to_string(),
            }),
        }
    }
}

// Wire types for the auth handshake.

#[derive(Debug, Deserialize)]
struct ChallengeResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct SignedChallenge {
    message: String,
    timestamp: i64,
    signature: String,
    #[serde(rename = "publicKey")]
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    token: Option<String>,
}
