//! Untrusted JWT claims inspection.
//!
//! Tokens are bearer JWTs whose payload carries a self-reported `exp` claim.
//! The service is the only party that verifies signatures; this module only
//! reads the claimed expiry to decide when to refresh. Decoded claims are
//! never treated as authenticated.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::TokenError;

/// How long before the claimed expiry a token counts as expired.
pub const EXPIRY_LEAD_SECS: i64 = 3600;

/// Claims decoded from a token payload, without signature verification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Expiry as seconds since the Unix epoch. Absence means the token is
    /// unusable and must be refreshed.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Subject, when present. Only used for display.
    #[serde(default)]
    pub sub: Option<String>,
}

impl TokenClaims {
    /// The claimed expiry instant, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_unverified(token: &str) -> Result<TokenClaims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(TokenError::MalformedToken {
            reason: "expected three dot-separated segments".to_string(),
        });
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenError::MalformedToken {
            reason: format!("payload is not base64url: {e}"),
        })?;

    serde_json::from_slice(&bytes).map_err(|e| TokenError::MalformedToken {
        reason: format!("payload is not a JSON object: {e}"),
    })
}

/// Whether `token` is expired or will expire within `lead_secs`.
///
/// Fails safe toward refreshing: a malformed token or a missing `exp` claim
/// counts as expired.
pub fn is_expired(token: &str, lead_secs: i64) -> bool {
    let claims = match decode_unverified(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("treating undecodable token as expired: {e}");
            return true;
        }
    };
    let Some(expires_at) = claims.expires_at() else {
        return true;
    };
    expires_at <= Utc::now() + chrono::Duration::seconds(lead_secs)
}

/// Short display label for a token, safe for logs.
pub fn label(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}…")
}

#[cfg(test)]
pub(crate) mod test_support {
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    /// Build an unsigned JWT whose payload is the given JSON value.
    pub fn make_jwt(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{header}.{body}.sig")
    }

    /// An unsigned JWT expiring `offset_secs` from now.
    pub fn jwt_expiring_in(offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + offset_secs;
        make_jwt(serde_json::json!({ "exp": exp, "sub": "worker" }))
    }
}
