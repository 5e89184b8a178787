//! Error types shared across the fleet.
//!
//! Each domain gets its own enum: credential storage, the refresh handshake,
//! the remote task client, and the compute step. Worker-level policy (what is
//! retried, what trips the circuit breaker) lives in `worker`, not here.

use std::path::PathBuf;

/// Errors from the encrypted credential store.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// A stored line could not be decrypted with the current key.
    ///
    /// This excludes the affected credential from the run; it never aborts
    /// loading the rest of the file.
    #[error("stored credential could not be decrypted: {reason}")]
    CorruptStorage { reason: String },

    /// The credential is not a decodable JWT.
    #[error("malformed token: {reason}")]
    MalformedToken { reason: String },

    /// Encryption of a credential failed.
    #[error("encryption failed: {reason}")]
    Crypto { reason: String },

    /// Filesystem error on the token or key file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the credential refresh handshake.
///
/// The refresher never retries internally; the worker decides whether and
/// when to try again.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The challenge endpoint answered with a non-success status.
    #[error("auth challenge unavailable (HTTP {status})")]
    ChallengeUnavailable { status: u16 },

    /// The verify endpoint rejected the signed challenge or returned no token.
    #[error("challenge exchange rejected: {reason}")]
    ExchangeRejected { reason: String },

    /// Transport-level failure anywhere in the handshake.
    #[error("refresh handshake failed: {0}")]
    Failed(#[from] reqwest::Error),

    /// No signing secret is configured, so no challenge can be signed.
    #[error("no signing secret configured")]
    MissingSecret,
}

/// Errors from the remote task client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP 401: the service no longer accepts this credential.
    ///
    /// Surfaced immediately, never retried; the worker handles it by
    /// refreshing on the next credential check instead of burning attempts.
    #[error("service rejected the credential")]
    CredentialRejected,

    /// Task fetch gave up after exhausting the retry budget.
    #[error("task fetch failed after {attempts} attempts: {reason}")]
    FetchFailed { attempts: u32, reason: String },

    /// Result submission gave up after exhausting the retry budget.
    #[error("result submission failed after {attempts} attempts: {reason}")]
    SubmitFailed { attempts: u32, reason: String },

    /// Request-level transport failure (timeout, connection reset).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body did not match the wire contract.
    #[error("unexpected response: {reason}")]
    InvalidResponse { reason: String },

    /// The service answered with a non-zero status code in the body.
    #[error("service returned code {code}")]
    ServiceCode { code: i64 },

    /// A fleet shutdown aborted the call.
    #[error("cancelled by shutdown")]
    Cancelled,
}

impl ClientError {
    /// Whether the retry policy may try this call again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::CredentialRejected | ClientError::Cancelled)
    }
}

/// Errors from the deterministic compute step.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// Operand sizes differ. This is a programming error, never retried.
    #[error("matrix dimensions do not match: {left}x{left} vs {right}x{right}")]
    DimensionMismatch { left: usize, right: usize },

    /// The hash reduced to zero, so the result ratio is undefined.
    #[error("hash reduced to zero, result ratio undefined")]
    DivideByZero,
}
