//! Environment-backed settings.
//!
//! Everything is read from env vars (a `.env` file is loaded by `main`
//! before this runs) with working defaults, so a bare `nebula-fleet run`
//! next to a `tokens.txt` just works.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Runtime settings for the fleet and the CLI commands.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the task service.
    pub base_url: String,
    /// Base URL of the auth endpoints. Defaults to `base_url`.
    pub auth_base_url: String,
    /// Path of the encrypted credential file.
    pub tokens_file: PathBuf,
    /// Path of the encryption key file, created on first use.
    pub key_file: PathBuf,
    /// Secret used to sign refresh challenges. Required to run the fleet.
    pub signing_secret: Option<SecretString>,
    /// Public key submitted with signed challenges.
    pub public_key: Option<String>,
    /// Per-request timeout for task fetch/submit and the auth handshake.
    pub request_timeout: Duration,
    /// Interval of the fleet-wide refresh sweep.
    pub refresh_sweep_interval: Duration,
    /// Interval of the statistics report.
    pub report_interval: Duration,
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn load() -> Self {
        let base_url = env_or("NEBULA_BASE_URL", "https://nebulai.network");
        let auth_base_url = std::env::var("NEBULA_AUTH_URL").unwrap_or_else(|_| base_url.clone());
        Self {
            base_url,
            auth_base_url,
            tokens_file: PathBuf::from(env_or("TOKENS_FILE", "tokens.txt")),
            key_file: PathBuf::from(env_or("TOKEN_KEY_FILE", ".token_encryption_key")),
            signing_secret: std::env::var("WALLET_PRIVATE_KEY")
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::from),
            public_key: std::env::var("WALLET_PUBLIC_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", 10),
            refresh_sweep_interval: env_secs("REFRESH_SWEEP_SECS", 3600),
            report_interval: env_secs("REPORT_INTERVAL_SECS", 300),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
