//! Credential management CLI commands.
//!
//! Tokens are inspected by decoding their claims without verification; the
//! expiry shown here is whatever the token claims about itself.

use chrono::Utc;
use clap::Subcommand;

use crate::settings::Settings;
use crate::token::claims;
use crate::token::store::TokenStore;

#[derive(Subcommand, Debug, Clone)]
pub enum TokensCommand {
    /// List stored credentials and their expiry status
    List,

    /// Add a new credential to the store
    Add {
        /// The raw JWT to add
        token: String,
    },

    /// Remove credentials whose claimed expiry has passed
    Prune,
}

/// Run a tokens command.
pub async fn run_tokens_command(cmd: TokensCommand, settings: &Settings) -> anyhow::Result<()> {
    match cmd {
        TokensCommand::List => list_tokens(settings).await,
        TokensCommand::Add { token } => add_token(settings, &token).await,
        TokensCommand::Prune => prune_tokens(settings).await,
    }
}

async fn list_tokens(settings: &Settings) -> anyhow::Result<()> {
    let store = TokenStore::open(&settings.tokens_file, &settings.key_file)?;
    let tokens = store.snapshot().await;

    if tokens.is_empty() {
        println!("No credentials stored in {}", settings.tokens_file.display());
        return Ok(());
    }

    println!("Credentials in {}:", settings.tokens_file.display());
    println!();
    for (i, token) in tokens.iter().enumerate() {
        println!("  {:>3}  {}  {}", i + 1, claims::label(token), describe(token));
    }
    Ok(())
}

/// One-line expiry status for a token.
fn describe(token: &str) -> String {
    let claims = match claims::decode_unverified(token) {
        Ok(claims) => claims,
        Err(e) => return format!("malformed ({e})"),
    };
    let Some(expires_at) = claims.expires_at() else {
        return "no expiry claim".to_string();
    };

    let now = Utc::now();
    if expires_at <= now {
        format!("expired {} ago", human_delta(now - expires_at))
    } else {
        format!(
            "valid until {} (in {})",
            expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            human_delta(expires_at - now)
        )
    }
}

fn human_delta(delta: chrono::Duration) -> String {
    let mins = delta.num_minutes();
    if mins < 60 {
        format!("{mins}m")
    } else if mins < 24 * 60 {
        format!("{}h {:02}m", mins / 60, mins % 60)
    } else {
        format!("{}d {}h", mins / (24 * 60), (mins / 60) % 24)
    }
}

async fn add_token(settings: &Settings, token: &str) -> anyhow::Result<()> {
    // Reject anything that doesn't even decode as a JWT.
    claims::decode_unverified(token)
        .map_err(|e| anyhow::anyhow!("refusing to add credential: {e}"))?;

    let mut store = TokenStore::open(&settings.tokens_file, &settings.key_file)?;
    if store.snapshot().await.iter().any(|t| t == token) {
        anyhow::bail!("credential already stored");
    }

    store.append(token)?;
    println!("Added credential {} ({})", claims::label(token), describe(token));
    Ok(())
}

async fn prune_tokens(settings: &Settings) -> anyhow::Result<()> {
    let store = TokenStore::open(&settings.tokens_file, &settings.key_file)?;
    let tokens = store.snapshot().await;

    // Prune drops tokens already past their claimed expiry, not ones merely
    // inside the refresh lead window, since those are still refreshable.
    let kept: Vec<String> = tokens
        .iter()
        .filter(|t| !claims::is_expired(t, 0))
        .cloned()
        .collect();
    let removed = tokens.len() - kept.len();

    if removed == 0 {
        println!("No expired credentials to remove");
        return Ok(());
    }

    store.write_all(&kept)?;
    println!("Removed {removed} expired credential(s), {} remaining", kept.len());
    Ok(())
}
