//! Fleet bootstrap for the `run` command.

use std::sync::Arc;

use anyhow::Context as _;

use crate::client::{RetryPolicy, TaskClient};
use crate::fleet::{FleetConfig, FleetCoordinator};
use crate::settings::Settings;
use crate::shutdown::Shutdown;
use crate::token::refresh::{SecretSigner, TokenRefresher};
use crate::token::store::TokenStore;

/// Wire everything up and run the fleet until ctrl-c.
///
/// The only fatal conditions are at startup: no loadable credentials, or no
/// signing secret. Everything past this point recovers locally.
pub async fn run_fleet(settings: Settings) -> anyhow::Result<()> {
    let store = TokenStore::open(&settings.tokens_file, &settings.key_file)
        .with_context(|| format!("opening token store {}", settings.tokens_file.display()))?;
    if store.is_empty() {
        anyhow::bail!(
            "no usable credentials in {}; add one with `nebula-fleet tokens add`",
            settings.tokens_file.display()
        );
    }

    let secret = settings
        .signing_secret
        .clone()
        .context("WALLET_PRIVATE_KEY is not set; credential refresh would be impossible")?;
    let signer = Arc::new(SecretSigner::new(
        secret,
        settings.public_key.clone().unwrap_or_default(),
    ));

    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
        .context("building HTTP client")?;
    let refresher = Arc::new(TokenRefresher::new(
        http.clone(),
        settings.auth_base_url.clone(),
        signer,
    ));
    let api = Arc::new(TaskClient::new(
        http,
        settings.base_url.clone(),
        RetryPolicy::default(),
    ));

    let (handle, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        handle.shutdown();
    });

    let config = FleetConfig {
        refresh_sweep_interval: settings.refresh_sweep_interval,
        report_interval: settings.report_interval,
        ..FleetConfig::default()
    };
    FleetCoordinator::new(Arc::new(store), refresher, api, config)
        .run(shutdown)
        .await
}
