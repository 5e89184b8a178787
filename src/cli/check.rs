//! Preflight health check for the `check` command.
//!
//! Verifies everything the fleet needs before it starts: the credential
//! file, the encryption key and its permissions, the signing secret, and
//! reachability of the remote service. Critical failures exit non-zero.

use std::time::Duration;

use crate::settings::Settings;
use crate::token::store::TokenStore;

/// Outcome of one check.
enum Status {
    Pass,
    Warn,
    Fail,
}

struct Report {
    critical_failures: u32,
    warnings: u32,
}

impl Report {
    fn new() -> Self {
        Self {
            critical_failures: 0,
            warnings: 0,
        }
    }

    fn record(&mut self, status: Status, message: &str) {
        match status {
            Status::Pass => println!("  ok    {message}"),
            Status::Warn => {
                self.warnings += 1;
                println!("  warn  {message}");
            }
            Status::Fail => {
                self.critical_failures += 1;
                println!("  FAIL  {message}");
            }
        }
    }
}

/// Run all preflight checks.
pub async fn run_check(settings: &Settings) -> anyhow::Result<()> {
    println!("Preflight checks");
    println!();

    let mut report = Report::new();
    check_signing_secret(settings, &mut report);
    check_key_file(settings, &mut report);
    check_tokens(settings, &mut report).await;
    check_connectivity(settings, &mut report).await;

    println!();
    if report.critical_failures > 0 {
        anyhow::bail!(
            "{} critical failure(s), {} warning(s)",
            report.critical_failures,
            report.warnings
        );
    }
    println!(
        "All checks passed ({} warning(s))",
        report.warnings
    );
    Ok(())
}

fn check_signing_secret(settings: &Settings, report: &mut Report) {
    if settings.signing_secret.is_some() {
        report.record(Status::Pass, "signing secret is configured");
    } else {
        report.record(
            Status::Fail,
            "WALLET_PRIVATE_KEY is not set; credential refresh cannot work",
        );
    }
    if settings.public_key.is_none() {
        report.record(Status::Warn, "WALLET_PUBLIC_KEY is not set");
    }
}

fn check_key_file(settings: &Settings, report: &mut Report) {
    if !settings.key_file.exists() {
        report.record(
            Status::Pass,
            &format!(
                "key file {} does not exist yet, will be created on first use",
                settings.key_file.display()
            ),
        );
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        match std::fs::metadata(&settings.key_file) {
            Ok(meta) if meta.permissions().mode() & 0o077 == 0 => {
                report.record(
                    Status::Pass,
                    &format!("key file {} is owner-only", settings.key_file.display()),
                );
            }
            Ok(_) => report.record(
                Status::Warn,
                &format!(
                    "key file {} is readable by others; chmod 600 it",
                    settings.key_file.display()
                ),
            ),
            Err(e) => report.record(
                Status::Fail,
                &format!("cannot stat key file {}: {e}", settings.key_file.display()),
            ),
        }
    }

    #[cfg(not(unix))]
    report.record(
        Status::Pass,
        &format!("key file {} exists", settings.key_file.display()),
    );
}

async fn check_tokens(settings: &Settings, report: &mut Report) {
    if !settings.tokens_file.exists() {
        report.record(
            Status::Fail,
            &format!(
                "token file {} does not exist; add credentials with `nebula-fleet tokens add`",
                settings.tokens_file.display()
            ),
        );
        return;
    }

    match TokenStore::open(&settings.tokens_file, &settings.key_file) {
        Ok(store) if store.is_empty() => report.record(
            Status::Fail,
            &format!(
                "token file {} holds no usable credentials",
                settings.tokens_file.display()
            ),
        ),
        Ok(store) => report.record(
            Status::Pass,
            &format!("{} usable credential(s) loaded", store.len()),
        ),
        Err(e) => report.record(
            Status::Fail,
            &format!("cannot open token store: {e}"),
        ),
    }
}

async fn check_connectivity(settings: &Settings, report: &mut Report) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            report.record(Status::Fail, &format!("cannot build HTTP client: {e}"));
            return;
        }
    };

    // Any HTTP response counts as reachable; only transport errors matter.
    match client.get(&settings.base_url).send().await {
        Ok(_) => report.record(
            Status::Pass,
            &format!("service {} is reachable", settings.base_url),
        ),
        Err(e) => report.record(
            Status::Warn,
            &format!("service {} is not reachable: {e}", settings.base_url),
        ),
    }
}
