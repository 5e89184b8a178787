use clap::Parser as _;
use tracing_subscriber::EnvFilter;

use nebula_fleet::cli::{Cli, Command, check, run, tokens};
use nebula_fleet::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run::run_fleet(settings).await,
        Command::Tokens { cmd } => tokens::run_tokens_command(cmd, &settings).await,
        Command::Check => check::run_check(&settings).await,
    }
}
