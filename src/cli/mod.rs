//! Command-line interface.

pub mod check;
pub mod run;
pub mod tokens;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "nebula-fleet",
    version,
    about = "Fleet of per-credential compute workers with automatic token refresh"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the worker fleet (default)
    Run,

    /// Inspect and manage stored credentials
    Tokens {
        #[command(subcommand)]
        cmd: tokens::TokensCommand,
    },

    /// Preflight checks: files, secrets, permissions, connectivity
    Check,
}
