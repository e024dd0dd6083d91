//! groupjit - just-in-time Cloud Identity group membership.
//!
//! Adds a user to a group with a MEMBER role that expires after a few minutes,
//! optionally extending the expiry when the user is already a member.

#![deny(clippy::all)]

mod auth;
mod cli;
mod config;
mod error;
mod grant;
mod identity;

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use auth::CredentialChain;
use cli::Cli;
use config::Config;
use error::AppError;
use grant::GrantOutcome;
use identity::CloudIdentityClient;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = match Config::load().map_err(AppError::from) {
        Ok(c) => c,
        Err(e) => {
            // Logging is configured from this file, so report directly
            eprintln!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    init_logging(&config);

    match run(&cli, &config).await {
        Ok(outcome) => {
            match outcome {
                GrantOutcome::Added { member_id } => info!("Grant complete for {}", member_id),
                GrantOutcome::Extended { membership } => {
                    info!("Extension complete for {}", membership.name)
                }
            }
            ExitCode::SUCCESS
        }
        Err(AppError::Usage(message)) => {
            eprintln!("{}", message);
            eprintln!("{}", Cli::command().render_help());
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initialize tracing/logging on stderr so stdout carries only progress lines.
fn init_logging(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, config: &Config) -> Result<GrantOutcome, AppError> {
    // Validate before any remote call
    let request = cli.grant_request()?;
    let poll = cli.poll_policy(&config.poll)?;

    info!(
        "Starting {} v{} for {} in groups/{}",
        config.app.name,
        env!("CARGO_PKG_VERSION"),
        request.user_id,
        request.group_id
    );

    let credentials = CredentialChain::new()?;
    let (access_token, source) = credentials.access_token().await?;
    tracing::debug!("Access token source: {:?}", source);

    let client = CloudIdentityClient::new(config, &cli.request_metadata(), access_token)?;

    let mut stdout = std::io::stdout();
    let outcome = grant::run(&client, &request, &poll, &mut stdout, shutdown_signal()).await?;

    Ok(outcome)
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
