use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{ApiGateway, AuthGate, AuthStatus, LoginCredentials, SessionStore};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod register;

use register::RegisterArgs;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Enrollment back-office console")]
struct Cli {
    /// Config file (defaults to ./console.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    backend_url: Option<String>,
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the backend is reachable.
    Probe,
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CONSOLE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Status,
    /// Register an enrollment for a student and a subject.
    Register(RegisterArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(url) = cli.backend_url {
        settings.backend_api_url = url;
    }
    if let Some(url) = cli.database_url {
        settings.database_url = config::normalize_database_url(&url);
    }

    let gateway = ApiGateway::new(settings.gateway_config()?)?;
    info!(backend = %gateway.base_url(), "console: backend configured");

    if let Command::Probe = cli.command {
        gateway
            .probe()
            .await
            .context("backend is not reachable")?;
        println!("backend reachable at {}", gateway.base_url());
        return Ok(());
    }

    let storage = Arc::new(
        Storage::new(&settings.database_url)
            .await
            .with_context(|| format!("failed to open {}", settings.database_url))?,
    );
    let session = SessionStore::restore(storage.clone()).await?;
    let mut gate = AuthGate::new(session);

    match cli.command {
        Command::Probe => {}
        Command::Login { username, password } => {
            let landing = gate
                .login(&gateway, &LoginCredentials::new(username, password))
                .await
                .context("login failed")?;
            println!("logged in; continue at {landing}");
        }
        Command::Logout => {
            gate.logout().await?;
            println!("logged out");
        }
        Command::Status => {
            storage
                .health_check()
                .await
                .context("credential store is not usable")?;
            println!("credential store ok at {}", settings.database_url);
            match gate.status() {
                AuthStatus::Authenticated => println!("authenticated"),
                AuthStatus::Unauthenticated => println!("not authenticated"),
            }
        }
        Command::Register(args) => {
            let message = register::run(&mut gate, &gateway, &args).await?;
            println!("{message}");
        }
    }

    Ok(())
}
