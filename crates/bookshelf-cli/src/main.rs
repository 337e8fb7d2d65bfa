//! Bookshelf CLI - operator tooling
//!
//! Usage:
//!   bookshelf hash-password <password>
//!   bookshelf issue-token --username <name> --role <role>
//!   bookshelf verify-token <token>
//!   bookshelf check-config
//!
//! Token commands read the signing configuration the server uses
//! (`BOOKSHELF_CONFIG`, then environment variables).

use anyhow::Context;
use bookshelf_api::auth::{hash_password, TokenConfig, TokenService};
use bookshelf_core::{AppConfig, Role};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bookshelf")]
#[command(about = "Bookshelf operator CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password into an Argon2id PHC string
    HashPassword {
        /// Plaintext password
        password: String,
    },
    /// Issue a session token, e.g. to provision an admin
    IssueToken {
        #[arg(long)]
        username: String,
        /// user, supervisor, manager or admin
        #[arg(long)]
        role: String,
    },
    /// Verify a token and print its claims
    VerifyToken {
        token: String,
    },
    /// Load and validate the server configuration
    CheckConfig,
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("BOOKSHELF_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn token_service() -> anyhow::Result<TokenService> {
    let config = load_config()?;
    TokenService::new(TokenConfig::from(&config.auth)).context("cannot build token service")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::HashPassword { password } => {
            let hash = hash_password(&password)?;
            println!("{hash}");
        }
        Commands::IssueToken { username, role } => {
            let role: Role = role.parse()?;
            let tokens = token_service()?;
            let token = tokens.issue(&username, role)?;
            tracing::info!(username = %username, role = %role, "token issued");
            println!("{token}");
        }
        Commands::VerifyToken { token } => {
            let tokens = token_service()?;
            let claims = tokens.verify(&token).context("token rejected")?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Commands::CheckConfig => {
            let config = load_config()?;
            println!(
                "configuration ok: listening on {}:{}, token ttl {}s, store {}",
                config.server.host,
                config.server.port,
                config.auth.token_ttl_secs,
                if config.database.url.is_some() {
                    "postgres"
                } else {
                    "memory"
                }
            );
        }
    }

    Ok(())
}
