//! # Command Line Interface
//!
//! Operator tooling for checking Conjur connectivity and credential visibility.
//! Settings come from `CONJUR_*` environment variables (optionally via `.env`);
//! the API-key login is read from `CONJUR_AUTHN_LOGIN` / `CONJUR_AUTHN_API_KEY`.
//! Directories are listed only with `CONJUR_JWT_ENABLED` and `CONJUR_CONTEXT_AWARE_STORE` set.

pub mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;

use crate::config::{EnvFallback, GlobalConjurConfig};
use crate::domain::{ContextRef, Item};
use crate::observability::{init_logging, log_config_info, LoggingConfig};
use crate::secrets::{ConjurCredentialService, InMemoryCredentialStore, NoIdentityTokens};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "conjur-cli")]
#[command(about = "Resolve and fetch credentials from CyberArk Conjur")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Appliance URL override
    #[arg(long, global = true)]
    pub appliance_url: Option<String>,

    /// Account override
    #[arg(long, global = true)]
    pub account: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authenticate and report success
    Authenticate {
        /// Job path the request originates from, e.g. team/app/deploy
        #[arg(long)]
        context: Option<String>,

        /// Print the access token to stdout
        #[arg(long)]
        show_token: bool,
    },

    /// Fetch one variable and write its raw value to stdout
    Secret {
        /// Variable path, e.g. prod/db/password
        path: String,

        #[arg(long)]
        context: Option<String>,
    },

    /// List the credentials visible to a job
    List {
        #[arg(long)]
        context: String,

        /// Output format (json or table)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Resolve a credential id through the folder hierarchy
    Resolve {
        /// Credential id, e.g. username-prod-db-password
        credential_id: String,

        #[arg(long)]
        context: String,

        /// Also fetch and print the secret value
        #[arg(long)]
        fetch: bool,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&LoggingConfig::for_verbosity(cli.verbose, cli.json_logs));

    let mut global = GlobalConjurConfig::from_env().context("Invalid Conjur settings")?;
    if let Some(url) = cli.appliance_url {
        global.connection.appliance_url = url;
    }
    if let Some(account) = cli.account {
        global.connection.account = account;
    }
    log_config_info(&global);

    let service = ConjurCredentialService::new(
        global,
        EnvFallback::from_env(),
        Arc::new(InMemoryCredentialStore::new()),
        Arc::new(NoIdentityTokens),
    )?;

    match cli.command {
        Commands::Authenticate { context, show_token } => {
            let context = context.as_deref().map(job_context);
            let token = service.authenticate(context.as_ref()).await?;
            if show_token {
                println!("{}", token.expose_secret());
            } else {
                println!("Authenticated to Conjur");
            }
        }
        Commands::Secret { path, context } => {
            let context = context.as_deref().map(job_context);
            let value = service.secret(&path, context.as_ref()).await?;
            write_secret(value.expose_secret())?;
        }
        Commands::List { context, output } => {
            let format: OutputFormat = output.parse()?;
            let directory = service.directory(&job_context(&context)).await;
            output::print_entries(directory.entries(), format)?;
        }
        Commands::Resolve { credential_id, context, fetch } => {
            let context = job_context(&context);
            if fetch {
                match service.credential_secret(&credential_id, &context).await? {
                    Some(found) => {
                        output::print_json(&found.entry)?;
                        write_secret(found.secret.expose_secret())?;
                    }
                    None => anyhow::bail!("Credential '{}' not visible from this context", credential_id),
                }
            } else {
                match service.resolve_credential(&credential_id, &context).await {
                    Some(entry) => output::print_json(&entry)?,
                    None => anyhow::bail!("Credential '{}' not visible from this context", credential_id),
                }
            }
        }
    }

    Ok(())
}

/// A job at `path` under a fresh root; every earlier segment becomes a folder
fn job_context(path: &str) -> ContextRef {
    Item::job_at_path(&Item::root(), path).as_context()
}

fn write_secret(value: &[u8]) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(value).context("Failed to write secret")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}
