/// # dir-ingest CLI interface
///
/// Command parsing and orchestration glue. Scanning, ingestion, the store client and the
/// admin loops all live in the `dir-ingest` crate; this module only wires configuration,
/// prompts and output around them.
///
/// - [`Cli`] defines the user-facing options and subcommands.
/// - [`run`] is the async entrypoint, shared by `main` and the integration tests.
use crate::console::{confirm, write_deletion_summary, write_ingest_summary};
use crate::load_config::{credentials_from_env, load_config};
use crate::runtime::{ComposeRuntime, DEFAULT_COMPOSE_FILE};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use dir_ingest::admin;
use dir_ingest::config::{StoreConfig, DEFAULT_BASE_URL};
use dir_ingest::contract::{StoreClient, TracingObserver};
use dir_ingest::ingest::ingest_with;
use dir_ingest::scan::{scan, FilterRuleSet};
use dir_ingest::R2RClient;
use std::io;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// CLI for dir-ingest: ingest a directory into an R2R store and manage a local store.
#[derive(Parser)]
#[clap(
    name = "dir-ingest",
    version,
    about = "Scan a directory and ingest its documents into an R2R store exactly once"
)]
pub struct Cli {
    /// Compose file describing the local store
    #[clap(long, global = true, env = "DIR_INGEST_COMPOSE_FILE", default_value = DEFAULT_COMPOSE_FILE)]
    pub compose_file: PathBuf,

    /// Store base URL; overrides the config file
    #[clap(long, global = true, env = "R2R_BASE_URL")]
    pub store_url: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the configured directory and ingest every matching file
    Ingest {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Start the local store (docker compose up)
    Up {
        /// Build images before starting
        #[clap(long, short)]
        build: bool,
    },
    /// Stop the local store and remove locally built images
    Down,
    /// List running services
    Ps,
    /// Follow service logs
    Logs,
    /// Restart services
    Restart,
    /// Run a command inside a service container
    Exec {
        /// Target service
        service: Option<String>,
        /// Command to run, `/bin/sh` when omitted
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Delete one collection, or ALL collections when no ID is given
    Rmcollections {
        collection_id: Option<Uuid>,
    },
    /// Delete every non-superuser user
    Rmallusers,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let runtime = ComposeRuntime::new(&cli.compose_file);
    match cli.command {
        Commands::Ingest { config } => run_ingest(config, cli.store_url).await,
        Commands::Up { build } => runtime.up(build),
        Commands::Down => runtime.down(),
        Commands::Ps => runtime.ps(),
        Commands::Logs => runtime.logs(),
        Commands::Restart => runtime.restart(),
        Commands::Exec { service, command } => {
            let code = runtime.exec(service.as_deref(), &command)?;
            if code == 0 {
                Ok(())
            } else {
                Err(anyhow!("Command exited with code {code}"))
            }
        }
        Commands::Rmcollections { collection_id } => {
            let client = admin_client(cli.store_url).await?;
            match collection_id {
                Some(id) => {
                    admin::delete_collection(&client, id).await?;
                    println!("Deleted collection {id}.");
                    Ok(())
                }
                None => {
                    let confirmed = {
                        let stdin = io::stdin();
                        confirm(
                            "Are you sure you want to delete ALL collections? This is irreversible.",
                            &mut stdin.lock(),
                            &mut io::stdout(),
                        )?
                    };
                    if !confirmed {
                        tracing::info!(command = "rmcollections", "Operation cancelled by user");
                        println!("Operation cancelled.");
                        return Ok(());
                    }
                    let report = admin::delete_all_collections(&client).await?;
                    write_deletion_summary("collections", &report, &mut io::stdout())?;
                    Ok(())
                }
            }
        }
        Commands::Rmallusers => {
            let client = admin_client(cli.store_url).await?;
            let report = admin::delete_non_superusers(&client).await?;
            write_deletion_summary("users", &report, &mut io::stdout())?;
            Ok(())
        }
    }
}

async fn run_ingest(config_path: PathBuf, store_url: Option<String>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(url) = store_url {
        config.store.base_url = url;
    }
    config.store.trace_loaded();
    config.ingest.trace_loaded();

    let rules = FilterRuleSet::resolve(config.scan.filters.clone());
    let files = match scan(&config.scan.root, &rules)? {
        Some(files) => files,
        None => {
            tracing::warn!(root = %config.scan.root.display(), "No matching files found");
            println!("No matching files found under {}.", config.scan.root.display());
            return Ok(());
        }
    };
    tracing::info!(command = "ingest", files = files.len(), "Starting ingestion");

    let client = R2RClient::new(&config.store)?;
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; finishing files in flight");
                cancel.cancel();
            }
        })
    };

    let result = ingest_with(
        &client,
        &files,
        &config.ingest,
        &config.store.call_policy(),
        &TracingObserver,
        &cancel,
    )
    .await;
    watcher.abort();

    match result {
        Ok(report) => {
            tracing::info!(command = "ingest", summary = ?report.summary(), "Ingestion complete");
            write_ingest_summary(&report, &mut io::stdout())?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "ingest", error = %e, "Ingestion aborted during setup");
            Err(anyhow::Error::new(e))
        }
    }
}

/// Client for the admin commands, logged in when credentials are present in the environment.
async fn admin_client(store_url: Option<String>) -> Result<R2RClient> {
    let config = StoreConfig {
        base_url: store_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        ..Default::default()
    };
    config.trace_loaded();
    let client = R2RClient::new(&config)?;
    if let Some(creds) = credentials_from_env() {
        client.login(&creds.email, &creds.password).await?;
    }
    Ok(client)
}
