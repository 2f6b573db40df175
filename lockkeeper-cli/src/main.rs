//! Lockkeeper CLI
//!
//! Deploy, grant, secure and verify grant-based Unlock locks. Every command
//! prints JSON on stdout; logs go to stderr (`RUST_LOG`, default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::{Address, U256, U64};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use lockkeeper_chain::{ChainConfig, LockClient, LockConfig};
use lockkeeper_reconcile::{ActionResult, EntityRef, JsonFileStore, LockReconciler};
use lockkeeper_rpc::FailoverTransport;

#[derive(Parser)]
#[command(name = "lockkeeper")]
#[command(about = "Deploy and secure grant-based Unlock locks")]
#[command(version)]
struct Cli {
    /// Chain config (YAML). Defaults to <config dir>/lockkeeper/config.yaml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Security state file. Defaults to <data dir>/lockkeeper/security-state.json
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a grant-based lock for an entity, then grant and secure it
    Deploy {
        /// Entity as kind:id (bootcamp_program, cohort, milestone, quest)
        entity: EntityRef,

        /// Lock name
        #[arg(short, long)]
        name: String,

        /// Additional lock managers
        #[arg(short, long = "manager", value_parser = parse_address)]
        managers: Vec<Address>,

        /// Key duration in seconds (default: never expires)
        #[arg(long)]
        expiration: Option<u64>,

        /// Initial supply cap; the secure step forces it to 0
        #[arg(long)]
        max_keys: Option<u64>,
    },

    /// Record an existing lock for an entity
    Attach {
        entity: EntityRef,

        #[arg(value_parser = parse_address)]
        lock: Address,
    },

    /// Make sure the signer and platform managers are lock managers
    Grant { entity: EntityRef },

    /// Close purchases and disable transfers
    Secure { entity: EntityRef },

    /// Grant and secure, issuing only the corrections needed
    Reconcile { entity: EntityRef },

    /// Compare on-chain state to the desired state (no transactions)
    Verify { entity: EntityRef },

    /// Show persisted security state
    Status {
        /// Entity as kind:id; all entities when omitted
        entity: Option<EntityRef>,
    },

    /// Buy one key on a lock, paid by the signer
    Purchase {
        #[arg(value_parser = parse_address)]
        lock: Address,

        /// Key recipient (default: the signer)
        #[arg(short, long, value_parser = parse_address)]
        recipient: Option<Address>,
    },

    /// Grant keys without payment (signer must be a lock manager)
    GrantKeys {
        #[arg(value_parser = parse_address)]
        lock: Address,

        #[arg(short, long = "recipient", value_parser = parse_address, required = true)]
        recipients: Vec<Address>,

        /// Expiration timestamp for every key (default: never)
        #[arg(long)]
        expires: Option<u64>,
    },

    /// Show the configured endpoint pool and probe each endpoint
    Endpoints,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let store = cli.store.clone();

    match cli.command {
        Commands::Deploy { entity, name, managers, expiration, max_keys } => {
            cmd_deploy(config, store, entity, name, managers, expiration, max_keys).await
        }
        Commands::Attach { entity, lock } => cmd_attach(config, store, entity, lock).await,
        Commands::Grant { entity } => {
            let result = reconciler(config, store)?.grant(&entity).await?;
            finish_action(&result)
        }
        Commands::Secure { entity } => {
            let result = reconciler(config, store)?.secure(&entity).await?;
            finish_action(&result)
        }
        Commands::Reconcile { entity } => {
            let result = reconciler(config, store)?.reconcile(&entity).await?;
            finish_action(&result)
        }
        Commands::Verify { entity } => cmd_verify(config, store, entity).await,
        Commands::Status { entity } => cmd_status(store, entity).await,
        Commands::Purchase { lock, recipient } => cmd_purchase(config, lock, recipient).await,
        Commands::GrantKeys { lock, recipients, expires } => {
            cmd_grant_keys(config, lock, recipients, expires).await
        }
        Commands::Endpoints => cmd_endpoints(config).await,
    }
}

fn parse_address(s: &str) -> std::result::Result<Address, String> {
    s.trim().parse().map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("lockkeeper").join("config.yaml");
    path.exists().then_some(path)
}

fn load_config(path: Option<&PathBuf>) -> Result<ChainConfig> {
    let config = match path.cloned().or_else(default_config_path) {
        Some(path) => ChainConfig::from_yaml_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ChainConfig::default(),
    };
    let config = config.with_env_overrides()?;
    tracing::debug!(chain_id = config.chain_id, endpoints = config.rpc_urls.len(), "Configuration loaded");
    Ok(config)
}

fn lock_client(config: ChainConfig) -> Result<LockClient> {
    LockClient::from_config(config).map_err(|e| anyhow!("{} ({})", e.user_message(), e.kind()))
}

fn reconciler(config: ChainConfig, store: Option<PathBuf>) -> Result<LockReconciler> {
    let platform_managers = config.platform_managers.clone();
    let client = lock_client(config)?;
    let store = match store {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::default_location(),
    };
    Ok(LockReconciler::new(Arc::new(client), Arc::new(store)).with_platform_managers(platform_managers))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish_action(result: &ActionResult) -> Result<()> {
    print_json(result)?;
    if !result.success {
        std::process::exit(2);
    }
    Ok(())
}

async fn cmd_deploy(
    config: ChainConfig,
    store: Option<PathBuf>,
    entity: EntityRef,
    name: String,
    managers: Vec<Address>,
    expiration: Option<u64>,
    max_keys: Option<u64>,
) -> Result<()> {
    let mut lock_config = LockConfig::grant_based(name);
    if let Some(seconds) = expiration {
        lock_config = lock_config.with_expiration(seconds);
    }
    if let Some(max) = max_keys {
        lock_config = lock_config.with_max_keys(U256::from(max));
    }

    let result = reconciler(config, store)?
        .deploy(&entity, &lock_config, &managers)
        .await?;
    finish_action(&result)
}

async fn cmd_attach(config: ChainConfig, store: Option<PathBuf>, entity: EntityRef, lock: Address) -> Result<()> {
    let state = reconciler(config, store)?.attach(&entity, lock).await?;
    print_json(&json!({ "entity": entity, "state": state }))
}

async fn cmd_verify(config: ChainConfig, store: Option<PathBuf>, entity: EntityRef) -> Result<()> {
    let report = reconciler(config, store)?.verify(&entity).await?;
    print_json(&report)?;
    if !report.secure {
        std::process::exit(2);
    }
    Ok(())
}

async fn cmd_status(store: Option<PathBuf>, entity: Option<EntityRef>) -> Result<()> {
    use lockkeeper_reconcile::{LockPhase, SecurityStateStore};

    let store = match store {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::default_location(),
    };

    let entries = match entity {
        Some(entity) => {
            let state = store.load(&entity).await?.unwrap_or_default();
            vec![(entity, state)]
        }
        None => store.list().await?,
    };

    let rows: Vec<_> = entries
        .into_iter()
        .map(|(entity, state)| {
            json!({
                "entity": entity.to_string(),
                "phase": LockPhase::resume_from(&state),
                "fullySecured": state.is_fully_secured(),
                "violations": state.violations(),
                "state": state,
            })
        })
        .collect();
    print_json(&rows)
}

async fn cmd_purchase(config: ChainConfig, lock: Address, recipient: Option<Address>) -> Result<()> {
    let client = lock_client(config)?;
    let recipient = recipient.unwrap_or_else(|| client.signer_address());
    let issued = client
        .purchase_key(lock, recipient)
        .await
        .map_err(|e| anyhow!("{} ({})", e.user_message(), e.kind()))?;
    print_json(&issued)
}

async fn cmd_grant_keys(
    config: ChainConfig,
    lock: Address,
    recipients: Vec<Address>,
    expires: Option<u64>,
) -> Result<()> {
    let client = lock_client(config)?;
    let expiration = expires.map(U256::from).unwrap_or(U256::MAX);
    let expirations = vec![expiration; recipients.len()];
    let issued = client
        .grant_keys(lock, &recipients, &expirations)
        .await
        .map_err(|e| anyhow!("{} ({})", e.user_message(), e.kind()))?;
    print_json(&issued)
}

async fn cmd_endpoints(config: ChainConfig) -> Result<()> {
    let transport = config.build_transport()?;
    let mut rows = Vec::new();

    for (index, url) in transport.endpoints().iter().enumerate() {
        let probe = FailoverTransport::new([url], config.transport.clone())?;
        let started = std::time::Instant::now();
        let row = match probe.request::<U64>("eth_chainId", json!([])).await {
            Ok(chain_id) => json!({
                "index": index,
                "url": url,
                "ok": true,
                "chainId": chain_id.to::<u64>(),
                "matchesConfig": chain_id.to::<u64>() == config.chain_id,
                "latencyMs": started.elapsed().as_millis() as u64,
            }),
            Err(e) => json!({
                "index": index,
                "url": url,
                "ok": false,
                "retryable": e.is_retryable(),
                "error": e.to_string(),
            }),
        };
        rows.push(row);
    }

    print_json(&json!({
        "chainId": config.chain_id,
        "timeoutMs": config.transport.timeout_ms,
        "endpoints": rows,
    }))
}
