//! Command-line front end for the wallet core.

use alloy::primitives::U256;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use wallet_orchestrator::config::{load_config, AppConfig};
use wallet_orchestrator::identity::UserId;
use wallet_orchestrator::lifecycle::{self, Shutdown};
use wallet_orchestrator::{WalletError, WalletService};

const DEFAULT_CONFIG: &str = "wallet.toml";

#[derive(Parser)]
#[command(name = "wallet-orchestrator")]
#[command(about = "Per-user wallets and contract operations on a test network", long_about = None)]
struct Cli {
    /// Configuration file (defaults are used if absent).
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Explicit user id instead of the device fingerprint.
    #[arg(short, long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved identity and wallet address
    Whoami,
    /// Deposit tokens (smallest unit) into the vault
    Deposit {
        #[arg(value_parser = parse_amount)]
        amount: U256,
    },
    /// Claim the configured epoch's reward
    Claim,
    /// Token balance
    Balance,
    /// Transaction history
    History,
    /// Address, balances and pending count
    Info,
    /// Reward a claim would pay now
    Preview,
    /// Settle pending transactions now
    Reconcile,
    /// Keep reconciling and print the balance until interrupted
    Watch {
        #[arg(long, default_value_t = 15)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match read_config(&cli.config) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    let service = match lifecycle::start(config).await {
        Ok(service) => service,
        Err(e) => return fail(&e),
    };

    match run(&cli, &service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

async fn run(cli: &Cli, service: &WalletService) -> Result<(), WalletError> {
    let identity = service.identify(cli.user.as_deref())?;
    let user = &identity.user_id;

    match &cli.command {
        Commands::Whoami => {
            let wallet = service.wallet(user).await?;
            print_json(&serde_json::json!({
                "identity": identity,
                "wallet": wallet,
            }));
        }
        Commands::Deposit { amount } => print_json(&service.deposit(user, *amount).await?),
        Commands::Claim => print_json(&service.claim_reward(user).await?),
        Commands::Balance => {
            let balance = service.get_balance(user).await?;
            print_json(&serde_json::json!({ "user_id": user, "balance": balance.to_string() }));
        }
        Commands::History => print_json(&service.history(user).await?),
        Commands::Info => print_json(&service.wallet_info(user).await?),
        Commands::Preview => {
            let reward = service.reward_preview(user).await?;
            print_json(&serde_json::json!({ "user_id": user, "reward": reward.to_string() }));
        }
        Commands::Reconcile => {
            let settled = service.reconcile(user).await?;
            print_json(&serde_json::json!({ "user_id": user, "settled": settled }));
        }
        Commands::Watch { interval_secs } => watch(service, user, *interval_secs).await,
    }
    Ok(())
}

async fn watch(service: &WalletService, user: &UserId, interval_secs: u64) {
    let shutdown = Shutdown::new();
    let reconciler = service.spawn_reconciler(&shutdown);
    tokio::spawn(lifecycle::shutdown_on_signal(shutdown.clone()));

    let mut stop = shutdown.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            _ = ticker.tick() => match service.get_balance(user).await {
                Ok(balance) => tracing::info!(user_id = %user, balance = %balance, "Balance"),
                Err(e) => tracing::warn!(user_id = %user, error = %e, "Balance unavailable"),
            },
        }
    }

    let _ = reconciler.await;
    tracing::info!("Shutdown complete");
}

fn read_config(path: &Path) -> Result<AppConfig, WalletError> {
    if path.exists() {
        Ok(load_config(path)?)
    } else {
        Ok(AppConfig::default())
    }
}

fn parse_amount(raw: &str) -> Result<U256, String> {
    raw.parse::<U256>()
        .map_err(|e| format!("invalid amount {raw:?}: {e}"))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error: failed to render output: {e}"),
    }
}

fn fail(err: &WalletError) -> ExitCode {
    match serde_json::to_string_pretty(&err.info()) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("Error: {err}"),
    }
    ExitCode::FAILURE
}
