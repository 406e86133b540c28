//! token-console
//!
//! Create a mint, issue supply and transfer tokens on a Solana cluster, and
//! watch the session account's balances and history.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI command ──▶ SessionManager ──▶ Session ──┬──▶ workflows (mint, mint_to, transfer)
//!                                                │
//!                                                └──▶ pollers (balance, history) ──▶ watch
//!                                                           │
//!                         both go through ▼                 │
//!                     LedgerClient ── RetryExecutor ── HttpRpcEndpoint ──▶ RPC node
//! ```
//!
//! The signing key is read from `TOKEN_CONSOLE_KEYPAIR`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use token_console::config::validation::MAX_HISTORY_LIMIT;
use token_console::config::{load_config, ConsoleConfig};
use token_console::ledger::{HttpRpcEndpoint, KeypairSigner, LedgerClient, Pubkey, RpcEndpoint};
use token_console::lifecycle::{Session, SessionManager, SessionSettings};
use token_console::observability::logging::init_logging;
use token_console::polling::{
    explorer_tx_url, BalancePoller, BalanceSnapshot, HistoryPoller, HistorySnapshot,
};
use token_console::workflows::{MintState, MintToWorkflow, MintWorkflow, TransferWorkflow};

#[derive(Parser)]
#[command(name = "token-console")]
#[command(about = "Create, mint and transfer fungible tokens on a Solana cluster", long_about = None)]
struct Cli {
    /// Path to a TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the session account address
    Address,
    /// Fund a throwaway payer and create a new mint
    CreateMint {
        #[arg(long)]
        decimals: Option<u8>,
    },
    /// Issue whole tokens of a mint to the session account
    MintTo {
        #[arg(long)]
        mint: String,
        #[arg(long)]
        amount: u64,
    },
    /// Send whole tokens of a mint to another account
    Transfer {
        #[arg(long)]
        mint: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },
    /// Show native and token balances once
    Balance {
        #[arg(long)]
        mint: Option<String>,
    },
    /// Show recent transactions once
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Poll balances and history until Ctrl-C
    Watch {
        #[arg(long)]
        mint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ConsoleConfig::default(),
    };
    if let Commands::History { limit: Some(limit) } = &cli.command {
        config.polling.history_limit = (*limit).clamp(1, MAX_HISTORY_LIMIT);
    }

    init_logging(&config.observability)?;
    tracing::info!(rpc_url = %config.rpc.url, cluster = %config.rpc.cluster, "token-console starting");

    let endpoint: Arc<dyn RpcEndpoint> = Arc::new(HttpRpcEndpoint::from_config(&config.rpc)?);
    let ledger = LedgerClient::from_config(endpoint.clone(), &config);
    let signer = Arc::new(KeypairSigner::from_env(endpoint)?);

    let manager = SessionManager::new(ledger, SessionSettings::from(&config));
    let session = manager.connect(signer).await?;

    let outcome = run(cli.command, &session, &config.rpc.cluster).await;
    manager.disconnect().await;
    outcome?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run(
    command: Commands,
    session: &Arc<Session>,
    cluster: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Address => {
            println!("{}", session.account());
        }
        Commands::CreateMint { decimals } => {
            let mut workflow = MintWorkflow::new(session.clone());
            if let Some(decimals) = decimals {
                workflow = workflow.with_decimals(decimals);
            }
            let mut states = workflow.subscribe();
            let progress = tokio::spawn(async move {
                while states.changed().await.is_ok() {
                    match &*states.borrow_and_update() {
                        MintState::FundingAuthority { payer } => {
                            println!("Funding throwaway payer {}", payer)
                        }
                        MintState::CreatingMint { .. } => println!("Creating mint"),
                        _ => {}
                    }
                }
            });
            let result = workflow.run().await;
            drop(workflow);
            let _ = progress.await;

            let mint = result?;
            println!("Mint:      {}", mint.address);
            println!("Decimals:  {}", mint.decimals);
        }
        Commands::MintTo { mint, amount } => {
            session.attach_mint(&mint.parse::<Pubkey>()?).await?;
            let signature = MintToWorkflow::new(session.clone()).run(amount).await?;
            println!("Minted {} tokens: {}", amount, explorer_tx_url(&signature, cluster));
        }
        Commands::Transfer { mint, to, amount } => {
            session.attach_mint(&mint.parse::<Pubkey>()?).await?;
            let signature = TransferWorkflow::new(session.clone())
                .run(&to, amount)
                .await?;
            println!("Sent {} tokens to {}: {}", amount, to, explorer_tx_url(&signature, cluster));
        }
        Commands::Balance { mint } => {
            if let Some(mint) = mint {
                session.attach_mint(&mint.parse::<Pubkey>()?).await?;
            }
            let snapshot = BalancePoller::new(session.clone()).fetch_once().await?;
            print_balance(&snapshot);
        }
        Commands::History { .. } => {
            let snapshot = HistoryPoller::new(session.clone()).fetch_once().await?;
            print_history(&snapshot, cluster);
        }
        Commands::Watch { mint } => {
            if let Some(mint) = mint {
                session.attach_mint(&mint.parse::<Pubkey>()?).await?;
            }
            let mut feeds = session.start_polling()?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received Ctrl-C, stopping pollers");
                        break;
                    }
                    changed = feeds.balance.changed() => {
                        if changed.is_err() { break; }
                        let snapshot = feeds.balance.borrow_and_update().clone();
                        if !snapshot.loading {
                            print_balance(&snapshot);
                        }
                    }
                    changed = feeds.history.changed() => {
                        if changed.is_err() { break; }
                        let snapshot = feeds.history.borrow_and_update().clone();
                        if !snapshot.loading {
                            print_history(&snapshot, cluster);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_balance(snapshot: &BalanceSnapshot) {
    println!("Account:   {}", snapshot.account);
    println!("SOL:       {:.4}", snapshot.sol());
    if let (Some(mint), Some(display)) = (snapshot.mint, snapshot.token_display()) {
        println!("Token:     {} ({})", display, mint.address);
    }
    if let Some(error) = &snapshot.last_error {
        println!("Warning:   {}", error);
    }
}

fn print_history(snapshot: &HistorySnapshot, cluster: &str) {
    if snapshot.records.is_empty() {
        println!("No transactions found");
    }
    for record in &snapshot.records {
        let when = record
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = record
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{:<9} {:<10} {}{}  {}  {}",
            record.kind.to_string(),
            status,
            record.signature.short(),
            if record.failed { " (failed)" } else { "" },
            when,
            record.explorer_url(cluster),
        );
    }
    if let Some(error) = &snapshot.last_error {
        println!("Warning: {}", error);
    }
}
