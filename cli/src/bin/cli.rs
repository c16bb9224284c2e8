//! Command line driver for the counter contract.
//!
//! Connection and signer settings come from the environment (a `.env` file
//! is honoured), see `Config::from_env`.
//!
//! Usage examples:
//! ```shell
//! # Deploy a fresh counter
//! counter-cli deploy
//!
//! # Add 3 and wait for the block
//! counter-cli increase --amount 3 --wait
//!
//! # Deploy if needed, increase by 3, then read the total
//! counter-cli run
//!
//! # Follow success events
//! counter-cli watch
//! ```

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand};
use contract_client::{
    BlockRange, Config, Confirmation, Connection, Counter, RpcConnection, SuccessEvent,
    TransactionHandle,
};
use dotenv::dotenv;
use eyre::{eyre, Result};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "counter-cli")]
#[command(about = "Deploy, drive and observe the counter contract")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Overrides CONTRACT_ADDRESS
    #[arg(long)]
    contract: Option<Address>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a new counter contract
    Deploy,
    /// Add to the counter
    Increase {
        #[arg(long)]
        amount: u64,
        /// Wait until the transaction is mined
        #[arg(long, default_value = "false")]
        wait: bool,
    },
    /// Read the current total
    Account,
    /// Deploy if needed, increase, confirm and read back
    Run {
        #[arg(long, default_value = "3")]
        amount: u64,
    },
    /// List past success events
    Events {
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
        /// Only events with these totals
        #[arg(long, value_delimiter = ',')]
        count: Vec<u64>,
    },
    /// Follow success events until interrupted
    Watch {
        #[arg(long, value_delimiter = ',')]
        count: Vec<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = LevelFilter::from_str(&cli.log_level).unwrap_or(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env()?;
    if let Some(address) = cli.contract {
        config.contract.address = Some(address);
    }
    config.validate()?;
    info!("Loaded configuration for network: {}", config.network.name);

    let connection = RpcConnection::connect(&config).await?.shared();

    match cli.command {
        Commands::Deploy => {
            let auth = config.auth_context()?;
            let (counter, handle) = Counter::deploy(connection, &auth).await?;
            let counter = counter.with_client_config(&config.client);
            wait_for(&config, &handle).await?;

            println!("Counter deployed at {}", counter.address());
            if let Some(url) = &config.network.explorer_url {
                println!("Explorer: {url}address/{}", counter.address());
            }
        }

        Commands::Increase { amount, wait } => {
            let counter = bind(&config, connection)?;
            let auth = config.auth_context()?;
            let handle = counter.increase(U256::from(amount), &auth).await?;
            println!("Transaction hash: {}", handle.hash());

            if wait {
                let confirmation = wait_for(&config, &handle).await?;
                println!("Block number: {:?}", confirmation.block_number);
            }
        }

        Commands::Account => {
            let counter = bind(&config, connection)?;
            println!("{}", counter.account().await?);
        }

        Commands::Run { amount } => {
            let auth = config.auth_context()?;
            let counter = match config.contract.address {
                Some(address) => Counter::bind(address, connection)?,
                None => {
                    let (counter, handle) = Counter::deploy(connection, &auth).await?;
                    wait_for(&config, &handle).await?;
                    info!("Deployed counter at {}", counter.address());
                    counter
                }
            }
            .with_client_config(&config.client);

            let before = counter.account().await?;
            let handle = counter.increase(U256::from(amount), &auth).await?;
            wait_for(&config, &handle).await?;
            let after = counter.account().await?;

            println!("Counter {}: {before} -> {after}", counter.address());
        }

        Commands::Events { from, to, count } => {
            let counter = bind(&config, connection)?;
            let from = from.or(config.contract.deployment_block).unwrap_or_default();
            let range = BlockRange { from, to };

            let mut history = counter.filter_success(&totals(&count), range)?;
            let mut seen = 0usize;
            while let Some(record) = history.next().await {
                let event = SuccessEvent::try_from(&record?)?;
                println!(
                    "block {:?} tx {:?}: count = {}",
                    event.block_number, event.transaction_hash, event.count
                );
                seen += 1;
            }
            info!("{seen} success events found");
        }

        Commands::Watch { count } => {
            let counter = bind(&config, connection)?;
            let mut subscription = counter.watch_success(&totals(&count)).await?;
            let cancel = subscription.cancel_handle();

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            while let Some(record) = subscription.next().await {
                let event = SuccessEvent::try_from(&record)?;
                if record.removed {
                    warn!("Event at block {:?} removed by reorg", event.block_number);
                    continue;
                }
                println!("block {:?}: count = {}", event.block_number, event.count);
            }

            if let Some(err) = subscription.error() {
                return Err(eyre!("Subscription failed: {err}"));
            }
            info!("Stopped watching");
        }
    }

    Ok(())
}

fn bind(config: &Config, connection: Arc<dyn Connection>) -> Result<Counter> {
    let counter = Counter::bind(config.contract_address()?, connection)?;
    Ok(counter.with_client_config(&config.client))
}

fn totals(counts: &[u64]) -> Vec<U256> {
    counts.iter().copied().map(U256::from).collect()
}

async fn wait_for(config: &Config, handle: &TransactionHandle) -> Result<Confirmation> {
    info!("Waiting for transaction {}", handle.hash());
    let confirmation = handle
        .confirm(
            Duration::from_secs(config.client.polling_interval_seconds),
            Duration::from_secs(config.client.timeout_seconds),
        )
        .await?;
    info!("Gas used: {}", confirmation.gas_used);
    Ok(confirmation)
}
