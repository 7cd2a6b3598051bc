//! Demo node pair.
//!
//! Builds two in-process ledgers joined by an in-memory transport, commits a
//! plain transfer and a contract-bearing transaction on the first, waits for
//! the second to follow, then prints the chain and balances.
//!
//! # Usage
//! ```text
//! gltch-chain [OPTIONS]
//! ```

use gltch_chain::core::blockchain::Ledger;
use gltch_chain::core::config::{LedgerConfig, OverdraftPolicy};
use gltch_chain::core::transaction::Transaction;
use gltch_chain::network::local_transport::LocalTransport;
use gltch_chain::network::server::{Server, ServerOps};
use gltch_chain::network::transport::TransportBroadcaster;
use gltch_chain::utils::log::Logger;
use gltch_chain::{error, info};
use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::spawn_blocking;
use tokio::time::{sleep, timeout};

const CONTRACT: &str = "\
WHEN BALANCE >= 500 THEN STORE paid = + paid TXVALUE
WHEN BALANCE >= 0 THEN STORE lastBlock = BLOCKNUM";

fn parse_number<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i).and_then(|v| v.parse().ok()) {
        Some(v) => v,
        None => {
            eprintln!("{flag} requires a numeric argument");
            process::exit(1);
        }
    }
}

fn parse_config(args: &[String]) -> LedgerConfig {
    let mut config = LedgerConfig::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--difficulty" => {
                i += 1;
                config.difficulty = parse_number(args, i, "--difficulty");
            }
            "--threads" => {
                i += 1;
                config.mining_threads = parse_number(args, i, "--threads");
            }
            "--threshold" => {
                i += 1;
                config.block_threshold = parse_number(args, i, "--threshold");
            }
            "--reject-overdraft" => {
                config.overdraft_policy = OverdraftPolicy::Reject;
            }
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }
    config
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let config = parse_config(&args).with_allocation("Alice", 2_000);

    let logger_a = Arc::new(Logger::new("node-a"));
    let logger_b = Arc::new(Logger::new("node-b"));
    let transport_a = LocalTransport::new("A");
    let transport_b = LocalTransport::new("B");
    transport_a.connect(&transport_b);

    let ledger_a = match Ledger::new(config.clone(), logger_a.clone()) {
        Ok(ledger) => Arc::new(ledger.with_broadcaster(Arc::new(TransportBroadcaster::new(
            transport_a.clone(),
            logger_a.clone(),
            &Handle::current(),
        )))),
        Err(e) => {
            eprintln!("Failed to create ledger: {e}");
            process::exit(1);
        }
    };
    let ledger_b = match Ledger::new(config, logger_b.clone()) {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            eprintln!("Failed to create ledger: {e}");
            process::exit(1);
        }
    };

    let server = Server::new(
        ServerOps {
            transports: vec![transport_b.clone()],
            ..ServerOps::default()
        },
        ledger_b.clone(),
    );
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_handle = tokio::spawn(server.start(async {
        let _ = shutdown_rx.await;
    }));

    let transactions = [
        Transaction::from_decimal("Alice", "Bob", "10.00", "sig-alice-1", 100),
        Transaction::from_decimal("Alice", "Carol", "2.50", "sig-alice-2", 500)
            .map(|tx| tx.with_source_code(CONTRACT)),
    ];
    for tx in transactions {
        let tx = match tx {
            Ok(tx) => tx,
            Err(e) => {
                error!(logger_a, "Invalid transaction: {e}");
                continue;
            }
        };
        let ledger = ledger_a.clone();
        match spawn_blocking(move || ledger.add_transaction(tx)).await {
            Ok(Ok(Some(report))) => info!(
                logger_a,
                "Committed block {} with {} transaction(s), {} dropped",
                report.index,
                report.accepted,
                report.dropped.len()
            ),
            Ok(Ok(None)) => info!(logger_a, "Transaction pooled"),
            Ok(Err(e)) => error!(logger_a, "Commit failed: {e}"),
            Err(e) => error!(logger_a, "Commit task failed: {e}"),
        }
    }

    let target = ledger_a.len();
    let synced = timeout(Duration::from_secs(30), async {
        while ledger_b.len() < target {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if synced.is_err() {
        error!(logger_b, "Peer did not catch up to {target} blocks");
    }

    match serde_json::to_string_pretty(&ledger_a.chain_info()) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(logger_a, "Failed to render chain info: {e}"),
    }
    println!("node A: {} valid={}", ledger_a.chain_info(), ledger_a.is_chain_valid());
    println!("node B: {} valid={}", ledger_b.chain_info(), ledger_b.is_chain_valid());
    for (address, balance) in ledger_a.accounts() {
        println!("{address:>10} {balance:>8}");
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = server_handle.await {
        eprintln!("Server task error: {:?}", e);
    }
}

const USAGE: &str = "\
gltch-chain demo

USAGE:
    {program} [OPTIONS]

OPTIONS:
    --difficulty <n>     Leading zero hex digits per block hash (default 2)
    --threads <n>        Mining threads (default: available parallelism)
    --threshold <n>      Pooled transactions per block (default 1)
    --reject-overdraft   Skip transfers the sender cannot fund
    -h, --help           Print this help message";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
