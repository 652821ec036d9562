//! chainsink CLI — run the EVM ingestion pipeline.
//!
//! Usage:
//! ```bash
//! chainsink run      --chain ethereum --http-url https://... --ws-url wss://... --db chainsink.db
//! chainsink backfill --chain ethereum --http-url https://... --start 19000000 --end 19000100
//! chainsink info
//! ```

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::EnvFilter;

use chainsink_core::chain::numeric_chain_id;
use chainsink_evm::{spawn_signal_handler, EvmPipeline, PipelineConfig};
use chainsink_storage::SqliteStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => cmd_run(&args[2..]).await,
        "backfill" => cmd_backfill(&args[2..]).await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chainsink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainsink {}", env!("CARGO_PKG_VERSION"));
    println!("Multi-chain EVM block and DEX event ingestion pipeline\n");
    println!("USAGE:");
    println!("    chainsink <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    run       Stream live blocks and ingest them");
    println!("    backfill  Process an inclusive historical block range");
    println!("    info      Show configuration defaults and supported chains");
    println!("    version   Print version");
    println!("    help      Print this help\n");
    println!("RUN FLAGS:");
    println!("    --chain <NAME>       Chain name (ethereum, base, arbitrum, ...)");
    println!("    --http-url <URL>     JSON-RPC HTTP endpoint");
    println!("    --ws-url <URL>       JSON-RPC WebSocket endpoint");
    println!("    --db <PATH>          SQLite database file (default: chainsink.db)");
    println!("    --duration <SECS>    Stop after this many seconds (default: run forever)");
    println!("    --abi-url <URL>      Etherscan-style explorer API for ABI fetches");
    println!("    --abi-key <KEY>      Explorer API key");
    println!("    --workers <N>        Event classification workers (default: 8)");
    println!("\nBACKFILL FLAGS:");
    println!("    --chain, --http-url, --ws-url, --db, --abi-url, --abi-key, --workers as above");
    println!("    --start <N>          First block number (inclusive)");
    println!("    --end <N>            Last block number (inclusive)");
}

fn cmd_info() {
    println!("ChainSink v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default event workers: 8");
    println!("  Default event queue: 10000 jobs");
    println!("  Default batch size: 1000 rows/insert");
    println!("  Stream retries: 5 attempts, 2s apart");
    println!("  Storage backends: SQLite, memory");
    println!("  Chains: ethereum, optimism, bnb, polygon, zksync,");
    println!("          mantle, base, arbitrum, avalanche, linea");
}

/// Minimal `--flag value` parser; flags may appear in any order.
struct Flags {
    pairs: Vec<(String, String)>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let Some(name) = flag.strip_prefix("--") else {
                bail!("unexpected argument: {flag}");
            };
            let value = iter.next().ok_or_else(|| anyhow!("--{name} requires a value"))?;
            pairs.push((name.to_string(), value.clone()));
        }
        Ok(Self { pairs })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    fn require(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| anyhow!("--{name} is required"))
    }

    fn get_u64(&self, name: &str) -> Result<Option<u64>> {
        self.get(name)
            .map(|v| v.parse::<u64>().with_context(|| format!("--{name} must be a number")))
            .transpose()
    }
}

async fn build_pipeline(flags: &Flags) -> Result<EvmPipeline> {
    let chain = flags.require("chain")?;
    if numeric_chain_id(chain).is_none() {
        tracing::warn!(chain, "unrecognized chain name, transactions will carry no chain id");
    }
    let http_url = flags.require("http-url")?;
    let ws_url = flags.require("ws-url")?;

    let mut config = PipelineConfig::new(chain, http_url, ws_url);
    config.abi_base_url = flags.get("abi-url").map(str::to_string);
    config.abi_api_key = flags.get("abi-key").map(str::to_string);
    if let Some(workers) = flags.get_u64("workers")? {
        config.event_workers = workers.max(1) as usize;
    }

    let db_path = flags.get("db").unwrap_or("chainsink.db");
    let store = SqliteStore::open(db_path)
        .await
        .with_context(|| format!("opening database {db_path}"))?;

    Ok(EvmPipeline::new(config, Arc::new(store)))
}

async fn cmd_run(args: &[String]) -> Result<()> {
    let flags = Flags::parse(args)?;
    let duration = flags.get_u64("duration")?.map(Duration::from_secs);

    let pipeline = build_pipeline(&flags).await?;
    spawn_signal_handler(pipeline.shutdown_token());
    pipeline.run(duration).await?;
    Ok(())
}

async fn cmd_backfill(args: &[String]) -> Result<()> {
    let flags = Flags::parse(args)?;
    let start = flags
        .get_u64("start")?
        .ok_or_else(|| anyhow!("--start is required"))?;
    let end = flags.get_u64("end")?.ok_or_else(|| anyhow!("--end is required"))?;
    if end < start {
        bail!("--end must not be below --start");
    }

    let pipeline = build_pipeline(&flags).await?;
    spawn_signal_handler(pipeline.shutdown_token());
    pipeline.run_historical(start, end).await?;
    Ok(())
}
