//! The `proxyscope` CLI: parses arguments with `clap`, wires up a
//! `tracing-subscriber` filter the same way `cmd/ethrex/initializers.rs`
//! does, drives `proxyscope_analyzer::classify` against a target address
//! and (optionally) its structural analysis against the current logic
//! contract, and prints the result as JSON.
//!
//! This is the analogue of `proxion/__main__.py::main` — the original's
//! CLI entry point — without the parts spec.md §1 scopes out (source
//! fetching, the `slither` invocation, database persistence, CSV/JSON
//! dataset tooling).

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use proxyscope_analyzer::{analyze_structure, classify, ProxyClassification};
use proxyscope_common::{hexutil, Address, BlockTag, Explorer};
use proxyscope_explorer::JsonRpcExplorer;
use tracing_subscriber::EnvFilter;

/// Probes whether `ADDRESS` is an upgradeable proxy and, if so, locates
/// its logic contract(s) and storage-slot/selector collisions.
#[derive(Parser, Debug)]
#[command(name = "proxyscope", version, about)]
struct Cli {
    /// Address to classify, as a 0x-prefixed 40-hex-character string.
    address: String,

    /// JSON-RPC endpoint of the chain to query.
    #[arg(long, env = "PROXYSCOPE_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Block number to classify at, or "latest" (spec.md §6 `block` option).
    #[arg(long, default_value = "latest")]
    block: String,

    /// Initial gas budget for the top frame (spec.md §6 `gas` option).
    #[arg(long, default_value_t = 1_000_000)]
    gas: u64,

    /// Emit per-instruction tracing to standard error (spec.md §6 `debug`
    /// option), raising the `proxyscope_vm` log target to `debug`.
    #[arg(long)]
    debug: bool,

    /// Also run the structural (storage-slot/selector collision) analysis
    /// against the current logic contract, once a proxy is found.
    #[arg(long)]
    structural: bool,
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "proxyscope_vm=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(debug).init();
}

fn parse_block(s: &str) -> Result<BlockTag> {
    if s.eq_ignore_ascii_case("latest") {
        return Ok(BlockTag::Latest);
    }
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let number = if s.starts_with("0x") {
        u64::from_str_radix(stripped, 16)
    } else {
        u64::from_str(stripped)
    };
    Ok(BlockTag::Number(number.with_context(|| format!("invalid --block value {s:?}"))?))
}

/// spec.md §6's result record: `ProxyClassification` plus, when
/// `--structural` is passed and a proxy was found, the `check_advanced`
/// collision sets — serialized in the hex-string convention §6 specifies
/// rather than `HashSet<Word>`'s default (unordered, non-hex) encoding.
#[derive(serde::Serialize)]
struct Report {
    proxy_info: ProxyClassification,
    adv_check: Option<AdvCheckReport>,
}

#[derive(serde::Serialize)]
struct AdvCheckReport {
    slots_read_read: Vec<String>,
    slots_read_write: Vec<String>,
    slots_write_read: Vec<String>,
    slots_write_write: Vec<String>,
    colliding_signatures: Vec<String>,
}

fn run_structural(
    explorer: &dyn Explorer,
    proxy_address: Address,
    classification: &ProxyClassification,
    block: BlockTag,
) -> Result<Option<AdvCheckReport>> {
    let Some(current) = classification.current_implementation else {
        return Ok(None);
    };
    let mut logic_addresses = classification.old_implementations.clone();
    if logic_addresses.last() != Some(&current) {
        logic_addresses.push(current);
    }

    let proxy_code = explorer.get_code(proxy_address, block)?;
    let logic_codes: Vec<Vec<u8>> =
        logic_addresses.iter().map(|&addr| explorer.get_code(addr, block)).collect::<Result<_, _>>()?;

    let analysis = analyze_structure(&proxy_code, &logic_codes);
    let hex_word_set = |set: &std::collections::HashSet<proxyscope_common::Word>| -> Vec<String> {
        let mut values: Vec<String> = set.iter().copied().map(hexutil::encode_word).collect();
        values.sort();
        values
    };
    let mut colliding_signatures: Vec<String> = analysis
        .colliding_signatures
        .iter()
        .flat_map(|set| set.iter().map(|sel| format!("0x{sel:08x}")))
        .collect();
    colliding_signatures.sort();
    colliding_signatures.dedup();

    Ok(Some(AdvCheckReport {
        slots_read_read: hex_word_set(&analysis.slots_read_read),
        slots_read_write: hex_word_set(&analysis.slots_read_write),
        slots_write_read: hex_word_set(&analysis.slots_write_read),
        slots_write_write: hex_word_set(&analysis.slots_write_write),
        colliding_signatures,
    }))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let address =
        hexutil::decode_address(&cli.address).map_err(|e| anyhow::anyhow!("invalid address: {e}"))?;
    let block = parse_block(&cli.block)?;

    if cli.rpc_url.is_empty() {
        bail!("--rpc-url must not be empty");
    }
    let explorer: Arc<dyn Explorer> = Arc::new(JsonRpcExplorer::new(cli.rpc_url.clone()));

    let proxy_info = classify(explorer.clone(), address, block, cli.gas)
        .context("classification failed")?;

    let adv_check = if cli.structural {
        run_structural(explorer.as_ref(), address, &proxy_info, block)?
    } else {
        None
    };

    let report = Report { proxy_info, adv_check };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
