//! CLI for stressing and measuring an execution node.

use clap::Parser;
use eyre::{ensure, OptionExt, WrapErr};
use node_stress::{
    config::{Cli, Command, ProofArgs, ProveArgs, RunArgs, TransferArgs},
    report::{write_json_report, CsvReportSink, JSON_REPORT_FILE},
    Harness, JsonRpcClient, Workload,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Transfer(args) => transfer(args).await,
        Command::Proof(args) => proof(args).await,
        Command::Prove(args) => prove(args).await,
    }
}

async fn transfer(args: TransferArgs) -> eyre::Result<()> {
    let pool = args.run.identities().wrap_err("failed to load private keys")?;
    let calls = args.run.calls.resolve()?;
    let workload = Workload::transfers(&pool, &mut rand::thread_rng(), args.value(), calls)?;
    execute(&args.run, workload).await
}

async fn proof(args: ProofArgs) -> eyre::Result<()> {
    let pool = args.run.identities().wrap_err("failed to load private keys")?;
    let sender = pool
        .choose(&mut rand::thread_rng())
        .ok_or_eyre("no private keys configured")?
        .clone();
    let encoder = args.encoder().wrap_err("failed to load verifier ABI")?;
    info!(signature = encoder.signature(), contract = %args.contract, "Verifier call");

    let workload = Workload::ProofVerification {
        sender,
        contract: args.contract,
        encoder,
        provider: args.toolchain.provider(),
        first_index: args.first_index,
        calls: args.run.calls.resolve()?,
    };
    execute(&args.run, workload).await
}

async fn prove(args: ProveArgs) -> eyre::Result<()> {
    let provider = args.toolchain.provider();
    info!(
        first = args.first_index,
        count = args.count,
        cache = %provider.cache_dir().display(),
        "Generating proofs"
    );
    let summary = provider.generate_range(args.first_index, args.count).await;
    println!("Generated: {}", summary.generated);
    println!("Cached: {}", summary.cached);
    println!("Failed: {}", summary.failed.len());
    for (index, reason) in &summary.failed {
        println!("  {index}: {reason}");
    }
    ensure!(
        summary.failed.is_empty(),
        "{} of {} proofs failed",
        summary.failed.len(),
        args.count
    );
    Ok(())
}

async fn execute(run: &RunArgs, workload: Workload) -> eyre::Result<()> {
    let config = run.harness_config()?;
    let chain = JsonRpcClient::new(&run.rpc_url, config.request_timeout)
        .wrap_err_with(|| format!("failed to create RPC client for {}", run.rpc_url))?;

    let mut harness = Harness::new(chain, config.clone(), Arc::new(run.profiling.summarizer()));
    match run.profiling.profiler() {
        Some(profiler) => harness = harness.with_profiler(Arc::new(profiler)),
        None => warn!("no IPC path configured, CPU profiling disabled"),
    }

    let mut sink = CsvReportSink::new(&config.readings_dir)?;
    let report = harness
        .run(workload, &mut sink)
        .await
        .wrap_err("run aborted")?;

    println!("\n=== Run Report ===\n{report}");
    write_json_report(&config.readings_dir.join(JSON_REPORT_FILE), &report)?;
    Ok(())
}
