//! smk entry point.
//!
//! Headless driver for the scanning engine: `simulate` runs a full session
//! against in-process fakes (the executable reference for embedding the
//! engine without a UI), `lookup` queries a real backend for a barcode.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use smk_ledger::ExpectedLine;
use smk_remote::{HttpScanRemote, ScanRemote};
use smk_session::{SessionConfig, SessionStatus};
use smk_testkit::{InMemoryRemote, ScanRig};

#[derive(Parser)]
#[command(name = "smk")]
#[command(about = "Stock Mobile Kit scanning engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scan session headlessly against an in-process backend.
    Simulate {
        /// Session mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Accumulate)]
        mode: ModeArg,

        /// Expected barcode (match mode only).
        #[arg(long)]
        expected: Option<String>,

        /// Transaction line as SKU:QTY; repeatable (accumulate mode).
        #[arg(long = "line")]
        lines: Vec<String>,

        /// Codes to scan, in order.
        #[arg(long, value_delimiter = ',', required = true)]
        codes: Vec<String>,

        /// Package weight in grams; also makes the commit require it.
        #[arg(long)]
        weight_g: Option<u32>,

        /// Transaction reference the session reconciles against.
        #[arg(long, default_value = "INV-1")]
        target: String,
    },

    /// Resolve a barcode against a live backend's stock catalog.
    Lookup {
        /// Backend base URL, e.g. http://localhost:8000
        #[arg(long)]
        base_url: String,

        /// Bearer token for the backend session.
        #[arg(long)]
        token: Option<String>,

        /// Raw barcode to resolve.
        barcode: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    SingleShot,
    Match,
    Accumulate,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Simulate {
            mode,
            expected,
            lines,
            codes,
            weight_g,
            target,
        } => simulate(mode, expected, lines, codes, weight_g, target).await,
        Commands::Lookup {
            base_url,
            token,
            barcode,
        } => lookup(base_url, token, barcode).await,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn simulate(
    mode: ModeArg,
    expected: Option<String>,
    lines: Vec<String>,
    codes: Vec<String>,
    weight_g: Option<u32>,
    target: String,
) -> Result<()> {
    let expected_lines = parse_lines(&lines)?;

    let mut remote = InMemoryRemote::for_transaction(target.as_str());
    for line in &expected_lines {
        // The barcode doubles as the SKU in the simulated backend.
        remote = remote.with_line(
            line.item_key.as_str(),
            line.item_key.as_str(),
            line.required_qty,
        );
    }

    let mut config = match mode {
        ModeArg::SingleShot => SessionConfig::single_shot(),
        ModeArg::Match => {
            let expected = expected.context("--expected is required in match mode")?;
            SessionConfig::match_against(expected)
        }
        ModeArg::Accumulate => {
            if expected_lines.is_empty() {
                bail!("accumulate mode needs at least one --line SKU:QTY");
            }
            SessionConfig::accumulate(target.as_str(), expected_lines.clone())
        }
    };
    if weight_g.is_some() {
        config = config.with_weight_required();
    }

    let rig = ScanRig::new(config, remote);
    rig.start().await?;
    info!(
        session = %rig.engine.session_id(),
        mode = ?mode,
        codes = codes.len(),
        "simulation session started"
    );

    for (i, code) in codes.iter().enumerate() {
        // Space the synthetic scans beyond the throttle window so each code
        // counts as its own physical scan.
        rig.scan(code, 1_000 + i as u64 * 1_000).await;
    }

    for notice in rig.recorded_notices() {
        println!("notice: {notice:?}");
    }

    let summary = rig.engine.ledger_summary().await;
    println!(
        "ledger: {}/{} scanned, {}/{} lines matched",
        summary.total_scanned, summary.total_required, summary.lines_matched, summary.lines_total
    );

    if let Some(grams) = weight_g {
        if !rig.engine.set_weight_g(grams).await {
            bail!("--weight-g must be a positive integer");
        }
    }

    if rig.engine.can_confirm().await {
        let commit = rig.engine.confirm().await?;
        info!(target = %commit.target_ref, status = %commit.status, "transaction committed");
        println!("committed: {} ({})", commit.target_ref, commit.status);
    } else {
        println!("not confirmable; session left in {:?}", rig.engine.status().await);
    }

    let status = rig.engine.status().await;
    rig.engine.stop().await;
    if status == SessionStatus::Failed {
        bail!("session ended in Failed");
    }
    Ok(())
}

/// Parse `SKU:QTY` transaction lines.
fn parse_lines(raw: &[String]) -> Result<Vec<ExpectedLine>> {
    raw.iter()
        .map(|arg| {
            let (sku, qty) = arg
                .split_once(':')
                .with_context(|| format!("bad --line {arg:?}, expected SKU:QTY"))?;
            let qty: u32 = qty
                .parse()
                .with_context(|| format!("bad quantity in --line {arg:?}"))?;
            Ok(ExpectedLine::new(sku, sku, qty))
        })
        .collect()
}

async fn lookup(base_url: String, token: Option<String>, barcode: String) -> Result<()> {
    let mut remote = HttpScanRemote::new(base_url);
    if let Some(token) = token {
        remote = remote.with_bearer(token);
    }

    info!(%barcode, "resolving barcode against live backend");
    let info = remote
        .lookup_barcode(&barcode)
        .await
        .context("barcode lookup failed")?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
