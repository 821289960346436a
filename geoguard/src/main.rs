// geoguard/src/main.rs
//
// geoguard — login geolocation risk verification daemon
//
// Reads login attempts ({"user_id", "ip", "timestamp"?} per line) and prints
// a risk verdict for each.
//
//   tail    — follow a live JSONL feed (one task per attempt)
//   replay  — verify a captured feed in timestamp order, at scaled speed
//
// Usage:
//   geoguard --geo-db geo.json --mode tail --path /var/log/auth/logins.jsonl
//   geoguard --geo-db geo.json --config geoguard.json --mode replay --path captured.jsonl --speed 10.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geoguard::config::EngineConfig;
use geoguard::engine::{JsonlAlertSink, LogAlertSink, RiskEngine, SecurityAlertSink};
use geoguard::events::{LoginAttempt, RiskLevel, VerificationResult};
use geoguard::geo::{InMemoryReputation, StaticGeoProvider};
use geoguard::state::InMemoryHistoryStore;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "geoguard",
    about   = "Login geolocation risk engine — impossible travel, VPN/ASN and country risk",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "tail")]
    mode: Mode,

    #[arg(long, default_value = "/tmp/geoguard_logins.jsonl",
          help = "JSONL feed of login attempts")]
    path: PathBuf,

    #[arg(long, help = "Engine config (JSON); defaults when omitted")]
    config: Option<PathBuf>,

    #[arg(long, help = "Geolocation table (JSON: locations + asns keyed by IP)")]
    geo_db: Option<PathBuf>,

    #[arg(long, help = "Append security alerts to this JSONL file instead of logging them")]
    alerts: Option<PathBuf>,

    #[arg(long, default_value = "1.0", help = "Replay speed multiplier")]
    speed: f64,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Tail,    // follow a live JSONL feed
    Replay,  // replay a static JSONL feed in timestamp order
}

// ── Wiring ────────────────────────────────────────────────────────────────────

fn build_engine(cli: &Cli) -> Result<(Arc<RiskEngine>, Arc<InMemoryHistoryStore>)> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default().normalized().validated()?,
    };
    let config = Arc::new(config);

    let geo = Arc::new(match &cli.geo_db {
        Some(path) => StaticGeoProvider::from_file(path)
            .with_context(|| format!("loading geo table {}", path.display()))?,
        None => {
            warn!("No --geo-db given; every address will resolve as unknown");
            StaticGeoProvider::new()
        }
    });

    let store = Arc::new(InMemoryHistoryStore::new(config.history_ttl(), config.max_history_entries));

    let sink: Arc<dyn SecurityAlertSink> = match &cli.alerts {
        Some(path) => Arc::new(JsonlAlertSink::new(path.clone())?),
        None => Arc::new(LogAlertSink),
    };

    let engine = RiskEngine::new(config, geo.clone(), store.clone(), sink)
        .with_asn_lookup(geo)
        .with_reputation(Arc::new(InMemoryReputation::new()));

    Ok((Arc::new(engine), store))
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_verdict(attempt: &LoginAttempt, result: &VerificationResult) {
    let color = match result.risk_level() {
        RiskLevel::High   => "\x1b[91;1m",
        RiskLevel::Medium => "\x1b[93;1m",
        RiskLevel::Low    => "\x1b[92m",
    };
    let reset = "\x1b[0m";
    println!("{}{:<6}{} user={} ip={}", color, result.risk_level().to_string(), reset, attempt.user_id, attempt.ip);
    for alert in result.alerts() {
        println!("  \x1b[90m- {}{}", alert, reset);
    }
}

async fn print_stats_loop(engine: Arc<RiskEngine>, store: Arc<InMemoryHistoryStore>, start: Instant) {
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
        let s = engine.stats().snapshot();
        println!(
            "\n\x1b[1m── stats  uptime={:.0}s  verified={}  low={}  medium={}  high={}  impossible={}  errors={}  users={} ──\x1b[0m",
            start.elapsed().as_secs_f64(), s.verifications, s.low, s.medium, s.high,
            s.impossible_travel, s.internal_errors, store.len()
        );
    }
}

// ── Feed sources ──────────────────────────────────────────────────────────────

async fn tail_jsonl(path: PathBuf, tx: mpsc::Sender<LoginAttempt>) -> Result<()> {
    let file = tokio::fs::File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();

    while lines.next_line().await?.is_some() {}  // start at end of file

    info!("Tailing {}", path.display());
    loop {
        match lines.next_line().await? {
            Some(line) => {
                let line = line.trim();
                if line.is_empty() { continue; }
                match serde_json::from_str::<LoginAttempt>(line) {
                    Ok(a) => { if tx.send(a).await.is_err() { break; } }
                    Err(e) => warn!("Parse error: {}", e),
                }
            }
            None => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
        }
    }
    Ok(())
}

async fn replay_jsonl(path: PathBuf, engine: Arc<RiskEngine>, speed: f64) -> Result<()> {
    let content = tokio::fs::read_to_string(&path).await?;
    let mut attempts: Vec<LoginAttempt> = content.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| match serde_json::from_str::<LoginAttempt>(l) {
            Ok(a) => Some(a),
            Err(e) => { warn!("Parse error: {}", e); None }
        })
        .collect();
    if attempts.is_empty() { return Ok(()); }
    attempts.sort_by_key(|a| a.timestamp);

    let speed = if speed > 0.0 { speed } else { 1.0 };
    let base_ts = attempts[0].timestamp;
    let base_wall = Instant::now();

    // Sequential: impossible travel depends on per-user ordering.
    for attempt in attempts {
        if let (Some(base), Some(ts)) = (base_ts, attempt.timestamp) {
            let offset = (ts - base).num_milliseconds().max(0) as f64 / speed / 1000.0;
            let target = base_wall + std::time::Duration::from_secs_f64(offset);
            let now = Instant::now();
            if target > now {
                tokio::time::sleep(target - now).await;
            }
        }
        let result = engine.verify_attempt(&attempt).await;
        print_verdict(&attempt, &result);
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("geoguard=info".parse()?))
        .compact().init();

    let cli = Cli::parse();
    let (engine, store) = build_engine(&cli)?;
    let start = Instant::now();

    println!("\n  \x1b[1mgeoguard\x1b[0m \x1b[90mv{} | login geolocation risk engine\x1b[0m", env!("CARGO_PKG_VERSION"));

    tokio::spawn(print_stats_loop(Arc::clone(&engine), Arc::clone(&store), start));
    tokio::spawn(Arc::clone(&store).housekeeping_loop());

    match cli.mode {
        Mode::Replay => {
            println!("  Mode: \x1b[93mREPLAY\x1b[0m  |  {}  speed={:.1}x\n", cli.path.display(), cli.speed);
            replay_jsonl(cli.path.clone(), Arc::clone(&engine), cli.speed).await?;
            let s = engine.stats().snapshot();
            println!("\n  Done: {} verified, {} high, {} medium", s.verifications, s.high, s.medium);
        }

        Mode::Tail => {
            println!("  Mode: \x1b[96mTAIL\x1b[0m  |  {}", cli.path.display());
            println!("  Press Ctrl+C to stop.\n");
            let (tx, mut rx) = mpsc::channel::<LoginAttempt>(4096);
            let path = cli.path.clone();
            tokio::spawn(async move {
                if let Err(e) = tail_jsonl(path, tx).await {
                    warn!("Feed stopped: {}", e);
                }
            });

            // One task per attempt
            while let Some(attempt) = rx.recv().await {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let result = engine.verify_attempt(&attempt).await;
                    print_verdict(&attempt, &result);
                });
            }
        }
    }

    Ok(())
}
