//! conduit-ctl — partition tooling and status client for conduitd.

use anyhow::{Context, Result};
use serde::Deserialize;

use conduit_core::{admit, digest_of, Digest, Identifier, PartitionRange};

const DEFAULT_PORT: u16 = 9101;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    namespace:  String,
    min_hash:   String,
    max_hash:   String,
    upstream:   LinkInfo,
    downstream: LinkInfo,
}

#[derive(Deserialize)]
struct LinkInfo {
    state:        String,
    subscription: String,
    stats:        StatsInfo,
}

#[derive(Deserialize)]
struct StatsInfo {
    received:         u64,
    relayed:          u64,
    skipped:          u64,
    malformed:        u64,
    missing_id:       u64,
    invalid_id:       u64,
    foreign_topic:    u64,
    publish_failures: u64,
    store_failures:   u64,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
    .await
    .with_context(|| format!("failed to connect to conduitd at {}, is it running?", url))?
    .json::<T>()
    .await
    .context("failed to parse response")
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

fn cmd_digest(ids: &[&str]) -> Result<()> {
    for id in ids {
        println!("{}  {}", digest_of(&Identifier::new(*id)), id);
    }
    Ok(())
}

fn cmd_check(id: &str, min: &str, max: &str) -> Result<()> {
    let min: Digest = min.parse().with_context(|| format!("bad min hash {:?}", min))?;
    let max: Digest = max.parse().with_context(|| format!("bad max hash {:?}", max))?;
    let range = PartitionRange::new(min, max)?;

    let admission = admit(&Identifier::new(id), &range);
    let verdict = if admission.admitted { "admitted" } else { "skipped" };
    println!("{}  {}  {} by {}", admission.digest, id, verdict, range);
    Ok(())
}

fn cmd_ranges(count: &str) -> Result<()> {
    let count: u64 = count.parse().context("instance count must be a number")?;
    let ranges = PartitionRange::split_even(count)?;
    for (i, r) in ranges.iter().enumerate() {
        println!("{:>4}  {}  {}", i, r.min(), r.max());
    }
    Ok(())
}

async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/api/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Conduit Relay Status");
    println!("═══════════════════════════════════════");
    println!("  Namespace : {}", resp.namespace);
    println!("  Range     : [{}, {}]", resp.min_hash, resp.max_hash);

    for (name, link) in [("upstream", &resp.upstream), ("downstream", &resp.downstream)] {
        let s = &link.stats;
        let dropped = s.malformed + s.missing_id + s.invalid_id + s.foreign_topic;
        println!();
        println!("  ┌─ {} ({})", name, link.state);
        println!("  │  subscription : {}", link.subscription);
        println!("  │  received     : {}", s.received);
        println!("  │  relayed      : {}", s.relayed);
        println!("  │  skipped      : {}", s.skipped);
        println!("  │  dropped      : {}", dropped);
        println!("  └─ failures     : {} publish, {} store", s.publish_failures, s.store_failures);
    }

    Ok(())
}

fn print_usage() {
    println!("Usage: conduit-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  digest <id>...            Print the 40-bit digest of each identifier");
    println!("  check <id> <min> <max>    Test an identifier against a hash range");
    println!("  ranges <n>                Split the digest space across n instances");
    println!("  status                    Show relay link state and counters");
    println!();
    println!("Options:");
    println!("  --port <port>   Status endpoint port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args.get(i)
            .context("--port requires a value")?
            .parse()
            .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                    => cmd_status(port).await,
        ["digest", ids @ ..] if !ids.is_empty() => cmd_digest(ids),
        ["check", id, min, max]            => cmd_check(id, min, max),
        ["ranges", n]                      => cmd_ranges(n),
        ["help"] | ["--help"] | ["-h"]     => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
