use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use orderbook_codec::journal::JournalReader;
use orderbook_codec::{register_order_book_format, BookData, FormatRegistry, UnixNanos};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Inspect and replay order book row journals")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print raw rows with their group tags, verifying every frame CRC
    Inspect {
        /// Journal file to read
        #[arg(long, short = 'i', env = "JOURNAL_FILE")]
        input: PathBuf,

        /// Stop after this many rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Decode the journal chunk by chunk and print the rebuilt events
    Replay {
        /// Journal file to read
        #[arg(long, short = 'i', env = "JOURNAL_FILE")]
        input: PathBuf,

        /// Minimum rows per decode call (chunks always end on a group boundary)
        #[arg(long, env = "CHUNK_ROWS", default_value_t = 10_000)]
        chunk_rows: usize,

        /// Print every decoded event
        #[arg(long, default_value_t = false)]
        dump: bool,

        /// Number of levels to print per snapshot side when dumping
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

fn fmt_ts(ts: UnixNanos) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts))
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}

fn inspect(input: PathBuf, limit: Option<usize>) -> Result<()> {
    let mut rdr = JournalReader::open(&input)?;
    let h = rdr.header();
    println!("Header: v{} table={} chunked={} created={}ns", h.version, h.table, h.chunked, h.created_unix_ns);
    let mut rows = 0usize;
    while let Some(r) = rdr.next_row()? {
        if limit.is_some_and(|n| rows >= n) {
            break;
        }
        rows += 1;
        println!(
            "{:<8} {:<6} {} {} {:>6} {:>12} x {:<10} {}{}",
            r.kind,
            r.action,
            r.instrument_id,
            fmt_ts(r.ts_event),
            r.side.as_deref().unwrap_or("-"),
            r.price.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            r.size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            r.sequence.map(|s| format!("seq={s} ")).unwrap_or_default(),
            if r.last { "<last>" } else { "" },
        );
    }
    info!("Read {} rows ({} frames)", rows, rdr.frames_read());
    Ok(())
}

fn print_event(ev: &BookData, top: usize) {
    match ev {
        BookData::Delta(d) => {
            let order = d
                .order
                .as_ref()
                .map(|o| format!("{} {} x {} id={}", o.side, o.price, o.size, o.order_id))
                .unwrap_or_default();
            println!("{} {} DELTA {} {}", fmt_ts(d.ts_event), d.instrument_id, d.action, order);
        }
        BookData::Deltas(b) => {
            println!("{} {} DELTAS n={}", fmt_ts(b.ts_event), b.instrument_id, b.deltas.len());
        }
        BookData::Snapshot(s) => {
            println!(
                "{} {} SNAPSHOT {} bids / {} asks",
                fmt_ts(s.ts_event),
                s.instrument_id,
                s.bids.len(),
                s.asks.len()
            );
            for i in 0..top.min(s.bids.len().max(s.asks.len())) {
                let b = s
                    .bids
                    .get(i)
                    .map(|l| format!("{:>3}: {:>10.2} x {:>7}", i, l.price, l.size))
                    .unwrap_or_else(|| format!("{:>3}: -", i));
                let a = s
                    .asks
                    .get(i)
                    .map(|l| format!("{:>10.2} x {:>7}", l.price, l.size))
                    .unwrap_or_else(|| "-".to_string());
                println!("{} | {}", b, a);
            }
        }
    }
}

fn replay(input: PathBuf, chunk_rows: usize, dump: bool, top: usize) -> Result<()> {
    let mut registry = FormatRegistry::new();
    register_order_book_format(&mut registry)?;

    let mut rdr = JournalReader::open(&input)?;
    let format = registry
        .format_for_table(&rdr.header().table)
        .with_context(|| format!("journal {input:?}"))?;

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut chunks = 0usize;
    while let Some(rows) = rdr.read_chunk(chunk_rows.max(1))? {
        chunks += 1;
        let events = format
            .deserialize(&rows)
            .with_context(|| format!("decode chunk {chunks} ({} rows)", rows.len()))?;
        for ev in &events {
            *counts.entry(ev.kind().as_str()).or_default() += 1;
            if dump {
                print_event(ev, top);
            }
        }
    }
    let summary: Vec<String> = counts.iter().map(|(k, n)| format!("{k}={n}")).collect();
    info!("Replayed {} chunks: {}", chunks, summary.join(" "));
    Ok(())
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Inspect { input, limit } => inspect(input, limit),
        Command::Replay { input, chunk_rows, dump, top } => replay(input, chunk_rows, dump, top),
    }
}
