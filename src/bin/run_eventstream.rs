use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::tick;
use tracing_subscriber::EnvFilter;

use eventstream_rust::core::config::EngineConfig;
use eventstream_rust::core::event::{EventPriority, EventSourceType};
use eventstream_rust::core::metrics::names;
use eventstream_rust::core::EventStreamEngine;

#[derive(Parser, Debug)]
#[command(about = "Run the event streaming engine with synthetic load", author, version)]
struct Cli {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Topic table file (topic:PRIORITY lines)
    #[arg(long)]
    topic_table: Option<PathBuf>,

    /// How long to run the load, in seconds
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Synthetic events per second per ingester thread
    #[arg(long, default_value_t = 1000)]
    rate: u64,

    /// Number of ingester threads
    #[arg(long)]
    ingesters: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match EngineConfig::from_yaml_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(path) = &cli.topic_table {
        config.topic_table_path = Some(path.clone());
    }

    let engine = match EventStreamEngine::new(config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            eprintln!("Failed to build engine: {e}");
            std::process::exit(1);
        }
    };
    engine.start();
    let started_at = chrono::Local::now();

    let ingesters = cli.ingesters.unwrap_or_else(|| num_cpus::get().min(4));
    let running = Arc::new(AtomicBool::new(true));
    let refused = Arc::new(AtomicU64::new(0));

    let topics: [(&str, EventPriority); 5] = [
        ("sensor/temperature", EventPriority::Critical),
        ("sensor/pressure", EventPriority::High),
        ("payment/txn", EventPriority::Medium),
        ("audit/login", EventPriority::Low),
        ("metrics.system", EventPriority::Batch),
    ];

    let mut handles = Vec::new();
    for worker in 0..ingesters {
        let engine = Arc::clone(&engine);
        let running = Arc::clone(&running);
        let refused = Arc::clone(&refused);
        handles.push(thread::spawn(move || {
            let ticker = tick(Duration::from_micros(1_000_000 / cli.rate.max(1)));
            let mut sequence = 0usize;
            while running.load(Ordering::Acquire) {
                if ticker.recv().is_err() {
                    break;
                }
                let (topic, priority) = topics[(worker + sequence) % topics.len()];
                let body = vec![(sequence % 256) as u8; 16];
                if !engine.ingest(
                    EventSourceType::Internal,
                    priority,
                    topic.to_string(),
                    body,
                    HashMap::new(),
                ) {
                    refused.fetch_add(1, Ordering::Relaxed);
                }
                sequence += 1;
            }
        }));
    }

    thread::sleep(Duration::from_secs(cli.duration_secs));
    running.store(false, Ordering::Release);
    for handle in handles {
        let _ = handle.join();
    }
    engine.stop();

    let snapshots = engine.registry().snapshot();
    println!("--- run summary (started {}) ---", started_at.format("%H:%M:%S"));
    for name in [
        names::DISPATCHER,
        names::EVENT_BUS,
        names::REALTIME,
        names::TRANSACTIONAL,
        names::BATCH,
    ] {
        if let Some(snap) = snapshots.get(name) {
            println!(
                "{:24} processed={:<10} dropped={:<8} skipped={:<8} avg_latency_us={:.1}",
                name,
                snap.processed,
                snap.dropped,
                snap.skipped,
                snap.avg_latency_ns() as f64 / 1000.0,
            );
        }
    }
    println!(
        "inbox_refused={} dlq_total={}",
        refused.load(Ordering::Relaxed),
        engine.dlq().total_dropped()
    );
}
