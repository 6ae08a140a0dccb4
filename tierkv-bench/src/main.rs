//! # Load Generator
//!
//! Purpose: drive a mixed CREATE/READ/DELETE workload against a running
//! server and report throughput and latency, the way an operator would
//! size pool and shard counts before a deployment.
//!
//! A deterministic PRNG keeps runs reproducible. Workload mix: a small
//! "popular key" hot set drives most reads, with a long tail of
//! create/delete traffic spread across a larger per-thread key space.

use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tierkv_client::{ClientConfig, KvClient};

const DEFAULT_THREADS: usize = 4;
const DEFAULT_DURATION_SECS: u64 = 10;
const DEFAULT_POPULAR_COUNT: u64 = 16;
const DEFAULT_KEY_SPACE_PER_THREAD: u64 = 4096;

struct BenchConfig {
    addr: String,
    threads: usize,
    duration: Duration,
    popular_count: u64,
    key_space_per_thread: u64,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let addr = args.next().unwrap_or_else(|| "127.0.0.1:6380".to_string());
        let threads = parse_usize(args.next(), DEFAULT_THREADS);
        let duration_secs = parse_u64(args.next(), DEFAULT_DURATION_SECS);

        BenchConfig {
            addr,
            threads,
            duration: Duration::from_secs(duration_secs),
            popular_count: DEFAULT_POPULAR_COUNT,
            key_space_per_thread: DEFAULT_KEY_SPACE_PER_THREAD,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn parse_u64(value: Option<String>, fallback: u64) -> u64 {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

/// Tiny deterministic PRNG to keep the workload reproducible across runs,
/// matching the engine benchmark's choice to avoid an external dependency.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        XorShift64 { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_range(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            0
        } else {
            self.next_u64() % bound
        }
    }
}

#[derive(Default)]
struct Stats {
    successful: AtomicU64,
    failed: AtomicU64,
    latency_us_total: AtomicU64,
}

fn preload_popular_keys(client: &KvClient, popular_count: u64) {
    for i in 0..popular_count {
        let key = format!("popular_{i}");
        let value = format!("popular_val_{i}");
        let _ = client.create(key.as_bytes(), value.as_bytes());
    }
}

/// One worker thread's mixed workload: 40% popular-key reads, 35% creates,
/// 25% deletes.
fn worker_thread(id: usize, config: Arc<BenchConfig>, stop: Arc<AtomicBool>, stats: Arc<Stats>) {
    let client = match KvClient::with_config(ClientConfig {
        addr: config.addr.clone(),
        max_idle: 1,
        max_total: 1,
        read_timeout: Some(Duration::from_secs(2)),
        write_timeout: Some(Duration::from_secs(2)),
        connect_timeout: Some(Duration::from_secs(2)),
    }) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("thread {id}: could not connect: {err}");
            return;
        }
    };

    let mut rng = XorShift64::new(0xA5A5_A5A5_A5A5_A5A5 ^ ((id as u64) << 16));
    let mut local_counter: u64 = 0;

    while !stop.load(Ordering::Relaxed) {
        let op = rng.next_range(100);
        let start = Instant::now();

        let result = if op < 40 {
            let k = rng.next_range(config.popular_count.max(1));
            let key = format!("popular_{k}");
            client.read(key.as_bytes()).map(|_| ())
        } else if op < 75 {
            let key = format!("mixed_t{id}_{local_counter}");
            let value = rng.next_u64().to_string();
            local_counter += 1;
            client.create(key.as_bytes(), value.as_bytes())
        } else {
            let k = rng.next_range(config.key_space_per_thread);
            let key = format!("mixed_t{id}_{k}");
            client.delete(key.as_bytes()).map(|_| ())
        };

        let elapsed = start.elapsed();
        match result {
            Ok(()) => {
                stats.successful.fetch_add(1, Ordering::Relaxed);
                stats
                    .latency_us_total
                    .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn main() {
    let config = Arc::new(BenchConfig::from_args());
    println!(
        "tierkv-bench: addr={}, threads={}, duration={}s",
        config.addr,
        config.threads,
        config.duration.as_secs()
    );

    let preload_client = match KvClient::connect(config.addr.clone()) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("could not connect for preload: {err}");
            std::process::exit(1);
        }
    };
    preload_popular_keys(&preload_client, config.popular_count);
    drop(preload_client);

    let stop = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(Stats::default());

    let handles: Vec<_> = (0..config.threads)
        .map(|id| {
            let config = Arc::clone(&config);
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            thread::spawn(move || worker_thread(id, config, stop, stats))
        })
        .collect();

    let start = Instant::now();
    thread::sleep(config.duration);
    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        let _ = handle.join();
    }
    let elapsed = start.elapsed();

    report(&stats, elapsed);
}

fn report(stats: &Stats, elapsed: Duration) {
    let successful = stats.successful.load(Ordering::Relaxed);
    let failed = stats.failed.load(Ordering::Relaxed);
    let latency_us_total = stats.latency_us_total.load(Ordering::Relaxed);
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = successful as f64 / secs;
    let avg_latency_us = if successful > 0 {
        latency_us_total as f64 / successful as f64
    } else {
        0.0
    };

    println!(
        "completed: {successful} ok, {failed} failed in {secs:.3}s ({ops_per_sec:.0} ops/s, {avg_latency_us:.1} us/op avg)"
    );
}
