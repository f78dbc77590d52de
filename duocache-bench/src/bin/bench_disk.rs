//! # Disk Tier Benchmark Harness
//!
//! Purpose: the same deterministic-workload approach as `bench_memory`,
//! against `duocache-disk`'s `DiskCache`, run in a temporary directory so
//! repeated runs never pick up stale state.

use std::env;
use std::hint::black_box;
use std::time::Instant;

use duocache_disk::DiskCache;

const DEFAULT_KEY_COUNT: usize = 1 << 12;
const DEFAULT_OP_COUNT: usize = 20_000;
const DEFAULT_VALUE_SIZE: usize = 256;

struct BenchConfig {
    key_count: usize,
    key_mask: usize,
    op_count: usize,
    value_size: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let requested_keys = parse_usize(args.next(), DEFAULT_KEY_COUNT);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let value_size = parse_usize(args.next(), DEFAULT_VALUE_SIZE);
        let key_count = normalize_power_of_two(requested_keys);
        BenchConfig {
            key_count,
            key_mask: key_count - 1,
            op_count,
            value_size,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn normalize_power_of_two(value: usize) -> usize {
    let value = value.max(1);
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two()
    }
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn report(label: &str, ops: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let micros_per_op = (secs * 1e6) / (ops as f64);
    println!("{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {micros_per_op:.1} us/op)");
}

fn main() {
    let config = BenchConfig::from_args();
    let dir = tempfile::tempdir().expect("create temp dir");
    let cache = DiskCache::open(dir.path(), 4096).expect("open disk cache");

    let keys: Vec<String> = (0..config.key_count).map(|i| format!("key-{i:08x}")).collect();
    let value = vec![0xABu8; config.value_size];

    for key in &keys {
        cache.set(key, &value);
    }

    println!(
        "keys={}, ops={}, value_size={}",
        config.key_count, config.op_count, config.value_size
    );

    let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0);
    let start = Instant::now();
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        let result = cache.get(&keys[idx]);
        black_box(result);
    }
    report("GET", config.op_count, start.elapsed());

    let mut rng = XorShift64::new(0x0FED_CBA9_8765_4321);
    let start = Instant::now();
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        cache.set(&keys[idx], &value);
    }
    report("SET", config.op_count, start.elapsed());
}
