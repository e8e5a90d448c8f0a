//! Microbenchmarks for slotlist.
//!
//! Plain `Instant` timing, one line per case, plus a machine-parseable
//! summary line at the end. Run with `cargo bench --bench micro`.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use slotlist::__test_support::{shared_pool, Region};
use slotlist::{DefaultEncoder, Lock, PointerEncoder, SlotSpan, ThreadCacheBucket, WholePointer};

const SLOTS: usize = 1024;

/// Pop/free latency on a span, ns per pair.
fn bench_span<E: PointerEncoder>(span_start: *mut u8, slot_size: usize, iterations: usize) -> f64 {
    let mut span = unsafe { SlotSpan::<E>::new(span_start, slot_size) };
    span.provision(SLOTS);
    for _ in 0..1000 {
        let p = span.pop_for_alloc();
        unsafe { span.free(black_box(p)) };
    }
    let start = Instant::now();
    for _ in 0..iterations {
        let p = span.pop_for_alloc();
        unsafe { span.free(black_box(p)) };
    }
    start.elapsed().as_nanos() as f64 / iterations as f64
}

/// Push/pop latency on a thread-cache bucket, ns per pair.
fn bench_thread_cache<E: PointerEncoder>(
    span_start: *mut u8,
    slot_size: usize,
    iterations: usize,
) -> f64 {
    let mut span = unsafe { SlotSpan::<E>::new(span_start, slot_size) };
    span.provision(SLOTS);
    let mut cache = ThreadCacheBucket::<E>::new(slot_size, 64);
    cache.fill_from(&mut span, 32);
    let start = Instant::now();
    for _ in 0..iterations {
        let p = cache.pop();
        unsafe { cache.push(black_box(p)) };
    }
    let ns = start.elapsed().as_nanos() as f64 / iterations as f64;
    cache.flush(0, |slot| unsafe {
        span.free(slot);
    });
    ns
}

/// Full sweep of a span with every slot free, ns per entry.
fn bench_check_free_list(span_start: *mut u8, iterations: usize) -> f64 {
    let mut span = unsafe { SlotSpan::<WholePointer>::new(span_start, 64) };
    span.provision(SLOTS);
    let start = Instant::now();
    for _ in 0..iterations {
        black_box(span.check_free_list());
    }
    start.elapsed().as_nanos() as f64 / (iterations * SLOTS) as f64
}

/// Uncontended acquire/release, ns per pair.
fn bench_lock_uncontended(iterations: usize) -> f64 {
    let lock = Lock::new();
    let start = Instant::now();
    for _ in 0..iterations {
        let _guard = black_box(&lock).lock();
    }
    start.elapsed().as_nanos() as f64 / iterations as f64
}

/// Contended lock throughput across threads.
fn bench_lock_contended(num_threads: usize, ops_per_thread: usize) -> f64 {
    let lock = Arc::new(Lock::new());
    let start = Instant::now();
    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let _guard = lock.lock();
                    black_box(&lock);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    (num_threads * ops_per_thread) as f64 / start.elapsed().as_secs_f64()
}

fn main() {
    let iterations = 1_000_000;
    let region = Region::super_pages(1);
    let (pool, _) = shared_pool();

    println!("=== slotlist microbenchmarks ===\n");

    println!("--- span pop/free (ns/op) ---");
    let mut span_latencies = Vec::new();
    for &size in &[32usize, 64, 256] {
        let whole = bench_span::<WholePointer>(region.span_start(0), size, iterations);
        let default = bench_span::<DefaultEncoder>(pool.span_start(0), size, iterations);
        println!("  size={:>4}: whole={:>6.1} ns  default={:>6.1} ns", size, whole, default);
        span_latencies.push((size, default));
    }

    println!("\n--- thread cache push/pop (ns/op) ---");
    let tc = bench_thread_cache::<DefaultEncoder>(pool.span_start(1), 64, iterations);
    println!("  size=  64: {:.1} ns", tc);

    println!("\n--- freelist sweep (ns/entry) ---");
    println!("  {:.2} ns", bench_check_free_list(region.span_start(0), iterations / SLOTS));

    println!("\n--- lock ---");
    let uncontended = bench_lock_uncontended(iterations);
    println!("  uncontended: {:.1} ns", uncontended);
    let mut contended_4t = 0.0;
    for &threads in &[2usize, 4, 8] {
        let mops = bench_lock_contended(threads, iterations / threads) / 1_000_000.0;
        println!("  threads={}: {:>6.2} Mops/sec", threads, mops);
        if threads == 4 {
            contended_4t = mops;
        }
    }

    print!("\nSUMMARY");
    for &(size, ns) in &span_latencies {
        print!("|span_{}={:.1}", size, ns);
    }
    println!(
        "|thread_cache={:.1}|lock_uncontended={:.1}|lock_4t={:.2}",
        tc, uncontended, contended_4t
    );
}
