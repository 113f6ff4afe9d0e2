use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use ulid::Ulid;

use stayd::auth::Caller;
use stayd::engine::{Engine, EngineError, PropertyDraft};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn admin() -> Caller {
    Caller {
        user_id: Ulid::new(),
        name: "Bench Admin".into(),
        admin: true,
    }
}

fn guest(i: usize) -> Caller {
    Caller {
        user_id: Ulid::new(),
        name: format!("Guest Number{i}"),
        admin: false,
    }
}

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .checked_add_days(Days::new(offset))
        .unwrap()
}

fn bench_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("stayd_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    Arc::new(Engine::new(dir.join(format!("{name}.wal"))).unwrap())
}

async fn new_property(engine: &Engine, title: &str) -> Ulid {
    engine
        .create_property(
            &admin(),
            PropertyDraft {
                title: title.into(),
                description: "Benchmark property with a very long window".into(),
                price_per_night_cents: 10_000,
                available_from: day(0),
                available_to: day(40_000),
            },
        )
        .await
        .unwrap()
        .id
}

/// Sequential non-conflicting creates on one property: pure write path.
async fn phase1_sequential() {
    let engine = bench_engine("phase1");
    let pid = new_property(&engine, "Sequential target").await;
    let caller = guest(0);

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        // one-night stays three days apart never touch
        let s = day(i as u64 * 3);
        let e = day(i as u64 * 3 + 1);
        let t = Instant::now();
        engine.create_booking(&caller, pid, s, e).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Concurrent writers on disjoint properties: group-commit throughput.
async fn phase2_concurrent() {
    let engine = bench_engine("phase2");
    let n_tasks = 10;
    let n_per_task = 200;

    let mut pids = Vec::new();
    for i in 0..n_tasks {
        pids.push(new_property(&engine, &format!("Concurrent target {i}")).await);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for (i, pid) in pids.into_iter().enumerate() {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let caller = guest(i);
            for j in 0..n_per_task {
                let s = day(j as u64 * 3);
                let e = day(j as u64 * 3 + 1);
                engine.create_booking(&caller, pid, s, e).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Availability queries while writers keep the property lock busy.
async fn phase3_read_under_load() {
    let engine = bench_engine("phase3");
    let pid = new_property(&engine, "Read target").await;
    let caller = guest(0);

    for i in 0..200 {
        engine
            .create_booking(&caller, pid, day(i * 3), day(i * 3 + 1))
            .await
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let wpid = new_property(&engine, &format!("Background writer {w}")).await;
            let caller = guest(100 + w);
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let _ = engine
                    .create_booking(&caller, wpid, day(i * 3), day(i * 3 + 1))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                engine.property_availability(pid, None).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

/// Many tasks fighting over the same dates: conflict-heavy contention.
async fn phase4_contention_storm() {
    let engine = bench_engine("phase4");
    let pid = new_property(&engine, "Contention target").await;

    let n_tasks = 50;
    let attempts_per_task = 40;
    let confirmed = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let engine = engine.clone();
        let confirmed = confirmed.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            let caller = guest(i);
            for j in 0..attempts_per_task {
                // 50 tasks race for the same 40 slots
                let s = day(j as u64 * 3);
                let e = day(j as u64 * 3 + 1);
                match engine.create_booking(&caller, pid, s, e).await {
                    Ok(_) => confirmed.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict(_)) => conflicts.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let won = confirmed.load(Ordering::Relaxed);
    let lost = conflicts.load(Ordering::Relaxed);
    assert_eq!(won, attempts_per_task, "each slot must be won exactly once");
    println!(
        "  {} attempts in {:.2}s: {won} confirmed, {lost} conflicts",
        won + lost,
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    println!("phase 1: sequential writes");
    phase1_sequential().await;

    println!("phase 2: concurrent writers, disjoint properties");
    phase2_concurrent().await;

    println!("phase 3: reads under write load");
    phase3_read_under_load().await;

    println!("phase 4: contention storm, one property");
    phase4_contention_storm().await;
}
