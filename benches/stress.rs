use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use holdfast::model::*;
use holdfast::{Engine, EngineError};

const HOUR: i64 = 3_600_000; // 1 hour in ms
const TTL: Duration = Duration::from_secs(300);

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn setup(n_seats: usize, n_vehicles: usize) -> Arc<Engine> {
    let seats = (0..n_seats).map(|i| Resource::seat(format!("SEAT-{i}"), 120));
    let vehicles = (0..n_vehicles).map(|i| Resource::vehicle(format!("VEH-{i}"), 5000));
    let engine = Engine::builder()
        .resources(seats.chain(vehicles))
        .build()
        .expect("setup failed");
    println!("  registered {n_seats} seats, {n_vehicles} vehicles");
    Arc::new(engine)
}

async fn phase1_sequential(engine: &Engine) {
    let n = 20_000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = (i as i64) * HOUR;
        let t = Instant::now();
        engine
            .book_time_range("VEH-0", "bench", s, s + HOUR)
            .await
            .expect("sequential booking failed");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("book latency", &mut latencies);
}

/// Many buyers race for few seats. Every seat must end with one winner.
async fn phase2_seat_contention(engine: Arc<Engine>, n_seats: usize) {
    let n_tasks = 64;
    let start = Instant::now();
    let won = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for task in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        handles.push(tokio::spawn(async move {
            let holder = format!("buyer-{task}");
            let mut latencies = Vec::new();
            for seat in 0..n_seats {
                let id = format!("SEAT-{seat}");
                let t = Instant::now();
                match engine.hold_seat(&id, &holder, TTL).await {
                    Ok(token) => {
                        engine
                            .confirm_seat(&id, &holder, token)
                            .await
                            .expect("confirm of own hold failed");
                        won.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::AlreadyHeld(_)) | Err(EngineError::AlreadyBooked(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.expect("task panicked"));
    }
    let elapsed = start.elapsed();
    let won = won.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} buyers x {n_seats} seats in {:.2}s, {won} seats sold",
        elapsed.as_secs_f64()
    );
    assert_eq!(won, n_seats, "double allocation or lost seat");
    print_latency("hold attempt", &mut all);
}

async fn phase3_read_under_load(engine: Arc<Engine>, n_vehicles: usize) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();

    for w in 1..n_vehicles {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let id = format!("VEH-{w}");
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = i * HOUR;
                let _ = engine.book_time_range(&id, "writer", s, s + HOUR).await;
                i += 2;
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut reader_handles = Vec::new();
    for r in 0..8 {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let id = format!("VEH-{}", 1 + r % (n_vehicles - 1).max(1));
            let mut latencies = Vec::with_capacity(500);
            for _ in 0..500 {
                let t = Instant::now();
                engine
                    .availability(&id, 0, 24 * 30 * HOUR)
                    .await
                    .expect("availability failed");
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.expect("reader panicked"));
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_hold_churn(engine: Arc<Engine>, n_seats: usize) {
    let rounds = 2_000;
    let start = Instant::now();
    let mut handles = Vec::new();

    for seat in 0..n_seats {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("CHURN-{seat}");
            engine
                .register(Resource::seat(id.clone(), 1))
                .expect("register failed");
            for _ in 0..rounds {
                let token = engine.hold_seat(&id, "churn", TTL).await.expect("hold failed");
                engine
                    .release_seat(&id, "churn", token)
                    .await
                    .expect("release failed");
            }
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ops = (n_seats * rounds * 2) as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_seats} seats x {rounds} hold/release pairs in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let n_seats: usize = std::env::var("HOLDFAST_BENCH_SEATS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);
    let n_vehicles = 9;

    println!("=== holdfast stress benchmark ===\n");

    println!("[setup]");
    let engine = setup(n_seats, n_vehicles);

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential(&engine).await;

    println!("\n[phase 2] seat contention");
    phase2_seat_contention(engine.clone(), n_seats).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(engine.clone(), n_vehicles).await;

    println!("\n[phase 4] hold churn");
    phase4_hold_churn(engine.clone(), 16).await;

    println!("\n=== benchmark complete ===");
}
