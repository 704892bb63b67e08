use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime};
use ulid::Ulid;

use vendimia::{BookingRequest, Engine, EngineConfig, NewTour, NotifyHub, TourKind};

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

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

fn date(offset: u64) -> NaiveDate {
    base_date().checked_add_days(Days::new(offset)).unwrap()
}

fn tour(max_party: u32) -> NewTour {
    NewTour {
        name: "Bench Tour".into(),
        kind: TourKind::Standard,
        base_price_cents: 25_000,
        min_party: 1,
        max_party,
        earliest_start: t(9, 0),
        latest_start: t(18, 0),
        duration_min: 60,
        buffer_min: Some(60),
    }
}

fn req(tour_id: Ulid, date: NaiveDate, start: NaiveTime) -> BookingRequest {
    BookingRequest {
        tour_id,
        date,
        start,
        party: 1,
        label: None,
    }
}

fn start_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("vendimia_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    Arc::new(
        Engine::new(
            dir.join(name),
            Arc::new(NotifyHub::new()),
            EngineConfig::default(),
        )
        .unwrap(),
    )
}

/// One booking per date: every write opens an instance and pays for a
/// WAL append, so this is the raw fsync-bound write path.
async fn phase1_sequential(engine: &Arc<Engine>) {
    let tour_id = Ulid::new();
    engine.create_tour(tour_id, tour(8)).await.unwrap();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = Instant::now();
        engine
            .book(req(tour_id, date(i as u64), t(11, 0)))
            .await
            .unwrap();
        latencies.push(s.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!(
        "  {n} bookings in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("write latency", &mut latencies);
}

/// Independent dates per task, so the day locks never collide and the
/// group-commit batching in the WAL writer is what gets exercised.
async fn phase2_concurrent(engine: &Arc<Engine>) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for task in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let tour_id = Ulid::new();
            engine.create_tour(tour_id, tour(8)).await.unwrap();
            // Each task books its own band of dates, clear of phase 1.
            for j in 0..n_per_task {
                let offset = (10_000 + task * 1_000 + j) as u64;
                engine
                    .book(req(tour_id, date(offset), t(11, 0)))
                    .await
                    .unwrap();
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

/// Slot queries against a busy date while writers keep booking elsewhere.
async fn phase3_read_under_load(engine: &Arc<Engine>) {
    let tour_id = Ulid::new();
    engine.create_tour(tour_id, tour(1000)).await.unwrap();

    let busy = date(30_000);
    for _ in 0..200 {
        engine.book(req(tour_id, busy, t(11, 0))).await.unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5u64 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let wtour = Ulid::new();
            engine.create_tour(wtour, tour(8)).await.unwrap();
            let mut i = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let _ = engine
                    .book(req(wtour, date(40_000 + w * 10_000 + i), t(11, 0)))
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
                let s = Instant::now();
                engine.available_slots(busy, tour_id).await.unwrap();
                latencies.push(s.elapsed());
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

    print_latency("slot query", &mut all_latencies);
}

/// Everyone joins the same instance: maximal contention on one day lock.
async fn phase4_join_storm(engine: &Arc<Engine>) {
    let tour_id = Ulid::new();
    engine.create_tour(tour_id, tour(1000)).await.unwrap();
    // Between the phase 3 busy date and the writer bands, so nothing
    // else ever carved it.
    let storm_date = date(35_000);

    let n_tasks = 50;
    let per_task = 20;

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut ok = 0usize;
            for _ in 0..per_task {
                if engine
                    .book(req(tour_id, storm_date, t(11, 0)))
                    .await
                    .is_ok()
                {
                    ok += 1;
                }
            }
            ok
        }));
    }

    let mut confirmed = 0;
    for h in handles {
        confirmed += h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {per_task} joins: {confirmed}/{total} confirmed in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    println!("=== vendimia stress benchmark ===\n");

    let engine = start_engine("bench.wal");

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&engine).await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent(&engine).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&engine).await;

    println!("\n[phase 4] join storm on one slot");
    phase4_join_storm(&engine).await;

    println!("\n=== benchmark complete ===");
}
