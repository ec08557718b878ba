//! Canonical workloads. Thread bodies stay allocation-free and log only
//! with the timer masked; the bootstrap thread does its own allocation
//! either masked or once every worker has been joined.

use anyhow::{ensure, Result};
use log::{debug, info};
use skein_rt::{without_preemption, Mutex, ThreadEntry, ThreadId, MAX_THREADS};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static PROGRESS: [AtomicUsize; MAX_THREADS] = [const { AtomicUsize::new(0) }; MAX_THREADS];

fn reset_progress() {
    for slot in &PROGRESS {
        slot.store(0, Ordering::Relaxed);
    }
}

fn progress(id: ThreadId) -> usize {
    PROGRESS[id.index()].load(Ordering::Relaxed)
}

fn spawn_all(threads: usize, entry: ThreadEntry, arg: usize) -> Result<Vec<ThreadId>> {
    let ids = without_preemption(|| {
        (0..threads)
            .map(|_| skein_rt::spawn(entry, arg))
            .collect::<Result<Vec<_>, _>>()
    })?;
    without_preemption(|| debug!("spawned {} threads", ids.len()));
    Ok(ids)
}

/// Joins every thread and returns their exit values in spawn order.
fn join_all(ids: &[ThreadId]) -> Result<Vec<usize>> {
    let mut values = without_preemption(|| Vec::with_capacity(ids.len()));
    for &id in ids {
        let value = skein_rt::join(id)?;
        without_preemption(|| values.push(value));
    }
    Ok(values)
}

fn yield_worker(iterations: usize) -> usize {
    let me = skein_rt::current();
    for round in 0..iterations {
        PROGRESS[me.index()].fetch_add(1, Ordering::Relaxed);
        without_preemption(|| debug!("thread {} round {}", me, round));
        skein_rt::yield_now();
    }
    me.index()
}

pub fn yield_rounds(threads: usize, iterations: usize) -> Result<()> {
    reset_progress();
    let ids = spawn_all(threads, yield_worker, iterations)?;
    let values = join_all(&ids)?;

    for (&id, &value) in ids.iter().zip(&values) {
        ensure!(value == id.index(), "thread {} exited with {}", id, value);
        ensure!(
            progress(id) == iterations,
            "thread {} yielded {} times, expected {}",
            id,
            progress(id),
            iterations
        );
    }
    let in_use = skein_rt::stats().threads_in_use;
    ensure!(in_use == 1, "{} slots still in use after joining", in_use);
    info!("{} threads yielded {} times each", threads, iterations);
    Ok(())
}

static COUNTER_LOCK: Mutex = Mutex::new();
static COUNTER: AtomicUsize = AtomicUsize::new(0);
static UNLOCK_FAILURES: AtomicUsize = AtomicUsize::new(0);

fn counter_worker(iterations: usize) -> usize {
    for _ in 0..iterations {
        COUNTER_LOCK.lock();
        // Split read-modify-write: only the mutex keeps it whole.
        let value = COUNTER.load(Ordering::Relaxed);
        skein_rt::yield_now();
        COUNTER.store(value + 1, Ordering::Relaxed);
        if COUNTER_LOCK.unlock().is_err() {
            UNLOCK_FAILURES.fetch_add(1, Ordering::Relaxed);
        }
    }
    iterations
}

pub fn locked_counter(threads: usize, iterations: usize) -> Result<()> {
    COUNTER.store(0, Ordering::Relaxed);
    UNLOCK_FAILURES.store(0, Ordering::Relaxed);

    let ids = spawn_all(threads, counter_worker, iterations)?;
    join_all(&ids)?;

    let total = COUNTER.load(Ordering::Relaxed);
    let expected = threads * iterations;
    ensure!(
        UNLOCK_FAILURES.load(Ordering::Relaxed) == 0,
        "a worker failed to release the counter lock"
    );
    ensure!(total == expected, "counter is {}, expected {}", total, expected);
    info!("counter reached {} across {} threads", total, threads);
    Ok(())
}

static SPIN_NANOS: AtomicU64 = AtomicU64::new(0);

fn spin_worker(_: usize) -> usize {
    let me = skein_rt::current();
    let budget = Duration::from_nanos(SPIN_NANOS.load(Ordering::Relaxed));
    let started = Instant::now();
    while started.elapsed() < budget {
        PROGRESS[me.index()].fetch_add(1, Ordering::Relaxed);
        std::hint::spin_loop();
    }
    me.index()
}

/// Durations past `u64::MAX` nanoseconds (about 584 years) saturate.
fn spin_budget_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

pub fn spin(threads: usize, duration: Duration) -> Result<()> {
    reset_progress();
    SPIN_NANOS.store(spin_budget_nanos(duration), Ordering::Relaxed);

    let started = Instant::now();
    let ids = spawn_all(threads, spin_worker, 0)?;
    join_all(&ids)?;
    let elapsed = started.elapsed();

    for &id in &ids {
        info!("thread {} spun {} times", id, progress(id));
    }
    let preemptions = skein_rt::stats().preemptions;
    info!(
        "{} threads spun for {:?} each in {:?} wall time, {} preemptions",
        threads, duration, elapsed, preemptions
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_budget_saturates_instead_of_wrapping() {
        assert_eq!(spin_budget_nanos(Duration::from_millis(200)), 200_000_000);
        assert_eq!(spin_budget_nanos(Duration::from_millis(u64::MAX)), u64::MAX);
        assert_eq!(spin_budget_nanos(Duration::MAX), u64::MAX);
    }
}
