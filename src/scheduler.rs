//! The cooperative per-direction scheduler.
//!
//! One loop per direction; cross-direction concurrency is unconstrained.
//! Each loop is a `tokio::select!` over a shutdown token, an interval,
//! and a per-direction "force" `Notify` an operator action can fire for
//! an immediate out-of-band cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::db::{SyncStateRepository, TrackRepository};
use crate::metrics::MetricsCollector;
use crate::models::Direction;
use crate::workers::DirectionWorker;

/// How often the catalog-wide gauges (`get_counts`/`get_stats`) are
/// refreshed, independent of any one direction's cycle interval.
const GAUGE_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// One entry per direction: its worker, its cycle interval, and a `Notify`
/// an operator action can fire to run the cycle immediately.
pub struct DirectionHandle {
    pub worker: Arc<dyn DirectionWorker>,
    pub interval: Duration,
    pub force: Arc<Notify>,
}

pub struct Scheduler {
    handles: HashMap<Direction, DirectionHandle>,
    tracks: TrackRepository,
    state: SyncStateRepository,
    metrics: Arc<MetricsCollector>,
    shutdown: CancellationToken,
    started_at: Instant,
}

impl Scheduler {
    pub fn new(
        handles: HashMap<Direction, DirectionHandle>,
        tracks: TrackRepository,
        state: SyncStateRepository,
        metrics: Arc<MetricsCollector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handles,
            tracks,
            state,
            metrics,
            shutdown,
            started_at: Instant::now(),
        }
    }

    /// Forces an immediate cycle for `direction`, without waiting for its
    /// interval to elapse.
    pub fn force(&self, direction: Direction) {
        if let Some(handle) = self.handles.get(&direction) {
            handle.force.notify_one();
        }
    }

    /// Spawns one supervised loop per direction plus the gauge refresher;
    /// returns when every loop has exited, which only happens after
    /// `shutdown` fires.
    pub async fn run(self) {
        let Scheduler {
            handles,
            tracks,
            state,
            metrics,
            shutdown,
            started_at,
        } = self;

        let mut tasks = Vec::new();
        for (direction, handle) in handles {
            let shutdown = shutdown.clone();
            let metrics = metrics.clone();
            let state = state.clone();
            tasks.push(tokio::spawn(run_direction_loop(
                direction, handle, shutdown, metrics, state,
            )));
        }
        tasks.push(tokio::spawn(run_gauge_refresh_loop(
            tracks,
            metrics,
            shutdown,
            started_at,
        )));

        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn run_gauge_refresh_loop(
    tracks: TrackRepository,
    metrics: Arc<MetricsCollector>,
    shutdown: CancellationToken,
    started_at: Instant,
) {
    loop {
        match (tracks.get_counts().await, tracks.get_stats().await) {
            (Ok(counts), Ok(stats)) => {
                metrics.refresh_catalog_gauges(&counts, &stats, started_at.elapsed());
            }
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(error = %err, "failed to refresh catalog gauges");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(GAUGE_REFRESH_INTERVAL) => {}
        }
    }
}

/// One direction's cooperative loop: execute a cycle, then wait for the
/// first of {shutdown, force, interval-elapsed}; cancel the others,
/// clear `force` if that's why we woke, and repeat.
async fn run_direction_loop(
    direction: Direction,
    handle: DirectionHandle,
    shutdown: CancellationToken,
    metrics: Arc<MetricsCollector>,
    state: SyncStateRepository,
) {
    loop {
        let start = Instant::now();
        match handle.worker.run_cycle().await {
            Ok(processed) => {
                metrics.record_cycle(direction, processed, start.elapsed());
                let key = format!("last_{}_sync", direction.as_str());
                let _ = state.set(&key, &chrono::Utc::now().timestamp().to_string()).await;
            }
            Err(err) => {
                tracing::warn!(direction = %direction, error = %err, "sync cycle failed");
                metrics.record_error(direction, "cycle_failed");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = handle.force.notified() => {}
            _ = tokio::time::sleep(handle.interval) => {}
        }

        if shutdown.is_cancelled() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWorker {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DirectionWorker for CountingWorker {
        async fn run_cycle(&self) -> anyhow::Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    async fn state() -> SyncStateRepository {
        SyncStateRepository::new(crate::db::test_helpers::prepare_db().await)
    }

    #[tokio::test]
    async fn force_triggers_a_cycle_without_waiting_for_the_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = DirectionHandle {
            worker: Arc::new(CountingWorker { calls: calls.clone() }),
            interval: Duration::from_secs(3600),
            force: Arc::new(Notify::new()),
        };
        let force = handle.force.clone();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run_direction_loop(
            Direction::TgToYt,
            handle,
            shutdown.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
            state().await,
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "first cycle runs immediately on start");

        force.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2, "force wakes the loop before the interval elapses");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop_without_waiting_for_the_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = DirectionHandle {
            worker: Arc::new(CountingWorker { calls: calls.clone() }),
            interval: Duration::from_secs(3600),
            force: Arc::new(Notify::new()),
        };
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run_direction_loop(
            Direction::YtToTg,
            handle,
            shutdown.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
            state().await,
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn elapsed_interval_runs_a_second_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = DirectionHandle {
            worker: Arc::new(CountingWorker { calls: calls.clone() }),
            interval: Duration::from_millis(5),
            force: Arc::new(Notify::new()),
        };
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run_direction_loop(
            Direction::TgToSp,
            handle,
            shutdown.clone(),
            Arc::new(MetricsCollector::new().unwrap()),
            state().await,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2, "the interval should have elapsed at least once");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn force_on_unknown_direction_is_a_no_op() {
        let scheduler = Scheduler::new(
            HashMap::new(),
            TrackRepository::new(crate::db::test_helpers::prepare_db().await),
            state().await,
            Arc::new(MetricsCollector::new().unwrap()),
            CancellationToken::new(),
        );
        scheduler.force(Direction::SpToYt);
    }
}
