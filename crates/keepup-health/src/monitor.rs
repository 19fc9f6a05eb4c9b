//! Prober — owns the target set and runs the periodic check cycle.
//!
//! External callers add, remove, reorder and list targets; the background
//! loop probes every live target once per interval with bounded
//! concurrency and folds each result into the store as it completes.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use keepup_core::{ProberSettings, ShutdownPolicy};
use keepup_state::*;

use crate::checker::{HttpChecker, normalize_url};
use crate::error::ProberResult;

/// Outcome of one call to [`Prober::run_cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    /// Another cycle was still running; nothing was probed.
    Skipped,
    Completed {
        probed: usize,
        up: usize,
        down: usize,
        /// Probe tasks that panicked or were cancelled.
        failed_tasks: usize,
    },
}

/// Health-check polling core.
///
/// `Clone` shares the same store, HTTP client and cycle gate.
#[derive(Clone)]
pub struct Prober {
    store: TargetStore,
    checker: HttpChecker,
    settings: ProberSettings,
    /// Caps in-flight probes within a cycle.
    permits: Arc<Semaphore>,
    /// Held for the duration of a cycle; a second cycle skips instead of waiting.
    cycle_gate: Arc<Mutex<()>>,
}

impl Prober {
    pub fn new(settings: ProberSettings) -> ProberResult<Self> {
        let checker = HttpChecker::new(&settings)?;
        Ok(Self {
            store: TargetStore::new(settings.history_capacity),
            checker,
            permits: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            cycle_gate: Arc::new(Mutex::new(())),
            settings,
        })
    }

    pub fn settings(&self) -> &ProberSettings {
        &self.settings
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &TargetStore {
        &self.store
    }

    /// Validate `url`, probe it once, and add it to the live set.
    ///
    /// The returned target already carries the result of that first probe,
    /// so its status is never `Unknown`.
    pub async fn add_target(&self, url: &str) -> ProberResult<Target> {
        let url = normalize_url(url)?;
        info!(%url, "probing new target");
        let first = self.checker.probe(&url).await;
        let target = self.store.insert_probed(url, &first);
        info!(
            target_id = target.id,
            url = %target.url,
            status = %target.status,
            order = target.order,
            "target added"
        );
        Ok(target)
    }

    /// Remove a target. Unknown ids are a no-op; returns whether one was removed.
    pub fn remove_target(&self, id: TargetId) -> bool {
        let removed = self.store.remove(id);
        if removed {
            info!(target_id = id, "target removed");
        }
        removed
    }

    /// Apply new display orders. Returns how many targets were updated.
    pub fn reorder_targets(&self, updates: &[OrderUpdate]) -> usize {
        self.store.reorder(updates)
    }

    /// All live targets, ascending by order.
    pub fn list_targets(&self) -> Vec<Target> {
        self.store.list()
    }

    pub fn get_target(&self, id: TargetId) -> Option<Target> {
        self.store.get(id)
    }

    pub fn target_count(&self) -> usize {
        self.store.len()
    }

    /// Probe a target once without recording the result.
    pub async fn probe_once(&self, target: &Target) -> ProbeResult {
        self.checker.probe(&target.url).await
    }

    /// Probe every live target once.
    ///
    /// Returns [`CycleReport::Skipped`] immediately if another cycle is
    /// still in progress. Each result is applied as soon as its probe
    /// finishes; targets removed mid-cycle are ignored.
    pub async fn run_cycle(&self) -> CycleReport {
        let checker = self.checker.clone();
        self.cycle_with(move |url| {
            let checker = checker.clone();
            async move { checker.probe(&url).await }
        })
        .await
    }

    /// One cycle with `probe` as the per-target check.
    async fn cycle_with<P, Fut>(&self, probe: P) -> CycleReport
    where
        P: Fn(String) -> Fut,
        Fut: Future<Output = ProbeResult> + Send + 'static,
    {
        let Ok(_gate) = self.cycle_gate.try_lock() else {
            warn!("previous probe cycle still running, skipping");
            return CycleReport::Skipped;
        };

        let started = Instant::now();
        let mut tasks = JoinSet::new();
        for (id, url) in self.store.probe_set() {
            let check = probe(url.clone());
            let store = self.store.clone();
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let result = check.await;
                if let Some(applied) = store.apply_probe(id, &result) {
                    log_transition(&applied, &url, &result);
                } else {
                    debug!(target_id = id, %url, "target removed during probe, result dropped");
                }
                result.status
            });
        }

        let (mut probed, mut up, mut down, mut failed_tasks) = (0, 0, 0, 0);
        while let Some(joined) = tasks.join_next().await {
            probed += 1;
            match joined {
                Ok(TargetStatus::Up) => up += 1,
                Ok(_) => down += 1,
                Err(e) => {
                    failed_tasks += 1;
                    error!(error = %e, "probe task failed");
                }
            }
        }

        let report = CycleReport::Completed {
            probed,
            up,
            down,
            failed_tasks,
        };
        debug!(
            probed,
            up,
            down,
            failed_tasks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "probe cycle completed"
        );
        report
    }

    /// Spawn the background loop on the current runtime.
    pub fn spawn(
        &self,
        shutdown: watch::Receiver<bool>,
        policy: ShutdownPolicy,
    ) -> JoinHandle<()> {
        let prober = self.clone();
        tokio::spawn(async move { prober.run(shutdown, policy).await })
    }

    /// Run a cycle every `interval` until `shutdown` fires.
    ///
    /// The first cycle runs one interval after start. A tick that lands
    /// while the previous cycle is still running is skipped. On shutdown
    /// the timer stops first, then the in-flight cycle (if any) is settled
    /// according to `policy`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, policy: ShutdownPolicy) {
        let interval = self.settings.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = interval.as_millis() as u64,
            timeout_ms = self.settings.timeout.as_millis() as u64,
            max_concurrency = self.settings.max_concurrency,
            "prober started"
        );

        let mut in_flight: Option<JoinHandle<CycleReport>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                        warn!("probe cycle overran the interval, skipping tick");
                        continue;
                    }
                    let prober = self.clone();
                    in_flight = Some(tokio::spawn(async move { prober.run_cycle().await }));
                }
                _ = shutdown.changed() => {
                    debug!("prober received shutdown signal");
                    break;
                }
            }
        }

        if let Some(handle) = in_flight.filter(|h| !h.is_finished()) {
            settle_in_flight(handle, policy).await;
        }

        info!("prober stopped");
    }
}

async fn settle_in_flight(handle: JoinHandle<CycleReport>, policy: ShutdownPolicy) {
    match policy {
        ShutdownPolicy::Abandon => {
            handle.abort();
            info!("in-flight probe cycle abandoned");
        }
        ShutdownPolicy::Drain { grace } => {
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(report)) => info!(?report, "in-flight probe cycle drained"),
                Ok(Err(e)) => error!(error = %e, "in-flight probe cycle failed"),
                Err(_) => {
                    abort.abort();
                    warn!(
                        grace_ms = grace.as_millis() as u64,
                        "grace period elapsed, in-flight probe cycle aborted"
                    );
                }
            }
        }
    }
}

fn log_transition(applied: &ProbeApplied, url: &str, result: &ProbeResult) {
    if !applied.changed() {
        debug!(target_id = applied.id, %url, status = %applied.current, "target status unchanged");
        return;
    }
    match applied.current {
        TargetStatus::Down => warn!(
            target_id = applied.id,
            %url,
            from = %applied.previous,
            error = result.error.as_deref().unwrap_or_default(),
            "target went down"
        ),
        _ => info!(
            target_id = applied.id,
            %url,
            from = %applied.previous,
            response_time_ms = result.response_time_ms,
            "target is up"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> ProberSettings {
        ProberSettings {
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(2),
            ..ProberSettings::default()
        }
    }

    async fn server_with_delay(status: u16, delay: Duration) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status).set_delay(delay))
            .mount(&server)
            .await;
        server
    }

    async fn healthy_server() -> MockServer {
        server_with_delay(200, Duration::ZERO).await
    }

    #[tokio::test]
    async fn add_target_probes_before_returning() {
        let server = healthy_server().await;
        let prober = Prober::new(settings()).unwrap();

        let target = prober.add_target(&server.uri()).await.unwrap();
        assert_eq!(target.status, TargetStatus::Up);
        assert!(target.last_checked_at.is_some());
        assert!(target.last_response_time_ms.is_some());
        assert_eq!(target.history.len(), 1);
        assert_eq!(target.order, 0);
        assert_eq!(prober.target_count(), 1);
    }

    #[tokio::test]
    async fn add_bare_host_is_prefixed_and_never_unknown() {
        let prober = Prober::new(ProberSettings {
            timeout: Duration::from_secs(2),
            ..ProberSettings::default()
        })
        .unwrap();

        // Up or down depending on network access; never unknown.
        let target = prober.add_target("example.com").await.unwrap();
        assert_eq!(target.url, "https://example.com");
        assert!(target.last_checked_at.is_some());
        assert_ne!(target.status, TargetStatus::Unknown);
    }

    #[tokio::test]
    async fn add_invalid_url_creates_nothing() {
        let prober = Prober::new(settings()).unwrap();
        let err = prober.add_target("ftp://example.com").await.unwrap_err();
        assert!(matches!(err, crate::ProberError::InvalidUrl { .. }));
        assert_eq!(prober.target_count(), 0);
    }

    #[tokio::test]
    async fn add_assigns_order_by_count() {
        let server = healthy_server().await;
        let prober = Prober::new(settings()).unwrap();
        let first = prober.add_target(&server.uri()).await.unwrap();
        let second = prober.add_target(&format!("{}/second", server.uri())).await.unwrap();
        assert_eq!(first.order, 0);
        assert_eq!(second.order, 1);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn reorder_and_remove_through_prober() {
        let server = healthy_server().await;
        let prober = Prober::new(settings()).unwrap();
        let t1 = prober.add_target(&server.uri()).await.unwrap();
        let t2 = prober.add_target(&format!("{}/two", server.uri())).await.unwrap();

        prober.reorder_targets(&[
            OrderUpdate { id: t2.id, order: 0 },
            OrderUpdate { id: t1.id, order: 1 },
        ]);
        let ids: Vec<_> = prober.list_targets().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![t2.id, t1.id]);

        assert!(!prober.remove_target(999));
        assert_eq!(prober.target_count(), 2);
        assert!(prober.remove_target(t1.id));
        assert!(!prober.remove_target(t1.id));
        assert_eq!(prober.list_targets().len(), 1);
    }

    #[tokio::test]
    async fn probe_once_does_not_record() {
        let server = healthy_server().await;
        let prober = Prober::new(settings()).unwrap();
        let target = prober.store().insert(server.uri());

        let result = prober.probe_once(&target).await;
        assert!(result.is_up());
        let stored = prober.get_target(target.id).unwrap();
        assert_eq!(stored.status, TargetStatus::Unknown);
        assert!(stored.history.is_empty());
    }

    #[tokio::test]
    async fn cycle_history_grows_then_caps_at_ten() {
        let server = healthy_server().await;
        let prober = Prober::new(settings()).unwrap();
        let target = prober.store().insert(server.uri());

        for _ in 0..3 {
            prober.run_cycle().await;
        }
        assert_eq!(prober.get_target(target.id).unwrap().history.len(), 3);

        for _ in 0..9 {
            prober.run_cycle().await;
        }
        let target = prober.get_target(target.id).unwrap();
        assert_eq!(target.history.len(), 10);
        let stamps: Vec<_> = target.history.iter().map(|e| e.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(target.last_checked_at, Some(stamps[0]));
    }

    #[tokio::test]
    async fn one_failing_target_does_not_affect_others() {
        let healthy = healthy_server().await;
        let prober = Prober::new(settings()).unwrap();
        let good = prober.store().insert(healthy.uri());
        let bad = prober.store().insert("http://127.0.0.1:1/".to_string());

        let report = prober.run_cycle().await;
        assert_eq!(
            report,
            CycleReport::Completed {
                probed: 2,
                up: 1,
                down: 1,
                failed_tasks: 0
            }
        );

        let good = prober.get_target(good.id).unwrap();
        let bad = prober.get_target(bad.id).unwrap();
        assert_eq!(good.status, TargetStatus::Up);
        assert_eq!(bad.status, TargetStatus::Down);
        assert!(bad.last_error.is_some());
        assert!(bad.last_response_time_ms.is_none());
    }

    #[tokio::test]
    async fn panicking_task_is_counted_and_cycle_continues() {
        let prober = Prober::new(settings()).unwrap();
        let first = prober.store().insert("https://first.example/".to_string());
        let broken = prober.store().insert("https://broken.example/".to_string());
        let last = prober.store().insert("https://last.example/".to_string());

        let report = prober
            .cycle_with(|url| async move {
                if url.contains("broken") {
                    panic!("check crashed");
                }
                ProbeResult::up(3)
            })
            .await;
        assert_eq!(
            report,
            CycleReport::Completed {
                probed: 3,
                up: 2,
                down: 0,
                failed_tasks: 1
            }
        );

        assert_eq!(prober.get_target(first.id).unwrap().status, TargetStatus::Up);
        assert_eq!(prober.get_target(last.id).unwrap().status, TargetStatus::Up);
        let broken_after = prober.get_target(broken.id).unwrap();
        assert_eq!(broken_after.status, TargetStatus::Unknown);
        assert!(broken_after.history.is_empty());

        // The gate was released; the next cycle runs normally.
        let report = prober.cycle_with(|_| async { ProbeResult::down("refused") }).await;
        assert!(matches!(
            report,
            CycleReport::Completed { probed: 3, down: 3, failed_tasks: 0, .. }
        ));
        assert_eq!(prober.get_target(broken.id).unwrap().status, TargetStatus::Down);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn list_snapshots_stay_consistent_during_cycle() {
        let prober = Prober::new(settings()).unwrap();
        for i in 0..20u64 {
            prober.store().insert(format!("https://t{i}.example/"));
        }

        let cycle = {
            let prober = prober.clone();
            tokio::spawn(async move {
                prober
                    .cycle_with(|url| async move {
                        let n: u64 = url
                            .trim_start_matches("https://t")
                            .split('.')
                            .next()
                            .and_then(|n| n.parse().ok())
                            .unwrap();
                        tokio::time::sleep(Duration::from_millis(5 * n)).await;
                        if n % 2 == 0 {
                            ProbeResult::up(n)
                        } else {
                            ProbeResult::down("refused")
                        }
                    })
                    .await
            })
        };

        let mut saw_partial = false;
        while !cycle.is_finished() {
            let snapshot = prober.list_targets();
            assert_eq!(snapshot.len(), 20);
            let checked = snapshot.iter().filter(|t| t.last_checked_at.is_some()).count();
            if checked > 0 && checked < 20 {
                saw_partial = true;
            }
            for t in &snapshot {
                assert_eq!(t.last_checked_at, t.history.newest().map(|e| e.timestamp));
                assert_eq!(t.status == TargetStatus::Unknown, t.history.is_empty());
                match t.status {
                    TargetStatus::Up => {
                        assert!(t.last_response_time_ms.is_some() && t.last_error.is_none())
                    }
                    TargetStatus::Down => {
                        assert!(t.last_response_time_ms.is_none() && t.last_error.is_some())
                    }
                    TargetStatus::Unknown => {}
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(saw_partial, "never observed a snapshot mid-cycle");
        assert!(matches!(
            cycle.await.unwrap(),
            CycleReport::Completed { probed: 20, up: 10, down: 10, failed_tasks: 0 }
        ));
    }

    #[tokio::test]
    async fn status_flips_between_up_and_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let prober = Prober::new(settings()).unwrap();
        let target = prober.store().insert(server.uri());

        prober.run_cycle().await;
        let after_first = prober.get_target(target.id).unwrap();
        assert_eq!(after_first.status, TargetStatus::Down);
        assert!(after_first.last_error.unwrap().contains("500"));

        prober.run_cycle().await;
        let after_second = prober.get_target(target.id).unwrap();
        assert_eq!(after_second.status, TargetStatus::Up);
        assert!(after_second.last_error.is_none());
        assert!(after_second.last_checked_at >= after_first.last_checked_at);
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let slow = server_with_delay(200, Duration::from_millis(400)).await;
        let prober = Prober::new(settings()).unwrap();
        prober.store().insert(slow.uri());

        let running = {
            let prober = prober.clone();
            tokio::spawn(async move { prober.run_cycle().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(prober.run_cycle().await, CycleReport::Skipped);
        assert!(matches!(
            running.await.unwrap(),
            CycleReport::Completed { probed: 1, .. }
        ));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let slow = server_with_delay(200, Duration::from_millis(200)).await;
        let prober = Prober::new(ProberSettings {
            max_concurrency: 2,
            ..settings()
        })
        .unwrap();
        for i in 0..5 {
            prober.store().insert(format!("{}/{i}", slow.uri()));
        }

        let started = std::time::Instant::now();
        let report = prober.run_cycle().await;
        // Five 200ms probes, two at a time: at least three waves.
        assert!(started.elapsed() >= Duration::from_millis(550));
        assert!(matches!(report, CycleReport::Completed { probed: 5, up: 5, .. }));
    }

    #[tokio::test]
    async fn background_loop_probes_until_shutdown() {
        let server = healthy_server().await;
        let prober = Prober::new(settings()).unwrap();
        let target = prober.store().insert(server.uri());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = prober.spawn(shutdown_rx, ShutdownPolicy::default());

        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let checked = prober.get_target(target.id).unwrap().history.len();
        assert!(checked >= 2, "expected several cycles, got {checked}");

        // Timer is stopped: no further cycles after shutdown.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(prober.get_target(target.id).unwrap().history.len(), checked);
    }

    #[tokio::test]
    async fn drain_policy_finishes_in_flight_cycle() {
        let slow = server_with_delay(200, Duration::from_millis(300)).await;
        let prober = Prober::new(settings()).unwrap();
        let target = prober.store().insert(slow.uri());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = prober.spawn(
            shutdown_rx,
            ShutdownPolicy::Drain {
                grace: Duration::from_secs(2),
            },
        );

        // First tick at 50ms; its probe is still in flight at 120ms.
        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let target = prober.get_target(target.id).unwrap();
        assert_eq!(target.status, TargetStatus::Up);
        assert_eq!(target.history.len(), 1);
    }

    #[tokio::test]
    async fn drain_policy_aborts_after_grace() {
        let slow = server_with_delay(200, Duration::from_millis(1500)).await;
        let prober = Prober::new(settings()).unwrap();
        let target = prober.store().insert(slow.uri());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = prober.spawn(
            shutdown_rx,
            ShutdownPolicy::Drain {
                grace: Duration::from_millis(100),
            },
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        let stopping = std::time::Instant::now();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(stopping.elapsed() < Duration::from_millis(1000));

        tokio::time::sleep(Duration::from_millis(1700)).await;
        let target = prober.get_target(target.id).unwrap();
        assert_eq!(target.status, TargetStatus::Unknown);
        assert!(target.history.is_empty());
    }

    #[tokio::test]
    async fn abandon_policy_drops_in_flight_cycle() {
        let slow = server_with_delay(200, Duration::from_millis(300)).await;
        let prober = Prober::new(settings()).unwrap();
        let target = prober.store().insert(slow.uri());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = prober.spawn(shutdown_rx, ShutdownPolicy::Abandon);

        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // Well past the point the probe would have completed.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let target = prober.get_target(target.id).unwrap();
        assert_eq!(target.status, TargetStatus::Unknown);
        assert!(target.history.is_empty());
    }
}
