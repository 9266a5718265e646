//! Periodic DNS refresh of target groups.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::resolver::{ResolveError, Resolver};
use super::target::{PingTarget, Reconciliation};
use crate::engine::ProbeEngine;

/// Default bound on a single hostname resolution (5 seconds).
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default refresh interval (1 minute).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler failure reported by `tokio-cron-scheduler`.
#[derive(Debug, Error)]
#[error("scheduler error: {0}")]
pub struct SchedulerError(String);

/// Summary of one refresh pass over a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Targets whose resolution succeeded.
    pub refreshed: usize,
    /// Targets whose resolution failed or timed out.
    pub failed: usize,
    /// Addresses registered with the engine.
    pub added: usize,
    /// Addresses unregistered from the engine.
    pub removed: usize,
}

impl RefreshReport {
    fn record(&mut self, result: &Reconciliation) {
        self.refreshed += 1;
        self.added += result.added.len();
        self.removed += result.removed.len();
    }
}

/// Hostnames sharing one probing engine and refresh schedule.
pub struct TargetGroup {
    name: String,
    targets: Vec<Arc<Mutex<PingTarget>>>,
    engine: Arc<dyn ProbeEngine>,
    resolver: Arc<dyn Resolver>,
    refresh_interval: Duration,
    resolve_timeout: Duration,
}

impl TargetGroup {
    /// Create a group; target `i` gets an initial registration delay of `i * 10ms`.
    pub fn new(
        name: impl Into<String>,
        hosts: &[String],
        sources: (Option<IpAddr>, Option<IpAddr>),
        engine: Arc<dyn ProbeEngine>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let (source_v4, source_v6) = sources;
        let targets = hosts
            .iter()
            .enumerate()
            .map(|(i, host)| {
                let target = PingTarget::new(host.clone(), i).with_sources(source_v4, source_v6);
                Arc::new(Mutex::new(target))
            })
            .collect();

        Self {
            name: name.into(),
            targets,
            engine,
            resolver,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// Set the refresh interval; zero disables periodic refresh.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the bound on each hostname resolution.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Registered addresses per hostname, in configuration order.
    pub async fn snapshot(&self) -> Vec<(String, BTreeSet<IpAddr>)> {
        let mut snapshot = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let target = target.lock().await;
            snapshot.push((target.host().to_string(), target.addresses().clone()));
        }
        snapshot
    }

    /// First registration of every target, each delayed by its stagger.
    pub async fn register_initial(&self) -> RefreshReport {
        self.run(true).await
    }

    /// Re-resolve every target concurrently and reconcile the engine.
    pub async fn refresh(&self) -> RefreshReport {
        self.run(false).await
    }

    async fn run(&self, staggered: bool) -> RefreshReport {
        let mut tasks = JoinSet::new();
        for target in &self.targets {
            tasks.spawn(refresh_target(
                Arc::clone(target),
                Arc::clone(&self.engine),
                Arc::clone(&self.resolver),
                self.resolve_timeout,
                staggered,
            ));
        }

        let mut report = RefreshReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(result)) => report.record(&result),
                Ok(Err(e)) => {
                    tracing::error!(group = %self.name, error = %e, "Could not refresh DNS");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(group = %self.name, error = %e, "Refresh task failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for TargetGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetGroup")
            .field("name", &self.name)
            .field("targets", &self.targets.len())
            .field("refresh_interval", &self.refresh_interval)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

/// Resolve one target and reconcile it. On failure the registered set is kept.
async fn refresh_target(
    target: Arc<Mutex<PingTarget>>,
    engine: Arc<dyn ProbeEngine>,
    resolver: Arc<dyn Resolver>,
    resolve_timeout: Duration,
    staggered: bool,
) -> Result<Reconciliation, ResolveError> {
    let mut target = target.lock().await;
    if staggered && !target.delay().is_zero() {
        tokio::time::sleep(target.delay()).await;
    }

    let host = target.host().to_string();
    let resolved = tokio::time::timeout(resolve_timeout, resolver.resolve(&host))
        .await
        .map_err(|_| ResolveError::Timeout(host.clone(), resolve_timeout))??;

    Ok(target.reconcile(resolved, engine.as_ref()))
}

/// Metadata about a registered refresh job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    /// Job UUID.
    pub id: uuid::Uuid,
    /// Target group name.
    pub group: String,
    /// Refresh interval.
    pub interval: Duration,
    /// Number of hostnames in the group.
    pub targets: usize,
}

/// Runs one repeated refresh job per target group.
pub struct RefreshScheduler {
    scheduler: JobScheduler,
    jobs: Arc<RwLock<HashMap<uuid::Uuid, JobInfo>>>,
}

impl RefreshScheduler {
    pub async fn new() -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError(e.to_string()))?;

        Ok(Self {
            scheduler,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Register the refresh job of a group.
    ///
    /// Returns `None` without registering anything when the group's refresh
    /// interval is zero (its addresses stay as resolved at startup) or when it
    /// has no targets.
    pub async fn spawn(
        &self,
        group: Arc<TargetGroup>,
    ) -> Result<Option<uuid::Uuid>, SchedulerError> {
        let interval = group.refresh_interval();
        if interval.is_zero() {
            tracing::info!(group = %group.name(), "DNS refresh disabled");
            return Ok(None);
        }
        if group.is_empty() {
            tracing::warn!(group = %group.name(), "No targets to refresh");
            return Ok(None);
        }

        let info = JobInfo {
            id: uuid::Uuid::nil(),
            group: group.name().to_string(),
            interval,
            targets: group.len(),
        };

        let job = Job::new_repeated_async(interval, move |_: uuid::Uuid, _: JobScheduler| {
            let group = Arc::clone(&group);
            Box::pin(async move { run_refresh(&group).await })
                as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        })
        .map_err(|e| SchedulerError(e.to_string()))?;

        let job_id = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError(e.to_string()))?;

        tracing::info!(group = %info.group, job_id = %job_id, interval = ?interval, "DNS refresh registered");
        self.jobs
            .write()
            .await
            .insert(job_id, JobInfo { id: job_id, ..info });
        Ok(Some(job_id))
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError(e.to_string()))?;
        tracing::info!("Refresh scheduler started");
        Ok(())
    }

    /// List all registered jobs.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Gracefully shutdown the scheduler with default timeout.
    pub async fn shutdown(self) -> Result<(), SchedulerError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Shutdown with custom timeout.
    pub async fn shutdown_with_timeout(mut self, timeout: Duration) -> Result<(), SchedulerError> {
        match tokio::time::timeout(timeout, self.scheduler.shutdown()).await {
            Ok(Ok(())) => {
                tracing::info!("Refresh scheduler shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => Err(SchedulerError(e.to_string())),
            Err(_) => {
                tracing::warn!("Refresh scheduler shutdown timed out");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<String> = self
            .jobs
            .try_read()
            .map(|jobs| jobs.values().map(|job| job.group.clone()).collect())
            .unwrap_or_default();
        f.debug_struct("RefreshScheduler")
            .field("groups", &groups)
            .finish_non_exhaustive()
    }
}

/// Execute one refresh tick for a group and log the outcome.
async fn run_refresh(group: &TargetGroup) {
    let start = std::time::Instant::now();
    tracing::info!(group = %group.name(), "Refreshing DNS");

    let report = group.refresh().await;
    tracing::debug!(
        group = %group.name(),
        refreshed = report.refreshed,
        failed = report.failed,
        added = report.added,
        removed = report.removed,
        duration_ms = start.elapsed().as_millis(),
        "DNS refresh finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TargetId;
    use crate::engine::testing::{Call, FakeEngine};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Answer {
        Addresses(Vec<&'static str>),
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct FakeResolver {
        answers: StdMutex<HashMap<String, Answer>>,
        lookups: AtomicUsize,
    }

    impl FakeResolver {
        fn set(&self, host: &str, answer: Answer) {
            self.answers
                .lock()
                .unwrap()
                .insert(host.to_string(), answer);
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Resolver for FakeResolver {
        async fn resolve(&self, host: &str) -> Result<BTreeSet<IpAddr>, ResolveError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let answer = self.answers.lock().unwrap().get(host).cloned();
            match answer {
                Some(Answer::Addresses(ips)) => {
                    Ok(ips.into_iter().map(|ip| ip.parse().unwrap()).collect())
                }
                Some(Answer::Hang) => std::future::pending().await,
                Some(Answer::Fail) | None => Err(ResolveError::NoAddresses(host.to_string())),
            }
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn group(
        names: &[&str],
        engine: &Arc<FakeEngine>,
        resolver: &Arc<FakeResolver>,
    ) -> TargetGroup {
        TargetGroup::new(
            "test",
            &hosts(names),
            (Some(ip("0.0.0.0")), Some(ip("::"))),
            Arc::clone(engine) as Arc<dyn ProbeEngine>,
            Arc::clone(resolver) as Arc<dyn Resolver>,
        )
    }

    fn addresses(list: &[&str]) -> BTreeSet<IpAddr> {
        list.iter().map(|s| ip(s)).collect()
    }

    #[tokio::test]
    async fn test_refresh_reconciles_changed_addresses() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        resolver.set("x.example", Answer::Addresses(vec!["10.0.0.1", "10.0.0.2"]));
        let group = group(&["x.example"], &engine, &resolver);

        let report = group.register_initial().await;
        assert_eq!(report.added, 2);
        let before = engine.calls().len();

        resolver.set("x.example", Answer::Addresses(vec!["10.0.0.2", "10.0.0.3"]));
        let report = group.refresh().await;

        let source = ip("0.0.0.0");
        assert_eq!(
            engine.calls()[before..],
            [
                Call::Remove(TargetId::new("x.example", ip("10.0.0.1"), source)),
                Call::Add(TargetId::new("x.example", ip("10.0.0.3"), source)),
            ]
        );
        assert_eq!(
            report,
            RefreshReport {
                refreshed: 1,
                failed: 0,
                added: 1,
                removed: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_failed_resolution_is_isolated() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        resolver.set("x.example", Answer::Addresses(vec!["10.0.0.1"]));
        resolver.set("y.example", Answer::Addresses(vec!["10.0.1.1"]));
        resolver.set("z.example", Answer::Addresses(vec!["10.0.2.1"]));
        let group = group(&["x.example", "y.example", "z.example"], &engine, &resolver);
        group.register_initial().await;

        resolver.set("x.example", Answer::Fail);
        resolver.set("y.example", Answer::Addresses(vec!["10.0.1.2"]));
        resolver.set("z.example", Answer::Addresses(vec!["10.0.2.2"]));
        let report = group.refresh().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.refreshed, 2);
        assert_eq!(
            group.snapshot().await,
            vec![
                ("x.example".to_string(), addresses(&["10.0.0.1"])),
                ("y.example".to_string(), addresses(&["10.0.1.2"])),
                ("z.example".to_string(), addresses(&["10.0.2.2"])),
            ]
        );
        assert!(
            !engine
                .calls()
                .iter()
                .any(|call| matches!(call, Call::Remove(id) if id.target == "x.example"))
        );
    }

    #[tokio::test]
    async fn test_hung_resolution_times_out() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        resolver.set("slow.example", Answer::Addresses(vec!["10.0.0.1"]));
        resolver.set("fast.example", Answer::Addresses(vec!["10.0.1.1"]));
        let group = group(&["slow.example", "fast.example"], &engine, &resolver)
            .with_resolve_timeout(Duration::from_millis(50));
        group.register_initial().await;

        resolver.set("slow.example", Answer::Hang);
        resolver.set("fast.example", Answer::Addresses(vec!["10.0.1.2"]));
        let report = group.refresh().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.refreshed, 1);
        let snapshot = group.snapshot().await;
        assert_eq!(snapshot[0].1, addresses(&["10.0.0.1"]));
        assert_eq!(snapshot[1].1, addresses(&["10.0.1.2"]));
    }

    #[tokio::test]
    async fn test_initial_registration_is_staggered() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        resolver.set("a", Answer::Addresses(vec!["10.0.0.1"]));
        resolver.set("b", Answer::Addresses(vec!["10.0.0.2"]));
        resolver.set("c", Answer::Addresses(vec!["10.0.0.3"]));
        resolver.set("d", Answer::Addresses(vec!["10.0.0.4"]));
        let group = group(&["a", "b", "c", "d"], &engine, &resolver);

        let start = std::time::Instant::now();
        let report = group.register_initial().await;

        // the last target waits 3 * 10ms before registering
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(report.added, 4);
        assert_eq!(engine.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_is_not_staggered() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        let names: Vec<String> = (0..50).map(|i| format!("host-{i}")).collect();
        for name in &names {
            resolver.set(name, Answer::Fail);
        }
        let group = TargetGroup::new(
            "wide",
            &names,
            (Some(ip("0.0.0.0")), None),
            engine as Arc<dyn ProbeEngine>,
            resolver as Arc<dyn Resolver>,
        );

        let start = std::time::Instant::now();
        let report = group.refresh().await;

        assert_eq!(report.failed, 50);
        assert!(start.elapsed() < Duration::from_millis(490));
    }

    #[tokio::test]
    async fn test_spawn_with_zero_interval_is_disabled() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        let group = Arc::new(
            group(&["a.example"], &engine, &resolver).with_refresh_interval(Duration::ZERO),
        );
        let scheduler = RefreshScheduler::new().await.unwrap();

        let job = scheduler.spawn(group).await.unwrap();

        assert!(job.is_none());
        assert_eq!(scheduler.job_count().await, 0);
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_lifecycle() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        let group = Arc::new(
            group(&["a.example", "b.example"], &engine, &resolver)
                .with_refresh_interval(Duration::from_secs(60)),
        );
        let scheduler = RefreshScheduler::new().await.unwrap();

        let job_id = scheduler.spawn(group).await.unwrap().unwrap();
        assert_eq!(scheduler.job_count().await, 1);

        let jobs = scheduler.list_jobs().await;
        assert_eq!(jobs[0].id, job_id);
        assert_eq!(jobs[0].group, "test");
        assert_eq!(jobs[0].targets, 2);
        assert_eq!(jobs[0].interval, Duration::from_secs(60));

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_empty_group_is_skipped() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        let group = Arc::new(group(&[], &engine, &resolver));
        let scheduler = RefreshScheduler::new().await.unwrap();

        assert!(scheduler.spawn(group).await.unwrap().is_none());
        assert_eq!(scheduler.job_count().await, 0);
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_started_scheduler_refreshes_on_every_tick() {
        let engine = Arc::new(FakeEngine::default());
        let resolver = Arc::new(FakeResolver::default());
        resolver.set("a.example", Answer::Addresses(vec!["10.0.0.1"]));
        let group = Arc::new(
            group(&["a.example"], &engine, &resolver)
                .with_refresh_interval(Duration::from_secs(1)),
        );
        group.register_initial().await;
        assert_eq!(resolver.lookups(), 1);

        resolver.set("a.example", Answer::Addresses(vec!["10.0.0.2"]));
        let scheduler = RefreshScheduler::new().await.unwrap();
        scheduler.spawn(Arc::clone(&group)).await.unwrap();
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(resolver.lookups() >= 2, "lookups: {}", resolver.lookups());
        let source = ip("0.0.0.0");
        let calls = engine.calls();
        assert!(calls.contains(&Call::Remove(TargetId::new("a.example", ip("10.0.0.1"), source))));
        assert!(calls.contains(&Call::Add(TargetId::new("a.example", ip("10.0.0.2"), source))));
        assert_eq!(
            group.snapshot().await,
            vec![("a.example".to_string(), addresses(&["10.0.0.2"]))]
        );

        scheduler.shutdown().await.unwrap();
    }
}
