//! Run coordinator: the main orchestration loop
//!
//! This module handles:
//! - Loading the checkpoint and resuming queued tasks
//! - Seeding tasks from start URLs
//! - Running tasks concurrently, one surface per task
//! - Applying the retry policy of each failure
//! - Periodic and final checkpoint persistence

use crate::config::Config;
use crate::crawler::phases::{run_task, PhaseContext};
use crate::crawler::scheduler::Scheduler;
use crate::crawler::task::{seed_tasks, Task};
use crate::state::{EntityStore, Patch, SeedPatch, TaskState};
use crate::storage::{
    RunStatus, SharedStorage, Storage, TaskOutcomeRecord, CONFIG_KEY, QUEUE_KEY, TASKS_KEY,
};
use crate::surface::SurfacePool;
use crate::url::{normalize_output_url, url_label};
use crate::{Disposition, SweepError, TaskError, TaskResult};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Totals of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub completed: u64,
    pub soft_failed: u64,
    pub not_found: u64,
    pub dropped: u64,
    pub retried: u64,
    pub skipped: u64,
    /// Entities in the store at the end of the run
    pub entities: usize,
    pub elapsed: Duration,
}

fn lock(storage: &SharedStorage) -> MutexGuard<'_, dyn Storage + 'static> {
    match storage.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Main coordinator structure
pub struct Coordinator<P: SurfacePool + 'static> {
    config: Arc<Config>,
    context: Arc<PhaseContext>,
    storage: SharedStorage,
    store: Arc<EntityStore>,
    pool: Arc<P>,
    scheduler: Scheduler,
    /// Tasks handed to a worker and not handled yet, by worker id
    running: HashMap<Id, Task>,
    /// Resumed and seeded tasks, enqueued when the run starts
    initial: Vec<Task>,
    run_id: i64,
    report: CrawlReport,
}

impl<P: SurfacePool + 'static> Coordinator<P> {
    /// Creates a coordinator, resuming from the checkpoint unless `fresh`
    ///
    /// # Arguments
    ///
    /// * `config` - The run configuration
    /// * `config_hash` - Hash of the config file, stored with the checkpoint
    /// * `storage` - Checkpoint and outcome storage
    /// * `pool` - Source of rendering surfaces
    /// * `fresh` - Whether to discard the existing checkpoint
    ///
    /// # Errors
    ///
    /// [`SweepError::NoStartRequests`] if no start URL yields a task and
    /// nothing is left to resume.
    pub fn new(
        config: Config,
        config_hash: &str,
        storage: SharedStorage,
        pool: Arc<P>,
        fresh: bool,
    ) -> Result<Self, SweepError> {
        let context = PhaseContext::from_config(&config)?;

        let (completed, resumed, run_id) = {
            let mut guard = lock(&storage);

            if fresh {
                guard.clear()?;
                info!("Starting fresh, checkpoint cleared");
            }

            if let Some(Value::String(saved)) = guard.load(CONFIG_KEY)? {
                if saved != config_hash {
                    warn!("Configuration changed since the checkpoint was written");
                }
            }
            guard.save(CONFIG_KEY, &Value::String(config_hash.to_string()))?;

            let completed: Vec<String> = match guard.load(TASKS_KEY)? {
                Some(value) => serde_json::from_value(value)?,
                None => Vec::new(),
            };
            let resumed: Vec<Task> = match guard.load(QUEUE_KEY)? {
                Some(value) => serde_json::from_value(value)?,
                None => Vec::new(),
            };

            if let Some(previous) = guard.get_latest_run()? {
                if previous.status == RunStatus::Running {
                    warn!(run_id = previous.id, "Previous run did not finish");
                    guard.finish_run(previous.id, RunStatus::Interrupted)?;
                }
            }

            (completed, resumed, guard.create_run(config_hash)?)
        };

        if !completed.is_empty() || !resumed.is_empty() {
            info!(
                "Resuming: {} tasks completed, {} tasks pending",
                completed.len(),
                resumed.len()
            );
        }

        let store = Arc::new(EntityStore::open(storage.clone())?);
        let (seeds, skipped) = seed_tasks(&config.input.start_urls, &context.sections);

        if seeds.is_empty() && resumed.is_empty() {
            return Err(SweepError::NoStartRequests);
        }

        let mut coordinator = Self {
            config: Arc::new(config),
            context: Arc::new(context),
            storage,
            store,
            pool,
            scheduler: Scheduler::new(completed.into_iter().collect()),
            running: HashMap::new(),
            initial: resumed.into_iter().chain(seeds).collect(),
            run_id,
            report: CrawlReport::default(),
        };

        for url in &skipped {
            coordinator.record_skipped(url)?;
        }

        Ok(coordinator)
    }

    /// The entity store, for export after the run
    pub fn store(&self) -> Arc<EntityStore> {
        self.store.clone()
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Runs every task to completion
    ///
    /// Tasks are processed with at most `max-concurrency` in flight. The
    /// checkpoint is written every `persist-interval-secs` and once more at
    /// the end.
    pub async fn run(&mut self) -> Result<CrawlReport, SweepError> {
        info!(run_id = self.run_id, "Starting run");
        let started = Instant::now();

        for task in std::mem::take(&mut self.initial) {
            self.enqueue(task).await;
        }

        if let Err(e) = self.drive().await {
            error!(run_id = self.run_id, "Run failed: {}", e);
            self.persist()?;
            lock(&self.storage).finish_run(self.run_id, RunStatus::Failed)?;
            return Err(e);
        }

        self.persist()?;
        lock(&self.storage).finish_run(self.run_id, RunStatus::Completed)?;

        self.report.entities = self.store.len();
        self.report.elapsed = started.elapsed();

        info!(
            "Run completed: {} tasks done, {} soft-failed, {} not found, {} dropped, {} entities in {:?}",
            self.report.completed,
            self.report.soft_failed,
            self.report.not_found,
            self.report.dropped,
            self.report.entities,
            self.report.elapsed
        );

        Ok(self.report.clone())
    }

    async fn drive(&mut self) -> Result<(), SweepError> {
        let max_concurrency = self.config.crawler.max_concurrency.max(1) as usize;
        let period = Duration::from_secs(self.config.crawler.persist_interval_secs.max(1));
        let mut persist = interval_at(tokio::time::Instant::now() + period, period);
        persist.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut workers = JoinSet::new();

        loop {
            while workers.len() < max_concurrency {
                let Some(task) = self.scheduler.next() else {
                    break;
                };
                self.spawn(&mut workers, task);
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                Some(joined) = workers.join_next_with_id() => match joined {
                    Ok((id, result)) => {
                        if let Some(task) = self.running.remove(&id) {
                            self.handle(task, result).await?;
                        }
                    }
                    Err(e) => self.handle_join_error(e).await?,
                },
                _ = persist.tick() => self.persist()?,
            }
        }

        Ok(())
    }

    fn spawn(&mut self, workers: &mut JoinSet<TaskResult<Vec<Task>>>, task: Task) {
        debug!(url = %task.url, attempt = task.retries, "Dispatching task");

        let pool = self.pool.clone();
        let context = self.context.clone();
        let store = self.store.clone();
        let running = task.clone();

        let handle = workers.spawn(async move { process(&*pool, &context, &store, &task).await });
        self.running.insert(handle.id(), running);
    }

    /// Routes a worker that panicked or was cancelled through the retry policy
    async fn handle_join_error(&mut self, e: JoinError) -> Result<(), SweepError> {
        let Some(task) = self.running.remove(&e.id()) else {
            error!("Worker failed: {}", e);
            return Ok(());
        };

        let err = TaskError::WorkerPanicked {
            url: task.url.clone(),
            reason: e.to_string(),
        };
        self.handle(task, Err(err)).await
    }

    /// Queues a task; a newly queued home task also seeds its entity
    async fn enqueue(&mut self, task: Task) {
        let seed = if task.is_home() {
            Some(task.clone())
        } else {
            None
        };

        if !self.scheduler.push(task) {
            return;
        }

        if let Some(home) = seed {
            self.seed_entity(&home).await;
        }
    }

    async fn seed_entity(&self, home: &Task) {
        let entity = match home.entity_key() {
            Ok(entity) => entity,
            Err(e) => {
                warn!(url = %home.url, "Cannot seed entity: {}", e);
                return;
            }
        };

        let url = normalize_output_url(&home.url).unwrap_or_else(|_| home.url.clone());
        let seed = SeedPatch {
            url,
            source_url: home.url.clone(),
            referrer: home.referrer.clone().unwrap_or_default(),
            started_at: Utc::now(),
        };

        self.store.apply(&entity, Patch::Seed(seed)).await;
    }

    /// Applies the outcome of one task
    async fn handle(
        &mut self,
        mut task: Task,
        result: TaskResult<Vec<Task>>,
    ) -> Result<(), SweepError> {
        let key = task.key();

        let err = match result {
            Ok(discovered) => {
                self.scheduler.complete(&key);
                self.record(&task, TaskState::Completed, None)?;
                self.report.completed += 1;

                for child in discovered {
                    self.enqueue(child).await;
                }
                return Ok(());
            }
            Err(err) => err,
        };

        match err.disposition() {
            Disposition::SoftFail => {
                warn!(url = %task.url, namespace = err.namespace(), "{}", err);
                self.scheduler.complete(&key);
                self.record(&task, TaskState::SoftFailed, Some(err.to_string()))?;
                self.report.soft_failed += 1;
            }
            Disposition::Terminal => {
                info!(url = %task.url, namespace = err.namespace(), "{}", err);
                self.scheduler.complete(&key);
                self.record(&task, TaskState::NotFound, Some(err.to_string()))?;
                self.report.not_found += 1;
            }
            Disposition::Escalate | Disposition::Retry => {
                if task.retries < self.config.crawler.max_request_retries {
                    task.retries += 1;
                    warn!(
                        url = %task.url,
                        namespace = err.namespace(),
                        attempt = task.retries,
                        "{}",
                        err
                    );
                    self.record(&task, TaskState::Retrying, Some(err.to_string()))?;
                    self.report.retried += 1;
                    self.scheduler.retry(task);
                } else {
                    error!(
                        url = %task.url,
                        namespace = err.namespace(),
                        "Dropping task after {} retries: {}",
                        task.retries,
                        err
                    );
                    self.record(&task, TaskState::Dropped, Some(err.to_string()))?;
                    self.report.dropped += 1;
                }
            }
        }

        Ok(())
    }

    fn record(
        &self,
        task: &Task,
        state: TaskState,
        error_message: Option<String>,
    ) -> Result<(), SweepError> {
        let outcome = TaskOutcomeRecord {
            task_key: task.key(),
            url: task.url.clone(),
            label: task.label.to_string(),
            section: task.section.map(|s| s.to_string()),
            entity: task.entity.clone(),
            state,
            attempts: task.retries + 1,
            error_message,
            finished_at: Utc::now().to_rfc3339(),
        };

        lock(&self.storage).record_outcome(self.run_id, &outcome)?;
        Ok(())
    }

    fn record_skipped(&mut self, url: &str) -> Result<(), SweepError> {
        let label = url_label(url)
            .map(|label| label.to_string())
            .unwrap_or_else(|_| "UNKNOWN".to_string());

        let outcome = TaskOutcomeRecord {
            task_key: format!("{}:-:{}", label, url),
            url: url.to_string(),
            label,
            section: None,
            entity: None,
            state: TaskState::Skipped,
            attempts: 0,
            error_message: Some("Not an entity page or listing".to_string()),
            finished_at: Utc::now().to_rfc3339(),
        };

        lock(&self.storage).record_outcome(self.run_id, &outcome)?;
        self.report.skipped += 1;
        Ok(())
    }

    /// Writes entities, completed task keys and unfinished tasks
    fn persist(&self) -> Result<(), SweepError> {
        self.store.persist()?;

        let mut queue: Vec<Task> = self.running.values().cloned().collect();
        queue.extend(self.scheduler.pending());

        let completed = serde_json::to_value(self.scheduler.completed_keys())?;
        let pending = queue.len();
        let queue = serde_json::to_value(queue)?;

        let mut guard = lock(&self.storage);
        guard.save(TASKS_KEY, &completed)?;
        guard.save(QUEUE_KEY, &queue)?;

        debug!(pending, "Checkpoint written");
        Ok(())
    }
}

/// Runs one task on a surface of its own
///
/// The surface is retired when the failure points at its identity and
/// returned to the pool otherwise.
async fn process<P: SurfacePool>(
    pool: &P,
    context: &PhaseContext,
    store: &EntityStore,
    task: &Task,
) -> TaskResult<Vec<Task>> {
    let surface = pool.acquire().await?;
    let result = run_task(context, store, &surface, task).await;

    match &result {
        Err(e) if e.disposition() == Disposition::Escalate => {
            debug!(url = %task.url, "Retiring surface");
            pool.retire(surface).await;
        }
        _ => pool.release(surface).await,
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::extract::testing::StaticSurface;
    use crate::storage::{share, MemoryStorage, STATE_KEY};
    use crate::surface::{
        Closest, ElementData, NavigateOptions, NetworkResponse, PageMetrics, Surface,
        SurfaceError,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    const LISTING: &str = r#"<html><body>
        <div><a href="https://www.facebook.com/acme/" onmousedown="click_page_link()">Acme</a></div>
    </body></html>"#;

    /// Serves the same listing markup to every task; entity pages fail the layout check
    struct ListingPool {
        retired: AtomicUsize,
    }

    #[async_trait]
    impl SurfacePool for ListingPool {
        type Surface = StaticSurface;

        async fn acquire(&self) -> Result<StaticSurface, SurfaceError> {
            Ok(StaticSurface::new("https://www.facebook.com/", LISTING))
        }

        async fn release(&self, _surface: StaticSurface) {}

        async fn retire(&self, _surface: StaticSurface) {
            self.retired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(retries: u32) -> Config {
        parse_config(&format!(
            r#"
[crawler]
max-request-retries = {}

[input]
start-urls = ["https://www.facebook.com/biz/prague/", "https://www.facebook.com/acme/posts/1"]
sections = ["about"]

[output]
checkpoint-path = "checkpoint.db"
dataset-path = "dataset.jsonl"
"#,
            retries
        ))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_layout_failures_are_dropped_after_retries() {
        let storage = share(MemoryStorage::new());
        let pool = Arc::new(ListingPool {
            retired: AtomicUsize::new(0),
        });

        let mut coordinator =
            Coordinator::new(config(1), "hash", storage.clone(), pool.clone(), false).unwrap();
        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.skipped, 1);
        // home and about, each tried twice
        assert_eq!(report.retried, 2);
        assert_eq!(report.dropped, 2);
        assert_eq!(pool.retired.load(Ordering::SeqCst), 4);

        // seeded on discovery, but never exported without categories
        assert_eq!(report.entities, 1);
        assert!(coordinator.store().export(Utc::now()).is_empty());

        let counts = lock(&storage).count_outcomes_by_state().unwrap();
        assert_eq!(counts.get(&TaskState::Dropped), Some(&2));
        assert_eq!(counts.get(&TaskState::Skipped), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_completed_tasks() {
        let storage = share(MemoryStorage::new());
        let pool = Arc::new(ListingPool {
            retired: AtomicUsize::new(0),
        });

        let mut first = Coordinator::new(config(0), "hash", storage.clone(), pool.clone(), false).unwrap();
        first.run().await.unwrap();

        let completed = lock(&storage).load(TASKS_KEY).unwrap().unwrap();
        assert_eq!(
            completed,
            serde_json::json!(["LISTING:-:https://www.facebook.com/biz/prague/"])
        );

        // the listing is done; dropped tasks are not, but nothing rediscovers them
        let mut second = Coordinator::new(config(0), "other", storage.clone(), pool.clone(), false).unwrap();
        let report = second.run().await.unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(report.dropped, 0);

        let mut fresh = Coordinator::new(config(0), "other", storage, pool, true).unwrap();
        let report = fresh.run().await.unwrap();
        assert_eq!(report.completed, 1);
    }

    /// Listing markup behind a slow or crashing renderer
    struct FaultySurface {
        inner: StaticSurface,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Surface for FaultySurface {
        async fn navigate(
            &self,
            url: &str,
            options: &NavigateOptions,
        ) -> Result<Option<NetworkResponse>, SurfaceError> {
            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => panic!("renderer crashed"),
            }
            self.inner.navigate(url, options).await
        }

        fn current_url(&self) -> String {
            self.inner.current_url()
        }

        async fn query(&self, selector: &str) -> Result<Vec<ElementData>, SurfaceError> {
            self.inner.query(selector).await
        }

        async fn query_closest(
            &self,
            selector: &str,
            ancestor: &str,
        ) -> Result<Vec<Closest>, SurfaceError> {
            self.inner.query_closest(selector, ancestor).await
        }

        async fn click(&self, selector: &str) -> Result<usize, SurfaceError> {
            self.inner.click(selector).await
        }

        fn subscribe(&self) -> broadcast::Receiver<NetworkResponse> {
            self.inner.subscribe()
        }

        async fn metrics(&self) -> Result<PageMetrics, SurfaceError> {
            Ok(PageMetrics::default())
        }

        async fn scroll_by(&self, _pixels: f64) -> Result<(), SurfaceError> {
            Ok(())
        }
    }

    struct FaultyPool {
        delay: Option<Duration>,
    }

    #[async_trait]
    impl SurfacePool for FaultyPool {
        type Surface = FaultySurface;

        async fn acquire(&self) -> Result<FaultySurface, SurfaceError> {
            Ok(FaultySurface {
                inner: StaticSurface::new("https://www.facebook.com/", LISTING),
                delay: self.delay,
            })
        }

        async fn release(&self, _surface: FaultySurface) {}

        async fn retire(&self, _surface: FaultySurface) {}
    }

    #[tokio::test]
    async fn test_panicked_worker_is_retried_then_dropped() {
        let storage = share(MemoryStorage::new());
        let pool = Arc::new(FaultyPool { delay: None });

        let mut coordinator =
            Coordinator::new(config(1), "hash", storage.clone(), pool, false).unwrap();
        let report = coordinator.run().await.unwrap();

        assert_eq!(report.completed, 0);
        assert_eq!(report.retried, 1);
        assert_eq!(report.dropped, 1);

        let guard = lock(&storage);
        let counts = guard.count_outcomes_by_state().unwrap();
        assert_eq!(counts.get(&TaskState::Dropped), Some(&1));

        let failures = guard.get_failed_outcomes(10).unwrap();
        assert_eq!(failures[0].url, "https://www.facebook.com/biz/prague/");
        assert_eq!(failures[0].attempts, 2);

        // nothing left behind for the next run
        assert_eq!(guard.load(QUEUE_KEY).unwrap(), Some(serde_json::json!([])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_written_while_running() {
        let config = parse_config(
            r#"
[crawler]
max-request-retries = 0
persist-interval-secs = 10

[input]
start-urls = ["https://www.facebook.com/biz/prague/"]
sections = ["about"]

[output]
checkpoint-path = "checkpoint.db"
dataset-path = "dataset.jsonl"
"#,
        )
        .unwrap();

        let storage = share(MemoryStorage::new());
        let pool = Arc::new(FaultyPool {
            delay: Some(Duration::from_secs(60)),
        });
        let mut coordinator = Coordinator::new(config, "hash", storage.clone(), pool, false).unwrap();
        assert!(lock(&storage).load(QUEUE_KEY).unwrap().is_none());

        let (report, (state, queue)) = tokio::join!(coordinator.run(), async {
            tokio::time::sleep(Duration::from_secs(25)).await;
            let guard = lock(&storage);
            (guard.load(STATE_KEY).unwrap(), guard.load(QUEUE_KEY).unwrap())
        });

        assert!(report.is_ok());
        assert_eq!(state, Some(serde_json::json!({})));

        // the listing was still loading
        let queue: Vec<Task> = serde_json::from_value(queue.unwrap()).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].url, "https://www.facebook.com/biz/prague/");
    }

    #[test]
    fn test_no_start_requests() {
        let config = parse_config(
            r#"
[input]
start-urls = ["https://www.facebook.com/acme/posts/1"]

[output]
checkpoint-path = "checkpoint.db"
dataset-path = "dataset.jsonl"
"#,
        )
        .unwrap();

        let pool = Arc::new(ListingPool {
            retired: AtomicUsize::new(0),
        });
        let result = Coordinator::new(config, "hash", share(MemoryStorage::new()), pool, false);
        assert!(matches!(result, Err(SweepError::NoStartRequests)));
    }
}
