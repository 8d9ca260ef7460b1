//! The workload worker: one task per configured thread.
//!
//! Every cycle a worker inserts a batch of robots over its own key range,
//! probes one of them through an aggregation, an indexed find and an unindexed
//! find, then updates the whole batch twice. Each phase is timed and logged.
//! In seed mode the worker inserts one brand per robot after the first insert
//! phase and stops.
//!
//! Any store error ends the worker with `Err`; the caller treats that as fatal
//! for the whole run since the batch is left half-written.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bson::doc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::WorkloadError;
use crate::keyspace::{record_name, KeyRange, KeySpace};
use crate::metrics::{speedup, CycleReport, Phase, PhaseTiming};
use crate::namespace::Workspace;
use crate::record::{
    filler, placeholder_sku, Brand, Robot, Stats, BRANDS, INSERT_FILLER_TOKEN,
    REPLACE_FILLER_TOKEN, ROBOTS,
};
use crate::store::DocumentStore;

/// Pause between two cycles of a worker.
pub const CYCLE_PAUSE: Duration = Duration::from_millis(100);

/// Per-worker workload settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Documents per batch.
    pub batch_size: usize,
    /// Minimum size of the description filler in bytes.
    pub document_size: usize,
    /// Single pass with catalog records instead of continuous benchmarking.
    pub seed_mode: bool,
    /// Stop after this many cycles.
    pub max_cycles: Option<u64>,
    /// Base seed for the generated stats; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    pub cycle_pause: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            document_size: 4096,
            seed_mode: false,
            max_cycles: None,
            rng_seed: None,
            cycle_pause: CYCLE_PAUSE,
        }
    }
}

/// How a worker that returned normally ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The seed pass finished.
    Seeded,
    /// `max_cycles` cycles ran.
    Completed { cycles: u64 },
}

pub struct Worker<S: ?Sized> {
    id: usize,
    store: Arc<S>,
    workspace: Workspace,
    config: WorkerConfig,
    range: KeyRange,
    rng: StdRng,
    insert_filler: String,
    replace_filler: String,
}

impl<S: DocumentStore + ?Sized> Worker<S> {
    /// Worker `id` out of `workers`, writing into `workspace`.
    pub fn new(
        id: usize,
        workers: usize,
        store: Arc<S>,
        workspace: Workspace,
        config: WorkerConfig,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_os_rng(),
        };
        Self {
            id,
            range: KeySpace::new(id, workers).first_range(config.batch_size),
            insert_filler: filler(INSERT_FILLER_TOKEN, config.document_size),
            replace_filler: filler(REPLACE_FILLER_TOKEN, config.document_size),
            store,
            workspace,
            config,
            rng,
        }
    }

    /// The batch the next cycle will operate on.
    pub fn range(&self) -> KeyRange {
        self.range
    }

    /// Run cycles until the seed pass is done, `max_cycles` is reached or a
    /// store operation fails.
    pub async fn run(mut self) -> Result<WorkerExit, WorkloadError> {
        info!(
            "Worker {} starting at key {} (batch size {})",
            self.id,
            self.range.start(),
            self.config.batch_size
        );
        let mut cycle = 0;
        loop {
            self.run_cycle(cycle).await?;
            cycle += 1;

            if self.config.seed_mode {
                info!("Worker {} seeded {} robots", self.id, self.range.len());
                return Ok(WorkerExit::Seeded);
            }
            if self.config.max_cycles.is_some_and(|max| cycle >= max) {
                info!("Worker {} finished after {} cycles", self.id, cycle);
                return Ok(WorkerExit::Completed { cycles: cycle });
            }

            self.range = self.range.next();
            tokio::time::sleep(self.config.cycle_pause).await;
        }
    }

    /// Run every phase of one cycle over the current range.
    pub async fn run_cycle(&mut self, cycle: u64) -> Result<CycleReport, WorkloadError> {
        let mut report = CycleReport::new(cycle);

        report.record(self.insert_robots().await?);
        if self.config.seed_mode {
            report.record(self.insert_brands().await?);
            return Ok(report);
        }

        let probe = record_name(self.range.midpoint());
        report.record(self.match_by_name(&probe).await?);
        let indexed = self.find_one(Phase::FindIndexed, "name", &probe).await?;
        report.record(indexed);
        let unindexed = self.find_one(Phase::FindUnindexed, "nickname", &probe).await?;
        report.record(unindexed);

        let ratio = speedup(indexed.elapsed, unindexed.elapsed);
        let total = self
            .store
            .count_documents(self.workspace.name(), ROBOTS)
            .await?;
        info!(
            "[worker {}] {} times faster with index from {} documents",
            self.id, ratio, total
        );
        report.speedup = Some(ratio);
        report.document_count = Some(total);

        report.record(self.increment_tasked().await?);
        report.record(self.replace_descriptions().await?);
        Ok(report)
    }

    async fn insert_robots(&mut self) -> Result<PhaseTiming, WorkloadError> {
        let range = self.range;
        let start = Instant::now();
        for key in range.keys() {
            let robot = Robot::new(
                record_name(key),
                self.insert_filler.clone(),
                Stats::random(&mut self.rng),
            );
            self.store
                .insert_one(self.workspace.name(), ROBOTS, bson::to_document(&robot)?)
                .await?;
        }
        let timing = PhaseTiming::new(Phase::Insert, range.len() as u64, start.elapsed());
        info!(
            "[worker {}] {} {} {:?} {:?} size {}",
            self.id,
            timing.phase,
            range.len(),
            timing.average(),
            timing.elapsed,
            self.config.document_size
        );
        Ok(timing)
    }

    async fn insert_brands(&self) -> Result<PhaseTiming, WorkloadError> {
        let range = self.range;
        let start = Instant::now();
        for key in range.keys() {
            let brand = Brand {
                name: record_name(key),
                sku: placeholder_sku().to_string(),
            };
            self.store
                .insert_one(self.workspace.name(), BRANDS, bson::to_document(&brand)?)
                .await?;
        }
        let timing = PhaseTiming::new(Phase::CatalogInsert, range.len() as u64, start.elapsed());
        info!(
            "[worker {}] {} {} {:?} {:?}",
            self.id,
            timing.phase,
            range.len(),
            timing.average(),
            timing.elapsed
        );
        Ok(timing)
    }

    async fn match_by_name(&self, name: &str) -> Result<PhaseTiming, WorkloadError> {
        let pipeline = vec![doc! { "$match": { "name": name } }];
        let start = Instant::now();
        let matched = self
            .store
            .aggregate(self.workspace.name(), ROBOTS, pipeline)
            .await?;
        let timing = PhaseTiming::new(Phase::Match, 1, start.elapsed());
        debug!("[worker {}] $match on {} returned {}", self.id, name, matched.len());
        info!(
            "[worker {}] {} {:?} with index {{name: 1}}",
            self.id, timing.phase, timing.elapsed
        );
        Ok(timing)
    }

    async fn find_one(
        &self,
        phase: Phase,
        field: &str,
        name: &str,
    ) -> Result<PhaseTiming, WorkloadError> {
        let mut filter = bson::Document::new();
        filter.insert(field, name);
        let start = Instant::now();
        let found = self
            .store
            .find_one(self.workspace.name(), ROBOTS, filter)
            .await?;
        let timing = PhaseTiming::new(phase, 1, start.elapsed());
        if found.is_none() {
            return Err(WorkloadError::MissingRecord {
                collection: ROBOTS.to_string(),
                name: name.to_string(),
            });
        }
        let index_note = match phase {
            Phase::FindIndexed => "with index {name: 1}",
            _ => "without index",
        };
        info!(
            "[worker {}] {} {:?} {}",
            self.id, timing.phase, timing.elapsed, index_note
        );
        Ok(timing)
    }

    async fn update_batch(
        &self,
        phase: Phase,
        update: bson::Document,
    ) -> Result<PhaseTiming, WorkloadError> {
        let range = self.range;
        let start = Instant::now();
        for key in range.keys() {
            let name = record_name(key);
            let matched = self
                .store
                .update_one(
                    self.workspace.name(),
                    ROBOTS,
                    doc! { "name": name.as_str() },
                    update.clone(),
                )
                .await?;
            if matched == 0 {
                return Err(WorkloadError::MissingRecord {
                    collection: ROBOTS.to_string(),
                    name,
                });
            }
        }
        Ok(PhaseTiming::new(phase, range.len() as u64, start.elapsed()))
    }

    async fn increment_tasked(&self) -> Result<PhaseTiming, WorkloadError> {
        let timing = self
            .update_batch(
                Phase::IncrementUpdate,
                doc! { "$inc": { "stats.tasked": 1 } },
            )
            .await?;
        info!(
            "[worker {}] {} {} {:?} {:?} $inc stats.tasked by 1",
            self.id,
            timing.phase,
            timing.operations,
            timing.average(),
            timing.elapsed
        );
        Ok(timing)
    }

    async fn replace_descriptions(&self) -> Result<PhaseTiming, WorkloadError> {
        let timing = self
            .update_batch(
                Phase::ReplaceUpdate,
                doc! { "$set": { "description": self.replace_filler.as_str() } },
            )
            .await?;
        info!(
            "[worker {}] {} {} {:?} {:?} $set description string size of {}",
            self.id,
            timing.phase,
            timing.operations,
            timing.average(),
            timing.elapsed,
            self.config.document_size
        );
        Ok(timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, Operation};

    fn config(batch_size: usize, document_size: usize) -> WorkerConfig {
        WorkerConfig {
            batch_size,
            document_size,
            rng_seed: Some(42),
            cycle_pause: Duration::ZERO,
            ..Default::default()
        }
    }

    fn worker(store: &Arc<MemoryStore>, id: usize, config: WorkerConfig) -> Worker<MemoryStore> {
        Worker::new(id, 2, store.clone(), Workspace::named("ws"), config)
    }

    #[tokio::test]
    async fn test_cycle_runs_every_phase() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = worker(&store, 0, config(10, 16));

        let report = worker.run_cycle(0).await.unwrap();

        let phases: Vec<Phase> = report.timings.iter().map(|t| t.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Insert,
                Phase::Match,
                Phase::FindIndexed,
                Phase::FindUnindexed,
                Phase::IncrementUpdate,
                Phase::ReplaceUpdate,
            ]
        );
        assert_eq!(report.document_count, Some(10));
        assert!(report.speedup.is_some());
        assert_eq!(store.calls(Operation::Insert), 10);
        assert_eq!(store.calls(Operation::Update), 20);
        assert_eq!(store.calls(Operation::Find), 2);
    }

    #[tokio::test]
    async fn test_updates_touch_every_robot_once() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = worker(&store, 0, config(4, 16));
        worker.run_cycle(0).await.unwrap();

        for doc in store.documents("ws", ROBOTS) {
            let stats = doc.get_document("stats").unwrap();
            let tasked = stats.get_i32("tasked").unwrap();
            let battery = stats.get_i32("battery").unwrap();
            // battery was derived from tasked before the increment
            assert_eq!(battery, 100 - (tasked - 1) * 5);
            assert_eq!(doc.get_str("description").unwrap(), "refresh.refresh.");
        }
    }

    #[tokio::test]
    async fn test_second_worker_uses_its_own_range() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = worker(&store, 1, config(3, 8));
        assert_eq!(worker.range().start(), 100_000);
        worker.run_cycle(0).await.unwrap();
        let names: Vec<String> = store
            .documents("ws", ROBOTS)
            .iter()
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Robot-100000", "Robot-100001", "Robot-100002"]);
    }

    #[tokio::test]
    async fn test_bounded_run_advances_the_range() {
        let store = Arc::new(MemoryStore::new());
        let worker = worker(
            &store,
            0,
            WorkerConfig {
                max_cycles: Some(3),
                ..config(5, 8)
            },
        );
        let exit = worker.run().await.unwrap();
        assert_eq!(exit, WorkerExit::Completed { cycles: 3 });
        assert_eq!(store.documents("ws", ROBOTS).len(), 15);
        assert!(store
            .documents("ws", ROBOTS)
            .iter()
            .any(|d| d.get_str("name").unwrap() == "Robot-14"));
    }

    #[tokio::test]
    async fn test_seed_mode_stops_after_catalog() {
        let store = Arc::new(MemoryStore::new());
        let worker = worker(
            &store,
            0,
            WorkerConfig {
                seed_mode: true,
                ..config(5, 8)
            },
        );
        assert_eq!(worker.run().await.unwrap(), WorkerExit::Seeded);
        assert_eq!(store.documents("ws", BRANDS).len(), 5);
        assert_eq!(store.calls(Operation::Aggregate), 0);
        assert_eq!(store.calls(Operation::Update), 0);
    }

    #[tokio::test]
    async fn test_insert_failure_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::Insert);
        let worker = worker(&store, 0, config(5, 8));
        assert!(matches!(worker.run().await, Err(WorkloadError::Store(_))));
        assert_eq!(store.calls(Operation::Insert), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::Find);
        let mut worker = worker(&store, 0, config(5, 8));
        assert!(worker.run_cycle(0).await.is_err());
        assert_eq!(store.calls(Operation::Update), 0);
    }

    #[tokio::test]
    async fn test_update_of_missing_robot_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let worker = worker(&store, 0, config(5, 8));
        let err = worker
            .update_batch(Phase::IncrementUpdate, doc! { "$inc": { "stats.tasked": 1 } })
            .await
            .unwrap_err();
        match err {
            WorkloadError::MissingRecord { name, .. } => assert_eq!(name, "Robot-0"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
