//! Shared fixtures for the queue tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use micro_tracker::messages::{CoordinatorEvent, WorkerCommand};
use micro_tracker::models::image::Image;
use micro_tracker::models::job::{Job, JobState};
use micro_tracker::models::result::{BoundingBox, ResultRecord};
use micro_tracker::queue::JobQueueCoordinator;
use micro_tracker::store::memory::MemoryRepository;
use micro_tracker::store::{Record, Repository, StoreError, Stores};
use micro_tracker::worker::detector::{Detector, DetectorError};
use micro_tracker::worker::shell::Scratch;
use micro_tracker::worker::{ComputeWorkerChannel, WorkerEndpoint, WorkerEvents};

/// Memory repository whose writes can be made to fail on demand.
pub struct FlakyRepository<R> {
    inner: MemoryRepository<R>,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
}

impl<R: Record> FlakyRepository<R> {
    pub fn with_rows(rows: impl IntoIterator<Item = R>) -> Self {
        Self {
            inner: MemoryRepository::with_rows(rows),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Record> Repository<R> for FlakyRepository<R> {
    async fn create(&self, draft: R::Draft) -> Result<R, StoreError> {
        Self::check(&self.fail_create)?;
        self.inner.create(draft).await
    }

    async fn read(&self, id: i64) -> Result<R, StoreError> {
        self.inner.read(id).await
    }

    async fn update(&self, record: R) -> Result<R, StoreError> {
        Self::check(&self.fail_update)?;
        self.inner.update(record).await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn read_all(&self) -> Result<Vec<R>, StoreError> {
        self.inner.read_all().await
    }
}

pub fn image(id: i64, data: Vec<u8>) -> Image {
    let now = Utc::now();
    Image {
        id,
        name: format!("slide-{id}"),
        patient: "anon".to_string(),
        width: 640,
        height: 480,
        file_type: "image/png".to_string(),
        data,
        created_at: now,
        updated_at: now,
    }
}

pub fn job(id: i64, image_id: i64, state: JobState) -> Job {
    let now = Utc::now();
    Job {
        id,
        image_id,
        state,
        result: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn one_box() -> Vec<BoundingBox> {
    vec![BoundingBox {
        x: 0.0,
        y: 0.0,
        w: 10.0,
        h: 10.0,
    }]
}

/// A coordinator over memory stores with direct access to both ends of the
/// worker channel. Image 42 always exists.
pub struct Harness {
    pub coordinator: JobQueueCoordinator,
    pub worker: WorkerEndpoint,
    pub events: WorkerEvents,
    pub snapshots: broadcast::Receiver<CoordinatorEvent>,
    pub jobs: Arc<FlakyRepository<Job>>,
    pub images: Arc<MemoryRepository<Image>>,
    pub results: Arc<FlakyRepository<ResultRecord>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_jobs(Vec::new())
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let jobs = Arc::new(FlakyRepository::with_rows(jobs));
        let images = Arc::new(MemoryRepository::with_rows(vec![image(42, vec![4, 2])]));
        let results = Arc::new(FlakyRepository::with_rows(Vec::new()));

        let stores = Stores {
            jobs: jobs.clone(),
            images: images.clone(),
            results: results.clone(),
        };

        let (channel, events, worker) = ComputeWorkerChannel::pair();
        let coordinator = JobQueueCoordinator::new(stores, channel);
        let snapshots = coordinator.subscribe();

        Self {
            coordinator,
            worker,
            events,
            snapshots,
            jobs,
            images,
            results,
        }
    }

    /// Ids of every job sent to the worker since the last call.
    pub fn dispatched(&mut self) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Some(WorkerCommand::ScheduleJob { job_id, .. }) = self.worker.try_recv() {
            ids.push(job_id);
        }
        ids
    }

    /// Drain pending snapshots, returning how many there were and the last one.
    pub fn broadcasts(&mut self) -> (usize, Option<Vec<Job>>) {
        let mut count = 0;
        let mut last = None;
        while let Ok(CoordinatorEvent::Snapshot { jobs }) = self.snapshots.try_recv() {
            count += 1;
            last = Some(jobs);
        }
        (count, last)
    }

    pub fn state_of(&self, job_id: i64) -> Option<JobState> {
        self.coordinator
            .jobs()
            .iter()
            .find(|job| job.id == job_id)
            .map(|job| job.state)
    }

    /// At most one running job, and a result exactly on finished jobs.
    pub fn assert_invariants(&self) {
        let jobs = self.coordinator.jobs();
        let running = jobs
            .iter()
            .filter(|job| job.state == JobState::Running)
            .count();
        assert!(running <= 1, "{running} jobs running at once");

        for job in jobs {
            assert_eq!(
                job.result.is_some(),
                job.state == JobState::Finished,
                "job {} in state {} has result {:?}",
                job.id,
                job.state,
                job.result
            );
        }
    }
}

/// Echoes the input image back with one box; an empty image fails detection.
pub struct EchoDetector;

#[async_trait]
impl Detector for EchoDetector {
    async fn load(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }

    async fn detect(&mut self, image: &[u8], scratch: &mut Scratch) -> Result<(), DetectorError> {
        if image.is_empty() {
            return Err(DetectorError::Failed("empty image".to_string()));
        }
        scratch.image = Some(image.to_vec());
        scratch.detections = Some(one_box());
        Ok(())
    }
}
