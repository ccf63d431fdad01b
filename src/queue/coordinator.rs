use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::messages::{CoordinatorEvent, WorkerCommand, WorkerEvent};
use crate::models::job::{Job, JobState, NewJob, QueueSnapshot};
use crate::models::result::{BoundingBox, NewResult};
use crate::queue::tracker::ComputeWorkerTracker;
use crate::queue::QueueError;
use crate::store::{StoreError, Stores};
use crate::worker::ComputeWorkerChannel;

const SNAPSHOT_BUFFER: usize = 16;

/// Owns the in-memory job mirror and decides what the compute worker runs next.
///
/// Every handler mutates the mirror only after the store accepted the change,
/// and ends with exactly one snapshot broadcast.
pub struct JobQueueCoordinator {
    stores: Stores,
    jobs: Vec<Job>,
    tracker: ComputeWorkerTracker,
    worker: ComputeWorkerChannel,
    snapshots: broadcast::Sender<CoordinatorEvent>,
    lease: Option<Duration>,
    lease_deadline: Option<Instant>,
}

impl JobQueueCoordinator {
    pub fn new(stores: Stores, worker: ComputeWorkerChannel) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_BUFFER);
        Self {
            stores,
            jobs: Vec::new(),
            tracker: ComputeWorkerTracker::new(),
            worker,
            snapshots,
            lease: None,
            lease_deadline: None,
        }
    }

    /// Fail the in-flight job when the worker has not answered within `lease`.
    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease = lease;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.snapshots.subscribe()
    }

    pub(crate) fn snapshot_sender(&self) -> broadcast::Sender<CoordinatorEvent> {
        self.snapshots.clone()
    }

    pub fn tracker(&self) -> &ComputeWorkerTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ComputeWorkerTracker {
        &mut self.tracker
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn lease_deadline(&self) -> Option<Instant> {
        self.lease_deadline
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            jobs: self.jobs.clone(),
        }
    }

    /// Load every persisted job into the mirror. A failed read is logged and
    /// the coordinator starts with an empty mirror.
    pub async fn initialize(&mut self) {
        match self.stores.jobs.read_all().await {
            Ok(mut jobs) => {
                jobs.sort_by_key(|job| job.id);
                tracing::info!(
                    count = jobs.len(),
                    running = jobs.iter().filter(|j| j.state == JobState::Running).count(),
                    "Loaded persisted jobs"
                );
                self.jobs = jobs;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load persisted jobs, starting empty");
            }
        }
    }

    // ── Client requests ──────────────────────────────────────────────

    /// Create a `waiting` job for `image_id` and re-evaluate dispatch.
    ///
    /// The image is read before the job is created, so an unknown `image_id`
    /// fails with [`StoreError::NotFound`] and leaves the queue untouched. An
    /// image that disappears later is caught at dispatch, which moves the
    /// job to `error`.
    pub async fn schedule(&mut self, image_id: i64) -> Result<Job, QueueError> {
        let outcome = self.create_job(image_id).await;
        self.check_queue().await;
        outcome
    }

    async fn create_job(&mut self, image_id: i64) -> Result<Job, QueueError> {
        self.stores.images.read(image_id).await.map_err(|e| {
            tracing::error!(image_id, error = %e, "Cannot schedule job for unreadable image");
            e
        })?;

        let job = self
            .stores
            .jobs
            .create(NewJob { image_id })
            .await
            .map_err(|e| {
                tracing::error!(image_id, error = %e, "Failed to persist new job");
                e
            })?;

        tracing::info!(job_id = job.id, image_id, "Job scheduled");
        metrics::counter!("jobs_scheduled_total").increment(1);
        self.jobs.push(job.clone());
        Ok(job)
    }

    /// Delete a job and its result. A job the worker is still processing is
    /// not interrupted; its late result is discarded as stale.
    pub async fn delete(&mut self, job_id: i64) -> Result<(), QueueError> {
        let outcome = self.remove_job(job_id).await;
        self.check_queue().await;
        outcome
    }

    async fn remove_job(&mut self, job_id: i64) -> Result<(), QueueError> {
        let job = self.find(job_id).cloned().ok_or(QueueError::UnknownJob(job_id))?;

        if let Some(result_id) = job.result {
            match self.stores.results.delete(result_id).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => {
                    tracing::error!(job_id, result_id, error = %e, "Failed to delete job result");
                    return Err(e.into());
                }
            }
        }

        match self.stores.jobs.delete(job_id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to delete job");
                return Err(e.into());
            }
        }

        self.jobs.retain(|j| j.id != job_id);
        if self.tracker.busy_with() == Some(job_id) {
            tracing::warn!(job_id, "Deleted a job the compute worker is still processing");
        }
        tracing::info!(job_id, "Job deleted");
        Ok(())
    }

    /// Re-broadcast the current snapshot without changing anything.
    pub fn resync(&self) {
        self.publish();
    }

    // ── Worker events ────────────────────────────────────────────────

    pub async fn on_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Ready => self.on_worker_ready().await,
            WorkerEvent::Started { job_id } => self.on_worker_started(job_id).await,
            WorkerEvent::Result {
                job_id,
                image,
                detections,
            } => self.on_worker_result(job_id, image, detections).await,
            WorkerEvent::JobError { job_id } => self.on_worker_error(job_id).await,
        }
    }

    pub async fn on_worker_ready(&mut self) {
        tracing::info!("Compute worker reported ready");
        self.tracker.mark_ready();
        self.lease_deadline = None;
        self.check_queue().await;
    }

    /// The worker accepted `job_id`: persist `waiting → running`.
    pub async fn on_worker_started(&mut self, job_id: i64) {
        // Normally a no-op: the slot was taken when the job was dispatched.
        self.tracker.try_lock(job_id);

        match self.find(job_id).cloned() {
            Some(job) if job.state == JobState::Waiting => {
                if self.transition(job.started()).await.is_ok() {
                    tracing::info!(job_id, "Job running");
                }
            }
            Some(job) if job.state == JobState::Running => {
                tracing::debug!(job_id, "Worker restarted a job already marked running");
            }
            _ => {
                // The worker is busy with it regardless; its terminal message frees the slot.
                tracing::warn!(job_id, "Worker started a job that is no longer queued");
                metrics::counter!("stale_worker_messages_total").increment(1);
            }
        }

        self.check_queue().await;
    }

    /// Store the result and move the job to `finished`. A failure to persist
    /// either step turns the job into an `error` instead.
    ///
    /// A job still `waiting` is accepted too: the worker only reports results
    /// for jobs it was sent, so this means the `running` write was lost.
    pub async fn on_worker_result(
        &mut self,
        job_id: i64,
        image: Vec<u8>,
        detections: Vec<BoundingBox>,
    ) {
        let pending = self
            .find(job_id)
            .is_some_and(|job| !job.state.is_terminal());

        if pending {
            self.release_worker();
            if let Err(e) = self.finish(job_id, image, detections).await {
                tracing::error!(job_id, error = %e, "Failed to record job result, marking job failed");
                let _ = self.fail(job_id).await;
            }
        } else {
            self.discard_stale(job_id, "result");
        }

        self.check_queue().await;
    }

    pub async fn on_worker_error(&mut self, job_id: i64) {
        let pending = self
            .find(job_id)
            .is_some_and(|job| !job.state.is_terminal());

        if pending {
            self.release_worker();
            tracing::warn!(job_id, "Compute worker reported job error");
            let _ = self.fail(job_id).await;
        } else {
            self.discard_stale(job_id, "job_error");
        }

        self.check_queue().await;
    }

    /// The in-flight job outlived its lease.
    pub async fn on_lease_expired(&mut self) {
        self.lease_deadline = None;
        if let Some(job_id) = self.tracker.busy_with() {
            tracing::warn!(job_id, lease = ?self.lease, "Job exceeded its lease, marking it failed");
            self.tracker.free();
            let _ = self.fail(job_id).await;
        }
        self.check_queue().await;
    }

    /// The worker's event channel closed; nothing more can be dispatched.
    pub async fn on_worker_lost(&mut self) {
        tracing::error!("Compute worker channel closed");
        let in_flight = self.tracker.busy_with();
        self.tracker.mark_lost();
        self.lease_deadline = None;
        if let Some(job_id) = in_flight {
            let _ = self.fail(job_id).await;
        }
        self.check_queue().await;
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Next job to hand to the worker: a job already `running` first (it was
    /// accepted before a restart), otherwise the oldest `waiting` job.
    pub fn next_candidate(&self) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|job| job.state == JobState::Running)
            .or_else(|| {
                self.jobs
                    .iter()
                    .filter(|job| job.state == JobState::Waiting)
                    .min_by_key(|job| job.id)
            })
    }

    /// Dispatch the next candidate if the worker is ready, then broadcast.
    ///
    /// A candidate that cannot be dispatched is failed and the next one is
    /// tried within the same pass. A closed worker channel fails only the
    /// candidate and ends the pass with the tracker back at `Idle`.
    pub async fn check_queue(&mut self) {
        while self.tracker.is_ready() {
            let Some(candidate) = self.next_candidate().cloned() else {
                break;
            };

            match self.dispatch(&candidate).await {
                Ok(()) => break,
                Err(QueueError::Channel(e)) => {
                    // Nothing else can be sent; the rest of the queue waits
                    // for the worker to come back.
                    tracing::error!(job_id = candidate.id, error = %e, "Compute worker gone during dispatch");
                    self.tracker.mark_lost();
                    self.lease_deadline = None;
                    let _ = self.fail(candidate.id).await;
                    break;
                }
                Err(e) => {
                    tracing::error!(job_id = candidate.id, error = %e, "Dispatch failed, marking job failed");
                    self.release_worker();
                    if self.fail(candidate.id).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.publish();
    }

    async fn dispatch(&mut self, job: &Job) -> Result<(), QueueError> {
        if job.state == JobState::Running {
            // The worker may already have processed this job before the restart.
            tracing::warn!(job_id = job.id, "Re-dispatching job left running by a previous session");
        }

        let image = self.stores.images.read(job.image_id).await?;

        if !self.tracker.try_lock(job.id) {
            return Ok(());
        }
        self.worker.send(WorkerCommand::ScheduleJob {
            job_id: job.id,
            image: image.data,
        })?;

        self.lease_deadline = self.lease.map(|lease| Instant::now() + lease);
        metrics::counter!("jobs_dispatched_total").increment(1);
        tracing::info!(job_id = job.id, image_id = job.image_id, "Job dispatched to compute worker");
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn find(&self, job_id: i64) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    fn release_worker(&mut self) {
        self.tracker.free();
        self.lease_deadline = None;
    }

    /// Persist `next`, then mirror it. On failure the mirror keeps the
    /// previous row.
    async fn transition(&mut self, next: Job) -> Result<Job, StoreError> {
        let job_id = next.id;
        let to = next.state;
        let updated = self.stores.jobs.update(next).await.map_err(|e| {
            tracing::error!(job_id, to = %to, error = %e, "Failed to persist job transition");
            e
        })?;

        if let Some(slot) = self.jobs.iter_mut().find(|job| job.id == job_id) {
            *slot = updated.clone();
        }
        Ok(updated)
    }

    async fn finish(
        &mut self,
        job_id: i64,
        image: Vec<u8>,
        detections: Vec<BoundingBox>,
    ) -> Result<(), QueueError> {
        let job = self.find(job_id).cloned().ok_or(QueueError::UnknownJob(job_id))?;
        let count = detections.len();

        let record = self
            .stores
            .results
            .create(NewResult {
                job_id,
                image,
                detections,
            })
            .await?;

        if let Err(e) = self.transition(job.finished(record.id)).await {
            if let Err(cleanup) = self.stores.results.delete(record.id).await {
                tracing::warn!(job_id, result_id = record.id, error = %cleanup, "Left orphaned result");
            }
            return Err(e.into());
        }

        metrics::counter!("jobs_finished_total").increment(1);
        tracing::info!(job_id, result_id = record.id, detections = count, "Job finished");
        Ok(())
    }

    async fn fail(&mut self, job_id: i64) -> Result<(), StoreError> {
        let Some(job) = self.find(job_id).cloned() else {
            return Ok(());
        };
        if job.state.is_terminal() {
            return Ok(());
        }

        self.transition(job.failed()).await?;
        metrics::counter!("jobs_failed_total").increment(1);
        tracing::info!(job_id, "Job failed");
        Ok(())
    }

    /// Drop a worker message about a job that is gone or no longer in flight.
    fn discard_stale(&mut self, job_id: i64, kind: &'static str) {
        tracing::warn!(job_id, kind, "Discarding worker message for stale job");
        metrics::counter!("stale_worker_messages_total").increment(1);
        if self.tracker.busy_with() == Some(job_id) {
            self.release_worker();
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        metrics::gauge!("queue_depth").set(snapshot.pending_count() as f64);
        // No subscribers is fine; the next subscriber asks for a resync.
        let _ = self.snapshots.send(snapshot.into());
    }
}
