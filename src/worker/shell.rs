use std::ops::{Deref, DerefMut};

use crate::messages::{WorkerCommand, WorkerEvent};
use crate::models::result::BoundingBox;
use crate::worker::detector::{Detector, DetectorError};
use crate::worker::WorkerEndpoint;

/// Per-job output slots filled by a [`Detector`].
#[derive(Debug, Default, PartialEq)]
pub struct Scratch {
    pub image: Option<Vec<u8>>,
    pub detections: Option<Vec<BoundingBox>>,
}

/// Clears the scratch on every exit path of a job.
struct ScratchGuard<'a>(&'a mut Scratch);

impl Deref for ScratchGuard<'_> {
    type Target = Scratch;

    fn deref(&self) -> &Scratch {
        self.0
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut Scratch {
        self.0
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        *self.0 = Scratch::default();
    }
}

/// Drives one detector: one job at a time, every failure reported as a
/// typed `JobError` message.
pub struct WorkerShell<D> {
    detector: D,
    endpoint: WorkerEndpoint,
    scratch: Scratch,
}

impl<D: Detector> WorkerShell<D> {
    pub fn new(detector: D, endpoint: WorkerEndpoint) -> Self {
        Self {
            detector,
            endpoint,
            scratch: Scratch::default(),
        }
    }

    /// Load the detector, announce `Ready`, then serve jobs until the
    /// coordinator hangs up. A failed load never announces `Ready`.
    pub async fn run(mut self) -> Result<(), DetectorError> {
        self.detector.load().await?;

        if !self.endpoint.emit(WorkerEvent::Ready) {
            return Ok(());
        }
        tracing::info!("Compute worker ready");

        while let Some(command) = self.endpoint.recv().await {
            match command {
                WorkerCommand::ScheduleJob { job_id, image } => {
                    if !self.endpoint.emit(WorkerEvent::Started { job_id }) {
                        break;
                    }
                    let outcome = self.process(job_id, image).await;
                    if !self.endpoint.emit(outcome) {
                        break;
                    }
                }
            }
        }

        tracing::info!("Coordinator hung up, compute worker exiting");
        Ok(())
    }

    async fn process(&mut self, job_id: i64, image: Vec<u8>) -> WorkerEvent {
        let mut scratch = ScratchGuard(&mut self.scratch);
        let start = std::time::Instant::now();

        if let Err(e) = self.detector.detect(&image, &mut scratch).await {
            tracing::error!(job_id, error = %e, "Detection failed");
            return WorkerEvent::JobError { job_id };
        }

        match (scratch.image.take(), scratch.detections.take()) {
            (Some(image), Some(detections)) => {
                tracing::info!(
                    job_id,
                    detections = detections.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Detection complete"
                );
                WorkerEvent::Result {
                    job_id,
                    image,
                    detections,
                }
            }
            (image, detections) => {
                tracing::error!(
                    job_id,
                    has_image = image.is_some(),
                    has_detections = detections.is_some(),
                    "Detector finished without complete output"
                );
                WorkerEvent::JobError { job_id }
            }
        }
    }

    #[cfg(test)]
    fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}
