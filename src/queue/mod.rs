//! Job queue coordination: admission control, the coordinator actor and the
//! read-only mirror the presentation layer observes.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::messages::{ClientRequest, CoordinatorEvent};
use crate::models::job::Job;
use crate::store::StoreError;
use crate::worker::{ChannelError, WorkerEvents};

pub mod coordinator;
pub mod mirror;
pub mod tracker;

pub use coordinator::JobQueueCoordinator;
pub use mirror::{ClientQueueMirror, SharedMirror, Watcher};
pub use tracker::{ComputeWorkerTracker, WorkerState};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Job {0} is not in the queue")]
    UnknownJob(i64),

    #[error("Coordinator is not running")]
    CoordinatorClosed,
}

enum Command {
    Schedule {
        image_id: i64,
        reply: oneshot::Sender<Result<Job, QueueError>>,
    },
    Delete {
        job_id: i64,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    Resync,
}

/// Cloneable handle to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    snapshots: broadcast::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    pub async fn schedule(&self, image_id: i64) -> Result<Job, QueueError> {
        let (reply, outcome) = oneshot::channel();
        self.submit(Command::Schedule { image_id, reply }).await?;
        outcome.await.map_err(|_| QueueError::CoordinatorClosed)?
    }

    pub async fn delete(&self, job_id: i64) -> Result<(), QueueError> {
        let (reply, outcome) = oneshot::channel();
        self.submit(Command::Delete { job_id, reply }).await?;
        outcome.await.map_err(|_| QueueError::CoordinatorClosed)?
    }

    pub async fn resync(&self) -> Result<(), QueueError> {
        self.submit(Command::Resync).await
    }

    /// Fire-and-forget form of the UI protocol.
    pub async fn send(&self, request: ClientRequest) -> Result<(), QueueError> {
        match request {
            ClientRequest::RequestSchedule { image_id } => {
                let (reply, _) = oneshot::channel();
                self.submit(Command::Schedule { image_id, reply }).await
            }
            ClientRequest::RequestDelete { job_id } => {
                let (reply, _) = oneshot::channel();
                self.submit(Command::Delete { job_id, reply }).await
            }
            ClientRequest::RequestResync => self.submit(Command::Resync).await,
        }
    }

    /// Receive every snapshot broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.snapshots.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn submit(&self, command: Command) -> Result<(), QueueError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| QueueError::CoordinatorClosed)
    }
}

/// Run `coordinator` as an actor. Client commands, worker events and lease
/// expiry are handled one at a time, each to completion.
///
/// The actor stops once every [`CoordinatorHandle`] is dropped.
pub fn spawn(
    coordinator: JobQueueCoordinator,
    worker_events: WorkerEvents,
    inbox: usize,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (commands, inbox_rx) = mpsc::channel(inbox.max(1));
    let handle = CoordinatorHandle {
        commands,
        snapshots: coordinator.snapshot_sender(),
    };
    let task = tokio::spawn(run(coordinator, inbox_rx, worker_events));
    (handle, task)
}

async fn run(
    mut coordinator: JobQueueCoordinator,
    mut commands: mpsc::Receiver<Command>,
    mut worker_events: WorkerEvents,
) {
    coordinator.initialize().await;
    coordinator.check_queue().await;

    let mut worker_connected = true;
    loop {
        let deadline = coordinator.lease_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut coordinator, command).await,
                None => break,
            },
            event = worker_events.recv(), if worker_connected => match event {
                Some(event) => {
                    tracing::debug!(job_id = ?event.job_id(), "Worker event");
                    coordinator.on_worker_event(event).await;
                }
                None => {
                    worker_connected = false;
                    coordinator.on_worker_lost().await;
                }
            },
            _ = lease_expiry(deadline) => coordinator.on_lease_expired().await,
        }
    }

    tracing::info!("All coordinator handles dropped, coordinator stopping");
}

async fn handle_command(coordinator: &mut JobQueueCoordinator, command: Command) {
    match command {
        Command::Schedule { image_id, reply } => {
            let _ = reply.send(coordinator.schedule(image_id).await);
        }
        Command::Delete { job_id, reply } => {
            let _ = reply.send(coordinator.delete(job_id).await);
        }
        Command::Resync => coordinator.resync(),
    }
}

async fn lease_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
