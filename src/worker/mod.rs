//! Compute worker: the channel the coordinator dispatches through and the
//! shell that drives a [`Detector`] on its own thread.

use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use crate::messages::{WorkerCommand, WorkerEvent};

pub mod detector;
pub mod shell;

pub use detector::{Detector, DetectorError, HttpDetector};
pub use shell::{Scratch, WorkerShell};

/// Inbound side of the worker protocol, read by the coordinator loop.
pub type WorkerEvents = mpsc::UnboundedReceiver<WorkerEvent>;

/// Coordinator's sending half of the point-to-point worker channel.
pub struct ComputeWorkerChannel {
    commands: mpsc::UnboundedSender<WorkerCommand>,
}

impl ComputeWorkerChannel {
    /// Connected channel halves: the coordinator's sender, the coordinator's
    /// event receiver, and the worker's endpoint.
    pub fn pair() -> (Self, WorkerEvents, WorkerEndpoint) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self { commands: cmd_tx },
            event_rx,
            WorkerEndpoint {
                commands: cmd_rx,
                events: event_tx,
            },
        )
    }

    /// Send a command. Ownership of any image buffer moves to the worker.
    pub fn send(&self, command: WorkerCommand) -> Result<(), ChannelError> {
        self.commands
            .send(command)
            .map_err(|_| ChannelError::Disconnected)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Worker's half of the channel.
pub struct WorkerEndpoint {
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerEndpoint {
    /// Next command, or `None` once the coordinator dropped its sender.
    pub async fn recv(&mut self) -> Option<WorkerCommand> {
        self.commands.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WorkerCommand> {
        self.commands.try_recv().ok()
    }

    /// Emit an event. Returns false when the coordinator is gone.
    pub fn emit(&self, event: WorkerEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Compute worker is gone")]
    Disconnected,
}

/// Run a [`WorkerShell`] around `detector` on a dedicated thread with its own
/// single-threaded runtime.
pub fn spawn_worker<D: Detector>(
    detector: D,
) -> std::io::Result<(ComputeWorkerChannel, WorkerEvents, JoinHandle<()>)> {
    let (channel, events, endpoint) = ComputeWorkerChannel::pair();

    let handle = thread::Builder::new()
        .name("compute-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build compute worker runtime");
                    return;
                }
            };

            if let Err(e) = runtime.block_on(WorkerShell::new(detector, endpoint).run()) {
                tracing::error!(error = %e, "Compute worker stopped");
            }
        })?;

    Ok((channel, events, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_fails_once_worker_dropped() {
        let (channel, _events, endpoint) = ComputeWorkerChannel::pair();
        assert!(!channel.is_closed());
        drop(endpoint);

        let result = channel.send(WorkerCommand::ScheduleJob {
            job_id: 1,
            image: vec![0; 4],
        });
        assert!(matches!(result, Err(ChannelError::Disconnected)));
    }

    #[tokio::test]
    async fn test_endpoint_round_trip() {
        let (channel, mut events, mut endpoint) = ComputeWorkerChannel::pair();
        channel
            .send(WorkerCommand::ScheduleJob {
                job_id: 3,
                image: vec![7, 7],
            })
            .unwrap();

        let WorkerCommand::ScheduleJob { job_id, image } = endpoint.recv().await.unwrap();
        assert_eq!((job_id, image), (3, vec![7, 7]));

        assert!(endpoint.emit(WorkerEvent::Started { job_id }));
        assert_eq!(events.recv().await, Some(WorkerEvent::Started { job_id: 3 }));
    }
}
