//! Message shapes exchanged between the UI, the coordinator and the
//! compute worker. One closed enum per direction.

use serde::{Deserialize, Serialize};

use crate::models::job::{Job, QueueSnapshot};
use crate::models::result::BoundingBox;

/// UI → coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    RequestSchedule { image_id: i64 },
    RequestDelete { job_id: i64 },
    RequestResync,
}

/// Coordinator → UI. Each snapshot fully replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    Snapshot { jobs: Vec<Job> },
}

impl From<QueueSnapshot> for CoordinatorEvent {
    fn from(snapshot: QueueSnapshot) -> Self {
        Self::Snapshot {
            jobs: snapshot.jobs,
        }
    }
}

/// Coordinator → compute worker. The image buffer moves with the message.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    ScheduleJob { job_id: i64, image: Vec<u8> },
}

/// Compute worker → coordinator.
///
/// Per job the worker emits `Started` first and then exactly one of
/// `Result` or `JobError`. `Ready` is emitted once, after the detector loaded.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    Ready,
    Started {
        job_id: i64,
    },
    Result {
        job_id: i64,
        image: Vec<u8>,
        detections: Vec<BoundingBox>,
    },
    JobError {
        job_id: i64,
    },
}

impl WorkerEvent {
    pub fn job_id(&self) -> Option<i64> {
        match self {
            Self::Ready => None,
            Self::Started { job_id } | Self::Result { job_id, .. } | Self::JobError { job_id } => {
                Some(*job_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_request_wire_tags() {
        let request: ClientRequest =
            serde_json::from_value(json!({ "type": "request_schedule", "image_id": 42 })).unwrap();
        assert_eq!(request, ClientRequest::RequestSchedule { image_id: 42 });

        assert_eq!(
            serde_json::to_value(ClientRequest::RequestResync).unwrap(),
            json!({ "type": "request_resync" })
        );
    }

    #[test]
    fn test_worker_event_wire_tags() {
        let event: WorkerEvent = serde_json::from_value(json!({
            "type": "result",
            "job_id": 1,
            "image": [1, 2, 3],
            "detections": [{ "x": 0.0, "y": 0.0, "w": 10.0, "h": 10.0 }]
        }))
        .unwrap();

        assert_eq!(event.job_id(), Some(1));
        assert!(matches!(event, WorkerEvent::Result { ref detections, .. } if detections.len() == 1));
        assert_eq!(serde_json::to_value(WorkerEvent::Ready).unwrap(), json!({ "type": "ready" }));
    }
}
