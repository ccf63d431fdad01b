use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::messages::CoordinatorEvent;
use crate::models::job::{Job, QueueSnapshot};

/// Read-only copy of the coordinator's job list for the presentation layer.
///
/// Holds nothing until the first snapshot arrives. At most one watcher is
/// registered at a time.
#[derive(Debug, Default)]
pub struct ClientQueueMirror {
    jobs: Option<Vec<Job>>,
    watcher: Option<mpsc::UnboundedSender<QueueSnapshot>>,
}

pub type SharedMirror = Arc<RwLock<ClientQueueMirror>>;

impl ClientQueueMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedMirror {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Whether a snapshot was received. Scheduling is refused until then.
    pub fn has_synced(&self) -> bool {
        self.jobs.is_some()
    }

    pub fn jobs(&self) -> Option<&[Job]> {
        self.jobs.as_deref()
    }

    pub fn get(&self, job_id: i64) -> Option<&Job> {
        self.jobs.as_ref()?.iter().find(|job| job.id == job_id)
    }

    /// Replace the held list wholesale and notify the watcher.
    pub fn sync(&mut self, snapshot: QueueSnapshot) {
        self.jobs = Some(snapshot.jobs);
        self.notify();
    }

    pub fn apply(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Snapshot { jobs } => self.sync(QueueSnapshot { jobs }),
        }
    }

    /// Optimistically drop a job ahead of the next authoritative snapshot.
    pub fn delete(&mut self, job_id: i64) -> bool {
        let Some(jobs) = self.jobs.as_mut() else {
            return false;
        };
        let before = jobs.len();
        jobs.retain(|job| job.id != job_id);
        let removed = jobs.len() != before;
        if removed {
            self.notify();
        }
        removed
    }

    /// Register the single watcher. A previously registered watcher is closed.
    pub fn watch(&mut self) -> Watcher {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watcher = Some(tx);
        Watcher { updates: rx }
    }

    pub fn unwatch(&mut self) {
        self.watcher = None;
    }

    fn notify(&mut self) {
        let Some(jobs) = self.jobs.clone() else {
            return;
        };
        if let Some(watcher) = &self.watcher {
            if watcher.send(QueueSnapshot { jobs }).is_err() {
                self.watcher = None;
            }
        }
    }
}

/// Subscription handle returned by [`ClientQueueMirror::watch`].
pub struct Watcher {
    updates: mpsc::UnboundedReceiver<QueueSnapshot>,
}

impl Watcher {
    /// Next view of the mirror, or `None` once this watcher was replaced.
    pub async fn changed(&mut self) -> Option<QueueSnapshot> {
        self.updates.recv().await
    }

    pub fn try_changed(&mut self) -> Option<QueueSnapshot> {
        self.updates.try_recv().ok()
    }
}

/// Feed coordinator snapshots into `mirror` until the coordinator stops.
pub fn follow(
    mut events: broadcast::Receiver<CoordinatorEvent>,
    mirror: SharedMirror,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => mirror.write().await.apply(event),
                // Snapshots replace each other, so skipping some loses nothing.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Mirror skipped stale snapshots");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobState, NewJob};
    use crate::store::Record;
    use chrono::Utc;

    fn snapshot(ids: &[i64]) -> QueueSnapshot {
        let now = Utc::now();
        QueueSnapshot {
            jobs: ids
                .iter()
                .map(|&id| Job::from_draft(id, now, NewJob { image_id: id * 10 }))
                .collect(),
        }
    }

    #[test]
    fn test_unsynced_until_first_snapshot() {
        let mut mirror = ClientQueueMirror::new();
        assert!(!mirror.has_synced());
        assert!(mirror.jobs().is_none());
        assert!(!mirror.delete(1));

        mirror.sync(snapshot(&[]));
        assert!(mirror.has_synced());
        assert_eq!(mirror.jobs().map(<[Job]>::len), Some(0));
    }

    #[test]
    fn test_sync_replaces_and_notifies() {
        let mut mirror = ClientQueueMirror::new();
        let mut watcher = mirror.watch();

        mirror.sync(snapshot(&[1, 2]));
        mirror.sync(snapshot(&[2, 3]));

        assert_eq!(watcher.try_changed().unwrap().jobs.len(), 2);
        let latest = watcher.try_changed().unwrap();
        assert!(latest.get(1).is_none());
        assert_eq!(mirror.get(3).map(|j| j.state), Some(JobState::Waiting));
        assert!(watcher.try_changed().is_none());
    }

    #[test]
    fn test_optimistic_delete() {
        let mut mirror = ClientQueueMirror::new();
        mirror.sync(snapshot(&[1, 2]));
        let mut watcher = mirror.watch();

        assert!(mirror.delete(1));
        assert!(mirror.get(1).is_none());
        assert_eq!(watcher.try_changed().unwrap().jobs.len(), 1);
        assert!(!mirror.delete(1));
    }

    #[tokio::test]
    async fn test_new_watcher_replaces_old() {
        let mut mirror = ClientQueueMirror::new();
        let mut first = mirror.watch();
        let mut second = mirror.watch();

        mirror.sync(snapshot(&[1]));
        assert!(first.changed().await.is_none());
        assert_eq!(second.changed().await.unwrap().jobs.len(), 1);

        mirror.unwatch();
        assert!(second.changed().await.is_none());
    }

    #[tokio::test]
    async fn test_follow_applies_broadcasts() {
        let (tx, rx) = broadcast::channel(4);
        let mirror = ClientQueueMirror::shared();
        let task = follow(rx, mirror.clone());

        tx.send(CoordinatorEvent::from(snapshot(&[4, 5]))).unwrap();
        drop(tx);
        task.await.unwrap();

        let mirror = mirror.read().await;
        assert!(mirror.has_synced());
        assert!(mirror.get(5).is_some());
    }
}
