/// What the coordinator knows about the single compute worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Worker not yet confirmed alive.
    #[default]
    Idle,
    /// Worker alive with no job assigned.
    Ready,
    /// Worker processing `job_id`.
    Busy { job_id: i64 },
}

/// Single-slot admission control for the compute worker.
///
/// Not re-entrant: locking while busy is ignored rather than an error, so a
/// duplicate dispatch attempt is harmless.
#[derive(Debug, Default)]
pub struct ComputeWorkerTracker {
    state: WorkerState,
}

impl ComputeWorkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == WorkerState::Ready
    }

    pub fn busy_with(&self) -> Option<i64> {
        match self.state {
            WorkerState::Busy { job_id } => Some(job_id),
            _ => None,
        }
    }

    /// `Idle | Busy → Ready`.
    pub fn mark_ready(&mut self) {
        self.state = WorkerState::Ready;
    }

    /// `Ready → Busy(job_id)`. Returns false and leaves the state alone otherwise.
    pub fn try_lock(&mut self, job_id: i64) -> bool {
        if self.state == WorkerState::Ready {
            self.state = WorkerState::Busy { job_id };
            true
        } else {
            false
        }
    }

    /// `Busy(any) → Ready`. No-op from other states.
    pub fn free(&mut self) -> bool {
        if matches!(self.state, WorkerState::Busy { .. }) {
            self.state = WorkerState::Ready;
            true
        } else {
            false
        }
    }

    /// Back to `Idle` after the worker went away.
    pub fn mark_lost(&mut self) {
        self.state = WorkerState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_requires_ready() {
        let mut tracker = ComputeWorkerTracker::new();
        assert!(!tracker.try_lock(1));
        assert_eq!(tracker.state(), WorkerState::Idle);

        tracker.mark_ready();
        assert!(tracker.try_lock(1));
        assert_eq!(tracker.busy_with(), Some(1));
    }

    #[test]
    fn test_second_lock_is_ignored() {
        let mut tracker = ComputeWorkerTracker::new();
        tracker.mark_ready();
        assert!(tracker.try_lock(1));
        assert!(!tracker.try_lock(2));
        assert_eq!(tracker.state(), WorkerState::Busy { job_id: 1 });
    }

    #[test]
    fn test_free_only_leaves_busy() {
        let mut tracker = ComputeWorkerTracker::new();
        assert!(!tracker.free());
        assert_eq!(tracker.state(), WorkerState::Idle);

        tracker.mark_ready();
        assert!(!tracker.free());
        assert!(tracker.is_ready());

        tracker.try_lock(9);
        assert!(tracker.free());
        assert!(tracker.is_ready());
    }

    #[test]
    fn test_mark_ready_from_busy() {
        let mut tracker = ComputeWorkerTracker::new();
        tracker.mark_ready();
        tracker.try_lock(4);
        tracker.mark_ready();
        assert!(tracker.is_ready());

        tracker.mark_lost();
        assert_eq!(tracker.state(), WorkerState::Idle);
    }
}
