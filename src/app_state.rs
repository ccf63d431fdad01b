use crate::queue::{CoordinatorHandle, SharedMirror};
use crate::store::Stores;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: CoordinatorHandle,
    pub mirror: SharedMirror,
    pub stores: Stores,
}

impl AppState {
    pub fn new(queue: CoordinatorHandle, mirror: SharedMirror, stores: Stores) -> Self {
        Self {
            queue,
            mirror,
            stores,
        }
    }
}
