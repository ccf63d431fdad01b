use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{Record, Repository, StoreError};

struct Table<R> {
    next_id: i64,
    rows: BTreeMap<i64, R>,
}

/// In-process repository. Ids start at 1 and are never reused.
pub struct MemoryRepository<R> {
    table: Mutex<Table<R>>,
}

impl<R: Record> MemoryRepository<R> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                next_id: 1,
                rows: BTreeMap::new(),
            }),
        }
    }

    /// Repository pre-populated with existing rows, e.g. a restored session.
    pub fn with_rows(rows: impl IntoIterator<Item = R>) -> Self {
        let rows: BTreeMap<i64, R> = rows.into_iter().map(|r| (r.id(), r)).collect();
        let next_id = rows.keys().next_back().map_or(1, |id| id + 1);
        Self {
            table: Mutex::new(Table { next_id, rows }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Table<R>>, StoreError> {
        self.table
            .lock()
            .map_err(|_| StoreError::Unavailable("memory table poisoned".to_string()))
    }
}

impl<R: Record> Default for MemoryRepository<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Repository<R> for MemoryRepository<R> {
    async fn create(&self, draft: R::Draft) -> Result<R, StoreError> {
        let mut table = self.lock()?;
        let id = table.next_id;
        table.next_id += 1;
        let record = R::from_draft(id, Utc::now(), draft);
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn read(&self, id: i64) -> Result<R, StoreError> {
        self.lock()?
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, mut record: R) -> Result<R, StoreError> {
        let mut table = self.lock()?;
        let id = record.id();
        let slot = table.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.touch(Utc::now());
        *slot = record.clone();
        Ok(record)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.lock()?
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn read_all(&self) -> Result<Vec<R>, StoreError> {
        Ok(self.lock()?.rows.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{Job, JobState, NewJob};

    #[tokio::test]
    async fn test_ids_are_monotonic_and_not_reused() {
        let repo = MemoryRepository::<Job>::new();
        let a = repo.create(NewJob { image_id: 10 }).await.unwrap();
        let b = repo.create(NewJob { image_id: 11 }).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        repo.delete(b.id).await.unwrap();
        let c = repo.create(NewJob { image_id: 12 }).await.unwrap();
        assert_eq!(c.id, 3);
        assert_eq!(c.state, JobState::Waiting);
    }

    #[tokio::test]
    async fn test_update_refreshes_timestamp() {
        let repo = MemoryRepository::<Job>::new();
        let job = repo.create(NewJob { image_id: 1 }).await.unwrap();
        let updated = repo.update(job.started()).await.unwrap();
        assert_eq!(updated.state, JobState::Running);
        assert!(updated.updated_at >= job.updated_at);
        assert_eq!(updated.created_at, job.created_at);
        assert_eq!(repo.read(job.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let repo = MemoryRepository::<Job>::new();
        assert!(matches!(repo.read(4).await, Err(StoreError::NotFound(4))));
        assert!(matches!(repo.delete(4).await, Err(StoreError::NotFound(4))));

        let ghost = Job::from_draft(9, Utc::now(), NewJob { image_id: 1 });
        assert!(matches!(repo.update(ghost).await, Err(StoreError::NotFound(9))));
    }

    #[tokio::test]
    async fn test_with_rows_continues_numbering() {
        let now = Utc::now();
        let repo = MemoryRepository::with_rows(vec![
            Job::from_draft(3, now, NewJob { image_id: 1 }),
            Job::from_draft(5, now, NewJob { image_id: 2 }),
        ]);
        let next = repo.create(NewJob { image_id: 3 }).await.unwrap();
        assert_eq!(next.id, 6);
        assert_eq!(repo.read_all().await.unwrap().len(), 3);
    }
}
