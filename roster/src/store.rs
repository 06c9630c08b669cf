//! Persistence capability for character records, plus an in-memory
//! implementation used by tests and the `memory` store type.
use crate::types::{CharacterRecord, ReparentBatch};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    Missing(String),
}

#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn find_by_ocid(&self, ocid: &str) -> Result<Option<CharacterRecord>, StoreError>;

    /// Looks up by current character name.
    async fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError>;

    /// All records whose grouping parent is `parent_ocid`, ordered by ocid.
    async fn find_by_grouping_parent(
        &self,
        parent_ocid: &str,
    ) -> Result<Vec<CharacterRecord>, StoreError>;

    async fn insert(&self, record: &CharacterRecord) -> Result<(), StoreError>;

    async fn update(&self, record: &CharacterRecord) -> Result<(), StoreError>;

    /// Inserts all records as one grouped write.
    async fn batch_insert(&self, records: &[CharacterRecord]) -> Result<(), StoreError>;

    /// Applies a reparent command as one grouped write and returns the number
    /// of rows moved.
    async fn batch_update_grouping_parent(&self, batch: &ReparentBatch)
    -> Result<u64, StoreError>;
}

#[derive(Default)]
pub struct MemoryCharacterStore {
    records: RwLock<BTreeMap<String, CharacterRecord>>,
}

impl MemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Every stored record, ordered by ocid.
    pub fn snapshot(&self) -> Vec<CharacterRecord> {
        self.records.read().values().cloned().collect()
    }
}

#[async_trait]
impl CharacterStore for MemoryCharacterStore {
    async fn find_by_ocid(&self, ocid: &str) -> Result<Option<CharacterRecord>, StoreError> {
        Ok(self.records.read().get(ocid).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.character_name == name)
            .cloned())
    }

    async fn find_by_grouping_parent(
        &self,
        parent_ocid: &str,
    ) -> Result<Vec<CharacterRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.grouping_parent_id == parent_ocid)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        self.batch_insert(std::slice::from_ref(record)).await
    }

    async fn update(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let mut guard = self.records.write();
        match guard.get_mut(&record.ocid) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(record.ocid.clone())),
        }
    }

    async fn batch_insert(&self, records: &[CharacterRecord]) -> Result<(), StoreError> {
        let mut guard = self.records.write();

        // All or nothing, like the SQL transaction.
        for (i, record) in records.iter().enumerate() {
            if guard.contains_key(&record.ocid)
                || records[..i].iter().any(|r| r.ocid == record.ocid)
            {
                return Err(StoreError::Duplicate(record.ocid.clone()));
            }
        }

        for record in records {
            guard.insert(record.ocid.clone(), record.clone());
        }
        Ok(())
    }

    async fn batch_update_grouping_parent(
        &self,
        batch: &ReparentBatch,
    ) -> Result<u64, StoreError> {
        let mut guard = self.records.write();
        let mut moved = 0;

        for record in guard.values_mut() {
            if record.grouping_parent_id == batch.old_parent && record.ocid != batch.exclude_ocid {
                record.grouping_parent_id = batch.new_parent.clone();
                moved += 1;
            }
        }
        Ok(moved)
    }
}
