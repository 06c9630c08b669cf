// Read-through memo for the two downstream read paths. Entries never expire on
// their own; the sync engine invalidates them when grouping membership changes.
use crate::metrics_defs::{
    MEMBERS_CACHE_HIT, MEMBERS_CACHE_INVALIDATION, MEMBERS_CACHE_MISS, RECORD_CACHE_HIT,
    RECORD_CACHE_MISS,
};
use crate::types::CharacterRecord;
use moka::sync::Cache;
use shared::counter;
use std::sync::Arc;

pub const DEFAULT_MAX_RECORDS: u64 = 10_000;
pub const DEFAULT_MAX_GROUPS: u64 = 2_000;

pub trait ReadCache: Send + Sync {
    fn record(&self, ocid: &str) -> Option<CharacterRecord>;
    fn put_record(&self, record: CharacterRecord);
    fn invalidate_record(&self, ocid: &str);

    fn grouping_members(&self, parent_ocid: &str) -> Option<Arc<Vec<CharacterRecord>>>;
    fn put_grouping_members(&self, parent_ocid: &str, members: Arc<Vec<CharacterRecord>>);
    fn invalidate_grouping_members(&self, parent_ocid: &str);
}

pub struct MokaReadCache {
    records: Cache<String, CharacterRecord>,
    groups: Cache<String, Arc<Vec<CharacterRecord>>>,
}

impl MokaReadCache {
    pub fn new(max_records: u64, max_groups: u64) -> Self {
        MokaReadCache {
            records: Cache::builder().max_capacity(max_records).build(),
            groups: Cache::builder().max_capacity(max_groups).build(),
        }
    }
}

impl Default for MokaReadCache {
    fn default() -> Self {
        MokaReadCache::new(DEFAULT_MAX_RECORDS, DEFAULT_MAX_GROUPS)
    }
}

impl ReadCache for MokaReadCache {
    fn record(&self, ocid: &str) -> Option<CharacterRecord> {
        let cached = self.records.get(ocid);
        let metric_def = if cached.is_some() {
            RECORD_CACHE_HIT
        } else {
            RECORD_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        cached
    }

    fn put_record(&self, record: CharacterRecord) {
        self.records.insert(record.ocid.clone(), record);
    }

    fn invalidate_record(&self, ocid: &str) {
        self.records.invalidate(ocid);
    }

    fn grouping_members(&self, parent_ocid: &str) -> Option<Arc<Vec<CharacterRecord>>> {
        let cached = self.groups.get(parent_ocid);
        let metric_def = if cached.is_some() {
            MEMBERS_CACHE_HIT
        } else {
            MEMBERS_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        cached
    }

    fn put_grouping_members(&self, parent_ocid: &str, members: Arc<Vec<CharacterRecord>>) {
        self.groups.insert(parent_ocid.to_string(), members);
    }

    fn invalidate_grouping_members(&self, parent_ocid: &str) {
        counter!(MEMBERS_CACHE_INVALIDATION).increment(1);
        self.groups.invalidate(parent_ocid);
    }
}
