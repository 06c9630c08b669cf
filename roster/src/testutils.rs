use crate::clock::Clock;
use crate::read_cache::{MokaReadCache, ReadCache};
use crate::store::{CharacterStore, MemoryCharacterStore, StoreError};
use crate::throttle::SeedThrottle;
use crate::types::{BasicAttributes, CharacterRecord, Ocid, ReparentBatch, UnionMember};
use crate::upstream::{UpstreamCharacterApi, UpstreamError};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn basic(name: &str, world: &str) -> BasicAttributes {
    BasicAttributes {
        character_name: name.into(),
        world_name: world.into(),
        guild_name: None,
        class_name: "Hero".into(),
        class_tier: "6".into(),
        level: 200,
    }
}

pub fn record(ocid: &str, name: &str, parent: &str) -> CharacterRecord {
    CharacterRecord {
        ocid: ocid.into(),
        character_name: name.into(),
        prev_name: None,
        world_name: "Scania".into(),
        combat_power: 1000,
        guild_name: None,
        guild_grouping_id: None,
        class_name: "Hero".into(),
        class_tier: "6".into(),
        level: 200,
        grouping_parent_id: parent.into(),
        last_sync_date: date(2024, 3, 1),
    }
}

#[derive(Default)]
struct UpstreamData {
    identities: HashMap<String, Ocid>,
    basics: HashMap<Ocid, BasicAttributes>,
    powers: HashMap<Ocid, String>,
    unions: HashMap<Ocid, Vec<UnionMember>>,
    guilds: HashMap<(String, String), String>,
}

/// Scripted upstream that counts every call by method and argument.
#[derive(Default)]
pub struct FakeUpstream {
    data: Mutex<UpstreamData>,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(self, name: &str, ocid: &str) -> Self {
        self.data
            .lock()
            .identities
            .insert(name.into(), ocid.into());
        self
    }

    pub fn with_character(
        self,
        name: &str,
        ocid: &str,
        basic: BasicAttributes,
        combat_power: &str,
    ) -> Self {
        self.set_character(name, ocid, basic, combat_power);
        self
    }

    pub fn with_union(self, ocid: &str, members: Vec<UnionMember>) -> Self {
        self.set_union(ocid, members);
        self
    }

    pub fn with_guild(self, guild: &str, world: &str, id: &str) -> Self {
        self.data
            .lock()
            .guilds
            .insert((guild.into(), world.into()), id.into());
        self
    }

    pub fn set_character(&self, name: &str, ocid: &str, basic: BasicAttributes, combat_power: &str) {
        let mut data = self.data.lock();
        data.identities.insert(name.into(), ocid.into());
        data.basics.insert(ocid.into(), basic);
        data.powers.insert(ocid.into(), combat_power.into());
    }

    pub fn set_union(&self, ocid: &str, members: Vec<UnionMember>) {
        self.data.lock().unions.insert(ocid.into(), members);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| *m == method).count()
    }

    pub fn calls_for(&self, method: &str, arg: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(m, a)| *m == method && a == arg)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    fn record_call(&self, method: &'static str, arg: &str) {
        self.calls.lock().push((method, arg.to_string()));
    }
}

#[async_trait]
impl UpstreamCharacterApi for FakeUpstream {
    async fn resolve_identity(&self, character_name: &str) -> Result<Option<Ocid>, UpstreamError> {
        self.record_call("resolve_identity", character_name);
        Ok(self.data.lock().identities.get(character_name).cloned())
    }

    async fn basic_attributes(&self, ocid: &str) -> Result<BasicAttributes, UpstreamError> {
        self.record_call("basic_attributes", ocid);
        self.data
            .lock()
            .basics
            .get(ocid)
            .cloned()
            .ok_or(UpstreamError::Empty("character/basic"))
    }

    async fn combat_power(&self, ocid: &str) -> Result<String, UpstreamError> {
        self.record_call("combat_power", ocid);
        self.data
            .lock()
            .powers
            .get(ocid)
            .cloned()
            .ok_or(UpstreamError::Empty("character/stat"))
    }

    async fn union_members(
        &self,
        ocid: &str,
        _world_name: &str,
        ranking_date: NaiveDate,
    ) -> Result<Vec<UnionMember>, UpstreamError> {
        self.record_call("union_members", &format!("{ocid}:{ranking_date}"));
        Ok(self.data.lock().unions.get(ocid).cloned().unwrap_or_default())
    }

    async fn guild_grouping_id(
        &self,
        guild_name: &str,
        world_name: &str,
    ) -> Result<Option<String>, UpstreamError> {
        self.record_call("guild_grouping_id", guild_name);
        Ok(self
            .data
            .lock()
            .guilds
            .get(&(guild_name.to_string(), world_name.to_string()))
            .cloned())
    }
}

/// Shared, ordered log of store writes/reads and cache invalidations.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().push(event);
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct RecordingStore {
    inner: MemoryCharacterStore,
    events: EventLog,
}

impl RecordingStore {
    pub fn new(inner: MemoryCharacterStore, events: EventLog) -> Self {
        RecordingStore { inner, events }
    }

    pub fn inner(&self) -> &MemoryCharacterStore {
        &self.inner
    }
}

#[async_trait]
impl CharacterStore for RecordingStore {
    async fn find_by_ocid(&self, ocid: &str) -> Result<Option<CharacterRecord>, StoreError> {
        self.events.push(format!("read.find_by_ocid:{ocid}"));
        self.inner.find_by_ocid(ocid).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError> {
        self.events.push(format!("read.find_by_name:{name}"));
        self.inner.find_by_name(name).await
    }

    async fn find_by_grouping_parent(
        &self,
        parent_ocid: &str,
    ) -> Result<Vec<CharacterRecord>, StoreError> {
        self.events
            .push(format!("read.find_by_grouping_parent:{parent_ocid}"));
        self.inner.find_by_grouping_parent(parent_ocid).await
    }

    async fn insert(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        self.events.push(format!("write.insert:{}", record.ocid));
        self.inner.insert(record).await
    }

    async fn update(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        self.events.push(format!("write.update:{}", record.ocid));
        self.inner.update(record).await
    }

    async fn batch_insert(&self, records: &[CharacterRecord]) -> Result<(), StoreError> {
        self.events
            .push(format!("write.batch_insert:{}", records.len()));
        self.inner.batch_insert(records).await
    }

    async fn batch_update_grouping_parent(
        &self,
        batch: &ReparentBatch,
    ) -> Result<u64, StoreError> {
        self.events.push(format!(
            "write.reparent:{}->{}",
            batch.old_parent, batch.new_parent
        ));
        self.inner.batch_update_grouping_parent(batch).await
    }
}

pub struct RecordingCache {
    inner: MokaReadCache,
    events: EventLog,
}

impl RecordingCache {
    pub fn new(inner: MokaReadCache, events: EventLog) -> Self {
        RecordingCache { inner, events }
    }
}

impl ReadCache for RecordingCache {
    fn record(&self, ocid: &str) -> Option<CharacterRecord> {
        self.inner.record(ocid)
    }

    fn put_record(&self, record: CharacterRecord) {
        self.inner.put_record(record)
    }

    fn invalidate_record(&self, ocid: &str) {
        self.events.push(format!("cache.invalidate_record:{ocid}"));
        self.inner.invalidate_record(ocid)
    }

    fn grouping_members(&self, parent_ocid: &str) -> Option<Arc<Vec<CharacterRecord>>> {
        self.inner.grouping_members(parent_ocid)
    }

    fn put_grouping_members(&self, parent_ocid: &str, members: Arc<Vec<CharacterRecord>>) {
        self.inner.put_grouping_members(parent_ocid, members)
    }

    fn invalidate_grouping_members(&self, parent_ocid: &str) {
        self.events
            .push(format!("cache.invalidate_members:{parent_ocid}"));
        self.inner.invalidate_grouping_members(parent_ocid)
    }
}

#[derive(Default)]
pub struct CountingThrottle {
    acquired: AtomicUsize,
}

impl CountingThrottle {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SeedThrottle for CountingThrottle {
    async fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ManualClock(Mutex<NaiveDate>);

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        ManualClock(Mutex::new(today))
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.0.lock();
        *today = *today + Days::new(days);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.0.lock()
    }
}
