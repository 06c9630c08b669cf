use crate::clock::Clock;
use crate::error::{Result, SyncError};
use crate::grouping::GroupingResolver;
use crate::identity::IdentityResolver;
use crate::metrics_defs::{
    RANKING_SEEDED, REPARENTED_ROWS, SYNC_FAILED, SYNC_INSERTED, SYNC_REFRESHED, SYNC_UNCHANGED,
    UNION_SEEDED,
};
use crate::read_cache::ReadCache;
use crate::store::CharacterStore;
use crate::throttle::SeedThrottle;
use crate::types::{
    CharacterProfile, CharacterRecord, Ocid, ReparentBatch, SyncOutcome, Synced, UnionMember,
};
use crate::upstream::{UpstreamCharacterApi, UpstreamError};
use chrono::NaiveDate;
use shared::{counter, histogram};
use std::sync::Arc;

pub const DEFAULT_MAX_UNION_FANOUT: usize = 64;

/// Keeps stored character records in step with upstream and owns every
/// invalidation of the read cache.
///
/// Syncs run sequentially within a call. Two concurrent syncs of the same
/// ocid are not excluded from each other and may both write.
pub struct SyncEngine {
    upstream: Arc<dyn UpstreamCharacterApi>,
    store: Arc<dyn CharacterStore>,
    cache: Arc<dyn ReadCache>,
    throttle: Arc<dyn SeedThrottle>,
    clock: Arc<dyn Clock>,
    max_union_fanout: usize,
}

impl SyncEngine {
    pub fn new(
        upstream: Arc<dyn UpstreamCharacterApi>,
        store: Arc<dyn CharacterStore>,
        cache: Arc<dyn ReadCache>,
        throttle: Arc<dyn SeedThrottle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        SyncEngine {
            upstream,
            store,
            cache,
            throttle,
            clock,
            max_union_fanout: DEFAULT_MAX_UNION_FANOUT,
        }
    }

    /// Caps how many bare union member records one sync may insert.
    pub fn with_max_union_fanout(mut self, max_union_fanout: usize) -> Self {
        self.max_union_fanout = max_union_fanout;
        self
    }

    /// Resolves `character_name`, refreshes its record at most once per
    /// calendar day and propagates grouping parent changes.
    pub async fn sync_character(&self, character_name: &str) -> Result<Synced> {
        let result = self.sync_character_inner(character_name).await;

        match &result {
            Ok(synced) => {
                let metric_def = match synced.outcome {
                    SyncOutcome::Inserted => SYNC_INSERTED,
                    SyncOutcome::Unchanged => SYNC_UNCHANGED,
                    SyncOutcome::Refreshed { .. } => SYNC_REFRESHED,
                };
                counter!(metric_def).increment(1);
            }
            Err(err) => {
                counter!(SYNC_FAILED).increment(1);
                tracing::warn!(character_name, error = %err, "character sync failed");
            }
        }
        result
    }

    /// Syncs each name in order. A failure is reported for its name and does
    /// not stop the rest of the batch.
    pub async fn sync_characters(&self, names: &[String]) -> Vec<(String, Result<Synced>)> {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push((name.clone(), self.sync_character(name).await));
        }
        results
    }

    /// Inserts a bare self-parented record for a name seen in a ranking list.
    ///
    /// Names that already have a record cost no upstream calls. Names that no
    /// longer resolve upstream are skipped without error. Every other entry
    /// waits on the seed throttle, which spaces consecutive seeds by the
    /// configured cooldown and lets the first one through at once.
    pub async fn sync_from_ranking_entry(
        &self,
        character_name: &str,
    ) -> Result<Option<CharacterRecord>> {
        if self.store.find_by_name(character_name).await?.is_some() {
            return Ok(None);
        }

        self.throttle.acquire().await;

        let Some(ocid) = IdentityResolver::new(self.upstream.as_ref())
            .resolve(character_name)
            .await?
        else {
            tracing::debug!(character_name, "ranking entry no longer resolves upstream");
            return Ok(None);
        };

        // Renamed since the ranking was published.
        if self.store.find_by_ocid(&ocid).await?.is_some() {
            return Ok(None);
        }

        let profile = self.fetch_profile(&ocid).await?;
        let record =
            CharacterRecord::from_upstream(ocid.clone(), &profile, ocid, self.clock.today());
        self.store.insert(&record).await?;
        self.cache.invalidate_grouping_members(&record.grouping_parent_id);

        counter!(RANKING_SEEDED).increment(1);
        tracing::info!(ocid = %record.ocid, character_name, "seeded character from ranking");
        Ok(Some(record))
    }

    pub async fn get_record(&self, ocid: &str) -> Result<CharacterRecord> {
        if let Some(record) = self.cache.record(ocid) {
            return Ok(record);
        }

        let record = self
            .store
            .find_by_ocid(ocid)
            .await?
            .ok_or_else(|| SyncError::RecordNotFound(ocid.to_string()))?;
        self.cache.put_record(record.clone());
        Ok(record)
    }

    pub async fn get_grouping_members(&self, parent_ocid: &str) -> Result<Arc<Vec<CharacterRecord>>> {
        if let Some(members) = self.cache.grouping_members(parent_ocid) {
            return Ok(members);
        }

        let members = Arc::new(self.store.find_by_grouping_parent(parent_ocid).await?);
        self.cache
            .put_grouping_members(parent_ocid, Arc::clone(&members));
        Ok(members)
    }

    /// Grouping parent of the stored record for `character_name`.
    pub async fn parent_ocid_by_name(&self, character_name: &str) -> Result<Ocid> {
        let ocid = IdentityResolver::new(self.upstream.as_ref())
            .resolve(character_name)
            .await?
            .ok_or_else(|| SyncError::IdentityNotFound(character_name.to_string()))?;

        self.store
            .find_by_ocid(&ocid)
            .await?
            .map(|record| record.grouping_parent_id)
            .ok_or(SyncError::RecordNotFound(ocid))
    }

    async fn sync_character_inner(&self, character_name: &str) -> Result<Synced> {
        let today = self.clock.today();
        let mut identities = IdentityResolver::new(self.upstream.as_ref());

        let ocid = identities
            .resolve(character_name)
            .await?
            .ok_or_else(|| SyncError::IdentityNotFound(character_name.to_string()))?;

        let profile = self.fetch_profile(&ocid).await?;
        // Upstream spelling may differ from the requested one.
        identities.remember(&profile.basic.character_name, &ocid);

        // The union ranking is published for the previous day.
        let ranking_date = today.pred_opt().unwrap_or(today);
        let union = self
            .upstream
            .union_members(&ocid, &profile.basic.world_name, ranking_date)
            .await?;
        // Every character belongs to its own union, so an empty list is an
        // upstream gap. Nothing is written for it.
        let parent_ocid = GroupingResolver::resolve(&mut identities, &union)
            .await?
            .ok_or(SyncError::UpstreamUnavailable(UpstreamError::Empty(
                "ranking/union",
            )))?;

        self.seed_union_members(&mut identities, &ocid, &parent_ocid, &union, today)
            .await?;

        match self.store.find_by_ocid(&ocid).await? {
            None => {
                let record = CharacterRecord::from_upstream(ocid, &profile, parent_ocid, today);
                self.store.insert(&record).await?;
                self.cache
                    .invalidate_grouping_members(&record.grouping_parent_id);

                tracing::info!(ocid = %record.ocid, parent = %record.grouping_parent_id, "inserted character");
                Ok(Synced {
                    record,
                    outcome: SyncOutcome::Inserted,
                })
            }
            Some(existing) if existing.last_sync_date >= today => {
                tracing::debug!(ocid = %existing.ocid, "already synced today");
                Ok(Synced {
                    record: existing,
                    outcome: SyncOutcome::Unchanged,
                })
            }
            Some(mut existing) => {
                merge_profile(&mut existing, profile, today);
                let reparented = self.move_group(&mut existing, &parent_ocid).await?;

                self.store.update(&existing).await?;
                self.cache.invalidate_record(&existing.ocid);

                tracing::info!(ocid = %existing.ocid, reparented, "refreshed character");
                Ok(Synced {
                    record: existing,
                    outcome: SyncOutcome::Refreshed { reparented },
                })
            }
        }
    }

    /// Moves `record` and every sibling under its current parent to
    /// `parent_ocid`. The caller persists `record` itself.
    ///
    /// Both parents' member views are invalidated before the batch rewrite.
    async fn move_group(&self, record: &mut CharacterRecord, parent_ocid: &str) -> Result<bool> {
        if record.grouping_parent_id == parent_ocid {
            return Ok(false);
        }

        let old_parent = record.grouping_parent_id.clone();
        self.cache.invalidate_grouping_members(&old_parent);
        self.cache.invalidate_grouping_members(parent_ocid);

        let siblings = self.store.find_by_grouping_parent(&old_parent).await?;
        for sibling in siblings.iter().filter(|s| s.ocid != record.ocid) {
            self.cache.invalidate_record(&sibling.ocid);
        }

        let batch = ReparentBatch {
            old_parent,
            new_parent: parent_ocid.to_string(),
            exclude_ocid: record.ocid.clone(),
        };
        let moved = self.store.batch_update_grouping_parent(&batch).await?;
        histogram!(REPARENTED_ROWS).record(moved as f64);

        tracing::info!(
            ocid = %record.ocid,
            old_parent = %batch.old_parent,
            new_parent = %batch.new_parent,
            moved,
            "grouping parent changed"
        );

        record.grouping_parent_id = batch.new_parent;
        Ok(true)
    }

    /// Inserts bare records, parented to `parent_ocid`, for union members
    /// that are not stored yet. One batch write; no recursive syncs.
    ///
    /// Incomplete members are skipped, except the parent itself: a parent
    /// that cannot be stored fails the sync before anything is written.
    async fn seed_union_members(
        &self,
        identities: &mut IdentityResolver<'_>,
        subject_ocid: &str,
        parent_ocid: &str,
        union: &[UnionMember],
        today: NaiveDate,
    ) -> Result<usize> {
        // Highest union level first, so a capped fan-out still covers the parent.
        let mut ranked: Vec<&UnionMember> = union.iter().collect();
        ranked.sort_by(|a, b| b.union_level.cmp(&a.union_level));

        let mut batch: Vec<CharacterRecord> = Vec::new();
        for member in ranked {
            if batch.len() >= self.max_union_fanout {
                tracing::debug!(subject_ocid, cap = self.max_union_fanout, "union fan-out capped");
                break;
            }

            if self
                .store
                .find_by_name(&member.character_name)
                .await?
                .is_some()
            {
                continue;
            }

            let Some(member_ocid) = identities.resolve(&member.character_name).await? else {
                continue;
            };

            if member_ocid == subject_ocid
                || batch.iter().any(|r| r.ocid == member_ocid)
                || self.store.find_by_ocid(&member_ocid).await?.is_some()
            {
                continue;
            }

            let profile = match self.fetch_profile(&member_ocid).await {
                Ok(profile) => profile,
                Err(
                    err @ (SyncError::InvalidUpstreamData(_)
                    | SyncError::UpstreamUnavailable(UpstreamError::Empty(_))),
                ) if member_ocid != parent_ocid => {
                    tracing::warn!(member_ocid, error = %err, "skipping incomplete union member");
                    continue;
                }
                Err(err) => return Err(err),
            };

            batch.push(CharacterRecord::from_upstream(
                member_ocid,
                &profile,
                parent_ocid.to_string(),
                today,
            ));
        }

        histogram!(UNION_SEEDED).record(batch.len() as f64);
        if batch.is_empty() {
            return Ok(0);
        }

        self.store.batch_insert(&batch).await?;
        self.cache.invalidate_grouping_members(parent_ocid);
        Ok(batch.len())
    }

    async fn fetch_profile(&self, ocid: &str) -> Result<CharacterProfile> {
        let basic = self.upstream.basic_attributes(ocid).await?;
        let raw_power = self.upstream.combat_power(ocid).await?;
        let combat_power = raw_power.trim().parse::<i64>().map_err(|_| {
            SyncError::InvalidUpstreamData(format!("combat power {raw_power:?} for {ocid}"))
        })?;

        let guild_grouping_id = match basic.guild_name.as_deref().map(str::trim) {
            Some(guild) if !guild.is_empty() => {
                self.upstream
                    .guild_grouping_id(guild, &basic.world_name)
                    .await?
            }
            _ => None,
        };

        Ok(CharacterProfile {
            basic,
            combat_power,
            guild_grouping_id,
        })
    }
}

/// Applies fresh upstream fields to a stale record. The grouping parent is
/// handled separately.
fn merge_profile(record: &mut CharacterRecord, profile: CharacterProfile, today: NaiveDate) {
    let CharacterProfile {
        basic,
        combat_power,
        guild_grouping_id,
    } = profile;

    record.last_sync_date = today;
    record.world_name = basic.world_name;

    if record.character_name != basic.character_name {
        record.prev_name = Some(std::mem::replace(
            &mut record.character_name,
            basic.character_name,
        ));
    }

    record.combat_power = combat_power;

    // Leaving a guild upstream keeps the last known guild.
    if let Some(guild) = basic.guild_name
        && record.guild_name.as_deref() != Some(guild.as_str())
    {
        record.guild_name = Some(guild);
        record.guild_grouping_id = guild_grouping_id;
    }

    record.class_name = basic.class_name;
    record.class_tier = basic.class_tier;
    record.level = basic.level;
}
