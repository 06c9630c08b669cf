use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque per-character identifier issued by the upstream API.
pub type Ocid = String;

/// A persisted character snapshot.
///
/// `grouping_parent_id` is a back-reference to the main character of the
/// union group. It is a lookup key only: rewriting it never changes the
/// identity of either record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CharacterRecord {
    pub ocid: Ocid,
    pub character_name: String,
    pub prev_name: Option<String>,
    pub world_name: String,
    pub combat_power: i64,
    pub guild_name: Option<String>,
    pub guild_grouping_id: Option<String>,
    pub class_name: String,
    pub class_tier: String,
    pub level: i64,
    pub grouping_parent_id: Ocid,
    pub last_sync_date: NaiveDate,
}

impl CharacterRecord {
    /// Builds a record straight from upstream data.
    pub fn from_upstream(
        ocid: Ocid,
        profile: &CharacterProfile,
        grouping_parent_id: Ocid,
        today: NaiveDate,
    ) -> Self {
        CharacterRecord {
            ocid,
            character_name: profile.basic.character_name.clone(),
            prev_name: None,
            world_name: profile.basic.world_name.clone(),
            combat_power: profile.combat_power,
            guild_name: profile.basic.guild_name.clone(),
            guild_grouping_id: profile.guild_grouping_id.clone(),
            class_name: profile.basic.class_name.clone(),
            class_tier: profile.basic.class_tier.clone(),
            level: profile.basic.level,
            grouping_parent_id,
            last_sync_date: today,
        }
    }
}

/// Basic attributes as returned by the upstream API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicAttributes {
    pub character_name: String,
    pub world_name: String,
    pub guild_name: Option<String>,
    pub class_name: String,
    pub class_tier: String,
    pub level: i64,
}

/// Everything fetched from upstream for a single character in one sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacterProfile {
    pub basic: BasicAttributes,
    pub combat_power: i64,
    pub guild_grouping_id: Option<String>,
}

/// Entry of a character's union list.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UnionMember {
    pub character_name: String,
    pub union_level: i64,
}

impl UnionMember {
    pub fn new<N: Into<String>>(character_name: N, union_level: i64) -> Self {
        UnionMember {
            character_name: character_name.into(),
            union_level,
        }
    }
}

/// Rewrites the grouping parent of every record currently parented to
/// `old_parent`, except `exclude_ocid`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReparentBatch {
    pub old_parent: Ocid,
    pub new_parent: Ocid,
    pub exclude_ocid: Ocid,
}

/// Result of a successful `sync_character`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Synced {
    pub record: CharacterRecord,
    pub outcome: SyncOutcome,
}

/// Which path a sync took.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SyncOutcome {
    Inserted,
    Unchanged,
    Refreshed { reparented: bool },
}
