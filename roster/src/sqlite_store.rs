//! SQLite-backed [`CharacterStore`].

use crate::store::{CharacterStore, StoreError};
use crate::types::{CharacterRecord, ReparentBatch};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;

const COLUMNS: &str = "ocid, character_name, prev_name, world_name, combat_power, guild_name, \
     guild_grouping_id, class_name, class_tier, level, grouping_parent_id, last_sync_date";

const MAX_CONNECTIONS: u32 = 5;

pub struct SqliteCharacterStore {
    pool: SqlitePool,
}

impl SqliteCharacterStore {
    /// Opens (or creates) the database at `url` and applies pending migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // An in-memory database lives and dies with its connection.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { MAX_CONNECTIONS })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(url, "character store ready");

        Ok(SqliteCharacterStore { pool })
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Sqlite>,
        record: &CharacterRecord,
    ) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO characters ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&query)
            .bind(&record.ocid)
            .bind(&record.character_name)
            .bind(&record.prev_name)
            .bind(&record.world_name)
            .bind(record.combat_power)
            .bind(&record.guild_name)
            .bind(&record.guild_grouping_id)
            .bind(&record.class_name)
            .bind(&record.class_tier)
            .bind(record.level)
            .bind(&record.grouping_parent_id)
            .bind(record.last_sync_date)
            .execute(&mut **tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    StoreError::Duplicate(record.ocid.clone())
                }
                other => StoreError::Database(other),
            })?;
        Ok(())
    }
}

#[async_trait]
impl CharacterStore for SqliteCharacterStore {
    async fn find_by_ocid(&self, ocid: &str) -> Result<Option<CharacterRecord>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE ocid = ?");
        Ok(sqlx::query_as::<_, CharacterRecord>(&query)
            .bind(ocid)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CharacterRecord>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE character_name = ? LIMIT 1");
        Ok(sqlx::query_as::<_, CharacterRecord>(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_grouping_parent(
        &self,
        parent_ocid: &str,
    ) -> Result<Vec<CharacterRecord>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM characters WHERE grouping_parent_id = ? ORDER BY ocid ASC"
        );
        Ok(sqlx::query_as::<_, CharacterRecord>(&query)
            .bind(parent_ocid)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        self.batch_insert(std::slice::from_ref(record)).await
    }

    async fn update(&self, record: &CharacterRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE characters SET
                character_name = ?,
                prev_name = ?,
                world_name = ?,
                combat_power = ?,
                guild_name = ?,
                guild_grouping_id = ?,
                class_name = ?,
                class_tier = ?,
                level = ?,
                grouping_parent_id = ?,
                last_sync_date = ?
             WHERE ocid = ?",
        )
        .bind(&record.character_name)
        .bind(&record.prev_name)
        .bind(&record.world_name)
        .bind(record.combat_power)
        .bind(&record.guild_name)
        .bind(&record.guild_grouping_id)
        .bind(&record.class_name)
        .bind(&record.class_tier)
        .bind(record.level)
        .bind(&record.grouping_parent_id)
        .bind(record.last_sync_date)
        .bind(&record.ocid)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(record.ocid.clone()));
        }
        Ok(())
    }

    async fn batch_insert(&self, records: &[CharacterRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            Self::insert_in(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn batch_update_grouping_parent(
        &self,
        batch: &ReparentBatch,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE characters SET grouping_parent_id = ?
             WHERE grouping_parent_id = ? AND ocid <> ?",
        )
        .bind(&batch.new_parent)
        .bind(&batch.old_parent)
        .bind(&batch.exclude_ocid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
