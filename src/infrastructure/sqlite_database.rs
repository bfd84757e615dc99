use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

use crate::ent_framework::entity::EntityType;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    EntityDatabase, EntityRow, Guid, NewEntityRow, SubtypeRow, Timestamp,
};

const ENTITY_COLUMNS: &str = "e.guid, e.type, e.subtype, e.owner_guid, e.site_guid, e.container_guid, \
     e.access_id, e.time_created, e.time_updated, e.last_action, e.enabled";

/// SQLite implementation of the entity storage collaborator
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Single-connection in-memory database, used by tests and throwaway servers
    pub async fn new_in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Opens (creating if needed) the database at `url` and makes sure the schema exists
    pub async fn connect(url: &str) -> AppResult<Self> {
        if url.contains(":memory:") {
            return Self::new_in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid database url {}: {}", url, e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        let db = Self { pool };
        db.initialize().await?;
        info!("Connected entity database at {}", url);
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create entity tables for SQLite
    pub async fn initialize(&self) -> AppResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                guid INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                subtype INTEGER NOT NULL DEFAULT 0,
                owner_guid INTEGER NOT NULL DEFAULT 0,
                site_guid INTEGER NOT NULL DEFAULT 0,
                container_guid INTEGER NOT NULL DEFAULT 0,
                access_id INTEGER NOT NULL DEFAULT 0,
                time_created INTEGER NOT NULL,
                time_updated INTEGER NOT NULL,
                last_action INTEGER NOT NULL DEFAULT 0,
                enabled TEXT NOT NULL DEFAULT 'yes'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS entity_subtypes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type TEXT NOT NULL,
                subtype TEXT NOT NULL,
                class TEXT NOT NULL DEFAULT '',
                UNIQUE (type, subtype)
            )
            "#,
            "CREATE TABLE IF NOT EXISTS objects_entity (guid INTEGER PRIMARY KEY, attributes TEXT NOT NULL DEFAULT '{}')",
            "CREATE TABLE IF NOT EXISTS users_entity (guid INTEGER PRIMARY KEY, attributes TEXT NOT NULL DEFAULT '{}')",
            "CREATE TABLE IF NOT EXISTS groups_entity (guid INTEGER PRIMARY KEY, attributes TEXT NOT NULL DEFAULT '{}')",
            "CREATE TABLE IF NOT EXISTS sites_entity (guid INTEGER PRIMARY KEY, attributes TEXT NOT NULL DEFAULT '{}')",
            r#"
            CREATE TABLE IF NOT EXISTS private_settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_guid INTEGER NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE (entity_guid, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS entity_relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guid_one INTEGER NOT NULL,
                relationship TEXT NOT NULL,
                guid_two INTEGER NOT NULL,
                time_created INTEGER NOT NULL,
                UNIQUE (guid_one, relationship, guid_two)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_entities_type_subtype ON entities(type, subtype)",
            "CREATE INDEX IF NOT EXISTS idx_entities_owner ON entities(owner_guid)",
            "CREATE INDEX IF NOT EXISTS idx_entities_container ON entities(container_guid)",
            "CREATE INDEX IF NOT EXISTS idx_entities_site ON entities(site_guid)",
            "CREATE INDEX IF NOT EXISTS idx_entities_time_created ON entities(time_created)",
            "CREATE INDEX IF NOT EXISTS idx_relationships_two ON entity_relationships(guid_two, relationship)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to initialize schema: {}", e)))?;
        }

        Ok(())
    }
}

fn entity_row_from(row: &SqliteRow) -> Result<EntityRow, sqlx::Error> {
    Ok(EntityRow {
        guid: row.try_get("guid")?,
        entity_type: row.try_get("type")?,
        subtype_id: row.try_get("subtype")?,
        owner_guid: row.try_get("owner_guid")?,
        site_guid: row.try_get("site_guid")?,
        container_guid: row.try_get("container_guid")?,
        access_id: row.try_get("access_id")?,
        time_created: row.try_get("time_created")?,
        time_updated: row.try_get("time_updated")?,
        last_action: row.try_get("last_action")?,
        enabled: row.try_get::<String, _>("enabled")? == "yes",
    })
}

fn subtype_row_from(row: &SqliteRow) -> Result<SubtypeRow, sqlx::Error> {
    Ok(SubtypeRow {
        id: row.try_get("id")?,
        entity_type: row.try_get("type")?,
        subtype: row.try_get("subtype")?,
        class: row.try_get("class")?,
    })
}

#[async_trait]
impl EntityDatabase for SqliteDatabase {
    async fn get_subtype(&self, entity_type: &str, subtype: &str) -> AppResult<Option<SubtypeRow>> {
        let row = sqlx::query("SELECT id, type, subtype, class FROM entity_subtypes WHERE type = ? AND subtype = ?")
            .bind(entity_type)
            .bind(subtype)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get subtype {}:{}: {}", entity_type, subtype, e))
            })?;

        row.as_ref()
            .map(subtype_row_from)
            .transpose()
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode subtype row: {}", e)))
    }

    async fn get_subtype_by_id(&self, id: i64) -> AppResult<Option<SubtypeRow>> {
        let row = sqlx::query("SELECT id, type, subtype, class FROM entity_subtypes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get subtype {}: {}", id, e)))?;

        row.as_ref()
            .map(subtype_row_from)
            .transpose()
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode subtype row: {}", e)))
    }

    async fn insert_subtype(&self, entity_type: &str, subtype: &str, class: &str) -> AppResult<i64> {
        let result = sqlx::query("INSERT INTO entity_subtypes (type, subtype, class) VALUES (?, ?, ?)")
            .bind(entity_type)
            .bind(subtype)
            .bind(class)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to insert subtype {}:{}: {}", entity_type, subtype, e))
            })?;
        Ok(result.last_insert_rowid())
    }

    async fn update_subtype(&self, id: i64, entity_type: &str, subtype: &str, class: &str) -> AppResult<bool> {
        let result = sqlx::query("UPDATE entity_subtypes SET type = ?, subtype = ?, class = ? WHERE id = ?")
            .bind(entity_type)
            .bind(subtype)
            .bind(class)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update subtype {}: {}", id, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_subtype(&self, entity_type: &str, subtype: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM entity_subtypes WHERE type = ? AND subtype = ?")
            .bind(entity_type)
            .bind(subtype)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete subtype {}:{}: {}", entity_type, subtype, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_entity(&self, row: NewEntityRow) -> AppResult<Guid> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO entities (type, subtype, owner_guid, site_guid, container_guid, access_id, time_created, time_updated, last_action, enabled) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'yes')",
        )
        .bind(row.entity_type.as_str())
        .bind(row.subtype_id)
        .bind(row.owner_guid)
        .bind(row.site_guid)
        .bind(row.container_guid)
        .bind(row.access_id)
        .bind(row.time)
        .bind(row.time)
        .bind(row.time)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert {} entity: {}", row.entity_type, e)))?;

        let guid = result.last_insert_rowid();

        let sql = format!(
            "INSERT INTO {} (guid, attributes) VALUES (?, ?)",
            row.entity_type.extension_table()
        );
        sqlx::query(&sql)
            .bind(guid)
            .bind(&row.attributes)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to insert extension row for {}: {}", guid, e))
            })?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit transaction: {}", e)))?;

        debug!("Inserted {} entity {}", row.entity_type, guid);
        Ok(guid)
    }

    async fn get_entity_row(&self, guid: Guid, access_sql: &str) -> AppResult<Option<EntityRow>> {
        let sql = format!(
            "SELECT {} FROM entities e WHERE e.guid = ? AND ({})",
            ENTITY_COLUMNS, access_sql
        );
        let row = sqlx::query(&sql)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get entity {}: {}", guid, e)))?;

        row.as_ref()
            .map(entity_row_from)
            .transpose()
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode entity {}: {}", guid, e)))
    }

    async fn get_extension_attributes(&self, entity_type: EntityType, guid: Guid) -> AppResult<Option<String>> {
        let sql = format!(
            "SELECT attributes FROM {} WHERE guid = ?",
            entity_type.extension_table()
        );
        let row = sqlx::query(&sql)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get extension row for {}: {}", guid, e))
            })?;

        row.map(|r| r.try_get::<String, _>("attributes"))
            .transpose()
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to decode extension row for {}: {}", guid, e))
            })
    }

    async fn update_entity(
        &self,
        guid: Guid,
        owner_guid: Guid,
        access_id: i64,
        container_guid: Guid,
        time_updated: Timestamp,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE entities SET owner_guid = ?, access_id = ?, container_guid = ?, time_updated = ? WHERE guid = ?",
        )
        .bind(owner_guid)
        .bind(access_id)
        .bind(container_guid)
        .bind(time_updated)
        .bind(guid)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update entity {}: {}", guid, e)))?;
        Ok(result.rows_affected())
    }

    async fn set_enabled(&self, guid: Guid, enabled: bool) -> AppResult<u64> {
        let result = sqlx::query("UPDATE entities SET enabled = ? WHERE guid = ?")
            .bind(if enabled { "yes" } else { "no" })
            .bind(guid)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to change enabled state of {}: {}", guid, e))
            })?;
        Ok(result.rows_affected())
    }

    async fn update_last_action(&self, guid: Guid, posted: Timestamp) -> AppResult<u64> {
        let result = sqlx::query("UPDATE entities SET last_action = ? WHERE guid = ?")
            .bind(posted)
            .bind(guid)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to touch last action of {}: {}", guid, e))
            })?;
        Ok(result.rows_affected())
    }

    async fn delete_entity_row(&self, guid: Guid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE guid = ?")
            .bind(guid)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete entity {}: {}", guid, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_extension_row(&self, entity_type: EntityType, guid: Guid) -> AppResult<bool> {
        let sql = format!("DELETE FROM {} WHERE guid = ?", entity_type.extension_table());
        let result = sqlx::query(&sql)
            .bind(guid)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete extension row for {}: {}", guid, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_sub_entity_rows(&self, guid: Guid, entity_type: EntityType) -> AppResult<Vec<EntityRow>> {
        let sweeps_site = entity_type == EntityType::Site;
        let sql = format!(
            "SELECT {} FROM entities e \
             WHERE (e.container_guid = ? OR e.owner_guid = ?{}) AND e.guid != ? \
             ORDER BY e.guid",
            ENTITY_COLUMNS,
            if sweeps_site { " OR e.site_guid = ?" } else { "" }
        );

        let mut query = sqlx::query(&sql).bind(guid).bind(guid);
        if sweeps_site {
            query = query.bind(guid);
        }
        let rows = query
            .bind(guid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get entities under {}: {}", guid, e))
            })?;

        rows.iter()
            .map(entity_row_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode entity row: {}", e)))
    }

    async fn delete_orphaned_extension_rows(&self) -> AppResult<u64> {
        let mut removed = 0;
        for entity_type in EntityType::ALL {
            let sql = format!(
                "DELETE FROM {} WHERE guid NOT IN (SELECT guid FROM entities)",
                entity_type.extension_table()
            );
            let result = sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!(
                        "Failed to collect orphaned {} rows: {}",
                        entity_type.extension_table(),
                        e
                    ))
                })?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn query_entity_rows(&self, sql: &str) -> AppResult<Vec<EntityRow>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to run entity query: {}", e)))?;

        rows.iter()
            .map(entity_row_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode entity row: {}", e)))
    }

    async fn query_count(&self, sql: &str) -> AppResult<i64> {
        let row = sqlx::query(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to run count query: {}", e)))?;

        row.try_get::<i64, _>(0)
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode count: {}", e)))
    }

    async fn query_strings(&self, sql: &str) -> AppResult<Vec<String>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to run query: {}", e)))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<Option<String>, _>(0).ok().flatten())
            .collect())
    }

    async fn get_private_setting(&self, guid: Guid, name: &str) -> AppResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM private_settings WHERE entity_guid = ? AND name = ?")
            .bind(guid)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get private setting {} of {}: {}", name, guid, e))
            })?;
        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to decode private setting {} of {}: {}", name, guid, e))
            })
    }

    async fn get_all_private_settings(&self, guid: Guid) -> AppResult<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT name, value FROM private_settings WHERE entity_guid = ?")
            .bind(guid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get private settings of {}: {}", guid, e))
            })?;

        rows.iter()
            .map(|r| Ok((r.try_get::<String, _>("name")?, r.try_get::<String, _>("value")?)))
            .collect::<Result<BTreeMap<_, _>, sqlx::Error>>()
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to decode private settings of {}: {}", guid, e))
            })
    }

    async fn set_private_setting(&self, guid: Guid, name: &str, value: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO private_settings (entity_guid, name, value) VALUES (?, ?, ?) \
             ON CONFLICT (entity_guid, name) DO UPDATE SET value = excluded.value",
        )
        .bind(guid)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to set private setting {} of {}: {}", name, guid, e))
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_private_setting(&self, guid: Guid, name: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM private_settings WHERE entity_guid = ? AND name = ?")
            .bind(guid)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to remove private setting {} of {}: {}", name, guid, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_all_private_settings(&self, guid: Guid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM private_settings WHERE entity_guid = ?")
            .bind(guid)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to remove private settings of {}: {}", guid, e))
            })?;
        Ok(result.rows_affected())
    }

    async fn add_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO entity_relationships (guid_one, relationship, guid_two, time_created) VALUES (?, ?, ?, ?)",
        )
        .bind(guid_one)
        .bind(relationship)
        .bind(guid_two)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to add relationship: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn check_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM entity_relationships WHERE guid_one = ? AND relationship = ? AND guid_two = ?",
        )
        .bind(guid_one)
        .bind(relationship)
        .bind(guid_two)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to check relationship: {}", e)))?;
        Ok(row.is_some())
    }

    async fn remove_relationship(&self, guid_one: Guid, relationship: &str, guid_two: Guid) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM entity_relationships WHERE guid_one = ? AND relationship = ? AND guid_two = ?",
        )
        .bind(guid_one)
        .bind(relationship)
        .bind(guid_two)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to remove relationship: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_relationships(&self, guid: Guid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM entity_relationships WHERE guid_one = ? OR guid_two = ?")
            .bind(guid)
            .bind(guid)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to clear relationships of {}: {}", guid, e))
            })?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_object(owner_guid: Guid, container_guid: Guid) -> NewEntityRow {
        NewEntityRow {
            entity_type: EntityType::Object,
            subtype_id: 0,
            owner_guid,
            site_guid: 1,
            container_guid,
            access_id: 2,
            time: 1_700_000_000,
            attributes: r#"{"title":"hello"}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_writes_both_halves() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let guid = db.insert_entity(new_object(5, 5)).await.unwrap();

        let row = db.get_entity_row(guid, "1 = 1").await.unwrap().unwrap();
        assert_eq!(row.entity_type, "object");
        assert_eq!(row.owner_guid, 5);
        assert!(row.enabled);
        assert_eq!(row.last_action, 1_700_000_000);

        let attributes = db
            .get_extension_attributes(EntityType::Object, guid)
            .await
            .unwrap();
        assert_eq!(attributes.as_deref(), Some(r#"{"title":"hello"}"#));
    }

    #[tokio::test]
    async fn test_private_setting_upsert() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        assert!(db.set_private_setting(3, "theme", "dark").await.unwrap());
        assert!(db.set_private_setting(3, "theme", "light").await.unwrap());
        db.set_private_setting(3, "lang", "en").await.unwrap();

        assert_eq!(
            db.get_private_setting(3, "theme").await.unwrap().as_deref(),
            Some("light")
        );
        assert_eq!(db.get_all_private_settings(3).await.unwrap().len(), 2);
        assert!(db.remove_private_setting(3, "theme").await.unwrap());
        assert!(!db.remove_private_setting(3, "theme").await.unwrap());
        assert_eq!(db.remove_all_private_settings(3).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_values_are_errors() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO private_settings (entity_guid, name, value) VALUES (4, 'avatar', x'00ff')")
            .execute(db.pool())
            .await
            .unwrap();

        assert!(matches!(
            db.get_private_setting(4, "avatar").await,
            Err(AppError::DatabaseError(_))
        ));
        assert!(matches!(
            db.get_all_private_settings(4).await,
            Err(AppError::DatabaseError(_))
        ));
    }

    #[tokio::test]
    async fn test_sub_entity_sweep_excludes_self() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let parent = db.insert_entity(new_object(0, 0)).await.unwrap();
        let owned = db.insert_entity(new_object(parent, 0)).await.unwrap();
        let contained = db.insert_entity(new_object(0, parent)).await.unwrap();
        db.insert_entity(new_object(0, 0)).await.unwrap();

        let guids: Vec<Guid> = db
            .get_sub_entity_rows(parent, EntityType::Object)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.guid)
            .collect();
        assert_eq!(guids, vec![owned, contained]);
    }

    #[tokio::test]
    async fn test_sub_entity_sweep_follows_site_only_for_sites() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        // new_object places everything on site 1
        let first = db.insert_entity(new_object(7, 7)).await.unwrap();
        let sited = db.insert_entity(new_object(8, 8)).await.unwrap();
        assert_eq!(first, 1);

        assert!(db
            .get_sub_entity_rows(first, EntityType::Object)
            .await
            .unwrap()
            .is_empty());

        let guids: Vec<Guid> = db
            .get_sub_entity_rows(first, EntityType::Site)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.guid)
            .collect();
        assert_eq!(guids, vec![sited]);
    }

    #[tokio::test]
    async fn test_orphaned_extension_rows_are_collected() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let guid = db.insert_entity(new_object(1, 1)).await.unwrap();
        assert!(db.delete_entity_row(guid).await.unwrap());

        assert_eq!(db.delete_orphaned_extension_rows().await.unwrap(), 1);
        assert!(db
            .get_extension_attributes(EntityType::Object, guid)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_relationships_cleared_from_both_sides() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        assert!(db.add_relationship(1, "member", 2).await.unwrap());
        assert!(!db.add_relationship(1, "member", 2).await.unwrap());
        db.add_relationship(2, "friend", 3).await.unwrap();
        db.add_relationship(4, "friend", 5).await.unwrap();

        assert!(db.check_relationship(1, "member", 2).await.unwrap());
        assert_eq!(db.clear_relationships(2).await.unwrap(), 2);
        assert!(db.check_relationship(4, "friend", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("entities.db").display());

        let guid = {
            let db = SqliteDatabase::connect(&url).await.unwrap();
            db.insert_entity(new_object(1, 1)).await.unwrap()
        };

        let db = SqliteDatabase::connect(&url).await.unwrap();
        assert!(db.get_entity_row(guid, "1 = 1").await.unwrap().is_some());
    }
}
