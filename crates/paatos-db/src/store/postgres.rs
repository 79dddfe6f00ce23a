//! Postgres store.
//!
//! Entities are persisted in a single `entities` table with the field map in
//! a JSONB column, keyed by `(data_source_id, kind, origin_id)`. Transactions
//! map directly onto Postgres transactions taken from the pool.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::entity::{DataSource, Entity};
use crate::error::{DbError, DbResult};
use crate::kind::EntityKind;
use crate::store::Store;

const ENTITY_COLUMNS: &str = "id, data_source_id, kind, origin_id, fields";

/// Postgres-backed [`Store`] implementation.
pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    /// Create a store on top of a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    fn row_to_entity(row: &PgRow) -> DbResult<Entity> {
        let kind_str: String = row.try_get("kind")?;
        let kind: EntityKind = kind_str.parse().map_err(DbError::UnknownKind)?;
        let fields_json: serde_json::Value = row.try_get("fields")?;
        Ok(Entity {
            id: Some(row.try_get("id")?),
            data_source_id: row.try_get("data_source_id")?,
            kind,
            origin_id: row.try_get("origin_id")?,
            fields: serde_json::from_value(fields_json)?,
            changes: Default::default(),
        })
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn get_or_create_data_source(
        &mut self,
        identifier: &str,
        name: &str,
    ) -> DbResult<DataSource> {
        let insert = sqlx::query(
            r"
            INSERT INTO data_sources (id, identifier, name, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (identifier) DO NOTHING
            ",
        )
        .bind(Uuid::new_v4())
        .bind(identifier)
        .bind(name);
        match self.tx.as_deref_mut() {
            Some(conn) => insert.execute(&mut *conn).await?,
            None => insert.execute(&self.pool).await?,
        };

        let select = sqlx::query(
            r"
            SELECT id, identifier, name, created_at
            FROM data_sources
            WHERE identifier = $1
            ",
        )
        .bind(identifier);
        let row = match self.tx.as_deref_mut() {
            Some(conn) => select.fetch_one(&mut *conn).await?,
            None => select.fetch_one(&self.pool).await?,
        };

        Ok(DataSource {
            id: row.try_get("id")?,
            identifier: row.try_get("identifier")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    #[instrument(skip(self))]
    async fn find_all(&mut self, data_source: Uuid, kind: EntityKind) -> DbResult<Vec<Entity>> {
        let sql = format!(
            r"
            SELECT {ENTITY_COLUMNS}
            FROM entities
            WHERE data_source_id = $1 AND kind = $2
            ORDER BY origin_id
            "
        );
        let query = sqlx::query(&sql).bind(data_source).bind(kind.as_str());
        let rows = match self.tx.as_deref_mut() {
            Some(conn) => query.fetch_all(&mut *conn).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        rows.iter().map(Self::row_to_entity).collect()
    }

    #[instrument(skip(self))]
    async fn find_by_origin_id(
        &mut self,
        data_source: Uuid,
        kind: EntityKind,
        origin_id: &str,
    ) -> DbResult<Option<Entity>> {
        let sql = format!(
            r"
            SELECT {ENTITY_COLUMNS}
            FROM entities
            WHERE data_source_id = $1 AND kind = $2 AND origin_id = $3
            "
        );
        let query = sqlx::query(&sql)
            .bind(data_source)
            .bind(kind.as_str())
            .bind(origin_id);
        let row = match self.tx.as_deref_mut() {
            Some(conn) => query.fetch_optional(&mut *conn).await?,
            None => query.fetch_optional(&self.pool).await?,
        };
        row.as_ref().map(Self::row_to_entity).transpose()
    }

    #[instrument(skip(self))]
    async fn find_related(
        &mut self,
        data_source: Uuid,
        kind: EntityKind,
        field: &str,
        target: Uuid,
    ) -> DbResult<Vec<Entity>> {
        let sql = format!(
            r"
            SELECT {ENTITY_COLUMNS}
            FROM entities
            WHERE data_source_id = $1 AND kind = $2
              AND fields -> $3 ->> 'type' = 'relation'
              AND fields -> $3 ->> 'value' = $4
            ORDER BY origin_id
            "
        );
        let query = sqlx::query(&sql)
            .bind(data_source)
            .bind(kind.as_str())
            .bind(field)
            .bind(target.to_string());
        let rows = match self.tx.as_deref_mut() {
            Some(conn) => query.fetch_all(&mut *conn).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        rows.iter().map(Self::row_to_entity).collect()
    }

    #[instrument(skip(self, entity), fields(kind = %entity.kind, origin_id = %entity.origin_id))]
    async fn save(&mut self, entity: &mut Entity) -> DbResult<()> {
        let id = entity.id.unwrap_or_else(Uuid::new_v4);
        entity.id = Some(id);
        let fields_json = serde_json::to_value(&entity.fields)?;

        let query = sqlx::query(
            r"
            INSERT INTO entities (id, data_source_id, kind, origin_id, fields, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                fields = EXCLUDED.fields,
                updated_at = NOW()
            ",
        )
        .bind(id)
        .bind(entity.data_source_id)
        .bind(entity.kind.as_str())
        .bind(&entity.origin_id)
        .bind(&fields_json);
        match self.tx.as_deref_mut() {
            Some(conn) => query.execute(&mut *conn).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(())
    }

    #[instrument(skip(self, entity), fields(kind = %entity.kind, origin_id = %entity.origin_id))]
    async fn delete(&mut self, entity: &Entity) -> DbResult<()> {
        let id = entity
            .id
            .ok_or_else(|| DbError::not_persisted(entity.kind, entity.origin_id.clone()))?;
        let query = sqlx::query("DELETE FROM entities WHERE id = $1").bind(id);
        match self.tx.as_deref_mut() {
            Some(conn) => query.execute(&mut *conn).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn begin(&mut self) -> DbResult<()> {
        if self.tx.is_some() {
            return Err(DbError::transaction("transaction already open"));
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction to commit"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::transaction("no open transaction to roll back"))?;
        tx.rollback().await?;
        Ok(())
    }
}
