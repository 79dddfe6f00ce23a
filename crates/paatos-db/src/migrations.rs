//! Schema setup for the Postgres store.

use sqlx::PgPool;

use crate::error::DbResult;

const STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS data_sources (
        id UUID PRIMARY KEY,
        identifier TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS entities (
        id UUID PRIMARY KEY,
        data_source_id UUID NOT NULL REFERENCES data_sources(id),
        kind TEXT NOT NULL,
        origin_id TEXT NOT NULL,
        fields JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS entities_external_identity
        ON entities (data_source_id, kind, origin_id)
    ",
    r"
    CREATE INDEX IF NOT EXISTS entities_by_kind
        ON entities (data_source_id, kind)
    ",
];

/// Apply the store schema. Idempotent.
pub async fn run(pool: &PgPool) -> DbResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
