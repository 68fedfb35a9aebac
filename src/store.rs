//! Store layout and bootstrap.
//!
//! Bootstrap runs once per [`crate::mirror::Mirror`] construction, inside a
//! single transaction, and is idempotent: running it again against an
//! up-to-date store touches zero bytes of the database file.

use sqlx::SqlitePool;

use crate::error::Error;
use crate::schema::Schema;

/// Bumped whenever the schema→layout mapping or the interpretation of the
/// layout changes.
pub const MIRROR_VERSION: &str = "MIRROR_v1";

/// Type and column identifiers end up spliced directly into `CREATE TABLE`
/// statements (bind parameters can't stand in for identifiers), so every
/// one is checked against this pattern before use. This is the only place
/// in the crate where identifier interpolation occurs.
pub fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const STRUCTURAL_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS meta (
        zero INTEGER PRIMARY KEY,
        schema TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS updates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        time_epoch_millis INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS objects (
        id TEXT PRIMARY KEY,
        typename TEXT NOT NULL,
        last_update INTEGER REFERENCES updates(id)
    )",
    "CREATE TABLE IF NOT EXISTS links (
        parent_id TEXT NOT NULL REFERENCES objects(id),
        fieldname TEXT NOT NULL,
        child_id TEXT REFERENCES objects(id)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_links_parent_field ON links (parent_id, fieldname)",
    "CREATE TABLE IF NOT EXISTS connections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        object_id TEXT NOT NULL REFERENCES objects(id),
        fieldname TEXT NOT NULL,
        last_update INTEGER REFERENCES updates(id),
        total_count INTEGER,
        has_next_page INTEGER,
        end_cursor TEXT
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_object_field ON connections (object_id, fieldname)",
    "CREATE TABLE IF NOT EXISTS connection_entries (
        connection_id INTEGER NOT NULL REFERENCES connections(id),
        idx INTEGER NOT NULL,
        child_id TEXT NOT NULL REFERENCES objects(id)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_connection_entries_unique ON connection_entries (connection_id, idx)",
    "CREATE INDEX IF NOT EXISTS idx_connection_entries_connection ON connection_entries (connection_id)",
];

/// Runs the full bootstrap sequence: creates the `meta` table, checks or
/// stores the schema fingerprint, creates the remaining structural tables,
/// and creates each object type's `data_T` table. See
/// [`crate::mirror::Mirror::new`] for the public entry point.
pub(crate) async fn bootstrap(pool: &SqlitePool, schema: &Schema) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(STRUCTURAL_DDL[0]).execute(&mut *tx).await?;

    let fingerprint = schema.fingerprint()?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT schema FROM meta WHERE zero = 0")
        .fetch_optional(&mut *tx)
        .await?;

    match existing {
        Some((stored,)) if stored == fingerprint => {
            tracing::debug!("store already bootstrapped with matching schema, no-op");
            tx.commit().await?;
            return Ok(());
        }
        Some(_) => {
            tracing::warn!("store bootstrap rejected: schema fingerprint mismatch");
            tx.rollback().await?;
            return Err(Error::IncompatibleSchema);
        }
        None => {
            sqlx::query("INSERT INTO meta (zero, schema) VALUES (0, ?)")
                .bind(&fingerprint)
                .execute(&mut *tx)
                .await?;
        }
    }

    for ddl in &STRUCTURAL_DDL[1..] {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    for (typename, def) in schema.object_types() {
        if !is_safe_identifier(typename) {
            tx.rollback().await?;
            return Err(Error::UnsafeIdentifier(typename.to_string()));
        }

        let primitive_fields = def.primitive_fields();
        for field in &primitive_fields {
            if !is_safe_identifier(field) {
                tx.rollback().await?;
                return Err(Error::UnsafeIdentifier(field.to_string()));
            }
        }

        let mut columns = vec!["id TEXT PRIMARY KEY REFERENCES objects(id)".to_string()];
        columns.extend(primitive_fields.iter().map(|field| format!("{field} TEXT")));

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS data_{typename} ({})",
            columns.join(", ")
        );
        tracing::debug!(%typename, "creating per-type primitive table");
        sqlx::query(&ddl).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
