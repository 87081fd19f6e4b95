use rusqlite::Connection;

use crate::error::Result;

/// An additive column change applied at startup.
///
/// Each migration is tagged with the schema version it brings the database
/// to. A migration only runs `ALTER TABLE ... ADD COLUMN` when the column is
/// missing, so re-running the list is always safe.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMigration {
    pub version: i32,
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

/// All column migrations, in version order.
pub const MIGRATIONS: &[ColumnMigration] = &[ColumnMigration {
    version: 1,
    table: "menu_items",
    column: "firebase_id",
    definition: "TEXT",
}];

/// Initialize the database schema and bring it up to the latest version.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Menu items: the local copy of the remote catalog
        CREATE TABLE IF NOT EXISTS menu_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            firebase_id TEXT,
            name TEXT NOT NULL,
            description TEXT,
            price REAL NOT NULL,
            imageName TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_menu_items_name ON menu_items(name);

        PRAGMA journal_mode=WAL;
        ",
    )?;

    apply_migrations(conn, MIGRATIONS)?;

    // Needs firebase_id, so it can only be created once migrations ran.
    conn.execute_batch(
        "
        CREATE UNIQUE INDEX IF NOT EXISTS idx_menu_items_firebase_id
            ON menu_items(firebase_id)
            WHERE firebase_id IS NOT NULL AND firebase_id != '';
        ",
    )?;

    Ok(())
}

/// Apply every migration newer than the stored `user_version`.
pub fn apply_migrations(conn: &Connection, migrations: &[ColumnMigration]) -> Result<()> {
    let current = schema_version(conn)?;

    for migration in migrations.iter().filter(|m| m.version > current) {
        if column_exists(conn, migration.table, migration.column)? {
            tracing::debug!(
                "Column {}.{} already present, marking v{} applied",
                migration.table,
                migration.column,
                migration.version
            );
        } else {
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {};",
                migration.table, migration.column, migration.definition
            ))?;
            tracing::info!(
                "Schema migration v{}: added column {}.{}",
                migration.version,
                migration.table,
                migration.column
            );
        }
        conn.pragma_update(None, "user_version", migration.version)?;
    }

    Ok(())
}

/// Current schema version recorded in `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
