use rusqlite::Connection;

const MIGRATION_001: &str = include_str!("../../migrations/001_visitor_table.sql");
const MIGRATION_002: &str = include_str!("../../migrations/002_visitor_indexes.sql");

/// Create the visitor table and its indexes for `table`.
///
/// Migration SQL is templated on the table name, so each table tracks its
/// own applied migrations in `_migrations` and several stores can share one
/// database file.
pub fn run_migrations(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name    TEXT PRIMARY KEY,
            applied INTEGER NOT NULL
        );",
    )?;

    let migrations: &[(&str, &str)] = &[
        ("001_visitor_table", MIGRATION_001),
        ("002_visitor_indexes", MIGRATION_002),
    ];

    for &(name, sql) in migrations {
        let key = format!("{name}:{table}");
        let applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
            [&key],
            |row| row.get(0),
        )?;

        if !applied {
            tracing::info!(migration = name, table, "applying migration");
            conn.execute_batch(&sql.replace("{table}", table))?;
            conn.execute(
                "INSERT INTO _migrations (name, applied) VALUES (?1, unixepoch())",
                [&key],
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent_per_table() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, "stats_visitor").unwrap();
        run_migrations(&conn, "stats_visitor").unwrap();
        run_migrations(&conn, "other_visitor").unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 4);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('stats_visitor', 'other_visitor')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_broken_ledger_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE _migrations (id INTEGER PRIMARY KEY);")
            .unwrap();

        assert!(run_migrations(&conn, "stats_visitor").is_err());
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'stats_visitor'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
