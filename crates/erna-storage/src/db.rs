use rusqlite::Connection;

/// Initialise the erna schema in `conn`.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    create_location_tables(conn)?;
    create_members_table(conn)?;
    create_schedule_tables(conn)?;
    create_skip_tables(conn)?;
    Ok(())
}

/// Waiting lists. A location row exists from its first join until purge,
/// even while its member list is empty.
///
/// UNIQUE(user_id) keeps every user in at most one waiting list; `seq`
/// preserves join order.
fn create_location_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS locations (
            name        TEXT NOT NULL PRIMARY KEY,
            created_at  TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS location_members (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            location    TEXT NOT NULL REFERENCES locations(name),
            user_id     TEXT NOT NULL UNIQUE,
            joined_at   TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_location_members_location
            ON location_members (location, seq);",
    )
}

/// Join counter per user. Only ever incremented.
fn create_members_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS members (
            user_id          TEXT NOT NULL PRIMARY KEY,
            join_count       INTEGER NOT NULL DEFAULT 0,
            first_joined_at  TEXT NOT NULL,
            last_joined_at   TEXT NOT NULL
        ) STRICT;",
    )
}

/// Pending events plus their permanent history.
///
/// `datetime` columns hold canonical `YYYY-MM-DDTHH:MM:00Z` strings, so
/// `<` and ORDER BY are chronological.
fn create_schedule_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schedule_events (
            location    TEXT NOT NULL,
            datetime    TEXT NOT NULL,
            PRIMARY KEY (location, datetime)
        ) STRICT;

        -- consume_due: DELETE ... WHERE datetime = ?
        CREATE INDEX IF NOT EXISTS idx_schedule_events_datetime
            ON schedule_events (datetime);

        CREATE TABLE IF NOT EXISTS schedule_history (
            id          TEXT NOT NULL PRIMARY KEY,
            location    TEXT NOT NULL,
            datetime    TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            title       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE (location, datetime)
        ) STRICT;",
    )
}

fn create_skip_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS skips (
            datetime    TEXT NOT NULL PRIMARY KEY
        ) STRICT;

        CREATE TABLE IF NOT EXISTS skip_history (
            id          TEXT NOT NULL PRIMARY KEY,
            datetime    TEXT NOT NULL UNIQUE,
            user_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        ) STRICT;",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('locations', 'location_members', 'members',
                              'schedule_events', 'schedule_history',
                              'skips', 'skip_history')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }
}
