use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use erna_core::{Location, Timestamp, UserId};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::adapter::Storage;
use crate::db::init_db;
use crate::error::{Result, StorageError};
use crate::types::{ScheduleEntry, ScheduleRecord, SkipRecord};

/// SQLite-backed [`Storage`].
///
/// Wraps a single connection in a `Mutex`; every call takes the lock for
/// its whole duration, so multi-statement writes never interleave with
/// another caller on the same handle.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Connection(format!("{}: {e}", path.display())))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self::from_connection(conn))
    }

    /// Throwaway database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open connection. Call [`Storage::init`] before use.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Connection("sqlite connection mutex poisoned".to_string()))
    }
}

impl Storage for SqliteStorage {
    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        init_db(&conn)?;
        debug!("sqlite schema ready");
        Ok(())
    }

    fn has_user(&self, user: &UserId) -> Result<bool> {
        let conn = self.conn()?;
        let count: Option<i64> = conn
            .query_row(
                "SELECT join_count FROM members WHERE user_id = ?1",
                [user.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.is_some_and(|c| c > 0))
    }

    fn location_of_user(&self, user: &UserId) -> Result<Option<Location>> {
        let conn = self.conn()?;
        let name: Option<String> = conn
            .query_row(
                "SELECT location FROM location_members WHERE user_id = ?1",
                [user.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        name.map(decode_location).transpose()
    }

    #[instrument(skip(self), fields(location = %location, user = %user))]
    fn add_user_to_location(&self, location: &Location, user: &UserId) -> Result<bool> {
        let mut conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO locations (name, created_at) VALUES (?1, ?2)",
            rusqlite::params![location.as_str(), now],
        )?;
        // UNIQUE(user_id) turns a second join anywhere into a no-op.
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO location_members (location, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![location.as_str(), user.as_str(), now],
        )?;
        if inserted == 0 {
            // Dropping `tx` rolls back the speculative location row.
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO members (user_id, join_count, first_joined_at, last_joined_at)
             VALUES (?1, 1, ?2, ?2)
             ON CONFLICT(user_id) DO UPDATE SET
                 join_count     = join_count + 1,
                 last_joined_at = excluded.last_joined_at",
            rusqlite::params![user.as_str(), now],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn remove_user_from_location(&self, user: &UserId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM location_members WHERE user_id = ?1",
            [user.as_str()],
        )?;
        Ok(())
    }

    fn find_users_by_locations(
        &self,
        locations: &[Location],
    ) -> Result<HashMap<Location, Vec<UserId>>> {
        let conn = self.conn()?;
        let mut exists = conn.prepare_cached("SELECT 1 FROM locations WHERE name = ?1")?;
        let mut members = conn.prepare_cached(
            "SELECT user_id FROM location_members WHERE location = ?1 ORDER BY seq",
        )?;

        let mut out = HashMap::with_capacity(locations.len());
        for location in locations {
            if !exists.exists([location.as_str()])? {
                continue;
            }
            let users = members
                .query_map([location.as_str()], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(decode_user)
                .collect::<Result<Vec<_>>>()?;
            out.insert(location.clone(), users);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(count = locations.len()))]
    fn delete_locations(&self, locations: &[Location]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for location in locations {
            tx.execute(
                "DELETE FROM location_members WHERE location = ?1",
                [location.as_str()],
            )?;
            tx.execute("DELETE FROM locations WHERE name = ?1", [location.as_str()])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn find_schedule_history(
        &self,
        location: &Location,
        datetime: &Timestamp,
    ) -> Result<Option<ScheduleRecord>> {
        let conn = self.conn()?;
        query_schedule_history(&conn, location, datetime)
    }

    fn append_schedule_event(&self, location: &Location, datetime: &Timestamp) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO schedule_events (location, datetime) VALUES (?1, ?2)",
            rusqlite::params![location.as_str(), datetime.as_str()],
        )?;
        Ok(())
    }

    fn insert_schedule_history(
        &self,
        location: &Location,
        datetime: &Timestamp,
        user: &UserId,
        title: &str,
    ) -> Result<ScheduleRecord> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO schedule_history
             (id, location, datetime, user_id, title, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id,
                location.as_str(),
                datetime.as_str(),
                user.as_str(),
                title,
                now
            ],
        )?;
        // Read back: whichever writer got there first owns the key.
        query_schedule_history(&conn, location, datetime)?.ok_or_else(|| {
            StorageError::Corrupt(format!(
                "schedule history for {location}@{datetime} missing after insert"
            ))
        })
    }

    fn find_schedules_containing(&self, datetime: &Timestamp) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT location, datetime FROM schedule_events
             WHERE location IN (SELECT location FROM schedule_events WHERE datetime = ?1)
             ORDER BY location, datetime",
        )?;
        let rows = stmt
            .query_map([datetime.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        group_entries(rows)
    }

    fn remove_event_from_all_schedules(&self, datetime: &Timestamp) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM schedule_events WHERE datetime = ?1",
            [datetime.as_str()],
        )?;
        debug!(%datetime, removed = n, "event removed from schedules");
        Ok(())
    }

    fn take_due_locations(&self, datetime: &Timestamp) -> Result<Vec<Location>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let names = {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM schedule_events WHERE datetime = ?1 RETURNING location",
            )?;
            let rows = stmt
                .query_map([datetime.as_str()], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        tx.commit()?;

        let mut due = names
            .into_iter()
            .map(decode_location)
            .collect::<Result<Vec<_>>>()?;
        due.sort();
        Ok(due)
    }

    fn find_schedule(&self, location: &Location) -> Result<Option<ScheduleEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT location, datetime FROM schedule_events
             WHERE location = ?1 ORDER BY datetime",
        )?;
        let rows = stmt
            .query_map([location.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(group_entries(rows)?.into_iter().next())
    }

    fn list_schedules(&self) -> Result<Vec<ScheduleEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT location, datetime FROM schedule_events ORDER BY location, datetime",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        group_entries(rows)
    }

    fn prune_expired_events(&self, now: &Timestamp) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM schedule_events WHERE datetime < ?1",
            [now.as_str()],
        )?;
        if n > 0 {
            info!(count = n, %now, "expired schedule events pruned");
        }
        Ok(n)
    }

    fn find_skip_history(&self, datetime: &Timestamp) -> Result<Option<SkipRecord>> {
        let conn = self.conn()?;
        query_skip_history(&conn, datetime)
    }

    fn insert_skip(&self, datetime: &Timestamp) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO skips (datetime) VALUES (?1)",
            [datetime.as_str()],
        )?;
        Ok(())
    }

    fn insert_skip_history(&self, datetime: &Timestamp, user: &UserId) -> Result<SkipRecord> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO skip_history (id, datetime, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, datetime.as_str(), user.as_str(), now],
        )?;
        query_skip_history(&conn, datetime)?.ok_or_else(|| {
            StorageError::Corrupt(format!("skip history for {datetime} missing after insert"))
        })
    }

    fn list_skips(&self) -> Result<Vec<Timestamp>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT datetime FROM skips ORDER BY datetime")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_timestamp).collect()
    }
}

// --- private helpers -------------------------------------------------------

fn query_schedule_history(
    conn: &Connection,
    location: &Location,
    datetime: &Timestamp,
) -> Result<Option<ScheduleRecord>> {
    let row: Option<(String, String, String, String, String, String)> = conn
        .query_row(
            "SELECT id, location, datetime, user_id, title, created_at
             FROM schedule_history WHERE location = ?1 AND datetime = ?2",
            rusqlite::params![location.as_str(), datetime.as_str()],
            |row| {
                Ok((
                    row.get(0)?, // id
                    row.get(1)?, // location
                    row.get(2)?, // datetime
                    row.get(3)?, // user_id
                    row.get(4)?, // title
                    row.get(5)?, // created_at
                ))
            },
        )
        .optional()?;

    row.map(|(id, location, datetime, user, title, created_at)| {
        Ok(ScheduleRecord {
            id,
            location: decode_location(location)?,
            datetime: decode_timestamp(datetime)?,
            user: decode_user(user)?,
            title,
            created_at,
        })
    })
    .transpose()
}

fn query_skip_history(conn: &Connection, datetime: &Timestamp) -> Result<Option<SkipRecord>> {
    let row: Option<(String, String, String, String)> = conn
        .query_row(
            "SELECT id, datetime, user_id, created_at FROM skip_history WHERE datetime = ?1",
            [datetime.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    row.map(|(id, datetime, user, created_at)| {
        Ok(SkipRecord {
            id,
            datetime: decode_timestamp(datetime)?,
            user: decode_user(user)?,
            created_at,
        })
    })
    .transpose()
}

/// Fold `(location, datetime)` rows, sorted by location, into entries.
fn group_entries(rows: Vec<(String, String)>) -> Result<Vec<ScheduleEntry>> {
    let mut entries: Vec<ScheduleEntry> = Vec::new();
    for (location, datetime) in rows {
        let datetime = decode_timestamp(datetime)?;
        match entries.last_mut() {
            Some(last) if last.location.as_str() == location => last.events.push(datetime),
            _ => entries.push(ScheduleEntry {
                location: decode_location(location)?,
                events: vec![datetime],
            }),
        }
    }
    Ok(entries)
}

fn decode_location(s: String) -> Result<Location> {
    Location::parse(s).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn decode_user(s: String) -> Result<UserId> {
    UserId::parse(s).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn decode_timestamp(s: String) -> Result<Timestamp> {
    Timestamp::parse(&s).map_err(|e| StorageError::Corrupt(e.to_string()))
}
