//! SQLite persistence for weather observations.
//!
//! One table, `weather`, used as an append-only time series: every successful
//! insert adds a row, nothing is updated in place.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter};
use std::path::{Path, PathBuf};

use crate::{error::StoreError, model::WeatherObservation};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS weather (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        city            TEXT NOT NULL CHECK (length(city) BETWEEN 1 AND 50),
        temperature_c   REAL NOT NULL,
        humidity        INTEGER NOT NULL,
        description     TEXT NOT NULL CHECK (length(description) <= 100),
        date            TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_weather_city_date ON weather(city, date);
";

const SELECT_COLUMNS: &str = "SELECT city, temperature_c, humidity, description, date FROM weather";

/// Persistence operations the ingestion loop and reporting rely on.
pub trait ObservationStore {
    /// Create the table if it does not exist yet. Safe to call on every run.
    fn ensure_schema(&mut self) -> Result<(), StoreError>;

    /// Append one row in its own transaction.
    fn insert(&mut self, observation: &WeatherObservation) -> Result<(), StoreError>;

    /// All rows for `city`, oldest first. Empty when nothing matches.
    fn query_by_city(&self, city: &str) -> Result<Vec<WeatherObservation>, StoreError>;

    /// Every stored row, oldest first.
    fn query_all(&self) -> Result<Vec<WeatherObservation>, StoreError>;

    /// Drop the current connection and open a fresh one.
    fn reconnect(&mut self) -> Result<(), StoreError>;

    /// Release the connection. Later writes report a lost connection.
    fn close(&mut self) -> Result<(), StoreError>;
}

/// SQLite-backed observation store owning a single connection.
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    read_only: bool,
    conn: Option<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with(path.into(), false)
    }

    /// Open an existing database without creating or modifying anything.
    ///
    /// Fails if the file does not exist. A database without the `weather`
    /// table reads as empty.
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with(path.into(), true)
    }

    fn open_with(path: PathBuf, read_only: bool) -> Result<Self, StoreError> {
        let conn = open_connection(&path, read_only)?;
        Ok(Self {
            path,
            read_only,
            conn: Some(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&self) -> Result<&Connection, StoreError> {
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::ConnectionLost("store is not connected".into()))
    }

    fn connection_mut(&mut self) -> Result<&mut Connection, StoreError> {
        self.conn
            .as_mut()
            .ok_or_else(|| StoreError::ConnectionLost("store is not connected".into()))
    }

    fn select(&self, city: Option<&str>) -> Result<Vec<WeatherObservation>, StoreError> {
        let conn = self.connection()?;
        if !table_exists(conn).map_err(StoreError::Read)? {
            return Ok(Vec::new());
        }

        let sql = match city {
            Some(_) => format!("{SELECT_COLUMNS} WHERE city = ?1 ORDER BY date ASC, id ASC"),
            None => format!("{SELECT_COLUMNS} ORDER BY date ASC, id ASC"),
        };
        let mut stmt = conn.prepare(&sql).map_err(StoreError::Read)?;

        let rows = stmt
            .query_map(params_from_iter(city), row_to_observation)
            .map_err(StoreError::Read)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Read)
    }
}

impl ObservationStore for SqliteStore {
    fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.connection()?
            .execute_batch(SCHEMA)
            .map_err(StoreError::from_write)
    }

    fn insert(&mut self, observation: &WeatherObservation) -> Result<(), StoreError> {
        let conn = self.connection_mut()?;
        let tx = conn.transaction().map_err(StoreError::from_write)?;

        let inserted = tx.execute(
            "INSERT INTO weather (city, temperature_c, humidity, description, date) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                observation.city,
                observation.temperature_c,
                observation.humidity,
                observation.description,
                format_timestamp(&observation.captured_at),
            ],
        );

        if let Err(e) = inserted {
            if let Err(rollback) = tx.rollback() {
                log::debug!("rollback after failed insert also failed: {rollback}");
            }
            return Err(StoreError::from_write(e));
        }

        tx.commit().map_err(StoreError::from_write)
    }

    fn query_by_city(&self, city: &str) -> Result<Vec<WeatherObservation>, StoreError> {
        self.select(Some(city))
    }

    fn query_all(&self) -> Result<Vec<WeatherObservation>, StoreError> {
        self.select(None)
    }

    /// Reopens the same path. A writable store also recreates the schema, since
    /// the file may have been replaced by an empty one.
    fn reconnect(&mut self) -> Result<(), StoreError> {
        self.close()?;
        let conn = open_connection(&self.path, self.read_only)?;
        if !self.read_only {
            conn.execute_batch(SCHEMA).map_err(StoreError::from_write)?;
        }
        self.conn = Some(conn);
        log::info!("reconnected to database {}", self.path.display());
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            // The handle is gone either way; a failed close only means SQLite
            // could not finalize cleanly.
            if let Err((_, e)) = conn.close() {
                log::warn!("closing database {} failed: {e}", self.path.display());
            }
        }
        Ok(())
    }
}

fn open_connection(path: &Path, read_only: bool) -> Result<Connection, StoreError> {
    let open_err = |source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    };

    let conn = if read_only {
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_err)?
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("could not create database directory {}: {e}", parent.display());
            }
        }
        Connection::open(path).map_err(open_err)?
    };

    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(open_err)?;
    Ok(conn)
}

fn table_exists(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'weather')",
        [],
        |row| row.get(0),
    )
}

fn row_to_observation(row: &Row<'_>) -> rusqlite::Result<WeatherObservation> {
    let date: String = row.get(4)?;
    Ok(WeatherObservation {
        city: row.get(0)?,
        temperature_c: row.get(1)?,
        humidity: row.get(2)?,
        description: row.get(3)?,
        captured_at: parse_timestamp(&date).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
    })
}

/// Fixed-width RFC 3339 so that text order in the `date` column is time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    /// Helper: open a store in a tempdir with the schema in place.
    /// Returns (store, TempDir) so the tempdir stays alive.
    fn test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("weather.db")).unwrap();
        store.ensure_schema().unwrap();
        (store, dir)
    }

    fn observation(city: &str, temperature_c: f64, at: DateTime<Utc>) -> WeatherObservation {
        WeatherObservation {
            city: city.into(),
            temperature_c,
            humidity: 55,
            description: "broken clouds".into(),
            captured_at: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn ensure_schema_twice_is_noop() {
        let (mut store, _dir) = test_store();
        store
            .insert(&observation("Paris", 12.5, t0()))
            .unwrap();

        store.ensure_schema().unwrap();

        assert_eq!(store.query_by_city("Paris").unwrap().len(), 1);
    }

    #[test]
    fn insert_then_query_round_trips() {
        let (mut store, _dir) = test_store();
        // Nanosecond precision must survive storage.
        let at = t0() + Duration::nanoseconds(123_456_789);
        let obs = WeatherObservation {
            city: "Marseille".into(),
            temperature_c: 291.456_789 - 273.15,
            humidity: 77,
            description: "overcast clouds".into(),
            captured_at: at,
        };

        store.insert(&obs).unwrap();

        let rows = store.query_by_city("Marseille").unwrap();
        assert_eq!(rows.last(), Some(&obs));
    }

    #[test]
    fn query_orders_by_capture_time() {
        let (mut store, _dir) = test_store();
        store
            .insert(&observation("Paris", 3.0, t0() + Duration::hours(2)))
            .unwrap();
        store.insert(&observation("Paris", 1.0, t0())).unwrap();
        store
            .insert(&observation("Paris", 2.0, t0() + Duration::milliseconds(1500)))
            .unwrap();
        store.insert(&observation("Lyon", 9.0, t0())).unwrap();

        let temps: Vec<f64> = store
            .query_by_city("Paris")
            .unwrap()
            .iter()
            .map(|o| o.temperature_c)
            .collect();
        assert_eq!(temps, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn query_unknown_city_is_empty() {
        let (store, _dir) = test_store();
        assert!(store.query_by_city("Nowhere").unwrap().is_empty());
    }

    #[test]
    fn rows_are_appended_not_deduplicated() {
        let (mut store, _dir) = test_store();
        let obs = observation("Pau", 18.0, t0());
        store.insert(&obs).unwrap();
        store.insert(&obs).unwrap();

        assert_eq!(store.query_by_city("Pau").unwrap().len(), 2);
    }

    #[test]
    fn constraint_violation_is_write_failure_and_rolled_back() {
        let (mut store, _dir) = test_store();
        let too_long = "x".repeat(51);

        let err = store
            .insert(&observation(&too_long, 1.0, t0()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));

        // The connection stays usable after the rollback.
        store.insert(&observation("Paris", 1.0, t0())).unwrap();
        assert!(store.query_by_city(&too_long).unwrap().is_empty());
        assert_eq!(store.query_by_city("Paris").unwrap().len(), 1);
    }

    #[test]
    fn insert_after_close_reports_connection_lost() {
        let (mut store, _dir) = test_store();
        store.close().unwrap();
        assert!(!store.is_connected());

        let err = store.insert(&observation("Paris", 1.0, t0())).unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[test]
    fn reconnect_restores_a_working_connection() {
        let (mut store, _dir) = test_store();
        store.insert(&observation("Paris", 1.0, t0())).unwrap();
        store.close().unwrap();

        store.reconnect().unwrap();

        assert!(store.is_connected());
        store.insert(&observation("Paris", 2.0, t0())).unwrap();
        assert_eq!(store.query_by_city("Paris").unwrap().len(), 2);
    }

    #[test]
    fn deleted_database_file_triggers_connection_lost_and_reconnect_recreates_table() {
        let (mut store, dir) = test_store();
        store.insert(&observation("Paris", 1.0, t0())).unwrap();

        std::fs::remove_file(dir.path().join("weather.db")).unwrap();

        let err = store
            .insert(&observation("Lyon", 2.0, t0()))
            .unwrap_err();
        assert!(err.is_connection_lost(), "unexpected error: {err}");

        store.reconnect().unwrap();
        store.insert(&observation("Lyon", 3.0, t0())).unwrap();

        let rows = store.query_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].city, "Lyon");
        assert_eq!(rows[0].temperature_c, 3.0);
    }

    #[test]
    fn query_all_returns_every_city_by_time() {
        let (mut store, _dir) = test_store();
        store
            .insert(&observation("Paris", 2.0, t0() + Duration::minutes(5)))
            .unwrap();
        store.insert(&observation("Lyon", 1.0, t0())).unwrap();
        store
            .insert(&observation("Pau", 3.0, t0() + Duration::minutes(10)))
            .unwrap();

        let cities: Vec<String> = store
            .query_all()
            .unwrap()
            .into_iter()
            .map(|o| o.city)
            .collect();
        assert_eq!(cities, vec!["Lyon", "Paris", "Pau"]);
    }

    #[test]
    fn read_only_store_without_table_reads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weather.db");
        SqliteStore::open(&path).unwrap().close().unwrap();

        let store = SqliteStore::open_read_only(&path).unwrap();

        assert!(store.query_by_city("Paris").unwrap().is_empty());
        assert!(store.query_all().unwrap().is_empty());
    }

    #[test]
    fn read_only_store_rejects_writes_and_missing_files() {
        let (mut writer, dir) = test_store();
        writer.insert(&observation("Paris", 1.0, t0())).unwrap();
        writer.close().unwrap();

        let path = dir.path().join("weather.db");
        let mut reader = SqliteStore::open_read_only(&path).unwrap();
        assert_eq!(reader.query_by_city("Paris").unwrap().len(), 1);

        let err = reader
            .insert(&observation("Paris", 2.0, t0()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));

        let missing = dir.path().join("absent.db");
        assert!(SqliteStore::open_read_only(&missing).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weather.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.ensure_schema().unwrap();
            store.insert(&observation("Lyon", 4.0, t0())).unwrap();
            store.close().unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.query_by_city("Lyon").unwrap().len(), 1);
    }

    #[test]
    fn timestamp_text_sorts_like_time() {
        let earlier = format_timestamp(&t0());
        let later = format_timestamp(&(t0() + Duration::nanoseconds(1)));
        assert!(earlier < later);
        assert_eq!(parse_timestamp(&later).unwrap(), t0() + Duration::nanoseconds(1));
    }
}
