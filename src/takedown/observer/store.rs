use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row, ToSql, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use crate::takedown::observer::config::DEFAULT_READ_POOL_SIZE;
use crate::takedown::observer::error::Result;
use crate::takedown::observer::model::Account;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    countries TEXT NOT NULL,            -- JSON array of country codes
    last_reported_at TEXT NOT NULL,     -- fixed-width RFC 3339, UTC
    report_count INTEGER NOT NULL,
    reported_by TEXT NOT NULL,          -- JSON array of client ids
    data_format_version TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_accounts_last_reported_at
    ON accounts (last_reported_at DESC);
"#;

const ACCOUNT_COLUMNS: &str =
    "id, name, countries, last_reported_at, report_count, reported_by, data_format_version";

/// Restricts which accounts a listing returns. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountFilter {
    /// Only accounts whose country set contains this exact code.
    pub country: Option<String>,
    /// Only accounts whose name contains this substring (case-sensitive).
    pub name_contains: Option<String>,
}

impl AccountFilter {
    /// Builds a filter from optional query values, treating blank strings as
    /// "no filter".
    pub fn new(country: Option<&str>, name_contains: Option<&str>) -> Self {
        let non_blank = |value: Option<&str>| {
            value
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            country: non_blank(country),
            name_contains: non_blank(name_contains),
        }
    }

    fn where_clause(&self) -> (String, Vec<&dyn ToSql>) {
        let mut conditions = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(country) = &self.country {
            conditions.push(
                "EXISTS (SELECT 1 FROM json_each(accounts.countries) WHERE json_each.value = ?)",
            );
            values.push(country);
        }
        if let Some(fragment) = &self.name_contains {
            conditions.push("instr(accounts.name, ?) > 0");
            values.push(fragment);
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// SQLite-backed keyed storage for [`Account`] records.
///
/// Writes go through a single mutex-guarded connection and take SQLite's
/// reserved lock with `BEGIN IMMEDIATE`, so a read-modify-write never
/// interleaves with another writer. Reads use a fixed pool of separate
/// connections; in WAL mode they see the last committed state and never wait
/// for an open write transaction.
pub struct AccountStore {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl AccountStore {
    /// Opens (or creates) the database at `path`, creating its parent
    /// directory when missing.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_readers(path, DEFAULT_READ_POOL_SIZE)
    }

    /// Same as [`AccountStore::open`] with an explicit read pool size. A size
    /// of zero is raised to one.
    pub fn open_with_readers(path: &Path, read_pool_size: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        info!(path = %path.display(), read_pool_size, "opening account store");
        let writer = Connection::open(path)?;
        writer.execute_batch("PRAGMA journal_mode=WAL;")?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        writer.execute_batch(SCHEMA)?;

        let readers = (0..read_pool_size.max(1))
            .map(|_| -> Result<Mutex<Connection>> {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_parts(writer, readers))
    }

    /// Opens a private in-memory database. Useful for tests.
    ///
    /// The writer and readers share one named in-memory database through
    /// SQLite's shared cache. Shared-cache readers use `read_uncommitted` so
    /// they are not blocked by the writer's table locks.
    pub fn open_in_memory() -> Result<Self> {
        let id = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:takedown-observer-{}-{id}?mode=memory&cache=shared",
            std::process::id()
        );
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer = Connection::open_with_flags(&uri, flags)?;
        writer.execute_batch(SCHEMA)?;

        let readers = (0..DEFAULT_READ_POOL_SIZE)
            .map(|_| -> Result<Mutex<Connection>> {
                let conn = Connection::open_with_flags(&uri, flags)?;
                conn.execute_batch("PRAGMA read_uncommitted = true;")?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_parts(writer, readers))
    }

    fn from_parts(writer: Connection, readers: Vec<Mutex<Connection>>) -> Self {
        Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        }
    }

    /// Borrows an idle read connection, or waits on one chosen round-robin
    /// when every reader is busy.
    fn reader(&self) -> MutexGuard<'_, Connection> {
        for reader in &self.readers {
            if let Some(conn) = reader.try_lock() {
                return conn;
            }
        }
        let index = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[index].lock()
    }

    /// Runs `work` inside one write transaction. Commits when it returns `Ok`,
    /// rolls back on any error so nothing is partially written.
    pub fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&AccountTx<'_>) -> Result<T>,
    {
        let mut conn = self.writer.lock();
        let tx = AccountTx {
            tx: conn.transaction_with_behavior(TransactionBehavior::Immediate)?,
        };
        let value = work(&tx)?;
        tx.tx.commit()?;
        Ok(value)
    }

    /// Reads a single account outside of any write transaction.
    pub fn get(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.reader();
        fetch_account(&conn, id)
    }

    /// Returns one page of accounts matching `filter`, most recently reported
    /// first, along with the number of accounts matching the filter overall.
    pub fn list_page(
        &self,
        filter: &AccountFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Account>, u64)> {
        let conn = self.reader();
        let (where_clause, filter_values) = filter.where_clause();

        let count_sql = format!("SELECT COUNT(*) FROM accounts{where_clause}");
        let matching: i64 = conn.query_row(&count_sql, &*filter_values, |row| row.get(0))?;

        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut page_values = filter_values.clone();
        page_values.push(&limit);
        page_values.push(&offset);

        let page_sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts{where_clause}
             ORDER BY last_reported_at DESC, rowid ASC
             LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&page_sql)?;
        let rows = stmt
            .query_map(&*page_values, map_account_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(
            matching,
            returned = rows.len(),
            ?filter,
            "listed account page"
        );
        Ok((rows, matching.max(0) as u64))
    }

    /// Every distinct country code across all stored accounts, sorted.
    pub fn distinct_countries(&self) -> Result<Vec<String>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT json_each.value
             FROM accounts, json_each(accounts.countries)
             ORDER BY 1",
        )?;
        let codes = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(codes)
    }

    /// Every stored account, most recently reported first.
    pub fn scan_all(&self) -> Result<Vec<Account>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             ORDER BY last_reported_at DESC, rowid ASC"
        ))?;
        let rows = stmt
            .query_map([], map_account_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Handle to an open write transaction handed to [`AccountStore::transaction`].
pub struct AccountTx<'conn> {
    tx: Transaction<'conn>,
}

impl AccountTx<'_> {
    pub fn get(&self, id: &str) -> Result<Option<Account>> {
        fetch_account(&self.tx, id)
    }

    /// Inserts the account or replaces every column of the existing row.
    pub fn upsert(&self, account: &Account) -> Result<()> {
        let countries = serde_json::to_string(&account.countries)?;
        let reported_by = serde_json::to_string(&account.reported_by)?;
        let report_count = i64::try_from(account.report_count).unwrap_or(i64::MAX);

        self.tx.execute(
            "INSERT INTO accounts (
                id, name, countries, last_reported_at, report_count, reported_by,
                data_format_version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                countries = excluded.countries,
                last_reported_at = excluded.last_reported_at,
                report_count = excluded.report_count,
                reported_by = excluded.reported_by,
                data_format_version = excluded.data_format_version",
            params![
                account.id,
                account.name,
                countries,
                format_timestamp(&account.last_reported_at),
                report_count,
                reported_by,
                account.data_format_version,
            ],
        )?;
        Ok(())
    }
}

fn fetch_account(conn: &Connection, id: &str) -> Result<Option<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id], map_account_row)?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Timestamps are stored with a fixed number of fractional digits and a `Z`
/// suffix so that text ordering matches chronological ordering.
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_account_row(row: &Row) -> rusqlite::Result<Account> {
    let countries: String = row.get(2)?;
    let last_reported_at: String = row.get(3)?;
    let report_count: i64 = row.get(4)?;
    let reported_by: String = row.get(5)?;

    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        countries: decode_json(2, &countries)?,
        last_reported_at: DateTime::parse_from_rfc3339(&last_reported_at)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|err| conversion_error(3, Type::Text, err))?,
        report_count: u64::try_from(report_count)
            .map_err(|err| conversion_error(4, Type::Integer, err))?,
        reported_by: decode_json(5, &reported_by)?,
        data_format_version: row.get(6)?,
    })
}

fn decode_json(column: usize, text: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(text).map_err(|err| conversion_error(column, Type::Text, err))
}

fn conversion_error<E>(column: usize, kind: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, kind, Box::new(err))
}
