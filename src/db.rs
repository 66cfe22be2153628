// 🗄️ Transaction store - sqlite
// find / count / bulk insert / aggregate over owner-scoped transactions.
// Uniqueness of identity_hash per owner is enforced by the schema, not by locks.

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::aggregation::{GroupKey, GroupRow, Pipeline, TransactionFilter};
use crate::error::StoreError;
use crate::model::{NewTransaction, OwnerId, Transaction};
use crate::pagination::FindOptions;
use crate::temporal::storage_instant;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TRANSACTION_COLUMNS: &str = "id, owner_id, amount, occurred_at, clock_time, \
     value_date, details, kind, balance, identity_hash";

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Operations the ingestion pipeline and analytics engine need from storage.
pub trait TransactionStore {
    /// Unordered bulk insert. Every record is attempted; per-record failures are
    /// reported in the outcome rather than aborting the batch.
    fn insert_many(&self, docs: &[NewTransaction]) -> Result<BulkWriteOutcome, StoreError>;

    fn find(
        &self,
        filter: &TransactionFilter,
        options: &FindOptions,
    ) -> Result<Vec<Transaction>, StoreError>;

    fn count(&self, filter: &TransactionFilter) -> Result<u64, StoreError>;

    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<GroupRow>, StoreError>;

    fn find_by_id(&self, owner: &OwnerId, id: &str) -> Result<Option<Transaction>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteErrorKind {
    /// `(owner_id, identity_hash)` already present
    DuplicateKey,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Position of the rejected record in the submitted batch
    pub index: usize,
    pub kind: WriteErrorKind,
}

impl WriteError {
    pub fn is_duplicate_key(&self) -> bool {
        self.kind == WriteErrorKind::DuplicateKey
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteOutcome {
    pub inserted_ids: Vec<String>,
    pub write_errors: Vec<WriteError>,
}

impl BulkWriteOutcome {
    pub fn inserted_count(&self) -> usize {
        self.inserted_ids.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.write_errors.iter().filter(|e| e.is_duplicate_key()).count()
    }

    /// First rejection that was not a duplicate-key violation, if any.
    pub fn first_hard_failure(&self) -> Option<&WriteError> {
        self.write_errors.iter().find(|e| !e.is_duplicate_key())
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            amount REAL NOT NULL,
            occurred_at TEXT NOT NULL,
            clock_time TEXT NOT NULL DEFAULT '',
            value_date TEXT NOT NULL DEFAULT '',
            details TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL CHECK (kind IN ('DEBIT', 'CREDIT')),
            balance REAL NOT NULL DEFAULT 0,
            identity_hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (owner_id, identity_hash)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_owner_occurred ON transactions(owner_id, occurred_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_owner_kind ON transactions(owner_id, kind)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// DATABASE + SCOPED SESSIONS
// ============================================================================

#[derive(Debug)]
enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database, addressed by URI
    Memory(String),
}

/// Handle to the store. Hands out one [`Session`] per unit of work.
pub struct Database {
    target: Target,
    // Keeps a shared in-memory database alive between sessions.
    _keeper: Option<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a file-backed database in WAL mode and ensure the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        setup_database(&conn)?;

        tracing::info!(path = %path.display(), journal_mode = %mode, "database ready");

        Ok(Database {
            target: Target::File(path),
            _keeper: None,
        })
    }

    /// Private in-memory database; lives as long as this handle.
    pub fn in_memory() -> Result<Self, StoreError> {
        let uri = format!(
            "file:paymentx-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4()
        );
        let keeper = open_uri(&uri)?;
        setup_database(&keeper)?;

        Ok(Database {
            target: Target::Memory(uri),
            _keeper: Some(Mutex::new(keeper)),
        })
    }

    /// Acquire a session. The connection is released when the session drops,
    /// whether the work succeeded or not.
    pub fn session(&self) -> Result<Session, StoreError> {
        let conn = match &self.target {
            Target::File(path) => Connection::open(path)?,
            Target::Memory(uri) => open_uri(uri)?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Session { conn })
    }
}

fn open_uri(uri: &str) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Ok(Connection::open_with_flags(uri, flags)?)
}

/// A single connection scoped to one request.
pub struct Session {
    conn: Connection,
}

impl Session {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ============================================================================
// SQL COMPILATION
// ============================================================================

fn filter_sql(filter: &TransactionFilter) -> Result<(String, Vec<Value>), StoreError> {
    let mut clauses = vec!["owner_id = ?"];
    let mut values = vec![Value::Text(filter.owner.as_str().to_string())];

    if let Some(kind) = filter.kind {
        clauses.push("kind = ?");
        values.push(Value::Text(kind.as_str().to_string()));
    }

    if let Some(from) = filter.occurred_from {
        clauses.push("occurred_at >= ?");
        values.push(Value::Text(storage_instant(&from)));
    }

    if let Some(to) = filter.occurred_to {
        clauses.push("occurred_at <= ?");
        values.push(Value::Text(storage_instant(&to)));
    }

    if let Some(period) = filter.period {
        let (start, end) = period.bounds()?;
        clauses.push("occurred_at >= ?");
        values.push(Value::Text(storage_instant(&start)));
        clauses.push("occurred_at < ?");
        values.push(Value::Text(storage_instant(&end)));
    }

    if filter.require_clock_time {
        clauses.push("TRIM(clock_time) <> ''");
    }

    Ok((clauses.join(" AND "), values))
}

fn group_expr(key: GroupKey) -> &'static str {
    match key {
        GroupKey::Year => "CAST(strftime('%Y', occurred_at) AS INTEGER)",
        GroupKey::Month => "CAST(strftime('%m', occurred_at) AS INTEGER)",
        GroupKey::Day => "CAST(strftime('%d', occurred_at) AS INTEGER)",
        // strftime counts Sunday as 0
        GroupKey::DayOfWeek => "(CAST(strftime('%w', occurred_at) AS INTEGER) + 1)",
        GroupKey::Kind => "kind",
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn map_transaction_row(row: &Row) -> rusqlite::Result<Transaction> {
    let occurred_at: String = row.get(3)?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(Transaction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        amount: row.get(2)?,
        occurred_at,
        clock_time: row.get(4)?,
        value_date: row.get(5)?,
        details: row.get(6)?,
        kind: row.get(7)?,
        balance: row.get(8)?,
        identity_hash: row.get(9)?,
    })
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl TransactionStore for Session {
    fn insert_many(&self, docs: &[NewTransaction]) -> Result<BulkWriteOutcome, StoreError> {
        let mut outcome = BulkWriteOutcome::default();
        if docs.is_empty() {
            return Ok(outcome);
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transactions (
                    id, owner_id, amount, occurred_at, clock_time,
                    value_date, details, kind, balance, identity_hash
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;

            for (index, doc) in docs.iter().enumerate() {
                let id = uuid::Uuid::new_v4().to_string();
                let result = stmt.execute(params![
                    id,
                    doc.owner_id,
                    doc.amount,
                    storage_instant(&doc.occurred_at),
                    doc.clock_time,
                    doc.value_date,
                    doc.details,
                    doc.kind,
                    doc.balance,
                    doc.identity_hash,
                ]);

                match result {
                    Ok(_) => outcome.inserted_ids.push(id),
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                    {
                        outcome.write_errors.push(WriteError {
                            index,
                            kind: WriteErrorKind::DuplicateKey,
                        });
                    }
                    Err(rusqlite::Error::SqliteFailure(err, message)) => {
                        let message = message.unwrap_or_else(|| err.to_string());
                        tracing::warn!(index, %message, "record rejected by store");
                        outcome.write_errors.push(WriteError {
                            index,
                            kind: WriteErrorKind::Other(message),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        tx.commit()?;

        tracing::debug!(
            inserted = outcome.inserted_count(),
            rejected = outcome.write_errors.len(),
            "bulk insert finished"
        );

        Ok(outcome)
    }

    fn find(
        &self,
        filter: &TransactionFilter,
        options: &FindOptions,
    ) -> Result<Vec<Transaction>, StoreError> {
        let (where_sql, mut values) = filter_sql(filter)?;
        let mut sql = format!(
            "SELECT {} FROM transactions WHERE {}",
            TRANSACTION_COLUMNS, where_sql
        );

        if !options.sort.is_empty() {
            let order = options
                .sort
                .entries()
                .iter()
                .map(|(field, direction)| format!("{} {}", field.column(), direction.sql()))
                .collect::<Vec<_>>()
                .join(", ");
            // rowid keeps pages stable when sort keys tie
            sql.push_str(&format!(" ORDER BY {}, rowid ASC", order));
        }

        sql.push_str(" LIMIT ? OFFSET ?");
        values.push(Value::Integer(options.limit.map(to_sql_int).unwrap_or(-1)));
        values.push(Value::Integer(to_sql_int(options.skip)));

        tracing::debug!(%sql, "find");

        let mut stmt = self.conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params_from_iter(values.iter()), map_transaction_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    fn count(&self, filter: &TransactionFilter) -> Result<u64, StoreError> {
        let (where_sql, values) = filter_sql(filter)?;
        let sql = format!("SELECT COUNT(*) FROM transactions WHERE {}", where_sql);

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;

        Ok(count.max(0) as u64)
    }

    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<GroupRow>, StoreError> {
        pipeline.validate()?;

        let (where_sql, values) = filter_sql(&pipeline.filter)?;
        let keys = &pipeline.group;

        let mut select: Vec<String> = keys.iter().map(|k| group_expr(*k).to_string()).collect();
        select.push("COALESCE(SUM(amount), 0.0)".to_string());
        select.push("COUNT(*)".to_string());

        let mut sql = format!(
            "SELECT {} FROM transactions WHERE {}",
            select.join(", "),
            where_sql
        );

        if !keys.is_empty() {
            let group = keys
                .iter()
                .map(|k| group_expr(*k))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" GROUP BY {}", group));
        }

        if !pipeline.sort.is_empty() {
            let order = pipeline
                .sort
                .iter()
                .map(|(key, direction)| format!("{} {}", group_expr(*key), direction.sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {}", order));
        }

        tracing::debug!(%sql, "aggregate");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let mut out = GroupRow::default();
                for (i, key) in keys.iter().enumerate() {
                    match key {
                        GroupKey::Year => out.year = Some(row.get(i)?),
                        GroupKey::Month => out.month = Some(row.get(i)?),
                        GroupKey::Day => out.day = Some(row.get(i)?),
                        GroupKey::DayOfWeek => out.day_of_week = Some(row.get(i)?),
                        GroupKey::Kind => out.kind = Some(row.get(i)?),
                    }
                }
                out.total = row.get(keys.len())?;
                out.count = row.get(keys.len() + 1)?;
                Ok(out)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn find_by_id(&self, owner: &OwnerId, id: &str) -> Result<Option<Transaction>, StoreError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE id = ?1 AND owner_id = ?2",
            TRANSACTION_COLUMNS
        );

        let transaction = self
            .conn
            .query_row(&sql, params![id, owner], map_transaction_row)
            .optional()?;

        Ok(transaction)
    }
}
