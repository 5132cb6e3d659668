use chrono::{SubsecRound, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::time::Duration;
use tracing::{debug, info};

use super::filter::{
    format_timestamp, parse_date_filter, parse_timestamp, Bound, FilterBuilder, QueryFilter,
    TextColumn,
};
use super::models::{AccessLogPage, AccessRecord, AccessRecordInput, LogQuery};
use crate::config::AnalyticsConfig;
use crate::error::{AnalyticsError, AnalyticsResult};

type Migration = fn(&Connection) -> rusqlite::Result<()>;

/// Schema steps, applied in order. `PRAGMA user_version` holds how many ran.
const MIGRATIONS: &[Migration] = &[create_access_logs, add_visitor_id];

fn create_access_logs(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS access_logs (
             id            INTEGER PRIMARY KEY AUTOINCREMENT,
             ip_address    TEXT NOT NULL,
             user_agent    TEXT NOT NULL DEFAULT '',
             path          TEXT NOT NULL,
             method        TEXT NOT NULL,
             status_code   INTEGER NOT NULL,
             response_time REAL NOT NULL,
             referer       TEXT NOT NULL DEFAULT '',
             device_type   TEXT NOT NULL DEFAULT '',
             os            TEXT NOT NULL DEFAULT '',
             browser       TEXT NOT NULL DEFAULT '',
             created_at    TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_access_logs_created_at ON access_logs(created_at);
         CREATE INDEX IF NOT EXISTS idx_access_logs_ip_address ON access_logs(ip_address);
         CREATE INDEX IF NOT EXISTS idx_access_logs_path ON access_logs(path);",
    )
}

fn add_visitor_id(conn: &Connection) -> rusqlite::Result<()> {
    let present: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('access_logs') WHERE name = 'visitor_id'",
        [],
        |row| row.get(0),
    )?;
    if !present {
        conn.execute_batch("ALTER TABLE access_logs ADD COLUMN visitor_id TEXT;")?;
    }
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_access_logs_visitor_id ON access_logs(visitor_id);",
    )
}

const COLUMNS: &str = "id, ip_address, visitor_id, user_agent, path, method, status_code, \
                       response_time, referer, device_type, os, browser, created_at";

/// Append-only store of access records in a SQLite file.
///
/// Holds no connection. Every operation opens its own, runs one transaction
/// and closes it again; WAL mode plus the busy timeout settle contention
/// between concurrent writers.
pub struct AccessLogStore {
    config: AnalyticsConfig,
}

impl AccessLogStore {
    /// Open (creating if needed) the database and bring its schema up to date.
    pub fn open(config: AnalyticsConfig) -> AnalyticsResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { config };
        let mut conn = store.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "SQLite journal mode configured");
        migrate(&mut conn)?;
        info!(path = %store.config.database_path.display(), "access log store ready");
        Ok(store)
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub(crate) fn connect(&self) -> AnalyticsResult<Connection> {
        let conn = Connection::open(&self.config.database_path)?;
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    pub fn append(&self, input: AccessRecordInput) -> AnalyticsResult<AccessRecord> {
        // stored with microsecond precision, keep the returned value identical
        let created_at = input.created_at.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let visitor_id = input.visitor_id.filter(|v| !v.is_empty());

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO access_logs (ip_address, visitor_id, user_agent, path, method,
                 status_code, response_time, referer, device_type, os, browser, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                input.ip_address,
                visitor_id,
                input.user_agent,
                input.path,
                input.method,
                input.status_code,
                input.response_time_ms,
                input.referer,
                input.device_type,
                input.os,
                input.browser,
                format_timestamp(&created_at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(AccessRecord {
            id,
            ip_address: input.ip_address,
            visitor_id,
            user_agent: input.user_agent,
            path: input.path,
            method: input.method,
            status_code: input.status_code,
            response_time_ms: input.response_time_ms,
            referer: input.referer,
            device_type: input.device_type,
            os: input.os,
            browser: input.browser,
            created_at,
        })
    }

    /// One page of records matching `query`, newest first.
    pub fn query(&self, query: &LogQuery) -> AnalyticsResult<AccessLogPage> {
        let page = query.page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
        let max_limit = i64::from(self.config.max_page_size.max(1));
        let limit = query
            .limit
            .unwrap_or(i64::from(self.config.default_page_size))
            .clamp(1, max_limit) as u32;
        let offset = (u64::from(page) - 1) * u64::from(limit);
        let filter = log_filter(query);

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let total: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM access_logs{}", filter.where_clause()),
            params_from_iter(filter.params()),
            |row| row.get(0),
        )?;

        let mut bound: Vec<Value> = filter.params().to_vec();
        bound.push(Value::Integer(i64::from(limit)));
        bound.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
        let records = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {COLUMNS} FROM access_logs{} \
                 ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                filter.where_clause()
            ))?;
            let rows = stmt.query_map(params_from_iter(bound.iter()), record_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;

        let total = total.max(0) as u64;
        Ok(AccessLogPage {
            records,
            total,
            page,
            limit,
            page_count: total.div_ceil(u64::from(limit)),
        })
    }
}

fn log_filter(query: &LogQuery) -> QueryFilter {
    FilterBuilder::new()
        .created_from(
            query
                .start_date
                .as_deref()
                .and_then(|s| parse_date_filter(s, Bound::Start)),
        )
        .created_until(
            query
                .end_date
                .as_deref()
                .and_then(|s| parse_date_filter(s, Bound::End)),
        )
        .contains(TextColumn::IpAddress, query.ip.as_deref())
        .contains(TextColumn::Path, query.path.as_deref())
        .build()
}

fn migrate(conn: &mut Connection) -> AnalyticsResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let latest = MIGRATIONS.len() as i64;
    if version > latest {
        return Err(AnalyticsError::Schema(format!(
            "schema version {} is newer than supported version {}",
            version, latest
        )));
    }
    for (step, migration) in MIGRATIONS.iter().enumerate().skip(version.max(0) as usize) {
        let tx = conn.transaction()?;
        migration(&tx)?;
        tx.pragma_update(None, "user_version", (step + 1) as i64)?;
        tx.commit()?;
        info!(version = step + 1, "access log schema migrated");
    }
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AccessRecord> {
    let raw_created: String = row.get(12)?;
    let created_at = parse_timestamp(&raw_created).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            12,
            Type::Text,
            format!("invalid timestamp {:?}", raw_created).into(),
        )
    })?;
    Ok(AccessRecord {
        id: row.get(0)?,
        ip_address: row.get(1)?,
        visitor_id: row.get(2)?,
        user_agent: row.get(3)?,
        path: row.get(4)?,
        method: row.get(5)?,
        status_code: row.get(6)?,
        response_time_ms: row.get(7)?,
        referer: row.get(8)?,
        device_type: row.get(9)?,
        os: row.get(10)?,
        browser: row.get(11)?,
        created_at,
    })
}
