//! Predicate accumulation for access-log queries.
//!
//! Every optional filter value adds at most one clause. The resulting
//! [`QueryFilter`] is rendered into each statement that needs it, so all the
//! statements of one request see exactly the same predicates.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::Value;

/// Storage format for `created_at`. Fixed width and UTC, so text order is
/// chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Which end of an inclusive range a date-only value stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Parse a caller-supplied date filter. Accepts RFC 3339, naive ISO
/// date-times (read as UTC) and plain dates, which cover the whole day.
/// Anything else yields `None` and the filter is dropped.
pub fn parse_date_filter(raw: &str, bound: Bound) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(ts) = parse_timestamp(raw) {
        return Some(ts);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let naive = match bound {
        Bound::Start => date.and_hms_opt(0, 0, 0)?,
        Bound::End => date.and_hms_micro_opt(23, 59, 59, 999_999)?,
    };
    Some(Utc.from_utc_datetime(&naive))
}

/// Text columns that support substring filters.
#[derive(Debug, Clone, Copy)]
pub enum TextColumn {
    IpAddress,
    Path,
}

impl TextColumn {
    fn name(self) -> &'static str {
        match self {
            TextColumn::IpAddress => "ip_address",
            TextColumn::Path => "path",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_from(self, from: Option<DateTime<Utc>>) -> Self {
        match from {
            Some(ts) => self.push("created_at >= ?", Value::Text(format_timestamp(&ts))),
            None => self,
        }
    }

    pub fn created_until(self, until: Option<DateTime<Utc>>) -> Self {
        match until {
            Some(ts) => self.push("created_at <= ?", Value::Text(format_timestamp(&ts))),
            None => self,
        }
    }

    /// Case-insensitive substring match. Empty needles add nothing.
    pub fn contains(self, column: TextColumn, needle: Option<&str>) -> Self {
        match needle.filter(|n| !n.is_empty()) {
            Some(needle) => self.push(
                &format!("instr(lower({}), ?) > 0", column.name()),
                Value::Text(needle.to_lowercase()),
            ),
            None => self,
        }
    }

    fn push(mut self, clause: &str, param: Value) -> Self {
        self.clauses.push(clause.to_string());
        self.params.push(param);
        self
    }

    pub fn build(self) -> QueryFilter {
        QueryFilter {
            clauses: self.clauses,
            params: self.params,
        }
    }
}

/// A finished predicate set with its positional parameters.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl QueryFilter {
    /// ` WHERE a AND b`, or an empty string when there is nothing to filter.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Same predicates plus one fixed, parameterless clause.
    pub fn and(&self, clause: &str) -> QueryFilter {
        let mut narrowed = self.clone();
        narrowed.clauses.push(clause.to_string());
        narrowed
    }
}
