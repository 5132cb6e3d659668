use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One request as observed by the access-log hook, before it is stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessRecordInput {
    pub ip_address: String,
    pub visitor_id: Option<String>,
    pub user_agent: String,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: f64,
    pub referer: String,
    pub device_type: String,
    pub os: String,
    pub browser: String,
    /// Insertion time is used when absent
    pub created_at: Option<DateTime<Utc>>,
}

/// A stored access record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessRecord {
    pub id: i64,
    pub ip_address: String,
    pub visitor_id: Option<String>,
    pub user_agent: String,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    #[serde(rename = "response_time")]
    pub response_time_ms: f64,
    pub referer: String,
    pub device_type: String,
    pub os: String,
    pub browser: String,
    pub created_at: DateTime<Utc>,
}

/// Filters and paging for the access-log listing. Dates are raw caller
/// strings; ones that do not parse are ignored. Out-of-range paging values
/// are normalized rather than refused.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub ip: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessLogPage {
    pub records: Vec<AccessRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    #[serde(rename = "pages")]
    pub page_count: u64,
}

/// Date bounds for the overview. Missing bounds fall back to the trailing
/// window configured in `AnalyticsConfig`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathCount {
    pub path: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OsCount {
    pub os: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowserCount {
    pub browser: String,
    pub count: u64,
}

/// Aggregates over one filtered window of access records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub identified_visitors: u64,
    #[serde(rename = "avg_response_time")]
    pub avg_response_time_ms: f64,
    pub top_pages: Vec<PathCount>,
    pub visitor_trends: Vec<DayCount>,
    pub device_stats: BTreeMap<String, u64>,
    pub os_stats: Vec<OsCount>,
    pub browser_stats: Vec<BrowserCount>,
}
