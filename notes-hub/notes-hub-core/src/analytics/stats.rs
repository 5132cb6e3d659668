use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::filter::{parse_date_filter, Bound, FilterBuilder, QueryFilter};
use super::models::{BrowserCount, DayCount, OsCount, PathCount, StatsFilter, StatsWindow};
use super::store::AccessLogStore;
use crate::error::AnalyticsResult;

/// Columns the overview ranks by count.
#[derive(Clone, Copy)]
enum Ranked {
    Path,
    Os,
    Browser,
}

impl Ranked {
    fn column(self) -> &'static str {
        match self {
            Ranked::Path => "path",
            Ranked::Os => "os",
            Ranked::Browser => "browser",
        }
    }
}

/// Read-only aggregate queries over the access log.
pub struct StatsAggregator {
    store: Arc<AccessLogStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<AccessLogStore>) -> Self {
        Self { store }
    }

    /// Every metric of the overview, computed from one window inside a
    /// single read transaction.
    pub fn overview(&self, filter: &StatsFilter) -> AnalyticsResult<StatsWindow> {
        let (start, end) = self.window(filter);
        let window = FilterBuilder::new()
            .created_from(Some(start))
            .created_until(Some(end))
            .build();
        let top_n = self.store.config().top_n;

        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;

        let total_visits = count(&tx, "COUNT(*)", &window)?;
        let unique_visitors = count(&tx, "COUNT(DISTINCT ip_address)", &window)?;
        let identified_visitors = count(
            &tx,
            "COUNT(DISTINCT visitor_id)",
            &window.and("visitor_id IS NOT NULL AND visitor_id <> ''"),
        )?;
        let avg: Option<f64> = tx.query_row(
            &format!("SELECT AVG(response_time) FROM access_logs{}", window.where_clause()),
            params_from_iter(window.params()),
            |row| row.get(0),
        )?;

        let top_pages = ranked(&tx, Ranked::Path, &window, top_n)?
            .into_iter()
            .map(|(path, count)| PathCount { path, count })
            .collect();
        let os_stats = ranked(&tx, Ranked::Os, &window, top_n)?
            .into_iter()
            .map(|(os, count)| OsCount { os, count })
            .collect();
        let browser_stats = ranked(&tx, Ranked::Browser, &window, top_n)?
            .into_iter()
            .map(|(browser, count)| BrowserCount { browser, count })
            .collect();
        let visitor_trends = grouped(
            &tx,
            "substr(created_at, 1, 10)",
            "ORDER BY 1 ASC",
            &window,
        )?
        .into_iter()
        .map(|(date, count)| DayCount { date, count })
        .collect();
        let device_stats: BTreeMap<String, u64> =
            grouped(&tx, "device_type", "", &window)?.into_iter().collect();

        tx.commit()?;
        debug!(total_visits, %start, %end, "overview computed");

        Ok(StatsWindow {
            start,
            end,
            total_visits,
            unique_visitors,
            identified_visitors,
            avg_response_time_ms: avg.map(round2).unwrap_or(0.0),
            top_pages,
            visitor_trends,
            device_stats,
            os_stats,
            browser_stats,
        })
    }

    /// Resolve the requested bounds, falling back to the trailing window.
    fn window(&self, filter: &StatsFilter) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = filter
            .end_date
            .as_deref()
            .and_then(|s| parse_date_filter(s, Bound::End))
            .unwrap_or_else(Utc::now);
        // a missing start trails the end, not the clock
        let start = filter
            .start_date
            .as_deref()
            .and_then(|s| parse_date_filter(s, Bound::Start))
            .unwrap_or_else(|| end - Duration::days(self.store.config().overview_window_days));
        (start, end)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn count(tx: &Transaction<'_>, aggregate: &str, filter: &QueryFilter) -> rusqlite::Result<u64> {
    let n: i64 = tx.query_row(
        &format!("SELECT {} FROM access_logs{}", aggregate, filter.where_clause()),
        params_from_iter(filter.params()),
        |row| row.get(0),
    )?;
    Ok(n.max(0) as u64)
}

/// Top `limit` groups of `column` by count; equal counts keep the group seen
/// first.
fn ranked(
    tx: &Transaction<'_>,
    column: Ranked,
    filter: &QueryFilter,
    limit: u32,
) -> rusqlite::Result<Vec<(String, u64)>> {
    let mut bound: Vec<Value> = filter.params().to_vec();
    bound.push(Value::Integer(i64::from(limit)));
    let column = column.column();
    let mut stmt = tx.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM access_logs{} \
         GROUP BY {column} ORDER BY COUNT(*) DESC, MIN(id) ASC LIMIT ?",
        filter.where_clause()
    ))?;
    let rows = stmt.query_map(params_from_iter(bound.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
    })?;
    rows.collect()
}

fn grouped(
    tx: &Transaction<'_>,
    key: &str,
    order: &str,
    filter: &QueryFilter,
) -> rusqlite::Result<Vec<(String, u64)>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {key}, COUNT(*) FROM access_logs{} GROUP BY 1 {order}",
        filter.where_clause()
    ))?;
    let rows = stmt.query_map(params_from_iter(filter.params()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::AccessRecordInput;
    use crate::config::AnalyticsConfig;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn aggregator(tmp: &TempDir) -> (Arc<AccessLogStore>, StatsAggregator) {
        let store = Arc::new(
            AccessLogStore::open(AnalyticsConfig::new(tmp.path().join("analytics.db"))).unwrap(),
        );
        (store.clone(), StatsAggregator::new(store))
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    fn visit(path: &str, ip: &str, when: DateTime<Utc>) -> AccessRecordInput {
        AccessRecordInput {
            ip_address: ip.into(),
            path: path.into(),
            method: "GET".into(),
            status_code: 200,
            response_time_ms: 10.0,
            device_type: "PC".into(),
            os: "Linux".into(),
            browser: "Firefox".into(),
            created_at: Some(when),
            ..Default::default()
        }
    }

    fn june() -> StatsFilter {
        StatsFilter {
            start_date: Some("2024-06-01".into()),
            end_date: Some("2024-06-30".into()),
        }
    }

    #[test]
    fn empty_window_is_all_zeros() {
        let tmp = TempDir::new().unwrap();
        let (_, stats) = aggregator(&tmp);
        let overview = stats.overview(&june()).unwrap();
        assert_eq!(overview.total_visits, 0);
        assert_eq!(overview.unique_visitors, 0);
        assert_eq!(overview.identified_visitors, 0);
        assert_eq!(overview.avg_response_time_ms, 0.0);
        assert!(overview.top_pages.is_empty());
        assert!(overview.visitor_trends.is_empty());
        assert!(overview.device_stats.is_empty());
    }

    #[test]
    fn counts_and_average() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        for (ms, ip) in [(10.0, "a"), (20.0, "b"), (10.001, "a")] {
            let mut input = visit("/api/notes", ip, at(2, 9));
            input.response_time_ms = ms;
            store.append(input).unwrap();
        }
        let overview = stats.overview(&june()).unwrap();
        assert_eq!(overview.total_visits, 3);
        assert_eq!(overview.unique_visitors, 2);
        assert_eq!(overview.avg_response_time_ms, 13.33);
    }

    #[test]
    fn identified_visitors_count_distinct_ids() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        for id in [Some("v1"), Some("v1"), Some("v2"), None] {
            let mut input = visit("/api/notes", "1.1.1.1", at(3, 9));
            input.visitor_id = id.map(String::from);
            store.append(input).unwrap();
        }
        let overview = stats.overview(&june()).unwrap();
        assert_eq!(overview.identified_visitors, 2);
        assert_eq!(overview.unique_visitors, 1);
    }

    #[test]
    fn ranked_lists_break_ties_by_first_seen() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        for path in ["/b", "/a", "/c", "/a", "/b", "/c", "/c"] {
            store.append(visit(path, "1.1.1.1", at(4, 9))).unwrap();
        }
        let overview = stats.overview(&june()).unwrap();
        let pages: Vec<_> = overview
            .top_pages
            .iter()
            .map(|p| (p.path.as_str(), p.count))
            .collect();
        assert_eq!(pages, vec![("/c", 3), ("/b", 2), ("/a", 2)]);
    }

    #[test]
    fn ranked_lists_are_capped() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        for i in 0..15 {
            store
                .append(visit(&format!("/p{}", i), "1.1.1.1", at(5, 9)))
                .unwrap();
        }
        assert_eq!(stats.overview(&june()).unwrap().top_pages.len(), 10);
    }

    #[test]
    fn trends_group_by_utc_day_ascending() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        for when in [at(7, 23), at(5, 1), at(7, 0), at(5, 2), at(5, 3)] {
            store.append(visit("/api/notes", "1.1.1.1", when)).unwrap();
        }
        let trends = stats.overview(&june()).unwrap().visitor_trends;
        assert_eq!(
            trends,
            vec![
                DayCount {
                    date: "2024-06-05".into(),
                    count: 3
                },
                DayCount {
                    date: "2024-06-07".into(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn distributions_cover_device_os_and_browser() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        let mut phone = visit("/api/notes", "1.1.1.1", at(8, 9));
        phone.device_type = "Mobile".into();
        phone.os = "iOS".into();
        phone.browser = "Safari".into();
        store.append(phone).unwrap();
        store.append(visit("/api/notes", "2.2.2.2", at(8, 10))).unwrap();
        store.append(visit("/api/notes", "3.3.3.3", at(8, 11))).unwrap();

        let overview = stats.overview(&june()).unwrap();
        assert_eq!(overview.device_stats.get("PC"), Some(&2));
        assert_eq!(overview.device_stats.get("Mobile"), Some(&1));
        assert_eq!(overview.os_stats[0], OsCount { os: "Linux".into(), count: 2 });
        assert_eq!(
            overview.browser_stats[1],
            BrowserCount { browser: "Safari".into(), count: 1 }
        );
    }

    #[test]
    fn bounds_are_inclusive_and_outside_records_excluded() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        store.append(visit("/in", "1.1.1.1", at(10, 0))).unwrap();
        store.append(visit("/in", "1.1.1.1", at(10, 23))).unwrap();
        store.append(visit("/out", "1.1.1.1", at(11, 0))).unwrap();

        let overview = stats
            .overview(&StatsFilter {
                start_date: Some("2024-06-10".into()),
                end_date: Some("2024-06-10".into()),
            })
            .unwrap();
        assert_eq!(overview.total_visits, 2);
        assert_eq!(overview.top_pages[0].path, "/in");
    }

    #[test]
    fn missing_bounds_default_to_trailing_window() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        store
            .append(visit("/recent", "1.1.1.1", Utc::now() - Duration::days(2)))
            .unwrap();
        store
            .append(visit("/old", "1.1.1.1", Utc::now() - Duration::days(45)))
            .unwrap();

        let overview = stats
            .overview(&StatsFilter {
                start_date: Some("garbage".into()),
                end_date: None,
            })
            .unwrap();
        assert_eq!(overview.total_visits, 1);
        assert_eq!(overview.top_pages[0].path, "/recent");
        assert!(overview.end - overview.start >= Duration::days(30));
    }

    #[test]
    fn end_only_filter_trails_the_given_end() {
        let tmp = TempDir::new().unwrap();
        let (store, stats) = aggregator(&tmp);
        for day in 10..=20 {
            let when = Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap();
            store.append(visit("/january", "1.1.1.1", when)).unwrap();
        }
        store
            .append(visit("/december", "1.1.1.1", Utc.with_ymd_and_hms(2023, 12, 1, 12, 0, 0).unwrap()))
            .unwrap();

        let overview = stats
            .overview(&StatsFilter {
                start_date: None,
                end_date: Some("2024-01-31".into()),
            })
            .unwrap();
        assert_eq!(overview.total_visits, 11);
        assert_eq!(overview.top_pages.len(), 1);
        assert_eq!(overview.top_pages[0].path, "/january");
        assert!(overview.start < overview.end);
        assert_eq!(overview.end - overview.start, Duration::days(30));
    }
}
