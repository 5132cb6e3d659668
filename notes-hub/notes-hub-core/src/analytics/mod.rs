//! Request analytics: an append-only access log in SQLite and the aggregate
//! queries over it.

pub mod filter;
pub mod models;
pub mod recorder;
pub mod stats;
pub mod store;

pub use models::{
    AccessLogPage, AccessRecord, AccessRecordInput, BrowserCount, DayCount, LogQuery, OsCount,
    PathCount, StatsFilter, StatsWindow,
};
pub use recorder::{AccessObserver, AccessRecorder};
pub use stats::StatsAggregator;
pub use store::AccessLogStore;
