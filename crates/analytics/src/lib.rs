//! Logstream analytics
//!
//! Read-side operations over buffered entries: filtered queries, JSON/CSV
//! export, and the on-demand [`LogAnalytics`] snapshot.

pub mod export;
pub mod query;
pub mod report;

pub use export::{export_logs, ExportError, ExportFormat};
pub use query::{query_logs, DEFAULT_QUERY_LIMIT};
pub use report::{
    compute_analytics, HealthStatus, HotIssue, LogAnalytics, ServiceHealth, TrendBucket,
    UserActivity,
};
