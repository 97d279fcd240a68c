pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use clock::{saturating_secs, saturating_sub, Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{CoreError, CoreResult};
pub use filter::LogFilter;
pub use types::{EntryMetadata, LogContext, LogEntry, LogLevel};
