//! Service layer - business logic without the HTTP layer

pub mod exemplar_service;
pub mod lending_service;

use chrono::Utc;

/// Storage format for all timestamps. Plain `YYYY-MM-DD HH:MM:SS` in UTC
/// compares correctly as TEXT in SQLite, which the overdue query relies on.
pub const DATE_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_stamp() -> String {
    Utc::now().format(DATE_FMT).to_string()
}
