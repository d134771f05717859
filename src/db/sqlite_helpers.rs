//! SQLite helper utilities for type conversion
//!
//! SQLite has no native boolean, list or timestamp types. Flags are stored as
//! 0/1 integers, lists as JSON text and timestamps as local `YYYY-mm-dd HH:MM:SS`
//! text so that lexical order equals chronological order.

use chrono::{Duration, Local};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Timestamp layout used by every DATE/UPDATE_TIME column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Array/Vec Helpers (stored as JSON strings in SQLite)
// ============================================================================

/// Serialize a Vec to a JSON string for SQLite storage
#[inline]
pub fn vec_to_json<T: Serialize>(v: &[T]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a JSON string from SQLite to a Vec
#[inline]
pub fn json_to_vec<T: DeserializeOwned>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

/// Serialize any serializable value to a JSON string
#[inline]
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Current local time in the stored layout
#[inline]
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Local time `days` ago in the stored layout
#[inline]
pub fn timestamp_days_ago(days: i64) -> String {
    (Local::now() - Duration::days(days))
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

// ============================================================================
// Boolean Helpers (SQLite uses 0/1 integers)
// ============================================================================

/// Convert bool to SQLite integer (0 or 1)
#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert SQLite integer to bool
#[inline]
pub fn int_to_bool(i: i32) -> bool {
    i != 0
}

/// Convert a `Y`/`N` flag column to bool
#[inline]
pub fn yn_to_bool(s: Option<&str>) -> bool {
    matches!(s, Some("Y") | Some("y"))
}

/// Convert bool to a `Y`/`N` flag column
#[inline]
pub fn bool_to_yn(b: bool) -> &'static str {
    if b { "Y" } else { "N" }
}

// ============================================================================
// Row Helpers (legacy columns are nullable throughout)
// ============================================================================

/// Read a nullable TEXT column, mapping NULL to an empty string
#[inline]
pub fn text(row: &SqliteRow, column: &str) -> sqlx::Result<String> {
    Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
}

/// Read a nullable INTEGER column, mapping NULL to 0
#[inline]
pub fn int(row: &SqliteRow, column: &str) -> sqlx::Result<i64> {
    Ok(row.try_get::<Option<i64>, _>(column)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_json_roundtrip() {
        let v = vec!["transfer_finished".to_string(), "site_message".to_string()];
        let json = vec_to_json(&v);
        let parsed: Vec<String> = json_to_vec(&json);
        assert_eq!(v, parsed);
    }

    #[test]
    fn test_invalid_json_is_empty() {
        let parsed: Vec<String> = json_to_vec("not json");
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_timestamp_format() {
        let now = now_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&now, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_days_ago_sorts_before_now() {
        assert!(timestamp_days_ago(30) < now_timestamp());
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(bool_to_int(true), 1);
        assert_eq!(bool_to_int(false), 0);
        assert!(int_to_bool(1));
        assert!(int_to_bool(42));
        assert!(!int_to_bool(0));
        assert!(yn_to_bool(Some("Y")));
        assert!(!yn_to_bool(Some("N")));
        assert!(!yn_to_bool(None));
        assert_eq!(bool_to_yn(true), "Y");
    }
}
