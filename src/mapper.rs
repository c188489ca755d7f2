//! Normalize loosely typed SQLite values into the strict types the models use.
//!
//! Columns in `chat.db` are declared loosely and old rows hold integers, reals or
//! NULL in the same column. Every accessor here accepts whatever storage class
//! arrives and never fails on content; only a bad column index is an error.

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::Row;
use rusqlite::types::ValueRef;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the epoch Messages uses.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

pub fn apple_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(APPLE_EPOCH_OFFSET)
}

/// Convert a stored nanosecond offset into a UTC timestamp. A missing value maps
/// to the Apple epoch itself.
pub fn apple_date(nanos: Option<i64>) -> DateTime<Utc> {
    let epoch = apple_epoch();
    match nanos {
        Some(nanos) => epoch
            .checked_add_signed(TimeDelta::nanoseconds(nanos))
            .unwrap_or(epoch),
        None => epoch,
    }
}

/// Inverse of [`apple_date`]: the value `message.date` stores for `date`. `None` when
/// the offset does not fit in 64-bit nanoseconds (roughly ±292 years from 2001).
pub fn to_apple_nanos(date: DateTime<Utc>) -> Option<i64> {
    (date - apple_epoch()).num_nanoseconds()
}

pub fn int64_value(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(n) => Some(n),
        ValueRef::Real(f) if f.is_finite() => Some(f as i64),
        ValueRef::Text(raw) => std::str::from_utf8(raw).ok()?.trim().parse().ok(),
        _ => None,
    }
}

pub fn bool_value(value: ValueRef<'_>) -> bool {
    int64_value(value).is_some_and(|n| n != 0)
}

pub fn string_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Text(raw) => String::from_utf8_lossy(raw).into_owned(),
        _ => String::new(),
    }
}

pub fn blob_value(value: ValueRef<'_>) -> Vec<u8> {
    match value {
        ValueRef::Blob(raw) | ValueRef::Text(raw) => raw.to_vec(),
        _ => Vec::new(),
    }
}

// Row accessors used inside `query_map` closures.

pub fn opt_i64(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(int64_value(row.get_ref(idx)?))
}

pub fn i64_or_zero(row: &Row<'_>, idx: usize) -> rusqlite::Result<i64> {
    Ok(opt_i64(row, idx)?.unwrap_or(0))
}

pub fn flag(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(bool_value(row.get_ref(idx)?))
}

pub fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(string_value(row.get_ref(idx)?))
}

pub fn blob(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    Ok(blob_value(row.get_ref(idx)?))
}

pub fn date(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(apple_date(opt_i64(row, idx)?))
}
