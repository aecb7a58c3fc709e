//! Data models for devjournal.
//!
//! Remote snapshots (Linear projects and issues, notes), sync results,
//! the knowledge index and citations.

mod index;
mod remote;

pub use index::*;
pub use remote::*;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a new UUID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC timestamp in the format stored in the database.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SHA-256 hex digest of a value's JSON form.
///
/// Field order follows the struct definition, so equal snapshots hash equally.
pub fn hash_snapshot<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Three-state update for an optional column.
///
/// `Unchanged` leaves the stored value alone, `Clear` writes NULL and
/// `Set` writes the value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Unchanged,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// Value to bind when the column is written; `None` for `Clear`.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Set(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    /// `None` means "no change", never "clear".
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Snap<'a> {
        a: &'a str,
        b: i32,
    }

    #[test]
    fn test_hash_snapshot_is_stable() {
        let one = hash_snapshot(&Snap { a: "x", b: 1 });
        let two = hash_snapshot(&Snap { a: "x", b: 1 });
        let other = hash_snapshot(&Snap { a: "x", b: 2 });
        assert_eq!(one, two);
        assert_ne!(one, other);
        assert_eq!(one.len(), 64);
    }

    #[test]
    fn test_field_update_from_option() {
        assert_eq!(FieldUpdate::from(Some(3)), FieldUpdate::Set(3));
        assert!(FieldUpdate::<i32>::from(None).is_unchanged());
        assert_eq!(FieldUpdate::<i32>::Clear.value(), None);
    }
}
