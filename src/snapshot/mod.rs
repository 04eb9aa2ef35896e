//! Snapshot subsystem
//!
//! A snapshot is a complete, point-in-time keyed copy of one collection.
//! Each snapshot fully supersedes the previous one for consumers; there is
//! no delta model.
//!
//! # Design Principles
//!
//! - Full read: result sets are drained before a snapshot is handed out
//! - Ascending key order, so the encoded payload is byte-stable
//! - Encoding happens once per cycle and is shared by every subscriber

mod records;

use std::collections::BTreeMap;

use serde::Serialize;

pub use records::{Keyed, ObjectRecord, RecordId, UserRecord};

/// All rows of one collection as of a single read, keyed by identity.
pub type Snapshot<T> = BTreeMap<RecordId, T>;

/// The collections published by the relay, in publication order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Objects,
}

impl Collection {
    /// Every collection, in the order a refresh cycle publishes them.
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Objects];

    /// SSE event name carrying this collection's snapshot.
    pub fn event_name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Objects => "objects",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Build a snapshot from drained rows.
///
/// A later row with the same identity replaces an earlier one.
pub fn collect_snapshot<T: Keyed>(records: impl IntoIterator<Item = T>) -> Snapshot<T> {
    records
        .into_iter()
        .map(|record| (record.key(), record))
        .collect()
}

/// Encode a snapshot as the JSON object sent on the wire.
///
/// Integer identities become decimal object keys: `{"1":{...}}`.
pub fn encode<T: Serialize>(snapshot: &Snapshot<T>) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Collection::Users.event_name(), "users");
        assert_eq!(Collection::Objects.event_name(), "objects");
        assert_eq!(Collection::ALL, [Collection::Users, Collection::Objects]);
    }

    #[test]
    fn test_encode_users() {
        let users = collect_snapshot(vec![UserRecord::new(1, "a@x.com")]);
        assert_eq!(
            encode(&users).unwrap(),
            r#"{"1":{"ID":1,"Email":"a@x.com"}}"#
        );
    }

    #[test]
    fn test_encode_objects() {
        let objects = collect_snapshot(vec![ObjectRecord::new(1, "Chair", "chair.png")]);
        assert_eq!(
            encode(&objects).unwrap(),
            r#"{"1":{"ID":1,"Name":"Chair","Image":"chair.png"}}"#
        );
    }

    #[test]
    fn test_encode_orders_keys_numerically() {
        let users = collect_snapshot(vec![
            UserRecord::new(10, "ten@x.com"),
            UserRecord::new(2, "two@x.com"),
            UserRecord::new(-1, "neg@x.com"),
        ]);

        let json = encode(&users).unwrap();
        let neg = json.find("\"-1\"").unwrap();
        let two = json.find("\"2\"").unwrap();
        let ten = json.find("\"10\"").unwrap();
        assert!(neg < two);
        assert!(two < ten);
    }

    #[test]
    fn test_collect_last_row_wins() {
        let users = collect_snapshot(vec![
            UserRecord::new(1, "old@x.com"),
            UserRecord::new(1, "new@x.com"),
        ]);

        assert_eq!(users.len(), 1);
        assert_eq!(users[&1].email, "new@x.com");
    }

    #[test]
    fn test_encode_empty() {
        let users: Snapshot<UserRecord> = Snapshot::new();
        assert_eq!(encode(&users).unwrap(), "{}");
    }
}
