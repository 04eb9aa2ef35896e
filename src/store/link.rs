//! Object/user link rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::RecordId;

/// Composite key of the `object_users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectUserKey {
    pub object_id: RecordId,
    pub user_id: RecordId,
}

impl ObjectUserKey {
    pub fn new(object_id: RecordId, user_id: RecordId) -> Self {
        Self { object_id, user_id }
    }
}

/// A stored link. At most one exists per key; re-linking only moves
/// `updated_at` forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectUserLink {
    pub object_id: RecordId,
    pub user_id: RecordId,
    pub updated_at: DateTime<Utc>,
}

impl ObjectUserLink {
    pub fn new(key: ObjectUserKey, updated_at: DateTime<Utc>) -> Self {
        Self {
            object_id: key.object_id,
            user_id: key.user_id,
            updated_at,
        }
    }

    pub fn key(&self) -> ObjectUserKey {
        ObjectUserKey::new(self.object_id, self.user_id)
    }
}
