//! Row types read by the snapshot readers.
//!
//! Field names on the wire are the capitalized column names consumers
//! already depend on (`ID`, `Email`, `Name`, `Image`).

use serde::{Deserialize, Serialize};

/// Identity of a record within its collection.
pub type RecordId = i64;

/// A record that knows its own identity.
pub trait Keyed {
    fn key(&self) -> RecordId;
}

/// A row of the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "ID")]
    pub id: RecordId,

    #[serde(rename = "Email")]
    pub email: String,
}

impl UserRecord {
    pub fn new(id: RecordId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }
}

impl Keyed for UserRecord {
    fn key(&self) -> RecordId {
        self.id
    }
}

/// A row of the `objects` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    #[serde(rename = "ID")]
    pub id: RecordId,

    #[serde(rename = "Name")]
    pub name: String,

    /// Image reference (path or URL)
    #[serde(rename = "Image")]
    pub image: String,
}

impl ObjectRecord {
    pub fn new(id: RecordId, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            image: image.into(),
        }
    }
}

impl Keyed for ObjectRecord {
    fn key(&self) -> RecordId {
        self.id
    }
}
