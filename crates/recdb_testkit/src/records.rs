//! Sample records.
//!
//! One record per key shape: a structured string key, a structured
//! integer key, and a record number.

use recdb_core::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// A record keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Key slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Birth year.
    pub born: u16,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Person {
    /// Creates a person without tags.
    pub fn new(name: &str, born: u16) -> Self {
        Self {
            name: Some(name.to_owned()),
            born,
            tags: Vec::new(),
        }
    }

    /// Creates a record carrying only a key, for lookups.
    pub fn keyed(name: &str) -> Self {
        Self {
            name: Some(name.to_owned()),
            ..Self::default()
        }
    }

    /// Returns the key, or an empty string.
    pub fn key(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

impl Record for Person {
    type Key = String;

    fn record_key(&mut self) -> &mut String {
        self.name.get_or_insert_with(String::new)
    }

    fn record_without_key(&self) -> Self {
        Self {
            name: None,
            ..self.clone()
        }
    }
}

/// A record keyed by a structured integer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Key slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Counted hits.
    pub hits: u64,
}

impl Counter {
    /// Creates a counter.
    pub fn new(id: u32, hits: u64) -> Self {
        Self { id: Some(id), hits }
    }
}

impl Record for Counter {
    type Key = u32;

    fn record_key(&mut self) -> &mut u32 {
        self.id.get_or_insert(0)
    }

    fn record_without_key(&self) -> Self {
        Self {
            id: None,
            hits: self.hits,
        }
    }
}

/// A record keyed by record number, for record-number databases and queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Key slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Ticket subject.
    pub subject: String,
}

impl Ticket {
    /// Creates a ticket without a number.
    pub fn new(subject: &str) -> Self {
        Self {
            id: None,
            subject: subject.to_owned(),
        }
    }

    /// Creates a ticket with a number.
    pub fn numbered(id: u32, subject: &str) -> Self {
        Self {
            id: Some(RecordId(id)),
            subject: subject.to_owned(),
        }
    }

    /// Returns the record number, or zero.
    pub fn number(&self) -> u32 {
        self.id.map_or(0, RecordId::as_u32)
    }
}

impl Record for Ticket {
    type Key = RecordId;

    fn record_key(&mut self) -> &mut RecordId {
        self.id.get_or_insert_with(RecordId::default)
    }

    fn record_without_key(&self) -> Self {
        Self {
            id: None,
            subject: self.subject.clone(),
        }
    }
}
