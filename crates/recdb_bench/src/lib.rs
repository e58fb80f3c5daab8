//! Benchmark utilities.

use rand::Rng;
use recdb_core::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// Generate random payload bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A record keyed by a structured integer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blob {
    /// Key slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl Blob {
    /// Creates a blob with a random payload.
    pub fn random(id: u32, size: usize) -> Self {
        Self {
            id: Some(id),
            payload: random_data(size),
        }
    }
}

impl Record for Blob {
    type Key = u32;

    fn record_key(&mut self) -> &mut u32 {
        self.id.get_or_insert(0)
    }

    fn record_without_key(&self) -> Self {
        Self {
            id: None,
            payload: self.payload.clone(),
        }
    }
}

/// A queue entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    /// Key slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl Record for Job {
    type Key = RecordId;

    fn record_key(&mut self) -> &mut RecordId {
        self.id.get_or_insert_with(RecordId::default)
    }

    fn record_without_key(&self) -> Self {
        Self {
            id: None,
            payload: self.payload.clone(),
        }
    }
}

/// Generate `count` blobs with ids `0..count`.
pub fn generate_blobs(count: usize, payload_size: usize) -> Vec<Blob> {
    (0..count as u32)
        .map(|id| Blob::random(id, payload_size))
        .collect()
}
