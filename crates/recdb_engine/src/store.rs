//! In-memory tables and the merged views transactions read through.
//!
//! A table keeps its committed rows in an `Arc<Rows>` that is replaced
//! copy-on-write at commit, so snapshots and in-flight views are cheap
//! clones. Rows are keyed by the *stored key*, whose byte order is the
//! organization's order:
//!
//! - B-tree: the caller's key bytes.
//! - Hash: a CRC-32 bucket prefix (big-endian) followed by the key bytes.
//! - Recno and queue: the record number in big-endian.

use crate::errno::{Errno, Result};
use crate::flags::DbType;
use crate::thang::RECNO_SIZE;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Committed rows of one table.
pub(crate) type Rows = BTreeMap<Vec<u8>, Vec<u8>>;

/// Uncommitted writes of one transaction to one table. `None` is a delete.
pub(crate) type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

const BUCKET_SIZE: usize = 4;

/// Converts a caller key into its stored form.
pub(crate) fn stored_key(kind: DbType, key: &[u8]) -> Result<Vec<u8>> {
    match kind {
        DbType::BTree | DbType::Unknown => Ok(key.to_vec()),
        DbType::Hash => {
            let mut stored = Vec::with_capacity(BUCKET_SIZE + key.len());
            stored.extend_from_slice(&crc32fast::hash(key).to_be_bytes());
            stored.extend_from_slice(key);
            Ok(stored)
        }
        DbType::Recno | DbType::Queue => {
            let recno = record_number(key)?;
            Ok(recno.to_be_bytes().to_vec())
        }
    }
}

/// Converts a stored key back into the caller's form.
pub(crate) fn caller_key(kind: DbType, stored: &[u8]) -> Vec<u8> {
    match kind {
        DbType::BTree | DbType::Unknown => stored.to_vec(),
        DbType::Hash => stored[BUCKET_SIZE.min(stored.len())..].to_vec(),
        DbType::Recno | DbType::Queue => {
            let mut be = [0u8; RECNO_SIZE];
            be.copy_from_slice(&stored[..RECNO_SIZE]);
            u32::from_be_bytes(be).to_ne_bytes().to_vec()
        }
    }
}

/// Reads a native-endian record number; `0` is not a valid record.
pub(crate) fn record_number(key: &[u8]) -> Result<u32> {
    let raw: [u8; RECNO_SIZE] = key.try_into().map_err(|_| Errno::INVALID)?;
    match u32::from_ne_bytes(raw) {
        0 => Err(Errno::INVALID),
        n => Ok(n),
    }
}

/// One named database inside a file.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub(crate) kind: DbType,
    pub(crate) rows: Arc<Rows>,
    next_recno: u32,
}

impl Table {
    pub(crate) fn new(kind: DbType) -> Self {
        Self {
            kind,
            rows: Arc::new(Rows::new()),
            next_recno: 1,
        }
    }

    /// Reserves the next record number for an append.
    pub(crate) fn allocate_recno(&mut self) -> Result<u32> {
        let recno = self.next_recno;
        if recno == 0 {
            return Err(Errno::NO_SPACE);
        }
        self.next_recno = recno.wrapping_add(1);
        Ok(recno)
    }

    /// Keeps appends above an explicitly written record number.
    pub(crate) fn observe_recno(&mut self, recno: u32) {
        if self.next_recno != 0 && recno >= self.next_recno {
            self.next_recno = recno.wrapping_add(1);
        }
    }

    /// Applies committed writes.
    pub(crate) fn apply(&mut self, overlay: &Overlay) {
        let rows = Arc::make_mut(&mut self.rows);
        for (key, value) in overlay {
            match value {
                Some(value) => {
                    rows.insert(key.clone(), value.clone());
                }
                None => {
                    rows.remove(key);
                }
            }
        }
        if self.kind.is_record_number() {
            if let Some(last) = overlay.keys().next_back() {
                if let Ok(raw) = <[u8; RECNO_SIZE]>::try_from(last.as_slice()) {
                    self.observe_recno(u32::from_be_bytes(raw));
                }
            }
        }
    }

    /// Applies one logged change while replaying a file.
    pub(crate) fn replay(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) {
        if self.kind.is_record_number() {
            if let Ok(raw) = <[u8; RECNO_SIZE]>::try_from(key.as_slice()) {
                self.observe_recno(u32::from_be_bytes(raw));
            }
        }
        let rows = Arc::make_mut(&mut self.rows);
        match value {
            Some(value) => {
                rows.insert(key, value);
            }
            None => {
                rows.remove(&key);
            }
        }
    }

    /// Drops every row.
    pub(crate) fn clear(&mut self) {
        self.rows = Arc::new(Rows::new());
        self.next_recno = 1;
    }
}

/// Direction of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

/// Committed rows seen through a stack of overlays, innermost last.
#[derive(Debug, Clone)]
pub(crate) struct View {
    base: Arc<Rows>,
    layers: Vec<Arc<Overlay>>,
}

impl View {
    pub(crate) fn new(base: Arc<Rows>, layers: Vec<Arc<Overlay>>) -> Self {
        Self { base, layers }
    }

    /// Looks up the visible value for a stored key.
    pub(crate) fn get(&self, key: &[u8]) -> Option<&[u8]> {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.get(key) {
                return value.as_deref();
            }
        }
        self.base.get(key).map(Vec::as_slice)
    }

    /// Finds the first visible row beyond `from` in `dir`. An unbounded
    /// start begins at that end of the table.
    pub(crate) fn seek(&self, from: Bound<&[u8]>, dir: Direction) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut bound: Bound<Vec<u8>> = match from {
            Bound::Included(k) => Bound::Included(k.to_vec()),
            Bound::Excluded(k) => Bound::Excluded(k.to_vec()),
            Bound::Unbounded => Bound::Unbounded,
        };

        loop {
            let target = as_slice_bound(&bound);
            let mut best: Option<&[u8]> = nearest(&self.base, target, dir);
            for layer in &self.layers {
                let candidate = nearest(layer, target, dir);
                best = closer(best, candidate, dir);
            }
            let key = best?.to_vec();
            if let Some(value) = self.get(&key) {
                return Some((key, value.to_vec()));
            }
            bound = Bound::Excluded(key);
        }
    }

    /// Iterates visible rows in order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + '_ {
        let mut from: Option<Vec<u8>> = None;
        std::iter::from_fn(move || {
            let bound = match &from {
                Some(k) => Bound::Excluded(k.as_slice()),
                None => Bound::Unbounded,
            };
            let (key, value) = self.seek(bound, Direction::Forward)?;
            from = Some(key.clone());
            Some((key, value))
        })
    }
}

fn nearest<'v, V>(
    map: &'v BTreeMap<Vec<u8>, V>,
    from: Bound<&[u8]>,
    dir: Direction,
) -> Option<&'v [u8]> {
    let entry = match dir {
        Direction::Forward => map.range::<[u8], _>((from, Bound::Unbounded)).next(),
        Direction::Backward => map.range::<[u8], _>((Bound::Unbounded, from)).next_back(),
    };
    entry.map(|(k, _)| k.as_slice())
}

fn as_slice_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn closer<'a>(a: Option<&'a [u8]>, b: Option<&'a [u8]>, dir: Direction) -> Option<&'a [u8]> {
    match (a, b) {
        (Some(a), Some(b)) => Some(match dir {
            Direction::Forward => a.min(b),
            Direction::Backward => a.max(b),
        }),
        (a, None) => a,
        (None, b) => b,
    }
}
