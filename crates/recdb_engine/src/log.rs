//! Append-only frame log backing each database file.
//!
//! ```text
//! frame   := kind (1) | length (4, LE) | payload | crc32 (4, LE)
//! header  := magic "RCDB" | version (2, LE) | flags (1) [| salt (16) | len (4) | sealed verifier]
//! batch   := [sealed] count (4, LE) | op*
//! op      := tag (1) | name | body
//! ```
//!
//! The first frame is always the header. Every committed write set of a file
//! becomes exactly one batch frame, so a batch is applied entirely or not at
//! all. The CRC covers kind, length and payload. A frame that is cut short
//! or fails its checksum marks the torn tail of the log.

use crate::crypto::{self, Cipher, SALT_SIZE, VERIFIER};
use crate::errno::{Errno, Result};
use crate::flags::DbType;
use recdb_storage::StorageBackend;
use thiserror::Error;
use tracing::{debug, warn};

const MAGIC: [u8; 4] = *b"RCDB";
const FORMAT_VERSION: u16 = 1;
const FLAG_ENCRYPTED: u8 = 0x01;

/// kind (1) + length (4)
const FRAME_HEADER_SIZE: usize = 5;
const CRC_SIZE: usize = 4;

const KIND_HEADER: u8 = 1;
const KIND_BATCH: u8 = 2;

const OP_CREATE: u8 = 1;
const OP_PUT: u8 = 2;
const OP_DEL: u8 = 3;

/// Reasons a frame marks the end of the readable log.
#[derive(Debug, Error, PartialEq, Eq)]
enum FrameError {
    #[error("frame truncated at offset {0}")]
    Truncated(usize),
    #[error("checksum mismatch at offset {0}")]
    Checksum(usize),
    #[error("unexpected frame kind {kind} at offset {offset}")]
    UnexpectedKind { kind: u8, offset: usize },
    #[error("malformed batch at offset {0}")]
    Malformed(usize),
}

/// One logged change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogOp {
    /// A database was created in the file.
    Create { name: Option<String>, kind: DbType },
    /// A key was written.
    Put {
        name: Option<String>,
        key: Vec<u8>,
        data: Vec<u8>,
    },
    /// A key was removed.
    Del { name: Option<String>, key: Vec<u8> },
}

/// What a commit does after appending its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Durability {
    /// Sync data and metadata.
    Sync,
    /// Hand data to the OS only.
    Flush,
    /// Leave data buffered.
    Lazy,
}

/// The frame log of one file.
pub(crate) struct FrameLog {
    backend: Box<dyn StorageBackend>,
    cipher: Option<Cipher>,
}

impl std::fmt::Debug for FrameLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLog")
            .field("encrypted", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

impl FrameLog {
    /// Opens the log held by `backend` and returns every logged op in order.
    ///
    /// An empty backend gets a fresh header. A torn tail is cut when
    /// `may_recover` is set and reported as [`Errno::RUN_RECOVERY`]
    /// otherwise.
    pub(crate) fn open(
        mut backend: Box<dyn StorageBackend>,
        password: Option<&str>,
        may_recover: bool,
    ) -> Result<(Self, Vec<LogOp>)> {
        let size = backend.size()?;
        let bytes = backend.read_at(0, size as usize)?;

        let mut cipher = None;
        let mut header_seen = false;
        let mut ops = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let parsed = next_frame(&bytes, offset).and_then(|(kind, payload, next)| {
                match (header_seen, kind) {
                    (false, KIND_HEADER) => Ok((Frame::Header(payload), next)),
                    (true, KIND_BATCH) => Ok((Frame::Batch(payload), next)),
                    _ => Err(FrameError::UnexpectedKind { kind, offset }),
                }
            });

            match parsed {
                Ok((Frame::Header(payload), next)) => {
                    cipher = read_header(payload, password)?;
                    header_seen = true;
                    offset = next;
                }
                Ok((Frame::Batch(payload), next)) => {
                    let plain = match &cipher {
                        Some(c) => c.open(payload).map_err(|_| FrameError::Malformed(offset)),
                        None => Ok(payload.to_vec()),
                    };
                    match plain.and_then(|p| decode_batch(&p, offset)) {
                        Ok(batch) => {
                            ops.extend(batch);
                            offset = next;
                        }
                        Err(err) => {
                            cut_tail(backend.as_mut(), offset, &err, may_recover)?;
                            break;
                        }
                    }
                }
                Err(err) => {
                    cut_tail(backend.as_mut(), offset, &err, may_recover)?;
                    break;
                }
            }
        }

        let mut log = Self { backend, cipher };
        if !header_seen {
            log.write_header(password)?;
        }
        debug!(ops = ops.len(), "frame log opened");
        Ok((log, ops))
    }

    /// Discards the whole log and starts a new one.
    pub(crate) fn reset(&mut self, password: Option<&str>) -> Result<()> {
        self.backend.truncate(0)?;
        self.write_header(password)
    }

    /// Appends one batch frame.
    pub(crate) fn append(&mut self, ops: &[LogOp], durability: Durability) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let plain = encode_batch(ops)?;
        let payload = match &self.cipher {
            Some(c) => c.seal(&plain)?,
            None => plain,
        };
        self.backend.append(&frame(KIND_BATCH, &payload)?)?;
        match durability {
            Durability::Sync => self.backend.sync()?,
            Durability::Flush => self.backend.flush()?,
            Durability::Lazy => {}
        }
        Ok(())
    }

    /// Syncs everything appended so far.
    pub(crate) fn sync(&mut self) -> Result<()> {
        self.backend.sync()?;
        Ok(())
    }

    /// Returns true if batches are sealed.
    pub(crate) fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn write_header(&mut self, password: Option<&str>) -> Result<()> {
        let mut payload = Vec::with_capacity(64);
        payload.extend_from_slice(&MAGIC);
        payload.extend_from_slice(&FORMAT_VERSION.to_le_bytes());

        self.cipher = match password {
            Some(password) => {
                let salt = crypto::generate_salt()?;
                let cipher = Cipher::new(password, &salt)?;
                let verifier = cipher.seal(VERIFIER)?;
                payload.push(FLAG_ENCRYPTED);
                payload.extend_from_slice(&salt);
                put_bytes(&mut payload, &verifier)?;
                Some(cipher)
            }
            None => {
                payload.push(0);
                None
            }
        };

        self.backend.append(&frame(KIND_HEADER, &payload)?)?;
        self.backend.sync()?;
        Ok(())
    }
}

enum Frame<'a> {
    Header(&'a [u8]),
    Batch(&'a [u8]),
}

fn cut_tail(
    backend: &mut dyn StorageBackend,
    offset: usize,
    err: &FrameError,
    may_recover: bool,
) -> Result<()> {
    if !may_recover {
        warn!(offset, error = %err, "torn log tail, recovery required");
        return Err(Errno::RUN_RECOVERY);
    }
    warn!(offset, error = %err, "truncating torn log tail");
    backend.truncate(offset as u64)?;
    Ok(())
}

fn frame(kind: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| Errno::INVALID)?;
    let mut data = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + CRC_SIZE);
    data.push(kind);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);
    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

fn next_frame(bytes: &[u8], offset: usize) -> std::result::Result<(u8, &[u8], usize), FrameError> {
    let header_end = offset + FRAME_HEADER_SIZE;
    if header_end > bytes.len() {
        return Err(FrameError::Truncated(offset));
    }
    let kind = bytes[offset];
    let mut len = [0u8; 4];
    len.copy_from_slice(&bytes[offset + 1..header_end]);
    let len = u32::from_le_bytes(len) as usize;

    let payload_end = header_end
        .checked_add(len)
        .ok_or(FrameError::Truncated(offset))?;
    let frame_end = payload_end + CRC_SIZE;
    if frame_end > bytes.len() {
        return Err(FrameError::Truncated(offset));
    }

    let mut stored = [0u8; 4];
    stored.copy_from_slice(&bytes[payload_end..frame_end]);
    if u32::from_le_bytes(stored) != crc32fast::hash(&bytes[offset..payload_end]) {
        return Err(FrameError::Checksum(offset));
    }

    Ok((kind, &bytes[header_end..payload_end], frame_end))
}

fn read_header(payload: &[u8], password: Option<&str>) -> Result<Option<Cipher>> {
    let mut r = Reader::new(payload);
    let magic = r.take(MAGIC.len()).ok_or(Errno::INVALID)?;
    if magic != MAGIC {
        return Err(Errno::INVALID);
    }
    let version = r.u16().ok_or(Errno::INVALID)?;
    if version != FORMAT_VERSION {
        return Err(Errno::VERSION_MISMATCH);
    }
    let flags = r.u8().ok_or(Errno::INVALID)?;
    let encrypted = flags & FLAG_ENCRYPTED != 0;

    match (encrypted, password) {
        (false, None) => Ok(None),
        (false, Some(_)) | (true, None) => Err(Errno::INVALID),
        (true, Some(password)) => {
            let salt = r.take(SALT_SIZE).ok_or(Errno::INVALID)?;
            let verifier = r.bytes().ok_or(Errno::INVALID)?;
            let cipher = Cipher::new(password, salt)?;
            if cipher.open(verifier)? != VERIFIER {
                return Err(Errno::ACCESS);
            }
            Ok(Some(cipher))
        }
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| Errno::INVALID)?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_name(buf: &mut Vec<u8>, name: Option<&str>) -> Result<()> {
    match name {
        Some(name) => {
            buf.push(1);
            put_bytes(buf, name.as_bytes())
        }
        None => {
            buf.push(0);
            Ok(())
        }
    }
}

fn encode_batch(ops: &[LogOp]) -> Result<Vec<u8>> {
    let count = u32::try_from(ops.len()).map_err(|_| Errno::INVALID)?;
    let mut buf = Vec::new();
    buf.extend_from_slice(&count.to_le_bytes());
    for op in ops {
        match op {
            LogOp::Create { name, kind } => {
                buf.push(OP_CREATE);
                put_name(&mut buf, name.as_deref())?;
                buf.push(kind.as_raw() as u8);
            }
            LogOp::Put { name, key, data } => {
                buf.push(OP_PUT);
                put_name(&mut buf, name.as_deref())?;
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, data)?;
            }
            LogOp::Del { name, key } => {
                buf.push(OP_DEL);
                put_name(&mut buf, name.as_deref())?;
                put_bytes(&mut buf, key)?;
            }
        }
    }
    Ok(buf)
}

fn decode_batch(payload: &[u8], offset: usize) -> std::result::Result<Vec<LogOp>, FrameError> {
    let malformed = || FrameError::Malformed(offset);
    let mut r = Reader::new(payload);
    let count = r.u32().ok_or_else(malformed)?;
    let mut ops = Vec::with_capacity(count.min(1024) as usize);

    for _ in 0..count {
        let tag = r.u8().ok_or_else(malformed)?;
        let name = r.name().ok_or_else(malformed)?;
        let op = match tag {
            OP_CREATE => {
                let kind = r
                    .u8()
                    .and_then(|raw| DbType::from_raw(u32::from(raw)))
                    .ok_or_else(malformed)?;
                LogOp::Create { name, kind }
            }
            OP_PUT => {
                let key = r.bytes().ok_or_else(malformed)?.to_vec();
                let data = r.bytes().ok_or_else(malformed)?.to_vec();
                LogOp::Put { name, key, data }
            }
            OP_DEL => {
                let key = r.bytes().ok_or_else(malformed)?.to_vec();
                LogOp::Del { name, key }
            }
            _ => return Err(malformed()),
        };
        ops.push(op);
    }

    if !r.is_empty() {
        return Err(malformed());
    }
    Ok(ops)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        let b = self.take(2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn bytes(&mut self) -> Option<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn name(&mut self) -> Option<Option<String>> {
        match self.u8()? {
            0 => Some(None),
            1 => {
                let raw = self.bytes()?;
                String::from_utf8(raw.to_vec()).ok().map(Some)
            }
            _ => None,
        }
    }
}
