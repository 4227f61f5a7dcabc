//! Stored Entry Module
//!
//! Defines the unit of storage and its on-disk frame. A frame is
//! magic + version + CRC32C + bincode body; a frame that fails any of
//! those checks reads back as a corrupt entry.

use std::time::{SystemTime, UNIX_EPOCH};

use crc32c::crc32c;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Frame Constants ==
/// Magic number for entry frames: "FCE1"
pub const ENTRY_MAGIC: u32 = 0x4643_4531;

/// Current entry frame version
pub const ENTRY_VERSION: u16 = 1;

/// magic (4) + version (2) + crc (4)
const FRAME_HEADER_LEN: usize = 10;

// == Payload ==
/// How a value was stored, persisted explicitly alongside the bytes.
///
/// The tag travels with the entry so reads never have to sniff the
/// payload shape to pick a decode path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// JSON bytes of a document, stored as-is
    Raw(Vec<u8>),
    /// Columnar-encoded blob produced by the value codec
    Columnar(Vec<u8>),
}

impl Payload {
    /// The stored bytes, whichever path produced them.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Payload::Raw(bytes) => bytes,
            Payload::Columnar(bytes) => bytes,
        }
    }

    /// Byte length of the stored representation.
    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

// == Stored Entry ==
/// A single persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The key, stored in the frame so a directory scan can rebuild the index
    pub key: String,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = never expires
    pub expires_at: Option<u64>,
    /// Byte footprint of the stored payload, computed at write time
    pub size: u64,
    /// The stored bytes with their encoding tag
    pub payload: Payload,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates an entry; `size` is the byte length of the payload as stored.
    pub fn new(key: String, expires_at: Option<u64>, payload: Payload) -> Self {
        Self {
            key,
            stored_at: now_ms(),
            expires_at,
            size: payload.len(),
            payload,
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiry.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => now_ms() >= expires,
            None => false,
        }
    }

    // == Frame Encoding ==
    /// Serializes the entry into its on-disk frame.
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| CacheError::EncodeFailure(format!("entry frame for '{}': {e}", self.key)))?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
        frame.extend_from_slice(&ENTRY_MAGIC.to_le_bytes());
        frame.extend_from_slice(&ENTRY_VERSION.to_le_bytes());
        frame.extend_from_slice(&crc32c(&body).to_le_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Parses an entry from its on-disk frame.
    ///
    /// `key_hint` names the entry in the corruption report; the
    /// authoritative key lives inside the frame body.
    pub fn from_frame(key_hint: &str, bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: String| CacheError::CorruptEntry {
            key: key_hint.to_string(),
            reason,
        };

        if bytes.len() < FRAME_HEADER_LEN {
            return Err(corrupt(format!("frame truncated at {} bytes", bytes.len())));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != ENTRY_MAGIC {
            return Err(corrupt(format!(
                "bad magic: expected {ENTRY_MAGIC:08x}, got {magic:08x}"
            )));
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version > ENTRY_VERSION {
            return Err(corrupt(format!("unsupported frame version {version}")));
        }
        let stored_crc = u32::from_le_bytes(bytes[6..10].try_into().unwrap());
        let body = &bytes[FRAME_HEADER_LEN..];
        let actual_crc = crc32c(body);
        if stored_crc != actual_crc {
            return Err(corrupt(format!(
                "checksum mismatch: stored {stored_crc:08x}, computed {actual_crc:08x}"
            )));
        }

        bincode::deserialize(body).map_err(|e| corrupt(format!("unparseable body: {e}")))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
