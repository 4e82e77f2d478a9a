//! Mutation log framing and replay.
//!
//! Each mutation is one frame:
//!
//! ```text
//! | magic "MSDL" (4) | payload length u32 LE (4) | CBOR payload | CRC32 u32 LE (4) |
//! ```
//!
//! The checksum covers the header and the payload.

use crate::backend::LogBackend;
use crate::document::DocumentId;
use crate::error::{StoreError, StoreResult};
use mapsync_codec::Record;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Magic bytes opening every frame.
pub const LOG_MAGIC: [u8; 4] = *b"MSDL";

/// magic (4) + length (4)
const HEADER_SIZE: usize = 8;

const CRC_SIZE: usize = 4;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Writes the full record of a document, creating or replacing it.
    Put {
        /// Target collection.
        collection: String,
        /// Document being written.
        id: DocumentId,
        /// The complete record after the mutation.
        record: Record,
    },
}

impl LogEntry {
    /// Encodes this entry as a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded or exceeds 4 GiB.
    pub fn encode_frame(&self) -> StoreResult<Vec<u8>> {
        let payload = mapsync_codec::to_cbor(self)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::corrupted(0, "log entry larger than 4 GiB"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }
}

/// Result of replaying a log.
#[derive(Debug, Default)]
pub struct Replay {
    /// Entries in log order.
    pub entries: Vec<LogEntry>,
    /// Bytes cut from a torn final frame.
    pub truncated: u64,
}

/// Reads every frame in the backend.
///
/// A damaged final frame (short header, short payload, or bad checksum)
/// is cut off and logged. Damage anywhere before the final frame is an
/// error and nothing is truncated.
///
/// # Errors
///
/// Returns `Corrupted` for bad magic, a bad mid-log frame, or an
/// undecodable payload.
pub fn replay(backend: &mut dyn LogBackend) -> StoreResult<Replay> {
    let size = backend.size()?;
    let mut offset = 0u64;
    let mut replay = Replay::default();

    while offset < size {
        let remaining = size - offset;
        if remaining < HEADER_SIZE as u64 {
            return cut_tail(backend, replay, offset, size, "incomplete frame header");
        }

        let header = backend.read_at(offset, HEADER_SIZE)?;
        if header[..4] != LOG_MAGIC {
            return Err(StoreError::corrupted(offset, "bad frame magic"));
        }
        let len = u64::from(u32::from_le_bytes([header[4], header[5], header[6], header[7]]));
        let frame_len = HEADER_SIZE as u64 + len + CRC_SIZE as u64;
        if remaining < frame_len {
            return cut_tail(backend, replay, offset, size, "incomplete frame payload");
        }

        let frame = backend.read_at(offset, frame_len as usize)?;
        let body_len = frame.len() - CRC_SIZE;
        let stored = u32::from_le_bytes([
            frame[body_len],
            frame[body_len + 1],
            frame[body_len + 2],
            frame[body_len + 3],
        ]);
        if compute_crc32(&frame[..body_len]) != stored {
            if offset + frame_len == size {
                return cut_tail(backend, replay, offset, size, "checksum mismatch");
            }
            return Err(StoreError::corrupted(offset, "checksum mismatch"));
        }

        let entry: LogEntry = mapsync_codec::from_cbor(&frame[HEADER_SIZE..body_len])
            .map_err(|e| StoreError::corrupted(offset, e.to_string()))?;
        replay.entries.push(entry);
        offset += frame_len;
    }

    Ok(replay)
}

fn cut_tail(
    backend: &mut dyn LogBackend,
    mut replay: Replay,
    offset: u64,
    size: u64,
    reason: &str,
) -> StoreResult<Replay> {
    warn!(
        offset,
        dropped = size - offset,
        reason,
        "truncating torn frame at end of document log"
    );
    backend.truncate(offset)?;
    replay.truncated = size - offset;
    Ok(replay)
}

/// Computes a CRC32 (IEEE polynomial) checksum.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
