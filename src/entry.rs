// SPDX-License-Identifier: PMPL-1.0-or-later
//
// segwal - Entry codec
//
// Defines the log record struct and its binary serialization with CRC-32C
// integrity checking. The format is traversable in both directions: the
// payload length is written twice, once in the header and once as a trailer,
// so a reader can step backward by reading the four bytes preceding its
// cursor.
//
// On-disk record format (integers little-endian unless noted):
//   [8 bytes:  index (u64)]
//   [4 bytes:  length (u32)]        -- payload byte count
//   [L bytes:  data]
//   [15 bytes: timestamp]           -- binary time encoding, see below
//   [4 bytes:  crc32 (u32)]         -- CRC-32C over data only
//   [4 bytes:  length (u32)]        -- trailer, repeat of length

use std::io::{Read, Seek, SeekFrom, Write};

use chrono::{DateTime, Utc};

use crate::error::{WalError, WalResult};

/// Size of the fixed portion of a record: index (8) + length (4) +
/// timestamp (15) + crc32 (4) + trailer length (4).
pub const ENTRY_OVERHEAD: u64 = 35;

/// Maximum allowed payload size: 64 MiB. Any record declaring a larger
/// payload is treated as corrupted.
pub const MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024;

/// Size of the binary timestamp encoding.
const TIMESTAMP_SIZE: usize = 15;

/// Version byte the timestamp encoder emits and the decoder requires.
const TIMESTAMP_VERSION: u8 = 1;

/// Seconds between Jan 1 year 1 and the Unix epoch. The timestamp encoding
/// stores seconds on the year-1 scale.
const UNIX_TO_ABSOLUTE_SECS: i64 = 62_135_596_800;

/// A single record in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Monotonically increasing index assigned by the log, starting at 0.
    pub index: u64,

    /// Opaque payload bytes.
    pub data: Vec<u8>,

    /// UTC wall-clock time assigned at append, nanosecond resolution.
    pub timestamp: DateTime<Utc>,

    /// CRC-32C (Castagnoli) checksum over the payload.
    pub crc32: u32,
}

impl WalEntry {
    /// Build a record for the given index and payload, stamped with the
    /// current UTC time and a freshly computed checksum.
    pub fn new(index: u64, data: Vec<u8>) -> Self {
        let crc32 = crc32c::crc32c(&data);
        Self {
            index,
            data,
            timestamp: Utc::now(),
            crc32,
        }
    }

    /// Payload byte count as stored in the header and trailer fields.
    pub fn length(&self) -> u32 {
        self.data.len() as u32
    }

    /// Total on-disk size of this record.
    pub fn size(&self) -> u64 {
        ENTRY_OVERHEAD + self.data.len() as u64
    }
}

/// Serialize a record into the writer.
///
/// The record is assembled in a buffer sized exactly `entry.size()` and
/// handed to the sink as a single write, so an append is one syscall and a
/// crash cannot interleave partial records from separate writes.
pub fn write_entry<W: Write>(writer: &mut W, entry: &WalEntry) -> WalResult<()> {
    let length = entry.length();

    let mut buffer = Vec::with_capacity(entry.size() as usize);
    buffer.extend_from_slice(&entry.index.to_le_bytes());
    buffer.extend_from_slice(&length.to_le_bytes());
    buffer.extend_from_slice(&entry.data);
    buffer.extend_from_slice(&encode_timestamp(&entry.timestamp));
    buffer.extend_from_slice(&entry.crc32.to_le_bytes());
    buffer.extend_from_slice(&length.to_le_bytes());

    writer.write_all(&buffer)?;
    Ok(())
}

/// Deserialize one record from the reader's current position and verify its
/// checksum.
///
/// A read that starts exactly at end of file, or a record cut short by a
/// crash, fails with [`WalError::UnexpectedEof`]. A payload that does not
/// match its stored CRC-32C fails with [`WalError::CrcMismatch`].
pub fn read_entry<R: Read>(reader: &mut R) -> WalResult<WalEntry> {
    let mut u64_buf = [0u8; 8];
    read_exact_or_eof(reader, &mut u64_buf)?;
    let index = u64::from_le_bytes(u64_buf);

    let mut u32_buf = [0u8; 4];
    read_exact_or_eof(reader, &mut u32_buf)?;
    let length = u32::from_le_bytes(u32_buf);

    if length as u64 > MAX_ENTRY_SIZE {
        return Err(WalError::EntryTooLarge {
            index,
            length: length as u64,
            max_length: MAX_ENTRY_SIZE,
        });
    }

    let mut data = vec![0u8; length as usize];
    read_exact_or_eof(reader, &mut data)?;

    let mut ts_buf = [0u8; TIMESTAMP_SIZE];
    read_exact_or_eof(reader, &mut ts_buf)?;
    let timestamp = decode_timestamp(&ts_buf)?;

    read_exact_or_eof(reader, &mut u32_buf)?;
    let crc32 = u32::from_le_bytes(u32_buf);

    // Trailer length; only consulted when traversing backward.
    read_exact_or_eof(reader, &mut u32_buf)?;

    let computed = crc32c::crc32c(&data);
    if computed != crc32 {
        return Err(WalError::CrcMismatch {
            index,
            expected: crc32,
            actual: computed,
        });
    }

    Ok(WalEntry {
        index,
        data,
        timestamp,
        crc32,
    })
}

/// Rewind to the start of the record preceding the cursor and decode it.
pub fn read_previous_entry<R: Read + Seek>(reader: &mut R) -> WalResult<WalEntry> {
    goto_previous_entry(reader)?;
    read_entry(reader)
}

/// Reposition the cursor at the start of the record that ends exactly at the
/// current position, using the trailer length.
///
/// Fails with [`WalError::NoPreviousEntry`] when the cursor is at offset 0.
pub fn goto_previous_entry<R: Read + Seek>(reader: &mut R) -> WalResult<()> {
    let current = reader.stream_position()?;
    if current == 0 {
        return Err(WalError::NoPreviousEntry);
    }

    // The four bytes before the cursor hold the previous record's payload
    // length.
    reader.seek(SeekFrom::Current(-4))?;
    let mut length_buf = [0u8; 4];
    read_exact_or_eof(reader, &mut length_buf)?;
    let length = u32::from_le_bytes(length_buf);

    reader.seek(SeekFrom::Current(-(length as i64 + ENTRY_OVERHEAD as i64)))?;
    Ok(())
}

/// Encode a timestamp into the fixed 15-byte binary layout:
///
/// ```text
/// byte 0       version (1)
/// bytes 1-8    seconds since Jan 1 year 1 UTC (i64 big-endian)
/// bytes 9-12   nanoseconds (i32 big-endian)
/// bytes 13-14  zone offset in minutes (i16 big-endian), -1 denotes UTC
/// ```
///
/// The encoder always emits UTC.
fn encode_timestamp(timestamp: &DateTime<Utc>) -> [u8; TIMESTAMP_SIZE] {
    let seconds = timestamp.timestamp() + UNIX_TO_ABSOLUTE_SECS;
    let nanos = timestamp.timestamp_subsec_nanos() as i32;

    let mut buf = [0u8; TIMESTAMP_SIZE];
    buf[0] = TIMESTAMP_VERSION;
    buf[1..9].copy_from_slice(&seconds.to_be_bytes());
    buf[9..13].copy_from_slice(&nanos.to_be_bytes());
    buf[13..15].copy_from_slice(&(-1i16).to_be_bytes());
    buf
}

/// Decode the 15-byte binary timestamp.
///
/// The seconds field is absolute, so the trailing zone offset is accepted
/// from any writer but does not shift the decoded instant; the result is
/// always UTC.
fn decode_timestamp(buf: &[u8; TIMESTAMP_SIZE]) -> WalResult<DateTime<Utc>> {
    if buf[0] != TIMESTAMP_VERSION {
        return Err(WalError::TimestampVersion(buf[0]));
    }

    let seconds = i64::from_be_bytes(buf[1..9].try_into().unwrap()) - UNIX_TO_ABSOLUTE_SECS;
    let nanos = i32::from_be_bytes(buf[9..13].try_into().unwrap());

    DateTime::from_timestamp(seconds, nanos as u32)
        .ok_or(WalError::TimestampRange { seconds, nanos })
}

/// Map a short read to [`WalError::UnexpectedEof`] so callers can tell a
/// clean end of segment from a genuine I/O failure.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> WalResult<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            WalError::UnexpectedEof
        } else {
            WalError::Io(err)
        }
    })
}
