// SPDX-License-Identifier: PMPL-1.0-or-later
//
// segwal - Error types
//
// Defines all error conditions that can arise during log operations including
// I/O failures, record corruption, and invalid state transitions.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during write-ahead log operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An I/O error occurred while reading or writing a segment file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The target path already exists when creating a fresh log.
    #[error("path already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The load target exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The log directory has no `config.json`.
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// `config.json` exists but could not be decoded.
    #[error("error parsing config file: {0}")]
    ParseConfig(#[from] serde_json::Error),

    /// No segment is available: the log has no active segment, or a reader
    /// advanced past the last segment (end of log).
    #[error("no segments found")]
    NoSegmentsFound,

    /// A segment's file handle was opened twice.
    #[error("file already open: {}", .0.display())]
    FileAlreadyOpen(PathBuf),

    /// An operation needed a segment's file handle but none was open.
    #[error("file not open: {}", .0.display())]
    FileNotOpen(PathBuf),

    /// CRC-32C checksum mismatch detected while decoding a record.
    /// This indicates corruption, either from disk failure or an
    /// incomplete write (crash mid-append).
    #[error("crc32 mismatch at index {index}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The index of the corrupted record.
        index: u64,
        /// The CRC-32C value stored in the record.
        expected: u32,
        /// The CRC-32C value computed from the payload.
        actual: u32,
    },

    /// A reverse seek was attempted at offset 0.
    #[error("no previous entry")]
    NoPreviousEntry,

    /// A record declares a payload larger than the maximum entry size,
    /// indicating corruption or a malformed write.
    #[error("entry at index {index} declares {length} payload bytes, exceeding maximum {max_length}")]
    EntryTooLarge {
        /// The index of the offending record.
        index: u64,
        /// The declared payload length.
        length: u64,
        /// The maximum allowed payload length.
        max_length: u64,
    },

    /// The segment file ended in the middle of a record, or a read started
    /// exactly at end of file.
    #[error("unexpected end of segment")]
    UnexpectedEof,

    /// The 15-byte binary timestamp carries an unsupported version byte.
    #[error("unsupported timestamp encoding version: {0}")]
    TimestampVersion(u8),

    /// The decoded timestamp does not map to a representable instant.
    #[error("timestamp out of range: {seconds}s {nanos}ns")]
    TimestampRange {
        /// Seconds since the Unix epoch.
        seconds: i64,
        /// Nanosecond component as stored.
        nanos: i32,
    },

    /// A `.wal` file name does not follow the zero-padded index convention.
    #[error("invalid segment file name: {0}")]
    SegmentName(String),
}

/// Convenience type alias for log results.
pub type WalResult<T> = Result<T, WalError>;
