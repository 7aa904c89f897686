// SPDX-License-Identifier: PMPL-1.0-or-later
//
// segwal - Segment lifecycle
//
// Each segment is a single append-only file named `{first_index:020}.wal`:
// twenty zero-padded decimal digits, so the lexicographic order of file
// names equals the numeric order of their starting indices. A segment
// tracks its inclusive index bounds, the timestamps of its first and last
// records, and its current byte length. The file handle is held only while
// reading or writing.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::entry::{goto_previous_entry, read_entry, read_previous_entry, write_entry, WalEntry};
use crate::error::{WalError, WalResult};

/// File extension for segment files.
pub const SEGMENT_EXTENSION: &str = "wal";

/// Build the canonical file name for a segment starting at the given index,
/// e.g. `00000000000000000042.wal`.
pub fn segment_filename(index: u64) -> String {
    format!("{index:020}.{SEGMENT_EXTENSION}")
}

/// Build the full path for a segment file in the given log directory.
pub fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(segment_filename(index))
}

/// Parse the starting index from a segment file name.
///
/// Returns `None` if the name does not match the zero-padded pattern.
pub fn parse_segment_filename(name: &str) -> Option<u64> {
    let digits = name.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    if digits.len() != 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()
}

/// One append-only segment file of the log.
#[derive(Debug)]
pub struct Segment {
    /// Index of the first record; equals the file name's numeric prefix.
    pub(crate) first_index: u64,

    /// Index of the last record, inclusive. Equals `first_index` while the
    /// segment is empty.
    pub(crate) last_index: u64,

    /// Timestamp of the first record; `None` until the first write.
    pub(crate) first_timestamp: Option<DateTime<Utc>>,

    /// Timestamp of the last record; `None` until the first write.
    pub(crate) last_timestamp: Option<DateTime<Utc>>,

    /// Full path of the segment file.
    pub(crate) path: PathBuf,

    /// Open file handle, present only while reading or writing.
    pub(crate) file: Option<std::fs::File>,

    /// Current byte length of the file: the sum of record sizes.
    pub(crate) file_length: u64,
}

impl Segment {
    /// Create a fresh segment file in `dir` starting at `index` and leave
    /// it open for writing.
    pub(crate) fn create(dir: &Path, index: u64) -> WalResult<Self> {
        let path = segment_path(dir, index);
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;

        debug!(path = %path.display(), index, "created segment");

        Ok(Self {
            first_index: index,
            last_index: index,
            first_timestamp: None,
            last_timestamp: None,
            path,
            file: Some(file),
            file_length: 0,
        })
    }

    /// Load segment metadata from an existing file.
    ///
    /// Reads the first record for its timestamp, seeks to the end for the
    /// file length, and steps backward over the trailer to read the last
    /// record's index and timestamp. The file handle is closed before
    /// returning; call [`Segment::open`] to perform I/O.
    pub(crate) fn load(path: &Path) -> WalResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let first = match read_entry(&mut file) {
            Ok(entry) => Some(entry),
            Err(WalError::UnexpectedEof) => None,
            Err(err) => return Err(err),
        };

        let file_length = file.seek(SeekFrom::End(0))?;

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let first_index = parse_segment_filename(name)
            .ok_or_else(|| WalError::SegmentName(name.to_string()))?;

        let (last_index, first_timestamp, last_timestamp) = if file_length > 0 {
            let last = read_previous_entry(&mut file)?;
            let first_timestamp = first.map(|entry| entry.timestamp);
            (last.index, first_timestamp, Some(last.timestamp))
        } else {
            (first_index, None, None)
        };

        Ok(Self {
            first_index,
            last_index,
            first_timestamp,
            last_timestamp,
            path: path.to_path_buf(),
            file: None,
            file_length,
        })
    }

    /// Load a segment that may end in a torn record after a crash.
    ///
    /// Scans forward from offset 0 validating every record and truncates
    /// the file after the last one that fully decodes, then loads the
    /// segment normally. Intended for the active (last) segment; sealed
    /// segments were flushed and closed on cycle and are loaded directly.
    pub(crate) fn recover(path: &Path) -> WalResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_length = file.metadata()?.len();

        let mut valid = 0u64;
        loop {
            match read_entry(&mut file) {
                Ok(_) => valid = file.stream_position()?,
                Err(
                    WalError::UnexpectedEof
                    | WalError::CrcMismatch { .. }
                    | WalError::EntryTooLarge { .. }
                    | WalError::TimestampVersion(_)
                    | WalError::TimestampRange { .. },
                ) => break,
                Err(err) => return Err(err),
            }
        }

        if valid < file_length {
            warn!(
                path = %path.display(),
                valid,
                dropped = file_length - valid,
                "truncating torn segment tail"
            );
            file.set_len(valid)?;
            file.sync_all()?;
        }
        drop(file);

        Self::load(path)
    }

    /// Open the segment file read-write. The cursor starts at offset 0.
    pub(crate) fn open(&mut self) -> WalResult<()> {
        if self.file.is_some() {
            return Err(WalError::FileAlreadyOpen(self.path.clone()));
        }

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }

    /// Append a record through the entry codec and update the segment
    /// metadata.
    pub(crate) fn write(&mut self, entry: &WalEntry) -> WalResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| WalError::FileNotOpen(self.path.clone()))?;
        write_entry(file, entry)?;

        self.last_index = entry.index;
        self.last_timestamp = Some(entry.timestamp);
        if self.file_length == 0 {
            self.first_timestamp = self.last_timestamp;
        }
        self.file_length += entry.size();
        Ok(())
    }

    /// Decode one record at the file cursor.
    pub(crate) fn read_next(&mut self) -> WalResult<WalEntry> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| WalError::FileNotOpen(self.path.clone()))?;
        read_entry(file)
    }

    /// Step the file cursor back over the record that ends at the current
    /// position.
    pub(crate) fn rewind_one(&mut self) -> WalResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| WalError::FileNotOpen(self.path.clone()))?;
        goto_previous_entry(file)
    }

    /// Move the write position to the end of the file.
    pub(crate) fn seek_to_end(&mut self) -> WalResult<u64> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| WalError::FileNotOpen(self.path.clone()))?;
        Ok(file.seek(SeekFrom::End(0))?)
    }

    /// Fsync the segment file.
    pub(crate) fn flush(&mut self) -> WalResult<()> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| WalError::FileNotOpen(self.path.clone()))?;
        file.sync_all()?;
        Ok(())
    }

    /// Close the file handle.
    pub(crate) fn close(&mut self) -> WalResult<()> {
        match self.file.take() {
            Some(_) => Ok(()),
            None => Err(WalError::FileNotOpen(self.path.clone())),
        }
    }
}
