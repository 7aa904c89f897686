// SPDX-License-Identifier: PMPL-1.0-or-later
//
// segwal - The log
//
// The `Wal` owns a directory of segment files plus the persisted
// configuration, keeps the segment list ordered by starting index, and
// appends through the last (active) segment. When the active segment
// reaches the configured size threshold the log cycles: the active file is
// flushed and closed, and a new segment named after the next index becomes
// active. Appends are not fsynced individually; durability is obtained
// through `flush` or `close`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::WalConfig;
use crate::entry::{WalEntry, MAX_ENTRY_SIZE};
use crate::error::{WalError, WalResult};
use crate::reader::{StartAt, WalReader};
use crate::segment::{Segment, SEGMENT_EXTENSION};

/// An append-only, segmented write-ahead log.
///
/// Single-writer: the log owns the active segment's file handle and is not
/// safe for concurrent mutation. Readers obtained through [`Wal::reader`]
/// open their own handles and may coexist with the writer.
#[derive(Debug)]
pub struct Wal {
    /// Absolute, forward-slash-normalized root directory.
    path: PathBuf,

    /// Segments ordered ascending by first index; the last one is active.
    segments: Vec<Segment>,

    /// Configuration persisted as `config.json`.
    config: WalConfig,

    /// The next index to assign on append.
    index: u64,
}

impl Wal {
    /// Create a fresh log directory.
    ///
    /// Fails with [`WalError::AlreadyExists`] if anything already exists at
    /// `path`. Otherwise creates the directory, an empty segment `0`, and
    /// writes `config.json`.
    pub fn new(path: impl AsRef<Path>, config: WalConfig) -> WalResult<Self> {
        let path = normalize_path(path.as_ref())?;

        match fs::symlink_metadata(&path) {
            Ok(_) => return Err(WalError::AlreadyExists(path)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        create_log_dir(&path)?;
        info!(path = %path.display(), "created write-ahead log directory");

        let segment = Segment::create(&path, 0)?;
        let wal = Self {
            path,
            segments: vec![segment],
            config,
            index: 0,
        };
        wal.config.write_to(&wal.path)?;

        Ok(wal)
    }

    /// Load an existing log directory.
    ///
    /// Reads `config.json`, discovers `*.wal` segment files in ascending
    /// name order (which is ascending index order by the zero-padding
    /// convention), recovers the active segment from any torn tail, opens
    /// it and positions the write cursor at end of file.
    pub fn load(path: impl AsRef<Path>) -> WalResult<Self> {
        let path = normalize_path(path.as_ref())?;

        let metadata = fs::symlink_metadata(&path)?;
        if !metadata.is_dir() {
            return Err(WalError::NotADirectory(path));
        }

        let config = WalConfig::read_from(&path)?;

        let mut segment_paths = Vec::new();
        for dir_entry in fs::read_dir(&path)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let entry_path = dir_entry.path();
            if entry_path.extension().and_then(|ext| ext.to_str()) == Some(SEGMENT_EXTENSION) {
                segment_paths.push(entry_path);
            }
        }
        segment_paths.sort();

        if segment_paths.is_empty() {
            return Err(WalError::NoSegmentsFound);
        }

        let mut segments = Vec::with_capacity(segment_paths.len());
        let last = segment_paths.len() - 1;
        for (position, segment_path) in segment_paths.iter().enumerate() {
            let segment = if position == last {
                Segment::recover(segment_path)?
            } else {
                Segment::load(segment_path)?
            };
            segments.push(segment);
        }
        debug!(count = segments.len(), path = %path.display(), "discovered segments");

        let active = segments.last_mut().ok_or(WalError::NoSegmentsFound)?;
        active.open()?;
        active.seek_to_end()?;
        let index = if active.file_length == 0 {
            active.last_index
        } else {
            active.last_index + 1
        };

        info!(path = %path.display(), next_index = index, "loaded write-ahead log");

        Ok(Self {
            path,
            segments,
            config,
            index,
        })
    }

    /// Append a payload as the next record and return its assigned index.
    ///
    /// Cycles to a new segment first when the active one has reached
    /// `max_segment_size` (0 disables the bound). The record is stamped
    /// with the current UTC time and a CRC-32C over the payload.
    pub fn write(&mut self, data: &[u8]) -> WalResult<u64> {
        let Some(active) = self.segments.last() else {
            return Err(WalError::NoSegmentsFound);
        };

        if data.len() as u64 > MAX_ENTRY_SIZE {
            return Err(WalError::EntryTooLarge {
                index: self.index,
                length: data.len() as u64,
                max_length: MAX_ENTRY_SIZE,
            });
        }

        if self.config.max_segment_size > 0 && active.file_length >= self.config.max_segment_size {
            self.cycle()?;
        }

        let entry = WalEntry::new(self.index, data.to_vec());
        let active = self.segments.last_mut().ok_or(WalError::NoSegmentsFound)?;
        active.write(&entry)?;

        let assigned = self.index;
        self.index += 1;
        Ok(assigned)
    }

    /// Fsync the active segment.
    pub fn flush(&mut self) -> WalResult<()> {
        self.active_mut()?.flush()
    }

    /// Flush then close the active segment. Sealed segments hold no open
    /// handles.
    pub fn close(&mut self) -> WalResult<()> {
        let active = self.active_mut()?;
        active.flush()?;
        active.close()
    }

    /// Open a positioned reader over this log.
    ///
    /// The reader borrows the segment list but performs its own I/O on
    /// independently opened handles, so its cursor never disturbs the
    /// writer's position.
    pub fn reader(&self, start: StartAt) -> WalResult<WalReader<'_>> {
        WalReader::new(self, start)
    }

    /// The absolute root directory of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration this log was created or loaded with.
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// The index that will be assigned to the next append.
    pub fn next_index(&self) -> u64 {
        self.index
    }

    /// Number of segments, including the active one.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Seal the active segment and start a new one at the current index.
    fn cycle(&mut self) -> WalResult<()> {
        self.close()?;

        let segment = Segment::create(&self.path, self.index)?;
        info!(
            path = %segment.path.display(),
            first_index = self.index,
            "cycled to new segment"
        );
        self.segments.push(segment);
        Ok(())
    }

    fn active_mut(&mut self) -> WalResult<&mut Segment> {
        self.segments.last_mut().ok_or(WalError::NoSegmentsFound)
    }
}

/// Absolutize the path and normalize separators to forward slashes.
fn normalize_path(path: &Path) -> WalResult<PathBuf> {
    let absolute = std::path::absolute(path)?;
    if std::path::MAIN_SEPARATOR == '/' {
        Ok(absolute)
    } else {
        let forward = absolute
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        Ok(PathBuf::from(forward))
    }
}

#[cfg(unix)]
fn create_log_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(path)
}

#[cfg(not(unix))]
fn create_log_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}
