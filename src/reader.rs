// SPDX-License-Identifier: PMPL-1.0-or-later
//
// segwal - Positioned reader
//
// A reader locates a starting record by index or by timestamp, then streams
// entries forward, hopping across segment boundaries by consulting the
// parent log's segment list. The reader opens its own file handles on the
// segments it traverses, so its cursor is fully independent of the
// writer's.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::entry::WalEntry;
use crate::error::{WalError, WalResult};
use crate::segment::Segment;
use crate::wal::Wal;

/// Where a reader starts.
///
/// Index and timestamp positioning are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartAt {
    /// The first record of the log.
    #[default]
    Beginning,

    /// The record with the given index. A target below the first index
    /// reads from the beginning; a target above the last index yields only
    /// the final record.
    Index(u64),

    /// The first record whose timestamp is at or after the given instant.
    /// A target before all records reads from the beginning; a target
    /// after all records yields only the final record.
    Timestamp(DateTime<Utc>),
}

/// A forward-streaming reader positioned somewhere in the log.
///
/// Borrowed from its [`Wal`]; the borrow only covers the segment metadata
/// list, all file I/O happens on the reader's own handles.
#[derive(Debug)]
pub struct WalReader<'wal> {
    wal: &'wal Wal,

    /// The reader's private copy of the segment it is currently streaming.
    current: Option<Segment>,

    /// Index of the record the next [`WalReader::next`] call will decode.
    index: u64,
}

impl<'wal> WalReader<'wal> {
    pub(crate) fn new(wal: &'wal Wal, start: StartAt) -> WalResult<Self> {
        match start {
            StartAt::Beginning => Self::position_by_index(wal, 0),
            StartAt::Index(index) => Self::position_by_index(wal, index),
            StartAt::Timestamp(timestamp) => Self::position_by_timestamp(wal, timestamp),
        }
    }

    /// Decode the record under the cursor and advance.
    ///
    /// When the cursor has passed the current segment's last index, the
    /// reader closes its handle and hops to the next segment in the
    /// parent's list; with no next segment this fails with
    /// [`WalError::NoSegmentsFound`], which doubles as end-of-log. A decode
    /// failure (for example [`WalError::CrcMismatch`]) is returned to the
    /// caller and leaves the cursor where the failed decode stopped; it
    /// does not poison the reader.
    pub fn next(&mut self) -> WalResult<WalEntry> {
        let Some(current) = self.current.as_mut() else {
            return Err(WalError::NoSegmentsFound);
        };

        if current.file.is_none() {
            current.open()?;
        }

        if self.index > current.last_index {
            let segments = self.wal.segments();
            let position = segments
                .iter()
                .position(|segment| segment.path == current.path)
                .ok_or(WalError::NoSegmentsFound)?;
            let next = segments.get(position + 1).ok_or(WalError::NoSegmentsFound)?;

            current.close()?;
            let mut replacement = Segment::load(&next.path)?;
            replacement.open()?;
            *current = replacement;
        }

        let entry = current.read_next()?;
        self.index = entry.index + 1;
        Ok(entry)
    }

    /// Index of the record the next call to [`WalReader::next`] will
    /// return.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Close the reader's segment handle, if one is held.
    pub fn close(&mut self) -> WalResult<()> {
        if let Some(mut segment) = self.current.take() {
            if segment.file.is_some() {
                segment.close()?;
            }
        }
        Ok(())
    }

    fn position_by_index(wal: &'wal Wal, target: u64) -> WalResult<Self> {
        let segments = wal.segments();
        let Some(first) = segments.first() else {
            return Err(WalError::NoSegmentsFound);
        };

        let found = segments
            .iter()
            .find(|segment| (segment.first_index..=segment.last_index).contains(&target));
        let source = match found {
            Some(segment) => segment,
            // Clamp: before the log reads from the start, past the log
            // lands on the final record.
            None if target < first.first_index => first,
            None => segments.last().unwrap_or(first),
        };

        let mut current = Segment::load(&source.path)?;
        current.open()?;

        // Scan forward to the first record at or past the target, then step
        // back one record so the next read returns it.
        let mut index = current.first_index;
        while target > index {
            match current.read_next() {
                Ok(entry) => index = entry.index,
                Err(WalError::UnexpectedEof) => break,
                Err(err) => return Err(err),
            }
        }
        match current.rewind_one() {
            Ok(()) | Err(WalError::NoPreviousEntry) => {}
            Err(err) => return Err(err),
        }

        debug!(target, index, segment = %current.path.display(), "positioned reader by index");

        Ok(Self {
            wal,
            current: Some(current),
            index,
        })
    }

    fn position_by_timestamp(wal: &'wal Wal, target: DateTime<Utc>) -> WalResult<Self> {
        let segments = wal.segments();
        let Some(first) = segments.first() else {
            return Err(WalError::NoSegmentsFound);
        };

        let source = match find_segment_by_timestamp(segments, target) {
            Some(position) => &segments[position],
            // Clamp as in the index case. Segments that were never written
            // carry no timestamps and match no predicate.
            None => {
                let before_all = first
                    .first_timestamp
                    .is_some_and(|first_ts| target < first_ts);
                if before_all {
                    first
                } else {
                    segments.last().unwrap_or(first)
                }
            }
        };

        let mut current = Segment::load(&source.path)?;
        current.open()?;

        // Scan forward while records predate the target; an unwritten
        // segment scans from its start.
        let mut timestamp = current.first_timestamp;
        let mut index = current.first_index;
        while timestamp.is_none_or(|ts| target > ts) {
            match current.read_next() {
                Ok(entry) => {
                    timestamp = Some(entry.timestamp);
                    index = entry.index;
                }
                Err(WalError::UnexpectedEof) => break,
                Err(err) => return Err(err),
            }
        }
        match current.rewind_one() {
            Ok(()) | Err(WalError::NoPreviousEntry) => {}
            Err(err) => return Err(err),
        }

        debug!(%target, index, segment = %current.path.display(), "positioned reader by timestamp");

        Ok(Self {
            wal,
            current: Some(current),
            index,
        })
    }
}

/// Find the segment covering `target`: strictly inside its timestamp range,
/// equal to either bound, or in the gap before the next segment's first
/// timestamp. The first match wins.
fn find_segment_by_timestamp(segments: &[Segment], target: DateTime<Utc>) -> Option<usize> {
    for (position, segment) in segments.iter().enumerate() {
        let (Some(first), Some(last)) = (segment.first_timestamp, segment.last_timestamp) else {
            continue;
        };

        if (target > first && target < last) || target == first || target == last {
            return Some(position);
        }

        if let Some(next_first) = segments
            .get(position + 1)
            .and_then(|next| next.first_timestamp)
        {
            if target > last && target < next_first {
                return Some(position);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalConfig;
    use tempfile::TempDir;

    fn build_wal(dir: &TempDir, max_segment_size: u64, count: usize) -> Wal {
        let config = WalConfig {
            max_segment_size,
            ..Default::default()
        };
        let mut wal = Wal::new(dir.path().join("datastore"), config).unwrap();
        for i in 0..count {
            wal.write(format!("test-{i}").as_bytes()).unwrap();
        }
        wal.close().unwrap();
        wal
    }

    #[test]
    fn test_default_start_is_beginning() {
        assert_eq!(StartAt::default(), StartAt::Beginning);
    }

    #[test]
    fn test_reader_index_tracks_cursor() {
        let dir = TempDir::new().unwrap();
        let wal = build_wal(&dir, 1024 * 1024, 10);

        let mut reader = wal.reader(StartAt::Index(4)).unwrap();
        assert_eq!(reader.index(), 4);

        let entry = reader.next().unwrap();
        assert_eq!(entry.index, 4);
        assert_eq!(reader.index(), 5);
        reader.close().unwrap();
    }

    #[test]
    fn test_next_after_close_is_exhausted() {
        let dir = TempDir::new().unwrap();
        let wal = build_wal(&dir, 1024 * 1024, 3);

        let mut reader = wal.reader(StartAt::Beginning).unwrap();
        reader.next().unwrap();
        reader.close().unwrap();

        match reader.next() {
            Err(WalError::NoSegmentsFound) => {}
            other => panic!("expected NoSegmentsFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_crc_mismatch_surfaces_on_next() {
        let dir = TempDir::new().unwrap();
        let mut wal = {
            let config = WalConfig::default();
            Wal::new(dir.path().join("datastore"), config).unwrap()
        };
        for i in 0..3 {
            wal.write(format!("test-{i}").as_bytes()).unwrap();
        }
        wal.flush().unwrap();

        // Flip a payload byte of the second record on disk. Record 0 is
        // "test-0": 6 payload bytes, so record 1's payload starts at
        // 41 + 12.
        let segment_path = wal.path().join("00000000000000000000.wal");
        let mut raw = std::fs::read(&segment_path).unwrap();
        raw[53] ^= 0xFF;
        std::fs::write(&segment_path, &raw).unwrap();

        let mut reader = wal.reader(StartAt::Beginning).unwrap();
        assert_eq!(reader.next().unwrap().data, b"test-0");
        match reader.next() {
            Err(WalError::CrcMismatch { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected CrcMismatch, got: {other:?}"),
        }

        reader.close().unwrap();
        wal.close().unwrap();
    }

    #[test]
    fn test_timestamp_predicate_picks_gap_segment() {
        let dir = TempDir::new().unwrap();
        // Tiny segments so consecutive records land in different files.
        let wal = build_wal(&dir, 64, 12);
        assert!(wal.segment_count() > 2);

        let segments = wal.segments();
        let gap_target = segments[0]
            .last_timestamp
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::nanoseconds(1))
            .unwrap();

        // A timestamp just past segment 0's last record but before segment
        // 1's first record resolves to segment 0.
        if gap_target < segments[1].first_timestamp.unwrap() {
            let found = find_segment_by_timestamp(segments, gap_target);
            assert_eq!(found, Some(0));
        }
    }
}
