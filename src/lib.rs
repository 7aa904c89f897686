// SPDX-License-Identifier: PMPL-1.0-or-later
//
// segwal - Segmented append-only write-ahead log
//
// A durable, ordered sequence of opaque binary records persisted to a
// directory of segment files, with positioned random access by monotonic
// record index or by wall-clock timestamp.
//
// # Architecture
//
// The log is a directory containing a persisted `config.json` plus a
// sequence of **segment files**, each named after the index of its first
// record (`{index:020}.wal`) so that lexicographic file order equals
// numeric index order. Appends go through the last (active) segment; once
// it reaches the configured maximum size the log cycles to a fresh segment.
//
// ## On-disk record format (integers little-endian)
//
// ```text
// [8 bytes:  index (u64)]
// [4 bytes:  length (u32)]        -- payload byte count
// [L bytes:  data]
// [15 bytes: timestamp]           -- binary UTC time, nanosecond resolution
// [4 bytes:  crc32 (u32)]         -- CRC-32C (Castagnoli) over data
// [4 bytes:  length (u32)]        -- trailer, enables backward traversal
// ```
//
// The trailing length copy lets a reader step backward: read the four
// bytes before the cursor to recover `L`, then seek back `L + 35`.
//
// ## Usage
//
// ```no_run
// use segwal::{StartAt, Wal, WalConfig};
//
// let config = WalConfig {
//     max_segment_size: 64 * 1024 * 1024,
//     ..Default::default()
// };
// let mut wal = Wal::new("/var/lib/myapp/wal", config).unwrap();
//
// wal.write(b"first record").unwrap();
// wal.write(b"second record").unwrap();
// wal.flush().unwrap();
//
// let mut reader = wal.reader(StartAt::Beginning).unwrap();
// while let Ok(entry) = reader.next() {
//     println!("index={} bytes={}", entry.index, entry.data.len());
// }
// reader.close().unwrap();
// wal.close().unwrap();
// ```
//
// The log is single-writer and performs no internal locking. Readers open
// their own file handles and may run independently of the writer; they
// observe exactly the records whose appends have returned.

pub mod config;
pub mod entry;
pub mod error;
pub mod reader;
pub mod segment;
pub mod wal;

// Re-export the primary public API for ergonomic imports.
pub use config::{WalConfig, CONFIG_FILE};
pub use entry::{WalEntry, ENTRY_OVERHEAD, MAX_ENTRY_SIZE};
pub use error::{WalError, WalResult};
pub use reader::{StartAt, WalReader};
pub use wal::Wal;
