//! Process-wide, environment-overridable tunables, grounded in the same
//! `lazy_env_parse!` pattern the underlying engine binding uses for its own
//! knobs: a constant that is `50_000` by default can be raised in a running
//! deployment with `LEVELKV_EXTERNAL_SORTING_BUFFER_LIMIT=200000`, say,
//! without a code change.

use crate::mac::lazy_env_parse;
use once_cell::sync::Lazy;

/// Background thread count handed to the storage engine. Defaults to the
/// number of logical CPUs.
pub static ROCKSDB_THREAD_COUNT: Lazy<i32> = Lazy::new(|| {
	std::env::var("LEVELKV_ROCKSDB_THREAD_COUNT")
		.ok()
		.and_then(|s| s.parse::<i32>().ok())
		.unwrap_or_else(|| num_cpus::get() as i32)
});

/// In-memory write buffer size, in bytes, before the engine flushes to disk.
pub static ROCKSDB_WRITE_BUFFER_SIZE: Lazy<usize> =
	lazy_env_parse!("LEVELKV_ROCKSDB_WRITE_BUFFER_SIZE", usize, 64 * 1024 * 1024);

/// Target size, in bytes, of files produced by compaction.
pub static ROCKSDB_TARGET_FILE_SIZE_BASE: Lazy<u64> =
	lazy_env_parse!("LEVELKV_ROCKSDB_TARGET_FILE_SIZE_BASE", u64, 64 * 1024 * 1024);

/// Number of most recent `LOG` files the engine keeps around.
pub static ROCKSDB_KEEP_LOG_FILE_NUM: Lazy<usize> =
	lazy_env_parse!("LEVELKV_ROCKSDB_KEEP_LOG_FILE_NUM", usize, 10);

/// Batch size used by `count`/`clear`/`dump`'s internal key-only scans.
pub const SCAN_BATCH_SIZE: usize = 1_000;
