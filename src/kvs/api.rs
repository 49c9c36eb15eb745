//! The thin contract this crate assumes of its underlying storage engine.
//!
//! [`Engine`] covers the plain, non-transactional path: open/close and
//! byte-oriented CRUD plus atomic batches. The optimistic-transaction path
//! (snapshot acquisition, a transaction's own put/delete/get-for-update,
//! and conflict-checked commit) is implemented directly on the concrete
//! RocksDB binding in [`super::rocksdb_engine`] rather than behind a second
//! trait: `rocksdb::Transaction<'db, DB>` is lifetime-parameterized over
//! its owning database, and a generic trait able to express that safely
//! would need a generic associated type for no benefit here, since this
//! crate binds to exactly one engine. A future second backend would
//! introduce that trait at the point it's actually needed.

use std::future::Future;
use std::path::Path;

use crate::err::Result;

pub type Key = Vec<u8>;
pub type Val = Vec<u8>;

/// One operation in an atomic [`Engine::batch`] write.
#[derive(Clone, Debug)]
pub enum BatchOp {
	Put(Key, Val),
	Delete(Key),
}

/// Tuning options passed to [`Engine::open`]. Field names follow the
/// options recognised at DB create/start time.
#[derive(Clone, Debug)]
pub struct EngineOptions {
	pub create_if_missing: bool,
	pub error_if_exists: bool,
	pub cache_size: usize,
	pub write_buffer_size: usize,
	pub block_size: usize,
	pub max_open_files: i32,
	pub block_restart_interval: i32,
	pub max_file_size: u64,
	pub compression: bool,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			create_if_missing: true,
			error_if_exists: false,
			cache_size: 8 * 1024 * 1024,
			write_buffer_size: *crate::cnf::ROCKSDB_WRITE_BUFFER_SIZE,
			block_size: 4 * 1024,
			max_open_files: -1,
			block_restart_interval: 16,
			max_file_size: *crate::cnf::ROCKSDB_TARGET_FILE_SIZE_BASE,
			compression: true,
		}
	}
}

/// Open/close plus the plain byte-oriented CRUD surface of the underlying
/// engine. See the module docs for why the optimistic-transaction path is
/// not part of this trait.
pub trait Engine: Send + Sync + Sized {
	fn open(path: &Path, opts: &EngineOptions) -> impl Future<Output = Result<Self>> + Send;

	fn close(self) -> impl Future<Output = Result<()>> + Send;

	/// Reads a key against the live (most recent) state of the engine.
	fn get(&self, key: &[u8]) -> impl Future<Output = Result<Option<Val>>> + Send;

	fn multi_get(&self, keys: &[Key]) -> impl Future<Output = Result<Vec<Option<Val>>>> + Send;

	fn put(&self, key: Key, val: Val, sync: bool) -> impl Future<Output = Result<()>> + Send;

	fn delete(&self, key: &[u8], sync: bool) -> impl Future<Output = Result<()>> + Send;

	/// Atomically applies a heterogeneous list of puts/deletes.
	fn batch(&self, ops: Vec<BatchOp>, sync: bool) -> impl Future<Output = Result<()>> + Send;
}
