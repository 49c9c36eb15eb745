//! The concrete binding to `OptimisticTransactionDB`.
//!
//! [`RocksEngine`] implements [`super::api::Engine`] for the plain path, and
//! additionally exposes `begin_optimistic`/[`EngineTxn`] for the
//! transactional path used by [`super::tx`]. The transaction type holds an
//! `'static`-transmuted `rocksdb::Transaction` the same way the underlying
//! engine binding does: `rocksdb::Transaction<'db, DB>` borrows from the
//! `OptimisticTransactionDB` that created it, but Rust has no way to express
//! "this struct's lifetime parameter is tied to a field of its own sibling
//! struct" without self-referential types, so the lifetime is erased and the
//! `Arc` that actually owns the database is carried alongside it, keeping
//! the borrowed data alive for as long as the transaction exists. The field
//! order matters: Rust drops struct fields top to bottom, so `_db` is
//! declared last and `inner` (which borrows from it) is dropped first.
//! This invariant only holds because nothing ever hands out a `RocksEngine`
//! clone that outlives the `Arc` undropped elsewhere.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use rocksdb::{
	DBCompactionStyle, DBCompressionType, LogLevel, OptimisticTransactionDB,
	OptimisticTransactionOptions, Options, ReadOptions, WriteOptions,
};
use tracing::{instrument, trace, warn};

use crate::cnf;
use crate::err::{Error, Result};
use crate::kvs::api::{BatchOp, Engine, EngineOptions};

/// Drop-time behaviour for an [`EngineTxn`] that is still open when dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
	/// Say nothing.
	None,
	/// Log a warning.
	Warn,
	/// Panic. Used in debug builds to surface the bug immediately.
	Panic,
}

#[derive(Clone)]
pub struct RocksEngine {
	db: Pin<Arc<OptimisticTransactionDB>>,
}

impl Engine for RocksEngine {
	#[instrument(level = "trace", target = "levelkv::kvs::rocksdb", skip(opts))]
	async fn open(path: &Path, opts: &EngineOptions) -> Result<Self> {
		let mut o = Options::default();
		o.set_use_fsync(false);
		o.set_log_level(LogLevel::Warn);
		o.set_keep_log_file_num(*cnf::ROCKSDB_KEEP_LOG_FILE_NUM);
		o.create_if_missing(opts.create_if_missing);
		o.set_error_if_exists(opts.error_if_exists);
		o.set_compaction_style(DBCompactionStyle::Level);
		o.increase_parallelism(*cnf::ROCKSDB_THREAD_COUNT);
		o.set_write_buffer_size(opts.write_buffer_size);
		o.set_target_file_size_base(opts.max_file_size);
		o.set_max_open_files(opts.max_open_files);
		o.set_block_based_table_factory(&{
			let mut bo = rocksdb::BlockBasedOptions::default();
			bo.set_block_size(opts.block_size);
			bo.set_block_restart_interval(opts.block_restart_interval);
			bo.set_lru_cache(opts.cache_size);
			bo
		});
		if opts.compression {
			o.set_compression_type(DBCompressionType::Lz4);
		} else {
			o.set_compression_type(DBCompressionType::None);
		}
		let db = OptimisticTransactionDB::open(&o, path)?;
		Ok(RocksEngine { db: Arc::pin(db) })
	}

	async fn close(self) -> Result<()> {
		// `OptimisticTransactionDB` closes on drop; nothing to do explicitly,
		// beyond giving the caller a place to hang the `async` contract.
		Ok(())
	}

	#[instrument(level = "trace", target = "levelkv::kvs::rocksdb", skip(self))]
	async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.db.get(key)?)
	}

	async fn multi_get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
		Ok(self.db.multi_get(keys).into_iter().collect::<std::result::Result<Vec<_>, _>>()?)
	}

	#[instrument(level = "trace", target = "levelkv::kvs::rocksdb", skip(self, val))]
	async fn put(&self, key: Vec<u8>, val: Vec<u8>, sync: bool) -> Result<()> {
		let mut wo = WriteOptions::default();
		wo.set_sync(sync);
		self.db.put_opt(key, val, &wo)?;
		Ok(())
	}

	#[instrument(level = "trace", target = "levelkv::kvs::rocksdb", skip(self))]
	async fn delete(&self, key: &[u8], sync: bool) -> Result<()> {
		let mut wo = WriteOptions::default();
		wo.set_sync(sync);
		self.db.delete_opt(key, &wo)?;
		Ok(())
	}

	async fn batch(&self, ops: Vec<BatchOp>, sync: bool) -> Result<()> {
		let mut batch = rocksdb::WriteBatch::default();
		for op in ops {
			match op {
				BatchOp::Put(k, v) => batch.put(k, v),
				BatchOp::Delete(k) => batch.delete(k),
			}
		}
		let mut wo = WriteOptions::default();
		wo.set_sync(sync);
		self.db.write_opt(batch, &wo)?;
		Ok(())
	}
}

impl RocksEngine {
	/// Removes every file backing a closed database at `path`. Only ever
	/// called on a database that is not currently open.
	pub fn destroy(path: &Path) -> Result<()> {
		if path.exists() {
			std::fs::remove_dir_all(path)?;
		}
		Ok(())
	}

	/// Starts a new optimistic transaction taking a snapshot of the current
	/// state. `write` records whether the caller intends to write through
	/// it; read-only transactions still see a consistent snapshot, they just
	/// reject mutating calls.
	#[instrument(level = "trace", target = "levelkv::kvs::rocksdb", skip(self))]
	pub fn begin_optimistic(&self, write: bool, check: Check) -> Result<EngineTxn> {
		let mut to = OptimisticTransactionOptions::default();
		to.set_snapshot(true);
		let mut wo = WriteOptions::default();
		wo.set_sync(false);
		let inner = self.db.transaction_opt(&wo, &to);
		// SAFETY: `_db` below keeps the `Arc<OptimisticTransactionDB>` this
		// transaction borrows from alive for at least as long as `inner`, by
		// construction (see module docs).
		let inner = unsafe {
			std::mem::transmute::<
				rocksdb::Transaction<'_, OptimisticTransactionDB>,
				rocksdb::Transaction<'static, OptimisticTransactionDB>,
			>(inner)
		};
		let mut ro = ReadOptions::default();
		ro.set_snapshot(&inner.snapshot());
		ro.fill_cache(true);
		Ok(EngineTxn {
			done: false,
			write,
			check,
			inner: Some(inner),
			ro,
			_db: self.db.clone(),
		})
	}

	/// A raw, non-transactional iterator over the live state of the
	/// database, used by reads that don't need (or want) an explicit
	/// transaction.
	pub fn raw_iterator(&self) -> rocksdb::DBRawIterator<'_> {
		let mut ro = ReadOptions::default();
		ro.fill_cache(true);
		self.db.raw_iterator_opt(ro)
	}

	/// Takes a point-in-time snapshot of the database. Reads through the
	/// returned handle never observe writes committed after this call.
	pub fn snapshot(&self) -> EngineSnapshot {
		let snapshot = self.db.snapshot();
		// SAFETY: see the module-level note on `EngineTxn` — `_db` keeps the
		// borrowed-from database alive for as long as the snapshot is.
		let snapshot = unsafe {
			std::mem::transmute::<
				rocksdb::SnapshotWithThreadMode<'_, OptimisticTransactionDB>,
				rocksdb::SnapshotWithThreadMode<'static, OptimisticTransactionDB>,
			>(snapshot)
		};
		EngineSnapshot {
			snapshot,
			_db: self.db.clone(),
		}
	}
}

/// A point-in-time read handle obtained from [`RocksEngine::snapshot`].
pub struct EngineSnapshot {
	snapshot: rocksdb::SnapshotWithThreadMode<'static, OptimisticTransactionDB>,
	_db: Pin<Arc<OptimisticTransactionDB>>,
}

impl EngineSnapshot {
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		Ok(self.snapshot.get(key)?)
	}

	pub fn raw_iterator(&self) -> rocksdb::DBRawIterator<'_> {
		self.snapshot.raw_iterator()
	}
}

/// A live optimistic transaction against a [`RocksEngine`].
pub struct EngineTxn {
	done: bool,
	write: bool,
	check: Check,
	inner: Option<rocksdb::Transaction<'static, OptimisticTransactionDB>>,
	ro: ReadOptions,
	_db: Pin<Arc<OptimisticTransactionDB>>,
}

impl Drop for EngineTxn {
	fn drop(&mut self) {
		if !self.done && self.write {
			if std::thread::panicking() {
				return;
			}
			match self.check {
				Check::None => {
					trace!("a transaction was dropped without being committed or cancelled");
				}
				Check::Warn => {
					warn!("a transaction was dropped without being committed or cancelled");
				}
				Check::Panic => {
					panic!("a transaction was dropped without being committed or cancelled");
				}
			}
		}
	}
}

impl EngineTxn {
	pub fn closed(&self) -> bool {
		self.done
	}

	pub fn set_check(&mut self, check: Check) {
		self.check = check;
	}

	pub fn writeable(&self) -> bool {
		self.write
	}

	fn inner(&self) -> &rocksdb::Transaction<'static, OptimisticTransactionDB> {
		self.inner.as_ref().expect("transaction finalized")
	}

	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		if self.done {
			return Err(Error::TransactionTerminal);
		}
		Ok(self.inner().get_opt(key, &self.ro)?)
	}

	/// Reads `key` for update: the same snapshot read as [`Self::get`], but
	/// additionally registers the key so the commit fails with
	/// [`Error::Conflict`] if another transaction writes it first.
	pub fn get_for_update(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
		if self.done {
			return Err(Error::TransactionTerminal);
		}
		Ok(self.inner().get_for_update_opt(key, &self.ro, true)?)
	}

	pub fn put(&self, key: Vec<u8>, val: Vec<u8>) -> Result<()> {
		if self.done {
			return Err(Error::TransactionTerminal);
		}
		if !self.write {
			return Err(Error::EngineError("transaction is read-only".into()));
		}
		self.inner().put(key, val)?;
		Ok(())
	}

	pub fn delete(&self, key: &[u8]) -> Result<()> {
		if self.done {
			return Err(Error::TransactionTerminal);
		}
		if !self.write {
			return Err(Error::EngineError("transaction is read-only".into()));
		}
		self.inner().delete(key)?;
		Ok(())
	}

	#[instrument(level = "trace", target = "levelkv::kvs::rocksdb", skip(self))]
	pub fn commit(&mut self) -> Result<()> {
		if self.done {
			return Err(Error::TransactionTerminal);
		}
		self.done = true;
		match self.inner.take() {
			Some(inner) => inner.commit().map_err(|e| match e.kind() {
				rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TryAgain => Error::Conflict,
				_ => Error::from(e),
			})?,
			None => unreachable!(),
		};
		Ok(())
	}

	#[instrument(level = "trace", target = "levelkv::kvs::rocksdb", skip(self))]
	pub fn rollback(&mut self) -> Result<()> {
		if self.done {
			return Err(Error::TransactionTerminal);
		}
		self.done = true;
		match self.inner.take() {
			Some(inner) => inner.rollback()?,
			None => unreachable!(),
		};
		Ok(())
	}

	/// A raw iterator scoped to this transaction's snapshot, merging in
	/// nothing of its own write set — callers that need read-your-writes
	/// merge this with their own buffered writes (see [`super::tx`]).
	pub fn raw_iterator(&self) -> rocksdb::DBRawIterator<'_> {
		let mut ro = ReadOptions::default();
		ro.set_snapshot(&self.inner().snapshot());
		ro.fill_cache(true);
		self.inner().raw_iterator_opt(ro)
	}
}
