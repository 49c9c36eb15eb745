//! The public-facing database façade: lifecycle, root-level partitioning,
//! and the CRUD/batch/iterator/transaction surface built on top of
//! [`super::rocksdb_engine`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use crate::crypto::{CryptoSuite, CANARY_PLAINTEXT};
use crate::err::{Error, Result};
use crate::key::{Key, KeyPath};
use crate::kvs::api::{BatchOp, Engine, EngineOptions};
use crate::kvs::iterator::{Iterator, IteratorOptions, Source};
use crate::kvs::registry::Registry;
use crate::kvs::rocksdb_engine::{Check, RocksEngine};
use crate::kvs::tx::{Transaction, TransactionGuard};
use crate::kvs::{LEVEL_CANARY, LEVEL_DATA, LEVEL_TRANSACTIONS};
use crate::value;

/// Configuration recognised at [`Datastore::start`] time.
#[derive(Clone, Default)]
pub struct Config {
	/// Removes any existing directory before opening.
	pub fresh: bool,
	/// The AEAD suite guarding every value under `data` and the canary
	/// record. Encryption (and the canary check) is disabled when absent.
	pub crypto: Option<Arc<dyn CryptoSuite>>,
	pub engine: EngineOptions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
	Constructed,
	Running,
	Stopped,
	Destroyed,
}

/// An embedded, transactional, hierarchically-namespaced key-value store.
/// See the crate docs for the full contract.
pub struct Datastore {
	path: PathBuf,
	config: Config,
	status: Status,
	engine: Option<RocksEngine>,
	registry: Registry,
	next_tx_id: AtomicU64,
}

impl Datastore {
	/// Constructs a datastore bound to `path`, without opening anything.
	/// Call [`Self::start`] to begin serving.
	pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
		Datastore {
			path: path.into(),
			config,
			status: Status::Constructed,
			engine: None,
			registry: Registry::new(),
			next_tx_id: AtomicU64::new(1),
		}
	}

	fn engine(&self) -> Result<&RocksEngine> {
		match &self.engine {
			Some(e) if self.status == Status::Running => Ok(e),
			_ => Err(Error::NotRunning),
		}
	}

    /// Opens the engine, wipes the `transactions` scratch partition, and
    /// runs the canary check. Idempotent once stopped: calling `start`
    /// again after `stop` reopens the engine.
	#[instrument(level = "trace", target = "levelkv::kvs::ds", skip(self))]
	pub async fn start(&mut self) -> Result<()> {
		if self.status == Status::Running {
			return Err(Error::AlreadyRunning);
		}
		if self.status == Status::Destroyed {
			return Err(Error::Destroyed);
		}
		if self.config.fresh && self.path.exists() {
			std::fs::remove_dir_all(&self.path)?;
		}
		let engine = RocksEngine::open(&self.path, &self.config.engine).await?;
		self.engine = Some(engine);
		self.status = Status::Running;

		if let Err(e) = self.wipe_transactions().await {
			self.force_close();
			return Err(e);
		}
		if let Err(e) = self.check_canary().await {
			self.force_close();
			return Err(e);
		}
		Ok(())
	}

	async fn wipe_transactions(&self) -> Result<()> {
		let level = vec![LEVEL_TRANSACTIONS.to_vec()];
		let lease = self.registry.acquire();
		let engine = self.engine()?;
		let mut it =
			Iterator::new(level, IteratorOptions::default(), Source::Live(engine.clone()), None, lease)?;
		let mut dead = Vec::new();
		while let Some(entry) = it.next()? {
			if let Some(kp) = entry.key {
				let mut full = vec![LEVEL_TRANSACTIONS.to_vec()];
				full.extend(kp);
				dead.push(crate::key::codec::encode(&full));
			}
		}
		it.end();
		if !dead.is_empty() {
			let ops = dead.into_iter().map(BatchOp::Delete).collect();
			engine.batch(ops, false).await?;
		}
		Ok(())
	}

	#[instrument(level = "trace", target = "levelkv::kvs::ds", skip(self))]
	async fn check_canary(&self) -> Result<()> {
		let Some(suite) = &self.config.crypto else {
			return Ok(());
		};
		let engine = self.engine()?;
		let key = crate::key::codec::encode(&[LEVEL_CANARY.to_vec()]);
		match engine.get(&key).await? {
			None => {
				let sealed = value::seal(CANARY_PLAINTEXT, Some(suite.as_ref()))?;
				engine.put(key, sealed, true).await?;
				Ok(())
			}
			Some(bytes) => match value::open(&bytes, Some(suite.as_ref())) {
				Ok(plaintext) if plaintext == CANARY_PLAINTEXT => Ok(()),
				_ => Err(Error::KeyError),
			},
		}
	}

	fn force_close(&mut self) {
		self.engine = None;
		self.status = Status::Stopped;
	}

	/// Closes the engine. Fails with [`Error::LiveReference`] if any
	/// iterator or transaction handed out by this datastore is still live.
	#[instrument(level = "trace", target = "levelkv::kvs::ds", skip(self))]
	pub async fn stop(&mut self) -> Result<()> {
		if self.status != Status::Running {
			return Err(Error::NotRunning);
		}
		let live = self.registry.live();
		if live > 0 {
			return Err(Error::LiveReference(live));
		}
		if let Some(engine) = self.engine.take() {
			engine.close().await?;
		}
		self.status = Status::Stopped;
		Ok(())
	}

	/// Removes the on-disk directory. The datastore must be stopped (or
	/// never started) first.
	pub fn destroy(mut self) -> Result<()> {
		if self.status == Status::Running {
			return Err(Error::NotRunning);
		}
		RocksEngine::destroy(&self.path)?;
		self.status = Status::Destroyed;
		Ok(())
	}

	fn data_path(&self, kp: KeyPath) -> KeyPath {
		let mut full = vec![LEVEL_DATA.to_vec()];
		full.extend(kp);
		full
	}

	/// Reads a decoded, decrypted value. Returns `None` if absent.
	pub async fn get<T: DeserializeOwned>(&self, key: impl Into<Key>) -> Result<Option<T>> {
		let raw = self.get_raw(key).await?;
		raw.map(|b| value::from_bytes(&b)).transpose()
	}

	/// Reads the raw, decrypted-but-undeserialized bytes stored under `key`.
	pub async fn get_raw(&self, key: impl Into<Key>) -> Result<Option<Vec<u8>>> {
		let encoded = crate::key::codec::encode(&self.data_path(key.into().into_path()));
		let engine = self.engine()?;
		match engine.get(&encoded).await? {
			None => Ok(None),
			Some(bytes) => {
				let opened = value::open(&bytes, self.crypto())?;
				Ok(Some(opened))
			}
		}
	}

	fn crypto(&self) -> Option<&dyn CryptoSuite> {
		self.config.crypto.as_deref()
	}

	/// Serializes (and encrypts, if configured) `v` and writes it under
	/// `key`.
	pub async fn put<T: Serialize>(&self, key: impl Into<Key>, v: &T, sync: bool) -> Result<()> {
		let bytes = value::to_bytes(v)?;
		self.put_raw(key, bytes, sync).await
	}

	/// Writes pre-serialized bytes verbatim (after encryption, if
	/// configured) under `key`.
	pub async fn put_raw(&self, key: impl Into<Key>, v: Vec<u8>, sync: bool) -> Result<()> {
		let encoded = crate::key::codec::encode(&self.data_path(key.into().into_path()));
		let sealed = value::seal(&v, self.crypto())?;
		self.engine()?.put(encoded, sealed, sync).await
	}

	pub async fn del(&self, key: impl Into<Key>, sync: bool) -> Result<()> {
		let encoded = crate::key::codec::encode(&self.data_path(key.into().into_path()));
		self.engine()?.delete(&encoded, sync).await
	}

	/// Atomically applies a heterogeneous list of puts/deletes.
	pub async fn batch(&self, ops: Vec<DataBatchOp>, sync: bool) -> Result<()> {
		let mut engine_ops = Vec::with_capacity(ops.len());
		for op in ops {
			match op {
				DataBatchOp::Put(kp, v) => {
					let encoded = crate::key::codec::encode(&self.data_path(kp));
					let sealed = value::seal(&v, self.crypto())?;
					engine_ops.push(BatchOp::Put(encoded, sealed));
				}
				DataBatchOp::Delete(kp) => {
					let encoded = crate::key::codec::encode(&self.data_path(kp));
					engine_ops.push(BatchOp::Delete(encoded));
				}
			}
		}
		self.engine()?.batch(engine_ops, sync).await
	}

	/// Opens an iterator scoped to `data` + `level`. When `opts.snapshot` is
	/// set, a point-in-time snapshot is taken up front and the whole
	/// iteration reads through it; otherwise it reads the live state.
	pub fn iterator(&self, level: KeyPath, opts: IteratorOptions) -> Result<Iterator> {
		let lease = self.registry.acquire();
		let engine = self.engine()?;
		let source =
			if opts.snapshot { Source::Snapshot(engine.snapshot()) } else { Source::Live(engine.clone()) };
		Iterator::new(self.data_path(level), opts, source, self.config.crypto.clone(), lease)
	}

	/// Iterates keys-only over `level` and deletes each, non-atomically.
	pub async fn clear(&self, level: KeyPath) -> Result<u64> {
		let opts = IteratorOptions { values: false, ..Default::default() };
		let scope = level.clone();
		let mut it = self.iterator(level, opts)?;
		let mut n = 0u64;
		while let Some(entry) = it.next()? {
			if let Some(kp) = entry.key {
				let mut full = scope.clone();
				full.extend(kp);
				self.del(full, false).await?;
				n += 1;
			}
		}
		it.end();
		Ok(n)
	}

	/// Iterates keys-only over `level` and counts.
	pub async fn count(&self, level: KeyPath) -> Result<u64> {
		let opts = IteratorOptions { values: false, ..Default::default() };
		let mut it = self.iterator(level, opts)?;
		let mut n = 0u64;
		while it.next()?.is_some() {
			n += 1;
		}
		it.end();
		Ok(n)
	}

	/// Diagnostics: collects every entry under `level` into memory. `root`
	/// overrides the default `data` partition, scoping the scan to `root ++
	/// level` instead — used to inspect the `transactions`/`canary`
	/// partitions directly. `raw` skips decryption, returning the bytes
	/// exactly as stored, which `value::open` already treats as a no-op pass
	/// through when no suite is given.
	pub async fn dump(
		&self,
		level: KeyPath,
		raw: bool,
		root: Option<KeyPath>,
	) -> Result<Vec<(KeyPath, Vec<u8>)>> {
		let scope = match root {
			Some(mut root) => {
				root.extend(level);
				root
			}
			None => self.data_path(level),
		};
		let crypto = if raw { None } else { self.config.crypto.clone() };
		let lease = self.registry.acquire();
		let engine = self.engine()?;
		let source = Source::Live(engine.clone());
		let mut it = Iterator::new(scope, IteratorOptions::default(), source, crypto, lease)?;
		let mut out = Vec::new();
		while let Some(entry) = it.next()? {
			if let (Some(kp), Some(v)) = (entry.key, entry.value) {
				out.push((kp, v));
			}
		}
		it.end();
		Ok(out)
	}

	/// Starts a new snapshot-isolated transaction scoped to `data`, returning
	/// a guard that commits on normal release and rolls back on
	/// [`TransactionGuard::fail`] or an abandoned drop.
	#[instrument(level = "trace", target = "levelkv::kvs::ds", skip(self))]
	pub fn transaction(&self, write: bool) -> Result<TransactionGuard> {
		let engine = self.engine()?;
		let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
		#[cfg(debug_assertions)]
		let check = Check::Panic;
		#[cfg(not(debug_assertions))]
		let check = Check::Warn;
		let engine_txn = engine.begin_optimistic(write, check)?;
		let tx = Transaction::new(id, write, engine_txn, self.registry.clone(), self.config.crypto.clone());
		Ok(TransactionGuard::new(tx))
	}
}

/// One entry in a [`Datastore::batch`] write, phrased in terms of
/// caller-relative `data` key paths.
pub enum DataBatchOp {
	Put(KeyPath, Vec<u8>),
	Delete(KeyPath),
}
