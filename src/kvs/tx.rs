//! Snapshot-isolated transactions: a buffered write set layered over an
//! engine snapshot, with tombstone-aware merge iteration and
//! conflict-checked commit.
//!
//! The write buffer here is the in-memory ordered map the design notes
//! permit as an alternative to materialising it under a scratch partition
//! (see `DESIGN.md`): a `BTreeMap<Vec<u8>, WriteEntry>` already iterates in
//! encoded-key order, which is exactly the order the merge iterator needs
//! from it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::instrument;

use std::sync::Arc;

use serde::Serialize;

use crate::err::{Error, Result};
use crate::key::codec;
use crate::key::{Key, KeyPath};
use crate::kvs::iterator::{in_range, resolve_bounds, Entry, IteratorOptions};
use crate::kvs::registry::{Lease, Registry};
use crate::kvs::rocksdb_engine::{Check, EngineTxn};
use crate::kvs::LEVEL_DATA;
use crate::value;
use crate::crypto::CryptoSuite;

/// One entry in a transaction's write buffer.
#[derive(Clone, Debug)]
enum WriteEntry {
	Put(Vec<u8>),
	Tombstone,
}

/// A hook queued on a transaction, invoked on the matching outcome.
pub type Hook = Box<dyn FnOnce(Option<&Error>) + Send>;

/// A snapshot-isolated transaction against `data` (see
/// [`super::ds::Datastore`]).
pub struct Transaction {
	pub(crate) id: u64,
	write: bool,
	state: State,
	engine: EngineTxn,
	buffer: BTreeMap<Vec<u8>, WriteEntry>,
	crypto: Option<Arc<dyn CryptoSuite>>,
	success_hooks: Vec<Hook>,
	failure_hooks: Vec<Hook>,
	finally_hooks: Vec<Hook>,
	registry: Registry,
	_lease: Lease,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
	Active,
	Committed,
	RolledBack,
}

impl Transaction {
	pub(crate) fn new(
		id: u64,
		write: bool,
		engine: EngineTxn,
		registry: Registry,
		crypto: Option<Arc<dyn CryptoSuite>>,
	) -> Self {
		let lease = registry.acquire();
		Transaction {
			id,
			write,
			state: State::Active,
			engine,
			buffer: BTreeMap::new(),
			crypto,
			success_hooks: Vec::new(),
			failure_hooks: Vec::new(),
			finally_hooks: Vec::new(),
			registry,
			_lease: lease,
		}
	}

	fn data_path(&self, kp: KeyPath) -> KeyPath {
		let mut full = vec![LEVEL_DATA.to_vec()];
		full.extend(kp);
		full
	}

	pub(crate) fn set_check_level(&mut self, check: Check) {
		self.engine.set_check(check);
	}

	fn ensure_active(&self) -> Result<()> {
		match self.state {
			State::Active => Ok(()),
			_ => Err(Error::TransactionTerminal),
		}
	}

	fn ensure_writable(&self) -> Result<()> {
		if !self.write {
			return Err(Error::EngineError("transaction is read-only".into()));
		}
		Ok(())
	}

	/// Reads the raw, decrypted-but-undeserialized bytes under `key`,
	/// honouring the transaction's own buffered writes.
	#[instrument(level = "trace", target = "levelkv::kvs::tx", skip(self))]
	pub fn get_raw(&self, key: impl Into<Key>) -> Result<Option<Vec<u8>>> {
		self.ensure_active()?;
		let encoded = codec::encode(&self.data_path(key.into().into_path()));
		let sealed = match self.buffer.get(&encoded) {
			Some(WriteEntry::Put(v)) => Some(v.clone()),
			Some(WriteEntry::Tombstone) => None,
			None => self.engine.get(&encoded)?,
		};
		sealed.map(|b| value::open(&b, self.crypto.as_deref())).transpose()
	}

	pub fn get<T: serde::de::DeserializeOwned>(&self, key: impl Into<Key>) -> Result<Option<T>> {
		self.get_raw(key)?.map(|b| value::from_bytes(&b)).transpose()
	}

	/// Same as [`Self::get_raw`], additionally registering `key` so commit
	/// fails with [`Error::Conflict`] if another transaction writes it
	/// first.
	#[instrument(level = "trace", target = "levelkv::kvs::tx", skip(self))]
	pub fn get_for_update(&self, key: impl Into<Key>) -> Result<Option<Vec<u8>>> {
		self.ensure_active()?;
		let encoded = codec::encode(&self.data_path(key.into().into_path()));
		let sealed = match self.buffer.get(&encoded) {
			Some(WriteEntry::Put(v)) => Some(v.clone()),
			Some(WriteEntry::Tombstone) => None,
			None => self.engine.get_for_update(&encoded)?,
		};
		sealed.map(|b| value::open(&b, self.crypto.as_deref())).transpose()
	}

	#[instrument(level = "trace", target = "levelkv::kvs::tx", skip(self, v))]
	pub fn put_raw(&mut self, key: impl Into<Key>, v: Vec<u8>) -> Result<()> {
		self.ensure_active()?;
		self.ensure_writable()?;
		let encoded = codec::encode(&self.data_path(key.into().into_path()));
		let sealed = value::seal(&v, self.crypto.as_deref())?;
		self.buffer.insert(encoded, WriteEntry::Put(sealed));
		Ok(())
	}

	pub fn put<T: Serialize>(&mut self, key: impl Into<Key>, v: &T) -> Result<()> {
		let bytes = value::to_bytes(v)?;
		self.put_raw(key, bytes)
	}

	#[instrument(level = "trace", target = "levelkv::kvs::tx", skip(self))]
	pub fn del(&mut self, key: impl Into<Key>) -> Result<()> {
		self.ensure_active()?;
		self.ensure_writable()?;
		let encoded = codec::encode(&self.data_path(key.into().into_path()));
		self.buffer.insert(encoded, WriteEntry::Tombstone);
		Ok(())
	}

	pub fn on_success(&mut self, hook: Hook) {
		self.success_hooks.push(hook);
	}

	pub fn on_failure(&mut self, hook: Hook) {
		self.failure_hooks.push(hook);
	}

	pub fn on_finally(&mut self, hook: Hook) {
		self.finally_hooks.push(hook);
	}

	/// Opens a merge iterator over `level`, folding in this transaction's
	/// own buffered writes.
	pub fn iterator(&self, level: KeyPath, opts: IteratorOptions) -> Result<TxIterator<'_>> {
		self.ensure_active()?;
		TxIterator::new(
			self.data_path(level),
			opts,
			&self.engine,
			&self.buffer,
			self.crypto.clone(),
			self.registry.acquire(),
		)
	}

	/// Applies the buffered write set atomically through the engine's
	/// optimistic-transaction commit. On failure the transaction rolls back
	/// and the failure/finally hooks run (the caller still observes the
	/// original error).
	#[instrument(level = "trace", target = "levelkv::kvs::tx", skip(self))]
	pub fn commit(&mut self) -> Result<()> {
		self.ensure_active()?;
		self.ensure_writable()?;

		for (key, entry) in std::mem::take(&mut self.buffer) {
			match entry {
				WriteEntry::Put(v) => self.engine.put(key, v)?,
				WriteEntry::Tombstone => self.engine.delete(&key)?,
			}
		}

		match self.engine.commit() {
			Ok(()) => {
				self.state = State::Committed;
				for hook in std::mem::take(&mut self.success_hooks) {
					hook(None);
				}
				for hook in std::mem::take(&mut self.finally_hooks) {
					hook(None);
				}
				Ok(())
			}
			Err(e) => {
				self.state = State::RolledBack;
				for hook in std::mem::take(&mut self.failure_hooks) {
					hook(Some(&e));
				}
				for hook in std::mem::take(&mut self.finally_hooks) {
					hook(Some(&e));
				}
				Err(e)
			}
		}
	}

	/// Discards the write buffer and releases the snapshot. Idempotent once
	/// a terminal state has been reached.
	#[instrument(level = "trace", target = "levelkv::kvs::tx", skip(self))]
	pub fn rollback(&mut self) -> Result<()> {
		if self.state != State::Active {
			return Ok(());
		}
		self.buffer.clear();
		self.engine.rollback()?;
		self.state = State::RolledBack;
		for hook in std::mem::take(&mut self.failure_hooks) {
			hook(None);
		}
		for hook in std::mem::take(&mut self.finally_hooks) {
			hook(None);
		}
		Ok(())
	}

	pub fn is_finished(&self) -> bool {
		self.state != State::Active
	}
}

/// A scoped "acquire — use — release" guard around a [`Transaction`]: on
/// drop it commits a writable transaction if [`Self::fail`] was never
/// called, and rolls back otherwise (a read-only transaction always rolls
/// back — there is nothing for it to commit), regardless of which path left
/// scope (normal return, error propagation via `?`, or panic unwinding).
pub struct TransactionGuard {
	tx: Option<Transaction>,
	failed: bool,
}

impl TransactionGuard {
	pub(crate) fn new(tx: Transaction) -> Self {
		TransactionGuard { tx: Some(tx), failed: false }
	}

	/// Marks this transaction to roll back instead of commit when the guard
	/// is released.
	pub fn fail(&mut self) {
		self.failed = true;
	}

	pub fn as_mut(&mut self) -> &mut Transaction {
		self.tx.as_mut().expect("transaction guard used after release")
	}

	/// Explicitly commits (or rolls back, if [`Self::fail`] was called) and
	/// consumes the guard, surfacing the outcome instead of deferring to
	/// `Drop`.
	pub fn release(mut self) -> Result<()> {
		self.release_inner()
	}

	fn release_inner(&mut self) -> Result<()> {
		let Some(mut tx) = self.tx.take() else {
			return Ok(());
		};
		if tx.is_finished() {
			return Ok(());
		}
		// A read-only transaction has nothing to commit; releasing it
		// normally is a cancel, same as a failed write transaction.
		if self.failed || !tx.write {
			tx.rollback()
		} else {
			tx.commit()
		}
	}
}

impl Drop for TransactionGuard {
	fn drop(&mut self) {
		if self.tx.is_some() {
			let _ = self.release_inner();
		}
	}
}

/// A transactional merge iterator: a snapshot-backed raw iterator merged
/// with the transaction's own write buffer, in §4.1 order, applying
/// `(snapshot ∪ buffer puts) \ buffer tombstones`.
pub struct TxIterator<'b> {
	level: KeyPath,
	reverse: bool,
	keys: bool,
	values: bool,
	limit: Option<usize>,
	lo: Vec<u8>,
	lo_inclusive: bool,
	hi: Option<Vec<u8>>,
	hi_inclusive: bool,
	emitted: usize,
	done: bool,
	ended: bool,
	snap: rocksdb::DBRawIterator<'b>,
	buffer: &'b BTreeMap<Vec<u8>, WriteEntry>,
	buf_keys: Vec<Vec<u8>>,
	buf_idx: usize,
	crypto: Option<Arc<dyn CryptoSuite>>,
	_lease: Lease,
}

impl<'b> TxIterator<'b> {
	fn new(
		level: KeyPath,
		opts: IteratorOptions,
		engine: &'b EngineTxn,
		buffer: &'b BTreeMap<Vec<u8>, WriteEntry>,
		crypto: Option<Arc<dyn CryptoSuite>>,
		lease: Lease,
	) -> Result<Self> {
		let (lo, lo_inclusive, hi, hi_inclusive) = resolve_bounds(&level, &opts)?;

		let mut snap = engine.raw_iterator();
		if opts.reverse {
			match &hi {
				Some(h) => {
					snap.seek_for_prev(h);
					if !hi_inclusive && snap.valid() && snap.key() == Some(h.as_slice()) {
						snap.prev();
					}
				}
				None => snap.seek_to_last(),
			}
		} else {
			snap.seek(&lo);
			if !lo_inclusive && snap.valid() && snap.key() == Some(lo.as_slice()) {
				snap.next();
			}
		}

		let lower = if lo_inclusive { Bound::Included(lo.clone()) } else { Bound::Excluded(lo.clone()) };
		let upper = match &hi {
			Some(h) if hi_inclusive => Bound::Included(h.clone()),
			Some(h) => Bound::Excluded(h.clone()),
			None => Bound::Unbounded,
		};
		let mut buf_keys: Vec<Vec<u8>> = buffer.range((lower, upper)).map(|(k, _)| k.clone()).collect();
		if opts.reverse {
			buf_keys.reverse();
		}

		Ok(TxIterator {
			level,
			reverse: opts.reverse,
			keys: opts.keys,
			values: opts.values,
			limit: opts.limit,
			lo,
			lo_inclusive,
			hi,
			hi_inclusive,
			emitted: 0,
			done: false,
			ended: false,
			snap,
			buffer,
			buf_keys,
			buf_idx: 0,
			crypto,
			_lease: lease,
		})
	}

	/// Repositions both the snapshot cursor and the buffer cursor.
	pub fn seek(&mut self, kp: &KeyPath) {
		let mut full = self.level.clone();
		full.extend(kp.iter().cloned());
		let target = codec::encode(&full);
		self.done = false;
		if self.reverse {
			self.snap.seek_for_prev(&target);
			self.buf_idx = self.buf_keys.partition_point(|k| k.as_slice() > target.as_slice());
		} else {
			self.snap.seek(&target);
			self.buf_idx = self.buf_keys.partition_point(|k| k.as_slice() < target.as_slice());
		}
	}

	fn snap_candidate(&self) -> Option<Vec<u8>> {
		if !self.snap.valid() {
			return None;
		}
		let key = self.snap.key().expect("valid iterator has a key");
		if !in_range(key, self.reverse, &self.lo, self.lo_inclusive, &self.hi, self.hi_inclusive) {
			return None;
		}
		Some(key.to_vec())
	}

	fn advance_snap(&mut self) {
		if self.reverse {
			self.snap.prev();
		} else {
			self.snap.next();
		}
	}

	fn order(&self, a: &[u8], b: &[u8]) -> Ordering {
		if self.reverse {
			b.cmp(a)
		} else {
			a.cmp(b)
		}
	}

	fn emit(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<Option<Entry>> {
		self.emitted += 1;
		let projected = if self.keys {
			let path = codec::decode(&key)?;
			Some(codec::strip_prefix(&path, &self.level)?)
		} else {
			None
		};
		let value = if self.values { Some(value::open(&value, self.crypto.as_deref())?) } else { None };
		Ok(Some(Entry { key: projected, value }))
	}

	/// Yields the next merged entry, or `None` at exhaustion or the
	/// configured limit.
	pub fn next(&mut self) -> Result<Option<Entry>> {
		loop {
			if self.done || self.ended {
				return Ok(None);
			}
			if let Some(limit) = self.limit {
				if self.emitted >= limit {
					self.done = true;
					return Ok(None);
				}
			}

			let snap_key = self.snap_candidate();
			let buf_key = self.buf_keys.get(self.buf_idx).cloned();

			match (snap_key, buf_key) {
				(None, None) => {
					self.done = true;
					return Ok(None);
				}
				(None, Some(bk)) => {
					self.buf_idx += 1;
					match self.buffer.get(&bk) {
						Some(WriteEntry::Put(v)) => return self.emit(bk, v.clone()),
						_ => continue,
					}
				}
				(Some(sk), None) => {
					let value = self.snap.value().expect("valid iterator has a value").to_vec();
					self.advance_snap();
					return self.emit(sk, value);
				}
				(Some(sk), Some(bk)) => match self.order(&sk, &bk) {
					Ordering::Less => {
						let value = self.snap.value().expect("valid iterator has a value").to_vec();
						self.advance_snap();
						return self.emit(sk, value);
					}
					Ordering::Greater => {
						self.buf_idx += 1;
						match self.buffer.get(&bk) {
							Some(WriteEntry::Put(v)) => return self.emit(bk, v.clone()),
							_ => continue,
						}
					}
					Ordering::Equal => {
						self.advance_snap();
						self.buf_idx += 1;
						match self.buffer.get(&bk) {
							Some(WriteEntry::Put(v)) => return self.emit(bk, v.clone()),
							_ => continue,
						}
					}
				},
			}
		}
	}

	pub fn end(&mut self) {
		self.ended = true;
	}
}
