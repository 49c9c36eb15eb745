//! A scoped iterator over a level path, with range options relative to that
//! scope and key-path projection back into caller-relative form.
//!
//! This non-transactional flavour reads either the live state of the engine
//! or a fixed snapshot. The merge iterator used inside a transaction (which
//! additionally folds in the transaction's own buffered writes) lives in
//! [`super::tx`] and shares [`resolve_bounds`] with this one.

use std::sync::Arc;

use crate::crypto::CryptoSuite;
use crate::err::Result;
use crate::key::codec;
use crate::key::KeyPath;
use crate::kvs::registry::Lease;
use crate::kvs::rocksdb_engine::{EngineSnapshot, RocksEngine};
use crate::value;

/// Options accepted when opening an [`Iterator`], mirroring the façade's
/// `iterator(level, opts)` contract.
#[derive(Clone, Debug)]
pub struct IteratorOptions {
	pub keys: bool,
	pub values: bool,
	pub gt: Option<KeyPath>,
	pub gte: Option<KeyPath>,
	pub lt: Option<KeyPath>,
	pub lte: Option<KeyPath>,
	pub reverse: bool,
	pub limit: Option<usize>,
	/// Read through a point-in-time snapshot rather than live state. Only
	/// meaningful for the façade's non-transactional iterator: a
	/// transactional iterator always reads through the transaction's own
	/// snapshot.
	pub snapshot: bool,
}

impl Default for IteratorOptions {
	fn default() -> Self {
		Self {
			keys: true,
			values: true,
			gt: None,
			gte: None,
			lt: None,
			lte: None,
			reverse: false,
			limit: None,
			snapshot: false,
		}
	}
}

/// One entry yielded by [`Iterator::next`]. `key`/`value` are `None` when
/// the corresponding option was turned off.
#[derive(Clone, Debug)]
pub struct Entry {
	pub key: Option<KeyPath>,
	pub value: Option<Vec<u8>>,
}

/// The resolved, absolute byte bounds a level + [`IteratorOptions`] imply:
/// `(lo, lo_inclusive, hi, hi_inclusive)`. Shared by the plain iterator and
/// the transactional merge iterator so both honour the same range contract.
pub fn resolve_bounds(
	level: &KeyPath,
	opts: &IteratorOptions,
) -> Result<(Vec<u8>, bool, Option<Vec<u8>>, bool)> {
	let (default_lo, default_hi) = codec::level_bounds(level);

	let (lo, lo_inclusive) = if let Some(gte) = &opts.gte {
		(encode_relative(level, gte), true)
	} else if let Some(gt) = &opts.gt {
		(encode_relative(level, gt), false)
	} else {
		(default_lo, true)
	};

	let (hi, hi_inclusive) = if let Some(lte) = &opts.lte {
		(Some(encode_relative(level, lte)), true)
	} else if let Some(lt) = &opts.lt {
		(Some(encode_relative(level, lt)), false)
	} else {
		(default_hi, false)
	};

	Ok((lo, lo_inclusive, hi, hi_inclusive))
}

fn encode_relative(level: &KeyPath, relative: &KeyPath) -> Vec<u8> {
	let mut full = level.clone();
	full.extend(relative.iter().cloned());
	codec::encode(&full)
}

/// Whether `key` falls within `[lo, hi)` (bounds adjusted for `reverse` and
/// inclusivity). Shared by the plain iterator and the transactional merge
/// iterator so both honour the same range contract.
pub(crate) fn in_range(
	key: &[u8],
	reverse: bool,
	lo: &[u8],
	lo_inclusive: bool,
	hi: &Option<Vec<u8>>,
	hi_inclusive: bool,
) -> bool {
	if reverse {
		if key < lo {
			return false;
		}
		if !lo_inclusive && key == lo {
			return false;
		}
	} else if let Some(hi) = hi {
		if key > hi.as_slice() {
			return false;
		}
		if !hi_inclusive && key == hi.as_slice() {
			return false;
		}
	}
	true
}

/// Where a plain [`Iterator`] reads from.
pub(crate) enum Source {
	Live(RocksEngine),
	Snapshot(EngineSnapshot),
}

impl Source {
	fn raw_iterator(&self) -> rocksdb::DBRawIterator<'_> {
		match self {
			Source::Live(e) => e.raw_iterator(),
			Source::Snapshot(s) => s.raw_iterator(),
		}
	}
}

/// A scoped, non-transactional iterator. See the module docs.
pub struct Iterator {
	level: KeyPath,
	keys: bool,
	values: bool,
	reverse: bool,
	limit: Option<usize>,
	lo: Vec<u8>,
	lo_inclusive: bool,
	hi: Option<Vec<u8>>,
	hi_inclusive: bool,
	emitted: usize,
	done: bool,
	ended: bool,
	// Borrows from `source`; must be declared before it so it is dropped
	// first (see the safety note on `EngineTxn`).
	raw: rocksdb::DBRawIterator<'static>,
	source: Source,
	crypto: Option<Arc<dyn CryptoSuite>>,
	_lease: Lease,
}

impl Iterator {
	pub(crate) fn new(
		level: KeyPath,
		opts: IteratorOptions,
		source: Source,
		crypto: Option<Arc<dyn CryptoSuite>>,
		lease: Lease,
	) -> Result<Self> {
		let (lo, lo_inclusive, hi, hi_inclusive) = resolve_bounds(&level, &opts)?;

		// SAFETY: `raw` borrows from `source`, which this struct owns and
		// drops after `raw` (see field order above). No reference to `raw`
		// outlives `self`.
		let raw = unsafe {
			std::mem::transmute::<rocksdb::DBRawIterator<'_>, rocksdb::DBRawIterator<'static>>(
				source.raw_iterator(),
			)
		};

		let mut it = Iterator {
			level,
			keys: opts.keys,
			values: opts.values,
			reverse: opts.reverse,
			limit: opts.limit,
			lo,
			lo_inclusive,
			hi,
			hi_inclusive,
			emitted: 0,
			done: false,
			ended: false,
			raw,
			source,
			crypto,
			_lease: lease,
		};
		it.seek_start();
		Ok(it)
	}

	fn seek_start(&mut self) {
		if self.reverse {
			match &self.hi {
				Some(hi) => {
					self.raw.seek_for_prev(hi);
					if !self.hi_inclusive && self.raw.valid() && self.raw.key() == Some(hi.as_slice()) {
						self.raw.prev();
					}
				}
				None => self.raw.seek_to_last(),
			}
		} else {
			self.raw.seek(&self.lo);
			if !self.lo_inclusive && self.raw.valid() && self.raw.key() == Some(self.lo.as_slice()) {
				self.raw.next();
			}
		}
	}

	/// Repositions the iterator to the first key ≥ `level ++ kp` (or ≤ in
	/// reverse mode), re-deriving the merge/scan state from there.
	pub fn seek(&mut self, kp: &KeyPath) {
		let mut full = self.level.clone();
		full.extend(kp.iter().cloned());
		let target = codec::encode(&full);
		self.done = false;
		if self.reverse {
			self.raw.seek_for_prev(&target);
		} else {
			self.raw.seek(&target);
		}
	}

	fn in_bounds(&self, key: &[u8]) -> bool {
		in_range(key, self.reverse, &self.lo, self.lo_inclusive, &self.hi, self.hi_inclusive)
	}

	/// Yields the next entry, or `None` at exhaustion or the configured
	/// limit.
	pub fn next(&mut self) -> Result<Option<Entry>> {
		if self.done || self.ended {
			return Ok(None);
		}
		if let Some(limit) = self.limit {
			if self.emitted >= limit {
				self.done = true;
				return Ok(None);
			}
		}
		if !self.raw.valid() {
			self.done = true;
			return Ok(None);
		}
		let key = self.raw.key().expect("valid iterator has a key").to_vec();
		if !self.in_bounds(&key) {
			self.done = true;
			return Ok(None);
		}
		let value = if self.values {
			match self.raw.value() {
				Some(v) => Some(value::open(v, self.crypto.as_deref())?),
				None => None,
			}
		} else {
			None
		};
		let projected = if self.keys {
			let path = codec::decode(&key)?;
			Some(codec::strip_prefix(&path, &self.level)?)
		} else {
			None
		};
		if self.reverse {
			self.raw.prev();
		} else {
			self.raw.next();
		}
		self.emitted += 1;
		Ok(Some(Entry { key: projected, value }))
	}

	/// Releases the underlying engine iterator. Idempotent.
	pub fn end(&mut self) {
		self.ended = true;
	}
}
