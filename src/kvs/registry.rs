//! Tracks live iterators and transactions handed out by a
//! [`super::ds::Datastore`], so `stop` can refuse to tear down the engine
//! while callers still hold references into it.
//!
//! This replaces the dynamic membership sets the underlying engine binding
//! keeps per-connection: since this crate has exactly one datastore handle
//! per open database rather than a pool of connections, a single shared
//! counter plus an RAII [`Lease`] is enough to answer "is anything still
//! live" without a map keyed by connection id.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Registry {
	count: Arc<AtomicUsize>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers one live reference (an iterator or a transaction), returning
	/// a guard that deregisters it on drop.
	pub fn acquire(&self) -> Lease {
		self.count.fetch_add(1, Ordering::SeqCst);
		Lease { count: self.count.clone() }
	}

	pub fn live(&self) -> usize {
		self.count.load(Ordering::SeqCst)
	}
}

/// Held by a live iterator or transaction. Dropping it releases the slot.
pub struct Lease {
	count: Arc<AtomicUsize>,
}

impl Drop for Lease {
	fn drop(&mut self) {
		self.count.fetch_sub(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tracks_acquire_and_release() {
		let reg = Registry::new();
		assert_eq!(reg.live(), 0);
		let a = reg.acquire();
		let b = reg.acquire();
		assert_eq!(reg.live(), 2);
		drop(a);
		assert_eq!(reg.live(), 1);
		drop(b);
		assert_eq!(reg.live(), 0);
	}
}
