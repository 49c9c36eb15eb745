//! An embedded, transactional, hierarchically-namespaced key-value store,
//! with optional value-level authenticated encryption.
//!
//! Keys are [`key::KeyPath`]s: ordered sequences of byte parts. All but the
//! last part form a *level*, a nested namespace; [`kvs::Datastore::iterator`]
//! scans a level, and a deeper level always sorts before its own shallower
//! ancestor path (see [`key`] for the exact ordering contract). Every user
//! key lives under the reserved `data` level; [`kvs::Datastore`] is the
//! entry point — open one with [`kvs::Datastore::new`] and [`kvs::Datastore::start`],
//! then read and write through it directly or via a
//! [`kvs::TransactionGuard`] for snapshot-isolated, read-your-writes
//! transactions.
//!
//! ```no_run
//! # async fn example() -> levelkv::Result<()> {
//! use levelkv::{Config, Datastore};
//!
//! let mut ds = Datastore::new("/tmp/example.db", Config::default());
//! ds.start().await?;
//! ds.put_raw(vec![b"hello".to_vec()], b"world".to_vec(), false).await?;
//! assert_eq!(ds.get_raw(vec![b"hello".to_vec()]).await?, Some(b"world".to_vec()));
//! ds.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod cnf;
pub mod crypto;
pub mod err;
pub mod key;
mod mac;
pub mod kvs;
pub mod value;

pub use crypto::{ChaCha20Poly1305Suite, CryptoSuite};
pub use err::{Error, Result};
pub use key::{Key, KeyPath};
pub use kvs::{Config, Datastore, Entry, Iterator, IteratorOptions, Transaction, TransactionGuard};
