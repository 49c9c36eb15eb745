//! The storage layer: an [`api::Engine`] trait with one concrete binding
//! ([`rocksdb_engine::RocksEngine`]), the hierarchical façade
//! ([`ds::Datastore`]), its scoped iterator ([`iterator::Iterator`]), and the
//! snapshot-isolated transaction built on top of it ([`tx::Transaction`]).

pub mod api;
pub mod ds;
pub mod iterator;
pub mod registry;
pub mod rocksdb_engine;
pub mod tx;

/// Reserved first path segment under which every user key lives.
pub(crate) const LEVEL_DATA: &[u8] = b"data";
/// Reserved first path segment for the write-buffer scratch partition wiped
/// on [`ds::Datastore::start`].
pub(crate) const LEVEL_TRANSACTIONS: &[u8] = b"transactions";
/// Reserved first path segment holding the encryption canary record.
pub(crate) const LEVEL_CANARY: &[u8] = b"canary";

pub use api::{BatchOp, Engine, EngineOptions};
pub use ds::{Config, DataBatchOp, Datastore};
pub use iterator::{Entry, Iterator, IteratorOptions};
pub use rocksdb_engine::Check;
pub use tx::{Transaction, TransactionGuard, TxIterator};
