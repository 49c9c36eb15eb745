use std::fmt::Debug;

/// The single error type surfaced by this crate.
///
/// `NotFound` is deliberately absent from this enum: a missing record is a
/// normal outcome of `get`, and is represented as `Ok(None)` rather than an
/// error, at every public boundary.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// An optimistic transaction's commit was rejected because a key it
	/// wrote (or marked with `getForUpdate`) was modified by another
	/// transaction that committed first.
	#[error("transaction conflict")]
	Conflict,

	/// The canary record did not decrypt to the expected plaintext. Either
	/// the supplied key is wrong, or the on-disk state is corrupted.
	#[error("key verification failed: wrong key or corrupted database")]
	KeyError,

	/// AEAD authentication failed while decrypting a stored value.
	#[error("failed to decrypt value")]
	DecryptError,

	/// A value decrypted successfully but failed to deserialize.
	#[error("failed to parse value: {0}")]
	ParseError(String),

	/// An operation was attempted before `start` was called, or after
	/// `stop`.
	#[error("database is not running")]
	NotRunning,

	/// `start` was called on a database that is already running.
	#[error("database is already running")]
	AlreadyRunning,

	/// An operation was attempted on a destroyed database.
	#[error("database has been destroyed")]
	Destroyed,

	/// `stop` was attempted while one or more iterators or transactions
	/// were still live.
	#[error("cannot stop: {0} live reference(s) remain")]
	LiveReference(usize),

	/// A read or write was attempted on a transaction that has already
	/// committed or rolled back.
	#[error("transaction is already finalized")]
	TransactionTerminal,

	/// Any other failure surfaced by the underlying storage engine.
	#[error("engine error: {0}")]
	EngineError(String),
}

impl From<rocksdb::Error> for Error {
	fn from(e: rocksdb::Error) -> Self {
		Error::EngineError(e.to_string())
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::EngineError(e.to_string())
	}
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
	fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
		Error::ParseError(e.to_string())
	}
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
	fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
		Error::ParseError(e.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
