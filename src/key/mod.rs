//! How key paths are structured and turned into engine-ordered bytes.
//!
//! A [`KeyPath`] is an ordered sequence of byte parts. The first `n-1`
//! parts are the *level path* (a nested namespace); the last part is the
//! *key part*. [`codec`] turns a `KeyPath` into a single byte string such
//! that unsigned byte comparison of the encoded form matches the ordering
//! contract documented there: level parts compare first and
//! lexicographically, ties on the level path are broken by the key part,
//! and — the non-obvious rule — a deeper path always sorts before a
//! shallower one under the same ancestor, regardless of what the deeper
//! path's own parts contain.
//!
//! ```text
//! crate::key::Key::Single(x)   ≡ crate::key::Key::Path([x])
//! crate::key::codec::encode(["data", "users", "7"])   data/users/7
//! crate::key::codec::level_bounds(["data", "users"])  half-open range
//!                                                      over every key
//!                                                      under data/users
//! ```

pub mod codec;

/// One part of a key path. Any byte sequence, including the empty one, is a
/// legal part.
pub type Part = Vec<u8>;

/// An ordered sequence of byte parts identifying a record. All but the
/// last element form the *level path*; the last element is the *key
/// part*.
pub type KeyPath = Vec<Part>;

/// The public-facing key argument: either a single byte string or an
/// explicit path. `Single` is always canonicalised to a one-element
/// [`KeyPath`] before it reaches the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Key {
	Single(Part),
	Path(KeyPath),
}

impl Key {
	/// Normalises this key into a non-empty [`KeyPath`].
	pub fn into_path(self) -> KeyPath {
		match self {
			Key::Single(part) => vec![part],
			Key::Path(path) => path,
		}
	}
}

impl From<Vec<u8>> for Key {
	fn from(v: Vec<u8>) -> Self {
		Key::Single(v)
	}
}

impl From<&[u8]> for Key {
	fn from(v: &[u8]) -> Self {
		Key::Single(v.to_vec())
	}
}

impl From<&str> for Key {
	fn from(v: &str) -> Self {
		Key::Single(v.as_bytes().to_vec())
	}
}

impl From<String> for Key {
	fn from(v: String) -> Self {
		Key::Single(v.into_bytes())
	}
}

impl From<KeyPath> for Key {
	fn from(v: KeyPath) -> Self {
		Key::Path(v)
	}
}

impl From<Vec<&str>> for Key {
	fn from(v: Vec<&str>) -> Self {
		Key::Path(v.into_iter().map(|s| s.as_bytes().to_vec()).collect())
	}
}
