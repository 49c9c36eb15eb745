//! The pluggable value-level AEAD contract, and a ready-made
//! `ChaCha20-Poly1305` implementation of it.
//!
//! `CryptoSuite::decrypt` returning `Ok(None)` means "authentication
//! failed" (a wrong key or tampered ciphertext), distinct from `Err`, which
//! is reserved for unexpected system failures. This mirrors the `encrypt`/
//! `decrypt` callable-pair contract external callers may supply instead of
//! the bundled suite.

use aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::ChaCha20Poly1305;

use crate::err::{Error, Result};

/// The plaintext a freshly-opened, encrypted database expects to find (and
/// writes if absent) under the reserved `canary` record.
pub const CANARY_PLAINTEXT: &[u8] = b"deadbeef";

/// A user-supplied (or bundled) authenticated-encryption implementation.
///
/// Implementations are expected to be safe to call concurrently from
/// multiple tasks; the key itself is treated as read-only for the lifetime
/// of the suite.
pub trait CryptoSuite: Send + Sync {
	/// Encrypts `plaintext`, returning an opaque, self-contained ciphertext.
	fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

	/// Decrypts `ciphertext`. Returns `Ok(None)` if AEAD authentication
	/// fails; any other failure is a genuine system error.
	fn decrypt(&self, ciphertext: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// A [`CryptoSuite`] backed by `ChaCha20-Poly1305`, storing a random 12-byte
/// nonce ahead of each ciphertext.
pub struct ChaCha20Poly1305Suite {
	cipher: ChaCha20Poly1305,
}

impl ChaCha20Poly1305Suite {
	pub fn new(key: [u8; 32]) -> Self {
		Self {
			cipher: ChaCha20Poly1305::new((&key).into()),
		}
	}
}

impl CryptoSuite for ChaCha20Poly1305Suite {
	fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
		let mut ciphertext = self
			.cipher
			.encrypt(&nonce, plaintext)
			.map_err(|_| Error::EngineError("encryption failure".into()))?;
		let mut out = nonce.to_vec();
		out.append(&mut ciphertext);
		Ok(out)
	}

	fn decrypt(&self, ciphertext: &[u8]) -> Result<Option<Vec<u8>>> {
		if ciphertext.len() < 12 {
			return Ok(None);
		}
		let (nonce, body) = ciphertext.split_at(12);
		match self.cipher.decrypt(nonce.into(), body) {
			Ok(plaintext) => Ok(Some(plaintext)),
			Err(_) => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let suite = ChaCha20Poly1305Suite::new([9u8; 32]);
		let ct = suite.encrypt(CANARY_PLAINTEXT).unwrap();
		let pt = suite.decrypt(&ct).unwrap().unwrap();
		assert_eq!(pt, CANARY_PLAINTEXT);
	}

	#[test]
	fn truncated_ciphertext_fails_auth_not_panic() {
		let suite = ChaCha20Poly1305Suite::new([9u8; 32]);
		assert!(suite.decrypt(&[1, 2, 3]).unwrap().is_none());
	}

	#[test]
	fn tampered_ciphertext_fails_auth() {
		let suite = ChaCha20Poly1305Suite::new([9u8; 32]);
		let mut ct = suite.encrypt(CANARY_PLAINTEXT).unwrap();
		let last = ct.len() - 1;
		ct[last] ^= 0xff;
		assert!(suite.decrypt(&ct).unwrap().is_none());
	}
}
