//! Serializes values to bytes, and transparently wraps/unwraps them in
//! authenticated encryption when a [`crate::crypto::CryptoSuite`] is
//! configured.
//!
//! Typed values round-trip through `ciborium` (a self-describing, injective
//! CBOR encoding) via [`to_bytes`]/[`from_bytes`]. Callers that already hold
//! the exact bytes to store skip that step entirely and call [`seal`]
//! directly — this is what the façade's `put_raw`/`get_raw` do.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::CryptoSuite;
use crate::err::{Error, Result};

/// Serializes `value` to its wire representation.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
	let mut out = Vec::new();
	ciborium::into_writer(value, &mut out).map_err(|e| Error::ParseError(e.to_string()))?;
	Ok(out)
}

/// Deserializes a value previously produced by [`to_bytes`].
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
	ciborium::from_reader(bytes).map_err(|e| Error::ParseError(e.to_string()))
}

/// Encrypts `plaintext` under `suite`, if one is configured. Without a
/// suite, the plaintext passes through unchanged.
pub fn seal(plaintext: &[u8], suite: Option<&dyn CryptoSuite>) -> Result<Vec<u8>> {
	match suite {
		Some(suite) => suite.encrypt(plaintext),
		None => Ok(plaintext.to_vec()),
	}
}

/// Decrypts `ciphertext` under `suite`, if one is configured. Returns
/// [`Error::DecryptError`] if AEAD authentication fails.
pub fn open(ciphertext: &[u8], suite: Option<&dyn CryptoSuite>) -> Result<Vec<u8>> {
	match suite {
		Some(suite) => suite.decrypt(ciphertext)?.ok_or(Error::DecryptError),
		None => Ok(ciphertext.to_vec()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::ChaCha20Poly1305Suite;

	#[test]
	fn round_trip_without_crypto() {
		let v = "hello world".to_string();
		let bytes = to_bytes(&v).unwrap();
		let sealed = seal(&bytes, None).unwrap();
		let opened = open(&sealed, None).unwrap();
		let back: String = from_bytes(&opened).unwrap();
		assert_eq!(v, back);
	}

	#[test]
	fn round_trip_with_crypto() {
		let suite = ChaCha20Poly1305Suite::new([7u8; 32]);
		let v = 424242i64;
		let bytes = to_bytes(&v).unwrap();
		let sealed = seal(&bytes, Some(&suite)).unwrap();
		assert_ne!(sealed, bytes);
		let opened = open(&sealed, Some(&suite)).unwrap();
		let back: i64 = from_bytes(&opened).unwrap();
		assert_eq!(v, back);
	}

	#[test]
	fn wrong_key_fails_to_decrypt() {
		let suite_a = ChaCha20Poly1305Suite::new([1u8; 32]);
		let suite_b = ChaCha20Poly1305Suite::new([2u8; 32]);
		let bytes = to_bytes(&"secret").unwrap();
		let sealed = seal(&bytes, Some(&suite_a)).unwrap();
		let err = open(&sealed, Some(&suite_b)).unwrap_err();
		assert!(matches!(err, Error::DecryptError));
	}
}
