//! Order-preserving encoding of [`super::KeyPath`] into engine bytes.
//!
//! Each part is framed as `marker ++ escaped(part) ++ 0x00`, where `marker`
//! is [`LEVEL_MARKER`] for every part but the last, and [`KEY_MARKER`] for
//! the last (key) part. `escaped` rewrites every literal `0x00` byte in the
//! part to the two-byte sequence `0x00 0xFF`, which is the standard
//! escaped/NUL-terminated trick for building a memcmp-ordered byte string
//! out of an arbitrary one: a genuine terminator is a `0x00` *not* followed
//! by `0xFF`, so it can never be confused with an escaped NUL inside the
//! part, and appending it never changes the relative order of two parts
//! (a string that is a true prefix of another always still sorts first).
//!
//! The reason for two distinct marker bytes, rather than framing every part
//! identically, is rule 3 of the ordering contract ("deeper sorts first"):
//! `LEVEL_MARKER` (`0x01`) is strictly less than `KEY_MARKER` (`0x02`), so
//! at the first byte where one key path runs out of level parts and the
//! other still has one to go, the one still descending always compares
//! smaller — independent of what either path's remaining bytes contain.
//! This is the only place the ordering contract is non-obvious; everything
//! else follows from plain byte-string comparison of framed parts.

use crate::key::{KeyPath, Part};

const LEVEL_MARKER: u8 = 0x01;
const KEY_MARKER: u8 = 0x02;
const ESCAPE: u8 = 0x00;
const ESCAPE_FOLLOWUP: u8 = 0xff;

/// Encodes a full key path (level parts + key part) into its ordered byte
/// representation.
pub fn encode(path: &[Part]) -> Vec<u8> {
	let mut out = Vec::new();
	encode_into(path, &mut out);
	out
}

fn encode_into(path: &[Part], out: &mut Vec<u8>) {
	let Some((key_part, level_parts)) = path.split_last() else {
		return;
	};
	for part in level_parts {
		encode_part(LEVEL_MARKER, part, out);
	}
	encode_part(KEY_MARKER, key_part, out);
}

fn encode_part(marker: u8, part: &[u8], out: &mut Vec<u8>) {
	out.push(marker);
	for &b in part {
		if b == ESCAPE {
			out.push(ESCAPE);
			out.push(ESCAPE_FOLLOWUP);
		} else {
			out.push(b);
		}
	}
	out.push(ESCAPE);
}

/// Decodes an encoded key back into its [`KeyPath`]. Inverse of [`encode`].
pub fn decode(mut bytes: &[u8]) -> crate::err::Result<KeyPath> {
	let mut parts = Vec::new();
	loop {
		let (marker, rest) = bytes
			.split_first()
			.ok_or_else(|| malformed("unexpected end of key while reading marker"))?;
		let (part, rest) = decode_part(rest)?;
		parts.push(part);
		bytes = rest;
		match *marker {
			LEVEL_MARKER => continue,
			KEY_MARKER => {
				if !bytes.is_empty() {
					return Err(malformed("trailing bytes after key part"));
				}
				return Ok(parts);
			}
			other => return Err(malformed(&format!("unknown marker byte {other:#04x}"))),
		}
	}
}

fn decode_part(mut bytes: &[u8]) -> crate::err::Result<(Part, &[u8])> {
	let mut part = Vec::new();
	loop {
		match bytes.first() {
			None => return Err(malformed("unterminated key part")),
			Some(&ESCAPE) => match bytes.get(1) {
				Some(&ESCAPE_FOLLOWUP) => {
					part.push(ESCAPE);
					bytes = &bytes[2..];
				}
				_ => return Ok((part, &bytes[1..])),
			},
			Some(&b) => {
				part.push(b);
				bytes = &bytes[1..];
			}
		}
	}
}

fn malformed(msg: &str) -> crate::err::Error {
	crate::err::Error::ParseError(format!("malformed key encoding: {msg}"))
}

/// Derives the half-open byte range `[lo, hi)` that a scan must use to
/// enumerate exactly the keys whose level path equals `level` or extends
/// it. `hi` is `None` when `level` is empty (there is no finite upper
/// bound on the whole keyspace).
pub fn level_bounds(level: &[Part]) -> (Vec<u8>, Option<Vec<u8>>) {
	let mut lo = Vec::new();
	for part in level {
		encode_part(LEVEL_MARKER, part, &mut lo);
	}
	let hi = increment(&lo);
	(lo, hi)
}

/// Standard "prefix upper bound" trick: increments the last byte that is
/// not already `0xFF`, discarding anything after it. Returns `None` if
/// every byte is `0xFF` (or the input is empty), meaning there is no finite
/// byte string greater than every extension of `prefix`.
fn increment(prefix: &[u8]) -> Option<Vec<u8>> {
	let mut out = prefix.to_vec();
	while let Some(&last) = out.last() {
		if last == 0xff {
			out.pop();
			continue;
		}
		*out.last_mut().unwrap() += 1;
		return Some(out);
	}
	None
}

/// Strips the `level` prefix from a decoded key path, returning the
/// caller-relative remainder (at least one part: the key part, plus any
/// sub-level parts if the key is nested deeper than `level`).
pub fn strip_prefix(path: &KeyPath, level: &[Part]) -> crate::err::Result<KeyPath> {
	if path.len() <= level.len() || path[..level.len()] != *level {
		return Err(malformed("key does not extend the given level path"));
	}
	Ok(path[level.len()..].to_vec())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn p(parts: &[&[u8]]) -> KeyPath {
		parts.iter().map(|p| p.to_vec()).collect()
	}

	#[test]
	fn round_trip() {
		let cases: Vec<KeyPath> = vec![
			p(&[b"a"]),
			p(&[b""]),
			p(&[b"", b""]),
			p(&[b"a", b"b", b"c"]),
			p(&[b"\x00\x00", b"\x00"]),
			p(&[b"with\x00nul", b"and\x00more\x00nuls"]),
		];
		for kp in cases {
			let enc = encode(&kp);
			let dec = decode(&enc).unwrap();
			assert_eq!(kp, dec, "round trip failed for {kp:?}");
		}
	}

	#[test]
	fn deeper_sorts_first() {
		// [A, B, k] < [A, k] per rule 3, regardless of k vs B content.
		let deep = encode(&p(&[b"A", b"B", b"k"]));
		let shallow = encode(&p(&[b"A", b"k"]));
		assert!(deep < shallow);

		// Still true when the lexical content would suggest the opposite.
		let deep2 = encode(&p(&[b"A", b"zzz", b"a"]));
		let shallow2 = encode(&p(&[b"A", b"a"]));
		assert!(deep2 < shallow2);
	}

	#[test]
	fn same_level_orders_by_key_part() {
		let k1 = encode(&p(&[b"A", b"k1"]));
		let k2 = encode(&p(&[b"A", b"k2"]));
		assert!(k1 < k2);
	}

	#[test]
	fn differing_level_parts_order_lexicographically() {
		let a = encode(&p(&[b"A1", b"k"]));
		let b = encode(&p(&[b"A2", b"k"]));
		assert!(a < b);
	}

	#[test]
	fn lexicographic_integer_order_scenario() {
		// Lexicographic-integer packed keys must iterate in numeric order
		// once packed big-endian.
		fn pack(n: u32) -> Vec<u8> {
			n.to_be_bytes().to_vec()
		}
		let mut keys: Vec<(u32, Vec<u8>)> =
			vec![100, 3, 4, 42].into_iter().map(|n| (n, encode(&p(&[&pack(n)])))).collect();
		keys.sort_by(|a, b| a.1.cmp(&b.1));
		let order: Vec<u32> = keys.into_iter().map(|(n, _)| n).collect();
		assert_eq!(order, vec![3, 4, 42, 100]);
	}

	#[test]
	fn level_ordering_with_empty_parts_scenario() {
		let inputs: Vec<KeyPath> = vec![
			p(&[b"\x01"]),
			p(&[b"\x00\x00", b"\x00\x00"]),
			p(&[b"\x00\x00\x00", b"\x00"]),
			p(&[b"\x00\x00"]),
			p(&[b""]),
			p(&[b"", b""]),
			p(&[b"\x00"]),
			p(&[b"\x00\x00", b"", b""]),
		];
		let mut encoded: Vec<(usize, Vec<u8>)> =
			inputs.iter().enumerate().map(|(i, kp)| (i, encode(kp))).collect();
		encoded.sort_by(|a, b| a.1.cmp(&b.1));
		let order: Vec<usize> = encoded.into_iter().map(|(i, _)| i).collect();

		// Expected order derived by hand-applying rules 1-3:
		//  [],[]                    (index 5: empty first level part sorts
		//                            first among level paths of length >= 1)
		//  [0x00,0x00],[],[]        (index 7: deeper than index 1 under the
		//                            shared "\x00\x00" ancestor)
		//  [0x00,0x00],[0x00,0x00]  (index 1)
		//  [0x00,0x00,0x00],[0x00]  (index 2: "\x00\x00\x00" > "\x00\x00"
		//                            as a level part)
		//  []                       (index 4: level path [] sorts after
		//                            every non-empty level path, then by
		//                            key part lexicographically)
		//  [0x00]                   (index 6)
		//  [0x00,0x00]              (index 3)
		//  [0x01]                   (index 0)
		assert_eq!(order, vec![5, 7, 1, 2, 4, 6, 3, 0]);
	}

	#[test]
	fn level_bounds_cover_exactly_the_descendants() {
		let level = p(&[b"A"]);
		let (lo, hi) = level_bounds(&level);
		let hi = hi.unwrap();

		let inside: Vec<KeyPath> =
			vec![p(&[b"A", b"k"]), p(&[b"A", b"k2"]), p(&[b"A", b"B", b"k"]), p(&[b"A", b""])];
		let outside: Vec<KeyPath> = vec![p(&[b"A"]), p(&[b"AB", b"k"]), p(&[b"B", b"k"]), p(&[b"@"])];

		for kp in inside {
			let enc = encode(&kp);
			assert!(enc >= lo && enc < hi, "{kp:?} should be inside [lo, hi)");
		}
		for kp in outside {
			let enc = encode(&kp);
			assert!(!(enc >= lo && enc < hi), "{kp:?} should be outside [lo, hi)");
		}
	}

	#[test]
	fn level_bounds_empty_level_has_no_upper_bound() {
		let (lo, hi) = level_bounds(&[]);
		assert!(lo.is_empty());
		assert!(hi.is_none());
	}

	#[test]
	fn strip_prefix_projects_relative_path() {
		let level = p(&[b"A", b"B"]);
		let full = p(&[b"A", b"B", b"C", b"k"]);
		let rel = strip_prefix(&full, &level).unwrap();
		assert_eq!(rel, p(&[b"C", b"k"]));
	}

	#[test]
	fn strip_prefix_rejects_non_descendant() {
		let level = p(&[b"A", b"B"]);
		let other = p(&[b"A", b"Z", b"k"]);
		assert!(strip_prefix(&other, &level).is_err());
	}
}
