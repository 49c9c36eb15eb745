//! End-to-end scenarios against the public [`levelkv`] façade.

use levelkv::{ChaCha20Poly1305Suite, Config, Datastore, Error, IteratorOptions, Key};
use std::sync::Arc;
use tempfile::tempdir;

fn pack(n: u32) -> Vec<u8> {
	n.to_be_bytes().to_vec()
}

async fn fresh(path: &std::path::Path) -> Datastore {
	let mut ds = Datastore::new(path, Config::default());
	ds.start().await.unwrap();
	ds
}

#[tokio::test]
async fn lexicographic_integer_order() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;

	for n in [100u32, 3, 4, 42] {
		ds.put_raw(vec![pack(n)], b"v".to_vec(), false).await.unwrap();
	}

	let mut it = ds.iterator(vec![], IteratorOptions { values: false, ..Default::default() }).unwrap();
	let mut order = Vec::new();
	while let Some(entry) = it.next().unwrap() {
		let kp = entry.key.unwrap();
		order.push(u32::from_be_bytes(kp[0].clone().try_into().unwrap()));
	}
	it.end();
	assert_eq!(order, vec![3, 4, 42, 100]);
}

#[tokio::test]
async fn level_ordering_with_empty_parts() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;

	let p = |parts: &[&[u8]]| -> Vec<Vec<u8>> { parts.iter().map(|p| p.to_vec()).collect() };
	let inputs: Vec<Vec<Vec<u8>>> = vec![
		p(&[b"\x01"]),
		p(&[b"\x00\x00", b"\x00\x00"]),
		p(&[b"\x00\x00\x00", b"\x00"]),
		p(&[b"\x00\x00"]),
		p(&[b""]),
		p(&[b"", b""]),
		p(&[b"\x00"]),
		p(&[b"\x00\x00", b"", b""]),
	];
	for kp in &inputs {
		ds.put_raw(Key::Path(kp.clone()), b"v".to_vec(), false).await.unwrap();
	}

	let mut it = ds.iterator(vec![], IteratorOptions { values: false, ..Default::default() }).unwrap();
	let mut order = Vec::new();
	while let Some(entry) = it.next().unwrap() {
		let kp = entry.key.unwrap();
		order.push(inputs.iter().position(|i| i == &kp).unwrap());
	}
	it.end();
	assert_eq!(order, vec![5, 7, 1, 2, 4, 6, 3, 0]);
}

#[tokio::test]
async fn snapshot_isolation() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;

	let mut t1 = ds.transaction(false).unwrap();
	let mut t2 = ds.transaction(true).unwrap();

	t2.as_mut().put_raw("hello", b"world".to_vec()).unwrap();
	t2.release().unwrap();

	assert_eq!(t1.as_mut().get_raw("hello").unwrap(), None);
	t1.release().unwrap();

	let mut t3 = ds.transaction(false).unwrap();
	assert_eq!(t3.as_mut().get_raw("hello").unwrap(), Some(b"world".to_vec()));
	t3.release().unwrap();
}

#[tokio::test]
async fn read_your_writes_with_delete() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;
	ds.put_raw("hello", b"world".to_vec(), false).await.unwrap();

	let mut t = ds.transaction(true).unwrap();
	t.as_mut().put_raw("hello", b"another".to_vec()).unwrap();
	t.as_mut().del("hello").unwrap();
	assert_eq!(t.as_mut().get_raw("hello").unwrap(), None);

	// Outside the transaction the pre-transaction value is still visible.
	assert_eq!(ds.get_raw("hello").await.unwrap(), Some(b"world".to_vec()));

	t.release().unwrap();
	assert_eq!(ds.get_raw("hello").await.unwrap(), None);
}

#[tokio::test]
async fn conflict() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;

	let mut t1 = ds.transaction(true).unwrap();
	let mut t2 = ds.transaction(true).unwrap();
	t1.as_mut().put_raw("k", b"v1".to_vec()).unwrap();
	t2.as_mut().put_raw("k", b"v2".to_vec()).unwrap();

	t1.release().unwrap();

	// Hooks run inside commit/rollback; observe them via a shared flag since
	// `release` consumes the guard before a capture could be inspected.
	let failure_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
	let finally_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
	{
		let f = failure_flag.clone();
		t2.as_mut().on_failure(Box::new(move |_| {
			f.store(true, std::sync::atomic::Ordering::SeqCst);
		}));
	}
	{
		let f = finally_flag.clone();
		t2.as_mut().on_finally(Box::new(move |_| {
			f.store(true, std::sync::atomic::Ordering::SeqCst);
		}));
	}
	let result = t2.release();
	assert!(matches!(result, Err(Error::Conflict)));
	assert!(failure_flag.load(std::sync::atomic::Ordering::SeqCst));
	assert!(finally_flag.load(std::sync::atomic::Ordering::SeqCst));

	assert_eq!(ds.get_raw("k").await.unwrap(), Some(b"v1".to_vec()));
}

#[tokio::test]
async fn canary() {
	let dir = tempdir().unwrap();
	let path = dir.path();
	let key1 = ChaCha20Poly1305Suite::new([1u8; 32]);
	let key2 = ChaCha20Poly1305Suite::new([2u8; 32]);

	{
		let mut ds = Datastore::new(path, Config { crypto: Some(Arc::new(key1)), ..Default::default() });
		ds.start().await.unwrap();
		ds.put_raw("hello", b"world".to_vec(), false).await.unwrap();
		ds.stop().await.unwrap();
	}

	{
		let mut ds = Datastore::new(path, Config { crypto: Some(Arc::new(key2)), ..Default::default() });
		let err = ds.start().await.unwrap_err();
		assert!(matches!(err, Error::KeyError));
	}

	let key1_again = ChaCha20Poly1305Suite::new([1u8; 32]);
	{
		let mut ds =
			Datastore::new(path, Config { crypto: Some(Arc::new(key1_again)), ..Default::default() });
		ds.start().await.unwrap();
		assert_eq!(ds.get_raw("hello").await.unwrap(), Some(b"world".to_vec()));
		ds.stop().await.unwrap();
	}
}

#[tokio::test]
async fn multireader() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;
	ds.put_raw("test", b"some text".to_vec(), false).await.unwrap();

	let mut t1 = ds.transaction(false).unwrap();
	let mut t2 = ds.transaction(false).unwrap();
	let mut t3 = ds.transaction(false).unwrap();

	assert_eq!(t1.as_mut().get_raw("test").unwrap(), Some(b"some text".to_vec()));
	assert_eq!(t2.as_mut().get_raw("test").unwrap(), Some(b"some text".to_vec()));
	assert_eq!(t3.as_mut().get_raw("test").unwrap(), Some(b"some text".to_vec()));

	t1.release().unwrap();
	t2.release().unwrap();
	t3.release().unwrap();
}

#[tokio::test]
async fn multiwriter_different_keys() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;
	ds.put_raw("test", b"some text".to_vec(), false).await.unwrap();

	let mut t1 = ds.transaction(true).unwrap();
	t1.as_mut().put_raw("test1", b"other text 1".to_vec()).unwrap();
	let mut t2 = ds.transaction(true).unwrap();
	t2.as_mut().put_raw("test2", b"other text 2".to_vec()).unwrap();
	let mut t3 = ds.transaction(true).unwrap();
	t3.as_mut().put_raw("test3", b"other text 3".to_vec()).unwrap();

	t1.release().unwrap();
	t2.release().unwrap();
	t3.release().unwrap();

	assert_eq!(ds.get_raw("test").await.unwrap(), Some(b"some text".to_vec()));
	assert_eq!(ds.get_raw("test1").await.unwrap(), Some(b"other text 1".to_vec()));
	assert_eq!(ds.get_raw("test2").await.unwrap(), Some(b"other text 2".to_vec()));
	assert_eq!(ds.get_raw("test3").await.unwrap(), Some(b"other text 3".to_vec()));
}

#[tokio::test]
async fn idempotent_rollback_and_iterator_end() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;

	let mut t = ds.transaction(true).unwrap();
	t.as_mut().put_raw("k", b"v".to_vec()).unwrap();
	t.fail();
	t.as_mut().rollback().unwrap();
	// Rolling back an already-rolled-back transaction does not error.
	t.as_mut().rollback().unwrap();
	drop(t);
	assert_eq!(ds.get_raw("k").await.unwrap(), None);

	let mut it = ds.iterator(vec![], IteratorOptions::default()).unwrap();
	it.end();
	it.end();
}

#[tokio::test]
async fn clear_deletes_within_the_given_level() {
	let dir = tempdir().unwrap();
	let ds = fresh(dir.path()).await;

	ds.put_raw(Key::Path(vec![b"users".to_vec(), b"1".to_vec()]), b"a".to_vec(), false)
		.await
		.unwrap();
	ds.put_raw(Key::Path(vec![b"users".to_vec(), b"2".to_vec()]), b"b".to_vec(), false)
		.await
		.unwrap();
	ds.put_raw(Key::Path(vec![b"other".to_vec()]), b"c".to_vec(), false).await.unwrap();

	let n = ds.clear(vec![b"users".to_vec()]).await.unwrap();
	assert_eq!(n, 2);

	assert_eq!(ds.count(vec![b"users".to_vec()]).await.unwrap(), 0);
	assert_eq!(ds.get_raw(Key::Path(vec![b"other".to_vec()])).await.unwrap(), Some(b"c".to_vec()));
}

#[tokio::test]
async fn dump_collects_entries_and_honours_raw() {
	let dir = tempdir().unwrap();
	let suite = ChaCha20Poly1305Suite::new([3u8; 32]);
	let mut ds = Datastore::new(dir.path(), Config { crypto: Some(Arc::new(suite)), ..Default::default() });
	ds.start().await.unwrap();
	ds.put_raw("hello", b"world".to_vec(), false).await.unwrap();

	let decoded = ds.dump(vec![], false, None).await.unwrap();
	assert_eq!(decoded, vec![(vec![b"hello".to_vec()], b"world".to_vec())]);

	let raw = ds.dump(vec![], true, None).await.unwrap();
	assert_eq!(raw.len(), 1);
	assert_ne!(raw[0].1, b"world".to_vec());
}
