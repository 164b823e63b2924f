//! Integration tests for the local-directory object store
//!
//! These exercise the same [`ObjectStore`] surface the pipeline and the API
//! use, so behaviour verified here holds for the S3 backend's callers too.

use terc_common::layout;
use terc_common::storage::{connect, sha256_hex, LocalStorage, ObjectStore, StorageConfig};
use terc_common::ReportingPeriod;

#[tokio::test]
async fn test_put_get_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStorage::new(dir.path()).await.unwrap();

    let period: ReportingPeriod = "2024-01".parse().unwrap();
    let key = layout::raw_partition_key(&period);
    let result = store.put(&key, b"first".to_vec()).await.unwrap();

    assert_eq!(result.key, key);
    assert_eq!(result.size, 5);
    assert_eq!(result.checksum, sha256_hex(b"first"));
    assert!(store.exists(&key).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), b"first");
}

#[tokio::test]
async fn test_put_overwrites_whole_object() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStorage::new(dir.path()).await.unwrap();

    store.put("a/b.bin", b"a much longer first version".to_vec()).await.unwrap();
    store.put("a/b.bin", b"v2".to_vec()).await.unwrap();

    assert_eq!(store.get("a/b.bin").await.unwrap(), b"v2");

    // no temporary leftovers next to the object
    let entries: Vec<_> = std::fs::read_dir(dir.path().join("a"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["b.bin".to_string()]);
}

#[tokio::test]
async fn test_put_file_and_download_to() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStorage::new(dir.path().join("store")).await.unwrap();

    let source = dir.path().join("snapshot.duckdb");
    std::fs::write(&source, vec![7u8; 100_000]).unwrap();

    let result = store.put_file("terceirizados/gold/x.duckdb", &source).await.unwrap();
    assert_eq!(result.size, 100_000);
    assert_eq!(result.checksum, sha256_hex(&vec![7u8; 100_000]));

    let dest = dir.path().join("copy.duckdb");
    let copied = store.download_to("terceirizados/gold/x.duckdb", &dest).await.unwrap();
    assert_eq!(copied, 100_000);
    assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 100_000]);
}

#[tokio::test]
async fn test_missing_object() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStorage::new(dir.path()).await.unwrap();

    assert!(!store.exists("nothing/here").await.unwrap());
    assert!(store.get("nothing/here").await.is_err());
    assert!(store
        .download_to("nothing/here", &dir.path().join("out"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_connect_selects_local_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect(StorageConfig::for_local(dir.path())).await.unwrap();

    assert!(!store.ensure_bucket().await.unwrap());
    assert!(store.describe("k").starts_with("file://"));
    store.put("k", b"x".to_vec()).await.unwrap();
    assert!(dir.path().join("k").exists());
}
