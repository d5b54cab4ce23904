//! In-memory store backends.
//!
//! Used for tests and dry runs. Both stores can inject failures and count
//! calls, so callers can assert that an operation was (or was not) attempted.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dicom_transfer_common::ProgressCallback;
use dicom_transfer_grouping::{GroupDocument, GroupId};

use crate::error::StorageError;
use crate::traits::{MetadataStore, ObjectInfo, ObjectStore};
use crate::types::{OperationType, TransferProgress};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object store keeping objects in a map keyed by `(bucket, key)`.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    failing_puts: Mutex<Vec<String>>,
    failing_gets: Mutex<Vec<String>>,
    latency: Option<Duration>,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every put and get, to make concurrency observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail puts whose key contains `pattern`.
    pub fn fail_puts_matching(&self, pattern: impl Into<String>) {
        lock(&self.failing_puts).push(pattern.into());
    }

    /// Fail gets whose key contains `pattern`.
    pub fn fail_gets_matching(&self, pattern: impl Into<String>) {
        lock(&self.failing_gets).push(pattern.into());
    }

    /// Seed an object.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert((bucket.to_string(), key.to_string()), data.into());
    }

    /// Stored bytes of an object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Every key stored in a bucket, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Put attempts, including failed ones.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Get attempts, including failed ones.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Highest number of puts and gets observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(patterns: &Mutex<Vec<String>>, key: &str) -> bool {
        lock(patterns).iter().any(|p| key.contains(p.as_str()))
    }

    async fn enter(&self) {
        let now: usize = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn store(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<u64, StorageError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result: Result<u64, StorageError> = if Self::should_fail(&self.failing_puts, key) {
            Err(StorageError::NetworkError {
                message: format!("injected put failure for {key}"),
                retryable: false,
            })
        } else {
            let len: u64 = data.len() as u64;
            self.insert(bucket, key, data);
            Ok(len)
        };
        self.exit();
        result
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result: Result<Vec<u8>, StorageError> = if Self::should_fail(&self.failing_gets, key) {
            Err(StorageError::NetworkError {
                message: format!("injected get failure for {key}"),
                retryable: false,
            })
        } else {
            self.object(bucket, key).ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        };
        self.exit();
        result
    }
}

fn report(
    progress: Option<&dyn ProgressCallback<TransferProgress>>,
    operation: OperationType,
    key: &str,
    bytes: u64,
) {
    if let Some(cb) = progress {
        cb.on_progress(&TransferProgress {
            operation,
            key: key.to_string(),
            bytes_transferred: bytes,
            total_bytes: Some(bytes),
        });
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, StorageError> {
        Ok(self.object(bucket, key).map(|data| data.len() as u64))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        _content_type: Option<&str>,
    ) -> Result<u64, StorageError> {
        self.store(bucket, key, data.to_vec()).await
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<u64, StorageError> {
        let data: Vec<u8> = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io(path.display(), e))?;
        let written: u64 = self.store(bucket, key, data).await?;
        report(progress, OperationType::Uploading, key, written);
        Ok(written)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.fetch(bucket, key).await
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<u64, StorageError> {
        let data: Vec<u8> = self.fetch(bucket, key).await?;
        tokio::fs::write(path, &data)
            .await
            .map_err(|e| StorageError::io(path.display(), e))?;
        let written: u64 = data.len() as u64;
        report(progress, OperationType::Downloading, key, written);
        Ok(written)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        lock(&self.objects).remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        Ok(lock(&self.objects)
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), data)| ObjectInfo {
                key: k.clone(),
                size: data.len() as u64,
                last_modified: None,
                etag: None,
            })
            .collect())
    }
}

#[derive(Debug, Default, Clone)]
struct GroupEntry {
    document: Option<GroupDocument>,
    locations: BTreeSet<String>,
}

/// Metadata store keeping tables in memory.
///
/// Tables must be created with `ensure_table` before use, like a real
/// key-value service.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    tables: Mutex<BTreeMap<String, BTreeMap<GroupId, GroupEntry>>>,
    failing_documents: Mutex<BTreeSet<GroupId>>,
    failing_appends: Mutex<Vec<String>>,
    ensure_calls: AtomicUsize,
    document_writes: AtomicUsize,
    append_calls: AtomicUsize,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail document writes for a group.
    pub fn fail_documents_for(&self, group_id: &GroupId) {
        lock(&self.failing_documents).insert(group_id.clone());
    }

    /// Fail appends of locations containing `pattern`.
    pub fn fail_appends_matching(&self, pattern: impl Into<String>) {
        lock(&self.failing_appends).push(pattern.into());
    }

    /// Stored document of a group.
    pub fn document(&self, table: &str, group_id: &GroupId) -> Option<GroupDocument> {
        lock(&self.tables)
            .get(table)
            .and_then(|groups| groups.get(group_id))
            .and_then(|entry| entry.document.clone())
    }

    /// Groups with a stored document, sorted.
    pub fn groups(&self, table: &str) -> Vec<GroupId> {
        lock(&self.tables)
            .get(table)
            .map(|groups| {
                groups
                    .iter()
                    .filter(|(_, entry)| entry.document.is_some())
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// Document write attempts, including failed ones.
    pub fn document_writes(&self) -> usize {
        self.document_writes.load(Ordering::SeqCst)
    }

    /// Location append attempts, including failed ones.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut BTreeMap<GroupId, GroupEntry>) -> R,
    ) -> Result<R, StorageError> {
        let mut tables = lock(&self.tables);
        let groups = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::InvalidConfig {
                message: format!("table {table} does not exist"),
            })?;
        Ok(f(groups))
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn ensure_table(&self, table: &str) -> Result<(), StorageError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.tables).entry(table.to_string()).or_default();
        Ok(())
    }

    async fn put_group_document(
        &self,
        table: &str,
        group_id: &GroupId,
        document: &GroupDocument,
    ) -> Result<(), StorageError> {
        self.document_writes.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_documents).contains(group_id) {
            return Err(StorageError::NetworkError {
                message: format!("injected document failure for {group_id}"),
                retryable: false,
            });
        }
        self.with_table(table, |groups| {
            groups.entry(group_id.clone()).or_default().document = Some(document.clone());
        })
    }

    async fn get_group_document(
        &self,
        table: &str,
        group_id: &GroupId,
    ) -> Result<GroupDocument, StorageError> {
        self.with_table(table, |groups| {
            groups.get(group_id).and_then(|entry| entry.document.clone())
        })?
        .ok_or_else(|| StorageError::DocumentNotFound {
            table: table.to_string(),
            group_id: group_id.to_string(),
        })
    }

    async fn append_location(
        &self,
        table: &str,
        group_id: &GroupId,
        location: &str,
    ) -> Result<(), StorageError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_appends)
            .iter()
            .any(|p| location.contains(p.as_str()))
        {
            return Err(StorageError::NetworkError {
                message: format!("injected append failure for {location}"),
                retryable: false,
            });
        }
        self.with_table(table, |groups| {
            groups
                .entry(group_id.clone())
                .or_default()
                .locations
                .insert(location.to_string());
        })
    }

    async fn get_locations(&self, table: &str, group_id: &GroupId) -> Result<Vec<String>, StorageError> {
        self.with_table(table, |groups| {
            groups
                .get(group_id)
                .map(|entry| entry.locations.iter().cloned().collect())
                .unwrap_or_default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn gid(s: &str) -> GroupId {
        GroupId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_object_round_trip_through_files() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.dcm");
        let dst = dir.path().join("dst.dcm");
        std::fs::write(&src, b"pixels").unwrap();

        let store = InMemoryObjectStore::new();
        assert_eq!(store.put_object_from_file("b", "studies/1/src.dcm", &src, None).await.unwrap(), 6);
        assert_eq!(store.head_object("b", "studies/1/src.dcm").await.unwrap(), Some(6));
        assert_eq!(store.get_object_to_file("b", "studies/1/src.dcm", &dst, None).await.unwrap(), 6);
        assert_eq!(std::fs::read(&dst).unwrap(), b"pixels");
        assert_eq!(store.put_calls(), 1);
        assert_eq!(store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_object_and_injected_failures() {
        let store = InMemoryObjectStore::new();
        let err = store.get_object("b", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));

        store.fail_puts_matching("bad");
        assert!(store.put_object("b", "k/bad.dcm", b"x", None).await.is_err());
        assert!(store.put_object("b", "k/good.dcm", b"x", None).await.is_ok());
        assert_eq!(store.keys("b"), vec!["k/good.dcm".to_string()]);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = InMemoryObjectStore::new();
        store.insert("b", "studies/1/a", b"1".to_vec());
        store.insert("b", "studies/2/b", b"22".to_vec());
        store.insert("other", "studies/1/c", b"3".to_vec());

        let listed = store.list_objects("b", "studies/1/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "studies/1/a");

        store.delete_object("b", "studies/1/a").await.unwrap();
        store.delete_object("b", "studies/1/a").await.unwrap();
        assert!(store.list_objects("b", "studies/1/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_requires_table() {
        let store = InMemoryMetadataStore::new();
        let err = store.get_locations("t", &gid("1")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig { .. }));

        store.ensure_table("t").await.unwrap();
        store.ensure_table("t").await.unwrap();
        assert_eq!(store.ensure_calls(), 2);
        assert!(store.get_locations("t", &gid("1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_and_locations() {
        let store = InMemoryMetadataStore::new();
        store.ensure_table("t").await.unwrap();
        let group = gid("1.2.3");

        let err = store.get_group_document("t", &group).await.unwrap_err();
        assert!(matches!(err, StorageError::DocumentNotFound { .. }));

        let mut document = GroupDocument::new();
        document.insert("Modality".into(), Value::String("CT".into()));
        store.put_group_document("t", &group, &document).await.unwrap();
        store.append_location("t", &group, "studies/1.2.3/a").await.unwrap();
        store.append_location("t", &group, "studies/1.2.3/a").await.unwrap();
        store.append_location("t", &group, "studies/1.2.3/b").await.unwrap();

        // Rewriting the document keeps the recorded locations.
        store.put_group_document("t", &group, &document).await.unwrap();

        assert_eq!(store.get_group_document("t", &group).await.unwrap(), document);
        assert_eq!(
            store.get_locations("t", &group).await.unwrap(),
            vec!["studies/1.2.3/a".to_string(), "studies/1.2.3/b".to_string()]
        );
        assert_eq!(store.groups("t"), vec![group]);
    }

    #[tokio::test]
    async fn test_injected_document_failure() {
        let store = InMemoryMetadataStore::new();
        store.ensure_table("t").await.unwrap();
        let group = gid("9");
        store.fail_documents_for(&group);

        assert!(store
            .put_group_document("t", &group, &GroupDocument::new())
            .await
            .is_err());
        assert_eq!(store.document_writes(), 1);
        assert!(store.document("t", &group).is_none());
    }
}
