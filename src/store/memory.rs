use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Bound,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::error::StoreError;

use super::{ObjectPage, ObjectStore};

/// An in-process store with S3-like listing semantics.
///
/// Keys are listed in lexicographic order and continuation tokens mean
/// "start after this key", so deleting already-listed keys never shifts the
/// cursor. Failures can be injected per key (deletes) or per call (listing),
/// and delete concurrency is recorded so callers can check their bounds.
pub(crate) struct MemoryStore {
    page_size: usize,
    delete_latency: Option<Duration>,
    state: Mutex<MemoryState>,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

#[derive(Default)]
struct MemoryState {
    buckets: BTreeMap<String, BTreeSet<String>>,
    delete_failures: HashMap<String, StoreError>,
    list_failures: HashMap<usize, StoreError>,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        MemoryStore {
            page_size: page_size.max(1),
            delete_latency: None,
            state: Mutex::new(MemoryState::default()),
            list_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every delete sleeps this long before touching the bucket.
    pub fn with_delete_latency(mut self, latency: Duration) -> Self {
        self.delete_latency = Some(latency);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_owned()).or_default();
    }

    pub fn insert<I, K>(&self, bucket: &str, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut state = self.lock();
        let objects = state.buckets.entry(bucket.to_owned()).or_default();
        objects.extend(keys.into_iter().map(Into::into));
    }

    /// Deletes of `key` fail with `err` and leave the object in place.
    pub fn fail_delete(&self, key: impl Into<String>, err: StoreError) {
        self.lock().delete_failures.insert(key.into(), err);
    }

    /// The `call`th listing (1-based, counted across all buckets) fails with `err`.
    pub fn fail_list_call(&self, call: usize, err: StoreError) {
        self.lock().list_failures.insert(call, err);
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Highest number of deletes that were running at the same time.
    pub fn peak_concurrent_deletes(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Every update is a single map operation, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(
        &self,
        bucket: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage, StoreError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let state = self.lock();
        if let Some(err) = state.list_failures.get(&call) {
            return Err(err.clone());
        }
        let objects = state.buckets.get(bucket).ok_or_else(|| {
            StoreError::service("NoSuchBucket", format!("bucket {} does not exist", bucket))
        })?;

        let lower = match continuation {
            Some(token) => Bound::Excluded(token),
            None => Bound::Unbounded,
        };
        let mut remaining = objects.range((lower, Bound::Unbounded));
        let keys: Vec<String> = remaining.by_ref().take(self.page_size).cloned().collect();
        let next_token = match remaining.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };
        Ok(ObjectPage { keys, next_token })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = self.delete_latency {
            tokio::time::sleep(latency).await;
        }

        let result = {
            let mut state = self.lock();
            match state.delete_failures.get(key) {
                Some(err) => Err(err.clone()),
                None => match state.buckets.get_mut(bucket) {
                    Some(objects) => {
                        // Deleting a missing key succeeds, as on S3.
                        objects.remove(key);
                        Ok(())
                    }
                    None => Err(StoreError::service(
                        "NoSuchBucket",
                        format!("bucket {} does not exist", bucket),
                    )),
                },
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod test {
    use crate::error::StoreError;

    use crate::store::ObjectStore;

    use super::MemoryStore;

    #[tokio::test]
    async fn pages_follow_start_after_tokens() -> anyhow::Result<()> {
        let store = MemoryStore::new(2);
        store.insert("b", ["c", "a", "e", "b", "d"]);

        let first = store.list_objects("b", None).await?;
        assert_eq!(first.keys, vec!["a", "b"]);
        assert_eq!(first.next_token.as_deref(), Some("b"));

        let second = store.list_objects("b", first.next_token).await?;
        assert_eq!(second.keys, vec!["c", "d"]);

        let last = store.list_objects("b", second.next_token).await?;
        assert_eq!(last.keys, vec!["e"]);
        assert_eq!(last.next_token, None);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_listed_keys_keeps_cursor_valid() -> anyhow::Result<()> {
        let store = MemoryStore::new(2);
        store.insert("b", ["a", "b", "c"]);

        let first = store.list_objects("b", None).await?;
        for key in &first.keys {
            store.delete_object("b", key).await?;
        }
        let second = store.list_objects("b", first.next_token).await?;
        assert_eq!(second.keys, vec!["c"]);
        assert_eq!(store.keys("b"), vec!["c"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_bucket_lists_nothing() -> anyhow::Result<()> {
        let store = MemoryStore::new(10);
        store.create_bucket("b");
        let page = store.list_objects("b", None).await?;
        assert!(page.keys.is_empty());
        assert_eq!(page.next_token, None);
        Ok(())
    }

    #[tokio::test]
    async fn missing_bucket_errors() {
        let store = MemoryStore::new(10);
        let err = store.list_objects("nope", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Service { ref code, .. } if code == "NoSuchBucket"));
    }

    #[tokio::test]
    async fn injected_failures() -> anyhow::Result<()> {
        let store = MemoryStore::new(10);
        store.insert("b", ["a", "b"]);
        store.fail_delete("b", StoreError::service("AccessDenied", "access denied"));
        store.fail_list_call(2, StoreError::transport("timed out"));

        store.list_objects("b", None).await?;
        assert!(store.list_objects("b", None).await.is_err());
        store.list_objects("b", None).await?;

        store.delete_object("b", "a").await?;
        assert!(store.delete_object("b", "b").await.is_err());
        assert_eq!(store.keys("b"), vec!["b"]);
        assert_eq!(store.delete_calls(), 2);
        assert_eq!(store.list_calls(), 3);
        Ok(())
    }
}
