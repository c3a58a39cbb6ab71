//! Draining a bucket: paginated listing, bounded concurrent deletes and
//! partial-failure reporting.

use std::{collections::HashSet, sync::Arc};

use serde::{Serialize, Serializer};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    credentials::StoreCredentials,
    error::{ClearError, StoreError},
    store::{ObjectStore, S3Store},
};

pub const DEFAULT_CONCURRENCY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOptions {
    /// Upper bound on delete calls in flight at once.
    pub concurrency: usize,
}

impl Default for ClearOptions {
    fn default() -> Self {
        ClearOptions {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ClearOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        ClearOptions {
            concurrency: concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    Deleted,
    Failed(StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub key: String,
    #[serde(serialize_with = "display")]
    pub reason: StoreError,
}

/// Totals for one drain. `deleted + failures.len()` is the number of keys
/// a delete was attempted for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearResult {
    pub deleted: usize,
    pub failures: Vec<DeleteFailure>,
}

impl ClearResult {
    pub fn attempted(&self) -> usize {
        self.deleted + self.failures.len()
    }

    fn record(&mut self, key: String, outcome: DeletionOutcome) {
        match outcome {
            DeletionOutcome::Deleted => self.deleted += 1,
            DeletionOutcome::Failed(reason) => {
                warn!("failed to delete {}: {}", key, reason);
                self.failures.push(DeleteFailure { key, reason });
            }
        }
    }
}

fn display<S: Serializer>(reason: &StoreError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(reason)
}

/// Deletes every object in a bucket through an [`ObjectStore`].
pub struct BulkDeleter<S> {
    store: Arc<S>,
    options: ClearOptions,
}

impl<S: ObjectStore + 'static> BulkDeleter<S> {
    pub fn new(store: Arc<S>, options: ClearOptions) -> Self {
        BulkDeleter {
            store,
            options: ClearOptions::with_concurrency(options.concurrency),
        }
    }

    /// Drains `bucket`.
    ///
    /// Listing follows continuation tokens to the end of the bucket, then
    /// starts over from the beginning; the drain is finished once a whole
    /// pass lists nothing except keys whose delete already failed. Each page
    /// is deleted completely before the next one is listed. A key whose
    /// delete failed is never retried, so it appears in the failures once;
    /// a deleted key that shows up again is deleted again.
    ///
    /// Objects written by others while the drain runs may or may not be
    /// removed.
    pub async fn clear(
        &self,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<ClearResult, ClearError> {
        let mut result = ClearResult::default();
        let mut failed: HashSet<String> = HashSet::new();
        let mut token: Option<String> = None;
        let mut pass_had_work = false;
        let mut page_no = 0usize;

        loop {
            let listed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(self.cancelled(bucket, result));
                }
                listed = self.store.list_objects(bucket, token.take()) => listed,
            };
            let page = match listed {
                Ok(page) => page,
                Err(source) => {
                    return Err(ClearError::List {
                        bucket: bucket.to_owned(),
                        source,
                        partial: result,
                    });
                }
            };
            page_no += 1;

            let fresh: Vec<String> = page
                .keys
                .into_iter()
                .filter(|key| !failed.contains(key))
                .collect();
            debug!("page {} of {}: {} key(s) to delete", page_no, bucket, fresh.len());

            if !fresh.is_empty() {
                pass_had_work = true;
                let failures_before = result.failures.len();
                let interrupted = self.delete_page(bucket, fresh, cancel, &mut result).await;
                failed.extend(
                    result.failures[failures_before..]
                        .iter()
                        .map(|failure| failure.key.clone()),
                );
                if interrupted {
                    return Err(self.cancelled(bucket, result));
                }
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None if pass_had_work => pass_had_work = false,
                None => break,
            }
        }

        info!(
            "cleared {}: {} deleted, {} failed",
            bucket,
            result.deleted,
            result.failures.len()
        );
        if result.failures.is_empty() {
            Ok(result)
        } else {
            Err(ClearError::Aggregate {
                bucket: bucket.to_owned(),
                result,
            })
        }
    }

    /// Deletes one page of keys with at most `concurrency` calls in flight
    /// and waits for all of them. Returns true if cancellation stopped
    /// submission early.
    async fn delete_page(
        &self,
        bucket: &str,
        keys: Vec<String>,
        cancel: &CancellationToken,
        result: &mut ClearResult,
    ) -> bool {
        let limit = self.options.concurrency.min(keys.len());
        let mut tasks = JoinSet::new();
        let mut pending = HashSet::new();
        let mut interrupted = false;

        'submit: for key in keys {
            // A task holds its slot until it has been joined.
            while tasks.len() >= limit {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        interrupted = true;
                        break 'submit;
                    }
                    Some(joined) = tasks.join_next() => settle(joined, &mut pending, result),
                }
            }
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            pending.insert(key.clone());
            let store = self.store.clone();
            let bucket = bucket.to_owned();
            tasks.spawn(async move {
                let outcome = match store.delete_object(&bucket, &key).await {
                    Ok(()) => DeletionOutcome::Deleted,
                    Err(err) => DeletionOutcome::Failed(err),
                };
                (key, outcome)
            });
        }

        drain(&mut tasks, pending, result).await;
        interrupted
    }

    fn cancelled(&self, bucket: &str, partial: ClearResult) -> ClearError {
        info!(
            "clearing {} cancelled: {} deleted, {} failed",
            bucket,
            partial.deleted,
            partial.failures.len()
        );
        ClearError::Cancelled {
            bucket: bucket.to_owned(),
            partial,
        }
    }
}

type DeleteTasks = JoinSet<(String, DeletionOutcome)>;

fn settle(
    joined: Result<(String, DeletionOutcome), JoinError>,
    pending: &mut HashSet<String>,
    result: &mut ClearResult,
) {
    match joined {
        Ok((key, outcome)) => {
            pending.remove(&key);
            result.record(key, outcome);
        }
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => debug!("delete task ended without a result: {}", err),
    }
}

/// Waits for every task in `tasks`. Keys whose task ended without reporting
/// back are recorded as failures.
async fn drain(tasks: &mut DeleteTasks, mut pending: HashSet<String>, result: &mut ClearResult) {
    while let Some(joined) = tasks.join_next().await {
        settle(joined, &mut pending, result);
    }
    for key in pending {
        result.record(
            key,
            DeletionOutcome::Failed(StoreError::transport("delete task ended without a result")),
        );
    }
}

/// Opens a session for `creds`, drains its bucket and closes the session.
pub async fn clear_bucket(
    creds: &StoreCredentials,
    options: ClearOptions,
    cancel: CancellationToken,
) -> Result<ClearResult, ClearError> {
    let store = S3Store::connect(creds)
        .await
        .map_err(|source| ClearError::Session {
            endpoint: creds.endpoint().to_owned(),
            source,
        })?;
    BulkDeleter::new(Arc::new(store), options)
        .clear(creds.bucket(), &cancel)
        .await
}
