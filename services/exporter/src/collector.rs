use crate::error::{ExporterError, Result};
use crate::storage::{ObjectRecord, ObjectStorage, StorageConnector};
use crate::target::BucketTarget;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, trace};

/// Reduction of one bucket's object listing
///
/// `newest_modified` and `oldest_modified` are both `None` exactly when the
/// bucket held no object carrying a timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketAggregate {
    pub total_size_bytes: u64,
    pub object_count: u64,
    pub newest_modified: Option<DateTime<Utc>>,
    pub oldest_modified: Option<DateTime<Utc>>,
}

impl BucketAggregate {
    /// Fold one object into the aggregate
    pub fn record(&mut self, object: &ObjectRecord) {
        self.total_size_bytes = self.total_size_bytes.saturating_add(object.size);
        self.object_count += 1;

        if let Some(modified) = object.last_modified {
            self.newest_modified = Some(match self.newest_modified {
                Some(newest) => newest.max(modified),
                None => modified,
            });
            self.oldest_modified = Some(match self.oldest_modified {
                Some(oldest) => oldest.min(modified),
                None => modified,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.object_count == 0
    }
}

impl Extend<ObjectRecord> for BucketAggregate {
    fn extend<I: IntoIterator<Item = ObjectRecord>>(&mut self, iter: I) {
        for object in iter {
            self.record(&object);
        }
    }
}

impl FromIterator<ObjectRecord> for BucketAggregate {
    fn from_iter<I: IntoIterator<Item = ObjectRecord>>(iter: I) -> Self {
        let mut aggregate = Self::default();
        aggregate.extend(iter);
        aggregate
    }
}

/// Lazily fetch a bucket's listing page by page, following continuation tokens
pub fn object_pages<'a>(
    storage: &'a dyn ObjectStorage,
    bucket: &'a str,
) -> impl Stream<Item = Result<Vec<ObjectRecord>>> + Send + 'a {
    // State: Some(token) while pages remain, token None for the first request
    stream::try_unfold(Some(None::<String>), move |state| async move {
        let Some(token) = state else {
            return Ok(None);
        };

        let page = storage.list_objects_page(bucket, token).await?;
        trace!(bucket, objects = page.objects.len(), "Fetched listing page");

        let next = page.next_token.map(Some);
        Ok::<_, ExporterError>(Some((page.objects, next)))
    })
}

/// Stream a bucket's listing into a [`BucketAggregate`]
pub async fn aggregate_bucket(
    storage: &dyn ObjectStorage,
    bucket: &str,
) -> Result<BucketAggregate> {
    object_pages(storage, bucket)
        .try_fold(BucketAggregate::default(), |mut aggregate, objects| async move {
            aggregate.extend(objects);
            Ok(aggregate)
        })
        .await
}

/// Collects per-bucket metrics for resolved targets
pub struct BucketCollector {
    connector: Arc<dyn StorageConnector>,
    timeout: Duration,
}

impl BucketCollector {
    pub fn new(connector: Arc<dyn StorageConnector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    /// Collect one target, bounded by the per-target timeout
    ///
    /// Errors are logged here; callers only need to skip publishing.
    #[instrument(skip(self, target), fields(bucket = %target.bucket, profile = %target.profile.label()))]
    pub async fn collect(&self, target: &BucketTarget) -> Result<BucketAggregate> {
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.scan(target)).await {
            Ok(result) => result,
            Err(_) => Err(ExporterError::Timeout {
                bucket: target.bucket.clone(),
                after: self.timeout,
            }),
        };

        match &result {
            Ok(aggregate) => debug!(
                size_bytes = aggregate.total_size_bytes,
                objects = aggregate.object_count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Bucket collected"
            ),
            Err(e) => error!(error = %e, "Error collecting metrics for bucket"),
        }

        result
    }

    async fn scan(&self, target: &BucketTarget) -> Result<BucketAggregate> {
        let storage = self.connector.connect(&target.profile).await?;
        aggregate_bucket(storage.as_ref(), &target.bucket).await
    }
}
