use crate::error::{ExporterError, Result};
use crate::target::CredentialProfile;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

const DEFAULT_REGION: &str = "us-east-1";

/// Size and modification time of one listed object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRecord {
    pub size: u64,
    /// Absent when the provider omits it
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of an object listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub objects: Vec<ObjectRecord>,
    /// Continuation token for the following page, `None` on the last page
    pub next_token: Option<String>,
}

/// Read-only view of an object store reached with one credential profile
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Names of all buckets visible to the credentials
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Fetch one page of a bucket's object listing
    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage>;
}

/// Builds storage clients for credential profiles
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(&self, profile: &CredentialProfile) -> Result<Arc<dyn ObjectStorage>>;
}

/// Connector producing S3 clients with static credentials
#[derive(Debug, Default, Clone)]
pub struct S3Connector;

impl S3Connector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageConnector for S3Connector {
    async fn connect(&self, profile: &CredentialProfile) -> Result<Arc<dyn ObjectStorage>> {
        Ok(Arc::new(S3Storage::new(profile)))
    }
}

/// S3 (or S3-compatible) object storage client
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    /// Create a client for the given credential profile
    ///
    /// Only the profile's own settings apply; ambient AWS environment
    /// variables and shared config files are not consulted.
    pub fn new(profile: &CredentialProfile) -> Self {
        let region = profile
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let credentials = Credentials::new(
            profile.access_key_id.clone(),
            profile.secret_access_key.clone(),
            None,
            None,
            "s3-bucket-exporter",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials);

        // Custom endpoint for MinIO/Ceph and other S3-compatible stores
        if let Some(ref endpoint_url) = profile.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if profile.path_style() {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        debug!(
            profile = %profile.label(),
            endpoint = profile.endpoint_url.as_deref().unwrap_or("default"),
            "S3 client initialized"
        );

        Self { client }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    #[instrument(skip(self))]
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| {
                ExporterError::target_access("*", DisplayErrorContext(&e).to_string())
            })?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(String::from))
            .collect())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ObjectPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| {
                ExporterError::target_access(bucket, DisplayErrorContext(&e).to_string())
            })?;

        let objects = response.contents().iter().map(to_record).collect();

        let next_token = match response.is_truncated() {
            Some(true) => response.next_continuation_token().map(String::from),
            _ => None,
        };

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }
}

/// Convert an S3 object descriptor, treating a missing or negative size as empty
fn to_record(object: &Object) -> ObjectRecord {
    ObjectRecord {
        size: object
            .size()
            .and_then(|size| u64::try_from(size).ok())
            .unwrap_or(0),
        last_modified: object
            .last_modified()
            .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
    }
}
