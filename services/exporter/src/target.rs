//! Bucket targets and the strategies that resolve them each cycle.

use crate::config::{BucketFile, DiscoveryConfig};
use crate::error::{ConfigError, ExporterError};
use crate::storage::StorageConnector;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Number of trailing access key characters used as the profile label
const PROFILE_LABEL_LEN: usize = 4;

/// Credentials and connection settings for one storage account
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialProfile {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Provider default region when unset
    pub region: Option<String>,
    /// Custom endpoint (MinIO, Ceph, ...), provider default when unset
    pub endpoint_url: Option<String>,
    /// Path-style addressing, defaults to on for custom endpoints
    pub force_path_style: Option<bool>,
}

impl CredentialProfile {
    /// Short, non-secret label distinguishing profiles: the access key's last four characters
    pub fn label(&self) -> String {
        let chars: Vec<char> = self.access_key_id.chars().collect();
        let start = chars.len().saturating_sub(PROFILE_LABEL_LEN);
        chars[start..].iter().collect()
    }

    pub fn path_style(&self) -> bool {
        self.force_path_style.unwrap_or(self.endpoint_url.is_some())
    }
}

impl fmt::Debug for CredentialProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProfile")
            .field("access_key_id", &format_args!("***{}", self.label()))
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// One bucket to scan together with the credentials used to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTarget {
    pub bucket: String,
    pub profile: CredentialProfile,
}

impl BucketTarget {
    pub fn new(bucket: impl Into<String>, profile: CredentialProfile) -> Self {
        Self {
            bucket: bucket.into(),
            profile,
        }
    }
}

/// Produces the targets for the current cycle
///
/// Implementations never fail: configuration and listing errors are logged and
/// degrade to an empty target set.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self) -> Vec<BucketTarget>;

    /// Whether published series carry the credential profile label
    fn labels_profile(&self) -> bool;
}

/// Reads named buckets with per-bucket credentials from a YAML document
pub struct StaticListResolver {
    path: PathBuf,
}

impl StaticListResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<BucketFile, ConfigError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", self.path.display(), e)))?;
        BucketFile::parse(&text)
    }
}

#[async_trait]
impl TargetResolver for StaticListResolver {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn resolve(&self) -> Vec<BucketTarget> {
        let file = match self.load().await {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "Error loading bucket configuration");
                return Vec::new();
            }
        };

        let targets: Vec<BucketTarget> = file
            .entries()
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let bucket = entry
                    .as_ref()
                    .ok()
                    .and_then(|e| e.name.clone())
                    .unwrap_or_else(|| "<unnamed>".to_string());

                match entry.and_then(|e| e.to_target()) {
                    Ok(target) => Some(target),
                    Err(e) => {
                        warn!(index, bucket = %bucket, error = %e, "Skipping invalid bucket entry");
                        None
                    }
                }
            })
            .collect();

        debug!(count = targets.len(), "Resolved static bucket targets");
        targets
    }

    fn labels_profile(&self) -> bool {
        true
    }
}

/// Lists every bucket reachable with one shared credential profile
pub struct DiscoveryResolver {
    /// Fixed profile, re-read from the environment each cycle when unset
    profile: Option<CredentialProfile>,
    connector: Arc<dyn StorageConnector>,
}

impl DiscoveryResolver {
    /// Resolver reading its credentials from the environment every cycle
    pub fn from_env(connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            profile: None,
            connector,
        }
    }

    pub fn with_profile(profile: CredentialProfile, connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            profile: Some(profile),
            connector,
        }
    }

    async fn discover(&self) -> Result<Vec<BucketTarget>, ExporterError> {
        let profile = match &self.profile {
            Some(profile) => profile.clone(),
            None => DiscoveryConfig::from_env()?.profile,
        };

        let storage = self.connector.connect(&profile).await?;
        let names = storage.list_buckets().await?;

        info!(count = names.len(), "Discovered buckets");

        Ok(names
            .into_iter()
            .map(|name| BucketTarget::new(name, profile.clone()))
            .collect())
    }
}

#[async_trait]
impl TargetResolver for DiscoveryResolver {
    #[instrument(skip(self))]
    async fn resolve(&self) -> Vec<BucketTarget> {
        match self.discover().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(error = %e, "Error discovering buckets");
                Vec::new()
            }
        }
    }

    fn labels_profile(&self) -> bool {
        false
    }
}
