use crate::error::ConfigError;
use crate::target::{BucketTarget, CredentialProfile};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable overriding the bucket list location
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Main configuration for the exporter service
#[derive(Debug, Clone)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// How the set of buckets to scan is produced
    pub mode: ResolverMode,
    /// Path of the static bucket list document
    pub buckets_file: String,
}

/// Service-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port of the metrics exposition listener
    pub metrics_port: u16,
    /// Pause between two collection cycles in seconds
    pub collection_interval_secs: u64,
    /// Upper bound for collecting a single bucket in seconds
    pub target_timeout_secs: u64,
}

/// Target resolution strategy
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// Named buckets, each with its own credentials, from the bucket list document
    #[default]
    Static,
    /// Every bucket visible to one credential set from the environment
    Discovery,
}

fn default_service_name() -> String {
    "s3-bucket-exporter".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9000
}

fn default_collection_interval_secs() -> u64 {
    60
}

fn default_target_timeout_secs() -> u64 {
    300
}

fn default_buckets_file() -> String {
    "config.yaml".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Config {
    /// Load configuration from config files and environment
    ///
    /// Never fails as a whole: each setting that cannot be read keeps its
    /// default and is reported in the returned list.
    pub fn load() -> (Self, Vec<ConfigError>) {
        Self::load_from(std::env::vars().collect())
    }

    fn load_from(vars: HashMap<String, String>) -> (Self, Vec<ConfigError>) {
        let mut problems = Vec::new();

        let environment = config::Environment::with_prefix("EXPORTER")
            .separator("__")
            .try_parsing(true)
            .source(Some(vars.clone()));
        let buckets_file = vars.get(CONFIG_FILE_ENV).cloned();

        let source = config::Config::builder()
            .add_source(config::File::with_name("config/exporter").required(false))
            .add_source(config::File::with_name("/etc/s3-exporter/exporter").required(false))
            // EXPORTER__SERVICE__METRICS_PORT -> service.metrics_port
            .add_source(environment.clone())
            .set_override_option("buckets_file", buckets_file.clone())
            .and_then(|builder| builder.build())
            .or_else(|e| {
                // A broken config file must not hide the environment
                problems.push(ConfigError::Load(e.to_string()));
                config::Config::builder()
                    .add_source(environment)
                    .set_override_option("buckets_file", buckets_file)
                    .and_then(|builder| builder.build())
            })
            .unwrap_or_default();

        let mut read = FieldReader {
            source: &source,
            problems: &mut problems,
        };

        let config = Self {
            service: ServiceConfig {
                name: read.get("service.name", default_service_name),
                log_level: read.get("service.log_level", default_log_level),
                metrics_port: read.get("service.metrics_port", default_metrics_port),
                collection_interval_secs: read.get(
                    "service.collection_interval_secs",
                    default_collection_interval_secs,
                ),
                target_timeout_secs: read
                    .get("service.target_timeout_secs", default_target_timeout_secs),
            },
            mode: read.get("mode", ResolverMode::default),
            buckets_file: read.get("buckets_file", default_buckets_file),
        };

        (config, problems)
    }

    /// Pause between two collection cycles
    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.service.collection_interval_secs)
    }

    /// Upper bound for collecting a single bucket
    pub fn target_timeout(&self) -> Duration {
        Duration::from_secs(self.service.target_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            mode: ResolverMode::default(),
            buckets_file: default_buckets_file(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
            collection_interval_secs: default_collection_interval_secs(),
            target_timeout_secs: default_target_timeout_secs(),
        }
    }
}

/// Reads settings one by one, falling back to the default when absent or invalid
struct FieldReader<'a> {
    source: &'a config::Config,
    problems: &'a mut Vec<ConfigError>,
}

impl FieldReader<'_> {
    fn get<T: DeserializeOwned>(&mut self, key: &str, default: impl FnOnce() -> T) -> T {
        match self.source.get::<T>(key) {
            Ok(value) => value,
            Err(config::ConfigError::NotFound(_)) => default(),
            Err(e) => {
                self.problems.push(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                });
                default()
            }
        }
    }
}

/// Static bucket list document
///
/// Entries stay raw until [`BucketFile::entries`] so that one malformed item
/// does not invalidate the others.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketFile {
    #[serde(default)]
    buckets: Vec<config::Value>,
}

/// One bucket entry as written by the operator
///
/// Every field is optional at parse time so that a single incomplete entry
/// does not invalidate the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketEntry {
    pub name: Option<String>,
    #[serde(alias = "aws_access_key_id")]
    pub access_key_id: Option<String>,
    #[serde(alias = "aws_secret_access_key")]
    pub secret_access_key: Option<String>,
    #[serde(alias = "region_name")]
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: Option<bool>,
}

impl BucketFile {
    /// Parse a YAML bucket list document
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Decode every entry on its own, in document order
    pub fn entries(&self) -> Vec<Result<BucketEntry, ConfigError>> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(index, value)| {
                value
                    .clone()
                    .try_deserialize()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: format!("buckets[{index}]"),
                        message: e.to_string(),
                    })
            })
            .collect()
    }
}

impl BucketEntry {
    /// Turn the entry into a scan target, naming the first missing field on failure
    pub fn to_target(&self) -> Result<BucketTarget, ConfigError> {
        let name = required(&self.name, "name")?;
        let access_key_id = required(&self.access_key_id, "access_key_id")?;
        let secret_access_key = required(&self.secret_access_key, "secret_access_key")?;

        let profile = CredentialProfile {
            access_key_id,
            secret_access_key,
            region: non_empty(&self.region),
            endpoint_url: non_empty(&self.endpoint_url),
            force_path_style: self.force_path_style,
        };

        Ok(BucketTarget::new(name, profile))
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, ConfigError> {
    non_empty(value).ok_or_else(|| ConfigError::MissingRequired(field.to_string()))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Shared credential profile for discovery mode
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub profile: CredentialProfile,
}

impl DiscoveryConfig {
    /// Load the shared credential profile from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let access_key_id = required(&lookup("AWS_ACCESS_KEY_ID"), "AWS_ACCESS_KEY_ID")?;
        let secret_access_key =
            required(&lookup("AWS_SECRET_ACCESS_KEY"), "AWS_SECRET_ACCESS_KEY")?;

        let profile = CredentialProfile {
            access_key_id,
            secret_access_key,
            region: Some(non_empty(&lookup("AWS_REGION")).unwrap_or_else(default_region)),
            endpoint_url: non_empty(&lookup("S3_ENDPOINT_URL")),
            force_path_style: None,
        };

        Ok(Self { profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.service.metrics_port, 9000);
        assert_eq!(config.collection_interval(), Duration::from_secs(60));
        assert_eq!(config.target_timeout(), Duration::from_secs(300));
        assert_eq!(config.mode, ResolverMode::Static);
        assert_eq!(config.buckets_file, "config.yaml");
    }

    #[test]
    fn test_parse_bucket_file() {
        let yaml = r#"
buckets:
  - name: logs
    access_key_id: AKIAEXAMPLEAB12
    secret_access_key: secret-one
    region: eu-west-1
  - name: backups
    aws_access_key_id: minio-CD34
    aws_secret_access_key: secret-two
    region_name: us-east-1
    endpoint_url: http://minio:9000
"#;
        let entries = BucketFile::parse(yaml).unwrap().entries();
        assert_eq!(entries.len(), 2);

        let first = entries[0].as_ref().unwrap().to_target().unwrap();
        assert_eq!(first.bucket, "logs");
        assert_eq!(first.profile.region.as_deref(), Some("eu-west-1"));
        assert_eq!(first.profile.endpoint_url, None);

        let second = entries[1].as_ref().unwrap().to_target().unwrap();
        assert_eq!(second.profile.access_key_id, "minio-CD34");
        assert_eq!(second.profile.endpoint_url.as_deref(), Some("http://minio:9000"));
    }

    #[test]
    fn test_entry_missing_required_field() {
        let entry = BucketEntry {
            name: Some("logs".into()),
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("   ".into()),
            ..Default::default()
        };

        assert_eq!(
            entry.to_target().unwrap_err(),
            ConfigError::MissingRequired("secret_access_key".into())
        );
    }

    #[test]
    fn test_parse_empty_and_malformed_documents() {
        assert!(BucketFile::parse("").unwrap().is_empty());
        assert!(BucketFile::parse("buckets: [unclosed").is_err());
    }

    #[test]
    fn test_malformed_entry_keeps_its_neighbours() {
        let yaml = r#"
buckets:
  - name: ok
    access_key_id: K-AB12
    secret_access_key: s
  - just-a-string
  - name: typo
    access_key_id: K-CD34
    secret_access_key: s
    force_path_style: maybe
  - name: also-ok
    access_key_id: K-EF56
    secret_access_key: s
"#;
        let file = BucketFile::parse(yaml).unwrap();
        assert_eq!(file.len(), 4);

        let entries = file.entries();
        assert_eq!(entries[0].as_ref().unwrap().name.as_deref(), Some("ok"));
        assert!(matches!(
            &entries[1],
            Err(ConfigError::InvalidValue { key, .. }) if key == "buckets[1]"
        ));
        assert!(matches!(
            &entries[2],
            Err(ConfigError::InvalidValue { key, .. }) if key == "buckets[2]"
        ));
        assert_eq!(entries[3].as_ref().unwrap().name.as_deref(), Some("also-ok"));
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_reads_environment() {
        let (config, problems) = Config::load_from(vars(&[
            ("CONFIG_FILE", "/srv/custom-buckets.yaml"),
            ("EXPORTER__MODE", "discovery"),
            ("EXPORTER__SERVICE__METRICS_PORT", "9100"),
            ("EXPORTER__SERVICE__COLLECTION_INTERVAL_SECS", "15"),
        ]));

        assert!(problems.is_empty(), "{problems:?}");
        assert_eq!(config.buckets_file, "/srv/custom-buckets.yaml");
        assert_eq!(config.mode, ResolverMode::Discovery);
        assert_eq!(config.service.metrics_port, 9100);
        assert_eq!(config.collection_interval(), Duration::from_secs(15));
        assert_eq!(config.target_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_setting_only_resets_that_setting() {
        let (config, problems) = Config::load_from(vars(&[
            ("CONFIG_FILE", "/srv/custom-buckets.yaml"),
            ("EXPORTER__MODE", "discovery"),
            ("EXPORTER__SERVICE__METRICS_PORT", "not-a-port"),
        ]));

        assert_eq!(config.buckets_file, "/srv/custom-buckets.yaml");
        assert_eq!(config.mode, ResolverMode::Discovery);
        assert_eq!(config.service.metrics_port, 9000);

        assert_eq!(problems.len(), 1);
        assert!(matches!(
            &problems[0],
            ConfigError::InvalidValue { key, .. } if key == "service.metrics_port"
        ));
    }

    #[test]
    fn test_unknown_mode_falls_back_to_static() {
        let (config, problems) = Config::load_from(vars(&[("EXPORTER__MODE", "magic")]));

        assert_eq!(config.mode, ResolverMode::Static);
        assert_eq!(config.buckets_file, "config.yaml");
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn test_discovery_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);
        let config =
            DiscoveryConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.profile.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.profile.endpoint_url, None);

        let missing = DiscoveryConfig::from_lookup(|_| None).unwrap_err();
        assert_eq!(missing, ConfigError::MissingRequired("AWS_ACCESS_KEY_ID".into()));
    }
}
