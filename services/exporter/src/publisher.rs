//! Gauge series published for each collected bucket.
//!
//! Values are written through the `metrics` facade and rendered by the
//! Prometheus recorder. A label combination, once written, stays exported with
//! its last value even after its target disappears from configuration.

use crate::collector::BucketAggregate;
use crate::target::BucketTarget;
use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, gauge, Label};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const CYCLES_TOTAL: &str = "s3_exporter_cycles_total";
pub const COLLECTION_ERRORS_TOTAL: &str = "s3_exporter_collection_errors_total";
pub const LAST_CYCLE_DURATION: &str = "s3_exporter_last_cycle_duration_seconds";
pub const TARGETS: &str = "s3_exporter_targets";

/// Exported per-bucket gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricSeries {
    BucketSize,
    ObjectCount,
    LastModified,
    OldestObject,
}

impl MetricSeries {
    pub const ALL: [MetricSeries; 4] = [
        MetricSeries::BucketSize,
        MetricSeries::ObjectCount,
        MetricSeries::LastModified,
        MetricSeries::OldestObject,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricSeries::BucketSize => "s3_bucket_size_bytes",
            MetricSeries::ObjectCount => "s3_bucket_object_count",
            MetricSeries::LastModified => "s3_bucket_last_modified_timestamp_seconds",
            MetricSeries::OldestObject => "s3_bucket_oldest_object_timestamp_seconds",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            MetricSeries::BucketSize => "Size of bucket in bytes",
            MetricSeries::ObjectCount => "Number of objects in bucket",
            MetricSeries::LastModified => "Timestamp of last modified object in bucket",
            MetricSeries::OldestObject => "Timestamp of oldest object in bucket",
        }
    }
}

/// Label values identifying one series instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesLabels {
    pub bucket_name: String,
    /// Credential profile label, only set for multi-credential deployments
    pub bucket_config: Option<String>,
}

impl SeriesLabels {
    pub fn for_target(target: &BucketTarget, with_profile: bool) -> Self {
        Self {
            bucket_name: target.bucket.clone(),
            bucket_config: with_profile.then(|| target.profile.label()),
        }
    }

    fn to_labels(&self) -> Vec<Label> {
        let mut labels = vec![Label::new("bucket_name", self.bucket_name.clone())];
        if let Some(ref config) = self.bucket_config {
            labels.push(Label::new("bucket_config", config.clone()));
        }
        labels
    }
}

/// Writes bucket gauges into the installed metrics recorder
#[derive(Clone)]
pub struct MetricsPublisher {
    handle: PrometheusHandle,
}

impl MetricsPublisher {
    /// Install the Prometheus recorder globally and describe all series
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_series();
        Ok(Self { handle })
    }

    /// Wrap a handle for rendering
    ///
    /// Writes still go through the `metrics` facade, so they land in whichever
    /// recorder is installed globally or set locally, not necessarily the one
    /// behind `handle`.
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Handle used by the exposition endpoint to render current values
    pub fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }

    /// Overwrite one series value for a label combination in the current recorder
    pub fn set(&self, series: MetricSeries, labels: &SeriesLabels, value: f64) {
        gauge!(series.name(), labels.to_labels()).set(value);
    }

    /// Publish an aggregate; timestamps of an empty bucket are left untouched
    pub fn publish(&self, labels: &SeriesLabels, aggregate: &BucketAggregate) {
        self.set(
            MetricSeries::BucketSize,
            labels,
            aggregate.total_size_bytes as f64,
        );
        self.set(
            MetricSeries::ObjectCount,
            labels,
            aggregate.object_count as f64,
        );

        if let Some(newest) = aggregate.newest_modified {
            self.set(MetricSeries::LastModified, labels, epoch_seconds(newest));
        }
        if let Some(oldest) = aggregate.oldest_modified {
            self.set(MetricSeries::OldestObject, labels, epoch_seconds(oldest));
        }
    }
}

/// Register HELP text for every series with the current recorder
pub fn describe_series() {
    for series in MetricSeries::ALL {
        describe_gauge!(series.name(), series.help());
    }
    describe_counter!(CYCLES_TOTAL, "Number of completed collection cycles");
    describe_counter!(
        COLLECTION_ERRORS_TOTAL,
        "Number of failed bucket collections"
    );
    describe_gauge!(
        LAST_CYCLE_DURATION,
        "Duration of the last collection cycle in seconds"
    );
    describe_gauge!(TARGETS, "Number of targets resolved in the last cycle");
}

fn epoch_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::CredentialProfile;
    use chrono::TimeZone;
    use metrics_exporter_prometheus::PrometheusRecorder;

    fn recorder() -> PrometheusRecorder {
        PrometheusBuilder::new().build_recorder()
    }

    fn labels(bucket: &str, config: Option<&str>) -> SeriesLabels {
        SeriesLabels {
            bucket_name: bucket.to_string(),
            bucket_config: config.map(String::from),
        }
    }

    #[test]
    fn test_publish_aggregate() {
        let recorder = recorder();
        let publisher = MetricsPublisher::new(recorder.handle());
        let newest = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
        let oldest = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();

        metrics::with_local_recorder(&recorder, || {
            publisher.publish(
                &labels("a", Some("AB12")),
                &BucketAggregate {
                    total_size_bytes: 30,
                    object_count: 2,
                    newest_modified: Some(newest),
                    oldest_modified: Some(oldest),
                },
            );
        });

        let rendered = publisher.handle().render();
        assert!(rendered.contains(r#"s3_bucket_size_bytes{bucket_name="a",bucket_config="AB12"} 30"#));
        assert!(rendered.contains(r#"s3_bucket_object_count{bucket_name="a",bucket_config="AB12"} 2"#));
        assert!(rendered.contains(
            r#"s3_bucket_last_modified_timestamp_seconds{bucket_name="a",bucket_config="AB12"} 1705314645"#
        ));
        assert!(rendered.contains(
            r#"s3_bucket_oldest_object_timestamp_seconds{bucket_name="a",bucket_config="AB12"} 1700000000"#
        ));
    }

    #[test]
    fn test_empty_bucket_omits_timestamps() {
        let recorder = recorder();
        let publisher = MetricsPublisher::new(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            publisher.publish(&labels("b", None), &BucketAggregate::default());
        });

        let rendered = publisher.handle().render();
        assert!(rendered.contains(r#"s3_bucket_size_bytes{bucket_name="b"} 0"#));
        assert!(rendered.contains(r#"s3_bucket_object_count{bucket_name="b"} 0"#));
        assert!(!rendered.contains("s3_bucket_last_modified_timestamp_seconds"));
        assert!(!rendered.contains("s3_bucket_oldest_object_timestamp_seconds"));
    }

    #[test]
    fn test_set_overwrites_instead_of_accumulating() {
        let recorder = recorder();
        let publisher = MetricsPublisher::new(recorder.handle());
        let series = labels("logs", Some("CD34"));

        metrics::with_local_recorder(&recorder, || {
            publisher.set(MetricSeries::ObjectCount, &series, 5.0);
            publisher.set(MetricSeries::ObjectCount, &series, 3.0);
        });

        let rendered = publisher.handle().render();
        assert!(rendered.contains(r#"s3_bucket_object_count{bucket_name="logs",bucket_config="CD34"} 3"#));
    }

    #[test]
    fn test_labels_for_target() {
        let target = BucketTarget::new(
            "logs",
            CredentialProfile {
                access_key_id: "AKIAEXAMPLEAB12".into(),
                secret_access_key: "secret".into(),
                region: None,
                endpoint_url: None,
                force_path_style: None,
            },
        );

        assert_eq!(
            SeriesLabels::for_target(&target, true),
            labels("logs", Some("AB12"))
        );
        assert_eq!(
            SeriesLabels::for_target(&target, false),
            labels("logs", None)
        );
    }

    #[test]
    fn test_epoch_seconds_is_utc() {
        let instant = Utc.with_ymd_and_hms(1970, 1, 1, 0, 1, 0).unwrap();
        assert_eq!(epoch_seconds(instant), 60.0);
    }
}
