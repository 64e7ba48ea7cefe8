use crate::collector::BucketCollector;
use crate::publisher::{
    MetricsPublisher, SeriesLabels, COLLECTION_ERRORS_TOTAL, CYCLES_TOTAL, LAST_CYCLE_DURATION,
    TARGETS,
};
use crate::target::TargetResolver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

/// Outcome of one resolve → collect → publish pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Drives the repeating collection cycle
pub struct CollectionScheduler {
    resolver: Arc<dyn TargetResolver>,
    collector: BucketCollector,
    publisher: MetricsPublisher,
    interval: Duration,
}

impl CollectionScheduler {
    pub fn new(
        resolver: Arc<dyn TargetResolver>,
        collector: BucketCollector,
        publisher: MetricsPublisher,
        interval: Duration,
    ) -> Self {
        Self {
            resolver,
            collector,
            publisher,
            interval,
        }
    }

    /// Run cycles until the task is aborted
    ///
    /// Each cycle runs in its own task so that a panic ends only that cycle.
    pub async fn run(self: Arc<Self>) {
        info!(interval_secs = self.interval.as_secs(), "Starting collection loop");

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;

            let scheduler = self.clone();
            match tokio::spawn(async move { scheduler.run_cycle().await }).await {
                Ok(report) => info!(
                    cycle,
                    targets = report.targets,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Collection cycle finished"
                ),
                Err(e) => error!(cycle, error = %e, "Error in collection cycle"),
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Resolve targets and collect them one after another
    ///
    /// A failing target is skipped; its previously published values stay
    /// visible.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let targets = self.resolver.resolve().await;
        let with_profile = self.resolver.labels_profile();

        let mut report = CycleReport {
            targets: targets.len(),
            ..Default::default()
        };

        for target in &targets {
            info!(bucket = %target.bucket, "Processing bucket");

            match self.collector.collect(target).await {
                Ok(aggregate) => {
                    let labels = SeriesLabels::for_target(target, with_profile);
                    self.publisher.publish(&labels, &aggregate);
                    report.succeeded += 1;
                }
                Err(_) => {
                    let bucket_name = target.bucket.clone();
                    metrics::counter!(COLLECTION_ERRORS_TOTAL, "bucket_name" => bucket_name)
                        .increment(1);
                    report.failed += 1;
                }
            }
        }

        report.elapsed = started.elapsed();

        metrics::counter!(CYCLES_TOTAL).increment(1);
        metrics::gauge!(TARGETS).set(report.targets as f64);
        metrics::gauge!(LAST_CYCLE_DURATION).set(report.elapsed.as_secs_f64());

        report
    }
}
