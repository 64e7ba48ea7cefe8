//! S3 Bucket Exporter
//!
//! Periodically inspects object-storage buckets and exposes their size, object
//! count and object age as Prometheus gauges.
//!
//! ## Features
//!
//! - **Two target strategies**: a static bucket list with per-bucket
//!   credentials (reloaded every cycle), or discovery of every bucket visible
//!   to one credential set
//! - **Streaming aggregation**: object listings are folded page by page, never
//!   materialized
//! - **Failure isolation**: one unreachable bucket never stops the others, and
//!   a failed cycle is simply retried after the interval
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   targets   ┌──────────────┐  aggregate  ┌──────────────┐
//! │ Target       │────────────▶│ Bucket       │────────────▶│ Metrics      │
//! │ Resolver     │             │ Collector    │             │ Publisher    │
//! └──────────────┘             └──────────────┘             └──────────────┘
//!        ▲                            │                            │
//!        │                            ▼                            ▼
//! ┌──────────────┐             ┌──────────────┐             ┌──────────────┐
//! │ Collection   │             │ S3 API       │             │ /metrics     │
//! │ Scheduler    │             │ (paginated)  │             │ :9000        │
//! └──────────────┘             └──────────────┘             └──────────────┘
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod target;

pub use collector::{BucketAggregate, BucketCollector};
pub use config::{Config, ResolverMode};
pub use error::{ConfigError, ExporterError};
pub use publisher::{MetricSeries, MetricsPublisher, SeriesLabels};
pub use scheduler::{CollectionScheduler, CycleReport};
pub use server::start_metrics_server;
pub use storage::{ObjectRecord, ObjectStorage, S3Connector, StorageConnector};
pub use target::{
    BucketTarget, CredentialProfile, DiscoveryResolver, StaticListResolver, TargetResolver,
};
