//! chia-metrics: the exporter's metric registry.
//!
//! Holds every declared metric family and its live value, and renders the
//! whole set in the Prometheus text exposition format for scraping.
//!
//! # Architecture
//!
//! ```text
//! MetricRegistry
//!   ├── gauge() / gauge_vec() / enum_state() / info() ← declared once at startup
//!   ├── apply(Update)        ← one atomic write
//!   ├── apply_all(Vec<Update>) ← atomic commit of a whole batch
//!   └── snapshot() → Vec<MetricFamily>
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```
//!
//! Writes are expressed as [`Update`] values produced by the typed metric
//! handles, so a caller can either apply them as they happen or stage them
//! and commit the batch in one step.

pub mod error;
pub mod prometheus;
pub mod registry;

pub use error::{MetricsError, MetricsResult};
pub use prometheus::{render_prometheus, CONTENT_TYPE};
pub use registry::{
    EnumState, FamilyValue, Gauge, GaugeVec, Info, MetricFamily, MetricId, MetricRegistry, Update,
};
