//! chia-collector: the collection-and-aggregation cycle.
//!
//! Polls the four Chia backend services, merges their responses into the
//! metric registry, computes the metrics that need data from more than one
//! service, and repeats on a fixed interval.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   └── every interval: CollectionCycle::run() → CycleOutcome
//!         ├── ChiaConfig::load() → four BackendEndpoints
//!         ├── Connector::connect_*() ×4 (concurrently)
//!         ├── wallets → chain → connections → harvester → farmer → rewards
//!         │     └── derived: average_block_time(), expected_time_to_win()
//!         ├── writes → MetricRegistry (streaming or one atomic commit)
//!         └── close every client that was opened
//! ```
//!
//! A cycle never propagates failure to the scheduler: it is reported as
//! [`CycleOutcome::Aborted`] and logged, and the registry keeps the last
//! values that were written.

pub mod catalogue;
pub mod cycle;
pub mod derived;
pub mod error;
pub mod resolver;
pub mod scheduler;

#[cfg(test)]
mod fake;

pub use catalogue::ChiaMetrics;
pub use cycle::{CollectionCycle, CommitMode, CycleConfig, CycleOutcome, CycleReport, Hosts, HostnamePolicy};
pub use derived::{average_block_time, expected_time_to_win, SECONDS_PER_BLOCK, UNDEFINED};
pub use error::{CycleError, ResolveError};
pub use resolver::{DnsHostnameResolver, HostnameResolver, ResolveFuture};
pub use scheduler::Scheduler;
