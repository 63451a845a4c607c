// Inner modules
mod configurator;
mod context;
mod coordinator;
mod credentials;
mod errors;
mod handle;
mod report;
mod snapshot;

// Exports
pub use credentials::{ClusterCredentials, CollectionConfig, KVPair};
pub use errors::{CollectorError, CollectorResult};
pub use report::LagReport;

use configurator::build_client_config;
use handle::KafkaConsumerHandle;
use snapshot::collect;

/// Runs a single, bounded, lag collection.
///
/// Configuration is validated before any connection to the cluster is attempted.
/// The Consumer is closed before returning, whatever the outcome.
///
/// This blocks the calling thread: from async code, run it via `tokio::task::spawn_blocking`.
pub fn run_lag_collection(config: &CollectionConfig) -> CollectorResult<LagReport> {
    debug!(
        "Collecting lag of Consumer Group '{}' for {:?}",
        config.credentials.group_id(),
        config.topics
    );

    let client_config = build_client_config(config)?;
    let handle = KafkaConsumerHandle::create(&client_config)?;
    collect(handle, &config.topics, config.timeout)
}
