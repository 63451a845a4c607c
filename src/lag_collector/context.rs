use parking_lot::Mutex;
use rdkafka::{
    consumer::{ConsumerContext, Rebalance},
    error::{KafkaError, KafkaResult, RDKafkaErrorCode},
    ClientContext, TopicPartitionList,
};

use super::coordinator::{AssignmentView, RebalanceCoordinator, RebalanceNotification};
use super::errors::CollectorError;
use crate::kafka_types::TopicPartition;

/// Kafka client context of the lag collector Consumer.
///
/// It receives the error and rebalance callbacks of the client library. Callbacks are invoked
/// synchronously, from within the client call that triggered them (e.g. `poll`): they can't
/// return errors, so the first fatal error is recorded here and then surfaced, by the
/// [`super::handle::KafkaConsumerHandle`], as the result of that call.
#[derive(Debug, Default)]
pub struct LagCollectorContext {
    coordinator: Mutex<RebalanceCoordinator>,
    fatal_error: Mutex<Option<CollectorError>>,
}

impl LagCollectorContext {
    pub fn assignment(&self) -> AssignmentView {
        self.coordinator.lock().view()
    }

    /// Removes and returns the fatal error recorded by a callback, if any.
    pub fn take_fatal_error(&self) -> Option<CollectorError> {
        self.fatal_error.lock().take()
    }

    pub fn close(&self) {
        self.coordinator.lock().close();
    }

    fn record_fatal_error(&self, e: CollectorError) {
        let mut guard = self.fatal_error.lock();
        if guard.is_none() {
            error!("{e}");
            *guard = Some(e);
        } else {
            debug!("Fatal error already recorded, discarding: {e}");
        }
    }
}

impl ClientContext for LagCollectorContext {
    fn error(&self, error: KafkaError, reason: &str) {
        if is_connection_failure(&error) {
            self.record_fatal_error(CollectorError::Connection(format!("{error} ({reason})")));
        } else {
            warn!("Kafka client error: {error} ({reason})");
        }
    }
}

impl ConsumerContext for LagCollectorContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        let notification = RebalanceNotification::from(rebalance);
        if let Err(e) = self.coordinator.lock().begin(&notification) {
            self.record_fatal_error(e);
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        let notification = RebalanceNotification::from(rebalance);
        if let Err(e) = self.coordinator.lock().complete(&notification) {
            self.record_fatal_error(e);
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        // Auto-commit is disabled and offsets are never committed explicitly
        self.record_fatal_error(CollectorError::Protocol(format!(
            "Unexpected offsets commit ({result:?}) of {} partition(s)",
            offsets.count()
        )));
    }
}

impl From<&Rebalance<'_>> for RebalanceNotification {
    fn from(rebalance: &Rebalance<'_>) -> Self {
        match rebalance {
            Rebalance::Assign(tpl) => RebalanceNotification::Assign(to_topic_partitions(tpl)),
            Rebalance::Revoke(tpl) => RebalanceNotification::Revoke(to_topic_partitions(tpl)),
            Rebalance::Error(e) => RebalanceNotification::Unrecognized(e.to_string()),
        }
    }
}

fn to_topic_partitions(tpl: &TopicPartitionList) -> Vec<TopicPartition> {
    tpl.elements().iter().map(|e| TopicPartition::from(e)).collect()
}

/// `true` if the error means this run can't reach the cluster: TLS, authentication or
/// all Brokers down. Other errors (e.g. a single Broker disconnecting) are transient.
fn is_connection_failure(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::SSL
                | RDKafkaErrorCode::Authentication
                | RDKafkaErrorCode::SaslAuthenticationFailed
                | RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::Fatal
        )
    )
}
