use std::cell::Cell;
use std::collections::BTreeSet;
use std::time::Duration;

use rdkafka::{
    consumer::{BaseConsumer, Consumer},
    error::{KafkaError, RDKafkaErrorCode},
    ClientConfig, Offset, TopicPartitionList,
};

use super::context::LagCollectorContext;
use super::coordinator::AssignmentView;
use super::errors::{CollectorError, CollectorResult};
use crate::kafka_types::TopicPartition;

/// Earliest and latest available offsets of a partition: `(low, high)`.
pub type Watermarks = (i64, i64);

/// Stateful connection to the Kafka cluster, member of a Consumer Group.
///
/// Every method that reaches the Brokers is blocking, and bounded by the given `timeout`.
/// There is deliberately no way to commit offsets through this trait.
///
/// A handle is released when dropped: implementors close the underlying session in [`Drop`].
pub trait ConsumerHandle {
    /// Subscribes to exactly the given Topics, kicking off the Consumer Group protocol.
    fn subscribe(&self, topics: &BTreeSet<String>) -> CollectorResult<()>;

    /// Serves pending callbacks (rebalances, errors) for up to `timeout`.
    fn poll(&self, timeout: Duration) -> CollectorResult<()>;

    /// Current view of the partition assignment.
    fn assignment(&self) -> AssignmentView;

    /// Which of the given Topics exist, according to the cluster metadata.
    fn existing_topics(
        &self,
        topics: &BTreeSet<String>,
        timeout: Duration,
    ) -> CollectorResult<BTreeSet<String>>;

    fn fetch_watermarks(&self, tp: &TopicPartition, timeout: Duration) -> CollectorResult<Watermarks>;

    /// Last offset committed by the Consumer Group, or `None` if it never committed.
    fn fetch_committed_offset(
        &self,
        tp: &TopicPartition,
        timeout: Duration,
    ) -> CollectorResult<Option<i64>>;
}

/// [`ConsumerHandle`] backed by an `rdkafka` [`BaseConsumer`].
///
/// A [`BaseConsumer`] only invokes callbacks when it's polled (or queried): this keeps all
/// rebalance handling on the thread driving the collection.
pub struct KafkaConsumerHandle {
    consumer: BaseConsumer<LagCollectorContext>,

    /// Generation of the last assignment whose partitions were paused
    paused_generation: Cell<Option<u64>>,
}

impl KafkaConsumerHandle {
    /// Creates the Consumer: callbacks are registered as part of its [`LagCollectorContext`],
    /// so they are in place before any subscription.
    pub fn create(client_config: &ClientConfig) -> CollectorResult<Self> {
        let consumer: BaseConsumer<LagCollectorContext> = client_config
            .create_with_context(LagCollectorContext::default())
            .map_err(|e| CollectorError::Configuration(format!("Failed to create Consumer: {e}")))?;

        debug!("Consumer created");
        Ok(Self {
            consumer,
            paused_generation: Cell::new(None),
        })
    }

    /// Stops fetching records from the assigned partitions: only their offsets are ever read.
    ///
    /// Every new assignment starts unpaused, so this is repeated once per generation.
    fn pause_assigned(&self) {
        let view = self.consumer.context().assignment();
        if let Some(tpl) = partitions_to_pause(&view, self.paused_generation.get()) {
            match self.consumer.pause(&tpl) {
                Ok(()) => debug!("Paused {} assigned partition(s)", tpl.count()),
                Err(e) => warn!("Failed to pause assigned partitions: {e}"),
            }
            self.paused_generation.set(Some(view.generation));
        }
    }

    fn check_fatal_error(&self) -> CollectorResult<()> {
        match self.consumer.context().take_fatal_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Surfaces fatal errors recorded during the call first, then maps the call result.
    fn after_call<T>(
        &self,
        res: Result<T, KafkaError>,
        topic: &str,
        operation: impl FnOnce() -> String,
        timeout: Duration,
    ) -> CollectorResult<T> {
        self.check_fatal_error()?;
        res.map_err(|e| {
            if is_timeout(&e) {
                CollectorError::Timeout {
                    operation: operation(),
                    timeout,
                }
            } else {
                CollectorError::Query {
                    topic: topic.to_string(),
                    reason: format!("{} failed: {e}", operation()),
                }
            }
        })
    }
}

impl ConsumerHandle for KafkaConsumerHandle {
    fn subscribe(&self, topics: &BTreeSet<String>) -> CollectorResult<()> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics).map_err(|e| {
            CollectorError::Configuration(format!("Failed to subscribe to {topics:?}: {e}"))
        })?;

        debug!("Subscribed to {:?}", topics);
        self.check_fatal_error()
    }

    fn poll(&self, timeout: Duration) -> CollectorResult<()> {
        match self.consumer.poll(timeout) {
            None => {},
            // Records are never read: assignment is all that polling is for
            Some(Ok(_)) => trace!("Discarding record polled while serving callbacks"),
            Some(Err(KafkaError::PartitionEOF(p))) => trace!("Reached end of partition {p}"),
            Some(Err(e)) => warn!("Consumer poll returned: {e}"),
        }

        self.check_fatal_error()?;
        self.pause_assigned();
        Ok(())
    }

    fn assignment(&self) -> AssignmentView {
        self.consumer.context().assignment()
    }

    fn existing_topics(
        &self,
        topics: &BTreeSet<String>,
        timeout: Duration,
    ) -> CollectorResult<BTreeSet<String>> {
        let res = self.consumer.fetch_metadata(None, timeout);
        self.check_fatal_error()?;

        let metadata = res.map_err(|e| {
            if is_timeout(&e) {
                CollectorError::Timeout {
                    operation: "fetching cluster metadata".to_string(),
                    timeout,
                }
            } else {
                CollectorError::Connection(format!("Failed to fetch cluster metadata: {e}"))
            }
        })?;

        Ok(metadata
            .topics()
            .iter()
            .filter(|mt| mt.error().is_none() && topics.contains(mt.name()))
            .map(|mt| mt.name().to_string())
            .collect())
    }

    fn fetch_watermarks(&self, tp: &TopicPartition, timeout: Duration) -> CollectorResult<Watermarks> {
        let res = self.consumer.fetch_watermarks(&tp.topic, tp.partition_i32(), timeout);
        self.after_call(res, &tp.topic, || format!("fetching watermarks of '{tp}'"), timeout)
    }

    fn fetch_committed_offset(
        &self,
        tp: &TopicPartition,
        timeout: Duration,
    ) -> CollectorResult<Option<i64>> {
        let mut tpl = TopicPartitionList::with_capacity(1);
        tpl.add_partition(&tp.topic, tp.partition_i32());

        let res = self.consumer.committed_offsets(tpl, timeout);
        let operation = || format!("fetching committed offset of '{tp}'");
        let committed = self.after_call(res, &tp.topic, operation, timeout)?;

        let elem = committed.find_partition(&tp.topic, tp.partition_i32()).ok_or_else(|| {
            CollectorError::Query {
                topic: tp.topic.clone(),
                reason: format!("{} returned no result", operation()),
            }
        })?;
        elem.error().map_err(|e| CollectorError::Query {
            topic: tp.topic.clone(),
            reason: format!("{} failed: {e}", operation()),
        })?;

        Ok(match elem.offset() {
            Offset::Offset(o) if o >= 0 => Some(o),
            // `Offset::Invalid` when the Group never committed on the partition
            _ => None,
        })
    }
}

impl Drop for KafkaConsumerHandle {
    fn drop(&mut self) {
        self.consumer.unsubscribe();
        self.consumer.context().close();
        debug!("Consumer closed");
    }
}

fn is_timeout(e: &KafkaError) -> bool {
    matches!(
        e.rdkafka_error_code(),
        Some(RDKafkaErrorCode::OperationTimedOut | RDKafkaErrorCode::RequestTimedOut)
    )
}

fn partitions_to_pause(view: &AssignmentView, paused_generation: Option<u64>) -> Option<TopicPartitionList> {
    if !view.is_ready() || paused_generation == Some(view.generation) {
        return None;
    }

    let mut tpl = TopicPartitionList::with_capacity(view.partitions.len());
    for tp in &view.partitions {
        tpl.add_partition(&tp.topic, tp.partition_i32());
    }
    Some(tpl)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lag_collector::coordinator::RebalanceState;

    fn view(state: RebalanceState, partitions: &[u32], generation: u64) -> AssignmentView {
        AssignmentView {
            state,
            partitions: partitions.iter().map(|p| TopicPartition::new("orders", *p)).collect(),
            generation,
        }
    }

    #[test]
    fn pauses_each_assignment_once() {
        let assigned = view(RebalanceState::Assigned, &[0, 2], 1);

        let tpl = partitions_to_pause(&assigned, None).unwrap();
        assert_eq!(tpl.count(), 2);
        assert!(tpl.find_partition("orders", 0).is_some());
        assert!(tpl.find_partition("orders", 2).is_some());

        assert!(partitions_to_pause(&assigned, Some(1)).is_none());

        let reassigned = view(RebalanceState::Assigned, &[1], 3);
        assert_eq!(partitions_to_pause(&reassigned, Some(1)).map(|tpl| tpl.count()), Some(1));
    }

    #[test]
    fn nothing_to_pause_until_assigned() {
        assert!(partitions_to_pause(&view(RebalanceState::Unassigned, &[], 0), None).is_none());
        assert!(partitions_to_pause(&view(RebalanceState::Assigning, &[], 0), None).is_none());
        assert!(partitions_to_pause(&view(RebalanceState::Assigned, &[], 1), None).is_none());
    }
}
