use std::collections::BTreeMap;

use serde::Serialize;

use super::errors::{CollectorError, CollectorResult};
use crate::kafka_types::TopicPartition;

/// Offsets of a Topic Partition, as observed during a single collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionOffsetMetrics {
    /// Topic of the Partition
    #[serde(skip)]
    pub topic: String,
    /// Partition
    #[serde(skip)]
    pub partition: u32,
    /// Partition earliest available offset
    pub low_watermark: u64,
    /// Partition latest available offset
    pub high_watermark: u64,
    /// Last offset committed by the Consumer Group, if any
    pub committed_offset: Option<u64>,
    /// `high_watermark - low_watermark`
    pub lag: u64,
    /// `high_watermark - committed_offset`: negative only if the Group committed past the end
    pub drift: Option<i64>,
}

impl PartitionOffsetMetrics {
    /// Creates a new [`PartitionOffsetMetrics`] out of the offsets returned by the Brokers.
    ///
    /// Fails with [`CollectorError::Query`] if the watermarks are negative or inverted.
    pub fn new(
        tp: &TopicPartition,
        low_watermark: i64,
        high_watermark: i64,
        committed_offset: Option<i64>,
    ) -> CollectorResult<Self> {
        if low_watermark < 0 || high_watermark < low_watermark {
            return Err(CollectorError::Query {
                topic: tp.topic.clone(),
                reason: format!("invalid watermarks for '{tp}': [{low_watermark}, {high_watermark}]"),
            });
        }

        let committed_offset = committed_offset.filter(|c| *c >= 0);
        let drift = committed_offset.map(|c| high_watermark - c);
        if let Some(d) = drift.filter(|d| *d < 0) {
            warn!("Consumer Group committed {} offset(s) past the end of '{tp}'", -d);
        }

        Ok(Self {
            topic: tp.topic.clone(),
            partition: tp.partition,
            low_watermark: low_watermark as u64,
            high_watermark: high_watermark as u64,
            committed_offset: committed_offset.map(|c| c as u64),
            lag: (high_watermark - low_watermark) as u64,
            drift,
        })
    }
}

/// Lag of every observed Topic Partition, grouped by Topic and keyed by Partition.
///
/// A Topic that is not a key was not observed; a Topic mapped to no Partitions was observed,
/// but none of its Partitions were assigned to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct LagReport {
    topics: BTreeMap<String, BTreeMap<u32, PartitionOffsetMetrics>>,
}

impl LagReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the Topic as observed, even if none of its Partitions gets inserted.
    pub fn add_topic(&mut self, topic: &str) {
        self.topics.entry(topic.to_string()).or_default();
    }

    pub fn insert(&mut self, metrics: PartitionOffsetMetrics) {
        self.topics.entry(metrics.topic.clone()).or_default().insert(metrics.partition, metrics);
    }

    pub fn remove_topic(&mut self, topic: &str) {
        self.topics.remove(topic);
    }

    #[allow(unused)]
    pub fn topic(&self, topic: &str) -> Option<&BTreeMap<u32, PartitionOffsetMetrics>> {
        self.topics.get(topic)
    }

    #[allow(unused)]
    pub fn get(&self, topic: &str, partition: u32) -> Option<&PartitionOffsetMetrics> {
        self.topics.get(topic).and_then(|ps| ps.get(&partition))
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn partitions_count(&self) -> usize {
        self.topics.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn lag_and_drift() {
        let tp = TopicPartition::new("orders", 0);

        let m = PartitionOffsetMetrics::new(&tp, 100, 150, Some(140)).unwrap();
        assert_eq!(m.lag, 50);
        assert_eq!(m.drift, Some(10));

        let m = PartitionOffsetMetrics::new(&tp, 7, 7, None).unwrap();
        assert_eq!(m.lag, 0);
        assert_eq!(m.committed_offset, None);
        assert_eq!(m.drift, None);
    }

    #[test]
    fn negative_drift_is_not_clamped() {
        let tp = TopicPartition::new("orders", 0);
        let m = PartitionOffsetMetrics::new(&tp, 0, 10, Some(12)).unwrap();

        assert_eq!(m.committed_offset, Some(12));
        assert_eq!(m.drift, Some(-2));
    }

    #[test]
    fn invalid_watermarks_rejected() {
        let tp = TopicPartition::new("orders", 0);

        assert!(matches!(
            PartitionOffsetMetrics::new(&tp, 10, 9, None),
            Err(CollectorError::Query { topic, .. }) if topic == "orders"
        ));
        assert!(PartitionOffsetMetrics::new(&tp, -1, 9, None).is_err());
    }

    #[test]
    fn serializes_as_nested_maps() {
        let mut report = LagReport::new();
        report.insert(
            PartitionOffsetMetrics::new(&TopicPartition::new("orders", 0), 100, 150, Some(140))
                .unwrap(),
        );
        report.insert(
            PartitionOffsetMetrics::new(&TopicPartition::new("orders", 1), 200, 205, None).unwrap(),
        );
        report.add_topic("payments");

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "orders": {
                    "0": { "lowWatermark": 100, "highWatermark": 150, "committedOffset": 140, "lag": 50, "drift": 10 },
                    "1": { "lowWatermark": 200, "highWatermark": 205, "committedOffset": null, "lag": 5, "drift": null }
                },
                "payments": {}
            })
        );
        assert_eq!(report.partitions_count(), 2);
    }

    #[test]
    fn add_topic_keeps_existing_partitions() {
        let mut report = LagReport::new();
        report.insert(
            PartitionOffsetMetrics::new(&TopicPartition::new("orders", 3), 0, 1, None).unwrap(),
        );
        report.add_topic("orders");

        assert!(report.get("orders", 3).is_some());

        report.remove_topic("orders");
        assert_eq!(report.topic("orders"), None);
        assert_eq!(report.topics().count(), 0);
    }
}
