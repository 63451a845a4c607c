use std::fmt;

use rdkafka::topic_partition_list::TopicPartitionListElem;

/// Represents a single Topic-Partition pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
}

impl TopicPartition {
    pub(crate) fn new<T: Into<String>>(topic: T, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    /// Partition identifier, as the Kafka client library expects it.
    pub(crate) fn partition_i32(&self) -> i32 {
        self.partition as i32
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.partition)
    }
}

impl From<&TopicPartitionListElem<'_>> for TopicPartition {
    fn from(elem: &TopicPartitionListElem<'_>) -> Self {
        TopicPartition::new(elem.topic(), elem.partition() as u32)
    }
}

/// Renders a list of [`TopicPartition`] in a human-readable, comma separated form.
pub(crate) fn join_topic_partitions<'a, I>(tps: I) -> String
where
    I: IntoIterator<Item = &'a TopicPartition>,
{
    tps.into_iter().map(|tp| tp.to_string()).collect::<Vec<String>>().join(", ")
}
