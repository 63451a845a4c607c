// Inner module
mod topic_partition;

// Exports
pub use topic_partition::TopicPartition;
pub(crate) use topic_partition::join_topic_partitions;
