use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use super::coordinator::AssignmentView;
use super::errors::{CollectorError, CollectorResult};
use super::handle::ConsumerHandle;
use super::report::{LagReport, PartitionOffsetMetrics};
use crate::kafka_types::TopicPartition;

/// Interval between polls, while waiting for the partition assignment.
const ASSIGNMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How many times a snapshot is taken, if the assignment keeps changing while it's taken.
const MAX_SNAPSHOT_ATTEMPTS: usize = 3;

/// Collects a [`LagReport`] for the given Topics.
///
/// The `handle` is consumed: it's released once the collection is over, successful or not.
/// The `timeout` bounds every single round trip to the Brokers, including the wait
/// for the Consumer Group coordination to assign partitions.
///
/// Only fatal errors are returned: a Topic whose offsets can't be queried is left out of the
/// report instead. If none of the Topics exist, the report is empty and the Consumer Group
/// is never joined.
pub fn collect<H: ConsumerHandle>(
    handle: H,
    topics: &BTreeSet<String>,
    timeout: Duration,
) -> CollectorResult<LagReport> {
    // Partitions of Topics that don't exist will never be assigned
    if handle.existing_topics(topics, timeout)?.is_empty() {
        warn!("None of the requested Topics exist: nothing to collect");
        return Ok(LagReport::new());
    }

    handle.subscribe(topics)?;

    let mut assignment = await_assignment(&handle, timeout)?;
    for attempt in 1..=MAX_SNAPSHOT_ATTEMPTS {
        let report = take_snapshot(&handle, topics, &assignment, timeout)?;

        // Serve any rebalance that happened while the snapshot was being taken
        handle.poll(Duration::ZERO)?;
        let current = handle.assignment();
        if current.generation == assignment.generation {
            info!(
                "Collected lag of {} partition(s) across {} topic(s)",
                report.partitions_count(),
                report.topics().count()
            );
            return Ok(report);
        }

        warn!(
            "Partition assignment changed while taking snapshot (attempt {attempt}/{MAX_SNAPSHOT_ATTEMPTS}): discarding it"
        );
        if attempt < MAX_SNAPSHOT_ATTEMPTS {
            assignment = await_assignment(&handle, timeout)?;
        }
    }

    Err(CollectorError::Protocol(format!(
        "Partition assignment changed during each of {MAX_SNAPSHOT_ATTEMPTS} snapshot attempts"
    )))
}

/// Polls the `handle` until it has partitions assigned, or `timeout` elapses.
fn await_assignment<H: ConsumerHandle>(handle: &H, timeout: Duration) -> CollectorResult<AssignmentView> {
    let deadline = Instant::now() + timeout;

    loop {
        let view = handle.assignment();
        if view.is_ready() {
            debug!("Assignment (generation {}) ready", view.generation);
            return Ok(view);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CollectorError::Timeout {
                operation: format!("awaiting partition assignment (currently {})", view.state),
                timeout,
            });
        }

        handle.poll(remaining.min(ASSIGNMENT_POLL_INTERVAL))?;
    }
}

fn take_snapshot<H: ConsumerHandle>(
    handle: &H,
    topics: &BTreeSet<String>,
    assignment: &AssignmentView,
    timeout: Duration,
) -> CollectorResult<LagReport> {
    let mut report = LagReport::new();
    for t in handle.existing_topics(topics, timeout)? {
        report.add_topic(&t);
    }

    // Topics that the Brokers refused to be queried about
    let mut rejected: BTreeSet<String> = BTreeSet::new();

    for tp in assignment.partitions.iter().filter(|tp| topics.contains(&tp.topic)) {
        if rejected.contains(&tp.topic) {
            continue;
        }

        match collect_partition(handle, tp, timeout) {
            Ok(metrics) => report.insert(metrics),
            Err(CollectorError::Query {
                topic,
                reason,
            }) => {
                warn!("Omitting Topic '{topic}' from report: {reason}");
                rejected.insert(topic);
            },
            Err(e) => return Err(e),
        }
    }

    for t in &rejected {
        report.remove_topic(t);
    }

    Ok(report)
}

fn collect_partition<H: ConsumerHandle>(
    handle: &H,
    tp: &TopicPartition,
    timeout: Duration,
) -> CollectorResult<PartitionOffsetMetrics> {
    let (low, high) = handle.fetch_watermarks(tp, timeout)?;
    let committed = handle.fetch_committed_offset(tp, timeout)?;
    trace!("'{tp}': low={low}, high={high}, committed={committed:?}");

    PartitionOffsetMetrics::new(tp, low, high, committed)
}
