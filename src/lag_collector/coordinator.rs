use std::collections::BTreeSet;
use std::fmt;

use super::errors::{CollectorError, CollectorResult};
use crate::kafka_types::{join_topic_partitions, TopicPartition};

/// Lifecycle of the Consumer Group membership, during a single lag collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceState {
    Unassigned,
    Assigning,
    Assigned,
    Revoking,
    Closed,
}

impl fmt::Display for RebalanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Notification delivered by the Consumer Group coordination protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceNotification {
    /// The Group Coordinator assigns these partitions to this member.
    Assign(Vec<TopicPartition>),

    /// The Group Coordinator withdraws these partitions from this member.
    Revoke(Vec<TopicPartition>),

    /// Anything else: the coordination failed.
    Unrecognized(String),
}

/// Point-in-time copy of what the [`RebalanceCoordinator`] believes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentView {
    pub state: RebalanceState,
    pub partitions: BTreeSet<TopicPartition>,

    /// Incremented every time a rebalance transition completes.
    pub generation: u64,
}

impl AssignmentView {
    /// `true` when partitions are assigned, and offsets for them can be read.
    pub fn is_ready(&self) -> bool {
        self.state == RebalanceState::Assigned && !self.partitions.is_empty()
    }
}

/// Tracks the partition assignment of this Consumer, in lock-step with the Group Coordinator.
///
/// Every rebalance is handled in 2 steps: [`Self::begin`] when the notification arrives,
/// and [`Self::complete`] once the Kafka client has acknowledged it (i.e. assigned the
/// notified partitions, or assigned nothing in case of revocation).
///
/// ```text
/// Unassigned ──assign──▶ Assigning ──ack──▶ Assigned ──revoke──▶ Revoking ──ack──▶ Unassigned
///                           ▲                  │
///                           └──────assign──────┘
/// ```
///
/// Once [`Self::close`] is called, the state is `Closed` and any further notification is ignored.
#[derive(Debug)]
pub struct RebalanceCoordinator {
    state: RebalanceState,
    partitions: BTreeSet<TopicPartition>,
    generation: u64,
}

impl Default for RebalanceCoordinator {
    fn default() -> Self {
        Self {
            state: RebalanceState::Unassigned,
            partitions: BTreeSet::new(),
            generation: 0,
        }
    }
}

impl RebalanceCoordinator {
    #[allow(unused)]
    pub fn state(&self) -> RebalanceState {
        self.state
    }

    pub fn view(&self) -> AssignmentView {
        AssignmentView {
            state: self.state,
            partitions: self.partitions.clone(),
            generation: self.generation,
        }
    }

    /// Handles a notification, before the client acts upon it.
    pub fn begin(&mut self, notification: &RebalanceNotification) -> CollectorResult<()> {
        use RebalanceState::*;

        match (self.state, notification) {
            (Closed, _) => {
                debug!("Ignoring rebalance notification after close: {notification:?}");
                Ok(())
            },
            (Unassigned | Assigned, RebalanceNotification::Assign(tps)) => {
                debug!("Assigning partition(s): {}", join_topic_partitions(tps));
                self.state = Assigning;
                Ok(())
            },
            (Assigned, RebalanceNotification::Revoke(tps)) => {
                debug!("Revoking partition(s): {}", join_topic_partitions(tps));
                self.state = Revoking;
                Ok(())
            },
            // Revoking an empty assignment, happens when (re)joining the group
            (Unassigned, RebalanceNotification::Revoke(tps)) if tps.is_empty() => {
                self.state = Revoking;
                Ok(())
            },
            (_, RebalanceNotification::Unrecognized(reason)) => {
                Err(CollectorError::Protocol(format!("Rebalance failed: {reason}")))
            },
            (state, n) => Err(unexpected(state, n)),
        }
    }

    /// Handles a notification, after the client has acknowledged it.
    pub fn complete(&mut self, notification: &RebalanceNotification) -> CollectorResult<()> {
        use RebalanceState::*;

        match (self.state, notification) {
            (Closed, _) => Ok(()),
            (Assigning, RebalanceNotification::Assign(tps)) => {
                self.partitions = tps.iter().cloned().collect();
                self.state = Assigned;
                self.generation += 1;
                info!("Partition(s) assigned: {}", join_topic_partitions(&self.partitions));
                Ok(())
            },
            (Revoking, RebalanceNotification::Revoke(tps)) => {
                info!("Partition(s) revoked: {}", join_topic_partitions(tps));
                self.partitions.clear();
                self.state = Unassigned;
                self.generation += 1;
                Ok(())
            },
            (_, RebalanceNotification::Unrecognized(reason)) => {
                Err(CollectorError::Protocol(format!("Rebalance failed: {reason}")))
            },
            (state, n) => Err(unexpected(state, n)),
        }
    }

    /// Enters the terminal `Closed` state.
    pub fn close(&mut self) {
        if self.state != RebalanceState::Closed {
            debug!("Closing with {} partition(s) assigned", self.partitions.len());
            self.state = RebalanceState::Closed;
            self.partitions.clear();
        }
    }
}

fn unexpected(state: RebalanceState, notification: &RebalanceNotification) -> CollectorError {
    CollectorError::Protocol(format!("Unexpected {notification:?} while {state}"))
}
