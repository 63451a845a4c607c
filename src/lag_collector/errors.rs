use std::time::Duration;

use thiserror::Error;

/// Possible errors from the [`super`] module.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CollectorError {
    /// Malformed or incomplete input: it is never retried.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// TLS handshake or authentication failure, or unreachable Brokers.
    #[error("Connection to Kafka cluster failed: {0}")]
    Connection(String),

    /// Unexpected rebalance notification, or failure of the Consumer Group coordination.
    #[error("Consumer Group protocol failure: {0}")]
    Protocol(String),

    /// A single bounded round trip to the Brokers exceeded its deadline.
    #[error("Timed out after {timeout:?} while {operation}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// The Brokers rejected a query about a specific Topic.
    #[error("Query about Topic '{topic}' rejected: {reason}")]
    Query {
        topic: String,
        reason: String,
    },
}

impl CollectorError {
    /// Short, stable identifier of the kind of error.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::Configuration(_) => "configuration",
            CollectorError::Connection(_) => "connection",
            CollectorError::Protocol(_) => "protocol",
            CollectorError::Timeout {
                ..
            } => "timeout",
            CollectorError::Query {
                ..
            } => "query",
        }
    }

    /// Process exit code, for when a collection failure terminates the process.
    pub fn exit_code(&self) -> i32 {
        match self {
            CollectorError::Configuration(_) => exit_code::CONFIG_ERROR,
            CollectorError::Connection(_) => exit_code::SERVICE_UNAVAILABLE,
            CollectorError::Protocol(_) => exit_code::PROTOCOL_ERROR,
            CollectorError::Timeout {
                ..
            } => exit_code::TEMPORARY_FAILURE,
            CollectorError::Query {
                ..
            } => exit_code::DATA_ERROR,
        }
    }
}

pub type CollectorResult<T> = Result<T, CollectorError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_carries_context() {
        let e = CollectorError::Timeout {
            operation: "fetching watermarks of 'orders:0'".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(e.to_string(), "Timed out after 5s while fetching watermarks of 'orders:0'");
        assert_eq!(e.kind(), "timeout");

        let e = CollectorError::Query {
            topic: "orders".to_string(),
            reason: "Broker: Unknown topic or partition".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Query about Topic 'orders' rejected: Broker: Unknown topic or partition"
        );
    }

    #[test]
    fn exit_codes_are_distinct_and_non_zero() {
        let codes = [
            CollectorError::Configuration(String::new()).exit_code(),
            CollectorError::Connection(String::new()).exit_code(),
            CollectorError::Protocol(String::new()).exit_code(),
            CollectorError::Timeout {
                operation: String::new(),
                timeout: Duration::ZERO,
            }
            .exit_code(),
            CollectorError::Query {
                topic: String::new(),
                reason: String::new(),
            }
            .exit_code(),
        ];

        for (i, c) in codes.iter().enumerate() {
            assert_ne!(*c, exit_code::SUCCESS);
            assert!(!codes[i + 1..].contains(c));
        }
    }
}
