use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use super::errors::{CollectorError, CollectorResult};

/// A simple (key,value) pair of `String`s, used for pass-through Kafka client configuration.
pub type KVPair = (String, String);

/// Everything needed to open a secure, group-coordinated connection to the Kafka cluster.
///
/// Once constructed via [`ClusterCredentials::new`] it is guaranteed to have a non-empty
/// list of Brokers, all the TLS material locations, and a Consumer Group identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterCredentials {
    brokers: Vec<String>,
    ca_location: String,
    certificate_location: String,
    key_location: String,
    key_password: Option<String>,
    group_id: String,
}

impl ClusterCredentials {
    /// Creates a new [`ClusterCredentials`], validating its content.
    ///
    /// Broker addresses are trimmed and blank entries discarded: if nothing is left,
    /// it fails with [`CollectorError::Configuration`]. Same for blank TLS locations
    /// or a blank Consumer Group identifier.
    pub fn new<I, S>(
        brokers: I,
        ca_location: &str,
        certificate_location: &str,
        key_location: &str,
        key_password: Option<&str>,
        group_id: &str,
    ) -> CollectorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let brokers: Vec<String> = brokers
            .into_iter()
            .map(|b| b.as_ref().trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        if brokers.is_empty() {
            return Err(CollectorError::Configuration("Broker address list is empty".into()));
        }

        Ok(Self {
            brokers,
            ca_location: required("CA certificate location", ca_location)?,
            certificate_location: required("client certificate location", certificate_location)?,
            key_location: required("client key location", key_location)?,
            key_password: key_password.filter(|p| !p.is_empty()).map(str::to_string),
            group_id: required("Consumer Group identifier", group_id)?,
        })
    }

    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    pub fn ca_location(&self) -> &str {
        &self.ca_location
    }

    pub fn certificate_location(&self) -> &str {
        &self.certificate_location
    }

    pub fn key_location(&self) -> &str {
        &self.key_location
    }

    pub fn key_password(&self) -> Option<&str> {
        self.key_password.as_deref()
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

impl fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("brokers", &self.brokers)
            .field("ca_location", &self.ca_location)
            .field("certificate_location", &self.certificate_location)
            .field("key_location", &self.key_location)
            .field("key_password", &self.key_password.as_ref().map(|_| "<redacted>"))
            .field("group_id", &self.group_id)
            .finish()
    }
}

fn required(what: &str, value: &str) -> CollectorResult<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(CollectorError::Configuration(format!("Missing {what}")))
    } else {
        Ok(value.to_string())
    }
}

/// Input of a single lag collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub credentials: ClusterCredentials,

    /// Topics to subscribe to, and report lag for.
    pub topics: BTreeSet<String>,

    /// Value of `client.id` used by the Kafka Consumer.
    pub client_id: String,

    /// Additional Kafka client configuration, applied verbatim.
    pub tuning: Vec<KVPair>,

    /// Time bound of every single round trip to the Brokers.
    pub timeout: Duration,
}

impl CollectionConfig {
    /// Creates a new [`CollectionConfig`], failing if no (non-blank) Topic is given.
    pub fn new<I, S>(
        credentials: ClusterCredentials,
        topics: I,
        client_id: &str,
        tuning: Vec<KVPair>,
        timeout: Duration,
    ) -> CollectorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let topics: BTreeSet<String> = topics
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if topics.is_empty() {
            return Err(CollectorError::Configuration("Topic list is empty".into()));
        }

        if timeout.is_zero() {
            return Err(CollectorError::Configuration("Timeout must be greater than zero".into()));
        }

        Ok(Self {
            credentials,
            topics,
            client_id: client_id.to_string(),
            tuning,
            timeout,
        })
    }
}
