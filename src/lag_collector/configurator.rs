use rdkafka::ClientConfig;

use super::credentials::CollectionConfig;
use super::errors::{CollectorError, CollectorResult};

/// Configuration keys the lag collector pins, regardless of any tuning option.
///
/// Committing (or even storing) offsets would alter the very thing being measured.
const PINNED_CONFIG: [(&str, &str); 2] =
    [("enable.auto.commit", "false"), ("enable.auto.offset.store", "false")];

const CONF_ASSIGNMENT_STRATEGY: &str = "partition.assignment.strategy";
const COOPERATIVE_STRATEGY: &str = "cooperative-sticky";

/// Builds the Kafka client configuration for a lag collection run.
///
/// Order of application:
///
/// 1. Connection, Consumer Group and TLS settings
/// 2. Tuning options, verbatim
/// 3. Pinned settings that disable offset commit and storage
///
/// Fails with [`CollectorError::Configuration`] if tuning selects the cooperative
/// (incremental) rebalance protocol: assignments are handled with eager semantics.
pub fn build_client_config(cfg: &CollectionConfig) -> CollectorResult<ClientConfig> {
    let creds = &cfg.credentials;

    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", creds.brokers().join(","))
        .set("client.id", cfg.client_id.clone())
        .set("group.id", creds.group_id())
        .set("enable.partition.eof", "true")
        .set("log.connection.close", "false")
        .set("security.protocol", "ssl")
        .set("ssl.ca.location", creds.ca_location())
        .set("ssl.certificate.location", creds.certificate_location())
        .set("ssl.key.location", creds.key_location());
    if let Some(pwd) = creds.key_password() {
        config.set("ssl.key.password", pwd);
    }

    for (k, v) in &cfg.tuning {
        if k == CONF_ASSIGNMENT_STRATEGY && v.contains(COOPERATIVE_STRATEGY) {
            return Err(CollectorError::Configuration(format!(
                "'{k}:{v}' selects incremental rebalancing, which is not supported"
            )));
        }
        config.set(k.clone(), v.clone());
    }

    for (k, v) in PINNED_CONFIG {
        if let Some(prev) = config.get(k) {
            if prev != v {
                warn!("Ignoring '{k}:{prev}': lag collection never commits offsets");
            }
        }
        config.set(k, v);
    }

    trace!("Created:\n{:#?}", config);
    Ok(config)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::lag_collector::credentials::test::build_credentials;

    fn build_collection_config(tuning: Vec<(&str, &str)>) -> CollectionConfig {
        CollectionConfig::new(
            build_credentials(),
            ["orders"],
            "lagshot-test",
            tuning.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn sets_connection_group_and_tls() {
        let config = build_client_config(&build_collection_config(Vec::new())).unwrap();

        assert_eq!(config.get("bootstrap.servers"), Some("b1:9093"));
        assert_eq!(config.get("group.id"), Some("g1"));
        assert_eq!(config.get("client.id"), Some("lagshot-test"));
        assert_eq!(config.get("security.protocol"), Some("ssl"));
        assert_eq!(config.get("ssl.ca.location"), Some("/etc/kafka/ca.crt"));
        assert_eq!(config.get("ssl.certificate.location"), Some("/etc/kafka/client.crt"));
        assert_eq!(config.get("ssl.key.location"), Some("/etc/kafka/client.key"));
        assert_eq!(config.get("ssl.key.password"), Some("s3cr3t"));
        assert_eq!(config.get("enable.partition.eof"), Some("true"));
        assert_eq!(config.get("log.connection.close"), Some("false"));
    }

    #[test]
    fn never_commits_nor_stores_offsets() {
        let config = build_client_config(&build_collection_config(Vec::new())).unwrap();
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));

        let config = build_client_config(&build_collection_config(vec![
            ("enable.auto.commit", "true"),
            ("enable.auto.offset.store", "true"),
        ]))
        .unwrap();
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));
    }

    #[test]
    fn tuning_applied_verbatim() {
        let config = build_client_config(&build_collection_config(vec![
            ("security.protocol", "sasl_ssl"),
            ("socket.keepalive.enable", "true"),
            ("partition.assignment.strategy", "roundrobin"),
        ]))
        .unwrap();

        assert_eq!(config.get("security.protocol"), Some("sasl_ssl"));
        assert_eq!(config.get("socket.keepalive.enable"), Some("true"));
        assert_eq!(config.get("partition.assignment.strategy"), Some("roundrobin"));
    }

    #[test]
    fn cooperative_rebalancing_rejected() {
        let res = build_client_config(&build_collection_config(vec![(
            "partition.assignment.strategy",
            "cooperative-sticky",
        )]));

        assert!(matches!(res, Err(CollectorError::Configuration(_))));
    }
}
