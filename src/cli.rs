use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{ArgGroup, Parser};

use crate::constants::{
    DEFAULT_CLIENT_ID, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_TIMEOUT_SECS,
};
use crate::lag_collector::{
    ClusterCredentials, CollectionConfig, CollectorResult, KVPair,
};

/// Command Line Interface, defined via the declarative,
/// `derive` based functionality of the `clap` crate.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("logging_flags")
        .required(false)
        .multiple(false)
        .args(["verbose", "quiet"]),
))]
pub struct Cli {
    // ------------------------------------------------------------------ Consumer configuration
    /// Kafka Brokers to connect to (format: 'HOST:PORT,...').
    ///
    /// Commas, spaces and newlines are all accepted as separators.
    #[arg(short, long = "brokers", value_name = "BOOTSTRAP_BROKERS", env = "KAFKA_BROKERS")]
    pub bootstrap_brokers: String,

    /// Topics to report the Consumer Group lag of (format: 'TOPIC,...').
    ///
    /// Commas, spaces and newlines are all accepted as separators.
    #[arg(short, long, value_name = "TOPICS", env = "KAFKA_TOPICS")]
    pub topics: String,

    /// Consumer Group to report the lag of.
    ///
    /// The collector joins this group, but never commits offsets on its behalf.
    #[arg(short, long = "group", value_name = "GROUP_ID", env = "KAFKA_GROUP")]
    pub group_id: String,

    /// Location of the CA certificate, used to verify the Brokers.
    #[arg(long = "ssl-ca", value_name = "PATH", env = "KAFKA_CRT")]
    pub ssl_ca_location: String,

    /// Location of the client certificate, used to authenticate with the Brokers.
    #[arg(long = "ssl-cert", value_name = "PATH", env = "KAFKA_PUB")]
    pub ssl_certificate_location: String,

    /// Location of the client private key.
    #[arg(long = "ssl-key", value_name = "PATH", env = "KAFKA_KEY")]
    pub ssl_key_location: String,

    /// Passphrase of the client private key, if encrypted.
    #[arg(long = "ssl-key-password", value_name = "PASSPHRASE", env = "KAFKA_PASSWORD", hide_env_values = true)]
    pub ssl_key_password: Option<String>,

    /// Client identifier used by the internal Kafka Consumer.
    ///
    /// Equivalent to '--kafka-conf=client.id:my-client-id'.
    #[arg(long = "client-id", value_name = "CLIENT_ID", default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Additional configuration used by the internal Kafka Consumer (format: 'CONF_KEY:CONF_VAL').
    ///
    /// To set multiple configurations keys, use this argument multiple times.
    /// Offsets are never committed: 'enable.auto.commit' and 'enable.auto.offset.store'
    /// can't be overridden.
    /// See: https://github.com/edenhill/librdkafka/blob/master/CONFIGURATION.md.
    #[arg(
        long = "kafka-conf",
        value_name = "CONF_KEY:CONF_VAL",
        value_parser = kv_clap_value_parser,
        verbatim_doc_comment
    )]
    pub kafka_config: Vec<KVPair>,

    /// Time bound (seconds) of every single round trip to the Brokers.
    #[arg(
        long,
        value_name = "SECONDS",
        default_value = DEFAULT_TIMEOUT_SECS,
        value_parser = seconds_clap_value_parser
    )]
    pub timeout: Duration,

    // ------------------------------------------------------------------------ Service configuration
    /// Collect lag once, print it to standard output as JSON, and exit.
    #[arg(long)]
    pub once: bool,

    /// Host address to listen on for HTTP requests.
    ///
    /// Supports both IPv4 and IPv6 addresses.
    #[arg(long, default_value = DEFAULT_HTTP_HOST, verbatim_doc_comment)]
    pub host: IpAddr,

    /// Port to listen on for HTTP requests.
    #[arg(long, default_value = DEFAULT_HTTP_PORT, verbatim_doc_comment)]
    pub port: u16,

    /// Time bound (seconds) of an HTTP request, lag collection included.
    #[arg(
        long,
        value_name = "SECONDS",
        default_value = DEFAULT_HTTP_TIMEOUT_SECS,
        value_parser = seconds_clap_value_parser
    )]
    pub http_timeout: Duration,

    /// Verbose logging.
    ///
    /// * none    = 'WARN'
    /// * '-v'    = 'INFO'
    /// * '-vv'   = 'DEBUG'
    /// * '-vvv'  = 'TRACE'
    ///
    /// Alternatively, set environment variable 'LAGSHOT_LOG=(ERROR|WARN|INFO|DEBUG|TRACE|OFF)'.
    #[arg(short, long, action = clap::ArgAction::Count, verbatim_doc_comment)]
    pub verbose: u8,

    /// Quiet logging.
    ///
    /// * none    = 'WARN'
    /// * '-q'    = 'ERROR'
    /// * '-qq'   = 'OFF'
    ///
    /// Alternatively, set environment variable 'LAGSHOT_LOG=(ERROR|WARN|INFO|DEBUG|TRACE|OFF)'.
    #[arg(short, long, action = clap::ArgAction::Count, verbatim_doc_comment)]
    pub quiet: u8,
}

impl Cli {
    pub fn parse_and_validate() -> Self {
        Self::parse()
    }

    pub fn verbosity_level(&self) -> i8 {
        self.verbose as i8 - self.quiet as i8
    }

    pub fn listen_on(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Builds the validated input of a lag collection run.
    pub fn collection_config(&self) -> CollectorResult<CollectionConfig> {
        let credentials = ClusterCredentials::new(
            split_list(&self.bootstrap_brokers),
            &self.ssl_ca_location,
            &self.ssl_certificate_location,
            &self.ssl_key_location,
            self.ssl_key_password.as_deref(),
            &self.group_id,
        )?;

        let config = CollectionConfig::new(
            credentials,
            split_list(&self.topics),
            &self.client_id,
            self.kafka_config.clone(),
            self.timeout,
        )?;

        trace!("Created:\n{:#?}", config);
        Ok(config)
    }
}

/// Splits a list of values separated by commas and/or whitespaces (newlines included).
fn split_list(list: &str) -> Vec<&str> {
    list.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()).collect()
}

/// To be used as [`clap::value_parser`] function to create [`KVPair`] values.
fn kv_clap_value_parser(kv: &str) -> Result<KVPair, String> {
    let (k, v) = match kv.split_once(':') {
        None => {
            return Err("Should have 'K:V' format".to_string());
        },
        Some((k, v)) => (k, v),
    };

    Ok((k.to_string(), v.to_string()))
}

fn seconds_clap_value_parser(secs_str: &str) -> Result<Duration, String> {
    let secs = secs_str.parse::<u64>().map_err(|e| format!("Unable to parse {secs_str}: {e}"))?;

    if secs == 0 {
        return Err("Value should be greater than 0 seconds".to_string());
    }

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lag_collector::CollectorError;

    const REQUIRED_ARGS: [&str; 11] = [
        "lagshot",
        "--brokers",
        "b1:9093,b2:9093",
        "--topics",
        "orders payments",
        "--group",
        "g1",
        "--ssl-ca",
        "ca.crt",
        "--ssl-cert",
        "client.crt",
    ];

    fn parse(extra: &[&str]) -> Cli {
        let mut args = REQUIRED_ARGS.to_vec();
        args.extend(["--ssl-key", "client.key"]);
        args.extend(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn split_list_accepts_mixed_separators() {
        assert_eq!(split_list("b1:9093,b2:9093\nb3:9093 b4:9093"), vec![
            "b1:9093", "b2:9093", "b3:9093", "b4:9093"
        ]);
        assert_eq!(split_list(" , \n"), Vec::<&str>::new());
    }

    #[test]
    fn kv_parser() {
        assert_eq!(
            kv_clap_value_parser("socket.timeout.ms:1000"),
            Ok(("socket.timeout.ms".to_string(), "1000".to_string()))
        );
        assert_eq!(
            kv_clap_value_parser("sasl.password:a:b"),
            Ok(("sasl.password".to_string(), "a:b".to_string()))
        );
        assert!(kv_clap_value_parser("socket.timeout.ms").is_err());
    }

    #[test]
    fn seconds_parser() {
        assert_eq!(seconds_clap_value_parser("60"), Ok(Duration::from_secs(60)));
        assert!(seconds_clap_value_parser("0").is_err());
        assert!(seconds_clap_value_parser("-1").is_err());
        assert!(seconds_clap_value_parser("1.5").is_err());
    }

    #[test]
    fn builds_collection_config() {
        let cli = parse(&["--kafka-conf", "socket.keepalive.enable:true", "--timeout", "5"]);
        let cfg = cli.collection_config().unwrap();

        assert_eq!(cfg.credentials.brokers(), &["b1:9093".to_string(), "b2:9093".to_string()]);
        assert_eq!(cfg.credentials.group_id(), "g1");
        assert_eq!(cfg.credentials.key_password(), None);
        assert_eq!(cfg.topics.iter().map(String::as_str).collect::<Vec<&str>>(), vec![
            "orders", "payments"
        ]);
        assert_eq!(cfg.tuning, vec![("socket.keepalive.enable".to_string(), "true".to_string())]);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.client_id, DEFAULT_CLIENT_ID);
        assert!(!cli.once);
    }

    #[test]
    fn empty_brokers_is_configuration_error() {
        let mut cli = parse(&[]);
        cli.bootstrap_brokers = " ,\n".to_string();

        assert!(matches!(cli.collection_config(), Err(CollectorError::Configuration(_))));
    }

    #[test]
    fn verbosity() {
        assert_eq!(parse(&["-vv"]).verbosity_level(), 2);
        assert_eq!(parse(&["-q"]).verbosity_level(), -1);
        assert_eq!(parse(&[]).verbosity_level(), 0);
        assert!(Cli::try_parse_from(
            REQUIRED_ARGS.iter().copied().chain(["--ssl-key", "k", "-v", "-q"])
        )
        .is_err());
    }
}
