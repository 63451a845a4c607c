use const_format::formatcp;

/// Default `client.id` of the Kafka Consumer used to collect lag.
pub(crate) const DEFAULT_CLIENT_ID: &str =
    formatcp!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

/// Default time bound of every single broker round trip, in seconds.
pub(crate) const DEFAULT_TIMEOUT_SECS: &str = "60";

pub(crate) const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub(crate) const DEFAULT_HTTP_PORT: &str = "6564";

/// Default time bound of a whole HTTP request, in seconds.
pub(crate) const DEFAULT_HTTP_TIMEOUT_SECS: &str = "300";

/// Environment variable that, if set, overrides the logging level set via command line.
pub(crate) const LOG_ENV_VAR: &str = "LAGSHOT_LOG";
