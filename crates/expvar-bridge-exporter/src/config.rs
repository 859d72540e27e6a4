//! Exporter configuration read from environment variables.

use hyper::Uri;

use std::{env, error, fmt, net::SocketAddr};

/// Error parsing [`ExporterConfig`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// Required variable is not set.
    Missing(&'static str),
    /// Variable has an invalid value.
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Variable value.
        value: String,
        /// Parsing error.
        source: Box<dyn error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(var) => write!(formatter, "environment variable `{var}` is not set"),
            Self::Invalid { var, value, source } => {
                write!(formatter, "invalid value of `{var}` ({value:?}): {source}")
            }
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Missing(_) => None,
            Self::Invalid { source, .. } => Some(source.as_ref()),
        }
    }
}

/// Configuration of the exporter.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Host (incl. the port if necessary) of the app exposing `/debug/vars`.
    pub source_addr: String,
    /// Whether the `/metrics` route is served.
    pub metrics_enabled: bool,
    /// Address the exporter server is bound to.
    pub bind_address: SocketAddr,
}

impl ExporterConfig {
    /// Variable with the host of the source app.
    pub const SOURCE_ADDR_VAR: &'static str = "METRIC_WEB_ADDR";
    /// Variable enabling the `/metrics` route. The route is only enabled if the variable is set to `true`.
    pub const METRICS_ENABLED_VAR: &'static str = "ENABLE_PROMETHEUS_METRICS";
    /// Variable with the bind address of the exporter server.
    pub const BIND_ADDR_VAR: &'static str = "METRICS_BIND_ADDR";
    /// Default bind address of the exporter server.
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:9100";

    /// Path of the JSON endpoint on the source app.
    pub const SOURCE_PATH: &'static str = "/debug/vars";

    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Reads configuration using the provided variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or if a variable cannot be parsed.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let source_addr = lookup(Self::SOURCE_ADDR_VAR)
            .filter(|addr| !addr.is_empty())
            .ok_or(ConfigError::Missing(Self::SOURCE_ADDR_VAR))?;
        let metrics_enabled = lookup(Self::METRICS_ENABLED_VAR).is_some_and(|flag| flag == "true");

        let bind_address = lookup(Self::BIND_ADDR_VAR);
        let bind_address = bind_address.as_deref().unwrap_or(Self::DEFAULT_BIND_ADDR);
        let bind_address = bind_address
            .parse()
            .map_err(|err| ConfigError::Invalid {
                var: Self::BIND_ADDR_VAR,
                value: bind_address.to_owned(),
                source: Box::new(err),
            })?;

        let this = Self {
            source_addr,
            metrics_enabled,
            bind_address,
        };
        this.source_uri()?;
        Ok(this)
    }

    /// Returns the URI of the source JSON endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the source address does not form a valid URI.
    pub fn source_uri(&self) -> Result<Uri, ConfigError> {
        let uri = format!("http://{}{}", self.source_addr, Self::SOURCE_PATH);
        uri.parse().map_err(|err| ConfigError::Invalid {
            var: Self::SOURCE_ADDR_VAR,
            value: self.source_addr.clone(),
            source: Box::new(err),
        })
    }
}
