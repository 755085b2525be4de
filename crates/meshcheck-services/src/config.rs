//! Node factory configuration.

use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::endpoint::{NodeService, DEFAULT_HTTP_PORT, DEFAULT_STAKING_PORT};

/// The default node image.
pub const DEFAULT_IMAGE: &str = "gecko-local:latest";

/// Staking certificate mounted into every node.
pub const STAKING_TLS_CERT_FILE: &str = "node.crt";
/// Staking key mounted into every node.
pub const STAKING_TLS_KEY_FILE: &str = "node.key";

/// An invalid configuration value.
///
/// These are caught once when the configuration is built and are never
/// retried.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A port was zero.
    #[error("`{field}` must be a non-zero port")]
    ZeroPort {
        /// The offending field.
        field: &'static str,
    },

    /// The API and staking ports are the same.
    #[error("API port and staking port must differ, both are {0}")]
    PortCollision(u16),

    /// The snow sample size was zero.
    #[error("snow sample size must be at least 1")]
    ZeroSampleSize,

    /// The snow quorum size does not fit the sample size.
    #[error("snow quorum size {quorum} must be within 1..={sample}")]
    QuorumOutOfRange {
        /// Configured quorum size.
        quorum: u32,
        /// Configured sample size.
        sample: u32,
    },

    /// The container image reference was empty.
    #[error("container image reference must not be empty")]
    EmptyImage,

    /// An unrecognized log level.
    #[error("unknown log level `{0}`, expected one of `verbo`, `debug`, `info`")]
    UnknownLogLevel(String),

    /// Some other field failed validation.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Node log verbosity.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    /// Most verbose.
    Verbose,
    /// Debug output.
    #[default]
    Debug,
    /// Informational output only.
    Info,
}

impl LogLevel {
    /// The value passed on the node's command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verbose => "verbo",
            Self::Debug => "debug",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verbo" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            _ => Err(ConfigError::UnknownLogLevel(s.to_owned())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_owned()
    }
}

/// Per-service configuration, selected by a [`ConfigId`][crate::ConfigId].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Give the node its own staking certificate?
    ///
    /// When false the node reuses the image's built-in certificate, so every
    /// such node reports the same identity.
    pub vary_certs: bool,

    /// The node's log level.
    #[serde(default)]
    pub log_level: LogLevel,
}

impl ServiceConfig {
    /// Creates a new service configuration.
    pub fn new(vary_certs: bool, log_level: LogLevel) -> Self {
        Self {
            vary_certs,
            log_level,
        }
    }
}

/// Parameters used to build node launch commands.
///
/// Validated on construction and immutable afterwards.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFactoryConfig", into = "RawFactoryConfig")]
pub struct FactoryConfig {
    image: String,
    snow_sample_size: u32,
    snow_quorum_size: u32,
    staking_tls_enabled: bool,
    log_level: LogLevel,
    http_port: u16,
    staking_port: u16,
}

impl FactoryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> FactoryConfigBuilder {
        FactoryConfigBuilder::default()
    }

    /// The container image nodes are started from.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Number of validators sampled per consensus query.
    pub fn snow_sample_size(&self) -> u32 {
        self.snow_sample_size
    }

    /// Number of agreeing validators needed for a successful query.
    pub fn snow_quorum_size(&self) -> u32 {
        self.snow_quorum_size
    }

    /// Whether TLS-based staking identities were requested.
    pub fn staking_tls_enabled(&self) -> bool {
        self.staking_tls_enabled
    }

    /// The node log level.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// The JSON-RPC API port.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// The staking/gossip port.
    pub fn staking_port(&self) -> u16 {
        self.staking_port
    }

    /// Ports every node started from this configuration listens on.
    pub fn used_ports(&self) -> [u16; 2] {
        [self.http_port, self.staking_port]
    }

    /// Files mounted into every node for its staking identity.
    pub fn staking_tls_files(&self) -> [&'static str; 2] {
        [STAKING_TLS_CERT_FILE, STAKING_TLS_KEY_FILE]
    }

    /// The node started from this configuration at `ip`.
    pub fn service_from_ip(&self, ip: IpAddr) -> NodeService {
        NodeService::new(ip, self.http_port, self.staking_port)
    }

    /// Returns a copy with a different log level.
    pub fn with_log_level(&self, log_level: LogLevel) -> Self {
        Self {
            log_level,
            ..self.clone()
        }
    }

    /// Returns a copy with staking TLS requested or not.
    pub fn with_staking_tls(&self, staking_tls_enabled: bool) -> Self {
        Self {
            staking_tls_enabled,
            ..self.clone()
        }
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::EmptyImage);
        }
        if self.http_port == 0 {
            return Err(ConfigError::ZeroPort { field: "http_port" });
        }
        if self.staking_port == 0 {
            return Err(ConfigError::ZeroPort {
                field: "staking_port",
            });
        }
        if self.http_port == self.staking_port {
            return Err(ConfigError::PortCollision(self.http_port));
        }
        if self.snow_sample_size == 0 {
            return Err(ConfigError::ZeroSampleSize);
        }
        if self.snow_quorum_size == 0 || self.snow_quorum_size > self.snow_sample_size {
            return Err(ConfigError::QuorumOutOfRange {
                quorum: self.snow_quorum_size,
                sample: self.snow_sample_size,
            });
        }
        Ok(())
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_owned(),
            snow_sample_size: 2,
            snow_quorum_size: 2,
            staking_tls_enabled: true,
            log_level: LogLevel::Debug,
            http_port: DEFAULT_HTTP_PORT,
            staking_port: DEFAULT_STAKING_PORT,
        }
    }
}

/// Builder for [`FactoryConfig`].
#[derive(Clone, Debug, Default)]
pub struct FactoryConfigBuilder {
    image: Option<String>,
    snow_sample_size: Option<u32>,
    snow_quorum_size: Option<u32>,
    staking_tls_enabled: Option<bool>,
    log_level: Option<LogLevel>,
    http_port: Option<u16>,
    staking_port: Option<u16>,
}

impl FactoryConfigBuilder {
    /// Sets the container image.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Sets the snow sample size.
    pub fn snow_sample_size(mut self, size: u32) -> Self {
        self.snow_sample_size = Some(size);
        self
    }

    /// Sets the snow quorum size.
    pub fn snow_quorum_size(mut self, size: u32) -> Self {
        self.snow_quorum_size = Some(size);
        self
    }

    /// Requests TLS-based staking identities.
    pub fn staking_tls_enabled(mut self, enabled: bool) -> Self {
        self.staking_tls_enabled = Some(enabled);
        self
    }

    /// Sets the node log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Sets the JSON-RPC API port.
    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    /// Sets the staking/gossip port.
    pub fn staking_port(mut self, port: u16) -> Self {
        self.staking_port = Some(port);
        self
    }

    /// Builds the configuration, applying defaults for unset values.
    pub fn build(self) -> Result<FactoryConfig, ConfigError> {
        let default = FactoryConfig::default();
        let config = FactoryConfig {
            image: self.image.unwrap_or(default.image),
            snow_sample_size: self.snow_sample_size.unwrap_or(default.snow_sample_size),
            snow_quorum_size: self.snow_quorum_size.unwrap_or(default.snow_quorum_size),
            staking_tls_enabled: self
                .staking_tls_enabled
                .unwrap_or(default.staking_tls_enabled),
            log_level: self.log_level.unwrap_or(default.log_level),
            http_port: self.http_port.unwrap_or(default.http_port),
            staking_port: self.staking_port.unwrap_or(default.staking_port),
        };
        config.validate()?;
        Ok(config)
    }
}

/// The on-disk form of [`FactoryConfig`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawFactoryConfig {
    image: Option<String>,
    snow_sample_size: Option<u32>,
    snow_quorum_size: Option<u32>,
    staking_tls_enabled: Option<bool>,
    log_level: Option<LogLevel>,
    http_port: Option<u16>,
    staking_port: Option<u16>,
}

impl TryFrom<RawFactoryConfig> for FactoryConfig {
    type Error = ConfigError;

    fn try_from(raw: RawFactoryConfig) -> Result<Self, Self::Error> {
        FactoryConfigBuilder {
            image: raw.image,
            snow_sample_size: raw.snow_sample_size,
            snow_quorum_size: raw.snow_quorum_size,
            staking_tls_enabled: raw.staking_tls_enabled,
            log_level: raw.log_level,
            http_port: raw.http_port,
            staking_port: raw.staking_port,
        }
        .build()
    }
}

impl From<FactoryConfig> for RawFactoryConfig {
    fn from(cfg: FactoryConfig) -> Self {
        Self {
            image: Some(cfg.image),
            snow_sample_size: Some(cfg.snow_sample_size),
            snow_quorum_size: Some(cfg.snow_quorum_size),
            staking_tls_enabled: Some(cfg.staking_tls_enabled),
            log_level: Some(cfg.log_level),
            http_port: Some(cfg.http_port),
            staking_port: Some(cfg.staking_port),
        }
    }
}
