use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Default User-Agent for direct HTTP calls
pub const DEFAULT_USER_AGENT: &str = concat!("autorepo-gateway/", env!("CARGO_PKG_VERSION"));

/// Environment identifier sent in every relay envelope
pub const DEFAULT_RELAY_ENV_ID: &str = "autorepo-backend-8faokd7f798030e";

/// Prefix for environment-variable overrides (`AUTOREPO__TIMEOUT_RETRIES=2`)
const ENV_PREFIX: &str = "AUTOREPO__";

/// Physical channel used to reach the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Plain HTTP request to `base_address + path`
    Direct,
    /// Host-managed call-through-container channel
    Relay,
}

/// Row key of the fixed environment table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentName {
    /// Developer simulator talking to a local backend
    Dev,
    /// Physical device talking to a backend on the LAN
    Device,
    /// Production, through the managed relay
    #[default]
    Prod,
}

impl EnvironmentName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Device => "device",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the backend lives and how to reach it.
///
/// Selected once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub base_address: String,
    pub transport_mode: TransportMode,
    pub label: String,
}

impl EnvironmentDescriptor {
    #[must_use]
    pub fn new(
        base_address: impl Into<String>,
        transport_mode: TransportMode,
        label: impl Into<String>,
    ) -> Self {
        Self {
            base_address: base_address.into(),
            transport_mode,
            label: label.into(),
        }
    }

    /// Row of the fixed environment table.
    #[must_use]
    pub fn for_environment(name: EnvironmentName) -> Self {
        match name {
            EnvironmentName::Dev => Self::new(
                "http://localhost:8000/api",
                TransportMode::Direct,
                "developer simulator (localhost)",
            ),
            EnvironmentName::Device => Self::new(
                "http://192.168.1.196:8000/api",
                TransportMode::Direct,
                "on-device debugging (LAN IP)",
            ),
            EnvironmentName::Prod => Self::new(
                "/api",
                TransportMode::Relay,
                "production (managed container relay)",
            ),
        }
    }
}

/// Gateway configuration.
///
/// Loaded in layers: defaults, then an optional YAML file, then
/// `AUTOREPO__*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Row of the environment table to use (default: `prod`)
    pub environment: EnvironmentName,

    /// Replaces the table's base address, keeping its transport mode
    pub base_address: Option<String>,

    /// Identifier placed in every relay envelope
    pub relay_env_id: String,

    /// Per-attempt transport timeout (default: 30s)
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Resubmissions allowed after a transport timeout (default: 1)
    pub timeout_retries: u32,

    /// User-Agent header for direct calls
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentName::default(),
            base_address: None,
            relay_env_id: DEFAULT_RELAY_ENV_ID.to_owned(),
            request_timeout: Duration::from_secs(30),
            timeout_retries: 1,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl GatewayConfig {
    /// Configuration for a given environment with every other field defaulted.
    #[must_use]
    pub fn for_environment(environment: EnvironmentName) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    /// Configuration for tests against a local mock server
    ///
    /// Direct transport to `base_address`, 2s timeout, no timeout retries.
    #[must_use]
    pub fn for_testing(base_address: impl Into<String>) -> Self {
        Self {
            environment: EnvironmentName::Dev,
            base_address: Some(base_address.into()),
            request_timeout: Duration::from_secs(2),
            timeout_retries: 0,
            ..Self::default()
        }
    }

    /// Load layered configuration.
    ///
    /// # Errors
    /// Returns a figment error if the YAML file is malformed or a value has
    /// the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// The environment descriptor this configuration selects.
    #[must_use]
    pub fn descriptor(&self) -> EnvironmentDescriptor {
        let mut descriptor = EnvironmentDescriptor::for_environment(self.environment);
        if let Some(base) = &self.base_address {
            descriptor.base_address.clone_from(base);
        }
        descriptor
    }
}

/// Serde adapter for humantime durations (`"30s"`, `"1m 30s"`).
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}
