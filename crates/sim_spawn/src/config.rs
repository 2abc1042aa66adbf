use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use sim_spawn_proto::{Location, Rotation, Transform};
use thiserror::Error;

use crate::spawn::Pose;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 2000;
pub const DEFAULT_TIMEOUT_SECS: f64 = 2000.0;
pub const DEFAULT_BLUEPRINT_PATTERN: &str = "vehicle.*";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: f64,
    pub blueprint: String,
    /// Keys left out of the file keep their values from
    /// [`default_spawn_point`].
    #[serde(deserialize_with = "deserialize_spawn_point")]
    pub spawn_point: Transform,
    pub max_ticks: Option<u64>,
    pub poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            blueprint: DEFAULT_BLUEPRINT_PATTERN.to_string(),
            spawn_point: default_spawn_point(),
            max_ticks: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

pub fn default_spawn_point() -> Transform {
    Transform {
        location: Location {
            x: -2900.0,
            y: 5.3,
            z: 0.1,
        },
        rotation: Rotation {
            roll: 0.0,
            pitch: 0.0,
            yaw: 90.0,
        },
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LocationPatch {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RotationPatch {
    roll: Option<f64>,
    pitch: Option<f64>,
    yaw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SpawnPointPatch {
    location: LocationPatch,
    rotation: RotationPatch,
}

impl SpawnPointPatch {
    fn apply(self, base: Transform) -> Transform {
        let Transform { location, rotation } = base;
        Transform {
            location: Location {
                x: self.location.x.unwrap_or(location.x),
                y: self.location.y.unwrap_or(location.y),
                z: self.location.z.unwrap_or(location.z),
            },
            rotation: Rotation {
                roll: self.rotation.roll.unwrap_or(rotation.roll),
                pitch: self.rotation.pitch.unwrap_or(rotation.pitch),
                yaw: self.rotation.yaw.unwrap_or(rotation.yaw),
            },
        }
    }
}

fn deserialize_spawn_point<'de, D>(deserializer: D) -> Result<Transform, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(SpawnPointPatch::deserialize(deserializer)?.apply(default_spawn_point()))
}

impl ControllerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_blueprint(mut self, pattern: impl Into<String>) -> Self {
        self.blueprint = pattern.into();
        self
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs must be a positive number, got {}",
                self.timeout_secs
            )));
        }
        Duration::try_from_secs_f64(self.timeout_secs)
            .map_err(|err| ConfigError::Invalid(format!("timeout_secs: {err}")))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be in 1..=65535".to_string()));
        }
        self.timeout()?;
        if self.blueprint.is_empty() {
            return Err(ConfigError::Invalid(
                "blueprint pattern must not be empty".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        Pose::try_from(self.spawn_point)
            .map_err(|err| ConfigError::Invalid(format!("spawn_point: {err}")))?;
        Ok(())
    }
}
