//! Declarative run descriptions
//!
//! A [`Receipt`] is what a user hands in; the runner turns it into a
//! [`Config`] that is consumed once by container creation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Environment variable bounding every progress-making runtime call
pub const DEADLINE_ENV: &str = "CONTMAN_DEADLINE_SECS";

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// A host path bound into the container filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

impl Mount {
    pub fn new(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only,
        }
    }
}

/// Container creation parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub image: String,
    /// Shell command, run as `sh -c <cmd>`
    pub cmd: String,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    /// `None` keeps the working directory baked into the image
    pub working_dir: Option<String>,
}

/// One container run: image, command, copy lists and flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Receipt {
    pub image: String,
    pub cmd: String,
    pub env: BTreeMap<String, String>,
    /// Host source path -> container destination directory
    pub input_copy: BTreeMap<String, String>,
    /// Container source path -> host destination directory
    pub output_copy: BTreeMap<String, String>,
    /// Grace period for stopping a container that is still running at cleanup
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub use_control_socket: bool,
    pub use_local_image: bool,
    pub only_create: bool,
    pub use_image_working_dir: bool,
}

impl Default for Receipt {
    fn default() -> Self {
        Self {
            image: String::new(),
            cmd: String::new(),
            env: BTreeMap::new(),
            input_copy: BTreeMap::new(),
            output_copy: BTreeMap::new(),
            timeout: DEFAULT_STOP_TIMEOUT,
            use_control_socket: false,
            use_local_image: false,
            only_create: false,
            use_image_working_dir: false,
        }
    }
}

impl Receipt {
    pub fn new(image: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cmd: cmd.into(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Settings for the Docker-backed manager
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Upper bound on the whole run, measured from manager creation
    pub deadline: Option<Duration>,
}

impl ManagerConfig {
    /// Read settings from the process environment
    ///
    /// An unparsable deadline is ignored with a warning.
    pub fn from_env() -> Self {
        let deadline = match std::env::var(DEADLINE_ENV) {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(e) => {
                    log::warn!("Ignoring invalid {}='{}': {}", DEADLINE_ENV, value, e);
                    None
                }
            },
            Err(_) => None,
        };

        Self { deadline }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
