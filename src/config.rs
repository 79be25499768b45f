//! Server configuration.
//!
//! Read from a TOML file; every key is optional. Command-line flags are applied on top
//! by the binary.

use crate::error::{FloatError, Result};
use crate::gradient::GradientTable;
use crate::transport::load_host_key;
use russh_keys::key::KeyPair;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:2222";
pub const DEFAULT_FRAME_RATE: u32 = 60;
pub const DEFAULT_REPAINT_RATE: u32 = 60;
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 30;
/// Highest frame or repaint rate accepted, in Hz.
pub const MAX_RATE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the SSH listener binds to.
    pub listen: SocketAddr,
    /// Canvas frames per second.
    pub frame_rate: u32,
    /// Per-viewer repaints per second.
    pub repaint_rate: u32,
    /// How long a new client gets to log in and open a shell.
    pub login_timeout_secs: u64,
    /// SSH host key. A fresh one is generated at startup when unset.
    pub host_key: Option<PathBuf>,
    /// Gradient table replacing the built-in one.
    pub gradients: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 2222)),
            frame_rate: DEFAULT_FRAME_RATE,
            repaint_rate: DEFAULT_REPAINT_RATE,
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
            host_key: None,
            gradients: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ServerConfig =
            toml::from_str(contents).map_err(|e| FloatError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FloatError::io(format!("reading {}", path.display()), e))?;
        Self::from_toml_str(&contents)
    }

    /// The platform config file if it exists, otherwise defaults.
    pub fn discover() -> Result<Self> {
        #[cfg(feature = "config")]
        {
            if let Some(path) = Self::default_path().filter(|path| path.is_file()) {
                log::debug!("loading configuration from {}", path.display());
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// `<config dir>/floatterm/config.toml`.
    #[cfg(feature = "config")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("floatterm").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        for (key, rate) in [
            ("frame_rate", self.frame_rate),
            ("repaint_rate", self.repaint_rate),
        ] {
            if !(1..=MAX_RATE).contains(&rate) {
                return Err(FloatError::config(format!(
                    "{key} must be between 1 and {MAX_RATE}, got {rate}"
                )));
            }
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        rate_interval(self.frame_rate)
    }

    pub fn repaint_interval(&self) -> Duration {
        rate_interval(self.repaint_rate)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    /// The configured host key, or a generated one.
    pub fn host_key(&self) -> Result<KeyPair> {
        load_host_key(self.host_key.as_deref())
    }

    /// The configured gradient table, or the built-in one.
    pub fn gradient_table(&self) -> Result<GradientTable> {
        match &self.gradients {
            Some(path) => GradientTable::load(path),
            None => GradientTable::builtin(),
        }
    }
}

fn rate_interval(rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(rate.clamp(1, MAX_RATE)))
}
