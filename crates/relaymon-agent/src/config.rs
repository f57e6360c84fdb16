use anyhow::{bail, Context, Result};
use relaymon_common::json::from_value_ci;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Transport used to reach the remote event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(format!("bad riemann protocol: {s:?}")),
        }
    }
}

/// Agent configuration, read from a JSON file.
///
/// All fields are optional in the file; field names are matched
/// case-insensitively.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(rename = "modulesdirectory")]
    pub modules_directory: String,
    #[serde(rename = "driversdirectory")]
    pub drivers_directory: String,
    #[serde(rename = "riemannhost")]
    pub riemann_host: String,
    #[serde(rename = "riemannprotocol")]
    pub riemann_protocol: String,
    #[serde(rename = "logfile")]
    pub log_file: String,
    #[serde(rename = "loglevel")]
    pub log_level: String,
    #[serde(rename = "pidfile")]
    pub pid_file: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            modules_directory: "custom-modules".into(),
            drivers_directory: "drivers".into(),
            riemann_host: "localhost:5555".into(),
            riemann_protocol: "udp".into(),
            log_file: "-".into(),
            log_level: "info".into(),
            pid_file: String::new(),
        }
    }
}

impl Configuration {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Configuration> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("can't open {}", path.display()))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).context("invalid configuration JSON")?;
        let mut cfg: Configuration = from_value_ci(value).context("invalid configuration")?;

        cfg.riemann_protocol
            .parse::<Protocol>()
            .map_err(|e| anyhow::anyhow!(e))?;
        if cfg.drivers_directory.is_empty() {
            bail!("empty drivers directory");
        }

        cfg.drivers_directory = normalize_path(path, &cfg.drivers_directory);
        if !cfg.modules_directory.is_empty() {
            cfg.modules_directory = normalize_path(path, &cfg.modules_directory);
        }

        Ok(cfg)
    }

    /// The validated transport protocol.
    pub fn protocol(&self) -> Protocol {
        match self.riemann_protocol.as_str() {
            "tcp" => Protocol::Tcp,
            _ => Protocol::Udp,
        }
    }

    /// The modules directory, or `None` when external modules are disabled.
    pub fn modules_directory_path(&self) -> Option<PathBuf> {
        if self.modules_directory.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.modules_directory))
        }
    }
}

/// Resolves a configured path: `./`-prefixed names are relative to the
/// configuration file's directory, other relative names to the current
/// working directory. The result is absolute.
pub fn normalize_path(config_file: &Path, name: &str) -> String {
    let path = match name.strip_prefix("./") {
        Some(rest) => config_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(rest),
        None => PathBuf::from(name),
    };
    match std::path::absolute(&path) {
        Ok(abs) => abs.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}
