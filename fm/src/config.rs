//! FedMgr configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main FedMgr configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Federation execution settings
    pub federation: FederationSection,

    /// This federate's identity and time policy
    pub federate: FederateSection,

    /// Coordination process management
    pub rtig: RtigSection,

    /// Run trace output
    pub trace: TraceSection,

    /// Log level override (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl FederationConfig {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.federation.name.is_empty() {
            return Err(eyre::eyre!("federation.name must not be empty"));
        }
        if self.federate.name.is_empty() {
            return Err(eyre::eyre!("federate.name must not be empty"));
        }
        if !self.federate.lookahead.is_finite() || self.federate.lookahead < 0.0 {
            return Err(eyre::eyre!(
                "federate.lookahead must be a finite non-negative number, got {}",
                self.federate.lookahead
            ));
        }
        if !self.federate.step.is_finite() || self.federate.step <= 0.0 {
            return Err(eyre::eyre!(
                "federate.step must be a finite positive number, got {}",
                self.federate.step
            ));
        }
        if !self.federate.start_time.is_finite() || !self.federate.stop_time.is_finite() {
            return Err(eyre::eyre!("federate start/stop times must be finite"));
        }
        if self.federate.start_time > self.federate.stop_time {
            return Err(eyre::eyre!(
                "federate.start-time {} is after federate.stop-time {}",
                self.federate.start_time,
                self.federate.stop_time
            ));
        }
        if self.federation.register_sync_point && self.federation.sync_point.is_empty() {
            return Err(eyre::eyre!(
                "federation.register-sync-point requires federation.sync-point"
            ));
        }
        if self.rtig.manage && self.rtig.program.is_empty() {
            return Err(eyre::eyre!("rtig.manage requires rtig.program"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: fedmgr.yml
        let local_config = PathBuf::from("fedmgr.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/fedmgr/fedmgr.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("fedmgr").join("fedmgr.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Directory the coordination process runs in, derived from the FOM path
    pub fn working_dir(&self) -> PathBuf {
        self.federation
            .fom_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Federation execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationSection {
    /// Federation execution name
    pub name: String,

    /// Federation object model file handed to the RTI on create
    #[serde(rename = "fom-file")]
    pub fom_file: PathBuf,

    /// Startup synchronization point label, empty to skip the barrier
    #[serde(rename = "sync-point")]
    pub sync_point: String,

    /// Whether this federate registers the startup point
    #[serde(rename = "register-sync-point")]
    pub register_sync_point: bool,
}

impl Default for FederationSection {
    fn default() -> Self {
        Self {
            name: "demo".to_string(),
            fom_file: PathBuf::from("demo.fed"),
            sync_point: "ready".to_string(),
            register_sync_point: true,
        }
    }
}

/// This federate's identity and time policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederateSection {
    /// Federate name, unique within the federation
    pub name: String,

    /// Receive messages in timestamp order
    #[serde(rename = "time-constrained")]
    pub time_constrained: bool,

    /// Promise a lower bound on outgoing message timestamps
    #[serde(rename = "time-regulating")]
    pub time_regulating: bool,

    /// Advance with next-event requests instead of time-stepped requests
    #[serde(rename = "event-driven")]
    pub event_driven: bool,

    /// Lookahead in logical seconds
    pub lookahead: f64,

    /// Logical seconds per advance step
    pub step: f64,

    /// Initial logical time
    #[serde(rename = "start-time")]
    pub start_time: f64,

    /// Logical time the run ends at
    #[serde(rename = "stop-time")]
    pub stop_time: f64,
}

impl Default for FederateSection {
    fn default() -> Self {
        Self {
            name: "federate-1".to_string(),
            time_constrained: true,
            time_regulating: true,
            event_driven: false,
            lookahead: 0.1,
            step: 1.0,
            start_time: 0.0,
            stop_time: 10.0,
        }
    }
}

/// Coordination process management
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtigSection {
    /// Whether this federate launches and tears down the process
    pub manage: bool,

    /// Coordination process executable
    pub program: String,

    /// TCP port the process serves on
    pub port: u16,

    /// How long to watch a fresh process for port contention, in milliseconds
    #[serde(rename = "settle-ms")]
    pub settle_ms: u64,

    /// Extra environment for the process (CERTI_HOST and friends)
    pub env: BTreeMap<String, String>,
}

impl RtigSection {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for RtigSection {
    fn default() -> Self {
        Self {
            manage: false,
            program: "rtig".to_string(),
            port: 60400,
            settle_ms: 500,
            env: BTreeMap::new(),
        }
    }
}

/// Run trace output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSection {
    /// Whether to write the JSONL run trace
    pub enabled: bool,

    /// Trace file path
    pub path: PathBuf,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("fedmgr-trace.jsonl"),
        }
    }
}
