//! Configuration for the receiver.

use std::path::Path;

use serde::{Deserialize, Serialize};

use pixwire_core::{DEFAULT_PORT, FrameKind, ModeProvider, PipelineConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Decode mode settings.
    pub mode: ModeConfig,
    /// Framing, decode and queue tuning.
    pub pipeline: PipelineConfig,
    /// Render loop settings.
    pub render: RenderConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the image listener on.
    pub bind_address: String,
    /// TCP port for the image stream.
    pub listen_port: u16,
}

/// Decode mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// Mode to start in: "jpeg", "lz4" or "raw".
    pub initial: FrameKind,
}

/// Render loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Canvas width in pixels.
    pub canvas_width: u32,
    /// Canvas height in pixels.
    pub canvas_height: u32,
    /// Render tick in milliseconds.
    pub interval_ms: u64,
    /// Seconds between stats log lines (0 disables them).
    pub stats_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            mode: ModeConfig::default(),
            pipeline: PipelineConfig::default(),
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            listen_port: DEFAULT_PORT,
        }
    }
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            initial: FrameKind::Jpeg,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            canvas_width: 320,
            canvas_height: 240,
            interval_ms: 16,
            stats_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where a loaded configuration came from.
///
/// Loading usually happens before logging is set up, so the outcome is
/// returned and reported once a subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the file.
    File,
    /// No readable file; defaults used.
    Missing,
    /// The file did not parse; defaults used.
    Invalid(String),
}

impl ConfigSource {
    /// Log how the configuration at `path` was obtained.
    pub fn report(&self, path: &Path) {
        match self {
            ConfigSource::File => tracing::info!("loaded config from {}", path.display()),
            ConfigSource::Missing => {
                tracing::info!("no config at {}; using defaults", path.display())
            }
            ConfigSource::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

impl ReceiverConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// `address:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.listen_port)
    }
}

impl ModeProvider for ReceiverConfig {
    fn configured_mode(&self) -> FrameKind {
        self.mode.initial
    }
}

// ── Tests ────────────────────────────────────────────────────────
