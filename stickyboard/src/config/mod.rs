//! Configuration for the `stickyboard` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/stickyboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error. The account password is
//! never read from the file.

use std::path::PathBuf;
use std::time::Duration;

use stickyboard_proto::task::{Position, Priority, TaskId};

use crate::backend::remote::RemoteOptions;
use crate::canvas::{Bounds, DEFAULT_CLICK_GUARD, NoteSize, Viewport};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The hub URL is not a `ws://` or `wss://` URL.
    #[error("invalid hub URL `{url}`: {reason}")]
    InvalidHubUrl {
        /// The rejected value.
        url: String,
        /// What was wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    hub: HubFileConfig,
    account: AccountFileConfig,
    canvas: CanvasFileConfig,
}

/// `[hub]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct HubFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// `[account]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AccountFileConfig {
    email: Option<String>,
}

/// `[canvas]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CanvasFileConfig {
    viewport_width: Option<f64>,
    viewport_height: Option<f64>,
    note_width: Option<f64>,
    note_height: Option<f64>,
    click_guard_ms: Option<u64>,
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Default hub WebSocket URL.
pub const DEFAULT_HUB_URL: &str = "ws://127.0.0.1:9000/ws";

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Hub --
    /// Hub WebSocket URL.
    pub hub_url: String,
    /// Timeout for connecting to the hub.
    pub connect_timeout: Duration,
    /// Timeout for a single hub request.
    pub request_timeout: Duration,

    // -- Account --
    /// Login email.
    pub email: Option<String>,
    /// Login password (CLI or environment only).
    pub password: Option<String>,

    // -- Canvas --
    /// Visible canvas size.
    pub viewport: Viewport,
    /// Rendered note size.
    pub note: NoteSize,
    /// How long the click ending a drag is ignored.
    pub click_guard: Duration,
    /// Timestamp display format (chrono format string).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            email: None,
            password: None,
            viewport: Viewport::new(1024.0, 768.0),
            note: NoteSize::default(),
            click_guard: DEFAULT_CLICK_GUARD,
            timestamp_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the resolved hub URL is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        validate_hub_url(&config.hub_url)?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            hub_url: cli
                .hub_url
                .clone()
                .or_else(|| file.hub.url.clone())
                .unwrap_or(defaults.hub_url),
            connect_timeout: file
                .hub
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .hub
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            email: cli.email.clone().or_else(|| file.account.email.clone()),
            password: cli.password.clone(),
            viewport: Viewport::new(
                cli.viewport_width
                    .or(file.canvas.viewport_width)
                    .unwrap_or(defaults.viewport.width),
                cli.viewport_height
                    .or(file.canvas.viewport_height)
                    .unwrap_or(defaults.viewport.height),
            ),
            note: NoteSize {
                width: file.canvas.note_width.unwrap_or(defaults.note.width),
                height: file.canvas.note_height.unwrap_or(defaults.note.height),
            },
            click_guard: file
                .canvas
                .click_guard_ms
                .map_or(defaults.click_guard, Duration::from_millis),
            timestamp_format: file
                .canvas
                .timestamp_format
                .clone()
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Canvas bounds for the configured viewport and note size.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        Bounds::new(self.viewport, self.note)
    }

    /// Connection tuning for the hub adapter.
    #[must_use]
    pub const fn remote_options(&self) -> RemoteOptions {
        RemoteOptions {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }

    /// Email and password, if both are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.email.as_deref()?, self.password.as_deref()?))
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Sticky-note task board")]
pub struct CliArgs {
    /// WebSocket URL of the hub.
    #[arg(long, env = "STICKYBOARD_HUB_URL")]
    pub hub_url: Option<String>,

    /// Account email.
    #[arg(long, env = "STICKYBOARD_EMAIL")]
    pub email: Option<String>,

    /// Account password.
    #[arg(long, env = "STICKYBOARD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to config file (default: `~/.config/stickyboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Canvas width used for clamping.
    #[arg(long)]
    pub viewport_width: Option<f64>,

    /// Canvas height used for clamping.
    #[arg(long)]
    pub viewport_height: Option<f64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "STICKYBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/stickyboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do (default: `list`).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Board commands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Register a new account.
    Signup {
        /// Display name (default: the part of the email before `@`).
        #[arg(long)]
        name: Option<String>,
    },
    /// List your notes, newest first.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Create a note.
    Add {
        /// Note title (default: "New Task").
        #[arg(default_value = "")]
        title: String,
        /// low, medium or high.
        #[arg(long, short, default_value = "medium")]
        priority: Priority,
        /// Position as `x,y` (default: random).
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        at: Option<Position>,
    },
    /// Change a note's text or priority.
    Edit {
        /// Note id.
        id: TaskId,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the description.
        #[arg(long)]
        clear_description: bool,
        /// New priority.
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Drag a note to a new position (clamped to the canvas).
    #[command(allow_negative_numbers = true)]
    Move {
        /// Note id.
        id: TaskId,
        /// Target x.
        x: f64,
        /// Target y.
        y: f64,
    },
    /// Delete a note.
    Rm {
        /// Note id.
        id: TaskId,
    },
    /// Pull notes outside the canvas back into view.
    Recover,
    /// Print changes made in other sessions until Ctrl-C.
    Watch,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Parses `x,y` into a position.
fn parse_point(raw: &str) -> Result<Position, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got `{raw}`"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x `{x}`: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y `{y}`: {e}"))?;
    Ok(Position::new(x, y))
}

fn validate_hub_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidHubUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("stickyboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
