use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::PixelFormat;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Directory accepted frames are written to. Empty or absent falls back
    /// to the user's Desktop.
    #[serde(default)]
    pub data_location: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Seconds between the starts of two consecutive ticks.
    #[serde(default = "default_capture_interval")]
    pub capture_interval: f64,
    /// Minimum mean squared difference from the last saved frame for a new
    /// frame to be saved.
    #[serde(default = "default_min_change_threshold", alias = "min_mse")]
    pub min_change_threshold: f64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: f64,
    /// Sensor exposure in microseconds. Reported at startup only.
    #[serde(default)]
    pub exposure_time: Option<f64>,
    /// Sensor gain. Reported at startup only.
    #[serde(default)]
    pub gain: Option<f64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            capture_interval: default_capture_interval(),
            min_change_threshold: default_min_change_threshold(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            exposure_time: None,
            gain: None,
        }
    }
}

/// Where frames come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Poll a camera endpoint that returns one encoded image per request.
    Http {
        url: String,
        #[serde(default = "default_pixel_format")]
        pixel_format: PixelFormat,
    },
    /// Replay image files from a directory in file-name order.
    Directory {
        path: PathBuf,
        #[serde(default = "default_pixel_format")]
        pixel_format: PixelFormat,
    },
}

impl SourceConfig {
    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            SourceConfig::Http { pixel_format, .. } => *pixel_format,
            SourceConfig::Directory { pixel_format, .. } => *pixel_format,
        }
    }
}

/// Which frames are handed to the display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPolicy {
    /// Only frames that were saved.
    #[default]
    AcceptedOnly,
    /// Every successfully fetched frame, saved or not.
    EveryFrame,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub policy: DisplayPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The values the capture loop reads at the start of every tick.
///
/// Operator surfaces publish a whole new snapshot when any field changes, so
/// a tick never sees the directory from one edit and the threshold from
/// another.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub data_location: PathBuf,
    pub capture_interval: Duration,
    pub min_change_threshold: f64,
    pub fetch_timeout: Duration,
    pub display_policy: DisplayPolicy,
}

impl CaptureConfig {
    /// Build a snapshot from raw values, applying the same checks as the
    /// config file.
    pub fn new(
        data_location: PathBuf,
        capture_interval_secs: f64,
        min_change_threshold: f64,
        fetch_timeout_secs: f64,
        display_policy: DisplayPolicy,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            data_location,
            capture_interval: positive_secs("camera.capture_interval", capture_interval_secs)?,
            min_change_threshold: non_negative("camera.min_change_threshold", min_change_threshold)?,
            fetch_timeout: positive_secs("camera.fetch_timeout_secs", fetch_timeout_secs)?,
            display_policy,
        })
    }
}

/// Interactive fallback for choosing the capture directory.
pub trait DirectoryPrompt {
    /// Ask the operator for a directory. `None` means they declined.
    fn prompt_directory(&self) -> Option<PathBuf>;
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive_secs("camera.capture_interval", self.camera.capture_interval)?;
        non_negative("camera.min_change_threshold", self.camera.min_change_threshold)?;
        positive_secs("camera.fetch_timeout_secs", self.camera.fetch_timeout_secs)?;
        match &self.source {
            SourceConfig::Http { url, .. } if url.trim().is_empty() => Err(ConfigError::Invalid {
                field: "source.url",
                reason: "must not be empty".into(),
            }),
            SourceConfig::Directory { path, .. } if path.as_os_str().is_empty() => {
                Err(ConfigError::Invalid {
                    field: "source.path",
                    reason: "must not be empty".into(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Work out the capture directory.
    ///
    /// A configured path is used as-is (it is created on first save) unless
    /// it exists and is not a directory. Otherwise the user's Desktop is
    /// searched for, then `prompt` is asked.
    pub fn resolve_data_location(
        &self,
        prompt: Option<&dyn DirectoryPrompt>,
    ) -> Result<PathBuf, ConfigError> {
        self.resolve_data_location_in(dirs::desktop_dir(), dirs::home_dir().as_deref(), prompt)
    }

    /// [`Config::resolve_data_location`] with the platform Desktop and home
    /// directory supplied by the caller.
    pub fn resolve_data_location_in(
        &self,
        desktop: Option<PathBuf>,
        home: Option<&Path>,
        prompt: Option<&dyn DirectoryPrompt>,
    ) -> Result<PathBuf, ConfigError> {
        if let Some(configured) = self.configured_data_location()? {
            return Ok(configured);
        }

        tracing::debug!("no data_location configured, falling back to Desktop");
        if let Some(desktop) = desktop.filter(|d| d.is_dir()) {
            return Ok(desktop);
        }
        if let Some(desktop) = home.and_then(find_desktop) {
            return Ok(desktop);
        }

        prompt
            .and_then(|p| p.prompt_directory())
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::NoDataLocation)
    }

    fn configured_data_location(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(configured) = self
            .storage
            .data_location
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        else {
            return Ok(None);
        };
        if configured.exists() && !configured.is_dir() {
            return Err(ConfigError::Invalid {
                field: "storage.data_location",
                reason: format!("{} is not a directory", configured.display()),
            });
        }
        Ok(Some(configured.clone()))
    }

    /// The initial per-tick snapshot.
    pub fn capture_config(&self, data_location: PathBuf) -> Result<CaptureConfig, ConfigError> {
        CaptureConfig::new(
            data_location,
            self.camera.capture_interval,
            self.camera.min_change_threshold,
            self.camera.fetch_timeout_secs,
            self.display.policy,
        )
    }

    /// Snapshot for a config file re-read while a run is in progress.
    ///
    /// An unset `data_location` keeps the directory of `current`, which may
    /// have come from the Desktop search or the startup prompt.
    pub fn reload_capture_config(
        &self,
        current: &CaptureConfig,
    ) -> Result<CaptureConfig, ConfigError> {
        let dir = self
            .configured_data_location()?
            .unwrap_or_else(|| current.data_location.clone());
        self.capture_config(dir)
    }
}

/// `<home>/Desktop`, or the first `<home>/*/Desktop` (e.g. a OneDrive folder).
pub fn find_desktop(home: &Path) -> Option<PathBuf> {
    let direct = home.join("Desktop");
    if direct.is_dir() {
        return Some(direct);
    }
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(home)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join("Desktop"))
        .filter(|p| p.is_dir())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

fn positive_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive number of seconds, got {secs}"),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a non-negative number, got {value}"),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("storage.data_location is not set, no Desktop folder was found and no directory was chosen")]
    NoDataLocation,
}

// Default value functions
fn default_capture_interval() -> f64 {
    10.0
}
fn default_min_change_threshold() -> f64 {
    20.0
}
fn default_fetch_timeout_secs() -> f64 {
    5.0
}
fn default_pixel_format() -> PixelFormat {
    PixelFormat::Rgb8
}
fn default_log_level() -> String {
    "info".into()
}
