use crate::conversions::{DEFAULT_FILAMENT_DENSITY, DEFAULT_FILAMENT_DIAMETER_MM};
use crate::error::CoreError;

/// Synchronizer configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base HTTP URL of the server, e.g. `http://octopi.local`.
    pub base_url: String,
    /// API key used to obtain a session from the login endpoint.
    pub api_key: String,
    /// Whether the layer-progress plugin is installed and should be used
    /// for fan speed and layer counters.
    pub layer_progress_enabled: bool,
    pub filament_diameter_mm: f64,
    /// Filament density in g/cm³.
    pub filament_density: f64,
    /// Optional `throttle` multiplier sent after authentication.
    pub throttle: Option<u32>,
}

impl SyncConfig {
    /// Build a config with defaults for everything but the server address
    /// and key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            layer_progress_enabled: false,
            filament_diameter_mm: DEFAULT_FILAMENT_DIAMETER_MM,
            filament_density: DEFAULT_FILAMENT_DENSITY,
            throttle: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Default  |
    /// |--------------------------|----------|
    /// | `OCTOPRINT_URL`          | required |
    /// | `OCTOPRINT_API_KEY`      | required |
    /// | `LAYER_PROGRESS_ENABLED` | `false`  |
    /// | `FILAMENT_DIAMETER_MM`   | `1.75`   |
    /// | `FILAMENT_DENSITY`       | `1.25`   |
    /// | `SOCKET_THROTTLE`        | unset    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("OCTOPRINT_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::Validation("OCTOPRINT_URL must be set".to_string()))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CoreError::Validation(format!(
                "OCTOPRINT_URL must be an http(s) URL, got {base_url:?}"
            )));
        }

        let api_key = lookup("OCTOPRINT_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::Validation("OCTOPRINT_API_KEY must be set".to_string()))?;

        let layer_progress_enabled = match lookup("LAYER_PROGRESS_ENABLED") {
            Some(raw) => parse_bool("LAYER_PROGRESS_ENABLED", &raw)?,
            None => false,
        };

        let filament_diameter_mm = match lookup("FILAMENT_DIAMETER_MM") {
            Some(raw) => parse_positive("FILAMENT_DIAMETER_MM", &raw)?,
            None => DEFAULT_FILAMENT_DIAMETER_MM,
        };

        let filament_density = match lookup("FILAMENT_DENSITY") {
            Some(raw) => parse_positive("FILAMENT_DENSITY", &raw)?,
            None => DEFAULT_FILAMENT_DENSITY,
        };

        let throttle = match lookup("SOCKET_THROTTLE") {
            Some(raw) => Some(parse_throttle(&raw)?),
            None => None,
        };

        Ok(Self {
            base_url,
            api_key,
            layer_progress_enabled,
            filament_diameter_mm,
            filament_density,
            throttle,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<f64, CoreError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| {
            CoreError::Validation(format!("{key} must be a positive number, got {raw:?}"))
        })
}

fn parse_throttle(raw: &str) -> Result<u32, CoreError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "SOCKET_THROTTLE must be a positive integer, got {raw:?}"
            ))
        })
}
