//! Job status record.
//!
//! A [`JobStatus`] is scoped to one file: when the active file changes the
//! whole record is reset before new values are applied.

use serde::{Deserialize, Serialize};

use crate::conversions::{format_hours, DURATION_UNIT};

/// Duration rendered as `H:MM` with an hours unit label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayDuration {
    pub value: String,
    pub unit: String,
}

impl DisplayDuration {
    pub fn from_seconds(seconds: f64) -> Self {
        Self {
            value: format_hours(seconds),
            unit: DURATION_UNIT.to_string(),
        }
    }
}

impl Default for DisplayDuration {
    fn default() -> Self {
        Self::from_seconds(0.0)
    }
}

/// Current height of the print head.
///
/// The shape depends on whether layer-progress tracking is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerHeight {
    /// Z height in millimetres, taken from the status frame.
    Current(f64),
    /// Layer counters reported by the layer-progress plugin.
    Layers { current: u32, total: u32 },
}

impl LayerHeight {
    pub fn initial(layer_progress_enabled: bool) -> Self {
        if layer_progress_enabled {
            LayerHeight::Layers {
                current: 0,
                total: 0,
            }
        } else {
            LayerHeight::Current(0.0)
        }
    }
}

/// Authoritative job status for the active file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Display name with known G-code extensions stripped.
    pub file_name: String,
    /// `/<origin>/<path>`, e.g. `/local/parts/benchy.gcode`.
    pub full_path: String,
    pub progress_percent: u8,
    pub layer_height: LayerHeight,
    /// Estimated filament use in grams.
    pub filament_weight: f64,
    pub elapsed_time: DisplayDuration,
    pub remaining_time: DisplayDuration,
    pub estimated_total_time: DisplayDuration,
    /// Local `HH:MM` at which the print should finish.
    pub estimated_end_clock_time: Option<String>,
}

impl JobStatus {
    /// Default record for a new connection cycle or a new file.
    pub fn initial(layer_progress_enabled: bool) -> Self {
        Self {
            file_name: String::new(),
            full_path: String::new(),
            progress_percent: 0,
            layer_height: LayerHeight::initial(layer_progress_enabled),
            filament_weight: 0.0,
            elapsed_time: DisplayDuration::default(),
            remaining_time: DisplayDuration::default(),
            estimated_total_time: DisplayDuration::default(),
            estimated_end_clock_time: None,
        }
    }
}
