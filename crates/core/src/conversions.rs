//! Unit conversions applied to raw socket telemetry before it reaches
//! [`PrinterStatus`](crate::printer::PrinterStatus) or
//! [`JobStatus`](crate::job::JobStatus).

use std::f64::consts::PI;

use chrono::TimeDelta;

use crate::types::LocalTimestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Unit label attached to every temperature reading.
pub const TEMPERATURE_UNIT: &str = "°C";

/// Unit label attached to every duration shown as `H:MM`.
pub const DURATION_UNIT: &str = "h";

/// File extensions stripped from the display name of the active job.
pub const KNOWN_FILE_EXTENSIONS: &[&str] = &[".gcode", ".gco", ".ufp"];

/// Default filament diameter in millimetres.
pub const DEFAULT_FILAMENT_DIAMETER_MM: f64 = 1.75;

/// Default filament density in g/cm³ (PLA).
pub const DEFAULT_FILAMENT_DENSITY: f64 = 1.25;

// ---------------------------------------------------------------------------
// Temperatures
// ---------------------------------------------------------------------------

/// Round a heater reading to the nearest whole degree.
pub fn round_temperature(value: f64) -> i32 {
    value.round() as i32
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

/// Format a number of seconds as `H:MM`.
///
/// Hours are not zero-padded and may exceed 24. Negative or non-finite
/// input is treated as zero.
pub fn format_hours(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    format!("{hours}:{minutes:02}")
}

/// Wall-clock time `remaining_seconds` after `now`, formatted `HH:MM`.
///
/// Wraps past midnight (a print finishing tomorrow at 01:30 shows `01:30`).
pub fn end_clock_time(now: LocalTimestamp, remaining_seconds: f64) -> String {
    let seconds = if remaining_seconds.is_finite() && remaining_seconds > 0.0 {
        remaining_seconds as i64
    } else {
        0
    };
    let end = TimeDelta::try_seconds(seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now);
    end.format("%H:%M").to_string()
}

// ---------------------------------------------------------------------------
// Filament
// ---------------------------------------------------------------------------

/// Convert a filament length in millimetres into grams.
///
/// Volume is that of a cylinder with the given diameter; the result is
/// rounded to one decimal place.
pub fn filament_weight_grams(length_mm: f64, diameter_mm: f64, density_g_cm3: f64) -> f64 {
    let radius = diameter_mm / 2.0;
    let volume_cm3 = length_mm * PI * radius * radius / 1000.0;
    (volume_cm3 * density_g_cm3 * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

/// Strip a known G-code extension from a file name, case-insensitively.
pub fn strip_known_extension(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    KNOWN_FILE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &name[..name.len() - ext.len()])
        .unwrap_or(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
