//! Printer status record and machine-state labels.

use serde::{Deserialize, Serialize};

use crate::conversions::TEMPERATURE_UNIT;
use crate::error::CoreError;

/// Machine state as reported by the server's `state.text` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// No socket session yet; the initial value of every new cycle.
    Connecting,
    /// Connected to the printer and idle.
    Operational,
    Printing,
    Pausing,
    Paused,
    Resuming,
    Cancelling,
    Finishing,
    Error,
    Offline,
    Closed,
}

impl MachineState {
    pub const ALL: [MachineState; 11] = [
        MachineState::Connecting,
        MachineState::Operational,
        MachineState::Printing,
        MachineState::Pausing,
        MachineState::Paused,
        MachineState::Resuming,
        MachineState::Cancelling,
        MachineState::Finishing,
        MachineState::Error,
        MachineState::Offline,
        MachineState::Closed,
    ];

    /// Lower-case label this state is matched against.
    pub fn as_label(self) -> &'static str {
        match self {
            MachineState::Connecting => "connecting",
            MachineState::Operational => "operational",
            MachineState::Printing => "printing",
            MachineState::Pausing => "pausing",
            MachineState::Paused => "paused",
            MachineState::Resuming => "resuming",
            MachineState::Cancelling => "cancelling",
            MachineState::Finishing => "finishing",
            MachineState::Error => "error",
            MachineState::Offline => "offline",
            MachineState::Closed => "closed",
        }
    }

    /// Map a server state label to a [`MachineState`], ignoring case.
    ///
    /// Error labels carry a reason suffix (`"Error: Thermal runaway"`,
    /// `"Offline after error"`) and map to [`MachineState::Error`].
    /// Anything else unknown is a [`CoreError::UnrecognizedState`].
    pub fn from_label(label: &str) -> Result<Self, CoreError> {
        let normalized = label.trim().to_ascii_lowercase();

        if let Some(state) = Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_label() == normalized)
        {
            return Ok(state);
        }

        if normalized.starts_with("error") || normalized == "offline after error" {
            return Ok(MachineState::Error);
        }

        Err(CoreError::UnrecognizedState(label.to_string()))
    }
}

/// One heater reading, rounded to whole degrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperature {
    pub current: i32,
    pub target: i32,
    pub unit: String,
}

impl Default for Temperature {
    fn default() -> Self {
        Self {
            current: 0,
            target: 0,
            unit: TEMPERATURE_UNIT.to_string(),
        }
    }
}

/// Fan speed value meaning "this setup cannot report fan speed".
pub const FAN_SPEED_UNSUPPORTED: i32 = -1;

/// Authoritative printer status for one connection session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub machine_state: MachineState,
    pub bed: Temperature,
    pub extruder: Temperature,
    /// Percent, or [`FAN_SPEED_UNSUPPORTED`].
    pub fan_speed: i32,
}

impl PrinterStatus {
    /// Record at the start of a connection cycle.
    ///
    /// Fan speed is only reported by the layer-progress plugin, so it is
    /// unsupported unless that feature is enabled.
    pub fn initial(layer_progress_enabled: bool) -> Self {
        Self {
            machine_state: MachineState::Connecting,
            bed: Temperature::default(),
            extruder: Temperature::default(),
            fan_speed: if layer_progress_enabled {
                0
            } else {
                FAN_SPEED_UNSUPPORTED
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn every_state_label_maps_in_any_casing() {
        for state in MachineState::ALL {
            let label = state.as_label();
            assert_eq!(MachineState::from_label(label).unwrap(), state);
            assert_eq!(
                MachineState::from_label(&label.to_ascii_uppercase()).unwrap(),
                state
            );

            let mut title = label.to_string();
            title[..1].make_ascii_uppercase();
            assert_eq!(MachineState::from_label(&title).unwrap(), state);
        }
    }

    #[test]
    fn error_labels_with_reason_map_to_error() {
        assert_eq!(
            MachineState::from_label("Error: Thermal runaway").unwrap(),
            MachineState::Error
        );
        assert_eq!(
            MachineState::from_label("Offline after error").unwrap(),
            MachineState::Error
        );
    }

    #[test]
    fn unknown_label_is_an_error() {
        assert_matches!(
            MachineState::from_label("Detecting baudrate"),
            Err(CoreError::UnrecognizedState(label)) if label == "Detecting baudrate"
        );
    }

    #[test]
    fn initial_status_depends_on_layer_progress() {
        let plain = PrinterStatus::initial(false);
        assert_eq!(plain.machine_state, MachineState::Connecting);
        assert_eq!(plain.fan_speed, FAN_SPEED_UNSUPPORTED);
        assert_eq!(plain.bed.unit, TEMPERATURE_UNIT);

        let tracked = PrinterStatus::initial(true);
        assert_eq!(tracked.fan_speed, 0);
    }

    #[test]
    fn status_serializes_state_as_snake_case() {
        let json = serde_json::to_value(PrinterStatus::initial(false)).unwrap();
        assert_eq!(json["machine_state"], "connecting");
        assert_eq!(json["fan_speed"], -1);
        assert_eq!(json["extruder"]["unit"], "°C");
    }
}
