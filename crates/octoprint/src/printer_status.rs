//! Printer status normalizer.
//!
//! Owns the session's [`PrinterStatus`] and folds `current` frames and
//! layer-progress plugin payloads into it. Every `apply_*` call returns an
//! immutable snapshot for publishing.

use octosync_core::conversions::round_temperature;
use octosync_core::printer::{MachineState, PrinterStatus, Temperature};
use octosync_core::printer_event::{RAW_PRINT_PAUSED, RAW_PRINT_STARTED};

use crate::messages::{CurrentData, HeaterReading, LayerProgressData};

#[derive(Debug)]
pub struct PrinterStatusNormalizer {
    status: PrinterStatus,
    layer_progress_enabled: bool,
}

impl PrinterStatusNormalizer {
    pub fn new(layer_progress_enabled: bool) -> Self {
        Self {
            status: PrinterStatus::initial(layer_progress_enabled),
            layer_progress_enabled,
        }
    }

    pub fn status(&self) -> &PrinterStatus {
        &self.status
    }

    /// Back to the "connecting" defaults at the start of a connection cycle.
    pub fn reset(&mut self) -> PrinterStatus {
        self.status = PrinterStatus::initial(self.layer_progress_enabled);
        self.status.clone()
    }

    /// Apply the temperature sample and state label of a `current` frame.
    ///
    /// An unrecognized state label is logged as an error and the previous
    /// machine state is kept; the rest of the frame still applies.
    pub fn apply_current(&mut self, data: &CurrentData) -> PrinterStatus {
        if let Some(sample) = data.temperature_sample() {
            if let Some(bed) = &sample.bed {
                apply_reading(&mut self.status.bed, bed);
            }
            if let Some(tool0) = &sample.tool0 {
                apply_reading(&mut self.status.extruder, tool0);
            }
        }

        if let Some(state) = &data.state {
            match MachineState::from_label(&state.text) {
                Ok(machine_state) => self.status.machine_state = machine_state,
                Err(e) => {
                    tracing::error!(
                        label = %state.text,
                        previous = ?self.status.machine_state,
                        error = %e,
                        "Unrecognized printer state, keeping previous state",
                    );
                }
            }
        }

        self.status.clone()
    }

    /// Apply the fan speed reported by the layer-progress plugin.
    pub fn apply_layer_progress(&mut self, data: &LayerProgressData) -> PrinterStatus {
        if let Some(fan_speed) = data.fan_speed() {
            self.status.fan_speed = fan_speed;
        }
        self.status.clone()
    }
}

fn apply_reading(temperature: &mut Temperature, reading: &HeaterReading) {
    if let Some(actual) = reading.actual {
        temperature.current = round_temperature(actual);
    }
    if let Some(target) = reading.target {
        temperature.target = round_temperature(target);
    }
}

/// Raw event implied by a machine state when no lifecycle event has been
/// seen yet, e.g. after joining a printer that is already mid-print.
pub fn implied_event(state: MachineState) -> Option<&'static str> {
    match state {
        MachineState::Printing => Some(RAW_PRINT_STARTED),
        MachineState::Paused => Some(RAW_PRINT_PAUSED),
        _ => None,
    }
}
