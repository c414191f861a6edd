//! OctoPrint push-socket frame types and classifier.
//!
//! OctoPrint frames carry no explicit tag. Each one is a JSON object whose
//! single top-level key names its category (`{"current": {...}}`,
//! `{"event": {...}}`, ...). [`classify`] turns that shape into the closed
//! [`RawFrame`] enum so the rest of the crate never probes fields by hand.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// Plugin identifiers published by the DisplayLayerProgress extension.
pub const LAYER_PROGRESS_PLUGIN_IDS: &[&str] =
    &["DisplayLayerProgress-websocket-payload", "DisplayLayerProgress"];

/// All frame categories the synchronizer reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFrame {
    /// Periodic telemetry snapshot (state, temperatures, job, progress).
    Current(CurrentData),
    /// Discrete server event such as `PrintStarted`.
    Event(EventData),
    /// Message forwarded from a server plugin.
    Plugin(PluginData),
    /// The server wants the client to authenticate again.
    Reauth,
    /// Handshake finished; the server is ready to push.
    Connected(ConnectedData),
}

// ---------------------------------------------------------------------------
// current
// ---------------------------------------------------------------------------

/// Payload of a `current` frame. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CurrentData {
    pub state: Option<StateData>,
    pub temps: Option<Vec<TemperatureSample>>,
    pub job: Option<JobData>,
    pub progress: Option<ProgressData>,
    #[serde(rename = "currentZ")]
    pub current_z: Option<f64>,
}

impl CurrentData {
    /// Most recent temperature sample, if the frame carries one.
    pub fn temperature_sample(&self) -> Option<&TemperatureSample> {
        self.temps.as_ref().and_then(|temps| temps.first())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateData {
    pub text: String,
}

/// One entry of the `temps` array.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TemperatureSample {
    pub bed: Option<HeaterReading>,
    pub tool0: Option<HeaterReading>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeaterReading {
    pub actual: Option<f64>,
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JobData {
    pub file: Option<FileData>,
    #[serde(rename = "estimatedPrintTime")]
    pub estimated_print_time: Option<f64>,
    /// Filament usage keyed by tool (`tool0`, `tool1`, ...).
    pub filament: Option<HashMap<String, Option<FilamentUsage>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileData {
    pub name: Option<String>,
    pub display: Option<String>,
    pub path: Option<String>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilamentUsage {
    /// Millimetres.
    pub length: Option<f64>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressData {
    /// Percent complete, `0.0..=100.0`.
    pub completion: Option<f64>,
    /// Seconds printed so far.
    #[serde(rename = "printTime")]
    pub print_time: Option<f64>,
    /// Seconds remaining.
    #[serde(rename = "printTimeLeft")]
    pub print_time_left: Option<f64>,
}

// ---------------------------------------------------------------------------
// event / plugin / connected
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginData {
    pub plugin: String,
    #[serde(default)]
    pub data: Value,
}

impl PluginData {
    pub fn is_layer_progress(&self) -> bool {
        LAYER_PROGRESS_PLUGIN_IDS.contains(&self.plugin.as_str())
    }
}

/// Server details sent with the `connected` handshake frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectedData {
    pub version: Option<String>,
    pub display_version: Option<String>,
}

/// Fields of interest in a DisplayLayerProgress payload.
///
/// The plugin reports numbers as strings (`"12"`, `"75%"`) and uses `"-"`
/// or `"Off"` for "nothing yet"; values are kept raw and interpreted by the
/// accessors.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayerProgressData {
    pub fanspeed: Option<Value>,
    #[serde(rename = "currentLayer")]
    pub current_layer: Option<Value>,
    #[serde(rename = "totalLayer")]
    pub total_layer: Option<Value>,
}

impl LayerProgressData {
    /// Extract layer-progress fields from a plugin payload.
    ///
    /// Returns `None` when the payload is not an object.
    pub fn from_plugin(data: &Value) -> Option<Self> {
        if !data.is_object() {
            return None;
        }
        serde_json::from_value(data.clone()).ok()
    }

    /// Fan speed in percent.
    pub fn fan_speed(&self) -> Option<i32> {
        self.fanspeed
            .as_ref()
            .and_then(lenient_number)
            .map(|v| v.round() as i32)
    }

    pub fn current_layer(&self) -> Option<u32> {
        self.current_layer.as_ref().and_then(lenient_count)
    }

    pub fn total_layer(&self) -> Option<u32> {
        self.total_layer.as_ref().and_then(lenient_count)
    }
}

/// Read a number the way the layer-progress plugin writes it.
///
/// `"-"` and `"Off"` mean zero; a trailing `%` is ignored.
fn lenient_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed == "-" || trimmed.eq_ignore_ascii_case("off") {
                return Some(0.0);
            }
            trimmed.trim_end_matches('%').trim().parse::<f64>().ok()
        }
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn lenient_count(value: &Value) -> Option<u32> {
    lenient_number(value)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u32)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Parse a socket text frame and classify it.
///
/// Returns `Ok(None)` for well-formed frames of categories the synchronizer
/// does not handle (`history`, `timelapse`, ...). Returns `Err` for
/// malformed JSON or a recognized category with an unusable payload.
pub fn parse_frame(text: &str) -> Result<Option<RawFrame>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    classify(value)
}

/// Classify an already-decoded frame by field presence.
///
/// Keys are tested in the order `current`, `event`, `plugin`, `reauth`,
/// `connected`; the first one present wins.
pub fn classify(value: Value) -> Result<Option<RawFrame>, serde_json::Error> {
    let Value::Object(mut fields) = value else {
        return Ok(None);
    };

    if let Some(current) = fields.remove("current") {
        return Ok(Some(RawFrame::Current(serde_json::from_value(current)?)));
    }
    if let Some(event) = fields.remove("event") {
        return Ok(Some(RawFrame::Event(serde_json::from_value(event)?)));
    }
    if let Some(plugin) = fields.remove("plugin") {
        return Ok(Some(RawFrame::Plugin(serde_json::from_value(plugin)?)));
    }
    if fields.contains_key("reauth") {
        return Ok(Some(RawFrame::Reauth));
    }
    if let Some(connected) = fields.remove("connected") {
        // Presence is what matters; details are informational only.
        let data = serde_json::from_value(connected).unwrap_or_default();
        return Ok(Some(RawFrame::Connected(data)));
    }

    Ok(None)
}
