//! Process readings and samples acquired from the refinery field network

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::defaults::{
    DEFAULT_QUALITY_INDEX, EFFICIENCY_ENERGY_REFERENCE, QUALITY_TARGET,
};

// ============================================================================
// Controlled Parameters
// ============================================================================

/// The four controllable process inputs the optimizer adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlledParameter {
    /// Crude oil flow rate
    Fc1065,
    /// Storage level indicator
    Li40054,
    /// HVbGO recirculation flow control
    Fc31007,
    /// Fractionation pressure
    Pi18213,
}

impl ControlledParameter {
    /// All controlled parameters in field-variable order.
    pub const ALL: [Self; 4] = [Self::Fc1065, Self::Li40054, Self::Fc31007, Self::Pi18213];

    /// Field variable name on the process node.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fc1065 => "fc1065",
            Self::Li40054 => "li40054",
            Self::Fc31007 => "fc31007",
            Self::Pi18213 => "pi18213",
        }
    }

    /// Baseline operating value, also substituted when a reading is missing.
    pub const fn default_value(self) -> f64 {
        match self {
            Self::Fc1065 => 127.3,
            Self::Li40054 => 68.2,
            Self::Fc31007 => 89.1,
            Self::Pi18213 => 2.14,
        }
    }

    /// Safe operating range `(min, max)` every proposed value is clamped into.
    pub const fn safe_range(self) -> (f64, f64) {
        match self {
            Self::Fc1065 => (125.0, 135.0),
            Self::Li40054 => (65.0, 75.0),
            Self::Fc31007 => (85.0, 95.0),
            Self::Pi18213 => (2.1, 2.3),
        }
    }

    /// Sensitivity weight (Sobol total index) of this input on the quality index.
    pub const fn sensitivity(self) -> f64 {
        match self {
            Self::Fc1065 => 0.5321,
            Self::Li40054 => 0.4250,
            Self::Fc31007 => 0.4399,
            Self::Pi18213 => 0.3159,
        }
    }

    /// Signed base adjustment fraction. Negative means the parameter is reduced.
    pub const fn base_adjustment(self) -> f64 {
        match self {
            Self::Fc1065 => 0.043,
            Self::Li40054 => 0.048,
            Self::Fc31007 => -0.027,
            Self::Pi18213 => 0.037,
        }
    }

    /// Resolve a field variable name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Clamp a value into this parameter's safe range.
    pub fn clamp(self, value: f64) -> f64 {
        let (min, max) = self.safe_range();
        value.clamp(min, max)
    }
}

impl std::fmt::Display for ControlledParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of the field variable carrying the operating mode (0 = human, 1 = AI).
pub const OPERATOR_MODE_VARIABLE: &str = "operator_mode";

/// Name of the field variable carrying the primary quality index.
pub const QUALITY_INDEX_VARIABLE: &str = "bit_tq";

// ============================================================================
// Parameter Map
// ============================================================================

/// Mapping of field variable name to numeric value.
///
/// Serializes as a flat JSON object, which is also the persisted encoding of
/// decision parameter changes and baselines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, f64>);

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The fixed baseline every controlled parameter is reset to.
    pub fn baseline() -> Self {
        ControlledParameter::ALL
            .into_iter()
            .map(|p| (p.name().to_string(), p.default_value()))
            .collect()
    }

    /// Encode as the JSON text stored in the decisions table.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from stored JSON text. Empty text yields an empty map.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text)
    }
}

impl FromIterator<(String, f64)> for ParameterMap {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Readings
// ============================================================================

/// One acquisition of named process variables.
///
/// Every field is optional because the live endpoint may not expose it; use the
/// accessor methods to obtain defaulted values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readings {
    pub bit_tq: Option<f64>,
    pub fc1065: Option<f64>,
    pub li40054: Option<f64>,
    pub fc31007: Option<f64>,
    pub pi18213: Option<f64>,
    pub energy_consumption: Option<f64>,
    pub co2_emissions: Option<f64>,
    pub hvbgo_flow: Option<f64>,
    pub temperature_flash: Option<f64>,
    /// Categorical: 0=off, 1=normal, 2=warning, 3=critical
    pub system_status: Option<f64>,
    /// Categorical: 0=human, 1=AI
    pub operator_mode: Option<f64>,
}

impl Readings {
    /// The static dataset substituted when the field endpoint is unusable.
    pub const fn fallback_base() -> Self {
        Self {
            bit_tq: Some(45.2),
            fc1065: Some(127.3),
            li40054: Some(68.2),
            fc31007: Some(89.1),
            pi18213: Some(2.14),
            energy_consumption: Some(1250.0),
            co2_emissions: Some(34.5),
            hvbgo_flow: Some(156.8),
            temperature_flash: Some(420.0),
            system_status: Some(1.0),
            operator_mode: Some(0.0),
        }
    }

    /// Build readings from a name→value map read off the process node.
    ///
    /// Unknown variable names are ignored. Returns the readings and how many
    /// recognised variables were present.
    pub fn from_variables(values: &BTreeMap<String, f64>) -> (Self, usize) {
        let mut readings = Self::default();
        let mut recognised = 0;
        for (name, value) in values {
            if let Some(slot) = readings.slot_mut(name) {
                *slot = Some(*value);
                recognised += 1;
            }
        }
        (readings, recognised)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Option<f64>> {
        Some(match name {
            "bit_tq" => &mut self.bit_tq,
            "fc1065" => &mut self.fc1065,
            "li40054" => &mut self.li40054,
            "fc31007" => &mut self.fc31007,
            "pi18213" => &mut self.pi18213,
            "energy_consumption" => &mut self.energy_consumption,
            "co2_emissions" => &mut self.co2_emissions,
            "hvbgo_flow" => &mut self.hvbgo_flow,
            "temperature_flash" => &mut self.temperature_flash,
            "system_status" => &mut self.system_status,
            "operator_mode" => &mut self.operator_mode,
            _ => return None,
        })
    }

    /// Mutable access to every continuous (non-categorical) field.
    pub(crate) fn continuous_fields_mut(&mut self) -> [(&'static str, &mut Option<f64>); 9] {
        [
            ("bit_tq", &mut self.bit_tq),
            ("fc1065", &mut self.fc1065),
            ("li40054", &mut self.li40054),
            ("fc31007", &mut self.fc31007),
            ("pi18213", &mut self.pi18213),
            ("energy_consumption", &mut self.energy_consumption),
            ("co2_emissions", &mut self.co2_emissions),
            ("hvbgo_flow", &mut self.hvbgo_flow),
            ("temperature_flash", &mut self.temperature_flash),
        ]
    }

    /// Quality index, defaulting when the reading is absent.
    pub fn quality_index(&self) -> f64 {
        self.bit_tq.unwrap_or(DEFAULT_QUALITY_INDEX)
    }

    /// Raw reading of a controlled parameter.
    pub const fn parameter(&self, param: ControlledParameter) -> Option<f64> {
        match param {
            ControlledParameter::Fc1065 => self.fc1065,
            ControlledParameter::Li40054 => self.li40054,
            ControlledParameter::Fc31007 => self.fc31007,
            ControlledParameter::Pi18213 => self.pi18213,
        }
    }

    /// Controlled parameter value usable as a divisor: missing, zero, negative
    /// or non-finite readings are replaced by the parameter default.
    pub fn parameter_or_default(&self, param: ControlledParameter) -> f64 {
        match self.parameter(param) {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => param.default_value(),
        }
    }

    /// Which controller is currently driving the process.
    pub fn control_source(&self) -> ControlSource {
        match self.operator_mode {
            Some(mode) if (mode - 1.0).abs() < f64::EPSILON => ControlSource::AiControl,
            _ => ControlSource::HumanControl,
        }
    }
}

// ============================================================================
// Process Sample
// ============================================================================

/// Provenance tag of a process sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSource {
    HumanControl,
    AiControl,
}

impl ControlSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HumanControl => "human_control",
            Self::AiControl => "ai_control",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human_control" => Some(Self::HumanControl),
            "ai_control" => Some(Self::AiControl),
            _ => None,
        }
    }
}

impl std::fmt::Display for ControlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable timestamped snapshot appended to the sample store once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub timestamp: DateTime<Utc>,
    pub bit_tq: Option<f64>,
    pub fc1065: Option<f64>,
    pub li40054: Option<f64>,
    pub fc31007: Option<f64>,
    pub pi18213: Option<f64>,
    pub energy_consumption: Option<f64>,
    pub co2_emissions: Option<f64>,
    pub hvbgo_flow: Option<f64>,
    pub temperature_flash: Option<f64>,
    pub process_efficiency: f64,
    pub data_source: ControlSource,
}

impl ProcessSample {
    /// Snapshot readings at `timestamp`, deriving efficiency and provenance.
    pub fn from_readings(readings: &Readings, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(6),
            bit_tq: readings.bit_tq,
            fc1065: readings.fc1065,
            li40054: readings.li40054,
            fc31007: readings.fc31007,
            pi18213: readings.pi18213,
            energy_consumption: readings.energy_consumption,
            co2_emissions: readings.co2_emissions,
            hvbgo_flow: readings.hvbgo_flow,
            temperature_flash: readings.temperature_flash,
            process_efficiency: process_efficiency(readings),
            data_source: readings.control_source(),
        }
    }

    /// Recover readings (without categorical fields other than the mode) from a
    /// stored sample.
    pub fn to_readings(&self) -> Readings {
        Readings {
            bit_tq: self.bit_tq,
            fc1065: self.fc1065,
            li40054: self.li40054,
            fc31007: self.fc31007,
            pi18213: self.pi18213,
            energy_consumption: self.energy_consumption,
            co2_emissions: self.co2_emissions,
            hvbgo_flow: self.hvbgo_flow,
            temperature_flash: self.temperature_flash,
            system_status: None,
            operator_mode: Some(match self.data_source {
                ControlSource::AiControl => 1.0,
                ControlSource::HumanControl => 0.0,
            }),
        }
    }
}

/// Process efficiency score (0–100): mean of quality-to-target proximity and
/// energy consumption relative to the reference load.
pub fn process_efficiency(readings: &Readings) -> f64 {
    let bit_tq = readings.bit_tq.unwrap_or(DEFAULT_QUALITY_INDEX);
    let energy = readings.energy_consumption.unwrap_or(1250.0);

    let quality_efficiency = if bit_tq > 0.0 {
        (bit_tq / QUALITY_TARGET * 100.0).min(100.0)
    } else {
        0.0
    };
    let energy_efficiency = if energy > 0.0 {
        (100.0 - (energy - EFFICIENCY_ENERGY_REFERENCE) / 10.0).max(0.0)
    } else {
        0.0
    };

    (quality_efficiency + energy_efficiency) / 2.0
}
