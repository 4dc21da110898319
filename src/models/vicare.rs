//! Typed vocabulary and wire models for the ViCare heating API.
//!
//! Scope: types only — no API client code.
//!
//! Notes
//! - Operating modes are a closed vendor vocabulary plus a catch-all for
//!   values the vendor may add; unrecognized strings round-trip byte-exact.
//! - Feature payloads are a property map; typed accessors live on `Feature`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// =====================
// Scalar newtype wrappers
// =====================

/// Vendor schedule/program identifier (e.g. "comfort", "reduced", "external").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program(pub String);

impl From<&str> for Program {
    fn from(value: &str) -> Self {
        Program(value.to_string())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Program that forces manual override of scheduled behavior.
pub const PROGRAM_EXTERNAL: &str = "external";
/// Program whose setpoint backs the reduced-temperature command.
pub const PROGRAM_REDUCED: &str = "reduced";

/// Index of the heating circuit on a multi-circuit installation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Circuit(pub u32);

// Units of measurement used by the entity registration tables.
pub const UNIT_CELSIUS: &str = "°C";
pub const UNIT_KILOWATT_HOURS: &str = "kWh";
pub const UNIT_KILOWATT: &str = "kW";
pub const UNIT_NONE: &str = "";

// =====================
// Operating modes and the domain-facing operation vocabulary
// =====================

/// Vendor-reported operating state of the heating system.
///
/// The five named variants are the documented vocabulary; anything else the
/// vendor reports is carried verbatim in `Other` so it can be restored later
/// (away/on restore re-submits whatever mode was active before).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeatingMode {
    Dhw,
    DhwAndHeating,
    ForcedReduced,
    ForcedNormal,
    Standby,
    Other(String),
}

impl HeatingMode {
    pub fn as_str(&self) -> &str {
        match self {
            HeatingMode::Dhw => "dhw",
            HeatingMode::DhwAndHeating => "dhwAndHeating",
            HeatingMode::ForcedReduced => "forcedReduced",
            HeatingMode::ForcedNormal => "forcedNormal",
            HeatingMode::Standby => "standby",
            HeatingMode::Other(s) => s,
        }
    }

    /// Lossy projection onto the domain-facing operation vocabulary.
    ///
    /// Total: every mode maps somewhere, `dhw` and unrecognized modes both
    /// land on `Unknown` (water-only heating has no operation equivalent).
    pub fn operation(&self) -> Operation {
        match self {
            HeatingMode::Dhw => Operation::Unknown,
            HeatingMode::DhwAndHeating => Operation::Auto,
            HeatingMode::ForcedNormal => Operation::Heat,
            HeatingMode::ForcedReduced => Operation::Eco,
            HeatingMode::Standby => Operation::Off,
            HeatingMode::Other(_) => Operation::Unknown,
        }
    }
}

impl From<&str> for HeatingMode {
    fn from(value: &str) -> Self {
        match value {
            "dhw" => HeatingMode::Dhw,
            "dhwAndHeating" => HeatingMode::DhwAndHeating,
            "forcedReduced" => HeatingMode::ForcedReduced,
            "forcedNormal" => HeatingMode::ForcedNormal,
            "standby" => HeatingMode::Standby,
            other => HeatingMode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for HeatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HeatingMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HeatingMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(HeatingMode::from(s.as_str()))
    }
}

/// Simplified operation state exposed to the automation layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Off,
    Heat,
    Eco,
    Auto,
    Unknown,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Off => "off",
            Operation::Heat => "heat",
            Operation::Eco => "eco",
            Operation::Auto => "auto",
            Operation::Unknown => "unknown",
        }
    }

    /// Inverse of [`HeatingMode::operation`], defined only for the four
    /// settable operations.
    pub fn heating_mode(&self) -> Option<HeatingMode> {
        match self {
            Operation::Heat => Some(HeatingMode::ForcedNormal),
            Operation::Eco => Some(HeatingMode::ForcedReduced),
            Operation::Auto => Some(HeatingMode::DhwAndHeating),
            Operation::Off => Some(HeatingMode::Standby),
            Operation::Unknown => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =====================
// Sensor metrics
// =====================

/// The fixed set of per-installation metrics exposed as sensor entities.
///
/// Each variant has a fixed feature/property mapping in the client; the
/// exhaustive match there means a metric without a mapping does not compile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Metric {
    BoilerTemperature,
    Programs,
    ActiveProgram,
    Modes,
    ActiveMode,
    CurrentDesiredTemperature,
    OutsideTemperature,
    RoomTemperature,
    SupplyTemperature,
    DomesticHotWaterStorageTemperature,
    HeatingCurveSlope,
    HeatingCurveShift,
    MonthSinceLastService,
    LastServiceDate,
    GasConsumptionHeatingDays,
    GasConsumptionHeatingToday,
    GasConsumptionHeatingWeeks,
    GasConsumptionHeatingThisWeek,
    GasConsumptionHeatingMonths,
    GasConsumptionHeatingThisMonth,
    GasConsumptionHeatingYears,
    GasConsumptionHeatingThisYear,
    GasConsumptionDomesticHotWaterDays,
    GasConsumptionDomesticHotWaterToday,
    GasConsumptionDomesticHotWaterWeeks,
    GasConsumptionDomesticHotWaterThisWeek,
    GasConsumptionDomesticHotWaterMonths,
    GasConsumptionDomesticHotWaterThisMonth,
    GasConsumptionDomesticHotWaterYears,
    GasConsumptionDomesticHotWaterThisYear,
    DomesticHotWaterConfiguredTemperature,
    CurrentPower,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::BoilerTemperature => "BoilerTemperature",
            Metric::Programs => "Programs",
            Metric::ActiveProgram => "ActiveProgram",
            Metric::Modes => "Modes",
            Metric::ActiveMode => "ActiveMode",
            Metric::CurrentDesiredTemperature => "CurrentDesiredTemperature",
            Metric::OutsideTemperature => "OutsideTemperature",
            Metric::RoomTemperature => "RoomTemperature",
            Metric::SupplyTemperature => "SupplyTemperature",
            Metric::DomesticHotWaterStorageTemperature => "DomesticHotWaterStorageTemperature",
            Metric::HeatingCurveSlope => "HeatingCurveSlope",
            Metric::HeatingCurveShift => "HeatingCurveShift",
            Metric::MonthSinceLastService => "MonthSinceLastService",
            Metric::LastServiceDate => "LastServiceDate",
            Metric::GasConsumptionHeatingDays => "GasConsumptionHeatingDays",
            Metric::GasConsumptionHeatingToday => "GasConsumptionHeatingToday",
            Metric::GasConsumptionHeatingWeeks => "GasConsumptionHeatingWeeks",
            Metric::GasConsumptionHeatingThisWeek => "GasConsumptionHeatingThisWeek",
            Metric::GasConsumptionHeatingMonths => "GasConsumptionHeatingMonths",
            Metric::GasConsumptionHeatingThisMonth => "GasConsumptionHeatingThisMonth",
            Metric::GasConsumptionHeatingYears => "GasConsumptionHeatingYears",
            Metric::GasConsumptionHeatingThisYear => "GasConsumptionHeatingThisYear",
            Metric::GasConsumptionDomesticHotWaterDays => "GasConsumptionDomesticHotWaterDays",
            Metric::GasConsumptionDomesticHotWaterToday => "GasConsumptionDomesticHotWaterToday",
            Metric::GasConsumptionDomesticHotWaterWeeks => "GasConsumptionDomesticHotWaterWeeks",
            Metric::GasConsumptionDomesticHotWaterThisWeek => "GasConsumptionDomesticHotWaterThisWeek",
            Metric::GasConsumptionDomesticHotWaterMonths => "GasConsumptionDomesticHotWaterMonths",
            Metric::GasConsumptionDomesticHotWaterThisMonth => "GasConsumptionDomesticHotWaterThisMonth",
            Metric::GasConsumptionDomesticHotWaterYears => "GasConsumptionDomesticHotWaterYears",
            Metric::GasConsumptionDomesticHotWaterThisYear => "GasConsumptionDomesticHotWaterThisYear",
            Metric::DomesticHotWaterConfiguredTemperature => "DomesticHotWaterConfiguredTemperature",
            Metric::CurrentPower => "CurrentPower",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A polled sensor reading, stored verbatim with no coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Number(f64),
    Text(String),
    Numbers(Vec<f64>),
    Texts(Vec<String>),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Number(n) => write!(f, "{}", n),
            SensorValue::Text(s) => f.write_str(s),
            SensorValue::Numbers(ns) => {
                let parts = ns.iter().map(|n| n.to_string()).collect::<Vec<_>>();
                f.write_str(&parts.join(", "))
            }
            SensorValue::Texts(ts) => f.write_str(&ts.join(", ")),
        }
    }
}

// =====================
// Wire envelopes
// =====================

/// One datapoint/feature as returned by the operational-data endpoint:
/// a map of named properties, each with a type tag and a value.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: BTreeMap<String, FeatureProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureProperty {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Value,
}

impl Feature {
    pub fn number(&self, property: &str) -> Option<f64> {
        self.properties.get(property).and_then(|p| p.value.as_f64())
    }

    pub fn text(&self, property: &str) -> Option<String> {
        self.properties
            .get(property)
            .and_then(|p| p.value.as_str())
            .map(|s| s.to_string())
    }

    pub fn numbers(&self, property: &str) -> Option<Vec<f64>> {
        let arr = self.properties.get(property)?.value.as_array()?;
        Some(arr.iter().filter_map(|v| v.as_f64()).collect())
    }

    pub fn texts(&self, property: &str) -> Option<Vec<String>> {
        let arr = self.properties.get(property)?.value.as_array()?;
        Some(arr.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
    }
}

/// Installation reference resolved once at client construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub id: i64,
    pub gateway_serial: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationList {
    #[serde(default)]
    pub installations: Vec<Installation>,
}

/// Token grant response from the vendor identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// On-disk token cache, one file per configured instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_strings_round_trip() {
        for raw in ["dhw", "dhwAndHeating", "forcedReduced", "forcedNormal", "standby"] {
            let mode = HeatingMode::from(raw);
            assert!(!matches!(mode, HeatingMode::Other(_)), "{raw} must be a named mode");
            assert_eq!(mode.as_str(), raw);
        }

        let vendor_surprise = HeatingMode::from("holidayAtHome");
        assert_eq!(vendor_surprise, HeatingMode::Other("holidayAtHome".to_string()));
        assert_eq!(vendor_surprise.as_str(), "holidayAtHome");
    }

    #[test]
    fn mode_operation_projection_table() {
        assert_eq!(HeatingMode::Dhw.operation(), Operation::Unknown);
        assert_eq!(HeatingMode::DhwAndHeating.operation(), Operation::Auto);
        assert_eq!(HeatingMode::ForcedNormal.operation(), Operation::Heat);
        assert_eq!(HeatingMode::ForcedReduced.operation(), Operation::Eco);
        assert_eq!(HeatingMode::Standby.operation(), Operation::Off);
        assert_eq!(
            HeatingMode::Other("whatever".to_string()).operation(),
            Operation::Unknown
        );
    }

    #[test]
    fn operation_inverse_mapping() {
        assert_eq!(Operation::Heat.heating_mode(), Some(HeatingMode::ForcedNormal));
        assert_eq!(Operation::Eco.heating_mode(), Some(HeatingMode::ForcedReduced));
        assert_eq!(Operation::Auto.heating_mode(), Some(HeatingMode::DhwAndHeating));
        assert_eq!(Operation::Off.heating_mode(), Some(HeatingMode::Standby));
        assert_eq!(Operation::Unknown.heating_mode(), None);
    }

    #[test]
    fn settable_operations_survive_projection() {
        for op in [Operation::Off, Operation::Heat, Operation::Eco, Operation::Auto] {
            let mode = op.heating_mode().expect("settable operation has a mode");
            assert_eq!(mode.operation(), op);
        }
    }

    #[test]
    fn mode_serde_uses_vendor_strings() {
        let json = serde_json::to_string(&HeatingMode::DhwAndHeating).unwrap();
        assert_eq!(json, "\"dhwAndHeating\"");
        let back: HeatingMode = serde_json::from_str("\"forcedReduced\"").unwrap();
        assert_eq!(back, HeatingMode::ForcedReduced);
        let unknown: HeatingMode = serde_json::from_str("\"ventilation\"").unwrap();
        assert_eq!(unknown, HeatingMode::Other("ventilation".to_string()));
    }

    #[test]
    fn feature_property_accessors() {
        let feature: Feature = serde_json::from_value(json!({
            "properties": {
                "value": { "type": "number", "value": 21.5 },
                "status": { "type": "string", "value": "connected" },
                "day": { "type": "array", "value": [1.2, 0.9, 1.4] },
                "enabled": { "type": "array", "value": ["comfort", "normal"] }
            }
        }))
        .unwrap();

        assert_eq!(feature.number("value"), Some(21.5));
        assert_eq!(feature.text("status").as_deref(), Some("connected"));
        assert_eq!(feature.numbers("day"), Some(vec![1.2, 0.9, 1.4]));
        assert_eq!(
            feature.texts("enabled"),
            Some(vec!["comfort".to_string(), "normal".to_string()])
        );
        assert_eq!(feature.number("missing"), None);
        assert_eq!(feature.number("status"), None);
    }

    #[test]
    fn cached_token_round_trips() {
        let token = CachedToken {
            access_token: "abc".to_string(),
            refresh_token: Some("def".to_string()),
            expires_at: Utc::now(),
        };
        let json = serde_json::to_string(&token).unwrap();
        let back: CachedToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.access_token, token.access_token);
        assert_eq!(back.refresh_token, token.refresh_token);
        assert_eq!(back.expires_at, token.expires_at);
    }
}
