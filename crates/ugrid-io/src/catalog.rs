//! Equipment catalog (wires, line geometries, transformers).
//!
//! Catalog files come from spreadsheet exports, so numeric fields may be JSON
//! numbers or strings and booleans may be spelled `"True"`. Lines and
//! transformers are grouped in zones: a list of `{zone name: [entries]}`
//! objects. Lookups return the first match across zones.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const WIRES_KEY: &str = "WIRES";
const WIRES_CATALOG_KEY: &str = "WIRES CATALOG";
const LINES_KEY: &str = "LINES";
const TRANSFORMERS_KEY: &str = "SUBSTATIONS AND DISTRIBUTION TRANSFORMERS";

/// Wire type recorded for underground cables with a concentric neutral
pub const CONCENTRIC_NEUTRAL_TYPE: &str = "UG concentric neutral";

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("'{s}' is not a number"))),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, found {other}"
        ))),
    }
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("'{s}' is not a number"))),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, found {other}"
        ))),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("'{other}' is not a boolean"))),
        },
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean, found {other}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSpec {
    pub nameclass: String,
    #[serde(rename = "ampacity (A)", deserialize_with = "lenient_f64")]
    pub ampacity_a: f64,
    #[serde(rename = "gmr (mm)", deserialize_with = "lenient_f64")]
    pub gmr_mm: f64,
    #[serde(rename = "diameter (mm)", deserialize_with = "lenient_f64")]
    pub diameter_mm: f64,
    #[serde(rename = "resistance (ohm/km)", deserialize_with = "lenient_f64")]
    pub resistance_ohm_per_km: f64,
    #[serde(rename = "type", default)]
    pub wire_type: String,
    #[serde(rename = "gmr neutral (mm)", default, deserialize_with = "lenient_opt_f64")]
    pub neutral_gmr_mm: Option<f64>,
    #[serde(
        rename = "resistance neutral (ohm/km)",
        default,
        deserialize_with = "lenient_opt_f64"
    )]
    pub neutral_resistance_ohm_per_km: Option<f64>,
    #[serde(
        rename = "concentric diameter neutral strand (mm)",
        default,
        deserialize_with = "lenient_opt_f64"
    )]
    pub neutral_strand_diameter_mm: Option<f64>,
    #[serde(
        rename = "concentric neutral outside diameter (mm)",
        default,
        deserialize_with = "lenient_opt_f64"
    )]
    pub neutral_outside_diameter_mm: Option<f64>,
    #[serde(
        rename = "# concentric neutral strands",
        default,
        deserialize_with = "lenient_opt_f64"
    )]
    pub neutral_strands: Option<f64>,
}

impl WireSpec {
    pub fn is_overhead(&self) -> bool {
        self.wire_type.contains("OH")
    }

    pub fn is_underground(&self) -> bool {
        self.wire_type.contains("UG")
    }

    pub fn has_concentric_neutral(&self) -> bool {
        self.wire_type == CONCENTRIC_NEUTRAL_TYPE
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryWire {
    pub wire: String,
    pub phase: String,
    #[serde(rename = "x (m)", deserialize_with = "lenient_f64")]
    pub x_m: f64,
    #[serde(rename = "height (m)", deserialize_with = "lenient_f64")]
    pub height_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Line geometry", default)]
    pub geometry: Vec<GeometryWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformerSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Installed Power(kVA)", default, deserialize_with = "lenient_opt_f64")]
    pub installed_kva: Option<f64>,
    #[serde(
        rename = "Installed Power(MVA)",
        alias = "Installed Power (MVA)",
        default,
        deserialize_with = "lenient_opt_f64"
    )]
    pub installed_mva: Option<f64>,
    #[serde(rename = "Primary Voltage (kV)", deserialize_with = "lenient_f64")]
    pub primary_kv: f64,
    #[serde(rename = "Secondary Voltage (kV)", deserialize_with = "lenient_f64")]
    pub secondary_kv: f64,
    #[serde(rename = "Nphases", deserialize_with = "lenient_f64")]
    pub nphases: f64,
    #[serde(rename = "Centertap", default, deserialize_with = "lenient_bool")]
    pub centertap: bool,
    #[serde(default = "default_connection")]
    pub connection: String,
    #[serde(rename = "Reactance (p.u. transf)", default, deserialize_with = "lenient_opt_f64")]
    pub reactance_pu: Option<f64>,
    #[serde(
        rename = "Low-voltage-side short-circuit resistance (ohms)",
        default,
        deserialize_with = "lenient_opt_f64"
    )]
    pub resistance_ohm: Option<f64>,
}

fn default_connection() -> String {
    "Wye-Wye".to_string()
}

impl TransformerSpec {
    /// Rated power in kVA; an MVA rating takes precedence.
    pub fn kva(&self) -> Result<f64> {
        match (self.installed_mva, self.installed_kva) {
            (Some(mva), _) => Ok(mva * 1000.0),
            (None, Some(kva)) => Ok(kva),
            (None, None) => Err(anyhow!(
                "transformer '{}' has no installed power in the catalog",
                self.name
            )),
        }
    }

    pub fn phase_count(&self) -> usize {
        self.nphases.round().max(0.0) as usize
    }
}

/// Parsed equipment catalog.
#[derive(Debug, Clone, Default)]
pub struct EquipmentCatalog {
    wires: HashMap<String, WireSpec>,
    lines: Vec<LineSpec>,
    transformers: Vec<TransformerSpec>,
}

impl EquipmentCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading equipment catalog {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing equipment catalog {}", path.display()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let mut catalog = EquipmentCatalog::default();

        let wires = value
            .get(WIRES_KEY)
            .and_then(|w| w.get(WIRES_CATALOG_KEY))
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("catalog is missing '{WIRES_KEY}.{WIRES_CATALOG_KEY}'"))?;
        for wire in wires {
            let spec: WireSpec =
                serde_json::from_value(wire.clone()).context("parsing wire catalog entry")?;
            catalog.wires.insert(spec.nameclass.clone(), spec);
        }

        for entry in zone_entries(value, LINES_KEY) {
            let spec: LineSpec =
                serde_json::from_value(entry.clone()).context("parsing line catalog entry")?;
            catalog.lines.push(spec);
        }
        for entry in zone_entries(value, TRANSFORMERS_KEY) {
            let spec: TransformerSpec = serde_json::from_value(entry.clone())
                .context("parsing transformer catalog entry")?;
            catalog.transformers.push(spec);
        }
        Ok(catalog)
    }

    pub fn wire(&self, nameclass: &str) -> Option<&WireSpec> {
        self.wires.get(nameclass)
    }

    pub fn line(&self, name: &str) -> Option<&LineSpec> {
        self.lines.iter().find(|l| l.name == name)
    }

    pub fn transformer(&self, name: &str) -> Option<&TransformerSpec> {
        self.transformers.iter().find(|t| t.name == name)
    }

    /// Installed ratings of every catalog transformer, in kVA.
    pub fn transformer_ratings_kva(&self) -> Vec<f64> {
        self.transformers
            .iter()
            .filter_map(|t| t.kva().ok())
            .collect()
    }
}

/// Entries of a zoned section, in file order. Non-object zones are skipped.
fn zone_entries<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .flat_map(|zones| zones.values())
        .filter_map(Value::as_array)
        .flatten()
}
