//! Per-element result CSVs.
//!
//! One file per building, line and transformer with one row per simulated
//! timestep, under `results/Features`, `results/Lines` and
//! `results/Transformers`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

pub const RESULTS_FOLDER: &str = "results";

/// Per-unit voltage above which a building is overvoltage
pub const OVERVOLTAGE_PU: f64 = 1.05;
/// Per-unit voltage below which a building is undervoltage
pub const UNDERVOLTAGE_PU: f64 = 0.95;
/// Per-unit loading above which a branch is overloaded
pub const OVERLOAD_PU: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageRow {
    #[serde(rename = "Datetime")]
    pub datetime: String,
    #[serde(rename = "p.u. voltage")]
    pub voltage_pu: f64,
    pub overvoltage: bool,
    pub undervoltage: bool,
}

impl VoltageRow {
    pub fn new(datetime: impl Into<String>, voltage_pu: f64) -> Self {
        Self {
            datetime: datetime.into(),
            voltage_pu,
            overvoltage: voltage_pu > OVERVOLTAGE_PU,
            undervoltage: voltage_pu < UNDERVOLTAGE_PU,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadingRow {
    #[serde(rename = "Datetime")]
    pub datetime: String,
    #[serde(rename = "p.u. loading")]
    pub loading_pu: f64,
    pub overloaded: bool,
}

impl LoadingRow {
    pub fn new(datetime: impl Into<String>, loading_pu: f64) -> Self {
        Self {
            datetime: datetime.into(),
            loading_pu,
            overloaded: loading_pu > OVERLOAD_PU,
        }
    }
}

/// Rows collected over a run, keyed by element name.
#[derive(Debug, Clone, Default)]
pub struct RunRecorder {
    pub features: BTreeMap<String, Vec<VoltageRow>>,
    pub lines: BTreeMap<String, Vec<LoadingRow>>,
    pub transformers: BTreeMap<String, Vec<LoadingRow>>,
}

/// Paths of the written result folders.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub features: PathBuf,
    pub lines: PathBuf,
    pub transformers: PathBuf,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_voltage(&mut self, building: &str, datetime: &str, voltage_pu: f64) {
        self.features
            .entry(building.to_string())
            .or_default()
            .push(VoltageRow::new(datetime, voltage_pu));
    }

    pub fn record_line(&mut self, line: &str, datetime: &str, loading_pu: f64) {
        self.lines
            .entry(line.to_string())
            .or_default()
            .push(LoadingRow::new(datetime, loading_pu));
    }

    pub fn record_transformer(&mut self, transformer: &str, datetime: &str, loading_pu: f64) {
        self.transformers
            .entry(transformer.to_string())
            .or_default()
            .push(LoadingRow::new(datetime, loading_pu));
    }

    pub fn timesteps(&self) -> usize {
        self.features
            .values()
            .map(Vec::len)
            .chain(self.lines.values().map(Vec::len))
            .chain(self.transformers.values().map(Vec::len))
            .max()
            .unwrap_or(0)
    }

    /// Write every series under `<out_dir>/results/`.
    pub fn write_all(&self, out_dir: &Path) -> Result<ReportPaths> {
        let root = out_dir.join(RESULTS_FOLDER);
        let paths = ReportPaths {
            features: root.join("Features"),
            lines: root.join("Lines"),
            transformers: root.join("Transformers"),
        };
        write_series(&paths.features, &self.features)?;
        write_series(&paths.lines, &self.lines)?;
        write_series(&paths.transformers, &self.transformers)?;
        Ok(paths)
    }
}

/// File name for an element: `:` is not allowed on every filesystem.
pub fn report_file_name(element: &str) -> String {
    format!("{}.csv", element.replace(':', ""))
}

fn write_series<R: Serialize>(dir: &Path, series: &BTreeMap<String, Vec<R>>) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for (name, rows) in series {
        let path = dir.join(report_file_name(name));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
