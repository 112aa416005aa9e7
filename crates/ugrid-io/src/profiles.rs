//! Per-building load and PV profiles.
//!
//! Simulation reports live at `<load folder>/<building>/feature_reports/`.
//! A profile is one power column plus the `Datetime` column; it is written
//! back out as single-column CSVs (raw and per-unit) next to the circuit
//! files and attached to its element as a [`Timeseries`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use serde_json::Value;
use ugrid_core::Timeseries;

pub const DATETIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
pub const DATETIME_COLUMN: &str = "Datetime";

pub const DEFAULT_REPORT: &str = "default_feature_report.csv";
pub const REOPT_REPORT: &str = "feature_optimization.csv";
pub const REOPT_SUMMARY: &str = "feature_optimization.json";

pub const NET_POWER_KW: &str = "Net Power(kW)";
pub const NET_POWER_W: &str = "Net Power(W)";
pub const REOPT_LOAD_KW: &str = "REopt:Electricity:Load:Total(kw)";
pub const REOPT_PV_KW: &str = "REopt:ElectricityProduced:PV:Total(kw)";

pub const TIMESTAMPS_FILE: &str = "timestamps.csv";

/// Report folder of one building.
pub fn feature_reports_dir(load_folder: &Path, building: &str) -> PathBuf {
    load_folder.join(building).join("feature_reports")
}

/// One power column of a feature report.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub column: String,
    /// Watts per unit of the column (1000 for kW columns)
    pub multiplier: f64,
    pub timestamps: Vec<String>,
    pub values: Vec<f64>,
}

impl Profile {
    /// Read the first of `candidates` (column name, multiplier) present in
    /// the report header.
    pub fn read(path: &Path, candidates: &[(&str, f64)]) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening feature report {}", path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .clone();

        let (column, multiplier, col_i) = candidates
            .iter()
            .find_map(|(name, mult)| {
                headers
                    .iter()
                    .position(|h| h == *name)
                    .map(|i| (name.to_string(), *mult, i))
            })
            .ok_or_else(|| {
                let names: Vec<&str> = candidates.iter().map(|(name, _)| *name).collect();
                anyhow!(
                    "none of the columns {:?} were found in {}",
                    names,
                    path.display()
                )
            })?;
        let ts_i = headers.iter().position(|h| h == DATETIME_COLUMN);

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("reading {}", path.display()))?;
            let raw = record.get(col_i).unwrap_or_default().trim();
            let value: f64 = raw.parse().with_context(|| {
                format!("row {} of {}: '{}' is not a number", row + 2, path.display(), raw)
            })?;
            values.push(value);
            if let Some(ts_i) = ts_i {
                timestamps.push(record.get(ts_i).unwrap_or_default().trim().to_string());
            }
        }
        Ok(Self {
            column,
            multiplier,
            timestamps,
            values,
        })
    }

    /// Building demand report: `Net Power(kW)`, or `Net Power(W)`.
    pub fn read_load(load_folder: &Path, building: &str, use_reopt: bool) -> Result<Self> {
        let dir = feature_reports_dir(load_folder, building);
        if use_reopt {
            Self::read(&dir.join(REOPT_REPORT), &[(REOPT_LOAD_KW, 1000.0)])
        } else {
            Self::read(
                &dir.join(DEFAULT_REPORT),
                &[(NET_POWER_KW, 1000.0), (NET_POWER_W, 1.0)],
            )
        }
    }

    pub fn read_pv(load_folder: &Path, building: &str) -> Result<Self> {
        let dir = feature_reports_dir(load_folder, building);
        Self::read(&dir.join(REOPT_REPORT), &[(REOPT_PV_KW, 1000.0)])
    }

    /// Largest sample, in column units. Empty profiles peak at zero.
    pub fn peak(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Samples divided by `base`; a zero base gives an all-zero profile.
    pub fn per_unit(&self, base: f64) -> Vec<f64> {
        if base == 0.0 {
            return vec![0.0; self.values.len()];
        }
        self.values.iter().map(|v| v / base).collect()
    }

    /// Sampling interval from the first two timestamps.
    pub fn interval_hours(&self) -> Result<f64> {
        let [first, second, ..] = self.timestamps.as_slice() else {
            bail!("profile '{}' needs at least two timestamps", self.column);
        };
        let delta = parse_timestamp(second)? - parse_timestamp(first)?;
        Ok(delta.num_seconds() as f64 / 3600.0)
    }
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), DATETIME_FORMAT)
        .with_context(|| format!("'{raw}' does not match {DATETIME_FORMAT}"))
}

/// Installed PV capacity from a REopt summary, in kW.
pub fn read_pv_capacity_kw(load_folder: &Path, building: &str) -> Result<f64> {
    let path = feature_reports_dir(load_folder, building).join(REOPT_SUMMARY);
    let content =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let summary: Value =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    summary
        .get("distributed_generation")
        .and_then(|dg| dg.get("total_solar_pv_kw"))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            anyhow!(
                "{} has no distributed_generation.total_solar_pv_kw",
                path.display()
            )
        })
}

/// Writes profile CSVs into one folder and builds the matching timeseries.
#[derive(Debug, Clone)]
pub struct ProfileWriter {
    dir: PathBuf,
    /// Folder prefix recorded in `Timeseries::data_location`
    relative: String,
}

impl ProfileWriter {
    pub fn new(dir: impl Into<PathBuf>, relative: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            relative: relative.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `load_<id>.csv`, `load_<id>_pu.csv` and `timestamps.csv`.
    pub fn write_load(&self, building: &str, profile: &Profile) -> Result<Timeseries> {
        self.write_profile(
            &format!("load_{building}"),
            &format!("feature_{building}"),
            profile,
            profile.peak(),
            true,
        )
    }

    /// Write `pv_<id>.csv` and `pv_<id>_pu.csv`, normalised by the capacity.
    pub fn write_pv(&self, building: &str, profile: &Profile, capacity_kw: f64) -> Result<Timeseries> {
        self.write_profile(
            &format!("pv_{building}"),
            &format!("pv_feature_{building}"),
            profile,
            capacity_kw,
            false,
        )
    }

    fn write_profile(
        &self,
        stem: &str,
        label: &str,
        profile: &Profile,
        base: f64,
        with_timestamps: bool,
    ) -> Result<Timeseries> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating profile folder {}", self.dir.display()))?;
        let pu = profile.per_unit(base);
        write_column(&self.dir.join(format!("{stem}.csv")), None, &profile.values)?;
        let pu_name = format!("{stem}_pu.csv");
        write_column(&self.dir.join(&pu_name), None, &pu)?;
        if with_timestamps {
            write_column(
                &self.dir.join(TIMESTAMPS_FILE),
                Some(DATETIME_COLUMN),
                &profile.timestamps,
            )?;
        }

        Ok(Timeseries {
            data_label: label.to_string(),
            interval_hours: profile.interval_hours()?,
            data_location: Some(format!("{}/{}", self.relative, pu_name)),
            scale_factor: 1.0,
            values: pu,
        })
    }
}

fn write_column<T: ToString>(path: &Path, header: Option<&str>, values: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    if let Some(header) = header {
        writer.write_record([header])?;
    }
    for value in values {
        writer.write_record([value.to_string()])?;
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Timestamps written by [`ProfileWriter::write_load`].
pub fn read_timestamps(path: &Path) -> Result<Vec<NaiveDateTime>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening timestamps {}", path.display()))?;
    let mut timestamps = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        if let Some(raw) = record.get(0) {
            timestamps.push(parse_timestamp(raw)?);
        }
    }
    Ok(timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_report(dir: &Path, header: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join("report.csv");
        let mut content = format!("{header}\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_watt_column_fallback() {
        let dir = tempdir().unwrap();
        let path = write_report(
            dir.path(),
            "Datetime,Net Power(W)",
            &["2020/01/01 00:00:00,500", "2020/01/01 00:15:00,1000"],
        );
        let profile = Profile::read(&path, &[(NET_POWER_KW, 1000.0), (NET_POWER_W, 1.0)]).unwrap();
        assert_eq!(profile.column, NET_POWER_W);
        assert_eq!(profile.multiplier, 1.0);
        assert_eq!(profile.peak(), 1000.0);
        assert_eq!(profile.per_unit(profile.peak()), vec![0.5, 1.0]);
        assert_eq!(profile.interval_hours().unwrap(), 0.25);
    }

    #[test]
    fn test_missing_column_names_candidates() {
        let dir = tempdir().unwrap();
        let path = write_report(dir.path(), "Datetime,Other", &["2020/01/01 00:00:00,1"]);
        let err = Profile::read(&path, &[(NET_POWER_KW, 1000.0)]).unwrap_err();
        assert!(err.to_string().contains("Net Power(kW)"));
    }

    #[test]
    fn test_zero_base_gives_zero_profile() {
        let profile = Profile {
            column: REOPT_PV_KW.to_string(),
            multiplier: 1000.0,
            timestamps: Vec::new(),
            values: vec![0.0, 0.0],
        };
        assert_eq!(profile.per_unit(0.0), vec![0.0, 0.0]);
        assert!(profile.interval_hours().is_err());
    }

    #[test]
    fn test_writer_outputs_and_timeseries() {
        let dir = tempdir().unwrap();
        let profile = Profile {
            column: NET_POWER_KW.to_string(),
            multiplier: 1000.0,
            timestamps: vec![
                "2020/01/01 00:00:00".to_string(),
                "2020/01/01 01:00:00".to_string(),
            ],
            values: vec![2.0, 4.0],
        };
        let writer = ProfileWriter::new(dir.path().join("profiles"), "../profiles");
        let ts = writer.write_load("b1", &profile).unwrap();
        assert_eq!(ts.data_label, "feature_b1");
        assert_eq!(ts.interval_hours, 1.0);
        assert_eq!(ts.data_location.as_deref(), Some("../profiles/load_b1_pu.csv"));
        assert_eq!(ts.values, vec![0.5, 1.0]);

        let pu = fs::read_to_string(dir.path().join("profiles/load_b1_pu.csv")).unwrap();
        assert_eq!(pu, "0.5\n1\n");
        let stamps = read_timestamps(&dir.path().join("profiles/timestamps.csv")).unwrap();
        assert_eq!(stamps.len(), 2);
    }
}
