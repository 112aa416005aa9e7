//! Run orchestrator: read, validate, write the circuit, then step through time.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use tracing::{info, warn};
use ugrid_algo::{validate_model, SizingPolicy, ValidationOptions, ValidationOutcome};
use ugrid_core::{GridError, Model};
use ugrid_io::profiles::{parse_timestamp, DATETIME_FORMAT, TIMESTAMPS_FILE};
use ugrid_io::reports::ReportPaths;
use ugrid_io::{
    read_timestamps, read_urbanopt, write_opendss, EquipmentCatalog, ProfileWriter, ReadOutcome,
    ReaderOptions, RunRecorder, SOURCE_ELEMENT,
};
use ugrid_solver::{
    line_loading, transformer_loading, CircuitDescription, CircuitSession, SolveRequest,
};

use crate::config::ResolvedConfig;

/// Profile path prefix as seen from `dss_files/`
const PROFILES_RELATIVE: &str = "../profiles";

/// Timepoints selected for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: usize,
    /// Exclusive
    pub end: usize,
    /// Profile indices between two simulated timepoints
    pub stride: usize,
    /// Native step of the load files, in minutes
    pub step_minutes: f64,
}

impl TimeWindow {
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        (self.start..self.end).step_by(self.stride.max(1))
    }

    pub fn len(&self) -> usize {
        self.indices().count()
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

fn locate(timestamps: &[NaiveDateTime], raw: &str) -> Option<usize> {
    let wanted = parse_timestamp(raw).ok()?;
    timestamps.iter().position(|ts| *ts == wanted)
}

/// Select the simulated timepoints.
///
/// A start or end time that is not in the profile falls back to the full
/// range with a warning. The timestep must be a whole multiple of the
/// profile step.
pub fn time_window(
    timestamps: &[NaiveDateTime],
    start_time: Option<&str>,
    end_time: Option<&str>,
    timestep_minutes: Option<f64>,
) -> Result<TimeWindow> {
    if timestamps.len() < 2 {
        bail!(GridError::Config(format!(
            "at least two timestamps are needed to derive the load file step, found {}",
            timestamps.len()
        )));
    }
    let step_minutes = (timestamps[1] - timestamps[0]).num_seconds() as f64 / 60.0;
    if step_minutes <= 0.0 {
        bail!(GridError::Config(
            "load file timestamps are not increasing".into()
        ));
    }

    let start = match start_time {
        Some(raw) => locate(timestamps, raw).unwrap_or_else(|| {
            warn!("Start time {} not found, starting at {}", raw, timestamps[0]);
            0
        }),
        None => 0,
    };
    let end = match end_time {
        Some(raw) => locate(timestamps, raw).map(|i| i + 1).unwrap_or_else(|| {
            warn!(
                "End time {} not found, ending at {}",
                raw,
                timestamps[timestamps.len() - 1]
            );
            timestamps.len()
        }),
        None => timestamps.len(),
    };
    if start >= end {
        bail!(GridError::Config(format!(
            "start time {} is after end time {}",
            timestamps[start],
            timestamps[end - 1]
        )));
    }

    let stride = match timestep_minutes {
        None => 1,
        Some(timestep) => {
            let ratio = timestep / step_minutes;
            if ratio < 1.0 || (ratio - ratio.round()).abs() > 1e-9 {
                bail!(GridError::Config(format!(
                    "Timestep {} is not a multiple of the electrical load file step size of {}",
                    timestep, step_minutes
                )));
            }
            ratio.round() as usize
        }
    };

    Ok(TimeWindow {
        start,
        end,
        stride,
        step_minutes,
    })
}

/// Solve request for a profile index, with hour and seconds from elapsed time.
pub fn solve_request(timestamps: &[NaiveDateTime], index: usize, step_minutes: f64) -> SolveRequest {
    let elapsed = (timestamps[index] - timestamps[0]).num_seconds().max(0);
    SolveRequest {
        index,
        stepsize_minutes: step_minutes,
        hour: (elapsed / 3600) as u64,
        seconds: (elapsed % 3600) as f64,
    }
}

/// Step the session through the window and collect per-element reports.
///
/// Building voltages are matched by junction name, ignoring case.
pub fn simulate<S: CircuitSession>(
    session: &mut S,
    circuit: &CircuitDescription<'_>,
    building_junctions: &BTreeMap<String, String>,
    timestamps: &[NaiveDateTime],
    window: &TimeWindow,
) -> Result<RunRecorder> {
    let mut buildings_at: HashMap<String, Vec<&str>> = HashMap::new();
    for (building, junction) in building_junctions {
        buildings_at
            .entry(junction.to_lowercase())
            .or_default()
            .push(building.as_str());
    }

    session.clear();
    session
        .load(circuit)
        .with_context(|| format!("loading circuit into {}", session.name()))?;

    let mut recorder = RunRecorder::new();
    for index in window.indices() {
        let stamp = timestamps[index].format(DATETIME_FORMAT).to_string();
        println!("Timepoint: {stamp}");
        let request = solve_request(timestamps, index, window.step_minutes);
        if let Some(message) = session.solve(&request)? {
            warn!("{} at {}: {}", session.name(), stamp, message);
        }

        for (bus, voltage) in session.bus_voltages()? {
            if let Some(buildings) = buildings_at.get(&bus.to_lowercase()) {
                for building in buildings {
                    recorder.record_voltage(building, &stamp, voltage);
                }
            }
        }
        for line in session.line_names() {
            let reading = session.line_currents(&line)?;
            recorder.record_line(&line, &stamp, line_loading(&reading));
        }
        for transformer in session.transformer_names() {
            let reading = session.transformer_currents(&transformer)?;
            recorder.record_transformer(&transformer, &stamp, transformer_loading(&reading));
        }
    }
    Ok(recorder)
}

pub fn validation_options(
    upgrade: bool,
    catalog_sizing: bool,
    catalog: &EquipmentCatalog,
) -> ValidationOptions {
    if !upgrade {
        return ValidationOptions::default();
    }
    let policy = if catalog_sizing {
        SizingPolicy::from_catalog(catalog.transformer_ratings_kva())
    } else {
        SizingPolicy::default()
    };
    ValidationOptions::default().with_upgrades(policy)
}

/// Read the scenario and run the consistency pipeline on it.
pub fn read_and_validate(
    geojson: &Path,
    catalog: &EquipmentCatalog,
    reader: &ReaderOptions,
    validation: &ValidationOptions,
) -> Result<(ReadOutcome, ValidationOutcome)> {
    let mut outcome = read_urbanopt(geojson, catalog, reader)?;
    if outcome.diagnostics.has_issues() {
        info!("reader: {}", outcome.diagnostics.summary());
    }
    let validated = validate_model(&mut outcome.model, SOURCE_ELEMENT, validation)?;
    Ok((outcome, validated))
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub master: PathBuf,
    pub timepoints: usize,
    pub reports: ReportPaths,
    pub validation: ValidationOutcome,
}

/// Full run: scenario in, circuit files and violation reports out.
pub fn run<S: CircuitSession>(config: &ResolvedConfig, session: &mut S) -> Result<RunSummary> {
    info!("CONFIGS used: {:?}", config);
    let catalog = EquipmentCatalog::load(&config.equipment_file)?;
    let reader = ReaderOptions {
        load_folder: config.run_dir.clone(),
        use_reopt: config.use_reopt,
        profiles: Some(ProfileWriter::new(&config.profiles_dir, PROFILES_RELATIVE)),
    };
    let validation = validation_options(
        config.upgrade_transformers,
        config.catalog_sizing,
        &catalog,
    );
    let (outcome, validated) =
        read_and_validate(&config.geojson_file, &catalog, &reader, &validation)?;
    let model: &Model = &outcome.model;

    let dss = write_opendss(model, &config.output_dir)?;
    info!("circuit written to {}", dss.master.display());

    let timestamps = read_timestamps(&config.profiles_dir.join(TIMESTAMPS_FILE))?;
    let window = time_window(
        &timestamps,
        config.start_time.as_deref(),
        config.end_time.as_deref(),
        config.timestep,
    )?;
    info!(
        "simulating {} timepoints every {} minutes with {}",
        window.len(),
        window.step_minutes * window.stride as f64,
        session.name()
    );

    let circuit = CircuitDescription {
        model,
        master_file: Some(dss.master.as_path()),
    };
    let recorder = simulate(
        session,
        &circuit,
        &outcome.building_junctions,
        &timestamps,
        &window,
    )?;
    let reports = recorder.write_all(&config.output_dir)?;

    Ok(RunSummary {
        output_dir: config.output_dir.clone(),
        master: dss.master,
        timepoints: window.len(),
        reports,
        validation: validated,
    })
}
