//! OpenDSS script exporter
//!
//! Writes the model as a set of `.dss` scripts under `dss_files/` (with
//! `Master.dss` redirecting to the rest) and a JSON dump of the model under
//! `json_files/`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ugrid_core::{
    ConnectionType, Line, Load, Model, PhaseSet, Photovoltaic, PowerTransformer, Timeseries,
    Volts, Wire,
};

pub const DSS_FOLDER: &str = "dss_files";
pub const JSON_FOLDER: &str = "json_files";
pub const MASTER_FILE: &str = "Master.dss";

const WIRE_FILE: &str = "WireData.dss";
const LINE_FILE: &str = "Lines.dss";
const TRANSFORMER_FILE: &str = "Transformers.dss";
const LOADSHAPE_FILE: &str = "LoadShapes.dss";
const LOAD_FILE: &str = "Loads.dss";
const PV_FILE: &str = "PVSystems.dss";
const BUSCOORDS_FILE: &str = "Buscoords.dss";

/// `bus.1.2.3` for the energized phases of a connection.
fn bus_spec(bus: &str, phases: PhaseSet) -> String {
    let mut spec = bus.to_string();
    for phase in phases.iter() {
        let _ = write!(spec, ".{}", phase.node_number());
    }
    spec
}

fn kv(voltage: Volts) -> f64 {
    voltage.to_kilovolts().value()
}

fn connection(conn: ConnectionType) -> &'static str {
    match conn {
        ConnectionType::Delta => "delta",
        ConnectionType::Wye => "wye",
    }
}

/// Rendered circuit scripts, in redirect order.
#[derive(Debug, Clone, Default)]
pub struct DssScripts {
    files: Vec<(&'static str, String)>,
}

impl DssScripts {
    pub fn render(model: &Model) -> Result<Self> {
        let scripts = vec![
            (MASTER_FILE, render_master(model)?),
            (WIRE_FILE, render_wires(model)?),
            (LINE_FILE, render_lines(model)?),
            (TRANSFORMER_FILE, render_transformers(model)?),
            (LOADSHAPE_FILE, render_loadshapes(model)?),
            (LOAD_FILE, render_loads(model)?),
            (PV_FILE, render_pv(model)?),
            (BUSCOORDS_FILE, render_buscoords(model)?),
        ];
        Ok(Self { files: scripts })
    }

    pub fn file(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, content)| content.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.files.iter().map(|(name, _)| *name)
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (name, content) in &self.files {
            let path = dir.join(name);
            fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(())
    }
}

/// Paths produced by [`write_opendss`].
#[derive(Debug, Clone)]
pub struct DssOutput {
    pub dss_dir: PathBuf,
    pub master: PathBuf,
    pub model_json: PathBuf,
}

/// Write `dss_files/*.dss` and `json_files/model.json` under `out_dir`.
pub fn write_opendss(model: &Model, out_dir: &Path) -> Result<DssOutput> {
    let dss_dir = out_dir.join(DSS_FOLDER);
    DssScripts::render(model)?.write(&dss_dir)?;

    let json_dir = out_dir.join(JSON_FOLDER);
    fs::create_dir_all(&json_dir).with_context(|| format!("creating {}", json_dir.display()))?;
    let model_json = json_dir.join("model.json");
    let content = serde_json::to_string_pretty(model).context("serializing model")?;
    fs::write(&model_json, content)
        .with_context(|| format!("writing {}", model_json.display()))?;

    tracing::info!("wrote OpenDSS model to {}", dss_dir.display());
    Ok(DssOutput {
        master: dss_dir.join(MASTER_FILE),
        dss_dir,
        model_json,
    })
}

fn render_master(model: &Model) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "Clear")?;
    writeln!(out)?;

    let (name, bus, voltage, pu) = match model.power_sources().next() {
        Some(source) => (
            model
                .feeder
                .as_ref()
                .map(|f| f.name.clone())
                .unwrap_or_else(|| source.name.clone()),
            source.connecting_element.clone(),
            source.nominal_voltage,
            source.per_unit.value(),
        ),
        None => ("circuit".to_string(), "source".to_string(), Volts(0.0), 1.0),
    };
    writeln!(
        out,
        "New Circuit.{} basekv={} pu={} phases=3 bus1={}",
        name,
        kv(voltage),
        pu,
        bus
    )?;
    writeln!(out)?;
    for file in [
        WIRE_FILE,
        LINE_FILE,
        TRANSFORMER_FILE,
        LOADSHAPE_FILE,
        LOAD_FILE,
        PV_FILE,
    ] {
        writeln!(out, "Redirect {file}")?;
    }
    writeln!(out)?;

    let bases: Vec<String> = voltage_bases(model).iter().map(f64::to_string).collect();
    writeln!(out, "Set Voltagebases=[{}]", bases.join(", "))?;
    writeln!(out, "Calcvoltagebases")?;
    writeln!(out, "Buscoords {BUSCOORDS_FILE}")?;
    Ok(out)
}

/// Distinct kV levels of the source and every winding, ascending.
pub fn voltage_bases(model: &Model) -> Vec<f64> {
    let mut bases: Vec<f64> = model
        .power_sources()
        .map(|s| s.nominal_voltage)
        .chain(
            model
                .transformers()
                .flat_map(|tx| tx.windings.iter().map(|w| w.nominal_voltage)),
        )
        .map(kv)
        .filter(|kv| *kv > 0.0)
        .collect();
    bases.sort_by(f64::total_cmp);
    bases.dedup();
    bases
}

fn render_wires(model: &Model) -> Result<String> {
    let mut wires: BTreeMap<&str, &Wire> = BTreeMap::new();
    for line in model.lines() {
        for wire in &line.wires {
            wires.entry(wire.nameclass.as_str()).or_insert(wire);
        }
    }

    let mut out = String::new();
    for (name, wire) in wires {
        match &wire.concentric_neutral {
            None => writeln!(
                out,
                "New WireData.{} GMRac={} GMRunits=m Rac={} Runits=m Diam={} Radunits=m Normamps={}",
                name, wire.gmr_m, wire.resistance_ohm_per_m, wire.diameter_m, wire.ampacity_a
            )?,
            Some(cn) => writeln!(
                out,
                "New CNData.{} k={} DiaStrand={} GmrStrand={} Rstrand={} DiaCable={} InsLayer={} \
                 GMRac={} Rac={} Diam={} EpsR=2.3 Runits=m Radunits=m GMRunits=m Normamps={}",
                name,
                cn.strand_count,
                cn.diameter_m,
                cn.gmr_m,
                cn.resistance_ohm_per_m,
                cn.outside_diameter_m,
                cn.insulation_thickness_m,
                wire.gmr_m,
                wire.resistance_ohm_per_m,
                wire.diameter_m,
                wire.ampacity_a
            )?,
        }
    }
    Ok(out)
}

fn render_line(out: &mut String, line: &Line) -> Result<()> {
    let phases = line.phases();
    let phase_count = phases.len().max(1);
    if line.wires.is_empty() {
        writeln!(
            out,
            "New Line.{} bus1={} bus2={} phases={} length={} units=m",
            line.name,
            bus_spec(&line.from_element, phases),
            bus_spec(&line.to_element, phases),
            phase_count,
            line.length_m
        )?;
        return Ok(());
    }

    let geometry = format!("{}_geometry", line.name);
    writeln!(
        out,
        "New LineGeometry.{} nconds={} nphases={} reduce=no",
        geometry,
        line.wires.len(),
        phase_count
    )?;
    for (cond, wire) in line.wires.iter().enumerate() {
        let kind = if wire.concentric_neutral.is_some() {
            "cncable"
        } else {
            "wire"
        };
        writeln!(
            out,
            "~ cond={} {}={} x={} h={} units=m",
            cond + 1,
            kind,
            wire.nameclass,
            wire.x_m,
            wire.height_m
        )?;
    }
    writeln!(
        out,
        "New Line.{} bus1={} bus2={} phases={} length={} units=m geometry={}",
        line.name,
        bus_spec(&line.from_element, phases),
        bus_spec(&line.to_element, phases),
        phase_count,
        line.length_m,
        geometry
    )?;
    Ok(())
}

fn render_lines(model: &Model) -> Result<String> {
    let mut out = String::new();
    for line in model.lines() {
        render_line(&mut out, line)?;
        writeln!(out)?;
    }
    Ok(out)
}

/// Winding resistance in percent of the winding's own impedance base.
fn percent_r(resistance_ohm: f64, voltage: Volts, kva: f64) -> f64 {
    let kv = kv(voltage);
    if kv <= 0.0 || kva <= 0.0 {
        return 0.0;
    }
    let z_base = kv * kv * 1000.0 / kva;
    resistance_ohm / z_base * 100.0
}

fn render_transformer(out: &mut String, tx: &PowerTransformer) -> Result<()> {
    let kva = tx.rated_power().kva();
    let primary_phases = tx.primary_phases();
    let x = |i: usize| tx.reactances.get(i).copied().unwrap_or(0.0) * 100.0;

    if tx.is_center_tap {
        writeln!(
            out,
            "New Transformer.{} phases=1 windings=3 XHL={} XHT={} XLT={}",
            tx.name,
            x(0),
            x(1),
            x(2)
        )?;
        let buses = [
            bus_spec(&tx.from_element, primary_phases),
            format!("{}.1.0", tx.to_element),
            format!("{}.0.2", tx.to_element),
        ];
        for (i, (winding, bus)) in tx.windings.iter().zip(buses).enumerate() {
            let voltage = if i == 0 {
                winding.nominal_voltage
            } else {
                winding.nominal_voltage / 2.0
            };
            writeln!(
                out,
                "~ wdg={} bus={} conn={} kv={} kva={} %r={}",
                i + 1,
                bus,
                connection(winding.connection_type),
                kv(voltage),
                winding.rated_power.kva(),
                percent_r(winding.resistance, voltage, kva)
            )?;
        }
        return Ok(());
    }

    writeln!(
        out,
        "New Transformer.{} phases={} windings={} XHL={}",
        tx.name,
        primary_phases.len().max(1),
        tx.windings.len(),
        x(0)
    )?;
    for (i, winding) in tx.windings.iter().enumerate() {
        let bus = if i == 0 {
            &tx.from_element
        } else {
            &tx.to_element
        };
        writeln!(
            out,
            "~ wdg={} bus={} conn={} kv={} kva={} %r={}",
            i + 1,
            bus_spec(bus, winding.phases()),
            connection(winding.connection_type),
            kv(winding.nominal_voltage),
            winding.rated_power.kva(),
            percent_r(winding.resistance, winding.nominal_voltage, kva)
        )?;
    }
    Ok(())
}

fn render_transformers(model: &Model) -> Result<String> {
    let mut out = String::new();
    for tx in model.transformers() {
        render_transformer(&mut out, tx)?;
        writeln!(out)?;
    }
    Ok(out)
}

fn timeseries_of(model: &Model) -> impl Iterator<Item = &Timeseries> {
    model
        .loads()
        .filter_map(|l| l.timeseries.as_ref())
        .chain(model.photovoltaics().filter_map(|pv| pv.timeseries.as_ref()))
}

fn render_loadshapes(model: &Model) -> Result<String> {
    let mut out = String::new();
    let mut seen = BTreeSet::new();
    for ts in timeseries_of(model) {
        if !seen.insert(ts.data_label.as_str()) {
            continue;
        }
        let Some(location) = &ts.data_location else {
            continue;
        };
        writeln!(
            out,
            "New Loadshape.{} npts={} sinterval={} mult=(file={}) useactual=no",
            ts.data_label,
            ts.values.len(),
            (ts.interval_hours * 3600.0).round(),
            location
        )?;
    }
    Ok(out)
}

fn yearly(ts: &Option<Timeseries>) -> String {
    ts.as_ref()
        .filter(|ts| ts.data_location.is_some())
        .map(|ts| format!(" yearly={}", ts.data_label))
        .unwrap_or_default()
}

fn render_load(out: &mut String, load: &Load) -> Result<()> {
    let phases = load.phases();
    writeln!(
        out,
        "New Load.{} bus1={} phases={} conn=wye model=1 kv={} kw={} kvar={}{}",
        load.name,
        bus_spec(&load.connecting_element, phases),
        phases.len().max(1),
        load.nominal_voltage.map(kv).unwrap_or(0.0),
        load.active_power().kw(),
        load.reactive_power().value() / 1000.0,
        yearly(&load.timeseries)
    )?;
    Ok(())
}

fn render_loads(model: &Model) -> Result<String> {
    let mut out = String::new();
    for load in model.loads() {
        render_load(&mut out, load)?;
    }
    Ok(out)
}

fn render_photovoltaic(out: &mut String, pv: &Photovoltaic) -> Result<()> {
    let conn = pv.connection_type.map(connection).unwrap_or("wye");
    writeln!(
        out,
        "New PVSystem.{} bus1={} phases={} conn={} kv={} kVA={} Pmpp={} irradiance=1{}",
        pv.name,
        bus_spec(&pv.connecting_element, pv.phases),
        pv.phases.len().max(1),
        conn,
        pv.nominal_voltage.map(kv).unwrap_or(0.0),
        pv.active_rating.kw(),
        pv.rated_power.kw(),
        yearly(&pv.timeseries)
    )?;
    Ok(())
}

fn render_pv(model: &Model) -> Result<String> {
    let mut out = String::new();
    for pv in model.photovoltaics() {
        render_photovoltaic(&mut out, pv)?;
    }
    Ok(out)
}

fn render_buscoords(model: &Model) -> Result<String> {
    let mut out = String::new();
    for node in model.nodes() {
        if let Some(position) = node.position() {
            writeln!(out, "{} {} {}", node.name, position.long, position.lat)?;
        }
    }
    Ok(out)
}
