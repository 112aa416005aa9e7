//! Run configuration: a JSON or TOML file merged with command line flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use ugrid_core::GridError;

use crate::cli::RunArgs;

/// Keys accepted in a run configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Scenario CSV; its stem names the run folder
    pub urbanopt_scenario_file: Option<PathBuf>,
    pub urbanopt_geojson_file: Option<PathBuf>,
    pub equipment_file: Option<PathBuf>,
    pub opendss_folder: Option<PathBuf>,
    pub use_reopt: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Minutes between simulated timepoints
    pub timestep: Option<f64>,
    pub upgrade_transformers: bool,
    /// Size upgrades from the catalog's ratings instead of the standard ladder
    pub catalog_sizing: bool,
}

/// Fully resolved paths and options for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub scenario_file: PathBuf,
    pub geojson_file: PathBuf,
    pub equipment_file: PathBuf,
    /// `<scenario parent>/run/<scenario stem>`
    pub run_dir: PathBuf,
    pub output_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub use_reopt: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub timestep: Option<f64>,
    pub upgrade_transformers: bool,
    pub catalog_sizing: bool,
}

impl RunConfig {
    /// Read a config file; the format follows the extension (`.toml` or JSON).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: RunConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&contents)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
            _ => serde_json::from_str(&contents)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.relative_to(base))
    }

    /// Resolve every relative path against `base`.
    pub fn relative_to(mut self, base: &Path) -> Self {
        for path in [
            &mut self.urbanopt_scenario_file,
            &mut self.urbanopt_geojson_file,
            &mut self.equipment_file,
            &mut self.opendss_folder,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Flags given on the command line win over the file.
    pub fn with_overrides(mut self, args: &RunArgs) -> Self {
        if let Some(path) = &args.scenario_file {
            self.urbanopt_scenario_file = Some(path.clone());
        }
        if let Some(path) = &args.feature_file {
            self.urbanopt_geojson_file = Some(path.clone());
        }
        if let Some(path) = &args.equipment {
            self.equipment_file = Some(path.clone());
        }
        if let Some(path) = &args.out_dir {
            self.opendss_folder = Some(path.clone());
        }
        if let Some(start) = &args.start_time {
            self.start_time = Some(start.clone());
        }
        if let Some(end) = &args.end_time {
            self.end_time = Some(end.clone());
        }
        if args.timestep.is_some() {
            self.timestep = args.timestep;
        }
        self.use_reopt |= args.reopt;
        self.upgrade_transformers |= args.upgrade;
        self
    }

    /// Config file (if any) merged with the flags.
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        let base = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        Ok(base.with_overrides(args))
    }

    pub fn resolve(self) -> Result<ResolvedConfig> {
        let Some(scenario_file) = self.urbanopt_scenario_file else {
            bail!(GridError::Config(
                "a scenario file is required (--scenario-file or urbanopt_scenario_file)".into()
            ));
        };
        let Some(geojson_file) = self.urbanopt_geojson_file else {
            bail!(GridError::Config(
                "a feature file is required (--feature-file or urbanopt_geojson_file)".into()
            ));
        };
        let Some(equipment_file) = self.equipment_file else {
            bail!(GridError::Config(
                "an equipment file is required (--equipment or equipment_file)".into()
            ));
        };
        if let Some(step) = self.timestep {
            if !step.is_finite() || step <= 0.0 {
                bail!(GridError::Config(format!(
                    "timestep must be a positive number of minutes, got {step}"
                )));
            }
        }

        let run_dir = scenario_run_dir(&scenario_file)?;
        let output_dir = self
            .opendss_folder
            .unwrap_or_else(|| run_dir.join("opendss"));
        let profiles_dir = output_dir.join("profiles");

        Ok(ResolvedConfig {
            scenario_file,
            geojson_file,
            equipment_file,
            run_dir,
            output_dir,
            profiles_dir,
            use_reopt: self.use_reopt,
            start_time: self.start_time,
            end_time: self.end_time,
            timestep: self.timestep,
            upgrade_transformers: self.upgrade_transformers,
            catalog_sizing: self.catalog_sizing,
        })
    }
}

/// `<scenario parent>/run/<scenario stem>`, where URBANopt writes feature reports.
pub fn scenario_run_dir(scenario_file: &Path) -> Result<PathBuf> {
    let stem = scenario_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            GridError::Config(format!(
                "scenario file {} has no file name",
                scenario_file.display()
            ))
        })?;
    let parent = scenario_file.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join("run").join(stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let config = RunConfig {
            urbanopt_scenario_file: Some("/p/baseline_scenario.csv".into()),
            urbanopt_geojson_file: Some("/p/feature.json".into()),
            equipment_file: Some("/p/catalog.json".into()),
            ..RunConfig::default()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.run_dir, PathBuf::from("/p/run/baseline_scenario"));
        assert_eq!(
            resolved.output_dir,
            PathBuf::from("/p/run/baseline_scenario/opendss")
        );
        assert_eq!(
            resolved.profiles_dir,
            PathBuf::from("/p/run/baseline_scenario/opendss/profiles")
        );
    }

    #[test]
    fn test_missing_equipment_is_config_error() {
        let config = RunConfig {
            urbanopt_scenario_file: Some("s.csv".into()),
            urbanopt_geojson_file: Some("f.json".into()),
            ..RunConfig::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::Config(_))
        ));
    }

    #[test]
    fn test_toml_file_relative_paths_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            "urbanopt_scenario_file = \"baseline.csv\"\n\
             urbanopt_geojson_file = \"feature.json\"\n\
             equipment_file = \"/abs/catalog.json\"\n\
             timestep = 15.0\n",
        )
        .unwrap();

        let args = RunArgs {
            config: Some(path),
            timestep: Some(60.0),
            upgrade: true,
            ..RunArgs::default()
        };
        let config = RunConfig::from_args(&args).unwrap();
        assert_eq!(
            config.urbanopt_scenario_file,
            Some(dir.path().join("baseline.csv"))
        );
        assert_eq!(config.equipment_file, Some(PathBuf::from("/abs/catalog.json")));
        assert_eq!(config.timestep, Some(60.0));
        assert!(config.upgrade_transformers);
        assert!(!config.use_reopt);
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{"urbanopt_geojson_file": "f.json", "use_reopt": true, "start_time": "2020/01/01 00:00:00"}"#,
        )
        .unwrap();
        let config = RunConfig::load(&path).unwrap();
        assert!(config.use_reopt);
        assert_eq!(config.urbanopt_geojson_file, Some(dir.path().join("f.json")));
        assert_eq!(config.start_time.as_deref(), Some("2020/01/01 00:00:00"));
    }
}
