use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// How `siteID` values are attached when a feature table and its identifier
/// table disagree on row count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdAlignment {
    /// Attach by position anyway: missing ids become null, surplus ids are
    /// ignored. A warning is logged.
    #[default]
    Positional,
    /// Fail with `ReportError::MisalignedIds`.
    Strict,
}

/// Settings of one report run.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Name of the run; also the directory holding `model/` and `metrics/`.
    pub run_name: String,
    /// Name of the predicted coefficient.
    pub out_feature: String,
    /// Label of the model that produced the predictions.
    pub best_model: String,
    /// Site attribute table (`.parquet`, `.json` or `.csv`).
    pub site_attributes: PathBuf,
    /// Invert the target transform on predictions and ground truth.
    pub inverse_target: bool,
    /// Invert the feature transform on every feature table.
    pub inverse_features: bool,
    /// Convert `predicted` and `target` from feet to meters.
    pub si_units: bool,

    /// Directory under which `<run_name>/` lives.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub id_alignment: IdAlignment,
    /// Attribute columns removed before the join.
    #[serde(default = "default_dropped_columns")]
    pub dropped_attribute_columns: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_dropped_columns() -> Vec<String> {
    vec!["lat".to_string(), "long".to_string()]
}

impl ReportConfig {
    pub fn new(
        run_name: impl Into<String>,
        out_feature: impl Into<String>,
        best_model: impl Into<String>,
        site_attributes: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            out_feature: out_feature.into(),
            best_model: best_model.into(),
            site_attributes: site_attributes.into(),
            inverse_target: false,
            inverse_features: false,
            si_units: false,
            root: default_root(),
            id_alignment: IdAlignment::default(),
            dropped_attribute_columns: default_dropped_columns(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn layout(&self) -> RunLayout<'_> {
        RunLayout { config: self }
    }
}

/// File locations derived from a [`ReportConfig`].
pub struct RunLayout<'a> {
    config: &'a ReportConfig,
}

impl RunLayout<'_> {
    pub fn run_dir(&self) -> PathBuf {
        self.config.root.join(&self.config.run_name)
    }

    /// `<run>/model/train_y_<feature>_tansformation.pkl`
    pub fn target_transform(&self) -> PathBuf {
        self.transform("y")
    }

    /// `<run>/model/train_x_<feature>_tansformation.pkl`
    pub fn feature_transform(&self) -> PathBuf {
        self.transform("x")
    }

    // Existing runs store transforms under this (misspelled) name.
    fn transform(&self, axis: &str) -> PathBuf {
        self.run_dir().join("model").join(format!(
            "train_{axis}_{}_tansformation.pkl",
            self.config.out_feature
        ))
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.run_dir().join("metrics")
    }

    /// `<run>/metrics/<run>_<model>_<feature>.parquet`
    pub fn output(&self) -> PathBuf {
        let c = self.config;
        self.metrics_dir().join(format!(
            "{}_{}_{}.parquet",
            c.run_name, c.best_model, c.out_feature
        ))
    }
}
