//! Prediction reports for site-level regression models.
//!
//! A [`PredictionReport`] runs a fitted [`Predictor`] over the train, eval
//! and test splits, optionally maps predictions and features back to their
//! original scale, tags every row with its split and `siteID`, joins the
//! rows with a site attribute table and writes the result as Parquet. The
//! per-split R² is printed alongside.

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod report;

pub use config::{IdAlignment, ReportConfig, RunLayout};
pub use data::model::{Split, SplitData};
pub use error::ReportError;
pub use metrics::SplitAccuracy;
pub use model::{
    FittedTransform, InverseTransform, JsonTransformStore, LinearPredictor, Predictor,
    TransformStore,
};
pub use report::{PredictionReport, Report, SplitSet, FEET_TO_METERS};
