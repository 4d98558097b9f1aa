use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;

use crate::config::ReportConfig;
use crate::data::loader::load_attributes;
use crate::data::model::{Split, SplitData};
use crate::data::table::{
    annotate, attach_site_ids, concat, drop_columns, from_numeric_columns, inner_join,
    numeric_columns, scale_columns, PREDICTED, SITE_ID, TARGET,
};
use crate::data::writer::write_parquet;
use crate::error::ReportError;
use crate::metrics::{r_squared, stats_banner, SplitAccuracy, SAVED_BANNER};
use crate::model::{inverse_flat, InverseTransform, JsonTransformStore, Predictor, TransformStore};

/// Feet → meters.
pub const FEET_TO_METERS: f64 = 0.3048;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// The three splits of a trained model.
#[derive(Debug, Clone)]
pub struct SplitSet {
    pub train: SplitData,
    pub eval: SplitData,
    pub test: SplitData,
}

impl SplitSet {
    fn into_pairs(self) -> [(Split, SplitData); 3] {
        [
            (Split::Train, self.train),
            (Split::Eval, self.eval),
            (Split::Test, self.test),
        ]
    }
}

/// Result of a report run.
#[derive(Debug, Clone)]
pub struct Report {
    /// All splits, annotated and joined with the site attributes.
    pub merged: RecordBatch,
    /// Train, eval and test accuracy, in that order.
    pub accuracy: Vec<SplitAccuracy>,
    /// Where `merged` was written.
    pub output: PathBuf,
}

impl Report {
    pub fn accuracy(&self, split: Split) -> Option<&SplitAccuracy> {
        self.accuracy.iter().find(|a| a.split == split)
    }
}

/// One split while it moves through the pipeline.
struct Stage {
    split: Split,
    features: RecordBatch,
    ids: RecordBatch,
    predicted: Vec<f64>,
    target: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds the prediction report of one run.
///
/// [`PredictionReport::run`] consumes the builder, so every instance
/// produces at most one report.
pub struct PredictionReport<'a> {
    config: ReportConfig,
    splits: SplitSet,
    predictor: &'a dyn Predictor,
    store: Box<dyn TransformStore + 'a>,
}

impl<'a> PredictionReport<'a> {
    pub fn new(config: ReportConfig, splits: SplitSet, predictor: &'a dyn Predictor) -> Self {
        Self {
            config,
            splits,
            predictor,
            store: Box::new(JsonTransformStore),
        }
    }

    /// Load transforms from somewhere other than JSON files.
    pub fn with_transform_store(mut self, store: impl TransformStore + 'a) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn run(self) -> Result<Report> {
        let config = &self.config;
        let layout = config.layout();
        log::info!(
            "building report for run '{}' ({}, {})",
            config.run_name,
            config.best_model,
            config.out_feature
        );

        let mut stages = self
            .splits
            .into_pairs()
            .into_iter()
            .map(|(split, data)| predict(self.predictor, split, data))
            .collect::<Result<Vec<_>>>()?;

        if config.inverse_target {
            let path = layout.target_transform();
            log::info!("inverting target transform {}", path.display());
            let transform = self.store.load(&path)?;
            for stage in &mut stages {
                stage.predicted =
                    inverse_flat(transform.as_ref(), std::mem::take(&mut stage.predicted))
                        .with_context(|| format!("{}: inverting predictions", stage.split))?;
                stage.target = inverse_flat(transform.as_ref(), std::mem::take(&mut stage.target))
                    .with_context(|| format!("{}: inverting targets", stage.split))?;
            }
        }

        if config.inverse_features {
            let path = layout.feature_transform();
            log::info!("inverting feature transform {}", path.display());
            let transform = self.store.load(&path)?;
            for stage in &mut stages {
                let features = invert_features(transform.as_ref(), stage)?;
                stage.features = features;
            }
        }

        let tables = stages
            .iter()
            .map(|s| {
                let table = annotate(&s.features, s.split, &s.predicted, &s.target)?;
                attach_site_ids(&table, &s.ids, s.split, config.id_alignment)
            })
            .collect::<Result<Vec<_>>>()?;
        let combined = concat(&tables)?;
        log::debug!("combined {} rows from all splits", combined.num_rows());

        let attributes = load_attributes(&config.site_attributes)?;
        let attributes = drop_columns(&attributes, &config.dropped_attribute_columns)?;
        let mut merged = inner_join(&combined, &attributes, SITE_ID)?;
        if merged.num_rows() == 0 {
            log::warn!("no {SITE_ID} matched the site attributes, the report is empty");
        } else if merged.num_rows() < combined.num_rows() {
            log::warn!(
                "{} of {} rows had no matching site attributes",
                combined.num_rows() - merged.num_rows(),
                combined.num_rows()
            );
        }

        if config.si_units {
            merged = scale_columns(&merged, &[PREDICTED, TARGET], FEET_TO_METERS)?;
        }

        // Scored on the splits as predicted, before the join and unit conversion.
        let accuracy = stages
            .iter()
            .map(|s| {
                Ok(SplitAccuracy {
                    split: s.split,
                    r_squared: r_squared(s.split, &s.target, &s.predicted)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        println!(
            "{}",
            stats_banner(&config.run_name, &config.best_model, &config.out_feature)
        );
        for acc in &accuracy {
            println!("{}", acc.line());
        }

        let output = layout.output();
        write_parquet(&output, &merged)?;
        println!("{SAVED_BANNER}");
        log::info!("wrote {} rows to {}", merged.num_rows(), output.display());

        Ok(Report {
            merged,
            accuracy,
            output,
        })
    }
}

fn predict(predictor: &dyn Predictor, split: Split, data: SplitData) -> Result<Stage> {
    let rows = data.len();
    let predicted = predictor
        .predict(&data.features)
        .with_context(|| format!("{split}: predicting"))?;
    if predicted.len() != rows {
        return Err(ReportError::PredictionLength {
            split,
            expected: rows,
            got: predicted.len(),
        }
        .into());
    }
    if data.targets.len() != rows {
        bail!("{split}: {} targets for {rows} rows", data.targets.len());
    }
    log::debug!("{split}: {rows} predictions");

    Ok(Stage {
        split,
        features: data.features,
        ids: data.ids,
        predicted,
        target: data.targets,
    })
}

fn invert_features(transform: &dyn InverseTransform, stage: &Stage) -> Result<RecordBatch> {
    let names: Vec<String> = stage
        .features
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let rows = stage.features.num_rows();

    let columns = numeric_columns(&stage.features)
        .with_context(|| format!("{}: reading features", stage.split))?;
    let restored = transform
        .inverse_transform(columns)
        .with_context(|| format!("{}: inverting features", stage.split))?;

    if restored.len() != names.len() {
        return Err(ReportError::TransformShape {
            split: stage.split,
            expected: names.len(),
            got: restored.len(),
        }
        .into());
    }
    if let Some(bad) = restored.iter().find(|c| c.len() != rows) {
        bail!(
            "{}: inverse transform returned a column of {} rows, expected {rows}",
            stage.split,
            bad.len()
        );
    }
    from_numeric_columns(&names, restored, rows)
}
