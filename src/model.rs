//! Capabilities the report consumes: a fitted predictor and fitted
//! inverse transforms.

use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::data::table::numeric_columns;
use crate::error::ReportError;

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// A fitted regression model.
pub trait Predictor {
    /// One prediction per row of `features`, in row order.
    fn predict(&self, features: &RecordBatch) -> Result<Vec<f64>>;
}

/// `intercept + Σ coefficient · column`, columns looked up by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPredictor {
    pub intercept: f64,
    pub coefficients: Vec<(String, f64)>,
}

impl Predictor for LinearPredictor {
    fn predict(&self, features: &RecordBatch) -> Result<Vec<f64>> {
        let mut out = vec![self.intercept; features.num_rows()];
        for (name, coef) in &self.coefficients {
            let idx = features
                .schema()
                .index_of(name)
                .map_err(|_| ReportError::MissingColumn(name.clone()))?;
            let column = numeric_columns(&features.project(&[idx])?)?.remove(0);
            for (acc, v) in out.iter_mut().zip(column) {
                *acc += coef * v;
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Inverse transforms
// ---------------------------------------------------------------------------

/// Maps transformed values back to their original scale.
///
/// Values are column-major: `columns[j][i]` is row `i` of column `j`. The
/// result must have the same shape.
pub trait InverseTransform {
    fn inverse_transform(&self, columns: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>>;
}

/// Serialized form of the transforms fitted at training time.
///
/// Parameters hold one entry per column, or a single entry applied to every
/// column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedTransform {
    Identity,
    /// `x' = (x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `x' = x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
    /// `x' = ln(1 + x)`
    Log1p,
}

fn param(values: &[f64], column: usize, columns: usize) -> Result<f64> {
    match values.len() {
        1 => Ok(values[0]),
        n if n == columns => Ok(values[column]),
        n => Err(ReportError::TransformParameters {
            params: n,
            columns,
        }
        .into()),
    }
}

impl FittedTransform {
    /// Forward direction, as applied when the model was trained.
    pub fn transform(&self, columns: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>> {
        self.map_columns(columns, |t, v, j, n| {
            Ok(match t {
                FittedTransform::Identity => v,
                FittedTransform::Standard { mean, scale } => {
                    (v - param(mean, j, n)?) / param(scale, j, n)?
                }
                FittedTransform::MinMax { min, scale } => v * param(scale, j, n)? + param(min, j, n)?,
                FittedTransform::Log1p => v.ln_1p(),
            })
        })
    }

    fn map_columns<F>(&self, columns: Vec<Vec<f64>>, f: F) -> Result<Vec<Vec<f64>>>
    where
        F: Fn(&FittedTransform, f64, usize, usize) -> Result<f64>,
    {
        let n = columns.len();
        columns
            .into_iter()
            .enumerate()
            .map(|(j, column)| column.into_iter().map(|v| f(self, v, j, n)).collect())
            .collect()
    }
}

impl InverseTransform for FittedTransform {
    fn inverse_transform(&self, columns: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>> {
        self.map_columns(columns, |t, v, j, n| {
            Ok(match t {
                FittedTransform::Identity => v,
                FittedTransform::Standard { mean, scale } => {
                    v * param(scale, j, n)? + param(mean, j, n)?
                }
                FittedTransform::MinMax { min, scale } => {
                    (v - param(min, j, n)?) / param(scale, j, n)?
                }
                FittedTransform::Log1p => v.exp_m1(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Source of persisted transforms.
pub trait TransformStore {
    fn load(&self, path: &Path) -> Result<Box<dyn InverseTransform>>;
}

/// Reads a JSON-encoded [`FittedTransform`] from the given path.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransformStore;

impl TransformStore for JsonTransformStore {
    fn load(&self, path: &Path) -> Result<Box<dyn InverseTransform>> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening transform {}", path.display()))?;
        let transform: FittedTransform = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("decoding transform {}", path.display()))?;
        log::debug!("loaded {transform:?} from {}", path.display());
        Ok(Box::new(transform))
    }
}

/// Invert a single column and hand back one value per row.
pub fn inverse_flat(transform: &dyn InverseTransform, values: Vec<f64>) -> Result<Vec<f64>> {
    let rows = values.len();
    let mut columns = transform.inverse_transform(vec![values])?;
    if columns.len() != 1 || columns[0].len() != rows {
        bail!(
            "inverse transform of one column with {rows} rows returned {} columns",
            columns.len()
        );
    }
    Ok(columns.remove(0))
}
