use thiserror::Error;

use crate::data::model::Split;

/// Failures specific to report building.
///
/// I/O and format failures travel as plain `anyhow` errors with context;
/// these variants are raised through `anyhow` as well, so callers can
/// `downcast_ref::<ReportError>()` when they need to tell them apart.
#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("{split}: predictor returned {got} values for {expected} rows")]
    PredictionLength {
        split: Split,
        expected: usize,
        got: usize,
    },

    #[error("{split}: feature table has {features} rows but identifier table has {ids}")]
    MisalignedIds {
        split: Split,
        features: usize,
        ids: usize,
    },

    #[error("{split}: inverse transform returned {got} columns, expected {expected}")]
    TransformShape {
        split: Split,
        expected: usize,
        got: usize,
    },

    #[error("transform has {params} parameters, cannot apply to {columns} columns")]
    TransformParameters { params: usize, columns: usize },

    #[error("{split}: regression undefined ({reason})")]
    DegenerateRegression { split: Split, reason: String },

    #[error("table is missing column '{0}'")]
    MissingColumn(String),
}
