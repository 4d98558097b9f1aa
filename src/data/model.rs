use std::fmt;

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CellValue – a single cell of a loosely typed table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell, used while inferring column types of
/// attribute files and when rendering join keys.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Render the value as a join key. Nulls never match anything.
    pub fn key(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            // 42.0 and 42 identify the same site
            CellValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(format!("{v:.0}")),
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Split – which partition a row came from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Eval,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Eval, Split::Test];

    /// Label written into the `split` column.
    pub fn label(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Eval => "eval",
            Split::Test => "test",
        }
    }

    /// Heading used on the accuracy lines.
    pub fn heading(self) -> &'static str {
        match self {
            Split::Train => "Training",
            Split::Eval => "Validation",
            Split::Test => "Testing",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// SplitData – everything the report needs for one split
// ---------------------------------------------------------------------------

/// Features, ground truth and identifiers of one split.
///
/// `ids` is aligned with `features` by row position and must carry a
/// `siteID` column.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub features: RecordBatch,
    pub targets: Vec<f64>,
    pub ids: RecordBatch,
}

impl SplitData {
    pub fn new(features: RecordBatch, targets: Vec<f64>, ids: RecordBatch) -> Self {
        Self {
            features,
            targets,
            ids,
        }
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.features.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.num_rows() == 0
    }
}
