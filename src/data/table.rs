use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray, Float64Array, StringArray, UInt32Array};
use arrow::compute::{cast, concat_batches, take};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, Schema,
    UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::array_value_to_string;

use super::model::{CellValue, Split};
use crate::config::IdAlignment;
use crate::error::ReportError;

pub const SPLIT: &str = "split";
pub const PREDICTED: &str = "predicted";
pub const TARGET: &str = "target";
pub const SITE_ID: &str = "siteID";

// ---------------------------------------------------------------------------
// Numeric views
// ---------------------------------------------------------------------------

/// Every column of `batch` as `f64` values, column-major. Nulls become NaN.
pub fn numeric_columns(batch: &RecordBatch) -> Result<Vec<Vec<f64>>> {
    batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, col)| {
            let data_type = col.data_type();
            if !(data_type.is_numeric() || *data_type == DataType::Boolean) {
                bail!("column '{}' is {data_type:?}, expected numbers", field.name());
            }
            let values = cast(col, &DataType::Float64)
                .with_context(|| format!("casting column '{}' to Float64", field.name()))?;
            Ok(values
                .as_primitive::<Float64Type>()
                .iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect())
        })
        .collect()
}

/// Rebuild a Float64 table of `rows` rows from column-major values.
pub fn from_numeric_columns(
    names: &[String],
    columns: Vec<Vec<f64>>,
    rows: usize,
) -> Result<RecordBatch> {
    if names.len() != columns.len() {
        bail!("{} column names for {} columns", names.len(), columns.len());
    }
    let fields: Vec<Field> = names
        .iter()
        .map(|n| Field::new(n, DataType::Float64, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|c| Arc::new(Float64Array::from(c)) as ArrayRef)
        .collect();
    RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(rows)),
    )
    .context("assembling numeric table")
}

// ---------------------------------------------------------------------------
// Column surgery
// ---------------------------------------------------------------------------

/// Append `array` as a new nullable column named `name`.
pub fn append_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields.push(Field::new(name, array.data_type().clone(), true));
    let mut columns = batch.columns().to_vec();
    columns.push(array);
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .with_context(|| format!("appending column '{name}'"))
}

/// Swap the contents of an existing column, keeping its position.
pub fn replace_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> Result<RecordBatch> {
    let schema = batch.schema();
    let idx = schema
        .index_of(name)
        .map_err(|_| ReportError::MissingColumn(name.to_string()))?;
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[idx] = Field::new(name, array.data_type().clone(), true);
    let mut columns = batch.columns().to_vec();
    columns[idx] = array;
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .with_context(|| format!("replacing column '{name}'"))
}

/// Replace the column if it exists, append it otherwise.
pub fn set_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> Result<RecordBatch> {
    if batch.schema().index_of(name).is_ok() {
        replace_column(batch, name, array)
    } else {
        append_column(batch, name, array)
    }
}

/// Drop the named columns if present.
pub fn drop_columns(batch: &RecordBatch, names: &[String]) -> Result<RecordBatch> {
    let keep: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !names.iter().any(|n| n == f.name()))
        .map(|(i, _)| i)
        .collect();
    batch.project(&keep).context("dropping columns")
}

/// Multiply the named columns by `factor`. Columns become Float64.
pub fn scale_columns(batch: &RecordBatch, names: &[&str], factor: f64) -> Result<RecordBatch> {
    let mut out = batch.clone();
    for name in names {
        let col = out
            .column_by_name(name)
            .ok_or_else(|| ReportError::MissingColumn(name.to_string()))?;
        let values = cast(col, &DataType::Float64)
            .with_context(|| format!("casting column '{name}' to Float64"))?;
        let scaled: Float64Array = values
            .as_primitive::<Float64Type>()
            .unary(|v| v * factor);
        out = replace_column(&out, name, Arc::new(scaled))?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Split annotation
// ---------------------------------------------------------------------------

/// Add the `split`, `predicted` and `target` columns to a feature table.
/// Feature columns that already carry one of these names are overwritten.
pub fn annotate(
    features: &RecordBatch,
    split: Split,
    predicted: &[f64],
    target: &[f64],
) -> Result<RecordBatch> {
    let rows = features.num_rows();
    let labels: StringArray = std::iter::repeat(Some(split.label())).take(rows).collect();
    let out = set_column(features, SPLIT, Arc::new(labels))?;
    let out = set_column(&out, PREDICTED, Arc::new(Float64Array::from(predicted.to_vec())))?;
    set_column(&out, TARGET, Arc::new(Float64Array::from(target.to_vec())))
}

/// Attach the `siteID` column of `ids` to `batch` by row position.
///
/// The two tables are assumed to list observations in the same order. When
/// the row counts differ, `IdAlignment::Positional` pads missing ids with
/// nulls and ignores surplus ids; `IdAlignment::Strict` refuses.
pub fn attach_site_ids(
    batch: &RecordBatch,
    ids: &RecordBatch,
    split: Split,
    alignment: IdAlignment,
) -> Result<RecordBatch> {
    let site_ids = ids
        .column_by_name(SITE_ID)
        .ok_or_else(|| ReportError::MissingColumn(SITE_ID.to_string()))?;
    let rows = batch.num_rows();

    let site_ids = if site_ids.len() == rows {
        site_ids.clone()
    } else {
        match alignment {
            IdAlignment::Strict => {
                return Err(ReportError::MisalignedIds {
                    split,
                    features: rows,
                    ids: site_ids.len(),
                }
                .into())
            }
            IdAlignment::Positional => {
                log::warn!(
                    "{split}: {rows} feature rows but {} site ids, attaching by position",
                    site_ids.len()
                );
                let available = site_ids.len();
                let indices: UInt32Array = (0..rows)
                    .map(|i| (i < available).then_some(i as u32))
                    .collect();
                take(site_ids.as_ref(), &indices, None).context("aligning site ids")?
            }
        }
    };

    append_column(batch, SITE_ID, site_ids)
}

/// Row-wise concatenation of tables sharing one schema.
pub fn concat(batches: &[RecordBatch]) -> Result<RecordBatch> {
    let Some(first) = batches.first() else {
        bail!("nothing to concatenate");
    };
    concat_batches(&first.schema(), batches).context("concatenating split tables")
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Read one cell of an Arrow column.
pub fn cell_at(col: &ArrayRef, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int8 => CellValue::Integer(col.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => CellValue::Integer(col.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => CellValue::Integer(col.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => CellValue::Integer(col.as_primitive::<UInt16Type>().value(row) as i64),
        DataType::UInt32 => CellValue::Integer(col.as_primitive::<UInt32Type>().value(row) as i64),
        DataType::UInt64 => match i64::try_from(col.as_primitive::<UInt64Type>().value(row)) {
            Ok(v) => CellValue::Integer(v),
            Err(_) => CellValue::String(col.as_primitive::<UInt64Type>().value(row).to_string()),
        },
        DataType::Float32 => CellValue::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => CellValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        _ => match array_value_to_string(col, row) {
            Ok(s) => CellValue::String(s),
            Err(_) => CellValue::Null,
        },
    }
}

fn join_keys(batch: &RecordBatch, key: &str) -> Result<Vec<Option<String>>> {
    let col = batch
        .column_by_name(key)
        .ok_or_else(|| ReportError::MissingColumn(key.to_string()))?;
    Ok((0..col.len()).map(|row| cell_at(col, row).key()).collect())
}

/// Inner join of `left` and `right` on `key`.
///
/// Keys match on their rendered text, so an integer id in one table meets
/// the same id stored as a string in the other. Null keys never match,
/// not even each other (pandas `merge` would pair NaN keys); a row without
/// a site id has no site attributes to carry.
/// Output rows follow `left` order; a left row matching several right rows
/// appears once per match. The key column appears once, at its left
/// position. Other clashing names get `_x` (left) and `_y` (right) suffixes.
pub fn inner_join(left: &RecordBatch, right: &RecordBatch, key: &str) -> Result<RecordBatch> {
    let left_keys = join_keys(left, key)?;
    let right_keys = join_keys(right, key)?;

    let mut index: HashMap<String, Vec<u32>> = HashMap::new();
    for (row, k) in right_keys.into_iter().enumerate() {
        if let Some(k) = k {
            index.entry(k).or_default().push(row as u32);
        }
    }

    let mut left_rows = Vec::new();
    let mut right_rows = Vec::new();
    for (row, k) in left_keys.iter().enumerate() {
        let Some(matches) = k.as_ref().and_then(|k| index.get(k)) else {
            continue;
        };
        for &m in matches {
            left_rows.push(row as u32);
            right_rows.push(m);
        }
    }
    let rows = left_rows.len();
    let left_rows = UInt32Array::from(left_rows);
    let right_rows = UInt32Array::from(right_rows);

    let left_schema = left.schema();
    let right_schema = right.schema();
    let left_names: HashSet<&str> = left_schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|n| *n != key)
        .collect();
    let right_names: HashSet<&str> = right_schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|n| *n != key)
        .collect();

    let mut fields = Vec::new();
    let mut columns = Vec::new();

    for (field, col) in left_schema.fields().iter().zip(left.columns()) {
        let name = if right_names.contains(field.name().as_str()) {
            format!("{}_x", field.name())
        } else {
            field.name().clone()
        };
        let taken = take(col.as_ref(), &left_rows, None)
            .with_context(|| format!("gathering column '{}'", field.name()))?;
        fields.push(Field::new(name, taken.data_type().clone(), true));
        columns.push(taken);
    }

    for (field, col) in right_schema.fields().iter().zip(right.columns()) {
        if field.name() == key {
            continue;
        }
        let name = if left_names.contains(field.name().as_str()) {
            format!("{}_y", field.name())
        } else {
            field.name().clone()
        };
        let taken = take(col.as_ref(), &right_rows, None)
            .with_context(|| format!("gathering column '{}'", field.name()))?;
        fields.push(Field::new(name, taken.data_type().clone(), true));
        columns.push(taken);
    }

    RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(rows)),
    )
    .context("assembling joined table")
}

#[cfg(test)]
mod tests {
    use arrow::array::Int64Array;

    use super::*;

    fn table(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        RecordBatch::try_from_iter(columns).unwrap()
    }

    fn strings(values: &[Option<&str>]) -> ArrayRef {
        Arc::new(values.iter().copied().collect::<StringArray>())
    }

    fn floats(values: &[f64]) -> ArrayRef {
        Arc::new(Float64Array::from(values.to_vec()))
    }

    #[test]
    fn inner_join_keeps_left_order_and_drops_unmatched() {
        let left = table(vec![
            ("siteID", strings(&[Some("b"), Some("x"), Some("a"), None])),
            ("v", floats(&[1.0, 2.0, 3.0, 4.0])),
        ]);
        let right = table(vec![
            ("siteID", strings(&[Some("a"), Some("b")])),
            ("area", floats(&[10.0, 20.0])),
        ]);

        let joined = inner_join(&left, &right, SITE_ID).unwrap();
        assert_eq!(joined.num_rows(), 2);
        let names: Vec<_> = joined.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, ["siteID", "v", "area"]);

        let area = joined.column(2).as_primitive::<Float64Type>();
        assert_eq!(area.values().to_vec(), vec![20.0, 10.0]);
        let v = joined.column(1).as_primitive::<Float64Type>();
        assert_eq!(v.values().to_vec(), vec![1.0, 3.0]);
    }

    #[test]
    fn inner_join_matches_integer_and_string_keys() {
        let left = table(vec![("siteID", strings(&[Some("7"), Some("8")]))]);
        let right = table(vec![
            ("siteID", Arc::new(Int64Array::from(vec![8, 9])) as ArrayRef),
            ("area", floats(&[1.5, 2.5])),
        ]);
        let joined = inner_join(&left, &right, SITE_ID).unwrap();
        assert_eq!(joined.num_rows(), 1);
        assert_eq!(joined.column(0).as_string::<i32>().value(0), "8");
    }

    #[test]
    fn inner_join_suffixes_clashing_columns_and_repeats_multi_matches() {
        let left = table(vec![
            ("siteID", strings(&[Some("a")])),
            ("slope", floats(&[0.1])),
        ]);
        let right = table(vec![
            ("siteID", strings(&[Some("a"), Some("a")])),
            ("slope", floats(&[0.2, 0.3])),
        ]);
        let joined = inner_join(&left, &right, SITE_ID).unwrap();
        assert_eq!(joined.num_rows(), 2);
        assert!(joined.column_by_name("slope_x").is_some());
        assert!(joined.column_by_name("slope_y").is_some());
    }

    #[test]
    fn inner_join_without_matches_is_empty_but_keeps_columns() {
        let left = table(vec![("siteID", strings(&[Some("a")])), ("v", floats(&[1.0]))]);
        let right = table(vec![("siteID", strings(&[Some("z")])), ("w", floats(&[2.0]))]);
        let joined = inner_join(&left, &right, SITE_ID).unwrap();
        assert_eq!(joined.num_rows(), 0);
        assert_eq!(joined.num_columns(), 3);
    }

    #[test]
    fn inner_join_never_pairs_null_keys() {
        let left = table(vec![("siteID", strings(&[None, Some("a")]))]);
        let right = table(vec![
            ("siteID", strings(&[None])),
            ("area", floats(&[1.0])),
        ]);
        let joined = inner_join(&left, &right, SITE_ID).unwrap();
        assert_eq!(joined.num_rows(), 0);
    }

    #[test]
    fn inner_join_keeps_large_float_keys_apart() {
        let left = table(vec![("siteID", floats(&[1e19]))]);
        let right = table(vec![("siteID", floats(&[5e19])), ("area", floats(&[1.0]))]);
        assert_eq!(inner_join(&left, &right, SITE_ID).unwrap().num_rows(), 0);

        let right = table(vec![("siteID", floats(&[1e19])), ("area", floats(&[1.0]))]);
        assert_eq!(inner_join(&left, &right, SITE_ID).unwrap().num_rows(), 1);
    }

    #[test]
    fn positional_ids_pad_with_nulls() {
        let features = table(vec![("x", floats(&[1.0, 2.0, 3.0]))]);
        let ids = table(vec![("siteID", strings(&[Some("a"), Some("b")]))]);

        let out = attach_site_ids(&features, &ids, Split::Train, IdAlignment::Positional).unwrap();
        let site = out.column_by_name(SITE_ID).unwrap();
        assert_eq!(site.len(), 3);
        assert_eq!(site.as_string::<i32>().value(1), "b");
        assert!(site.is_null(2));
    }

    #[test]
    fn strict_ids_reject_length_mismatch() {
        let features = table(vec![("x", floats(&[1.0, 2.0, 3.0]))]);
        let ids = table(vec![("siteID", strings(&[Some("a")]))]);

        let err = attach_site_ids(&features, &ids, Split::Eval, IdAlignment::Strict).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReportError>(),
            Some(&ReportError::MisalignedIds {
                split: Split::Eval,
                features: 3,
                ids: 1
            })
        );
    }

    #[test]
    fn annotate_appends_three_columns() {
        let features = table(vec![("x", floats(&[1.0, 2.0]))]);
        let out = annotate(&features, Split::Test, &[0.5, 0.6], &[0.4, 0.7]).unwrap();
        assert_eq!(out.num_columns(), 4);
        let split = out.column_by_name(SPLIT).unwrap().as_string::<i32>();
        assert_eq!(split.value(0), "test");
        assert_eq!(split.value(1), "test");
    }

    #[test]
    fn scale_and_drop_columns() {
        let batch = table(vec![
            ("lat", floats(&[40.0])),
            ("predicted", floats(&[10.0])),
            ("target", floats(&[20.0])),
        ]);
        let dropped = drop_columns(&batch, &["lat".to_string(), "long".to_string()]).unwrap();
        assert_eq!(dropped.num_columns(), 2);

        let scaled = scale_columns(&dropped, &[PREDICTED, TARGET], 0.5).unwrap();
        let predicted = scaled.column_by_name(PREDICTED).unwrap().as_primitive::<Float64Type>();
        assert_eq!(predicted.value(0), 5.0);
    }

    #[test]
    fn numeric_columns_reject_text() {
        let batch = table(vec![("name", strings(&[Some("a")]))]);
        assert!(numeric_columns(&batch).is_err());
    }
}
