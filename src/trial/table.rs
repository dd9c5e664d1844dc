//! Columnar trial table (Parquet)
//!
//! Expected columns: `key`, `n`, `attempts`, `successes`. Any integer
//! type is accepted; values are widened to `i64` on load.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, RecordBatch, UInt64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::{TrialRecord, TrialSource};
use crate::report::{Event, Reporter};
use crate::{Error, Result};

const COLUMNS: [&str; 4] = ["key", "n", "attempts", "successes"];

/// One table row before validation.
#[derive(Debug, Clone, Copy)]
struct Row {
    index: usize,
    values: [Option<i64>; 4],
}

impl Row {
    const fn key(&self) -> Option<i64> {
        self.values[0]
    }

    fn location(&self) -> String {
        format!("row {}", self.index)
    }

    fn validate(&self) -> std::result::Result<TrialRecord, String> {
        let mut counts = [0u64; 4];
        for (slot, (value, name)) in counts.iter_mut().zip(self.values.into_iter().zip(COLUMNS)) {
            let value = value.ok_or_else(|| format!("{name} is null"))?;
            *slot = u64::try_from(value).map_err(|_| format!("{name} is negative ({value})"))?;
        }
        let [key, n, attempts, successes] = counts;
        TrialRecord::new(key, n, attempts, successes).map_err(|e| e.to_string())
    }
}

/// Trial records loaded from a Parquet file.
#[derive(Debug, Clone)]
pub struct ParquetTrialSource {
    rows: Vec<Row>,
}

impl ParquetTrialSource {
    /// Load every row of a trial table into memory.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or a required
    /// column is missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::StorageError(format!(
                "Failed to open trial table {}: {e}",
                path.as_ref().display()
            ))
        })?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut rows = Vec::new();
        for batch in reader {
            Self::append_rows(&mut rows, &batch?)?;
        }

        Ok(Self { rows })
    }

    /// Build a source from already-loaded batches.
    ///
    /// # Errors
    ///
    /// Returns error if a required column is missing or not an integer.
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let mut rows = Vec::new();
        for batch in batches {
            Self::append_rows(&mut rows, batch)?;
        }
        Ok(Self { rows })
    }

    /// Total rows loaded, valid or not.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn append_rows(rows: &mut Vec<Row>, batch: &RecordBatch) -> Result<()> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(COLUMNS.len());
        for name in COLUMNS {
            let column = batch.column_by_name(name).ok_or_else(|| {
                Error::StorageError(format!("Trial table is missing column '{name}'"))
            })?;
            columns.push(cast(column, &DataType::Int64)?);
        }

        let arrays = columns
            .iter()
            .map(|c| {
                c.as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or_else(|| Error::Other("Failed to downcast to Int64Array".to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let offset = rows.len();
        for i in 0..batch.num_rows() {
            let mut values = [None; 4];
            for (value, array) in values.iter_mut().zip(&arrays) {
                *value = array.is_valid(i).then(|| array.value(i));
            }
            rows.push(Row {
                index: offset + i,
                values,
            });
        }
        Ok(())
    }
}

impl TrialSource for ParquetTrialSource {
    fn keys(&self, reporter: &dyn Reporter) -> Result<Vec<u64>> {
        let mut keys = Vec::new();
        for row in &self.rows {
            match row.key().map(u64::try_from) {
                Some(Ok(key)) => keys.push(key),
                _ => reporter.report(&Event::MalformedTrial {
                    location: &row.location(),
                    reason: "key is null or negative",
                }),
            }
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    fn trials(&self, key: u64, reporter: &dyn Reporter) -> Result<Vec<TrialRecord>> {
        let wanted = i64::try_from(key)
            .map_err(|_| Error::InvalidInput(format!("key {key} exceeds the table's integer range")))?;

        let mut trials = Vec::new();
        for row in self.rows.iter().filter(|r| r.key() == Some(wanted)) {
            match row.validate() {
                Ok(record) => trials.push(record),
                Err(reason) => reporter.report(&Event::MalformedTrial {
                    location: &row.location(),
                    reason: &reason,
                }),
            }
        }
        Ok(trials)
    }
}

/// Write trial records as a Parquet table in the layout
/// [`ParquetTrialSource`] reads.
///
/// # Errors
///
/// Returns error if the file cannot be created or written.
pub fn write_trials_parquet<P: AsRef<Path>>(path: P, trials: &[TrialRecord]) -> Result<()> {
    let schema = Arc::new(Schema::new(
        COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::UInt64, false))
            .collect::<Vec<_>>(),
    ));

    let column = |f: fn(&TrialRecord) -> u64| -> ArrayRef {
        Arc::new(UInt64Array::from_iter_values(trials.iter().map(f)))
    };
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            column(|t| t.key),
            column(|t| t.n),
            column(|t| t.attempts),
            column(|t| t.successes),
        ],
    )?;

    let file = File::create(path.as_ref())?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{MemoryReporter, SilentReporter};
    use arrow::array::Int32Array;

    fn signed_batch(rows: &[[Option<i32>; 4]]) -> RecordBatch {
        let schema = Schema::new(
            COLUMNS
                .iter()
                .map(|name| Field::new(*name, DataType::Int32, true))
                .collect::<Vec<_>>(),
        );
        let columns: Vec<ArrayRef> = (0..4)
            .map(|c| {
                Arc::new(Int32Array::from(rows.iter().map(|r| r[c]).collect::<Vec<_>>())) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(Arc::new(schema), columns).unwrap()
    }

    #[test]
    fn test_from_batches_widens_integers() {
        let batch = signed_batch(&[
            [Some(13), Some(5), Some(100), Some(40)],
            [Some(13), Some(6), Some(100), Some(70)],
            [Some(7), Some(5), Some(100), Some(3)],
        ]);
        let source = ParquetTrialSource::from_batches(&[batch]).unwrap();

        assert_eq!(source.row_count(), 3);
        assert_eq!(source.keys(&SilentReporter).unwrap(), vec![7, 13]);
        assert_eq!(source.trials(13, &SilentReporter).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_rows_reported() {
        let batch = signed_batch(&[
            [Some(13), Some(5), Some(100), Some(40)],
            [Some(13), None, Some(100), Some(70)],
            [Some(13), Some(7), Some(-1), Some(0)],
            [Some(13), Some(8), Some(10), Some(11)],
            [None, Some(8), Some(10), Some(1)],
        ]);
        let source = ParquetTrialSource::from_batches(&[batch]).unwrap();
        let reporter = MemoryReporter::new();

        assert_eq!(source.keys(&reporter).unwrap(), vec![13]);
        assert_eq!(reporter.warning_count(), 1);

        let trials = source.trials(13, &reporter).unwrap();
        assert_eq!(trials.len(), 1);
        assert_eq!(reporter.warning_count(), 4);
    }

    #[test]
    fn test_missing_column_is_storage_error() {
        let schema = Schema::new(vec![Field::new("key", DataType::Int32, false)]);
        let batch =
            RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int32Array::from(vec![1]))])
                .unwrap();

        let err = ParquetTrialSource::from_batches(&[batch]).unwrap_err();
        assert!(err.to_string().contains("missing column 'n'"));
    }
}
