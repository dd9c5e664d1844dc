//! Integration test: Parquet trial table -> fit records -> cross-key fits
//!
//! 1. Write a trial table split over several row groups
//! 2. Crunch every key into an in-memory store
//! 3. Run the standard cross-key analyses

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use vdw_crunch::analysis::{approximation_table, curve_named, run_analyses, standard_analyses, KEY_V};
use vdw_crunch::config::PipelineConfig;
use vdw_crunch::fit::SolverOptions;
use vdw_crunch::key::KeyDomain;
use vdw_crunch::meta::{MemoryMetaStore, MetaStore};
use vdw_crunch::pipeline::Pipeline;
use vdw_crunch::predicate::KeyFilter;
use vdw_crunch::report::{MemoryReporter, SilentReporter};
use vdw_crunch::trial::{write_trials_parquet, ParquetTrialSource, TrialRecord, TrialSource};

/// `V` for key `p` in the synthetic data set
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn synthetic_v(key: u64) -> u64 {
    40.0f64.mul_add((0.5 * (key as f64 + 3.0)).ln(), 10.0).round() as u64
}

/// Trials for keys 1..=31: total success from `V`, a ramp of partial
/// success over the four sizes below it, nothing before that.
fn synthetic_trials() -> Vec<TrialRecord> {
    let mut trials = Vec::new();
    for key in 1..=31 {
        let v = synthetic_v(key);
        for n in v.saturating_sub(6)..=v + 1 {
            let successes = match v - n.min(v) {
                0 => 1000,
                1 => 900,
                2 => 600,
                3 => 300,
                4 => 50,
                _ => 0,
            };
            trials.push(TrialRecord::new(key, n, 1000, successes).unwrap());
        }
    }
    trials
}

/// Trial table with signed columns and 3 row groups
fn create_signed_parquet<P: AsRef<Path>>(
    path: P,
    trials: &[TrialRecord],
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = Schema::new(
        ["key", "n", "attempts", "successes"]
            .iter()
            .map(|name| Field::new(*name, DataType::Int64, true))
            .collect::<Vec<_>>(),
    );
    let column = |f: fn(&TrialRecord) -> u64| -> ArrayRef {
        Arc::new(Int64Array::from_iter_values(
            trials.iter().map(|t| i64::try_from(f(t)).unwrap()),
        ))
    };
    let batch = RecordBatch::try_new(
        Arc::new(schema.clone()),
        vec![
            column(|t| t.key),
            column(|t| t.n),
            column(|t| t.attempts),
            column(|t| t.successes),
        ],
    )?;

    let file = File::create(path.as_ref())?;
    let props = WriterProperties::builder()
        .set_max_row_group_size(100)
        .build();
    let mut writer = ArrowWriter::try_new(file, Arc::new(schema), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[test]
fn test_parquet_source_reads_row_groups() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("trials.parquet");
    let trials = synthetic_trials();
    create_signed_parquet(&path, &trials).expect("Failed to create test Parquet file");

    let source = ParquetTrialSource::open(&path).expect("Failed to load Parquet file");
    assert_eq!(source.row_count(), trials.len());

    let keys = source.keys(&SilentReporter).unwrap();
    assert_eq!(keys, (1..=31).collect::<Vec<u64>>());

    let mut key_13 = source.trials(13, &SilentReporter).unwrap();
    key_13.sort_by_key(|t| t.n);
    let expected: Vec<TrialRecord> = trials.iter().filter(|t| t.key == 13).copied().collect();
    assert_eq!(key_13, expected);
}

#[test]
fn test_write_trials_parquet_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("written.parquet");
    let trials = vec![
        TrialRecord::new(13, 5, 100, 40).unwrap(),
        TrialRecord::new(13, 5, 50, 30).unwrap(),
        TrialRecord::new(7, 20, 10, 10).unwrap(),
    ];
    write_trials_parquet(&path, &trials).unwrap();

    let source = ParquetTrialSource::open(&path).unwrap();
    assert_eq!(source.keys(&SilentReporter).unwrap(), vec![7, 13]);
    assert_eq!(source.trials(13, &SilentReporter).unwrap().len(), 2);
}

#[test]
fn test_duplicate_rows_are_pooled() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("dupes.parquet");
    write_trials_parquet(
        &path,
        &[
            TrialRecord::new(13, 5, 100, 40).unwrap(),
            TrialRecord::new(13, 5, 100, 60).unwrap(),
            TrialRecord::new(13, 8, 100, 100).unwrap(),
        ],
    )
    .unwrap();

    let pipeline = Pipeline::new(
        ParquetTrialSource::open(&path).unwrap(),
        MemoryMetaStore::new(),
        PipelineConfig::default(),
    )
    .with_reporter(SilentReporter);
    let record = pipeline.compute_for_key(13).unwrap();

    assert_eq!(record.sample_count(), 1);
    assert_eq!(record.first_total_success(), Some(8));
}

#[test]
fn test_parquet_to_cross_key_analyses() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("trials.parquet");
    create_signed_parquet(&path, &synthetic_trials()).unwrap();

    let pipeline = Pipeline::new(
        ParquetTrialSource::open(&path).unwrap(),
        MemoryMetaStore::new(),
        PipelineConfig::default(),
    )
    .with_reporter(SilentReporter);
    let summary = pipeline.run(&KeyFilter::all()).unwrap();
    assert!(summary.is_clean(), "{:?}", summary.failed);
    assert_eq!(summary.written, (1..=31).collect::<Vec<u64>>());
    assert!(summary.unfitted.is_empty());

    for &key in &summary.written {
        let v = synthetic_v(key);
        let record = pipeline.store().get(key).unwrap().unwrap();
        assert_eq!(record.first_total_success(), Some(v));
        assert_eq!(record.sample_count(), 4);

        // Four points, four parameters: the curve passes through the ramp
        let curve = record.curve().unwrap();
        for (below, rate) in [(4, 0.05), (3, 0.3), (2, 0.6), (1, 0.9)] {
            #[allow(clippy::cast_precision_loss)]
            let fitted = curve.eval((v - below) as f64);
            assert!((fitted - rate).abs() < 1e-4, "key {key}: {fitted} vs {rate}");
        }
    }

    let dataset = pipeline.load_dataset().unwrap();
    let reporter = MemoryReporter::new();
    let reports = run_analyses(
        &dataset,
        &standard_analyses(),
        &SolverOptions {
            max_evaluations: 50_000,
            ..SolverOptions::default()
        },
        &reporter,
    );
    assert_eq!(reports.len(), 6);

    let key_v = reports.iter().find(|r| r.name == KEY_V).unwrap();
    let fit = key_v.fit.as_ref().expect("key-V fit");
    assert_eq!(fit.outcome.points, summary.written.len());
    assert!(fit.outcome.r_squared.unwrap() > 0.999);

    let table = approximation_table(KeyDomain::Pattern, None, curve_named(&reports, KEY_V));
    // Key 7 is inside the data: the fit should land near its V.
    #[allow(clippy::cast_precision_loss)]
    let v7 = synthetic_v(7) as f64;
    let predicted = table[0].composition.unwrap();
    assert!((predicted - v7).abs() < 2.0, "{predicted} vs {v7}");
}
