use std::sync::Arc;

use datafusion::arrow::array::{
    Array, Date32Array, Int32Array, StringArray, TimestampMicrosecondArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use pg2parquet::config::OutputTarget;
use pg2parquet::dataset::Dataset;
use pg2parquet::writer::{write_dataset, DefaultSinks};

use crate::support::sample_dataset;

fn multi_batch_dataset() -> Dataset {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, true),
        Field::new("user_label_dob", DataType::Date32, true),
        Field::new(
            "taken_at",
            DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC"))),
            true,
        ),
        Field::new("location_name", DataType::Utf8, true),
    ]));

    let batch = |ids: Vec<i32>| {
        let n = ids.len();
        RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(ids.clone())),
                Arc::new(Date32Array::from(vec![Some(19783); n])),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![Some(1_700_000_000_000_000); n])
                        .with_timezone("UTC"),
                ),
                Arc::new(StringArray::from(
                    ids.iter().map(|i| format!("site-{i}")).collect::<Vec<_>>(),
                )),
            ],
        )
        .unwrap()
    };

    Dataset::try_new(
        schema.clone(),
        vec![batch(vec![1, 2, 3]), batch(vec![4, 5]), batch(vec![6])],
    )
    .unwrap()
}

async fn read_back(path: &std::path::Path) -> Vec<RecordBatch> {
    let ctx = SessionContext::new();
    ctx.read_parquet(path.to_str().unwrap(), ParquetReadOptions::default())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_local_roundtrip_preserves_columns_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artifacts.parquet");
    let target = OutputTarget::Local { path: path.clone() };
    let ds = multi_batch_dataset();

    write_dataset(&ds, &target, &DefaultSinks).await.unwrap();

    let batches = read_back(&path).await;
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 6);

    let schema = batches[0].schema();
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, ds.column_names());
    assert_eq!(
        schema.field_with_name("taken_at").unwrap().data_type(),
        &DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC")))
    );
}

#[tokio::test]
async fn test_roundtrip_keeps_row_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ordered.parquet");
    let target = OutputTarget::Local { path: path.clone() };

    write_dataset(&multi_batch_dataset(), &target, &DefaultSinks)
        .await
        .unwrap();

    let ids: Vec<i32> = read_back(&path)
        .await
        .iter()
        .flat_map(|b| {
            let col = b
                .column(0)
                .as_any()
                .downcast_ref::<Int32Array>()
                .unwrap()
                .clone();
            (0..col.len()).map(move |i| col.value(i)).collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_second_write_replaces_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replace.parquet");
    let target = OutputTarget::Local { path: path.clone() };

    write_dataset(&multi_batch_dataset(), &target, &DefaultSinks)
        .await
        .unwrap();
    write_dataset(&sample_dataset(), &target, &DefaultSinks)
        .await
        .unwrap();

    let batches = read_back(&path).await;
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 3);
    assert_eq!(batches[0].num_columns(), 5);
}

#[tokio::test]
async fn test_empty_result_still_writes_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.parquet");
    let target = OutputTarget::Local { path: path.clone() };
    let ds = Dataset::empty(sample_dataset().schema());

    write_dataset(&ds, &target, &DefaultSinks).await.unwrap();

    let ctx = SessionContext::new();
    let df = ctx
        .read_parquet(path.to_str().unwrap(), ParquetReadOptions::default())
        .await
        .unwrap();
    assert_eq!(df.schema().fields().len(), 5);
    assert_eq!(df.count().await.unwrap(), 0);
}
