// Runs only when DATABASE_URL points at a reachable Postgres.

use datafusion::arrow::array::{Array, Int64Array, StringArray, TimestampMicrosecondArray};
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use pg2parquet::config::ConnectionParams;
use pg2parquet::db::{Connector, PgConnector, Session};
use url::Url;

fn params_from_env() -> Option<ConnectionParams> {
    let url = Url::parse(&std::env::var("DATABASE_URL").ok()?).ok()?;
    Some(ConnectionParams {
        database: url.path().trim_start_matches('/').to_string(),
        user: url.username().to_string(),
        password: url.password().unwrap_or_default().to_string(),
        host: url.host_str()?.to_string(),
        port: url.port().unwrap_or(5432),
    })
}

const DECODE_SQL: &str = "
    SELECT
        g::int8                                               AS id,
        '00000000-0000-0000-0000-000000000001'::uuid          AS artifact_id,
        '{\"a\": 1}'::jsonb                                   AS metadata,
        '2024-03-01 12:00:00+02'::timestamptz                 AS taken_at,
        (-1.28345 * g)::numeric                               AS location_latitude,
        CASE WHEN g = 2 THEN NULL ELSE 'track' END::text      AS name
    FROM generate_series(1, 3) AS g
    ORDER BY g";

#[tokio::test]
async fn test_live_query_decodes_each_kind() {
    let Some(params) = params_from_env() else {
        return;
    };
    let mut session = PgConnector::new().connect(&params).await.unwrap();
    let ds = session.query(DECODE_SQL).await.unwrap();
    session.close().await.unwrap();

    assert_eq!(ds.num_rows(), 3);
    assert_eq!(
        ds.column_names(),
        vec!["id", "artifact_id", "metadata", "taken_at", "location_latitude", "name"]
    );
    let schema = ds.schema();
    assert_eq!(schema.field(4).data_type(), &DataType::Utf8);
    assert_eq!(
        schema.field(3).data_type(),
        &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
    );

    let batch = &ds.batches()[0];
    let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!(ids.values().to_vec(), vec![1, 2, 3]);

    let text = |idx: usize| {
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .clone()
    };
    assert_eq!(text(1).value(0), "00000000-0000-0000-0000-000000000001");
    assert_eq!(text(2).value(0), r#"{"a":1}"#);
    assert_eq!(text(4).value(0), "-1.28345");
    assert!(text(5).is_null(1));

    let taken = batch
        .column(3)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    // 2024-03-01 10:00:00 UTC
    assert_eq!(taken.value(0), 1_709_287_200_000_000);
}

#[tokio::test]
async fn test_live_array_column_is_rejected() {
    let Some(params) = params_from_env() else {
        return;
    };
    let mut session = PgConnector::new().connect(&params).await.unwrap();
    let err = session
        .query("SELECT ARRAY[1, 2] AS tags")
        .await
        .unwrap_err();
    session.close().await.unwrap();
    assert!(err.to_string().contains("'tags'"), "{err}");
}
