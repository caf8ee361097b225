use std::path::Path;

use pg2parquet::config::{Mode, OutputTarget, Settings};
use pg2parquet::errors::ErrorKind;

use crate::support::env_for;

#[test]
fn test_each_mode_uses_only_its_own_credentials() {
    let env = env_for("staging", Path::new("/data/out"), Path::new("q.sql"));
    let staging = Settings::resolve(|k| env.get(k).cloned()).unwrap();

    let env = env_for("production", Path::new("/data/out"), Path::new("q.sql"));
    let production = Settings::resolve(|k| env.get(k).cloned()).unwrap();

    assert_eq!(staging.mode, Mode::Secondary);
    assert_eq!(production.mode, Mode::Primary);

    let s = &staging.connection;
    assert_eq!(
        (s.database.as_str(), s.password.as_str(), s.host.as_str(), s.port),
        ("staging_db", "test_staging_password", "test_staging_host", 9876)
    );
    let p = &production.connection;
    assert_eq!(
        (p.database.as_str(), p.password.as_str(), p.host.as_str(), p.port),
        ("production_db", "test_prod_password", "test_prod_host", 1234)
    );
}

#[test]
fn test_output_backend_follows_mode() {
    let env = env_for("staging", Path::new("/data/out"), Path::new("q.sql"));
    let staging = Settings::resolve(|k| env.get(k).cloned()).unwrap();
    assert!(matches!(staging.output, OutputTarget::Local { .. }));
    assert_eq!(staging.output.uri(), "/data/out/test.parquet");

    let env = env_for("production", Path::new("/data/out"), Path::new("q.sql"));
    let production = Settings::resolve(|k| env.get(k).cloned()).unwrap();
    assert_eq!(
        production.output,
        OutputTarget::S3 {
            bucket: "bucket".into(),
            key: "exports/test.parquet".into()
        }
    );
}

#[test]
fn test_unrecognized_mode_is_named() {
    for bad in ["dev", "Production", ""] {
        let env = env_for(bad, Path::new("/tmp"), Path::new("q.sql"));
        let err = Settings::resolve(|k| env.get(k).cloned()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), format!("Invalid environment: {bad}"));
    }
}

#[test]
fn test_empty_store_reports_mode_key() {
    let err = Settings::resolve(|_| None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Missing required environment variable: 'ENVIRONMENT'"
    );
}
