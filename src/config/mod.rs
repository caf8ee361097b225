use std::fmt;
use std::path::PathBuf;

use crate::errors::{Pg2ParquetError, Result};

pub mod templating;


pub const MODE_KEY: &str = "ENVIRONMENT";
pub const QUERY_FILE_KEY: &str = "SQL_QUERY_FILE";
pub const DEFAULT_QUERY_FILE: &str = "sql/artifacts.sql";

// ================== Mode ==================

/// Deployment mode. `production` writes to S3, `staging` to local disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Primary,
    Secondary,
}

impl Mode {
    pub fn from_setting(value: Option<&str>) -> Result<Self> {
        match value {
            Some("production") => Ok(Mode::Primary),
            Some("staging") => Ok(Mode::Secondary),
            Some(other) => Err(Pg2ParquetError::Config(format!(
                "Invalid environment: {other}"
            ))),
            None => Err(Pg2ParquetError::missing_var(MODE_KEY)),
        }
    }

    /// Value of `ENVIRONMENT` that selects this mode.
    pub fn environment(&self) -> &'static str {
        match self {
            Mode::Primary => "production",
            Mode::Secondary => "staging",
        }
    }

    fn keys(&self) -> &'static ModeKeys {
        match self {
            Mode::Primary => &PRIMARY_KEYS,
            Mode::Secondary => &SECONDARY_KEYS,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Primary => f.write_str("primary"),
            Mode::Secondary => f.write_str("secondary"),
        }
    }
}

// Order matters: the first missing key is the one reported.
struct ModeKeys {
    database: &'static str,
    user: &'static str,
    password: &'static str,
    host: &'static str,
    port: &'static str,
    file_name: &'static str,
    path: &'static str,
}

static PRIMARY_KEYS: ModeKeys = ModeKeys {
    database: "DB_NAME_PROD",
    user: "DB_USER",
    password: "DB_PASSWORD_PROD",
    host: "DB_HOST_PROD",
    port: "DB_PORT_PROD",
    file_name: "FILE_NAME",
    path: "S3_PATH",
};

static SECONDARY_KEYS: ModeKeys = ModeKeys {
    database: "DB_NAME_STAGING",
    user: "DB_USER",
    password: "DB_PASSWORD_STAGING",
    host: "DB_HOST_STAGING",
    port: "DB_PORT_STAGING",
    file_name: "FILE_NAME",
    path: "LOCAL_PATH",
};

// ================== Resolved values ==================

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub database: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Where the Parquet file goes. The variant is fixed by [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Local { path: PathBuf },
    S3 { bucket: String, key: String },
}

impl OutputTarget {
    /// `path` and `file_name` are concatenated as-is, so `path` carries its own
    /// trailing separator.
    pub fn for_mode(mode: Mode, path: &str, file_name: &str) -> Result<Self> {
        let location = format!("{path}{file_name}");
        match mode {
            Mode::Secondary => Ok(OutputTarget::Local {
                path: PathBuf::from(location),
            }),
            Mode::Primary => parse_s3_uri(&location),
        }
    }

    pub fn uri(&self) -> String {
        match self {
            OutputTarget::Local { path } => path.display().to_string(),
            OutputTarget::S3 { bucket, key } => format!("s3://{bucket}/{key}"),
        }
    }
}

/// Split `s3://bucket/key` verbatim. The key is never URL-decoded, so spaces,
/// `#` and `?` stay part of it.
fn parse_s3_uri(location: &str) -> Result<OutputTarget> {
    let invalid = |why: &str| Pg2ParquetError::Config(format!("Invalid S3 path {location}: {why}"));

    let rest = location
        .strip_prefix("s3://")
        .ok_or_else(|| invalid("expected s3:// scheme"))?;
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));

    if bucket.is_empty() {
        return Err(invalid("missing bucket"));
    }
    if key.is_empty() {
        return Err(invalid("missing object key"));
    }

    Ok(OutputTarget::S3 {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

/// The one place the process environment is read.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Everything one invocation needs, resolved once up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub mode: Mode,
    pub connection: ConnectionParams,
    pub output: OutputTarget,
    pub query_file: PathBuf,
}

impl Settings {
    /// Resolve from any key/value store. Performs no other reads.
    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = Mode::from_setting(lookup(MODE_KEY).as_deref())?;
        let keys = mode.keys();

        let required = |key: &str| lookup(key).ok_or_else(|| Pg2ParquetError::missing_var(key));

        let database = required(keys.database)?;
        let user = required(keys.user)?;
        let password = required(keys.password)?;
        let host = required(keys.host)?;
        let port_raw = required(keys.port)?;
        let file_name = required(keys.file_name)?;
        let path = required(keys.path)?;

        let port = port_raw.trim().parse::<u16>().map_err(|_| {
            Pg2ParquetError::Config(format!("Invalid port in {}: {port_raw}", keys.port))
        })?;

        let output = OutputTarget::for_mode(mode, &path, &file_name)?;
        let query_file = lookup(QUERY_FILE_KEY)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUERY_FILE.to_string())
            .into();

        Ok(Settings {
            mode,
            connection: ConnectionParams {
                database,
                user,
                password,
                host,
                port,
            },
            output,
            query_file,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::resolve(env_lookup)
    }

    pub fn with_query_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.query_file = path.into();
        self
    }
}
