// Postgres rows -> Arrow record batches.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use datafusion::arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder, Float32Builder,
    Float64Builder, Int16Builder, Int32Builder, Int64Builder, StringBuilder,
    Time64MicrosecondBuilder, TimestampMicrosecondBuilder,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use sqlx::postgres::{PgColumn, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Row, TypeInfo};

use crate::dataset::Dataset;
use crate::errors::{Pg2ParquetError, Result};

pub const DEFAULT_BATCH_ROWS: usize = 8192;

// 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const MAX_DECIMAL128_PRECISION: u8 = 38;
// rust_decimal keeps at most 28 fractional digits
const MAX_DECIMAL_SCALE: u8 = 28;

//=============== Type Mapping ================================================//

/// How a Postgres column is decoded, and which Arrow type it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Citext,
    Uuid,
    Json,
    /// `Some((precision, scale))` when declared, else stored as exact text.
    Numeric(Option<(u8, i8)>),
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Bytea,
    /// User-defined enum, decoded from its text label.
    Enum,
}

impl PgKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let kind = match upper.as_str() {
            "BOOL" | "BOOLEAN" => PgKind::Bool,
            "INT2" | "SMALLINT" | "SMALLSERIAL" => PgKind::Int2,
            "INT4" | "INT" | "INTEGER" | "SERIAL" => PgKind::Int4,
            "INT8" | "BIGINT" | "BIGSERIAL" => PgKind::Int8,
            "FLOAT4" | "REAL" => PgKind::Float4,
            "FLOAT8" | "DOUBLE PRECISION" => PgKind::Float8,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => PgKind::Text,
            "CITEXT" => PgKind::Citext,
            "UUID" => PgKind::Uuid,
            "JSON" | "JSONB" => PgKind::Json,
            "DATE" => PgKind::Date,
            "TIME" => PgKind::Time,
            "TIMESTAMP" => PgKind::Timestamp,
            "TIMESTAMPTZ" => PgKind::TimestampTz,
            "BYTEA" => PgKind::Bytea,
            _ => return parse_numeric(&upper),
        };
        Some(kind)
    }

    pub fn from_type_info(info: &PgTypeInfo) -> Option<Self> {
        if let Some(kind) = Self::from_type_name(info.name()) {
            return Some(kind);
        }
        match info.kind() {
            PgTypeKind::Enum(_) => Some(PgKind::Enum),
            _ => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            PgKind::Bool => DataType::Boolean,
            PgKind::Int2 => DataType::Int16,
            PgKind::Int4 => DataType::Int32,
            PgKind::Int8 => DataType::Int64,
            PgKind::Float4 => DataType::Float32,
            PgKind::Float8 => DataType::Float64,
            PgKind::Text
            | PgKind::Citext
            | PgKind::Uuid
            | PgKind::Json
            | PgKind::Enum
            | PgKind::Numeric(None) => DataType::Utf8,
            PgKind::Numeric(Some((p, s))) => DataType::Decimal128(*p, *s),
            PgKind::Date => DataType::Date32,
            PgKind::Time => DataType::Time64(TimeUnit::Microsecond),
            PgKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            PgKind::TimestampTz => {
                DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC")))
            }
            PgKind::Bytea => DataType::Binary,
        }
    }

    /// Read column `idx` of `row` as this kind.
    pub fn decode(&self, row: &PgRow, idx: usize) -> std::result::Result<Cell, sqlx::Error> {
        let cell = match self {
            PgKind::Bool => or_null(row.try_get::<Option<bool>, _>(idx)?, Cell::Bool),
            PgKind::Int2 => or_null(row.try_get::<Option<i16>, _>(idx)?, Cell::Int16),
            PgKind::Int4 => or_null(row.try_get::<Option<i32>, _>(idx)?, Cell::Int32),
            PgKind::Int8 => or_null(row.try_get::<Option<i64>, _>(idx)?, Cell::Int64),
            PgKind::Float4 => or_null(row.try_get::<Option<f32>, _>(idx)?, Cell::Float32),
            PgKind::Float8 => or_null(row.try_get::<Option<f64>, _>(idx)?, Cell::Float64),
            PgKind::Text => or_null(row.try_get::<Option<String>, _>(idx)?, Cell::Text),
            // citext and enum labels travel as plain text
            PgKind::Citext | PgKind::Enum => {
                or_null(row.try_get_unchecked::<Option<String>, _>(idx)?, Cell::Text)
            }
            PgKind::Uuid => or_null(row.try_get::<Option<Uuid>, _>(idx)?, Cell::Uuid),
            PgKind::Json => {
                or_null(row.try_get::<Option<serde_json::Value>, _>(idx)?, Cell::Json)
            }
            PgKind::Numeric(_) => or_null(row.try_get::<Option<Decimal>, _>(idx)?, Cell::Numeric),
            PgKind::Date => or_null(row.try_get::<Option<NaiveDate>, _>(idx)?, Cell::Date),
            PgKind::Time => or_null(row.try_get::<Option<NaiveTime>, _>(idx)?, Cell::Time),
            PgKind::Timestamp => {
                or_null(row.try_get::<Option<NaiveDateTime>, _>(idx)?, Cell::Timestamp)
            }
            PgKind::TimestampTz => {
                or_null(row.try_get::<Option<DateTime<Utc>>, _>(idx)?, Cell::TimestampTz)
            }
            PgKind::Bytea => or_null(row.try_get::<Option<Vec<u8>>, _>(idx)?, Cell::Bytes),
        };
        Ok(cell)
    }
}

/// `NUMERIC`, `NUMERIC(p)`, `NUMERIC(p, s)` and the `DECIMAL` spellings.
/// Parameters Decimal128 cannot hold fall back to text.
fn parse_numeric(upper: &str) -> Option<PgKind> {
    let rest = upper
        .strip_prefix("NUMERIC")
        .or_else(|| upper.strip_prefix("DECIMAL"))?
        .trim();
    if rest.is_empty() {
        return Some(PgKind::Numeric(None));
    }

    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    let (precision, scale) = match inner.split_once(',') {
        Some((p, s)) => (p.trim().parse::<u8>().ok()?, s.trim().parse::<u8>().ok()?),
        None => (inner.trim().parse::<u8>().ok()?, 0),
    };

    let fits = (1..=MAX_DECIMAL128_PRECISION).contains(&precision)
        && scale <= precision
        && scale <= MAX_DECIMAL_SCALE;
    if !fits {
        return Some(PgKind::Numeric(None));
    }
    Some(PgKind::Numeric(Some((precision, scale as i8))))
}

fn or_null<T>(value: Option<T>, wrap: impl FnOnce(T) -> Cell) -> Cell {
    value.map_or(Cell::Null, wrap)
}

fn date_to_days(d: NaiveDate) -> i32 {
    d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn time_to_micros(t: NaiveTime) -> i64 {
    t.num_seconds_from_midnight() as i64 * 1_000_000 + (t.nanosecond() / 1_000) as i64
}

/// Unscaled value of `d` at `scale`, if it fits in `precision` digits.
fn decimal_mantissa(mut d: Decimal, precision: u8, scale: i8) -> Option<i128> {
    d.rescale(scale as u32);
    if d.scale() != scale as u32 {
        return None;
    }
    let m = d.mantissa();
    (m.unsigned_abs() < 10u128.pow(precision as u32)).then_some(m)
}

//=============== Decoded Values ==============================================//

/// One decoded Postgres value, before it is appended to a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Uuid(Uuid),
    Json(serde_json::Value),
    Numeric(Decimal),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Bytes(Vec<u8>),
}

//=============== Column Builders =============================================//

enum Builder {
    Bool(BooleanBuilder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Utf8(StringBuilder),
    Decimal(Decimal128Builder, u8, i8),
    Date32(Date32Builder),
    Time64(Time64MicrosecondBuilder),
    Timestamp(TimestampMicrosecondBuilder),
    Binary(BinaryBuilder),
}

impl Builder {
    fn append_null(&mut self) {
        match self {
            Builder::Bool(b) => b.append_null(),
            Builder::Int16(b) => b.append_null(),
            Builder::Int32(b) => b.append_null(),
            Builder::Int64(b) => b.append_null(),
            Builder::Float32(b) => b.append_null(),
            Builder::Float64(b) => b.append_null(),
            Builder::Utf8(b) => b.append_null(),
            Builder::Decimal(b, ..) => b.append_null(),
            Builder::Date32(b) => b.append_null(),
            Builder::Time64(b) => b.append_null(),
            Builder::Timestamp(b) => b.append_null(),
            Builder::Binary(b) => b.append_null(),
        }
    }
}

struct ColumnBuilder {
    name: String,
    kind: PgKind,
    builder: Builder,
}

impl ColumnBuilder {
    fn new(name: String, kind: PgKind) -> Result<Self> {
        let builder = match kind {
            PgKind::Bool => Builder::Bool(BooleanBuilder::new()),
            PgKind::Int2 => Builder::Int16(Int16Builder::new()),
            PgKind::Int4 => Builder::Int32(Int32Builder::new()),
            PgKind::Int8 => Builder::Int64(Int64Builder::new()),
            PgKind::Float4 => Builder::Float32(Float32Builder::new()),
            PgKind::Float8 => Builder::Float64(Float64Builder::new()),
            PgKind::Text
            | PgKind::Citext
            | PgKind::Uuid
            | PgKind::Json
            | PgKind::Enum
            | PgKind::Numeric(None) => Builder::Utf8(StringBuilder::new()),
            PgKind::Numeric(Some((p, s))) => {
                Builder::Decimal(Decimal128Builder::new().with_precision_and_scale(p, s)?, p, s)
            }
            PgKind::Date => Builder::Date32(Date32Builder::new()),
            PgKind::Time => Builder::Time64(Time64MicrosecondBuilder::new()),
            PgKind::Timestamp => Builder::Timestamp(TimestampMicrosecondBuilder::new()),
            PgKind::TimestampTz => {
                Builder::Timestamp(TimestampMicrosecondBuilder::new().with_timezone("UTC"))
            }
            PgKind::Bytea => Builder::Binary(BinaryBuilder::new()),
        };
        Ok(Self {
            name,
            kind,
            builder,
        })
    }

    fn append(&mut self, cell: Cell) -> Result<()> {
        match (&mut self.builder, cell) {
            (b, Cell::Null) => b.append_null(),
            (Builder::Bool(b), Cell::Bool(v)) => b.append_value(v),
            (Builder::Int16(b), Cell::Int16(v)) => b.append_value(v),
            (Builder::Int32(b), Cell::Int32(v)) => b.append_value(v),
            (Builder::Int64(b), Cell::Int64(v)) => b.append_value(v),
            (Builder::Float32(b), Cell::Float32(v)) => b.append_value(v),
            (Builder::Float64(b), Cell::Float64(v)) => b.append_value(v),
            (Builder::Utf8(b), Cell::Text(v)) => b.append_value(v),
            (Builder::Utf8(b), Cell::Uuid(v)) => b.append_value(v.to_string()),
            (Builder::Utf8(b), Cell::Json(v)) => b.append_value(v.to_string()),
            (Builder::Utf8(b), Cell::Numeric(v)) => b.append_value(v.to_string()),
            (Builder::Decimal(b, p, s), Cell::Numeric(v)) => {
                let m = decimal_mantissa(v, *p, *s).ok_or_else(|| {
                    Pg2ParquetError::Query(format!(
                        "value {v} in column '{}' does not fit NUMERIC({p},{s})",
                        self.name
                    ))
                })?;
                b.append_value(m);
            }
            (Builder::Date32(b), Cell::Date(v)) => b.append_value(date_to_days(v)),
            (Builder::Time64(b), Cell::Time(v)) => b.append_value(time_to_micros(v)),
            (Builder::Timestamp(b), Cell::Timestamp(v)) => {
                b.append_value(v.and_utc().timestamp_micros())
            }
            (Builder::Timestamp(b), Cell::TimestampTz(v)) => b.append_value(v.timestamp_micros()),
            (Builder::Binary(b), Cell::Bytes(v)) => b.append_value(v),
            (_, other) => {
                return Err(Pg2ParquetError::Query(format!(
                    "column '{}' of kind {:?} cannot hold {other:?}",
                    self.name, self.kind
                )))
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> ArrayRef {
        match &mut self.builder {
            Builder::Bool(b) => Arc::new(b.finish()),
            Builder::Int16(b) => Arc::new(b.finish()),
            Builder::Int32(b) => Arc::new(b.finish()),
            Builder::Int64(b) => Arc::new(b.finish()),
            Builder::Float32(b) => Arc::new(b.finish()),
            Builder::Float64(b) => Arc::new(b.finish()),
            Builder::Utf8(b) => Arc::new(b.finish()),
            Builder::Decimal(b, ..) => Arc::new(b.finish()),
            Builder::Date32(b) => Arc::new(b.finish()),
            Builder::Time64(b) => Arc::new(b.finish()),
            Builder::Timestamp(b) => Arc::new(b.finish()),
            Builder::Binary(b) => Arc::new(b.finish()),
        }
    }
}

//=============== Batch Builder ===============================================//

/// Accumulates rows into typed columns, cutting a `RecordBatch` every
/// `batch_rows` rows.
pub struct BatchBuilder {
    schema: SchemaRef,
    columns: Vec<ColumnBuilder>,
    pending: usize,
    batch_rows: usize,
    batches: Vec<RecordBatch>,
}

impl BatchBuilder {
    pub fn new(columns: Vec<(String, PgKind)>) -> Result<Self> {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, kind)| Field::new(name, kind.data_type(), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));
        let columns = columns
            .into_iter()
            .map(|(name, kind)| ColumnBuilder::new(name, kind))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema,
            columns,
            pending: 0,
            batch_rows: DEFAULT_BATCH_ROWS,
            batches: Vec::new(),
        })
    }

    /// Map prepared-statement columns; unsupported types fail up front.
    pub fn for_columns(columns: &[PgColumn]) -> Result<Self> {
        let mapped = columns
            .iter()
            .map(|c| {
                let kind = PgKind::from_type_info(c.type_info()).ok_or_else(|| {
                    Pg2ParquetError::Query(format!(
                        "unsupported column type {} for column '{}'; cast it in the query",
                        c.type_info().name(),
                        c.name()
                    ))
                })?;
                Ok((c.name().to_string(), kind))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(mapped)
    }

    pub fn with_batch_rows(mut self, rows: usize) -> Self {
        self.batch_rows = rows.max(1);
        self
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn push(&mut self, row: &PgRow) -> Result<()> {
        let cells = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                col.kind.decode(row, idx).map_err(|e| {
                    Pg2ParquetError::Query(format!("decode column '{}': {e}", col.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.push_cells(cells)
    }

    /// Append one row of already decoded values, in column order.
    pub fn push_cells(&mut self, cells: Vec<Cell>) -> Result<()> {
        if cells.len() != self.columns.len() {
            return Err(Pg2ParquetError::Query(format!(
                "row has {} values, expected {}",
                cells.len(),
                self.columns.len()
            )));
        }
        for (col, cell) in self.columns.iter_mut().zip(cells) {
            col.append(cell)?;
        }
        self.pending += 1;
        if self.pending >= self.batch_rows {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let arrays: Vec<ArrayRef> = self.columns.iter_mut().map(|c| c.finish()).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        self.batches.push(batch);
        self.pending = 0;
        Ok(())
    }

    pub fn finish(mut self) -> Result<Dataset> {
        self.flush()?;
        Dataset::try_new(self.schema, self.batches)
    }
}
