//! Raw partition publication
//!
//! Each normalized table becomes a single Parquet object at its period's raw
//! key. Publishing a period again replaces the whole object, so a partition
//! only ever holds one source file's rows. The file is written to a staging
//! file in row groups of [`ROW_GROUP_ROWS`] and uploaded from disk.

use anyhow::{anyhow, Context};
use arrow::array::{Array, ArrayRef, Date32Array, StringArray};
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use terc_common::layout;
use terc_common::storage::ObjectStore;
use terc_common::ReportingPeriod;
use tracing::{info, instrument};

use crate::error::{IngestError, Result};
use crate::normalize::{NormalizedRow, NormalizedTable, REFERENCE_DATE_COLUMN, SOURCE_COLUMNS};

/// A partition written to the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedPartition {
    pub period: ReportingPeriod,
    pub key: String,
    pub rows: usize,
    pub size: u64,
    pub checksum: String,
}

/// Arrow schema of a raw partition: every source column as nullable text,
/// then the nullable reference date
pub fn partition_schema() -> SchemaRef {
    let mut fields: Vec<Field> = SOURCE_COLUMNS
        .iter()
        .map(|name| Field::new(*name, DataType::Utf8, true))
        .collect();
    fields.push(Field::new(REFERENCE_DATE_COLUMN, DataType::Date32, true));
    Arc::new(Schema::new(fields))
}

/// Rows per record batch and per Parquet row group
pub const ROW_GROUP_ROWS: usize = 65_536;

fn record_batch(schema: &SchemaRef, rows: &[NormalizedRow]) -> anyhow::Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(SOURCE_COLUMNS.len() + 1);

    for idx in 0..SOURCE_COLUMNS.len() {
        let values: StringArray = rows
            .iter()
            .map(|row| row.values.get(idx).and_then(|v| v.as_deref()))
            .collect();
        columns.push(Arc::new(values));
    }
    let dates: Date32Array = rows
        .iter()
        .map(|row| row.mes_referencia.map(Date32Type::from_naive_date))
        .collect();
    columns.push(Arc::new(dates));

    RecordBatch::try_new(schema.clone(), columns).context("build record batch")
}

/// Write rows as Parquet into `sink`, one row group per `batch_rows` rows.
/// Only one batch of Arrow arrays is built at a time.
pub fn write_parquet<W: Write + Send>(
    rows: &[NormalizedRow],
    sink: W,
    batch_rows: usize,
) -> anyhow::Result<W> {
    let schema = partition_schema();
    let batch_rows = batch_rows.max(1);
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(batch_rows)
        .build();

    let mut writer =
        ArrowWriter::try_new(sink, schema.clone(), Some(props)).context("create parquet writer")?;
    for chunk in rows.chunks(batch_rows) {
        writer
            .write(&record_batch(&schema, chunk)?)
            .context("write parquet batch")?;
    }
    writer.into_inner().context("finish parquet file")
}

/// Encode rows as a Parquet file in memory
pub fn encode_parquet(rows: &[NormalizedRow]) -> anyhow::Result<Vec<u8>> {
    write_parquet(rows, Vec::new(), ROW_GROUP_ROWS)
}

/// Write rows to a Parquet staging file under `dir`, or the system temp dir.
/// The file is removed when the returned handle is dropped.
pub fn stage_parquet(rows: &[NormalizedRow], dir: Option<&Path>) -> anyhow::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("terc-partition-").suffix(".parquet");
    let staged = match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create staging dir {}", dir.display()))?;
            builder.tempfile_in(dir)
        },
        None => builder.tempfile(),
    }
    .context("create parquet staging file")?;

    write_parquet(rows, staged.as_file(), ROW_GROUP_ROWS)?;
    Ok(staged)
}

/// Decode a raw partition back into rows
pub fn decode_parquet(data: Vec<u8>) -> anyhow::Result<Vec<NormalizedRow>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(data))
        .context("open parquet data")?
        .build()
        .context("build parquet reader")?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.context("read parquet batch")?;
        if batch.num_columns() != SOURCE_COLUMNS.len() + 1 {
            return Err(anyhow!(
                "partition has {} columns, expected {}",
                batch.num_columns(),
                SOURCE_COLUMNS.len() + 1
            ));
        }

        let text_columns = (0..SOURCE_COLUMNS.len())
            .map(|idx| {
                batch
                    .column(idx)
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| anyhow!("column {} is not text", SOURCE_COLUMNS[idx]))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let dates = batch
            .column(SOURCE_COLUMNS.len())
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| anyhow!("column {} is not a date", REFERENCE_DATE_COLUMN))?;

        for row in 0..batch.num_rows() {
            let values = text_columns
                .iter()
                .map(|col| (!col.is_null(row)).then(|| col.value(row).to_string()))
                .collect();
            let mes_referencia = if dates.is_null(row) {
                None
            } else {
                dates.value_as_date(row)
            };
            rows.push(NormalizedRow {
                values,
                mes_referencia,
            });
        }
    }
    Ok(rows)
}

#[derive(Clone)]
pub struct PartitionPublisher {
    store: Arc<dyn ObjectStore>,
    staging_dir: Option<PathBuf>,
}

impl PartitionPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            staging_dir: None,
        }
    }

    /// Stage Parquet files under `dir` instead of the system temp dir
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Write `table` as the raw partition of its period, replacing any
    /// previous partition for that period
    #[instrument(skip(self, table), fields(period = %table.period, rows = table.len()))]
    pub async fn publish(&self, table: NormalizedTable) -> Result<PublishedPartition> {
        let period = table.period;
        let rows = table.len();
        let key = layout::raw_partition_key(&period);

        let staging_dir = self.staging_dir.clone();
        let staged =
            tokio::task::spawn_blocking(move || stage_parquet(&table.rows, staging_dir.as_deref()))
                .await
                .map_err(|e| IngestError::publish(period, e))?
                .map_err(|e| IngestError::publish(period, e))?;

        let upload = self
            .store
            .put_file(&key, staged.path())
            .await
            .map_err(|e| IngestError::publish(period, e))?;

        info!(
            size = upload.size,
            "Period {} loaded into {}",
            period,
            self.store.describe(&key)
        );

        Ok(PublishedPartition {
            period,
            key,
            rows,
            size: upload.size,
            checksum: upload.checksum,
        })
    }

    /// Read back the raw partition of `period`
    pub async fn read_partition(&self, period: ReportingPeriod) -> Result<NormalizedTable> {
        let key = layout::raw_partition_key(&period);
        let data = self
            .store
            .get(&key)
            .await
            .map_err(|e| IngestError::publish(period, e))?;

        let rows = tokio::task::spawn_blocking(move || decode_parquet(data))
            .await
            .map_err(|e| IngestError::publish(period, e))?
            .map_err(|e| IngestError::publish(period, e))?;

        Ok(NormalizedTable { period, rows })
    }
}
