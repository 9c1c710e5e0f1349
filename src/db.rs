//! SQLite persistence for the final invoice batch.
//!
//! One table, `facturas`, with the four columns that survive currency
//! normalization. The predecessor of this tool kept the currency column in
//! its DataFrame and sliced "the first four columns" away right before the
//! write — a positional assumption that silently corrupts data the moment
//! column order changes. Here every insert names its columns and binds
//! record fields explicitly; the currency column simply has no business
//! being persisted once every amount is COP.

use crate::config::WriteMode;
use crate::error::EtlError;
use crate::model::{InvoiceBatch, InvoiceRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

/// The persisted invoice table name.
pub const TABLE: &str = "facturas";

/// One row as stored in the `facturas` table; used by the CLI summary and
/// by tests to read the table back.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredInvoice {
    pub fecha_factura: String,
    pub proveedor: String,
    pub concepto: String,
    pub importe: Option<f64>,
}

/// Handle to the ledger database.
#[derive(Debug, Clone)]
pub struct InvoiceStore {
    pool: SqlitePool,
}

impl InvoiceStore {
    /// Open (or create) the SQLite database at `url`,
    /// e.g. `sqlite://facturas.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, EtlError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // A single connection is plenty: the pipeline writes once, at the end.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        debug!("Connected to {url}");
        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), EtlError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS facturas (
                fecha_factura TEXT NOT NULL,
                proveedor     TEXT NOT NULL,
                concepto      TEXT NOT NULL,
                importe       REAL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write the batch into `facturas`.
    ///
    /// `Replace` clears existing rows first (the schema stays in place);
    /// `Append` keeps them. Returns the number of rows inserted. The whole
    /// write is one transaction — either every record lands or none do.
    pub async fn write_batch(
        &self,
        batch: &InvoiceBatch,
        mode: WriteMode,
    ) -> Result<u64, EtlError> {
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await?;

        if mode == WriteMode::Replace {
            let cleared = sqlx::query("DELETE FROM facturas")
                .execute(&mut *tx)
                .await?
                .rows_affected();
            debug!("Replace mode: cleared {cleared} existing rows");
        }

        for record in batch.records() {
            insert_record(&mut tx, record).await?;
        }

        tx.commit().await?;
        info!("Wrote {} rows to '{TABLE}'", batch.len());
        Ok(batch.len() as u64)
    }

    /// Number of rows currently in `facturas`.
    pub async fn count(&self) -> Result<u64, EtlError> {
        self.ensure_schema().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM facturas")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Read the whole table back, in insertion order.
    pub async fn fetch_all(&self) -> Result<Vec<StoredInvoice>, EtlError> {
        self.ensure_schema().await?;
        let rows = sqlx::query_as::<_, StoredInvoice>(
            "SELECT fecha_factura, proveedor, concepto, importe FROM facturas",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn insert_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &InvoiceRecord,
) -> Result<(), EtlError> {
    sqlx::query(
        "INSERT INTO facturas (fecha_factura, proveedor, concepto, importe)
         VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&record.issue_date)
    .bind(&record.vendor)
    .bind(&record.concept)
    .bind(record.amount)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
