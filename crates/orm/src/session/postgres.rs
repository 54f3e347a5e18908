//! PostgreSQL sessions over a sqlx pool.
//!
//! Each session lazily opens one transaction on first use; commit and
//! rollback end it and the next statement opens a new one.

use super::Session;
use crate::entity::Record;
use crate::error::{ModelError, ModelResult};
use crate::query::{upsert_sql, Query};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct PgSession {
    id: Uuid,
    pool: PgPool,
    transaction: Mutex<Option<Transaction<'static, Postgres>>>,
    closed: AtomicBool,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self {
            id: Uuid::new_v4(),
            pool,
            transaction: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    async fn fetch_all(&self, sql: &str, params: Vec<Value>) -> ModelResult<Vec<PgRow>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ModelError::Session(format!("session {} is closed", self.id)));
        }

        let mut guard = self.transaction.lock().await;
        if guard.is_none() {
            *guard = Some(self.pool.begin().await?);
        }
        let tx = guard
            .as_mut()
            .ok_or_else(|| ModelError::Session("transaction was not started".to_string()))?;

        tracing::debug!(session = %self.id, sql, "executing statement");
        let query = params
            .into_iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value));
        Ok(query.fetch_all(&mut **tx).await?)
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> ModelResult<u64> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ModelError::Session(format!("session {} is closed", self.id)));
        }

        let mut guard = self.transaction.lock().await;
        if guard.is_none() {
            *guard = Some(self.pool.begin().await?);
        }
        let tx = guard
            .as_mut()
            .ok_or_else(|| ModelError::Session("transaction was not started".to_string()))?;

        tracing::debug!(session = %self.id, sql, "executing statement");
        let query = params
            .into_iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value));
        Ok(query.execute(&mut **tx).await?.rows_affected())
    }
}

/// Bind a JSON value to a sqlx query
fn bind_value(
    query: sqlx::query::Query<'_, Postgres, PgArguments>,
    value: Value,
) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s),
        other => query.bind(sqlx::types::Json(other)),
    }
}

/// Convert a PostgreSQL row into a record
fn row_to_record(row: &PgRow) -> ModelResult<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = column_value(row, index, column.type_info().name())?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn column_value(row: &PgRow, index: usize, type_name: &str) -> ModelResult<Value> {
    fn get<'r, T>(row: &'r PgRow, index: usize) -> ModelResult<Option<T>>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        row.try_get::<Option<T>, _>(index)
            .map_err(|e| ModelError::Database(format!("failed to decode column {}: {}", index, e)))
    }

    let value = match type_name {
        "BOOL" => get::<bool>(row, index)?.map(Value::from),
        "INT2" => get::<i16>(row, index)?.map(Value::from),
        "INT4" => get::<i32>(row, index)?.map(Value::from),
        "INT8" => get::<i64>(row, index)?.map(Value::from),
        "FLOAT4" => get::<f32>(row, index)?.map(Value::from),
        "FLOAT8" => get::<f64>(row, index)?.map(Value::from),
        "UUID" => get::<Uuid>(row, index)?.map(|u| Value::from(u.to_string())),
        "TIMESTAMPTZ" => get::<chrono::DateTime<chrono::Utc>>(row, index)?
            .map(|dt| Value::from(dt.to_rfc3339())),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, index)?
            .map(|dt| Value::from(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, index)?.map(|d| Value::from(d.to_string())),
        "TIME" => get::<chrono::NaiveTime>(row, index)?.map(|t| Value::from(t.to_string())),
        "JSON" | "JSONB" => get::<sqlx::types::Json<Value>>(row, index)?.map(|j| j.0),
        _ => get::<String>(row, index)?.map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}

#[async_trait]
impl Session for PgSession {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn add(&self, table: &str, key_columns: &[&str], record: Record) -> ModelResult<Record> {
        let (sql, params) = upsert_sql(table, key_columns, &record);
        let rows = self.fetch_all(&sql, params).await?;
        let row = rows
            .first()
            .ok_or_else(|| ModelError::Database(format!("upsert into {} returned no row", table)))?;
        row_to_record(row)
    }

    async fn select(&self, query: &Query) -> ModelResult<Vec<Record>> {
        let (sql, params) = query.to_sql_with_params();
        let rows = self.fetch_all(&sql, params).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self, query: &Query) -> ModelResult<u64> {
        let (sql, params) = query.to_count_sql_with_params();
        let rows = self.fetch_all(&sql, params).await?;
        let count: i64 = rows
            .first()
            .map(|row| row.try_get(0usize))
            .transpose()?
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    async fn delete(&self, query: &Query) -> ModelResult<u64> {
        let (sql, params) = query.to_delete_sql_with_params();
        self.execute(&sql, params).await
    }

    async fn commit(&self) -> ModelResult<()> {
        if let Some(tx) = self.transaction.lock().await.take() {
            tx.commit()
                .await
                .map_err(|e| ModelError::Session(format!("transaction commit failed: {}", e)))?;
        }
        Ok(())
    }

    async fn rollback(&self) -> ModelResult<()> {
        if let Some(tx) = self.transaction.lock().await.take() {
            tx.rollback()
                .await
                .map_err(|e| ModelError::Session(format!("transaction rollback failed: {}", e)))?;
        }
        Ok(())
    }

    async fn close(&self) -> ModelResult<()> {
        self.rollback().await?;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
