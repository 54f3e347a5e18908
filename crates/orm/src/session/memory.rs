//! In-memory record store and sessions over it.

use super::Session;
use crate::entity::Record;
use crate::error::{ModelError, ModelResult};
use crate::query::{compare_values, OrderDirection, Query};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use uuid::Uuid;

type Tables = HashMap<String, Vec<Record>>;

/// Committed state shared by every session opened on it.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session on this database.
    pub fn session(&self) -> MemorySession {
        MemorySession::new(self.clone())
    }

    /// Committed rows of a table.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    /// Seed committed rows directly.
    pub fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = Record>) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Session with copy-on-write staging: the first write to a table copies its
/// committed rows, commit publishes the copies and rollback drops them.
pub struct MemorySession {
    id: Uuid,
    database: MemoryDatabase,
    staged: Mutex<Tables>,
    closed: AtomicBool,
}

impl MemorySession {
    pub fn new(database: MemoryDatabase) -> Self {
        Self {
            id: Uuid::new_v4(),
            database,
            staged: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether the session has uncommitted writes.
    pub fn has_pending_changes(&self) -> bool {
        !self.staged.lock().is_empty()
    }

    fn ensure_open(&self) -> ModelResult<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(ModelError::Session(format!("session {} is closed", self.id)));
        }
        Ok(())
    }

    fn visible_rows(&self, table: &str) -> Vec<Record> {
        if let Some(rows) = self.staged.lock().get(table) {
            return rows.clone();
        }
        self.database.rows(table)
    }

    fn with_staged<T>(&self, table: &str, f: impl FnOnce(&mut Vec<Record>) -> T) -> T {
        let mut staged = self.staged.lock();
        let rows = staged
            .entry(table.to_string())
            .or_insert_with(|| self.database.rows(table));
        f(rows)
    }

    fn filtered(&self, query: &Query) -> ModelResult<Vec<Record>> {
        if !query.joins().is_empty() {
            return Err(ModelError::Query(
                "joins are not supported by in-memory sessions".to_string(),
            ));
        }
        Ok(self
            .visible_rows(query.table_name())
            .into_iter()
            .filter(|row| query.conditions().iter().all(|c| c.matches(row)))
            .collect())
    }
}

fn bare(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

fn order_rows(rows: &mut [Record], ordering: &[(String, OrderDirection)]) {
    rows.sort_by(|a, b| {
        for (column, direction) in ordering {
            let left = a.get(bare(column)).unwrap_or(&Value::Null);
            let right = b.get(bare(column)).unwrap_or(&Value::Null);
            // NULLs sort first in ascending order
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => compare_values(left, right).unwrap_or(Ordering::Equal),
            };
            let ordering = match direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn key_matches(row: &Record, record: &Record, key_columns: &[&str]) -> bool {
    key_columns.iter().all(|column| {
        match (row.get(*column), record.get(*column)) {
            (Some(l), Some(r)) => compare_values(l, r) == Some(Ordering::Equal),
            _ => false,
        }
    })
}

fn next_id(rows: &[Record], column: &str) -> i64 {
    rows.iter()
        .filter_map(|row| row.get(column).and_then(Value::as_i64))
        .max()
        .unwrap_or(0)
        + 1
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn add(&self, table: &str, key_columns: &[&str], mut record: Record) -> ModelResult<Record> {
        self.ensure_open()?;

        let missing: Vec<&str> = key_columns
            .iter()
            .copied()
            .filter(|column| record.get(*column).map_or(true, Value::is_null))
            .collect();

        self.with_staged(table, |rows| {
            if missing.is_empty() && !key_columns.is_empty() {
                if let Some(row) = rows.iter_mut().find(|row| key_matches(row, &record, key_columns)) {
                    for (column, value) in record {
                        row.insert(column, value);
                    }
                    return Ok(row.clone());
                }
            } else if key_columns.len() == 1 {
                let column = key_columns[0];
                record.insert(column.to_string(), Value::from(next_id(rows, column)));
            } else if !key_columns.is_empty() {
                return Err(ModelError::MissingPrimaryKey);
            }

            rows.push(record.clone());
            Ok(record)
        })
    }

    async fn select(&self, query: &Query) -> ModelResult<Vec<Record>> {
        self.ensure_open()?;
        let mut rows = self.filtered(query)?;
        order_rows(&mut rows, query.ordering());

        let offset = query.offset_value().unwrap_or(0).max(0) as usize;
        let limit = query
            .limit_count()
            .map(|limit| limit.max(0) as usize)
            .unwrap_or(usize::MAX);
        let rows = rows.into_iter().skip(offset).take(limit);

        if query.select_fields().is_empty() {
            return Ok(rows.collect());
        }
        Ok(rows
            .map(|row| {
                query
                    .select_fields()
                    .iter()
                    .map(|field| {
                        let column = bare(field);
                        (column.to_string(), row.get(column).cloned().unwrap_or(Value::Null))
                    })
                    .collect()
            })
            .collect())
    }

    async fn count(&self, query: &Query) -> ModelResult<u64> {
        self.ensure_open()?;
        Ok(self.filtered(query)?.len() as u64)
    }

    async fn delete(&self, query: &Query) -> ModelResult<u64> {
        self.ensure_open()?;
        if !query.joins().is_empty() {
            return Err(ModelError::Query(
                "joins are not supported by in-memory sessions".to_string(),
            ));
        }
        Ok(self.with_staged(query.table_name(), |rows| {
            let before = rows.len();
            rows.retain(|row| !query.conditions().iter().all(|c| c.matches(row)));
            (before - rows.len()) as u64
        }))
    }

    async fn commit(&self) -> ModelResult<()> {
        self.ensure_open()?;
        let staged = std::mem::take(&mut *self.staged.lock());
        if staged.is_empty() {
            return Ok(());
        }
        let mut tables = self.database.tables.write();
        for (table, rows) in staged {
            tables.insert(table, rows);
        }
        tracing::debug!(session = %self.id, "committed in-memory session");
        Ok(())
    }

    async fn rollback(&self) -> ModelResult<()> {
        self.staged.lock().clear();
        Ok(())
    }

    async fn close(&self) -> ModelResult<()> {
        self.staged.lock().clear();
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }
}
