//! Database sessions.
//!
//! A [`Session`] is a unit of work over a store. Writes made through it stay
//! invisible to other sessions until [`Session::commit`]. Sessions are
//! shared as `Arc<dyn Session>`, so every operation takes `&self`.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryDatabase, MemorySession};
#[cfg(feature = "postgres")]
pub use postgres::PgSession;

use crate::entity::{Entity, PrimaryKeyValue, Record};
use crate::error::{ModelError, ModelResult};
use crate::query::Query;
use async_trait::async_trait;
use serde_json::Value;
use std::marker::PhantomData;

/// Unit of work over a record store.
#[async_trait]
pub trait Session: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> uuid::Uuid;

    /// Insert or update a record by its key columns and return the stored
    /// row, including generated keys.
    async fn add(&self, table: &str, key_columns: &[&str], record: Record) -> ModelResult<Record>;

    /// Row of a table by its key column values.
    async fn get(&self, table: &str, key_columns: &[&str], key: &[Value]) -> ModelResult<Option<Record>> {
        if key_columns.is_empty() || key_columns.len() != key.len() || key.iter().any(Value::is_null) {
            return Err(ModelError::MissingPrimaryKey);
        }
        let query = key_columns
            .iter()
            .zip(key)
            .fold(Query::table(table), |query, (column, value)| {
                query.where_eq(column, value.clone())
            })
            .limit(1);
        Ok(self.select(&query).await?.into_iter().next())
    }

    async fn select(&self, query: &Query) -> ModelResult<Vec<Record>>;

    /// Number of rows matching the query filters; ordering and paging are
    /// ignored.
    async fn count(&self, query: &Query) -> ModelResult<u64>;

    /// Delete the rows matching the query filters and return how many were
    /// removed.
    async fn delete(&self, query: &Query) -> ModelResult<u64>;

    async fn commit(&self) -> ModelResult<()>;

    async fn rollback(&self) -> ModelResult<()>;

    /// Release the session. Uncommitted work is discarded.
    async fn close(&self) -> ModelResult<()>;

    fn is_closed(&self) -> bool;
}

/// Typed access to the rows of one entity through a session.
pub struct Repository<'a, E: Entity> {
    session: &'a dyn Session,
    _entity: PhantomData<E>,
}

impl<'a, E: Entity> Repository<'a, E> {
    pub fn new(session: &'a dyn Session) -> Self {
        Self {
            session,
            _entity: PhantomData,
        }
    }

    /// Base query over the entity table.
    pub fn query(&self) -> Query {
        Query::for_entity::<E>()
    }

    fn key_query(&self, values: &[Value]) -> ModelResult<Query> {
        let columns = E::schema().primary_key_columns();
        if columns.is_empty() || columns.len() != values.len() {
            return Err(ModelError::MissingPrimaryKey);
        }
        let mut query = self.query();
        for (column, value) in columns.iter().zip(values) {
            if value.is_null() {
                return Err(ModelError::MissingPrimaryKey);
            }
            query = query.where_eq(column, value.clone());
        }
        Ok(query)
    }

    /// Entity with the given primary key values, in key column order.
    pub async fn get(&self, pk: &[Value]) -> ModelResult<Option<E>> {
        let schema = E::schema();
        let row = self
            .session
            .get(&schema.table_fullname(), schema.primary_key_columns(), pk)
            .await?;
        row.as_ref().map(E::from_record).transpose()
    }

    pub async fn find(&self, query: &Query) -> ModelResult<Vec<E>> {
        let rows = self.session.select(query).await?;
        rows.iter().map(E::from_record).collect()
    }

    pub async fn count(&self, query: &Query) -> ModelResult<u64> {
        self.session.count(query).await
    }

    /// Persist the entity and return it as stored.
    pub async fn save(&self, entity: &E) -> ModelResult<E> {
        let schema = E::schema();
        let stored = self
            .session
            .add(
                &schema.table_fullname(),
                schema.primary_key_columns(),
                entity.to_record(),
            )
            .await?;
        E::from_record(&stored)
    }

    pub async fn delete(&self, entity: &E) -> ModelResult<u64> {
        match entity.primary_key() {
            PrimaryKeyValue::None => Err(ModelError::MissingPrimaryKey),
            pk => self.delete_by_pk(&pk.into_values()).await,
        }
    }

    pub async fn delete_by_pk(&self, pk: &[Value]) -> ModelResult<u64> {
        let query = self.key_query(pk)?;
        self.session.delete(&query).await
    }

    pub async fn delete_where(&self, query: &Query) -> ModelResult<u64> {
        self.session.delete(query).await
    }
}
