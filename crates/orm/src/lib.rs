//! # loom-orm: entity layer for loom
//!
//! Static entity schemas with attribute reflection, conversion between
//! entities and JSON mappings, value validation, a query builder that
//! renders parameterized SQL or evaluates in memory, and sessions with
//! request scoped transaction handling.

pub mod convert;
pub mod database;
pub mod entity;
pub mod error;
pub mod query;
pub mod schema;
pub mod session;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;


pub use convert::{ConversionConfig, FromDict, FromDictOptions, Selector, ToDict, ToDictOptions};
pub use database::{
    DatabaseConfig, DatabaseManager, MemorySessionFactory, PoolConfig, SessionFactory,
};
#[cfg(feature = "postgres")]
pub use database::PgSessionFactory;
pub use entity::{same_entity, Entity, EntityKey, EntityView, PrimaryKeyValue, Record, Related};
pub use error::{ModelError, ModelResult, ValidationErrors};
pub use query::{OrderDirection, Query, QueryOperator, WhereCondition};
pub use schema::{EntitySchema, FieldDescriptor, FieldKind, FieldType, MAX_DEPTH};
pub use session::{MemoryDatabase, MemorySession, Repository, Session};
pub use validation::{validate_dict, validate_for_find, validate_primary_key, validate_value};
