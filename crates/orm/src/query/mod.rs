//! Query Builder Module - fluent table queries rendered to parameterized SQL
//! or evaluated in memory

pub mod builder;
pub mod sql_generation;
pub mod types;

pub use builder::Query;
pub use sql_generation::upsert_sql;
pub use types::{
    compare_values, like_match, JoinClause, JoinType, OrderDirection, QueryOperator,
    WhereCondition,
};
