//! Query Builder - table query with filters, joins, ordering and paging

use super::types::*;
use crate::entity::Entity;
use serde_json::Value;

/// Query over one table, executed by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub(crate) table: String,
    pub(crate) select_fields: Vec<String>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) where_conditions: Vec<WhereCondition>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) offset_value: Option<i64>,
}

impl Query {
    /// Create a new query for a table
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Query over the table of an entity
    pub fn for_entity<E: Entity>() -> Self {
        Self::table(&E::schema().table_fullname())
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn select_fields(&self) -> &[String] {
        &self.select_fields
    }

    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    pub fn conditions(&self) -> &[WhereCondition] {
        &self.where_conditions
    }

    pub fn ordering(&self) -> &[(String, OrderDirection)] {
        &self.order_by
    }

    pub fn limit_count(&self) -> Option<i64> {
        self.limit_count
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset_value
    }

    /// Select specific fields
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Add INNER JOIN
    pub fn join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Inner,
            table: table.to_string(),
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    /// Add LEFT JOIN
    pub fn left_join(mut self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.joins.push(JoinClause {
            join_type: JoinType::Left,
            table: table.to_string(),
            on_conditions: vec![(left_col.to_string(), right_col.to_string())],
        });
        self
    }

    pub fn where_condition(mut self, condition: WhereCondition) -> Self {
        self.where_conditions.push(condition);
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::Equal, value.into())
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::NotEqual, value.into())
    }

    /// Add WHERE condition with greater than
    pub fn where_gt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::GreaterThan, value.into())
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::GreaterThanOrEqual, value.into())
    }

    /// Add WHERE condition with less than
    pub fn where_lt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::LessThan, value.into())
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.compare(column, QueryOperator::LessThanOrEqual, value.into())
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.compare(column, QueryOperator::Like, Value::String(pattern.to_string()))
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.where_conditions.push(WhereCondition::with_values(
            column,
            QueryOperator::In,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Add WHERE condition with NOT IN
    pub fn where_not_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.where_conditions.push(WhereCondition::with_values(
            column,
            QueryOperator::NotIn,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(mut self, column: &str) -> Self {
        self.where_conditions
            .push(WhereCondition::new(column, QueryOperator::IsNull, None));
        self
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(mut self, column: &str) -> Self {
        self.where_conditions
            .push(WhereCondition::new(column, QueryOperator::IsNotNull, None));
        self
    }

    /// Add WHERE condition with BETWEEN
    pub fn where_between<T: Into<Value>>(mut self, column: &str, start: T, end: T) -> Self {
        self.where_conditions.push(WhereCondition::with_values(
            column,
            QueryOperator::Between,
            vec![start.into(), end.into()],
        ));
        self
    }

    /// Filter on a value taken from a request: arrays become IN, null
    /// becomes IS NULL and anything else an equality.
    pub fn where_value(self, column: &str, value: Value) -> Self {
        match value {
            Value::Array(values) => self.where_in(column, values),
            Value::Null => self.where_null(column),
            other => self.where_eq(column, other),
        }
    }

    fn compare(mut self, column: &str, operator: QueryOperator, value: Value) -> Self {
        self.where_conditions
            .push(WhereCondition::new(column, operator, Some(value)));
        self
    }

    /// Add ORDER BY clause (ascending)
    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), OrderDirection::Asc));
        self
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push((column.to_string(), OrderDirection::Desc));
        self
    }

    pub fn order_by_direction(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    /// Add LIMIT clause
    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// Add pagination (LIMIT + OFFSET), pages start at 1
    pub fn paginate(mut self, per_page: i64, page: i64) -> Self {
        self.limit_count = Some(per_page);
        self.offset_value = Some((page.max(1) - 1) * per_page);
        self
    }

    /// Same query without ordering, limit and offset, as used for counting.
    pub fn unpaged(&self) -> Self {
        Self {
            order_by: Vec::new(),
            limit_count: None,
            offset_value: None,
            ..self.clone()
        }
    }
}
