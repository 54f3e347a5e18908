//! Query Builder Types - operators, conditions, joins and ordering

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Query operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
            QueryOperator::Between => write!(f, "BETWEEN"),
        }
    }
}

/// Where clause condition
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<Value>,
    pub values: Vec<Value>, // For IN, NOT IN, BETWEEN
}

impl WhereCondition {
    pub fn new(column: &str, operator: QueryOperator, value: Option<Value>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value,
            values: Vec::new(),
        }
    }

    pub fn with_values(column: &str, operator: QueryOperator, values: Vec<Value>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: None,
            values,
        }
    }

    /// Column name without a table qualifier.
    pub fn bare_column(&self) -> &str {
        self.column.rsplit('.').next().unwrap_or(&self.column)
    }

    /// Evaluate the condition against a stored record, with SQL semantics
    /// for NULL: comparisons involving NULL are false.
    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        let actual = record.get(self.bare_column()).unwrap_or(&Value::Null);

        match self.operator {
            QueryOperator::IsNull => actual.is_null(),
            QueryOperator::IsNotNull => !actual.is_null(),
            QueryOperator::In => {
                !actual.is_null() && self.values.iter().any(|v| values_equal(actual, v))
            }
            QueryOperator::NotIn => {
                !actual.is_null() && !self.values.iter().any(|v| values_equal(actual, v))
            }
            QueryOperator::Between => match self.values.as_slice() {
                [low, high] => {
                    matches!(
                        compare_values(actual, low),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        compare_values(actual, high),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
                _ => false,
            },
            QueryOperator::Like | QueryOperator::NotLike => {
                let (Some(Value::String(pattern)), Value::String(text)) = (&self.value, actual)
                else {
                    return false;
                };
                let matched = like_match(pattern, text);
                if self.operator == QueryOperator::Like {
                    matched
                } else {
                    !matched
                }
            }
            operator => {
                let Some(expected) = &self.value else {
                    return false;
                };
                let Some(ordering) = compare_values(actual, expected) else {
                    return false;
                };
                match operator {
                    QueryOperator::Equal => ordering == Ordering::Equal,
                    QueryOperator::NotEqual => ordering != Ordering::Equal,
                    QueryOperator::GreaterThan => ordering == Ordering::Greater,
                    QueryOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                    QueryOperator::LessThan => ordering == Ordering::Less,
                    QueryOperator::LessThanOrEqual => ordering != Ordering::Greater,
                    _ => false,
                }
            }
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Some(Ordering::Equal)
}

/// Ordering of two scalar values. `None` when either side is NULL or the
/// types are not comparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(l), Value::Number(r)) => {
            if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
                Some(l.cmp(&r))
            } else {
                l.as_f64()?.partial_cmp(&r.as_f64()?)
            }
        }
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        // numbers sent as strings by query string filters
        (Value::Number(n), Value::String(s)) => {
            n.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?)
        }
        (Value::String(s), Value::Number(n)) => {
            s.parse::<f64>().ok()?.partial_cmp(&n.as_f64()?)
        }
        (l, r) if l == r => Some(Ordering::Equal),
        _ => None,
    }
}

/// SQL LIKE matching: `%` matches any run of characters, `_` exactly one.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Join clause
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub on_conditions: Vec<(String, String)>, // (left_column, right_column)
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    /// Parse an ordering token where a leading `-` means descending.
    pub fn parse_column(token: &str) -> (&str, OrderDirection) {
        match token.strip_prefix('-') {
            Some(column) => (column, OrderDirection::Desc),
            None => (token, OrderDirection::Asc),
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> serde_json::Map<String, Value> {
        json!({"id": 3, "name": "alice", "score": 4.5, "group_id": null})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_match("al%", "alice"));
        assert!(like_match("%ic%", "alice"));
        assert!(like_match("_lice", "alice"));
        assert!(like_match("%", ""));
        assert!(!like_match("bob%", "alice"));
        assert!(!like_match("alic", "alice"));
    }

    #[test]
    fn test_condition_matching() {
        let record = record();
        assert!(WhereCondition::new("users.id", QueryOperator::Equal, Some(json!(3))).matches(&record));
        assert!(WhereCondition::new("score", QueryOperator::GreaterThan, Some(json!(4))).matches(&record));
        assert!(WhereCondition::with_values("id", QueryOperator::In, vec![json!(1), json!(3)]).matches(&record));
        assert!(WhereCondition::with_values("id", QueryOperator::Between, vec![json!(1), json!(3)]).matches(&record));
        assert!(WhereCondition::new("group_id", QueryOperator::IsNull, None).matches(&record));
        // NULL never compares equal
        assert!(!WhereCondition::new("group_id", QueryOperator::Equal, Some(Value::Null)).matches(&record));
        assert!(!WhereCondition::new("group_id", QueryOperator::NotEqual, Some(json!(1))).matches(&record));
    }

    #[test]
    fn test_order_token() {
        assert_eq!(OrderDirection::parse_column("-name"), ("name", OrderDirection::Desc));
        assert_eq!(OrderDirection::parse_column("id"), ("id", OrderDirection::Asc));
    }
}
