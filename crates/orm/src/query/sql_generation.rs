//! Query Builder SQL generation

use super::builder::Query;
use super::types::*;
use serde_json::{Map, Value};

impl Query {
    /// Generate SELECT SQL with parameter placeholders and return parameters
    pub fn to_sql_with_params(&self) -> (String, Vec<Value>) {
        let mut sql = String::from("SELECT ");
        let mut params = Vec::new();

        if self.select_fields.is_empty() {
            sql.push_str(&format!("{}.*", self.table));
        } else {
            sql.push_str(&self.select_fields.join(", "));
        }
        sql.push_str(&format!(" FROM {}", self.table));

        for join in &self.joins {
            sql.push_str(&format!(" {} {}", join.join_type, join.table));
            if !join.on_conditions.is_empty() {
                let conditions: Vec<String> = join
                    .on_conditions
                    .iter()
                    .map(|(left, right)| format!("{} = {}", left, right))
                    .collect();
                sql.push_str(" ON ");
                sql.push_str(&conditions.join(" AND "));
            }
        }

        self.build_where_clause(&mut sql, &mut params);
        self.build_order_limit_clause(&mut sql);

        (sql, params)
    }

    /// Generate `SELECT COUNT(*)` for the filtered rows
    pub fn to_count_sql_with_params(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let mut params = Vec::new();
        for join in &self.joins {
            sql.push_str(&format!(" {} {}", join.join_type, join.table));
            for (i, (left, right)) in join.on_conditions.iter().enumerate() {
                sql.push_str(if i == 0 { " ON " } else { " AND " });
                sql.push_str(&format!("{} = {}", left, right));
            }
        }
        self.build_where_clause(&mut sql, &mut params);
        (sql, params)
    }

    /// Generate DELETE SQL for the filtered rows
    pub fn to_delete_sql_with_params(&self) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", self.table);
        let mut params = Vec::new();
        self.build_where_clause(&mut sql, &mut params);
        (sql, params)
    }

    /// Helper method to build WHERE clauses
    fn build_where_clause(&self, sql: &mut String, params: &mut Vec<Value>) {
        if self.where_conditions.is_empty() {
            return;
        }

        sql.push_str(" WHERE ");
        for (i, condition) in self.where_conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }

            sql.push_str(&condition.column);
            sql.push(' ');
            sql.push_str(&condition.operator.to_string());

            match condition.operator {
                QueryOperator::In | QueryOperator::NotIn => {
                    if condition.values.is_empty() {
                        // empty IN lists are not valid SQL
                        sql.push_str(" (NULL)");
                        continue;
                    }
                    let placeholders: Vec<String> = condition
                        .values
                        .iter()
                        .map(|value| push_param(params, value.clone()))
                        .collect();
                    sql.push_str(&format!(" ({})", placeholders.join(", ")));
                }
                QueryOperator::Between => {
                    let low = condition.values.first().cloned().unwrap_or(Value::Null);
                    let high = condition.values.get(1).cloned().unwrap_or(Value::Null);
                    let low = push_param(params, low);
                    let high = push_param(params, high);
                    sql.push_str(&format!(" {} AND {}", low, high));
                }
                QueryOperator::IsNull | QueryOperator::IsNotNull => {}
                _ => {
                    let value = condition.value.clone().unwrap_or(Value::Null);
                    sql.push(' ');
                    sql.push_str(&push_param(params, value));
                }
            }
        }
    }

    /// Helper method to build ORDER BY and LIMIT clauses
    fn build_order_limit_clause(&self, sql: &mut String) {
        if !self.order_by.is_empty() {
            let order_clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_clauses.join(", "));
        }

        if let Some(limit) = self.limit_count {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset_value {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
    }
}

fn push_param(params: &mut Vec<Value>, value: Value) -> String {
    params.push(value);
    format!("${}", params.len())
}

/// Generate an `INSERT ... ON CONFLICT ... DO UPDATE` statement returning the
/// stored row. Key columns with a NULL value are left to the database.
pub fn upsert_sql(
    table: &str,
    key_columns: &[&str],
    record: &Map<String, Value>,
) -> (String, Vec<Value>) {
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut params = Vec::new();

    for (column, value) in record {
        if value.is_null() && key_columns.contains(&column.as_str()) {
            continue;
        }
        columns.push(column.as_str());
        placeholders.push(push_param(&mut params, value.clone()));
    }

    let mut sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        )
    };

    let keys_given = !key_columns.is_empty() && key_columns.iter().all(|k| columns.contains(k));
    if keys_given {
        let updates: Vec<String> = columns
            .iter()
            .filter(|column| !key_columns.contains(column))
            .map(|column| format!("{} = EXCLUDED.{}", column, column))
            .collect();
        let updates = if updates.is_empty() {
            // keep RETURNING working when only keys are written
            vec![format!("{} = EXCLUDED.{}", key_columns[0], key_columns[0])]
        } else {
            updates
        };
        sql.push_str(&format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            key_columns.join(", "),
            updates.join(", ")
        ));
    }

    sql.push_str(" RETURNING *");
    (sql, params)
}
