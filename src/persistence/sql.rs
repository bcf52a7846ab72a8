//! Translation of [`Filter`] trees into DuckDB `WHERE` clauses.

use anyhow::{anyhow, Result};
use duckdb::types::Value;

use crate::pagination::Order;
use crate::store::{Filter, StoreQuery};

/// Alias every table is selected under.
pub const ALIAS: &str = "t";

/// A list-valued field stored in a side table, e.g. conversation recipients.
pub struct Membership {
    pub field: &'static str,
    pub table: &'static str,
    pub owner_column: &'static str,
    pub value_column: &'static str,
}

/// How record fields map onto one table.
pub struct TableSpec {
    pub table: &'static str,
    /// `(field, column)` pairs for scalar fields.
    pub columns: &'static [(&'static str, &'static str)],
    pub memberships: &'static [Membership],
}

impl TableSpec {
    fn column(&self, field: &str) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
    }

    fn membership(&self, field: &str) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.field == field)
    }
}

pub const USERS: TableSpec = TableSpec {
    table: "users",
    columns: &[
        ("id", "id"),
        ("username", "username"),
        ("name", "name"),
        ("email", "email"),
    ],
    memberships: &[],
};

pub const CONVERSATIONS: TableSpec = TableSpec {
    table: "conversations",
    columns: &[("id", "id"), ("title", "title")],
    memberships: &[Membership {
        field: "recipients",
        table: "conversation_recipients",
        owner_column: "conversation_id",
        value_column: "user_id",
    }],
};

pub const MESSAGES: TableSpec = TableSpec {
    table: "messages",
    columns: &[
        ("id", "id"),
        ("conversationId", "conversation_id"),
        ("senderId", "sender_id"),
        ("content", "content"),
    ],
    memberships: &[],
};

/// `WHERE` clause text for `filter`, pushing bound values onto `params`.
pub fn where_clause(filter: &Filter, spec: &TableSpec, params: &mut Vec<Value>) -> Result<String> {
    let sql = match filter {
        Filter::All => "TRUE".to_string(),
        Filter::Nothing => "FALSE".to_string(),
        Filter::Eq { field, value } => {
            let column = scalar_column(spec, field)?;
            params.push(Value::Text(value.clone()));
            format!("{ALIAS}.{column} = ?")
        }
        Filter::Ne { field, value } => {
            let column = scalar_column(spec, field)?;
            params.push(Value::Text(value.clone()));
            format!("({ALIAS}.{column} IS NULL OR {ALIAS}.{column} <> ?)")
        }
        Filter::Contains { field, value } => {
            params.push(Value::Text(value.clone()));
            if let Some(m) = spec.membership(field) {
                format!(
                    "EXISTS (SELECT 1 FROM {table} m WHERE m.{owner} = {ALIAS}.id AND m.{value_col} = ?)",
                    table = m.table,
                    owner = m.owner_column,
                    value_col = m.value_column,
                )
            } else {
                let column = scalar_column(spec, field)?;
                format!("{ALIAS}.{column} = ?")
            }
        }
        Filter::KeyAbove(key) => {
            params.push(Value::BigInt(key.value()));
            format!("{ALIAS}.sort_key > ?")
        }
        Filter::KeyBelow(key) => {
            params.push(Value::BigInt(key.value()));
            format!("{ALIAS}.sort_key < ?")
        }
        Filter::And(parts) => {
            if parts.is_empty() {
                "TRUE".to_string()
            } else {
                let clauses = parts
                    .iter()
                    .map(|part| where_clause(part, spec, params))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", clauses.join(" AND "))
            }
        }
    };
    Ok(sql)
}

/// `ORDER BY` clause for a scan in `order`; ids break sort key ties.
pub fn order_clause(order: Order) -> String {
    let dir = match order {
        Order::Ascending => "ASC",
        Order::Descending => "DESC",
    };
    format!("ORDER BY {ALIAS}.sort_key {dir}, {ALIAS}.id {dir}")
}

/// Full select: `SELECT <columns> FROM <table> t WHERE ... ORDER BY ... LIMIT ?`.
pub fn select(
    columns: &str,
    spec: &TableSpec,
    query: &StoreQuery,
    limit: usize,
) -> Result<(String, Vec<Value>)> {
    let mut params = Vec::new();
    let predicate = where_clause(&query.filter, spec, &mut params)?;
    params.push(Value::BigInt(i64::try_from(limit).unwrap_or(i64::MAX)));
    let sql = format!(
        "SELECT {columns} FROM {table} {ALIAS} WHERE {predicate} {order} LIMIT ?",
        table = spec.table,
        order = order_clause(query.order),
    );
    Ok((sql, params))
}

fn scalar_column(spec: &TableSpec, field: &str) -> Result<&'static str> {
    spec.column(field)
        .ok_or_else(|| anyhow!("field '{}' is not filterable on {}", field, spec.table))
}
