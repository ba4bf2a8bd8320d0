use rusqlite::types::Value;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::storage::quote_identifier;
use crate::visitor::{
    is_known_column, normalize_datetime, now_datetime_string, COLUMN_COUNTRY, COLUMN_CREATED_AT,
    COLUMN_DELETED_AT, COLUMN_ID, COLUMN_PATH, COLUMN_USER_DEVICE_TYPE,
};

/// Flat set of filters for listing and counting visitors.
/// Empty strings behave like absent values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisitorQueryOptions {
    pub id: Option<String>,
    pub id_in: Vec<String>,
    /// Count distinct values of this column instead of rows.
    pub distinct: Option<String>,
    /// ISO-2 code, or `"empty"` for rows without a country.
    pub country: Option<String>,
    pub path_contains: Option<String>,
    pub path_exact: Option<String>,
    /// Device type, or `"empty"` (any case) for rows without one.
    pub device_type: Option<String>,
    pub created_at_gte: Option<String>,
    pub created_at_lte: Option<String>,
    pub offset: i64,
    pub limit: i64,
    pub sort_order: Option<String>,
    pub order_by: Option<String>,
    pub count_only: bool,
    pub with_deleted: bool,
}

/// SQL fragments and bind values produced from `VisitorQueryOptions`.
#[derive(Debug, Clone)]
pub struct VisitorQuery {
    table: String,
    where_sql: String,
    tail_sql: String,
    distinct: Option<String>,
    binds: Vec<Value>,
}

impl VisitorQuery {
    pub fn select_sql(&self) -> String {
        format!("SELECT * FROM {}{}{}", self.table, self.where_sql, self.tail_sql)
    }

    pub fn count_sql(&self) -> String {
        match self.distinct {
            Some(ref column) => format!(
                "SELECT COUNT(*) AS count FROM (SELECT DISTINCT {column} FROM {}{}) AS t1",
                self.table, self.where_sql
            ),
            None => format!("SELECT COUNT(*) AS count FROM {}{}", self.table, self.where_sql),
        }
    }

    pub fn binds(&self) -> &[Value] {
        &self.binds
    }

    pub fn into_binds(self) -> Vec<Value> {
        self.binds
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Push a bind value and return its numbered placeholder.
fn bind(binds: &mut Vec<Value>, value: Value) -> String {
    binds.push(value);
    format!("?{}", binds.len())
}

fn bind_text(binds: &mut Vec<Value>, value: impl Into<String>) -> String {
    bind(binds, Value::Text(value.into()))
}

/// Translate query options into SQL against `table`.
///
/// Column names in `order_by` and `distinct` must be known visitor columns;
/// every other value is bound, never interpolated.
pub fn visitor_query(table: &str, options: &VisitorQueryOptions) -> AppResult<VisitorQuery> {
    let mut conditions: Vec<String> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();

    if let Some(id) = non_empty(&options.id) {
        conditions.push(format!("{COLUMN_ID} = {}", bind_text(&mut binds, id)));
    }

    let ids: Vec<&str> = options
        .id_in
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();
    if !ids.is_empty() {
        let placeholders: Vec<String> = ids.iter().map(|id| bind_text(&mut binds, *id)).collect();
        conditions.push(format!("{COLUMN_ID} IN ({})", placeholders.join(", ")));
    }

    if let Some(country) = non_empty(&options.country) {
        if country == "empty" {
            conditions.push(format!("{COLUMN_COUNTRY} = ''"));
        } else {
            conditions.push(format!("{COLUMN_COUNTRY} = {}", bind_text(&mut binds, country)));
        }
    }

    if let Some(path) = non_empty(&options.path_exact) {
        conditions.push(format!("{COLUMN_PATH} = {}", bind_text(&mut binds, path)));
    } else if let Some(path) = non_empty(&options.path_contains) {
        // LIKE is case-insensitive for ASCII in SQLite.
        let placeholder = bind_text(&mut binds, format!("%{path}%"));
        conditions.push(format!("{COLUMN_PATH} LIKE {placeholder}"));
    }

    if let Some(device_type) = non_empty(&options.device_type) {
        if device_type.eq_ignore_ascii_case("empty") {
            conditions.push(format!("{COLUMN_USER_DEVICE_TYPE} = ''"));
        } else {
            let placeholder = bind_text(&mut binds, device_type);
            conditions.push(format!("{COLUMN_USER_DEVICE_TYPE} = {placeholder}"));
        }
    }

    if let Some(gte) = non_empty(&options.created_at_gte) {
        let placeholder = bind_text(&mut binds, normalize_datetime(gte, false));
        conditions.push(format!("{COLUMN_CREATED_AT} >= {placeholder}"));
    }
    if let Some(lte) = non_empty(&options.created_at_lte) {
        let placeholder = bind_text(&mut binds, normalize_datetime(lte, true));
        conditions.push(format!("{COLUMN_CREATED_AT} <= {placeholder}"));
    }

    if !options.with_deleted {
        let placeholder = bind_text(&mut binds, now_datetime_string());
        conditions.push(format!("{COLUMN_DELETED_AT} > {placeholder}"));
    }

    let distinct = match non_empty(&options.distinct) {
        Some(column) if is_known_column(column) => Some(column.to_string()),
        Some(column) => {
            return Err(AppError::Validation(format!(
                "invalid distinct column: {column}"
            )))
        }
        None => None,
    };

    let mut tail_sql = String::new();
    if !options.count_only {
        if let Some(order_by) = non_empty(&options.order_by) {
            if !is_known_column(order_by) {
                return Err(AppError::Validation(format!(
                    "invalid order_by column: {order_by}"
                )));
            }
            let direction = match non_empty(&options.sort_order) {
                Some(order) if order.eq_ignore_ascii_case("asc") => "ASC",
                _ => "DESC",
            };
            tail_sql.push_str(&format!(" ORDER BY {order_by} {direction}"));
        }

        if options.limit > 0 {
            let placeholder = bind(&mut binds, Value::Integer(options.limit));
            tail_sql.push_str(&format!(" LIMIT {placeholder}"));
        }
        if options.offset > 0 {
            if options.limit <= 0 {
                tail_sql.push_str(" LIMIT -1");
            }
            let placeholder = bind(&mut binds, Value::Integer(options.offset));
            tail_sql.push_str(&format!(" OFFSET {placeholder}"));
        }
    }

    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    Ok(VisitorQuery {
        table: quote_identifier(table),
        where_sql,
        tail_sql,
        distinct,
        binds,
    })
}
