use chrono::{DateTime, Utc};
use deadpool_sqlite::Pool;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AppError, AppResult};
use crate::query::builder::{visitor_query, VisitorQueryOptions};
use crate::storage::{is_valid_identifier, migrations, quote_identifier};
use crate::types::VisitRequest;
use crate::visitor::{
    format_datetime, now_datetime_string, Visitor, COLUMN_DELETED_AT, COLUMN_ID,
};

pub struct NewStoreOptions {
    pub visitor_table_name: String,
    pub pool: Pool,
    pub automigrate_enabled: bool,
    pub debug_enabled: bool,
}

/// Visitor table access. Cheap to share behind an `Arc`.
pub struct Store {
    pool: Pool,
    visitor_table_name: String,
    automigrate_enabled: bool,
    debug_enabled: AtomicBool,
}

impl Store {
    /// Validate options and, when enabled, migrate the visitor table.
    pub async fn new(opts: NewStoreOptions) -> AppResult<Self> {
        if opts.visitor_table_name.is_empty() {
            return Err(AppError::Validation(
                "visitor table name is required".to_string(),
            ));
        }
        if !is_valid_identifier(&opts.visitor_table_name) {
            return Err(AppError::Validation(format!(
                "visitor table name {:?} is not a plain identifier",
                opts.visitor_table_name
            )));
        }

        let store = Store {
            pool: opts.pool,
            visitor_table_name: opts.visitor_table_name,
            automigrate_enabled: opts.automigrate_enabled,
            debug_enabled: AtomicBool::new(opts.debug_enabled),
        };

        if store.automigrate_enabled {
            store.auto_migrate().await?;
        }

        Ok(store)
    }

    pub fn visitor_table_name(&self) -> &str {
        &self.visitor_table_name
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn auto_migrate(&self) -> AppResult<()> {
        let table = self.visitor_table_name.clone();
        let conn = self.pool.get().await?;
        conn.interact(move |conn| migrations::run_migrations(conn, &table))
            .await??;
        Ok(())
    }

    /// Toggle logging of every generated SQL statement.
    pub fn enable_debug(&self, enabled: bool) {
        self.debug_enabled.store(enabled, Ordering::Relaxed);
    }

    fn log_sql(&self, operation: &'static str, sql: &str) {
        if self.debug_enabled.load(Ordering::Relaxed) {
            tracing::info!(operation, sql, table = %self.visitor_table_name, "visitor store sql");
        }
    }

    fn table(&self) -> String {
        quote_identifier(&self.visitor_table_name)
    }

    fn insert_sql(&self, visitor: &Visitor) -> (String, Vec<String>) {
        let data = visitor.data();
        let columns: Vec<&str> = data.iter().map(|(column, _)| *column).collect();
        let placeholders: Vec<String> = (1..=data.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            placeholders.join(", ")
        );
        (sql, data.into_iter().map(|(_, value)| value).collect())
    }

    /// Insert a new visitor. Stamps `created_at` / `updated_at` with now.
    pub async fn visitor_create(&self, visitor: &mut Visitor) -> AppResult<()> {
        let now = now_datetime_string();
        visitor.set_created_at(now.clone()).set_updated_at(now);

        let (sql, values) = self.insert_sql(visitor);
        self.log_sql("visitor_create", &sql);

        let conn = self.pool.get().await?;
        conn.interact(move |conn| conn.execute(&sql, params_from_iter(values.iter())))
            .await??;

        visitor.mark_as_not_dirty();
        Ok(())
    }

    /// Insert many visitors in one transaction. Returns the number inserted.
    pub async fn visitor_create_batch(&self, mut visitors: Vec<Visitor>) -> AppResult<usize> {
        if visitors.is_empty() {
            return Ok(0);
        }

        let now = now_datetime_string();
        let mut rows = Vec::with_capacity(visitors.len());
        for visitor in visitors.iter_mut() {
            // Keep the time the visit was captured; only backfill missing stamps.
            if visitor.created_at().is_empty() {
                visitor.set_created_at(now.clone());
            }
            visitor.set_updated_at(now.clone());
            rows.push(self.insert_sql(visitor));
        }
        if let Some((sql, _)) = rows.first() {
            self.log_sql("visitor_create_batch", sql);
        }

        let conn = self.pool.get().await?;
        let inserted = conn
            .interact(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                for (sql, values) in &rows {
                    let mut stmt = tx.prepare_cached(sql)?;
                    inserted += stmt.execute(params_from_iter(values.iter()))?;
                }
                tx.commit()?;
                Ok::<_, rusqlite::Error>(inserted)
            })
            .await??;

        Ok(inserted)
    }

    /// Write the changed columns of `visitor`. `id` is never updated.
    /// A record without changes is left alone.
    pub async fn visitor_update(&self, visitor: &mut Visitor) -> AppResult<()> {
        if visitor.id().is_empty() {
            return Err(AppError::Validation("visitor id is required".to_string()));
        }
        if !visitor.is_dirty() {
            return Ok(());
        }

        visitor.set_updated_at(now_datetime_string());

        let changed: Vec<(&'static str, String)> = visitor
            .data_changed()
            .into_iter()
            .filter(|(column, _)| *column != COLUMN_ID)
            .collect();
        if changed.is_empty() {
            visitor.mark_as_not_dirty();
            return Ok(());
        }

        let assignments: Vec<String> = changed
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {COLUMN_ID} = ?{}",
            self.table(),
            assignments.join(", "),
            changed.len() + 1
        );
        self.log_sql("visitor_update", &sql);

        let mut values: Vec<String> = changed.into_iter().map(|(_, value)| value).collect();
        values.push(visitor.id().to_string());

        let conn = self.pool.get().await?;
        conn.interact(move |conn| conn.execute(&sql, params_from_iter(values.iter())))
            .await??;

        visitor.mark_as_not_dirty();
        Ok(())
    }

    /// Remove the row for good.
    pub async fn visitor_delete(&self, visitor: &Visitor) -> AppResult<()> {
        self.visitor_delete_by_id(visitor.id()).await
    }

    pub async fn visitor_delete_by_id(&self, id: &str) -> AppResult<()> {
        if id.is_empty() {
            return Err(AppError::Validation("visitor id is required".to_string()));
        }

        let sql = format!("DELETE FROM {} WHERE {COLUMN_ID} = ?1", self.table());
        self.log_sql("visitor_delete", &sql);

        let id = id.to_string();
        let conn = self.pool.get().await?;
        conn.interact(move |conn| conn.execute(&sql, [id])).await??;
        Ok(())
    }

    /// Mark the record deleted as of now and persist it.
    pub async fn visitor_soft_delete(&self, visitor: &mut Visitor) -> AppResult<()> {
        visitor.set_deleted_at(now_datetime_string());
        self.visitor_update(visitor).await
    }

    pub async fn visitor_soft_delete_by_id(&self, id: &str) -> AppResult<()> {
        let mut visitor = self
            .visitor_find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("visitor {id}")))?;
        self.visitor_soft_delete(&mut visitor).await
    }

    /// Live (not soft-deleted) visitor by id.
    pub async fn visitor_find_by_id(&self, id: &str) -> AppResult<Option<Visitor>> {
        if id.is_empty() {
            return Err(AppError::Validation("visitor id is required".to_string()));
        }

        let options = VisitorQueryOptions {
            id: Some(id.to_string()),
            limit: 1,
            ..Default::default()
        };
        Ok(self.visitor_list(options).await?.into_iter().next())
    }

    pub async fn visitor_list(&self, options: VisitorQueryOptions) -> AppResult<Vec<Visitor>> {
        let query = visitor_query(&self.visitor_table_name, &options)?;
        let sql = query.select_sql();
        self.log_sql("visitor_list", &sql);
        let binds = query.into_binds();

        let conn = self.pool.get().await?;
        let rows = conn
            .interact(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> =
                    stmt.column_names().into_iter().map(String::from).collect();
                let rows = stmt.query_map(params_from_iter(binds.iter()), |row| {
                    row_to_map(row, &columns)
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok::<_, rusqlite::Error>(results)
            })
            .await??;

        Ok(rows.into_iter().map(Visitor::from_existing_data).collect())
    }

    /// Count matching rows, or distinct values when `options.distinct` is set.
    pub async fn visitor_count(&self, mut options: VisitorQueryOptions) -> AppResult<i64> {
        options.count_only = true;
        let query = visitor_query(&self.visitor_table_name, &options)?;
        let sql = query.count_sql();
        self.log_sql("visitor_count", &sql);
        let binds = query.into_binds();

        let conn = self.pool.get().await?;
        let count = conn
            .interact(move |conn| {
                conn.query_row(&sql, params_from_iter(binds.iter()), |row| {
                    row.get::<_, i64>(0)
                })
            })
            .await??;
        Ok(count)
    }

    /// Build a visitor from request details and store it right away.
    pub async fn visitor_register(&self, request: &VisitRequest) -> AppResult<Visitor> {
        let mut visitor = request.to_visitor();
        self.visitor_create(&mut visitor).await?;
        Ok(visitor)
    }

    /// Hard-delete rows soft-deleted before `older_than`. Returns the number removed.
    pub async fn purge_soft_deleted(&self, older_than: DateTime<Utc>) -> AppResult<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {COLUMN_DELETED_AT} < ?1",
            self.table()
        );
        self.log_sql("purge_soft_deleted", &sql);

        let cutoff = format_datetime(older_than);
        let conn = self.pool.get().await?;
        let deleted = conn
            .interact(move |conn| {
                let deleted = conn.execute(&sql, [cutoff])?;
                if deleted > 10000 {
                    conn.execute_batch("VACUUM")?;
                }
                Ok::<_, rusqlite::Error>(deleted)
            })
            .await??;
        Ok(deleted)
    }

    /// Cheap liveness check for the health endpoint.
    pub async fn ping(&self) -> bool {
        let Ok(conn) = self.pool.get().await else {
            return false;
        };
        conn.interact(|conn: &mut Connection| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        })
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

fn row_to_map(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<HashMap<String, String>> {
    let mut data = HashMap::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => String::new(),
            ValueRef::Integer(n) => n.to_string(),
            ValueRef::Real(f) => f.to_string(),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                String::from_utf8_lossy(bytes).into_owned()
            }
        };
        data.insert(column.clone(), value);
    }
    Ok(data)
}
