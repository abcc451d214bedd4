//! Listings query executor.
//!
//! The listings table is owned by the data import, not by this crate: it is
//! only ever read. Statements arrive already sanitised (single `SELECT`,
//! bounded by `LIMIT`); this module runs them and turns rows into a
//! [`QueryResult`].

use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{
    Column, Executor, QueryBuilder, Row, Sqlite, SqlitePool, Statement, TypeInfo, ValueRef,
};

use crate::error::{DatabaseError, Result};
use crate::models::{ListingFilter, QueryResult};
use crate::validation::validate_identifier;

/// Default listings table name.
pub const DEFAULT_TABLE: &str = "cars";

/// Read access to the listings table.
#[derive(Debug, Clone)]
pub struct ListingStore {
    pool: SqlitePool,
    table: String,
}

impl ListingStore {
    /// Wrap an existing pool. The table name must be a plain identifier.
    pub fn new(pool: SqlitePool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { pool, table })
    }

    /// Open the listings database read-only.
    pub async fn connect_read_only(url: &str, table: impl Into<String>) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!("Connected to listings database (read-only): {}", url);

        Self::new(pool, table)
    }

    /// The listings table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run a sanitised `SELECT` and collect every row.
    ///
    /// Any fault is returned as [`DatabaseError::Query`] with the statement
    /// attached; no partial result is produced.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let lowered = to_sqlite_dialect(sql);

        let rows = sqlx::query(&lowered)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| query_error(sql, source))?;

        let mut result = collect_rows(&rows).map_err(|source| query_error(sql, source))?;
        if rows.is_empty() {
            result.columns = self
                .column_names(&lowered)
                .await
                .map_err(|source| query_error(sql, source))?;
        }
        tracing::debug!(rows = result.len(), "Listings query complete");
        Ok(result)
    }

    /// Parameterised search used by the keyword strategy.
    ///
    /// Text filters are partial, case-insensitive matches. Results are
    /// ordered cheapest first.
    pub async fn search(&self, filter: &ListingFilter, limit: u32) -> Result<QueryResult> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT * FROM {} WHERE 1 = 1", self.table));

        if let Some(brand) = &filter.brand {
            builder
                .push(" AND LOWER(brand) LIKE ")
                .push_bind(like_pattern(brand));
        }
        if let Some(model) = &filter.model {
            builder
                .push(" AND LOWER(model) LIKE ")
                .push_bind(like_pattern(model));
        }
        if let Some(max_price) = filter.max_price {
            builder.push(" AND price <= ").push_bind(max_price);
        }
        if let Some(max_mileage) = filter.max_mileage {
            builder.push(" AND mileage <= ").push_bind(max_mileage);
        }
        if let Some(min_year) = filter.min_year {
            builder.push(" AND year >= ").push_bind(min_year);
        }
        builder
            .push(" ORDER BY price ASC LIMIT ")
            .push_bind(i64::from(limit));

        let sql = builder.sql().to_string();
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|source| query_error(&sql, source))?;

        let mut result = collect_rows(&rows).map_err(|source| query_error(&sql, source))?;
        if rows.is_empty() {
            result.columns = self
                .column_names(&sql)
                .await
                .map_err(|source| query_error(&sql, source))?;
        }
        Ok(result)
    }

    /// Result column names from the prepared statement, without running it.
    async fn column_names(&self, sql: &str) -> std::result::Result<Vec<String>, sqlx::Error> {
        let statement = (&self.pool).prepare(sql).await?;
        Ok(statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    /// Distinct models for brands partially matching `brand_fragment`.
    pub async fn available_models(&self, brand_fragment: &str) -> Result<Vec<String>> {
        let fragment = brand_fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT DISTINCT model FROM {} WHERE LOWER(brand) LIKE ? ORDER BY model",
            self.table
        );

        let models = sqlx::query_scalar::<_, String>(&sql)
            .bind(like_pattern(fragment))
            .fetch_all(&self.pool)
            .await
            .map_err(|source| query_error(&sql, source))?;

        Ok(models)
    }
}

fn query_error(sql: &str, source: sqlx::Error) -> DatabaseError {
    DatabaseError::Query {
        sql: sql.to_string(),
        source,
    }
}

/// `%value%`, lower-cased, with LIKE metacharacters in the value kept literal
/// by dropping them.
fn like_pattern(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '%' | '_'))
        .collect();
    format!("%{}%", cleaned)
}

/// Rewrite a Postgres-flavoured statement for SQLite.
///
/// `ILIKE` becomes `LIKE` (ASCII case-insensitive in SQLite). Text inside
/// single- or double-quoted sections is left untouched.
pub fn to_sqlite_dialect(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;

    let flush = |word: &mut String, out: &mut String| {
        if word.eq_ignore_ascii_case("ILIKE") {
            out.push_str("LIKE");
        } else {
            out.push_str(word);
        }
        word.clear();
    };

    for c in sql.chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_alphanumeric() || c == '_' => word.push(c),
            None => {
                flush(&mut word, &mut out);
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    flush(&mut word, &mut out);

    out
}

fn collect_rows(rows: &[SqliteRow]) -> std::result::Result<QueryResult, sqlx::Error> {
    let Some(first) = rows.first() else {
        return Ok(QueryResult::default());
    };

    let columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>();

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            cells.push(decode_cell(row, index)?);
        }
        out.push(cells);
    }

    Ok(QueryResult { columns, rows: out })
}

/// Decode one cell by its runtime storage class.
fn decode_cell(row: &SqliteRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index)?),
        "REAL" => Value::from(row.try_get::<f64, _>(index)?),
        "BLOB" => Value::from(format!("<{} bytes>", row.try_get::<Vec<u8>, _>(index)?.len())),
        _ => Value::from(row.try_get::<String, _>(index)?),
    };

    Ok(value)
}
