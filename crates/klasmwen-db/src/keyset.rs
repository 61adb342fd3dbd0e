//! Keyset (cursor) pagination over SQLite.
//!
//! A page request becomes one bounded query: the caller's base `SELECT` and
//! [`Filter`], an "after the cursor" predicate, a deterministic `ORDER BY`,
//! and `LIMIT limit + 1`. The extra row tells us whether another page exists
//! without a second `COUNT` query.
//!
//! Two cursor shapes are supported:
//!
//! * [`build_page`]: the cursor is the value of one strictly ordered column
//!   (an integer primary key).
//! * [`build_compound_page`]: the cursor is a composite unique key such as
//!   `(user_id, post_id)` while rows are shown in another order (like time).
//!   The key is resolved to the row's ordering values first, then compared
//!   as a row value: `(created_at, post_id) < (?, ?)`.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;

use klasmwen_types::pagination::{
    Cursor, CursorPage, IdKey, PageOptions, PaginationError, UserPostKey,
};

use crate::OptionalExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Comparison selecting rows that come after the cursor in this order.
    fn after_op(self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

/// Conjunction of SQL predicates with their positional (`?`) parameters.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) -> Self {
        self.push(clause, params);
        self
    }

    pub fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(format!("({})", clause.into()));
        self.params.extend(params);
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Base of a paginated query: `SELECT ... FROM ...` without WHERE/ORDER/LIMIT.
#[derive(Debug, Clone)]
pub struct KeysetQuery {
    select: String,
    filter: Filter,
}

impl KeysetQuery {
    pub fn new(select: impl Into<String>, filter: Filter) -> Self {
        Self {
            select: select.into(),
            filter,
        }
    }
}

/// Composite unique key used as a compound cursor.
#[derive(Debug, Clone, Copy)]
pub struct CompoundKey<'a> {
    /// Table holding the composite key.
    pub table: &'a str,
    /// Alias of `table` inside the base query.
    pub alias: &'a str,
    /// Columns of the unique key, in [`CompoundCursor::key_values`] order.
    pub key_columns: &'a [&'a str],
    /// Display order; must be total over the rows being paginated.
    pub order: &'a [(&'a str, SortOrder)],
}

impl CompoundKey<'_> {
    fn direction(&self) -> Result<SortOrder, PaginationError> {
        let first = self.order.first().map(|(_, o)| *o).unwrap_or(SortOrder::Asc);
        if self.order.iter().all(|(_, o)| *o == first) {
            Ok(first)
        } else {
            Err(PaginationError::MixedDirections)
        }
    }
}

/// A cursor key that can be bound against [`CompoundKey::key_columns`].
pub trait CompoundCursor: Serialize + DeserializeOwned {
    fn key_values(&self) -> Vec<Value>;
}

impl CompoundCursor for UserPostKey {
    fn key_values(&self) -> Vec<Value> {
        vec![Value::Text(self.user_id.clone()), Value::Integer(self.post_id)]
    }
}

/// Paginates on a single integer column (`column`, qualified as it appears in
/// the base query).
pub fn build_page<T, F, K>(
    conn: &Connection,
    query: KeysetQuery,
    column: &str,
    order: SortOrder,
    options: &PageOptions,
    map_row: F,
    key_of: K,
) -> Result<CursorPage<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    K: Fn(&T) -> i64,
{
    let KeysetQuery { select, mut filter } = query;

    if let Some(cursor) = &options.cursor {
        let IdKey(after) = cursor.decode::<IdKey>()?;
        filter.push(format!("{} {} ?", column, order.after_op()), [Value::Integer(after)]);
    }

    let order_by = format!("{} {}", column, order.keyword());
    let rows = fetch(conn, &select, &filter, &order_by, options.limit, map_row)?;

    let page = CursorPage::from_overfetch(rows, options.limit, |item| {
        Cursor::encode(&IdKey(key_of(item)))
    })?;
    Ok(page)
}

/// Paginates rows in `key.order`, using a composite unique key as cursor.
///
/// A cursor whose key no longer exists (the row was deleted) is rejected with
/// [`PaginationError::UnknownCursor`] rather than silently restarting.
pub fn build_compound_page<T, C, F, K>(
    conn: &Connection,
    query: KeysetQuery,
    key: &CompoundKey<'_>,
    options: &PageOptions,
    map_row: F,
    key_of: K,
) -> Result<CursorPage<T>>
where
    C: CompoundCursor,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    K: Fn(&T) -> C,
{
    let direction = key.direction()?;
    let KeysetQuery { select, mut filter } = query;

    let qualified: Vec<String> = key
        .order
        .iter()
        .map(|(column, _)| format!("{}.{}", key.alias, column))
        .collect();

    if let Some(cursor) = &options.cursor {
        let cursor_key: C = cursor.decode()?;
        let anchor = lookup_anchor(conn, key, &cursor_key.key_values())?
            .ok_or(PaginationError::UnknownCursor)?;
        let placeholders = vec!["?"; anchor.len()].join(", ");
        filter.push(
            format!("({}) {} ({})", qualified.join(", "), direction.after_op(), placeholders),
            anchor,
        );
    }

    let order_by = qualified
        .iter()
        .map(|column| format!("{} {}", column, direction.keyword()))
        .collect::<Vec<_>>()
        .join(", ");
    let rows = fetch(conn, &select, &filter, &order_by, options.limit, map_row)?;

    let page = CursorPage::from_overfetch(rows, options.limit, |item| Cursor::encode(&key_of(item)))?;
    Ok(page)
}

/// Ordering values of the row identified by `values`, or `None` if it is gone.
fn lookup_anchor(
    conn: &Connection,
    key: &CompoundKey<'_>,
    values: &[Value],
) -> Result<Option<Vec<Value>>> {
    let columns = key
        .order
        .iter()
        .map(|(column, _)| *column)
        .collect::<Vec<_>>()
        .join(", ");
    let predicate = key
        .key_columns
        .iter()
        .map(|column| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!("SELECT {} FROM {} WHERE {}", columns, key.table, predicate);

    let width = key.order.len();
    conn.query_row(&sql, params_from_iter(values.iter()), |row| {
        (0..width)
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()
    })
    .optional()
}

fn fetch<T, F>(
    conn: &Connection,
    select: &str,
    filter: &Filter,
    order_by: &str,
    limit: u32,
    map_row: F,
) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let sql = format!("{}{} ORDER BY {} LIMIT ?", select, filter.where_clause(), order_by);

    let mut params = filter.params().to_vec();
    params.push(Value::Integer(i64::from(limit) + 1));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
