//! Generic row queries driven by a resource's table and column names.
//!
//! Table and column names always come from a static resource definition and are
//! quoted by sea-query; values are inlined and escaped by the query builder.

use sea_query::{
    Alias, Asterisk, BinOper, Cond, Expr, Func, Order, Query, SelectStatement, SimpleExpr,
    SqliteQueryBuilder,
};
use serde_json::Value;

use crate::repository::{Filter, FilterMode, Sort};

const ID_COLUMN: &str = "id";

/// Unicode case-insensitive pattern matching `value` literally anywhere in the column.
///
/// SQLite's `LOWER()` and `LIKE` only fold ASCII, so the match goes through the
/// `REGEXP` function registered on every connection.
fn contains_pattern(value: &str) -> String {
    format!("(?i){}", regex::escape(value))
}

fn filter_condition(filter: &Filter) -> SimpleExpr {
    match filter.mode {
        FilterMode::Contains => Expr::col(Alias::new(filter.column.as_str()))
            .binary(BinOper::Custom("REGEXP"), contains_pattern(&filter.value)),
        FilterMode::Equals => {
            Expr::col(Alias::new(filter.column.as_str())).eq(filter.value.as_str())
        }
    }
}

fn apply_after_id(query: &mut SelectStatement, after_id: Option<i64>) {
    if let Some(id) = after_id {
        query.and_where(Expr::col(Alias::new(ID_COLUMN)).gt(id));
    }
}

fn apply_filter(query: &mut SelectStatement, filter: Option<&Filter>) {
    if let Some(filter) = filter {
        query.cond_where(Cond::all().add(filter_condition(filter)));
    }
}

/// Convert a JSON value into a bindable expression
pub fn json_to_expr(value: &Value) -> SimpleExpr {
    match value {
        Value::Null => SimpleExpr::Value(sea_query::Value::String(None)),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.as_str().into(),
        other => other.to_string().into(),
    }
}

/// SELECT <columns> FROM <table> [WHERE <filter> AND id > <after_id>] ORDER BY <sort>, id LIMIT ? OFFSET ?
pub fn select_page(
    table: &str,
    columns: &[&str],
    filter: Option<&Filter>,
    sort: Option<&Sort>,
    after_id: Option<i64>,
    offset: u64,
    limit: u64,
) -> String {
    let mut query = Query::select();
    query
        .columns(columns.iter().map(|c| Alias::new(*c)))
        .from(Alias::new(table));
    apply_filter(&mut query, filter);
    apply_after_id(&mut query, after_id);

    match sort {
        Some(sort) => {
            let order = if sort.ascending { Order::Asc } else { Order::Desc };
            query.order_by(Alias::new(sort.column.as_str()), order);
            if sort.column != ID_COLUMN {
                query.order_by(Alias::new(ID_COLUMN), Order::Asc);
            }
        }
        None => {
            query.order_by(Alias::new(ID_COLUMN), Order::Asc);
        }
    }

    query
        .limit(limit)
        .offset(offset)
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(*) FROM <table> [WHERE <filter> AND id > <after_id>]
pub fn count(table: &str, filter: Option<&Filter>, after_id: Option<i64>) -> String {
    let mut query = Query::select();
    query
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Alias::new(table));
    apply_filter(&mut query, filter);
    apply_after_id(&mut query, after_id);
    query.to_string(SqliteQueryBuilder)
}

/// SELECT <columns> FROM <table> WHERE id = ?
pub fn select_by_id(table: &str, columns: &[&str], id: i64) -> String {
    Query::select()
        .columns(columns.iter().map(|c| Alias::new(*c)))
        .from(Alias::new(table))
        .and_where(Expr::col(Alias::new(ID_COLUMN)).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO <table> (<keys>) VALUES (<values>) RETURNING *
pub fn insert(table: &str, values: &[(String, Value)]) -> String {
    Query::insert()
        .into_table(Alias::new(table))
        .columns(values.iter().map(|(k, _)| Alias::new(k.as_str())))
        .values_panic(values.iter().map(|(_, v)| json_to_expr(v)))
        .returning_all()
        .to_string(SqliteQueryBuilder)
}

/// UPDATE <table> SET <key> = <value>, ... WHERE id = ?
pub fn update(table: &str, id: i64, values: &[(String, Value)]) -> String {
    Query::update()
        .table(Alias::new(table))
        .values(
            values
                .iter()
                .map(|(k, v)| (Alias::new(k.as_str()), json_to_expr(v))),
        )
        .and_where(Expr::col(Alias::new(ID_COLUMN)).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM <table> WHERE id = ?
pub fn delete(table: &str, id: i64) -> String {
    Query::delete()
        .from_table(Alias::new(table))
        .and_where(Expr::col(Alias::new(ID_COLUMN)).eq(id))
        .to_string(SqliteQueryBuilder)
}
