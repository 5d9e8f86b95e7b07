//! Business rules on top of the entities: accounts, the catalog, capacity
//! bookkeeping and the admin views.

pub mod admin;
pub mod connections;
pub mod listings;
pub mod users;

use sea_orm::sea_query::{Expr, Func, LikeExpr, SimpleExpr};
use sea_orm::{ActiveEnum, ColumnTrait, ConnectionTrait, PaginatorTrait, Selector, SelectorTrait};
use serde::Serialize;

use crate::error::Result;

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;
/// Highest page whose row offset still fits a signed 64-bit SQL `OFFSET`.
const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

/// Case-insensitive substring match on a column. `%` and `_` in `needle` match literally.
pub(crate) fn contains_ci<C: ColumnTrait>(column: C, needle: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    Expr::expr(Func::lower(Expr::col((column.entity_name(), column)))).like(LikeExpr::new(pattern).escape('\\'))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Parses a filter value into one of the string-backed enums, ignoring unknown values.
pub fn parse_enum<E>(raw: Option<&str>) -> Option<E>
where
    E: ActiveEnum<Value = String>,
{
    raw.and_then(|value| E::try_from_value(&value.to_owned()).ok())
}

/// A one-based page request with a bounded page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Missing values fall back to the first page of ten. Both are clamped to their bounds.
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current: u64,
    pub pages: u64,
    pub total: u64,
}

pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

pub(crate) async fn fetch_page<C, S>(db: &C, selector: Selector<S>, request: PageRequest) -> Result<Page<S::Item>>
where
    C: ConnectionTrait,
    S: SelectorTrait + Send + Sync + 'static,
{
    let paginator = selector.paginate(db, request.limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(request.page - 1).await?;

    Ok(Page {
        items,
        pagination: Pagination {
            current: request.page,
            pages: total.div_ceil(request.limit),
            total,
        },
    })
}
