//! Page query builder: base filter + cursor bounds -> bounded store query.

use tracing::debug;

use super::cursor::Cursor;
use super::error::PaginationError;
use super::request::Order;
use crate::store::{Filter, StoreQuery};
use crate::types::SortKey;

/// A store query plus the bounds that shaped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub query: StoreQuery,
    /// Decoded `after` bound, if one was supplied and valid.
    pub after: Option<SortKey>,
    /// Decoded `before` bound, if one was supplied and valid.
    pub before: Option<SortKey>,
}

impl PageQuery {
    /// True when the bounds exclude every record.
    pub fn is_empty(&self) -> bool {
        self.query.filter.is_nothing()
    }

    pub fn order(&self) -> Order {
        self.query.order
    }
}

/// Compose `base AND sortKey </> bound` for the requested order.
///
/// "After" always means further along `order`, so on a descending
/// collection `after` becomes an upper bound. Cursors that fail to decode
/// are treated as absent. Contradictory bounds yield a query that matches
/// nothing instead of an error.
pub fn build_page_query(
    base: Filter,
    before: Option<&Cursor>,
    after: Option<&Cursor>,
    order: Order,
) -> PageQuery {
    let after = decode_bound(after, "after");
    let before = decode_bound(before, "before");

    if let (Some(a), Some(b)) = (after, before) {
        if !order.precedes(a, b) {
            debug!(
                after = %a,
                before = %b,
                ?order,
                "{}",
                PaginationError::ContradictoryBounds
            );
            return PageQuery {
                query: StoreQuery::new(Filter::Nothing, order),
                after,
                before,
            };
        }
    }

    let mut filter = base;
    if let Some(a) = after {
        filter = filter.and(past(a, order));
    }
    if let Some(b) = before {
        filter = filter.and(past(b, order.reverse()));
    }

    PageQuery {
        query: StoreQuery::new(filter, order),
        after,
        before,
    }
}

/// Records strictly further than `key` when walking in `order`.
fn past(key: SortKey, order: Order) -> Filter {
    match order {
        Order::Ascending => Filter::KeyAbove(key),
        Order::Descending => Filter::KeyBelow(key),
    }
}

fn decode_bound(cursor: Option<&Cursor>, side: &'static str) -> Option<SortKey> {
    let cursor = cursor?;
    let key = cursor.decode();
    if key.is_none() {
        debug!(side, "{}; treating bound as absent", PaginationError::InvalidCursor);
    }
    key
}
