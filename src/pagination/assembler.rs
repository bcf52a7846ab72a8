//! Page assembler: runs a bounded query with a look-ahead sentinel and turns
//! the rows into a [`Connection`].

use anyhow::Result;
use tracing::trace;

use super::connection::{Connection, Edge, PageInfo};
use super::query::{build_page_query, PageQuery};
use super::request::{Direction, PageRequest};
use crate::config::PaginationConfig;
use crate::store::{Filter, Record, RecordStore};

/// Fetch one window of `query`.
///
/// Forward windows read along the query order; backward windows read the
/// opposite way and are flipped back, so edges always follow
/// `query.order()`. One extra row is requested to learn whether more
/// records lie beyond the window. The flag for the other side only reports
/// whether the caller supplied a bound there: it is not re-queried and can
/// go stale if earlier records were deleted since the cursor was issued.
pub async fn assemble<R, S>(
    store: &S,
    query: &PageQuery,
    direction: Direction,
    window: usize,
) -> Result<Connection<R>>
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    if query.is_empty() {
        return Ok(Connection::empty());
    }

    let limit = window.saturating_add(1);
    let mut records = match direction {
        Direction::Forward => store.find(&query.query, limit).await?,
        Direction::Backward => store.find(&query.query.reversed(), limit).await?,
    };

    let has_more = records.len() > window;
    records.truncate(window);

    let page_info = match direction {
        Direction::Forward => PageInfo {
            has_next_page: has_more,
            has_previous_page: query.after.is_some(),
        },
        Direction::Backward => {
            records.reverse();
            PageInfo {
                has_next_page: query.before.is_some(),
                has_previous_page: has_more,
            }
        }
    };

    trace!(
        edges = records.len(),
        has_next = page_info.has_next_page,
        has_previous = page_info.has_previous_page,
        "assembled page"
    );

    Ok(Connection {
        edges: records.into_iter().map(Edge::for_record).collect(),
        page_info,
    })
}

/// The whole engine: `(base filter, request) -> Connection`.
///
/// Every relationship (feed, conversation messages, mates) goes through
/// here and only contributes its base filter.
pub async fn paginate<R, S>(
    store: &S,
    base: Filter,
    request: &PageRequest,
    limits: &PaginationConfig,
) -> Result<Connection<R>>
where
    R: Record,
    S: RecordStore<R> + ?Sized,
{
    let (direction, window) = request.window(limits.default_page_size, limits.max_page_size);
    let query = build_page_query(
        base,
        request.before.as_ref(),
        request.after.as_ref(),
        request.order,
    );
    assemble(store, &query, direction, window).await
}
