use thiserror::Error;

/// Conditions the pagination and cache layers resolve locally.
///
/// None of these reach the end user as a failure: each one degrades to an
/// absent bound, an empty page, a null result, a dropped response or a
/// no-op. They exist as values so that callers can log and test them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("cursor token could not be decoded")]
    InvalidCursor,
    #[error("before/after bounds leave an empty window")]
    ContradictoryBounds,
    #[error("no authenticated viewer for a protected collection")]
    Unauthorized,
    #[error("fetch result {token} superseded by fetch {applied}")]
    StaleFetchResult { token: u64, applied: u64 },
    #[error("record {id} is already cached")]
    DuplicateEvent { id: String },
}
