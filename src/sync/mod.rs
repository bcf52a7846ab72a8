//! Client-side live feed synchronization.

pub mod cache;
pub mod merge;
pub mod queue;

pub use cache::{
    CacheTarget, CachedCollection, ClientCache, FeedEntry, FetchMode, FetchOutcome, FetchToken,
};
pub use merge::MergeOutcome;
pub use queue::{bridge_events, spawn, SyncHandle};
