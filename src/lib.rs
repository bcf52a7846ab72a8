pub mod config;
pub mod events;
pub mod pagination;
pub mod persistence;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod test_utils;
pub mod types;

#[cfg(feature = "api")]
pub mod api;
