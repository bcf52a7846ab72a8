//! Cursor-based pagination engine.
//!
//! Requests flow through three stages: the cursor codec turns opaque tokens
//! back into sort keys, the query builder turns those bounds plus a base
//! filter into a bounded store query, and the assembler executes it and
//! produces a [`Connection`].

pub mod assembler;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod query;
pub mod request;

pub use assembler::{assemble, paginate};
pub use connection::{Connection, Edge, PageInfo};
pub use cursor::Cursor;
pub use error::PaginationError;
pub use query::{build_page_query, PageQuery};
pub use request::{Direction, Order, PageRequest};
