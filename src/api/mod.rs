/// HTTP API for the conversation feed
///
/// This module provides:
/// - paginated connection endpoints scoped to the viewer
/// - create mutations that publish creation events
/// - a server-sent event stream of those events

pub mod handlers;
pub mod models;
pub mod server;

pub use handlers::AppState;
pub use models::{DataResponse, ErrorResponse, PageArgs};
pub use server::{ApiConfig, ApiServer};
