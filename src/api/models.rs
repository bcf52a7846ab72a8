/// API request and response models
use serde::{Deserialize, Serialize};

use crate::pagination::{Cursor, Order, PageRequest};

/// Envelope for every query response. `data` is `null` when the viewer is
/// not authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: Option<T>,
}

impl<T> DataResponse<T> {
    pub fn new(data: Option<T>) -> Self {
        Self { data }
    }
}

/// Pagination arguments accepted on every connection endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageArgs {
    pub first: Option<usize>,
    pub last: Option<usize>,
    pub before: Option<String>,
    pub after: Option<String>,
    /// `1` ascending, `-1` descending
    pub order: Option<i64>,
    /// Size of the message page nested in each feed entry
    pub messages_first: Option<usize>,
}

impl PageArgs {
    pub fn to_request(&self) -> Result<PageRequest, String> {
        let order = match self.order {
            Some(raw) => Order::try_from(raw)?,
            None => Order::default(),
        };
        Ok(PageRequest {
            first: self.first,
            last: self.last,
            before: self.before.clone().map(Cursor::from_token),
            after: self.after.clone().map(Cursor::from_token),
            order,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub recipients: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    pub content: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Open subscription streams
    pub subscribers: usize,
}
