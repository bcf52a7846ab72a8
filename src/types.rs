use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::{FieldValue, Record};

/// Monotonic ordering key shared by every record collection.
///
/// Keys come from a per-table insertion sequence, so ordering by key matches
/// insertion order. Ties between records with the same key are broken by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(pub i64);

impl SortKey {
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SortKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(SortKey)
    }
}

impl From<i64> for SortKey {
    fn from(value: i64) -> Self {
        SortKey(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub sort_key: SortKey,
    pub username: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub sort_key: SortKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub recipients: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Stand-in for a conversation known only by id, built when a message
    /// arrives for a conversation the client has never loaded. Its real sort
    /// key is unknown, so it takes the largest one and orders as the newest.
    pub fn placeholder(id: impl Into<String>, sender_id: &str) -> Self {
        Self {
            id: id.into(),
            sort_key: SortKey(i64::MAX),
            title: None,
            recipients: vec![sender_id.to_string()],
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sort_key: SortKey,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Record for User {
    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "id" => Some(FieldValue::Text(&self.id)),
            "username" => Some(FieldValue::Text(&self.username)),
            "name" => Some(FieldValue::Text(&self.name)),
            "email" => self.email.as_deref().map(FieldValue::Text),
            _ => None,
        }
    }
}

impl Record for Conversation {
    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "id" => Some(FieldValue::Text(&self.id)),
            "title" => self.title.as_deref().map(FieldValue::Text),
            "recipients" => Some(FieldValue::List(&self.recipients)),
            _ => None,
        }
    }
}

impl Record for Message {
    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "id" => Some(FieldValue::Text(&self.id)),
            "conversationId" => Some(FieldValue::Text(&self.conversation_id)),
            "senderId" => Some(FieldValue::Text(&self.sender_id)),
            "content" => Some(FieldValue::Text(&self.content)),
            _ => None,
        }
    }
}
