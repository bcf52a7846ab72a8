//! In-memory record store, kept sorted by sort key.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{compare_records, Filter, Record, RecordStore, StoreQuery};
use crate::pagination::Order;
use crate::types::{Conversation, Message, User};

pub struct MemoryStore<R> {
    records: RwLock<Vec<R>>,
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let mut records: Vec<R> = records.into_iter().collect();
        records.sort_by(compare_records);
        records.dedup_by(|a, b| a.id() == b.id());
        Self {
            records: RwLock::new(records),
        }
    }

    /// Insert or replace (by id) a record, keeping the collection sorted.
    pub async fn insert(&self, record: R) {
        let mut records = self.records.write().await;
        records.retain(|existing| existing.id() != record.id());
        let pos = records
            .binary_search_by(|probe| compare_records(probe, &record))
            .unwrap_or_else(|pos| pos);
        records.insert(pos, record);
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|existing| existing.id() != id);
        records.len() != before
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn find(&self, query: &StoreQuery, limit: usize) -> Result<Vec<R>> {
        if limit == 0 || query.filter.is_nothing() {
            return Ok(Vec::new());
        }
        let records = self.records.read().await;
        let matching = records.iter().filter(|r| query.filter.matches(*r));
        let out = match query.order {
            Order::Ascending => matching.take(limit).cloned().collect(),
            Order::Descending => matching.rev().take(limit).cloned().collect(),
        };
        Ok(out)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| filter.matches(*r)).count() as u64)
    }
}

/// Users, conversations and messages held in memory; the store the
/// resolvers run against when no database is configured.
#[derive(Default)]
pub struct MemoryDatabase {
    pub users: MemoryStore<User>,
    pub conversations: MemoryStore<Conversation>,
    pub messages: MemoryStore<Message>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

macro_rules! delegate_store {
    ($record:ty, $field:ident) => {
        #[async_trait]
        impl RecordStore<$record> for MemoryDatabase {
            async fn find(&self, query: &StoreQuery, limit: usize) -> Result<Vec<$record>> {
                self.$field.find(query, limit).await
            }

            async fn count(&self, filter: &Filter) -> Result<u64> {
                self.$field.count(filter).await
            }
        }
    };
}

delegate_store!(User, users);
delegate_store!(Conversation, conversations);
delegate_store!(Message, messages);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SortKey;
    use chrono::Utc;

    fn msg(id: &str, key: i64) -> Message {
        Message {
            id: id.to_string(),
            sort_key: SortKey(key),
            conversation_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            content: format!("body {}", id),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn find_respects_direction_and_limit() {
        let store = MemoryStore::with_records(vec![msg("b", 2), msg("a", 1), msg("c", 3)]);

        let asc = store
            .find(&StoreQuery::new(Filter::All, Order::Ascending), 2)
            .await
            .unwrap();
        assert_eq!(asc.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);

        let desc = store
            .find(&StoreQuery::new(Filter::All, Order::Descending), 2)
            .await
            .unwrap();
        assert_eq!(desc.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["c", "b"]);
    }

    #[tokio::test]
    async fn insert_replaces_by_id() {
        let store = MemoryStore::new();
        store.insert(msg("a", 1)).await;
        store.insert(msg("a", 5)).await;
        store.insert(msg("b", 2)).await;
        assert_eq!(store.len().await, 2);

        let all = store
            .find(&StoreQuery::new(Filter::All, Order::Ascending), 10)
            .await
            .unwrap();
        assert_eq!(all[0].id, "b");
        assert_eq!(all[1].sort_key, SortKey(5));
    }

    #[tokio::test]
    async fn nothing_filter_short_circuits() {
        let store = MemoryStore::with_records(vec![msg("a", 1)]);
        let none = store
            .find(&StoreQuery::new(Filter::Nothing, Order::Ascending), 10)
            .await
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(store.count(&Filter::eq("senderId", "u1")).await.unwrap(), 1);
    }
}
