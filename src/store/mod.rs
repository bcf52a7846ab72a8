//! Record store abstraction consumed by the pagination engine.
//!
//! A store only has to answer one question: "find up to N records matching a
//! filter, ordered by sort key in a given direction". Range bounds on the
//! sort key travel inside the [`Filter`] tree so that every backend sees a
//! single predicate.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;

use crate::pagination::Order;
use crate::types::SortKey;

pub use memory::{MemoryDatabase, MemoryStore};

/// Borrowed view of a record field, used to evaluate filters in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    List(&'a [String]),
}

/// An orderable entity held by a store.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn sort_key(&self) -> SortKey;

    /// Field lookup by its wire name (`conversationId`, `recipients`, ...).
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

/// Total order over records: sort key first, id breaks ties.
pub fn compare_records<R: Record>(a: &R, b: &R) -> Ordering {
    a.sort_key()
        .cmp(&b.sort_key())
        .then_with(|| a.id().cmp(b.id()))
}

/// Predicate tree understood by every [`RecordStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Matches every record.
    All,
    /// Matches no record.
    Nothing,
    Eq { field: String, value: String },
    /// Also matches records that lack the field.
    Ne { field: String, value: String },
    /// List membership; on a text field this is plain equality.
    Contains { field: String, value: String },
    /// `sortKey > key`
    KeyAbove(SortKey),
    /// `sortKey < key`
    KeyBelow(SortKey),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjunction that keeps the tree flat. `All` is the identity and
    /// `Nothing` absorbs everything.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Nothing, _) | (_, Filter::Nothing) => Filter::Nothing,
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, Filter::And(mut right)) => {
                right.insert(0, f);
                Filter::And(right)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    pub fn is_nothing(&self) -> bool {
        match self {
            Filter::Nothing => true,
            Filter::And(parts) => parts.iter().any(Filter::is_nothing),
            _ => false,
        }
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        match self {
            Filter::All => true,
            Filter::Nothing => false,
            Filter::Eq { field, value } => {
                matches!(record.field(field), Some(FieldValue::Text(v)) if v == value)
            }
            Filter::Ne { field, value } => {
                !matches!(record.field(field), Some(FieldValue::Text(v)) if v == value)
            }
            Filter::Contains { field, value } => match record.field(field) {
                Some(FieldValue::List(items)) => items.iter().any(|item| item == value),
                Some(FieldValue::Text(v)) => v == value,
                None => false,
            },
            Filter::KeyAbove(key) => record.sort_key() > *key,
            Filter::KeyBelow(key) => record.sort_key() < *key,
            Filter::And(parts) => parts.iter().all(|part| part.matches(record)),
        }
    }
}

/// A bounded, ordered store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreQuery {
    pub filter: Filter,
    pub order: Order,
}

impl StoreQuery {
    pub fn new(filter: Filter, order: Order) -> Self {
        Self { filter, order }
    }

    /// Same predicate, opposite scan direction.
    pub fn reversed(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order: self.order.reverse(),
        }
    }
}

/// Ordered record lookup. Implementations may block on I/O; callers hold no
/// other resources while awaiting.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Up to `limit` records matching `query.filter`, sorted by sort key in
    /// `query.order` (ties broken by id in the same direction).
    async fn find(&self, query: &StoreQuery, limit: usize) -> Result<Vec<R>>;

    async fn count(&self, filter: &Filter) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Conversation;
    use chrono::Utc;

    fn convo(id: &str, key: i64, recipients: &[&str]) -> Conversation {
        Conversation {
            id: id.to_string(),
            sort_key: SortKey(key),
            title: None,
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn and_flattens_and_absorbs() {
        let f = Filter::All.and(Filter::eq("id", "a"));
        assert_eq!(f, Filter::eq("id", "a"));

        let f = f.and(Filter::KeyAbove(SortKey(1))).and(Filter::KeyBelow(SortKey(9)));
        match &f {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected conjunction, got {:?}", other),
        }

        assert_eq!(f.and(Filter::Nothing), Filter::Nothing);
    }

    #[test]
    fn membership_and_range_predicates() {
        let c = convo("c1", 5, &["alice", "bob"]);
        assert!(Filter::contains("recipients", "bob").matches(&c));
        assert!(!Filter::contains("recipients", "carol").matches(&c));
        assert!(Filter::KeyAbove(SortKey(4)).matches(&c));
        assert!(!Filter::KeyBelow(SortKey(5)).matches(&c));
        assert!(Filter::ne("title", "x").matches(&c));
        assert!(!Filter::Nothing.matches(&c));
    }

    #[test]
    fn records_tie_break_on_id() {
        let a = convo("a", 3, &[]);
        let b = convo("b", 3, &[]);
        assert_eq!(compare_records(&a, &b), Ordering::Less);
    }
}
