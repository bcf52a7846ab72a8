//! Client-held paginated collections.
//!
//! [`ClientCache`] owns the display-ready view: the feed (conversations with
//! their newest messages nested) and any per-conversation message lists
//! loaded independently ("fragments"). Reading a conversation's messages
//! through the feed prefers the fragment, so an update to the fragment is
//! visible from the feed without touching it.

use std::collections::HashMap;
use tracing::debug;

use crate::pagination::{Connection, Cursor, Edge, Order, PageInfo, PaginationError};
use crate::resolver::ConversationNode;
use crate::store::{compare_records, FieldValue, Record};
use crate::types::{Conversation, Message, SortKey};

/// Ordered edges plus the last known page info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCollection<T> {
    edges: Vec<Edge<T>>,
    page_info: PageInfo,
    order: Order,
}

impl<T: Record> CachedCollection<T> {
    pub fn new(order: Order) -> Self {
        Self {
            edges: Vec::new(),
            page_info: PageInfo::default(),
            order,
        }
    }

    pub fn from_connection(connection: Connection<T>, order: Order) -> Self {
        Self {
            edges: connection.edges,
            page_info: connection.page_info,
            order,
        }
    }

    pub fn edges(&self) -> &[Edge<T>] {
        &self.edges
    }

    pub fn page_info(&self) -> PageInfo {
        self.page_info
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.iter().any(|edge| edge.node.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.edges
            .iter()
            .map(|edge| &edge.node)
            .find(|node| node.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.edges
            .iter_mut()
            .map(|edge| &mut edge.node)
            .find(|node| node.id() == id)
    }

    fn position_for(&self, node: &T) -> usize {
        let order = self.order;
        self.edges.partition_point(|edge| {
            order.apply(compare_records(&edge.node, node)) != std::cmp::Ordering::Greater
        })
    }

    /// Splice `node` in at the position its sort key dictates. An empty
    /// collection gets a fresh `PageInfo` with both flags false.
    pub fn insert(&mut self, node: T) -> Result<usize, PaginationError> {
        if self.contains(node.id()) {
            return Err(PaginationError::DuplicateEvent {
                id: node.id().to_string(),
            });
        }
        if self.edges.is_empty() {
            self.page_info = PageInfo::default();
        }
        let position = self.position_for(&node);
        self.edges.insert(position, Edge::for_record(node));
        Ok(position)
    }

    /// Splice `edges` in by sort key, keeping their cursors and skipping
    /// nodes already present. Page info is left alone. Returns how many
    /// edges were added.
    pub fn absorb(&mut self, edges: Vec<Edge<T>>) -> usize {
        let mut added = 0;
        for edge in edges {
            if self.contains(edge.node.id()) {
                continue;
            }
            let position = self.position_for(&edge.node);
            self.edges.insert(position, edge);
            added += 1;
        }
        added
    }

    /// Add a further page, skipping nodes already present, and adopt its
    /// page info. Returns how many edges were added.
    pub fn append_page(&mut self, page: Connection<T>) -> usize {
        let added = self.absorb(page.edges);
        self.page_info = page.page_info;
        added
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let position = self.edges.iter().position(|edge| edge.node.id() == id)?;
        Some(self.edges.remove(position).node)
    }

    pub fn into_edges(self) -> Vec<Edge<T>> {
        self.edges
    }

    pub fn to_connection(&self) -> Connection<T> {
        Connection {
            edges: self.edges.clone(),
            page_info: self.page_info,
        }
    }
}

/// A feed row as the client holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub conversation: Conversation,
    pub messages: CachedCollection<Message>,
    /// Synthesized from a message for a conversation never loaded. Its sort
    /// key and cursor are not real and it is replaced once the conversation
    /// itself arrives.
    pub placeholder: bool,
}

impl FeedEntry {
    pub fn from_node(node: ConversationNode, message_order: Order) -> Self {
        Self {
            conversation: node.conversation,
            messages: CachedCollection::from_connection(node.messages, message_order),
            placeholder: false,
        }
    }

    pub fn from_conversation(conversation: Conversation, message_order: Order) -> Self {
        Self {
            conversation,
            messages: CachedCollection::new(message_order),
            placeholder: false,
        }
    }

    pub fn placeholder(conversation_id: &str, message: &Message, message_order: Order) -> Self {
        let messages = Connection {
            edges: vec![Edge::for_record(message.clone())],
            page_info: PageInfo::default(),
        };
        Self {
            conversation: Conversation::placeholder(conversation_id, &message.sender_id),
            messages: CachedCollection::from_connection(messages, message_order),
            placeholder: true,
        }
    }

    /// Take over messages merged into a placeholder for the same conversation.
    fn adopt(&mut self, placeholder: FeedEntry) -> usize {
        self.messages.absorb(placeholder.messages.into_edges())
    }
}

impl CachedCollection<FeedEntry> {
    /// Remove and return the entry for `conversation_id` if it is a placeholder.
    pub fn take_placeholder(&mut self, conversation_id: &str) -> Option<FeedEntry> {
        if self.get(conversation_id)?.placeholder {
            self.remove(conversation_id)
        } else {
            None
        }
    }

    /// Insert a loaded conversation, replacing its placeholder if one is held.
    pub fn insert_resolved(&mut self, mut entry: FeedEntry) -> Result<usize, PaginationError> {
        if let Some(placeholder) = self.take_placeholder(&entry.conversation.id) {
            let adopted = entry.adopt(placeholder);
            debug!(
                conversation_id = %entry.conversation.id,
                adopted,
                "replaced placeholder conversation"
            );
        }
        self.insert(entry)
    }
}

impl Record for FeedEntry {
    fn id(&self) -> &str {
        &self.conversation.id
    }

    fn sort_key(&self) -> SortKey {
        self.conversation.sort_key
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        self.conversation.field(name)
    }
}

/// Which collection a fetch writes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTarget {
    Feed,
    Conversation(String),
}

/// Issued when a fetch starts; later tokens supersede earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Replace the collection (first load or explicit refetch).
    Refresh,
    /// Append the next page.
    More,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { added: usize },
    /// A newer fetch for the same target already landed; result dropped.
    Stale,
}

#[derive(Debug, Clone)]
pub struct ClientCache {
    pub(crate) feed: Option<CachedCollection<FeedEntry>>,
    pub(crate) fragments: HashMap<String, CachedCollection<Message>>,
    feed_order: Order,
    message_order: Order,
    next_token: u64,
    applied: HashMap<CacheTarget, u64>,
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new(Order::Descending, Order::Descending)
    }
}

impl ClientCache {
    pub fn new(feed_order: Order, message_order: Order) -> Self {
        Self {
            feed: None,
            fragments: HashMap::new(),
            feed_order,
            message_order,
            next_token: 0,
            applied: HashMap::new(),
        }
    }

    pub fn feed_order(&self) -> Order {
        self.feed_order
    }

    pub fn message_order(&self) -> Order {
        self.message_order
    }

    pub fn begin_fetch(&mut self, target: &CacheTarget) -> FetchToken {
        self.next_token += 1;
        debug!(?target, token = self.next_token, "fetch started");
        FetchToken(self.next_token)
    }

    /// Record that `token` is about to be applied to `target`, or report
    /// that a newer fetch already was.
    fn accept(&mut self, target: CacheTarget, token: FetchToken) -> bool {
        let applied = self.applied.get(&target).copied().unwrap_or(0);
        if token.0 <= applied {
            debug!(
                ?target,
                "{}",
                PaginationError::StaleFetchResult {
                    token: token.0,
                    applied
                }
            );
            return false;
        }
        self.applied.insert(target, token.0);
        true
    }

    pub fn apply_feed_page(
        &mut self,
        token: FetchToken,
        mode: FetchMode,
        page: Connection<ConversationNode>,
    ) -> FetchOutcome {
        if !self.accept(CacheTarget::Feed, token) {
            return FetchOutcome::Stale;
        }
        let message_order = self.message_order;
        let mut page = page.map(|node| FeedEntry::from_node(node, message_order));
        if mode == FetchMode::More {
            if let Some(feed) = self.feed.as_mut() {
                for edge in page.edges.iter_mut() {
                    if let Some(placeholder) = feed.take_placeholder(&edge.node.conversation.id) {
                        edge.node.adopt(placeholder);
                    }
                }
                let added = feed.append_page(page);
                return FetchOutcome::Applied { added };
            }
        }
        let added = page.len();
        self.feed = Some(CachedCollection::from_connection(page, self.feed_order));
        FetchOutcome::Applied { added }
    }

    pub fn apply_messages_page(
        &mut self,
        conversation_id: &str,
        token: FetchToken,
        mode: FetchMode,
        page: Connection<Message>,
    ) -> FetchOutcome {
        let target = CacheTarget::Conversation(conversation_id.to_string());
        if !self.accept(target, token) {
            return FetchOutcome::Stale;
        }
        if mode == FetchMode::More {
            if let Some(fragment) = self.fragments.get_mut(conversation_id) {
                let added = fragment.append_page(page);
                return FetchOutcome::Applied { added };
            }
        }
        let added = page.len();
        self.fragments.insert(
            conversation_id.to_string(),
            CachedCollection::from_connection(page, self.message_order),
        );
        FetchOutcome::Applied { added }
    }

    /// Drop an independently cached conversation, e.g. when its screen
    /// closes. Its messages are folded into the feed's nested list first so
    /// nothing merged into the fragment is lost.
    pub fn evict_fragment(&mut self, conversation_id: &str) -> bool {
        let Some(fragment) = self.fragments.remove(conversation_id) else {
            return false;
        };
        if let Some(entry) = self
            .feed
            .as_mut()
            .and_then(|feed| feed.get_mut(conversation_id))
        {
            let folded = entry.messages.absorb(fragment.into_edges());
            debug!(conversation_id, folded, "evicted fragment into feed");
        }
        true
    }

    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    pub fn has_fragment(&self, conversation_id: &str) -> bool {
        self.fragments.contains_key(conversation_id)
    }

    pub fn feed_page_info(&self) -> Option<PageInfo> {
        self.feed.as_ref().map(CachedCollection::page_info)
    }

    /// Cursor for the next feed page, if the server reported one.
    /// Placeholder rows carry no real cursor and are skipped.
    pub fn next_feed_cursor(&self) -> Option<Cursor> {
        let feed = self.feed.as_ref()?;
        if !feed.page_info().has_next_page {
            return None;
        }
        feed.edges()
            .iter()
            .rev()
            .find(|edge| !edge.node.placeholder)
            .map(|edge| edge.cursor.clone())
    }

    /// The feed as a connection, each conversation's messages read from its
    /// fragment when one is cached.
    pub fn feed_view(&self) -> Option<Connection<ConversationNode>> {
        let feed = self.feed.as_ref()?;
        let edges = feed
            .edges()
            .iter()
            .map(|edge| {
                let entry = &edge.node;
                let messages = self
                    .fragments
                    .get(&entry.conversation.id)
                    .unwrap_or(&entry.messages);
                Edge {
                    node: ConversationNode {
                        conversation: entry.conversation.clone(),
                        messages: messages.to_connection(),
                    },
                    cursor: edge.cursor.clone(),
                }
            })
            .collect();
        Some(Connection {
            edges,
            page_info: feed.page_info(),
        })
    }

    /// A conversation's messages: the fragment if cached, else the list
    /// nested in the feed.
    pub fn messages_view(&self, conversation_id: &str) -> Option<Connection<Message>> {
        if let Some(fragment) = self.fragments.get(conversation_id) {
            return Some(fragment.to_connection());
        }
        self.feed
            .as_ref()?
            .get(conversation_id)
            .map(|entry| entry.messages.to_connection())
    }
}
