//! Connection resolvers, one per relationship.
//!
//! Each resolver contributes a base filter and hands the request to the
//! shared pagination engine. All of them require an authenticated viewer;
//! without one they resolve to `None` so sibling fields stay resolvable.

use anyhow::Result;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::PaginationConfig;
use crate::pagination::{paginate, Connection, Edge, Order, PageRequest, PaginationError};
use crate::store::{Filter, RecordStore};
use crate::types::{Conversation, Message, User};

/// The identity a request runs as. Authentication happens upstream; this
/// only carries its outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    user_id: Option<String>,
}

impl Viewer {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn identity(&self) -> Result<&str, PaginationError> {
        self.user_id().ok_or(PaginationError::Unauthorized)
    }
}

/// A feed entry: the conversation plus its newest messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationNode {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Connection<Message>,
}

pub struct Resolvers<S> {
    store: Arc<S>,
    limits: PaginationConfig,
}

impl<S> Clone for Resolvers<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            limits: self.limits.clone(),
        }
    }
}

impl<S> Resolvers<S>
where
    S: RecordStore<Conversation> + RecordStore<Message> + RecordStore<User> + 'static,
{
    pub fn new(store: Arc<S>, limits: PaginationConfig) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn limits(&self) -> &PaginationConfig {
        &self.limits
    }

    /// Conversations the viewer takes part in.
    pub async fn feed(
        &self,
        viewer: &Viewer,
        request: &PageRequest,
    ) -> Result<Option<Connection<Conversation>>> {
        let Some(user_id) = authorize(viewer, "feed") else {
            return Ok(None);
        };
        let base = Filter::contains("recipients", user_id);
        let page: Connection<Conversation> =
            paginate(self.store.as_ref(), base, request, &self.limits).await?;
        debug!(user_id, edges = page.len(), "resolved feed");
        Ok(Some(page))
    }

    /// The feed with each conversation's newest messages embedded, the
    /// shape a conversation list screen caches.
    pub async fn feed_with_messages(
        &self,
        viewer: &Viewer,
        request: &PageRequest,
        messages_first: Option<usize>,
    ) -> Result<Option<Connection<ConversationNode>>> {
        let Some(feed) = self.feed(viewer, request).await? else {
            return Ok(None);
        };

        let nested = PageRequest::first(messages_first.unwrap_or(self.limits.nested_page_size))
            .with_order(Order::Descending);
        let Connection { edges, page_info } = feed;
        let nodes = try_join_all(edges.into_iter().map(|edge| {
            let nested = &nested;
            async move {
                let messages = self.conversation_messages(&edge.node.id, nested).await?;
                Ok::<_, anyhow::Error>(Edge {
                    node: ConversationNode {
                        conversation: edge.node,
                        messages,
                    },
                    cursor: edge.cursor,
                })
            }
        }))
        .await?;

        Ok(Some(Connection {
            edges: nodes,
            page_info,
        }))
    }

    /// Messages of one conversation.
    pub async fn messages(
        &self,
        viewer: &Viewer,
        conversation_id: &str,
        request: &PageRequest,
    ) -> Result<Option<Connection<Message>>> {
        if authorize(viewer, "messages").is_none() {
            return Ok(None);
        }
        Ok(Some(self.conversation_messages(conversation_id, request).await?))
    }

    /// Every user except the viewer.
    pub async fn mates(
        &self,
        viewer: &Viewer,
        request: &PageRequest,
    ) -> Result<Option<Connection<User>>> {
        let Some(user_id) = authorize(viewer, "mates") else {
            return Ok(None);
        };
        let base = Filter::ne("id", user_id);
        let page: Connection<User> =
            paginate(self.store.as_ref(), base, request, &self.limits).await?;
        Ok(Some(page))
    }

    /// Number of messages the viewer has sent.
    pub async fn message_count(&self, viewer: &Viewer) -> Result<Option<u64>> {
        let Some(user_id) = authorize(viewer, "messageCount") else {
            return Ok(None);
        };
        let filter = Filter::eq("senderId", user_id);
        let count = <S as RecordStore<Message>>::count(self.store.as_ref(), &filter).await?;
        Ok(Some(count))
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
        request: &PageRequest,
    ) -> Result<Connection<Message>> {
        let base = Filter::eq("conversationId", conversation_id);
        paginate(self.store.as_ref(), base, request, &self.limits).await
    }
}

fn authorize<'a>(viewer: &'a Viewer, collection: &'static str) -> Option<&'a str> {
    match viewer.identity() {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            warn!(collection, "{}; resolving to null", e);
            None
        }
    }
}
