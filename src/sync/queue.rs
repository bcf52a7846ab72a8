//! Single-writer task that owns the [`ClientCache`].
//!
//! Fetch results and pushed events race each other. Funnelling both through
//! one queue means every mutation is applied in arrival order against a
//! consistent cache, with no locks held across awaits.

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{CacheTarget, ClientCache, FetchMode, FetchOutcome, FetchToken};
use super::merge::MergeOutcome;
use crate::events::{CreationEvent, Published};
use crate::pagination::Connection;
use crate::resolver::ConversationNode;
use crate::types::Message;

type ReadFn = Box<dyn FnOnce(&ClientCache) + Send>;

enum CacheCommand {
    BeginFetch {
        target: CacheTarget,
        reply: oneshot::Sender<FetchToken>,
    },
    FeedLoaded {
        token: FetchToken,
        mode: FetchMode,
        page: Connection<ConversationNode>,
        reply: oneshot::Sender<FetchOutcome>,
    },
    MessagesLoaded {
        conversation_id: String,
        token: FetchToken,
        mode: FetchMode,
        page: Connection<Message>,
        reply: oneshot::Sender<FetchOutcome>,
    },
    Event {
        event: CreationEvent,
        reply: Option<oneshot::Sender<MergeOutcome>>,
    },
    EvictFragment {
        conversation_id: String,
        reply: oneshot::Sender<bool>,
    },
    Read(ReadFn),
}

/// Cloneable handle for submitting work to the cache task.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<CacheCommand>,
}

impl SyncHandle {
    pub async fn begin_fetch(&self, target: CacheTarget) -> Result<FetchToken> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::BeginFetch { target, reply }).await?;
        rx.await.map_err(|_| closed())
    }

    pub async fn feed_loaded(
        &self,
        token: FetchToken,
        mode: FetchMode,
        page: Connection<ConversationNode>,
    ) -> Result<FetchOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::FeedLoaded {
            token,
            mode,
            page,
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed())
    }

    pub async fn messages_loaded(
        &self,
        conversation_id: impl Into<String>,
        token: FetchToken,
        mode: FetchMode,
        page: Connection<Message>,
    ) -> Result<FetchOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::MessagesLoaded {
            conversation_id: conversation_id.into(),
            token,
            mode,
            page,
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed())
    }

    /// Queue an event and wait for the merge result.
    pub async fn apply_event(&self, event: CreationEvent) -> Result<MergeOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::Event {
            event,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| closed())
    }

    /// Queue an event without waiting for it to be merged.
    pub async fn push_event(&self, event: CreationEvent) -> Result<()> {
        self.send(CacheCommand::Event { event, reply: None }).await
    }

    /// Drop a conversation's fragment, keeping its messages in the feed.
    pub async fn evict_fragment(&self, conversation_id: impl Into<String>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::EvictFragment {
            conversation_id: conversation_id.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed())
    }

    /// Run `f` against the cache once every previously queued command has
    /// been applied.
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ClientCache) -> T + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::Read(Box::new(move |cache| {
            let _ = reply.send(f(cache));
        })))
        .await?;
        rx.await.map_err(|_| closed())
    }

    async fn send(&self, command: CacheCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| closed())
    }
}

fn closed() -> anyhow::Error {
    anyhow!("cache task has stopped")
}

/// Start the cache task. It runs until every [`SyncHandle`] is dropped and
/// then hands the final cache back through the join handle.
pub fn spawn(cache: ClientCache, capacity: usize) -> (SyncHandle, JoinHandle<ClientCache>) {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(async move {
        let mut cache = cache;
        while let Some(command) = rx.recv().await {
            match command {
                CacheCommand::BeginFetch { target, reply } => {
                    let _ = reply.send(cache.begin_fetch(&target));
                }
                CacheCommand::FeedLoaded {
                    token,
                    mode,
                    page,
                    reply,
                } => {
                    let _ = reply.send(cache.apply_feed_page(token, mode, page));
                }
                CacheCommand::MessagesLoaded {
                    conversation_id,
                    token,
                    mode,
                    page,
                    reply,
                } => {
                    let outcome = cache.apply_messages_page(&conversation_id, token, mode, page);
                    let _ = reply.send(outcome);
                }
                CacheCommand::Event { event, reply } => {
                    let outcome = cache.apply_event(&event);
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                CacheCommand::EvictFragment {
                    conversation_id,
                    reply,
                } => {
                    let _ = reply.send(cache.evict_fragment(&conversation_id));
                }
                CacheCommand::Read(f) => f(&cache),
            }
        }
        debug!("cache task stopped");
        cache
    });
    (SyncHandle { tx }, task)
}

/// Forward bus events visible to `viewer_id` into the cache queue.
///
/// Ends when the bus closes or the cache task stops. A lagging receiver
/// skips the missed events; the next fetch covers them.
pub fn bridge_events(
    mut events: broadcast::Receiver<Published>,
    viewer_id: impl Into<String>,
    handle: SyncHandle,
) -> JoinHandle<()> {
    let viewer_id = viewer_id.into();
    tokio::spawn(async move {
        info!(viewer_id = %viewer_id, "event bridge started");
        loop {
            match events.recv().await {
                Ok(published) => {
                    if !published.is_visible_to(&viewer_id) {
                        continue;
                    }
                    if handle.push_event(published.event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bridge lagged; refetch to recover");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(viewer_id = %viewer_id, "event bridge stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::pagination::{Edge, PageInfo};
    use crate::types::{Conversation, SortKey};
    use chrono::Utc;

    fn conversation(id: &str, key: i64) -> Conversation {
        Conversation {
            id: id.to_string(),
            sort_key: SortKey(key),
            title: Some(id.to_uppercase()),
            recipients: vec!["alice".to_string(), "bob".to_string()],
            created_at: Utc::now(),
        }
    }

    fn feed_page(conversations: Vec<Conversation>) -> Connection<ConversationNode> {
        Connection {
            edges: conversations
                .into_iter()
                .map(|conversation| {
                    let cursor = crate::pagination::Cursor::encode(conversation.sort_key);
                    Edge {
                        node: ConversationNode {
                            conversation,
                            messages: Connection::empty(),
                        },
                        cursor,
                    }
                })
                .collect(),
            page_info: PageInfo::default(),
        }
    }

    #[tokio::test]
    async fn commands_apply_in_arrival_order() {
        let (handle, task) = spawn(ClientCache::default(), 8);

        let token = handle.begin_fetch(CacheTarget::Feed).await.unwrap();
        handle
            .push_event(CreationEvent::conversation_created(conversation("c2", 2)))
            .await
            .unwrap();
        let outcome = handle
            .feed_loaded(token, FetchMode::Refresh, feed_page(vec![conversation("c1", 1)]))
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Applied { added: 1 });

        // The event arrived before any feed was cached, so only c1 is present.
        let ids = handle
            .read(|cache| {
                cache
                    .feed_view()
                    .map(|feed| feed.nodes().map(|n| n.conversation.id.clone()).collect::<Vec<_>>())
            })
            .await
            .unwrap();
        assert_eq!(ids, Some(vec!["c1".to_string()]));

        let merged = handle
            .apply_event(CreationEvent::conversation_created(conversation("c2", 2)))
            .await
            .unwrap();
        assert_eq!(merged, MergeOutcome::Synthesized { position: 0 });

        drop(handle);
        let cache = task.await.unwrap();
        assert_eq!(cache.feed_view().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bridge_filters_by_audience() {
        let bus = EventBus::new(16);
        let mut cache = ClientCache::default();
        let token = cache.begin_fetch(&CacheTarget::Feed);
        cache.apply_feed_page(token, FetchMode::Refresh, feed_page(vec![]));

        let (handle, task) = spawn(cache, 8);
        let bridge = bridge_events(bus.subscribe(), "alice", handle.clone());

        bus.publish(
            vec!["carol".into()],
            CreationEvent::conversation_created(conversation("hidden", 5)),
        );
        bus.publish(
            vec!["alice".into(), "bob".into()],
            CreationEvent::conversation_created(conversation("shared", 6)),
        );
        drop(bus);
        bridge.await.unwrap();

        let ids = handle
            .read(|cache| {
                cache
                    .feed_view()
                    .map(|feed| feed.nodes().map(|n| n.conversation.id.clone()).collect::<Vec<_>>())
                    .unwrap_or_default()
            })
            .await
            .unwrap();
        assert_eq!(ids, vec!["shared".to_string()]);

        drop(handle);
        task.await.unwrap();
    }
}
