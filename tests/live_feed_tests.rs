use mate_feed::config::PaginationConfig;
use mate_feed::events::{CreationEvent, EventBus};
use mate_feed::pagination::{Connection, PageRequest};
use mate_feed::resolver::{Resolvers, Viewer};
use mate_feed::store::MemoryDatabase;
use mate_feed::sync::{
    bridge_events, spawn, CacheTarget, ClientCache, FetchMode, FetchOutcome, MergeOutcome,
    SyncHandle,
};
use mate_feed::test_utils::{conversation, message, seeded_memory_db};
use mate_feed::types::Message;
use std::sync::Arc;

struct Harness {
    db: Arc<MemoryDatabase>,
    resolvers: Resolvers<MemoryDatabase>,
    viewer: Viewer,
    handle: SyncHandle,
}

impl Harness {
    async fn new(messages: i64) -> Self {
        let db = Arc::new(seeded_memory_db(messages).await);
        let limits = PaginationConfig {
            nested_page_size: 5,
            ..PaginationConfig::default()
        };
        let resolvers = Resolvers::new(Arc::clone(&db), limits);
        let (handle, _task) = spawn(ClientCache::default(), 32);
        Self {
            db,
            resolvers,
            viewer: Viewer::authenticated("alice"),
            handle,
        }
    }

    async fn load_feed(&self, mode: FetchMode) -> FetchOutcome {
        let token = self.handle.begin_fetch(CacheTarget::Feed).await.unwrap();
        let page = self
            .resolvers
            .feed_with_messages(&self.viewer, &PageRequest::first(10), None)
            .await
            .unwrap()
            .unwrap();
        self.handle.feed_loaded(token, mode, page).await.unwrap()
    }

    async fn load_conversation(&self, conversation_id: &str, request: PageRequest) -> FetchOutcome {
        let target = CacheTarget::Conversation(conversation_id.to_string());
        let token = self.handle.begin_fetch(target).await.unwrap();
        let page = self
            .resolvers
            .messages(&self.viewer, conversation_id, &request)
            .await
            .unwrap()
            .unwrap();
        self.handle
            .messages_loaded(conversation_id, token, FetchMode::Refresh, page)
            .await
            .unwrap()
    }

    /// Store the message server-side and return the event announcing it.
    async fn send(&self, id: &str, key: i64, conversation_id: &str) -> CreationEvent {
        let m = message(id, key, conversation_id, "bob");
        self.db.messages.insert(m.clone()).await;
        CreationEvent::message_created(m)
    }

    async fn cached_messages(&self, conversation_id: &str) -> Option<Connection<Message>> {
        let id = conversation_id.to_string();
        self.handle
            .read(move |cache| cache.messages_view(&id))
            .await
            .unwrap()
    }

    async fn server_messages(&self, conversation_id: &str, first: usize) -> Connection<Message> {
        self.resolvers
            .messages(&self.viewer, conversation_id, &PageRequest::first(first))
            .await
            .unwrap()
            .unwrap()
    }
}

fn ids(page: &Connection<Message>) -> Vec<String> {
    page.nodes().map(|m| m.id.clone()).collect()
}

#[tokio::test]
async fn live_message_lands_where_a_refetch_would_put_it() {
    let h = Harness::new(8).await;
    h.load_feed(FetchMode::Refresh).await;

    let event = h.send("m9", 9, "c1").await;
    assert_eq!(
        h.handle.apply_event(event).await.unwrap(),
        MergeOutcome::Nested { position: 0 }
    );

    let cached = h.cached_messages("c1").await.unwrap();
    let fresh = h.server_messages("c1", 6).await;
    assert_eq!(ids(&cached), ids(&fresh));
    assert_eq!(cached.edges[0].cursor, fresh.edges[0].cursor);
}

#[tokio::test]
async fn fragment_and_feed_stay_in_step() {
    let h = Harness::new(8).await;
    h.load_feed(FetchMode::Refresh).await;
    h.load_conversation("c1", PageRequest::first(8)).await;

    let event = h.send("m9", 9, "c1").await;
    assert_eq!(
        h.handle.apply_event(event).await.unwrap(),
        MergeOutcome::Fragment { position: 0 }
    );

    let nested = h
        .handle
        .read(|cache| {
            cache
                .feed_view()
                .and_then(|feed| feed.edges.into_iter().next())
                .map(|edge| edge.node.messages)
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ids(&nested), ids(&h.server_messages("c1", 9).await));
}

#[tokio::test]
async fn closing_a_conversation_keeps_its_live_messages() {
    let h = Harness::new(8).await;
    h.load_feed(FetchMode::Refresh).await;
    h.load_conversation("c1", PageRequest::first(8)).await;

    let event = h.send("m9", 9, "c1").await;
    h.handle.apply_event(event).await.unwrap();
    assert!(h.handle.evict_fragment("c1").await.unwrap());

    let cached = h.cached_messages("c1").await.unwrap();
    assert_eq!(ids(&cached), ids(&h.server_messages("c1", 9).await));
    assert!(!h.handle.evict_fragment("c1").await.unwrap());
}

#[tokio::test]
async fn replayed_event_after_refetch_is_a_no_op() {
    let h = Harness::new(3).await;
    h.load_feed(FetchMode::Refresh).await;

    // The message is committed and a refetch lands before its event does.
    let event = h.send("m4", 4, "c1").await;
    h.load_feed(FetchMode::Refresh).await;
    let before = h.cached_messages("c1").await;

    assert_eq!(
        h.handle.apply_event(event.clone()).await.unwrap(),
        MergeOutcome::Duplicate
    );
    assert_eq!(h.handle.apply_event(event).await.unwrap(), MergeOutcome::Duplicate);
    assert_eq!(h.cached_messages("c1").await, before);
}

#[tokio::test]
async fn slow_fetch_does_not_overwrite_newer_state() {
    let h = Harness::new(4).await;

    let slow = h.handle.begin_fetch(CacheTarget::Feed).await.unwrap();
    let slow_page = h
        .resolvers
        .feed_with_messages(&h.viewer, &PageRequest::first(10), None)
        .await
        .unwrap()
        .unwrap();

    let event = h.send("m5", 5, "c1").await;
    assert_eq!(h.load_feed(FetchMode::Refresh).await, FetchOutcome::Applied { added: 1 });
    h.handle.apply_event(event).await.unwrap();

    assert_eq!(
        h.handle
            .feed_loaded(slow, FetchMode::Refresh, slow_page)
            .await
            .unwrap(),
        FetchOutcome::Stale
    );
    let cached = h.cached_messages("c1").await.unwrap();
    assert_eq!(cached.edges[0].node.id, "m5");
}

#[tokio::test]
async fn first_conversation_in_an_empty_feed() {
    let db = Arc::new(MemoryDatabase::new());
    let resolvers = Resolvers::new(Arc::clone(&db), PaginationConfig::default());
    let viewer = Viewer::authenticated("dave");
    let (handle, _task) = spawn(ClientCache::default(), 8);

    let token = handle.begin_fetch(CacheTarget::Feed).await.unwrap();
    let page = resolvers
        .feed_with_messages(&viewer, &PageRequest::first(10), None)
        .await
        .unwrap()
        .unwrap();
    assert!(page.is_empty());
    handle.feed_loaded(token, FetchMode::Refresh, page).await.unwrap();

    let created = conversation("c7", 7, &["dave", "erin"]);
    db.conversations.insert(created.clone()).await;
    assert_eq!(
        handle
            .apply_event(CreationEvent::conversation_created(created))
            .await
            .unwrap(),
        MergeOutcome::Synthesized { position: 0 }
    );

    let feed = handle.read(|cache| cache.feed_view()).await.unwrap().unwrap();
    assert_eq!(feed.len(), 1);
    assert!(!feed.page_info.has_next_page);
    assert!(!feed.page_info.has_previous_page);
    assert!(feed.edges[0].node.messages.is_empty());
}

#[tokio::test]
async fn bus_events_reach_only_their_audience() {
    let h = Harness::new(2).await;
    h.load_feed(FetchMode::Refresh).await;

    let bus = EventBus::new(16);
    let bridge = bridge_events(bus.subscribe(), "alice", h.handle.clone());

    let private = message("m50", 50, "c9", "carol");
    bus.publish(vec!["carol".into()], CreationEvent::message_created(private));
    let shared = h.send("m3", 3, "c1").await;
    bus.publish(vec!["alice".into(), "bob".into()], shared);
    drop(bus);
    bridge.await.unwrap();

    let feed_ids = h
        .handle
        .read(|cache| {
            cache
                .feed_view()
                .map(|feed| {
                    feed.nodes()
                        .map(|n| n.conversation.id.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
        .await
        .unwrap();
    assert_eq!(feed_ids, vec!["c1".to_string()]);
    assert_eq!(ids(&h.cached_messages("c1").await.unwrap()), vec!["m3", "m2", "m1"]);
}
