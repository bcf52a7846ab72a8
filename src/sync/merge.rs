//! Merging creation events into the client cache.
//!
//! Each event takes exactly one of two paths:
//!
//! 1. **Fragment**: the event's parent has its own cached message list, so
//!    the message is spliced into that list. The feed reads the fragment in
//!    place of its nested copy and sees the update.
//! 2. **Full query**: otherwise the feed itself is patched, either inside
//!    the parent's nested list or by synthesizing a new feed edge. A parent
//!    synthesized from a message is a placeholder: it sits where the newest
//!    conversation would and is replaced when the conversation arrives.
//!
//! Both paths produce the edge shape the page assembler would have produced
//! and both treat an already-cached id as a no-op, which makes replays and
//! event/fetch races harmless.

use tracing::{debug, trace};

use super::cache::{ClientCache, FeedEntry};
use crate::events::{CreatedRecord, CreationEvent};
use crate::pagination::PaginationError;
use crate::types::{Conversation, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Spliced into the parent's fragment.
    Fragment { position: usize },
    /// Spliced into the parent's message list nested in the feed.
    Nested { position: usize },
    /// A new feed edge was created for the record or its parent.
    Synthesized { position: usize },
    /// Already cached; nothing changed.
    Duplicate,
    /// Nothing cached that could hold the record; the next fetch brings it.
    NotCached,
}

impl ClientCache {
    pub fn apply_event(&mut self, event: &CreationEvent) -> MergeOutcome {
        let outcome = match &event.record {
            CreatedRecord::Conversation(conversation) => self.merge_conversation(conversation),
            CreatedRecord::Message(message) => {
                let parent = event
                    .parent_key
                    .as_deref()
                    .unwrap_or(&message.conversation_id);
                self.merge_message(parent, message)
            }
        };
        trace!(record_id = event.record.id(), ?outcome, "merged creation event");
        outcome
    }

    fn merge_conversation(&mut self, conversation: &Conversation) -> MergeOutcome {
        let message_order = self.message_order();
        let Some(feed) = self.feed.as_mut() else {
            debug!(conversation_id = %conversation.id, "no cached feed; skipping event");
            return MergeOutcome::NotCached;
        };
        let entry = FeedEntry::from_conversation(conversation.clone(), message_order);
        match feed.insert_resolved(entry) {
            Ok(position) => MergeOutcome::Synthesized { position },
            Err(e) => duplicate(e),
        }
    }

    fn merge_message(&mut self, parent: &str, message: &Message) -> MergeOutcome {
        // Fragment path.
        if let Some(fragment) = self.fragments.get_mut(parent) {
            return match fragment.insert(message.clone()) {
                Ok(position) => MergeOutcome::Fragment { position },
                Err(e) => duplicate(e),
            };
        }

        // Full-query path.
        let message_order = self.message_order();
        let Some(feed) = self.feed.as_mut() else {
            debug!(message_id = %message.id, parent, "no cached feed or fragment; skipping event");
            return MergeOutcome::NotCached;
        };

        if let Some(entry) = feed.get_mut(parent) {
            return match entry.messages.insert(message.clone()) {
                Ok(position) => MergeOutcome::Nested { position },
                Err(e) => duplicate(e),
            };
        }

        let entry = FeedEntry::placeholder(parent, message, message_order);
        match feed.insert(entry) {
            Ok(position) => MergeOutcome::Synthesized { position },
            Err(e) => duplicate(e),
        }
    }
}

fn duplicate(e: PaginationError) -> MergeOutcome {
    debug!("{}; ignoring event", e);
    MergeOutcome::Duplicate
}
