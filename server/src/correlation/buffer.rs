use crate::model::BrokeredMessage;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Replies received by one caller on behalf of another, keyed by message ID.
///
/// Every operation takes the lock once, so a take can never observe half of a
/// put. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct PendingReplyBuffer {
    replies: Mutex<HashMap<String, BrokeredMessage>>,
}

impl PendingReplyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn replies(&self) -> MutexGuard<'_, HashMap<String, BrokeredMessage>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes and returns the reply for `id`.
    pub fn try_take(&self, id: &str) -> Option<BrokeredMessage> {
        self.replies().remove(id)
    }

    /// Parks a reply. An earlier reply with the same ID is replaced and returned.
    pub fn put(&self, message: BrokeredMessage) -> Option<BrokeredMessage> {
        let replaced = self.replies().insert(message.id.clone(), message);
        if let Some(old) = &replaced {
            log::warn!(
                "Replaced buffered reply {} (sequence {}) with a newer delivery",
                old.id,
                old.sequence
            );
        }
        replaced
    }

    /// Empties the buffer, oldest delivery first.
    pub fn drain_all(&self) -> Vec<BrokeredMessage> {
        let mut drained: Vec<_> = self.replies().drain().map(|(_, m)| m).collect();
        drained.sort_by_key(|m| m.sequence);
        drained
    }

    pub fn contains(&self, id: &str) -> bool {
        self.replies().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.replies().len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_core::date::OffsetDateTime;

    fn reply(id: &str, sequence: i64) -> BrokeredMessage {
        BrokeredMessage::new(id, sequence, None, OffsetDateTime::now_utc(), Vec::new())
    }

    #[test]
    fn test_take_removes_entry() {
        let buffer = PendingReplyBuffer::new();
        buffer.put(reply("a", 1));

        assert_eq!(buffer.try_take("a").map(|m| m.sequence), Some(1));
        assert!(buffer.try_take("a").is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_put_replaces_same_id() {
        let buffer = PendingReplyBuffer::new();
        assert!(buffer.put(reply("a", 1)).is_none());
        let replaced = buffer.put(reply("a", 2));

        assert_eq!(replaced.map(|m| m.sequence), Some(1));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.try_take("a").map(|m| m.sequence), Some(2));
    }

    #[test]
    fn test_drain_all_empties_in_delivery_order() {
        let buffer = PendingReplyBuffer::new();
        buffer.put(reply("c", 3));
        buffer.put(reply("a", 1));
        buffer.put(reply("b", 2));

        let ids: Vec<_> = buffer.drain_all().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(buffer.is_empty());
        assert!(!buffer.contains("a"));
    }
}
