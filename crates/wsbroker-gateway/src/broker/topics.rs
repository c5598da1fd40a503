use std::collections::HashSet;

use dashmap::DashMap;

use wsbroker_core::error::{Result, WsBrokerError};
use wsbroker_core::protocol::frame::Frame;

use crate::broker::SessionRegistry;
use crate::config::BrokerSection;
use crate::transport::session::{SessionHandle, SessionId};

/// Outcome of one fan-out.
///
/// Every entry of the snapshot lands in exactly one of `delivered`, `failed`
/// or `evicted`, so the three add up to `targeted` unless the topic lists a
/// stale session more than once (possible with dedup off), in which case the
/// session is evicted and counted once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Length of the subscriber snapshot this publish fanned out to.
    pub targeted: usize,
    /// Frames accepted by a subscriber queue.
    pub delivered: usize,
    /// Live subscribers that refused the frame (queue full, timed out).
    pub failed: usize,
    /// Distinct closed or unregistered sessions removed during this publish.
    pub evicted: usize,
}

/// Topic broker: `topic -> [session_id]` plus the reverse index
/// `session_id -> {topic}` for cleanup on disconnect.
///
/// Each topic's list is guarded by its DashMap shard, so subscribe,
/// unsubscribe, and publish on one topic are serialized. Publish copies the
/// list under the guard and delivers after releasing it.
///
/// Lock ordering: a guard on one map is never held while touching the other.
pub struct Broker {
    topics: DashMap<String, Vec<SessionId>>,
    session_topics: DashMap<SessionId, HashSet<String>>,
    sessions: SessionRegistry,
    dedup: bool,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Broker {
    pub fn new(dedup: bool) -> Self {
        Self {
            topics: DashMap::new(),
            session_topics: DashMap::new(),
            sessions: SessionRegistry::new(),
            dedup,
        }
    }

    pub fn from_config(cfg: &BrokerSection) -> Self {
        Self::new(cfg.dedup_subscribe)
    }

    pub fn next_session_id(&self) -> SessionId {
        self.sessions.next_id()
    }

    /// Make a session reachable for delivery.
    pub fn register(&self, handle: SessionHandle) {
        self.sessions.insert(handle);
    }

    /// Deregister a session and drop it from every topic it joined.
    /// Returns the number of topic entries removed.
    pub fn remove_session(&self, id: SessionId) -> usize {
        self.sessions.remove(id);
        let topics = self
            .session_topics
            .remove(&id)
            .map(|(_, topics)| topics)
            .unwrap_or_default();

        let mut removed = 0;
        for topic in topics {
            removed += self.drop_from_topic(&topic, id);
        }
        if removed > 0 {
            tracing::debug!(session_id = id, removed, "session removed from topics");
        }
        removed
    }

    /// Add `id` to `topic`, creating the topic on first use. Returns `false`
    /// when de-duplication skipped an existing subscription.
    pub fn subscribe(&self, topic: &str, id: SessionId) -> bool {
        let added = {
            let mut subs = self.topics.entry(topic.to_string()).or_default();
            if self.dedup && subs.contains(&id) {
                false
            } else {
                subs.push(id);
                true
            }
        };

        if added {
            self.session_topics
                .entry(id)
                .or_default()
                .insert(topic.to_string());
        }
        tracing::debug!(topic, session_id = id, added, "subscribe");
        added
    }

    /// Remove exactly one subscription of `id` from `topic`.
    pub fn unsubscribe(&self, topic: &str, id: SessionId) -> Result<()> {
        let still_subscribed = {
            let Some(mut subs) = self.topics.get_mut(topic) else {
                return Err(WsBrokerError::NotFound(format!("topic {topic} does not exist")));
            };
            let Some(pos) = subs.iter().position(|s| *s == id) else {
                return Err(WsBrokerError::NotFound(format!(
                    "session {id} not subscribed to topic {topic}"
                )));
            };
            subs.remove(pos);
            subs.contains(&id)
        };

        if !still_subscribed {
            if let Some(mut topics) = self.session_topics.get_mut(&id) {
                topics.remove(topic);
            }
        }
        tracing::debug!(topic, session_id = id, "unsubscribe");
        Ok(())
    }

    /// Send `message` as a text frame to every subscriber of `topic`, in
    /// subscription order. Individual failures are logged and counted; they
    /// never abort the fan-out.
    pub async fn publish(&self, topic: &str, message: &str) -> Result<PublishReport> {
        let subscribers = self
            .topics
            .get(topic)
            .map(|subs| subs.value().clone())
            .ok_or_else(|| WsBrokerError::NotFound(format!("topic {topic} does not exist")))?;

        let frame = Frame::text(message);
        let mut report = PublishReport {
            targeted: subscribers.len(),
            ..PublishReport::default()
        };
        let mut evicted = HashSet::new();

        for id in subscribers {
            if evicted.contains(&id) {
                continue;
            }
            let Some(handle) = self.sessions.get(id) else {
                // Deregistered between snapshot and delivery, or never registered.
                self.drop_from_topic(topic, id);
                evicted.insert(id);
                continue;
            };

            match handle.send_frame(frame.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(WsBrokerError::Closed) => {
                    tracing::debug!(topic, session_id = id, "subscriber closed, evicting");
                    self.remove_session(id);
                    evicted.insert(id);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(topic, session_id = id, error = %e, "delivery failed");
                }
            }
        }
        report.evicted = evicted.len();

        tracing::debug!(
            topic,
            targeted = report.targeted,
            delivered = report.delivered,
            failed = report.failed,
            evicted = report.evicted,
            "publish"
        );
        Ok(report)
    }

    /// Queue a close frame on every registered session without waiting on
    /// any of them. Returns how many accepted it.
    pub fn close_all(&self, code: u16) -> usize {
        self.sessions
            .handles()
            .iter()
            .filter(|handle| handle.try_send_close(code).is_ok())
            .count()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Current subscriber list (in delivery order); empty for unknown topics.
    pub fn subscribers(&self, topic: &str) -> Vec<SessionId> {
        self.topics
            .get(topic)
            .map(|subs| subs.value().clone())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|subs| subs.len()).unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn drop_from_topic(&self, topic: &str, id: SessionId) -> usize {
        let Some(mut subs) = self.topics.get_mut(topic) else {
            return 0;
        };
        let before = subs.len();
        subs.retain(|s| *s != id);
        before - subs.len()
    }
}
