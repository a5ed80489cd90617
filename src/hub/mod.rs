//! Per-session broadcast hub.
//!
//! Owns the set of live subscriber connections for every session and fans
//! update events out to them. A session's connect, disconnect and broadcast
//! operations are serialized through the session's own topic lock, so every
//! subscriber observes events in the order they were produced, while unrelated
//! sessions proceed fully in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::SessionUpdate;

/// Time budget for delivering one event to one subscriber. A subscriber that
/// cannot take the event within this window is treated as dead and pruned.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Events buffered per subscriber before its sender starts blocking.
const SUBSCRIBER_BUFFER: usize = 64;

/// A registered subscriber connection.
///
/// The hub holds the sending half; the gateway owns the receiver and pumps
/// events into the transport. Dropping the receiver makes the next send fail,
/// which is how transport death reaches the hub.
pub struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<SessionUpdate>,
}

impl Subscriber {
    /// Create a subscriber and the receiving half the gateway reads from.
    pub fn channel() -> (Self, mpsc::Receiver<SessionUpdate>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Default)]
struct TopicState {
    subscribers: Vec<Subscriber>,
    /// Ids removed by failure pruning whose gateways have not yet observed
    /// the death. The entry keeps the eventual `leave` driving the counter
    /// mutation and departure announcement.
    pruned: Vec<Uuid>,
    /// Set when the topic is retired from the registry. A closed topic never
    /// accepts new subscribers; connect retries against a fresh entry.
    closed: bool,
}

impl TopicState {
    /// A topic may only be retired once no subscriber is registered and no
    /// pruned id is still awaiting its gateway's `leave`.
    fn drained(&self) -> bool {
        self.subscribers.is_empty() && self.pruned.is_empty()
    }

    /// Remove `subscriber_id` from the live set or, failing that, from the
    /// pruned bookkeeping. Returns whether anything was removed.
    fn remove(&mut self, subscriber_id: Uuid) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != subscriber_id);
        if self.subscribers.len() != before {
            return true;
        }
        let before = self.pruned.len();
        self.pruned.retain(|id| *id != subscriber_id);
        self.pruned.len() != before
    }
}

#[derive(Default)]
struct SessionTopic {
    state: Mutex<TopicState>,
}

/// The broadcast hub. Explicitly constructed and shared through `AppState`;
/// all mutation of the subscriber registry goes through its methods.
pub struct BroadcastHub {
    topics: RwLock<HashMap<Uuid, Arc<SessionTopic>>>,
    send_timeout: Duration,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            send_timeout: SEND_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            send_timeout,
        }
    }

    /// Register a subscriber for a session. Once this returns, the subscriber
    /// misses no subsequent broadcast for the session.
    pub async fn connect(&self, session_id: Uuid, subscriber: Subscriber) {
        loop {
            let topic = self.topic(session_id).await;
            let mut state = topic.state.lock().await;
            if state.closed {
                drop(state);
                tokio::task::yield_now().await;
                continue;
            }
            state.subscribers.push(subscriber);
            return;
        }
    }

    /// Remove a subscriber from a session. Idempotent: removing an unknown or
    /// already-removed subscriber is a no-op. Empty topics are retired from
    /// the registry so short-lived sessions do not accumulate entries.
    pub async fn disconnect(&self, session_id: Uuid, subscriber_id: Uuid) {
        let Some(topic) = self.lookup(session_id).await else {
            return;
        };
        let mut state = topic.state.lock().await;
        if !state.remove(subscriber_id) {
            return;
        }
        if state.drained() {
            state.closed = true;
            drop(state);
            self.retire(session_id, &topic).await;
        }
    }

    /// Deliver an event to every subscriber currently registered for the
    /// session. Sends are issued concurrently, each under its own time
    /// budget; a subscriber whose send fails is pruned as part of this call
    /// and the broadcast still succeeds for the others.
    pub async fn broadcast(&self, session_id: Uuid, event: SessionUpdate) {
        let Some(topic) = self.lookup(session_id).await else {
            return;
        };
        let mut state = topic.state.lock().await;
        if state.closed {
            return;
        }
        self.deliver(&mut state, &event).await;
        if state.drained() {
            state.closed = true;
            drop(state);
            self.retire(session_id, &topic).await;
        }
    }

    /// Number of currently registered subscribers for a session.
    pub async fn get_participant_count(&self, session_id: Uuid) -> usize {
        match self.lookup(session_id).await {
            Some(topic) => topic.state.lock().await.subscribers.len(),
            None => 0,
        }
    }

    /// Register a subscriber, run the store-side counter mutation and announce
    /// the resulting count, all as one unit under the session's topic lock.
    ///
    /// Serializing the whole sequence is what keeps announced counts from
    /// regressing when joins and leaves race on the same session; the counter
    /// step is supplied by the caller so the hub stays storage-agnostic.
    pub async fn join<E, F, Fut>(
        &self,
        session_id: Uuid,
        subscriber: Subscriber,
        count: F,
    ) -> Result<i32, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i32, E>>,
    {
        let subscriber_id = subscriber.id;
        loop {
            let topic = self.topic(session_id).await;
            let mut state = topic.state.lock().await;
            if state.closed {
                drop(state);
                tokio::task::yield_now().await;
                continue;
            }
            state.subscribers.push(subscriber);

            let participants = match count().await {
                Ok(participants) => participants,
                Err(e) => {
                    state.subscribers.retain(|s| s.id != subscriber_id);
                    if state.drained() {
                        state.closed = true;
                        drop(state);
                        self.retire(session_id, &topic).await;
                    }
                    return Err(e);
                }
            };

            let event = SessionUpdate::participant_joined(session_id, participants);
            self.deliver(&mut state, &event).await;
            return Ok(participants);
        }
    }

    /// Counterpart of [`join`](Self::join): remove the subscriber, run the
    /// counter mutation and announce the new count under the topic lock.
    ///
    /// A subscriber that was already pruned by a failed send still gets its
    /// counter mutation and departure announcement here; its gateway is the
    /// only caller that will ever account for it. Returns `Ok(None)` without
    /// touching the counter only when the subscriber was never registered or
    /// has already left, so a double disconnect stays a no-op.
    pub async fn leave<E, F, Fut>(
        &self,
        session_id: Uuid,
        subscriber_id: Uuid,
        count: F,
    ) -> Result<Option<i32>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<i32, E>>,
    {
        let Some(topic) = self.lookup(session_id).await else {
            return Ok(None);
        };
        let mut state = topic.state.lock().await;
        if !state.remove(subscriber_id) {
            return Ok(None);
        }

        let participants = count().await?;
        let event = SessionUpdate::participant_left(session_id, participants);
        self.deliver(&mut state, &event).await;

        if state.drained() {
            state.closed = true;
            drop(state);
            self.retire(session_id, &topic).await;
        }
        Ok(Some(participants))
    }

    async fn topic(&self, session_id: Uuid) -> Arc<SessionTopic> {
        {
            let topics = self.topics.read().await;
            if let Some(topic) = topics.get(&session_id) {
                return Arc::clone(topic);
            }
        }
        let mut topics = self.topics.write().await;
        Arc::clone(topics.entry(session_id).or_default())
    }

    async fn lookup(&self, session_id: Uuid) -> Option<Arc<SessionTopic>> {
        self.topics.read().await.get(&session_id).cloned()
    }

    async fn retire(&self, session_id: Uuid, topic: &Arc<SessionTopic>) {
        let mut topics = self.topics.write().await;
        if let Some(current) = topics.get(&session_id) {
            if Arc::ptr_eq(current, topic) {
                topics.remove(&session_id);
                debug!("Retired empty topic for session {}", session_id);
            }
        }
    }

    /// Send `event` to every subscriber in `state`. The set is snapshotted
    /// before sending and failure removals are applied to the live set
    /// afterwards, never while iterating.
    async fn deliver(&self, state: &mut TopicState, event: &SessionUpdate) {
        if state.subscribers.is_empty() {
            return;
        }
        let snapshot: Vec<(Uuid, mpsc::Sender<SessionUpdate>)> = state
            .subscribers
            .iter()
            .map(|s| (s.id, s.tx.clone()))
            .collect();

        let budget = self.send_timeout;
        let sends = snapshot.into_iter().map(|(id, tx)| {
            let event = event.clone();
            async move {
                match timeout(budget, tx.send(event)).await {
                    Ok(Ok(())) => None,
                    _ => Some(id),
                }
            }
        });

        let failed: Vec<Uuid> = join_all(sends).await.into_iter().flatten().collect();
        if !failed.is_empty() {
            warn!("Pruning {} dead subscriber(s) after broadcast", failed.len());
            state.subscribers.retain(|s| !failed.contains(&s.id));
            state.pruned.extend(failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;
    use crate::store::{MemorySessionStore, SessionStore};

    fn code_event(session_id: Uuid, code: &str) -> SessionUpdate {
        SessionUpdate::code_update(session_id, code.to_string(), Language::Python)
    }

    #[tokio::test]
    async fn subscribers_observe_broadcasts_in_submission_order() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();
        let (subscriber, mut rx) = Subscriber::channel();
        hub.connect(session_id, subscriber).await;

        hub.broadcast(session_id, code_event(session_id, "first")).await;
        hub.broadcast(session_id, code_event(session_id, "second")).await;

        for expected in ["first", "second"] {
            match rx.recv().await.unwrap() {
                SessionUpdate::CodeUpdate { code, .. } => assert_eq!(code, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn failed_subscriber_is_pruned_and_others_still_receive() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();

        let (alive, mut alive_rx) = Subscriber::channel();
        let (dead, dead_rx) = Subscriber::channel();
        hub.connect(session_id, alive).await;
        hub.connect(session_id, dead).await;
        assert_eq!(hub.get_participant_count(session_id).await, 2);

        // Simulate a broken transport.
        drop(dead_rx);

        hub.broadcast(session_id, code_event(session_id, "x = 1")).await;
        assert_eq!(hub.get_participant_count(session_id).await, 1);

        match alive_rx.recv().await.unwrap() {
            SessionUpdate::CodeUpdate { code, .. } => assert_eq!(code, "x = 1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_block_the_others() {
        let hub = BroadcastHub::with_send_timeout(Duration::from_millis(50));
        let session_id = Uuid::new_v4();

        let (alive, mut alive_rx) = Subscriber::channel();
        let (stalled, stalled_rx) = Subscriber::channel();
        hub.connect(session_id, alive).await;
        hub.connect(session_id, stalled).await;

        // Fill the stalled subscriber's buffer so further sends block,
        // draining the healthy one as we go.
        for i in 0..SUBSCRIBER_BUFFER {
            hub.broadcast(session_id, code_event(session_id, &format!("fill {}", i)))
                .await;
            assert!(alive_rx.recv().await.is_some());
        }
        hub.broadcast(session_id, code_event(session_id, "overflow")).await;

        // The stalled subscriber timed out and was pruned; the healthy one
        // still received the event.
        assert_eq!(hub.get_participant_count(session_id).await, 1);
        match alive_rx.recv().await.unwrap() {
            SessionUpdate::CodeUpdate { code, .. } => assert_eq!(code, "overflow"),
            other => panic!("unexpected event: {:?}", other),
        }
        drop(stalled_rx);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();
        let (subscriber, _rx) = Subscriber::channel();
        let subscriber_id = subscriber.id();
        hub.connect(session_id, subscriber).await;

        hub.disconnect(session_id, subscriber_id).await;
        hub.disconnect(session_id, subscriber_id).await;
        assert_eq!(hub.get_participant_count(session_id).await, 0);
    }

    #[tokio::test]
    async fn empty_topic_is_retired_from_registry() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();
        let (subscriber, _rx) = Subscriber::channel();
        let subscriber_id = subscriber.id();
        hub.connect(session_id, subscriber).await;
        hub.disconnect(session_id, subscriber_id).await;

        assert!(hub.topics.read().await.is_empty());

        // A later connect lands on a fresh entry.
        let (again, _rx2) = Subscriber::channel();
        hub.connect(session_id, again).await;
        assert_eq!(hub.get_participant_count(session_id).await, 1);
    }

    #[tokio::test]
    async fn join_announces_count_to_all_subscribers() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();

        let (first, mut first_rx) = Subscriber::channel();
        let count: Result<i32, String> = Ok(1);
        hub.join(session_id, first, || async move { count })
            .await
            .unwrap();
        match first_rx.recv().await.unwrap() {
            SessionUpdate::ParticipantJoined { participants, .. } => {
                assert_eq!(participants, 1)
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let (second, mut second_rx) = Subscriber::channel();
        let count: Result<i32, String> = Ok(2);
        hub.join(session_id, second, || async move { count })
            .await
            .unwrap();

        for rx in [&mut first_rx, &mut second_rx] {
            match rx.recv().await.unwrap() {
                SessionUpdate::ParticipantJoined { participants, .. } => {
                    assert_eq!(participants, 2)
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn leave_skips_counter_when_subscriber_already_gone() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();
        let (subscriber, _rx) = Subscriber::channel();
        let subscriber_id = subscriber.id();
        hub.connect(session_id, subscriber).await;

        let left = hub
            .leave(session_id, subscriber_id, || async { Ok::<_, String>(0) })
            .await
            .unwrap();
        assert_eq!(left, Some(0));

        // Second leave must not run the counter mutation.
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let left = hub
            .leave(session_id, subscriber_id, || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, String>(0)
            })
            .await
            .unwrap();
        assert_eq!(left, None);
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn leave_after_prune_still_runs_counter_mutation() {
        let hub = BroadcastHub::new();
        let store = Arc::new(MemorySessionStore::new());
        let session = store.create(Language::Python).await.unwrap();
        let session_id = session.id;

        let (doomed, doomed_rx) = Subscriber::channel();
        let doomed_id = doomed.id();
        let counter = Arc::clone(&store);
        hub.join(session_id, doomed, || async move {
            let session = counter
                .increment_participants(session_id)
                .await
                .unwrap()
                .unwrap();
            Ok::<_, String>(session.participants)
        })
        .await
        .unwrap();

        let (witness, mut witness_rx) = Subscriber::channel();
        let counter = Arc::clone(&store);
        hub.join(session_id, witness, || async move {
            let session = counter
                .increment_participants(session_id)
                .await
                .unwrap()
                .unwrap();
            Ok::<_, String>(session.participants)
        })
        .await
        .unwrap();
        match witness_rx.recv().await.unwrap() {
            SessionUpdate::ParticipantJoined { participants, .. } => assert_eq!(participants, 2),
            other => panic!("unexpected event: {:?}", other),
        }

        // The transport dies; the next broadcast prunes the subscriber.
        drop(doomed_rx);
        hub.broadcast(session_id, code_event(session_id, "x = 1")).await;
        assert_eq!(hub.get_participant_count(session_id).await, 1);
        match witness_rx.recv().await.unwrap() {
            SessionUpdate::CodeUpdate { code, .. } => assert_eq!(code, "x = 1"),
            other => panic!("unexpected event: {:?}", other),
        }

        // Gateway teardown for the pruned subscriber still decrements the
        // stored counter and announces the departure.
        let counter = Arc::clone(&store);
        let left = hub
            .leave(session_id, doomed_id, || async move {
                let session = counter
                    .decrement_participants(session_id)
                    .await
                    .unwrap()
                    .unwrap();
                Ok::<_, String>(session.participants)
            })
            .await
            .unwrap();
        assert_eq!(left, Some(1));
        assert_eq!(
            store.get(session_id).await.unwrap().unwrap().participants,
            1
        );
        match witness_rx.recv().await.unwrap() {
            SessionUpdate::ParticipantLeft { participants, .. } => assert_eq!(participants, 1),
            other => panic!("unexpected event: {:?}", other),
        }

        // A second leave for the same id stays a no-op.
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let left = hub
            .leave(session_id, doomed_id, || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, String>(0)
            })
            .await
            .unwrap();
        assert_eq!(left, None);
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn topic_with_pruned_subscriber_survives_until_its_leave() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();
        let (subscriber, rx) = Subscriber::channel();
        let subscriber_id = subscriber.id();
        hub.connect(session_id, subscriber).await;

        drop(rx);
        hub.broadcast(session_id, code_event(session_id, "x = 1")).await;
        assert_eq!(hub.get_participant_count(session_id).await, 0);
        // The topic stays registered until the pruned subscriber's gateway
        // accounts for it.
        assert!(!hub.topics.read().await.is_empty());

        let left = hub
            .leave(session_id, subscriber_id, || async { Ok::<_, String>(0) })
            .await
            .unwrap();
        assert_eq!(left, Some(0));
        assert!(hub.topics.read().await.is_empty());
    }

    #[tokio::test]
    async fn join_rolls_back_registration_when_counter_fails() {
        let hub = BroadcastHub::new();
        let session_id = Uuid::new_v4();
        let (subscriber, _rx) = Subscriber::channel();

        let result: Result<i32, String> = hub
            .join(session_id, subscriber, || async {
                Err("backend down".to_string())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(hub.get_participant_count(session_id).await, 0);
    }
}
