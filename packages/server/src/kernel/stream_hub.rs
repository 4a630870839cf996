//! Per-user in-process pub/sub hub for live status streaming.
//!
//! Each subscription owns a small bounded channel. Publishing never waits on
//! one consumer at the expense of the others: a full channel gets a bounded
//! grace period, after which the event is dropped for that consumer only.
//!
//! # Usage
//!
//! Producers (queue transitions):
//!   hub.publish(user_id, update).await;
//!
//! Consumers (SSE endpoints):
//!   let mut sub = hub.subscribe(user_id);
//!   while let Some(update) = sub.recv().await { ... }

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::join_all;
use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tracing::{debug, warn};

use crate::common::{SubscriptionId, UserId};

/// Messages buffered per subscription before publishes start waiting.
pub const DEFAULT_CAPACITY: usize = 10;

/// How long a publish waits on one full subscription before dropping.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

struct Subscriber<E> {
    id: SubscriptionId,
    tx: mpsc::Sender<E>,
}

struct Registry<E> {
    users: RwLock<HashMap<UserId, Vec<Subscriber<E>>>>,
    capacity: usize,
    send_timeout: Duration,
}

impl<E> Registry<E> {
    fn remove(&self, user_id: UserId, id: SubscriptionId) -> bool {
        let mut users = self.users.write();
        let Some(subs) = users.get_mut(&user_id) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            users.remove(&user_id);
        }
        removed
    }
}

/// Thread-safe, cloneable fan-out keyed by user.
pub struct StreamHub<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for StreamHub<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> Default for StreamHub<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

impl<E> StreamHub<E>
where
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_CAPACITY, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_settings(capacity: usize, send_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Registry {
                users: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                send_timeout,
            }),
        }
    }

    /// Registers a new subscription. A user may hold any number of them.
    pub fn subscribe(&self, user_id: UserId) -> Subscription<E> {
        let (tx, receiver) = mpsc::channel(self.registry.capacity);
        let id = SubscriptionId::new();

        self.registry
            .users
            .write()
            .entry(user_id)
            .or_default()
            .push(Subscriber { id, tx });

        debug!(user_id = %user_id, subscription_id = %id, "Subscription opened");

        Subscription {
            id,
            user_id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Removes exactly this subscription. Safe to call more than once.
    pub fn unsubscribe(&self, subscription: &Subscription<E>) -> bool {
        self.registry.remove(subscription.user_id, subscription.id)
    }

    /// Delivers `event` to every current subscription of `user_id`.
    ///
    /// Full channels are retried concurrently for at most the send timeout,
    /// so one stalled consumer costs the producer that long at most and never
    /// delays delivery to the others.
    pub async fn publish(&self, user_id: UserId, event: E) -> PublishOutcome {
        let targets: Vec<(SubscriptionId, mpsc::Sender<E>)> = {
            let users = self.registry.users.read();
            match users.get(&user_id) {
                Some(subs) => subs.iter().map(|s| (s.id, s.tx.clone())).collect(),
                None => return PublishOutcome::default(),
            }
        };

        let mut outcome = PublishOutcome::default();
        let mut slow = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(event)) => slow.push((id, tx, event)),
                Err(TrySendError::Closed(_)) => outcome.dropped += 1,
            }
        }

        let timeout = self.registry.send_timeout;
        let waits = slow.into_iter().map(|(id, tx, event)| async move {
            (id, tx.send_timeout(event, timeout).await)
        });

        for (id, result) in join_all(waits).await {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(user_id = %user_id, subscription_id = %id, "Subscriber is full, dropping event");
                    outcome.dropped += 1;
                }
                Err(SendTimeoutError::Closed(_)) => outcome.dropped += 1,
            }
        }

        outcome
    }

    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.registry
            .users
            .read()
            .get(&user_id)
            .map_or(0, Vec::len)
    }

    /// Users with at least one live subscription.
    pub fn user_count(&self) -> usize {
        self.registry.users.read().len()
    }
}

/// A live registration, owned by the connection that opened it.
///
/// Dropping it removes it from the hub. The hub only keeps the sending half,
/// so it can never keep a subscription alive on its own.
pub struct Subscription<E> {
    id: SubscriptionId,
    user_id: UserId,
    receiver: mpsc::Receiver<E>,
    registry: Weak<Registry<E>>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }
}

impl<E> Stream for Subscription<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.receiver.poll_recv(cx)
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.user_id, self.id);
        }
        self.receiver.close();
        debug!(user_id = %self.user_id, subscription_id = %self.id, "Subscription closed");
    }
}
