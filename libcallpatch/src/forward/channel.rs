use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;

use super::Outcome;

pub type SubscriberId = u64;

type Callback<P> = Arc<dyn Fn(&P) -> Outcome + Send + Sync>;

/// Named notification point with a single payload type.
///
/// Subscribers run in registration order. Broadcasting works on a
/// snapshot of the subscriber list, so callbacks may subscribe or
/// unsubscribe without deadlocking; changes apply to the next broadcast.
pub struct Forward<P> {
    name: String,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriberId, Callback<P>)>>,
}

impl<P> Forward<P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&P) -> Outcome + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(callback)));

        log::debug!("[{}] Subscriber {} added", self.name, id);
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(subscriber_id, _)| *subscriber_id != id);

        let removed = subscribers.len() != before;
        if removed {
            log::debug!("[{}] Subscriber {} removed", self.name, id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.read().is_empty()
    }

    /// Asks every subscriber and returns the highest outcome.
    ///
    /// Every subscriber runs, even after one answers `Stop`. A subscriber
    /// that panics counts as `Continue`.
    pub fn broadcast(&self, payload: &P) -> Outcome {
        let snapshot: Vec<(SubscriberId, Callback<P>)> = self.subscribers.read().clone();

        let mut result = Outcome::Continue;

        for (id, callback) in snapshot {
            let outcome = match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::error!("[{}] Subscriber {} panicked, treating as Continue", self.name, id);
                    Outcome::Continue
                }
            };

            result = result.max(outcome);
        }

        result
    }
}

impl<P> fmt::Debug for Forward<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forward")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
