//! Callers waiting on an in-flight refresh.
//!
//! Resumed callers receive the cycle's [`RefreshOutcome`] together with a
//! [`Turn`]. Turns are handed out in queue order and each one becomes
//! [`ready`](Turn::ready) only after every earlier turn has been released,
//! so retries go out oldest first no matter how the runtime schedules the
//! woken tasks.

use parking_lot::Mutex;
use std::collections::{vec_deque, VecDeque};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// How a refresh cycle settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New access token to retry with.
    Refreshed {
        /// The freshly issued access token.
        access_token: String,
    },
    /// The session could not be recovered.
    Expired,
}

impl RefreshOutcome {
    /// Create a success outcome.
    pub fn refreshed(access_token: impl Into<String>) -> Self {
        Self::Refreshed {
            access_token: access_token.into(),
        }
    }

    /// Access token carried by a successful outcome.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Refreshed { access_token } => Some(access_token),
            Self::Expired => None,
        }
    }
}

/// What a resumed caller receives.
pub type Resumed = (RefreshOutcome, Turn);

/// A suspended caller.
#[derive(Debug)]
pub struct Waiter {
    id: u64,
    sender: oneshot::Sender<Resumed>,
}

impl Waiter {
    /// Waiter id, unique within its queue.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resume the caller. Returns `false` if it already went away, in which
    /// case its turn is released on the spot.
    pub fn resolve(self, outcome: RefreshOutcome, turn: Turn) -> bool {
        self.sender.send((outcome, turn)).is_ok()
    }
}

/// Release bookkeeping shared by the turns of one drained queue.
#[derive(Debug)]
struct ResumeOrder {
    released: Mutex<Vec<bool>>,
    next: watch::Sender<usize>,
}

impl ResumeOrder {
    fn release(&self, index: usize) {
        let mut released = self.released.lock();
        if let Some(slot) = released.get_mut(index) {
            *slot = true;
        }
        let mut next = *self.next.borrow();
        while released.get(next).copied().unwrap_or(false) {
            next += 1;
        }
        self.next.send_replace(next);
    }
}

/// A resumed caller's position in the retry order.
///
/// Dropping the turn releases it, so a caller that gives up or fails never
/// blocks the callers queued behind it.
#[derive(Debug)]
pub struct Turn {
    order: Arc<ResumeOrder>,
    index: usize,
}

impl Turn {
    /// Hand out one turn per waiter, in the order given.
    pub fn sequence(count: usize) -> impl Iterator<Item = Turn> {
        let (next, _) = watch::channel(0);
        let order = Arc::new(ResumeOrder {
            released: Mutex::new(vec![false; count]),
            next,
        });
        (0..count).map(move |index| Turn {
            order: order.clone(),
            index,
        })
    }

    #[cfg(test)]
    fn index(&self) -> usize {
        self.index
    }

    /// Wait until every earlier turn has been released.
    pub async fn ready(&self) {
        let mut next = self.order.next.subscribe();
        // The sender lives in `self.order`, so this only returns once ready.
        let _ = next.wait_for(|next| *next >= self.index).await;
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        self.order.release(self.index);
    }
}

/// FIFO of callers waiting for one refresh cycle.
#[derive(Debug, Default)]
pub struct PendingQueue {
    waiters: VecDeque<Waiter>,
    next_id: u64,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a caller; returns its id and the receiving half of its continuation.
    pub fn push(&mut self) -> (u64, oneshot::Receiver<Resumed>) {
        let id = self.next_id;
        self.next_id += 1;
        let (sender, receiver) = oneshot::channel();
        self.waiters.push_back(Waiter { id, sender });
        (id, receiver)
    }

    /// Remove a caller that gave up. Returns `false` if it was not queued.
    pub fn remove(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of queued callers.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Check if no caller is queued.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Take every queued caller, oldest first, leaving the queue empty.
    pub fn drain(&mut self) -> vec_deque::IntoIter<Waiter> {
        std::mem::take(&mut self.waiters).into_iter()
    }
}
