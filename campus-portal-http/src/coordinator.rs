//! Refresh coordination.
//!
//! At most one refresh cycle is in flight per coordinator. Callers that hit an
//! authorization failure [`join`](RefreshCoordinator::join) the cycle: the
//! first becomes its leader and starts the refresh, the rest queue behind it.
//! When the cycle settles every queued caller receives the same
//! [`RefreshOutcome`] and a [`Turn`] that orders their retries oldest first.
//!
//! The state lives behind one lock that is never held across an `.await`, so
//! a caller either joins a cycle before its queue is taken, or observes the
//! settled state afterwards. It can never land in a queue that is being
//! drained.
//!
//! The generation moves whenever the credentials a request may have been
//! sent with stop being current: after every settled cycle and whenever a
//! session starts or ends. A failed cycle or a session change also starts a
//! new session epoch; failures observed before it belong to a session that
//! is gone.

use crate::queue::{PendingQueue, RefreshOutcome, Resumed, Turn, Waiter};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct State {
    in_flight: bool,
    cycle: u64,
    generation: u64,
    session_start: u64,
    queue: PendingQueue,
}

/// Serializes token refreshes for one client.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<State>,
}

/// Result of joining the coordinator after an authorization failure.
#[derive(Debug)]
pub enum Join {
    /// The session the failing request was sent under has ended.
    Ended,
    /// A refresh completed after the failing request was sent; retry with
    /// the current token.
    Stale,
    /// No refresh was in flight. The caller must run one and settle `cycle`.
    Leader {
        /// The leader's own place in the queue.
        ticket: Ticket,
        /// Handle that settles the cycle.
        cycle: RefreshCycle,
    },
    /// A refresh is already in flight; wait for it.
    Follower(Ticket),
}

impl RefreshCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current credential generation.
    ///
    /// Read this before sending a request and pass it to [`join`](Self::join)
    /// if the request fails authorization.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Generation at which the current session epoch began.
    pub fn session_epoch(&self) -> u64 {
        self.state.lock().session_start
    }

    /// Check if a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Number of callers waiting on the current cycle.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Join after an authorization failure observed at `observed_generation`.
    pub fn join(self: &Arc<Self>, observed_generation: u64) -> Join {
        let mut state = self.state.lock();

        if observed_generation < state.session_start {
            debug!(
                observed = observed_generation,
                session_start = state.session_start,
                "Authorization failure from an ended session"
            );
            return Join::Ended;
        }

        if state.in_flight {
            let (id, receiver) = state.queue.push();
            debug!(waiter = id, queued = state.queue.len(), "Waiting on in-flight refresh");
            return Join::Follower(Ticket::new(self.clone(), id, receiver));
        }

        if state.generation != observed_generation {
            debug!(
                observed = observed_generation,
                current = state.generation,
                "Credentials already refreshed since request was sent"
            );
            return Join::Stale;
        }

        state.in_flight = true;
        state.cycle += 1;
        let (id, receiver) = state.queue.push();
        debug!(waiter = id, cycle = state.cycle, "Starting refresh cycle");

        Join::Leader {
            ticket: Ticket::new(self.clone(), id, receiver),
            cycle: RefreshCycle {
                coordinator: self.clone(),
                id: state.cycle,
                session_epoch: state.session_start,
                settled: false,
            },
        }
    }

    /// Start a new session epoch.
    ///
    /// Callers still waiting on an in-flight cycle belong to the old session
    /// and are resumed as expired; that cycle's eventual outcome is ignored.
    pub fn reset_session(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.session_start = state.generation;
            if !state.in_flight {
                return;
            }
            state.in_flight = false;
            state.queue.drain()
        };
        let delivered = resume(waiters, &RefreshOutcome::Expired);
        debug!(delivered, "Abandoned refresh cycle of previous session");
    }

    /// Settle cycle `id` and resume every queued caller in arrival order.
    /// Returns how many callers were still waiting.
    fn complete(&self, id: u64, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            if !state.in_flight || state.cycle != id {
                trace!(cycle = id, "Ignoring outcome of abandoned refresh cycle");
                return 0;
            }
            state.in_flight = false;
            state.generation += 1;
            if outcome == RefreshOutcome::Expired {
                state.session_start = state.generation;
            }
            state.queue.drain()
        };

        let delivered = resume(waiters, &outcome);
        debug!(
            cycle = id,
            delivered,
            refreshed = outcome.access_token().is_some(),
            "Refresh cycle settled"
        );
        delivered
    }

    fn withdraw(&self, id: u64) {
        if self.state.lock().queue.remove(id) {
            debug!(waiter = id, "Waiter withdrew from refresh queue");
        }
    }
}

fn resume<I>(waiters: I, outcome: &RefreshOutcome) -> usize
where
    I: ExactSizeIterator<Item = Waiter>,
{
    let turns = Turn::sequence(waiters.len());
    let mut delivered = 0;
    for (waiter, turn) in waiters.zip(turns) {
        let id = waiter.id();
        if waiter.resolve(outcome.clone(), turn) {
            delivered += 1;
        } else {
            trace!(waiter = id, "Waiter left before refresh settled");
        }
    }
    delivered
}

/// Settles the refresh cycle it was issued for.
///
/// Dropping an unsettled cycle (the refresh task was aborted or panicked)
/// settles it as [`RefreshOutcome::Expired`] so waiters never hang.
#[derive(Debug)]
pub struct RefreshCycle {
    coordinator: Arc<RefreshCoordinator>,
    id: u64,
    session_epoch: u64,
    settled: bool,
}

impl RefreshCycle {
    /// Session epoch the cycle was started in.
    pub fn session_epoch(&self) -> u64 {
        self.session_epoch
    }

    /// Settle the cycle. Returns how many callers were resumed.
    pub fn finish(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.coordinator.complete(self.id, outcome)
    }
}

impl Drop for RefreshCycle {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.complete(self.id, RefreshOutcome::Expired);
        }
    }
}

/// A caller's place in the refresh queue.
///
/// Dropping the ticket before the cycle settles removes the caller from the
/// queue without affecting the cycle or other waiters.
#[derive(Debug)]
pub struct Ticket {
    coordinator: Arc<RefreshCoordinator>,
    id: u64,
    receiver: oneshot::Receiver<Resumed>,
}

impl Ticket {
    fn new(
        coordinator: Arc<RefreshCoordinator>,
        id: u64,
        receiver: oneshot::Receiver<Resumed>,
    ) -> Self {
        Self {
            coordinator,
            id,
            receiver,
        }
    }

    /// Wait for the cycle to settle.
    pub async fn wait(self) -> RefreshOutcome {
        self.wait_turn().await.0
    }

    /// Wait for the cycle to settle and keep this caller's retry turn.
    ///
    /// The turn is `None` only if the cycle vanished without settling.
    pub async fn wait_turn(mut self) -> (RefreshOutcome, Option<Turn>) {
        match (&mut self.receiver).await {
            Ok((outcome, turn)) => (outcome, Some(turn)),
            Err(_) => (RefreshOutcome::Expired, None),
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.coordinator.withdraw(self.id);
    }
}
