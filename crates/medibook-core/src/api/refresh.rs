//! Single-flight coordination for token refresh.
//!
//! The first request to see a 401/403 becomes the leader and performs the
//! refresh. Requests that fail while the leader is working park in the
//! pending queue and are all settled with the leader's outcome. The in-flight
//! flag and the queue live under one lock, so clearing the flag and draining
//! the queue happen together: a request either joins this refresh or starts
//! the next one.
//!
//! A leader that is dropped before resolving (its request was cancelled)
//! says nothing about the session. Its waiters are released without an
//! outcome and go back through the gate, where one of them takes over.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::RefreshFailure;

pub(crate) type RefreshOutcome = Result<(), RefreshFailure>;

#[derive(Default)]
struct GateState {
    in_flight: bool,
    pending: Vec<oneshot::Sender<RefreshOutcome>>,
}

#[derive(Default)]
pub(crate) struct RefreshGate {
    state: Mutex<GateState>,
}

pub(crate) enum Ticket<'a> {
    /// No refresh was running; the holder must perform one and resolve it.
    Leader(LeaderGuard<'a>),
    /// A refresh is running; wait for its outcome.
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

impl RefreshGate {
    pub fn enter(&self) -> Ticket<'_> {
        let mut state = self.state.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.pending.push(tx);
            Ticket::Waiter(rx)
        } else {
            state.in_flight = true;
            Ticket::Leader(LeaderGuard {
                gate: self,
                settled: false,
            })
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Clear the flag and take every parked request
    fn drain(&self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        let mut state = self.state.lock();
        state.in_flight = false;
        std::mem::take(&mut state.pending)
    }
}

/// Proof that the holder owns the current refresh. Dropping it without
/// calling `resolve` clears the flag and releases the queue empty-handed.
pub(crate) struct LeaderGuard<'a> {
    gate: &'a RefreshGate,
    settled: bool,
}

impl LeaderGuard<'_> {
    /// Hand the outcome to every parked request. Returns how many were released.
    pub fn resolve(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        let pending = self.gate.drain();
        let released = pending.len();
        for waiter in pending {
            // A waiter whose request was dropped no longer cares
            let _ = waiter.send(outcome.clone());
        }
        released
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            // Dropping the senders wakes every waiter with no outcome
            drop(self.gate.drain());
        }
    }
}

/// Wait for the leader's outcome. `None` means the leader went away without
/// one and the caller should enter the gate again.
pub(crate) async fn wait(rx: oneshot::Receiver<RefreshOutcome>) -> Option<RefreshOutcome> {
    rx.await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_leader(ticket: Ticket<'_>) -> LeaderGuard<'_> {
        match ticket {
            Ticket::Leader(guard) => guard,
            Ticket::Waiter(_) => panic!("expected to lead the refresh"),
        }
    }

    fn expect_waiter(ticket: Ticket<'_>) -> oneshot::Receiver<RefreshOutcome> {
        match ticket {
            Ticket::Waiter(rx) => rx,
            Ticket::Leader(_) => panic!("expected to wait on the refresh"),
        }
    }

    #[tokio::test]
    async fn test_only_first_caller_leads() {
        let gate = RefreshGate::default();
        let leader = expect_leader(gate.enter());
        let first = expect_waiter(gate.enter());
        let second = expect_waiter(gate.enter());
        assert!(gate.is_refreshing());
        assert_eq!(gate.pending_len(), 2);

        assert_eq!(leader.resolve(Ok(())), 2);
        assert!(!gate.is_refreshing());
        assert_eq!(gate.pending_len(), 0);
        assert_eq!(wait(first).await, Some(Ok(())));
        assert_eq!(wait(second).await, Some(Ok(())));
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter() {
        let gate = RefreshGate::default();
        let leader = expect_leader(gate.enter());
        let waiters: Vec<_> = (0..3).map(|_| expect_waiter(gate.enter())).collect();

        leader.resolve(Err(RefreshFailure::new("Invalid token")));

        for rx in waiters {
            assert_eq!(wait(rx).await, Some(Err(RefreshFailure::new("Invalid token"))));
        }
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_queue_without_outcome() {
        let gate = RefreshGate::default();
        let leader = expect_leader(gate.enter());
        let rx = expect_waiter(gate.enter());

        drop(leader);

        assert!(!gate.is_refreshing());
        assert_eq!(gate.pending_len(), 0);
        assert_eq!(wait(rx).await, None);
        // The released waiter can take over
        expect_leader(gate.enter()).resolve(Ok(()));
    }

    #[test]
    fn test_next_failure_after_settle_starts_new_refresh() {
        let gate = RefreshGate::default();
        expect_leader(gate.enter()).resolve(Ok(()));
        let again = expect_leader(gate.enter());
        again.resolve(Err(RefreshFailure::new("expired")));
        expect_leader(gate.enter()).resolve(Ok(()));
    }
}
