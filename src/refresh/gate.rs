use crate::error::RefreshError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// New access token, or the reason the session could not be refreshed.
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

struct GateState {
    phase: RefreshPhase,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    last_failure: Option<RefreshError>,
}

/// Single-slot coordination for token refresh: the first caller to [`enter`]
/// while idle becomes the leader and performs the refresh; everyone arriving
/// before it settles is queued and receives the leader's outcome in arrival
/// order.
///
/// The lock is never held across an await.
///
/// [`enter`]: RefreshGate::enter
#[derive(Clone)]
pub struct RefreshGate {
    state: Arc<Mutex<GateState>>,
}

pub enum Ticket {
    Leader(RefreshLease),
    Follower(Waiter),
}

/// Held by the request performing the refresh. Dropping it without calling
/// [`RefreshLease::settle`] settles the gate with [`RefreshError::Abandoned`].
pub struct RefreshLease {
    gate: RefreshGate,
    settled: bool,
}

pub struct Waiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                phase: RefreshPhase::Idle,
                waiters: VecDeque::new(),
                last_failure: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> RefreshPhase {
        self.lock().phase
    }

    pub fn pending(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Failure of the most recent refresh, cleared by the next successful one.
    pub fn last_failure(&self) -> Option<RefreshError> {
        self.lock().last_failure.clone()
    }

    pub fn forget_failure(&self) {
        self.lock().last_failure = None;
    }

    pub fn enter(&self) -> Ticket {
        let mut state = self.lock();
        match state.phase {
            RefreshPhase::Idle => {
                state.phase = RefreshPhase::Refreshing;
                Ticket::Leader(RefreshLease {
                    gate: self.clone(),
                    settled: false,
                })
            }
            RefreshPhase::Refreshing => Ticket::Follower(Self::queue(&mut state)),
        }
    }

    fn queue(state: &mut GateState) -> Waiter {
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        tracing::debug!(position = state.waiters.len(), "queued behind in-flight refresh");
        Waiter { rx }
    }

    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let mut state = self.lock();
        let waiters = std::mem::take(&mut state.waiters);
        let notified = waiters.len();
        for tx in waiters {
            // A waiter whose request future was dropped is simply skipped.
            let _ = tx.send(outcome.clone());
        }
        state.phase = RefreshPhase::Idle;
        state.last_failure = outcome.as_ref().err().cloned();
        match &outcome {
            Ok(_) => tracing::debug!(notified, "refresh settled ok"),
            Err(err) => tracing::debug!(notified, error = %err, "refresh settled with failure"),
        }
        notified
    }
}

impl RefreshLease {
    /// Hands the outcome to every queued waiter, oldest first, and returns the
    /// gate to idle. Returns how many waiters were notified.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.gate.settle(outcome)
    }
}

impl Drop for RefreshLease {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.settle(Err(RefreshError::Abandoned));
        }
    }
}

impl Waiter {
    pub async fn wait(self) -> RefreshOutcome {
        self.rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}
