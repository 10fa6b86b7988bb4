//! Single-flight credential refresh.
//!
//! ```text
//!            401 (not the refresh endpoint)
//!   Idle ───────────────────────────────▶ Refreshing ──┐
//!    ▲     start one refresh call,                      │ more 401s join the
//!    │     register as first waiter                     │ waiter set, no new call
//!    │                                                  ◀┘
//!    └──── refresh settles: persist or clear the session,
//!          go Idle, hand the same outcome to every waiter
//! ```
//!
//! `(state, waiters)` sit behind one mutex and every check-then-act on them happens in a
//! single critical section, so two requests can never both see `Idle` and both start a
//! refresh. The refresh call runs on its own task: a caller that gives up (its future is
//! dropped) only loses its own replay, never the refresh or the other waiters.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, Failure, NormalizedError, TransportError};
use crate::session::{Credential, Identity, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// What every waiter of one refresh round receives.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed(Credential),
    Failed(NormalizedError),
}

/// The network half of a refresh: exchange the current credential for a new session.
pub type RefreshCall = BoxFuture<'static, Result<(Credential, Identity), NormalizedError>>;

struct Inner {
    state: RefreshState,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    rounds: u64,
}

pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
    session: Arc<SessionStore>,
    timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(session: Arc<SessionStore>, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner { state: RefreshState::Idle, waiters: Vec::new(), rounds: 0 }),
            session,
            timeout,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> { &self.session }

    pub fn state(&self) -> RefreshState { self.inner.lock().state }

    /// Requests currently suspended on the in-flight refresh.
    pub fn waiting(&self) -> usize { self.inner.lock().waiters.len() }

    /// Refresh calls started since construction.
    pub fn rounds(&self) -> u64 { self.inner.lock().rounds }

    /// Obtain a usable credential after a 401.
    ///
    /// `rejected` is the token the failing request carried. If the store already holds a
    /// different live credential (a refresh finished while that request was on the wire)
    /// it is handed back without another refresh. `None` forces a refresh, or joins the one
    /// in flight. `start` is only invoked when this call opens a new round.
    pub async fn recover<F>(self: &Arc<Self>, rejected: Option<&str>, start: F) -> RefreshOutcome
    where
        F: FnOnce() -> RefreshCall,
    {
        // Read (and possibly purge) storage before locking; only the comparison is done under the lock.
        let current = rejected.and_then(|_| self.session.get_token());
        let (rx, round) = {
            let mut inner = self.inner.lock();
            let (tx, rx) = oneshot::channel();
            match inner.state {
                RefreshState::Idle => {
                    if let (Some(rejected), Some(current)) = (rejected, current) {
                        if current.token() != rejected {
                            debug!(target: "refresh", "credential already replaced; skipping refresh");
                            return RefreshOutcome::Refreshed(current);
                        }
                    }
                    inner.state = RefreshState::Refreshing;
                    inner.rounds += 1;
                    inner.waiters.push(tx);
                    (rx, Some(inner.rounds))
                }
                RefreshState::Refreshing => {
                    inner.waiters.push(tx);
                    debug!(target: "refresh", "joined in-flight refresh ({} waiting)", inner.waiters.len());
                    (rx, None)
                }
            }
        };

        if let Some(round) = round {
            info!(target: "refresh", "starting credential refresh round {}", round);
            // state is already Refreshing, so a panic here must still settle the round
            let call: RefreshCall = match std::panic::catch_unwind(AssertUnwindSafe(start)) {
                Ok(call) => call,
                Err(_) => {
                    error!(target: "refresh", "refresh round {} panicked before starting", round);
                    Box::pin(async { Err::<(Credential, Identity), _>(NormalizedError::local("credential refresh failed unexpectedly")) })
                }
            };
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run(round, call).await });
        }

        match rx.await {
            Ok(outcome) => outcome,
            // only reachable if the refresh task was torn down with the runtime
            Err(_) => RefreshOutcome::Failed(NormalizedError::local("credential refresh was abandoned")),
        }
    }

    async fn run(self: Arc<Self>, round: u64, call: RefreshCall) {
        let result = match tokio::time::timeout(self.timeout, AssertUnwindSafe(call).catch_unwind()).await {
            Ok(Ok(r)) => r,
            Ok(Err(_)) => {
                error!(target: "refresh", "refresh round {} panicked", round);
                Err(NormalizedError::local("credential refresh failed unexpectedly"))
            }
            Err(_) => {
                warn!(target: "refresh", "refresh round {} timed out after {:?}", round, self.timeout);
                Err(NormalizedError::new(
                    ErrorKind::Unknown,
                    "Credential refresh timed out.",
                    Failure::Transport(TransportError::Timeout(self.timeout)),
                ))
            }
        };

        // Persist before going Idle so anything that observes Idle also sees the new credential.
        let outcome = match result {
            Ok((credential, identity)) => match self.session.set_session(&credential, &identity) {
                Ok(()) => {
                    info!(target: "refresh", "refresh round {} succeeded for {}", round, identity.username);
                    RefreshOutcome::Refreshed(credential)
                }
                Err(e) => {
                    error!(target: "refresh", "refresh round {}: cannot persist session: {}", round, e);
                    self.session.clear_session();
                    RefreshOutcome::Failed(NormalizedError::local(format!("cannot persist refreshed session: {}", e)))
                }
            },
            Err(err) => {
                warn!(target: "refresh", "refresh round {} failed: {}; clearing session", round, err);
                self.session.clear_session();
                RefreshOutcome::Failed(err)
            }
        };

        let waiters = {
            let mut inner = self.inner.lock();
            inner.state = RefreshState::Idle;
            std::mem::take(&mut inner.waiters)
        };
        debug!(target: "refresh", "refresh round {} resolving {} waiter(s)", round, waiters.len());
        for w in waiters {
            // a dropped receiver is a cancelled request; nothing to deliver
            let _ = w.send(outcome.clone());
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod refresh_tests;
