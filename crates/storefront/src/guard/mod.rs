//! Route protection bound to the live session.
//!
//! [`RoutePolicy`] is the pure table; [`RouteGuard`] evaluates it against the
//! committed actor, and [`PathWatch`] re-evaluates one path whenever the actor
//! changes so an earlier `Allow` cannot outlive a logout or expiry.

mod policy;

pub use policy::{Decision, PolicyEntry, RedirectReason, Requirement, RoutePolicy};

use std::sync::Arc;

use tokio::sync::watch;

use crate::session::{Phase, Session};

/// Evaluates the route policy against the current session.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    policy: Arc<RoutePolicy>,
    session: watch::Receiver<Session>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(policy: Arc<RoutePolicy>, session: watch::Receiver<Session>) -> Self {
        Self { policy, session }
    }

    #[must_use]
    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Decide against the committed actor.
    #[must_use]
    pub fn decide_current(&self, path: &str) -> Decision {
        self.policy.decide(path, &self.session.borrow().actor)
    }

    /// Decide once the session has resolved, so a protected page is not
    /// redirected while the startup session check is still running.
    pub async fn decide_resolved(&self, path: &str) -> Decision {
        let mut session = self.session.clone();
        if let Ok(resolved) = session.wait_for(|s| s.phase == Phase::Resolved).await {
            return self.policy.decide(path, &resolved.actor);
        }
        self.decide_current(path)
    }

    /// Follow the decision for `path` across actor changes.
    #[must_use]
    pub fn watch(&self, path: impl Into<String>) -> PathWatch {
        let mut session = self.session.clone();
        session.mark_unchanged();
        PathWatch {
            path: path.into(),
            policy: Arc::clone(&self.policy),
            session,
        }
    }
}

/// The guard decision for one path, kept current.
#[derive(Debug)]
pub struct PathWatch {
    path: String,
    policy: Arc<RoutePolicy>,
    session: watch::Receiver<Session>,
}

impl PathWatch {
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decision for the committed actor.
    #[must_use]
    pub fn current(&self) -> Decision {
        self.policy.decide(&self.path, &self.session.borrow().actor)
    }

    /// Wait for the next session transition and return the new decision.
    /// `None` once the session store is gone.
    pub async fn changed(&mut self) -> Option<Decision> {
        self.session.changed().await.ok()?;
        let session = self.session.borrow_and_update();
        Some(self.policy.decide(&self.path, &session.actor))
    }
}
