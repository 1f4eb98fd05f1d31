//! Process-wide login state for the upstream provider

use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Identifies one successful login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStamp {
    pub epoch: u64,
    pub authenticated_at: Instant,
}

struct Inner {
    current: Option<SessionStamp>,
    epoch: u64,
}

/// Authenticated-since marker, or nothing when logged out.
///
/// Every mutation is a single assignment under the write lock. Readers may see
/// a session that is about to be refreshed; upstream calls are retry-safe.
pub struct SessionState {
    inner: RwLock<Inner>,
    ttl: Duration,
}

impl SessionState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                current: None,
                epoch: 0,
            }),
            ttl,
        }
    }

    pub async fn stamp(&self) -> Option<SessionStamp> {
        self.inner.read().await.current
    }

    pub async fn is_fresh(&self) -> bool {
        match self.stamp().await {
            Some(stamp) => stamp.authenticated_at.elapsed() < self.ttl,
            None => false,
        }
    }

    pub async fn mark_authenticated(&self) -> SessionStamp {
        let mut inner = self.inner.write().await;
        inner.epoch += 1;
        let stamp = SessionStamp {
            epoch: inner.epoch,
            authenticated_at: Instant::now(),
        };
        inner.current = Some(stamp);
        stamp
    }

    pub async fn invalidate(&self) {
        self.inner.write().await.current = None;
    }

    /// Drop the session only if it is still the one `observed` when a request was sent.
    ///
    /// A 401 for a request sent under an older session must not log out a
    /// session another caller has just established.
    pub async fn invalidate_if(&self, observed: Option<SessionStamp>) -> bool {
        let mut inner = self.inner.write().await;
        if inner.current.is_some() && inner.current == observed {
            inner.current = None;
            true
        } else {
            false
        }
    }
}
