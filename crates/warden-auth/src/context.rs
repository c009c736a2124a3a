//! Per-request cancellation and deadlines.
//!
//! A [`RequestContext`] travels with every call the warden makes into a
//! store. When its token is cancelled or its deadline passes, the in-flight
//! future is dropped and the call fails with [`AuthError::Cancelled`].
//! Dropping a PostgreSQL transaction mid-flight rolls it back.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{AuthError, AuthResult};

/// Cancellation handle and optional deadline for one inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context cancelled together with `token`.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Returns a copy of this context that expires after `timeout`.
    ///
    /// An earlier deadline already on the context wins. A timeout too large
    /// to represent leaves the context as it is.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let Some(candidate) = Instant::now().checked_add(timeout) else {
            return self;
        };
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// Returns a child context; cancelling the child leaves `self` untouched.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Runs `fut` unless the context is cancelled or times out first.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Cancelled`] if the context finishes before the
    /// future, otherwise whatever the future returns.
    pub async fn run<T, F>(&self, fut: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(AuthError::cancelled("request cancelled"));
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AuthError::cancelled("request cancelled")),
            () = deadline => Err(AuthError::cancelled("deadline exceeded")),
            res = fut => res,
        }
    }
}
