//! Per-call context: session, deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use keystone_core::SessionId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Ambient data every service call carries.
///
/// Front-ends build one per request. The session identifier travels here
/// rather than in request bodies, so transactional requests only name their
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    session: Option<SessionId>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// A context with no session, no deadline and a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session identifier.
    #[must_use]
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    /// Fail the call once `deadline` passes.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail the call once `timeout` has elapsed from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Use an existing cancellation token, typically a child of the
    /// connection's token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The session the call runs in, if any.
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// The session the call runs in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSessionFound`] if the context carries none.
    pub fn require_session(&self) -> Result<&SessionId> {
        self.session.as_ref().ok_or(Error::NoSessionFound { session: None })
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The token that cancels this call.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the call is already cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] or [`Error::DeadlineExceeded`].
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the token is cancelled, or the
    /// deadline passes, whichever comes first.
    ///
    /// Only use this for work that is safe to abandon.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, [`Error::Cancelled`] or
    /// [`Error::DeadlineExceeded`].
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            () = deadline => Err(Error::DeadlineExceeded),
            out = fut => out,
        }
    }
}
