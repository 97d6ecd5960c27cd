// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Deadline and cancellation propagation for connector operations.
//!
//! Every public connector operation takes a [`Context`]. A context is cheap to
//! clone and may carry a deadline, a cancellation signal, or both.
//!
//! ```
//! use std::time::Duration;
//! use opcbridge_opcua::context::Context;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ctx = Context::with_timeout(Duration::from_millis(10));
//! let err = ctx
//!     .run("sleep", async {
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!         Ok::<_, opcbridge_opcua::OpcUaError>(())
//!     })
//!     .await
//!     .unwrap_err();
//! assert!(err.is_deadline_exceeded());
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{OpcUaError, OpcUaResult};

/// Deadline and cancellation scope of a single operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Triggers cancellation of every [`Context`] derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels the associated contexts.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns `true` once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that never expires.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context expiring after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    /// A context expiring at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// A cancellable context and its handle.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    /// Derives a context whose deadline is the earlier of this one's and
    /// `now + timeout`. Cancellation is inherited.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline. `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` if the cancellation signal has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Returns `true` if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// Fails fast if the context is already done.
    pub fn check(&self, operation: &str) -> OpcUaResult<()> {
        if self.is_cancelled() {
            return Err(OpcUaError::cancelled(operation));
        }
        if self.is_expired() {
            return Err(OpcUaError::deadline_exceeded(operation));
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the deadline passes, or the context is
    /// cancelled. The future is dropped in the latter two cases.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> OpcUaResult<T>
    where
        F: Future<Output = OpcUaResult<T>>,
    {
        self.check(operation)?;

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            match cancel.as_mut() {
                Some(rx) => loop {
                    if *rx.borrow_and_update() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        // Handle dropped without cancelling.
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(OpcUaError::cancelled(operation)),
            result = fut => result,
            _ = deadline => Err(OpcUaError::deadline_exceeded(operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_never_expires() {
        let ctx = Context::background();
        assert!(ctx.remaining().is_none());
        let value = ctx.run("op", async { Ok::<_, OpcUaError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run("wait", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, OpcUaError>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert!(ctx.is_expired());
    }

    #[tokio::test]
    async fn test_cancel() {
        let (ctx, handle) = Context::with_cancel();
        assert!(!handle.is_cancelled());

        let task = tokio::spawn(async move {
            ctx.run("wait", std::future::pending::<OpcUaResult<()>>())
                .await
        });
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.category(), "deadline");
        assert!(matches!(err, OpcUaError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_already_cancelled_fails_fast() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();
        assert!(ctx.check("op").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_deadline() {
        let parent = Context::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.child_with_timeout(Duration::from_millis(100));
        assert!(shorter.deadline() < parent.deadline());
    }
}
