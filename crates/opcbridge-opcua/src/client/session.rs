// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session management.
//!
//! [`ConnectionManager`] owns the transport and the session state machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected ──close──▶ Closing ──▶ Disconnected
//!                               │                  │
//!                            timeout            fail()
//!                               ▼                  ▼
//!                             Failed ─────close──────────────────────────────▶ Disconnected
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::transport::{ConnectionParams, OpcUaTransport};
use crate::context::Context;
use crate::error::{ConnectionError, OpcUaError, OpcUaResult};

/// Upper bound for the best-effort transport release on close.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// SessionState
// =============================================================================

/// State of the connector session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session.
    #[default]
    Disconnected,

    /// Session establishment is in progress.
    Connecting,

    /// Session is active and ready for use.
    Connected,

    /// Session is being closed.
    Closing,

    /// Session has failed; only `close` is accepted.
    Failed,
}

impl SessionState {
    /// Returns `true` if the session is usable.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the session is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Closing)
    }

    /// Returns `true` if the session has failed.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Closing => write!(f, "Closing"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// ConnectionManager
// =============================================================================

/// Owns the transport and drives the session state machine.
pub struct ConnectionManager {
    transport: Box<dyn OpcUaTransport>,
    state: RwLock<SessionState>,
    endpoint: RwLock<String>,
    stats: SessionStats,
}

impl ConnectionManager {
    /// Creates a manager around a transport.
    pub fn new(transport: Box<dyn OpcUaTransport>) -> Self {
        Self {
            transport,
            state: RwLock::new(SessionState::Disconnected),
            endpoint: RwLock::new(String::new()),
            stats: SessionStats::new(),
        }
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Returns the session statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Returns the transport.
    pub fn transport(&self) -> &dyn OpcUaTransport {
        self.transport.as_ref()
    }

    /// Opens the session.
    ///
    /// Accepted only from `Disconnected`. A connect that runs past `timeout`
    /// or the context moves the session to `Failed`; any other failure
    /// returns it to `Disconnected`.
    pub async fn connect(
        &mut self,
        ctx: &Context,
        params: &ConnectionParams,
        timeout: Duration,
    ) -> OpcUaResult<()> {
        let current = self.state();
        if current != SessionState::Disconnected {
            return Err(ConnectionError::invalid_state(current).into());
        }

        *self.endpoint.write() = params.endpoint.clone();
        self.set_state(SessionState::Connecting);
        self.stats.record_attempt();

        tracing::debug!(
            endpoint = %params.endpoint,
            security_mode = %params.security_mode,
            security_policy = %params.security_policy,
            transport = %self.transport.display_name(),
            "Opening OPC UA session"
        );

        let scoped = ctx.child_with_timeout(timeout);
        let result = scoped.run("connect", self.transport.connect(params)).await;

        match result {
            Ok(()) => {
                self.set_state(SessionState::Connected);
                self.stats.record_connect();
                tracing::info!(endpoint = %params.endpoint, "OPC UA session connected");
                Ok(())
            }
            Err(e @ (OpcUaError::DeadlineExceeded { .. } | OpcUaError::Cancelled { .. })) => {
                self.set_state(SessionState::Failed);
                self.stats.record_failure();
                tracing::warn!(endpoint = %params.endpoint, error = %e, "OPC UA connect aborted");
                if e.is_deadline_exceeded() {
                    Err(ConnectionError::timed_out(&params.endpoint, timeout).into())
                } else {
                    Err(e)
                }
            }
            Err(e) => {
                self.release().await;
                self.set_state(SessionState::Disconnected);
                self.stats.record_failure();
                e.log("connect");
                Err(e)
            }
        }
    }

    /// Closes the session.
    ///
    /// Always ends in `Disconnected` and always succeeds; release errors are
    /// logged. Safe to call repeatedly. The release runs under its own
    /// deadline, so a caller context that is already expired or cancelled
    /// still frees the server-side session.
    pub async fn close(&mut self, ctx: &Context) -> OpcUaResult<()> {
        let current = self.state();
        if current == SessionState::Disconnected {
            return Ok(());
        }

        self.set_state(SessionState::Closing);

        if let Err(e) = ctx.check("close") {
            tracing::debug!(error = %e, "Caller context done, releasing session anyway");
        }
        let release = Context::with_timeout(RELEASE_TIMEOUT);
        if let Err(e) = release.run("close", self.transport.disconnect()).await {
            tracing::warn!(
                endpoint = %self.endpoint.read(),
                error = %e,
                "Error while releasing OPC UA session"
            );
        }

        self.set_state(SessionState::Disconnected);
        self.stats.record_close();
        tracing::info!(endpoint = %self.endpoint.read(), "OPC UA session closed");
        Ok(())
    }

    /// Forces the session into `Failed`.
    pub fn fail(&self, reason: &str) {
        let current = self.state();
        if matches!(current, SessionState::Failed | SessionState::Disconnected) {
            return;
        }
        self.set_state(SessionState::Failed);
        self.stats.record_failure();
        tracing::warn!(
            endpoint = %self.endpoint.read(),
            reason = reason,
            "OPC UA session failed"
        );
    }

    /// Returns `NotConnected` unless the session is `Connected`.
    pub fn ensure_connected(&self) -> OpcUaResult<()> {
        let current = self.state();
        if current.is_connected() {
            Ok(())
        } else {
            Err(OpcUaError::not_connected(format!("session is {}", current)))
        }
    }

    async fn release(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            tracing::debug!(error = %e, "Ignoring release error after failed connect");
        }
    }

    fn set_state(&self, new_state: SessionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            tracing::trace!(
                old_state = %old_state,
                new_state = %new_state,
                "Session state changed"
            );
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &*self.endpoint.read())
            .field("state", &self.state())
            .field("transport", &self.transport.display_name())
            .finish()
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Statistics for session operations.
#[derive(Debug, Default)]
pub struct SessionStats {
    attempts: AtomicU64,
    connects: AtomicU64,
    failures: AtomicU64,
    closes: AtomicU64,
}

impl SessionStats {
    /// Creates new session statistics.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of connect attempts.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Number of successful connects.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Number of failed connects and forced failures.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Number of closes.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::simulator::{SimulatedServer, SimulatedTransport};
    use crate::config::ConnectorConfig;
    use crate::types::{SecurityMode, SecurityPolicy};

    fn params(server: &SimulatedServer) -> ConnectionParams {
        ConnectionParams::from_config(&ConnectorConfig::new(server.endpoint()))
    }

    fn manager(server: &SimulatedServer) -> ConnectionManager {
        ConnectionManager::new(Box::new(SimulatedTransport::new(server.clone())))
    }

    #[test]
    fn test_session_state() {
        assert!(SessionState::Connected.is_connected());
        assert!(!SessionState::Failed.is_connected());
        assert!(SessionState::Connecting.is_transitioning());
        assert!(SessionState::Closing.is_transitioning());
        assert!(SessionState::Failed.is_failed());
    }

    #[tokio::test]
    async fn test_connect_and_close() {
        let server = SimulatedServer::new();
        let mut manager = manager(&server);
        let ctx = Context::background();

        manager
            .connect(&ctx, &params(&server), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(manager.state(), SessionState::Connected);
        assert!(manager.ensure_connected().is_ok());

        let err = manager
            .connect(&ctx, &params(&server), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Connection(ConnectionError::InvalidState { .. })
        ));

        manager.close(&ctx).await.unwrap();
        manager.close(&ctx).await.unwrap();
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(manager.stats().connects(), 1);
        assert_eq!(manager.stats().closes(), 1);
    }

    #[tokio::test]
    async fn test_rejected_connect_stays_reusable() {
        let server = SimulatedServer::new();
        server.require_user("operator", "secret");
        let mut manager = manager(&server);
        let ctx = Context::background();

        let err = manager
            .connect(&ctx, &params(&server), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Connection(ConnectionError::AuthenticationFailed { .. })
        ));
        assert_eq!(manager.state(), SessionState::Disconnected);

        let mut good = params(&server);
        good.credentials = crate::types::Credentials::from_parts("operator", "secret");
        manager
            .connect(&ctx, &good, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(manager.state().is_connected());
    }

    #[tokio::test]
    async fn test_security_mismatch_is_connection_error() {
        let server = SimulatedServer::new();
        let mut manager = manager(&server);
        let mut secure = params(&server);
        secure.security_mode = SecurityMode::SignAndEncrypt;
        secure.security_policy = SecurityPolicy::Basic256Sha256;

        let err = manager
            .connect(&Context::background(), &secure, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Connection(ConnectionError::NoMatchingEndpoint { .. })
        ));
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_connect_fails_session() {
        let server = SimulatedServer::new();
        server.set_connect_delay(Duration::from_secs(30));
        let mut manager = manager(&server);
        let ctx = Context::background();

        let err = manager
            .connect(&ctx, &params(&server), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Connection(ConnectionError::TimedOut { .. })
        ));
        assert_eq!(manager.state(), SessionState::Failed);

        // Only close is accepted from Failed.
        assert!(manager
            .connect(&ctx, &params(&server), Duration::from_millis(100))
            .await
            .is_err());
        manager.close(&ctx).await.unwrap();
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_fail_and_ensure_connected() {
        let server = SimulatedServer::new();
        let mut manager = manager(&server);
        let ctx = Context::background();
        manager
            .connect(&ctx, &params(&server), Duration::from_secs(1))
            .await
            .unwrap();

        manager.fail("heartbeat stale");
        assert!(manager.state().is_failed());
        assert!(manager.ensure_connected().unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn test_close_with_done_context_releases_session() {
        let server = SimulatedServer::new();
        let mut manager = manager(&server);
        manager
            .connect(&Context::background(), &params(&server), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(server.active_sessions(), 1);

        manager
            .close(&Context::with_timeout(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(server.active_sessions(), 0);

        let (ctx, cancel) = Context::with_cancel();
        cancel.cancel();
        manager
            .connect(&Context::background(), &params(&server), Duration::from_secs(1))
            .await
            .unwrap();
        manager.close(&ctx).await.unwrap();
        assert_eq!(server.active_sessions(), 0);
    }
}
