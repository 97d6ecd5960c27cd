// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Heartbeat watchdog.
//!
//! The delivery task calls [`HeartbeatMonitor::observe`] whenever the
//! heartbeat node reports a value; `read_batch` calls
//! [`HeartbeatMonitor::check`] before waiting for data. The last observation
//! is a single atomic, so neither side takes a lock.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{OpcUaError, OpcUaResult};
use crate::types::NodeId;

// =============================================================================
// Clock
// =============================================================================

/// Source of monotonic milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the clock's origin. Never goes backwards.
    fn now_millis(&self) -> i64;
}

/// The system's monotonic clock, counted from its creation.
///
/// Wall-clock adjustments do not move it.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock at `start_millis`.
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Sets the clock.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

// =============================================================================
// HeartbeatMonitor
// =============================================================================

/// Liveness watchdog over one node's update cadence.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    target: NodeId,
    upper_bound: Duration,
    last_observed: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl HeartbeatMonitor {
    /// Creates a monitor armed at the current time.
    pub fn new(target: NodeId, upper_bound: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            target,
            upper_bound,
            last_observed: AtomicI64::new(now),
            clock,
        }
    }

    /// The heartbeat node.
    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// The staleness bound.
    pub fn upper_bound(&self) -> Duration {
        self.upper_bound
    }

    /// Records an update of the heartbeat node.
    pub fn observe(&self) {
        self.last_observed
            .store(self.clock.now_millis(), Ordering::Release);
    }

    /// Time since the last observed update.
    pub fn elapsed(&self) -> Duration {
        let last = self.last_observed.load(Ordering::Acquire);
        let delta = self.clock.now_millis().saturating_sub(last);
        Duration::from_millis(delta.max(0) as u64)
    }

    /// Returns `true` once the bound has been exceeded.
    pub fn is_stale(&self) -> bool {
        self.elapsed() > self.upper_bound
    }

    /// Fails with `NotConnected` when the heartbeat is stale.
    pub fn check(&self) -> OpcUaResult<()> {
        let elapsed = self.elapsed();
        if elapsed > self.upper_bound {
            return Err(OpcUaError::not_connected(format!(
                "heartbeat {} silent for {} (bound {})",
                self.target,
                humantime::format_duration(elapsed),
                humantime::format_duration(self.upper_bound),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(clock: &Arc<ManualClock>) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            NodeId::standard(2258),
            Duration::from_secs(10),
            clock.clone(),
        )
    }

    #[test]
    fn test_fresh_monitor_is_alive() {
        let clock = Arc::new(ManualClock::new(1_000));
        let monitor = monitor(&clock);
        assert!(monitor.check().is_ok());
        assert_eq!(monitor.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_observation_resets_staleness() {
        let clock = Arc::new(ManualClock::new(0));
        let monitor = monitor(&clock);

        clock.advance(Duration::from_secs(9));
        monitor.observe();
        clock.advance(Duration::from_secs(9));
        assert!(monitor.check().is_ok());

        clock.advance(Duration::from_secs(2));
        assert!(monitor.is_stale());
        let err = monitor.check().unwrap_err();
        assert!(err.is_not_connected());
        assert!(err.to_string().contains("i=2258"));
    }

    #[test]
    fn test_bound_is_exclusive() {
        let clock = Arc::new(ManualClock::new(0));
        let monitor = monitor(&clock);
        clock.advance(Duration::from_secs(10));
        assert!(monitor.check().is_ok());
        clock.advance(Duration::from_millis(1));
        assert!(monitor.check().is_err());
    }

    #[test]
    fn test_clock_going_backwards_is_not_stale() {
        let clock = Arc::new(ManualClock::new(50_000));
        let monitor = monitor(&clock);
        clock.set(0);
        assert_eq!(monitor.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now_millis();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.now_millis();
        assert!(first >= 0);
        assert!(second >= first + 5);
    }
}
