// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Acquisition runtime.
//!
//! Drives one connector through `connect`, repeated `read_batch` and
//! `close`, writing every record as a JSON line. A lost session is closed
//! and reconnected after `reconnect_delay`; shutdown cancels the in-flight
//! read through the shared [`Context`].
//!
//! ```text
//!   connect ──► read_batch ──► write JSON lines ──► ack
//!      ▲            │
//!      │            ├─ DeadlineExceeded ─► next read
//!      │            ├─ NotConnected ────► close, wait, reconnect
//!      │            └─ Cancelled ───────► close, stop
//!      └────────────────────────────────────────────┘
//! ```

use std::io::Write;
use std::time::Duration;

use opcbridge_opcua::{Context, OpcUaConnector, OpcUaError, OpcUaTransport, RecordBatch};
use tracing::{debug, info, warn};

use crate::error::{BinError, BinResult};
use crate::loader::{BridgeConfig, RunnerConfig};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// AcquisitionRuntime
// =============================================================================

/// Runs the acquisition loop until shutdown or `max_batches`.
pub struct AcquisitionRuntime {
    connector: OpcUaConnector,
    runner: RunnerConfig,
    shutdown: ShutdownCoordinator,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches read.
    pub batches: u64,
    /// Records written.
    pub records: u64,
    /// Reconnects after a lost session.
    pub reconnects: u64,
}

impl AcquisitionRuntime {
    /// Creates a runtime over `transport`.
    pub fn new(
        config: BridgeConfig,
        transport: Box<dyn OpcUaTransport>,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            connector: OpcUaConnector::new(config.connector, transport),
            runner: config.runner,
            shutdown,
        }
    }

    /// Returns the connector.
    pub fn connector(&self) -> &OpcUaConnector {
        &self.connector
    }

    /// Runs the loop, writing records to `out`.
    pub async fn run<W: Write>(&mut self, out: &mut W) -> BinResult<RunSummary> {
        let (root, cancel) = Context::with_cancel();
        let watcher = self.shutdown.cancel_on_shutdown(cancel);

        let result = self.acquire(&root, out).await;

        watcher.abort();
        let _ = self.connector.close(&Context::with_timeout(Duration::from_secs(5))).await;

        if let Ok(summary) = &result {
            let stats = self.connector.stats().snapshot();
            info!(
                batches = summary.batches,
                records = summary.records,
                reconnects = summary.reconnects,
                dropped = stats.dropped_values,
                heartbeat_failures = stats.heartbeat_failures,
                "Acquisition stopped"
            );
        }
        result
    }

    async fn acquire<W: Write>(&mut self, root: &Context, out: &mut W) -> BinResult<RunSummary> {
        let mut summary = RunSummary::default();

        match self.connector.connect(root).await {
            Ok(()) => {}
            Err(OpcUaError::Cancelled { .. }) => return Ok(summary),
            Err(e) => return Err(BinError::from(e).with_context("initial connect failed")),
        }
        info!(
            endpoint = %self.connector.config().endpoint,
            targets = self.connector.targets().len(),
            subscribed = self.connector.is_subscribed(),
            "Acquisition started"
        );

        loop {
            if self.shutdown.is_shutdown_initiated() {
                return Ok(summary);
            }
            if self
                .runner
                .max_batches
                .is_some_and(|max| summary.batches >= max)
            {
                debug!(batches = summary.batches, "Batch limit reached");
                return Ok(summary);
            }

            let ctx = root.child_with_timeout(self.runner.read_timeout);
            match self.connector.read_batch(&ctx).await {
                Ok((batch, ack)) => {
                    summary.batches += 1;
                    summary.records += batch.len() as u64;
                    if !(batch.is_empty() && self.runner.skip_empty) {
                        if let Err(e) = write_batch(out, &batch) {
                            ack.nack("output write failed");
                            return Err(e);
                        }
                    }
                    ack.ack();

                    if !self.connector.is_subscribed() && !pause(root, self.runner.poll_interval).await {
                        return Ok(summary);
                    }
                }
                Err(e) if e.is_deadline_exceeded() => {
                    debug!("No data before read deadline");
                }
                Err(OpcUaError::Cancelled { .. }) => return Ok(summary),
                Err(e) if e.is_not_connected() || !self.connector.state().is_connected() => {
                    warn!(error = %e, delay = ?self.runner.reconnect_delay, "Session lost, reconnecting");
                    if !self.reconnect(root).await {
                        return Ok(summary);
                    }
                    summary.reconnects += 1;
                }
                Err(e) => {
                    e.log("read_batch");
                    let delay = e.suggested_retry_delay().unwrap_or(self.runner.poll_interval);
                    if !pause(root, delay).await {
                        return Ok(summary);
                    }
                }
            }
        }
    }

    /// Closes and reopens the session. Returns `false` once shut down.
    async fn reconnect(&mut self, root: &Context) -> bool {
        loop {
            let _ = self.connector.close(root).await;
            if !pause(root, self.runner.reconnect_delay).await {
                return false;
            }

            match self.connector.connect(root).await {
                Ok(()) => {
                    info!(targets = self.connector.targets().len(), "Reconnected");
                    return true;
                }
                Err(OpcUaError::Cancelled { .. }) => return false,
                Err(e) => e.log("reconnect"),
            }
        }
    }
}

/// Sleeps for `duration` under `root`. Returns `false` if cancelled.
async fn pause(root: &Context, duration: Duration) -> bool {
    let ctx = root.child_with_timeout(duration);
    !matches!(
        ctx.run("pause", std::future::pending::<Result<(), OpcUaError>>())
            .await,
        Err(OpcUaError::Cancelled { .. })
    )
}

/// Writes each record of `batch` as one JSON line.
pub fn write_batch<W: Write>(out: &mut W, batch: &RecordBatch) -> BinResult<()> {
    for record in batch {
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
