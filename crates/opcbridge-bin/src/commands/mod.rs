// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Acquire values and print JSON lines
//! - `browse`: List acquisition targets
//! - `validate`: Validate configuration file
//! - `version`: Show version information

mod browse;
mod run;
mod validate;
mod version;

pub use browse::browse;
pub use run::run;
pub use validate::validate;
pub use version::version;

use std::time::Duration;

use opcbridge_opcua::{OpcUaTransport, SimulatedServer, SimulatedTransport};
use tokio::task::JoinHandle;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;
use crate::loader::BridgeConfig;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Browse(args) => browse::browse(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}

/// Aborts the simulator signal task when dropped.
pub(crate) struct SimulatorTicker(JoinHandle<()>);

impl Drop for SimulatorTicker {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Opens the transport for `config`.
///
/// With `simulate`, the demo address space is served in memory and its
/// signals advance once per publishing interval.
pub(crate) fn open_transport(
    config: &BridgeConfig,
    simulate: bool,
) -> BinResult<(Box<dyn OpcUaTransport>, Option<SimulatorTicker>)> {
    if simulate {
        let server = SimulatedServer::demo();
        info!(endpoint = server.endpoint(), "Using simulated server");

        let interval = config.connector.publishing_interval.max(Duration::from_millis(10));
        let ticking = server.clone();
        let ticker = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                ticking.tick();
            }
        });

        let transport: Box<dyn OpcUaTransport> = Box::new(SimulatedTransport::new(server));
        return Ok((transport, Some(SimulatorTicker(ticker))));
    }

    Ok((real_transport()?, None))
}

#[cfg(feature = "real-transport")]
fn real_transport() -> BinResult<Box<dyn OpcUaTransport>> {
    Ok(Box::new(opcbridge_opcua::RealOpcUaTransport::new()))
}

#[cfg(not(feature = "real-transport"))]
fn real_transport() -> BinResult<Box<dyn OpcUaTransport>> {
    Err(crate::error::BinError::init(
        "built without the real-transport feature; rebuild with --features real-transport or pass --simulate",
    ))
}
