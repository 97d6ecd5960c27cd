// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::loader::load_config;
use crate::runtime::AcquisitionRuntime;
use crate::shutdown::ShutdownCoordinator;

use super::open_transport;

/// Executes the `run` command: acquire until interrupted.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let mut config = load_config(&cli.config)?;
    if let Some(max) = args.max_batches {
        config.runner.max_batches = Some(max);
    }
    if let Some(timeout) = args.read_timeout {
        config.runner.read_timeout = timeout;
    }

    let (transport, _ticker) = open_transport(&config, args.simulate)?;

    let shutdown = ShutdownCoordinator::new();
    let listener = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.wait_for_shutdown().await })
    };

    info!(endpoint = %config.connector.endpoint, "Starting opcbridge");
    let mut runtime = AcquisitionRuntime::new(config, transport, shutdown);
    let mut stdout = std::io::stdout();
    let result = runtime.run(&mut stdout).await;

    listener.abort();
    result.map(|_| ())
}
