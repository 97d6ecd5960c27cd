// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `browse` command.

use std::time::Duration;

use opcbridge_opcua::{Context, OpcUaConnector};

use crate::cli::{BrowseArgs, Cli, OutputFormat};
use crate::error::BinResult;
use crate::loader::load_config;

use super::open_transport;

/// Connects once, prints the server information and acquisition targets,
/// then closes.
pub async fn browse(cli: &Cli, args: BrowseArgs) -> BinResult<()> {
    let config = load_config(&cli.config)?;
    let (transport, _ticker) = open_transport(&config, args.simulate)?;

    let mut connector = OpcUaConnector::new(config.connector, transport);
    let ctx = Context::with_timeout(config.runner.read_timeout.max(Duration::from_secs(30)));
    connector.connect(&ctx).await?;

    let info = connector.get_server_information(&ctx).await;
    let result = match info {
        Ok(info) => print(&connector, &info, args.format),
        Err(e) => Err(e.into()),
    };

    connector.close(&Context::with_timeout(Duration::from_secs(5))).await?;
    result
}

fn print(
    connector: &OpcUaConnector,
    info: &opcbridge_opcua::ServerInfo,
    format: OutputFormat,
) -> BinResult<()> {
    let targets = connector.targets();
    match format {
        OutputFormat::Text => {
            println!("Server: {} {} ({})", info.manufacturer_name, info.product_name, info.software_version);
            println!("Endpoint: {}", connector.config().endpoint);
            println!("Targets: {}", targets.len());
            for target in targets {
                println!(
                    "  {:<40} {:<8} {}",
                    target.metadata.tag_path,
                    target.metadata.tag_type.as_str(),
                    target.node_id
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "server": info,
                "endpoint": connector.config().endpoint,
                "targets": targets
                    .iter()
                    .map(|t| serde_json::json!({
                        "node_id": t.node_id.to_string(),
                        "data_type": t.data_type.to_string(),
                        "metadata": t.metadata.to_map(),
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
