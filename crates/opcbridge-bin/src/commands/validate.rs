// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use opcbridge_opcua::parse_node_ids;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::BinResult;
use crate::loader::{load_config, BridgeConfig};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config = load_config(&cli.config)?;
    let warnings = warnings(&config);

    match args.format {
        OutputFormat::Text => {
            let connector = &config.connector;
            println!("✓ Configuration is valid: {}", cli.config.display());
            println!();
            println!("Summary:");
            println!("  Endpoint:     {}", connector.endpoint);
            println!("  Security:     {} / {}", connector.security_mode, connector.security_policy);
            println!(
                "  Identity:     {}",
                if connector.username.is_empty() { "anonymous" } else { connector.username.as_str() }
            );
            println!("  Seeds:        {}", connector.node_ids.len());
            println!("  Mode:         {}", if connector.subscribe_enabled { "subscribe" } else { "poll" });
            println!(
                "  Heartbeat:    {}",
                if connector.use_heartbeat { connector.heartbeat_node_id.as_str() } else { "disabled" }
            );

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": cli.config.display().to_string(),
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Non-fatal findings: unparsable seeds and risky certificate settings.
fn warnings(config: &BridgeConfig) -> Vec<String> {
    let connector = &config.connector;
    let mut warnings: Vec<String> = connector
        .node_ids
        .iter()
        .zip(parse_node_ids(&connector.node_ids))
        .filter_map(|(raw, parsed)| {
            parsed
                .err()
                .map(|e| format!("Seed '{}' will be skipped: {}", raw, e))
        })
        .collect();

    if connector.node_ids.is_empty() {
        warnings.push("No seed node ids; the whole Objects folder will be browsed".to_string());
    }
    if connector.trust_server_certs && !connector.security_mode.is_none() {
        warnings.push("trust_server_certs accepts any server certificate".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_config_str, ConfigFormat};

    #[test]
    fn test_warnings_for_bad_seed_and_empty_list() {
        let config = load_config_str(
            "connector:\n  endpoint: opc.tcp://localhost:4840\n  node_ids: [\"ns=3;s=Basic\", \"ns=x;i=1\"]\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        let found = warnings(&config);
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("ns=x;i=1"));

        let empty = load_config_str(
            "connector:\n  endpoint: opc.tcp://localhost:4840\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert!(warnings(&empty)[0].contains("Objects folder"));
    }
}
