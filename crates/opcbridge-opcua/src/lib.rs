// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA data acquisition for opcbridge.
//!
//! The crate connects to an OPC UA server, discovers variables under a set
//! of seed nodes, and hands their values to a host pipeline as batches of
//! normalized records.
//!
//! # Features
//!
//! - Node id parsing for every identifier kind
//! - Address-space browsing with cycle safety and derived tag metadata
//! - Subscription or poll acquisition
//! - Heartbeat watchdog for half-open connections
//! - Security modes: None, Sign, SignAndEncrypt
//! - Value normalization into JSON-friendly shapes
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Parse             - Malformed node id text
//! ├── Connection        - Endpoint, security and authentication issues
//! ├── NotConnected      - No usable session (including a stale heartbeat)
//! ├── DeadlineExceeded  - Caller deadline elapsed
//! ├── Cancelled         - Caller cancelled
//! ├── Browse            - One branch failed to enumerate
//! ├── Operation         - Read failures
//! ├── Subscription      - Subscription and monitoring errors
//! ├── Conversion        - Values with no normalized shape
//! └── Configuration     - Invalid settings
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use opcbridge_opcua::{ConnectorConfig, Context, OpcUaConnector, SimulatedServer, SimulatedTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = SimulatedServer::demo();
//!     let config = ConnectorConfig::builder()
//!         .endpoint(server.endpoint())
//!         .node_ids(["ns=3;s=Basic"])
//!         .subscribe_enabled(true)
//!         .build()?;
//!
//!     let mut connector = OpcUaConnector::new(config, Box::new(SimulatedTransport::new(server)));
//!     connector.connect(&Context::background()).await?;
//!
//!     let (batch, ack) = connector
//!         .read_batch(&Context::with_timeout(Duration::from_secs(2)))
//!         .await?;
//!     for record in &batch {
//!         println!("{}", serde_json::to_string(record)?);
//!     }
//!     ack.ack();
//!
//!     connector.close(&Context::background()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod batch;
pub mod browse;
pub mod client;
pub mod config;
pub mod connector;
pub mod context;
pub mod error;
pub mod heartbeat;
pub mod types;

// Re-export commonly used types
pub use error::{
    BrowseError, ConfigurationError, ConnectionError, ConversionError, ErrorCode, ErrorSeverity,
    OpcUaError, OpcUaResult, OperationError, ParseError, ParseErrorKind, SubscriptionError,
};

pub use types::{
    parse_node_ids, well_known, Credentials, DataTypeKind, NodeClass, NodeId, NodeIdentifier,
    SecurityMode, SecurityPolicy, ServerInfo, TagType,
};

pub use batch::{AckHandle, Record, RecordBatch};
pub use browse::{AcquisitionTarget, AddressSpaceBrowser, BrowseOptions, TagMetadata, TagNode, TagTree};
pub use client::{
    normalize, DataValue, NormalizedValue, OpcUaTransport, SessionState, SimulatedServer,
    SimulatedTransport, Variant,
};
pub use config::{ConnectorConfig, ConnectorConfigBuilder};
pub use connector::{ConnectorStats, OpcUaConnector, StatsSnapshot};
pub use context::{CancelHandle, Context};
pub use heartbeat::{Clock, HeartbeatMonitor, ManualClock, SystemClock};

#[cfg(feature = "real-transport")]
pub use client::RealOpcUaTransport;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
