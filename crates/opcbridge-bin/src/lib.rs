// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # opcbridge-bin
//!
//! Command-line harness for the OPC UA acquisition connector.
//!
//! - CLI argument parsing with clap
//! - Config file loading with environment overrides
//! - The acquisition loop, printing records as JSON lines
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Logging initialization
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                             │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │   cli.rs    │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │  loader  │ │ logging  │
//!        └────┬─────┘ └──────────┘ └──────────┘
//!             │
//!      ┌──────▼──────┐     ┌─────────────┐
//!      │   runtime   │◄────┤  shutdown   │
//!      └──────┬──────┘     └─────────────┘
//!             │
//!      ┌──────▼──────────┐
//!      │ opcbridge-opcua │
//!      └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Acquire from the configured server (default command)
//! opcbridge -c opcbridge.yaml
//!
//! # Try it without a server
//! opcbridge run --simulate -n 10
//!
//! # List what would be acquired
//! opcbridge browse --simulate
//!
//! # Validate configuration
//! opcbridge validate
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod loader;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use loader::{load_config, BridgeConfig, RunnerConfig};
pub use logging::init_logging;
pub use runtime::{AcquisitionRuntime, RunSummary};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
