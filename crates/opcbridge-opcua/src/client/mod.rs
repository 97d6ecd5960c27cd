// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client layers.
//!
//! - **Transport**: the [`OpcUaTransport`] seam, with an in-memory
//!   [`SimulatedTransport`] and, behind `real-transport`, a client over the
//!   `opcua` crate
//! - **Session**: the connection state machine
//! - **Subscription**: monitored items and the delivery task
//! - **Conversion**: wire variants to [`NormalizedValue`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OpcUaConnector                             │
//! └─────────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────────┐ ┌───────────────────────────────┐
//! │      ConnectionManager        │ │     ActiveSubscription        │
//! │   (session state machine)     │ │   (delivery task + queue)     │
//! └───────────────────────────────┘ └───────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    OpcUaTransport                               │
//! │         (SimulatedTransport / RealOpcUaTransport)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod conversion;
mod session;
pub mod simulator;
pub mod subscription;
mod transport;
mod variant;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use conversion::{normalize, NormalizedValue};
pub use session::{ConnectionManager, SessionState, SessionStats};
pub use simulator::{SimulatedServer, SimulatedTransport, SIMULATOR_ENDPOINT};
pub use subscription::{ActiveSubscription, DeliveryStats, HeartbeatWatch, SubscriptionState};
pub use transport::{
    BrowseReference, ConnectionParams, DataChange, MonitoredItemRequest, MonitoredItemResult,
    NodeAttributes, NotificationSink, OpcUaTransport, SubscriptionSettings, TransportState,
};
pub use variant::{DataValue, Variant, VariantKind};

#[cfg(feature = "real-transport")]
pub use real_transport::RealOpcUaTransport;
