// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the OPC UA acquisition connector.
//!
//! Errors are grouped by the part of the connector that raises them. Per-item
//! failures (a malformed node specifier, a value without a normalization
//! mapping, one sub-tree that cannot be browsed) are contained by the caller
//! and only logged; connection-level and deadline failures propagate.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Parse            - Malformed node specifier (per item)
//! ├── Connection       - Negotiation, authentication, transport
//! ├── NotConnected     - Session not usable (incl. heartbeat staleness)
//! ├── DeadlineExceeded - Caller deadline elapsed with no result
//! ├── Cancelled        - Caller cancelled the operation
//! ├── Browse           - One sub-tree failed to enumerate
//! ├── Operation        - Read failures and bad status codes
//! ├── Subscription     - Subscription / monitored item setup
//! ├── Conversion       - Value has no normalization mapping
//! └── Configuration    - Invalid settings
//! ```
//!
//! # Examples
//!
//! ```
//! use opcbridge_opcua::error::{ErrorSeverity, OpcUaError};
//!
//! let error = OpcUaError::not_connected("heartbeat stale");
//! assert!(!error.is_retryable());
//! assert_eq!(error.severity(), ErrorSeverity::Warning);
//! assert_eq!(error.category(), "session");
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for connector operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// A node specifier could not be parsed.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// The session is not in the `Connected` state.
    #[error("Not connected: {reason}")]
    NotConnected {
        /// Why the session is unusable.
        reason: String,
    },

    /// The caller's deadline elapsed before the operation produced a result.
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// Operation that was running.
        operation: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation {operation} was cancelled")]
    Cancelled {
        /// Operation that was running.
        operation: String,
    },

    /// Node browsing errors.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Read operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription and monitoring errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Data conversion errors.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a browse error.
    #[inline]
    pub fn browse(error: BrowseError) -> Self {
        Self::Browse(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a conversion error.
    #[inline]
    pub fn conversion(error: ConversionError) -> Self {
        Self::Conversion(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates a not connected error.
    pub fn not_connected(reason: impl Into<String>) -> Self {
        Self::NotConnected {
            reason: reason.into(),
        }
    }

    /// Creates a deadline exceeded error.
    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::transport(message))
    }

    /// Creates a read failed error.
    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::Operation(OperationError::read_failed(message))
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(type_tag: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Conversion(ConversionError::unsupported_type(type_tag, path))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this is a [`OpcUaError::NotConnected`] error.
    #[inline]
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }

    /// Returns `true` if this is a [`OpcUaError::DeadlineExceeded`] error.
    #[inline]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Returns `true` if the caller may retry the same call.
    ///
    /// `NotConnected` is not retryable on its own: the session has to be
    /// re-established with a fresh `connect` first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::DeadlineExceeded { .. } => true,
            Self::Browse(_) => true,
            Self::Operation(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Parse(_)
            | Self::NotConnected { .. }
            | Self::Cancelled { .. }
            | Self::Conversion(_)
            | Self::Configuration(_) => false,
        }
    }

    /// Returns the suggested retry delay for this error.
    ///
    /// Returns `None` if the error is not retryable.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }

        match self {
            Self::Connection(e) => Some(e.suggested_retry_delay()),
            Self::DeadlineExceeded { .. } => Some(Duration::ZERO),
            Self::Browse(_) => Some(Duration::from_millis(500)),
            Self::Operation(_) | Self::Subscription(_) => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Parse(_) => ErrorSeverity::Warning,
            Self::Connection(e) => e.severity(),
            Self::NotConnected { .. } => ErrorSeverity::Warning,
            Self::DeadlineExceeded { .. } | Self::Cancelled { .. } => ErrorSeverity::Info,
            Self::Browse(_) => ErrorSeverity::Warning,
            Self::Operation(_) => ErrorSeverity::Warning,
            Self::Subscription(_) => ErrorSeverity::Error,
            Self::Conversion(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Connection(_) => "connection",
            Self::NotConnected { .. } => "session",
            Self::DeadlineExceeded { .. } | Self::Cancelled { .. } => "deadline",
            Self::Browse(_) => "browse",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Conversion(_) => "conversion",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Parse(e) => e.error_code(),
            Self::Connection(e) => e.error_code(),
            Self::NotConnected { .. } => ErrorCode::new(3, 1),
            Self::DeadlineExceeded { .. } => ErrorCode::new(9, 1),
            Self::Cancelled { .. } => ErrorCode::new(9, 2),
            Self::Browse(e) => e.error_code(),
            Self::Operation(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Conversion(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let level = self.tracing_level();
        let code = self.error_code();

        match level {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ParseError
// =============================================================================

/// A textual node specifier that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid node id '{input}': {kind}")]
pub struct ParseError {
    /// The offending input, verbatim.
    pub input: String,
    /// What was wrong with it.
    pub kind: ParseErrorKind,
}

/// The specific reason a node specifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Empty input.
    #[error("empty specifier")]
    Empty,

    /// `ns=` prefix present but not terminated by `;`.
    #[error("namespace prefix is not followed by ';'")]
    MissingSeparator,

    /// Namespace index is not a valid u16.
    #[error("invalid namespace index '{0}'")]
    InvalidNamespace(String),

    /// Identifier part is not of the form `<kind>=<value>`.
    #[error("missing identifier (expected i=, s=, g= or b=)")]
    MissingIdentifier,

    /// Identifier kind is not one of i, s, g, b.
    #[error("unknown identifier kind '{0}'")]
    UnknownKind(String),

    /// Numeric identifier is not a valid u32.
    #[error("invalid numeric identifier '{0}'")]
    InvalidNumeric(String),

    /// String identifier is empty.
    #[error("string identifier is empty")]
    EmptyString,

    /// GUID identifier is malformed.
    #[error("invalid GUID '{0}'")]
    InvalidGuid(String),

    /// Opaque identifier is not valid base64.
    #[error("invalid base64 in opaque identifier '{0}'")]
    InvalidOpaque(String),
}

impl ParseError {
    /// Creates a parse error for the given input.
    pub fn new(input: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            input: input.into(),
            kind,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        let code = match self.kind {
            ParseErrorKind::Empty => 1,
            ParseErrorKind::MissingSeparator => 2,
            ParseErrorKind::InvalidNamespace(_) => 3,
            ParseErrorKind::MissingIdentifier => 4,
            ParseErrorKind::UnknownKind(_) => 5,
            ParseErrorKind::InvalidNumeric(_) => 6,
            ParseErrorKind::EmptyString => 7,
            ParseErrorKind::InvalidGuid(_) => 8,
            ParseErrorKind::InvalidOpaque(_) => 9,
        };
        ErrorCode::new(1, code)
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Server refused the connection or could not be reached.
    #[error("Connection refused to '{endpoint}': {reason}")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Reason reported by the stack.
        reason: String,
    },

    /// Connection attempt timed out.
    #[error("Connection timed out to '{endpoint}' after {duration:?}")]
    TimedOut {
        /// Target endpoint.
        endpoint: String,
        /// Timeout duration.
        duration: Duration,
    },

    /// No server endpoint matches the requested security settings.
    #[error("No endpoint on '{endpoint}' offers security mode '{security_mode}' with policy '{security_policy}'")]
    NoMatchingEndpoint {
        /// Target endpoint.
        endpoint: String,
        /// Requested security mode.
        security_mode: String,
        /// Requested security policy.
        security_policy: String,
    },

    /// The server rejected the identity token.
    #[error("Authentication rejected by '{endpoint}': {reason}")]
    AuthenticationFailed {
        /// Target endpoint.
        endpoint: String,
        /// Reason reported by the server.
        reason: String,
    },

    /// Connect called in a state other than `Disconnected`.
    #[error("Cannot connect while session is {state}")]
    InvalidState {
        /// The current session state.
        state: String,
    },

    /// Lower-level transport failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },
}

impl ConnectionError {
    /// Creates a refused error.
    pub fn refused(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timed out error.
    pub fn timed_out(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::TimedOut {
            endpoint: endpoint.into(),
            duration,
        }
    }

    /// Creates a no matching endpoint error.
    pub fn no_matching_endpoint(
        endpoint: impl Into<String>,
        security_mode: impl fmt::Display,
        security_policy: impl fmt::Display,
    ) -> Self {
        Self::NoMatchingEndpoint {
            endpoint: endpoint.into(),
            security_mode: security_mode.to_string(),
            security_policy: security_policy.to_string(),
        }
    }

    /// Creates an authentication failed error.
    pub fn authentication_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(state: impl fmt::Display) -> Self {
        Self::InvalidState {
            state: state.to_string(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Refused { .. } | Self::TimedOut { .. } | Self::Transport { .. }
        )
    }

    /// Returns the suggested retry delay.
    pub fn suggested_retry_delay(&self) -> Duration {
        match self {
            Self::TimedOut { .. } => Duration::from_secs(2),
            _ => Duration::from_secs(5),
        }
    }

    /// Returns the severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidState { .. } => ErrorSeverity::Critical,
            Self::AuthenticationFailed { .. } | Self::NoMatchingEndpoint { .. } => {
                ErrorSeverity::Error
            }
            _ => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(2, 1),
            Self::TimedOut { .. } => ErrorCode::new(2, 2),
            Self::NoMatchingEndpoint { .. } => ErrorCode::new(2, 3),
            Self::AuthenticationFailed { .. } => ErrorCode::new(2, 4),
            Self::InvalidState { .. } => ErrorCode::new(2, 5),
            Self::Transport { .. } => ErrorCode::new(2, 6),
        }
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Address-space browsing errors.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// The server returned an error for one sub-tree.
    #[error("Browse of '{node_id}' failed: {message}")]
    BranchFailed {
        /// Node whose references could not be enumerated.
        node_id: String,
        /// Error message.
        message: String,
    },

    /// Attribute read for a discovered node failed.
    #[error("Reading attributes of '{node_id}' failed: {message}")]
    AttributesFailed {
        /// Node whose attributes could not be read.
        node_id: String,
        /// Error message.
        message: String,
    },

    /// The node does not exist on the server.
    #[error("Node not found: '{node_id}'")]
    NodeNotFound {
        /// The missing node.
        node_id: String,
    },
}

impl BrowseError {
    /// Creates a branch failed error.
    pub fn branch_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BranchFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates an attributes failed error.
    pub fn attributes_failed(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AttributesFailed {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Creates a node not found error.
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::BranchFailed { .. } => ErrorCode::new(4, 1),
            Self::AttributesFailed { .. } => ErrorCode::new(4, 2),
            Self::NodeNotFound { .. } => ErrorCode::new(4, 3),
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Read operation errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The read service call failed as a whole.
    #[error("Read failed: {message}")]
    ReadFailed {
        /// Error message.
        message: String,
    },

    /// A single value came back with a bad status code.
    #[error("Bad status for '{node_id}': {status_name} (0x{status_code:08X})")]
    BadStatus {
        /// Node that was read.
        node_id: String,
        /// Raw status code.
        status_code: u32,
        /// Symbolic name of the status code.
        status_name: String,
    },

    /// The server answered with fewer results than requested.
    #[error("Expected {expected} results, got {actual}")]
    ResultCountMismatch {
        /// Requested count.
        expected: usize,
        /// Returned count.
        actual: usize,
    },
}

impl OperationError {
    /// Creates a read failed error.
    pub fn read_failed(message: impl Into<String>) -> Self {
        Self::ReadFailed {
            message: message.into(),
        }
    }

    /// Creates a bad status error.
    pub fn bad_status(node_id: impl Into<String>, status_code: u32) -> Self {
        Self::BadStatus {
            node_id: node_id.into(),
            status_code,
            status_name: Self::status_code_name(status_code).to_string(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReadFailed { .. })
    }

    /// Returns `true` for service results that mean the session or its
    /// secure channel is gone rather than the read itself failing.
    pub fn is_session_status(code: u32) -> bool {
        matches!(
            code & 0xFFFF_0000,
            0x8005_0000 // BadCommunicationError
                | 0x800A_0000 // BadTimeout
                | 0x800D_0000 // BadServerNotConnected
                | 0x8021_0000 // BadSecureChannelIdInvalid
                | 0x8025_0000 // BadSessionIdInvalid
                | 0x8026_0000 // BadSessionClosed
                | 0x8027_0000 // BadSessionNotActivated
                | 0x808A_0000 // BadNotConnected
        )
    }

    /// Returns the symbolic name of common status codes.
    pub fn status_code_name(code: u32) -> &'static str {
        match code {
            0x0000_0000 => "Good",
            0x8000_0000 => "Bad",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x8005_0000 => "BadCommunicationError",
            0x800A_0000 => "BadTimeout",
            0x800D_0000 => "BadServerNotConnected",
            0x8019_0000 => "BadNoCommunication",
            0x801F_0000 => "BadIdentityTokenInvalid",
            0x8020_0000 => "BadIdentityTokenRejected",
            0x8021_0000 => "BadSecureChannelIdInvalid",
            0x8025_0000 => "BadSessionIdInvalid",
            0x8026_0000 => "BadSessionClosed",
            0x8027_0000 => "BadSessionNotActivated",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x8035_0000 => "BadAttributeIdInvalid",
            0x803A_0000 => "BadNotReadable",
            0x803E_0000 => "BadWaitingForInitialData",
            0x8040_0000 => "BadUserAccessDenied",
            0x8074_0000 => "BadTypeMismatch",
            0x808A_0000 => "BadNotConnected",
            0x808B_0000 => "BadDeviceFailure",
            0x808D_0000 => "BadOutOfService",
            code if code & 0xC000_0000 == 0x4000_0000 => "Uncertain",
            code if code & 0x8000_0000 != 0 => "Bad",
            _ => "Good",
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ReadFailed { .. } => ErrorCode::new(5, 1),
            Self::BadStatus { .. } => ErrorCode::new(5, 2),
            Self::ResultCountMismatch { .. } => ErrorCode::new(5, 3),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitored item errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Subscription creation failed.
    #[error("Failed to create subscription: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },

    /// A monitored item was rejected by the server.
    #[error("Monitored item for '{node_id}' rejected: 0x{status_code:08X}")]
    MonitoredItemRejected {
        /// The node.
        node_id: String,
        /// Server status code.
        status_code: u32,
    },

    /// Subscription id is unknown to the transport.
    #[error("Subscription {0} not found")]
    NotFound(u32),

    /// The notification delivery path closed unexpectedly.
    #[error("Notification delivery closed")]
    DeliveryClosed,
}

impl SubscriptionError {
    /// Creates a creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Creates a monitored item rejected error.
    pub fn monitored_item_rejected(node_id: impl Into<String>, status_code: u32) -> Self {
        Self::MonitoredItemRejected {
            node_id: node_id.into(),
            status_code,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(6, 1),
            Self::MonitoredItemRejected { .. } => ErrorCode::new(6, 2),
            Self::NotFound(_) => ErrorCode::new(6, 3),
            Self::DeliveryClosed => ErrorCode::new(6, 4),
        }
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Value normalization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The wire type has no normalization mapping.
    #[error("Unsupported type '{type_tag}' at '{path}'")]
    UnsupportedType {
        /// Offending wire type tag.
        type_tag: String,
        /// Path of the node the value belongs to.
        path: String,
    },

    /// The value carries no data.
    #[error("Null value at '{path}'")]
    NullValue {
        /// Path of the node the value belongs to.
        path: String,
    },
}

impl ConversionError {
    /// Creates an unsupported type error.
    pub fn unsupported_type(type_tag: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_tag: type_tag.into(),
            path: path.into(),
        }
    }

    /// Creates a null value error.
    pub fn null_value(path: impl Into<String>) -> Self {
        Self::NullValue { path: path.into() }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedType { .. } => ErrorCode::new(7, 1),
            Self::NullValue { .. } => ErrorCode::new(7, 2),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Endpoint URL is malformed.
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// The URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// Security mode and policy do not agree.
    #[error("Security mode '{mode}' cannot be combined with policy '{policy}'")]
    SecurityMismatch {
        /// Security mode.
        mode: String,
        /// Security policy.
        policy: String,
    },

    /// A field has an invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a security mismatch error.
    pub fn security_mismatch(mode: impl fmt::Display, policy: impl fmt::Display) -> Self {
        Self::SecurityMismatch {
            mode: mode.to_string(),
            policy: policy.to_string(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidEndpoint { .. } => ErrorCode::new(8, 1),
            Self::SecurityMismatch { .. } => ErrorCode::new(8, 2),
            Self::InvalidValue { .. } => ErrorCode::new(8, 3),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Parse
/// - 2: Connection
/// - 3: Session
/// - 4: Browse
/// - 5: Operation
/// - 6: Subscription
/// - 7: Conversion
/// - 8: Configuration
/// - 9: Deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-9).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_retryable() {
        assert!(ConnectionError::refused("opc.tcp://localhost:4840", "reset").is_retryable());
        assert!(
            ConnectionError::timed_out("opc.tcp://localhost:4840", Duration::from_secs(5))
                .is_retryable()
        );
        assert!(!ConnectionError::authentication_failed("opc.tcp://x:4840", "bad password")
            .is_retryable());
        assert!(!ConnectionError::invalid_state("Connected").is_retryable());
    }

    #[test]
    fn test_not_connected_requires_reconnect() {
        let error = OpcUaError::not_connected("session is Failed");
        assert!(error.is_not_connected());
        assert!(!error.is_retryable());
        assert!(error.suggested_retry_delay().is_none());
        assert!(error.to_string().contains("session is Failed"));
    }

    #[test]
    fn test_deadline_exceeded_is_retryable() {
        let error = OpcUaError::deadline_exceeded("read_batch");
        assert!(error.is_deadline_exceeded());
        assert!(error.is_retryable());
        assert_eq!(error.severity(), ErrorSeverity::Info);
        assert_eq!(error.error_code().to_string(), "UA-0901");
    }

    #[test]
    fn test_parse_error_display() {
        let error = ParseError::new("ns=x;i=1", ParseErrorKind::InvalidNamespace("x".into()));
        let message = error.to_string();
        assert!(message.contains("ns=x;i=1"));
        assert!(message.contains("namespace"));
        assert_eq!(error.error_code(), ErrorCode::new(1, 3));
    }

    #[test]
    fn test_unsupported_type_carries_path() {
        let error = OpcUaError::unsupported_type("DiagnosticInfo", "Objects.Plant.Diag");
        assert_eq!(error.category(), "conversion");
        let message = error.to_string();
        assert!(message.contains("DiagnosticInfo"));
        assert!(message.contains("Objects.Plant.Diag"));
    }

    #[test]
    fn test_operation_error_status_codes() {
        assert_eq!(OperationError::status_code_name(0x0000_0000), "Good");
        assert_eq!(OperationError::status_code_name(0x8034_0000), "BadNodeIdUnknown");
        assert_eq!(OperationError::status_code_name(0x4090_0000), "Uncertain");
        assert_eq!(OperationError::status_code_name(0x80FF_0000), "Bad");

        let error = OperationError::bad_status("ns=2;i=5", 0x803A_0000);
        assert!(error.to_string().contains("BadNotReadable"));
    }

    #[test]
    fn test_session_status_classification() {
        assert!(OperationError::is_session_status(0x8026_0000));
        assert!(OperationError::is_session_status(0x808A_0000));
        assert!(!OperationError::is_session_status(0x8002_0000));
        assert!(!OperationError::is_session_status(0x803A_0000));

        let error = OpcUaError::read_failed("BadInternalError");
        assert!(error.is_retryable());
        assert_eq!(error.suggested_retry_delay(), Some(Duration::from_secs(1)));
        assert_eq!(error.category(), "operation");
    }

    #[test]
    fn test_error_code() {
        let code = ErrorCode::new(1, 5);
        assert_eq!(code.to_string(), "UA-0105");
        assert_eq!(code.as_u16(), 0x0105);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(OpcUaError::not_connected("x").category(), "session");
        assert_eq!(OpcUaError::transport("x").category(), "connection");
        assert_eq!(OpcUaError::cancelled("connect").category(), "deadline");
        assert_eq!(
            OpcUaError::configuration(ConfigurationError::invalid_value("queue_capacity", "zero"))
                .category(),
            "configuration"
        );
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ConnectionError::invalid_state("Connected").severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            OpcUaError::configuration(ConfigurationError::security_mismatch("None", "Basic256Sha256"))
                .severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(ErrorSeverity::Warning.to_tracing_level(), Level::WARN);
    }
}
