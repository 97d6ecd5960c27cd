// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Wire-level values as delivered by a transport.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{ExpandedNodeId, LocalizedText, NodeId, QualifiedName};

// =============================================================================
// VariantKind
// =============================================================================

/// Built-in type tag of a [`Variant`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Empty,
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    Guid,
    StatusCode,
    ByteString,
    XmlElement,
    QualifiedName,
    LocalizedText,
    NodeId,
    ExpandedNodeId,
    ExtensionObject,
    DataValue,
    Variant,
    DiagnosticInfo,
}

impl VariantKind {
    /// Returns the OPC UA type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::StatusCode => "StatusCode",
            Self::ByteString => "ByteString",
            Self::XmlElement => "XmlElement",
            Self::QualifiedName => "QualifiedName",
            Self::LocalizedText => "LocalizedText",
            Self::NodeId => "NodeId",
            Self::ExpandedNodeId => "ExpandedNodeId",
            Self::ExtensionObject => "ExtensionObject",
            Self::DataValue => "DataValue",
            Self::Variant => "Variant",
            Self::DiagnosticInfo => "DiagnosticInfo",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Variant
// =============================================================================

/// Self-describing OPC UA value, scalar or array.
///
/// Scalar variants are named after the built-in type they carry.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// No value.
    Empty,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    /// Raw status code.
    StatusCode(u32),
    ByteString(Vec<u8>),
    XmlElement(String),
    QualifiedName(QualifiedName),
    LocalizedText(LocalizedText),
    NodeId(NodeId),
    ExpandedNodeId(ExpandedNodeId),
    /// Encoded structure the connector cannot decode.
    ExtensionObject {
        /// Encoding node id.
        type_id: NodeId,
        /// Raw body.
        body: Vec<u8>,
    },
    /// A data value nested inside a variant; never normalized.
    DataValue(Box<DataValue>),
    /// A variant nested inside a variant.
    Variant(Box<Variant>),
    /// Diagnostic information; never normalized.
    DiagnosticInfo,
    /// Array of a single element type.
    Array {
        /// Element type tag.
        element_type: VariantKind,
        /// Elements in server order.
        values: Vec<Variant>,
        /// Array dimensions for multi-dimensional arrays.
        dimensions: Option<Vec<u32>>,
    },
}

impl Variant {
    /// Builds a one-dimensional array.
    pub fn array(element_type: VariantKind, values: Vec<Variant>) -> Self {
        Self::Array {
            element_type,
            values,
            dimensions: None,
        }
    }

    /// Returns the type tag. Arrays report their element type.
    pub fn kind(&self) -> VariantKind {
        match self {
            Self::Empty => VariantKind::Empty,
            Self::Boolean(_) => VariantKind::Boolean,
            Self::SByte(_) => VariantKind::SByte,
            Self::Byte(_) => VariantKind::Byte,
            Self::Int16(_) => VariantKind::Int16,
            Self::UInt16(_) => VariantKind::UInt16,
            Self::Int32(_) => VariantKind::Int32,
            Self::UInt32(_) => VariantKind::UInt32,
            Self::Int64(_) => VariantKind::Int64,
            Self::UInt64(_) => VariantKind::UInt64,
            Self::Float(_) => VariantKind::Float,
            Self::Double(_) => VariantKind::Double,
            Self::String(_) => VariantKind::String,
            Self::DateTime(_) => VariantKind::DateTime,
            Self::Guid(_) => VariantKind::Guid,
            Self::StatusCode(_) => VariantKind::StatusCode,
            Self::ByteString(_) => VariantKind::ByteString,
            Self::XmlElement(_) => VariantKind::XmlElement,
            Self::QualifiedName(_) => VariantKind::QualifiedName,
            Self::LocalizedText(_) => VariantKind::LocalizedText,
            Self::NodeId(_) => VariantKind::NodeId,
            Self::ExpandedNodeId(_) => VariantKind::ExpandedNodeId,
            Self::ExtensionObject { .. } => VariantKind::ExtensionObject,
            Self::DataValue(_) => VariantKind::DataValue,
            Self::Variant(_) => VariantKind::Variant,
            Self::DiagnosticInfo => VariantKind::DiagnosticInfo,
            Self::Array { element_type, .. } => *element_type,
        }
    }

    /// Returns `true` for arrays.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    /// Returns `true` for the empty variant.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Type tag used in diagnostics, e.g. `Int32[]`.
    pub fn type_tag(&self) -> String {
        if self.is_array() {
            format!("{}[]", self.kind())
        } else {
            self.kind().name().to_string()
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::Empty
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "null"),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) | Self::XmlElement(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{}", v),
            Self::StatusCode(v) => write!(f, "0x{:08X}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::QualifiedName(v) => write!(f, "{}:{}", v.namespace_index, v.name),
            Self::LocalizedText(v) => write!(f, "{}", v.text.as_deref().unwrap_or_default()),
            Self::NodeId(v) => write!(f, "{}", v),
            Self::ExpandedNodeId(v) => write!(f, "{}", v.node_id),
            Self::ExtensionObject { type_id, .. } => write!(f, "<extension object {}>", type_id),
            Self::DataValue(v) => write!(f, "<data value 0x{:08X}>", v.status),
            Self::Variant(v) => write!(f, "{}", v),
            Self::DiagnosticInfo => write!(f, "<diagnostic info>"),
            Self::Array { values, .. } => write!(f, "[{} items]", values.len()),
        }
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value, if any.
    pub value: Option<Variant>,

    /// Status code (0 = Good).
    pub status: u32,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value with a source timestamp of now.
    pub fn good(value: Variant) -> Self {
        Self {
            value: Some(value),
            status: 0,
            source_timestamp: Some(Utc::now()),
            server_timestamp: None,
        }
    }

    /// Creates a value-less result with the given status.
    pub fn with_status(status: u32) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Returns `true` if the status severity is Good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status & 0xC000_0000 == 0
    }

    /// Returns `true` if the status severity is Uncertain.
    #[inline]
    pub fn is_uncertain(&self) -> bool {
        self.status & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` if the status severity is Bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.status & 0x8000_0000 != 0
    }
}
