// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Variant → [`NormalizedValue`] conversion.
//!
//! The OPC UA variant type system is folded into five portable shapes:
//!
//! ```text
//! Boolean                                  → Bool
//! (S)Byte, (U)Int16/32/64, Float, Double,
//! StatusCode                               → Number (decimal text, lossless)
//! String, XmlElement, DateTime, NodeId,
//! ByteString                               → Text
//! Guid, LocalizedText, QualifiedName,
//! ExpandedNodeId, nested Variant           → Structured
//! arrays                                   → Array (Byte arrays → Text)
//! ```
//!
//! Anything else is a [`ConversionError`]; the caller drops that one value.
//!
//! # Examples
//!
//! ```
//! use opcbridge_opcua::client::{normalize, NormalizedValue, Variant, VariantKind};
//!
//! let value = Variant::array(VariantKind::Int32, vec![Variant::Int32(1), Variant::Int32(-2)]);
//! let normalized = normalize(&value, "ns=3;s=Array").unwrap();
//! assert_eq!(serde_json::to_string(&normalized).unwrap(), "[1,-2]");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::SecondsFormat;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::variant::{Variant, VariantKind};
use crate::error::ConversionError;

// =============================================================================
// NormalizedValue
// =============================================================================

/// Portable value shape handed to the downstream pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedValue {
    /// Boolean.
    Bool(bool),
    /// Number kept as its exact decimal text.
    Number(String),
    /// Text.
    Text(String),
    /// Keyed structure. Keys iterate in sorted order.
    Structured(BTreeMap<String, NormalizedValue>),
    /// Ordered sequence.
    Array(Vec<NormalizedValue>),
}

impl NormalizedValue {
    /// Builds a number from anything with an exact `Display`.
    pub fn number(value: impl fmt::Display) -> Self {
        Self::Number(value.to_string())
    }

    /// Builds a text value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the decimal text of a number.
    pub fn as_number(&self) -> Option<&str> {
        match self {
            Self::Number(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the array elements.
    pub fn as_array(&self) -> Option<&[NormalizedValue]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the structure fields.
    pub fn as_structured(&self) -> Option<&BTreeMap<String, NormalizedValue>> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Short shape name for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
            Self::Array(_) => "array",
        }
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl Serialize for NormalizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            // Non-finite floats have no JSON number form.
            Self::Number(v) => match v.parse::<serde_json::Number>() {
                Ok(n) => n.serialize(serializer),
                Err(_) => serializer.serialize_str(v),
            },
            Self::Text(v) => serializer.serialize_str(v),
            Self::Structured(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// =============================================================================
// normalize
// =============================================================================

/// Converts a wire value into its normalized shape.
///
/// `path` identifies the node in error messages.
pub fn normalize(value: &Variant, path: &str) -> Result<NormalizedValue, ConversionError> {
    match value {
        Variant::Boolean(v) => Ok(NormalizedValue::Bool(*v)),

        Variant::SByte(v) => Ok(NormalizedValue::number(v)),
        Variant::Byte(v) => Ok(NormalizedValue::number(v)),
        Variant::Int16(v) => Ok(NormalizedValue::number(v)),
        Variant::UInt16(v) => Ok(NormalizedValue::number(v)),
        Variant::Int32(v) => Ok(NormalizedValue::number(v)),
        Variant::UInt32(v) => Ok(NormalizedValue::number(v)),
        Variant::Int64(v) => Ok(NormalizedValue::number(v)),
        Variant::UInt64(v) => Ok(NormalizedValue::number(v)),
        // Display is the shortest text that parses back to the same float.
        Variant::Float(v) => Ok(NormalizedValue::number(v)),
        Variant::Double(v) => Ok(NormalizedValue::number(v)),
        Variant::StatusCode(v) => Ok(NormalizedValue::number(v)),

        Variant::String(v) | Variant::XmlElement(v) => Ok(NormalizedValue::text(v.as_str())),
        Variant::DateTime(v) => Ok(NormalizedValue::Text(
            v.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        )),
        Variant::NodeId(v) => Ok(NormalizedValue::Text(v.to_opc_string())),
        Variant::ByteString(v) => Ok(NormalizedValue::Text(BASE64.encode(v))),

        Variant::Guid(v) => {
            let (data1, data2, data3, data4) = v.as_fields();
            Ok(structured([
                ("Data1", NormalizedValue::number(data1)),
                ("Data2", NormalizedValue::number(data2)),
                ("Data3", NormalizedValue::number(data3)),
                (
                    "Data4",
                    NormalizedValue::Array(data4.iter().map(NormalizedValue::number).collect()),
                ),
            ]))
        }
        Variant::LocalizedText(v) => Ok(structured([
            ("EncodingMask", NormalizedValue::number(v.encoding_mask())),
            ("Locale", NormalizedValue::text(v.locale.clone().unwrap_or_default())),
            ("Text", NormalizedValue::text(v.text.clone().unwrap_or_default())),
        ])),
        Variant::QualifiedName(v) => Ok(structured([
            ("NamespaceIndex", NormalizedValue::number(v.namespace_index)),
            ("Name", NormalizedValue::text(v.name.as_str())),
        ])),
        Variant::ExpandedNodeId(v) => Ok(structured([
            (
                "NamespaceURI",
                NormalizedValue::text(v.namespace_uri.clone().unwrap_or_default()),
            ),
            ("NodeID", NormalizedValue::Text(v.node_id.to_opc_string())),
            ("ServerIndex", NormalizedValue::number(v.server_index)),
        ])),
        Variant::Variant(inner) => Ok(structured([
            ("Type", NormalizedValue::text(inner.type_tag())),
            ("Value", normalize(inner, path)?),
        ])),

        Variant::Array {
            element_type,
            values,
            ..
        } => normalize_array(*element_type, values, path),

        Variant::Empty => Err(ConversionError::null_value(path)),
        Variant::ExtensionObject { .. } | Variant::DataValue(_) | Variant::DiagnosticInfo => {
            Err(ConversionError::unsupported_type(value.type_tag(), path))
        }
    }
}

fn normalize_array(
    element_type: VariantKind,
    values: &[Variant],
    path: &str,
) -> Result<NormalizedValue, ConversionError> {
    if element_type == VariantKind::Byte {
        let mut bytes = Vec::with_capacity(values.len());
        for value in values {
            match value {
                Variant::Byte(b) => bytes.push(*b),
                other => {
                    return Err(ConversionError::unsupported_type(
                        format!("Byte[] containing {}", other.type_tag()),
                        path,
                    ))
                }
            }
        }
        return Ok(NormalizedValue::Text(BASE64.encode(bytes)));
    }

    values
        .iter()
        .map(|value| normalize(value, path))
        .collect::<Result<Vec<_>, _>>()
        .map(NormalizedValue::Array)
}

fn structured<const N: usize>(fields: [(&str, NormalizedValue); N]) -> NormalizedValue {
    NormalizedValue::Structured(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

// =============================================================================
// Tests
// =============================================================================
