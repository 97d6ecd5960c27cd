// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core OPC UA types used throughout the connector.
//!
//! - **NodeId**: the four OPC UA identifier kinds, with a parser for the
//!   conventional `ns=<u16>;<kind>=<value>` text form
//! - **DataTypeKind**: classification of a node's `DataType` attribute
//! - **SecurityMode/Policy** and **Credentials**: session negotiation inputs
//! - **ServerInfo**: descriptive build information of the server
//!
//! # Examples
//!
//! ```
//! use opcbridge_opcua::types::{parse_node_ids, NodeId};
//!
//! let parsed = parse_node_ids(["ns=3;s=Basic", "i=2258", "ns=x;i=1"]);
//! assert_eq!(parsed[0].as_ref().unwrap(), &NodeId::string(3, "Basic"));
//! assert_eq!(parsed[1].as_ref().unwrap(), &NodeId::numeric(0, 2258));
//! assert!(parsed[2].is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError, ParseError, ParseErrorKind};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// Two node ids are equal iff namespace index and identifier (by value)
/// are equal.
///
/// # Examples
///
/// ```
/// use opcbridge_opcua::types::NodeId;
///
/// let parsed: NodeId = "ns=3;s=Local Items.test".parse().unwrap();
/// assert_eq!(parsed, NodeId::string(3, "Local Items.test"));
/// assert_eq!(parsed.to_string(), "ns=3;s=Local Items.test");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// The null node id (`i=0`), used as the "no data type" marker.
    #[inline]
    pub const fn null() -> Self {
        Self {
            namespace_index: 0,
            identifier: NodeIdentifier::Numeric(0),
        }
    }

    /// Creates a node id in namespace 0 from a well-known numeric id.
    #[inline]
    pub const fn standard(value: u32) -> Self {
        Self {
            namespace_index: 0,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Returns `true` if this is the null node id.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Returns the numeric value if this is a namespace-0 numeric id.
    #[inline]
    pub fn as_standard(&self) -> Option<u32> {
        match self.identifier {
            NodeIdentifier::Numeric(v) if self.namespace_index == 0 => Some(v),
            _ => None,
        }
    }

    /// Converts to the OPC UA string format.
    ///
    /// The `ns=` prefix is omitted for namespace 0.
    ///
    /// ```
    /// use opcbridge_opcua::types::NodeId;
    ///
    /// assert_eq!(NodeId::numeric(0, 85).to_opc_string(), "i=85");
    /// assert_eq!(NodeId::numeric(2, 1001).to_opc_string(), "ns=2;i=1001");
    /// ```
    pub fn to_opc_string(&self) -> String {
        let id_str = match &self.identifier {
            NodeIdentifier::Numeric(v) => format!("i={}", v),
            NodeIdentifier::String(v) => format!("s={}", v),
            NodeIdentifier::Guid(v) => format!("g={}", v),
            NodeIdentifier::Opaque(v) => format!("b={}", BASE64.encode(v)),
        };

        if self.namespace_index == 0 {
            id_str
        } else {
            format!("ns={};{}", self.namespace_index, id_str)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = ParseError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=My Node` (string, inner whitespace kept verbatim)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=2258` (any kind without `ns=`, namespace 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |kind| ParseError::new(s, kind);

        // Leading whitespace can never belong to an identifier.
        let text = s.trim_start();
        if text.trim_end().is_empty() {
            return Err(fail(ParseErrorKind::Empty));
        }

        let (namespace_index, identifier_part) = match text.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest
                    .split_once(';')
                    .ok_or_else(|| fail(ParseErrorKind::MissingSeparator))?;
                let ns: u16 = ns_str
                    .trim()
                    .parse()
                    .map_err(|_| fail(ParseErrorKind::InvalidNamespace(ns_str.to_string())))?;
                (ns, id)
            }
            None => (0, text),
        };

        let (kind, value) = identifier_part
            .split_once('=')
            .ok_or_else(|| fail(ParseErrorKind::MissingIdentifier))?;

        let identifier = match kind.trim() {
            "i" => {
                let value = value.trim();
                NodeIdentifier::Numeric(
                    value
                        .parse()
                        .map_err(|_| fail(ParseErrorKind::InvalidNumeric(value.to_string())))?,
                )
            }
            "s" => {
                // Verbatim, spaces included.
                if value.is_empty() {
                    return Err(fail(ParseErrorKind::EmptyString));
                }
                NodeIdentifier::String(value.to_string())
            }
            "g" => {
                let value = value.trim();
                NodeIdentifier::Guid(
                    Uuid::parse_str(value)
                        .map_err(|_| fail(ParseErrorKind::InvalidGuid(value.to_string())))?,
                )
            }
            "b" => {
                let value = value.trim();
                NodeIdentifier::Opaque(
                    BASE64
                        .decode(value)
                        .map_err(|_| fail(ParseErrorKind::InvalidOpaque(value.to_string())))?,
                )
            }
            other => return Err(fail(ParseErrorKind::UnknownKind(other.to_string()))),
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

/// Parses a list of textual node specifiers.
///
/// Returns one result per input, in input order. A malformed entry yields
/// an error marker at its position and never affects its neighbours.
pub fn parse_node_ids<I, S>(inputs: I) -> Vec<Result<NodeId, ParseError>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    inputs
        .into_iter()
        .map(|input| input.as_ref().parse::<NodeId>())
        .collect()
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque (byte string) identifier.
    Opaque(Vec<u8>),
}

// =============================================================================
// Well-known node ids
// =============================================================================

/// Well-known namespace-0 node ids used by the connector.
pub mod well_known {
    /// Root folder.
    pub const ROOT_FOLDER: u32 = 84;
    /// Objects folder, the default browse root.
    pub const OBJECTS_FOLDER: u32 = 85;
    /// HierarchicalReferences reference type.
    pub const HIERARCHICAL_REFERENCES: u32 = 33;
    /// Organizes reference type.
    pub const ORGANIZES: u32 = 35;
    /// HasProperty reference type.
    pub const HAS_PROPERTY: u32 = 46;
    /// HasComponent reference type.
    pub const HAS_COMPONENT: u32 = 47;
    /// Server_ServerStatus_State.
    pub const SERVER_STATUS_STATE: u32 = 2259;
    /// Server_ServerStatus_CurrentTime, the default heartbeat node.
    pub const SERVER_STATUS_CURRENT_TIME: u32 = 2258;
    /// Server_ServerStatus_BuildInfo_ProductName.
    pub const BUILD_INFO_PRODUCT_NAME: u32 = 2261;
    /// Server_ServerStatus_BuildInfo_ManufacturerName.
    pub const BUILD_INFO_MANUFACTURER_NAME: u32 = 2263;
    /// Server_ServerStatus_BuildInfo_SoftwareVersion.
    pub const BUILD_INFO_SOFTWARE_VERSION: u32 = 2264;
}

// =============================================================================
// Structured built-in values
// =============================================================================

/// A name qualified by a namespace index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// The name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

/// Human readable text with an optional locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale, e.g. `en-US`.
    pub locale: Option<String>,
    /// The text.
    pub text: Option<String>,
}

impl LocalizedText {
    /// Creates a localized text.
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: Some(locale.into()),
            text: Some(text.into()),
        }
    }

    /// Binary encoding mask: bit 0 locale present, bit 1 text present.
    pub fn encoding_mask(&self) -> u8 {
        let mut mask = 0;
        if self.locale.is_some() {
            mask |= 0x01;
        }
        if self.text.is_some() {
            mask |= 0x02;
        }
        mask
    }
}

/// A node id that may point into another server or namespace URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    /// The local node id.
    pub node_id: NodeId,
    /// Namespace URI, if given instead of the index.
    pub namespace_uri: Option<String>,
    /// Server index (0 = local server).
    pub server_index: u32,
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Unspecified.
    #[default]
    Unspecified,
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// ObjectType node.
    ObjectType,
    /// VariableType node.
    VariableType,
    /// ReferenceType node.
    ReferenceType,
    /// DataType node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA bitmask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from the OPC UA bitmask value.
    pub fn from_value(value: u32) -> Self {
        match value {
            1 => Self::Object,
            2 => Self::Variable,
            4 => Self::Method,
            8 => Self::ObjectType,
            16 => Self::VariableType,
            32 => Self::ReferenceType,
            64 => Self::DataType,
            128 => Self::View,
            _ => Self::Unspecified,
        }
    }

    /// Returns `true` if nodes of this class carry a value attribute.
    #[inline]
    pub const fn has_value(&self) -> bool {
        matches!(self, Self::Variable | Self::VariableType)
    }
}

// =============================================================================
// DataTypeKind
// =============================================================================

/// Classification of a node's `DataType` attribute.
///
/// Built-in types use their namespace-0 ids. Abstract types commonly used by
/// servers (Number, Integer, UInteger, Enumeration) and the common simple
/// subtypes (Duration, UtcTime, LocaleId) are recognised as well. Any other
/// data type node is reported as [`DataTypeKind::Custom`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataTypeKind {
    /// The null data type (`i=0`) or an unresolved type.
    Null,
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
    ByteString,
    XmlElement,
    NodeId,
    ExpandedNodeId,
    StatusCode,
    QualifiedName,
    LocalizedText,
    Structure,
    DataValue,
    /// BaseDataType: values are Variants of any type.
    BaseDataType,
    DiagnosticInfo,
    Number,
    Integer,
    UInteger,
    Enumeration,
    Decimal,
    Duration,
    UtcTime,
    LocaleId,
    /// A server-specific data type.
    Custom,
}

impl DataTypeKind {
    /// Classifies a data type node id.
    pub fn from_node_id(node_id: &NodeId) -> Self {
        if node_id.is_null() {
            return Self::Null;
        }
        match node_id.as_standard() {
            Some(id) => Self::from_standard_id(id),
            None => Self::Custom,
        }
    }

    fn from_standard_id(id: u32) -> Self {
        match id {
            1 => Self::Boolean,
            2 => Self::SByte,
            3 => Self::Byte,
            4 => Self::Int16,
            5 => Self::UInt16,
            6 => Self::Int32,
            7 => Self::UInt32,
            8 => Self::Int64,
            9 => Self::UInt64,
            10 => Self::Float,
            11 => Self::Double,
            12 => Self::String,
            13 => Self::DateTime,
            14 => Self::Guid,
            15 => Self::ByteString,
            16 => Self::XmlElement,
            17 => Self::NodeId,
            18 => Self::ExpandedNodeId,
            19 => Self::StatusCode,
            20 => Self::QualifiedName,
            21 => Self::LocalizedText,
            22 => Self::Structure,
            23 => Self::DataValue,
            24 => Self::BaseDataType,
            25 => Self::DiagnosticInfo,
            26 => Self::Number,
            27 => Self::Integer,
            28 => Self::UInteger,
            29 => Self::Enumeration,
            50 => Self::Decimal,
            290 => Self::Duration,
            294 => Self::UtcTime,
            295 => Self::LocaleId,
            _ => Self::Custom,
        }
    }

    /// Returns `true` for the null data type.
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the coarse metadata type emitted as `opcua_tag_type`.
    pub const fn tag_type(&self) -> TagType {
        match self {
            Self::Boolean => TagType::Bool,
            Self::SByte
            | Self::Byte
            | Self::Int16
            | Self::UInt16
            | Self::Int32
            | Self::UInt32
            | Self::Int64
            | Self::UInt64
            | Self::Float
            | Self::Double
            | Self::StatusCode
            | Self::Number
            | Self::Integer
            | Self::UInteger
            | Self::Enumeration
            | Self::Decimal
            | Self::Duration => TagType::Number,
            Self::String
            | Self::DateTime
            | Self::ByteString
            | Self::XmlElement
            | Self::NodeId
            | Self::UtcTime
            | Self::LocaleId => TagType::String,
            _ => TagType::Object,
        }
    }

    /// Returns the OPC UA name of this type.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
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
            Self::ByteString => "ByteString",
            Self::XmlElement => "XmlElement",
            Self::NodeId => "NodeId",
            Self::ExpandedNodeId => "ExpandedNodeId",
            Self::StatusCode => "StatusCode",
            Self::QualifiedName => "QualifiedName",
            Self::LocalizedText => "LocalizedText",
            Self::Structure => "Structure",
            Self::DataValue => "DataValue",
            Self::BaseDataType => "BaseDataType",
            Self::DiagnosticInfo => "DiagnosticInfo",
            Self::Number => "Number",
            Self::Integer => "Integer",
            Self::UInteger => "UInteger",
            Self::Enumeration => "Enumeration",
            Self::Decimal => "Decimal",
            Self::Duration => "Duration",
            Self::UtcTime => "UtcTime",
            Self::LocaleId => "LocaleId",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for DataTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// TagType
// =============================================================================

/// Coarse value type attached to every record as `opcua_tag_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    /// Numeric value.
    Number,
    /// Boolean value.
    Bool,
    /// Textual value.
    String,
    /// Anything structured.
    Object,
}

impl TagType {
    /// Returns the metadata string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No security (messages are neither signed nor encrypted).
    #[default]
    #[serde(alias = "None")]
    None,

    /// Messages are signed but not encrypted.
    #[serde(alias = "Sign")]
    Sign,

    /// Messages are signed and encrypted.
    #[serde(alias = "SignAndEncrypt")]
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns `true` if this mode provides no security.
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "" | "none" | "nosecurity" => Ok(Self::None),
            "sign" | "signed" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" | "encrypted" => Ok(Self::SignAndEncrypt),
            _ => Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "security_mode",
                format!("unknown security mode '{}'", s),
            ))),
        }
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy (use with SecurityMode::None).
    #[default]
    #[serde(alias = "None")]
    None,

    /// Basic128Rsa15 (deprecated).
    #[serde(alias = "Basic128Rsa15")]
    Basic128Rsa15,

    /// Basic256 (deprecated).
    #[serde(alias = "Basic256")]
    Basic256,

    /// Basic256Sha256.
    #[serde(alias = "Basic256Sha256")]
    Basic256Sha256,

    /// Aes128Sha256RsaOaep.
    #[serde(alias = "Aes128Sha256RsaOaep", alias = "Aes128_Sha256_RsaOaep")]
    Aes128Sha256RsaOaep,

    /// Aes256Sha256RsaPss.
    #[serde(alias = "Aes256Sha256RsaPss", alias = "Aes256_Sha256_RsaPss")]
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic128Rsa15 => "http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic128Rsa15 => "Basic128Rsa15",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }

    /// Returns `true` for the `None` policy.
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Creates from URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let (_, name) = uri.rsplit_once('#')?;
        match name {
            "None" => Some(Self::None),
            "Basic128Rsa15" => Some(Self::Basic128Rsa15),
            "Basic256" => Some(Self::Basic256),
            "Basic256Sha256" => Some(Self::Basic256Sha256),
            "Aes128_Sha256_RsaOaep" => Some(Self::Aes128Sha256RsaOaep),
            "Aes256_Sha256_RsaPss" => Some(Self::Aes256Sha256RsaPss),
            _ => Option::None,
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(policy) = Self::from_uri(s) {
            return Ok(policy);
        }

        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "" | "none" => Ok(Self::None),
            "basic128rsa15" => Ok(Self::Basic128Rsa15),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(OpcUaError::configuration(ConfigurationError::invalid_value(
                "security_policy",
                format!("unknown security policy '{}'", s),
            ))),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Identity presented when activating the session.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// Anonymous identity.
    #[default]
    Anonymous,
    /// Username and password identity.
    UserName {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
}

impl Credentials {
    /// Builds credentials from a possibly empty username.
    ///
    /// An empty username selects the anonymous identity.
    pub fn from_parts(username: &str, password: &str) -> Self {
        if username.is_empty() {
            Self::Anonymous
        } else {
            Self::UserName {
                username: username.to_string(),
                password: password.to_string(),
            }
        }
    }

    /// Returns `true` for the anonymous identity.
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

// Never print the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

// =============================================================================
// ServerInfo
// =============================================================================

/// Descriptive build information reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Manufacturer name.
    pub manufacturer_name: String,
    /// Product name.
    pub product_name: String,
    /// Software version.
    pub software_version: String,
}

// =============================================================================
// Tests
// =============================================================================
