//! Crate-owned CSDS message types.
//!
//! These types are codegen-agnostic and serve as the interface between the
//! session driver, the report renderer and the codec layer. The codec
//! converts them to and from the `envoy.service.status.v3` wire format.
//!
//! The request-side matcher types also define the YAML/JSON grammar of the
//! request documents, following the protobuf JSON mapping of
//! `envoy.type.matcher.v3.NodeMatcher` (snake_case or lowerCamelCase keys).

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Metadata key under which a control plane reports the stream type of a
/// connected client.
pub const XDS_STREAM_TYPE_KEY: &str = "XDS_STREAM_TYPE";

/// Decode a YAML request document.
///
/// Matchers with a oneof value, such as `value: {string_match: {...}}`, are
/// written as single-key maps at any depth.
pub fn from_yaml<T: DeserializeOwned>(yaml: &str) -> Result<T, serde_yaml::Error> {
    serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(
        yaml,
    ))
}

/// Selects the connected clients a status query reports on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeMatcher {
    /// Matcher applied to the client node id.
    #[serde(default, alias = "nodeId")]
    pub node_id: Option<StringMatcher>,
    /// Matchers applied to the client node metadata.
    #[serde(default, alias = "nodeMetadatas")]
    pub node_metadatas: Vec<StructMatcher>,
}

/// Matches a value found under a metadata path.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructMatcher {
    /// Path to the value, one key per nesting level.
    #[serde(default)]
    pub path: Vec<PathSegment>,
    /// Matcher for the value at `path`.
    #[serde(default)]
    pub value: Option<ValueMatcher>,
}

/// A single key of a [`StructMatcher`] path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathSegment {
    /// The metadata key.
    pub key: String,
}

/// Matcher for a dynamically typed metadata value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueMatcher {
    /// Matches a null value.
    #[serde(alias = "nullMatch")]
    NullMatch(NullMatch),
    /// Matches a number.
    #[serde(alias = "doubleMatch")]
    DoubleMatch(DoubleMatcher),
    /// Matches a string.
    #[serde(alias = "stringMatch")]
    StringMatch(StringMatcher),
    /// Matches a boolean.
    #[serde(alias = "boolMatch")]
    BoolMatch(bool),
    /// Matches presence of the value.
    #[serde(alias = "presentMatch")]
    PresentMatch(bool),
}

/// Marker for [`ValueMatcher::NullMatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NullMatch {}

/// Matches a number exactly.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoubleMatcher {
    /// The expected value.
    pub exact: f64,
}

/// Matches a string value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawStringMatcher")]
pub struct StringMatcher {
    /// How the string is matched. At most one pattern may be set.
    pub pattern: Option<StringPattern>,
    /// Whether matching ignores ASCII case.
    pub ignore_case: Option<bool>,
}

impl StringMatcher {
    /// Create a matcher for an exact string.
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            pattern: Some(StringPattern::Exact(value.into())),
            ignore_case: None,
        }
    }

    /// Returns the exact string this matcher expects, if it is an exact matcher.
    pub fn as_exact(&self) -> Option<&str> {
        match &self.pattern {
            Some(StringPattern::Exact(value)) => Some(value),
            _ => None,
        }
    }
}

/// The pattern of a [`StringMatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringPattern {
    /// The whole string equals the value.
    Exact(String),
    /// The string starts with the value.
    Prefix(String),
    /// The string ends with the value.
    Suffix(String),
    /// The string contains the value.
    Contains(String),
    /// The string matches the RE2 regular expression.
    SafeRegex(String),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStringMatcher {
    exact: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
    contains: Option<String>,
    #[serde(alias = "safeRegex")]
    safe_regex: Option<RawRegexMatcher>,
    #[serde(alias = "ignoreCase")]
    ignore_case: Option<bool>,
}

#[derive(Deserialize)]
struct RawRegexMatcher {
    regex: String,
}

impl TryFrom<RawStringMatcher> for StringMatcher {
    type Error = String;

    fn try_from(raw: RawStringMatcher) -> Result<Self, Self::Error> {
        let patterns = [
            raw.exact.map(StringPattern::Exact),
            raw.prefix.map(StringPattern::Prefix),
            raw.suffix.map(StringPattern::Suffix),
            raw.contains.map(StringPattern::Contains),
            raw.safe_regex.map(|r| StringPattern::SafeRegex(r.regex)),
        ];
        let mut set = patterns.into_iter().flatten();
        let pattern = set.next();
        if set.next().is_some() {
            return Err("string matcher sets more than one match pattern".to_string());
        }
        Ok(Self {
            pattern,
            ignore_case: raw.ignore_case,
        })
    }
}

/// Identity of the client issuing the request.
///
/// Only the id is sent; other node fields in a request document are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Node {
    /// An opaque node identifier.
    #[serde(default)]
    pub id: String,
}

/// A status request sent on the CSDS stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusRequest {
    /// Selects the clients to report on.
    pub node_matchers: Vec<NodeMatcher>,
    /// Id of the requesting node.
    pub node_id: String,
}

/// A status response received from the CSDS stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusResponse {
    /// One entry per connected client.
    pub clients: Vec<ClientConfig>,
}

/// Configuration state of a single connected client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientConfig {
    /// The client node, if the control plane reported it.
    pub node: Option<ClientNode>,
    /// Per-resource config state.
    pub xds_configs: Vec<XdsConfigEntry>,
}

/// Node information of a connected client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientNode {
    /// The node id.
    pub id: String,
    /// Node metadata decoded into JSON values.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ClientNode {
    /// The stream type reported under [`XDS_STREAM_TYPE_KEY`].
    ///
    /// Absent or non-string values yield an empty label.
    pub fn stream_type(&self) -> &str {
        self.metadata
            .get(XDS_STREAM_TYPE_KEY)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

/// Config state of one xDS resource held by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct XdsConfigEntry {
    /// Type URL of the resource.
    pub type_url: String,
    /// Resource name.
    pub name: String,
    /// Version of the resource held by the client.
    pub version_info: String,
    /// Config status, rendered as its enumerant name.
    pub config_status: String,
    /// Client resource status, rendered as its enumerant name.
    pub client_status: String,
    /// Whether the resource is statically configured.
    pub is_static_resource: bool,
    /// The opaque resource content.
    pub config: Option<ResourceAny>,
}

/// A resource wrapped as google.protobuf.Any.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceAny {
    /// Type URL of the resource.
    pub type_url: String,
    /// Serialized resource bytes.
    #[serde(skip)]
    pub value: Bytes,
}
