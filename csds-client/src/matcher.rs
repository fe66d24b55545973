//! Builds the node matchers sent with every status request.
//!
//! Matchers come from a request file, an inline request document, or both.
//! When both are set the inline document is merged into the file by
//! position: entries at the same index are merged field by field, extra
//! entries are appended.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::client::config::Platform;
use crate::error::{Conflict, Error, Result};
use crate::message::{
    self, Node, NodeMatcher, PathSegment, StatusRequest, StringMatcher, StructMatcher,
    ValueMatcher,
};

/// Metadata key carrying the GCP project number.
pub const GCP_PROJECT_NUMBER_KEY: &str = "TRAFFICDIRECTOR_GCP_PROJECT_NUMBER";
/// Metadata key carrying the VPC network name.
pub const GCP_NETWORK_NAME_KEY: &str = "TRAFFICDIRECTOR_NETWORK_NAME";
/// Metadata key carrying the mesh scope name.
pub const GCP_MESH_SCOPE_KEY: &str = "TRAFFICDIRECTOR_MESH_SCOPE_NAME";

/// Top-level shape of a request document.
#[derive(Debug, Deserialize)]
struct RequestDocument {
    #[serde(alias = "nodeMatchers")]
    node_matchers: Vec<NodeMatcher>,
    #[serde(default)]
    node: Option<Node>,
}

impl RequestDocument {
    fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(message::from_yaml(yaml)?)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|source| Error::ReadInput {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }
}

/// The node matchers and requesting node identity of a status query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSelection {
    /// Matchers in document order.
    pub node_matchers: Vec<NodeMatcher>,
    /// The requesting node.
    pub node: Node,
}

impl NodeSelection {
    /// Build the request sent on every exchange.
    ///
    /// Only the node id is carried over from the node.
    pub fn to_request(&self) -> StatusRequest {
        StatusRequest {
            node_matchers: self.node_matchers.clone(),
            node_id: self.node.id.clone(),
        }
    }

    /// See [`value_by_key`].
    pub fn value_by_key(&self, key: &str) -> &str {
        value_by_key(&self.node_matchers, key)
    }
}

/// Builder for a validated [`NodeSelection`].
///
/// # Example
///
/// ```
/// use csds_client::matcher::MatcherBuilder;
/// use csds_client::Platform;
///
/// let selection = MatcherBuilder::new()
///     .with_request_yaml(
///         r#"
/// node_matchers:
///   - node_metadatas:
///       - path: [{key: TRAFFICDIRECTOR_GCP_PROJECT_NUMBER}]
///         value: {string_match: {exact: "123456789"}}
///       - path: [{key: TRAFFICDIRECTOR_NETWORK_NAME}]
///         value: {string_match: {exact: "default"}}
/// "#,
///     )
///     .build(Platform::Gcp)?;
///
/// assert_eq!(
///     selection.value_by_key("TRAFFICDIRECTOR_NETWORK_NAME"),
///     "default"
/// );
/// # Ok::<(), csds_client::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MatcherBuilder {
    request_file: Option<PathBuf>,
    request_yaml: Option<String>,
}

impl MatcherBuilder {
    /// Create a builder with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request file, the primary source.
    pub fn with_request_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.request_file = Some(path.into());
        self
    }

    /// Set the inline request document, merged over the request file.
    pub fn with_request_yaml(mut self, yaml: impl Into<String>) -> Self {
        self.request_yaml = Some(yaml.into());
        self
    }

    /// Parse, merge and validate the sources for `platform`.
    pub fn build(&self, platform: Platform) -> Result<NodeSelection> {
        let selection = self.parse()?;
        validate(&selection.node_matchers, platform)?;
        Ok(selection)
    }

    /// Parse and merge the sources without platform validation.
    ///
    /// Empty sources count as unset.
    pub fn parse(&self) -> Result<NodeSelection> {
        let request_file = self
            .request_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty());
        let request_yaml = self.request_yaml.as_deref().filter(|y| !y.is_empty());

        if request_file.is_none() && request_yaml.is_none() {
            return Err(Error::MissingInput);
        }

        let mut selection = NodeSelection::default();

        if let Some(path) = request_file {
            let document = RequestDocument::from_file(path)?;
            selection.node_matchers = document.node_matchers;
            if let Some(node) = document.node {
                selection.node = node;
            }
        }

        if let Some(yaml) = request_yaml {
            let document = RequestDocument::from_yaml(yaml)?;
            merge_by_position(&mut selection.node_matchers, document.node_matchers);
            if let Some(node) = document.node {
                selection.node = node;
            }
        }

        Ok(selection)
    }
}

/// Check the platform-specific required metadata keys.
pub fn validate(node_matchers: &[NodeMatcher], platform: Platform) -> Result<()> {
    match platform {
        Platform::Gcp => {
            if value_by_key(node_matchers, GCP_PROJECT_NUMBER_KEY).is_empty() {
                return Err(Error::MissingRequiredField(GCP_PROJECT_NUMBER_KEY));
            }

            let network_set = !value_by_key(node_matchers, GCP_NETWORK_NAME_KEY).is_empty();
            let mesh_scope_set = !value_by_key(node_matchers, GCP_MESH_SCOPE_KEY).is_empty();
            let conflict = match (network_set, mesh_scope_set) {
                (true, false) | (false, true) => return Ok(()),
                (false, false) => Conflict::Neither,
                (true, true) => Conflict::Both,
            };
            Err(Error::ConflictingField {
                first: GCP_NETWORK_NAME_KEY,
                second: GCP_MESH_SCOPE_KEY,
                conflict,
            })
        }
    }
}

/// Get the exact string value of the first metadata matcher whose path
/// contains `key`.
///
/// Matchers are scanned in order, then their metadata matchers, then path
/// segments. The first matcher with a matching path segment decides the
/// result: its exact string value, or `""` if it does not match an exact
/// string. Returns `""` if no path contains `key`.
pub fn value_by_key<'a>(node_matchers: &'a [NodeMatcher], key: &str) -> &'a str {
    node_matchers
        .iter()
        .flat_map(|matcher| &matcher.node_metadatas)
        .find(|metadata| metadata.path.iter().any(|segment| segment.key == key))
        .and_then(|metadata| match &metadata.value {
            Some(ValueMatcher::StringMatch(matcher)) => matcher.as_exact(),
            _ => None,
        })
        .unwrap_or_default()
}

/// Field-wise merge where set fields of `other` win.
pub(crate) trait Merge {
    fn merge(&mut self, other: Self);
}

fn merge_by_position<T: Merge>(dst: &mut Vec<T>, src: Vec<T>) {
    for (i, item) in src.into_iter().enumerate() {
        match dst.get_mut(i) {
            Some(existing) => existing.merge(item),
            None => dst.push(item),
        }
    }
}

fn merge_option<T: Merge>(dst: &mut Option<T>, src: Option<T>) {
    if let Some(src) = src {
        match dst {
            Some(existing) => existing.merge(src),
            None => *dst = Some(src),
        }
    }
}

impl Merge for NodeMatcher {
    fn merge(&mut self, other: Self) {
        merge_option(&mut self.node_id, other.node_id);
        merge_by_position(&mut self.node_metadatas, other.node_metadatas);
    }
}

impl Merge for StructMatcher {
    fn merge(&mut self, other: Self) {
        merge_by_position(&mut self.path, other.path);
        merge_option(&mut self.value, other.value);
    }
}

impl Merge for PathSegment {
    fn merge(&mut self, other: Self) {
        *self = other;
    }
}

impl Merge for ValueMatcher {
    fn merge(&mut self, other: Self) {
        match (self, other) {
            (ValueMatcher::StringMatch(existing), ValueMatcher::StringMatch(other)) => {
                existing.merge(other);
            }
            (this, other) => *this = other,
        }
    }
}

impl Merge for StringMatcher {
    fn merge(&mut self, other: Self) {
        if other.pattern.is_some() {
            self.pattern = other.pattern;
        }
        if other.ignore_case.is_some() {
            self.ignore_case = other.ignore_case;
        }
    }
}
