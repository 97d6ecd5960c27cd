// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address-space browsing and tag metadata.
//!
//! Starting from each seed node the browser walks forward hierarchical
//! references depth-first and records every discovered node in a
//! [`TagTree`]. The tree is an arena: nodes own their children by index and
//! keep a plain index back to their parent, used only to derive metadata.
//!
//! # Policy
//!
//! - Nodes reached through `HasProperty` are marked as properties. They are
//!   neither browsed into nor acquired unless property browsing is enabled.
//! - Nodes with a null data type stay in the tree but are never acquired.
//! - A node already present on the current root-to-node path is skipped, so
//!   back-references cannot loop.
//! - A failing branch is logged and skipped; siblings continue.
//!
//! ```text
//! OpcPlc                      group ""                        name OpcPlc
//! └── Telemetry               group OpcPlc                    name Telemetry
//!     └── Basic               group OpcPlc.Telemetry          name Basic
//!         └── StepUp          group OpcPlc.Telemetry.Basic    name StepUp
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client::{BrowseReference, NodeAttributes, OpcUaTransport};
use crate::context::Context;
use crate::error::{OpcUaError, OpcUaResult};
use crate::types::{well_known, DataTypeKind, NodeClass, NodeId, TagType};

/// Metadata key: sanitised node id.
pub const META_PATH: &str = "opcua_path";
/// Metadata key: dot-joined display names from seed to leaf.
pub const META_TAG_PATH: &str = "opcua_tag_path";
/// Metadata key: dot-joined display names of the ancestors.
pub const META_TAG_GROUP: &str = "opcua_tag_group";
/// Metadata key: display name of the leaf.
pub const META_TAG_NAME: &str = "opcua_tag_name";
/// Metadata key: coarse value type.
pub const META_TAG_TYPE: &str = "opcua_tag_type";

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// =============================================================================
// TagMetadata
// =============================================================================

/// Metadata attached to every record of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagMetadata {
    /// Sanitised node id.
    pub path: String,
    /// Dot-joined names from the seed to the leaf.
    pub tag_path: String,
    /// Dot-joined names of all ancestors (empty for a seed).
    pub group: String,
    /// Leaf name.
    pub name: String,
    /// Coarse value type.
    pub tag_type: TagType,
}

impl TagMetadata {
    /// Derives metadata from the ancestor names, seed first.
    pub fn derive<'a>(
        node_id: &NodeId,
        ancestors: impl IntoIterator<Item = &'a str>,
        display_name: &str,
        data_type: &NodeId,
    ) -> Self {
        let group = ancestors
            .into_iter()
            .map(sanitize)
            .collect::<Vec<_>>()
            .join(".");
        let name = sanitize(display_name);
        let tag_path = if group.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", group, name)
        };

        Self {
            path: sanitize(&node_id.to_opc_string()),
            tag_path,
            group,
            name,
            tag_type: DataTypeKind::from_node_id(data_type).tag_type(),
        }
    }

    /// Renders the metadata as record key/value pairs.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (META_PATH.to_string(), self.path.clone()),
            (META_TAG_PATH.to_string(), self.tag_path.clone()),
            (META_TAG_GROUP.to_string(), self.group.clone()),
            (META_TAG_NAME.to_string(), self.name.clone()),
            (META_TAG_TYPE.to_string(), self.tag_type.as_str().to_string()),
        ])
    }
}

// =============================================================================
// TagNode / TagTree
// =============================================================================

/// A node discovered while browsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNode {
    /// Node id.
    pub node_id: NodeId,
    /// Display name.
    pub display_name: String,
    /// DataType attribute (null for non-variables).
    pub data_type: NodeId,
    /// Node class.
    pub node_class: NodeClass,
    /// Reached through `HasProperty`.
    pub is_property: bool,
    /// Distance from the seed.
    pub depth: usize,
    /// Parent index; `None` for seeds.
    pub parent: Option<usize>,
    /// Child indices in server order.
    pub children: Vec<usize>,
    /// Metadata derived at browse time.
    pub metadata: TagMetadata,
}

impl TagNode {
    /// Returns `true` if this node's value should be acquired.
    pub fn is_target(&self, include_properties: bool) -> bool {
        self.node_class == NodeClass::Variable
            && !self.data_type.is_null()
            && (include_properties || !self.is_property)
    }
}

impl fmt::Display for TagNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.metadata.tag_path, self.node_id)
    }
}

/// A node selected for value acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionTarget {
    /// Node id.
    pub node_id: NodeId,
    /// DataType attribute.
    pub data_type: NodeId,
    /// Record metadata.
    pub metadata: TagMetadata,
}

impl From<&TagNode> for AcquisitionTarget {
    fn from(node: &TagNode) -> Self {
        Self {
            node_id: node.node_id.clone(),
            data_type: node.data_type.clone(),
            metadata: node.metadata.clone(),
        }
    }
}

/// Arena of browsed nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagTree {
    nodes: Vec<TagNode>,
    roots: Vec<usize>,
}

impl TagTree {
    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing was discovered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns a node by index.
    pub fn get(&self, index: usize) -> Option<&TagNode> {
        self.nodes.get(index)
    }

    /// Seed node indices.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Finds the first node with `node_id`.
    pub fn find(&self, node_id: &NodeId) -> Option<&TagNode> {
        self.nodes.iter().find(|n| &n.node_id == node_id)
    }

    /// Node indices in depth-first pre-order, seeds in configured order.
    pub fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev().copied());
        }
        order
    }

    /// Nodes whose values should be acquired, in pre-order.
    pub fn acquisition_targets(&self, include_properties: bool) -> Vec<AcquisitionTarget> {
        self.preorder()
            .into_iter()
            .map(|i| &self.nodes[i])
            .filter(|n| n.is_target(include_properties))
            .map(AcquisitionTarget::from)
            .collect()
    }

    /// Returns `true` if `node_id` is `index` or one of its ancestors.
    fn on_path(&self, index: usize, node_id: &NodeId) -> bool {
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            let node = &self.nodes[i];
            if &node.node_id == node_id {
                return true;
            }
            cursor = node.parent;
        }
        false
    }

    /// Display names from the seed down to `index`, inclusive.
    fn lineage(&self, index: usize) -> Vec<&str> {
        let mut names = Vec::new();
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            names.push(self.nodes[i].display_name.as_str());
            cursor = self.nodes[i].parent;
        }
        names.reverse();
        names
    }

    fn push(
        &mut self,
        parent: Option<usize>,
        node_id: NodeId,
        attributes: NodeAttributes,
        is_property: bool,
    ) -> usize {
        let (depth, metadata) = match parent {
            Some(p) => (
                self.nodes[p].depth + 1,
                TagMetadata::derive(
                    &node_id,
                    self.lineage(p),
                    &attributes.display_name,
                    &attributes.data_type,
                ),
            ),
            None => (
                0,
                TagMetadata::derive(
                    &node_id,
                    std::iter::empty(),
                    &attributes.display_name,
                    &attributes.data_type,
                ),
            ),
        };

        let index = self.nodes.len();
        self.nodes.push(TagNode {
            node_id,
            display_name: attributes.display_name,
            data_type: attributes.data_type,
            node_class: attributes.node_class,
            is_property,
            depth,
            parent,
            children: Vec::new(),
            metadata,
        });
        match parent {
            Some(p) => self.nodes[p].children.push(index),
            None => self.roots.push(index),
        }
        index
    }
}

// =============================================================================
// BrowseOptions / BrowseStatistics
// =============================================================================

/// Browse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowseOptions {
    /// Maximum depth below a seed.
    pub max_depth: usize,
    /// Browse into and acquire properties.
    pub browse_properties: bool,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            max_depth: 25,
            browse_properties: false,
        }
    }
}

/// Counters of one browse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrowseStatistics {
    /// Browse requests issued.
    pub browse_calls: usize,
    /// Branches skipped after an error.
    pub failed_branches: usize,
    /// References skipped because they loop back onto the path.
    pub cycles_skipped: usize,
    /// Nodes not expanded because of the depth bound.
    pub depth_limited: usize,
}

// =============================================================================
// AddressSpaceBrowser
// =============================================================================

/// Walks the address space through a transport.
pub struct AddressSpaceBrowser<'a> {
    transport: &'a dyn OpcUaTransport,
    options: BrowseOptions,
}

impl<'a> AddressSpaceBrowser<'a> {
    /// Creates a browser.
    pub fn new(transport: &'a dyn OpcUaTransport, options: BrowseOptions) -> Self {
        Self { transport, options }
    }

    /// Browses every seed. No seeds browses the Objects folder.
    ///
    /// Only deadline and cancellation abort the walk; every other failure
    /// skips the affected seed or branch.
    pub async fn browse(
        &self,
        ctx: &Context,
        seeds: &[NodeId],
    ) -> OpcUaResult<(TagTree, BrowseStatistics)> {
        let default_root = [NodeId::standard(well_known::OBJECTS_FOLDER)];
        let seeds = if seeds.is_empty() { &default_root[..] } else { seeds };

        let mut tree = TagTree::default();
        let mut stats = BrowseStatistics::default();

        for seed in seeds {
            let attributes = match self.attributes(ctx, seed).await {
                Ok(a) => a,
                Err(e) if is_abort(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(node_id = %seed, error = %e, "Skipping unreadable seed node");
                    continue;
                }
            };
            let root = tree.push(None, seed.clone(), attributes, false);
            self.walk(ctx, &mut tree, root, &mut stats).await?;
        }

        tracing::debug!(
            seeds = seeds.len(),
            nodes = tree.len(),
            browse_calls = stats.browse_calls,
            failed_branches = stats.failed_branches,
            cycles_skipped = stats.cycles_skipped,
            "Browse complete"
        );
        Ok((tree, stats))
    }

    /// Describes a single node as a stand-alone target.
    pub async fn describe(&self, ctx: &Context, node_id: &NodeId) -> OpcUaResult<AcquisitionTarget> {
        let attributes = self.attributes(ctx, node_id).await?;
        Ok(AcquisitionTarget {
            node_id: node_id.clone(),
            metadata: TagMetadata::derive(
                node_id,
                std::iter::empty(),
                &attributes.display_name,
                &attributes.data_type,
            ),
            data_type: attributes.data_type,
        })
    }

    async fn walk(
        &self,
        ctx: &Context,
        tree: &mut TagTree,
        root: usize,
        stats: &mut BrowseStatistics,
    ) -> OpcUaResult<()> {
        let mut stack = vec![root];

        while let Some(index) = stack.pop() {
            let (node_id, depth, is_property) = {
                let node = &tree.nodes[index];
                (node.node_id.clone(), node.depth, node.is_property)
            };

            if is_property && !self.options.browse_properties {
                continue;
            }
            if depth >= self.options.max_depth {
                stats.depth_limited += 1;
                tracing::debug!(node_id = %node_id, depth, "Browse depth limit reached");
                continue;
            }

            stats.browse_calls += 1;
            let references = match ctx.run("browse", self.transport.browse(&node_id)).await {
                Ok(r) => r,
                Err(e) if is_abort(&e) => return Err(e),
                Err(e) => {
                    stats.failed_branches += 1;
                    tracing::warn!(node_id = %node_id, error = %e, "Skipping branch that failed to browse");
                    continue;
                }
            };

            let mut added = Vec::with_capacity(references.len());
            for reference in references {
                if tree.on_path(index, &reference.node_id) {
                    stats.cycles_skipped += 1;
                    tracing::trace!(
                        from = %node_id,
                        to = %reference.node_id,
                        "Skipping back-reference"
                    );
                    continue;
                }

                let is_property =
                    reference.reference_type_id == NodeId::standard(well_known::HAS_PROPERTY);
                let attributes = match self.child_attributes(ctx, &reference).await {
                    Ok(a) => a,
                    Err(e) if is_abort(&e) => return Err(e),
                    Err(e) => {
                        stats.failed_branches += 1;
                        tracing::warn!(
                            node_id = %reference.node_id,
                            error = %e,
                            "Skipping node with unreadable attributes"
                        );
                        continue;
                    }
                };
                added.push(tree.push(Some(index), reference.node_id, attributes, is_property));
            }

            stack.extend(added.into_iter().rev());
        }

        Ok(())
    }

    async fn attributes(&self, ctx: &Context, node_id: &NodeId) -> OpcUaResult<NodeAttributes> {
        ctx.run("read_attributes", self.transport.read_attributes(node_id))
            .await
    }

    async fn child_attributes(
        &self,
        ctx: &Context,
        reference: &BrowseReference,
    ) -> OpcUaResult<NodeAttributes> {
        let mut attributes = self.attributes(ctx, &reference.node_id).await?;
        if attributes.display_name.is_empty() {
            attributes.display_name = if reference.display_name.is_empty() {
                reference.browse_name.name.clone()
            } else {
                reference.display_name.clone()
            };
        }
        Ok(attributes)
    }
}

impl fmt::Debug for AddressSpaceBrowser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpaceBrowser")
            .field("transport", &self.transport.display_name())
            .field("options", &self.options)
            .finish()
    }
}

fn is_abort(error: &OpcUaError) -> bool {
    matches!(
        error,
        OpcUaError::DeadlineExceeded { .. } | OpcUaError::Cancelled { .. }
    )
}

// =============================================================================
// Tests
// =============================================================================
