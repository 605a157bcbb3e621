use std::alloc::{Layout, LayoutError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{IndexType, StringId};

#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct NodeIndex(pub IndexType);

#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct DataSlotIndex(pub IndexType);

/// Compile-time contract of a node type: a serializable settings record plus
/// the footprint of the node's runtime state inside a graph instance. The
/// layout feeds the compile-time bump allocator that pre-computes the
/// instance memory image.
pub trait NodeSettings: Serialize + DeserializeOwned {
    fn name() -> &'static str;
    fn instance_layout() -> Layout;
}

/// Type-erased settings record: an index into the definition's node type
/// table plus the node's serialized settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledNode {
    pub type_id: IndexType,
    pub value: Value,
}

/// A nested graph resolved through a data slot at load time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildGraphSlot {
    pub node: NodeIndex,
    pub data_slot: DataSlotIndex,
}

/// A nested graph supplied by gameplay code at runtime, addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalGraphSlot {
    pub node: NodeIndex,
    pub slot_id: StringId,
}

#[derive(Error, Debug)]
pub enum GraphDefinitionError {
    #[error("invalid node index: {0:?}")]
    InvalidNodeIndex(NodeIndex),
    #[error("node {0:?} is not a \"{1}\"")]
    NodeTypeMismatch(NodeIndex, &'static str),
    #[error("settings deserialization failed for \"{0}\": {1}")]
    SettingsDeserialization(&'static str, serde_json::Error),
}

/// Flat compiled form of a tools graph, produced once per successful
/// compilation and immutable afterwards. The runtime allocates
/// [`Self::instance_layout`] bytes, constructs node `i`'s state at
/// `instance_node_start_offsets[i]`, keeps every node in
/// `persistent_nodes` alive across state transitions, and begins
/// evaluation at `root_node`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub(crate) node_types: Vec<String>,
    pub(crate) nodes: Vec<CompiledNode>,
    pub(crate) persistent_nodes: Vec<NodeIndex>,
    pub(crate) instance_node_start_offsets: Vec<u32>,
    pub(crate) instance_required_memory: u32,
    pub(crate) instance_required_alignment: u32,
    pub(crate) root_node: NodeIndex,
    pub(crate) child_graph_slots: Vec<ChildGraphSlot>,
    pub(crate) external_graph_slots: Vec<ExternalGraphSlot>,
    pub(crate) control_parameter_ids: Vec<StringId>,
    pub(crate) virtual_parameter_ids: Vec<StringId>,
    pub(crate) virtual_parameter_nodes: Vec<NodeIndex>,
    pub(crate) node_paths: Vec<String>,
}

impl GraphDefinition {
    pub fn node_types(&self) -> &[String] {
        &self.node_types
    }

    pub fn nodes(&self) -> &[CompiledNode] {
        &self.nodes
    }

    pub fn get_node(&self, node: NodeIndex) -> Option<&CompiledNode> {
        self.nodes.get(node.0 as usize)
    }

    pub fn node_type_name(&self, node: NodeIndex) -> Option<&str> {
        let compiled = self.get_node(node)?;
        self.node_types
            .get(compiled.type_id as usize)
            .map(String::as_str)
    }

    /// Deserializes a settings record back to its concrete type. The
    /// instantiation seam the runtime uses to construct node state.
    pub fn get_settings<S: NodeSettings>(&self, node: NodeIndex) -> Result<S, GraphDefinitionError> {
        let compiled = self
            .get_node(node)
            .ok_or(GraphDefinitionError::InvalidNodeIndex(node))?;
        if self.node_types.get(compiled.type_id as usize).map(String::as_str) != Some(S::name()) {
            return Err(GraphDefinitionError::NodeTypeMismatch(node, S::name()));
        }
        serde_json::from_value(compiled.value.clone())
            .map_err(|err| GraphDefinitionError::SettingsDeserialization(S::name(), err))
    }

    pub fn persistent_nodes(&self) -> &[NodeIndex] {
        &self.persistent_nodes
    }

    pub fn instance_node_start_offsets(&self) -> &[u32] {
        &self.instance_node_start_offsets
    }

    pub fn node_start_offset(&self, node: NodeIndex) -> Option<u32> {
        self.instance_node_start_offsets.get(node.0 as usize).copied()
    }

    pub fn instance_required_memory(&self) -> u32 {
        self.instance_required_memory
    }

    pub fn instance_required_alignment(&self) -> u32 {
        self.instance_required_alignment
    }

    pub fn instance_layout(&self) -> Result<Layout, LayoutError> {
        Layout::from_size_align(
            self.instance_required_memory as usize,
            self.instance_required_alignment as usize,
        )
    }

    pub fn root_node(&self) -> NodeIndex {
        self.root_node
    }

    pub fn child_graph_slots(&self) -> &[ChildGraphSlot] {
        &self.child_graph_slots
    }

    pub fn external_graph_slots(&self) -> &[ExternalGraphSlot] {
        &self.external_graph_slots
    }

    /// Position in this list is the parameter's value-storage slot at
    /// runtime; the order is part of the compiled ABI.
    pub fn control_parameter_ids(&self) -> &[StringId] {
        &self.control_parameter_ids
    }

    pub fn get_control_parameter_index(&self, id: &StringId) -> Option<IndexType> {
        self.control_parameter_ids
            .iter()
            .position(|x| x == id)
            .map(|x| x as IndexType)
    }

    pub fn virtual_parameter_ids(&self) -> &[StringId] {
        &self.virtual_parameter_ids
    }

    pub fn virtual_parameter_nodes(&self) -> &[NodeIndex] {
        &self.virtual_parameter_nodes
    }

    pub fn get_virtual_parameter_node(&self, id: &StringId) -> Option<NodeIndex> {
        self.virtual_parameter_ids
            .iter()
            .position(|x| x == id)
            .and_then(|x| self.virtual_parameter_nodes.get(x).copied())
    }

    /// Editor-facing source paths, index-aligned with [`Self::nodes`].
    pub fn node_paths(&self) -> &[String] {
        &self.node_paths
    }
}
