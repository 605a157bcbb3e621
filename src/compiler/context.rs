use std::collections::HashMap;
use std::mem::align_of;

use thiserror::Error;
use uuid::Uuid;

use crate::model::{ToolsGraphDefinition, ToolsNode};
use crate::{
    ChildGraphSlot, CompiledNode, DataSlotIndex, ExternalGraphSlot, GraphDefinition, IndexType,
    NodeIndex, NodeSettings, ResourceReference, Seconds, StringId, VariationHierarchy,
};

#[derive(Error, Debug)]
pub enum GraphCompileError {
    #[error("variation \"{0}\" has no skeleton set")]
    MissingVariationSkeleton(StringId),
    #[error("unknown variation: {0}")]
    UnknownVariation(StringId),
    #[error("unknown node referenced during compilation: {0}")]
    UnknownNode(Uuid),
    #[error("expected exactly one result node, found {0}")]
    UnexpectedResultNodeCount(usize),
    #[error("settings serialization failed for \"{0}\": {1}")]
    SettingsSerialization(&'static str, serde_json::Error),
    #[error("no resource bound to slot \"{0}\" for variation \"{1}\"")]
    MissingSlotResource(StringId, StringId),
    #[error("graph references itself through slot \"{0}\"")]
    CyclicResourceReference(StringId),
    #[error("duplicate external graph slot: {0}")]
    DuplicateExternalGraphSlot(StringId),
    #[error("state machine references an unknown state")]
    InvalidStateReference,
    #[error("maximum node count reached")]
    MaxNodesReached,
    #[error("maximum node type count reached")]
    MaxNodeTypesReached,
    #[error("maximum data slot count reached")]
    MaxDataSlotsReached,
    #[error("graph instance memory limit exceeded")]
    InstanceMemoryOverflow,
    #[error("compilation produced {0} error(s)")]
    CompilationFailed(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogSeverity {
    Message,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct CompilationLogEntry {
    pub severity: LogSeverity,
    pub node: Option<Uuid>,
    pub message: String,
}

/// A data slot registered during compilation, already resolved through the
/// target variation. Consumed by the asset pipeline to build the
/// per-variation resource table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDataSlot {
    pub source_node: Uuid,
    pub resource: ResourceReference,
}

/// Per-session compilation state. Owned exclusively by one
/// [`crate::compiler::GraphDefinitionCompiler`] invocation and reset before
/// each new compilation.
///
/// Node registration doubles as a compile-time bump allocator: every
/// registered node advances the running instance offset to the next position
/// aligned for its runtime state, so the finished definition knows the exact
/// size, alignment and per-node start offsets of a future graph instance.
pub struct GraphCompilationContext {
    variation_id: StringId,
    variations: VariationHierarchy,
    resource_id: ResourceReference,

    node_types: Vec<&'static str>,
    nodes: Vec<CompiledNode>,
    node_paths: Vec<String>,
    node_id_to_index: HashMap<Uuid, NodeIndex>,
    persistent_nodes: Vec<NodeIndex>,

    node_memory_offsets: Vec<u32>,
    current_node_memory_offset: u32,
    instance_required_alignment: u32,

    data_slots: Vec<RegisteredDataSlot>,
    child_graph_slots: Vec<ChildGraphSlot>,
    external_graph_slots: Vec<ExternalGraphSlot>,

    log: Vec<CompilationLogEntry>,

    conduit_source_state: Option<NodeIndex>,
    transition_duration: Option<Seconds>,
    transition_duration_override: Option<NodeIndex>,
}

impl Default for GraphCompilationContext {
    fn default() -> Self {
        Self {
            variation_id: VariationHierarchy::default_id(),
            variations: VariationHierarchy::default(),
            resource_id: ResourceReference::none(),
            node_types: Vec::new(),
            nodes: Vec::new(),
            node_paths: Vec::new(),
            node_id_to_index: HashMap::new(),
            persistent_nodes: Vec::new(),
            node_memory_offsets: Vec::new(),
            current_node_memory_offset: 0,
            instance_required_alignment: align_of::<bool>() as u32,
            data_slots: Vec::new(),
            child_graph_slots: Vec::new(),
            external_graph_slots: Vec::new(),
            log: Vec::new(),
            conduit_source_state: None,
            transition_duration: None,
            transition_duration_override: None,
        }
    }
}

impl GraphCompilationContext {
    /// Drops all state from a previous session and binds this one to the
    /// graph's resource id, variation hierarchy and target variation.
    pub fn reset(&mut self, definition: &ToolsGraphDefinition, variation_id: StringId) {
        *self = Self {
            variation_id,
            variations: definition.variations.clone(),
            resource_id: definition.resource_id.clone(),
            ..Self::default()
        };
    }

    pub fn variation_id(&self) -> &StringId {
        &self.variation_id
    }

    pub fn compiled_node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn compiled_index(&self, id: Uuid) -> Option<NodeIndex> {
        self.node_id_to_index.get(&id).copied()
    }

    /// Registers a node's compiled settings and reserves its slice of the
    /// future instance memory. Inputs must already be compiled; the caller
    /// guards re-entry through [`Self::compiled_index`], so reaching this
    /// twice for one node is a defect in the node's `compile`.
    pub fn register_node<S: NodeSettings>(
        &mut self,
        node: &dyn ToolsNode,
        settings: &S,
    ) -> Result<NodeIndex, GraphCompileError> {
        assert!(
            !self.node_id_to_index.contains_key(&node.id()),
            "node registered twice: {}",
            node.path()
        );

        let index = NodeIndex(
            IndexType::try_from(self.nodes.len()).map_err(|_| GraphCompileError::MaxNodesReached)?,
        );

        let type_id = match self.node_types.iter().position(|x| *x == S::name()) {
            Some(existing) => existing as IndexType,
            None => {
                let next = IndexType::try_from(self.node_types.len())
                    .map_err(|_| GraphCompileError::MaxNodeTypesReached)?;
                self.node_types.push(S::name());
                next
            }
        };

        let value = serde_json::to_value(settings)
            .map_err(|err| GraphCompileError::SettingsSerialization(S::name(), err))?;

        let layout = S::instance_layout();
        let align = layout.align() as u32;
        let size = u32::try_from(layout.size())
            .map_err(|_| GraphCompileError::InstanceMemoryOverflow)?;
        let offset = self
            .current_node_memory_offset
            .checked_next_multiple_of(align)
            .ok_or(GraphCompileError::InstanceMemoryOverflow)?;

        self.nodes.push(CompiledNode { type_id, value });
        self.node_paths.push(node.path());
        self.node_memory_offsets.push(offset);
        self.current_node_memory_offset = offset
            .checked_add(size)
            .ok_or(GraphCompileError::InstanceMemoryOverflow)?;
        self.instance_required_alignment = self.instance_required_alignment.max(align);
        self.node_id_to_index.insert(node.id(), index);

        if node.is_persistent() {
            self.persistent_nodes.push(index);
        }

        debug_assert_eq!(self.nodes.len(), self.node_memory_offsets.len());
        debug_assert_eq!(self.nodes.len(), self.node_paths.len());
        Ok(index)
    }

    /// Resolves a data slot through the target variation's parent chain,
    /// falling back to the node's own default resource.
    pub fn resolve_slot_resource(
        &self,
        slot_id: &StringId,
        default: &ResourceReference,
    ) -> Result<ResourceReference, GraphCompileError> {
        let resolved = self
            .variations
            .resolve_override(&self.variation_id, slot_id)
            .cloned()
            .unwrap_or_else(|| default.clone());

        if !resolved.is_valid() {
            return Err(GraphCompileError::MissingSlotResource(
                slot_id.clone(),
                self.variation_id.clone(),
            ));
        }

        // a graph listing itself as an install dependency can never load
        if self.resource_id.is_valid() && resolved == self.resource_id {
            return Err(GraphCompileError::CyclicResourceReference(slot_id.clone()));
        }

        Ok(resolved)
    }

    pub fn register_data_slot(
        &mut self,
        source_node: Uuid,
        resource: ResourceReference,
    ) -> Result<DataSlotIndex, GraphCompileError> {
        let index = DataSlotIndex(
            IndexType::try_from(self.data_slots.len())
                .map_err(|_| GraphCompileError::MaxDataSlotsReached)?,
        );
        self.data_slots.push(RegisteredDataSlot {
            source_node,
            resource,
        });
        Ok(index)
    }

    pub fn registered_data_slots(&self) -> &[RegisteredDataSlot] {
        &self.data_slots
    }

    pub fn register_child_graph_slot(&mut self, node: NodeIndex, data_slot: DataSlotIndex) {
        self.child_graph_slots.push(ChildGraphSlot { node, data_slot });
    }

    pub fn register_external_graph_slot(
        &mut self,
        node: NodeIndex,
        slot_id: StringId,
    ) -> Result<(), GraphCompileError> {
        if self.external_graph_slots.iter().any(|x| x.slot_id == slot_id) {
            return Err(GraphCompileError::DuplicateExternalGraphSlot(slot_id));
        }
        self.external_graph_slots.push(ExternalGraphSlot { node, slot_id });
        Ok(())
    }

    pub fn log_message(&mut self, node: Option<Uuid>, message: impl Into<String>) {
        self.append_log(LogSeverity::Message, node, message.into());
    }

    pub fn log_warning(&mut self, node: Option<Uuid>, message: impl Into<String>) {
        self.append_log(LogSeverity::Warning, node, message.into());
    }

    /// Error entries force the surrounding compilation to fail.
    pub fn log_error(&mut self, node: Option<Uuid>, message: impl Into<String>) {
        self.append_log(LogSeverity::Error, node, message.into());
    }

    fn append_log(&mut self, severity: LogSeverity, node: Option<Uuid>, message: String) {
        self.log.push(CompilationLogEntry {
            severity,
            node,
            message,
        });
    }

    pub fn log(&self) -> &[CompilationLogEntry] {
        &self.log
    }

    pub fn error_count(&self) -> usize {
        self.log
            .iter()
            .filter(|x| x.severity == LogSeverity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() != 0
    }

    /// Transient scope opened while a state machine compiles one of its
    /// transitions; target-side compilation observes the source state and
    /// the authored blend duration through the accessors below.
    pub fn begin_transition_conduit(&mut self, source_state: NodeIndex, duration: Seconds) {
        debug_assert!(self.conduit_source_state.is_none());
        self.conduit_source_state = Some(source_state);
        self.transition_duration = Some(duration);
        self.transition_duration_override = None;
    }

    pub fn end_transition_conduit(&mut self) {
        self.conduit_source_state = None;
        self.transition_duration = None;
        self.transition_duration_override = None;
    }

    pub fn set_transition_duration_override(&mut self, node: NodeIndex) {
        self.transition_duration_override = Some(node);
    }

    pub fn conduit_source_state(&self) -> Option<NodeIndex> {
        self.conduit_source_state
    }

    pub fn transition_duration(&self) -> Option<Seconds> {
        self.transition_duration
    }

    pub fn transition_duration_override(&self) -> Option<NodeIndex> {
        self.transition_duration_override
    }

    pub(crate) fn build_definition(
        &self,
        root_node: NodeIndex,
        control_parameter_ids: Vec<StringId>,
        virtual_parameter_ids: Vec<StringId>,
        virtual_parameter_nodes: Vec<NodeIndex>,
    ) -> GraphDefinition {
        debug_assert_eq!(self.nodes.len(), self.node_memory_offsets.len());
        GraphDefinition {
            node_types: self.node_types.iter().map(|x| (*x).to_owned()).collect(),
            nodes: self.nodes.clone(),
            persistent_nodes: self.persistent_nodes.clone(),
            instance_node_start_offsets: self.node_memory_offsets.clone(),
            instance_required_memory: self.current_node_memory_offset,
            instance_required_alignment: self.instance_required_alignment,
            root_node,
            child_graph_slots: self.child_graph_slots.clone(),
            external_graph_slots: self.external_graph_slots.clone(),
            control_parameter_ids,
            virtual_parameter_ids,
            virtual_parameter_nodes,
            node_paths: self.node_paths.clone(),
        }
    }
}
