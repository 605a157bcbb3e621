//! Authoring-side ("tools") model of a graph: the editable node soup the
//! compiler turns into a flat [`crate::GraphDefinition`].

use std::alloc::Layout;

use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compiler::context::{GraphCompilationContext, GraphCompileError};
use crate::{
    DataSlotIndex, IndexType, NodeIndex, NodeSettings, ResourceReference, Seconds, StringId,
    VariationHierarchy,
};

/// Authoring-side node. `compile` pulls the node's inputs through
/// [`ToolsGraph::compile_node`] first and registers its own settings last,
/// so the compiled node list is dependency ordered.
pub trait ToolsNode: Send + Sync {
    fn id(&self) -> Uuid;
    fn type_name(&self) -> &'static str;

    /// Persistent nodes keep their runtime state alive for the whole
    /// lifetime of a graph instance.
    fn is_persistent(&self) -> bool {
        false
    }

    /// Editor-facing source location recorded next to the compiled settings.
    fn path(&self) -> String {
        format!("{}#{}", self.type_name(), self.id())
    }

    fn compile(
        &self,
        graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError>;
}

/// Entry in a tools graph. Parameters and the result node are addressed by
/// the compiler phases directly; everything else is reached through the
/// dataflow from those roots.
pub enum ToolsNodeEntry {
    ControlParameter(ControlParameterNode),
    VirtualParameter(VirtualParameterNode),
    Result(ResultNode),
    Flow(Box<dyn ToolsNode>),
}

impl ToolsNodeEntry {
    pub fn node(&self) -> &dyn ToolsNode {
        match self {
            ToolsNodeEntry::ControlParameter(node) => node,
            ToolsNodeEntry::VirtualParameter(node) => node,
            ToolsNodeEntry::Result(node) => node,
            ToolsNodeEntry::Flow(node) => node.as_ref(),
        }
    }

    pub fn as_control_parameter(&self) -> Option<&ControlParameterNode> {
        match self {
            ToolsNodeEntry::ControlParameter(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_virtual_parameter(&self) -> Option<&VirtualParameterNode> {
        match self {
            ToolsNodeEntry::VirtualParameter(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&ResultNode> {
        match self {
            ToolsNodeEntry::Result(node) => Some(node),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct ToolsGraph {
    nodes: Vec<ToolsNodeEntry>,
}

impl ToolsGraph {
    pub fn add(&mut self, entry: ToolsNodeEntry) -> Uuid {
        let id = entry.node().id();
        self.nodes.push(entry);
        id
    }

    pub fn add_flow(&mut self, node: impl ToolsNode + 'static) -> Uuid {
        self.add(ToolsNodeEntry::Flow(Box::new(node)))
    }

    pub fn nodes(&self) -> &[ToolsNodeEntry] {
        &self.nodes
    }

    pub fn get_node(&self, id: Uuid) -> Option<&ToolsNodeEntry> {
        self.nodes.iter().find(|x| x.node().id() == id)
    }

    pub fn control_parameters(&self) -> impl Iterator<Item = &ControlParameterNode> {
        self.nodes.iter().filter_map(|x| x.as_control_parameter())
    }

    pub fn virtual_parameters(&self) -> impl Iterator<Item = &VirtualParameterNode> {
        self.nodes.iter().filter_map(|x| x.as_virtual_parameter())
    }

    pub fn result_nodes(&self) -> impl Iterator<Item = &ResultNode> {
        self.nodes.iter().filter_map(|x| x.as_result())
    }

    /// Single entry point for compiling a node by id. Nodes the context has
    /// already seen return their existing index, so shared inputs compile
    /// once no matter how many consumers pull on them.
    pub fn compile_node(
        &self,
        id: Uuid,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        if let Some(index) = context.compiled_index(id) {
            return Ok(index);
        }
        let entry = self
            .get_node(id)
            .ok_or(GraphCompileError::UnknownNode(id))?;
        entry.node().compile(self, context)
    }
}

/// Editable source of one graph asset: the node soup plus the variation set
/// it can be compiled against.
#[derive(Default)]
pub struct ToolsGraphDefinition {
    pub resource_id: ResourceReference,
    pub variations: VariationHierarchy,
    pub root_graph: ToolsGraph,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    Bool,
    Float,
    Id,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlParameterSettings {
    pub parameter_id: StringId,
    pub value_type: ParameterType,
}

impl NodeSettings for ControlParameterSettings {
    fn name() -> &'static str {
        "control_parameter"
    }

    fn instance_layout() -> Layout {
        Layout::new::<u64>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualParameterSettings {
    pub parameter_id: StringId,
    pub child: NodeIndex,
}

impl NodeSettings for VirtualParameterSettings {
    fn name() -> &'static str {
        "virtual_parameter"
    }

    fn instance_layout() -> Layout {
        Layout::new::<u64>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSettings {
    pub source: NodeIndex,
}

impl NodeSettings for ResultSettings {
    fn name() -> &'static str {
        "result"
    }

    fn instance_layout() -> Layout {
        Layout::new::<u32>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationClipSettings {
    pub data_slot: DataSlotIndex,
}

impl NodeSettings for AnimationClipSettings {
    fn name() -> &'static str {
        "animation_clip"
    }

    fn instance_layout() -> Layout {
        Layout::new::<(u64, f32, f32)>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendSettings {
    pub source0: NodeIndex,
    pub source1: NodeIndex,
    pub weight_node: NodeIndex,
}

impl NodeSettings for BlendSettings {
    fn name() -> &'static str {
        "blend"
    }

    fn instance_layout() -> Layout {
        Layout::new::<(f32, f32)>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildGraphSettings {
    pub data_slot: DataSlotIndex,
}

impl NodeSettings for ChildGraphSettings {
    fn name() -> &'static str {
        "child_graph"
    }

    fn instance_layout() -> Layout {
        Layout::new::<(u64, u64)>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalGraphSettings {
    pub slot_id: StringId,
}

impl NodeSettings for ExternalGraphSettings {
    fn name() -> &'static str {
        "external_graph"
    }

    fn instance_layout() -> Layout {
        Layout::new::<u64>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSettings {
    pub source_state: NodeIndex,
    pub target_state: NodeIndex,
    pub duration: Seconds,
    pub duration_override: Option<NodeIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineSettings {
    pub states: Vec<NodeIndex>,
    pub transitions: Vec<TransitionSettings>,
    pub initial_state: IndexType,
}

impl NodeSettings for StateMachineSettings {
    fn name() -> &'static str {
        "state_machine"
    }

    fn instance_layout() -> Layout {
        Layout::new::<(u64, u32, u32)>()
    }
}

/// Externally written value the runtime exposes by name. Compiled order
/// across all control parameters defines their value-storage slots.
pub struct ControlParameterNode {
    pub id: Uuid,
    pub name: StringId,
    pub value_type: ParameterType,
}

impl ControlParameterNode {
    pub fn new(name: impl Into<StringId>, value_type: ParameterType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            value_type,
        }
    }
}

impl ToolsNode for ControlParameterNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        ControlParameterSettings::name()
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn compile(
        &self,
        _graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        context.register_node(
            self,
            &ControlParameterSettings {
                parameter_id: self.name.clone(),
                value_type: self.value_type,
            },
        )
    }
}

/// Named expression over other parameters and flow nodes, addressable like a
/// control parameter but computed on demand.
pub struct VirtualParameterNode {
    pub id: Uuid,
    pub name: StringId,
    pub value_type: ParameterType,
    pub input: Uuid,
}

impl VirtualParameterNode {
    pub fn new(name: impl Into<StringId>, value_type: ParameterType, input: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            value_type,
            input,
        }
    }
}

impl ToolsNode for VirtualParameterNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        VirtualParameterSettings::name()
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn compile(
        &self,
        graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        let child = graph.compile_node(self.input, context)?;
        context.register_node(
            self,
            &VirtualParameterSettings {
                parameter_id: self.name.clone(),
                child,
            },
        )
    }
}

/// Final pose output. Exactly one per graph; its compiled index becomes the
/// definition's root node.
pub struct ResultNode {
    pub id: Uuid,
    pub source: Uuid,
}

impl ResultNode {
    pub fn new(source: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
        }
    }
}

impl ToolsNode for ResultNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        ResultSettings::name()
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn compile(
        &self,
        graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        let source = graph.compile_node(self.source, context)?;
        context.register_node(self, &ResultSettings { source })
    }
}

/// Samples a clip resolved through a variation-overridable data slot.
pub struct AnimationClipNode {
    pub id: Uuid,
    pub slot_id: StringId,
    pub resource: ResourceReference,
}

impl AnimationClipNode {
    pub fn new(slot_id: impl Into<StringId>, resource: impl Into<ResourceReference>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id: slot_id.into(),
            resource: resource.into(),
        }
    }
}

impl ToolsNode for AnimationClipNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        AnimationClipSettings::name()
    }

    fn compile(
        &self,
        _graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        let resource = context.resolve_slot_resource(&self.slot_id, &self.resource)?;
        let data_slot = context.register_data_slot(self.id, resource)?;
        context.register_node(self, &AnimationClipSettings { data_slot })
    }
}

/// Two-way pose blend driven by a float input.
pub struct BlendNode {
    pub id: Uuid,
    pub source0: Uuid,
    pub source1: Uuid,
    pub weight: Uuid,
}

impl BlendNode {
    pub fn new(source0: Uuid, source1: Uuid, weight: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            source0,
            source1,
            weight,
        }
    }
}

impl ToolsNode for BlendNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        BlendSettings::name()
    }

    fn compile(
        &self,
        graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        let source0 = graph.compile_node(self.source0, context)?;
        let source1 = graph.compile_node(self.source1, context)?;
        let weight_node = graph.compile_node(self.weight, context)?;
        context.register_node(
            self,
            &BlendSettings {
                source0,
                source1,
                weight_node,
            },
        )
    }
}

/// Nested graph baked in at load time through a data slot, so variations can
/// swap the child asset.
pub struct ChildGraphNode {
    pub id: Uuid,
    pub slot_id: StringId,
    pub resource: ResourceReference,
}

impl ChildGraphNode {
    pub fn new(slot_id: impl Into<StringId>, resource: impl Into<ResourceReference>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id: slot_id.into(),
            resource: resource.into(),
        }
    }
}

impl ToolsNode for ChildGraphNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        ChildGraphSettings::name()
    }

    fn compile(
        &self,
        _graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        let resource = context.resolve_slot_resource(&self.slot_id, &self.resource)?;
        let data_slot = context.register_data_slot(self.id, resource)?;
        let index = context.register_node(self, &ChildGraphSettings { data_slot })?;
        context.register_child_graph_slot(index, data_slot);
        Ok(index)
    }
}

/// Nested graph supplied by gameplay code at runtime. Slot names are unique
/// per definition.
pub struct ExternalGraphNode {
    pub id: Uuid,
    pub slot_id: StringId,
}

impl ExternalGraphNode {
    pub fn new(slot_id: impl Into<StringId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id: slot_id.into(),
        }
    }
}

impl ToolsNode for ExternalGraphNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        ExternalGraphSettings::name()
    }

    fn compile(
        &self,
        _graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        let index = context.register_node(
            self,
            &ExternalGraphSettings {
                slot_id: self.slot_id.clone(),
            },
        )?;
        context.register_external_graph_slot(index, self.slot_id.clone())?;
        Ok(index)
    }
}

pub struct StateDesc {
    pub name: StringId,
    pub child: Uuid,
}

pub struct TransitionDesc {
    pub source_state: usize,
    pub target_state: usize,
    pub duration: Seconds,
    pub duration_override: Option<Uuid>,
}

/// States own child subtrees; transitions compile inside a conduit scope on
/// the context so target-side nodes can observe the source state and the
/// authored blend duration.
pub struct StateMachineNode {
    pub id: Uuid,
    pub states: Vec<StateDesc>,
    pub transitions: Vec<TransitionDesc>,
    pub initial_state: usize,
}

impl StateMachineNode {
    pub fn new(states: Vec<StateDesc>, transitions: Vec<TransitionDesc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            states,
            transitions,
            initial_state: 0,
        }
    }
}

impl ToolsNode for StateMachineNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn type_name(&self) -> &'static str {
        StateMachineSettings::name()
    }

    fn compile(
        &self,
        graph: &ToolsGraph,
        context: &mut GraphCompilationContext,
    ) -> Result<NodeIndex, GraphCompileError> {
        let mut states = Vec::with_capacity(self.states.len());
        for state in &self.states {
            states.push(graph.compile_node(state.child, context)?);
        }

        let mut transitions = Vec::with_capacity(self.transitions.len());
        for transition in &self.transitions {
            let source = states
                .get(transition.source_state)
                .copied()
                .ok_or(GraphCompileError::InvalidStateReference)?;
            let target = states
                .get(transition.target_state)
                .copied()
                .ok_or(GraphCompileError::InvalidStateReference)?;

            context.begin_transition_conduit(source, transition.duration);
            if let Some(override_id) = transition.duration_override {
                let override_node = graph.compile_node(override_id, context)?;
                context.set_transition_duration_override(override_node);
            }
            transitions.push(TransitionSettings {
                source_state: source,
                target_state: target,
                duration: context.transition_duration().unwrap_or_default(),
                duration_override: context.transition_duration_override(),
            });
            context.end_transition_conduit();
        }

        let initial_state = IndexType::try_from(self.initial_state)
            .ok()
            .filter(|x| (*x as usize) < self.states.len())
            .ok_or(GraphCompileError::InvalidStateReference)?;

        context.register_node(
            self,
            &StateMachineSettings {
                states,
                transitions,
                initial_state,
            },
        )
    }
}
