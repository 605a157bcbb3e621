use crate::compiler::context::{GraphCompileError, LogSeverity};
use crate::compiler::GraphDefinitionCompiler;
use crate::model::*;
use crate::*;

fn skeleton_hierarchy() -> VariationHierarchy {
    let mut variations = VariationHierarchy::default();
    variations
        .get_variation_mut(&VariationHierarchy::default_id())
        .expect("Valid")
        .skeleton = ResourceReference::from("skel/human");
    variations
}

fn locomotion_graph() -> ToolsGraphDefinition {
    let mut graph = ToolsGraph::default();
    let speed = graph.add(ToolsNodeEntry::ControlParameter(ControlParameterNode::new(
        "Speed",
        ParameterType::Float,
    )));
    let idle = graph.add_flow(AnimationClipNode::new("idle_clip", "anim/idle"));
    let run = graph.add_flow(AnimationClipNode::new("run_clip", "anim/run"));
    let blend = graph.add_flow(BlendNode::new(idle, run, speed));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(blend)));

    ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/locomotion"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    }
}

fn find_node_of_type(definition: &GraphDefinition, name: &str) -> NodeIndex {
    (0..definition.nodes().len())
        .map(|x| NodeIndex(x as IndexType))
        .find(|x| definition.node_type_name(*x) == Some(name))
        .expect("Valid")
}

#[test]
fn test_compile_minimal_graph() {
    let definition = locomotion_graph();
    let mut compiler = GraphDefinitionCompiler::default();
    let compiled = compiler.compile(&definition).expect("Valid");

    assert_eq!(compiled.nodes().len(), 5);
    assert_eq!(
        compiled.control_parameter_ids(),
        &[StringId::from("Speed")]
    );
    assert_eq!(
        compiled.get_control_parameter_index(&StringId::from("Speed")),
        Some(0)
    );
    assert_eq!(compiled.node_type_name(compiled.root_node()), Some("result"));

    // control parameters compile before the dataflow is pulled
    assert_eq!(compiled.node_type_name(NodeIndex(0)), Some("control_parameter"));
    assert_eq!(compiled.persistent_nodes(), &[NodeIndex(0), compiled.root_node()]);

    let result: ResultSettings = compiled.get_settings(compiled.root_node()).expect("Valid");
    assert_eq!(compiled.node_type_name(result.source), Some("blend"));

    let blend: BlendSettings = compiled.get_settings(result.source).expect("Valid");
    assert_eq!(blend.weight_node, NodeIndex(0));
    assert_eq!(compiled.node_type_name(blend.source0), Some("animation_clip"));
    assert_eq!(compiled.node_type_name(blend.source1), Some("animation_clip"));

    let slots = compiler.registered_data_slots();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].resource, ResourceReference::from("anim/idle"));
    assert_eq!(slots[1].resource, ResourceReference::from("anim/run"));
}

#[test]
fn test_instance_memory_layout() {
    let definition = locomotion_graph();
    let mut compiler = GraphDefinitionCompiler::default();
    let compiled = compiler.compile(&definition).expect("Valid");

    // parameter u64, two clips (u64, f32, f32), blend (f32, f32), result u32
    assert_eq!(compiled.instance_node_start_offsets(), &[0, 8, 24, 40, 48]);
    assert_eq!(compiled.instance_required_memory(), 52);
    assert_eq!(compiled.instance_required_alignment(), 8);

    let layout = compiled.instance_layout().expect("Valid");
    assert_eq!(layout.size(), 52);
    assert_eq!(layout.align(), 8);
}

#[test]
fn test_compile_is_deterministic() {
    let definition = locomotion_graph();

    let first = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect("Valid");
    let second = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect("Valid");

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_value(&first).expect("Valid"),
        serde_json::to_value(&second).expect("Valid")
    );
}

#[test]
fn test_missing_result_node() {
    let mut definition = locomotion_graph();
    definition.root_graph = ToolsGraph::default();

    let mut compiler = GraphDefinitionCompiler::default();
    let err = compiler.compile(&definition).expect_err("Invalid");
    assert!(matches!(
        err,
        GraphCompileError::UnexpectedResultNodeCount(0)
    ));
    assert!(compiler
        .log()
        .iter()
        .any(|x| x.severity == LogSeverity::Error));
}

#[test]
fn test_multiple_result_nodes() {
    let mut definition = locomotion_graph();
    let clip = definition
        .root_graph
        .add_flow(AnimationClipNode::new("extra_clip", "anim/extra"));
    definition
        .root_graph
        .add(ToolsNodeEntry::Result(ResultNode::new(clip)));

    let err = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect_err("Invalid");
    assert!(matches!(
        err,
        GraphCompileError::UnexpectedResultNodeCount(2)
    ));
}

#[test]
fn test_missing_variation_skeleton() {
    let mut definition = locomotion_graph();
    definition.variations = VariationHierarchy::default();

    let mut compiler = GraphDefinitionCompiler::default();
    let err = compiler.compile(&definition).expect_err("Invalid");
    assert!(matches!(
        err,
        GraphCompileError::MissingVariationSkeleton(_)
    ));
    assert!(compiler
        .log()
        .iter()
        .any(|x| x.severity == LogSeverity::Error));
}

#[test]
fn test_unknown_variation() {
    let definition = locomotion_graph();
    let mut compiler = GraphDefinitionCompiler::default();
    compiler.compile(&definition).expect("Valid");

    let err = compiler
        .compile_variation(&definition, &StringId::from("Night"))
        .expect_err("Invalid");
    assert!(matches!(err, GraphCompileError::UnknownVariation(_)));

    // the failed run starts a fresh log and records its own error
    assert_eq!(compiler.log().len(), 1);
    assert_eq!(compiler.log()[0].severity, LogSeverity::Error);
}

#[test]
fn test_variation_id_is_case_corrected() {
    let mut definition = locomotion_graph();
    definition
        .variations
        .create_variation(StringId::from("Combat"), &VariationHierarchy::default_id());
    definition
        .variations
        .get_variation_mut(&StringId::from("Combat"))
        .expect("Valid")
        .skeleton = ResourceReference::from("skel/human");

    GraphDefinitionCompiler::default()
        .compile_variation(&definition, &StringId::from("combat"))
        .expect("Valid");
}

#[test]
fn test_variation_override_resolves_data_slot() {
    let mut definition = locomotion_graph();
    definition
        .variations
        .create_variation(StringId::from("Combat"), &VariationHierarchy::default_id());
    let combat = definition
        .variations
        .get_variation_mut(&StringId::from("Combat"))
        .expect("Valid");
    combat.skeleton = ResourceReference::from("skel/human");
    combat.overrides.insert(
        StringId::from("idle_clip"),
        ResourceReference::from("anim/idle_combat"),
    );

    let mut compiler = GraphDefinitionCompiler::default();
    compiler
        .compile_variation(&definition, &StringId::from("Combat"))
        .expect("Valid");

    let slots = compiler.registered_data_slots();
    assert_eq!(slots[0].resource, ResourceReference::from("anim/idle_combat"));
    assert_eq!(slots[1].resource, ResourceReference::from("anim/run"));
}

#[test]
fn test_shared_input_compiles_once() {
    let mut graph = ToolsGraph::default();
    let speed = graph.add(ToolsNodeEntry::ControlParameter(ControlParameterNode::new(
        "Speed",
        ParameterType::Float,
    )));
    let clip = graph.add_flow(AnimationClipNode::new("idle_clip", "anim/idle"));
    let blend = graph.add_flow(BlendNode::new(clip, clip, speed));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(blend)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/mirror"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let mut compiler = GraphDefinitionCompiler::default();
    let compiled = compiler.compile(&definition).expect("Valid");

    assert_eq!(compiled.nodes().len(), 4);
    assert_eq!(compiler.registered_data_slots().len(), 1);

    let result: ResultSettings = compiled.get_settings(compiled.root_node()).expect("Valid");
    let blend: BlendSettings = compiled.get_settings(result.source).expect("Valid");
    assert_eq!(blend.source0, blend.source1);
}

#[test]
fn test_graph_referencing_itself_is_rejected() {
    let mut graph = ToolsGraph::default();
    let child = graph.add_flow(ChildGraphNode::new("child_slot", "graph/locomotion"));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(child)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/locomotion"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let mut compiler = GraphDefinitionCompiler::default();
    let err = compiler.compile(&definition).expect_err("Invalid");
    assert!(matches!(err, GraphCompileError::CyclicResourceReference(_)));
    assert!(compiler
        .log()
        .iter()
        .any(|x| x.severity == LogSeverity::Error));
}

#[test]
fn test_duplicate_external_graph_slot() {
    let mut graph = ToolsGraph::default();
    let speed = graph.add(ToolsNodeEntry::ControlParameter(ControlParameterNode::new(
        "Speed",
        ParameterType::Float,
    )));
    let first = graph.add_flow(ExternalGraphNode::new("attachment"));
    let second = graph.add_flow(ExternalGraphNode::new("attachment"));
    let blend = graph.add_flow(BlendNode::new(first, second, speed));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(blend)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/attachments"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let err = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect_err("Invalid");
    assert!(matches!(
        err,
        GraphCompileError::DuplicateExternalGraphSlot(_)
    ));
}

#[test]
fn test_child_and_external_slots_recorded() {
    let mut graph = ToolsGraph::default();
    let speed = graph.add(ToolsNodeEntry::ControlParameter(ControlParameterNode::new(
        "Speed",
        ParameterType::Float,
    )));
    let child = graph.add_flow(ChildGraphNode::new("lower_body", "graph/legs"));
    let external = graph.add_flow(ExternalGraphNode::new("weapon"));
    let blend = graph.add_flow(BlendNode::new(child, external, speed));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(blend)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/body"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let mut compiler = GraphDefinitionCompiler::default();
    let compiled = compiler.compile(&definition).expect("Valid");

    assert_eq!(compiled.child_graph_slots().len(), 1);
    let child_slot = &compiled.child_graph_slots()[0];
    assert_eq!(compiled.node_type_name(child_slot.node), Some("child_graph"));
    let child_settings: ChildGraphSettings =
        compiled.get_settings(child_slot.node).expect("Valid");
    assert_eq!(child_settings.data_slot, child_slot.data_slot);
    assert_eq!(
        compiler.registered_data_slots()[child_slot.data_slot.0 as usize].resource,
        ResourceReference::from("graph/legs")
    );

    assert_eq!(compiled.external_graph_slots().len(), 1);
    let external_slot = &compiled.external_graph_slots()[0];
    assert_eq!(external_slot.slot_id, StringId::from("weapon"));
    assert_eq!(
        compiled.node_type_name(external_slot.node),
        Some("external_graph")
    );
}

#[test]
fn test_state_machine_transition_settings() {
    let mut graph = ToolsGraph::default();
    let transition_time = graph.add(ToolsNodeEntry::ControlParameter(
        ControlParameterNode::new("TransitionTime", ParameterType::Float),
    ));
    let walk = graph.add_flow(AnimationClipNode::new("walk_clip", "anim/walk"));
    let run = graph.add_flow(AnimationClipNode::new("run_clip", "anim/run"));
    let machine = graph.add_flow(StateMachineNode::new(
        vec![
            StateDesc {
                name: StringId::from("Walk"),
                child: walk,
            },
            StateDesc {
                name: StringId::from("Run"),
                child: run,
            },
        ],
        vec![TransitionDesc {
            source_state: 0,
            target_state: 1,
            duration: Seconds(0.25),
            duration_override: Some(transition_time),
        }],
    ));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(machine)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/locomotion_sm"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let compiled = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect("Valid");

    let machine_node = find_node_of_type(&compiled, "state_machine");
    let settings: StateMachineSettings = compiled.get_settings(machine_node).expect("Valid");

    assert_eq!(settings.states.len(), 2);
    assert_eq!(settings.initial_state, 0);
    assert_eq!(settings.transitions.len(), 1);

    let transition = &settings.transitions[0];
    assert_eq!(transition.source_state, settings.states[0]);
    assert_eq!(transition.target_state, settings.states[1]);
    assert_eq!(transition.duration, Seconds(0.25));
    // the override pulls on the already compiled parameter
    assert_eq!(transition.duration_override, Some(NodeIndex(0)));
}

#[test]
fn test_invalid_state_reference() {
    let mut graph = ToolsGraph::default();
    let walk = graph.add_flow(AnimationClipNode::new("walk_clip", "anim/walk"));
    let machine = graph.add_flow(StateMachineNode::new(
        vec![StateDesc {
            name: StringId::from("Walk"),
            child: walk,
        }],
        vec![TransitionDesc {
            source_state: 0,
            target_state: 3,
            duration: Seconds(0.1),
            duration_override: None,
        }],
    ));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(machine)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/broken_sm"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let err = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect_err("Invalid");
    assert!(matches!(err, GraphCompileError::InvalidStateReference));
}

#[test]
fn test_state_machine_without_states_is_rejected() {
    let mut graph = ToolsGraph::default();
    let machine = graph.add_flow(StateMachineNode::new(vec![], vec![]));
    graph.add(ToolsNodeEntry::Result(ResultNode::new(machine)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/empty_sm"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let err = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect_err("Invalid");
    assert!(matches!(err, GraphCompileError::InvalidStateReference));
}

#[test]
fn test_initial_state_out_of_range_is_rejected() {
    let mut graph = ToolsGraph::default();
    let walk = graph.add_flow(AnimationClipNode::new("walk_clip", "anim/walk"));
    let mut machine = StateMachineNode::new(
        vec![StateDesc {
            name: StringId::from("Walk"),
            child: walk,
        }],
        vec![],
    );
    machine.initial_state = 1;
    let machine = graph.add_flow(machine);
    graph.add(ToolsNodeEntry::Result(ResultNode::new(machine)));
    let definition = ToolsGraphDefinition {
        resource_id: ResourceReference::from("graph/bad_initial_sm"),
        variations: skeleton_hierarchy(),
        root_graph: graph,
    };

    let err = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect_err("Invalid");
    assert!(matches!(err, GraphCompileError::InvalidStateReference));
}

#[test]
fn test_virtual_parameter_compiles_input_first() {
    let mut definition = locomotion_graph();
    let speed = definition
        .root_graph
        .control_parameters()
        .next()
        .expect("Valid")
        .id;
    definition
        .root_graph
        .add(ToolsNodeEntry::VirtualParameter(VirtualParameterNode::new(
            "SpeedAlias",
            ParameterType::Float,
            speed,
        )));

    let compiled = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect("Valid");

    assert_eq!(
        compiled.virtual_parameter_ids(),
        &[StringId::from("SpeedAlias")]
    );
    let node = compiled
        .get_virtual_parameter_node(&StringId::from("SpeedAlias"))
        .expect("Valid");
    assert!(compiled.persistent_nodes().contains(&node));

    let settings: VirtualParameterSettings = compiled.get_settings(node).expect("Valid");
    assert_eq!(settings.child, NodeIndex(0));
    assert_eq!(compiled.node_type_name(settings.child), Some("control_parameter"));
}

#[test]
fn test_parameter_name_collisions_warn() {
    let mut definition = locomotion_graph();
    definition
        .root_graph
        .add(ToolsNodeEntry::ControlParameter(ControlParameterNode::new(
            "speed",
            ParameterType::Bool,
        )));

    let mut compiler = GraphDefinitionCompiler::default();
    compiler.compile(&definition).expect("Valid");

    assert!(compiler
        .log()
        .iter()
        .any(|x| x.severity == LogSeverity::Warning));
}

#[test]
fn test_settings_type_mismatch() {
    let definition = locomotion_graph();
    let compiled = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect("Valid");

    let err = compiled
        .get_settings::<BlendSettings>(compiled.root_node())
        .expect_err("Invalid");
    assert!(matches!(err, GraphDefinitionError::NodeTypeMismatch(_, _)));
}

#[test]
fn test_definition_serde_roundtrip() {
    let definition = locomotion_graph();
    let compiled = GraphDefinitionCompiler::default()
        .compile(&definition)
        .expect("Valid");

    let serialized = serde_json::to_string(&compiled).expect("Valid");
    let restored: GraphDefinition = serde_json::from_str(&serialized).expect("Valid");
    assert_eq!(compiled, restored);

    let result: ResultSettings = restored.get_settings(restored.root_node()).expect("Valid");
    assert_eq!(restored.node_type_name(result.source), Some("blend"));
}
