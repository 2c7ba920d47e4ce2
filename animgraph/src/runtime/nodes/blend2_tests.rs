use crate::runtime::test_fixtures::{
    ELBOW, angle_degrees, assert_approx, motion_set, skeleton,
};
use crate::{
    AnimGraph, AnimGraphBuilder, AnimGraphInstance, Blend2Node, EventMode, EventState,
    MotionNode, NodeIndex, ParameterDef, ParameterNode, Pose, Transform,
};
use std::sync::Arc;

struct BlendSetup {
    graph: Arc<AnimGraph>,
    blend: NodeIndex,
    a: NodeIndex,
    b: NodeIndex,
}

fn blend_graph(motion_a: &str, motion_b: &str, node: Blend2Node, disabled: bool) -> BlendSetup {
    let mut builder = AnimGraphBuilder::new("blend2");
    builder
        .add_parameter(ParameterDef::float("weight", 0.0))
        .expect("parameter");
    let root = builder.root();
    let a = builder
        .add_node(root, MotionNode::new("A", motion_a))
        .expect("A");
    let b = builder
        .add_node(root, MotionNode::new("B", motion_b))
        .expect("B");
    let weight = builder
        .add_node(root, ParameterNode::new("Weight", "weight"))
        .expect("weight");
    let blend = builder.add_node(root, node).expect("blend");
    builder
        .connect(a, MotionNode::OUTPUT_POSE, blend, Blend2Node::INPUT_POSE_A)
        .expect("connect A");
    builder
        .connect(b, MotionNode::OUTPUT_POSE, blend, Blend2Node::INPUT_POSE_B)
        .expect("connect B");
    builder
        .connect(weight, ParameterNode::OUTPUT_VALUE, blend, Blend2Node::INPUT_WEIGHT)
        .expect("connect weight");
    builder.connect_to_final(root, blend).expect("final");
    builder.set_disabled(blend, disabled).expect("disable");
    BlendSetup {
        graph: builder.build(),
        blend,
        a,
        b,
    }
}

fn evaluate(setup: &BlendSetup, weight: f32, time_passed: f32) -> (AnimGraphInstance, Pose) {
    let skeleton = skeleton();
    let mut instance =
        AnimGraphInstance::new(Arc::clone(&setup.graph), Arc::clone(&skeleton), Some(motion_set()));
    instance.set_float_parameter("weight", weight).expect("weight");
    let mut pose = Pose::bind(&skeleton, 0);
    instance.evaluate(time_passed, &mut pose);
    (instance, pose)
}

fn elbow_angle(pose: &Pose) -> f32 {
    angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation)
}

#[test]
fn half_weight_bends_elbow_halfway() {
    let setup = blend_graph("bind", "bent", Blend2Node::new("Blend"), false);
    let (instance, pose) = evaluate(&setup, 0.5, 1.0 / 60.0);

    assert_approx(elbow_angle(&pose), 22.5);
    assert_eq!(instance.num_used_poses(), 0);
    assert_eq!(instance.num_used_ref_datas(), 0);
}

#[test]
fn weight_outside_unit_range_is_clamped() {
    let setup = blend_graph("bind", "bent", Blend2Node::new("Blend"), false);

    let (_, pose) = evaluate(&setup, 1.5, 1.0 / 60.0);
    assert_approx(elbow_angle(&pose), 45.0);

    let (_, pose) = evaluate(&setup, -0.5, 1.0 / 60.0);
    assert_approx(elbow_angle(&pose), 0.0);
}

#[test]
fn weight_near_zero_evaluates_only_pose_a() {
    let setup = blend_graph("bind", "bent", Blend2Node::new("Blend"), false);
    let (instance, pose) = evaluate(&setup, 0.000_001, 1.0 / 60.0);

    let blend = setup.graph.node_as::<Blend2Node>(setup.blend).expect("blend node");
    let nodes = blend.find_blend_nodes(&instance);
    assert_eq!(nodes.a, Some(setup.a));
    assert_eq!(nodes.b, None);
    assert!(instance.is_update_ready(setup.a));
    assert!(!instance.is_update_ready(setup.b));
    assert!(!instance.is_output_ready(setup.b));
    assert_approx(elbow_angle(&pose), 0.0);
}

#[test]
fn weight_near_one_evaluates_only_pose_b() {
    let setup = blend_graph("bind", "bent", Blend2Node::new("Blend"), false);
    let (instance, pose) = evaluate(&setup, 0.999_999, 1.0 / 60.0);

    let blend = setup.graph.node_as::<Blend2Node>(setup.blend).expect("blend node");
    let nodes = blend.find_blend_nodes(&instance);
    assert_eq!(nodes.a, Some(setup.b));
    assert_eq!(nodes.b, None);
    assert_approx(nodes.weight, 1.0);
    assert!(!instance.is_update_ready(setup.a));
    assert_approx(elbow_angle(&pose), 45.0);
}

#[test]
fn disabled_blend_outputs_bind_pose() {
    let setup = blend_graph("walk", "missing", Blend2Node::new("Blend"), true);
    let (instance, pose) = evaluate(&setup, 0.5, 0.3);

    assert_approx(elbow_angle(&pose), 0.0);
    assert!(instance.events().is_empty());
    assert!(instance.trajectory_delta().is_close(&Transform::IDENTITY, 1.0e-6));
    assert!(!instance.is_update_ready(setup.a));
    assert!(!instance.is_update_ready(setup.b));
    assert_eq!(instance.num_used_poses(), 0);
    assert_eq!(instance.num_used_ref_datas(), 0);
}

#[test]
fn non_finite_weight_reads_as_zero() {
    let setup = blend_graph("bind", "bent", Blend2Node::new("Blend"), false);

    for weight in [f32::NAN, f32::INFINITY] {
        let (instance, pose) = evaluate(&setup, weight, 1.0 / 60.0);
        let blend = setup.graph.node_as::<Blend2Node>(setup.blend).expect("blend node");
        let nodes = blend.find_blend_nodes(&instance);
        assert_eq!(nodes.a, Some(setup.a));
        assert_eq!(nodes.b, None);
        assert_approx(elbow_angle(&pose), 0.0);
    }
}

#[test]
fn weights_propagate_to_sources() {
    let setup = blend_graph("bind", "bent", Blend2Node::new("Blend"), false);
    let (instance, _) = evaluate(&setup, 0.25, 1.0 / 60.0);

    let a = instance.node_data(setup.a).expect("A data");
    let b = instance.node_data(setup.b).expect("B data");
    assert_approx(a.local_weight, 0.75);
    assert_approx(a.global_weight, 0.75);
    assert_approx(b.local_weight, 0.25);
    assert_approx(b.global_weight, 0.25);
}

#[test]
fn mask_limits_blend_to_listed_bones() {
    let setup = blend_graph(
        "bind",
        "bent",
        Blend2Node::new("Blend").with_mask(["spine"]),
        false,
    );
    let (_, pose) = evaluate(&setup, 0.5, 1.0 / 60.0);

    assert_approx(elbow_angle(&pose), 0.0);
}

#[test]
fn unknown_mask_bone_is_skipped() {
    let setup = blend_graph(
        "bind",
        "bent",
        Blend2Node::new("Blend").with_mask(["elbow", "tail"]),
        false,
    );
    let (instance, pose) = evaluate(&setup, 0.5, 1.0 / 60.0);

    let data = instance
        .unique_data::<crate::Blend2NodeData>(setup.blend)
        .expect("blend data");
    assert_eq!(data.mask().to_vec(), vec![ELBOW]);
    assert_approx(elbow_angle(&pose), 22.5);
}

#[test]
fn additive_blend_adds_difference_to_bind() {
    let setup = blend_graph(
        "bent",
        "bent",
        Blend2Node::new("Blend").with_additive(true),
        false,
    );
    let (_, pose) = evaluate(&setup, 1.0, 1.0 / 60.0);

    assert_approx(elbow_angle(&pose), 90.0);
}

#[test]
fn additive_blend_with_zero_weight_keeps_both_sources() {
    let setup = blend_graph(
        "bent",
        "bent",
        Blend2Node::new("Blend").with_additive(true),
        false,
    );
    let (instance, pose) = evaluate(&setup, 0.0, 1.0 / 60.0);

    assert!(instance.is_update_ready(setup.a));
    assert!(instance.is_update_ready(setup.b));
    assert_approx(elbow_angle(&pose), 45.0);
}

#[test]
fn master_only_passes_events_of_pose_a() {
    let setup = blend_graph("walk", "bind", Blend2Node::new("Blend"), false);
    let (instance, _) = evaluate(&setup, 0.3, 0.3);

    let events = instance.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_type, "footstep");
    assert_eq!(events[0].state, EventState::Start);
    assert_eq!(events[0].emitter, Some(setup.a));
    assert_approx(events[0].global_weight, 0.7);
}

#[test]
fn slave_only_passes_events_of_pose_b() {
    let setup = blend_graph(
        "bind",
        "walk",
        Blend2Node::new("Blend").with_event_mode(EventMode::SlaveOnly),
        false,
    );
    let (instance, _) = evaluate(&setup, 0.3, 0.3);

    let events = instance.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].emitter, Some(setup.b));
}

#[test]
fn most_active_follows_the_heavier_source() {
    let setup = blend_graph(
        "bind",
        "walk",
        Blend2Node::new("Blend").with_event_mode(EventMode::MostActive),
        false,
    );

    let (instance, _) = evaluate(&setup, 0.3, 0.3);
    assert!(instance.events().is_empty());

    let (instance, _) = evaluate(&setup, 0.7, 0.3);
    assert_eq!(instance.events().len(), 1);
}

#[test]
fn both_nodes_merges_events() {
    let setup = blend_graph(
        "walk",
        "walk",
        Blend2Node::new("Blend").with_event_mode(EventMode::BothNodes),
        false,
    );
    let (instance, _) = evaluate(&setup, 0.5, 0.3);

    let emitters: Vec<_> = instance.events().iter().map(|e| e.emitter).collect();
    assert_eq!(emitters, vec![Some(setup.a), Some(setup.b)]);
}
