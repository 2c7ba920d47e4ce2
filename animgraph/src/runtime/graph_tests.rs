use crate::runtime::test_fixtures::{
    ELBOW, angle_degrees, assert_approx, motion_set, skeleton,
};
use crate::{
    AnimGraphBuilder, AnimGraphInstance, Blend2Node, BlendTreeNode, Error, FloatConstantNode,
    MotionNode, NodeIndex, ParameterDef, Pose, TransformNode,
};
use std::sync::Arc;

#[test]
fn builder_starts_with_root_and_final_node() {
    let builder = AnimGraphBuilder::new("empty");
    let root = builder.root();
    let final_node = builder.final_node(root).expect("final node");
    let graph = builder.build();

    assert_eq!(graph.num_nodes(), 2);
    assert_eq!(graph.root(), root);
    assert_eq!(graph.node(final_node).expect("final").type_name(), "BlendTreeFinalNode");
    assert_eq!(
        graph.node(final_node).expect("final").base().parent(),
        Some(root)
    );
    assert!(graph.node_as::<BlendTreeNode>(root).is_some());
}

#[test]
fn only_containers_accept_children() {
    let mut builder = AnimGraphBuilder::new("graph");
    let root = builder.root();
    let motion = builder
        .add_node(root, MotionNode::new("Motion", "walk"))
        .expect("motion");
    let err = builder
        .add_node(motion, FloatConstantNode::new("Child", 1.0))
        .expect_err("motion nodes cannot own children");
    assert!(matches!(err, Error::NotAContainer { ref node } if node == "Motion"));

    let err = builder
        .add_node(NodeIndex(99), FloatConstantNode::new("Orphan", 1.0))
        .expect_err("unknown parent");
    assert!(matches!(err, Error::InvalidNodeIndex { index: 99 }));
}

#[test]
fn connections_are_validated() {
    let mut builder = AnimGraphBuilder::new("graph");
    let root = builder.root();
    let motion = builder
        .add_node(root, MotionNode::new("Motion", "walk"))
        .expect("motion");
    let blend = builder
        .add_node(root, Blend2Node::new("Blend"))
        .expect("blend");

    let err = builder
        .connect(motion, MotionNode::OUTPUT_POSE, blend, Blend2Node::INPUT_WEIGHT)
        .expect_err("pose into number port");
    assert!(matches!(err, Error::InvalidConnection { .. }));

    let err = builder
        .connect(motion, 7, blend, Blend2Node::INPUT_POSE_A)
        .expect_err("missing source port");
    assert!(matches!(err, Error::InvalidConnection { .. }));

    builder
        .connect(motion, MotionNode::OUTPUT_POSE, blend, Blend2Node::INPUT_POSE_A)
        .expect("valid connection");
    let err = builder
        .connect(motion, MotionNode::OUTPUT_POSE, blend, Blend2Node::INPUT_POSE_A)
        .expect_err("port already used");
    assert!(matches!(err, Error::PortAlreadyConnected { port: 0, .. }));
}

#[test]
fn cycles_are_rejected() {
    let mut builder = AnimGraphBuilder::new("graph");
    let root = builder.root();
    let first = builder
        .add_node(root, TransformNode::new("First", "spine"))
        .expect("first");
    let second = builder
        .add_node(root, TransformNode::new("Second", "spine"))
        .expect("second");

    builder
        .connect(first, TransformNode::OUTPUT_POSE, second, TransformNode::INPUT_POSE)
        .expect("first into second");
    let err = builder
        .connect(second, TransformNode::OUTPUT_POSE, first, TransformNode::INPUT_POSE)
        .expect_err("second into first closes a loop");
    assert!(matches!(err, Error::CyclicConnection { .. }));

    let err = builder
        .connect(first, TransformNode::OUTPUT_POSE, first, TransformNode::INPUT_POSE)
        .expect_err("self loop");
    assert!(matches!(err, Error::CyclicConnection { .. }));
}

#[test]
fn connections_stay_inside_one_blend_tree() {
    let mut builder = AnimGraphBuilder::new("graph");
    let root = builder.root();
    let inner = builder.add_blend_tree(root, "Inner").expect("inner tree");
    let outer_motion = builder
        .add_node(root, MotionNode::new("Outer", "walk"))
        .expect("outer");
    let inner_blend = builder
        .add_node(inner, Blend2Node::new("Blend"))
        .expect("inner blend");

    let err = builder
        .connect(outer_motion, MotionNode::OUTPUT_POSE, inner_blend, Blend2Node::INPUT_POSE_A)
        .expect_err("cross-tree connection");
    assert!(matches!(err, Error::InvalidConnection { .. }));
}

#[test]
fn duplicate_parameters_are_rejected() {
    let mut builder = AnimGraphBuilder::new("graph");
    assert_eq!(builder.add_parameter(ParameterDef::float("speed", 0.0)).expect("speed"), 0);
    let err = builder
        .add_parameter(ParameterDef::int("speed", 1))
        .expect_err("duplicate");
    assert!(matches!(err, Error::DuplicateParameter { ref name } if name == "speed"));
}

#[test]
fn lookups_by_name_and_id() {
    let mut builder = AnimGraphBuilder::new("graph");
    let root = builder.root();
    let motion = builder
        .add_node(root, MotionNode::new("Motion", "walk"))
        .expect("motion");
    assert_eq!(builder.find_node("Motion"), Some(motion));
    let graph = builder.build();

    let id = graph.node(motion).expect("motion").base().id();
    assert_eq!(graph.find_node_by_id(id), Some(motion));
    assert_eq!(graph.find_node_by_name("Motion"), Some(motion));
    assert_eq!(graph.find_node_by_name("Missing"), None);
    assert_ne!(graph.node(root).expect("root").base().id(), id);
}

#[test]
fn collected_objects_list_parents_before_children() {
    let mut builder = AnimGraphBuilder::new("graph");
    let root = builder.root();
    let inner = builder.add_blend_tree(root, "Inner").expect("inner");
    let leaf = builder
        .add_node(inner, MotionNode::new("Leaf", "walk"))
        .expect("leaf");
    let graph = builder.build();

    let objects = graph.recursive_collect_objects();
    assert_eq!(objects.len(), graph.num_nodes());
    assert_eq!(objects[0], root);
    let inner_pos = objects.iter().position(|&n| n == inner).expect("inner");
    let leaf_pos = objects.iter().position(|&n| n == leaf).expect("leaf");
    assert!(inner_pos < leaf_pos);
}

#[test]
fn nested_blend_tree_forwards_its_final_pose() {
    let mut builder = AnimGraphBuilder::new("nested");
    let root = builder.root();
    let inner = builder.add_blend_tree(root, "Inner").expect("inner");
    let motion = builder
        .add_node(inner, MotionNode::new("Bent", "bent"))
        .expect("motion");
    builder.connect_to_final(inner, motion).expect("inner final");
    builder.connect_to_final(root, inner).expect("root final");
    let graph = builder.build();

    let skeleton = skeleton();
    let mut instance =
        AnimGraphInstance::new(Arc::clone(&graph), Arc::clone(&skeleton), Some(motion_set()));
    let mut pose = Pose::bind(&skeleton, 0);
    instance.evaluate(0.1, &mut pose);

    assert_approx(
        angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation),
        45.0,
    );
    assert_approx(instance.node_data(inner).expect("inner").duration, 1.0);
    assert_eq!(instance.num_used_poses(), 0);
    assert_eq!(instance.num_used_ref_datas(), 0);

    let active = instance.recursive_collect_active_nodes();
    assert!(active.contains(&root));
    assert!(active.contains(&inner));
    assert!(active.contains(&motion));
}
