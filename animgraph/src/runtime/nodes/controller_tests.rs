use crate::runtime::test_fixtures::{
    ELBOW, SPINE, angle_degrees, assert_approx, motion_set, skeleton,
};
use crate::{
    AccumTransformNode, AccumTransformNodeData, AnimGraph, AnimGraphBuilder, AnimGraphInstance,
    AnimGraphNode, Axis, FloatConstantNode, MorphTargetNode, MorphTargetNodeData, MotionNode,
    NodeIndex, Pose, TransformNode,
};
use glam::Vec3;
use std::sync::Arc;

/// Bent-elbow motion feeding `controller` on port 0, with constants on the given number ports.
fn controller_graph<N: AnimGraphNode + 'static>(
    controller: N,
    constants: &[(usize, f32)],
    disabled: bool,
) -> (Arc<AnimGraph>, NodeIndex) {
    let mut builder = AnimGraphBuilder::new("controller");
    let root = builder.root();
    let motion = builder
        .add_node(root, MotionNode::new("Bent", "bent"))
        .expect("motion");
    let controller = builder.add_node(root, controller).expect("controller");
    builder
        .connect(motion, MotionNode::OUTPUT_POSE, controller, 0)
        .expect("connect pose");
    for &(port, value) in constants {
        let constant = builder
            .add_node(root, FloatConstantNode::new(format!("Const{port}"), value))
            .expect("constant");
        builder
            .connect(constant, FloatConstantNode::OUTPUT_VALUE, controller, port)
            .expect("connect constant");
    }
    builder.connect_to_final(root, controller).expect("final");
    builder.set_disabled(controller, disabled).expect("disable");
    (builder.build(), controller)
}

fn new_instance(graph: &Arc<AnimGraph>) -> (AnimGraphInstance, Pose) {
    let instance = AnimGraphInstance::new(Arc::clone(graph), skeleton(), Some(motion_set()));
    let pose = Pose::bind(instance.skeleton(), 0);
    (instance, pose)
}

fn spine(pose: &Pose) -> crate::Transform {
    *pose.local_transform(SPINE).expect("spine")
}

fn elbow_angle(pose: &Pose) -> f32 {
    angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation)
}

#[test]
fn transform_node_interpolates_between_ranges() {
    let node = TransformNode::new("Transform", "spine")
        .with_translation_range(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0))
        .with_rotation_range(Vec3::ZERO, Vec3::new(0.0, 0.0, 90.0))
        .with_scale_range(Vec3::ONE, Vec3::splat(3.0));
    let (graph, _) = controller_graph(
        node,
        &[
            (TransformNode::INPUT_TRANSLATE_AMOUNT, 0.5),
            (TransformNode::INPUT_ROTATE_AMOUNT, 0.5),
            (TransformNode::INPUT_SCALE_AMOUNT, 0.5),
        ],
        false,
    );
    let (mut instance, mut pose) = new_instance(&graph);
    instance.evaluate(1.0 / 60.0, &mut pose);

    let spine = spine(&pose);
    assert_approx(spine.position.y, 1.0);
    assert_approx(angle_degrees(spine.rotation), 45.0);
    assert_approx(spine.scale.x, 2.0);
    assert_approx(elbow_angle(&pose), 45.0);
}

#[test]
fn transform_node_amounts_are_clamped() {
    let node = TransformNode::new("Transform", "spine")
        .with_translation_range(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0));
    let (graph, _) = controller_graph(node, &[(TransformNode::INPUT_TRANSLATE_AMOUNT, 4.0)], false);
    let (mut instance, mut pose) = new_instance(&graph);
    instance.evaluate(1.0 / 60.0, &mut pose);

    assert_approx(spine(&pose).position.y, 2.0);
}

#[test]
fn transform_node_with_unknown_bone_outputs_bind_pose() {
    let node = TransformNode::new("Transform", "tail")
        .with_translation_range(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0));
    let (graph, controller) =
        controller_graph(node, &[(TransformNode::INPUT_TRANSLATE_AMOUNT, 1.0)], false);
    let (mut instance, mut pose) = new_instance(&graph);
    instance.evaluate(1.0 / 60.0, &mut pose);

    assert!(instance.node_data(controller).expect("data").has_error);
    assert_approx(spine(&pose).position.y, 1.0);
    assert_approx(elbow_angle(&pose), 0.0);
}

#[test]
fn accum_transform_with_unknown_bone_outputs_bind_pose() {
    let node = AccumTransformNode::new("Accum", "tail").with_translation(Axis::X, 2.0);
    let (graph, controller) =
        controller_graph(node, &[(AccumTransformNode::INPUT_TRANSLATE_SPEED, 1.0)], false);
    let (mut instance, mut pose) = new_instance(&graph);
    instance.evaluate(0.5, &mut pose);

    assert!(instance.node_data(controller).expect("data").has_error);
    assert_approx(spine(&pose).position.x, 0.0);
    assert_approx(elbow_angle(&pose), 0.0);
}

#[test]
fn disabled_transform_node_outputs_bind_pose() {
    let node = TransformNode::new("Transform", "spine")
        .with_translation_range(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0));
    let (graph, _) = controller_graph(node, &[(TransformNode::INPUT_TRANSLATE_AMOUNT, 1.0)], true);
    let (mut instance, mut pose) = new_instance(&graph);
    instance.evaluate(1.0 / 60.0, &mut pose);

    assert_approx(spine(&pose).position.y, 1.0);
    assert_approx(elbow_angle(&pose), 0.0);
    assert!(instance.events().is_empty());
    assert!(instance.trajectory_delta().is_close(&crate::Transform::IDENTITY, 1.0e-6));
}

#[test]
fn accum_transform_integrates_translation_over_ticks() {
    let node = AccumTransformNode::new("Accum", "spine").with_translation(Axis::X, 2.0);
    let (graph, controller) =
        controller_graph(node, &[(AccumTransformNode::INPUT_TRANSLATE_SPEED, 1.0)], false);
    let (mut instance, mut pose) = new_instance(&graph);

    instance.evaluate(0.5, &mut pose);
    assert_approx(spine(&pose).position.x, 1.0);
    assert_approx(spine(&pose).position.y, 1.0);

    instance.evaluate(0.5, &mut pose);
    assert_approx(spine(&pose).position.x, 2.0);
    assert_approx(spine(&pose).scale.x, 1.0);

    let data = instance
        .unique_data::<AccumTransformNodeData>(controller)
        .expect("accum data");
    assert_approx(data.additive().position.x, 2.0);
}

#[test]
fn accum_transform_spins_in_turns_per_second() {
    let node = AccumTransformNode::new("Accum", "spine").with_rotation(Axis::Z, 0.25);
    let (graph, _) =
        controller_graph(node, &[(AccumTransformNode::INPUT_ROTATE_SPEED, 1.0)], false);
    let (mut instance, mut pose) = new_instance(&graph);

    instance.evaluate(0.5, &mut pose);
    assert_approx(angle_degrees(spine(&pose).rotation), 45.0);
}

#[test]
fn morph_target_sets_weight_on_input_pose() {
    let (graph, _) = controller_graph(
        MorphTargetNode::new("Morph", "blink"),
        &[(MorphTargetNode::INPUT_WEIGHT, 0.7)],
        false,
    );
    let (mut instance, mut pose) = new_instance(&graph);
    instance.evaluate(1.0 / 60.0, &mut pose);

    assert_eq!(pose.morph_weights().len(), 2);
    assert_approx(pose.morph_weight(1).expect("blink"), 0.7);
    assert_approx(pose.morph_weight(0).expect("smile"), 0.0);
    assert_approx(elbow_angle(&pose), 45.0);
}

#[test]
fn morph_target_resolves_again_only_when_lod_changes() {
    let (graph, controller) = controller_graph(
        MorphTargetNode::new("Morph", "blink"),
        &[(MorphTargetNode::INPUT_WEIGHT, 0.7)],
        false,
    );
    let (mut instance, mut pose) = new_instance(&graph);

    instance.evaluate(1.0 / 60.0, &mut pose);
    instance.evaluate(1.0 / 60.0, &mut pose);
    let data = instance
        .unique_data::<MorphTargetNodeData>(controller)
        .expect("morph data");
    assert_eq!(data.num_resolves(), 1);
    assert_eq!(data.morph_index(), Some(1));

    instance.set_lod_level(1);
    instance.evaluate(1.0 / 60.0, &mut pose);
    let data = instance
        .unique_data::<MorphTargetNodeData>(controller)
        .expect("morph data");
    assert_eq!(data.num_resolves(), 2);
    assert_eq!(data.lod_level(), Some(1));
    assert_eq!(data.morph_index(), Some(0));
    assert_eq!(pose.morph_weights().len(), 1);
    assert_approx(pose.morph_weight(0).expect("blink"), 0.7);
}

#[test]
fn unknown_morph_target_flags_error_and_outputs_bind_pose() {
    let (graph, controller) = controller_graph(
        MorphTargetNode::new("Morph", "frown"),
        &[(MorphTargetNode::INPUT_WEIGHT, 0.7)],
        false,
    );
    let (mut instance, mut pose) = new_instance(&graph);
    instance.evaluate(1.0 / 60.0, &mut pose);

    assert!(instance.node_data(controller).expect("data").has_error);
    assert_approx(elbow_angle(&pose), 0.0);
    assert!(pose.morph_weights().iter().all(|w| *w == 0.0));
}
