use crate::runtime::test_fixtures::{ROOT, assert_approx, motion_set, skeleton};
use crate::{
    AnimGraph, AnimGraphBuilder, AnimGraphInstance, MotionFrameNode, MotionFrameNodeData,
    MotionNode, MotionNodeData, NodeIndex, ParameterDef, ParameterNode, Pose, Transform,
};
use std::sync::Arc;

struct FrameSetup {
    graph: Arc<AnimGraph>,
    motion: NodeIndex,
    frame: NodeIndex,
}

fn frame_graph(frame: MotionFrameNode, connect_time: bool, connect_motion: bool) -> FrameSetup {
    let mut builder = AnimGraphBuilder::new("frame");
    builder
        .add_parameter(ParameterDef::float("time", 0.0))
        .expect("parameter");
    let root = builder.root();
    let motion = builder
        .add_node(root, MotionNode::new("Walk", "walk"))
        .expect("motion");
    let frame = builder.add_node(root, frame).expect("frame");
    if connect_motion {
        builder
            .connect(motion, MotionNode::OUTPUT_MOTION, frame, MotionFrameNode::INPUT_MOTION)
            .expect("connect motion");
    }
    if connect_time {
        let time = builder
            .add_node(root, ParameterNode::new("Time", "time"))
            .expect("time");
        builder
            .connect(time, ParameterNode::OUTPUT_VALUE, frame, MotionFrameNode::INPUT_TIME)
            .expect("connect time");
    }
    builder.connect_to_final(root, frame).expect("final");
    FrameSetup {
        graph: builder.build(),
        motion,
        frame,
    }
}

fn instance_for(setup: &FrameSetup) -> AnimGraphInstance {
    AnimGraphInstance::new(Arc::clone(&setup.graph), skeleton(), Some(motion_set()))
}

fn motion_time(instance: &AnimGraphInstance, node: NodeIndex) -> f32 {
    instance
        .unique_data::<MotionNodeData>(node)
        .and_then(|d| d.motion_instance())
        .expect("motion instance")
        .current_time()
}

fn root_x(pose: &Pose) -> f32 {
    pose.local_transform(ROOT).expect("root").position.x
}

#[test]
fn sampling_leaves_motion_playback_untouched() {
    let setup = frame_graph(MotionFrameNode::new("Frame"), true, true);
    let mut instance = instance_for(&setup);
    let mut pose = Pose::bind(instance.skeleton(), 0);

    instance.set_float_parameter("time", 0.5).expect("time");
    instance.evaluate(0.1, &mut pose);
    assert_approx(root_x(&pose), 1.0);
    assert_approx(motion_time(&instance, setup.motion), 0.1);

    instance.set_float_parameter("time", 0.8).expect("time");
    instance.evaluate(0.1, &mut pose);
    assert_approx(root_x(&pose), 1.6);
    assert_approx(motion_time(&instance, setup.motion), 0.2);

    instance.set_float_parameter("time", 0.05).expect("time");
    instance.evaluate(0.1, &mut pose);
    assert_approx(root_x(&pose), 0.1);
    assert_approx(motion_time(&instance, setup.motion), 0.3);
}

#[test]
fn time_input_is_clamped_to_unit_range() {
    let setup = frame_graph(MotionFrameNode::new("Frame"), true, true);
    let mut instance = instance_for(&setup);
    let mut pose = Pose::bind(instance.skeleton(), 0);

    instance.set_float_parameter("time", 1.5).expect("time");
    instance.evaluate(0.1, &mut pose);
    assert_approx(root_x(&pose), 2.0);

    instance.set_float_parameter("time", -1.0).expect("time");
    instance.evaluate(0.1, &mut pose);
    assert_approx(root_x(&pose), 0.0);
}

#[test]
fn unconnected_time_uses_configured_normalized_time() {
    let setup = frame_graph(
        MotionFrameNode::new("Frame").with_normalized_time(0.25),
        false,
        true,
    );
    let mut instance = instance_for(&setup);
    let mut pose = Pose::bind(instance.skeleton(), 0);

    instance.evaluate(0.1, &mut pose);
    assert_approx(root_x(&pose), 0.5);
    let data = instance
        .unique_data::<MotionFrameNodeData>(setup.frame)
        .expect("frame data");
    assert_approx(data.new_time(), 0.25);
}

#[test]
fn events_between_sampled_times_are_emitted_by_the_frame_node() {
    let setup = frame_graph(MotionFrameNode::new("Frame"), true, true);
    let mut instance = instance_for(&setup);
    let mut pose = Pose::bind(instance.skeleton(), 0);

    instance.set_float_parameter("time", 0.1).expect("time");
    instance.evaluate(0.01, &mut pose);
    assert!(instance.events().is_empty());

    instance.set_float_parameter("time", 0.3).expect("time");
    instance.evaluate(0.01, &mut pose);
    let events = instance.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_type, "footstep");
    assert_eq!(events[0].emitter, Some(setup.frame));

    // Same time again: nothing new to report.
    instance.evaluate(0.01, &mut pose);
    assert!(instance.events().is_empty());
}

#[test]
fn missing_motion_input_flags_error_and_outputs_bind() {
    let setup = frame_graph(MotionFrameNode::new("Frame"), true, false);
    let mut instance = instance_for(&setup);
    let mut pose = Pose::bind(instance.skeleton(), 0);

    instance.set_float_parameter("time", 0.5).expect("time");
    instance.evaluate(0.1, &mut pose);
    assert_approx(root_x(&pose), 0.0);
    assert!(instance.node_data(setup.frame).expect("data").has_error);
    assert_eq!(instance.num_used_poses(), 0);
}

#[test]
fn disabled_frame_node_outputs_bind_pose() {
    for name in ["walk", "swim"] {
        let mut builder = AnimGraphBuilder::new("frame");
        builder
            .add_parameter(ParameterDef::float("time", 0.1))
            .expect("parameter");
        let root = builder.root();
        let motion = builder
            .add_node(root, MotionNode::new("Source", name).with_motion_extraction(true, ROOT))
            .expect("motion");
        let frame = builder
            .add_node(root, MotionFrameNode::new("Frame"))
            .expect("frame");
        let time = builder
            .add_node(root, ParameterNode::new("Time", "time"))
            .expect("time");
        builder
            .connect(motion, MotionNode::OUTPUT_MOTION, frame, MotionFrameNode::INPUT_MOTION)
            .expect("connect motion");
        builder
            .connect(time, ParameterNode::OUTPUT_VALUE, frame, MotionFrameNode::INPUT_TIME)
            .expect("connect time");
        builder.connect_to_final(root, frame).expect("final");
        builder.set_disabled(frame, true).expect("disable");
        let mut instance = AnimGraphInstance::new(builder.build(), skeleton(), Some(motion_set()));
        let mut pose = Pose::bind(instance.skeleton(), 0);

        instance.evaluate(0.1, &mut pose);
        instance.set_float_parameter("time", 0.6).expect("time");
        instance.evaluate(0.1, &mut pose);

        assert_approx(root_x(&pose), 0.0);
        assert!(instance.events().is_empty());
        assert!(instance.trajectory_delta().is_close(&Transform::IDENTITY, 1.0e-6));
        assert_eq!(instance.num_used_poses(), 0);
    }
}
