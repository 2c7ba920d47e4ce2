use crate::runtime::test_fixtures::{
    ELBOW, ROOT, angle_degrees, assert_approx, init_tracing, motion_set, single_motion_graph,
    skeleton,
};
use crate::{
    AnimGraphBuilder, AnimGraphEventHandler, AnimGraphInstance, AnimGraphInstanceId, ByteReader,
    ByteWriter, Error, EventInfo, MotionNode, MotionNodeData, NodeIndex, ParameterDef,
    ParameterValue, Pose, Transform,
};
use glam::Vec3;
use parking_lot::Mutex;
use std::sync::Arc;

fn motion_instance(node: MotionNode) -> (AnimGraphInstance, NodeIndex) {
    let graph = single_motion_graph(node);
    let motion = graph.find_node_by_name("Motion").expect("motion node");
    (AnimGraphInstance::new(graph, skeleton(), Some(motion_set())), motion)
}

fn motion_time(instance: &AnimGraphInstance, node: NodeIndex) -> f32 {
    instance
        .unique_data::<MotionNodeData>(node)
        .and_then(|d| d.motion_instance())
        .expect("motion instance")
        .current_time()
}

#[test]
fn parameters_start_at_defaults_and_keep_their_type() {
    let mut builder = AnimGraphBuilder::new("params");
    builder.add_parameter(ParameterDef::float("speed", 0.5)).expect("speed");
    builder.add_parameter(ParameterDef::int("mode", 2)).expect("mode");
    builder.add_parameter(ParameterDef::bool("armed", true)).expect("armed");
    builder
        .add_parameter(ParameterDef::new("aim", ParameterValue::Vector3(Vec3::X)))
        .expect("aim");
    let mut instance = AnimGraphInstance::new(builder.build(), skeleton(), None);

    assert_eq!(instance.num_parameters(), 4);
    assert_approx(instance.float_parameter_value("speed").expect("speed"), 0.5);
    assert_approx(instance.float_parameter_value("mode").expect("mode as number"), 2.0);
    assert_approx(instance.float_parameter_value("armed").expect("armed as number"), 1.0);
    assert_eq!(instance.float_parameter_value("aim"), None);
    assert_eq!(instance.int_parameter_value("mode"), Some(2));
    assert_eq!(instance.bool_parameter_value("armed"), Some(true));

    instance.set_int_parameter("mode", 5).expect("set mode");
    assert_eq!(instance.int_parameter_value("mode"), Some(5));
    instance
        .set_parameter_value("aim", ParameterValue::Vector3(Vec3::Y))
        .expect("set aim");
    assert_eq!(instance.vector3_parameter_value("aim"), Some(Vec3::Y));

    let err = instance
        .set_float_parameter("mode", 1.0)
        .expect_err("float into int");
    assert!(matches!(
        err,
        Error::ParameterTypeMismatch {
            expected: "int",
            actual: "float",
            ..
        }
    ));
    assert_eq!(instance.int_parameter_value("mode"), Some(5));

    let err = instance
        .set_float_parameter("missing", 1.0)
        .expect_err("unknown name");
    assert!(matches!(err, Error::UnknownParameter { ref name } if name == "missing"));
    assert!(
        instance
            .set_parameter_value_by_index(9, ParameterValue::Float(0.0))
            .is_err()
    );
}

#[test]
fn pools_are_balanced_after_every_tick() {
    let (mut instance, _) = motion_instance(MotionNode::new("Motion", "walk"));
    let mut pose = Pose::bind(instance.skeleton(), 0);
    for _ in 0..5 {
        instance.evaluate(0.1, &mut pose);
        assert_eq!(instance.num_used_poses(), 0);
        assert_eq!(instance.num_used_ref_datas(), 0);
    }
}

#[test]
fn phases_can_be_driven_one_by_one() {
    let (mut stepped, motion) = motion_instance(MotionNode::new("Motion", "bent"));
    let mut pose = Pose::bind(stepped.skeleton(), 0);
    stepped.reset_flags_for_all_objects();
    stepped.top_down_update(0.2);
    stepped.update(0.2);
    assert!(stepped.is_update_ready(motion));
    assert!(!stepped.is_output_ready(motion));
    stepped.output(&mut pose);
    stepped.post_update(0.2);

    assert!(stepped.is_output_ready(motion));
    assert_approx(angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation), 45.0);
    assert_approx(motion_time(&stepped, motion), 0.2);
    assert_eq!(stepped.num_used_poses(), 0);
}

#[derive(Clone, Default)]
struct Collector(Arc<Mutex<Vec<String>>>);

impl AnimGraphEventHandler for Collector {
    fn on_event(&mut self, _instance: AnimGraphInstanceId, event: &EventInfo) {
        self.0.lock().push(event.event.event_type.clone());
    }
}

#[test]
fn root_events_reach_handlers() {
    let (mut instance, motion) = motion_instance(MotionNode::new("Motion", "walk"));
    let collector = Collector::default();
    instance.add_event_handler(collector.clone());
    let mut pose = Pose::bind(instance.skeleton(), 0);

    instance.evaluate(0.3, &mut pose);

    assert_eq!(instance.events().len(), 1);
    assert_eq!(instance.events()[0].emitter, Some(motion));
    assert_eq!(*collector.0.lock(), vec!["footstep".to_string()]);

    instance.evaluate(0.05, &mut pose);
    assert!(instance.events().is_empty());
    assert_eq!(collector.0.lock().len(), 1);
}

#[test]
fn muted_motion_node_emits_no_events() {
    let (mut instance, _) =
        motion_instance(MotionNode::new("Motion", "walk").with_emit_events(false));
    let mut pose = Pose::bind(instance.skeleton(), 0);
    instance.evaluate(0.3, &mut pose);
    assert!(instance.events().is_empty());
}

#[test]
fn motion_extraction_moves_trajectory_and_pins_the_bone() {
    let (mut instance, _) = motion_instance(
        MotionNode::new("Motion", "walk").with_motion_extraction(true, ROOT),
    );
    let mut pose = Pose::bind(instance.skeleton(), 0);

    instance.evaluate(0.25, &mut pose);
    assert_approx(instance.trajectory_delta().position.x, 0.5);
    assert_approx(pose.local_transform(ROOT).expect("root").position.x, 0.0);

    instance.evaluate(0.25, &mut pose);
    assert_approx(instance.trajectory_delta().position.x, 0.5);
}

#[test]
fn without_extraction_the_root_bone_moves() {
    let (mut instance, _) = motion_instance(MotionNode::new("Motion", "walk"));
    let mut pose = Pose::bind(instance.skeleton(), 0);
    instance.evaluate(0.25, &mut pose);

    assert!(instance.trajectory_delta().is_close(&Transform::IDENTITY, 1.0e-6));
    assert_approx(pose.local_transform(ROOT).expect("root").position.x, 0.5);
    assert_approx(pose.morph_weight(0).expect("smile"), 0.25);
}

#[test]
fn missing_motion_flags_error_and_outputs_bind_pose() {
    init_tracing();
    let (mut instance, motion) = motion_instance(MotionNode::new("Motion", "swim"));
    assert!(instance.node_data(motion).expect("data").has_error);

    let mut pose = Pose::bind(instance.skeleton(), 0);
    pose.local_transform_mut(ELBOW).expect("elbow").rotation = glam::Quat::from_rotation_z(1.0);
    instance.evaluate(0.1, &mut pose);

    assert!(instance.node_data(motion).expect("data").has_error);
    assert_approx(angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation), 0.0);
    assert!(instance.events().is_empty());
    assert_eq!(instance.num_used_poses(), 0);
}

#[test]
fn disabled_motion_node_outputs_bind_pose() {
    for name in ["walk", "swim"] {
        let mut builder = AnimGraphBuilder::new("disabled");
        let root = builder.root();
        let motion = builder
            .add_node(
                root,
                MotionNode::new("Motion", name).with_motion_extraction(true, ROOT),
            )
            .expect("motion");
        builder.connect_to_final(root, motion).expect("final");
        builder.set_disabled(motion, true).expect("disable");
        let mut instance = AnimGraphInstance::new(builder.build(), skeleton(), Some(motion_set()));
        let mut pose = Pose::bind(instance.skeleton(), 0);
        pose.local_transform_mut(ELBOW).expect("elbow").rotation = glam::Quat::from_rotation_z(1.0);

        instance.evaluate(0.3, &mut pose);

        assert_approx(angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation), 0.0);
        assert_approx(pose.local_transform(ROOT).expect("root").position.x, 0.0);
        assert!(instance.events().is_empty());
        assert!(instance.trajectory_delta().is_close(&Transform::IDENTITY, 1.0e-6));
        assert_eq!(instance.num_used_poses(), 0);
    }
}

#[test]
fn swapping_the_motion_set_re_resolves_motions() {
    let (mut instance, motion) = motion_instance(MotionNode::new("Motion", "walk"));
    instance.set_motion_set(None);
    assert!(instance.node_data(motion).expect("data").has_error);

    instance.set_motion_set(Some(motion_set()));
    assert!(!instance.node_data(motion).expect("data").has_error);
    assert_approx(instance.node_data(motion).expect("data").duration, 1.0);
}

#[test]
fn lod_change_rebuilds_bind_pose() {
    let (mut instance, _) = motion_instance(MotionNode::new("Motion", "bind"));
    assert_eq!(instance.bind_pose().morph_weights().len(), 2);
    instance.set_lod_level(1);
    assert_eq!(instance.lod_level(), 1);
    assert_eq!(instance.bind_pose().morph_weights().len(), 1);

    let mut pose = Pose::bind(instance.skeleton(), 1);
    instance.evaluate(0.1, &mut pose);
    assert_eq!(pose.lod_level(), 1);
}

#[test]
fn node_state_survives_save_and_load() {
    let (mut source, motion) = motion_instance(MotionNode::new("Motion", "walk"));
    let mut pose = Pose::bind(source.skeleton(), 0);
    source.evaluate(0.3, &mut pose);

    let mut counter = ByteWriter::counting();
    source.save_node_state(motion, &mut counter).expect("count");
    let mut bytes = vec![0u8; counter.position()];
    let mut writer = ByteWriter::new(&mut bytes);
    source.save_node_state(motion, &mut writer).expect("save");
    assert_eq!(writer.position(), bytes.len());

    let (mut target, target_motion) = motion_instance(MotionNode::new("Motion", "walk"));
    let mut reader = ByteReader::new(&bytes);
    target
        .load_node_state(target_motion, &mut reader)
        .expect("load");
    assert_eq!(reader.remaining(), 0);

    assert_approx(motion_time(&target, target_motion), 0.3);
    assert_approx(target.node_data(target_motion).expect("data").current_time, 0.3);
    assert_approx(target.node_data(target_motion).expect("data").duration, 1.0);
}

#[test]
fn truncated_node_state_fails_to_load() {
    let (mut instance, motion) = motion_instance(MotionNode::new("Motion", "walk"));
    let bytes = [0u8; 6];
    let mut reader = ByteReader::new(&bytes);
    assert!(instance.load_node_state(motion, &mut reader).is_err());
    assert!(
        instance
            .load_node_state(NodeIndex(40), &mut ByteReader::new(&bytes))
            .is_err()
    );
}
