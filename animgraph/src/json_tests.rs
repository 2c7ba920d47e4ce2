use crate::runtime::test_fixtures::{ELBOW, angle_degrees, assert_approx, motion_set, skeleton};
use crate::{
    AnimGraph, AnimGraphInstance, Error, KeyframeMotion, Motion, ParameterValue, Pose,
    RecordSettings, SkeletonData, sync_event_id,
};
use glam::Vec3;

#[test]
fn skeleton_resolves_parents_by_name() {
    let skeleton = SkeletonData::from_json_str(
        r#"{
            "name": "rig",
            "bones": [
                { "name": "root" },
                { "name": "spine", "parent": "root", "position": [0, 1, 0] },
                { "name": "head", "parent": "spine", "scale": [2, 2, 2] }
            ],
            "morphs": [["smile", "blink"], ["blink"]]
        }"#,
    )
    .expect("skeleton");

    assert_eq!(skeleton.name, "rig");
    assert_eq!(skeleton.num_bones(), 3);
    assert_eq!(skeleton.bones[1].parent, Some(0));
    assert_eq!(skeleton.bones[2].parent, Some(1));
    assert_eq!(skeleton.bones[1].bind.position, Vec3::new(0.0, 1.0, 0.0));
    assert_eq!(skeleton.bones[2].bind.scale, Vec3::splat(2.0));
    assert_eq!(skeleton.num_lod_levels(), 2);
    assert_eq!(skeleton.find_morph_target(1, "blink"), Some(0));
    assert_eq!(skeleton.find_morph_target(1, "smile"), None);
}

#[test]
fn skeleton_rejects_forward_parent_references() {
    let err = SkeletonData::from_json_str(
        r#"{ "bones": [{ "name": "child", "parent": "later" }, { "name": "later" }] }"#,
    )
    .expect_err("parent declared after child");
    assert!(matches!(
        err,
        Error::UnknownBoneParent { ref bone, ref parent } if bone == "child" && parent == "later"
    ));
}

#[test]
fn motion_reads_tracks_events_and_sync_events() {
    let motion = KeyframeMotion::from_json_str(
        r#"{
            "name": "wave",
            "duration": 2.0,
            "bones": [{
                "bone": "elbow",
                "rotation": [{ "time": 0, "value": [0, 0, 0, 1] }],
                "position": [{ "time": 0, "value": [0, 0, 0] }, { "time": 2, "value": [4, 0, 0] }]
            }],
            "morphs": [{ "name": "smile", "keys": [{ "time": 0, "value": 0.5 }] }],
            "events": [
                { "start": 0.5, "type": "hit" },
                { "start": 1.0, "end": 1.5, "type": "glow", "parameters": "blue" }
            ],
            "syncEvents": [{ "time": 1.0, "name": "RightFoot" }, { "time": 0.0, "name": "LeftFoot" }]
        }"#,
    )
    .expect("motion");

    assert_eq!(motion.name(), "wave");
    assert_approx(motion.duration(), 2.0);
    assert_eq!(motion.bone_tracks.len(), 1);
    assert_eq!(motion.bone_tracks[0].position.num_keys(), 2);
    assert_eq!(motion.morph_tracks[0].weights.num_keys(), 1);

    let events = motion.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].is_tick_event());
    assert_eq!(events[1].event_type, "glow");
    assert_eq!(events[1].parameters, "blue");
    assert_approx(events[1].end_time, 1.5);

    let sync = motion.sync_track().expect("sync track");
    assert_eq!(sync.num_events(), 2);
    assert_eq!(sync.events()[0].id, sync_event_id("LeftFoot"));
    assert_approx(sync.duration(), 2.0);

    let skeleton = skeleton();
    let mut pose = Pose::bind(&skeleton, 0);
    motion.sample(1.0, &skeleton, &mut pose);
    assert_approx(pose.local_transform(0).expect("root").position.x, 0.0);
    assert_approx(pose.morph_weight(0).expect("smile"), 0.5);
}

#[test]
fn motion_rejects_invalid_duration() {
    let err = KeyframeMotion::from_json_str(r#"{ "name": "broken", "duration": -1.0 }"#)
        .expect_err("negative duration");
    assert!(matches!(err, Error::InvalidValue { .. }));
}

const BLEND_GRAPH: &str = r#"{
    "name": "blend",
    "parameters": [
        { "name": "weight", "type": "float", "value": 0.5 },
        { "name": "mode", "type": "int", "value": 3 }
    ],
    "nodes": [
        { "name": "Bind", "type": "motion", "motion": "bind" },
        { "name": "Bent", "type": "motion", "motion": "bent", "loop": false },
        { "name": "Weight", "type": "parameter", "parameter": "weight" },
        { "name": "Blend", "type": "blend2" },
        { "name": "Spare", "type": "floatConstant", "value": 2.0, "disabled": true, "color": 255 }
    ],
    "connections": [
        { "source": "Bind", "target": "Blend", "targetPort": 0 },
        { "source": "Bent", "target": "Blend", "targetPort": 1 },
        { "source": "Weight", "target": "Blend", "targetPort": 2 }
    ],
    "output": "Blend"
}"#;

#[test]
fn graph_from_json_evaluates() {
    let graph = AnimGraph::from_json_str(BLEND_GRAPH).expect("graph");
    assert_eq!(graph.name(), "blend");
    assert_eq!(graph.parameters().len(), 2);
    assert!(matches!(graph.parameters()[1].default, ParameterValue::Int(3)));

    let spare = graph.find_node_by_name("Spare").expect("spare");
    let spare = graph.node(spare).expect("spare node").base();
    assert!(spare.is_disabled());
    assert_eq!(spare.color(), 255);

    let skeleton = skeleton();
    let mut instance = AnimGraphInstance::new(graph, skeleton.clone(), Some(motion_set()));
    let mut pose = Pose::bind(&skeleton, 0);
    instance.evaluate(0.1, &mut pose);
    assert_approx(
        angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation),
        22.5,
    );

    instance.set_float_parameter("weight", 1.0).expect("weight");
    instance.evaluate(0.1, &mut pose);
    assert_approx(
        angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation),
        45.0,
    );
}

#[test]
fn nested_trees_declare_their_own_output() {
    let graph = AnimGraph::from_json_str(
        r#"{
            "name": "nested",
            "nodes": [
                { "name": "Inner", "type": "blendTree", "output": "Bent" },
                { "name": "Bent", "type": "motion", "motion": "bent", "parent": "Inner" }
            ],
            "output": "Inner"
        }"#,
    )
    .expect("graph");

    let inner = graph.find_node_by_name("Inner").expect("inner");
    let bent = graph.find_node_by_name("Bent").expect("bent");
    assert_eq!(graph.node(bent).expect("bent").base().parent(), Some(inner));

    let skeleton = skeleton();
    let mut instance = AnimGraphInstance::new(graph, skeleton.clone(), Some(motion_set()));
    let mut pose = Pose::bind(&skeleton, 0);
    instance.evaluate(0.1, &mut pose);
    assert_approx(
        angle_degrees(pose.local_transform(ELBOW).expect("elbow").rotation),
        45.0,
    );
}

#[test]
fn graph_errors_name_the_offending_node() {
    let err = AnimGraph::from_json_str(
        r#"{ "name": "g", "nodes": [{ "name": "Odd", "type": "teleport" }] }"#,
    )
    .expect_err("unknown type");
    assert!(matches!(
        err,
        Error::JsonUnknownNodeType { ref node, ref node_type } if node == "Odd" && node_type == "teleport"
    ));

    let err = AnimGraph::from_json_str(
        r#"{ "name": "g", "nodes": [{ "name": "Clip", "type": "motion" }] }"#,
    )
    .expect_err("motion without clip");
    assert!(matches!(err, Error::InvalidValue { .. }));

    let err = AnimGraph::from_json_str(
        r#"{
            "name": "g",
            "nodes": [{ "name": "Clip", "type": "motion", "motion": "walk" }],
            "connections": [{ "source": "Clip", "target": "Nowhere", "targetPort": 0 }]
        }"#,
    )
    .expect_err("unknown target");
    assert!(matches!(err, Error::UnknownNode { ref name } if name == "Nowhere"));

    let err = AnimGraph::from_json_str(
        r#"{ "name": "g", "nodes": [{ "name": "Spin", "type": "accumTransform", "bone": "spine", "rotateAxis": "all" }] }"#,
    )
    .expect_err("rotation needs a single axis");
    assert!(matches!(err, Error::InvalidValue { .. }));
}

#[test]
fn record_settings_keep_defaults_for_missing_fields() {
    let defaults = RecordSettings::default();
    let settings = RecordSettings::from_json_str(
        r#"{ "fps": 30, "recordScale": false, "nodeHistoryTypes": ["MotionNode"], "actorInstances": [4] }"#,
    )
    .expect("settings");

    assert_eq!(settings.fps, 30);
    assert!(!settings.record_scale);
    assert!(settings.node_history_types.contains("MotionNode"));
    assert_eq!(settings.actor_instances.len(), 1);
    assert_eq!(settings.actor_instances[0].0, 4);
    assert_eq!(settings.record_morphs, defaults.record_morphs);
    assert_eq!(
        settings.num_pre_alloc_transform_keys,
        defaults.num_pre_alloc_transform_keys
    );
    assert_eq!(settings.max_anim_graph_bytes, None);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = RecordSettings::from_json_str("{ fps: ").expect_err("malformed");
    assert!(matches!(err, Error::JsonParse { .. }));
    let err = AnimGraph::from_json_str("[]").expect_err("wrong shape");
    assert!(matches!(err, Error::JsonParse { .. }));
}
