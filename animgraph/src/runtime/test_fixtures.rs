use crate::{
    AnimGraph, AnimGraphBuilder, BoneData, BoneTrack, KeyframeMotion, MorphTrack, Motion,
    MotionEvent, MotionNode, MotionSet, SkeletonData, SyncEvent, SyncTrack, Transform,
    sync_event_id,
};
use glam::{Quat, Vec3};
use std::sync::Arc;

pub const ROOT: usize = 0;
pub const SPINE: usize = 1;
pub const ELBOW: usize = 2;

/// Routes log output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 0.001,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

/// Rotation angle of `q` in degrees.
pub fn angle_degrees(q: Quat) -> f32 {
    q.to_axis_angle().1.to_degrees()
}

pub fn elbow_rotation(degrees: f32) -> Quat {
    Quat::from_rotation_z(degrees.to_radians())
}

/// root -> spine -> elbow, with two morphs on LOD 0 and only "blink" on LOD 1.
pub fn skeleton() -> Arc<SkeletonData> {
    let bones = vec![
        BoneData::new("root", None, Transform::IDENTITY),
        BoneData::new("spine", Some(ROOT), Transform::from_position(Vec3::new(0.0, 1.0, 0.0))),
        BoneData::new("elbow", Some(SPINE), Transform::from_position(Vec3::new(0.0, 1.0, 0.0))),
    ];
    let skeleton = SkeletonData::new("rig", bones)
        .expect("skeleton")
        .with_morph_lod(["smile", "blink"])
        .with_morph_lod(["blink"]);
    Arc::new(skeleton)
}

/// Holds the elbow at `degrees` for the whole clip.
pub fn elbow_motion(name: &str, degrees: f32) -> KeyframeMotion {
    let mut track = BoneTrack::new("elbow");
    track.rotation.add_key(0.0, elbow_rotation(degrees));
    KeyframeMotion::new(name, 1.0).with_bone_track(track)
}

/// One-second walk: root moves 2 units along X, a footstep tick at 0.25, a ranged "swing" from
/// 0.4 to 0.6, smile ramps from 0 to 1. Sync events LeftFoot at 0.0 and RightFoot at 0.5.
pub fn walk_motion() -> KeyframeMotion {
    let mut root = BoneTrack::new("root");
    root.position.add_key(0.0, Vec3::ZERO);
    root.position.add_key(1.0, Vec3::new(2.0, 0.0, 0.0));
    let mut smile = MorphTrack {
        name: "smile".to_string(),
        ..MorphTrack::default()
    };
    smile.weights.add_key(0.0, 0.0);
    smile.weights.add_key(1.0, 1.0);

    KeyframeMotion::new("walk", 1.0)
        .with_bone_track(root)
        .with_morph_track(smile)
        .with_event(MotionEvent::tick(0.25, "footstep"))
        .with_event(MotionEvent::ranged(0.4, 0.6, "swing"))
        .with_sync_track(SyncTrack::new(
            1.0,
            vec![
                SyncEvent {
                    time: 0.0,
                    id: sync_event_id("LeftFoot"),
                },
                SyncEvent {
                    time: 0.5,
                    id: sync_event_id("RightFoot"),
                },
            ],
        ))
}

/// Half-second run with the same foot pattern as [`walk_motion`].
pub fn run_motion() -> KeyframeMotion {
    KeyframeMotion::new("run", 0.5).with_sync_track(SyncTrack::new(
        0.5,
        vec![
            SyncEvent {
                time: 0.0,
                id: sync_event_id("LeftFoot"),
            },
            SyncEvent {
                time: 0.25,
                id: sync_event_id("RightFoot"),
            },
        ],
    ))
}

/// "bind", "bent" (elbow at 45 degrees), "walk" and "run".
pub fn motion_set() -> Arc<MotionSet> {
    let motions: [Arc<dyn Motion>; 4] = [
        Arc::new(KeyframeMotion::new("bind", 1.0)),
        Arc::new(elbow_motion("bent", 45.0)),
        Arc::new(walk_motion()),
        Arc::new(run_motion()),
    ];
    let mut set = MotionSet::new();
    for motion in motions {
        set.add(motion);
    }
    Arc::new(set)
}

/// Root tree playing a single motion node.
pub fn single_motion_graph(node: MotionNode) -> Arc<AnimGraph> {
    let mut builder = AnimGraphBuilder::new("single");
    let root = builder.root();
    let motion = builder.add_node(root, node).expect("add motion");
    builder.connect_to_final(root, motion).expect("connect final");
    builder.build()
}
