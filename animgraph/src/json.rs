use crate::{
    AccumTransformNode, ActorInstanceId, AnimGraph, AnimGraphBuilder, Axis, Blend2Node, BlendNNode,
    BoneData, BoneTrack, Error, EventMode, FloatConstantNode, Key, KeyTrack, KeyframeMotion,
    MorphTargetNode, MorphTrack, MotionEvent, MotionFrameNode, MotionNode, NodeIndex,
    ParameterDef, ParameterNode, ParameterValue, PoseSwitchNode, RecordSettings, ScaleAxis,
    SkeletonData, SyncEvent, SyncMode, SyncTrack, Transform, TransformNode, sync_event_id,
};
use glam::{Quat, Vec2, Vec3, Vec4};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;

fn parse<T: DeserializeOwned>(input: &str) -> Result<T, Error> {
    serde_json::from_str(input).map_err(|e| Error::JsonParse {
        message: e.to_string(),
    })
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_root() -> String {
    "Root".to_string()
}

// Skeleton

#[derive(Debug, Deserialize)]
struct SkeletonDef {
    #[serde(default)]
    name: String,
    #[serde(default)]
    bones: Vec<BoneDef>,
    /// Morph target names, one list per LOD level.
    #[serde(default)]
    morphs: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct BoneDef {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    position: [f32; 3],
    #[serde(default = "default_rotation")]
    rotation: [f32; 4],
    #[serde(default = "default_scale")]
    scale: [f32; 3],
}

impl SkeletonData {
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        let def: SkeletonDef = parse(input)?;
        let mut bones: Vec<BoneData> = Vec::with_capacity(def.bones.len());
        for bone in def.bones {
            let parent = match &bone.parent {
                Some(parent) => Some(bones.iter().position(|b| &b.name == parent).ok_or_else(
                    || Error::UnknownBoneParent {
                        bone: bone.name.clone(),
                        parent: parent.clone(),
                    },
                )?),
                None => None,
            };
            let bind = Transform::new(
                Vec3::from_array(bone.position),
                Quat::from_array(bone.rotation).normalize(),
                Vec3::from_array(bone.scale),
            );
            bones.push(BoneData::new(bone.name, parent, bind));
        }

        let mut skeleton = SkeletonData::new(def.name, bones)?;
        for lod in def.morphs {
            skeleton = skeleton.with_morph_lod(lod);
        }
        Ok(Arc::new(skeleton))
    }
}

// Motion

#[derive(Debug, Deserialize)]
struct MotionDef {
    name: String,
    duration: f32,
    #[serde(default)]
    bones: Vec<BoneTrackDef>,
    #[serde(default)]
    morphs: Vec<MorphTrackDef>,
    #[serde(default)]
    events: Vec<MotionEventDef>,
    #[serde(default, rename = "syncEvents")]
    sync_events: Vec<SyncEventDef>,
}

#[derive(Debug, Deserialize)]
struct KeyDef<T> {
    time: f32,
    value: T,
}

#[derive(Debug, Deserialize)]
struct BoneTrackDef {
    bone: String,
    #[serde(default)]
    position: Vec<KeyDef<[f32; 3]>>,
    #[serde(default)]
    rotation: Vec<KeyDef<[f32; 4]>>,
    #[serde(default)]
    scale: Vec<KeyDef<[f32; 3]>>,
}

#[derive(Debug, Deserialize)]
struct MorphTrackDef {
    name: String,
    #[serde(default)]
    keys: Vec<KeyDef<f32>>,
}

#[derive(Debug, Deserialize)]
struct MotionEventDef {
    start: f32,
    #[serde(default)]
    end: Option<f32>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    parameters: String,
}

#[derive(Debug, Deserialize)]
struct SyncEventDef {
    time: f32,
    name: String,
}

fn key_track<D, T: crate::KeyValue>(keys: Vec<KeyDef<D>>, convert: impl Fn(D) -> T) -> KeyTrack<T> {
    KeyTrack::from_keys(
        keys.into_iter()
            .map(|k| Key {
                time: k.time,
                value: convert(k.value),
            })
            .collect(),
    )
}

impl KeyframeMotion {
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        let def: MotionDef = parse(input)?;
        if def.duration.is_nan() || def.duration < 0.0 {
            return Err(Error::InvalidValue {
                message: format!("motion '{}' has invalid duration {}", def.name, def.duration),
            });
        }

        let mut motion = KeyframeMotion::new(def.name, def.duration);
        for track in def.bones {
            let mut bone = BoneTrack::new(track.bone);
            bone.position = key_track(track.position, Vec3::from_array);
            bone.rotation = key_track(track.rotation, |q| Quat::from_array(q).normalize());
            bone.scale = key_track(track.scale, Vec3::from_array);
            motion = motion.with_bone_track(bone);
        }
        for track in def.morphs {
            motion = motion.with_morph_track(MorphTrack {
                name: track.name,
                weights: key_track(track.keys, |w| w),
            });
        }
        for event in def.events {
            let end = event.end.unwrap_or(event.start);
            let motion_event = if end == event.start {
                MotionEvent::tick(event.start, event.event_type)
            } else {
                MotionEvent::ranged(event.start, end, event.event_type)
            };
            motion = motion.with_event(motion_event.with_parameters(event.parameters));
        }
        if !def.sync_events.is_empty() {
            let events = def
                .sync_events
                .iter()
                .map(|e| SyncEvent {
                    time: e.time,
                    id: sync_event_id(&e.name),
                })
                .collect();
            let duration = motion.duration;
            motion = motion.with_sync_track(SyncTrack::new(duration, events));
        }
        Ok(Arc::new(motion))
    }
}

// Anim graph

#[derive(Debug, Deserialize)]
struct AnimGraphDef {
    name: String,
    #[serde(default)]
    parameters: Vec<ParameterJson>,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    connections: Vec<ConnectionDef>,
    /// Node feeding the final node of the root tree.
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParameterJson {
    name: String,
    #[serde(flatten)]
    value: ParameterValueDef,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ParameterValueDef {
    Float {
        #[serde(default)]
        value: f32,
    },
    Int {
        #[serde(default)]
        value: i32,
    },
    Bool {
        #[serde(default)]
        value: bool,
    },
    Vector2 {
        #[serde(default)]
        value: [f32; 2],
    },
    Vector3 {
        #[serde(default)]
        value: [f32; 3],
    },
    Vector4 {
        #[serde(default)]
        value: [f32; 4],
    },
    Rotation {
        #[serde(default = "default_rotation")]
        value: [f32; 4],
    },
}

impl From<ParameterValueDef> for ParameterValue {
    fn from(def: ParameterValueDef) -> Self {
        match def {
            ParameterValueDef::Float { value } => ParameterValue::Float(value),
            ParameterValueDef::Int { value } => ParameterValue::Int(value),
            ParameterValueDef::Bool { value } => ParameterValue::Bool(value),
            ParameterValueDef::Vector2 { value } => {
                ParameterValue::Vector2(Vec2::from_array(value))
            }
            ParameterValueDef::Vector3 { value } => {
                ParameterValue::Vector3(Vec3::from_array(value))
            }
            ParameterValueDef::Vector4 { value } => {
                ParameterValue::Vector4(Vec4::from_array(value))
            }
            ParameterValueDef::Rotation { value } => {
                ParameterValue::Rotation(Quat::from_array(value).normalize())
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
enum SyncModeDef {
    #[default]
    Disabled,
    TrackBased,
    ClipBased,
}

impl From<SyncModeDef> for SyncMode {
    fn from(def: SyncModeDef) -> Self {
        match def {
            SyncModeDef::Disabled => SyncMode::Disabled,
            SyncModeDef::TrackBased => SyncMode::TrackBased,
            SyncModeDef::ClipBased => SyncMode::ClipBased,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
enum EventModeDef {
    #[default]
    MasterOnly,
    SlaveOnly,
    BothNodes,
    MostActive,
}

impl From<EventModeDef> for EventMode {
    fn from(def: EventModeDef) -> Self {
        match def {
            EventModeDef::MasterOnly => EventMode::MasterOnly,
            EventModeDef::SlaveOnly => EventMode::SlaveOnly,
            EventModeDef::BothNodes => EventMode::BothNodes,
            EventModeDef::MostActive => EventMode::MostActive,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
enum AxisDef {
    X,
    Y,
    Z,
    All,
}

impl AxisDef {
    fn axis(self, node: &str) -> Result<Axis, Error> {
        match self {
            AxisDef::X => Ok(Axis::X),
            AxisDef::Y => Ok(Axis::Y),
            AxisDef::Z => Ok(Axis::Z),
            AxisDef::All => Err(Error::InvalidValue {
                message: format!("node '{node}' only supports the x, y or z axis"),
            }),
        }
    }

    fn scale_axis(self) -> ScaleAxis {
        match self {
            AxisDef::X => ScaleAxis::X,
            AxisDef::Y => ScaleAxis::Y,
            AxisDef::Z => ScaleAxis::Z,
            AxisDef::All => ScaleAxis::All,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDef {
    name: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default = "default_root")]
    parent: String,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    color: Option<u32>,

    // Motion
    #[serde(default)]
    motion: Option<String>,
    #[serde(default = "default_true", rename = "loop")]
    looping: bool,
    #[serde(default = "default_true")]
    emit_events: bool,
    #[serde(default)]
    motion_extraction: bool,
    #[serde(default)]
    extraction_bone: usize,
    #[serde(default = "default_one")]
    play_speed: f32,

    // Blending
    #[serde(default)]
    sync_mode: SyncModeDef,
    #[serde(default)]
    event_mode: EventModeDef,
    #[serde(default)]
    mask: Vec<String>,
    #[serde(default)]
    additive: bool,

    // Sources and controllers
    #[serde(default)]
    parameter: Option<String>,
    #[serde(default)]
    value: f32,
    #[serde(default)]
    normalized_time: f32,
    #[serde(default)]
    bone: Option<String>,
    #[serde(default)]
    morph: Option<String>,
    #[serde(default)]
    translate_min: [f32; 3],
    #[serde(default)]
    translate_max: [f32; 3],
    #[serde(default)]
    rotate_min: [f32; 3],
    #[serde(default)]
    rotate_max: [f32; 3],
    #[serde(default = "default_scale")]
    scale_min: [f32; 3],
    #[serde(default = "default_scale")]
    scale_max: [f32; 3],
    #[serde(default)]
    translate_axis: Option<AxisDef>,
    #[serde(default)]
    translate_speed: f32,
    #[serde(default)]
    rotate_axis: Option<AxisDef>,
    #[serde(default)]
    rotate_speed: f32,
    #[serde(default)]
    scale_axis: Option<AxisDef>,
    #[serde(default)]
    scale_speed: f32,

    /// Blend trees only: node feeding the tree's final node.
    #[serde(default)]
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionDef {
    source: String,
    #[serde(default)]
    source_port: usize,
    target: String,
    target_port: usize,
}

fn required<'a>(node: &NodeDef, field: &'a Option<String>, what: &str) -> Result<&'a str, Error> {
    field.as_deref().ok_or_else(|| Error::InvalidValue {
        message: format!("node '{}' of type '{}' needs a {what}", node.name, node.node_type),
    })
}

fn find(builder: &AnimGraphBuilder, name: &str) -> Result<NodeIndex, Error> {
    builder.find_node(name).ok_or_else(|| Error::UnknownNode {
        name: name.to_string(),
    })
}

fn add_node(builder: &mut AnimGraphBuilder, def: &NodeDef) -> Result<NodeIndex, Error> {
    let parent = find(builder, &def.parent)?;
    let name = def.name.as_str();
    let index = match def.node_type.as_str() {
        "blendTree" => builder.add_blend_tree(parent, name)?,
        "motion" => {
            let motion = required(def, &def.motion, "motion")?;
            let node = MotionNode::new(name, motion)
                .with_looping(def.looping)
                .with_emit_events(def.emit_events)
                .with_motion_extraction(def.motion_extraction, def.extraction_bone)
                .with_play_speed(def.play_speed);
            builder.add_node(parent, node)?
        }
        "blend2" => {
            let node = Blend2Node::new(name)
                .with_sync_mode(def.sync_mode.into())
                .with_event_mode(def.event_mode.into())
                .with_mask(def.mask.iter().cloned())
                .with_additive(def.additive);
            builder.add_node(parent, node)?
        }
        "blendN" => {
            let node = BlendNNode::new(name)
                .with_sync_mode(def.sync_mode.into())
                .with_event_mode(def.event_mode.into());
            builder.add_node(parent, node)?
        }
        "poseSwitch" => builder.add_node(parent, PoseSwitchNode::new(name))?,
        "motionFrame" => builder.add_node(
            parent,
            MotionFrameNode::new(name).with_normalized_time(def.normalized_time),
        )?,
        "parameter" => {
            let parameter = required(def, &def.parameter, "parameter")?;
            builder.add_node(parent, ParameterNode::new(name, parameter))?
        }
        "floatConstant" => builder.add_node(parent, FloatConstantNode::new(name, def.value))?,
        "transform" => {
            let bone = required(def, &def.bone, "bone")?;
            let node = TransformNode::new(name, bone)
                .with_translation_range(
                    Vec3::from_array(def.translate_min),
                    Vec3::from_array(def.translate_max),
                )
                .with_rotation_range(
                    Vec3::from_array(def.rotate_min),
                    Vec3::from_array(def.rotate_max),
                )
                .with_scale_range(Vec3::from_array(def.scale_min), Vec3::from_array(def.scale_max));
            builder.add_node(parent, node)?
        }
        "accumTransform" => {
            let bone = required(def, &def.bone, "bone")?;
            let mut node = AccumTransformNode::new(name, bone);
            if let Some(axis) = def.translate_axis {
                node = node.with_translation(axis.axis(name)?, def.translate_speed);
            }
            if let Some(axis) = def.rotate_axis {
                node = node.with_rotation(axis.axis(name)?, def.rotate_speed);
            }
            if let Some(axis) = def.scale_axis {
                node = node.with_scale(axis.scale_axis(), def.scale_speed);
            }
            builder.add_node(parent, node)?
        }
        "morphTarget" => {
            let morph = required(def, &def.morph, "morph")?;
            builder.add_node(parent, MorphTargetNode::new(name, morph))?
        }
        other => {
            return Err(Error::JsonUnknownNodeType {
                node: def.name.clone(),
                node_type: other.to_string(),
            });
        }
    };

    if def.disabled {
        builder.set_disabled(index, true)?;
    }
    if let Some(color) = def.color {
        builder.set_color(index, color)?;
    }
    Ok(index)
}

impl AnimGraph {
    /// Builds a graph from its JSON description. Parents must be declared before their children.
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        let def: AnimGraphDef = parse(input)?;
        let mut builder = AnimGraphBuilder::new(def.name);

        for parameter in def.parameters {
            builder.add_parameter(ParameterDef::new(parameter.name, parameter.value.into()))?;
        }
        for node in &def.nodes {
            add_node(&mut builder, node)?;
        }
        for connection in &def.connections {
            let source = find(&builder, &connection.source)?;
            let target = find(&builder, &connection.target)?;
            builder.connect(source, connection.source_port, target, connection.target_port)?;
        }
        for node in &def.nodes {
            if let Some(output) = &node.output {
                let tree = find(&builder, &node.name)?;
                let source = find(&builder, output)?;
                builder.connect_to_final(tree, source)?;
            }
        }
        if let Some(output) = &def.output {
            let source = find(&builder, output)?;
            let root = builder.root();
            builder.connect_to_final(root, source)?;
        }
        Ok(builder.build())
    }
}

// Record settings

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordSettingsDef {
    fps: Option<u32>,
    num_pre_alloc_transform_keys: Option<usize>,
    initial_anim_graph_anim_bytes: Option<usize>,
    record_transforms: Option<bool>,
    record_anim_graph_states: Option<bool>,
    record_node_history: Option<bool>,
    history_states_only: Option<bool>,
    record_scale: Option<bool>,
    record_events: Option<bool>,
    record_morphs: Option<bool>,
    #[serde(default)]
    node_history_types: HashSet<String>,
    #[serde(default)]
    node_history_types_to_ignore: HashSet<String>,
    #[serde(default)]
    actor_instances: Vec<u32>,
    max_anim_graph_bytes: Option<usize>,
}

impl RecordSettings {
    /// Reads settings. Missing fields keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let def: RecordSettingsDef = parse(input)?;
        let defaults = RecordSettings::default();
        Ok(Self {
            fps: def.fps.unwrap_or(defaults.fps),
            num_pre_alloc_transform_keys: def
                .num_pre_alloc_transform_keys
                .unwrap_or(defaults.num_pre_alloc_transform_keys),
            initial_anim_graph_anim_bytes: def
                .initial_anim_graph_anim_bytes
                .unwrap_or(defaults.initial_anim_graph_anim_bytes),
            record_transforms: def.record_transforms.unwrap_or(defaults.record_transforms),
            record_anim_graph_states: def
                .record_anim_graph_states
                .unwrap_or(defaults.record_anim_graph_states),
            record_node_history: def.record_node_history.unwrap_or(defaults.record_node_history),
            history_states_only: def.history_states_only.unwrap_or(defaults.history_states_only),
            record_scale: def.record_scale.unwrap_or(defaults.record_scale),
            record_events: def.record_events.unwrap_or(defaults.record_events),
            record_morphs: def.record_morphs.unwrap_or(defaults.record_morphs),
            node_history_types: def.node_history_types,
            node_history_types_to_ignore: def.node_history_types_to_ignore,
            actor_instances: def.actor_instances.into_iter().map(ActorInstanceId).collect(),
            max_anim_graph_bytes: def.max_anim_graph_bytes.or(defaults.max_anim_graph_bytes),
        })
    }
}
