use crate::{KeyTrack, MotionId, Pose, SkeletonData, SyncTrack, Transform};
use glam::{Quat, Vec3};
use std::collections::HashMap;
use std::sync::Arc;

/// Event authored on a motion. Tick events have `start_time == end_time`.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionEvent {
    pub start_time: f32,
    pub end_time: f32,
    pub event_type: String,
    pub parameters: String,
}

impl MotionEvent {
    pub fn tick(time: f32, event_type: impl Into<String>) -> Self {
        Self {
            start_time: time,
            end_time: time,
            event_type: event_type.into(),
            parameters: String::new(),
        }
    }

    pub fn ranged(start_time: f32, end_time: f32, event_type: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            event_type: event_type.into(),
            parameters: String::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    pub fn is_tick_event(&self) -> bool {
        self.start_time == self.end_time
    }
}

/// Sampling capability consumed by motion nodes. Decoding of concrete motion formats lives outside
/// the graph runtime.
pub trait Motion: Send + Sync + std::fmt::Debug {
    fn id(&self) -> MotionId;
    fn name(&self) -> &str;
    fn duration(&self) -> f32;

    /// Writes every channel this motion animates into `out`. Channels it does not animate keep
    /// their current value.
    fn sample(&self, time: f32, skeleton: &SkeletonData, out: &mut Pose);

    /// Local transform of a single bone at `time`, starting from `bind`.
    fn sample_bone(
        &self,
        time: f32,
        skeleton: &SkeletonData,
        bone: usize,
        bind: &Transform,
    ) -> Transform;

    fn events(&self) -> &[MotionEvent];

    fn sync_track(&self) -> Option<&Arc<SyncTrack>> {
        None
    }
}

#[derive(Clone, Debug, Default)]
pub struct BoneTrack {
    pub bone: String,
    pub position: KeyTrack<Vec3>,
    pub rotation: KeyTrack<Quat>,
    pub scale: KeyTrack<Vec3>,
}

impl BoneTrack {
    pub fn new(bone: impl Into<String>) -> Self {
        Self {
            bone: bone.into(),
            ..Self::default()
        }
    }

    fn apply(&self, time: f32, transform: &mut Transform) {
        if let Some(position) = self.position.value_at_time(time) {
            transform.position = position;
        }
        if let Some(rotation) = self.rotation.value_at_time(time) {
            transform.rotation = rotation;
        }
        if let Some(scale) = self.scale.value_at_time(time) {
            transform.scale = scale;
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MorphTrack {
    pub name: String,
    pub weights: KeyTrack<f32>,
}

/// In-memory keyframed motion clip.
#[derive(Clone, Debug)]
pub struct KeyframeMotion {
    id: MotionId,
    pub name: String,
    pub duration: f32,
    pub bone_tracks: Vec<BoneTrack>,
    pub morph_tracks: Vec<MorphTrack>,
    pub events: Vec<MotionEvent>,
    pub sync_track: Option<Arc<SyncTrack>>,
}

impl KeyframeMotion {
    pub fn new(name: impl Into<String>, duration: f32) -> Self {
        Self {
            id: MotionId::next(),
            name: name.into(),
            duration,
            bone_tracks: Vec::new(),
            morph_tracks: Vec::new(),
            events: Vec::new(),
            sync_track: None,
        }
    }

    pub fn with_bone_track(mut self, track: BoneTrack) -> Self {
        self.bone_tracks.push(track);
        self
    }

    pub fn with_morph_track(mut self, track: MorphTrack) -> Self {
        self.morph_tracks.push(track);
        self
    }

    pub fn with_event(mut self, event: MotionEvent) -> Self {
        self.events.push(event);
        self.events
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        self
    }

    pub fn with_sync_track(mut self, sync_track: SyncTrack) -> Self {
        self.sync_track = Some(Arc::new(sync_track));
        self
    }
}

impl Motion for KeyframeMotion {
    fn id(&self) -> MotionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn duration(&self) -> f32 {
        self.duration
    }

    fn sample(&self, time: f32, skeleton: &SkeletonData, out: &mut Pose) {
        for track in &self.bone_tracks {
            let Some(bone) = skeleton.find_bone(&track.bone) else {
                continue;
            };
            if let Some(transform) = out.local_transform_mut(bone) {
                track.apply(time, transform);
            }
        }

        let lod_level = out.lod_level();
        for track in &self.morph_tracks {
            let Some(index) = skeleton.find_morph_target(lod_level, &track.name) else {
                continue;
            };
            if let Some(weight) = track.weights.value_at_time(time) {
                out.set_morph_weight(index, weight);
            }
        }
    }

    fn sample_bone(
        &self,
        time: f32,
        skeleton: &SkeletonData,
        bone: usize,
        bind: &Transform,
    ) -> Transform {
        let mut transform = *bind;
        let Some(name) = skeleton.bones.get(bone).map(|b| b.name.as_str()) else {
            return transform;
        };
        if let Some(track) = self.bone_tracks.iter().find(|t| t.bone == name) {
            track.apply(time, &mut transform);
        }
        transform
    }

    fn events(&self) -> &[MotionEvent] {
        &self.events
    }

    fn sync_track(&self) -> Option<&Arc<SyncTrack>> {
        self.sync_track.as_ref()
    }
}

/// Motions available to an anim-graph instance, looked up by name.
#[derive(Clone, Debug, Default)]
pub struct MotionSet {
    motions: HashMap<String, Arc<dyn Motion>>,
}

impl MotionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, motion: Arc<dyn Motion>) {
        self.motions.insert(motion.name().to_string(), motion);
    }

    pub fn with(mut self, motion: Arc<dyn Motion>) -> Self {
        self.add(motion);
        self
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Motion>> {
        self.motions.get(name)
    }

    pub fn len(&self) -> usize {
        self.motions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }
}
