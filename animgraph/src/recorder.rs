//! Deterministic capture and scrubbing of actor and anim-graph state.
//!
//! The recorder samples every selected actor at a fixed rate: local bone transforms, the actor's
//! own placement, morph weights, a binary snapshot of every anim-graph node's per-instance state,
//! a timeline of active nodes and a timeline of fired events. Recorded data can be applied back
//! onto live actors at any time value.

use crate::{
    ActorInstance, ActorInstanceId, ActorManager, AnimGraphId, AnimGraphInstance,
    AnimGraphInstanceId, ByteReader, ByteWriter, Error, EventInfo, EventState, KeyTrack, MotionId,
    NodeCategory, NodeId, NodeIndex, ParameterValue, Transform,
};
use glam::{Quat, Vec3};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

const TRANSFORM_KEY_EPSILON: f32 = 0.0001;
const MORPH_KEY_EPSILON: f32 = 0.0001;
const HISTORY_OPTIMIZE_EPSILON: f32 = 0.0001;
const EVENT_TRACK_COLLISION: f32 = 0.01;
/// Accumulated `f32` tick times may land a hair below an exact frame boundary.
const FRAME_TIME_TOLERANCE: f32 = 1.0e-5;
/// The anim-graph buffer grows by this many times the missing amount.
const BUFFER_GROW_FRAMES: usize = 100;

const OUT_OF_MEMORY_MESSAGE: &str = "There is not enough memory to continue the current recording. \
It was deleted to free memory.";

#[derive(Clone, Debug, PartialEq)]
pub struct RecordSettings {
    /// Target sample rate. Zero records on every update.
    pub fps: u32,
    pub num_pre_alloc_transform_keys: usize,
    pub initial_anim_graph_anim_bytes: usize,
    pub record_transforms: bool,
    pub record_anim_graph_states: bool,
    pub record_node_history: bool,
    /// Only nodes that can act as a state get a history item.
    pub history_states_only: bool,
    pub record_scale: bool,
    pub record_events: bool,
    pub record_morphs: bool,
    /// Node type names to capture in the node history. Empty captures every type.
    pub node_history_types: HashSet<String>,
    pub node_history_types_to_ignore: HashSet<String>,
    /// Actors to record. Empty records every actor of the manager.
    pub actor_instances: Vec<ActorInstanceId>,
    /// Hard cap on the anim-graph snapshot buffer of one actor.
    pub max_anim_graph_bytes: Option<usize>,
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            fps: 60,
            num_pre_alloc_transform_keys: 32,
            initial_anim_graph_anim_bytes: 2 * 1024 * 1024,
            record_transforms: true,
            record_anim_graph_states: true,
            record_node_history: true,
            history_states_only: false,
            record_scale: true,
            record_events: true,
            record_morphs: true,
            node_history_types: HashSet::new(),
            node_history_types_to_ignore: HashSet::new(),
            actor_instances: Vec::new(),
            max_anim_graph_bytes: None,
        }
    }
}

/// Notified when a recording had to be discarded.
pub trait RecorderListener: Send {
    fn on_recording_failed(&mut self, message: &str);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HistoryValueType {
    #[default]
    GlobalWeight,
    LocalWeight,
    PlayTime,
}

#[derive(Clone, Debug, Default)]
pub struct TransformTracks {
    pub positions: KeyTrack<Vec3>,
    pub rotations: KeyTrack<Quat>,
    pub scales: KeyTrack<Vec3>,
}

impl TransformTracks {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: KeyTrack::with_capacity(capacity),
            rotations: KeyTrack::with_capacity(capacity),
            scales: KeyTrack::with_capacity(capacity),
        }
    }

    /// Adds a key per channel unless the channel still holds the same value.
    fn add_key(&mut self, time: f32, transform: &Transform, record_scale: bool) {
        add_if_changed(&mut self.positions, time, transform.position, TRANSFORM_KEY_EPSILON);
        add_if_changed(&mut self.rotations, time, transform.rotation, TRANSFORM_KEY_EPSILON);
        if record_scale {
            add_if_changed(&mut self.scales, time, transform.scale, TRANSFORM_KEY_EPSILON);
        }
    }

    /// Writes the recorded channels into `out`. Channels without keys keep their value.
    pub fn sample_into(&self, time: f32, out: &mut Transform, record_scale: bool) {
        if let Some(position) = self.positions.value_at_time(time) {
            out.position = position;
        }
        if let Some(rotation) = self.rotations.value_at_time(time) {
            out.rotation = rotation;
        }
        if record_scale {
            if let Some(scale) = self.scales.value_at_time(time) {
                out.scale = scale;
            }
        }
    }

    pub fn memory_usage(&self) -> usize {
        self.positions.memory_usage() + self.rotations.memory_usage() + self.scales.memory_usage()
    }
}

fn add_if_changed<T: crate::KeyValue>(track: &mut KeyTrack<T>, time: f32, value: T, epsilon: f32) {
    match track.last_key() {
        Some(last) if T::is_close(last.value, value, epsilon) => {}
        _ => track.add_key(time, value),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimGraphAnimObjectInfo {
    pub node: NodeIndex,
    /// Offset relative to the start of the frame.
    pub frame_byte_offset: usize,
}

/// One snapshot of an anim-graph instance. Frames occupy contiguous, non-overlapping byte ranges
/// of the shared buffer.
#[derive(Clone, Debug, Default)]
pub struct AnimGraphAnimFrame {
    pub time_value: f32,
    pub byte_offset: usize,
    pub num_bytes: usize,
    pub parameter_values: Vec<ParameterValue>,
    pub object_infos: Vec<AnimGraphAnimObjectInfo>,
}

#[derive(Clone, Debug)]
pub struct AnimGraphInstanceData {
    anim_graph_instance: AnimGraphInstanceId,
    anim_graph: AnimGraphId,
    buffer: Vec<u8>,
    frames: Vec<AnimGraphAnimFrame>,
}

impl AnimGraphInstanceData {
    fn new(
        instance: &AnimGraphInstance,
        initial_bytes: usize,
        max_bytes: Option<usize>,
    ) -> Result<Self, Error> {
        let mut data = Self {
            anim_graph_instance: instance.id(),
            anim_graph: instance.graph().id(),
            buffer: Vec::new(),
            frames: Vec::new(),
        };
        let initial = max_bytes.map_or(initial_bytes, |max| initial_bytes.min(max));
        data.resize_buffer(initial)?;
        Ok(data)
    }

    pub fn anim_graph_instance(&self) -> AnimGraphInstanceId {
        self.anim_graph_instance
    }

    pub fn anim_graph(&self) -> AnimGraphId {
        self.anim_graph
    }

    pub fn frames(&self) -> &[AnimGraphAnimFrame] {
        &self.frames
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Allocated size of the snapshot buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes of the buffer covered by recorded frames.
    pub fn used_bytes(&self) -> usize {
        self.frames.last().map_or(0, |f| f.byte_offset + f.num_bytes)
    }

    pub fn frame_bytes(&self, frame: usize) -> Option<&[u8]> {
        let frame = self.frames.get(frame)?;
        self.buffer
            .get(frame.byte_offset..frame.byte_offset + frame.num_bytes)
    }

    /// Index of the frame to restore for `time`.
    pub fn find_frame_number(&self, time: f32) -> Option<usize> {
        let last = self.frames.last()?;
        if self.frames.len() == 1 || time <= 0.0 {
            return Some(0);
        }
        if time > last.time_value {
            return Some(self.frames.len() - 1);
        }
        self.frames
            .windows(2)
            .position(|pair| pair[0].time_value <= time && pair[1].time_value > time)
            .or(Some(self.frames.len() - 1))
    }

    fn resize_buffer(&mut self, len: usize) -> Result<(), Error> {
        if len <= self.buffer.len() {
            return Ok(());
        }
        let additional = len - self.buffer.len();
        self.buffer
            .try_reserve_exact(additional)
            .map_err(|_| Error::RecordingBufferExhausted { requested: len })?;
        self.buffer.resize(len, 0);
        Ok(())
    }

    /// Makes sure the buffer holds at least `num_bytes`, growing well ahead of the need.
    fn assure_buffer_size(
        &mut self,
        num_bytes: usize,
        max_bytes: Option<usize>,
    ) -> Result<(), Error> {
        let len = self.buffer.len();
        if len >= num_bytes {
            return Ok(());
        }
        if max_bytes.is_some_and(|max| num_bytes > max) {
            return Err(Error::RecordingBufferExhausted {
                requested: num_bytes,
            });
        }
        let grown = len.saturating_add((num_bytes - len).saturating_mul(BUFFER_GROW_FRAMES));
        let new_len = max_bytes.map_or(grown, |max| grown.min(max));
        self.resize_buffer(new_len)
    }

    fn record_frame(
        &mut self,
        instance: &AnimGraphInstance,
        time: f32,
        max_bytes: Option<usize>,
    ) -> Result<(), Error> {
        let byte_offset = self.used_bytes();
        let objects = instance.graph().recursive_collect_objects();

        let mut sizes = Vec::with_capacity(objects.len());
        for &node in &objects {
            let mut counter = ByteWriter::counting();
            instance.save_node_state(node, &mut counter)?;
            sizes.push(counter.position());
        }
        let required: usize = sizes.iter().sum();
        self.assure_buffer_size(byte_offset + required, max_bytes)?;

        let mut frame = AnimGraphAnimFrame {
            time_value: time,
            byte_offset,
            num_bytes: 0,
            parameter_values: instance.parameter_values().to_vec(),
            object_infos: Vec::with_capacity(objects.len()),
        };
        let region = &mut self.buffer[byte_offset..byte_offset + required];
        for (&node, &size) in objects.iter().zip(&sizes) {
            let start = frame.num_bytes;
            let mut writer = ByteWriter::new(&mut region[start..start + size]);
            instance.save_node_state(node, &mut writer)?;
            if writer.position() != size {
                tracing::error!(
                    node = node.0,
                    expected = size,
                    actual = writer.position(),
                    "unique data size changed between passes"
                );
                return Err(Error::ByteCountMismatch {
                    expected: size,
                    actual: writer.position(),
                });
            }
            frame.object_infos.push(AnimGraphAnimObjectInfo {
                node,
                frame_byte_offset: start,
            });
            frame.num_bytes += size;
        }
        if frame.num_bytes != required {
            tracing::error!(
                expected = required,
                actual = frame.num_bytes,
                "frame size mismatch"
            );
            return Err(Error::ByteCountMismatch {
                expected: required,
                actual: frame.num_bytes,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Restores parameters and node states of the frame at `time` into `instance`.
    fn apply(&self, time: f32, instance: &mut AnimGraphInstance) -> Result<(), Error> {
        let Some(frame_number) = self.find_frame_number(time) else {
            return Ok(());
        };
        let frame = &self.frames[frame_number];

        if frame.parameter_values.len() != instance.num_parameters() {
            return Err(Error::ByteCountMismatch {
                expected: frame.parameter_values.len(),
                actual: instance.num_parameters(),
            });
        }
        for (index, value) in frame.parameter_values.iter().enumerate() {
            instance.set_parameter_value_by_index(index, *value)?;
        }

        let bytes = self
            .frame_bytes(frame_number)
            .ok_or_else(|| Error::UniqueDataDecode {
                message: format!("frame {frame_number} lies outside the recording buffer"),
            })?;
        let mut total_read = 0;
        for info in &frame.object_infos {
            let mut reader = ByteReader::new(&bytes[info.frame_byte_offset.min(bytes.len())..]);
            instance.load_node_state(info.node, &mut reader)?;
            total_read += reader.position();
        }
        if total_read != frame.num_bytes {
            tracing::error!(
                frame = frame_number,
                expected = frame.num_bytes,
                actual = total_read,
                "restored byte count differs from recorded frame"
            );
            return Err(Error::ByteCountMismatch {
                expected: frame.num_bytes,
                actual: total_read,
            });
        }
        Ok(())
    }

    pub fn memory_usage(&self) -> usize {
        let frames: usize = self
            .frames
            .iter()
            .map(|f| {
                std::mem::size_of::<AnimGraphAnimFrame>()
                    + f.parameter_values.capacity() * std::mem::size_of::<ParameterValue>()
                    + f.object_infos.capacity() * std::mem::size_of::<AnimGraphAnimObjectInfo>()
            })
            .sum();
        self.buffer.capacity() + frames
    }
}

/// Activation interval of one node, with its weights and play time sampled relative to
/// `start_time`.
#[derive(Clone, Debug)]
pub struct NodeHistoryItem {
    pub name: String,
    pub node_id: NodeId,
    pub node_type: &'static str,
    pub category: NodeCategory,
    pub color: u32,
    pub anim_graph_id: AnimGraphId,
    pub anim_graph_instance: AnimGraphInstanceId,
    pub motion_id: Option<MotionId>,
    pub motion_name: String,
    pub start_time: f32,
    pub end_time: f32,
    pub track_index: usize,
    pub is_finalized: bool,
    pub global_weights: KeyTrack<f32>,
    pub local_weights: KeyTrack<f32>,
    pub play_times: KeyTrack<f32>,
}

impl NodeHistoryItem {
    fn finalize(&mut self) {
        self.global_weights.optimize(HISTORY_OPTIMIZE_EPSILON);
        self.local_weights.optimize(HISTORY_OPTIMIZE_EPSILON);
        self.play_times.optimize(HISTORY_OPTIMIZE_EPSILON);
        self.is_finalized = true;
    }

    pub fn value_at(&self, value_type: HistoryValueType, time: f32) -> f32 {
        let track = match value_type {
            HistoryValueType::GlobalWeight => &self.global_weights,
            HistoryValueType::LocalWeight => &self.local_weights,
            HistoryValueType::PlayTime => &self.play_times,
        };
        track.value_at_time(time).unwrap_or(0.0)
    }

    fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.global_weights.memory_usage()
            + self.local_weights.memory_usage()
            + self.play_times.memory_usage()
            + self.name.capacity()
            + self.motion_name.capacity()
    }
}

#[derive(Clone, Debug)]
pub struct EventHistoryItem {
    pub event_info: EventInfo,
    pub is_tick_event: bool,
    pub emitter_node_id: Option<NodeId>,
    pub color: u32,
    pub anim_graph_id: AnimGraphId,
    pub start_time: f32,
    pub end_time: f32,
    pub track_index: usize,
}

/// A history item active at a queried time, sampled for display.
#[derive(Clone, Copy, Debug)]
pub struct ExtractedNodeHistoryItem<'a> {
    pub track_index: usize,
    pub value: f32,
    pub key_track_sample_time: f32,
    pub item: Option<&'a NodeHistoryItem>,
}

/// Everything recorded for one actor.
#[derive(Clone, Debug)]
pub struct ActorInstanceData {
    actor_instance: ActorInstanceId,
    actor_local_transform: TransformTracks,
    transform_tracks: Vec<TransformTracks>,
    morph_tracks: Vec<KeyTrack<f32>>,
    anim_graph_data: Option<AnimGraphInstanceData>,
    node_history_items: Vec<NodeHistoryItem>,
    event_history_items: Vec<EventHistoryItem>,
}

impl ActorInstanceData {
    pub fn actor_instance(&self) -> ActorInstanceId {
        self.actor_instance
    }

    pub fn actor_local_transform(&self) -> &TransformTracks {
        &self.actor_local_transform
    }

    pub fn transform_tracks(&self) -> &[TransformTracks] {
        &self.transform_tracks
    }

    pub fn morph_tracks(&self) -> &[KeyTrack<f32>] {
        &self.morph_tracks
    }

    pub fn anim_graph_data(&self) -> Option<&AnimGraphInstanceData> {
        self.anim_graph_data.as_ref()
    }

    pub fn node_history_items(&self) -> &[NodeHistoryItem] {
        &self.node_history_items
    }

    pub fn event_history_items(&self) -> &[EventHistoryItem] {
        &self.event_history_items
    }

    pub fn calc_max_node_history_track_index(&self) -> usize {
        self.node_history_items
            .iter()
            .map(|i| i.track_index)
            .max()
            .unwrap_or(0)
    }

    pub fn calc_max_event_history_track_index(&self) -> usize {
        self.event_history_items
            .iter()
            .map(|i| i.track_index)
            .max()
            .unwrap_or(0)
    }

    /// Largest number of motion items whose intervals overlap, counting each track once.
    pub fn calc_max_num_active_motions(&self) -> usize {
        let num_tracks = self.calc_max_node_history_track_index() + 1;
        let mut counted = vec![false; num_tracks];
        let mut result = 0;
        for (i, item) in self.node_history_items.iter().enumerate() {
            if item.motion_id.is_none() {
                continue;
            }
            counted.fill(false);
            counted[item.track_index] = true;
            let mut active = 1;
            for (j, other) in self.node_history_items.iter().enumerate() {
                if i == j || other.motion_id.is_none() || counted[other.track_index] {
                    continue;
                }
                let contains = |a: &NodeHistoryItem, t: f32| a.start_time <= t && t <= a.end_time;
                let overlaps = contains(other, item.start_time)
                    || contains(other, item.end_time)
                    || contains(item, other.start_time)
                    || contains(item, other.end_time);
                if overlaps {
                    active += 1;
                    counted[other.track_index] = true;
                }
            }
            result = result.max(active);
        }
        result
    }

    /// Samples the item active on every history track at `time`.
    ///
    /// Returns one entry per track plus a map from track index to display row. With `sort`, rows
    /// are ordered by descending value.
    pub fn extract_node_history_items(
        &self,
        time: f32,
        sort: bool,
        value_type: HistoryValueType,
    ) -> (Vec<ExtractedNodeHistoryItem<'_>>, Vec<usize>) {
        let num_tracks = self.calc_max_node_history_track_index() + 1;
        let mut items: Vec<ExtractedNodeHistoryItem<'_>> = (0..num_tracks)
            .map(|track_index| ExtractedNodeHistoryItem {
                track_index,
                value: 0.0,
                key_track_sample_time: 0.0,
                item: None,
            })
            .collect();

        for item in &self.node_history_items {
            if item.start_time <= time && item.end_time > time {
                let sample_time = time - item.start_time;
                items[item.track_index] = ExtractedNodeHistoryItem {
                    track_index: item.track_index,
                    value: item.value_at(value_type, sample_time),
                    key_track_sample_time: sample_time,
                    item: Some(item),
                };
            }
        }

        let mut map: Vec<usize> = (0..num_tracks).collect();
        if sort {
            items.sort_by(|a, b| b.value.total_cmp(&a.value));
            for (row, item) in items.iter().enumerate() {
                map[item.track_index] = row;
            }
        }
        (items, map)
    }

    pub fn memory_usage(&self) -> usize {
        let transforms: usize = self
            .transform_tracks
            .iter()
            .map(TransformTracks::memory_usage)
            .sum();
        let morphs: usize = self.morph_tracks.iter().map(KeyTrack::memory_usage).sum();
        let nodes: usize = self
            .node_history_items
            .iter()
            .map(NodeHistoryItem::memory_usage)
            .sum();
        std::mem::size_of::<Self>()
            + transforms
            + morphs
            + nodes
            + self.event_history_items.capacity() * std::mem::size_of::<EventHistoryItem>()
            + self.actor_local_transform.memory_usage()
            + self.anim_graph_data.as_ref().map_or(0, AnimGraphInstanceData::memory_usage)
    }

    fn record_transforms(&mut self, actor: &ActorInstance, time: f32, record_scale: bool) {
        for (track, transform) in self
            .transform_tracks
            .iter_mut()
            .zip(actor.pose().transforms())
        {
            track.add_key(time, transform, record_scale);
        }
    }

    fn record_morphs(&mut self, actor: &ActorInstance, time: f32) {
        for (track, &weight) in self.morph_tracks.iter_mut().zip(actor.pose().morph_weights()) {
            add_if_changed(track, time, weight, MORPH_KEY_EPSILON);
        }
    }

    fn update_node_history_items(
        &mut self,
        instance: &AnimGraphInstance,
        settings: &RecordSettings,
        time: f32,
    ) {
        let graph = instance.graph();
        let active: Vec<NodeIndex> = instance.recursive_collect_active_nodes();
        let active_ids: Vec<NodeId> = active
            .iter()
            .filter_map(|&n| graph.node(n).map(|node| node.base().id()))
            .collect();

        for item in &mut self.node_history_items {
            if !item.is_finalized && !active_ids.contains(&item.node_id) {
                item.finalize();
                item.end_time = time;
            }
        }

        for &node_index in &active {
            if node_index == graph.root() {
                continue;
            }
            let Some(node) = graph.node(node_index) else {
                continue;
            };
            if settings.history_states_only && !node.can_act_as_state() {
                continue;
            }
            let node_type = node.type_name();
            if !settings.node_history_types.is_empty()
                && !settings.node_history_types.contains(node_type)
            {
                continue;
            }
            if settings.node_history_types_to_ignore.contains(node_type) {
                continue;
            }

            let node_id = node.base().id();
            let index = match self.find_node_history_item(node_id, time) {
                Some(index) => index,
                None => {
                    let (motion_id, motion_name) = node
                        .history_motion(instance)
                        .map_or((None, String::new()), |(id, name)| (Some(id), name));
                    let mut item = NodeHistoryItem {
                        name: node.base().name().to_string(),
                        node_id,
                        node_type,
                        category: node.category(),
                        color: node.base().color(),
                        anim_graph_id: graph.id(),
                        anim_graph_instance: instance.id(),
                        motion_id,
                        motion_name,
                        start_time: time,
                        end_time: time,
                        track_index: 0,
                        is_finalized: false,
                        global_weights: KeyTrack::with_capacity(1024),
                        local_weights: KeyTrack::with_capacity(1024),
                        play_times: KeyTrack::with_capacity(1024),
                    };
                    item.track_index = self.find_free_node_history_track(&item);
                    self.node_history_items.push(item);
                    self.node_history_items.len() - 1
                }
            };

            let Some(data) = instance.node_data(node_index) else {
                continue;
            };
            let item = &mut self.node_history_items[index];
            let key_time = time - item.start_time;
            item.global_weights.add_key(key_time, data.global_weight);
            item.local_weights.add_key(key_time, data.local_weight);
            let normalized = if data.duration > f32::EPSILON {
                data.current_time / data.duration
            } else {
                0.0
            };
            item.play_times.add_key(key_time, normalized);
            item.end_time = time;
        }
    }

    fn find_node_history_item(&self, node_id: NodeId, time: f32) -> Option<usize> {
        self.node_history_items.iter().position(|item| {
            item.node_id == node_id
                && item.start_time <= time
                && (!item.is_finalized || item.end_time >= time)
        })
    }

    fn find_free_node_history_track(&self, item: &NodeHistoryItem) -> usize {
        let mut track_index = 0;
        loop {
            let collides = self
                .node_history_items
                .iter()
                .filter(|cur| cur.track_index == track_index)
                .any(|cur| {
                    if cur.is_finalized {
                        (item.start_time > cur.start_time && item.start_time < cur.end_time)
                            || (item.end_time > cur.start_time && item.end_time < cur.end_time)
                    } else {
                        item.start_time >= cur.start_time
                    }
                });
            if !collides {
                return track_index;
            }
            track_index += 1;
        }
    }

    fn record_events(&mut self, instance: &AnimGraphInstance, time: f32) {
        let graph = instance.graph();
        for event in instance.events() {
            if event.state == EventState::Active {
                continue;
            }
            let emitter = event.emitter.and_then(|e| graph.node(e));
            let mut item = EventHistoryItem {
                event_info: event.clone(),
                is_tick_event: event.is_tick_event(),
                emitter_node_id: emitter.map(|n| n.base().id()),
                color: emitter.map_or(0xFFFF_FFFF, |n| n.base().color()),
                anim_graph_id: graph.id(),
                start_time: time,
                end_time: time,
                track_index: 0,
            };
            item.track_index = self.find_free_event_history_track(&item);
            self.event_history_items.push(item);
        }
    }

    fn find_free_event_history_track(&self, item: &EventHistoryItem) -> usize {
        let mut track_index = 0;
        while self.event_history_items.iter().any(|cur| {
            cur.track_index == track_index
                && (cur.start_time - item.start_time).abs() <= EVENT_TRACK_COLLISION
        }) {
            track_index += 1;
        }
        track_index
    }

    fn finalize_all_node_history_items(&mut self) {
        for item in &mut self.node_history_items {
            if !item.is_finalized {
                item.finalize();
            }
        }
    }
}

#[derive(Debug)]
struct RecorderState {
    settings: RecordSettings,
    session_id: Uuid,
    is_recording: bool,
    is_in_play_mode: bool,
    auto_play: bool,
    record_time: f32,
    last_record_time: f32,
    current_play_time: f32,
    actor_instance_datas: Vec<ActorInstanceData>,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self {
            settings: RecordSettings::default(),
            session_id: Uuid::nil(),
            is_recording: false,
            is_in_play_mode: false,
            auto_play: false,
            record_time: 0.0,
            last_record_time: 0.0,
            current_play_time: 0.0,
            actor_instance_datas: Vec::new(),
        }
    }
}

impl RecorderState {
    fn clear(&mut self) {
        let settings = std::mem::take(&mut self.settings);
        *self = Self {
            settings,
            ..Self::default()
        };
    }

    fn stop_recording(&mut self) {
        if !self.is_recording {
            return;
        }
        self.is_recording = false;
        for data in &mut self.actor_instance_datas {
            data.finalize_all_node_history_items();
        }
        tracing::debug!(
            session = %self.session_id,
            record_time = self.record_time,
            actors = self.actor_instance_datas.len(),
            "stopped recording"
        );
    }

    fn find_actor_instance_data_index(&self, actor: ActorInstanceId) -> Option<usize> {
        self.actor_instance_datas
            .iter()
            .position(|d| d.actor_instance == actor)
    }

    fn prepare_for_recording(&mut self, actors: &ActorManager) -> Result<(), Error> {
        let selected: Vec<ActorInstanceId> = if self.settings.actor_instances.is_empty() {
            actors.iter().map(ActorInstance::id).collect()
        } else {
            self.settings.actor_instances.clone()
        };

        for id in selected {
            let Some(actor) = actors.get(id) else {
                tracing::warn!(actor = id.0, "actor selected for recording is not registered");
                continue;
            };
            let num_keys = self.settings.num_pre_alloc_transform_keys;
            let anim_graph_data = match actor.anim_graph_instance() {
                Some(instance) if self.settings.record_anim_graph_states => {
                    Some(AnimGraphInstanceData::new(
                        instance,
                        self.settings.initial_anim_graph_anim_bytes,
                        self.settings.max_anim_graph_bytes,
                    )?)
                }
                _ => None,
            };
            self.actor_instance_datas.push(ActorInstanceData {
                actor_instance: id,
                actor_local_transform: TransformTracks::with_capacity(num_keys),
                transform_tracks: (0..actor.pose().num_transforms())
                    .map(|_| TransformTracks::with_capacity(num_keys))
                    .collect(),
                morph_tracks: (0..actor.pose().morph_weights().len())
                    .map(|_| KeyTrack::with_capacity(num_keys))
                    .collect(),
                anim_graph_data,
                node_history_items: Vec::new(),
                event_history_items: Vec::new(),
            });
        }
        Ok(())
    }

    fn record_current_frame(&mut self, actors: &ActorManager) -> Result<(), Error> {
        let time = self.record_time;
        let settings = &self.settings;

        if settings.record_transforms {
            for data in &mut self.actor_instance_datas {
                if let Some(actor) = actors.get(data.actor_instance) {
                    data.record_transforms(actor, time, settings.record_scale);
                }
            }
        }

        if settings.record_anim_graph_states {
            for data in &mut self.actor_instance_datas {
                let Some(actor) = actors.get(data.actor_instance) else {
                    continue;
                };
                let (Some(graph_data), Some(instance)) =
                    (data.anim_graph_data.as_mut(), actor.anim_graph_instance())
                else {
                    continue;
                };
                graph_data.record_frame(instance, time, settings.max_anim_graph_bytes)?;
            }
        }

        for data in &mut self.actor_instance_datas {
            let Some(actor) = actors.get(data.actor_instance) else {
                continue;
            };
            data.actor_local_transform
                .add_key(time, &actor.local_transform(), settings.record_scale);
            if settings.record_morphs {
                data.record_morphs(actor, time);
            }
            let Some(instance) = actor.anim_graph_instance() else {
                continue;
            };
            if settings.record_node_history {
                data.update_node_history_items(instance, settings, time);
            }
            if settings.record_events {
                data.record_events(instance, time);
            }
        }

        self.last_record_time = time;
        Ok(())
    }

    fn frame_interval(&self) -> f32 {
        if self.settings.fps == 0 {
            0.0
        } else {
            1.0 / self.settings.fps as f32
        }
    }
}

/// Records actors and their anim graphs, and plays recordings back onto them.
///
/// All state sits behind one read-write lock: mutating calls take it exclusively, queries and
/// sampling share it. Recorded actors are referenced by id. Call
/// [`Recorder::remove_actor_instance_from_recording`] before an actor goes away.
pub struct Recorder {
    state: RwLock<RecorderState>,
    listener: Mutex<Option<Box<dyn RecorderListener>>>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Recorder")
            .field("session_id", &state.session_id)
            .field("is_recording", &state.is_recording)
            .field("record_time", &state.record_time)
            .field("actors", &state.actor_instance_datas.len())
            .finish()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RecorderState::default()),
            listener: Mutex::new(None),
        }
    }

    pub fn set_listener<L: RecorderListener + 'static>(&self, listener: L) {
        *self.listener.lock() = Some(Box::new(listener));
    }

    pub fn clear_listener(&self) {
        *self.listener.lock() = None;
    }

    pub fn settings(&self) -> RecordSettings {
        self.state.read().settings.clone()
    }

    /// Id of the current or last recording session. Nil before the first recording.
    pub fn session_id(&self) -> Uuid {
        self.state.read().session_id
    }

    pub fn is_recording(&self) -> bool {
        self.state.read().is_recording
    }

    pub fn is_in_play_mode(&self) -> bool {
        self.state.read().is_in_play_mode
    }

    pub fn is_in_auto_play_mode(&self) -> bool {
        self.state.read().auto_play
    }

    pub fn has_recording(&self) -> bool {
        let state = self.state.read();
        state.record_time > 0.0 && !state.actor_instance_datas.is_empty()
    }

    pub fn record_time(&self) -> f32 {
        self.state.read().record_time
    }

    pub fn current_play_time(&self) -> f32 {
        self.state.read().current_play_time
    }

    pub fn set_current_play_time(&self, time: f32) {
        let mut state = self.state.write();
        state.current_play_time = time.clamp(0.0, state.record_time);
    }

    pub fn set_auto_play(&self, enabled: bool) {
        self.state.write().auto_play = enabled;
    }

    pub fn start_play_back(&self) {
        let mut state = self.state.write();
        state.stop_recording();
        state.is_in_play_mode = true;
    }

    pub fn stop_play_back(&self) {
        self.state.write().is_in_play_mode = false;
    }

    pub fn rewind(&self) {
        self.state.write().current_play_time = 0.0;
    }

    /// Advances the play head while auto play is on.
    pub fn update_play_mode(&self, time_passed: f32) {
        let mut state = self.state.write();
        if !state.is_in_play_mode || !state.auto_play {
            return;
        }
        let record_time = state.record_time;
        state.current_play_time = (state.current_play_time + time_passed).clamp(0.0, record_time);
    }

    /// Drops all recorded data. Settings are kept.
    pub fn clear(&self) {
        self.state.write().clear();
    }

    /// Clears previous data, prepares tracks for the selected actors and records the first frame.
    pub fn start_recording(
        &self,
        settings: RecordSettings,
        actors: &ActorManager,
    ) -> Result<(), Error> {
        let result = {
            let mut state = self.state.write();
            state.clear();
            state.settings = settings;
            state.session_id = Uuid::new_v4();
            state.is_recording = true;
            let result = match state.prepare_for_recording(actors) {
                Ok(()) => state.record_current_frame(actors),
                Err(err) => Err(err),
            };
            if result.is_ok() {
                tracing::debug!(
                    session = %state.session_id,
                    actors = state.actor_instance_datas.len(),
                    fps = state.settings.fps,
                    "started recording"
                );
            } else {
                state.stop_recording();
                state.clear();
            }
            result
        };
        self.handle_capture_result(result)
    }

    pub fn stop_recording(&self) {
        self.state.write().stop_recording();
    }

    /// Advances the record clock and records a frame once a sample interval has elapsed.
    pub fn update(&self, time_passed: f32, actors: &ActorManager) -> Result<(), Error> {
        let result = {
            let mut state = self.state.write();
            if !state.is_recording {
                return Ok(());
            }
            state.record_time += time_passed;
            let elapsed = state.record_time - state.last_record_time;
            if elapsed + FRAME_TIME_TOLERANCE < state.frame_interval() {
                return Ok(());
            }
            let result = state.record_current_frame(actors);
            if result.is_err() {
                state.stop_recording();
                state.clear();
            }
            result
        };
        self.handle_capture_result(result)
    }

    // Runs with the state lock released so a listener may query the recorder.
    fn handle_capture_result(&self, result: Result<(), Error>) -> Result<(), Error> {
        match result {
            Ok(()) => Ok(()),
            Err(Error::RecordingBufferExhausted { requested }) => {
                tracing::warn!(requested, "recording buffer exhausted, recording discarded");
                self.notify_failure(OUT_OF_MEMORY_MESSAGE);
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "recording failed, recording discarded");
                self.notify_failure(&err.to_string());
                Err(err)
            }
        }
    }

    fn notify_failure(&self, message: &str) {
        if let Some(listener) = self.listener.lock().as_mut() {
            listener.on_recording_failed(message);
        }
    }

    pub fn remove_actor_instance_from_recording(&self, actor: ActorInstanceId) {
        self.state
            .write()
            .actor_instance_datas
            .retain(|d| d.actor_instance != actor);
    }

    pub fn remove_anim_graph_from_recording(&self, graph: AnimGraphId) {
        let mut state = self.state.write();
        for data in &mut state.actor_instance_datas {
            if data
                .anim_graph_data
                .as_ref()
                .is_some_and(|d| d.anim_graph == graph)
            {
                data.anim_graph_data = None;
            }
        }
    }

    // Queries

    pub fn num_actor_instance_datas(&self) -> usize {
        self.state.read().actor_instance_datas.len()
    }

    pub fn find_actor_instance_data_index(&self, actor: ActorInstanceId) -> Option<usize> {
        self.state.read().find_actor_instance_data_index(actor)
    }

    /// Read access to the data of one recorded actor. Holds the shared lock while alive.
    pub fn actor_instance_data(
        &self,
        index: usize,
    ) -> Option<MappedRwLockReadGuard<'_, ActorInstanceData>> {
        RwLockReadGuard::try_map(self.state.read(), |s| s.actor_instance_datas.get(index)).ok()
    }

    pub fn calc_max_node_history_track_index(&self) -> usize {
        self.state
            .read()
            .actor_instance_datas
            .iter()
            .map(ActorInstanceData::calc_max_node_history_track_index)
            .max()
            .unwrap_or(0)
    }

    pub fn calc_max_event_history_track_index(&self) -> usize {
        self.state
            .read()
            .actor_instance_datas
            .iter()
            .map(ActorInstanceData::calc_max_event_history_track_index)
            .max()
            .unwrap_or(0)
    }

    pub fn calc_max_num_active_motions(&self) -> usize {
        self.state
            .read()
            .actor_instance_datas
            .iter()
            .map(ActorInstanceData::calc_max_num_active_motions)
            .max()
            .unwrap_or(0)
    }

    pub fn calc_memory_usage(&self) -> usize {
        let state = self.state.read();
        state
            .actor_instance_datas
            .iter()
            .map(ActorInstanceData::memory_usage)
            .sum::<usize>()
            + state.actor_instance_datas.capacity() * std::mem::size_of::<ActorInstanceData>()
    }

    // Playback

    pub fn sample_and_apply_transforms(&self, time: f32, actor: &mut ActorInstance) {
        let state = self.state.read();
        let Some(index) = state.find_actor_instance_data_index(actor.id()) else {
            return;
        };
        let record_scale = state.settings.record_scale;
        let pose = actor.pose_mut();
        for (bone, track) in state.actor_instance_datas[index].transform_tracks.iter().enumerate() {
            if let Some(transform) = pose.local_transform_mut(bone) {
                track.sample_into(time, transform, record_scale);
            }
        }
    }

    pub fn sample_and_apply_main_transform(&self, time: f32, actor: &mut ActorInstance) {
        let state = self.state.read();
        let Some(index) = state.find_actor_instance_data_index(actor.id()) else {
            return;
        };
        let mut transform = actor.local_transform();
        state.actor_instance_datas[index]
            .actor_local_transform
            .sample_into(time, &mut transform, state.settings.record_scale);
        actor.set_local_transform(transform);
    }

    /// Applies the recorded morph weights when the actor still has the recorded morph count.
    pub fn sample_and_apply_morphs(&self, time: f32, actor: &mut ActorInstance) {
        let state = self.state.read();
        let Some(index) = state.find_actor_instance_data_index(actor.id()) else {
            return;
        };
        let tracks = &state.actor_instance_datas[index].morph_tracks;
        let pose = actor.pose_mut();
        if tracks.len() != pose.morph_weights().len() {
            return;
        }
        for (morph, track) in tracks.iter().enumerate() {
            if let Some(weight) = track.value_at_time(time) {
                pose.set_morph_weight(morph, weight);
            }
        }
    }

    /// Restores the recorded parameters and node states of the actor's anim graph.
    pub fn sample_and_apply_anim_graph_states(
        &self,
        time: f32,
        actor: &mut ActorInstance,
    ) -> Result<(), Error> {
        let state = self.state.read();
        let Some(index) = state.find_actor_instance_data_index(actor.id()) else {
            return Ok(());
        };
        let Some(graph_data) = state.actor_instance_datas[index].anim_graph_data.as_ref() else {
            return Ok(());
        };
        let Some(instance) = actor.anim_graph_instance_mut() else {
            return Err(Error::NoRecordedData {
                what: format!("anim graph of actor {}", actor.id().0),
            });
        };
        if instance.graph().id() != graph_data.anim_graph {
            return Err(Error::NoRecordedData {
                what: format!("anim graph '{}'", instance.graph().name()),
            });
        }
        graph_data.apply(time, instance)
    }

    pub fn sample_and_apply_anim_graphs(
        &self,
        time: f32,
        actors: &mut ActorManager,
    ) -> Result<(), Error> {
        for actor in actors.iter_mut() {
            self.sample_and_apply_anim_graph_states(time, actor)?;
        }
        Ok(())
    }

    /// Applies everything recorded at `time` to every recorded actor in `actors`.
    pub fn sample_and_apply_all(
        &self,
        time: f32,
        actors: &mut ActorManager,
    ) -> Result<(), Error> {
        for actor in actors.iter_mut() {
            self.sample_and_apply_transforms(time, actor);
            self.sample_and_apply_main_transform(time, actor);
            self.sample_and_apply_morphs(time, actor);
            self.sample_and_apply_anim_graph_states(time, actor)?;
        }
        Ok(())
    }

    /// Opens `path` for writing. Recording serialization has no file format yet, so nothing is
    /// written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        std::fs::File::create(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::warn!(
            path = %path.display(),
            "saving recordings is not implemented, wrote an empty file"
        );
        Ok(())
    }
}
