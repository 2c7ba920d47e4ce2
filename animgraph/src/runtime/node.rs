use crate::{
    AnimGraph, AnimGraphInstance, MotionId, NodeBase, NodeCategory, NodeIndex, ObjectFlags,
    OutputValue, PortKind, UniqueData,
};
use std::any::Any;

/// Contract every blend-graph node implements. Nodes are immutable, shared between instances; all
/// per-instance state lives in the instance's [`crate::NodeData`].
///
/// The phase methods are driven through [`perform_top_down_update`], [`perform_update`],
/// [`perform_output`] and [`perform_post_update`], which guard against running twice per tick and
/// keep the pose and ref-data reference counts balanced.
pub trait AnimGraphNode: Send + Sync {
    fn base(&self) -> &NodeBase;
    fn base_mut(&mut self) -> &mut NodeBase;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn category(&self) -> NodeCategory {
        NodeCategory::Misc
    }

    fn can_act_as_state(&self) -> bool {
        false
    }

    fn is_container(&self) -> bool {
        false
    }

    fn create_unique_data(&self) -> Option<Box<dyn UniqueData>> {
        None
    }

    /// Called once when an instance is created and again when its motion set changes.
    fn init(&self, _graph: &AnimGraph, _instance: &mut AnimGraphInstance) {}

    fn top_down_update(
        &self,
        graph: &AnimGraph,
        instance: &mut AnimGraphInstance,
        time_passed: f32,
    ) {
        default_top_down_update(graph, self.base(), instance, time_passed);
    }

    fn update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        default_update(graph, self.base(), instance, time_passed);
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        default_output(graph, self.base(), instance);
    }

    fn post_update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        default_post_update(graph, self.base(), instance, time_passed);
    }

    fn set_current_play_time(&self, instance: &mut AnimGraphInstance, time: f32) {
        instance.data_mut(self.base().index()).current_time = time;
    }

    /// Motion this node plays, for the recorder's node history.
    fn history_motion(&self, _instance: &AnimGraphInstance) -> Option<(MotionId, String)> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    #[default]
    Disabled,
    /// Match sync-track segments, falling back to clip-based sync when a track is missing.
    TrackBased,
    ClipBased,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventMode {
    #[default]
    MasterOnly,
    SlaveOnly,
    BothNodes,
    MostActive,
}

/// Speed multipliers produced when syncing a slave to a master.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncFactors {
    pub master: f32,
    pub slave: f32,
    pub play_speed: f32,
}

const SYNC_EPSILON: f32 = 1.0e-4;

// Phase drivers

pub fn perform_top_down_update(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    time_passed: f32,
) {
    if instance.is_object_flag_enabled(node, ObjectFlags::TOPDOWNUPDATE_READY) {
        return;
    }
    instance.enable_object_flags(node, ObjectFlags::TOPDOWNUPDATE_READY);
    graph.node_at(node).top_down_update(graph, instance, time_passed);
}

pub fn perform_update(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    time_passed: f32,
) {
    if instance.is_update_ready(node) {
        return;
    }
    let target = graph.node_at(node);
    for (_, connection) in target.base().connections() {
        let data = instance.data_mut(connection.source);
        data.pose_ref_count += 1;
        data.ref_data_ref_count += 1;
    }
    target.update(graph, instance, time_passed);
    instance.enable_object_flags(node, ObjectFlags::UPDATE_READY);
}

/// Runs `output` once per tick, then releases the poses of every input.
pub fn perform_output(graph: &AnimGraph, instance: &mut AnimGraphInstance, node: NodeIndex) {
    if instance.is_output_ready(node) {
        return;
    }
    let target = graph.node_at(node);
    target.output(graph, instance);
    free_incoming_poses(target.base(), instance);
    instance.enable_object_flags(node, ObjectFlags::OUTPUT_READY);
}

pub fn perform_post_update(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    time_passed: f32,
) {
    if instance.is_object_flag_enabled(node, ObjectFlags::POSTUPDATE_READY) {
        return;
    }
    let target = graph.node_at(node);
    target.post_update(graph, instance, time_passed);
    free_incoming_ref_datas(target.base(), instance);
    instance.enable_object_flags(node, ObjectFlags::POSTUPDATE_READY);
}

// Reference counting

/// Drops one reference to the output poses of `node`, returning them to the pool at zero.
pub fn decrease_ref(instance: &mut AnimGraphInstance, node: NodeIndex) {
    let data = instance.data_mut(node);
    if data.pose_ref_count == 0 {
        return;
    }
    data.pose_ref_count -= 1;
    if data.pose_ref_count > 0 {
        return;
    }
    let mut freed = Vec::new();
    for output in &mut data.outputs {
        if let OutputValue::Pose(handle) = *output {
            freed.push(handle);
            *output = OutputValue::None;
        }
    }
    for handle in freed {
        instance.free_pose(handle);
    }
}

pub fn decrease_ref_data_ref(instance: &mut AnimGraphInstance, node: NodeIndex) {
    let data = instance.data_mut(node);
    if data.ref_data_ref_count == 0 {
        return;
    }
    data.ref_data_ref_count -= 1;
    if data.ref_data_ref_count == 0 {
        instance.free_ref_data(node);
    }
}

pub fn increase_ref(instance: &mut AnimGraphInstance, node: NodeIndex) {
    instance.data_mut(node).pose_ref_count += 1;
}

pub fn increase_ref_data_ref(instance: &mut AnimGraphInstance, node: NodeIndex) {
    instance.data_mut(node).ref_data_ref_count += 1;
}

pub fn free_incoming_poses(node: &NodeBase, instance: &mut AnimGraphInstance) {
    for (_, connection) in node.connections() {
        decrease_ref(instance, connection.source);
    }
}

pub fn free_incoming_ref_datas(node: &NodeBase, instance: &mut AnimGraphInstance) {
    for (_, connection) in node.connections() {
        decrease_ref_data_ref(instance, connection.source);
    }
}

/// Allocates a bind pose for every pose output of `node`.
pub fn request_poses(node: &NodeBase, instance: &mut AnimGraphInstance) {
    for (port, output) in node.outputs().iter().enumerate() {
        if output.kind != PortKind::Pose {
            continue;
        }
        if let OutputValue::Pose(old) = instance.data(node.index()).output(port) {
            instance.free_pose(old);
        }
        let handle = instance.request_pose();
        instance
            .data_mut(node.index())
            .set_output(port, OutputValue::Pose(handle));
    }
}

pub fn request_ref_datas(node: &NodeBase, instance: &mut AnimGraphInstance) {
    instance.request_ref_data(node.index());
}

/// Writes the pose of `source` (or the bind pose) into the main output of `node`.
pub(crate) fn output_copy_of(
    node: &NodeBase,
    instance: &mut AnimGraphInstance,
    source: Option<NodeIndex>,
) {
    request_poses(node, instance);
    let Some(out_handle) = instance.output_pose_handle(node.index()) else {
        return;
    };
    let Some(mut out) = instance.take_pose(out_handle) else {
        return;
    };
    if let Some(pose) = source.and_then(|s| instance.output_pose(s)) {
        out.copy_from(pose);
    }
    instance.restore_pose(out_handle, out);
}

// Default phase bodies

pub fn default_top_down_update(
    graph: &AnimGraph,
    node: &NodeBase,
    instance: &mut AnimGraphInstance,
    time_passed: f32,
) {
    if node.is_disabled() {
        return;
    }
    hierarchical_sync_all_input_nodes(graph, node, instance);
    for (_, connection) in node.connections() {
        perform_top_down_update(graph, instance, connection.source, time_passed);
    }
}

/// Updates every input, then takes duration and timing from the node on port 0 (or the first
/// connected pose source).
pub fn default_update(
    graph: &AnimGraph,
    node: &NodeBase,
    instance: &mut AnimGraphInstance,
    time_passed: f32,
) {
    if node.is_disabled() {
        return;
    }
    let mut timing_source = None;
    for (port, connection) in node.connections() {
        perform_update(graph, instance, connection.source, time_passed);
        if port == 0 && graph.node_at(connection.source).base().has_output_pose() {
            timing_source = Some(connection.source);
        }
    }
    if timing_source.is_none() {
        timing_source = node
            .connections()
            .map(|(_, c)| c.source)
            .next()
            .filter(|&s| graph.node_at(s).base().has_output_pose());
    }
    if let Some(source) = timing_source {
        instance.inherit_timing(node.index(), source);
    }
}

pub fn default_output(graph: &AnimGraph, node: &NodeBase, instance: &mut AnimGraphInstance) {
    if node.is_disabled() {
        return;
    }
    for (_, connection) in node.connections() {
        perform_output(graph, instance, connection.source);
    }
}

/// Post-updates every input, then passes on the events and motion delta of the lowest connected
/// pose input. Disabled nodes get an empty ref data instead.
pub fn default_post_update(
    graph: &AnimGraph,
    node: &NodeBase,
    instance: &mut AnimGraphInstance,
    time_passed: f32,
) {
    if node.is_disabled() {
        request_ref_datas(node, instance);
        return;
    }
    let mut source = None;
    for (port, connection) in node.connections() {
        perform_post_update(graph, instance, connection.source, time_passed);
        if source.is_none()
            && node.inputs()[port].kind == PortKind::Pose
            && graph.node_at(connection.source).base().has_output_pose()
        {
            source = Some(connection.source);
        }
    }
    if source.is_none() {
        source = node
            .connections()
            .map(|(_, c)| c.source)
            .next()
            .filter(|&s| graph.node_at(s).base().has_output_pose());
    }

    request_ref_datas(node, instance);
    if let Some(source) = source {
        instance.copy_ref_data(node.index(), source);
    }
}

// Hierarchy helpers

pub fn recursive_set_unique_data_flag(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    flag: ObjectFlags,
    enabled: bool,
) {
    instance.set_object_flags(node, flag, enabled);
    for (_, connection) in graph.node_at(node).base().connections() {
        recursive_set_unique_data_flag(graph, instance, connection.source, flag, enabled);
    }
}

pub fn hierarchical_sync_all_input_nodes(
    graph: &AnimGraph,
    node: &NodeBase,
    instance: &mut AnimGraphInstance,
) {
    for (_, connection) in node.connections() {
        hierarchical_sync_input_node(graph, instance, node.index(), connection.source);
    }
}

/// Hands the weight and speed of `parent` down to `input`. Inputs flagged as synced follow the
/// parent through its sync track instead of inheriting its speed.
pub fn hierarchical_sync_input_node(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    parent: NodeIndex,
    input: NodeIndex,
) {
    if instance.is_synced(input) {
        auto_sync(graph, instance, input, parent, 0.0, SyncMode::TrackBased, false, false);
    } else {
        instance.data_mut(input).play_speed = instance.data(parent).play_speed;
    }
    let global_weight = instance.data(parent).global_weight;
    let data = instance.data_mut(input);
    data.global_weight = global_weight;
    data.local_weight = 1.0;
}

// Synchronization

/// Syncs `node` to `master`. Track-based sync falls back to clip-based sync when either side has
/// no sync events.
#[allow(clippy::too_many_arguments)]
pub fn auto_sync(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    master: NodeIndex,
    weight: f32,
    mode: SyncMode,
    resync: bool,
    modify_master_speed: bool,
) {
    match mode {
        SyncMode::Disabled => {}
        SyncMode::TrackBased => {
            let has_tracks = [node, master].iter().all(|&n| {
                instance
                    .data(n)
                    .sync_track
                    .as_ref()
                    .is_some_and(|t| t.num_events() > 0)
            });
            if has_tracks {
                sync_using_sync_tracks(
                    graph,
                    instance,
                    node,
                    master,
                    weight,
                    resync,
                    modify_master_speed,
                );
            } else {
                sync_full_node(graph, instance, node, master, weight, modify_master_speed);
            }
        }
        SyncMode::ClipBased => {
            sync_full_node(graph, instance, node, master, weight, modify_master_speed);
        }
    }
}

fn sync_full_node(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    master: NodeIndex,
    weight: f32,
    modify_master_speed: bool,
) {
    sync_play_speeds(instance, node, master, weight, modify_master_speed);
    sync_play_time(graph, instance, node, master);
}

/// Puts `node` at the same normalized time as `master`.
pub fn sync_play_time(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    master: NodeIndex,
) {
    let normalized = instance.data(master).normalized_time();
    let time = normalized * instance.data(node).duration;
    graph.node_at(node).set_current_play_time(instance, time);
}

pub fn sync_play_speeds(
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    master: NodeIndex,
    weight: f32,
    modify_master_speed: bool,
) {
    let factors = calc_sync_factors(instance, master, node, SyncMode::ClipBased, weight);
    apply_sync_factors(instance, node, master, factors, modify_master_speed);
}

fn apply_sync_factors(
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    master: NodeIndex,
    factors: SyncFactors,
    modify_master_speed: bool,
) {
    if modify_master_speed {
        instance.data_mut(master).play_speed = factors.play_speed * factors.master;
    }
    instance.data_mut(node).play_speed = factors.play_speed * factors.slave;
}

/// Blended play speed plus the per-side multipliers that make both nodes cover one cycle (or one
/// sync segment) in the same wall time.
pub fn calc_sync_factors(
    instance: &AnimGraphInstance,
    master: NodeIndex,
    slave: NodeIndex,
    mode: SyncMode,
    weight: f32,
) -> SyncFactors {
    let master_data = instance.data(master);
    let slave_data = instance.data(slave);

    let segment = |data: &crate::NodeData| -> Option<f32> {
        let track = data.sync_track.as_ref()?;
        let left = data.sync_index?;
        if track.num_events() == 0 {
            return None;
        }
        Some(track.calc_segment_length(left, (left + 1) % track.num_events()))
    };
    let (duration_a, duration_b) = match mode {
        SyncMode::TrackBased => match (segment(master_data), segment(slave_data)) {
            (Some(a), Some(b)) => (a, b),
            _ => (master_data.duration, slave_data.duration),
        },
        _ => (master_data.duration, slave_data.duration),
    };

    let time_ratio = if duration_b > SYNC_EPSILON {
        duration_a / duration_b
    } else {
        0.0
    };
    let time_ratio2 = if duration_a > SYNC_EPSILON {
        duration_b / duration_a
    } else {
        0.0
    };

    SyncFactors {
        master: lerp(1.0, time_ratio, weight),
        slave: lerp(time_ratio2, 1.0, weight),
        play_speed: lerp(master_data.play_speed, slave_data.play_speed, weight),
    }
}

/// Aligns `node` to the sync-track segment `master` is currently in and sets both speeds so the
/// segments finish together.
pub fn sync_using_sync_tracks(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    master: NodeIndex,
    weight: f32,
    resync: bool,
    modify_master_speed: bool,
) {
    let (Some(master_track), Some(slave_track)) = (
        instance.data(master).sync_track.clone(),
        instance.data(node).sync_track.clone(),
    ) else {
        return;
    };

    let master_time = instance.data(master).current_time;
    let forward = !instance.is_object_flag_enabled(master, ObjectFlags::PLAY_BACKWARD);
    let Some((master_left, master_right)) = master_track.find_event_indices(master_time) else {
        return;
    };

    let previous_master_index = instance.data(master).sync_index;
    if previous_master_index != Some(master_left) {
        instance.enable_object_flags(master, ObjectFlags::SYNCINDEX_CHANGED);
    }
    let master_changed = instance.is_object_flag_enabled(master, ObjectFlags::SYNCINDEX_CHANGED);

    let slave_count = slave_track.num_events();
    let mut start = instance.data(node).sync_index.unwrap_or(0);
    if master_changed && previous_master_index.is_some() {
        start = if forward {
            (start + 1) % slave_count
        } else {
            (start + slave_count - 1) % slave_count
        };
    }

    let (Some(left_event), Some(right_event)) =
        (master_track.event(master_left), master_track.event(master_right))
    else {
        return;
    };
    let found = if resync {
        let occurrence = master_track.calc_occurrence(master_left, master_right);
        slave_track.extract_occurrence(occurrence, left_event.id, right_event.id)
    } else {
        slave_track.find_matching_events(start, left_event.id, right_event.id, forward)
    };
    let Some((slave_left, slave_right)) = found else {
        // No matching segment; the slave keeps running on its own.
        return;
    };

    instance.data_mut(master).sync_index = Some(master_left);
    instance.data_mut(node).sync_index = Some(slave_left);

    // Normalized offset inside the master segment, wrapping through the loop point.
    let master_start = master_track.event(master_left).map_or(0.0, |e| e.time);
    let master_length = master_track.calc_segment_length(master_left, master_right);
    let mut offset = master_time - master_start;
    if offset < 0.0 {
        offset += master_track.duration();
    }
    let normalized = if master_length > SYNC_EPSILON {
        (offset / master_length).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let slave_start = slave_track.event(slave_left).map_or(0.0, |e| e.time);
    let slave_length = slave_track.calc_segment_length(slave_left, slave_right);
    let slave_duration = instance.data(node).duration;
    let mut slave_time = slave_start + normalized * slave_length;
    if slave_duration > SYNC_EPSILON && slave_time > slave_duration {
        slave_time %= slave_duration;
    }
    graph.node_at(node).set_current_play_time(instance, slave_time);

    let factors = calc_sync_factors(instance, master, node, SyncMode::TrackBased, weight);
    apply_sync_factors(instance, node, master, factors, modify_master_speed);
}

// Event filtering

/// Fills the ref data of `target` with the events of `a` and/or `b` according to `mode`.
pub fn filter_events(
    instance: &mut AnimGraphInstance,
    mode: EventMode,
    a: Option<NodeIndex>,
    b: Option<NodeIndex>,
    local_weight: f32,
    target: NodeIndex,
) {
    let events_of = |instance: &AnimGraphInstance, node: Option<NodeIndex>| {
        node.and_then(|n| instance.ref_data(n))
            .map(|d| d.events.clone())
            .unwrap_or_default()
    };
    let mut events = match mode {
        EventMode::MasterOnly => events_of(instance, a),
        EventMode::SlaveOnly => {
            if b.is_some() {
                events_of(instance, b)
            } else {
                events_of(instance, a)
            }
        }
        EventMode::BothNodes => {
            let mut events = events_of(instance, a);
            events.extend(events_of(instance, b));
            events
        }
        EventMode::MostActive => {
            if local_weight > 0.5 && b.is_some() {
                events_of(instance, b)
            } else {
                events_of(instance, a)
            }
        }
    };
    if let Some(out) = instance.ref_data_mut(target) {
        std::mem::swap(&mut out.events, &mut events);
    }
}

pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
