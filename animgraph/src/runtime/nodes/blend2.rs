use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, ByteReader, ByteWriter, Error, EventMode,
    NodeBase, NodeCategory, NodeIndex, ObjectFlags, PortKind, SyncMode, Transform, UniqueData,
    auto_sync, filter_events, lerp, perform_output, perform_post_update, perform_top_down_update,
    perform_update, recursive_set_unique_data_flag, request_poses, request_ref_datas,
};
use std::any::Any;

/// Weights within this distance of 0 or 1 collapse the blend to a single source.
pub const BLEND_EPSILON: f32 = 1.0e-5;

/// The sources a blend node reads this tick. `a` is also the sync master.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlendNodes {
    pub a: Option<NodeIndex>,
    pub b: Option<NodeIndex>,
    pub weight: f32,
}

/// Blends pose B over pose A by a weight in `[0, 1]`, optionally additive and/or limited to a set
/// of bones.
#[derive(Clone, Debug)]
pub struct Blend2Node {
    base: NodeBase,
    sync_mode: SyncMode,
    event_mode: EventMode,
    mask: Vec<String>,
    additive: bool,
}

impl Blend2Node {
    pub const INPUT_POSE_A: usize = 0;
    pub const INPUT_POSE_B: usize = 1;
    pub const INPUT_WEIGHT: usize = 2;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_input("Pose 1", PortKind::Pose)
                .with_input("Pose 2", PortKind::Pose)
                .with_input("Weight", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFF45_9FE6),
            sync_mode: SyncMode::Disabled,
            event_mode: EventMode::MasterOnly,
            mask: Vec::new(),
            additive: false,
        }
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn with_event_mode(mut self, event_mode: EventMode) -> Self {
        self.event_mode = event_mode;
        self
    }

    /// Bones the blend applies to. Empty means the whole skeleton.
    pub fn with_mask<S: Into<String>>(mut self, bones: impl IntoIterator<Item = S>) -> Self {
        self.mask = bones.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_additive(mut self, additive: bool) -> Self {
        self.additive = additive;
        self
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn event_mode(&self) -> EventMode {
        self.event_mode
    }

    pub fn mask(&self) -> &[String] {
        &self.mask
    }

    pub fn is_additive(&self) -> bool {
        self.additive
    }

    /// Clamped weight input, 0 when unconnected.
    pub fn weight(&self, instance: &AnimGraphInstance) -> f32 {
        instance
            .input_number(&self.base, Self::INPUT_WEIGHT)
            .filter(|w| w.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }

    pub fn find_blend_nodes(&self, instance: &AnimGraphInstance) -> BlendNodes {
        let weight = self.weight(instance);
        let a = self.base.input_source(Self::INPUT_POSE_A);
        let b = self.base.input_source(Self::INPUT_POSE_B);
        match (a, b) {
            (None, None) => BlendNodes::default(),
            (Some(only), None) | (None, Some(only)) => BlendNodes {
                a: Some(only),
                b: None,
                weight: 1.0,
            },
            (Some(a), Some(b)) => {
                if self.additive {
                    return BlendNodes {
                        a: Some(a),
                        b: Some(b),
                        weight,
                    };
                }
                if weight < BLEND_EPSILON {
                    BlendNodes {
                        a: Some(a),
                        b: None,
                        weight: 0.0,
                    }
                } else if weight > 1.0 - BLEND_EPSILON {
                    BlendNodes {
                        a: Some(b),
                        b: None,
                        weight: 1.0,
                    }
                } else {
                    BlendNodes {
                        a: Some(a),
                        b: Some(b),
                        weight,
                    }
                }
            }
        }
    }
}

/// Per-instance state of a [`Blend2Node`]: the resolved mask and the sources of the last tick.
#[derive(Debug, Default)]
pub struct Blend2NodeData {
    pub(crate) mask: Vec<usize>,
    pub(crate) sources: SourceHistory,
}

impl Blend2NodeData {
    pub fn mask(&self) -> &[usize] {
        &self.mask
    }
}

impl UniqueData for Blend2NodeData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn save(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        self.sources.save(writer)
    }

    fn load(&mut self, reader: &mut ByteReader<'_>) -> Result<(), Error> {
        self.sources.load(reader)
    }
}

/// Which sources a blend read last tick, so a change can trigger a resync.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct SourceHistory {
    pub initialized: bool,
    pub last_a: Option<NodeIndex>,
    pub last_b: Option<NodeIndex>,
    pub resync_pending: bool,
}

impl SourceHistory {
    /// Records this tick's sources and returns the ones that just became relevant.
    pub fn track(&mut self, nodes: &BlendNodes) -> (Option<NodeIndex>, Option<NodeIndex>) {
        let was_initialized = std::mem::replace(&mut self.initialized, true);
        let new_a = nodes.a.filter(|&a| was_initialized && self.last_a != Some(a));
        let new_b = nodes.b.filter(|&b| was_initialized && self.last_b != Some(b));
        self.last_a = nodes.a;
        self.last_b = nodes.b;
        if new_a.is_some() || new_b.is_some() {
            self.resync_pending = true;
        }
        (new_a, new_b)
    }

    pub fn save(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_bool(self.initialized)?;
        writer.write_index(self.last_a.map(|n| n.0))?;
        writer.write_index(self.last_b.map(|n| n.0))?;
        writer.write_bool(self.resync_pending)
    }

    pub fn load(&mut self, reader: &mut ByteReader<'_>) -> Result<(), Error> {
        self.initialized = reader.read_bool()?;
        self.last_a = reader.read_index()?.map(NodeIndex);
        self.last_b = reader.read_index()?.map(NodeIndex);
        self.resync_pending = reader.read_bool()?;
        Ok(())
    }
}

impl AnimGraphNode for Blend2Node {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeBlend2Node"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Blending
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_unique_data(&self) -> Option<Box<dyn UniqueData>> {
        Some(Box::new(Blend2NodeData::default()))
    }

    fn init(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        let skeleton = std::sync::Arc::clone(instance.skeleton());
        let mut mask = Vec::with_capacity(self.mask.len());
        for name in &self.mask {
            match skeleton.find_bone(name) {
                Some(bone) => mask.push(bone),
                None => {
                    tracing::warn!(node = %self.base.name(), bone = %name, "mask bone not found")
                }
            }
        }
        if let Some(data) = instance.unique_data_mut::<Blend2NodeData>(self.base.index()) {
            data.mask = mask;
        }
    }

    fn top_down_update(
        &self,
        graph: &AnimGraph,
        instance: &mut AnimGraphInstance,
        time_passed: f32,
    ) {
        if self.base.is_disabled() {
            return;
        }
        if let Some(weight) = self.base.input_source(Self::INPUT_WEIGHT) {
            perform_top_down_update(graph, instance, weight, time_passed);
        }
        let nodes = self.find_blend_nodes(instance);
        let resync = instance
            .unique_data_mut::<Blend2NodeData>(self.base.index())
            .map(|d| std::mem::take(&mut d.sources.resync_pending))
            .unwrap_or(false);
        propagate_blend(
            graph,
            instance,
            &self.base,
            &nodes,
            self.sync_mode,
            self.additive,
            resync,
            &[],
        );
        for node in [nodes.a, nodes.b].into_iter().flatten() {
            perform_top_down_update(graph, instance, node, time_passed);
        }
    }

    fn update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        if self.base.is_disabled() {
            return;
        }
        if let Some(weight) = self.base.input_source(Self::INPUT_WEIGHT) {
            perform_update(graph, instance, weight, time_passed);
        }
        let nodes = self.find_blend_nodes(instance);
        let fresh = instance
            .unique_data_mut::<Blend2NodeData>(self.base.index())
            .map(|d| d.sources.track(&nodes))
            .unwrap_or((None, None));
        mark_resync(graph, instance, fresh);

        for node in [nodes.a, nodes.b].into_iter().flatten() {
            perform_update(graph, instance, node, time_passed);
        }
        update_blend_timing(instance, self.base.index(), &nodes, self.sync_mode);
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if self.base.is_disabled() {
            request_poses(&self.base, instance);
            return;
        }
        if let Some(weight) = self.base.input_source(Self::INPUT_WEIGHT) {
            perform_output(graph, instance, weight);
        }
        let nodes = self.find_blend_nodes(instance);
        for node in [nodes.a, nodes.b].into_iter().flatten() {
            perform_output(graph, instance, node);
        }

        request_poses(&self.base, instance);
        let Some(out_handle) = instance.output_pose_handle(self.base.index()) else {
            return;
        };
        let Some(mut out) = instance.take_pose(out_handle) else {
            return;
        };
        if let Some(pose) = nodes.a.and_then(|a| instance.output_pose(a)) {
            out.copy_from(pose);
        }
        if let Some(pose_b) = nodes.b.and_then(|b| instance.output_pose(b)) {
            let mask = instance
                .unique_data::<Blend2NodeData>(self.base.index())
                .map(|d| d.mask.as_slice())
                .unwrap_or(&[]);
            let bind = instance.bind_pose();
            match (self.additive, mask.is_empty()) {
                (false, true) => out.blend(pose_b, nodes.weight),
                (false, false) => out.blend_masked(pose_b, mask, nodes.weight),
                (true, true) => out.blend_additive(pose_b, bind, nodes.weight),
                (true, false) => out.blend_additive_masked(pose_b, bind, mask, nodes.weight),
            }
        }
        instance.restore_pose(out_handle, out);
    }

    fn post_update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        if self.base.is_disabled() {
            request_ref_datas(&self.base, instance);
            return;
        }
        if let Some(weight) = self.base.input_source(Self::INPUT_WEIGHT) {
            perform_post_update(graph, instance, weight, time_passed);
        }
        let nodes = self.find_blend_nodes(instance);
        for node in [nodes.a, nodes.b].into_iter().flatten() {
            perform_post_update(graph, instance, node, time_passed);
        }
        request_ref_datas(&self.base, instance);
        merge_blend_ref_data(instance, self.base.index(), &nodes, self.event_mode, self.additive);
    }
}

/// Hands weights and play speed to the blend sources and syncs B (and `others`) to A.
#[allow(clippy::too_many_arguments)]
pub(crate) fn propagate_blend(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    base: &NodeBase,
    nodes: &BlendNodes,
    sync_mode: SyncMode,
    additive: bool,
    resync: bool,
    others: &[NodeIndex],
) {
    let Some(a) = nodes.a else {
        return;
    };
    let (play_speed, global_weight) = {
        let data = instance.data(base.index());
        (data.play_speed, data.global_weight)
    };

    for node in std::iter::once(a).chain(nodes.b).chain(others.iter().copied()) {
        instance.data_mut(node).play_speed = play_speed;
    }

    if sync_mode != SyncMode::Disabled {
        instance.enable_object_flags(a, ObjectFlags::IS_SYNCMASTER);
        for node in nodes.b.into_iter().chain(others.iter().copied()) {
            if node == a {
                continue;
            }
            recursive_set_unique_data_flag(graph, instance, node, ObjectFlags::SYNCED, true);
            let weight = if Some(node) == nodes.b { nodes.weight } else { 0.0 };
            auto_sync(graph, instance, node, a, weight, sync_mode, resync, Some(node) == nodes.b);
        }
    }

    for &other in others {
        let data = instance.data_mut(other);
        data.global_weight = 0.0;
        data.local_weight = 0.0;
    }
    match nodes.b {
        None => {
            let data = instance.data_mut(a);
            data.global_weight = global_weight;
            data.local_weight = 1.0;
        }
        Some(b) => {
            let weight_a = if additive { 1.0 } else { 1.0 - nodes.weight };
            let data = instance.data_mut(a);
            data.global_weight = global_weight * weight_a;
            data.local_weight = weight_a;
            let data = instance.data_mut(b);
            data.global_weight = global_weight * nodes.weight;
            data.local_weight = nodes.weight;
        }
    }
}

pub(crate) fn mark_resync(
    graph: &AnimGraph,
    instance: &mut AnimGraphInstance,
    fresh: (Option<NodeIndex>, Option<NodeIndex>),
) {
    for node in [fresh.0, fresh.1].into_iter().flatten() {
        recursive_set_unique_data_flag(graph, instance, node, ObjectFlags::RESYNC, true);
    }
}

/// Takes timing from A. With sync enabled the duration follows the blend weight.
pub(crate) fn update_blend_timing(
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    nodes: &BlendNodes,
    sync_mode: SyncMode,
) {
    let Some(a) = nodes.a else {
        let data = instance.data_mut(node);
        data.duration = 0.0;
        data.current_time = 0.0;
        data.sync_track = None;
        data.sync_index = None;
        return;
    };
    instance.inherit_timing(node, a);
    let Some(b) = nodes.b else {
        return;
    };
    if sync_mode == SyncMode::Disabled {
        return;
    }
    let normalized = instance.data(a).normalized_time();
    let duration = lerp(instance.data(a).duration, instance.data(b).duration, nodes.weight);
    let data = instance.data_mut(node);
    data.duration = duration;
    data.current_time = normalized * duration;
}

/// Filters events of the two sources into `node` and blends their motion-extraction deltas the
/// same way the poses are blended.
pub(crate) fn merge_blend_ref_data(
    instance: &mut AnimGraphInstance,
    node: NodeIndex,
    nodes: &BlendNodes,
    event_mode: EventMode,
    additive: bool,
) {
    let Some(a) = nodes.a else {
        return;
    };
    filter_events(instance, event_mode, Some(a), nodes.b, nodes.weight, node);

    let trajectory_of = |n: NodeIndex| {
        instance
            .ref_data(n)
            .map_or(Transform::IDENTITY, |d| d.trajectory_delta)
    };
    let mut delta = trajectory_of(a);
    if let Some(b) = nodes.b {
        let delta_b = trajectory_of(b);
        if additive {
            delta.blend_additive(&delta_b, &Transform::IDENTITY, nodes.weight);
        } else if nodes.weight > 1.0 - BLEND_EPSILON {
            delta = delta_b;
        } else if nodes.weight >= BLEND_EPSILON {
            delta.blend(&delta_b, nodes.weight);
        }
    }
    if let Some(data) = instance.ref_data_mut(node) {
        data.trajectory_delta = delta;
    }
}
