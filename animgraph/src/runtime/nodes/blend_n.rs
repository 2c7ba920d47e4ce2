use super::blend2::{
    BLEND_EPSILON, BlendNodes, SourceHistory, mark_resync, merge_blend_ref_data, propagate_blend,
    update_blend_timing,
};
use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, ByteReader, ByteWriter, Error, EventMode,
    NodeBase, NodeCategory, NodeIndex, PortKind, SyncMode, UniqueData, perform_output,
    perform_post_update, perform_top_down_update, perform_update, request_poses,
    request_ref_datas,
};
use std::any::Any;

/// Up to ten poses spread evenly over a weight in `[0, 1]`. Only connected ports take part.
#[derive(Clone, Debug)]
pub struct BlendNNode {
    base: NodeBase,
    sync_mode: SyncMode,
    event_mode: EventMode,
}

impl BlendNNode {
    pub const NUM_POSES: usize = 10;
    pub const INPUT_WEIGHT: usize = 10;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>) -> Self {
        let mut base = NodeBase::new(name);
        for i in 0..Self::NUM_POSES {
            base = base.with_input(format!("Pose {i}"), PortKind::Pose);
        }
        Self {
            base: base
                .with_input("Weight", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFF45_9FE6),
            sync_mode: SyncMode::Disabled,
            event_mode: EventMode::MasterOnly,
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

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn event_mode(&self) -> EventMode {
        self.event_mode
    }

    fn connected_sources(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (0..Self::NUM_POSES).filter_map(|port| self.base.input_source(port))
    }

    /// Resolves the weight to the two neighbouring connected sources and the blend factor between
    /// them.
    pub fn find_blend_nodes(&self, instance: &AnimGraphInstance) -> BlendNodes {
        let mut sources = [NodeIndex(0); Self::NUM_POSES];
        let mut count = 0;
        for source in self.connected_sources() {
            sources[count] = source;
            count += 1;
        }
        match count {
            0 => return BlendNodes::default(),
            1 => {
                return BlendNodes {
                    a: Some(sources[0]),
                    b: None,
                    weight: 1.0,
                };
            }
            _ => {}
        }

        let weight = instance
            .input_number(&self.base, Self::INPUT_WEIGHT)
            .filter(|w| w.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let step = 1.0 / (count - 1) as f32;
        let index = ((weight / step).floor() as usize).min(count - 1);
        if index >= count - 1 {
            return BlendNodes {
                a: Some(sources[count - 1]),
                b: None,
                weight: 1.0,
            };
        }

        let factor = (weight % step) / step;
        if factor < BLEND_EPSILON {
            BlendNodes {
                a: Some(sources[index]),
                b: None,
                weight: 0.0,
            }
        } else if factor > 1.0 - BLEND_EPSILON {
            BlendNodes {
                a: Some(sources[index + 1]),
                b: None,
                weight: 1.0,
            }
        } else {
            BlendNodes {
                a: Some(sources[index]),
                b: Some(sources[index + 1]),
                weight: factor,
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct BlendNNodeData {
    pub(crate) sources: SourceHistory,
}

impl UniqueData for BlendNNodeData {
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

impl AnimGraphNode for BlendNNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeBlendNNode"
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
        Some(Box::new(BlendNNodeData::default()))
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
            .unique_data_mut::<BlendNNodeData>(self.base.index())
            .map(|d| std::mem::take(&mut d.sources.resync_pending))
            .unwrap_or(false);

        let mut others = [NodeIndex(0); Self::NUM_POSES];
        let mut num_others = 0;
        for source in self.connected_sources() {
            if Some(source) != nodes.a
                && Some(source) != nodes.b
                && !others[..num_others].contains(&source)
            {
                others[num_others] = source;
                num_others += 1;
            }
        }
        propagate_blend(
            graph,
            instance,
            &self.base,
            &nodes,
            self.sync_mode,
            false,
            resync,
            &others[..num_others],
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
            .unique_data_mut::<BlendNNodeData>(self.base.index())
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
            out.blend(pose_b, nodes.weight);
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
        merge_blend_ref_data(instance, self.base.index(), &nodes, self.event_mode, false);
    }
}
