use super::motion_node::{MotionNode, MotionNodeData};
use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, ByteReader, ByteWriter, Error, NodeBase,
    NodeCategory, NodeIndex, PortKind, UniqueData, perform_output, perform_post_update,
    perform_top_down_update, perform_update, request_poses, request_ref_datas,
};
use std::any::Any;
use std::sync::Arc;

/// Samples the connected motion at a fixed normalized time without disturbing its playback.
#[derive(Clone, Debug)]
pub struct MotionFrameNode {
    base: NodeBase,
    normalized_time: f32,
}

impl MotionFrameNode {
    pub const INPUT_MOTION: usize = 0;
    pub const INPUT_TIME: usize = 1;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_input("Motion", PortKind::Motion)
                .with_input("Time", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFF00_A8FF),
            normalized_time: 0.0,
        }
    }

    /// Time used while the time port is unconnected.
    pub fn with_normalized_time(mut self, normalized_time: f32) -> Self {
        self.normalized_time = normalized_time.clamp(0.0, 1.0);
        self
    }

    pub fn normalized_time(&self) -> f32 {
        self.normalized_time
    }

    fn motion_source(&self) -> Option<NodeIndex> {
        self.base.input_source(Self::INPUT_MOTION)
    }

    fn requested_time(&self, instance: &AnimGraphInstance) -> f32 {
        instance
            .input_number(&self.base, Self::INPUT_TIME)
            .unwrap_or(self.normalized_time)
            .clamp(0.0, 1.0)
    }
}

#[derive(Debug, Default)]
pub struct MotionFrameNodeData {
    pub(crate) old_time: f32,
    pub(crate) new_time: f32,
    pub(crate) initialized: bool,
}

impl MotionFrameNodeData {
    pub fn old_time(&self) -> f32 {
        self.old_time
    }

    pub fn new_time(&self) -> f32 {
        self.new_time
    }
}

impl UniqueData for MotionFrameNodeData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn save(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_f32(self.old_time)?;
        writer.write_f32(self.new_time)?;
        writer.write_bool(self.initialized)
    }

    fn load(&mut self, reader: &mut ByteReader<'_>) -> Result<(), Error> {
        self.old_time = reader.read_f32()?;
        self.new_time = reader.read_f32()?;
        self.initialized = reader.read_bool()?;
        Ok(())
    }
}

impl AnimGraphNode for MotionFrameNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeMotionFrameNode"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Sources
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_unique_data(&self) -> Option<Box<dyn UniqueData>> {
        Some(Box::new(MotionFrameNodeData::default()))
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
        if let Some(time) = self.base.input_source(Self::INPUT_TIME) {
            perform_top_down_update(graph, instance, time, time_passed);
        }
    }

    fn update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        if self.base.is_disabled() {
            return;
        }
        for (_, connection) in self.base.connections() {
            perform_update(graph, instance, connection.source, time_passed);
        }

        let me = self.base.index();
        let duration = self
            .motion_source()
            .and_then(|src| instance.unique_data::<MotionNodeData>(src))
            .and_then(|d| d.motion_instance.as_ref())
            .map(|mi| mi.duration());
        let Some(duration) = duration else {
            instance.data_mut(me).has_error = true;
            return;
        };

        let time = self.requested_time(instance) * duration;
        if let Some(data) = instance.unique_data_mut::<MotionFrameNodeData>(me) {
            data.old_time = if data.initialized { data.new_time } else { time };
            data.new_time = time;
            data.initialized = true;
        }
        let data = instance.data_mut(me);
        data.has_error = false;
        data.duration = duration;
        data.current_time = time;
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        request_poses(&self.base, instance);
        if self.base.is_disabled() {
            return;
        }
        if let Some(time) = self.base.input_source(Self::INPUT_TIME) {
            perform_output(graph, instance, time);
        }

        let me = self.base.index();
        let Some(source) = self.motion_source() else {
            instance.data_mut(me).has_error = true;
            return;
        };
        let Some(handle) = instance.output_pose_handle(me) else {
            return;
        };
        let time = instance
            .unique_data::<MotionFrameNodeData>(me)
            .map_or(0.0, |d| d.new_time);
        let Some(mut pose) = instance.take_pose(handle) else {
            return;
        };
        let skeleton = Arc::clone(instance.skeleton());

        if let Some(mi) = instance
            .unique_data_mut::<MotionNodeData>(source)
            .and_then(|d| d.motion_instance.as_mut())
        {
            let (previous_time, was_paused) = (mi.current_time(), mi.is_paused());
            mi.set_paused(true);
            mi.set_current_time(time, false);
            mi.sample_pose(&skeleton, &mut pose);
            mi.set_current_time(previous_time, false);
            mi.set_paused(was_paused);
        }
        instance.restore_pose(handle, pose);
    }

    fn post_update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        request_ref_datas(&self.base, instance);
        if self.base.is_disabled() {
            return;
        }
        for (_, connection) in self.base.connections() {
            perform_post_update(graph, instance, connection.source, time_passed);
        }

        let me = self.base.index();
        let Some(source) = self.motion_source() else {
            return;
        };
        let emits = graph
            .node_as::<MotionNode>(source)
            .is_some_and(|n| n.emits_events());
        if !emits {
            return;
        }
        let Some((old_time, new_time)) = instance
            .unique_data::<MotionFrameNodeData>(me)
            .map(|d| (d.old_time, d.new_time))
        else {
            return;
        };
        let (global_weight, local_weight) = {
            let data = instance.data(me);
            (data.global_weight, data.local_weight)
        };

        let mut events = Vec::new();
        if let Some(mi) = instance
            .unique_data::<MotionNodeData>(source)
            .and_then(|d| d.motion_instance.as_ref())
        {
            mi.extract_events_non_loop(old_time, new_time, &mut events);
        }
        for event in &mut events {
            event.emitter = Some(me);
            event.global_weight = global_weight;
            event.local_weight = local_weight;
        }
        if let Some(out) = instance.ref_data_mut(me) {
            out.events = events;
        }
    }
}
