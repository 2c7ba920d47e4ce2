use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, ByteReader, ByteWriter, Error, NodeBase,
    NodeCategory, NodeIndex, ObjectFlags, PortKind, UniqueData, hierarchical_sync_input_node,
    output_copy_of, perform_output, perform_post_update, perform_top_down_update, perform_update,
    recursive_set_unique_data_flag, request_poses, request_ref_datas,
};
use std::any::Any;

/// Passes through exactly one of ten poses, picked by the decision input. Unselected branches are
/// not evaluated at all.
#[derive(Clone, Debug)]
pub struct PoseSwitchNode {
    base: NodeBase,
}

impl PoseSwitchNode {
    pub const NUM_POSES: usize = 10;
    pub const INPUT_DECISION: usize = 10;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>) -> Self {
        let mut base = NodeBase::new(name);
        for i in 0..Self::NUM_POSES {
            base = base.with_input(format!("Pose {i}"), PortKind::Pose);
        }
        Self {
            base: base
                .with_input("Decision Value", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFF9C_61F2),
        }
    }

    /// Decision port value clamped to `[0, 9]`. Unconnected reads as 0.
    pub fn decision(&self, instance: &AnimGraphInstance) -> usize {
        let value = instance
            .input_number(&self.base, Self::INPUT_DECISION)
            .unwrap_or(0.0);
        (value as i32).clamp(0, Self::NUM_POSES as i32 - 1) as usize
    }

    pub fn selected_node(&self, instance: &AnimGraphInstance) -> Option<NodeIndex> {
        self.base.input_source(self.decision(instance))
    }
}

#[derive(Debug, Default)]
pub struct PoseSwitchNodeData {
    pub(crate) decision: Option<usize>,
}

impl PoseSwitchNodeData {
    pub fn decision(&self) -> Option<usize> {
        self.decision
    }
}

impl UniqueData for PoseSwitchNodeData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn save(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_index(self.decision)
    }

    fn load(&mut self, reader: &mut ByteReader<'_>) -> Result<(), Error> {
        self.decision = reader.read_index()?;
        Ok(())
    }
}

impl AnimGraphNode for PoseSwitchNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreePoseSwitchNode"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Logic
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_unique_data(&self) -> Option<Box<dyn UniqueData>> {
        Some(Box::new(PoseSwitchNodeData::default()))
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
        if let Some(decision) = self.base.input_source(Self::INPUT_DECISION) {
            perform_top_down_update(graph, instance, decision, time_passed);
        }
        if let Some(selected) = self.selected_node(instance) {
            hierarchical_sync_input_node(graph, instance, self.base.index(), selected);
            perform_top_down_update(graph, instance, selected, time_passed);
        }
    }

    fn update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        if self.base.is_disabled() {
            return;
        }
        if let Some(decision) = self.base.input_source(Self::INPUT_DECISION) {
            perform_update(graph, instance, decision, time_passed);
        }

        let me = self.base.index();
        let decision = self.decision(instance);
        let previous = instance
            .unique_data_mut::<PoseSwitchNodeData>(me)
            .and_then(|d| d.decision.replace(decision));
        let selected = self.base.input_source(decision);

        if let (Some(previous), Some(selected)) = (previous, selected) {
            if previous != decision {
                recursive_set_unique_data_flag(
                    graph,
                    instance,
                    selected,
                    ObjectFlags::RESYNC,
                    true,
                );
            }
        }

        match selected {
            Some(selected) => {
                perform_update(graph, instance, selected, time_passed);
                instance.inherit_timing(me, selected);
            }
            None => {
                let data = instance.data_mut(me);
                data.duration = 0.0;
                data.current_time = 0.0;
                data.sync_track = None;
                data.sync_index = None;
            }
        }
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if self.base.is_disabled() {
            request_poses(&self.base, instance);
            return;
        }
        if let Some(decision) = self.base.input_source(Self::INPUT_DECISION) {
            perform_output(graph, instance, decision);
        }
        let selected = self.selected_node(instance);
        if let Some(selected) = selected {
            perform_output(graph, instance, selected);
        }
        output_copy_of(&self.base, instance, selected);
    }

    fn post_update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        request_ref_datas(&self.base, instance);
        if self.base.is_disabled() {
            return;
        }
        if let Some(decision) = self.base.input_source(Self::INPUT_DECISION) {
            perform_post_update(graph, instance, decision, time_passed);
        }
        if let Some(selected) = self.selected_node(instance) {
            perform_post_update(graph, instance, selected, time_passed);
            instance.copy_ref_data(self.base.index(), selected);
        }
    }
}
