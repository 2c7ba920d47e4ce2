use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, NodeBase, NodeCategory, NodeIndex, PortKind,
    decrease_ref, decrease_ref_data_ref, default_output, hierarchical_sync_input_node, increase_ref,
    increase_ref_data_ref, output_copy_of, perform_output, perform_post_update,
    perform_top_down_update, perform_update, request_poses, request_ref_datas,
};
use std::any::Any;

/// Container node. Its children form a dataflow graph whose result is whatever reaches the final
/// node.
#[derive(Clone, Debug)]
pub struct BlendTreeNode {
    base: NodeBase,
    final_node: Option<NodeIndex>,
}

impl BlendTreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFF3C_D46C),
            final_node: None,
        }
    }

    pub fn final_node(&self) -> Option<NodeIndex> {
        self.final_node
    }

    pub(crate) fn set_final_node(&mut self, node: NodeIndex) {
        self.final_node = Some(node);
    }
}

impl AnimGraphNode for BlendTreeNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTree"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Sources
    }

    fn can_act_as_state(&self) -> bool {
        true
    }

    fn is_container(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
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
        if let Some(final_node) = self.final_node {
            hierarchical_sync_input_node(graph, instance, self.base.index(), final_node);
            perform_top_down_update(graph, instance, final_node, time_passed);
        }
    }

    fn update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        if self.base.is_disabled() {
            return;
        }
        let Some(final_node) = self.final_node else {
            return;
        };
        increase_ref(instance, final_node);
        increase_ref_data_ref(instance, final_node);
        perform_update(graph, instance, final_node, time_passed);
        instance.inherit_timing(self.base.index(), final_node);
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if self.base.is_disabled() {
            request_poses(&self.base, instance);
            return;
        }
        let Some(final_node) = self.final_node else {
            request_poses(&self.base, instance);
            return;
        };
        perform_output(graph, instance, final_node);
        output_copy_of(&self.base, instance, Some(final_node));
        decrease_ref(instance, final_node);
    }

    fn post_update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        request_ref_datas(&self.base, instance);
        if self.base.is_disabled() {
            return;
        }
        let Some(final_node) = self.final_node else {
            return;
        };
        perform_post_update(graph, instance, final_node, time_passed);
        instance.copy_ref_data(self.base.index(), final_node);
        decrease_ref_data_ref(instance, final_node);
    }
}

/// The single pose sink of a blend tree.
#[derive(Clone, Debug)]
pub struct FinalNode {
    base: NodeBase,
}

impl FinalNode {
    pub const INPUT_POSE: usize = 0;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_input("Input Pose", PortKind::Pose)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFF5B_5B5B),
        }
    }
}

impl AnimGraphNode for FinalNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeFinalNode"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if self.base.is_disabled() {
            request_poses(&self.base, instance);
            return;
        }
        default_output(graph, &self.base, instance);
        output_copy_of(&self.base, instance, self.base.input_source(Self::INPUT_POSE));
    }
}
