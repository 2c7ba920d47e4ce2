use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, NodeBase, NodeCategory, PortKind, UniqueData,
    default_output, request_poses,
};
use std::any::Any;

/// Sets the weight of one named morph target on top of the input pose.
#[derive(Clone, Debug)]
pub struct MorphTargetNode {
    base: NodeBase,
    morph_target: String,
}

impl MorphTargetNode {
    pub const INPUT_POSE: usize = 0;
    pub const INPUT_WEIGHT: usize = 1;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>, morph_target: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_input("Input Pose", PortKind::Pose)
                .with_input("Morph Weight", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFFE6_4F8A),
            morph_target: morph_target.into(),
        }
    }

    pub fn morph_target(&self) -> &str {
        &self.morph_target
    }
}

/// Morph index resolved for one LOD level. Re-resolved only when the LOD changes.
#[derive(Debug, Default)]
pub struct MorphTargetNodeData {
    pub(crate) lod_level: Option<usize>,
    pub(crate) morph_index: Option<usize>,
    pub(crate) num_resolves: u32,
}

impl MorphTargetNodeData {
    pub fn lod_level(&self) -> Option<usize> {
        self.lod_level
    }

    pub fn morph_index(&self) -> Option<usize> {
        self.morph_index
    }

    pub fn num_resolves(&self) -> u32 {
        self.num_resolves
    }
}

impl UniqueData for MorphTargetNodeData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl AnimGraphNode for MorphTargetNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeMorphTargetNode"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Controllers
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_unique_data(&self) -> Option<Box<dyn UniqueData>> {
        Some(Box::new(MorphTargetNodeData::default()))
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if self.base.is_disabled() {
            request_poses(&self.base, instance);
            return;
        }
        default_output(graph, &self.base, instance);
        request_poses(&self.base, instance);

        let me = self.base.index();
        let lod_level = instance.lod_level();
        let skeleton = std::sync::Arc::clone(instance.skeleton());
        let Some(data) = instance.unique_data_mut::<MorphTargetNodeData>(me) else {
            return;
        };
        if data.lod_level != Some(lod_level) {
            data.lod_level = Some(lod_level);
            data.morph_index = skeleton.find_morph_target(lod_level, &self.morph_target);
            data.num_resolves += 1;
            tracing::debug!(
                node = %self.base.name(),
                lod_level,
                index = ?data.morph_index,
                "resolved morph target"
            );
            if data.morph_index.is_none() {
                tracing::warn!(
                    node = %self.base.name(),
                    morph = %self.morph_target,
                    lod_level,
                    "morph target not found"
                );
            }
        }
        let morph_index = data.morph_index;
        instance.data_mut(me).has_error = morph_index.is_none();

        let weight = instance
            .input_number(&self.base, Self::INPUT_WEIGHT)
            .unwrap_or(0.0);
        let Some(handle) = instance.output_pose_handle(me) else {
            return;
        };
        let Some(mut out) = instance.take_pose(handle) else {
            return;
        };
        if let Some(morph_index) = morph_index {
            if let Some(input) = instance.input_pose(&self.base, Self::INPUT_POSE) {
                out.copy_from(input);
            }
            out.set_morph_weight(morph_index, weight);
        }
        instance.restore_pose(handle, out);
    }
}
