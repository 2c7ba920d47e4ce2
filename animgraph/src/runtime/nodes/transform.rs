use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, ByteReader, ByteWriter, Error, NodeBase,
    NodeCategory, PortKind, Transform, UniqueData, default_output, default_update, lerp,
    request_poses,
};
use glam::{EulerRot, Quat, Vec3};
use std::any::Any;

/// Resolved target bone of a single-bone controller.
#[derive(Debug, Default)]
pub struct BoneTargetData {
    pub(crate) bone: Option<usize>,
}

impl BoneTargetData {
    pub fn bone(&self) -> Option<usize> {
        self.bone
    }
}

impl UniqueData for BoneTargetData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn resolve_bone(base: &NodeBase, instance: &AnimGraphInstance, bone: &str) -> Option<usize> {
    let index = instance.skeleton().find_bone(bone);
    if index.is_none() {
        tracing::warn!(node = %base.name(), bone = %bone, "target bone not found");
    }
    index
}

/// Replaces the local transform of one bone with a value interpolated between a configured
/// minimum and maximum.
#[derive(Clone, Debug)]
pub struct TransformNode {
    base: NodeBase,
    target_bone: String,
    min_translation: Vec3,
    max_translation: Vec3,
    /// Euler angles in degrees.
    min_rotation: Vec3,
    max_rotation: Vec3,
    min_scale: Vec3,
    max_scale: Vec3,
}

impl TransformNode {
    pub const INPUT_POSE: usize = 0;
    pub const INPUT_TRANSLATE_AMOUNT: usize = 1;
    pub const INPUT_ROTATE_AMOUNT: usize = 2;
    pub const INPUT_SCALE_AMOUNT: usize = 3;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>, target_bone: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_input("Input Pose", PortKind::Pose)
                .with_input("Translation", PortKind::Number)
                .with_input("Rotation", PortKind::Number)
                .with_input("Scale", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFFF2_A93B),
            target_bone: target_bone.into(),
            min_translation: Vec3::ZERO,
            max_translation: Vec3::ZERO,
            min_rotation: Vec3::ZERO,
            max_rotation: Vec3::ZERO,
            min_scale: Vec3::ONE,
            max_scale: Vec3::ONE,
        }
    }

    pub fn with_translation_range(mut self, min: Vec3, max: Vec3) -> Self {
        self.min_translation = min;
        self.max_translation = max;
        self
    }

    /// Euler XYZ in degrees.
    pub fn with_rotation_range(mut self, min: Vec3, max: Vec3) -> Self {
        self.min_rotation = min;
        self.max_rotation = max;
        self
    }

    pub fn with_scale_range(mut self, min: Vec3, max: Vec3) -> Self {
        self.min_scale = min;
        self.max_scale = max;
        self
    }

    pub fn target_bone(&self) -> &str {
        &self.target_bone
    }

    fn amount(&self, instance: &AnimGraphInstance, port: usize) -> f32 {
        instance
            .input_number(&self.base, port)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }

    /// The transform written into the target bone for the current inputs.
    pub fn target_transform(&self, instance: &AnimGraphInstance) -> Transform {
        let t = self.amount(instance, Self::INPUT_TRANSLATE_AMOUNT);
        let r = self.amount(instance, Self::INPUT_ROTATE_AMOUNT);
        let s = self.amount(instance, Self::INPUT_SCALE_AMOUNT);
        let euler = self.min_rotation.lerp(self.max_rotation, r);
        Transform {
            position: self.min_translation.lerp(self.max_translation, t),
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                euler.x.to_radians(),
                euler.y.to_radians(),
                euler.z.to_radians(),
            ),
            scale: self.min_scale.lerp(self.max_scale, s),
        }
    }
}

impl AnimGraphNode for TransformNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeTransformNode"
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
        Some(Box::new(BoneTargetData::default()))
    }

    fn init(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        let bone = resolve_bone(&self.base, instance, &self.target_bone);
        if let Some(data) = instance.unique_data_mut::<BoneTargetData>(self.base.index()) {
            data.bone = bone;
        }
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if self.base.is_disabled() {
            request_poses(&self.base, instance);
            return;
        }
        default_output(graph, &self.base, instance);
        request_poses(&self.base, instance);

        let me = self.base.index();
        let bone = instance.unique_data::<BoneTargetData>(me).and_then(|d| d.bone);
        instance.data_mut(me).has_error = bone.is_none();

        let Some(handle) = instance.output_pose_handle(me) else {
            return;
        };
        let Some(mut out) = instance.take_pose(handle) else {
            return;
        };
        if let Some(bone) = bone {
            if let Some(input) = instance.input_pose(&self.base, Self::INPUT_POSE) {
                out.copy_from(input);
            }
            out.set_local_transform(bone, self.target_transform(instance));
        }
        instance.restore_pose(handle, out);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub fn vector(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleAxis {
    X,
    Y,
    Z,
    #[default]
    All,
}

impl ScaleAxis {
    pub fn vector(self) -> Vec3 {
        match self {
            ScaleAxis::X => Vec3::X,
            ScaleAxis::Y => Vec3::Y,
            ScaleAxis::Z => Vec3::Z,
            ScaleAxis::All => Vec3::ONE,
        }
    }
}

/// Integrates translation, rotation and scale of one bone over time, driven by speed inputs.
#[derive(Clone, Debug)]
pub struct AccumTransformNode {
    base: NodeBase,
    target_bone: String,
    translation_axis: Axis,
    rotation_axis: Axis,
    scale_axis: ScaleAxis,
    translate_speed: f32,
    /// Full turns per second at input 1.
    rotate_speed: f32,
    scale_speed: f32,
}

impl AccumTransformNode {
    pub const INPUT_POSE: usize = 0;
    pub const INPUT_TRANSLATE_SPEED: usize = 1;
    pub const INPUT_ROTATE_SPEED: usize = 2;
    pub const INPUT_SCALE_SPEED: usize = 3;
    pub const OUTPUT_POSE: usize = 0;

    pub fn new(name: impl Into<String>, target_bone: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_input("Input Pose", PortKind::Pose)
                .with_input("Translation", PortKind::Number)
                .with_input("Rotation", PortKind::Number)
                .with_input("Scale", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_color(0xFFF2_A93B),
            target_bone: target_bone.into(),
            translation_axis: Axis::X,
            rotation_axis: Axis::Y,
            scale_axis: ScaleAxis::All,
            translate_speed: 1.0,
            rotate_speed: 1.0,
            scale_speed: 1.0,
        }
    }

    pub fn with_translation(mut self, axis: Axis, speed: f32) -> Self {
        self.translation_axis = axis;
        self.translate_speed = speed;
        self
    }

    pub fn with_rotation(mut self, axis: Axis, speed: f32) -> Self {
        self.rotation_axis = axis;
        self.rotate_speed = speed;
        self
    }

    pub fn with_scale(mut self, axis: ScaleAxis, speed: f32) -> Self {
        self.scale_axis = axis;
        self.scale_speed = speed;
        self
    }

    pub fn target_bone(&self) -> &str {
        &self.target_bone
    }
}

/// Accumulated offset of an [`AccumTransformNode`], kept across ticks.
#[derive(Debug)]
pub struct AccumTransformNodeData {
    pub(crate) bone: Option<usize>,
    pub(crate) additive: Transform,
    pub(crate) delta_time: f32,
}

impl Default for AccumTransformNodeData {
    fn default() -> Self {
        Self {
            bone: None,
            additive: Transform::ZERO_ADDITIVE,
            delta_time: 0.0,
        }
    }
}

impl AccumTransformNodeData {
    pub fn bone(&self) -> Option<usize> {
        self.bone
    }

    /// Position and scale offsets plus the accumulated rotation.
    pub fn additive(&self) -> Transform {
        self.additive
    }
}

impl UniqueData for AccumTransformNodeData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn save(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_transform(&self.additive)?;
        writer.write_f32(self.delta_time)
    }

    fn load(&mut self, reader: &mut ByteReader<'_>) -> Result<(), Error> {
        self.additive = reader.read_transform()?;
        self.delta_time = reader.read_f32()?;
        Ok(())
    }
}

impl AnimGraphNode for AccumTransformNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeAccumTransformNode"
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
        Some(Box::new(AccumTransformNodeData::default()))
    }

    fn init(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        let bone = resolve_bone(&self.base, instance, &self.target_bone);
        if let Some(data) = instance.unique_data_mut::<AccumTransformNodeData>(self.base.index()) {
            data.bone = bone;
        }
    }

    fn update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        default_update(graph, &self.base, instance, time_passed);
        if let Some(data) = instance.unique_data_mut::<AccumTransformNodeData>(self.base.index()) {
            data.delta_time = time_passed;
        }
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if self.base.is_disabled() {
            request_poses(&self.base, instance);
            return;
        }
        default_output(graph, &self.base, instance);
        request_poses(&self.base, instance);

        let me = self.base.index();
        let speed = |port: usize| instance.input_number(&self.base, port).unwrap_or(0.0);
        let translate = speed(Self::INPUT_TRANSLATE_SPEED) * self.translate_speed;
        let rotate = speed(Self::INPUT_ROTATE_SPEED) * self.rotate_speed;
        let scale = speed(Self::INPUT_SCALE_SPEED) * self.scale_speed;

        let target = instance
            .unique_data_mut::<AccumTransformNodeData>(me)
            .and_then(|data| {
                let bone = data.bone?;
                let dt = data.delta_time;
                data.additive.position += self.translation_axis.vector() * (translate * dt);
                let spin = Quat::from_axis_angle(
                    self.rotation_axis.vector(),
                    rotate * dt * std::f32::consts::TAU,
                );
                data.additive.rotation = (data.additive.rotation * spin).normalize();
                data.additive.scale += self.scale_axis.vector() * (scale * dt);
                Some((bone, data.additive))
            });
        instance.data_mut(me).has_error = target.is_none();

        let Some(handle) = instance.output_pose_handle(me) else {
            return;
        };
        let Some(mut out) = instance.take_pose(handle) else {
            return;
        };
        if let Some((bone, additive)) = target {
            if let Some(input) = instance.input_pose(&self.base, Self::INPUT_POSE) {
                out.copy_from(input);
            }
            if let Some(t) = out.local_transform_mut(bone) {
                t.position += additive.position;
                t.rotation = (t.rotation * additive.rotation).normalize();
                t.scale += additive.scale;
            }
        }
        instance.restore_pose(handle, out);
    }
}
