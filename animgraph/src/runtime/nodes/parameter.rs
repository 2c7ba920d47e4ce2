use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, NodeBase, NodeCategory, OutputValue, PortKind,
};
use std::any::Any;

/// Publishes the value of one anim-graph parameter on a number port.
///
/// Values are refreshed in every phase so consumers see the current tick's value even during the
/// top-down pass.
#[derive(Clone, Debug)]
pub struct ParameterNode {
    base: NodeBase,
    parameter: String,
}

impl ParameterNode {
    pub const OUTPUT_VALUE: usize = 0;

    pub fn new(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_output("Value", PortKind::Number)
                .with_color(0xFF8F_C1D1),
            parameter: parameter.into(),
        }
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    fn refresh(&self, instance: &mut AnimGraphInstance) {
        let value = instance.float_parameter_value(&self.parameter);
        let data = instance.data_mut(self.base.index());
        data.has_error = value.is_none();
        data.set_output(
            Self::OUTPUT_VALUE,
            value.map_or(OutputValue::None, OutputValue::Number),
        );
    }
}

impl AnimGraphNode for ParameterNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeParameterNode"
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

    fn init(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        if instance.find_parameter_index(&self.parameter).is_none() {
            tracing::warn!(
                node = %self.base.name(),
                parameter = %self.parameter,
                "parameter not found"
            );
        }
        self.refresh(instance);
    }

    fn top_down_update(
        &self,
        _graph: &AnimGraph,
        instance: &mut AnimGraphInstance,
        _time_passed: f32,
    ) {
        self.refresh(instance);
    }

    fn update(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance, _time_passed: f32) {
        self.refresh(instance);
    }

    fn output(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        self.refresh(instance);
    }
}

/// Publishes a fixed number.
#[derive(Clone, Debug)]
pub struct FloatConstantNode {
    base: NodeBase,
    value: f32,
}

impl FloatConstantNode {
    pub const OUTPUT_VALUE: usize = 0;

    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_output("Value", PortKind::Number)
                .with_color(0xFF8F_C1D1),
            value,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    fn publish(&self, instance: &mut AnimGraphInstance) {
        instance
            .data_mut(self.base.index())
            .set_output(Self::OUTPUT_VALUE, OutputValue::Number(self.value));
    }
}

impl AnimGraphNode for FloatConstantNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "BlendTreeFloatConstantNode"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Math
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn init(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        self.publish(instance);
    }

    fn top_down_update(
        &self,
        _graph: &AnimGraph,
        instance: &mut AnimGraphInstance,
        _time_passed: f32,
    ) {
        self.publish(instance);
    }

    fn update(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance, _time_passed: f32) {
        self.publish(instance);
    }
}
