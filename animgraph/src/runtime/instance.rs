use crate::{
    AnimGraph, AnimGraphInstanceId, ByteReader, ByteWriter, Error, EventInfo, MotionSet, NodeBase,
    NodeData, NodeIndex, OutputValue, ParameterValue, Pool, PoolHandle, Pose, RefCountedData,
    SkeletonData, Transform, UniqueData, decrease_ref, decrease_ref_data_ref, perform_output,
    perform_post_update, perform_top_down_update, perform_update,
};
use glam::{Quat, Vec2, Vec3, Vec4};
use std::sync::Arc;

bitflags::bitflags! {
    /// Per-node evaluation state inside one instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u16 {
        const OUTPUT_READY = 1 << 0;
        const UPDATE_READY = 1 << 1;
        const TOPDOWNUPDATE_READY = 1 << 2;
        const POSTUPDATE_READY = 1 << 3;
        const SYNCED = 1 << 4;
        const RESYNC = 1 << 5;
        const IS_SYNCMASTER = 1 << 6;
        const PLAY_BACKWARD = 1 << 7;
        const SYNCINDEX_CHANGED = 1 << 8;
    }
}

impl ObjectFlags {
    /// Flags that only describe the current tick.
    pub const PER_TICK: ObjectFlags = ObjectFlags::OUTPUT_READY
        .union(ObjectFlags::UPDATE_READY)
        .union(ObjectFlags::TOPDOWNUPDATE_READY)
        .union(ObjectFlags::POSTUPDATE_READY)
        .union(ObjectFlags::SYNCED)
        .union(ObjectFlags::RESYNC)
        .union(ObjectFlags::IS_SYNCMASTER)
        .union(ObjectFlags::SYNCINDEX_CHANGED);
}

/// Receives the root events of an instance after every post-update.
pub trait AnimGraphEventHandler: Send {
    fn on_event(&mut self, instance: AnimGraphInstanceId, event: &EventInfo);
}

/// Per-actor evaluation state of a shared [`AnimGraph`].
pub struct AnimGraphInstance {
    id: AnimGraphInstanceId,
    graph: Arc<AnimGraph>,
    skeleton: Arc<SkeletonData>,
    motion_set: Option<Arc<MotionSet>>,
    lod_level: usize,
    parameters: Vec<ParameterValue>,
    node_data: Vec<NodeData>,
    flags: Vec<ObjectFlags>,
    poses: Pool<Pose>,
    ref_datas: Pool<RefCountedData>,
    bind_pose: Pose,
    events: Vec<EventInfo>,
    trajectory_delta: Transform,
    event_handlers: Vec<Box<dyn AnimGraphEventHandler>>,
}

impl std::fmt::Debug for AnimGraphInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimGraphInstance")
            .field("id", &self.id)
            .field("graph", &self.graph.name())
            .field("lod_level", &self.lod_level)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl AnimGraphInstance {
    pub fn new(
        graph: Arc<AnimGraph>,
        skeleton: Arc<SkeletonData>,
        motion_set: Option<Arc<MotionSet>>,
    ) -> Self {
        let node_data = graph
            .nodes()
            .map(|node| NodeData::new(node.base().outputs().len(), node.create_unique_data()))
            .collect();
        let parameters = graph.parameters().iter().map(|p| p.default).collect();
        let bind_pose = Pose::bind(&skeleton, 0);

        let mut instance = Self {
            id: AnimGraphInstanceId::next(),
            flags: vec![ObjectFlags::empty(); graph.num_nodes()],
            graph,
            skeleton,
            motion_set,
            lod_level: 0,
            parameters,
            node_data,
            poses: Pool::new(),
            ref_datas: Pool::new(),
            bind_pose,
            events: Vec::new(),
            trajectory_delta: Transform::IDENTITY,
            event_handlers: Vec::new(),
        };
        instance.init_nodes();
        tracing::debug!(
            instance = instance.id.0,
            graph = %instance.graph.name(),
            nodes = instance.node_data.len(),
            "created anim graph instance"
        );
        instance
    }

    fn init_nodes(&mut self) {
        let graph = Arc::clone(&self.graph);
        for node in graph.nodes() {
            node.init(&graph, self);
        }
    }

    pub fn id(&self) -> AnimGraphInstanceId {
        self.id
    }

    pub fn graph(&self) -> &Arc<AnimGraph> {
        &self.graph
    }

    pub fn skeleton(&self) -> &Arc<SkeletonData> {
        &self.skeleton
    }

    pub fn motion_set(&self) -> Option<&Arc<MotionSet>> {
        self.motion_set.as_ref()
    }

    /// Swaps the motion set and lets every node re-resolve its motions.
    pub fn set_motion_set(&mut self, motion_set: Option<Arc<MotionSet>>) {
        self.motion_set = motion_set;
        self.init_nodes();
    }

    pub fn lod_level(&self) -> usize {
        self.lod_level
    }

    pub fn set_lod_level(&mut self, lod_level: usize) {
        if self.lod_level == lod_level {
            return;
        }
        self.lod_level = lod_level;
        self.bind_pose.init_from_bind(&self.skeleton, lod_level);
    }

    pub fn bind_pose(&self) -> &Pose {
        &self.bind_pose
    }

    pub fn events(&self) -> &[EventInfo] {
        &self.events
    }

    pub fn trajectory_delta(&self) -> Transform {
        self.trajectory_delta
    }

    pub fn add_event_handler<H: AnimGraphEventHandler + 'static>(&mut self, handler: H) {
        self.event_handlers.push(Box::new(handler));
    }

    // Parameters

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_values(&self) -> &[ParameterValue] {
        &self.parameters
    }

    pub fn find_parameter_index(&self, name: &str) -> Option<usize> {
        self.graph.find_parameter_index(name)
    }

    pub fn parameter_value(&self, index: usize) -> Option<ParameterValue> {
        self.parameters.get(index).copied()
    }

    pub fn parameter_value_by_name(&self, name: &str) -> Option<ParameterValue> {
        self.parameter_value(self.find_parameter_index(name)?)
    }

    /// Float, int and bool parameters all read as a float.
    pub fn float_parameter_value(&self, name: &str) -> Option<f32> {
        self.parameter_value_by_name(name)?.as_number()
    }

    pub fn float_parameter_value_by_index(&self, index: usize) -> Option<f32> {
        self.parameter_value(index)?.as_number()
    }

    pub fn int_parameter_value(&self, name: &str) -> Option<i32> {
        match self.parameter_value_by_name(name)? {
            ParameterValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn bool_parameter_value(&self, name: &str) -> Option<bool> {
        match self.parameter_value_by_name(name)? {
            ParameterValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn vector2_parameter_value(&self, name: &str) -> Option<Vec2> {
        match self.parameter_value_by_name(name)? {
            ParameterValue::Vector2(v) => Some(v),
            _ => None,
        }
    }

    pub fn vector3_parameter_value(&self, name: &str) -> Option<Vec3> {
        match self.parameter_value_by_name(name)? {
            ParameterValue::Vector3(v) => Some(v),
            _ => None,
        }
    }

    pub fn vector4_parameter_value(&self, name: &str) -> Option<Vec4> {
        match self.parameter_value_by_name(name)? {
            ParameterValue::Vector4(v) => Some(v),
            _ => None,
        }
    }

    pub fn rotation_parameter_value(&self, name: &str) -> Option<Quat> {
        match self.parameter_value_by_name(name)? {
            ParameterValue::Rotation(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_parameter_value(&mut self, name: &str, value: ParameterValue) -> Result<(), Error> {
        let index = self
            .find_parameter_index(name)
            .ok_or_else(|| Error::UnknownParameter {
                name: name.to_string(),
            })?;
        self.set_parameter_value_by_index(index, value)
    }

    pub fn set_parameter_value_by_index(
        &mut self,
        index: usize,
        value: ParameterValue,
    ) -> Result<(), Error> {
        let Some(current) = self.parameters.get_mut(index) else {
            return Err(Error::UnknownParameter {
                name: format!("#{index}"),
            });
        };
        if !current.same_type(&value) {
            return Err(Error::ParameterTypeMismatch {
                name: self.graph.parameters()[index].name.clone(),
                expected: current.type_name(),
                actual: value.type_name(),
            });
        }
        *current = value;
        Ok(())
    }

    pub fn set_float_parameter(&mut self, name: &str, value: f32) -> Result<(), Error> {
        self.set_parameter_value(name, ParameterValue::Float(value))
    }

    pub fn set_int_parameter(&mut self, name: &str, value: i32) -> Result<(), Error> {
        self.set_parameter_value(name, ParameterValue::Int(value))
    }

    pub fn set_bool_parameter(&mut self, name: &str, value: bool) -> Result<(), Error> {
        self.set_parameter_value(name, ParameterValue::Bool(value))
    }

    // Per-node state

    pub fn node_data(&self, node: NodeIndex) -> Option<&NodeData> {
        self.node_data.get(node.0)
    }

    pub(crate) fn data(&self, node: NodeIndex) -> &NodeData {
        &self.node_data[node.0]
    }

    pub(crate) fn data_mut(&mut self, node: NodeIndex) -> &mut NodeData {
        &mut self.node_data[node.0]
    }

    pub fn unique_data<T: UniqueData + 'static>(&self, node: NodeIndex) -> Option<&T> {
        self.node_data
            .get(node.0)?
            .custom
            .as_deref()?
            .as_any()
            .downcast_ref::<T>()
    }

    pub fn unique_data_mut<T: UniqueData + 'static>(&mut self, node: NodeIndex) -> Option<&mut T> {
        self.node_data
            .get_mut(node.0)?
            .custom
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    pub(crate) fn inherit_timing(&mut self, target: NodeIndex, source: NodeIndex) {
        if target == source {
            return;
        }
        let timing = self.node_data[source.0].timing();
        self.node_data[target.0].inherit_timing(&timing);
    }

    /// Number currently on the output feeding `port` of `node`, when that port is connected.
    pub fn input_number(&self, node: &NodeBase, port: usize) -> Option<f32> {
        let connection = node.inputs().get(port)?.connection?;
        match self.data(connection.source).output(connection.source_port) {
            OutputValue::Number(value) => Some(value),
            _ => None,
        }
    }

    /// Pose currently on the output feeding `port` of `node`.
    pub fn input_pose(&self, node: &NodeBase, port: usize) -> Option<&Pose> {
        let connection = node.inputs().get(port)?.connection?;
        match self.data(connection.source).output(connection.source_port) {
            OutputValue::Pose(handle) => self.poses.get(handle),
            _ => None,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.node_data.len()
    }

    /// Writes the state of one node. Used by the recorder.
    pub fn save_node_state(
        &self,
        node: NodeIndex,
        writer: &mut ByteWriter<'_>,
    ) -> Result<(), Error> {
        self.node_data
            .get(node.0)
            .ok_or(Error::InvalidNodeIndex { index: node.0 })?
            .save(writer)
    }

    pub fn load_node_state(
        &mut self,
        node: NodeIndex,
        reader: &mut ByteReader<'_>,
    ) -> Result<(), Error> {
        self.node_data
            .get_mut(node.0)
            .ok_or(Error::InvalidNodeIndex { index: node.0 })?
            .load(reader)
    }

    // Flags

    pub fn object_flags(&self, node: NodeIndex) -> ObjectFlags {
        self.flags.get(node.0).copied().unwrap_or_default()
    }

    pub fn is_object_flag_enabled(&self, node: NodeIndex, flag: ObjectFlags) -> bool {
        self.object_flags(node).contains(flag)
    }

    pub fn enable_object_flags(&mut self, node: NodeIndex, flags: ObjectFlags) {
        if let Some(f) = self.flags.get_mut(node.0) {
            f.insert(flags);
        }
    }

    pub fn disable_object_flags(&mut self, node: NodeIndex, flags: ObjectFlags) {
        if let Some(f) = self.flags.get_mut(node.0) {
            f.remove(flags);
        }
    }

    pub fn set_object_flags(&mut self, node: NodeIndex, flags: ObjectFlags, enabled: bool) {
        if let Some(f) = self.flags.get_mut(node.0) {
            f.set(flags, enabled);
        }
    }

    pub fn is_output_ready(&self, node: NodeIndex) -> bool {
        self.is_object_flag_enabled(node, ObjectFlags::OUTPUT_READY)
    }

    pub fn is_update_ready(&self, node: NodeIndex) -> bool {
        self.is_object_flag_enabled(node, ObjectFlags::UPDATE_READY)
    }

    pub fn is_synced(&self, node: NodeIndex) -> bool {
        self.is_object_flag_enabled(node, ObjectFlags::SYNCED)
    }

    pub fn is_resync(&self, node: NodeIndex) -> bool {
        self.is_object_flag_enabled(node, ObjectFlags::RESYNC)
    }

    // Pools

    /// Hands out a pose initialized to the bind pose of the current LOD.
    pub fn request_pose(&mut self) -> PoolHandle {
        let handle = self.poses.request();
        if let Some(pose) = self.poses.get_mut(handle) {
            pose.init_from_bind(&self.skeleton, self.lod_level);
        }
        handle
    }

    pub fn free_pose(&mut self, handle: PoolHandle) {
        if !self.poses.free(handle) {
            tracing::warn!(slot = handle.0, "freeing a pose that is not in use");
        }
    }

    pub fn pose(&self, handle: PoolHandle) -> Option<&Pose> {
        self.poses.get(handle)
    }

    pub fn pose_mut(&mut self, handle: PoolHandle) -> Option<&mut Pose> {
        self.poses.get_mut(handle)
    }

    /// Moves a pooled pose out so it can be edited while other poses are read.
    pub fn take_pose(&mut self, handle: PoolHandle) -> Option<Pose> {
        self.poses.take(handle)
    }

    pub fn restore_pose(&mut self, handle: PoolHandle, pose: Pose) {
        self.poses.restore(handle, pose);
    }

    pub fn num_used_poses(&self) -> usize {
        self.poses.num_used()
    }

    pub fn num_used_ref_datas(&self) -> usize {
        self.ref_datas.num_used()
    }

    /// First pose output of `node`, when one is currently allocated.
    pub fn output_pose_handle(&self, node: NodeIndex) -> Option<PoolHandle> {
        self.data(node).outputs.iter().find_map(|o| match o {
            OutputValue::Pose(handle) => Some(*handle),
            _ => None,
        })
    }

    pub fn output_pose(&self, node: NodeIndex) -> Option<&Pose> {
        self.poses.get(self.output_pose_handle(node)?)
    }

    pub(crate) fn request_ref_data(&mut self, node: NodeIndex) {
        if let Some(old) = self.node_data[node.0].ref_data.take() {
            self.ref_datas.free(old);
        }
        let handle = self.ref_datas.request();
        if let Some(data) = self.ref_datas.get_mut(handle) {
            data.clear();
        }
        self.node_data[node.0].ref_data = Some(handle);
    }

    pub(crate) fn free_ref_data(&mut self, node: NodeIndex) {
        if let Some(handle) = self.node_data[node.0].ref_data.take() {
            self.ref_datas.free(handle);
        }
    }

    pub fn ref_data(&self, node: NodeIndex) -> Option<&RefCountedData> {
        self.ref_datas.get(self.node_data.get(node.0)?.ref_data?)
    }

    pub fn ref_data_mut(&mut self, node: NodeIndex) -> Option<&mut RefCountedData> {
        let handle = self.node_data.get(node.0)?.ref_data?;
        self.ref_datas.get_mut(handle)
    }

    pub(crate) fn copy_ref_data(&mut self, target: NodeIndex, source: NodeIndex) {
        let (Some(src), Some(dst)) = (
            self.node_data[source.0].ref_data,
            self.node_data[target.0].ref_data,
        ) else {
            return;
        };
        if src == dst {
            return;
        }
        let Some(copy) = self.ref_datas.take(src) else {
            return;
        };
        if let Some(out) = self.ref_datas.get_mut(dst) {
            out.copy_from(&copy);
        }
        self.ref_datas.restore(src, copy);
    }

    // Evaluation

    /// Clears every per-tick flag and reference count. Leftover pool entries at this point mean a
    /// node broke the reference-count contract.
    pub fn reset_flags_for_all_objects(&mut self) {
        if self.poses.num_used() != 0 || self.ref_datas.num_used() != 0 {
            tracing::warn!(
                instance = self.id.0,
                poses = self.poses.num_used(),
                ref_datas = self.ref_datas.num_used(),
                "pool entries leaked from the previous tick"
            );
            self.poses.free_all();
            self.ref_datas.free_all();
        }
        for flags in &mut self.flags {
            flags.remove(ObjectFlags::PER_TICK);
        }
        for data in &mut self.node_data {
            data.reset_tick();
        }
    }

    pub fn top_down_update(&mut self, time_passed: f32) {
        let graph = Arc::clone(&self.graph);
        let root = graph.root();
        let data = self.data_mut(root);
        data.global_weight = 1.0;
        data.local_weight = 1.0;
        perform_top_down_update(&graph, self, root, time_passed);
    }

    pub fn update(&mut self, time_passed: f32) {
        let graph = Arc::clone(&self.graph);
        let root = graph.root();
        let data = self.data_mut(root);
        data.pose_ref_count += 1;
        data.ref_data_ref_count += 1;
        perform_update(&graph, self, root, time_passed);
    }

    /// Produces the root pose into `out` and releases it back to the pool.
    pub fn output(&mut self, out: &mut Pose) {
        let graph = Arc::clone(&self.graph);
        let root = graph.root();
        perform_output(&graph, self, root);
        match self.output_pose(root) {
            Some(pose) => out.copy_from(pose),
            None => out.copy_from(&self.bind_pose),
        }
        decrease_ref(self, root);
    }

    pub fn post_update(&mut self, time_passed: f32) {
        let graph = Arc::clone(&self.graph);
        let root = graph.root();
        perform_post_update(&graph, self, root, time_passed);

        let mut events = std::mem::take(&mut self.events);
        events.clear();
        let trajectory_delta = match self.ref_data(root) {
            Some(data) => {
                events.extend_from_slice(&data.events);
                data.trajectory_delta
            }
            None => Transform::IDENTITY,
        };
        self.events = events;
        self.trajectory_delta = trajectory_delta;
        decrease_ref_data_ref(self, root);

        if !self.event_handlers.is_empty() {
            let id = self.id;
            for event in &self.events {
                for handler in &mut self.event_handlers {
                    handler.on_event(id, event);
                }
            }
        }
    }

    /// One full tick: reset, top-down, update, output, post-update.
    pub fn evaluate(&mut self, time_passed: f32, out: &mut Pose) {
        self.reset_flags_for_all_objects();
        self.top_down_update(time_passed);
        self.update(time_passed);
        self.output(out);
        self.post_update(time_passed);
    }

    /// Output-ready nodes of this tick, walked down the container hierarchy from the root.
    pub fn recursive_collect_active_nodes(&self) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        self.collect_active(self.graph.root(), &mut out);
        out
    }

    fn collect_active(&self, node: NodeIndex, out: &mut Vec<NodeIndex>) {
        if !self.is_output_ready(node) || out.contains(&node) {
            return;
        }
        out.push(node);
        for &child in self.graph.node_at(node).base().children() {
            self.collect_active(child, out);
        }
    }
}
