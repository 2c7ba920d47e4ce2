use crate::{
    AnimGraph, AnimGraphInstance, AnimGraphNode, ByteReader, ByteWriter, Error, EventInfo,
    MotionId, MotionInstance, NodeBase, NodeCategory, ObjectFlags, OutputValue, PortKind,
    Transform, UniqueData, perform_output, perform_post_update, perform_top_down_update,
    perform_update, request_poses, request_ref_datas,
};
use std::any::Any;
use std::sync::Arc;

/// Plays one motion of the instance's motion set.
#[derive(Clone, Debug)]
pub struct MotionNode {
    base: NodeBase,
    motion: String,
    looping: bool,
    emit_events: bool,
    motion_extraction: bool,
    extraction_bone: usize,
    play_speed: f32,
}

impl MotionNode {
    pub const INPUT_PLAY_SPEED: usize = 0;
    pub const OUTPUT_POSE: usize = 0;
    pub const OUTPUT_MOTION: usize = 1;

    pub fn new(name: impl Into<String>, motion: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name)
                .with_input("Play Speed", PortKind::Number)
                .with_output("Output Pose", PortKind::Pose)
                .with_output("Motion", PortKind::Motion)
                .with_color(0xFF00_A8FF),
            motion: motion.into(),
            looping: true,
            emit_events: true,
            motion_extraction: false,
            extraction_bone: 0,
            play_speed: 1.0,
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_emit_events(mut self, emit_events: bool) -> Self {
        self.emit_events = emit_events;
        self
    }

    /// Extracts the root motion of `bone` as the trajectory delta and keeps that bone's position
    /// at its bind value in the output pose.
    pub fn with_motion_extraction(mut self, enabled: bool, bone: usize) -> Self {
        self.motion_extraction = enabled;
        self.extraction_bone = bone;
        self
    }

    pub fn with_play_speed(mut self, play_speed: f32) -> Self {
        self.play_speed = play_speed;
        self
    }

    pub fn motion(&self) -> &str {
        &self.motion
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn emits_events(&self) -> bool {
        self.emit_events
    }

    pub fn has_motion_extraction(&self) -> bool {
        self.motion_extraction
    }

    pub fn play_speed(&self) -> f32 {
        self.play_speed
    }
}

#[derive(Debug, Default)]
pub struct MotionNodeData {
    pub(crate) motion_instance: Option<MotionInstance>,
    pub(crate) events: Vec<EventInfo>,
    pub(crate) trajectory_delta: Transform,
}

impl MotionNodeData {
    pub fn motion_instance(&self) -> Option<&MotionInstance> {
        self.motion_instance.as_ref()
    }

    pub fn motion_instance_mut(&mut self) -> Option<&mut MotionInstance> {
        self.motion_instance.as_mut()
    }
}

impl UniqueData for MotionNodeData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn save(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        let (current, last, loops, speed) = match &self.motion_instance {
            Some(mi) => (mi.current_time(), mi.last_time(), mi.num_loops(), mi.play_speed()),
            None => (0.0, 0.0, 0, 1.0),
        };
        writer.write_bool(self.motion_instance.is_some())?;
        writer.write_f32(current)?;
        writer.write_f32(last)?;
        writer.write_u32(loops)?;
        writer.write_f32(speed)?;
        writer.write_transform(&self.trajectory_delta)
    }

    fn load(&mut self, reader: &mut ByteReader<'_>) -> Result<(), Error> {
        let had_instance = reader.read_bool()?;
        let current = reader.read_f32()?;
        let last = reader.read_f32()?;
        let loops = reader.read_u32()?;
        let speed = reader.read_f32()?;
        self.trajectory_delta = reader.read_transform()?;
        if let (true, Some(mi)) = (had_instance, self.motion_instance.as_mut()) {
            mi.restore_state(current, last, loops);
            mi.set_play_speed(speed);
        }
        Ok(())
    }
}

impl AnimGraphNode for MotionNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn type_name(&self) -> &'static str {
        "AnimGraphMotionNode"
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Sources
    }

    fn can_act_as_state(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn create_unique_data(&self) -> Option<Box<dyn UniqueData>> {
        Some(Box::new(MotionNodeData::default()))
    }

    fn init(&self, _graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        let me = self.base.index();
        let motion = instance
            .motion_set()
            .and_then(|set| set.find(&self.motion))
            .cloned();
        let Some(motion) = motion else {
            tracing::warn!(
                node = %self.base.name(),
                motion = %self.motion,
                "motion not found in motion set"
            );
            if let Some(data) = instance.unique_data_mut::<MotionNodeData>(me) {
                data.motion_instance = None;
            }
            instance.data_mut(me).has_error = true;
            return;
        };

        let duration = motion.duration();
        let sync_track = motion.sync_track().cloned();
        if let Some(data) = instance.unique_data_mut::<MotionNodeData>(me) {
            let keep = data
                .motion_instance
                .as_ref()
                .is_some_and(|mi| mi.motion().id() == motion.id());
            if !keep {
                let mut mi = MotionInstance::new(motion);
                mi.set_looping(self.looping);
                data.motion_instance = Some(mi);
            }
        }
        let data = instance.data_mut(me);
        data.has_error = false;
        data.duration = duration;
        data.sync_track = sync_track;
        data.set_output(Self::OUTPUT_MOTION, OutputValue::Motion(me));
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
        if let Some(speed) = self.base.input_source(Self::INPUT_PLAY_SPEED) {
            perform_top_down_update(graph, instance, speed, time_passed);
        }
    }

    fn update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        if self.base.is_disabled() {
            return;
        }
        if let Some(speed) = self.base.input_source(Self::INPUT_PLAY_SPEED) {
            perform_update(graph, instance, speed, time_passed);
        }

        let me = self.base.index();
        let resync = instance.is_resync(me);
        let input_speed = instance
            .input_number(&self.base, Self::INPUT_PLAY_SPEED)
            .unwrap_or(1.0);
        let (speed, global_weight, local_weight) = {
            let data = instance.data(me);
            (
                data.play_speed * self.play_speed * input_speed,
                data.global_weight,
                data.local_weight,
            )
        };
        instance.set_object_flags(me, ObjectFlags::PLAY_BACKWARD, speed < 0.0);

        let skeleton = Arc::clone(instance.skeleton());
        let timing = instance.unique_data_mut::<MotionNodeData>(me).and_then(|node_data| {
            node_data.events.clear();
            node_data.trajectory_delta = Transform::IDENTITY;
            let mi = node_data.motion_instance.as_mut()?;
            mi.set_play_speed(speed);
            mi.set_looping(self.looping);
            mi.update(time_passed);

            // A freshly activated subtree must not jump or replay events on its first frame.
            if !resync {
                if self.emit_events {
                    mi.extract_events(&mut node_data.events);
                    for event in &mut node_data.events {
                        event.emitter = Some(me);
                        event.global_weight = global_weight;
                        event.local_weight = local_weight;
                    }
                }
                if self.motion_extraction {
                    node_data.trajectory_delta = mi.extract_motion(&skeleton, self.extraction_bone);
                }
            }
            Some((mi.current_time(), mi.duration(), mi.motion().sync_track().cloned()))
        });

        let data = instance.data_mut(me);
        match timing {
            Some((current_time, duration, sync_track)) => {
                data.current_time = current_time;
                data.duration = duration;
                data.sync_track = sync_track;
            }
            None => data.has_error = true,
        }
        data.set_output(Self::OUTPUT_MOTION, OutputValue::Motion(me));
    }

    fn output(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance) {
        request_poses(&self.base, instance);
        if self.base.is_disabled() {
            return;
        }
        if let Some(speed) = self.base.input_source(Self::INPUT_PLAY_SPEED) {
            perform_output(graph, instance, speed);
        }

        let me = self.base.index();
        let Some(handle) = instance.output_pose_handle(me) else {
            return;
        };
        let Some(mut pose) = instance.take_pose(handle) else {
            return;
        };
        let skeleton = Arc::clone(instance.skeleton());
        let sampled = match instance
            .unique_data::<MotionNodeData>(me)
            .and_then(|d| d.motion_instance.as_ref())
        {
            Some(mi) => {
                mi.sample_pose(&skeleton, &mut pose);
                true
            }
            None => false,
        };
        if sampled && self.motion_extraction {
            if let (Some(bind), Some(t)) = (
                skeleton.bones.get(self.extraction_bone),
                pose.local_transform_mut(self.extraction_bone),
            ) {
                t.position = bind.bind.position;
            }
        }
        instance.restore_pose(handle, pose);
        if !sampled {
            instance.data_mut(me).has_error = true;
        }
    }

    fn post_update(&self, graph: &AnimGraph, instance: &mut AnimGraphInstance, time_passed: f32) {
        request_ref_datas(&self.base, instance);
        if self.base.is_disabled() {
            return;
        }
        if let Some(speed) = self.base.input_source(Self::INPUT_PLAY_SPEED) {
            perform_post_update(graph, instance, speed, time_passed);
        }

        let me = self.base.index();
        let (mut events, trajectory_delta) = match instance.unique_data_mut::<MotionNodeData>(me) {
            Some(data) => (std::mem::take(&mut data.events), data.trajectory_delta),
            None => return,
        };
        if let Some(out) = instance.ref_data_mut(me) {
            std::mem::swap(&mut out.events, &mut events);
            out.trajectory_delta = trajectory_delta;
        }
        // Hand the spare buffer back so its capacity is reused next tick.
        if let Some(data) = instance.unique_data_mut::<MotionNodeData>(me) {
            events.clear();
            data.events = events;
        }
    }

    fn set_current_play_time(&self, instance: &mut AnimGraphInstance, time: f32) {
        let me = self.base.index();
        instance.data_mut(me).current_time = time;
        if let Some(mi) = instance
            .unique_data_mut::<MotionNodeData>(me)
            .and_then(|d| d.motion_instance.as_mut())
        {
            mi.set_current_time(time, false);
        }
    }

    fn history_motion(&self, instance: &AnimGraphInstance) -> Option<(MotionId, String)> {
        let mi = instance
            .unique_data::<MotionNodeData>(self.base.index())?
            .motion_instance
            .as_ref()?;
        Some((mi.motion().id(), mi.motion().name().to_string()))
    }
}
