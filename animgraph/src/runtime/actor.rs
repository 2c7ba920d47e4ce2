use crate::{
    ActorInstanceId, AnimGraph, AnimGraphInstance, EventInfo, MotionSet, Pose, SkeletonData,
    Transform,
};
use std::sync::Arc;

/// One animated character: its skeleton, current pose, world placement and optional anim graph.
#[derive(Debug)]
pub struct ActorInstance {
    id: ActorInstanceId,
    skeleton: Arc<SkeletonData>,
    pose: Pose,
    local_transform: Transform,
    lod_level: usize,
    anim_graph_instance: Option<AnimGraphInstance>,
    events: Vec<EventInfo>,
}

impl ActorInstance {
    pub fn new(skeleton: Arc<SkeletonData>) -> Self {
        let pose = Pose::bind(&skeleton, 0);
        Self {
            id: ActorInstanceId::next(),
            skeleton,
            pose,
            local_transform: Transform::IDENTITY,
            lod_level: 0,
            anim_graph_instance: None,
            events: Vec::new(),
        }
    }

    pub fn with_anim_graph(
        mut self,
        graph: Arc<AnimGraph>,
        motion_set: Option<Arc<MotionSet>>,
    ) -> Self {
        let mut instance = AnimGraphInstance::new(graph, Arc::clone(&self.skeleton), motion_set);
        instance.set_lod_level(self.lod_level);
        self.anim_graph_instance = Some(instance);
        self
    }

    pub fn id(&self) -> ActorInstanceId {
        self.id
    }

    pub fn skeleton(&self) -> &Arc<SkeletonData> {
        &self.skeleton
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn pose_mut(&mut self) -> &mut Pose {
        &mut self.pose
    }

    pub fn local_transform(&self) -> Transform {
        self.local_transform
    }

    pub fn set_local_transform(&mut self, transform: Transform) {
        self.local_transform = transform;
    }

    pub fn lod_level(&self) -> usize {
        self.lod_level
    }

    pub fn set_lod_level(&mut self, lod_level: usize) {
        self.lod_level = lod_level;
        self.pose.init_from_bind(&self.skeleton, lod_level);
        if let Some(instance) = &mut self.anim_graph_instance {
            instance.set_lod_level(lod_level);
        }
    }

    pub fn anim_graph_instance(&self) -> Option<&AnimGraphInstance> {
        self.anim_graph_instance.as_ref()
    }

    pub fn anim_graph_instance_mut(&mut self) -> Option<&mut AnimGraphInstance> {
        self.anim_graph_instance.as_mut()
    }

    pub fn set_anim_graph_instance(&mut self, instance: Option<AnimGraphInstance>) {
        self.anim_graph_instance = instance;
    }

    /// Events of the last update.
    pub fn events(&self) -> &[EventInfo] {
        &self.events
    }

    /// Evaluates the anim graph into the current pose and moves the actor by the extracted root
    /// motion.
    pub fn update(&mut self, time_passed: f32) {
        let Some(instance) = &mut self.anim_graph_instance else {
            self.events.clear();
            return;
        };
        instance.evaluate(time_passed, &mut self.pose);
        let delta = instance.trajectory_delta();
        self.local_transform.position += self.local_transform.rotation * delta.position;
        self.local_transform.rotation =
            (self.local_transform.rotation * delta.rotation).normalize();
        self.events.clear();
        self.events.extend_from_slice(instance.events());
    }
}

/// Owns the actor instances of a scene. Handed by reference to whoever needs the registry.
#[derive(Debug, Default)]
pub struct ActorManager {
    actors: Vec<ActorInstance>,
}

impl ActorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, actor: ActorInstance) -> ActorInstanceId {
        let id = actor.id();
        self.actors.push(actor);
        id
    }

    pub fn remove(&mut self, id: ActorInstanceId) -> Option<ActorInstance> {
        let index = self.actors.iter().position(|a| a.id() == id)?;
        Some(self.actors.remove(index))
    }

    pub fn get(&self, id: ActorInstanceId) -> Option<&ActorInstance> {
        self.actors.iter().find(|a| a.id() == id)
    }

    pub fn get_mut(&mut self, id: ActorInstanceId) -> Option<&mut ActorInstance> {
        self.actors.iter_mut().find(|a| a.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActorInstance> {
        self.actors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActorInstance> {
        self.actors.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn update(&mut self, time_passed: f32) {
        for actor in &mut self.actors {
            actor.update(time_passed);
        }
    }
}
