use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// IDs are process-global, monotonically increasing counters. Node ids survive graph clones and are
// what recorded history items refer to.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ANIM_GRAPH_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_ANIM_GRAPH_INSTANCE_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_ACTOR_INSTANCE_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_MOTION_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnimGraphId(pub u32);

impl AnimGraphId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ANIM_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnimGraphInstanceId(pub u32);

impl AnimGraphInstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ANIM_GRAPH_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActorInstanceId(pub u32);

impl ActorInstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ACTOR_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MotionId(pub u32);

impl MotionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MOTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Dense index of a node inside its anim graph. Also the slot of the node's unique data and flags
/// inside every instance of that graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);
