mod blend2;
mod blend_n;
mod blend_tree;
mod morph_target;
mod motion_frame;
mod motion_node;
mod parameter;
mod pose_switch;
mod transform;

pub use blend2::{BLEND_EPSILON, Blend2Node, Blend2NodeData, BlendNodes};
pub use blend_n::*;
pub use blend_tree::*;
pub use morph_target::*;
pub use motion_frame::*;
pub use motion_node::*;
pub use parameter::*;
pub use pose_switch::*;
pub use transform::*;

#[cfg(test)]
mod blend2_tests;


#[cfg(test)]
mod motion_frame_tests;


#[cfg(test)]
mod controller_tests;
