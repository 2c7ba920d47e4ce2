mod actor;
mod event;
mod graph;
mod instance;
mod motion_instance;
mod node;
mod nodes;
mod pool;
mod pose;
mod unique_data;

pub use actor::*;
pub use event::*;
pub use graph::*;
pub use instance::*;
pub use motion_instance::*;
pub use node::*;
pub use nodes::*;
pub use pool::*;
pub use pose::*;
pub use unique_data::*;

#[cfg(test)]
pub(crate) mod test_fixtures;


#[cfg(test)]
mod motion_instance_tests;

#[cfg(test)]
mod graph_tests;

#[cfg(test)]
mod instance_tests;
