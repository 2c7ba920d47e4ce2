//! Blend-graph animation runtime.
//!
//! An [`AnimGraph`] is a shared, immutable node graph. Every actor evaluates it through its own
//! [`AnimGraphInstance`], which owns the per-node state and runs the four tick phases. The
//! [`Recorder`] captures actors and their graph state for scrubbing and replay.

#![forbid(unsafe_code)]

mod codec;
mod error;
mod geometry;
mod ids;
mod key_track;
mod model;
mod motion;
mod recorder;
mod runtime;
mod sync_track;

#[cfg(feature = "json")]
pub mod json;

pub use codec::*;
pub use error::*;
pub use geometry::*;
pub use ids::*;
pub use key_track::*;
pub use model::*;
pub use motion::*;
pub use recorder::*;
pub use runtime::*;
pub use sync_track::*;






#[cfg(all(test, feature = "json"))]
mod json_tests;
