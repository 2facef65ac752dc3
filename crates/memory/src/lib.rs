//! Memory implementations for stepwise agents.

pub mod sliding;
pub mod unconstrained;

pub use sliding::SlidingMemory;
pub use unconstrained::UnconstrainedMemory;
