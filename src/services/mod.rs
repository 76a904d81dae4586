//! Room synchronization services.
//!
//! Leaf-first: `log` and `dispatch` are plain data structures, `presence`
//! turns membership changes into frames, `room` is the actor that owns all
//! three per room, and `registry` maps connections to rooms.

pub mod dispatch;
pub mod log;
pub mod presence;
pub mod registry;
pub mod room;
