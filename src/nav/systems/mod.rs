//! Pipeline stage systems, one module per stage.
//!
//! Stage logic that does not need the ECS lives in plain functions next to
//! the system that calls it, written against [`SpatialQuery`] rather than a
//! concrete provider.
//!
//! [`SpatialQuery`]: crate::nav::physics::SpatialQuery

pub mod control;
pub mod destination;
pub mod frames;
pub mod input;
pub mod interpolation;
pub mod planning;
pub mod steering;
pub mod surface;
