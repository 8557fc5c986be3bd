//! Spatial queries over soldier positions

pub mod index;
pub mod quadtree;

pub use index::SpatialIndex;
pub use quadtree::{QuadEntry, QuadTree};
