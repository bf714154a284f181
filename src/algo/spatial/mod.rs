//! Spatial acceleration structures.
//!
//! - [`SpatialIndex`]: nearest triangle to a 3D point, with a filter predicate
//! - [`UvQuadtree`]: triangles overlapping a UV-space window
//! - [`VertexTree`]: nearest vertices and radius lookups (R-tree)

mod bvh;
mod quadtree;
mod vertex_tree;

pub use bvh::{Aabb, NearestTriangle, SpatialIndex};
pub use quadtree::{Aabb2, UvQuadtree, MAX_ELEMENTS, MIN_NODE_SIZE};
pub use vertex_tree::{IndexedPoint, VertexTree};
