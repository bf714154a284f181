//! Deformation transfer algorithms.
//!
//! - **Correspondence**: target-to-source vertex pairing with a normal gate
//! - **Projection**: carrying delta sets across topologies, with smoothing
//!   and weld-group consistency
//! - **LOD retargeting**: barycentric transfer onto a lower level of detail
//! - **Diffing**: sparse deltas between two poses, plus merge and rescale
//! - **Resolution**: turning a meta-morph file into morph targets of a mesh
//!
//! Everything here is a pure function of its inputs. "Nothing found" is
//! reported as an empty delta set or an invalid match, never as an error.

pub mod correspond;
pub mod diff;
pub mod geometry;
pub mod lod;
pub mod parallel;
pub mod project;
pub mod resolve;
pub mod spatial;
pub mod weld;
