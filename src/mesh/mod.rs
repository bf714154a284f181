//! Core mesh data structures.
//!
//! # Overview
//!
//! The primary type is [`TriMesh`], an indexed triangle mesh that keeps
//! render-mesh quirks intact: seam-duplicated vertices, unreferenced
//! vertices, removed-vertex holes, per-corner UVs and per-triangle
//! materials.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`FaceId`] - Identifies a triangle
//!
//! These indices are generic over the underlying integer type ([`MeshIndex`] trait),
//! allowing you to choose `u16`, `u32`, or `u64` based on mesh size.
//!
//! # Construction
//!
//! ```
//! use remorph::mesh::{TriMesh, build_from_triangles};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: TriMesh = build_from_triangles(&vertices, &faces).unwrap();
//! ```

mod builder;
mod index;
mod trimesh;

pub use builder::{build_from_triangles, to_face_vertex};
pub use index::{FaceId, MeshIndex, VertexId};
pub use trimesh::{TriMesh, Triangle, Vertex};
