//! # Remorph
//!
//! Deformation transfer between triangle meshes of different topology.
//!
//! Remorph carries morph targets (sparse per-vertex delta sets) from the mesh
//! they were authored on to other meshes of the same character: a re-topologized
//! head, a garment, or a lower level of detail. It keeps render-mesh quirks
//! intact: seam-duplicated vertices receive identical deltas and removed or
//! unreferenced vertices are skipped.
//!
//! ## Features
//!
//! - **Correspondence**: nearest compatible source vertex per target vertex,
//!   gated by distance and normal agreement
//! - **Projection**: delta transfer with Laplacian smoothing, weld-group
//!   consistency and a global multiplier
//! - **LOD retargeting**: UV-guided barycentric matching onto a lower LOD
//! - **Diffing**: sparse deltas between two poses of one mesh
//! - **Meta-morph files**: a text format bundling a base mesh, morph targets
//!   and mesh-specific fixes
//!
//! ## Quick Start
//!
//! ```no_run
//! use remorph::prelude::*;
//! use remorph::algo::project::project_deltas;
//!
//! let meta: remorph::io::metamorph::MetaMorph = remorph::io::load("head.metamorph").unwrap();
//! let source = meta.base_mesh().unwrap();
//! let target: TriMesh = remorph::io::load_mesh("helmet.metamorph").unwrap();
//!
//! let config = TransferConfig::default().with_smoothing(2, 0.5);
//! for morph in &meta.morph_targets {
//!     let deltas = project_deltas(&target, &source, &morph.deltas, true, &config);
//!     println!("{}: {} vertices", morph.name, deltas.len());
//! }
//! ```
//!
//! ## Diffing Two Poses
//!
//! ```
//! use remorph::prelude::*;
//! use remorph::algo::diff::diff_meshes;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//!
//! let rest: TriMesh = build_from_triangles(&vertices, &faces).unwrap();
//! let mut posed = rest.clone();
//! posed.set_position(VertexId::new(3), Point3::new(0.5, 0.5, 2.0));
//!
//! let deltas = diff_meshes(&rest, &posed, true);
//! assert_eq!(deltas.len(), 1);
//! assert_eq!(deltas.get(VertexId::new(3)).unwrap().position_delta.z, 1.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod config;
pub mod delta;
pub mod error;
pub mod io;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use remorph::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::TransferConfig;
    pub use crate::delta::{Delta, DeltaSet};
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_triangles, to_face_vertex, FaceId, MeshIndex, TriMesh, Triangle, Vertex,
        VertexId,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::algo::lod::retarget_to_lod;
    use crate::algo::project::project_deltas;
    use crate::io::metamorph::{parse, MetaMorph, MorphTarget};
    use nalgebra::{Point3, Vector3};

    fn create_grid(n: usize, size: f64) -> TriMesh {
        let step = size / n as f64;
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(Point3::new(i as f64 * step, j as f64 * step, 0.0));
            }
        }
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v01 = v00 + (n + 1);
                faces.push([v00, v00 + 1, v01 + 1]);
                faces.push([v00, v01 + 1, v01]);
            }
        }
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_transfer_and_store() {
        let source = create_grid(4, 4.0);
        let target = create_grid(8, 4.0);
        let lift: DeltaSet = source
            .vertex_ids()
            .map(|v| Delta::new(v, Vector3::new(0.0, 0.0, 0.5)))
            .collect();

        let projected = project_deltas(&target, &source, &lift, true, &TransferConfig::default());
        assert_eq!(projected.len(), target.vertex_count(), "every target vertex follows");
        for d in &projected {
            assert!(
                (d.position_delta - Vector3::new(0.0, 0.0, 0.5)).norm() < 1e-6,
                "vertex {:?} got {:?}",
                d.source_index,
                d.position_delta
            );
        }

        let lod = retarget_to_lod(&target, &source, &projected, &TransferConfig::default());
        assert_eq!(lod.len(), source.vertex_count(), "and back down to the coarse grid");

        let mut meta = MetaMorph::from_mesh(&target);
        meta.morph_targets.push(MorphTarget::new("Lift", projected.clone()));
        let reparsed: MetaMorph = parse(&meta.to_string()).unwrap();
        let stored = reparsed.morph_target("Lift").unwrap();
        assert_eq!(stored.deltas.len(), projected.len());
    }
}
