//! Sparse differences between two poses of one mesh.
//!
//! [`diff_meshes`] compares two meshes that share vertex indexing and keeps
//! only vertices that moved noticeably. The remaining functions are built on
//! it: applying a delta set to a copy of a mesh and diffing the result is how
//! sets are merged, rescaled, and re-derived with consistent normal changes.

use nalgebra::Vector3;
use tracing::debug;

use super::parallel::parallel_collect;
use crate::delta::{Delta, DeltaSet};
use crate::mesh::{MeshIndex, TriMesh, VertexId};

/// Displacements at or below this length are treated as no movement.
pub const POINTS_ARE_NEAR: f64 = 0.015;

/// Per-component tolerance of [`meshes_identical`].
const IDENTICAL_TOLERANCE: f64 = 1e-4;

/// Deltas taking `before` to `after`.
///
/// Only vertex slots live in both meshes are compared. A delta is emitted
/// when the squared displacement exceeds `POINTS_ARE_NEAR²`; its tangent
/// delta is the change of the computed vertex normal.
///
/// # Example
///
/// ```
/// use remorph::prelude::*;
/// use remorph::algo::diff::diff_meshes;
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let before: TriMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
/// let mut after = before.clone();
/// after.set_position(VertexId::new(1), Point3::new(2.0, 0.0, 0.0));
///
/// let deltas = diff_meshes(&before, &after, true);
/// assert_eq!(deltas.len(), 1);
/// assert!(deltas.contains(VertexId::new(1)));
/// ```
pub fn diff_meshes<I: MeshIndex>(before: &TriMesh<I>, after: &TriMesh<I>, parallel: bool) -> DeltaSet<I> {
    let len = before.num_vertices().min(after.num_vertices());
    let threshold = POINTS_ARE_NEAR * POINTS_ARE_NEAR;

    let deltas: Vec<Delta<I>> = parallel_collect(len, 256, parallel, |range, out| {
        for i in range {
            let v = VertexId::new(i);
            if !before.is_vertex(v) || !after.is_vertex(v) {
                continue;
            }
            let offset = after.position(v) - before.position(v);
            if offset.norm_squared() <= threshold {
                continue;
            }
            let tangent = after.compute_vertex_normal(v) - before.compute_vertex_normal(v);
            out.push(Delta::new(v, offset.cast::<f32>()).with_tangent(tangent.cast::<f32>()));
        }
    });

    let set: DeltaSet<I> = deltas.into_iter().collect();
    debug!(compared = len, moved = set.len(), "meshes diffed");
    set
}

/// Whether two meshes are the same vertex for vertex.
///
/// Requires equal slot counts, equal liveness per slot, and every live
/// position and computed normal equal within `1e-4` per component.
pub fn meshes_identical<I: MeshIndex>(a: &TriMesh<I>, b: &TriMesh<I>) -> bool {
    if a.num_vertices() != b.num_vertices() {
        return false;
    }
    let close = |x: &Vector3<f64>| x.iter().all(|c| c.abs() <= IDENTICAL_TOLERANCE);
    (0..a.num_vertices()).all(|i| {
        let v = VertexId::new(i);
        match (a.is_vertex(v), b.is_vertex(v)) {
            (false, false) => true,
            (true, true) => {
                close(&(a.position(v) - b.position(v)))
                    && close(&(a.compute_vertex_normal(v) - b.compute_vertex_normal(v)))
            }
            _ => false,
        }
    })
}

/// Copy of `mesh` with every delta applied, scaled by `multiplier`.
///
/// Deltas on removed or out-of-range vertices are skipped. Stored normals,
/// when the mesh has them, are recomputed from the new positions.
pub fn apply_deltas<I: MeshIndex>(
    mesh: &TriMesh<I>,
    deltas: &DeltaSet<I>,
    multiplier: f64,
    parallel: bool,
) -> TriMesh<I> {
    let mut moved = mesh.clone();
    for delta in deltas {
        let v = delta.source_index;
        if !moved.is_vertex(v) {
            continue;
        }
        let p = moved.position(v) + delta.position_delta.cast::<f64>() * multiplier;
        moved.set_position(v, p);
    }
    if moved.has_normals() {
        moved.compute_normals(parallel);
    }
    moved
}

/// Combine several delta sets defined against `base` into one.
///
/// All sets are applied to one copy of the base and the result is diffed,
/// so overlapping displacements add up and normal changes reflect the
/// combined shape.
pub fn merge_delta_sets<I: MeshIndex>(
    base: &TriMesh<I>,
    sets: &[&DeltaSet<I>],
    parallel: bool,
) -> DeltaSet<I> {
    let mut combined = DeltaSet::new();
    for set in sets {
        combined.accumulate(set);
    }
    let merged = apply_deltas(base, &combined, 1.0, parallel);
    diff_meshes(base, &merged, parallel)
}

/// Rescale a delta set and re-derive its normal changes.
pub fn set_magnitude<I: MeshIndex>(
    base: &TriMesh<I>,
    deltas: &DeltaSet<I>,
    magnitude: f64,
    parallel: bool,
) -> DeltaSet<I> {
    let scaled = apply_deltas(base, deltas, magnitude, parallel);
    diff_meshes(base, &scaled, parallel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_triangles;
    use nalgebra::Point3;

    fn create_cube() -> TriMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1], [0, 3, 2],
            [4, 5, 6], [4, 6, 7],
            [0, 1, 5], [0, 5, 4],
            [3, 7, 6], [3, 6, 2],
            [0, 4, 7], [0, 7, 3],
            [1, 2, 6], [1, 6, 5],
        ];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_diff_single_moved_vertex() {
        let before = create_cube();
        let mut after = before.clone();
        let v3 = VertexId::new(3);
        after.set_position(v3, before.position(v3) + Vector3::new(1.0, 0.0, 0.0));

        let deltas = diff_meshes(&before, &after, true);
        assert_eq!(deltas.len(), 1, "only vertex 3 moved");

        let delta = deltas.get(v3).unwrap();
        assert_eq!(delta.source_index, v3);
        assert_eq!(delta.position_delta, Vector3::new(1.0, 0.0, 0.0));

        let expected = (after.compute_vertex_normal(v3) - before.compute_vertex_normal(v3)).cast::<f32>();
        assert!(
            (delta.tangent_delta - expected).norm() < 1e-6,
            "tangent {:?} != {:?}",
            delta.tangent_delta,
            expected
        );
        assert!(delta.tangent_delta.norm() > 0.0, "normal of a moved corner changes");
    }

    #[test]
    fn test_diff_ignores_small_motion() {
        let before = create_cube();
        let mut after = before.clone();
        after.set_position(VertexId::new(0), Point3::new(0.01, 0.0, 0.0));
        after.set_position(VertexId::new(1), Point3::new(1.0, 0.0, 0.015));
        assert!(diff_meshes(&before, &after, false).is_empty());

        after.set_position(VertexId::new(1), Point3::new(1.0, 0.0, 0.016));
        assert_eq!(diff_meshes(&before, &after, false).len(), 1);
    }

    #[test]
    fn test_diff_skips_removed_slots() {
        let before = create_cube();
        let mut after = before.clone();
        after.set_position(VertexId::new(6), Point3::new(2.0, 2.0, 2.0));
        after.remove_vertex(VertexId::new(6));
        assert!(diff_meshes(&before, &after, true).is_empty());
    }

    #[test]
    fn test_meshes_identical() {
        let a = create_cube();
        let mut b = a.clone();
        assert!(meshes_identical(&a, &b));

        b.set_position(VertexId::new(2), Point3::new(1.0, 1.0, 0.00002));
        assert!(meshes_identical(&a, &b), "within tolerance");

        b.set_position(VertexId::new(2), Point3::new(1.0, 1.0, 0.001));
        assert!(!meshes_identical(&a, &b));

        let mut c = a.clone();
        c.add_vertex(Point3::origin());
        assert!(!meshes_identical(&a, &c), "slot counts differ");
    }

    #[test]
    fn test_apply_and_merge() {
        let base = create_cube();
        let up: DeltaSet = vec![Delta::new(VertexId::new(4), Vector3::new(0.0, 0.0, 1.0))]
            .into_iter()
            .collect();
        let side: DeltaSet = vec![
            Delta::new(VertexId::new(4), Vector3::new(1.0, 0.0, 0.0)),
            Delta::new(VertexId::new(5), Vector3::new(1.0, 0.0, 0.0)),
        ]
        .into_iter()
        .collect();

        let moved = apply_deltas(&base, &up, 2.0, true);
        assert_eq!(*moved.position(VertexId::new(4)), Point3::new(0.0, 0.0, 3.0));

        let merged = merge_delta_sets(&base, &[&up, &side], true);
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged.get(VertexId::new(4)).unwrap().position_delta,
            Vector3::new(1.0, 0.0, 1.0)
        );
    }

    #[test]
    fn test_set_magnitude() {
        let base = create_cube();
        let deltas: DeltaSet = vec![
            Delta::new(VertexId::new(6), Vector3::new(0.5, 0.5, 0.5)),
            Delta::new(VertexId::new(7), Vector3::new(0.0, 0.02, 0.0)),
        ]
        .into_iter()
        .collect();

        let halved = set_magnitude(&base, &deltas, 0.5, false);
        // Vertex 7 drops below the movement threshold
        assert_eq!(halved.len(), 1);
        let d = halved.get(VertexId::new(6)).unwrap();
        assert!((d.position_delta - Vector3::new(0.25, 0.25, 0.25)).norm() < 1e-6);
    }
}
