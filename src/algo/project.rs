//! Delta projection between meshes of different topology.
//!
//! A delta set authored on one mesh (the source) is carried over to another
//! mesh of the same character (the target) through vertex correspondence.
//! Each step works on a dense per-slot delta field of the target:
//!
//! 1. gather the source delta of every paired target vertex
//! 2. optional Laplacian smoothing of the field (Jacobi passes)
//! 3. average the field over weld groups so seams move together
//! 4. apply the field to a copy of the target, scaled by the multiplier
//! 5. diff the copy against the target, then seal weld groups so their
//!    deltas are bit-identical
//!
//! Re-deriving the output from real geometry in step 5 keeps position and
//! normal deltas consistent with each other.
//!
//! # Example
//!
//! ```
//! use remorph::prelude::*;
//! use remorph::algo::project::project_deltas;
//! use nalgebra::{Point3, Vector3};
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mesh: TriMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//! let deltas: DeltaSet = vec![Delta::new(VertexId::new(0), Vector3::new(0.0, 0.0, 1.0))]
//!     .into_iter()
//!     .collect();
//!
//! let config = TransferConfig::default().with_multiplier(2.0);
//! let projected = project_deltas(&mesh, &mesh, &deltas, false, &config);
//! let d = projected.get(VertexId::new(0)).unwrap();
//! assert!((d.position_delta - Vector3::new(0.0, 0.0, 2.0)).norm() < 1e-6);
//! ```

use std::collections::HashSet;

use nalgebra::{Point3, Vector3};
use tracing::debug;

use super::correspond::{build_correspondence, normals_compatible};
use super::diff::{diff_meshes, meshes_identical};
use super::parallel::{parallel_collect, parallel_map};
use super::spatial::SpatialIndex;
use crate::config::TransferConfig;
use crate::delta::{Delta, DeltaSet};
use crate::mesh::{MeshIndex, TriMesh, VertexId};

/// Dense delta per vertex slot; `None` marks a vertex outside the set.
type DeltaField = Vec<Option<Vector3<f64>>>;

/// Project `deltas`, defined on `source`, onto `target`.
///
/// With `check_identical`, meshes that are the same vertex for vertex get
/// the input back unchanged. An empty input, an empty target, or a target
/// with no correspondence gives an empty set.
pub fn project_deltas<I: MeshIndex>(
    target: &TriMesh<I>,
    source: &TriMesh<I>,
    deltas: &DeltaSet<I>,
    check_identical: bool,
    config: &TransferConfig,
) -> DeltaSet<I> {
    if deltas.is_empty() {
        return DeltaSet::new();
    }
    if check_identical && meshes_identical(target, source) {
        debug!(deltas = deltas.len(), "meshes identical, deltas copied");
        return deltas.clone();
    }

    let correspondence = build_correspondence(target, source, config);
    let mut field: DeltaField = vec![None; target.num_vertices()];
    for pair in &correspondence.pairs {
        if let Some(delta) = deltas.get(pair.source) {
            let d = delta.position_delta.cast::<f64>();
            if d.norm_squared() > 0.0 {
                field[pair.target.index()] = Some(d);
            }
        }
    }
    transfer_field(target, &correspondence.welded_groups, field, config)
}

/// [`project_deltas`] with the `ignored` target vertices left out of the result.
pub fn project_deltas_ignoring<I: MeshIndex>(
    target: &TriMesh<I>,
    source: &TriMesh<I>,
    deltas: &DeltaSet<I>,
    check_identical: bool,
    config: &TransferConfig,
    ignored: &HashSet<VertexId<I>>,
) -> DeltaSet<I> {
    let projected = project_deltas(target, source, deltas, check_identical, config);
    if ignored.is_empty() {
        projected
    } else {
        projected.without(ignored)
    }
}

/// Deltas that deform `target` into the shape of `source`.
///
/// Paired target vertices move onto their source vertex. Unmatched ones move
/// to the closest point of the nearest source triangle that faces the same
/// way, at any distance, and stay put when there is none. The motion is then
/// run through the projection pipeline on the target itself, so smoothing,
/// weld consistency and the multiplier apply as in [`project_deltas`].
pub fn project_mesh<I: MeshIndex>(
    target: &TriMesh<I>,
    source: &TriMesh<I>,
    check_identical: bool,
    config: &TransferConfig,
) -> DeltaSet<I> {
    if check_identical && meshes_identical(target, source) {
        return diff_meshes(target, source, config.parallel);
    }

    let correspondence = build_correspondence(target, source, config);
    let mut posed = target.clone();
    for pair in &correspondence.pairs {
        posed.set_position(pair.target, *source.position(pair.source));
    }

    let mut snapped = 0usize;
    if !correspondence.unmatched.is_empty() {
        let index = SpatialIndex::build(source);
        let threshold = config.normal_incompatibility_threshold;
        let unmatched = &correspondence.unmatched;
        let hits: Vec<(VertexId<I>, Point3<f64>)> =
            parallel_collect(unmatched.len(), 16, config.parallel, |range, out| {
                for &t in &unmatched[range] {
                    let normal = target.compute_vertex_normal(t);
                    let nearest = index.find_nearest_triangle(target.position(t), f64::MAX, |f| {
                        normals_compatible(&source.face_normal(f), &normal, threshold)
                    });
                    if let Some(hit) = nearest {
                        if hit.closest_point.iter().all(|c| c.is_finite()) {
                            out.push((t, hit.closest_point));
                        }
                    }
                }
            });
        snapped = hits.len();
        for (t, p) in hits {
            posed.set_position(t, p);
        }
    }
    debug!(
        paired = correspondence.pairs.len(),
        snapped,
        unmatched = correspondence.unmatched.len() - snapped,
        "target posed onto source"
    );

    let motion = diff_meshes(target, &posed, config.parallel);
    if motion.is_empty() {
        return motion;
    }
    let mut field: DeltaField = vec![None; target.num_vertices()];
    for delta in &motion {
        field[delta.source_index.index()] = Some(delta.position_delta.cast::<f64>());
    }
    // Weld groups depend on the target alone, so the pose correspondence's
    // groups serve the self-projection as well
    transfer_field(target, &correspondence.welded_groups, field, config)
}

/// Smooth, weld, apply and diff a gathered delta field.
fn transfer_field<I: MeshIndex>(
    target: &TriMesh<I>,
    welded_groups: &[Vec<VertexId<I>>],
    mut field: DeltaField,
    config: &TransferConfig,
) -> DeltaSet<I> {
    let gathered = field.iter().filter(|d| d.is_some()).count();
    if gathered == 0 {
        debug!("no deltas gathered");
        return DeltaSet::new();
    }

    for _ in 0..config.smooth_iterations {
        field = smooth_pass(target, &field, config.smooth_strength, config.parallel);
    }
    weld_average(&mut field, welded_groups);

    let mut deformed = target.clone();
    for (i, delta) in field.iter().enumerate() {
        if let Some(d) = delta {
            let v = VertexId::new(i);
            let p = deformed.position(v) + d * config.multiplier;
            deformed.set_position(v, p);
        }
    }
    deformed.compute_normals(config.parallel);

    let mut projected = diff_meshes(target, &deformed, config.parallel);
    seal_groups(&mut projected, welded_groups);

    debug!(gathered, projected = projected.len(), "deltas projected");
    projected
}

/// One Jacobi smoothing pass over the delta field.
///
/// Every triangle touching a delta vertex pulls each of its corners toward
/// the average of the other two, where corners outside the set read as zero.
/// A vertex's new delta is the mean of those pulls. Vertices no such
/// triangle touches keep their delta. All reads come from `field`, so the
/// result does not depend on evaluation order.
fn smooth_pass<I: MeshIndex>(
    mesh: &TriMesh<I>,
    field: &[Option<Vector3<f64>>],
    strength: f64,
    parallel: bool,
) -> DeltaField {
    let read = |v: VertexId<I>| field[v.index()].unwrap_or_else(Vector3::zeros);

    parallel_map(field.len(), parallel, |i| {
        let v = VertexId::new(i);
        if !mesh.is_vertex(v) {
            return field[i];
        }
        let current = read(v);
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        for f in mesh.vertex_faces(v) {
            let corners = mesh.face_triangle(f);
            if corners.iter().all(|c| field[c.index()].is_none()) {
                continue;
            }
            let others: Vector3<f64> = corners.iter().filter(|&&c| c != v).map(|&c| read(c)).sum();
            let target = others * 0.5;
            sum += current + (target - current) * strength;
            count += 1;
        }
        if count == 0 {
            field[i]
        } else {
            Some(sum / count as f64)
        }
    })
}

/// Give every member of a weld group the mean delta of its present members.
fn weld_average<I: MeshIndex>(field: &mut [Option<Vector3<f64>>], groups: &[Vec<VertexId<I>>]) {
    for group in groups {
        let present: Vec<Vector3<f64>> = group.iter().filter_map(|v| field[v.index()]).collect();
        if present.is_empty() {
            continue;
        }
        let mean = present.iter().sum::<Vector3<f64>>() / present.len() as f64;
        for v in group {
            field[v.index()] = Some(mean);
        }
    }
}

/// Copy the lowest present member's position delta to the rest of its group.
///
/// Welded vertices received the same displacement but their diffs can
/// differ in the last bits; downstream consumers expect exact equality.
/// Tangent deltas stay per vertex since seam copies have their own normals.
fn seal_groups<I: MeshIndex>(deltas: &mut DeltaSet<I>, groups: &[Vec<VertexId<I>>]) {
    for group in groups {
        let Some(lead) = group.iter().find_map(|&v| deltas.get(v).copied()) else {
            continue;
        };
        for &v in group {
            if let Some(d) = deltas.get(v).copied() {
                deltas.insert(Delta {
                    source_index: v,
                    position_delta: lead.position_delta,
                    tangent_delta: d.tangent_delta,
                });
            }
        }
    }
}
