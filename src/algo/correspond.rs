//! Vertex correspondence between meshes of different topology.
//!
//! For every live target vertex the builder looks for the nearest source
//! vertex that is closer than [`TransferConfig::vertex_threshold`] and whose
//! normal agrees with the target's. Vertices without such a partner are
//! reported as unmatched so callers can fall back to surface projection.
//! Target vertices sharing a position are grouped so they can be kept
//! identical later.
//!
//! # Example
//!
//! ```
//! use remorph::prelude::*;
//! use remorph::algo::correspond::build_correspondence;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mesh: TriMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//!
//! let result = build_correspondence(&mesh, &mesh, &TransferConfig::default());
//! assert_eq!(result.pairs.len(), 3);
//! assert!(result.unmatched.is_empty());
//! ```

use nalgebra::Vector3;
use tracing::debug;

use super::parallel::parallel_collect;
use super::spatial::VertexTree;
use super::weld::weld_groups_with;
use crate::config::TransferConfig;
use crate::mesh::{MeshIndex, TriMesh, VertexId};

/// A target vertex and the source vertex it follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexPair<I: MeshIndex = u32> {
    /// Vertex of the target mesh.
    pub target: VertexId<I>,
    /// Matched vertex of the source mesh.
    pub source: VertexId<I>,
}

/// Output of [`build_correspondence`].
///
/// Lists are sorted for reproducible output, but they are sets: code
/// consuming them must not depend on their order.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceResult<I: MeshIndex = u32> {
    /// Target vertices that share a position (two or more per group).
    pub welded_groups: Vec<Vec<VertexId<I>>>,
    /// Target vertices with a compatible source vertex in range.
    pub pairs: Vec<VertexPair<I>>,
    /// Target vertices with no compatible source vertex in range.
    pub unmatched: Vec<VertexId<I>>,
}

impl<I: MeshIndex> CorrespondenceResult<I> {
    /// Source vertex paired with `target`, if any.
    pub fn source_of(&self, target: VertexId<I>) -> Option<VertexId<I>> {
        self.pairs
            .binary_search_by_key(&target, |p| p.target)
            .ok()
            .map(|i| self.pairs[i].source)
    }
}

/// Normal gate shared by vertex matching and triangle projection.
///
/// The agreement `dot(a, b)` is rescaled so that the threshold maps to zero;
/// the pair is compatible when the rescaled weight is positive.
#[inline]
pub fn normals_compatible(a: &Vector3<f64>, b: &Vector3<f64>, threshold: f64) -> bool {
    let scale = 1.0 / (1.0 - threshold).max(1e-6);
    ((a.dot(b) - threshold) * scale).max(0.0) > 0.0
}

/// Match every live target vertex to a source vertex.
///
/// A source mesh without triangles has no surface to follow: every target
/// vertex is reported unmatched.
pub fn build_correspondence<I: MeshIndex>(
    target: &TriMesh<I>,
    source: &TriMesh<I>,
    config: &TransferConfig,
) -> CorrespondenceResult<I> {
    let live: Vec<VertexId<I>> = target.vertex_ids().collect();

    let target_tree = VertexTree::build(target);
    let welded_groups = weld_groups_with(
        target,
        &target_tree,
        &live,
        config.merge_vertex_tolerance,
        config.parallel,
    );

    if source.num_triangles() == 0 {
        debug!(targets = live.len(), "source has no triangles, nothing to match");
        return CorrespondenceResult {
            welded_groups,
            pairs: Vec::new(),
            unmatched: live,
        };
    }

    let source_tree = VertexTree::build(source);
    let max_d2 = config.vertex_threshold * config.vertex_threshold;
    let normal_threshold = config.normal_incompatibility_threshold;

    let matches: Vec<(VertexId<I>, Option<VertexId<I>>)> =
        parallel_collect(live.len(), 64, config.parallel, |range, out| {
            for &t in &live[range] {
                let found = closest_compatible(
                    &source_tree,
                    source,
                    target.position(t),
                    &target.vertex_normal(t),
                    max_d2,
                    normal_threshold,
                );
                out.push((t, found));
            }
        });

    let mut pairs = Vec::with_capacity(matches.len());
    let mut unmatched = Vec::new();
    for (t, s) in matches {
        match s {
            Some(source) => pairs.push(VertexPair { target: t, source }),
            None => unmatched.push(t),
        }
    }
    pairs.sort_unstable_by_key(|p| p.target);
    unmatched.sort_unstable();

    debug!(
        pairs = pairs.len(),
        unmatched = unmatched.len(),
        welded_groups = welded_groups.len(),
        "correspondence built"
    );

    CorrespondenceResult {
        welded_groups,
        pairs,
        unmatched,
    }
}

/// Nearest compatible source vertex strictly inside the threshold.
///
/// Equidistant candidates resolve to the lowest source index.
fn closest_compatible<I: MeshIndex>(
    tree: &VertexTree<I>,
    source: &TriMesh<I>,
    position: &nalgebra::Point3<f64>,
    normal: &Vector3<f64>,
    max_d2: f64,
    normal_threshold: f64,
) -> Option<VertexId<I>> {
    let mut best: Option<(VertexId<I>, f64)> = None;
    for (s, d2) in tree.nearest_iter(position) {
        if d2 >= max_d2 {
            break;
        }
        if let Some((_, best_d2)) = best {
            if d2 > best_d2 {
                break;
            }
        }
        if !normals_compatible(&source.vertex_normal(s), normal, normal_threshold) {
            continue;
        }
        match best {
            Some((best_s, _)) if s >= best_s => {}
            _ => best = Some((s, d2)),
        }
    }
    best.map(|(s, _)| s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_triangles;
    use nalgebra::Point3;

    pub(crate) fn create_grid(n: usize, z: f64) -> TriMesh {
        let mut vertices = Vec::new();
        let mut faces = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(Point3::new(i as f64, j as f64, z));
            }
        }
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v10 = v00 + 1;
                let v01 = v00 + (n + 1);
                let v11 = v01 + 1;
                faces.push([v00, v10, v11]);
                faces.push([v00, v11, v01]);
            }
        }
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_normal_gate() {
        let up = Vector3::z();
        assert!(normals_compatible(&up, &up, 0.5));
        assert!(!normals_compatible(&up, &-up, 0.5));
        assert!(!normals_compatible(&up, &Vector3::x(), 0.5));
        // 60 degrees apart: dot = 0.5, not strictly above the threshold
        let tilted = Vector3::new(3f64.sqrt() / 2.0, 0.0, 0.5);
        assert!(!normals_compatible(&up, &tilted, 0.5));
        assert!(normals_compatible(&up, &tilted, 0.4));
    }

    #[test]
    fn test_identical_meshes_match_one_to_one() {
        let mesh = create_grid(4, 0.0);
        let result = build_correspondence(&mesh, &mesh, &TransferConfig::default());
        assert_eq!(result.pairs.len(), mesh.num_vertices());
        for pair in &result.pairs {
            assert_eq!(pair.target, pair.source);
        }
        assert!(result.unmatched.is_empty());
        assert!(result.welded_groups.is_empty());
    }

    #[test]
    fn test_threshold_is_strict() {
        let source = create_grid(2, 0.0);
        let target = create_grid(2, 1.0);

        let at_threshold = TransferConfig::default().with_vertex_threshold(1.0);
        let result = build_correspondence(&target, &source, &at_threshold);
        assert!(result.pairs.is_empty());
        assert_eq!(result.unmatched.len(), target.num_vertices());

        let wider = TransferConfig::default().with_vertex_threshold(1.01);
        let result = build_correspondence(&target, &source, &wider);
        assert_eq!(result.pairs.len(), target.num_vertices());
        assert_eq!(result.source_of(VertexId::new(4)), Some(VertexId::new(4)));
    }

    #[test]
    fn test_flipped_normals_rejected() {
        let source = create_grid(2, 0.0);
        let mut flipped = create_grid(2, 0.0);
        let normals = vec![-Vector3::<f32>::z(); flipped.num_vertices()];
        flipped.set_normals(normals).unwrap();

        let result = build_correspondence(&flipped, &source, &TransferConfig::default());
        assert!(result.pairs.is_empty());
        assert_eq!(result.unmatched.len(), flipped.num_vertices());
    }

    #[test]
    fn test_tie_breaks_to_lowest_source_index() {
        // Source has a duplicated vertex: 0 and 3 coincide
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
        ];
        let source: TriMesh = build_from_triangles(&vertices, &[[0, 1, 2], [3, 1, 2]]).unwrap();
        let target: TriMesh = build_from_triangles(&vertices[..3], &[[0, 1, 2]]).unwrap();

        let result = build_correspondence(&target, &source, &TransferConfig::default());
        assert_eq!(result.source_of(VertexId::new(0)), Some(VertexId::new(0)));
    }

    #[test]
    fn test_zero_triangle_source_matches_nothing() {
        let target = create_grid(2, 0.0);
        let cloud: TriMesh = build_from_triangles(&[Point3::new(0.0, 0.0, 0.0)], &[]).unwrap();

        let result = build_correspondence(&target, &cloud, &TransferConfig::default());
        assert!(result.pairs.is_empty());
        let all: Vec<VertexId> = target.vertex_ids().collect();
        assert_eq!(result.unmatched, all);
    }

    #[test]
    fn test_every_vertex_accounted_for() {
        let source = create_grid(3, 0.0);
        let target = create_grid(6, 0.5);
        let config = TransferConfig::default().with_vertex_threshold(1.0);
        let result = build_correspondence(&target, &source, &config);

        assert_eq!(
            result.pairs.len() + result.unmatched.len(),
            target.vertex_count()
        );
        for pair in &result.pairs {
            assert!(!result.unmatched.contains(&pair.target));
        }
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let source = create_grid(5, 0.0);
        let target = create_grid(7, 0.3);
        let par = build_correspondence(&target, &source, &TransferConfig::default());
        let seq = build_correspondence(&target, &source, &TransferConfig::default().sequential());
        assert_eq!(par.pairs, seq.pairs);
        assert_eq!(par.unmatched, seq.unmatched);
    }
}
