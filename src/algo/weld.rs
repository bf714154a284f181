//! Seam welding.
//!
//! Render meshes split vertices along UV and material seams. Those copies
//! sit at the same position and must move together, otherwise the seam
//! cracks open. [`weld_groups`] finds them; [`weld_mesh`] collapses them to
//! produce the welded variant of a mesh.

use tracing::debug;

use super::parallel::parallel_collect;
use super::spatial::VertexTree;
use crate::mesh::{MeshIndex, TriMesh, VertexId};

/// Groups of live vertices lying within `tolerance` of each other.
///
/// Only groups with two or more members are returned. Members are sorted
/// and groups are ordered by their lowest member.
pub fn weld_groups<I: MeshIndex>(
    mesh: &TriMesh<I>,
    tolerance: f64,
    parallel: bool,
) -> Vec<Vec<VertexId<I>>> {
    let tree = VertexTree::build(mesh);
    let live: Vec<VertexId<I>> = mesh.vertex_ids().collect();
    weld_groups_with(mesh, &tree, &live, tolerance, parallel)
}

pub(crate) fn weld_groups_with<I: MeshIndex>(
    mesh: &TriMesh<I>,
    tree: &VertexTree<I>,
    live: &[VertexId<I>],
    tolerance: f64,
    parallel: bool,
) -> Vec<Vec<VertexId<I>>> {
    let roots = weld_roots(mesh, tree, live, tolerance, parallel);

    let mut members: Vec<Vec<VertexId<I>>> = vec![Vec::new(); roots.len()];
    for &v in live {
        if let Some(root) = roots[v.index()] {
            members[root].push(v);
        }
    }
    // Roots are group minima, so slot order is lowest-member order
    members
        .into_iter()
        .filter(|g| g.len() >= 2)
        .map(|mut g| {
            g.sort_unstable();
            g
        })
        .collect()
}

/// Lowest vertex of each live slot's weld group, `None` for other slots.
///
/// Two vertices share a group when a chain of vertices, each within
/// `tolerance` of the next, links them.
fn weld_roots<I: MeshIndex>(
    mesh: &TriMesh<I>,
    tree: &VertexTree<I>,
    live: &[VertexId<I>],
    tolerance: f64,
    parallel: bool,
) -> Vec<Option<usize>> {
    let links: Vec<(usize, usize)> = parallel_collect(live.len(), 64, parallel, |range, out| {
        for &v in &live[range] {
            for m in tree.within(mesh.position(v), tolerance) {
                if m < v {
                    out.push((m.index(), v.index()));
                }
            }
        }
    });

    let mut parent: Vec<usize> = (0..mesh.num_vertices()).collect();
    for (a, b) in links {
        let (ra, rb) = (find_root(&mut parent, a), find_root(&mut parent, b));
        // The lower root wins, keeping every root its group's minimum
        if ra < rb {
            parent[rb] = ra;
        } else if rb < ra {
            parent[ra] = rb;
        }
    }

    let mut roots: Vec<Option<usize>> = vec![None; parent.len()];
    for &v in live {
        roots[v.index()] = Some(find_root(&mut parent, v.index()));
    }
    roots
}

fn find_root(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// A welded copy of a mesh.
#[derive(Debug, Clone)]
pub struct WeldedMesh<I: MeshIndex = u32> {
    /// Mesh with one vertex per distinct position.
    pub mesh: TriMesh<I>,
    /// For each vertex slot of the original mesh, its vertex in `mesh`
    /// (invalid for removed slots).
    pub remap: Vec<VertexId<I>>,
}

/// Collapse vertices within `tolerance` onto one vertex each.
///
/// Vertices linked by a chain of within-`tolerance` neighbours map to the
/// lowest index of their group; the welded mesh keeps those representatives
/// in index order. Triangles that collapse are dropped, as are UVs and
/// materials, which are meaningless once seams are merged.
pub fn weld_mesh<I: MeshIndex>(mesh: &TriMesh<I>, tolerance: f64, parallel: bool) -> WeldedMesh<I> {
    let tree = VertexTree::build(mesh);
    let live: Vec<VertexId<I>> = mesh.vertex_ids().collect();
    let n = mesh.num_vertices();
    let rep = weld_roots(mesh, &tree, &live, tolerance, parallel);

    let mut welded = TriMesh::with_capacity(n, mesh.num_triangles());
    let mut new_index: Vec<VertexId<I>> = vec![VertexId::invalid(); n];
    for i in 0..n {
        if rep[i] == Some(i) {
            new_index[i] = welded.add_vertex(*mesh.position(VertexId::new(i)));
        }
    }

    let remap: Vec<VertexId<I>> = rep
        .iter()
        .map(|r| r.map_or(VertexId::invalid(), |r| new_index[r]))
        .collect();

    let mut dropped = 0usize;
    for (_, t) in mesh.triangles() {
        let corners = t.vertices.map(|v| remap[v.index()]);
        if welded.add_triangle(corners).is_err() {
            dropped += 1;
        }
    }

    debug!(
        vertices = mesh.vertex_count(),
        welded_vertices = welded.num_vertices(),
        dropped_triangles = dropped,
        "mesh welded"
    );
    WeldedMesh {
        mesh: welded,
        remap,
    }
}
