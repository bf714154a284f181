//! R-tree over vertex positions.
//!
//! Answers the two point queries correspondence needs: walk source vertices
//! in order of increasing distance from a target vertex, and collect every
//! vertex within a small radius (weld grouping).

use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::mesh::{MeshIndex, TriMesh, VertexId};

/// A vertex position tagged with its slot index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedPoint {
    /// Vertex slot in the source mesh.
    pub index: usize,
    /// Position as a plain array for rstar.
    pub position: [f64; 3],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Point index over the live vertices of a mesh.
#[derive(Debug, Clone)]
pub struct VertexTree<I: MeshIndex = u32> {
    tree: RTree<IndexedPoint>,
    _marker: std::marker::PhantomData<I>,
}

impl<I: MeshIndex> VertexTree<I> {
    /// Index every live vertex of `mesh`.
    pub fn build(mesh: &TriMesh<I>) -> Self {
        Self::from_vertices(mesh.vertices().map(|(id, v)| (id, v.position)))
    }

    /// Index an explicit set of vertices.
    pub fn from_vertices(vertices: impl IntoIterator<Item = (VertexId<I>, Point3<f64>)>) -> Self {
        let points: Vec<IndexedPoint> = vertices
            .into_iter()
            .map(|(id, p)| IndexedPoint {
                index: id.index(),
                position: [p.x, p.y, p.z],
            })
            .collect();
        Self {
            tree: RTree::bulk_load(points),
            _marker: std::marker::PhantomData,
        }
    }

    /// Number of indexed vertices.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// True when no vertex is indexed.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Vertices ordered by increasing distance from `p`, with squared distances.
    pub fn nearest_iter<'t>(
        &'t self,
        p: &Point3<f64>,
    ) -> impl Iterator<Item = (VertexId<I>, f64)> + 't {
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[p.x, p.y, p.z])
            .map(|(point, d2)| (VertexId::new(point.index), d2))
    }

    /// Vertices within `radius` of `p` (inclusive), ascending by index.
    pub fn within(&self, p: &Point3<f64>, radius: f64) -> Vec<VertexId<I>> {
        let query = [p.x, p.y, p.z];
        let envelope = AABB::from_corners(
            [p.x - radius, p.y - radius, p.z - radius],
            [p.x + radius, p.y + radius, p.z + radius],
        );
        let r2 = radius * radius;
        let mut found: Vec<VertexId<I>> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|point| point.distance_2(&query) <= r2)
            .map(|point| VertexId::new(point.index))
            .collect();
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_triangles;

    fn line_mesh() -> TriMesh {
        let vertices: Vec<Point3<f64>> = (0..10)
            .map(|i| Point3::new(i as f64, 0.0, 0.0))
            .collect();
        build_from_triangles(&vertices, &[]).unwrap()
    }

    #[test]
    fn test_nearest_iter_is_sorted() {
        let mesh = line_mesh();
        let tree = VertexTree::build(&mesh);
        assert_eq!(tree.len(), 10);

        let order: Vec<(usize, f64)> = tree
            .nearest_iter(&Point3::new(3.2, 0.0, 0.0))
            .take(3)
            .map(|(v, d2)| (v.index(), d2))
            .collect();
        assert_eq!(order[0].0, 3);
        assert_eq!(order[1].0, 4);
        assert_eq!(order[2].0, 2);
        assert!(order[0].1 <= order[1].1 && order[1].1 <= order[2].1);
    }

    #[test]
    fn test_within_radius() {
        let mut mesh = line_mesh();
        let dup = mesh.add_vertex(Point3::new(5.0, 0.0, 0.0));
        mesh.remove_vertex(VertexId::new(9));
        let tree = VertexTree::build(&mesh);

        let found = tree.within(&Point3::new(5.0, 0.0, 0.0), 1e-4);
        assert_eq!(found, vec![VertexId::new(5), dup]);

        assert!(tree.within(&Point3::new(9.0, 0.0, 0.0), 1e-4).is_empty());
        assert_eq!(tree.within(&Point3::new(5.0, 0.0, 0.0), 1.0).len(), 4);
    }
}
