//! Bounding volume hierarchy over mesh triangles.
//!
//! Median-split tree, flattened into a node vector. Built once per
//! operation and read-only afterwards, so a single index can serve
//! queries from many worker threads.

use nalgebra::Point3;
use tracing::trace;

use crate::algo::geometry::closest_point_on_triangle;
use crate::mesh::{FaceId, MeshIndex, TriMesh};

const MAX_LEAF_SIZE: usize = 4;
const MAX_DEPTH: usize = 64;

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Aabb {
    /// An inverted box that any point expands.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Grow to contain a point.
    pub fn expand_point(&mut self, p: &Point3<f64>) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// Grow to contain another box.
    pub fn expand_aabb(&mut self, other: &Aabb) {
        self.expand_point(&other.min);
        self.expand_point(&other.max);
    }

    /// Center point.
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Squared length of the diagonal.
    pub fn diagonal_squared(&self) -> f64 {
        if self.min.x > self.max.x {
            return 0.0;
        }
        (self.max - self.min).norm_squared()
    }

    /// Index of the longest axis.
    pub fn longest_axis(&self) -> usize {
        let e = self.max - self.min;
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    /// Squared distance from a point to the box (zero inside).
    pub fn distance_squared(&self, p: &Point3<f64>) -> f64 {
        let mut d2 = 0.0;
        for i in 0..3 {
            let v = p[i];
            if v < self.min[i] {
                d2 += (self.min[i] - v) * (self.min[i] - v);
            } else if v > self.max[i] {
                d2 += (v - self.max[i]) * (v - self.max[i]);
            }
        }
        d2
    }
}

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf { aabb: Aabb, first: usize, count: usize },
    Internal { aabb: Aabb, left: usize, right: usize },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Result of a nearest-triangle query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestTriangle<I: MeshIndex = u32> {
    /// The triangle found.
    pub face: FaceId<I>,
    /// Squared distance from the query point.
    pub distance_squared: f64,
    /// Closest point on the triangle.
    pub closest_point: Point3<f64>,
}

/// Nearest-triangle index over one mesh.
///
/// Borrows the mesh it was built from; triangle ids in results refer to it.
#[derive(Debug, Clone)]
pub struct SpatialIndex<'a, I: MeshIndex = u32> {
    mesh: &'a TriMesh<I>,
    nodes: Vec<BvhNode>,
    faces: Vec<FaceId<I>>,
    root: Option<usize>,
}

impl<'a, I: MeshIndex> SpatialIndex<'a, I> {
    /// Build the tree over every triangle of `mesh`.
    ///
    /// A mesh without triangles gives an empty index whose queries all
    /// return `None`.
    pub fn build(mesh: &'a TriMesh<I>) -> Self {
        let mut faces: Vec<FaceId<I>> = mesh.face_ids().collect();
        let bounds: Vec<Aabb> = faces
            .iter()
            .map(|&f| {
                let mut aabb = Aabb::empty();
                for p in mesh.face_positions(f) {
                    aabb.expand_point(&p);
                }
                aabb
            })
            .collect();
        let centroids: Vec<Point3<f64>> = bounds.iter().map(Aabb::center).collect();

        let mut nodes = Vec::with_capacity(faces.len().max(1) * 2 / MAX_LEAF_SIZE + 1);
        let root = if faces.is_empty() {
            None
        } else {
            let count = faces.len();
            Some(build_recursive(&bounds, &centroids, &mut faces, 0, count, 0, &mut nodes))
        };

        trace!(triangles = faces.len(), nodes = nodes.len(), "triangle bvh built");
        Self {
            mesh,
            nodes,
            faces,
            root,
        }
    }

    /// True when the mesh had no triangles.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The indexed mesh.
    pub fn mesh(&self) -> &'a TriMesh<I> {
        self.mesh
    }

    /// Bounds of all indexed triangles.
    pub fn bounds(&self) -> Option<Aabb> {
        self.root.map(|r| *self.nodes[r].aabb())
    }

    /// Nearest triangle within `max_distance` of `point` accepted by `filter`.
    ///
    /// Equidistant triangles resolve to the lower face id.
    pub fn find_nearest_triangle<F>(
        &self,
        point: &Point3<f64>,
        max_distance: f64,
        filter: F,
    ) -> Option<NearestTriangle<I>>
    where
        F: Fn(FaceId<I>) -> bool,
    {
        let root = self.root?;
        let mut best_d2 = if max_distance >= f64::MAX.sqrt() {
            f64::MAX
        } else {
            max_distance * max_distance
        };
        let mut best: Option<NearestTriangle<I>> = None;

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if self.nodes[node].aabb().distance_squared(point) > best_d2 {
                continue;
            }
            match &self.nodes[node] {
                BvhNode::Leaf { first, count, .. } => {
                    for &face in &self.faces[*first..first + count] {
                        if !filter(face) {
                            continue;
                        }
                        let [a, b, c] = self.mesh.face_positions(face);
                        let (q, _) = closest_point_on_triangle(point, &a, &b, &c);
                        let d2 = (point - q).norm_squared();
                        let better = match &best {
                            None => d2 <= best_d2,
                            Some(cur) => d2 < cur.distance_squared || (d2 == cur.distance_squared && face < cur.face),
                        };
                        if better {
                            best_d2 = d2;
                            best = Some(NearestTriangle {
                                face,
                                distance_squared: d2,
                                closest_point: q,
                            });
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    // Visit the nearer child first
                    let dl = self.nodes[*left].aabb().distance_squared(point);
                    let dr = self.nodes[*right].aabb().distance_squared(point);
                    if dl <= dr {
                        stack.push(*right);
                        stack.push(*left);
                    } else {
                        stack.push(*left);
                        stack.push(*right);
                    }
                }
            }
        }
        best
    }

    /// Nearest triangle with no distance bound and no filter.
    pub fn find_nearest_triangle_unfiltered(&self, point: &Point3<f64>) -> Option<NearestTriangle<I>> {
        self.find_nearest_triangle(point, f64::MAX, |_| true)
    }
}

fn build_recursive<I: MeshIndex>(
    bounds: &[Aabb],
    centroids: &[Point3<f64>],
    faces: &mut [FaceId<I>],
    first: usize,
    count: usize,
    depth: usize,
    nodes: &mut Vec<BvhNode>,
) -> usize {
    let mut aabb = Aabb::empty();
    for f in &faces[first..first + count] {
        aabb.expand_aabb(&bounds[f.index()]);
    }

    if count <= MAX_LEAF_SIZE || depth >= MAX_DEPTH {
        nodes.push(BvhNode::Leaf { aabb, first, count });
        return nodes.len() - 1;
    }

    // Split at the centroid median along the widest centroid axis
    let mut centroid_bounds = Aabb::empty();
    for f in &faces[first..first + count] {
        centroid_bounds.expand_point(&centroids[f.index()]);
    }
    let axis = centroid_bounds.longest_axis();
    let mid = count / 2;
    faces[first..first + count].select_nth_unstable_by(mid, |a, b| {
        centroids[a.index()][axis].total_cmp(&centroids[b.index()][axis])
    });

    let left = build_recursive(bounds, centroids, faces, first, mid, depth + 1, nodes);
    let right = build_recursive(bounds, centroids, faces, first + mid, count - mid, depth + 1, nodes);
    nodes.push(BvhNode::Internal { aabb, left, right });
    nodes.len() - 1
}
