//! Indexed triangle mesh with seam-aware attributes.
//!
//! Render meshes duplicate vertices along UV and material seams, may carry
//! unreferenced vertices, and can have holes where vertices were removed.
//! [`TriMesh`] keeps all of that intact. Each vertex stores the triangles
//! that reference it, so one-ring queries and vertex normals need no global
//! pass.
//!
//! # Attributes
//!
//! - Vertex normals are optional. When absent they are computed on demand
//!   from incident triangles (area weighted).
//! - UVs are stored per triangle corner, so a shared vertex can have a
//!   different UV in each triangle.
//! - Material ids are stored per triangle.

use nalgebra::{Point2, Point3, Vector3};

use super::index::{FaceId, MeshIndex, VertexId};
use crate::algo::parallel::parallel_map;
use crate::error::{MeshError, Result};

/// A vertex of a [`TriMesh`].
#[derive(Debug, Clone)]
pub struct Vertex<I: MeshIndex = u32> {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// Triangles referencing this vertex, in insertion order.
    pub(crate) triangles: Vec<FaceId<I>>,

    /// Removed vertices keep their slot so indices stay stable.
    pub(crate) removed: bool,
}

impl<I: MeshIndex> Vertex<I> {
    /// Create a new unreferenced vertex at the given position.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            triangles: Vec::new(),
            removed: false,
        }
    }

    /// Triangles referencing this vertex.
    pub fn triangles(&self) -> &[FaceId<I>] {
        &self.triangles
    }
}

/// A triangle of a [`TriMesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle<I: MeshIndex = u32> {
    /// Corner vertices, counter-clockwise.
    pub vertices: [VertexId<I>; 3],
}

impl<I: MeshIndex> Triangle<I> {
    /// Create a triangle from its corners.
    pub fn new(vertices: [VertexId<I>; 3]) -> Self {
        Self { vertices }
    }

    /// Check whether `v` is one of the corners.
    #[inline]
    pub fn contains(&self, v: VertexId<I>) -> bool {
        self.vertices.contains(&v)
    }
}

/// An indexed triangle mesh.
#[derive(Debug, Clone)]
pub struct TriMesh<I: MeshIndex = u32> {
    pub(crate) vertices: Vec<Vertex<I>>,
    pub(crate) triangles: Vec<Triangle<I>>,
    pub(crate) normals: Option<Vec<Vector3<f32>>>,
    pub(crate) uvs: Option<Vec<[Point2<f32>; 3]>>,
    pub(crate) materials: Option<Vec<i32>>,
}

impl<I: MeshIndex> Default for TriMesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> TriMesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            triangles: Vec::new(),
            normals: None,
            uvs: None,
            materials: None,
        }
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(num_vertices),
            triangles: Vec::with_capacity(num_triangles),
            normals: None,
            uvs: None,
            materials: None,
        }
    }

    // ==================== Accessors ====================

    /// Number of vertex slots, including removed ones.
    ///
    /// Valid vertex indices are below this value; check [`is_vertex`](Self::is_vertex)
    /// before using one.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of live (non-removed) vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| !v.removed).count()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Check whether `v` names a live vertex.
    #[inline]
    pub fn is_vertex(&self, v: VertexId<I>) -> bool {
        v.is_valid() && self.vertices.get(v.index()).is_some_and(|vx| !vx.removed)
    }

    /// Check whether `f` names a triangle.
    #[inline]
    pub fn is_triangle(&self, f: FaceId<I>) -> bool {
        f.is_valid() && f.index() < self.triangles.len()
    }

    /// Get a vertex by ID.
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex<I> {
        &self.vertices[id.index()]
    }

    /// Get a triangle by ID.
    #[inline]
    pub fn triangle(&self, id: FaceId<I>) -> &Triangle<I> {
        &self.triangles[id.index()]
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertices[v.index()].position
    }

    /// Set the position of a vertex.
    ///
    /// Stored normals are left untouched; call [`compute_normals`](Self::compute_normals)
    /// once all positions are final.
    #[inline]
    pub fn set_position(&mut self, v: VertexId<I>, pos: Point3<f64>) {
        self.vertices[v.index()].position = pos;
    }

    /// Corner vertices of a triangle.
    #[inline]
    pub fn face_triangle(&self, f: FaceId<I>) -> [VertexId<I>; 3] {
        self.triangles[f.index()].vertices
    }

    /// Corner positions of a triangle.
    pub fn face_positions(&self, f: FaceId<I>) -> [Point3<f64>; 3] {
        let [v0, v1, v2] = self.face_triangle(f);
        [*self.position(v0), *self.position(v1), *self.position(v2)]
    }

    /// Per-corner UVs of a triangle, if the mesh has a UV overlay.
    pub fn face_uvs(&self, f: FaceId<I>) -> Option<[Point2<f32>; 3]> {
        self.uvs.as_ref().map(|uvs| uvs[f.index()])
    }

    /// Material id of a triangle (0 when the mesh has no materials).
    pub fn material(&self, f: FaceId<I>) -> i32 {
        self.materials.as_ref().map_or(0, |m| m[f.index()])
    }

    /// Whether the mesh carries a UV overlay.
    pub fn has_uvs(&self) -> bool {
        self.uvs.is_some()
    }

    /// Whether the mesh carries per-triangle material ids.
    pub fn has_materials(&self) -> bool {
        self.materials.is_some()
    }

    /// Whether the mesh carries stored vertex normals.
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    // ==================== Iteration ====================

    /// Iterate over live vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.removed)
            .map(|(i, _)| VertexId::new(i))
    }

    /// Iterate over live vertices with their IDs.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId<I>, &Vertex<I>)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.removed)
            .map(|(i, v)| (VertexId::new(i), v))
    }

    /// Iterate over all triangle IDs.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId<I>> + '_ {
        (0..self.triangles.len()).map(FaceId::new)
    }

    /// Iterate over all triangles with their IDs.
    pub fn triangles(&self) -> impl Iterator<Item = (FaceId<I>, &Triangle<I>)> + '_ {
        self.triangles
            .iter()
            .enumerate()
            .map(|(i, t)| (FaceId::new(i), t))
    }

    /// Triangles referencing a vertex.
    pub fn vertex_faces(&self, v: VertexId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.vertices[v.index()].triangles.iter().copied()
    }

    /// Vertices sharing a triangle with `v`, ascending and without duplicates.
    pub fn vertex_neighbors(&self, v: VertexId<I>) -> Vec<VertexId<I>> {
        let mut ring: Vec<VertexId<I>> = self
            .vertex_faces(v)
            .flat_map(|f| self.face_triangle(f))
            .filter(|&u| u != v)
            .collect();
        ring.sort_unstable();
        ring.dedup();
        ring
    }

    // ==================== Geometry ====================

    /// Unnormalized face normal (twice the area, pointing out of the CCW side).
    #[inline]
    pub fn face_cross(&self, f: FaceId<I>) -> Vector3<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        (p1 - p0).cross(&(p2 - p0))
    }

    /// Unit face normal, or zero for a degenerate triangle.
    pub fn face_normal(&self, f: FaceId<I>) -> Vector3<f64> {
        self.face_cross(f)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Area of a triangle.
    pub fn face_area(&self, f: FaceId<I>) -> f64 {
        0.5 * self.face_cross(f).norm()
    }

    /// Area-weighted vertex normal computed from the current positions.
    ///
    /// Returns zero for unreferenced vertices and for vertices whose incident
    /// triangles cancel out.
    pub fn compute_vertex_normal(&self, v: VertexId<I>) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        for f in self.vertex_faces(v) {
            normal += self.face_cross(f);
        }
        normal
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    /// Vertex normal: the stored one when present, otherwise computed.
    pub fn vertex_normal(&self, v: VertexId<I>) -> Vector3<f64> {
        match &self.normals {
            Some(normals) => normals[v.index()].cast::<f64>(),
            None => self.compute_vertex_normal(v),
        }
    }

    /// Recompute and store normals for every vertex slot.
    pub fn compute_normals(&mut self, parallel: bool) {
        let normals: Vec<Vector3<f32>> = parallel_map(self.vertices.len(), parallel, |i| {
            if self.vertices[i].removed {
                Vector3::zeros()
            } else {
                self.compute_vertex_normal(VertexId::new(i)).cast::<f32>()
            }
        });
        self.normals = Some(normals);
    }

    /// Drop stored normals; [`vertex_normal`](Self::vertex_normal) computes them again.
    pub fn clear_normals(&mut self) {
        self.normals = None;
    }

    /// Store authored vertex normals, one per vertex slot.
    pub fn set_normals(&mut self, normals: Vec<Vector3<f32>>) -> Result<()> {
        if normals.len() != self.vertices.len() {
            return Err(MeshError::AttributeLength {
                attribute: "normals",
                expected: self.vertices.len(),
                found: normals.len(),
            });
        }
        self.normals = Some(normals);
        Ok(())
    }

    /// Axis-aligned bounds of the live vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut live = self.vertices.iter().filter(|v| !v.removed);
        let first = live.next()?.position;
        let (mut min, mut max) = (first, first);
        for v in live {
            for i in 0..3 {
                min[i] = min[i].min(v.position[i]);
                max[i] = max[i].max(v.position[i]);
            }
        }
        Some((min, max))
    }

    // ==================== Construction ====================

    /// Add a new vertex and return its ID.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Vertex::new(position));
        if let Some(normals) = &mut self.normals {
            normals.push(Vector3::zeros());
        }
        id
    }

    /// Add a triangle over three distinct live vertices.
    ///
    /// If the mesh has a UV overlay or materials, the new triangle gets zero
    /// UVs and material 0.
    pub fn add_triangle(&mut self, vertices: [VertexId<I>; 3]) -> Result<FaceId<I>> {
        let face = self.triangles.len();
        for v in vertices {
            if !self.is_vertex(v) {
                return Err(MeshError::InvalidVertexIndex {
                    face,
                    vertex: v.index(),
                });
            }
        }
        if vertices[0] == vertices[1] || vertices[1] == vertices[2] || vertices[0] == vertices[2] {
            return Err(MeshError::DegenerateFace { face });
        }

        let id = FaceId::new(face);
        self.triangles.push(Triangle::new(vertices));
        for v in vertices {
            self.vertices[v.index()].triangles.push(id);
        }
        if let Some(uvs) = &mut self.uvs {
            uvs.push([Point2::origin(); 3]);
        }
        if let Some(materials) = &mut self.materials {
            materials.push(0);
        }
        Ok(id)
    }

    /// Attach a per-corner UV overlay, one entry per triangle.
    pub fn set_uvs(&mut self, uvs: Vec<[Point2<f32>; 3]>) -> Result<()> {
        if uvs.len() != self.triangles.len() {
            return Err(MeshError::AttributeLength {
                attribute: "uvs",
                expected: self.triangles.len(),
                found: uvs.len(),
            });
        }
        self.uvs = Some(uvs);
        Ok(())
    }

    /// Attach per-triangle material ids.
    pub fn set_materials(&mut self, materials: Vec<i32>) -> Result<()> {
        if materials.len() != self.triangles.len() {
            return Err(MeshError::AttributeLength {
                attribute: "materials",
                expected: self.triangles.len(),
                found: materials.len(),
            });
        }
        self.materials = Some(materials);
        Ok(())
    }

    /// Remove a vertex together with every triangle that references it.
    ///
    /// The vertex slot becomes a hole. Remaining triangles are renumbered
    /// to stay contiguous, so previously obtained [`FaceId`]s are invalidated.
    pub fn remove_vertex(&mut self, v: VertexId<I>) -> bool {
        if !self.is_vertex(v) {
            return false;
        }
        self.vertices[v.index()].removed = true;

        if !self.vertices[v.index()].triangles.is_empty() {
            let keep: Vec<bool> = self.triangles.iter().map(|t| !t.contains(v)).collect();
            let mut flags = keep.iter();
            self.triangles.retain(|_| *flags.next().unwrap_or(&true));
            if let Some(uvs) = &mut self.uvs {
                let mut flags = keep.iter();
                uvs.retain(|_| *flags.next().unwrap_or(&true));
            }
            if let Some(materials) = &mut self.materials {
                let mut flags = keep.iter();
                materials.retain(|_| *flags.next().unwrap_or(&true));
            }
            self.rebuild_adjacency();
        }
        true
    }

    /// Recompute vertex-to-triangle adjacency from the triangle list.
    pub(crate) fn rebuild_adjacency(&mut self) {
        for v in &mut self.vertices {
            v.triangles.clear();
        }
        for (fi, t) in self.triangles.iter().enumerate() {
            for v in t.vertices {
                self.vertices[v.index()].triangles.push(FaceId::new(fi));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_triangles;

    fn create_quad() -> TriMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_adjacency() {
        let mesh = create_quad();
        let faces: Vec<FaceId> = mesh.vertex_faces(VertexId::new(0)).collect();
        assert_eq!(faces, vec![FaceId::new(0), FaceId::new(1)]);
        assert_eq!(mesh.vertex_faces(VertexId::new(1)).count(), 1);
        assert_eq!(
            mesh.vertex_neighbors(VertexId::new(0)),
            vec![VertexId::new(1), VertexId::new(2), VertexId::new(3)]
        );
        assert_eq!(
            mesh.vertex_neighbors(VertexId::new(1)),
            vec![VertexId::new(0), VertexId::new(2)]
        );
    }

    #[test]
    fn test_normals_point_up() {
        let mesh = create_quad();
        for v in mesh.vertex_ids() {
            let n = mesh.vertex_normal(v);
            assert!((n - Vector3::z()).norm() < 1e-12, "normal of {:?} is {:?}", v, n);
        }
        assert!((mesh.face_area(FaceId::new(0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unreferenced_vertex_has_zero_normal() {
        let mut mesh = create_quad();
        let lonely = mesh.add_vertex(Point3::new(5.0, 5.0, 5.0));
        assert_eq!(mesh.vertex_normal(lonely), Vector3::zeros());
        assert_eq!(mesh.vertex_faces(lonely).count(), 0);
    }

    #[test]
    fn test_stored_normals_take_precedence() {
        let mut mesh = create_quad();
        mesh.compute_normals(true);
        assert!(mesh.has_normals());

        // Moving a vertex does not touch the stored normal until recomputed
        mesh.set_position(VertexId::new(2), Point3::new(1.0, 1.0, 1.0));
        assert!((mesh.vertex_normal(VertexId::new(2)) - Vector3::z()).norm() < 1e-6);
        assert!((mesh.compute_vertex_normal(VertexId::new(2)) - Vector3::z()).norm() > 1e-3);

        mesh.compute_normals(false);
        let stored = mesh.vertex_normal(VertexId::new(2));
        let computed = mesh.compute_vertex_normal(VertexId::new(2));
        assert!((stored - computed).norm() < 1e-6);
    }

    #[test]
    fn test_compute_normals_sequential_matches_parallel() {
        let mut parallel = create_quad();
        parallel.set_position(VertexId::new(2), Point3::new(1.0, 1.0, 0.5));
        let lonely = parallel.add_vertex(Point3::new(5.0, 5.0, 5.0));
        let mut sequential = parallel.clone();

        parallel.compute_normals(true);
        sequential.compute_normals(false);
        for v in parallel.vertex_ids() {
            assert_eq!(
                parallel.vertex_normal(v),
                sequential.vertex_normal(v),
                "normal of {:?} depends on the parallel switch",
                v
            );
        }
        assert_eq!(sequential.vertex_normal(lonely), Vector3::zeros());
    }

    #[test]
    fn test_remove_vertex_leaves_hole() {
        let mut mesh = create_quad();
        assert!(mesh.remove_vertex(VertexId::new(3)));

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.num_triangles(), 1);
        assert!(!mesh.is_vertex(VertexId::new(3)));
        assert_eq!(mesh.vertex_ids().count(), 3);
        assert_eq!(mesh.vertex_faces(VertexId::new(0)).count(), 1);

        // Removing twice is a no-op
        assert!(!mesh.remove_vertex(VertexId::new(3)));
    }

    #[test]
    fn test_attribute_lengths_checked() {
        let mut mesh = create_quad();
        assert!(mesh.set_materials(vec![1]).is_err());
        assert!(mesh.set_materials(vec![1, 2]).is_ok());
        assert_eq!(mesh.material(FaceId::new(1)), 2);

        let uv = [Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(1.0, 1.0)];
        assert!(mesh.set_uvs(vec![uv, uv]).is_ok());
        assert_eq!(mesh.face_uvs(FaceId::new(0)), Some(uv));
    }

    #[test]
    fn test_add_triangle_validation() {
        let mut mesh = create_quad();
        assert!(mesh
            .add_triangle([VertexId::new(0), VertexId::new(1), VertexId::new(9)])
            .is_err());
        assert!(mesh
            .add_triangle([VertexId::new(0), VertexId::new(0), VertexId::new(1)])
            .is_err());
        let f = mesh
            .add_triangle([VertexId::new(1), VertexId::new(3), VertexId::new(2)])
            .unwrap();
        assert_eq!(f, FaceId::new(2));
        assert_eq!(mesh.vertex_faces(VertexId::new(3)).count(), 2);
    }

    #[test]
    fn test_bounding_box_skips_removed() {
        let mut mesh = create_quad();
        let far = mesh.add_vertex(Point3::new(10.0, 10.0, 10.0));
        mesh.remove_vertex(far);
        let (min, max) = mesh.bounding_box().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
    }
}
