//! Mesh construction utilities.
//!
//! Builds [`TriMesh`] values from face-vertex lists, the layout used by the
//! meta-morph format and by most interchange formats.

use nalgebra::Point3;

use super::index::{FaceId, MeshIndex, VertexId};
use super::trimesh::{Triangle, TriMesh, Vertex};
use crate::error::{MeshError, Result};

/// Build a triangle mesh from vertices and triangle faces.
///
/// Vertices that no face references are kept as unreferenced vertices, and
/// an empty face list yields a point cloud with zero triangles.
///
/// # Errors
/// Fails if a face references a vertex out of range or repeats a vertex.
///
/// # Example
/// ```
/// use remorph::mesh::{build_from_triangles, TriMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: TriMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_triangles(), 1);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<TriMesh<I>> {
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            if vi >= vertices.len() {
                return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
            }
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(MeshError::DegenerateFace { face: fi });
        }
    }

    let mut mesh = TriMesh::with_capacity(vertices.len(), faces.len());
    mesh.vertices
        .extend(vertices.iter().map(|&p| Vertex::new(p)));

    for (fi, face) in faces.iter().enumerate() {
        let id = FaceId::new(fi);
        let corners = face.map(VertexId::new);
        mesh.triangles.push(Triangle::new(corners));
        for v in corners {
            mesh.vertices[v.index()].triangles.push(id);
        }
    }

    Ok(mesh)
}

/// Convert a mesh back to a face-vertex representation.
///
/// Vertex slots are preserved one-to-one, so removed vertices still occupy
/// their index (at their last position).
pub fn to_face_vertex<I: MeshIndex>(mesh: &TriMesh<I>) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();

    let faces: Vec<[usize; 3]> = mesh
        .triangles
        .iter()
        .map(|t| t.vertices.map(|v| v.index()))
        .collect();

    (vertices, faces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        // Two triangles sharing an edge
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_two_triangles() {
        let (vertices, faces) = two_triangles();
        let mesh: TriMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_triangles(), 2);
        assert_eq!(mesh.vertex_faces(VertexId::new(0)).count(), 2);
        assert_eq!(mesh.vertex_faces(VertexId::new(2)).count(), 1);
    }

    #[test]
    fn test_roundtrip() {
        let (vertices, faces) = two_triangles();
        let mesh: TriMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        let (out_verts, out_faces) = to_face_vertex(&mesh);

        assert_eq!(out_faces, faces);
        for (v_in, v_out) in vertices.iter().zip(out_verts.iter()) {
            assert!((v_in - v_out).norm() < 1e-10);
        }
    }

    #[test]
    fn test_empty_faces_allowed() {
        let vertices = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let mesh: TriMesh<u32> = build_from_triangles(&vertices, &[]).unwrap();
        assert_eq!(mesh.num_vertices(), 2);
        assert_eq!(mesh.num_triangles(), 0);
    }

    #[test]
    fn test_invalid_vertex_index() {
        let vertices = vec![Point3::new(0.0, 0.0, 0.0)];
        let faces = vec![[0, 1, 2]];

        let result: Result<TriMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(
            result,
            Err(MeshError::InvalidVertexIndex { face: 0, vertex: 1 })
        ));
    }

    #[test]
    fn test_degenerate_face() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let faces = vec![[0, 0, 2]];

        let result: Result<TriMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(MeshError::DegenerateFace { face: 0 })));
    }
}
