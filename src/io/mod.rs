//! File I/O.
//!
//! Meshes and their morph targets travel together in the meta-morph text
//! format (see [`metamorph`]). A file without morph targets is simply a mesh.
//!
//! # Usage
//!
//! ```no_run
//! use remorph::io::{load, load_mesh, save};
//! use remorph::io::metamorph::MetaMorph;
//! use remorph::mesh::TriMesh;
//!
//! let meta: MetaMorph = load("face.metamorph").unwrap();
//! let mesh: TriMesh = load_mesh("lod1.metamorph").unwrap();
//! save(&meta, "copy.metamorph").unwrap();
//! ```

pub mod metamorph;

use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::mesh::{MeshIndex, TriMesh};
use metamorph::MetaMorph;

/// Load a meta-morph file.
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<MetaMorph<I>> {
    let path = path.as_ref();
    let meta: MetaMorph<I> = metamorph::load(path)?;
    debug!(
        path = %path.display(),
        vertices = meta.vertices.len(),
        triangles = meta.triangles.len(),
        morph_targets = meta.morph_targets.len(),
        "meta-morph loaded"
    );
    Ok(meta)
}

/// Load only the mesh stored in a meta-morph file.
pub fn load_mesh<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<TriMesh<I>> {
    load::<_, I>(path)?.base_mesh()
}

/// Save a meta-morph file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(meta: &MetaMorph<I>, path: P) -> Result<()> {
    let path = path.as_ref();
    metamorph::save(meta, path)?;
    debug!(path = %path.display(), "meta-morph saved");
    Ok(())
}

/// Save a mesh as a meta-morph file without morph targets.
pub fn save_mesh<P: AsRef<Path>, I: MeshIndex>(mesh: &TriMesh<I>, path: P) -> Result<()> {
    save(&MetaMorph::from_mesh(mesh), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Delta;
    use crate::mesh::{build_from_triangles, VertexId};
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_save_and_load() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh: TriMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        let mut meta = MetaMorph::from_mesh(&mesh);
        meta.morph_target_mut("Lift")
            .deltas
            .insert(Delta::new(VertexId::new(2), Vector3::new(0.0, 0.0, 0.5)));

        let path = std::env::temp_dir().join(format!("remorph_io_{}.metamorph", std::process::id()));
        save(&meta, &path).unwrap();

        let loaded: MetaMorph = load(&path).unwrap();
        let mesh_only: TriMesh = load_mesh(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, meta);
        assert_eq!(mesh_only.num_triangles(), 1);
        assert_eq!(*mesh_only.position(VertexId::new(1)), Point3::new(1.0, 0.0, 0.0));

        save_mesh(&mesh, &path).unwrap();
        let bare: MetaMorph = load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(bare.morph_targets.is_empty());
        assert_eq!(bare.vertices.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load::<_, u32>("/nonexistent/remorph.metamorph");
        assert!(matches!(result, Err(crate::error::MeshError::Io(_))));
    }
}
