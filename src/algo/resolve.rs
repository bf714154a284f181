//! Turning a meta-morph file into morph targets of a concrete mesh.
//!
//! Morph targets in a meta-morph are authored against its base mesh. They
//! are first projected onto the welded variant of the target (one vertex per
//! distinct position), then pushed from the welded mesh onto the render mesh
//! with [`TransferConfig::seam_transfer`], which lands the same delta on
//! every seam copy of a vertex.
//!
//! Requirement blocks only take part when the welded mesh has exactly the
//! vertex and triangle count they name. Their `ignore` lines drop welded
//! vertices from every morph target; their `move` lines become extra morph
//! targets named `Fix_<mask>`, or are folded into every morph target.
//!
//! [`author_meta_morph`] goes the other way: it stores render-mesh morph
//! targets against the welded mesh, together with ignore and move masks.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::project::{project_deltas, project_deltas_ignoring};
use crate::config::TransferConfig;
use crate::delta::{Delta, DeltaSet};
use crate::error::Result;
use crate::io::metamorph::{
    MetaMorph, MorphTarget, Requirement, RequirementBlock, VertexMask, VertexMove,
};
use crate::mesh::{MeshIndex, TriMesh, VertexId};

/// Prefix of the morph targets built from `move` lines.
pub const FIX_PREFIX: &str = "Fix_";

/// Resolve every morph target of `meta` onto `target`.
///
/// `welded` must be the welded variant of `target`, e.g. from
/// [`weld_mesh`](super::weld::weld_mesh). With `merge_moves`, move sets are
/// added into every morph target and only the morph targets are returned;
/// otherwise the move sets follow the morph targets in the output.
///
/// Fails only when the file's base mesh cannot be built.
pub fn resolve_meta_morph<I: MeshIndex>(
    meta: &MetaMorph<I>,
    target: &TriMesh<I>,
    welded: &TriMesh<I>,
    config: &TransferConfig,
    merge_moves: bool,
) -> Result<Vec<MorphTarget<I>>> {
    let base = meta.base_mesh()?;
    let seam = TransferConfig::seam_transfer().with_parallel(config.parallel);

    let vertex_count = welded.vertex_count();
    let triangle_count = welded.num_triangles();
    let active: Vec<_> = meta
        .requirement_blocks
        .iter()
        .filter(|b| b.is_active(vertex_count, triangle_count))
        .collect();

    let ignored: HashSet<VertexId<I>> = active
        .iter()
        .copied()
        .flat_map(|b| b.ignore.iter())
        .filter_map(|&i| VertexId::try_new(i))
        .collect();

    let mut resolved: Vec<MorphTarget<I>> = Vec::with_capacity(meta.morph_targets.len());
    for morph in &meta.morph_targets {
        let on_welded = project_deltas_ignoring(welded, &base, &morph.deltas, true, config, &ignored);
        let deltas = project_deltas(target, welded, &on_welded, true, &seam);
        debug!(
            name = %morph.name,
            authored = morph.deltas.len(),
            welded = on_welded.len(),
            resolved = deltas.len(),
            "morph target resolved"
        );
        resolved.push(MorphTarget::new(morph.name.clone(), deltas));
    }

    // Blocks sharing a mask feed one move set, in order of first appearance
    let mut move_sets: Vec<MorphTarget<I>> = Vec::new();
    for block in &active {
        let Some(mask) = &block.mask else { continue };
        if block.moves.is_empty() {
            continue;
        }
        let name = format!("{}{}", FIX_PREFIX, mask);
        let index = match move_sets.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                move_sets.push(MorphTarget::new(name, DeltaSet::new()));
                move_sets.len() - 1
            }
        };
        let set = &mut move_sets[index].deltas;
        for m in &block.moves {
            let Some(v) = VertexId::try_new(m.vertex) else { continue };
            let offset = if welded.is_vertex(v) {
                let p = welded.position(v);
                (m.transform.apply(p) - p).cast::<f32>()
            } else {
                nalgebra::Vector3::zeros()
            };
            set.insert(Delta::new(v, offset));
        }
    }

    for set in &mut move_sets {
        set.deltas = project_deltas(target, welded, &set.deltas, true, &seam);
        debug!(name = %set.name, resolved = set.deltas.len(), "move set resolved");
    }

    if merge_moves {
        for morph in &mut resolved {
            for set in &move_sets {
                morph.deltas.accumulate(&set.deltas);
            }
        }
    } else {
        resolved.extend(move_sets);
    }

    Ok(resolved)
}

/// Build a meta-morph file from morph targets of a render mesh.
///
/// `welded` must be the welded variant of `render` and becomes the file's
/// base mesh. Each target is projected onto it with
/// [`TransferConfig::seam_transfer`]; targets that leave no delta there are
/// not stored. Ignore masks are written before move masks so a reader does
/// not carry a move mask's name into an ignore block. Masks without a
/// requirement are tied to the welded mesh's counts, and move masks without
/// a name are skipped.
pub fn author_meta_morph<I: MeshIndex>(
    render: &TriMesh<I>,
    welded: &TriMesh<I>,
    targets: &[MorphTarget<I>],
    ignore_masks: &[VertexMask],
    move_masks: &[VertexMask],
    config: &TransferConfig,
) -> MetaMorph<I> {
    let seam = TransferConfig::seam_transfer().with_parallel(config.parallel);
    let mut meta = MetaMorph::from_mesh(welded);

    for morph in targets {
        let deltas = project_deltas(welded, render, &morph.deltas, true, &seam);
        debug!(
            name = %morph.name,
            render = morph.deltas.len(),
            welded = deltas.len(),
            "morph target authored"
        );
        if !deltas.is_empty() {
            meta.morph_target_mut(&morph.name).deltas.accumulate(&deltas);
        }
    }

    let welded_counts = Requirement {
        vertex_count: welded.vertex_count(),
        triangle_count: welded.num_triangles(),
    };
    for mask in ignore_masks {
        meta.requirement_blocks.push(RequirementBlock {
            requirement: Some(mask.requirement.unwrap_or(welded_counts)),
            mask: None,
            ignore: mask.vertices.clone(),
            moves: Vec::new(),
        });
    }
    for mask in move_masks {
        if mask.name.is_empty() {
            warn!(vertices = mask.vertices.len(), "move mask without a name skipped");
            continue;
        }
        meta.requirement_blocks.push(RequirementBlock {
            requirement: Some(mask.requirement.unwrap_or(welded_counts)),
            mask: Some(mask.name.clone()),
            ignore: Vec::new(),
            moves: mask
                .vertices
                .iter()
                .map(|&vertex| VertexMove {
                    vertex,
                    transform: mask.transform,
                })
                .collect(),
        });
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::weld::weld_mesh;
    use crate::io::metamorph::{parse, RigidTransform};
    use crate::mesh::build_from_triangles;
    use nalgebra::{Point3, Vector3};

    /// Unit quad whose second triangle uses seam copies of vertices 0 and 2.
    fn create_render_quad() -> TriMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        build_from_triangles(&vertices, &[[0, 1, 2], [4, 5, 3]]).unwrap()
    }

    const META: &str = "\
#METAMORPH FILE
vertice 0 0 0
vertice 1 0 0
vertice 1 1 0
vertice 0 1 0
triangle 0 1 2
triangle 0 2 3
morphtarget Corner
delta 0:0 0 0.5
morphtarget Diagonal
delta 0:0 0 0.5
delta 2:0 0 0.5
requirements 5:2
ignore 2
requirements 4:2:Lift
ignore 0
move 1:0,0,1
#END
";

    fn z(set: &DeltaSet, v: usize) -> Option<f32> {
        set.get(VertexId::new(v)).map(|d| d.position_delta.z)
    }

    #[test]
    fn test_resolve_reaches_seam_copies() {
        let target = create_render_quad();
        let welded = weld_mesh(&target, 1e-4, true).mesh;
        assert_eq!(welded.vertex_count(), 4);

        let mut meta: MetaMorph = parse(META).unwrap();
        meta.requirement_blocks.clear();
        meta.morph_targets.truncate(1);
        let resolved =
            resolve_meta_morph(&meta, &target, &welded, &TransferConfig::default(), true).unwrap();

        assert_eq!(resolved.len(), 1);
        let corner = &resolved[0].deltas;
        assert_eq!(corner.len(), 2, "vertex 0 and its seam copy");
        assert_eq!(z(corner, 0), Some(0.5));
        assert_eq!(z(corner, 4), Some(0.5));
        assert_eq!(
            corner.get(VertexId::new(0)).unwrap().position_delta,
            corner.get(VertexId::new(4)).unwrap().position_delta,
            "seam copies move together"
        );
    }

    #[test]
    fn test_requirements_gate_ignore_and_moves() {
        let target = create_render_quad();
        let welded = weld_mesh(&target, 1e-4, true).mesh;
        let meta: MetaMorph = parse(META).unwrap();

        let resolved =
            resolve_meta_morph(&meta, &target, &welded, &TransferConfig::default(), false).unwrap();
        let names: Vec<&str> = resolved.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Corner", "Diagonal", "Fix_Lift"]);

        // Vertex 0 is ignored by the active block, vertex 2 only by the inactive one
        assert!(resolved[0].deltas.is_empty(), "Corner only moved an ignored vertex");
        let diagonal = &resolved[1].deltas;
        assert_eq!(z(diagonal, 0), None);
        assert_eq!(z(diagonal, 2), Some(0.5));
        assert_eq!(z(diagonal, 5), Some(0.5));

        let lift = &resolved[2].deltas;
        assert_eq!(lift.len(), 1);
        assert_eq!(lift.get(VertexId::new(1)).unwrap().position_delta, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_merge_moves_into_targets() {
        let target = create_render_quad();
        let welded = weld_mesh(&target, 1e-4, true).mesh;
        let meta: MetaMorph = parse(META).unwrap();

        let resolved =
            resolve_meta_morph(&meta, &target, &welded, &TransferConfig::default(), true).unwrap();
        assert_eq!(resolved.len(), 2, "move sets are folded in");
        for morph in &resolved {
            assert_eq!(z(&morph.deltas, 1), Some(1.0), "{} carries the move", morph.name);
        }
        assert_eq!(z(&resolved[1].deltas, 2), Some(0.5));
    }

    #[test]
    fn test_inactive_requirements_drop_moves() {
        let target = create_render_quad();
        let welded = weld_mesh(&target, 1e-4, true).mesh;
        let meta: MetaMorph =
            parse("#METAMORPH FILE\nvertice 0 0 0\nrequirements 9:9:Lift\nmove 0:0,0,1\n").unwrap();

        let resolved =
            resolve_meta_morph(&meta, &target, &welded, &TransferConfig::default(), false).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_bad_base_mesh_is_an_error() {
        let target = create_render_quad();
        let welded = weld_mesh(&target, 1e-4, true).mesh;
        let meta: MetaMorph = parse("#METAMORPH FILE\ntriangle 0 1 2\n").unwrap();
        assert!(resolve_meta_morph(&meta, &target, &welded, &TransferConfig::default(), true).is_err());
    }

    #[test]
    fn test_author_then_resolve_round_trip() {
        let render = create_render_quad();
        let welded = weld_mesh(&render, 1e-4, true).mesh;
        let lift = |vertices: &[usize]| -> DeltaSet {
            vertices
                .iter()
                .map(|&v| Delta::new(VertexId::new(v), Vector3::new(0.0, 0.0, 0.5)))
                .collect()
        };
        let targets = vec![
            MorphTarget::new("Corner", lift(&[0, 4])),
            MorphTarget::new("Diagonal", lift(&[0, 4, 2, 5])),
            MorphTarget::new("Empty", DeltaSet::new()),
        ];
        let ignore = [VertexMask::ignore(vec![2])];
        let moves = [
            VertexMask::moving("Lift", vec![1], RigidTransform::from_translation(Vector3::z())),
            VertexMask::moving("", vec![3], RigidTransform::from_translation(Vector3::x())),
        ];

        let config = TransferConfig::default();
        let meta = author_meta_morph(&render, &welded, &targets, &ignore, &moves, &config);
        let names: Vec<&str> = meta.morph_targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Corner", "Diagonal"], "empty targets are not stored");
        assert_eq!(meta.vertices.len(), 4, "base mesh is the welded mesh");
        assert_eq!(meta.requirement_blocks.len(), 2, "nameless move mask is skipped");

        let reparsed: MetaMorph = parse(&meta.to_string()).unwrap();
        assert_eq!(reparsed.requirement_blocks, meta.requirement_blocks);

        let resolved = resolve_meta_morph(&reparsed, &render, &welded, &config, false).unwrap();
        let names: Vec<&str> = resolved.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Corner", "Diagonal", "Fix_Lift"]);

        let corner = &resolved[0].deltas;
        assert_eq!(corner.len(), 2);
        assert_eq!(z(corner, 0), Some(0.5));
        assert_eq!(z(corner, 4), Some(0.5));

        let diagonal = &resolved[1].deltas;
        assert_eq!(z(diagonal, 0), Some(0.5));
        assert_eq!(z(diagonal, 4), Some(0.5));
        assert_eq!(z(diagonal, 2), None, "welded vertex 2 is ignored");
        assert_eq!(z(diagonal, 5), None, "and so is its seam copy");

        let fix = &resolved[2].deltas;
        assert_eq!(fix.len(), 1);
        assert_eq!(fix.get(VertexId::new(1)).unwrap().position_delta, Vector3::new(0.0, 0.0, 1.0));
    }
}
