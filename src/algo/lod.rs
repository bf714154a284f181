//! Delta retargeting onto level-of-detail meshes.
//!
//! LODs share the UV layout of the base mesh but not its vertex indexing, so
//! vertices are located through UV space instead of 3D proximity. Each LOD
//! vertex is bound to one base triangle with barycentric weights, and base
//! deltas are blended through those weights.
//!
//! Matching runs per section: a maximal run of consecutive triangles with
//! one material id. Each LOD section pairs with the first unused base
//! section of the same material; LOD sections without a partner are skipped
//! and their vertices get no delta.
//!
//! A UV hit is only trusted when the triangle is also close in 3D: matches
//! farther than 10% of the base section's squared bounding-box diagonal fall
//! back to the nearest triangle of the section, and are dropped if that is
//! still too far.

use std::collections::HashMap;
use std::ops::Range;

use nalgebra::{Point2, Point3, Vector3};
use tracing::debug;

use super::geometry::{barycentric_weights, point_in_triangle_2d, point_triangle_distance_squared};
use super::parallel::parallel_collect;
use super::spatial::{Aabb, Aabb2, SpatialIndex, UvQuadtree};
use crate::config::TransferConfig;
use crate::delta::{Delta, DeltaSet};
use crate::mesh::{FaceId, MeshIndex, TriMesh, VertexId};

/// Fraction of the squared section diagonal a match may lie away from its triangle.
const FAIL_SAFE_FRACTION: f64 = 0.1;

/// Initial UV search half-extent, as a fraction of the section's UV diagonal.
const INITIAL_WINDOW: f64 = 0.05;

/// Half-extent used when the section's UVs collapse to a point.
const MIN_WINDOW: f64 = 1e-3;

/// Upper bound on window doublings.
const MAX_DOUBLINGS: usize = 64;

/// Binding of a LOD vertex to a base triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarycentricMatch<I: MeshIndex = u32> {
    /// Corners of the base triangle.
    pub triangle: [VertexId<I>; 3],
    /// Weight of each corner; non-negative and summing to one.
    pub weights: [f64; 3],
    /// The base triangle.
    pub face: FaceId<I>,
}

impl<I: MeshIndex> BarycentricMatch<I> {
    /// The "no match" value.
    pub fn invalid() -> Self {
        Self {
            triangle: [VertexId::invalid(); 3],
            weights: [1.0 / 3.0; 3],
            face: FaceId::invalid(),
        }
    }

    /// Whether this binds to a triangle.
    pub fn is_valid(&self) -> bool {
        self.face.is_valid() && self.triangle.iter().all(|v| v.is_valid())
    }

    /// Point on the base triangle described by the weights.
    pub fn interpolate(&self, mesh: &TriMesh<I>) -> Point3<f64> {
        let mut p = Vector3::zeros();
        for (v, w) in self.triangle.iter().zip(self.weights) {
            p += mesh.position(*v).coords * w;
        }
        Point3::from(p)
    }
}

impl<I: MeshIndex> Default for BarycentricMatch<I> {
    fn default() -> Self {
        Self::invalid()
    }
}

/// A run of consecutive triangles sharing one material.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    material: i32,
    faces: Range<usize>,
}

fn sections<I: MeshIndex>(mesh: &TriMesh<I>) -> Vec<Section> {
    let mut out: Vec<Section> = Vec::new();
    for f in mesh.face_ids() {
        let material = mesh.material(f);
        match out.last_mut() {
            Some(s) if s.material == material => s.faces.end = f.index() + 1,
            _ => out.push(Section {
                material,
                faces: f.index()..f.index() + 1,
            }),
        }
    }
    out
}

/// Pair each LOD section with the first unused base section of its material.
fn pair_sections(base: &[Section], lod: &[Section]) -> Vec<(usize, usize)> {
    let mut used = vec![false; base.len()];
    let mut pairs = Vec::new();
    for (li, ls) in lod.iter().enumerate() {
        if let Some(bi) = (0..base.len()).find(|&bi| !used[bi] && base[bi].material == ls.material) {
            used[bi] = true;
            pairs.push((li, bi));
        }
    }
    pairs
}

/// Lookup structures over one base section.
struct SectionMatcher<'a, I: MeshIndex> {
    mesh: &'a TriMesh<I>,
    index: &'a SpatialIndex<'a, I>,
    faces: Range<usize>,
    uv_tree: Option<UvQuadtree>,
    initial_extent: f64,
    bound: f64,
}

impl<'a, I: MeshIndex> SectionMatcher<'a, I> {
    fn new(mesh: &'a TriMesh<I>, index: &'a SpatialIndex<'a, I>, faces: Range<usize>) -> Self {
        let mut bounds = Aabb::empty();
        for f in faces.clone() {
            for p in mesh.face_positions(FaceId::new(f)) {
                bounds.expand_point(&p);
            }
        }
        let bound = FAIL_SAFE_FRACTION * bounds.diagonal_squared();

        let mut uv_tree = None;
        let mut initial_extent = MIN_WINDOW;
        if mesh.has_uvs() {
            let boxes: Vec<(u32, Aabb2)> = faces
                .clone()
                .enumerate()
                .filter_map(|(local, f)| {
                    let uvs = mesh.face_uvs(FaceId::new(f))?.map(|uv| uv.cast::<f64>());
                    Some((local as u32, Aabb2::from_points(&uvs)?))
                })
                .collect();
            let all = boxes.iter().flat_map(|(_, b)| [b.min, b.max]).collect::<Vec<_>>();
            if let Some(uv_bounds) = Aabb2::from_points(&all) {
                let diagonal = uv_bounds.diagonal();
                if diagonal > 0.0 {
                    initial_extent = INITIAL_WINDOW * diagonal;
                }
                let mut tree = UvQuadtree::new(uv_bounds);
                for (id, b) in boxes {
                    tree.insert(id, b);
                }
                uv_tree = Some(tree);
            }
        }

        Self {
            mesh,
            index,
            faces,
            uv_tree,
            initial_extent,
            bound,
        }
    }

    fn distance_squared(&self, p: &Point3<f64>, f: FaceId<I>) -> f64 {
        let [a, b, c] = self.mesh.face_positions(f);
        point_triangle_distance_squared(p, &a, &b, &c)
    }

    /// Nearest of `faces` in 3D, lowest id on ties.
    fn nearest_of(&self, p: &Point3<f64>, faces: impl Iterator<Item = FaceId<I>>) -> Option<(FaceId<I>, f64)> {
        let mut best: Option<(FaceId<I>, f64)> = None;
        for f in faces {
            let d2 = self.distance_squared(p, f);
            if best.map_or(true, |(_, b)| d2 < b) {
                best = Some((f, d2));
            }
        }
        best
    }

    /// Candidate triangles from the UV window search, ascending.
    fn uv_candidates(&self, uv: &Point2<f64>) -> Vec<FaceId<I>> {
        let Some(tree) = &self.uv_tree else {
            return Vec::new();
        };
        let mut extent = self.initial_extent;
        for _ in 0..=MAX_DOUBLINGS {
            let found = tree.query(&Aabb2::around(uv, extent));
            if !found.is_empty() {
                return found
                    .into_iter()
                    .map(|local| FaceId::new(self.faces.start + local as usize))
                    .collect();
            }
            extent *= 2.0;
        }
        Vec::new()
    }

    fn match_vertex(&self, p: &Point3<f64>, uv: Option<Point2<f32>>) -> BarycentricMatch<I> {
        let mut chosen = None;
        if let Some(uv) = uv {
            let candidates = self.uv_candidates(&uv.cast::<f64>());
            let hits: Vec<FaceId<I>> = candidates
                .iter()
                .copied()
                .filter(|&f| {
                    self.mesh
                        .face_uvs(f)
                        .is_some_and(|[a, b, c]| point_in_triangle_2d(&uv, &a, &b, &c))
                })
                .collect();
            chosen = match hits.len() {
                0 => self.nearest_of(p, candidates.into_iter()),
                1 => Some((hits[0], self.distance_squared(p, hits[0]))),
                _ => self.nearest_of(p, hits.into_iter()),
            };
        }

        if chosen.map_or(true, |(_, d2)| d2 > self.bound) {
            let range = self.faces.clone();
            chosen = self
                .index
                .find_nearest_triangle(p, f64::MAX, |f| range.contains(&f.index()))
                .map(|hit| (hit.face, hit.distance_squared));
        }

        match chosen {
            Some((face, d2)) if d2 <= self.bound => {
                let triangle = self.mesh.face_triangle(face);
                let [a, b, c] = self.mesh.face_positions(face);
                BarycentricMatch {
                    triangle,
                    weights: barycentric_weights(p, &a, &b, &c),
                    face,
                }
            }
            _ => BarycentricMatch::invalid(),
        }
    }
}

/// Bind every LOD vertex slot to a base triangle.
///
/// The result has one entry per LOD vertex slot. Vertices in unpaired
/// sections, unreferenced vertices and vertices failing the distance bound
/// get [`BarycentricMatch::invalid`].
pub fn match_lod_vertices<I: MeshIndex>(
    base: &TriMesh<I>,
    lod: &TriMesh<I>,
    parallel: bool,
) -> Vec<BarycentricMatch<I>> {
    let mut matches = vec![BarycentricMatch::invalid(); lod.num_vertices()];
    let base_sections = sections(base);
    let lod_sections = sections(lod);
    let pairs = pair_sections(&base_sections, &lod_sections);
    let index = SpatialIndex::build(base);
    let use_uvs = lod.has_uvs();

    let mut seen = vec![false; lod.num_vertices()];
    for &(li, bi) in &pairs {
        let matcher = SectionMatcher::new(base, &index, base_sections[bi].faces.clone());

        // Each vertex takes the UV of its first corner in the first section using it
        let mut queue: Vec<(VertexId<I>, Option<Point2<f32>>)> = Vec::new();
        for f in lod_sections[li].faces.clone() {
            let f = FaceId::new(f);
            let uvs = if use_uvs { lod.face_uvs(f) } else { None };
            for (corner, v) in lod.face_triangle(f).into_iter().enumerate() {
                if !seen[v.index()] {
                    seen[v.index()] = true;
                    queue.push((v, uvs.map(|uv| uv[corner])));
                }
            }
        }

        let found: Vec<(VertexId<I>, BarycentricMatch<I>)> =
            parallel_collect(queue.len(), 32, parallel, |range, out| {
                for &(v, uv) in &queue[range] {
                    out.push((v, matcher.match_vertex(lod.position(v), uv)));
                }
            });
        for (v, m) in found {
            matches[v.index()] = m;
        }
    }

    debug!(
        lod_vertices = lod.vertex_count(),
        matched = matches.iter().filter(|m| m.is_valid()).count(),
        sections = pairs.len(),
        "lod vertices matched"
    );
    matches
}

/// Carry base-mesh deltas over to a LOD mesh of the same surface.
///
/// Each matched LOD vertex blends the position and tangent deltas of its
/// triangle's corners by barycentric weight. Corners without a delta add
/// nothing; a vertex none of whose corners carry a delta gets none.
/// Vertices at bit-identical positions end up with the largest delta of
/// their group, so LOD seams stay closed.
pub fn retarget_to_lod<I: MeshIndex>(
    base: &TriMesh<I>,
    lod: &TriMesh<I>,
    deltas: &DeltaSet<I>,
    config: &TransferConfig,
) -> DeltaSet<I> {
    if deltas.is_empty() || base.num_triangles() == 0 {
        return DeltaSet::new();
    }
    let matches = match_lod_vertices(base, lod, config.parallel);

    let blended: Vec<Delta<I>> = parallel_collect(matches.len(), 256, config.parallel, |range, out| {
        for i in range {
            let m = &matches[i];
            if !m.is_valid() {
                continue;
            }
            let mut position = Vector3::<f32>::zeros();
            let mut tangent = Vector3::<f32>::zeros();
            let mut contributed = false;
            for (corner, &w) in m.triangle.iter().zip(&m.weights) {
                if let Some(d) = deltas.get(*corner) {
                    position += d.position_delta * w as f32;
                    tangent += d.tangent_delta * w as f32;
                    contributed = true;
                }
            }
            if contributed && (position != Vector3::zeros() || tangent != Vector3::zeros()) {
                out.push(Delta::new(VertexId::new(i), position).with_tangent(tangent));
            }
        }
    });
    let mut out: DeltaSet<I> = blended.into_iter().collect();
    seal_coincident(lod, &mut out);

    debug!(base_deltas = deltas.len(), lod_deltas = out.len(), "deltas retargeted to lod");
    out
}

/// Give vertices at bit-identical positions the largest delta of their group.
///
/// Position and tangent are chosen independently by magnitude; ties keep the
/// lowest vertex.
fn seal_coincident<I: MeshIndex>(lod: &TriMesh<I>, deltas: &mut DeltaSet<I>) {
    let mut groups: HashMap<[u64; 3], Vec<VertexId<I>>> = HashMap::new();
    for (v, vertex) in lod.vertices() {
        let p = vertex.position;
        groups
            .entry([p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
            .or_default()
            .push(v);
    }

    for members in groups.values().filter(|g| g.len() > 1) {
        let mut position: Option<Vector3<f32>> = None;
        let mut tangent: Option<Vector3<f32>> = None;
        for &v in members {
            let Some(d) = deltas.get(v) else { continue };
            if position.map_or(true, |p| d.position_delta.norm_squared() > p.norm_squared()) {
                position = Some(d.position_delta);
            }
            if tangent.map_or(true, |t| d.tangent_delta.norm_squared() > t.norm_squared()) {
                tangent = Some(d.tangent_delta);
            }
        }
        if let (Some(position), Some(tangent)) = (position, tangent) {
            for &v in members {
                deltas.insert(Delta::new(v, position).with_tangent(tangent));
            }
        }
    }
}
