//! Meta-morph text format.
//!
//! A meta-morph file carries a base mesh, any number of named morph targets
//! defined against it, and requirement blocks that only apply when the mesh
//! the file is resolved onto has an exact vertex and triangle count.
//!
//! ```text
//! #METAMORPH FILE
//! vertice 0 0 0
//! vertice 1 0 0
//! vertice 0 1 0
//! triangle 0 1 2
//! morphtarget Smile
//! delta 1:0 0 0.5
//! requirements 3:1:Collar
//! ignore 2
//! move 0:0,0,1|0,0,0|1,1,1
//! #END
//! ```
//!
//! Vector fields accept `x y z`, `X=x Y=y Z=z` or comma separated values.
//! Unknown lines are skipped so newer writers stay readable.

use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use nalgebra::{Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::delta::{Delta, DeltaSet};
use crate::error::{MeshError, Result};
use crate::mesh::{build_from_triangles, MeshIndex, TriMesh, VertexId};

/// First line of every meta-morph file.
pub const HEADER: &str = "#METAMORPH FILE";

/// Line that ends the readable content.
pub const FOOTER: &str = "#END";

/// A named morph target.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphTarget<I: MeshIndex = u32> {
    /// Target name.
    pub name: String,
    /// Deltas against the mesh the target belongs to.
    pub deltas: DeltaSet<I>,
}

impl<I: MeshIndex> MorphTarget<I> {
    /// Create a target.
    pub fn new(name: impl Into<String>, deltas: DeltaSet<I>) -> Self {
        Self {
            name: name.into(),
            deltas,
        }
    }
}

/// Exact mesh size a requirement block applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    /// Required vertex count.
    pub vertex_count: usize,
    /// Required triangle count.
    pub triangle_count: usize,
}

impl Requirement {
    /// Whether a mesh with these counts satisfies the requirement.
    pub fn is_met(&self, vertex_count: usize, triangle_count: usize) -> bool {
        self.vertex_count == vertex_count && self.triangle_count == triangle_count
    }
}

/// Rigid-plus-scale transform attached to a `move` line.
///
/// Rotation angles are in degrees. A point is scaled, then rotated, then
/// translated. Serialized in its `move` line form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RigidTransform {
    /// Translation.
    pub translation: Vector3<f64>,
    /// Pitch (about Y), yaw (about Z) and roll (about X), in degrees.
    pub rotation: Vector3<f64>,
    /// Per-axis scale.
    pub scale: Vector3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// The transform that leaves points where they are.
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: Vector3::repeat(1.0),
        }
    }

    /// A pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Rotation as a matrix: `Rz(yaw) * Ry(pitch) * Rx(roll)`.
    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        let [pitch, yaw, roll] = [
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        ];
        Rotation3::from_euler_angles(roll, pitch, yaw)
    }

    /// Transform a point: `R * (S * p) + T`.
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        let scaled = p.coords.component_mul(&self.scale);
        Point3::from(self.rotation_matrix() * scaled + self.translation)
    }
}

impl FromStr for RigidTransform {
    type Err = String;

    /// Parse `tx,ty,tz[|pitch,yaw,roll[|sx,sy,sz]]`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split('|');
        let mut transform = Self::identity();

        let translation = parts.next().unwrap_or_default();
        transform.translation = parse_vector::<f64>(translation)
            .ok_or_else(|| format!("bad translation `{}`", translation.trim()))?;
        if let Some(rotation) = parts.next() {
            transform.rotation = parse_vector::<f64>(rotation)
                .ok_or_else(|| format!("bad rotation `{}`", rotation.trim()))?;
        }
        if let Some(scale) = parts.next() {
            transform.scale =
                parse_vector::<f64>(scale).ok_or_else(|| format!("bad scale `{}`", scale.trim()))?;
        }
        if parts.next().is_some() {
            return Err(format!("too many transform fields in `{}`", s.trim()));
        }
        Ok(transform)
    }
}

impl Display for RigidTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.translation;
        let r = &self.rotation;
        let s = &self.scale;
        write!(
            f,
            "{},{},{}|{},{},{}|{},{},{}",
            t.x, t.y, t.z, r.x, r.y, r.z, s.x, s.y, s.z
        )
    }
}

impl TryFrom<String> for RigidTransform {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RigidTransform> for String {
    fn from(t: RigidTransform) -> Self {
        t.to_string()
    }
}

/// A welded-mesh vertex moved by a transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexMove {
    /// Vertex index in the welded mesh.
    pub vertex: usize,
    /// Transform applied to its position.
    pub transform: RigidTransform,
}

/// Ignore and move instructions guarded by an optional requirement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementBlock {
    /// Mesh size the block applies to. `None` applies unconditionally.
    pub requirement: Option<Requirement>,
    /// Name of the move set the block contributes to.
    pub mask: Option<String>,
    /// Vertices excluded from morph target projection.
    pub ignore: Vec<usize>,
    /// Vertex moves, in file order.
    pub moves: Vec<VertexMove>,
}

impl RequirementBlock {
    /// Whether the block applies to a mesh with these counts.
    pub fn is_active(&self, vertex_count: usize, triangle_count: usize) -> bool {
        self.requirement
            .map_or(true, |r| r.is_met(vertex_count, triangle_count))
    }
}

/// A named selection of welded-mesh vertices, used when authoring a file.
///
/// As an ignore mask only `vertices` and `requirement` matter. As a move mask
/// every vertex is moved by `transform` into the `Fix_<name>` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexMask {
    /// Mask name; move masks without one are skipped.
    #[serde(default)]
    pub name: String,
    /// Mesh size the mask was built for. `None` means the welded mesh it is
    /// authored against.
    #[serde(default)]
    pub requirement: Option<Requirement>,
    /// Welded-mesh vertex indices.
    pub vertices: Vec<usize>,
    /// Transform of a move mask.
    #[serde(default)]
    pub transform: RigidTransform,
}

impl VertexMask {
    /// An ignore mask over `vertices`.
    pub fn ignore(vertices: Vec<usize>) -> Self {
        Self {
            name: String::new(),
            requirement: None,
            vertices,
            transform: RigidTransform::identity(),
        }
    }

    /// A move mask named `name` applying `transform` to `vertices`.
    pub fn moving(name: impl Into<String>, vertices: Vec<usize>, transform: RigidTransform) -> Self {
        Self {
            name: name.into(),
            requirement: None,
            vertices,
            transform,
        }
    }
}

/// Contents of a meta-morph file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaMorph<I: MeshIndex = u32> {
    /// Base mesh positions.
    pub vertices: Vec<Point3<f64>>,
    /// Base mesh triangles.
    pub triangles: Vec<[usize; 3]>,
    /// Morph targets, in file order with unique names.
    pub morph_targets: Vec<MorphTarget<I>>,
    /// Requirement blocks, in file order.
    pub requirement_blocks: Vec<RequirementBlock>,
}

impl<I: MeshIndex> Default for MetaMorph<I> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            triangles: Vec::new(),
            morph_targets: Vec::new(),
            requirement_blocks: Vec::new(),
        }
    }
}

impl<I: MeshIndex> MetaMorph<I> {
    /// Meta-morph carrying a mesh and no targets.
    pub fn from_mesh(mesh: &TriMesh<I>) -> Self {
        let (vertices, triangles) = crate::mesh::to_face_vertex(mesh);
        Self {
            vertices,
            triangles,
            ..Self::default()
        }
    }

    /// Build the mesh the morph targets are defined against.
    pub fn base_mesh(&self) -> Result<TriMesh<I>> {
        build_from_triangles(&self.vertices, &self.triangles)
    }

    /// Morph target with the given name.
    pub fn morph_target(&self, name: &str) -> Option<&MorphTarget<I>> {
        self.morph_targets.iter().find(|t| t.name == name)
    }

    /// Morph target with the given name, created empty if missing.
    pub fn morph_target_mut(&mut self, name: &str) -> &mut MorphTarget<I> {
        let index = match self.morph_targets.iter().position(|t| t.name == name) {
            Some(index) => index,
            None => {
                self.morph_targets.push(MorphTarget::new(name, DeltaSet::new()));
                self.morph_targets.len() - 1
            }
        };
        &mut self.morph_targets[index]
    }

    /// Parse meta-morph text.
    pub fn parse(text: &str) -> Result<Self> {
        parse(text)
    }

    /// Write the text form.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        write!(writer, "{}", self)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the text form to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save(self, path)
    }
}

impl<I: MeshIndex> Display for MetaMorph<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", HEADER)?;
        for v in &self.vertices {
            writeln!(f, "vertice {} {} {}", v.x, v.y, v.z)?;
        }
        for t in &self.triangles {
            writeln!(f, "triangle {} {} {}", t[0], t[1], t[2])?;
        }
        for target in &self.morph_targets {
            writeln!(f, "morphtarget {}", target.name)?;
            for d in target.deltas.iter() {
                let p = &d.position_delta;
                if p.iter().all(|c| *c == 0.0) {
                    continue;
                }
                writeln!(f, "delta {}:{} {} {}", d.source_index.index(), p.x, p.y, p.z)?;
            }
        }
        for block in &self.requirement_blocks {
            if let Some(req) = &block.requirement {
                write!(f, "requirements {}:{}", req.vertex_count, req.triangle_count)?;
                if let Some(mask) = &block.mask {
                    write!(f, ":{}", mask)?;
                }
                writeln!(f)?;
            }
            for v in &block.ignore {
                writeln!(f, "ignore {}", v)?;
            }
            for m in &block.moves {
                writeln!(f, "move {}:{}", m.vertex, m.transform)?;
            }
        }
        writeln!(f, "{}", FOOTER)
    }
}

/// Load a meta-morph file.
///
/// # Example
///
/// ```no_run
/// use remorph::io::metamorph::{self, MetaMorph};
///
/// let meta: MetaMorph = metamorph::load("face.metamorph").unwrap();
/// println!("{} morph targets", meta.morph_targets.len());
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<MetaMorph<I>> {
    let text = std::fs::read_to_string(path)?;
    parse(&text)
}

/// Save a meta-morph file.
pub fn save<P: AsRef<Path>, I: MeshIndex>(meta: &MetaMorph<I>, path: P) -> Result<()> {
    let file = File::create(path)?;
    meta.write(BufWriter::new(file))
}

/// Parse meta-morph text.
pub fn parse<I: MeshIndex>(text: &str) -> Result<MetaMorph<I>> {
    let mut meta = MetaMorph::default();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

    match lines.by_ref().find(|(_, l)| !l.is_empty()) {
        Some((_, line)) if line == HEADER => {}
        _ => return Err(MeshError::MissingHeader { expected: HEADER }),
    }

    // Index of the morph target `delta` lines go to
    let mut open_target: Option<usize> = None;
    let mut mask: Option<String> = None;

    for (number, line) in lines {
        if line == FOOTER {
            break;
        }
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (line, ""),
        };

        match keyword {
            "vertice" => {
                let v = parse_vector::<f64>(rest)
                    .ok_or_else(|| MeshError::parse(number, format!("bad vertex `{}`", rest)))?;
                meta.vertices.push(Point3::from(v));
            }
            "triangle" => {
                let t = parse_triple::<usize>(rest)
                    .ok_or_else(|| MeshError::parse(number, format!("bad triangle `{}`", rest)))?;
                meta.triangles.push(t);
            }
            "morphtarget" => {
                if rest.is_empty() {
                    return Err(MeshError::parse(number, "morph target without a name"));
                }
                meta.morph_target_mut(rest);
                open_target = meta.morph_targets.iter().position(|t| t.name == rest);
            }
            "delta" => {
                let (index, vector) = split_indexed(rest)
                    .ok_or_else(|| MeshError::parse(number, format!("bad delta `{}`", rest)))?;
                let vertex = parse_vertex::<I>(index, number)?;
                let offset = parse_vector::<f32>(vector)
                    .ok_or_else(|| MeshError::parse(number, format!("bad delta `{}`", rest)))?;
                if let Some(target) = open_target {
                    meta.morph_targets[target]
                        .deltas
                        .insert(Delta::new(vertex, offset));
                }
            }
            "requirements" => {
                open_target = None;
                let fields: Vec<&str> = rest.splitn(3, ':').map(str::trim).collect();
                if fields.len() < 2 {
                    return Err(MeshError::parse(number, format!("bad requirements `{}`", rest)));
                }
                let vertex_count = parse_count(fields[0], number)?;
                let triangle_count = parse_count(fields[1], number)?;
                if let Some(new_mask) = fields.get(2).filter(|m| !m.is_empty()) {
                    mask = Some(new_mask.to_string());
                }
                meta.requirement_blocks.push(RequirementBlock {
                    requirement: Some(Requirement {
                        vertex_count,
                        triangle_count,
                    }),
                    mask: mask.clone(),
                    ..RequirementBlock::default()
                });
            }
            "ignore" => {
                let vertex = parse_count(rest, number)?;
                if meta.requirement_blocks.is_empty() {
                    meta.requirement_blocks.push(RequirementBlock::default());
                }
                if let Some(block) = meta.requirement_blocks.last_mut() {
                    block.ignore.push(vertex);
                }
            }
            "move" => {
                let (index, transform) = split_indexed(rest)
                    .ok_or_else(|| MeshError::parse(number, format!("bad move `{}`", rest)))?;
                let vertex = parse_count(index, number)?;
                let transform: RigidTransform =
                    transform.parse().map_err(|e: String| MeshError::parse(number, e))?;
                if let Some(block) = meta.requirement_blocks.last_mut() {
                    if block.mask.is_some() {
                        block.moves.push(VertexMove { vertex, transform });
                    }
                }
            }
            _ => {}
        }
    }

    Ok(meta)
}

/// Split `index:rest`.
fn split_indexed(s: &str) -> Option<(&str, &str)> {
    s.split_once(':').map(|(a, b)| (a.trim(), b.trim()))
}

fn parse_count(s: &str, line: usize) -> Result<usize> {
    s.trim()
        .parse()
        .map_err(|_| MeshError::parse(line, format!("bad index `{}`", s.trim())))
}

fn parse_vertex<I: MeshIndex>(s: &str, line: usize) -> Result<VertexId<I>> {
    let index = parse_count(s, line)?;
    VertexId::try_new(index)
        .ok_or_else(|| MeshError::parse(line, format!("vertex index {} out of range", index)))
}

/// Three values separated by whitespace or commas, optionally labelled
/// `X=`, `Y=`, `Z=`.
fn parse_triple<T: FromStr>(s: &str) -> Option<[T; 3]> {
    let mut values = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| {
            let t = match t.split_once('=') {
                Some((label, value)) if matches!(label, "X" | "Y" | "Z" | "x" | "y" | "z") => value,
                _ => t,
            };
            t.parse::<T>().ok()
        });
    let triple = [values.next()??, values.next()??, values.next()??];
    if values.next().is_some() {
        return None;
    }
    Some(triple)
}

fn parse_vector<T>(s: &str) -> Option<Vector3<T>>
where
    T: FromStr + nalgebra::Scalar,
{
    parse_triple::<T>(s).map(Vector3::from)
}
