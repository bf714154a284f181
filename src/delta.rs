//! Sparse per-vertex displacement sets ("morph targets").
//!
//! A [`DeltaSet`] holds at most one [`Delta`] per vertex and iterates in
//! ascending vertex order. An absent vertex and a vertex with a zero delta
//! are different things: consumers treat absence as "not part of this morph".
//!
//! # Example
//!
//! ```
//! use remorph::delta::{Delta, DeltaSet};
//! use remorph::mesh::VertexId;
//! use nalgebra::Vector3;
//!
//! let mut set: DeltaSet = DeltaSet::new();
//! set.insert(Delta::new(VertexId::new(3), Vector3::new(0.0, 0.0, 1.0)));
//! assert_eq!(set.len(), 1);
//! assert!(set.contains(VertexId::new(3)));
//! ```

use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashSet;

use nalgebra::Vector3;

use crate::mesh::{MeshIndex, VertexId};

/// Displacement of one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta<I: MeshIndex = u32> {
    /// Vertex of the mesh this delta is defined against.
    pub source_index: VertexId<I>,
    /// Position offset.
    pub position_delta: Vector3<f32>,
    /// Change of the vertex normal.
    pub tangent_delta: Vector3<f32>,
}

impl<I: MeshIndex> Delta<I> {
    /// Create a position-only delta.
    pub fn new(source_index: VertexId<I>, position_delta: Vector3<f32>) -> Self {
        Self {
            source_index,
            position_delta,
            tangent_delta: Vector3::zeros(),
        }
    }

    /// Set the normal change.
    pub fn with_tangent(mut self, tangent_delta: Vector3<f32>) -> Self {
        self.tangent_delta = tangent_delta;
        self
    }
}

/// A sparse set of deltas keyed by vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSet<I: MeshIndex = u32> {
    deltas: BTreeMap<VertexId<I>, Delta<I>>,
}

impl<I: MeshIndex> Default for DeltaSet<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> DeltaSet<I> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            deltas: BTreeMap::new(),
        }
    }

    /// Number of vertices carrying a delta.
    #[inline]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// True when no vertex carries a delta.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Insert a delta, returning the one it replaced.
    pub fn insert(&mut self, delta: Delta<I>) -> Option<Delta<I>> {
        self.deltas.insert(delta.source_index, delta)
    }

    /// Delta of a vertex.
    pub fn get(&self, v: VertexId<I>) -> Option<&Delta<I>> {
        self.deltas.get(&v)
    }

    /// Whether a vertex carries a delta.
    pub fn contains(&self, v: VertexId<I>) -> bool {
        self.deltas.contains_key(&v)
    }

    /// Remove the delta of a vertex.
    pub fn remove(&mut self, v: VertexId<I>) -> Option<Delta<I>> {
        self.deltas.remove(&v)
    }

    /// Iterate in ascending vertex order.
    pub fn iter(&self) -> impl Iterator<Item = &Delta<I>> + '_ {
        self.deltas.values()
    }

    /// Vertices carrying a delta, ascending.
    pub fn indices(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.deltas.keys().copied()
    }

    /// Largest vertex index present.
    pub fn max_index(&self) -> Option<VertexId<I>> {
        self.deltas.keys().next_back().copied()
    }

    /// Keep only deltas matching the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&Delta<I>) -> bool) {
        self.deltas.retain(|_, d| keep(d));
    }

    /// Copy without the given vertices.
    pub fn without(&self, ignored: &HashSet<VertexId<I>>) -> Self {
        self.iter()
            .filter(|d| !ignored.contains(&d.source_index))
            .copied()
            .collect()
    }

    /// Copy with every position delta multiplied by `factor`.
    ///
    /// Normal changes are not linear in the displacement and are dropped;
    /// rebuild them with [`set_magnitude`](crate::algo::diff::set_magnitude)
    /// when they matter.
    pub fn scaled(&self, factor: f32) -> Self {
        self.iter()
            .map(|d| Delta::new(d.source_index, d.position_delta * factor))
            .collect()
    }

    /// Add `other`'s position deltas into this set.
    ///
    /// Vertices present only in `other` are inserted as they are.
    pub fn accumulate(&mut self, other: &DeltaSet<I>) {
        for delta in other.iter() {
            self.deltas
                .entry(delta.source_index)
                .and_modify(|d| d.position_delta += delta.position_delta)
                .or_insert(*delta);
        }
    }
}

impl<I: MeshIndex> FromIterator<Delta<I>> for DeltaSet<I> {
    /// Later duplicates replace earlier ones.
    fn from_iter<T: IntoIterator<Item = Delta<I>>>(iter: T) -> Self {
        let mut set = DeltaSet::new();
        for delta in iter {
            set.insert(delta);
        }
        set
    }
}

impl<I: MeshIndex> Extend<Delta<I>> for DeltaSet<I> {
    fn extend<T: IntoIterator<Item = Delta<I>>>(&mut self, iter: T) {
        for delta in iter {
            self.insert(delta);
        }
    }
}

impl<I: MeshIndex> IntoIterator for DeltaSet<I> {
    type Item = Delta<I>;
    type IntoIter = btree_map::IntoValues<VertexId<I>, Delta<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.into_values()
    }
}

impl<'a, I: MeshIndex> IntoIterator for &'a DeltaSet<I> {
    type Item = &'a Delta<I>;
    type IntoIter = btree_map::Values<'a, VertexId<I>, Delta<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.values()
    }
}
