//! Region quadtree over 2D boxes, used to look up triangles in UV space.
//!
//! Elements that straddle a child boundary stay at the parent node. Leaves
//! split once they exceed [`MAX_ELEMENTS`] unless they are already smaller
//! than [`MIN_NODE_SIZE`].

use nalgebra::Point2;

/// Elements a node holds before it subdivides.
pub const MAX_ELEMENTS: usize = 100;

/// Nodes narrower than this never subdivide.
pub const MIN_NODE_SIZE: f64 = 1e-3;

/// Axis-aligned box in 2D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb2 {
    /// Minimum corner.
    pub min: Point2<f64>,
    /// Maximum corner.
    pub max: Point2<f64>,
}

impl Aabb2 {
    /// Box from two corners.
    pub fn new(min: Point2<f64>, max: Point2<f64>) -> Self {
        Self { min, max }
    }

    /// Bounds of a set of points, `None` if empty.
    pub fn from_points<'p>(points: impl IntoIterator<Item = &'p Point2<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut aabb = Self::new(first, first);
        for p in iter {
            aabb.min = aabb.min.inf(p);
            aabb.max = aabb.max.sup(p);
        }
        Some(aabb)
    }

    /// Square box centered on `center` with half-size `extent`.
    pub fn around(center: &Point2<f64>, extent: f64) -> Self {
        Self {
            min: Point2::new(center.x - extent, center.y - extent),
            max: Point2::new(center.x + extent, center.y + extent),
        }
    }

    /// Whether the two boxes overlap (touching counts).
    pub fn intersects(&self, other: &Aabb2) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Whether `other` lies fully inside this box.
    pub fn contains(&self, other: &Aabb2) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    /// Length of the diagonal.
    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }

    fn quadrant(&self, q: usize) -> Aabb2 {
        let c = nalgebra::center(&self.min, &self.max);
        let (x0, x1) = if q & 1 == 0 { (self.min.x, c.x) } else { (c.x, self.max.x) };
        let (y0, y1) = if q & 2 == 0 { (self.min.y, c.y) } else { (c.y, self.max.y) };
        Aabb2::new(Point2::new(x0, y0), Point2::new(x1, y1))
    }
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb2,
    elements: Vec<(u32, Aabb2)>,
    children: Option<Box<[Node; 4]>>,
}

impl Node {
    fn new(bounds: Aabb2) -> Self {
        Self {
            bounds,
            elements: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, id: u32, aabb: Aabb2) {
        if let Some(children) = &mut self.children {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains(&aabb)) {
                child.insert(id, aabb);
                return;
            }
            self.elements.push((id, aabb));
            return;
        }

        self.elements.push((id, aabb));
        let size = (self.bounds.max.x - self.bounds.min.x).min(self.bounds.max.y - self.bounds.min.y);
        if self.elements.len() > MAX_ELEMENTS && size > MIN_NODE_SIZE {
            self.subdivide();
        }
    }

    fn subdivide(&mut self) {
        let bounds = self.bounds;
        let mut children = Box::new([0, 1, 2, 3].map(|q| Node::new(bounds.quadrant(q))));
        let elements = std::mem::take(&mut self.elements);
        for (id, aabb) in elements {
            match children.iter_mut().find(|c| c.bounds.contains(&aabb)) {
                Some(child) => child.elements.push((id, aabb)),
                None => self.elements.push((id, aabb)),
            }
        }
        self.children = Some(children);
    }

    fn query(&self, region: &Aabb2, out: &mut Vec<u32>) {
        if !self.bounds.intersects(region) {
            return;
        }
        out.extend(
            self.elements
                .iter()
                .filter(|(_, aabb)| aabb.intersects(region))
                .map(|(id, _)| *id),
        );
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(region, out);
            }
        }
    }
}

/// Quadtree of id-tagged 2D boxes.
#[derive(Debug, Clone)]
pub struct UvQuadtree {
    root: Node,
    len: usize,
}

impl UvQuadtree {
    /// Create a tree covering `bounds`.
    ///
    /// Elements outside the bounds are kept at the root and still found.
    pub fn new(bounds: Aabb2) -> Self {
        Self {
            root: Node::new(bounds),
            len: 0,
        }
    }

    /// Bounds of the root node.
    pub fn bounds(&self) -> &Aabb2 {
        &self.root.bounds
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store an element.
    pub fn insert(&mut self, id: u32, aabb: Aabb2) {
        self.len += 1;
        if self.root.bounds.contains(&aabb) {
            self.root.insert(id, aabb);
        } else {
            self.root.elements.push((id, aabb));
        }
    }

    /// Ids of all elements whose box intersects `region`, ascending.
    pub fn query(&self, region: &Aabb2) -> Vec<u32> {
        let mut out = Vec::new();
        // Out-of-bounds elements live at the root regardless of its box
        out.extend(
            self.root
                .elements
                .iter()
                .filter(|(_, aabb)| aabb.intersects(region))
                .map(|(id, _)| *id),
        );
        if let Some(children) = &self.root.children {
            for child in children.iter() {
                child.query(region, &mut out);
            }
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(i: usize, j: usize, size: f64) -> Aabb2 {
        Aabb2::new(
            Point2::new(i as f64 * size, j as f64 * size),
            Point2::new((i + 1) as f64 * size, (j + 1) as f64 * size),
        )
    }

    #[test]
    fn test_query_matches_linear_scan() {
        let n = 40;
        let size = 1.0 / n as f64;
        let mut tree = UvQuadtree::new(Aabb2::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)));
        let mut all = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let id = (j * n + i) as u32;
                let b = cell(i, j, size);
                tree.insert(id, b);
                all.push((id, b));
            }
        }
        assert_eq!(tree.len(), n * n);

        let region = Aabb2::around(&Point2::new(0.31, 0.77), 0.04);
        let mut expected: Vec<u32> = all
            .iter()
            .filter(|(_, b)| b.intersects(&region))
            .map(|(id, _)| *id)
            .collect();
        expected.sort_unstable();
        assert_eq!(tree.query(&region), expected);
    }

    #[test]
    fn test_out_of_bounds_elements_are_found() {
        let mut tree = UvQuadtree::new(Aabb2::new(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)));
        tree.insert(7, Aabb2::new(Point2::new(2.0, 2.0), Point2::new(3.0, 3.0)));
        assert_eq!(tree.query(&Aabb2::around(&Point2::new(2.5, 2.5), 0.1)), vec![7]);
        assert!(tree.query(&Aabb2::around(&Point2::new(0.5, 0.5), 0.1)).is_empty());
    }

    #[test]
    fn test_from_points() {
        let pts = [Point2::new(0.5, 0.2), Point2::new(-1.0, 3.0)];
        let aabb = Aabb2::from_points(pts.iter()).unwrap();
        assert_eq!(aabb.min, Point2::new(-1.0, 0.2));
        assert_eq!(aabb.max, Point2::new(0.5, 3.0));
        assert!(Aabb2::from_points(std::iter::empty()).is_none());
    }
}
