//! Quadtree that merges flagged grid cells into as few quads as possible.

/// Axis-aligned square emitted by [`QuadMergeTree::quads`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quad {
    /// Minimum x cell.
    pub x: u32,
    /// Minimum y cell.
    pub y: u32,
    /// Edge length in cells.
    pub size: u32,
}

impl Quad {
    /// Number of unit cells covered.
    #[inline]
    pub const fn area(&self) -> u32 {
        self.size * self.size
    }
}

/// A node in a [`QuadMergeTree`].
///
/// A node is either a leaf or a branch with exactly four children covering
/// its quadrants in the order `(x, y)`, `(x + h, y)`, `(x, y + h)`,
/// `(x + h, y + h)`.
#[derive(Debug, Clone)]
pub struct QuadNode {
    x: u32,
    y: u32,
    size: u32,
    has_object: bool,
    children: Option<Box<[QuadNode; 4]>>,
}

impl QuadNode {
    const fn new(x: u32, y: u32, size: u32) -> Self {
        Self {
            x,
            y,
            size,
            has_object: false,
            children: None,
        }
    }

    /// Minimum x cell.
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Minimum y cell.
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Edge length in cells.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Whether this leaf is entirely covered by flagged cells.
    pub const fn has_object(&self) -> bool {
        self.has_object
    }

    /// Children, if this node is a branch.
    pub fn children(&self) -> Option<&[QuadNode; 4]> {
        self.children.as_deref()
    }

    /// Whether this node has no children.
    pub const fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline]
    const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.size && y - self.y < self.size
    }

    fn insert(&mut self, x: u32, y: u32, min_node_size: u32) {
        if self.has_object {
            return;
        }

        let half = self.size / 2;
        if half < min_node_size {
            self.has_object = true;
            return;
        }

        let (nx, ny) = (self.x, self.y);
        let children = self.children.get_or_insert_with(|| {
            Box::new([
                Self::new(nx, ny, half),
                Self::new(nx + half, ny, half),
                Self::new(nx, ny + half, half),
                Self::new(nx + half, ny + half, half),
            ])
        });

        let index = usize::from(x >= nx + half) + 2 * usize::from(y >= ny + half);
        children[index].insert(x, y, min_node_size);

        // Four full leaves collapse into one.
        if children.iter().all(|c| c.has_object) {
            self.children = None;
            self.has_object = true;
        }
    }

    fn collect(&self, out: &mut Vec<Quad>) {
        match &self.children {
            Some(children) => children.iter().for_each(|c| c.collect(out)),
            None if self.has_object => out.push(Quad {
                x: self.x,
                y: self.y,
                size: self.size,
            }),
            None => {}
        }
    }

    fn count_nodes(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |c| c.iter().map(Self::count_nodes).sum())
    }
}

/// Quadtree over a square cell grid.
///
/// Points are added one unit cell at a time. Subdivision stops once a node's
/// half size would drop below `min_node_size`; with a minimum of 1 every unit
/// cell can be represented individually. A `min_node_size` at or above the
/// tree size collapses everything into a single quad.
#[derive(Debug, Clone)]
pub struct QuadMergeTree {
    root: QuadNode,
    min_node_size: u32,
}

impl QuadMergeTree {
    /// Create a tree covering `size × size` cells.
    ///
    /// The root extent is rounded up to a power of two so quadrants always
    /// split evenly.
    pub fn new(size: u32, min_node_size: u32) -> Self {
        Self {
            root: QuadNode::new(0, 0, size.max(1).next_power_of_two()),
            min_node_size: min_node_size.max(1),
        }
    }

    /// Flag the unit cell at `(x, y)`.
    ///
    /// Returns `false` if the cell lies outside the tree.
    pub fn add_point(&mut self, x: u32, y: u32) -> bool {
        if !self.root.contains(x, y) {
            return false;
        }
        self.root.insert(x, y, self.min_node_size);
        true
    }

    /// Root node, for custom traversals.
    pub const fn root(&self) -> &QuadNode {
        &self.root
    }

    /// Emit one quad per full leaf.
    pub fn quads(&self) -> Vec<Quad> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }

    /// Total number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(quads: &[Quad], side: u32) -> Vec<u32> {
        let mut grid = vec![0; (side * side) as usize];
        for q in quads {
            for y in q.y..q.y + q.size {
                for x in q.x..q.x + q.size {
                    grid[(y * side + x) as usize] += 1;
                }
            }
        }
        grid
    }

    #[test]
    fn full_block_covers_exact_area() {
        for n in [1u32, 2, 4, 8, 16] {
            let mut tree = QuadMergeTree::new(n, 1);
            for y in 0..n {
                for x in 0..n {
                    assert!(tree.add_point(x, y));
                }
            }
            let quads = tree.quads();
            let area: u32 = quads.iter().map(Quad::area).sum();
            assert_eq!(area, n * n);
            assert!(coverage(&quads, n).iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn full_block_merges_into_single_quad() {
        let mut tree = QuadMergeTree::new(8, 1);
        for y in 0..8 {
            for x in 0..8 {
                tree.add_point(x, y);
            }
        }
        assert_eq!(tree.quads(), vec![Quad { x: 0, y: 0, size: 8 }]);
        assert_eq!(tree.node_count(), 1);
        assert!(tree.root().is_leaf());
    }

    #[test]
    fn partial_cover_has_no_gaps_or_overlaps() {
        let side = 8;
        let mut tree = QuadMergeTree::new(side, 1);
        let mut expected = vec![0; (side * side) as usize];

        // Bottom-left 4x4 block plus a diagonal.
        for y in 0..side {
            for x in 0..side {
                if (x < 4 && y < 4) || x == y {
                    tree.add_point(x, y);
                    expected[(y * side + x) as usize] = 1;
                }
            }
        }

        let quads = tree.quads();
        assert_eq!(coverage(&quads, side), expected);
        assert!(quads.contains(&Quad { x: 0, y: 0, size: 4 }));
    }

    #[test]
    fn duplicate_points_are_idempotent() {
        let mut tree = QuadMergeTree::new(4, 1);
        tree.add_point(1, 1);
        tree.add_point(1, 1);
        assert_eq!(tree.quads(), vec![Quad { x: 1, y: 1, size: 1 }]);
    }

    #[test]
    fn branches_have_four_children() {
        let mut tree = QuadMergeTree::new(8, 1);
        tree.add_point(5, 2);

        fn check(node: &QuadNode) {
            if let Some(children) = node.children() {
                assert!(!node.has_object());
                for c in children {
                    assert_eq!(c.size() * 2, node.size());
                    check(c);
                }
            }
        }
        check(tree.root());
    }

    #[test]
    fn out_of_range_points_ignored() {
        let mut tree = QuadMergeTree::new(4, 1);
        assert!(!tree.add_point(4, 0));
        assert!(!tree.add_point(0, 9));
        assert!(tree.quads().is_empty());
    }

    #[test]
    fn min_size_at_tree_size_collapses_to_one_quad() {
        let mut tree = QuadMergeTree::new(4, 4);
        tree.add_point(2, 3);
        assert_eq!(tree.quads(), vec![Quad { x: 0, y: 0, size: 4 }]);
    }

    #[test]
    fn non_power_of_two_extent() {
        let mut tree = QuadMergeTree::new(6, 1);
        for y in 0..6 {
            for x in 0..6 {
                tree.add_point(x, y);
            }
        }
        let area: u32 = tree.quads().iter().map(Quad::area).sum();
        assert_eq!(area, 36);
    }
}
