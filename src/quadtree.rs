use ultraviolet::DVec2;

use crate::body::Body;
use crate::bounds::Boundary;
use crate::errors::{Result, SimError};

/// Null child / bucket link.
pub const NIL: i32 = -1;

/// Bound on the explicit work stacks of the builder and the force
/// traversal. A tree deep enough to exceed it means the input is
/// pathological; the iteration aborts instead of recursing further.
pub const MAX_STACK: usize = 1024;

/// Child slots in storage order.
pub const SW: usize = 0;
pub const NW: usize = 1;
pub const SE: usize = 2;
pub const NE: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NodeKind {
    /// Unallocated arena slot.
    #[default]
    Empty,
    /// One body; may head a bucket chained through `next_in_leaf`.
    Leaf,
    Internal,
}

/// One slot of the quad arena.
#[derive(Clone, Copy, Debug)]
pub struct QuadNode {
    /// Centre of mass (the body position on a leaf).
    pub com: DVec2,
    /// Aggregate mass.
    pub mass: f64,
    /// Geometric centre of the covered square.
    pub center: DVec2,
    /// Side of the covered square.
    pub size: f64,
    /// Child slots `[sw, nw, se, ne]`, `NIL` when empty.
    pub children: [i32; 4],
    /// Number of bodies underneath this node.
    pub total: u32,
    /// Stable body index, valid on leaves.
    pub body: u32,
    /// Bucket length when this leaf heads a bucket.
    pub leaf_count: u32,
    /// Next leaf in the same bucket, `NIL` terminated.
    pub next_in_leaf: i32,
    pub kind: NodeKind,
}

impl QuadNode {
    pub fn empty() -> Self {
        Self {
            com: DVec2::zero(),
            mass: 0.0,
            center: DVec2::zero(),
            size: 0.0,
            children: [NIL; 4],
            total: 0,
            body: u32::MAX,
            leaf_count: 0,
            next_in_leaf: NIL,
            kind: NodeKind::Empty,
        }
    }
}

/// Which child slot of a node centred at `center` a point belongs to.
/// Points exactly on a dividing line bias toward the low side.
pub fn quadrant(p: DVec2, center: DVec2) -> usize {
    match (p.x <= center.x, p.y <= center.y) {
        (true, true) => SW,
        (true, false) => NW,
        (false, true) => SE,
        (false, false) => NE,
    }
}

/// Centre of a child quadrant: a quarter-side offset on each axis.
pub fn quadrant_center(center: DVec2, size: f64, q: usize) -> DVec2 {
    let off = size * 0.25;
    let dx = if q >= 2 { off } else { -off };
    let dy = if q & 1 == 1 { off } else { -off };
    DVec2::new(center.x + dx, center.y + dy)
}

/// Contiguous pool of quad nodes, logically split into `sectors + 1` equal
/// chunks: one per sector tree plus a final chunk for the merge phase.
/// Each sector chunk is exclusively owned by the task building that
/// sector, so the parallel build needs no synchronization.
#[derive(Debug)]
pub struct QuadArena {
    pub nodes: Vec<QuadNode>,
    pub chunk_cap: usize,
    pub sectors: usize,
}

impl QuadArena {
    pub fn new(sectors: usize, chunk_cap: usize) -> Self {
        Self {
            nodes: vec![QuadNode::empty(); (sectors + 1) * chunk_cap],
            chunk_cap,
            sectors,
        }
    }

    /// Re-zeroes every slot (kind Empty, child and bucket links NIL).
    /// The builder's slot assertions rely on this running before every
    /// build; a new chunk capacity is applied at the same time.
    pub fn reset(&mut self, chunk_cap: usize) {
        self.chunk_cap = chunk_cap;
        self.nodes.clear();
        self.nodes
            .resize((self.sectors + 1) * chunk_cap, QuadNode::empty());
    }
}

/// Node count of a full quadtree of depth `n`: the analytic upper bound
/// used to size sector chunks when no preflight has run.
pub fn analytic_chunk_cap(sector_exp: u32) -> usize {
    (0..=sector_exp).map(|k| 4usize.pow(k)).sum()
}

/// Synthetic nodes the merge phase allocates for an S x S grid, empty
/// cells included.
pub fn merge_node_count(per_axis: usize) -> usize {
    (per_axis * per_axis - 1) / 3
}

/// Allocation seam for the sector builder: the real build bumps a cursor
/// inside an exclusively owned arena chunk, while the sizing preflight
/// grows scratch storage and reports how much it used.
pub(crate) trait NodePool {
    /// Allocates a slot and returns its arena-global index.
    fn alloc(&mut self) -> Result<i32>;
    fn node(&self, idx: i32) -> &QuadNode;
    fn node_mut(&mut self, idx: i32) -> &mut QuadNode;
}

pub(crate) struct ChunkPool<'a> {
    nodes: &'a mut [QuadNode],
    base: usize,
    next: usize,
    sector: usize,
}

impl<'a> ChunkPool<'a> {
    pub(crate) fn new(nodes: &'a mut [QuadNode], base: usize, sector: usize) -> Self {
        Self {
            nodes,
            base,
            next: 0,
            sector,
        }
    }
}

impl NodePool for ChunkPool<'_> {
    fn alloc(&mut self) -> Result<i32> {
        if self.next == self.nodes.len() {
            return Err(SimError::ArenaOverflow {
                sector: self.sector,
                cap: self.nodes.len(),
            });
        }
        let idx = self.base + self.next;
        self.next += 1;
        Ok(idx as i32)
    }

    fn node(&self, idx: i32) -> &QuadNode {
        &self.nodes[idx as usize - self.base]
    }

    fn node_mut(&mut self, idx: i32) -> &mut QuadNode {
        &mut self.nodes[idx as usize - self.base]
    }
}

#[derive(Default)]
pub(crate) struct ScratchPool {
    nodes: Vec<QuadNode>,
}

impl ScratchPool {
    pub(crate) fn allocated(&self) -> usize {
        self.nodes.len()
    }
}

impl NodePool for ScratchPool {
    fn alloc(&mut self) -> Result<i32> {
        self.nodes.push(QuadNode::empty());
        Ok((self.nodes.len() - 1) as i32)
    }

    fn node(&self, idx: i32) -> &QuadNode {
        &self.nodes[idx as usize]
    }

    fn node_mut(&mut self, idx: i32) -> &mut QuadNode {
        &mut self.nodes[idx as usize]
    }
}

fn push(stack: &mut Vec<(i32, i32)>, entry: (i32, i32)) -> Result<()> {
    if stack.len() == MAX_STACK {
        return Err(SimError::StackOverflow {
            phase: "tree build",
            limit: MAX_STACK,
        });
    }
    stack.push(entry);
    Ok(())
}

/// Builds one sector tree over `members` (indices into `bodies`) inside
/// `pool`. The root covers the sector square centred at `center` with side
/// `side`; buckets hold up to `leaf_cap` bodies before splitting. Empty
/// sectors still allocate their root so the merge can test occupancy.
/// Returns the root's arena-global index.
///
/// Insertion is iterative: each body becomes a leaf and a (parent, child)
/// pair drained through the work stack. A full bucket subdivides in place
/// and respills its members under the new internal node. The bucket is a
/// prepend list, so of several coincident bodies the last inserted ends up
/// at the head; this ordering is observable and kept.
pub(crate) fn build_sector<P: NodePool>(
    pool: &mut P,
    bodies: &[Body],
    members: &[u32],
    center: DVec2,
    side: f64,
    leaf_cap: u32,
) -> Result<i32> {
    let root = pool.alloc()?;
    {
        let node = pool.node_mut(root);
        node.kind = NodeKind::Internal;
        node.center = center;
        node.size = side;
    }

    let mut stack: Vec<(i32, i32)> = Vec::new();
    for &member in members {
        let body = &bodies[member as usize];
        let leaf = pool.alloc()?;
        {
            let node = pool.node_mut(leaf);
            node.kind = NodeKind::Leaf;
            node.com = body.pos;
            node.mass = body.mass;
            node.total = 1;
            node.body = body.index;
        }
        push(&mut stack, (root, leaf))?;

        while let Some((parent, child)) = stack.pop() {
            let (p_center, p_size) = {
                let p = pool.node(parent);
                (p.center, p.size)
            };
            let q = quadrant(pool.node(child).com, p_center);
            let slot = pool.node(parent).children[q];

            if slot == NIL {
                pool.node_mut(child).leaf_count = 1;
                pool.node_mut(parent).children[q] = child;
            } else if pool.node(slot).kind == NodeKind::Leaf {
                let occupants = pool.node(slot).leaf_count;
                if occupants < leaf_cap {
                    // prepend to the bucket
                    let node = pool.node_mut(child);
                    node.leaf_count = occupants + 1;
                    node.next_in_leaf = slot;
                    pool.node_mut(parent).children[q] = child;
                } else {
                    // bucket full: subdivide the slot and respill. Once
                    // the cell size underflows to zero the occupants are
                    // coincident and no subdivision can separate them.
                    let half = p_size * 0.5;
                    if half <= 0.0 {
                        return Err(SimError::DegenerateBucket);
                    }
                    let inner = pool.alloc()?;
                    {
                        let node = pool.node_mut(inner);
                        node.kind = NodeKind::Internal;
                        node.center = quadrant_center(p_center, p_size, q);
                        node.size = half;
                    }
                    pool.node_mut(parent).children[q] = inner;
                    let mut cursor = slot;
                    while cursor != NIL {
                        let next = pool.node(cursor).next_in_leaf;
                        {
                            let node = pool.node_mut(cursor);
                            node.next_in_leaf = NIL;
                            node.leaf_count = 0;
                        }
                        push(&mut stack, (inner, cursor))?;
                        cursor = next;
                    }
                    push(&mut stack, (inner, child))?;
                }
            } else {
                push(&mut stack, (slot, child))?;
            }

            // fold the child into the parent's running centre of mass
            let (child_com, child_mass) = {
                let c = pool.node(child);
                (c.com, c.mass)
            };
            let parent_node = pool.node_mut(parent);
            let mass = parent_node.mass + child_mass;
            parent_node.com = (parent_node.com * parent_node.mass + child_com * child_mass) / mass;
            parent_node.mass = mass;
            parent_node.total += 1;
        }
    }
    Ok(root)
}

/// Pairs adjacent sector roots into synthetic parents, level by level,
/// until one root covers the whole simulation square. Sequential: each
/// level reads the one below it, and the whole phase is O(S^2). Returns
/// the global root index.
pub(crate) fn merge_sectors(
    arena: &mut QuadArena,
    boundary: &Boundary,
    per_axis: usize,
) -> Result<i32> {
    let cap = arena.chunk_cap;
    let sectors = per_axis * per_axis;
    let size_sim = boundary.side();
    let origin = boundary.min;

    // grid[i + level * j], x-major; NIL marks an empty subtree
    let mut grid: Vec<i32> = (0..sectors)
        .map(|sector| {
            let root = sector * cap;
            if arena.nodes[root].total > 0 {
                root as i32
            } else {
                NIL
            }
        })
        .collect();

    let mut cursor = sectors * cap;
    let end = (sectors + 1) * cap;
    let mut level = per_axis;
    while level > 1 {
        let next_level = level / 2;
        let cell = size_sim / next_level as f64;
        let mut next_grid = vec![NIL; next_level * next_level];
        for j in 0..next_level {
            for i in 0..next_level {
                if cursor == end {
                    return Err(SimError::MergeOverflow { cap });
                }
                let idx = cursor;
                cursor += 1;

                let mut node = QuadNode::empty();
                node.kind = NodeKind::Internal;
                node.size = cell;
                node.center = DVec2::new(
                    origin.x + cell * (i as f64 + 0.5),
                    origin.y + cell * (j as f64 + 0.5),
                );

                let cells = [
                    (2 * i, 2 * j, SW),
                    (2 * i, 2 * j + 1, NW),
                    (2 * i + 1, 2 * j, SE),
                    (2 * i + 1, 2 * j + 1, NE),
                ];
                let mut weighted = DVec2::zero();
                for (ci, cj, slot) in cells {
                    let child = grid[ci + level * cj];
                    if child != NIL {
                        let sub = &arena.nodes[child as usize];
                        node.children[slot] = child;
                        weighted += sub.com * sub.mass;
                        node.mass += sub.mass;
                        node.total += sub.total;
                    }
                }
                if node.mass > 0.0 {
                    node.com = weighted / node.mass;
                }
                arena.nodes[idx] = node;
                next_grid[i + next_level * j] = if node.total > 0 { idx as i32 } else { NIL };
            }
        }
        grid = next_grid;
        level = next_level;
    }
    Ok(grid[0])
}

/// Barnes-Hut force on one body: an explicit LIFO descent from `root`.
/// Internal nodes open when `size/d >= theta` (or when d is exactly zero,
/// which forces descent instead of dividing by it); otherwise the node
/// acts as a point mass. Leaf buckets are walked member by member with the
/// self-interaction and epsilon guards applied.
pub fn accumulate_force(
    nodes: &[QuadNode],
    root: i32,
    body: &Body,
    g: f64,
    theta: f64,
    epsilon: f64,
) -> Result<DVec2> {
    let mut force = DVec2::zero();
    let mut stack: Vec<i32> = Vec::new();
    stack.push(root);
    while let Some(idx) = stack.pop() {
        let node = &nodes[idx as usize];
        match node.kind {
            NodeKind::Internal => {
                let delta = node.com - body.pos;
                let d = delta.mag();
                if d == 0.0 || node.size / d >= theta {
                    if stack.len() >= MAX_STACK - 4 {
                        return Err(SimError::StackOverflow {
                            phase: "force traversal",
                            limit: MAX_STACK,
                        });
                    }
                    for &child in &node.children {
                        if child != NIL {
                            stack.push(child);
                        }
                    }
                } else {
                    force += delta * (g * body.mass * node.mass / (d * d * d));
                }
            }
            NodeKind::Leaf => {
                let mut cursor = idx;
                while cursor != NIL {
                    let leaf = &nodes[cursor as usize];
                    if leaf.body != body.index {
                        let delta = leaf.com - body.pos;
                        let d = delta.mag();
                        if d > epsilon {
                            force += delta * (g * body.mass * leaf.mass / (d * d * d));
                        }
                    }
                    cursor = leaf.next_in_leaf;
                }
            }
            NodeKind::Empty => {}
        }
    }
    Ok(force)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(x: f64, y: f64, index: u32) -> Body {
        let mut b = Body::new(DVec2::new(x, y), DVec2::zero(), 1.0, 0);
        b.index = index;
        b
    }

    fn build(
        bodies: &[Body],
        center: DVec2,
        side: f64,
        leaf_cap: u32,
        cap: usize,
    ) -> (Vec<QuadNode>, i32) {
        let mut nodes = vec![QuadNode::empty(); cap];
        let members: Vec<u32> = (0..bodies.len() as u32).collect();
        let root = {
            let mut pool = ChunkPool::new(&mut nodes, 0, 0);
            build_sector(&mut pool, bodies, &members, center, side, leaf_cap).expect("build")
        };
        (nodes, root)
    }

    #[test]
    fn ties_bias_toward_the_low_side() {
        let center = DVec2::zero();
        assert_eq!(quadrant(DVec2::new(0.0, 0.0), center), SW);
        assert_eq!(quadrant(DVec2::new(0.0, 0.1), center), NW);
        assert_eq!(quadrant(DVec2::new(0.1, 0.0), center), SE);
        assert_eq!(quadrant(DVec2::new(0.1, 0.1), center), NE);
    }

    #[test]
    fn bucket_prepends_the_last_insert() {
        let bodies = [
            body(-0.5, -0.5, 0),
            body(-0.5, -0.5, 1),
            body(-0.5, -0.5, 2),
        ];
        let (nodes, root) = build(&bodies, DVec2::zero(), 4.0, 8, 16);
        let head = nodes[root as usize].children[SW];
        let mut chain = Vec::new();
        let mut cursor = head;
        while cursor != NIL {
            chain.push(nodes[cursor as usize].body);
            cursor = nodes[cursor as usize].next_in_leaf;
        }
        assert_eq!(chain, vec![2, 1, 0]);
        assert_eq!(nodes[head as usize].leaf_count, 3);
    }

    #[test]
    fn full_bucket_splits_into_an_internal() {
        // both bodies share the sw quadrant and the bucket holds one
        let bodies = [body(-1.5, -1.5, 0), body(-0.5, -0.5, 1)];
        let (nodes, root) = build(&bodies, DVec2::zero(), 8.0, 1, 16);

        let slot = nodes[root as usize].children[SW];
        let inner = &nodes[slot as usize];
        assert_eq!(inner.kind, NodeKind::Internal);
        assert_eq!(inner.size, 4.0);
        assert_eq!(inner.center, DVec2::new(-2.0, -2.0));
        assert_eq!(inner.total, 2);

        // the pair still shared a quadrant one level down, forcing a
        // second split before they separate
        let deeper = nodes[inner.children[NE] as usize];
        assert_eq!(deeper.kind, NodeKind::Internal);
        assert_eq!(deeper.center, DVec2::new(-1.0, -1.0));
        assert_eq!(nodes[deeper.children[SW] as usize].body, 0);
        assert_eq!(nodes[deeper.children[NE] as usize].body, 1);
    }

    #[test]
    fn four_corner_bodies_get_their_own_slots() {
        let bodies = [
            body(-0.25, -0.25, 0),
            body(-0.25, 0.25, 1),
            body(0.25, -0.25, 2),
            body(0.25, 0.25, 3),
        ];
        let (nodes, root) = build(&bodies, DVec2::zero(), 1.0, 1, 16);
        let r = &nodes[root as usize];
        assert_eq!(r.total, 4);
        for (slot, index) in [(SW, 0), (NW, 1), (SE, 2), (NE, 3)] {
            let child = r.children[slot];
            assert_ne!(child, NIL);
            let leaf = &nodes[child as usize];
            assert_eq!(leaf.kind, NodeKind::Leaf);
            assert_eq!(leaf.body, index);
            assert_eq!(leaf.leaf_count, 1);
        }
    }

    #[test]
    fn builder_reports_arena_exhaustion() {
        let bodies = [body(-0.25, -0.25, 0), body(0.25, 0.25, 1)];
        let members = [0u32, 1];
        let mut nodes = vec![QuadNode::empty(); 2]; // room for the root and one leaf
        let mut pool = ChunkPool::new(&mut nodes, 0, 3);
        let err = build_sector(&mut pool, &bodies, &members, DVec2::zero(), 1.0, 4)
            .expect_err("must overflow");
        assert_eq!(err, SimError::ArenaOverflow { sector: 3, cap: 2 });
    }

    #[test]
    fn coincident_bodies_overflowing_a_bucket_are_fatal() {
        let bodies = [body(1.0, 1.0, 0), body(1.0, 1.0, 1)];
        let mut pool = ScratchPool::default();
        let err = build_sector(&mut pool, &bodies, &[0, 1], DVec2::new(2.0, 2.0), 4.0, 1)
            .expect_err("cannot separate coincident bodies");
        assert_eq!(err, SimError::DegenerateBucket);
    }

    #[test]
    fn running_mass_follows_every_ancestor() {
        let bodies = [
            body(-2.0, -2.0, 0),
            body(-1.0, -1.0, 1),
            body(2.0, 2.0, 2),
        ];
        let (nodes, root) = build(&bodies, DVec2::zero(), 8.0, 1, 32);
        let r = &nodes[root as usize];
        assert_eq!(r.total, 3);
        assert_eq!(r.mass, 3.0);
        let expected = DVec2::new(-1.0 / 3.0, -1.0 / 3.0);
        assert!((r.com - expected).mag() < 1e-12);
    }
}
