//! Sub-rectangle allocator.
//!
//! A BSP over the atlas region in which a leaf is not split when a rectangle
//! is placed in it, but only when the *next* rectangle lands next to the
//! first one. Delaying the split keeps the large free L-shaped area of a
//! leaf available to any request that fits it.
//!
//! Every leaf holds at most one allocated rectangle, always at its top-left
//! corner. [`GrowableSubRectangles`] starts from an empty region and grows it
//! on demand up to a maximum size.

use crate::util::Rect;

/// Handle of an allocation, valid until it is reclaimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubRectId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Split {
    Unsplit,
    /// Children are stacked top/bottom.
    Horizontal,
    /// Children are side by side.
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    /// Leaf was empty.
    New,
    Below,
    Right,
}

#[derive(Clone, Debug)]
struct Node {
    rect: Rect,
    alloced: Rect,
    split: Split,
    parent: Option<usize>,
    children: [Option<usize>; 2],
}

impl Node {
    fn new(rect: Rect, parent: Option<usize>) -> Self {
        Self { rect, alloced: Rect::EMPTY, split: Split::Unsplit, parent, children: [None, None] }
    }
}

/// Best placement found so far: (node, waste, placement).
type Candidate = Option<(usize, i32, Placement)>;

#[inline]
fn cantor(x: i32, y: i32) -> u64 {
    let (x, y) = (x.max(0) as u64, y.max(0) as u64);
    (x + y) * (x + y + 1) / 2 + y
}

/// Fixed-region sub-rectangle allocator.
#[derive(Clone, Debug)]
pub struct SubRectangles {
    region: Rect,
    nodes: Vec<Node>,
    free: Vec<usize>,
    /// Leaf node indices ordered by their top-left corner.
    leaves: Vec<usize>,
    root: usize,
}

impl SubRectangles {
    pub fn new(region: Rect) -> Self {
        let mut s = Self { region, nodes: Vec::new(), free: Vec::new(), leaves: Vec::new(), root: 0 };
        s.clear();
        s
    }

    /// Drop every allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.leaves.clear();
        self.nodes.push(Node::new(self.region, None));
        self.root = 0;
        self.leaves.push(0);
    }

    #[inline]
    pub fn region(&self) -> Rect {
        self.region
    }

    fn alloc_node(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_subtree(&mut self, index: usize) {
        for child in self.nodes[index].children.into_iter().flatten() {
            self.free_subtree(child);
        }
        self.nodes[index].children = [None, None];
        self.free.push(index);
    }

    fn leaf_key(&self, index: usize) -> (u64, usize) {
        let r = self.nodes[index].rect;
        (cantor(r.xmin, r.ymin), index)
    }

    fn add_leaf(&mut self, index: usize) {
        let key = self.leaf_key(index);
        let pos = self.leaves.partition_point(|&l| self.leaf_key(l) < key);
        self.leaves.insert(pos, index);
    }

    fn remove_leaf(&mut self, index: usize) {
        if let Some(pos) = self.leaves.iter().position(|&l| l == index) {
            self.leaves.remove(pos);
        }
    }

    /// Score placing a `w`x`h` rect into one leaf.
    fn try_fit(&self, index: usize, w: i32, h: i32, best: &mut Candidate) {
        let node = &self.nodes[index];
        let (rw, rh) = (node.rect.width(), node.rect.height());
        if w > rw || h > rh {
            return;
        }
        let mut consider = |d: i32, placement: Placement| {
            if best.map_or(true, |(_, bd, _)| d < bd) {
                *best = Some((index, d, placement));
            }
        };

        if node.alloced.is_empty() {
            consider((rw - w).min(rh - h), Placement::New);
            return;
        }

        let (aw, ah) = (node.alloced.width(), node.alloced.height());
        let (dw, dh) = (rw - aw, rh - ah);
        let mut d = i32::MAX;
        if dh >= h {
            d = if aw - w >= 0 { aw - w } else { dh - h };
            consider(d, Placement::Below);
        }
        if d != 0 && dw >= w {
            d = if ah - h >= 0 { ah - h } else { dw - w };
            consider(d, Placement::Right);
        }
    }

    /// Prefer the split that leaves the larger free strip intact.
    fn decide_split(rect: Rect, split_x: i32, split_y: i32, split: Split) -> Split {
        let vs = rect.width() - (split_x - rect.xmin);
        let hs = rect.height() - (split_y - rect.ymin);
        if vs <= 0 || hs <= 0 {
            return if vs <= 0 { Split::Horizontal } else { Split::Vertical };
        }
        match vs.cmp(&hs) {
            std::cmp::Ordering::Greater => Split::Vertical,
            std::cmp::Ordering::Less => Split::Horizontal,
            std::cmp::Ordering::Equal => split,
        }
    }

    /// Place into leaf `index`; returns the node now owning the new rect.
    fn alloc_in(&mut self, index: usize, w: i32, h: i32, placement: Placement) -> (usize, Rect) {
        let Node { rect, alloced, .. } = self.nodes[index];
        let (r, mut split) = match placement {
            Placement::New => {
                let r = Rect::new(rect.xmin, rect.ymin, rect.xmin + w, rect.ymin + h);
                self.nodes[index].alloced = r;
                return (index, r);
            }
            Placement::Below => (
                Rect::new(alloced.xmin, alloced.ymax, alloced.xmin + w, alloced.ymax + h),
                Split::Horizontal,
            ),
            Placement::Right => (
                Rect::new(alloced.xmax, alloced.ymin, alloced.xmax + w, alloced.ymin + h),
                Split::Vertical,
            ),
        };

        self.remove_leaf(index);
        let (split_x, split_y) = (alloced.xmax, alloced.ymax);
        if (placement == Placement::Right && r.height() <= alloced.height())
            || (placement == Placement::Below && r.width() <= alloced.width())
        {
            split = Self::decide_split(rect, split_x, split_y, split);
        }

        // The split line never crosses an allocated rect.
        let owner;
        let (first, second);
        if split == Split::Vertical {
            first = self.alloc_node(Node::new(Rect::new(rect.xmin, rect.ymin, split_x, rect.ymax), Some(index)));
            second = self.alloc_node(Node::new(Rect::new(split_x, rect.ymin, rect.xmax, rect.ymax), Some(index)));
            if placement == Placement::Right {
                self.nodes[first].alloced = alloced;
                self.nodes[second].alloced = r;
                owner = second;
                self.add_leaf(first);
            } else {
                owner = self.split_pair(
                    first,
                    Rect::new(rect.xmin, rect.ymin, split_x, alloced.ymax),
                    Rect::new(rect.xmin, alloced.ymax, split_x, rect.ymax),
                    Split::Horizontal,
                    alloced,
                    r,
                );
            }
        } else {
            first = self.alloc_node(Node::new(Rect::new(rect.xmin, rect.ymin, rect.xmax, split_y), Some(index)));
            second = self.alloc_node(Node::new(Rect::new(rect.xmin, split_y, rect.xmax, rect.ymax), Some(index)));
            if placement == Placement::Below {
                self.nodes[first].alloced = alloced;
                self.nodes[second].alloced = r;
                owner = second;
                self.add_leaf(first);
            } else {
                owner = self.split_pair(
                    first,
                    Rect::new(rect.xmin, rect.ymin, alloced.xmax, split_y),
                    Rect::new(alloced.xmax, rect.ymin, rect.xmax, split_y),
                    Split::Vertical,
                    alloced,
                    r,
                );
            }
        }
        self.add_leaf(second);

        let node = &mut self.nodes[index];
        node.split = split;
        node.children = [Some(first), Some(second)];
        (owner, r)
    }

    /// Turn `parent` into an internal node with the existing rect in its
    /// first child and the new rect in its second. Returns the second child.
    fn split_pair(&mut self, parent: usize, a: Rect, b: Rect, split: Split, old: Rect, new: Rect) -> usize {
        let c0 = self.alloc_node(Node::new(a, Some(parent)));
        self.nodes[c0].alloced = old;
        self.add_leaf(c0);
        let c1 = self.alloc_node(Node::new(b, Some(parent)));
        self.nodes[c1].alloced = new;
        self.add_leaf(c1);

        let p = &mut self.nodes[parent];
        p.split = split;
        p.alloced = old;
        p.children = [Some(c0), Some(c1)];
        c1
    }

    /// Allocate a `w`x`h` rectangle.
    pub fn alloc(&mut self, w: i32, h: i32) -> Option<(SubRectId, Rect)> {
        if w <= 0 || h <= 0 {
            return None;
        }
        let mut best: Candidate = None;
        for &leaf in &self.leaves {
            self.try_fit(leaf, w, h, &mut best);
            if matches!(best, Some((_, 0, _))) {
                break;
            }
        }
        let (index, _, placement) = best?;
        let (owner, rect) = self.alloc_in(index, w, h, placement);
        Some((SubRectId(owner), rect))
    }

    /// Free an allocation, collapsing empty siblings back into their parent.
    /// Returns the freed rect.
    pub fn reclaim(&mut self, id: SubRectId) -> Option<Rect> {
        let mut index = id.0;
        if index >= self.nodes.len() {
            return None;
        }
        while self.nodes[index].split != Split::Unsplit {
            index = self.nodes[index].children[0]?;
        }
        let freed = self.nodes[index].alloced;
        if freed.is_empty() {
            return None;
        }
        self.nodes[index].alloced = Rect::EMPTY;
        if let Some(parent) = self.nodes[index].parent {
            self.collapse_up(parent);
        }
        Some(freed)
    }

    fn collapse_up(&mut self, index: usize) {
        let [Some(c0), Some(c1)] = self.nodes[index].children else {
            return;
        };
        if !(self.nodes[c0].alloced.is_empty() && self.nodes[c1].alloced.is_empty()) {
            return;
        }
        self.remove_leaf(c0);
        self.remove_leaf(c1);
        self.free_subtree(c0);
        self.free_subtree(c1);
        let node = &mut self.nodes[index];
        node.split = Split::Unsplit;
        node.alloced = Rect::EMPTY;
        node.children = [None, None];
        self.add_leaf(index);
        if let Some(parent) = self.nodes[index].parent {
            self.collapse_up(parent);
        }
    }

    fn grow_node(&mut self, index: usize, ow: i32, oh: i32, nw: i32, nh: i32) {
        let node = &mut self.nodes[index];
        if node.rect.xmax == ow {
            node.rect.xmax = nw;
        }
        if node.rect.ymax == oh {
            node.rect.ymax = nh;
        }
        if node.split != Split::Unsplit {
            for child in node.children.into_iter().flatten() {
                self.grow_node(child, ow, oh, nw, nh);
            }
        }
    }

    /// Enlarge the region; nodes on the right/bottom border follow.
    pub fn grow(&mut self, width: i32, height: i32) -> bool {
        let (ow, oh) = (self.region.width(), self.region.height());
        if width < ow || height < oh {
            return false;
        }
        self.grow_node(self.root, ow, oh, width, height);
        self.region.xmax = self.region.xmin + width;
        self.region.ymax = self.region.ymin + height;
        true
    }

    fn shrink_node(&mut self, index: usize, ow: i32, oh: i32, nw: i32, nh: i32) -> bool {
        let node = &mut self.nodes[index];
        if node.alloced.xmax > nw || node.alloced.ymax > nh {
            return false;
        }
        if node.rect.xmax >= ow {
            node.rect.xmax = nw;
        }
        if node.rect.ymax >= oh {
            node.rect.ymax = nh;
        }
        if node.split != Split::Unsplit {
            for child in node.children.into_iter().flatten() {
                if !self.shrink_node(child, ow, oh, nw, nh) {
                    self.grow_node(child, nw, nh, ow, oh);
                    return false;
                }
            }
        }
        true
    }

    /// Reduce the region; fails if an allocation would be cut off.
    pub fn shrink(&mut self, width: i32, height: i32) -> bool {
        let (ow, oh) = (self.region.width(), self.region.height());
        if self.shrink_node(self.root, ow, oh, width, height) {
            self.region.xmax = self.region.xmin + width;
            self.region.ymax = self.region.ymin + height;
            true
        } else {
            let root = &mut self.nodes[self.root];
            root.rect.xmax = ow;
            root.rect.ymax = oh;
            false
        }
    }

    /// Bounding rect of everything allocated.
    pub fn minimum_rectangle(&self) -> Rect {
        let mut out = Rect::EMPTY;
        let mut stack = vec![self.root];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            let a = node.alloced;
            if !a.is_empty() {
                out = if out.is_empty() {
                    a
                } else {
                    Rect::new(out.xmin.min(a.xmin), out.ymin.min(a.ymin), out.xmax.max(a.xmax), out.ymax.max(a.ymax))
                };
            }
            stack.extend(node.children.into_iter().flatten());
        }
        out
    }
}

/// Allocator whose region starts empty and grows toward `max_width` x
/// `max_height` as allocations require.
#[derive(Clone, Debug)]
pub struct GrowableSubRectangles {
    inner: SubRectangles,
    max_width: i32,
    max_height: i32,
    used_area: i64,
}

impl GrowableSubRectangles {
    pub fn new(max_width: i32, max_height: i32) -> Self {
        Self { inner: SubRectangles::new(Rect::EMPTY), max_width, max_height, used_area: 0 }
    }

    /// Current (grown) region.
    #[inline]
    pub fn region(&self) -> Rect {
        self.inner.region()
    }

    #[inline]
    pub fn max_size(&self) -> (i32, i32) {
        (self.max_width, self.max_height)
    }

    /// Texels handed out and not reclaimed.
    #[inline]
    pub fn used_area(&self) -> i64 {
        self.used_area
    }

    /// Area still available if the region grows to its maximum.
    #[inline]
    pub fn free_area(&self) -> i64 {
        self.max_width as i64 * self.max_height as i64 - self.used_area
    }

    /// Allocate inside the current region only.
    pub fn alloc_no_grow(&mut self, w: i32, h: i32) -> Option<(SubRectId, Rect)> {
        let result = self.inner.alloc(w, h)?;
        self.used_area += result.1.area();
        Some(result)
    }

    /// Allocate, enlarging first the smaller side of the region and then the
    /// other. The region is restored when neither helps.
    pub fn alloc(&mut self, w: i32, h: i32) -> Option<(SubRectId, Rect)> {
        if w > self.max_width || h > self.max_height {
            return None;
        }
        if let Some(result) = self.alloc_no_grow(w, h) {
            return Some(result);
        }

        let region = self.inner.region();
        let (ow, oh) = (region.width(), region.height());
        let smaller = if ow <= oh { 0 } else { 1 };
        for s in 0..2 {
            let (nw, nh) = if s ^ smaller == 0 {
                ((ow + w).min(self.max_width), oh.max(h))
            } else {
                (ow.max(w), (oh + h).min(self.max_height))
            };
            self.inner.grow(nw, nh);
            if let Some(result) = self.alloc_no_grow(w, h) {
                return Some(result);
            }
            self.inner.shrink(ow, oh);
        }
        None
    }

    pub fn reclaim(&mut self, id: SubRectId) -> Option<Rect> {
        let freed = self.inner.reclaim(id)?;
        self.used_area -= freed.area();
        Some(freed)
    }

    pub fn minimum_rectangle(&self) -> Rect {
        self.inner.minimum_rectangle()
    }
}
