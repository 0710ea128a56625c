//! SAH-based BVH builder.
//!
//! Binned surface-area heuristic over triangle centroids, built with an
//! explicit work stack into a flat node array.

use super::bvh::{BvhNode, Triangle};
use crate::util::{BBox3f, Vec3};

/// Number of SAH bins per axis.
const NUM_BINS: usize = 12;

const TRAVERSAL_COST: f32 = 1.0;
const INTERSECT_COST: f32 = 1.0;

/// Ranges at or below this size always become leaves.
const MAX_LEAF_SIZE: usize = 4;

/// Built BVH.
#[derive(Debug, Default)]
pub struct Bvh {
    /// Flat node array (index 0 = root).
    pub nodes: Vec<BvhNode>,
    /// Triangle indices in leaf order.
    pub tri_indices: Vec<usize>,
}

#[derive(Clone, Copy)]
struct Bin {
    bounds: BBox3f,
    count: usize,
}

/// Work item: build `node` over `indices[start..end]`.
struct Task {
    node: usize,
    start: usize,
    end: usize,
}

/// Build a BVH; indices in the result refer into `triangles`.
#[tracing::instrument(skip_all, fields(tri_count = triangles.len()))]
pub fn build_bvh(triangles: &[Triangle]) -> Bvh {
    let n = triangles.len();
    if n == 0 {
        return Bvh { nodes: vec![BvhNode::default()], tri_indices: Vec::new() };
    }

    let centroids: Vec<Vec3> = triangles.iter().map(Triangle::centroid).collect();
    let bounds: Vec<BBox3f> = triangles.iter().map(Triangle::bounds).collect();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut nodes: Vec<BvhNode> = Vec::with_capacity(2 * n);
    nodes.push(BvhNode::default());

    let mut stack = vec![Task { node: 0, start: 0, end: n }];
    while let Some(Task { node, start, end }) = stack.pop() {
        let range = &mut indices[start..end];
        let mut node_bounds = BBox3f::EMPTY;
        let mut centroid_bounds = BBox3f::EMPTY;
        for &i in range.iter() {
            node_bounds.expand_by_box(&bounds[i]);
            centroid_bounds.expand_by_point(centroids[i]);
        }

        let leaf = BvhNode { bounds: node_bounds, left_or_first: start as u32, count: range.len() as u32 };
        if range.len() <= MAX_LEAF_SIZE {
            nodes[node] = leaf;
            continue;
        }

        let Some((axis, split, cost)) = best_split(range, &bounds, &centroids, &centroid_bounds) else {
            nodes[node] = leaf;
            continue;
        };
        let leaf_cost = range.len() as f32 * INTERSECT_COST * node_bounds.surface_area();
        if cost >= leaf_cost {
            nodes[node] = leaf;
            continue;
        }

        let mut mid = start + partition(range, |&i| centroids[i][axis] < split);
        if mid == start || mid == end {
            mid = (start + end) / 2;
        }

        let left = nodes.len();
        nodes.push(BvhNode::default());
        nodes.push(BvhNode::default());
        nodes[node] = BvhNode { bounds: node_bounds, left_or_first: left as u32, count: 0 };

        stack.push(Task { node: left + 1, start: mid, end });
        stack.push(Task { node: left, start, end: mid });
    }

    Bvh { nodes, tri_indices: indices }
}

/// Cheapest binned split over all axes as (axis, position, cost).
fn best_split(
    range: &[usize],
    bounds: &[BBox3f],
    centroids: &[Vec3],
    centroid_bounds: &BBox3f,
) -> Option<(usize, f32, f32)> {
    let mut best: Option<(usize, f32, f32)> = None;

    for axis in 0..3 {
        let lo = centroid_bounds.min[axis];
        let extent = centroid_bounds.max[axis] - lo;
        if extent < 1e-8 {
            continue;
        }

        let mut bins = [Bin { bounds: BBox3f::EMPTY, count: 0 }; NUM_BINS];
        let scale = NUM_BINS as f32 / extent;
        for &i in range {
            let b = (((centroids[i][axis] - lo) * scale) as usize).min(NUM_BINS - 1);
            bins[b].bounds.expand_by_box(&bounds[i]);
            bins[b].count += 1;
        }

        // Prefix sweep from the left, then evaluate while sweeping from the right.
        let mut left_area = [0.0f32; NUM_BINS - 1];
        let mut left_count = [0usize; NUM_BINS - 1];
        let mut acc = BBox3f::EMPTY;
        let mut count = 0;
        for i in 0..NUM_BINS - 1 {
            acc.expand_by_box(&bins[i].bounds);
            count += bins[i].count;
            left_area[i] = acc.surface_area();
            left_count[i] = count;
        }

        acc = BBox3f::EMPTY;
        count = 0;
        for i in (1..NUM_BINS).rev() {
            acc.expand_by_box(&bins[i].bounds);
            count += bins[i].count;
            let cost = TRAVERSAL_COST
                + INTERSECT_COST * (left_count[i - 1] as f32 * left_area[i - 1] + count as f32 * acc.surface_area());
            if best.map_or(true, |b| cost < b.2) {
                best = Some((axis, lo + extent * i as f32 / NUM_BINS as f32, cost));
            }
        }
    }
    best
}

/// Partition slice in-place. Returns count of elements where predicate is true.
fn partition<T, F>(slice: &mut [T], pred: F) -> usize
where
    F: Fn(&T) -> bool,
{
    let mut left = 0;
    let mut right = slice.len();
    while left < right {
        if pred(&slice[left]) {
            left += 1;
        } else {
            right -= 1;
            slice.swap(left, right);
        }
    }
    left
}
