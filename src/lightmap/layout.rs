//! Lightmap UV layout.
//!
//! Primitives of an object that are coplanar and share edges form one
//! cluster. Each cluster is projected flat onto the axis plane that best
//! matches its normal, scaled by the texel density, and packed as a single
//! rectangle. Vertices shared between clusters are duplicated first so every
//! cluster owns its lightmap UVs.

use std::collections::HashMap;

use parking_lot::Mutex;
use rayon::prelude::*;
use smallvec::SmallVec;

use super::atlas::{AtlasAllocator, AtlasSlot};
use crate::core::LightmapProperties;
use crate::scene::Object;
use crate::util::{dominant_axis, Vec2, Vec3};

/// Density halvings tried before a cluster is given up.
const MAX_FIT_ATTEMPTS: u32 = 5;

/// Quantization applied to positions when matching shared edges.
const EDGE_WELD_SCALE: f32 = 10_000.0;

type PointKey = [i32; 3];

#[inline]
fn point_key(p: Vec3) -> PointKey {
    let q = (p * EDGE_WELD_SCALE).round();
    [q.x as i32, q.y as i32, q.z as i32]
}

#[inline]
fn edge_key(a: Vec3, b: Vec3) -> (PointKey, PointKey) {
    let (ka, kb) = (point_key(a), point_key(b));
    if ka <= kb {
        (ka, kb)
    } else {
        (kb, ka)
    }
}

/// Summary of one layout run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutStats {
    pub clusters: usize,
    pub dropped_clusters: usize,
    pub dropped_primitives: usize,
    pub split_vertices: usize,
}

impl std::ops::AddAssign for LayoutStats {
    fn add_assign(&mut self, rhs: Self) {
        self.clusters += rhs.clusters;
        self.dropped_clusters += rhs.dropped_clusters;
        self.dropped_primitives += rhs.dropped_primitives;
        self.split_vertices += rhs.split_vertices;
    }
}

/// A projected cluster waiting for its atlas rectangle.
#[derive(Debug)]
struct Cluster {
    object: usize,
    primitives: Vec<usize>,
    /// Vertices owned by the cluster and their local UVs.
    vertices: Vec<(usize, Vec2)>,
    /// Grid-aligned UV origin.
    origin: Vec2,
    /// Rectangle size including the one-texel border.
    size: (i32, i32),
}

/// Lays out objects into a shared set of atlases.
///
/// `layout_objects` may be called from several threads; rectangle
/// allocation is serialized on an internal lock.
pub struct LightmapLayout<'a> {
    props: &'a LightmapProperties,
    atlases: Mutex<AtlasAllocator>,
}

impl<'a> LightmapLayout<'a> {
    pub fn new(props: &'a LightmapProperties) -> Self {
        Self {
            props,
            atlases: Mutex::new(AtlasAllocator::new(
                props.max_lightmap_u,
                props.max_lightmap_v,
                props.max_atlases,
            )),
        }
    }

    /// Current `(width, height)` of every atlas.
    pub fn atlas_sizes(&self) -> Vec<(u32, u32)> {
        self.atlases.lock().atlas_sizes()
    }

    /// Assign lightmap UVs and atlases to every primitive of `objects`.
    ///
    /// Primitives of clusters that can not be packed keep `lightmap = None`
    /// and are left unlit.
    #[tracing::instrument(skip_all, fields(objects = objects.len()))]
    pub fn layout_objects(&self, objects: &mut [Object]) -> LayoutStats {
        let mut stats = LayoutStats::default();

        let per_object: Vec<(Vec<Cluster>, LayoutStats)> = objects
            .par_iter_mut()
            .enumerate()
            .map(|(index, object)| self.project_object(index, object))
            .collect();

        let mut clusters = Vec::new();
        for (c, s) in per_object {
            clusters.extend(c);
            stats += s;
        }

        // The packer does better with big rectangles first.
        clusters.sort_by(|a, b| b.size.cmp(&a.size));

        for cluster in &clusters {
            let slot = self.atlases.lock().alloc(cluster.size.0, cluster.size.1);
            let object = &mut objects[cluster.object];
            match slot {
                Some(slot) => apply_slot(object, cluster, &slot),
                None => {
                    tracing::warn!(
                        object = %object.name,
                        width = cluster.size.0,
                        height = cluster.size.1,
                        "cluster does not fit in any lightmap"
                    );
                    stats.dropped_clusters += 1;
                    stats.dropped_primitives += cluster.primitives.len();
                }
            }
        }

        tracing::info!(
            clusters = stats.clusters,
            dropped = stats.dropped_clusters,
            atlases = self.atlases.lock().atlas_count(),
            "lightmap layout done"
        );
        stats
    }

    /// Group, split and project the primitives of one object.
    fn project_object(&self, index: usize, object: &mut Object) -> (Vec<Cluster>, LayoutStats) {
        let mut stats = LayoutStats::default();
        for prim in &mut object.primitives {
            prim.lightmap = None;
        }
        if object.no_light || object.light_per_vertex || object.primitives.is_empty() {
            return (Vec::new(), stats);
        }

        let groups = group_primitives(object, self.props.normals_tolerance);
        let mut owner: Vec<Option<usize>> = vec![None; object.vertices.len()];
        let mut clusters = Vec::with_capacity(groups.len());

        for (group_index, primitives) in groups.into_iter().enumerate() {
            stats.clusters += 1;

            // Give the group its own copy of any vertex another group uses.
            let mut index_map: HashMap<usize, usize> = HashMap::new();
            let mut vertices = Vec::new();
            for &p in &primitives {
                for k in 0..3 {
                    let old = object.primitives[p].indices[k];
                    let new = *index_map.entry(old).or_insert_with(|| {
                        let new = match owner[old] {
                            None => old,
                            Some(_) => {
                                stats.split_vertices += 1;
                                owner.push(None);
                                object.vertices.split_vertex(old)
                            }
                        };
                        owner[new] = Some(group_index);
                        vertices.push(new);
                        new
                    });
                    object.primitives[p].indices[k] = new;
                }
            }

            let normal: Vec3 = primitives.iter().map(|&p| object.primitives[p].normal()).sum();
            let mut uvs: Vec<(usize, Vec2)> = vertices
                .iter()
                .map(|&v| (v, project(object.vertices.position(v), normal) * self.props.density))
                .collect();

            let (mut lo, mut hi) = uv_bounds(&uvs);
            if hi.x - lo.x > hi.y - lo.y {
                for (_, uv) in &mut uvs {
                    *uv = Vec2::new(uv.y, uv.x);
                }
                (lo, hi) = (Vec2::new(lo.y, lo.x), Vec2::new(hi.y, hi.x));
            }

            let Some((scale, size)) = self.fit(lo, hi) else {
                tracing::warn!(object = %object.name, "cluster too large even at reduced density");
                stats.dropped_clusters += 1;
                stats.dropped_primitives += primitives.len();
                continue;
            };
            for (_, uv) in &mut uvs {
                *uv *= scale;
            }

            clusters.push(Cluster {
                object: index,
                primitives,
                vertices: uvs,
                origin: (lo * scale).floor(),
                size,
            });
        }
        (clusters, stats)
    }

    /// Largest scale `1 / 2^i` at which the bounds fit in one atlas.
    fn fit(&self, lo: Vec2, hi: Vec2) -> Option<(f32, (i32, i32))> {
        (0..MAX_FIT_ATTEMPTS).find_map(|its| {
            let scale = 1.0 / (1u32 << its) as f32;
            let (lo, hi) = (lo * scale, hi * scale);
            let extent = (hi - lo.floor()).ceil();
            let w = extent.x as i32 + 2;
            let h = extent.y as i32 + 2;
            (w <= self.props.max_lightmap_u as i32 && h <= self.props.max_lightmap_v as i32)
                .then_some((scale, (w, h)))
        })
    }
}

/// Move the cluster's UVs into its atlas rectangle, one texel in from the
/// border.
fn apply_slot(object: &mut Object, cluster: &Cluster, slot: &AtlasSlot) {
    let offset = Vec2::new(slot.rect.xmin as f32 + 1.0, slot.rect.ymin as f32 + 1.0) - cluster.origin;
    for &(v, uv) in &cluster.vertices {
        object.vertices.vertices[v].lightmap_uv = uv + offset;
    }
    for &p in &cluster.primitives {
        object.primitives[p].lightmap = Some(slot.atlas);
    }
}

/// Drop the dominant axis of `normal` from `p`.
#[inline]
fn project(p: Vec3, normal: Vec3) -> Vec2 {
    let axis = dominant_axis(normal);
    let sx = (axis + 1) % 3;
    let sy = (sx + 1) % 3;
    Vec2::new(p[sx], p[sy])
}

fn uv_bounds(uvs: &[(usize, Vec2)]) -> (Vec2, Vec2) {
    uvs.iter().fold((Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)), |(lo, hi), (_, uv)| {
        (lo.min(*uv), hi.max(*uv))
    })
}

/// Flood-fill primitives into groups of edge-connected, coplanar faces.
///
/// Group membership compares against the running mean normal of the group,
/// so slowly curving surfaces do not chain into one cluster.
pub fn group_primitives(object: &Object, tolerance: f32) -> Vec<Vec<usize>> {
    let prims = &object.primitives;
    let mut edges: HashMap<(PointKey, PointKey), SmallVec<[usize; 4]>> = HashMap::new();
    for (i, prim) in prims.iter().enumerate() {
        let [a, b, c] = prim.positions(&object.vertices);
        for (p, q) in [(a, b), (b, c), (c, a)] {
            edges.entry(edge_key(p, q)).or_default().push(i);
        }
    }

    let mut visited = vec![false; prims.len()];
    let mut groups = Vec::new();
    for seed in 0..prims.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut group = vec![seed];
        let mut normal_sum = prims[seed].normal();
        let mut queue = vec![seed];

        while let Some(current) = queue.pop() {
            let [a, b, c] = prims[current].positions(&object.vertices);
            for (p, q) in [(a, b), (b, c), (c, a)] {
                let Some(neighbours) = edges.get(&edge_key(p, q)) else { continue };
                for &n in neighbours {
                    if visited[n] {
                        continue;
                    }
                    let mean = normal_sum.normalize_or_zero();
                    if prims[n].normal().dot(mean) > 1.0 - tolerance {
                        visited[n] = true;
                        normal_sum += prims[n].normal();
                        group.push(n);
                        queue.push(n);
                    }
                }
            }
        }
        group.sort_unstable();
        groups.push(group);
    }
    groups
}
