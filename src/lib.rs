//! A Barnes-Hut many-body force engine for 3D point clouds, used as the
//! repulsive-charge kernel of an interactive graph/particle simulator.
//!
//! One tick of the pipeline: build a Morton-code octree over the current
//! points, accumulate each node's center of mass, evaluate per-point forces
//! against the tree (single-tree, or the node-pair dual-tree variant), then
//! let the host apply charge forces, link forces, and the velocity-damped
//! position update.
//!
//! See the [readme](https://github.com/David-OConnor/barnes_hut/blob/main/README.md)
//! for details, including an example.

mod config;
mod error;
mod force;
mod integrate;
mod morton;
mod tree;
mod vec3;

pub use config::BhConfig;
pub use error::BhError;
pub use integrate::{link_force, update_nodes};
pub use vec3::Vec3;

/// Owns every arena the tree build/accumulate/evaluate passes read and write.
///
/// `points` and `vel` stay with the host application: the host fills
/// `points` and the link list, and reads `points`/`vel` back for rendering
/// and physics. What `Engine` owns is everything derived fresh each tick:
/// the sorted-index permutation, the Morton keys, the flat pre-order node
/// arrays, and the sorted-space force accumulator.
///
/// There's no persistent tree state across ticks by design — every field
/// here is overwritten, not incrementally updated, on each
/// [`Engine::build_octree`] call.
#[derive(Debug, Default)]
pub struct Engine {
    // Point-space arenas, in sorted (Morton) order.
    pub(crate) indices: Vec<u32>,
    pub(crate) sorted_morton: Vec<u32>,
    pub(crate) sorted_points: Vec<Vec3>,
    pub(crate) forces: Vec<Vec3>,

    // Node arenas, in depth-first pre-order.
    pub(crate) node_start: Vec<u32>,
    pub(crate) node_end: Vec<u32>,
    pub(crate) node_level: Vec<u8>,
    pub(crate) node_parent: Vec<u32>,
    pub(crate) node_next: Vec<u32>,
    pub(crate) node_center: Vec<Vec3>,
    pub(crate) node_extent: Vec<f32>,
    /// Dual-tree scratch; unused by the single-tree evaluator.
    pub(crate) node_force: Vec<Vec3>,

    pub(crate) tree_center: Vec3,
    pub(crate) tree_extent: f32,

    pub(crate) point_n: usize,
    pub(crate) node_n: usize,
}

impl Engine {
    /// Reserves capacity for up to `max_point_n` points and `max_node_n`
    /// nodes. A tick that exceeds these grows the backing `Vec`s rather than
    /// corrupting memory or dropping data — unlike the fixed-size arenas of
    /// the WASM original, this is a soft hint, not a hard ceiling.
    pub fn with_capacity(max_point_n: usize, max_node_n: usize) -> Self {
        Self {
            indices: Vec::with_capacity(max_point_n),
            sorted_morton: Vec::with_capacity(max_point_n),
            sorted_points: Vec::with_capacity(max_point_n),
            forces: Vec::with_capacity(max_point_n),

            node_start: Vec::with_capacity(max_node_n),
            node_end: Vec::with_capacity(max_node_n),
            node_level: Vec::with_capacity(max_node_n),
            node_parent: Vec::with_capacity(max_node_n),
            node_next: Vec::with_capacity(max_node_n),
            node_center: Vec::with_capacity(max_node_n),
            node_extent: Vec::with_capacity(max_node_n),
            node_force: Vec::with_capacity(max_node_n),

            tree_center: Vec3::new_zero(),
            tree_extent: 0.0,
            point_n: 0,
            node_n: 0,
        }
    }

    pub fn point_n(&self) -> usize {
        self.point_n
    }

    pub fn node_n(&self) -> usize {
        self.node_n
    }

    pub fn tree_center(&self) -> Vec3 {
        self.tree_center
    }

    pub fn tree_extent(&self) -> f32 {
        self.tree_extent
    }

    /// Sorted-index → original-index permutation computed by the last build.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Per-point forces, in sorted-index space (see [`Engine::indices`] to
    /// scatter back to original order, or use [`Engine::apply_charge_forces`]).
    pub fn forces(&self) -> &[Vec3] {
        &self.forces
    }

    pub fn sorted_points(&self) -> &[Vec3] {
        &self.sorted_points
    }

    /// Runs build → accumulate → evaluate in the mandated order. Convenience
    /// only; callers needing the dual-tree path should call
    /// [`Engine::build_octree`], [`Engine::accumulate`], and
    /// [`Engine::calc_forces_dual`] directly instead.
    pub fn tick(&mut self, points: &[Vec3], config: &BhConfig) {
        self.build_octree(points, config);
        self.accumulate();
        self.calc_forces_single(config);
    }
}
