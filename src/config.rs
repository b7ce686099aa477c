//! Tuning parameters for a tick of the engine.

#[cfg(feature = "encode")]
use bincode::{Decode, Encode};

#[derive(Clone, Debug)]
#[cfg_attr(feature = "encode", derive(Encode, Decode))]
pub struct BhConfig {
    /// Barnes-Hut accuracy parameter θ. 0 means no grouping (best accuracy,
    /// worst performance, effectively direct summation). Higher values group
    /// more aggressively, trading accuracy for speed.
    pub theta: f32,
    /// A node with this many points or fewer is a leaf.
    pub leaf_size: usize,
    /// Hard cap on octree depth; prevents runaway recursion on coincident or
    /// near-coincident points.
    pub max_level: u8,
    /// Force contributions beyond this distance are dropped entirely.
    pub max_dist: f32,
    /// Velocity multiplier applied at the end of each tick (damping).
    pub velocity_decay: f32,
    /// Hookean spring constant for `link_force`.
    pub link_strength: f32,
    /// Rest length for `link_force`.
    pub link_distance: f32,
}

impl Default for BhConfig {
    fn default() -> Self {
        Self {
            theta: 0.9,
            leaf_size: 16,
            max_level: 10,
            max_dist: f32::INFINITY,
            velocity_decay: 0.9,
            link_strength: 1.0,
            link_distance: 30.0,
        }
    }
}

impl BhConfig {
    /// θ², precomputed once per tick rather than per MAC test.
    pub(crate) fn theta2(&self) -> f32 {
        self.theta * self.theta
    }

    pub(crate) fn max_dist2(&self) -> f32 {
        // `max_dist` may be +inf; squaring it stays +inf, which still compares
        // correctly against any finite `l2`.
        self.max_dist * self.max_dist
    }
}
