//! Glue between the tree's sorted-space forces and the host's own
//! unsorted-space point/velocity arrays: charge-force scatter, the Hookean
//! link force, and the velocity-damped position update.
//!
//! None of this touches the tree — it operates purely on flat point arrays.
//! The link-list structure and the points/velocities themselves belong to
//! the host, not to [`Engine`].

use crate::error::BhError;
use crate::vec3::Vec3;
use crate::{BhConfig, Engine};

impl Engine {
    /// Scatters the sorted-space force accumulator into unsorted-space
    /// `vel`, via the permutation recorded by the last [`Engine::build_octree`]
    /// call: `vel[indices[i]] += strength * forces[i]`. Mixing up the
    /// sorted/unsorted spaces here is the classic way to get this wrong.
    pub fn apply_charge_forces(&self, vel: &mut [Vec3], strength: f32) {
        for (i, &idx) in self.indices.iter().enumerate() {
            vel[idx as usize] += self.forces[i] * strength;
        }
    }
}

/// Symmetric Hookean spring toward `config.link_distance`, evaluated against
/// the *predicted* next positions (`p + v`) rather than the current ones —
/// the same one-step-ahead lookahead the reference link force uses to damp
/// oscillation. `links` is a flat `[i0, j0, i1, j1, ...]` pair list in
/// original (unsorted) point-index space.
pub fn link_force(links: &[[u32; 2]], points: &[Vec3], vel: &mut [Vec3], config: &BhConfig) -> Result<(), BhError> {
    let point_n = points.len();

    for &[i, j] in links {
        if i as usize >= point_n {
            return Err(BhError::LinkIndexOutOfRange { index: i, point_n });
        }
        if j as usize >= point_n {
            return Err(BhError::LinkIndexOutOfRange { index: j, point_n });
        }

        let (i, j) = (i as usize, j as usize);
        let mut d = (points[j] + vel[j]) - (points[i] + vel[i]);
        let mut l2 = d.magnitude_sq();
        if l2 < 1.0 {
            l2 = 1.0;
        }
        let l = l2.sqrt();
        let s = (l - config.link_distance) / l * config.link_strength;
        d *= s;

        vel[j] -= d;
        vel[i] += d;
    }

    Ok(())
}

/// Verlet-style position update: `points += vel`, then damp `vel` by
/// `velocity_decay`.
pub fn update_nodes(points: &mut [Vec3], vel: &mut [Vec3], velocity_decay: f32) {
    for (p, v) in points.iter_mut().zip(vel.iter_mut()) {
        *p += *v;
        *v *= velocity_decay;
    }
}
