//! Picks the probes influencing a tracked position.

use glam::{Mat4, Vec3};

use super::{MAX_CUBE_PROBES, ProbeSlot, SelectionResult};
use crate::probe::{CubemapProbe, ProbeHandle, ProbeRegistry};

/// Finds the probes around a tracked position.
///
/// Probes whose area contains the position are collected by their NDF,
/// keeping the [`MAX_CUBE_PROBES`] lowest. A probe whose inner region
/// contains the position wins outright. When no area contains the position
/// the probe covering the largest part of the tracked camera's view is
/// used instead.
///
/// Ties are resolved by scan (creation) order; no particular tie order is
/// guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSelector {
    /// Probes with `mask & system_mask == 0` are ignored.
    pub system_mask: u32,
}

impl Default for ProbeSelector {
    fn default() -> Self {
        Self::new(0xffff_ffff)
    }
}

impl ProbeSelector {
    #[must_use]
    pub const fn new(system_mask: u32) -> Self {
        Self { system_mask }
    }

    #[inline]
    fn accepts(&self, probe: &CubemapProbe) -> bool {
        probe.enabled && (probe.mask & self.system_mask) != 0
    }

    /// Full selection: collection, weights and dominant promotion.
    #[must_use]
    pub fn select(
        &self,
        registry: &ProbeRegistry,
        tracked_position: Vec3,
        view_proj: &Mat4,
    ) -> SelectionResult {
        let mut result = self.collect(registry, tracked_position, view_proj);
        result.finalize();
        result
    }

    /// Collects candidates without computing weights.
    #[must_use]
    pub fn collect(
        &self,
        registry: &ProbeRegistry,
        tracked_position: Vec3,
        view_proj: &Mat4,
    ) -> SelectionResult {
        let mut result = SelectionResult::empty();

        for (handle, probe) in registry.iter() {
            if !self.accepts(probe) {
                continue;
            }
            let Some(ndf) = probe.volume.containing_ndf(tracked_position) else {
                continue;
            };

            if ndf > 0.0 {
                Self::insert_candidate(&mut result, handle, ndf);
            } else {
                // Inside the inner region: use only this probe.
                result = SelectionResult::empty();
                result.slots[0] = ProbeSlot::Probe(handle);
                result.ndfs[0] = 0.0;
                result.count = 1;
                break;
            }
        }

        if result.count == 0 {
            self.find_closest(registry, view_proj, &mut result);
        }

        result
    }

    /// Inserts keeping the lowest NDFs. When full, the occupant with the
    /// highest NDF above `ndf` is replaced; the candidate itself may be
    /// dropped.
    fn insert_candidate(result: &mut SelectionResult, handle: ProbeHandle, ndf: f32) {
        let index = if result.count < MAX_CUBE_PROBES {
            Some(result.count)
        } else {
            let mut highest_ndf = -1.0;
            let mut highest_index = None;
            for (i, slot_ndf) in result.ndfs.iter().enumerate() {
                if ndf < *slot_ndf && *slot_ndf >= highest_ndf {
                    highest_ndf = *slot_ndf;
                    highest_index = Some(i);
                }
            }
            highest_index
        };

        if let Some(index) = index {
            result.ndfs[index] = ndf;
            result.slots[index] = ProbeSlot::Probe(handle);
            result.count = (result.count + 1).min(MAX_CUBE_PROBES);
        }
    }

    /// Fallback when no area contains the tracked position: keeps the probe
    /// whose projected area covers the largest part of the view.
    ///
    /// The stored metric is the winning score, or `f32::MAX` when every
    /// probe is behind the camera.
    fn find_closest(
        &self,
        registry: &ProbeRegistry,
        view_proj: &Mat4,
        result: &mut SelectionResult,
    ) {
        result.ndfs[0] = 0.0;

        for (handle, probe) in registry.iter() {
            if !self.accepts(probe) {
                continue;
            }
            if let Some(score) = screen_coverage(probe, view_proj)
                && score > result.ndfs[0]
            {
                result.ndfs[0] = score;
                result.slots[0] = ProbeSlot::Probe(handle);
                result.count = 1;
            }
        }

        if result.count == 0 {
            result.ndfs[0] = f32::MAX;
        }
    }
}

/// Clipped screen-space volume covered by a probe's area.
///
/// Corners are rotated by the probe orientation, projected, divided by a
/// `w` clamped to at least 1e-6 and clipped to the `[-1, 1]` cube. Depth is
/// remapped to `[0, 1]` and squared so close probes dominate far ones.
/// Returns `None` when the whole box is behind the camera.
#[must_use]
pub fn screen_coverage(probe: &CubemapProbe, view_proj: &Mat4) -> Option<f32> {
    let mut ps_min = Vec3::ONE;
    let mut ps_max = -Vec3::ONE;

    for corner in probe.volume.area.corners() {
        let mut clip = *view_proj * (probe.volume.orientation * corner).extend(1.0);
        clip.w = clip.w.max(1e-6);
        let ndc = (clip / clip.w).truncate().clamp(-Vec3::ONE, Vec3::ONE);
        ps_min = ps_min.min(ndc);
        ps_max = ps_max.max(ndc);
    }

    if ps_max.z <= -1.0 {
        return None;
    }

    let min_z = ps_min.z * 0.5 + 0.5;
    let max_z = ps_max.z * 0.5 + 0.5;
    let depth = max_z * max_z - min_z * min_z;
    Some((ps_max.x - ps_min.x) * (ps_max.y - ps_min.y) * depth)
}
