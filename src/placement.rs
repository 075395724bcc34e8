//! Per-pixel Grid Placement
//!
//! Automatic-mode helper that fills a region with a regular grid of probes
//! and then fits each probe's shape to the surrounding geometry.
//!
//! # Workflow
//!
//! ```text
//!  build_start ──► probes at (i + 0.5) / n, shape = full region
//!       │          update_all_dirty_probes()
//!       ▼
//!  engine reads back the coarsest mip of each capture (six faces,
//!  normalized depth in alpha)
//!       │
//!       ▼
//!  build_end(depths) ──► shape from face distances, snapped to the
//!                        region and its sides; captures again
//! ```
//!
//! Probe `i` sits at grid cell `(i % nx, (i / nx) % ny, i / (nx * ny))`.

use glam::{Mat3, UVec3, Vec3};

use crate::backend::{CameraView, PccBackend};
use crate::errors::{PccError, Result};
use crate::math::Aabb;
use crate::probe::ProbeHandle;
use crate::system::{CubemapSystem, TextureParams};

/// Cube faces in the order depths are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

/// Normalized depth of each cube face, indexed by [`CubeFace`].
pub type FaceDepths = [f32; 6];

/// Padding applied to shapes fitted from depth.
const DEPTH_SHAPE_PADDING: f32 = 1.01;
/// Inner region of probes while the grid is first captured.
const BUILD_INNER_REGION: f32 = 0.05;
/// Inner region of probes after their shape is fitted.
const FITTED_INNER_REGION: f32 = 0.5;

/// Lays out a grid of automatic-mode probes over a region.
#[derive(Debug, Clone)]
pub struct GridPlacement {
    pub full_region: Aabb,
    pub num_probes: UVec3,
    /// Scale of each probe's area relative to its grid cell.
    pub overlap: Vec3,
    /// Shape bounds closer than this (relative to the region size) to the
    /// region's bounds are snapped onto them.
    pub snap_deviation_error: Vec3,
    /// Like `snap_deviation_error`, only for probes on the grid's min side.
    pub snap_sides_min: Vec3,
    /// Like `snap_deviation_error`, only for probes on the grid's max side.
    pub snap_sides_max: Vec3,

    probes: Vec<ProbeHandle>,
}

impl Default for GridPlacement {
    fn default() -> Self {
        Self::new()
    }
}

impl GridPlacement {
    #[must_use]
    pub fn new() -> Self {
        Self {
            full_region: Aabb::UNIT,
            num_probes: UVec3::splat(2),
            overlap: Vec3::splat(1.5),
            snap_deviation_error: Vec3::splat(0.05),
            snap_sides_min: Vec3::splat(0.25),
            snap_sides_max: Vec3::splat(0.25),
            probes: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn max_num_probes(&self) -> u32 {
        self.num_probes.x * self.num_probes.y * self.num_probes.z
    }

    /// Probes created by the last [`build_start`](Self::build_start).
    #[inline]
    #[must_use]
    pub fn probes(&self) -> &[ProbeHandle] {
        &self.probes
    }

    fn grid_cell(&self, index: usize) -> UVec3 {
        let index = index as u32;
        let n = self.num_probes.max(UVec3::ONE);
        UVec3::new(index % n.x, (index / n.x) % n.y, index / (n.x * n.y))
    }

    /// Center of probe `index` in `[0, 1]` region coordinates.
    #[must_use]
    pub fn normalized_center(&self, index: usize) -> Vec3 {
        let cell = self.grid_cell(index).as_vec3();
        (cell + 0.5) / self.num_probes.max(UVec3::ONE).as_vec3()
    }

    /// World position of probe `index`.
    #[must_use]
    pub fn probe_center(&self, index: usize) -> Vec3 {
        self.normalized_center(index) * self.full_region.half_size * 2.0 + self.full_region.min()
    }

    #[must_use]
    pub fn probe_area_half_size(&self) -> Vec3 {
        self.overlap * self.full_region.half_size / self.num_probes.max(UVec3::ONE).as_vec3()
    }

    // ─── Build ─────────────────────────────────────────────────────────────

    /// Enables the system at `resolution`, creates one probe per grid cell
    /// spanning the whole region and captures them all.
    ///
    /// The system must run in automatic mode with room for
    /// [`max_num_probes`](Self::max_num_probes) slices; probes past the
    /// capacity are disabled.
    pub fn build_start<B, C>(
        &mut self,
        system: &mut CubemapSystem<B>,
        resolution: u32,
        format: wgpu::TextureFormat,
        camera: &C,
        near: f32,
        far: f32,
    ) -> Result<()>
    where
        B: PccBackend,
        C: CameraView + ?Sized,
    {
        if !system.is_automatic() {
            return Err(PccError::WrongMode {
                operation: "GridPlacement::build_start",
                mode: system.mode(),
            });
        }

        system.configure_output(resolution, resolution, format)?;
        system.set_enabled(true)?;
        system.set_updated_tracked_data_from_camera(camera);

        let half_size = self.probe_area_half_size();
        self.probes.clear();
        for index in 0..self.max_num_probes() as usize {
            let handle = system.create_probe();
            let center = self.probe_center(index);

            system.set_texture_params(handle, &TextureParams::default())?;
            system.init_workspace(handle, near, far, None)?;
            system.set_probe(
                handle,
                center,
                Aabb::new(center, half_size),
                Vec3::splat(BUILD_INNER_REGION),
                Mat3::IDENTITY,
                self.full_region,
            )?;
            self.probes.push(handle);
        }

        system.update_all_dirty_probes()
    }

    /// Fits every placed probe to its face depths, then captures again.
    ///
    /// `depths[i]` belongs to the `i`-th probe of [`probes`](Self::probes).
    pub fn build_end<B: PccBackend>(
        &mut self,
        system: &mut CubemapSystem<B>,
        depths: &[FaceDepths],
    ) -> Result<()> {
        if depths.len() != self.probes.len() {
            return Err(PccError::DepthCountMismatch {
                expected: self.probes.len(),
                actual: depths.len(),
            });
        }

        for (index, faces) in depths.iter().enumerate() {
            self.process_probe_depth(system, index, faces)?;
        }
        system.update_all_dirty_probes()
    }

    /// Fits probe `index` to its six face depths.
    pub fn process_probe_depth<B: PccBackend>(
        &self,
        system: &mut CubemapSystem<B>,
        index: usize,
        faces: &FaceDepths,
    ) -> Result<()> {
        let Some(&handle) = self.probes.get(index) else {
            return Err(PccError::DepthCountMismatch {
                expected: self.probes.len(),
                actual: index + 1,
            });
        };
        let probe = system.registry().try_get(handle)?;
        let camera_pos = probe.camera_pos();
        let shape = self.fit_shape(index, camera_pos, probe.shape().center, probe.inv_orientation(), faces);

        system.set_probe(
            handle,
            camera_pos,
            Aabb::new(camera_pos, self.probe_area_half_size()),
            Vec3::splat(FITTED_INNER_REGION),
            Mat3::IDENTITY,
            shape,
        )
    }

    /// Shape of probe `index` reaching, on each axis, from the camera
    /// toward the region bound by twice the face depth.
    #[must_use]
    pub fn fit_shape(
        &self,
        index: usize,
        camera_pos: Vec3,
        shape_center: Vec3,
        inv_orientation: Mat3,
        faces: &FaceDepths,
    ) -> Aabb {
        let region_half = self.full_region.half_size;
        let cam_ls = inv_orientation * (camera_pos - shape_center);

        let reach = |cam: f32, bound: f32, depth: f32| cam + (bound - cam) * depth * 2.0;
        let max = Vec3::new(
            reach(cam_ls.x, region_half.x, faces[CubeFace::PositiveX as usize]),
            reach(cam_ls.y, region_half.y, faces[CubeFace::PositiveY as usize]),
            reach(cam_ls.z, region_half.z, faces[CubeFace::PositiveZ as usize]),
        );
        let min = Vec3::new(
            reach(cam_ls.x, -region_half.x, faces[CubeFace::NegativeX as usize]),
            reach(cam_ls.y, -region_half.y, faces[CubeFace::NegativeY as usize]),
            reach(cam_ls.z, -region_half.z, faces[CubeFace::NegativeZ as usize]),
        );

        let min = min * DEPTH_SHAPE_PADDING + shape_center;
        let max = max * DEPTH_SHAPE_PADDING + shape_center;

        let (min, max) = self.snap_to_full_region(min, max);
        let (min, max) = self.snap_to_sides(index, min, max);
        Aabb::from_extents(min, max)
    }

    /// Moves bounds lying within `snap_deviation_error` of the region's
    /// matching bound onto it.
    #[must_use]
    pub fn snap_to_full_region(&self, min: Vec3, max: Vec3) -> (Vec3, Vec3) {
        let region_size = self.full_region.half_size * 2.0;
        let snap = |value: Vec3, bound: Vec3| {
            let relative = (bound - value).abs() / region_size;
            Vec3::select(relative.cmple(self.snap_deviation_error), bound, value)
        };
        (snap(min, self.full_region.min()), snap(max, self.full_region.max()))
    }

    /// For probes on the border of the grid, moves the outer bound onto
    /// the region side when within the side tolerance.
    #[must_use]
    pub fn snap_to_sides(&self, index: usize, min: Vec3, max: Vec3) -> (Vec3, Vec3) {
        let cell = self.grid_cell(index);
        let last = self.num_probes.max(UVec3::ONE) - UVec3::ONE;
        let region_size = self.full_region.half_size * 2.0;
        let region_min = self.full_region.min();
        let region_max = self.full_region.max();

        let mut min = min;
        let mut max = max;
        for axis in 0..3 {
            if cell[axis] == 0 {
                let relative = (min[axis] - region_min[axis]).abs() / region_size[axis];
                if relative <= self.snap_sides_min[axis] {
                    min[axis] = region_min[axis];
                }
            }
            if cell[axis] == last[axis] {
                let relative = (max[axis] - region_max[axis]).abs() / region_size[axis];
                if relative <= self.snap_sides_max[axis] {
                    max[axis] = region_max[axis];
                }
            }
        }
        (min, max)
    }
}
