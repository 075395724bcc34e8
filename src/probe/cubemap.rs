//! The reflection probe entity.

use glam::{Mat3, Vec3};

use crate::backend::{CameraId, ConstBufferId, InternalProbeId, TextureId, WorkspaceId};
use crate::math::Aabb;

/// Padding applied to a probe shape so its area never touches the walls.
const SHAPE_PADDING: f32 = 1.005;
/// Shrink factor applied to an area that escapes its shape.
const AREA_SHRINK: f32 = 0.98;

// ─── ProbeVolume ───────────────────────────────────────────────────────────

/// Spatial description of a probe.
///
/// `area` is the influence volume in world space (oriented by
/// `orientation` around its center). `shape` is the box the cubemap is
/// parallax-corrected against; it always contains `area`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeVolume {
    pub camera_pos: Vec3,
    pub area: Aabb,
    /// Fraction of the area half-size with full influence, in `[0, 1]`.
    pub area_inner_region: Vec3,
    pub orientation: Mat3,
    pub inv_orientation: Mat3,
    pub shape: Aabb,
}

impl Default for ProbeVolume {
    fn default() -> Self {
        Self {
            camera_pos: Vec3::ZERO,
            area: Aabb::ZERO,
            area_inner_region: Vec3::ZERO,
            orientation: Mat3::IDENTITY,
            inv_orientation: Mat3::IDENTITY,
            shape: Aabb::ZERO,
        }
    }
}

impl ProbeVolume {
    /// Builds a consistent volume.
    ///
    /// The inner region is clamped to `[0, 1]` and the shape is padded. If the
    /// shape does not contain the area afterwards, the area is shrunk and
    /// clamped into it (a warning is logged).
    #[must_use]
    pub fn new(
        camera_pos: Vec3,
        area: Aabb,
        area_inner_region: Vec3,
        orientation: Mat3,
        shape: Aabb,
    ) -> Self {
        let mut shape = shape;
        shape.half_size *= SHAPE_PADDING;

        let mut area = area;
        if !shape.contains(&area) {
            log::warn!(
                "Probe area must be fully inside the probe shape, otherwise artifacts appear. \
                 Forcing area to be inside the shape"
            );
            let min = (area.min() * AREA_SHRINK).max(shape.min());
            let max = (area.max() * AREA_SHRINK).min(shape.max());
            area.set_extents(min, max);
        }

        Self {
            camera_pos,
            area,
            area_inner_region: area_inner_region.clamp(Vec3::ZERO, Vec3::ONE),
            orientation,
            inv_orientation: orientation.inverse(),
            shape,
        }
    }

    /// Transforms a world position into the area's local space.
    #[inline]
    #[must_use]
    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.inv_orientation * (world - self.area.center)
    }

    /// The area expressed in its own local space.
    #[inline]
    #[must_use]
    pub fn area_local(&self) -> Aabb {
        Aabb::new(Vec3::ZERO, self.area.half_size)
    }

    /// Normalized distance of a local-space point: 0 (or below) inside the
    /// inner region, 1 at the area boundary.
    #[must_use]
    pub fn ndf(&self, pos_ls: Vec3) -> f32 {
        let dist = pos_ls.abs();
        let inner = self.area.half_size * self.area_inner_region;
        let outer = self.area.half_size;
        // 1e-6 avoids division by zero on degenerate axes.
        let ndf = (dist - inner) / (outer - inner + Vec3::splat(1e-6));
        ndf.max_element()
    }

    /// NDF of `world` if the area contains it.
    #[must_use]
    pub fn containing_ndf(&self, world: Vec3) -> Option<f32> {
        let pos_ls = self.to_local(world);
        self.area_local()
            .contains_point(pos_ls)
            .then(|| self.ndf(pos_ls))
    }
}

// ─── GPU-side state ────────────────────────────────────────────────────────

/// Texture a probe renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTexture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub mip_count: u32,
    pub msaa: u32,
}

/// Parameters a capture workspace was requested with. Kept across
/// re-creation of the probe texture or of the cubemap array.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub near: f32,
    pub far: f32,
    /// Frame graph definition used for the capture.
    pub definition: String,
}

/// Camera and workspaces created by `init_workspace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureState {
    pub camera: CameraId,
    pub workspace: WorkspaceId,
    /// Created up front for dynamic probes, on demand for static ones.
    pub clear_workspace: Option<WorkspaceId>,
    /// The texture the capture workspace writes; a pooled temporary in
    /// automatic mode.
    pub render_target: TextureId,
}

// ─── CubemapProbe ──────────────────────────────────────────────────────────

/// A single reflection capture volume.
///
/// Probes are created and owned by a [`ProbeRegistry`](super::ProbeRegistry)
/// and addressed through [`ProbeHandle`](super::ProbeHandle)s. Plain state
/// (flags, mask, iteration count) can be edited directly; anything that
/// touches GPU resources goes through the owning
/// [`CubemapSystem`](crate::system::CubemapSystem).
#[derive(Debug, Clone)]
pub struct CubemapProbe {
    pub(crate) volume: ProbeVolume,

    pub(crate) texture: Option<ProbeTexture>,
    /// Slice in the shared cubemap array (automatic mode).
    pub(crate) array_index: Option<u32>,
    /// Requested sample count; static probes always capture with 1.
    pub(crate) msaa: u32,
    pub(crate) capture: Option<CaptureState>,
    pub(crate) capture_request: Option<CaptureRequest>,
    pub(crate) internal_probe: Option<InternalProbeId>,

    pub(crate) const_buffer: Option<ConstBufferId>,
    pub(crate) num_users: u32,

    pub(crate) is_static: bool,
    pub(crate) enabled: bool,
    pub(crate) dirty: bool,
    pub(crate) num_iterations: u16,
    /// Capture passes already executed for the current dirty cycle.
    pub(crate) iterations_done: u16,
    pub(crate) mask: u32,
    pub(crate) priority: u16,
}

impl Default for CubemapProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CubemapProbe {
    #[must_use]
    pub fn new() -> Self {
        Self {
            volume: ProbeVolume::default(),
            texture: None,
            array_index: None,
            msaa: 1,
            capture: None,
            capture_request: None,
            internal_probe: None,
            const_buffer: None,
            num_users: 0,
            is_static: true,
            enabled: true,
            dirty: true,
            num_iterations: 8,
            iterations_done: 0,
            mask: 0xffff_ffff,
            priority: 10,
        }
    }

    /// The sentinel filling unused selection slots.
    #[must_use]
    pub(crate) fn blank() -> Self {
        let mut probe = Self::new();
        probe.set(Vec3::ZERO, Aabb::UNIT, Vec3::ZERO, Mat3::IDENTITY, Aabb::UNIT);
        probe.dirty = false;
        probe
    }

    /// Sets the spatial description and marks the probe dirty.
    ///
    /// `area` is the region where objects pick this probe, `probe_shape` the
    /// box the reflection is parallax-corrected against. The area must fit
    /// in the shape; if it doesn't it is shrunk to fit.
    pub fn set(
        &mut self,
        camera_pos: Vec3,
        area: Aabb,
        area_inner_region: Vec3,
        orientation: Mat3,
        probe_shape: Aabb,
    ) {
        self.volume = ProbeVolume::new(camera_pos, area, area_inner_region, orientation, probe_shape);
        self.mark_dirty();
    }

    // === Spatial accessors ===

    #[inline]
    #[must_use]
    pub fn volume(&self) -> &ProbeVolume {
        &self.volume
    }

    #[inline]
    #[must_use]
    pub fn camera_pos(&self) -> Vec3 {
        self.volume.camera_pos
    }

    #[inline]
    #[must_use]
    pub fn area(&self) -> &Aabb {
        &self.volume.area
    }

    #[inline]
    #[must_use]
    pub fn area_inner_region(&self) -> Vec3 {
        self.volume.area_inner_region
    }

    #[inline]
    #[must_use]
    pub fn orientation(&self) -> Mat3 {
        self.volume.orientation
    }

    #[inline]
    #[must_use]
    pub fn inv_orientation(&self) -> Mat3 {
        self.volume.inv_orientation
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &Aabb {
        &self.volume.shape
    }

    /// See [`ProbeVolume::ndf`].
    #[inline]
    #[must_use]
    pub fn ndf(&self, pos_ls: Vec3) -> f32 {
        self.volume.ndf(pos_ls)
    }

    // === State flags ===

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Requests a re-capture, restarting any partially converged one.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.iterations_done = 0;
    }

    /// True if the scheduler has work for this probe.
    #[inline]
    #[must_use]
    pub fn needs_capture(&self) -> bool {
        self.dirty || !self.is_static
    }

    #[inline]
    #[must_use]
    pub fn num_iterations(&self) -> u16 {
        self.num_iterations
    }

    pub fn set_num_iterations(&mut self, iterations: u16) {
        self.num_iterations = iterations;
    }

    #[inline]
    #[must_use]
    pub fn iterations_done(&self) -> u16 {
        self.iterations_done
    }

    #[inline]
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn set_mask(&mut self, mask: u32) {
        self.mask = mask;
    }

    #[inline]
    #[must_use]
    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// Priority of this probe in automatic mode; lower values win when
    /// probes overlap.
    pub fn set_priority(&mut self, priority: u16) {
        self.priority = priority;
    }

    // === GPU state ===

    #[inline]
    #[must_use]
    pub fn texture(&self) -> Option<&ProbeTexture> {
        self.texture.as_ref()
    }

    /// Mip count of the probe's texture, 1 when it has none.
    #[inline]
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.texture.map_or(1, |t| t.mip_count)
    }

    #[inline]
    #[must_use]
    pub fn array_index(&self) -> Option<u32> {
        self.array_index
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.capture.is_some()
    }

    #[inline]
    #[must_use]
    pub fn capture_state(&self) -> Option<&CaptureState> {
        self.capture.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn capture_request(&self) -> Option<&CaptureRequest> {
        self.capture_request.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn internal_probe(&self) -> Option<InternalProbeId> {
        self.internal_probe
    }

    #[inline]
    #[must_use]
    pub fn num_users(&self) -> u32 {
        self.num_users
    }

    #[inline]
    #[must_use]
    pub fn const_buffer(&self) -> Option<ConstBufferId> {
        self.const_buffer
    }
}
