//! Cubemap System
//!
//! [`CubemapSystem`] ties the probe registry, selection, blend proxies,
//! capture scheduler and constant buffer feeder together and talks to the
//! engine exclusively through one injected [`PccBackend`].
//!
//! # Modes
//!
//! The behaviour is picked once, from [`PccSettings::mode`]:
//!
//! ```text
//!              ┌──────────── Manual ─────────────┐   ┌──── Automatic ────┐
//!  probes ──►  select ≤4 ─► weights ─► proxies   │   │ dirty list        │
//!              │            blend/copy workspace │   │ capture into tmp  │
//!              │            final probe record   │   │ copy → array[i]   │
//!              └─────────────────────────────────┘   └───────────────────┘
//! ```
//!
//! # Frame
//!
//! | Hook                       | Manual                                   | Automatic                    |
//! |----------------------------|------------------------------------------|------------------------------|
//! | [`before_frame`]           | selection, expensive captures            | dirty list, expensive captures |
//! | [`before_render_passes`]   | one pass per dirty probe, blend or copy  | one pass per dirty probe     |
//! | [`after_frame`]            | staging buffer check                     | nothing                      |
//!
//! Every hook is a no-op while the system is paused. Register them with a
//! [`FrameDriver`] through [`subscribe`](CubemapSystem::subscribe).
//!
//! [`before_frame`]: CubemapSystem::before_frame
//! [`before_render_passes`]: CubemapSystem::before_render_passes
//! [`after_frame`]: CubemapSystem::after_frame

mod automatic;
mod blending;
mod capture;
mod probes;

pub use blending::{blend_camera_position, blended_needs_update, merge_final_volume};
pub use probes::TextureParams;

use glam::{Mat4, Quat, Vec3};

use crate::backend::{CameraId, CameraView, PccBackend, TextureId, WorkspaceId};
use crate::constant_buffer::ConstantBufferFeeder;
use crate::errors::{PccError, Result};
use crate::frame::{FrameDriver, FramePhase, SubscriptionId};
use crate::probe::{CubemapProbe, ProbeHandle, ProbeRegistry, ProbeVolume};
use crate::proxy::ProxyGeometryDriver;
use crate::scheduler::{ProbeRenderScheduler, ScheduleReport};
use crate::selection::{ProbeSelector, SelectionResult};
use crate::settings::{PccCapabilities, PccMode, PccSettings};
use crate::slots::CubemapSlotAllocator;
use crate::texture_pool::{MipPolicy, RttPool};

/// Visibility mask used while capturing: probes see everything.
const CAPTURE_VISIBILITY_MASK: u32 = 0xffff_ffff;

// ─── Output state ──────────────────────────────────────────────────────────

/// GPU objects of an enabled manual system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendOutput {
    /// Cubemap the selected probes are blended into.
    pub texture: TextureId,
    pub mip_count: u32,
    pub camera: CameraId,
    pub blend_workspace: WorkspaceId,
    pub copy_workspace: WorkspaceId,
}

/// GPU objects of an enabled automatic system.
#[derive(Debug, Clone)]
pub struct ArrayOutput {
    /// Cubemap array holding one slice per probe.
    pub texture: TextureId,
    pub mip_count: u32,
    pub slots: CubemapSlotAllocator,
}

/// What an enabled system renders into.
#[derive(Debug, Clone)]
pub enum SystemOutput {
    Blend(BlendOutput),
    Array(ArrayOutput),
}

// ─── CubemapSystem ─────────────────────────────────────────────────────────

/// One parallax-corrected cubemap system.
pub struct CubemapSystem<B: PccBackend> {
    backend: B,
    settings: PccSettings,
    capabilities: PccCapabilities,

    registry: ProbeRegistry,
    selector: ProbeSelector,
    scheduler: ProbeRenderScheduler,
    selection: SelectionResult,
    proxies: ProxyGeometryDriver,
    feeder: ConstantBufferFeeder,
    tmp_rtts: RttPool,
    ibl_rtts: RttPool,
    output: Option<SystemOutput>,

    /// Automatic mode: probes captured this frame.
    dirty_probes: Vec<ProbeHandle>,
    /// Shape and camera of the blended result, fed to the shading pass.
    final_volume: ProbeVolume,
    blend_camera_pos: Vec3,
    blended_needs_update: bool,
    current_mip: u32,

    tracked_position: Vec3,
    tracked_view_proj: Mat4,
    paused: bool,
    last_report: ScheduleReport,
}

impl<B: PccBackend> CubemapSystem<B> {
    #[must_use]
    pub fn new(backend: B, settings: PccSettings) -> Self {
        let ibl_mips = if settings.ibl_specular {
            MipPolicy::IblTrimmed
        } else {
            MipPolicy::Full
        };
        let registry = ProbeRegistry::new();
        let final_volume = *registry.blank().volume();

        Self {
            capabilities: settings.capabilities(),
            selector: ProbeSelector::new(settings.system_mask),
            backend,
            registry,
            scheduler: ProbeRenderScheduler::new(),
            selection: SelectionResult::empty(),
            proxies: ProxyGeometryDriver::new(),
            feeder: ConstantBufferFeeder::new(),
            tmp_rtts: RttPool::temporary(),
            ibl_rtts: RttPool::ibl(ibl_mips),
            output: None,
            dirty_probes: Vec::new(),
            final_volume,
            blend_camera_pos: Vec3::ZERO,
            blended_needs_update: true,
            current_mip: 0,
            tracked_position: Vec3::ZERO,
            tracked_view_proj: Mat4::IDENTITY,
            paused: false,
            last_report: ScheduleReport::default(),
            settings,
        }
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &PccSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> PccMode {
        self.settings.mode
    }

    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> PccCapabilities {
        self.capabilities
    }

    #[inline]
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        self.capabilities.contains(PccCapabilities::SHARED_ARRAY_TEXTURE)
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn probe(&self, handle: ProbeHandle) -> Option<&CubemapProbe> {
        self.registry.get(handle)
    }

    /// Mutable access to plain probe state (flags, mask, priority).
    ///
    /// Changes to the spatial description in automatic mode should go
    /// through [`set_probe`](Self::set_probe) so the per-pixel record follows.
    pub fn probe_mut(&mut self, handle: ProbeHandle) -> Option<&mut CubemapProbe> {
        self.registry.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn selection(&self) -> &SelectionResult {
        &self.selection
    }

    #[inline]
    #[must_use]
    pub fn proxies(&self) -> &ProxyGeometryDriver {
        &self.proxies
    }

    #[inline]
    #[must_use]
    pub fn feeder(&self) -> &ConstantBufferFeeder {
        &self.feeder
    }

    #[inline]
    #[must_use]
    pub fn temporary_pool(&self) -> &RttPool {
        &self.tmp_rtts
    }

    #[inline]
    #[must_use]
    pub fn output(&self) -> Option<&SystemOutput> {
        self.output.as_ref()
    }

    /// Texture the shading collaborator binds: the blend result or the
    /// cubemap array.
    #[must_use]
    pub fn bind_texture(&self) -> Option<TextureId> {
        match self.output.as_ref()? {
            SystemOutput::Blend(blend) => Some(blend.texture),
            SystemOutput::Array(array) => Some(array.texture),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.output.is_some()
    }

    #[inline]
    #[must_use]
    pub fn final_volume(&self) -> &ProbeVolume {
        &self.final_volume
    }

    #[inline]
    #[must_use]
    pub fn blend_camera_pos(&self) -> Vec3 {
        self.blend_camera_pos
    }

    #[inline]
    #[must_use]
    pub fn blended_probe_needs_update(&self) -> bool {
        self.blended_needs_update
    }

    #[inline]
    #[must_use]
    pub fn current_mip(&self) -> u32 {
        self.current_mip
    }

    /// Automatic mode: probes scheduled for capture this frame.
    #[inline]
    #[must_use]
    pub fn dirty_probes(&self) -> &[ProbeHandle] {
        &self.dirty_probes
    }

    /// Result of the last scheduling pass.
    #[inline]
    #[must_use]
    pub fn last_report(&self) -> &ScheduleReport {
        &self.last_report
    }

    // === Tracking ===

    #[inline]
    #[must_use]
    pub fn tracked_position(&self) -> Vec3 {
        self.tracked_position
    }

    #[inline]
    #[must_use]
    pub fn tracked_view_proj(&self) -> Mat4 {
        self.tracked_view_proj
    }

    /// Sets the position probes are selected around and the view-projection
    /// used when no probe contains it.
    pub fn set_updated_tracked_data(&mut self, position: Vec3, view_proj: Mat4) {
        self.tracked_position = position;
        self.tracked_view_proj = view_proj;
    }

    pub fn set_updated_tracked_data_from_camera<C: CameraView + ?Sized>(&mut self, camera: &C) {
        self.set_updated_tracked_data(
            camera.derived_position(),
            camera.projection_matrix() * camera.view_matrix(),
        );
    }

    // === Pausing & masks ===

    #[inline]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// While paused, frame hooks do nothing.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    #[inline]
    #[must_use]
    pub fn system_mask(&self) -> u32 {
        self.selector.system_mask
    }

    pub fn set_system_mask(&mut self, mask: u32) {
        self.settings.system_mask = mask;
        self.selector.system_mask = mask;
    }

    // === Enable / disable ===

    /// Creates or destroys the output resources.
    ///
    /// Manual systems create the blend target, the blend camera, one proxy
    /// per slot and the blend and copy workspaces. Automatic systems create
    /// the cubemap array and re-initialize probes that had requested a
    /// capture workspace.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.is_enabled() {
            return Ok(());
        }

        if enabled {
            if self.is_automatic() {
                self.enable_array()?;
            } else {
                self.enable_blending()?;
            }
            log::info!(
                "Cubemap system enabled ({:?}, {}x{} {:?})",
                self.settings.mode,
                self.settings.width,
                self.settings.height,
                self.settings.format
            );
        } else {
            match self.output.take() {
                Some(SystemOutput::Blend(blend)) => self.disable_blending(blend),
                Some(SystemOutput::Array(array)) => self.disable_array(&array),
                None => {}
            }
            log::info!("Cubemap system disabled");
        }
        Ok(())
    }

    /// Changes the output resolution and format, recreating the output if
    /// the system is enabled.
    pub fn configure_output(&mut self, width: u32, height: u32, format: wgpu::TextureFormat) -> Result<()> {
        let was_enabled = self.is_enabled();
        self.set_enabled(false)?;
        self.settings.width = width;
        self.settings.height = height;
        self.settings.format = format;
        self.set_enabled(was_enabled)
    }

    // === Frame hooks ===

    /// Registers the three frame hooks on `driver`.
    pub fn subscribe(driver: &mut FrameDriver<Self>) -> [SubscriptionId; 3]
    where
        B: 'static,
    {
        [
            driver.subscribe(FramePhase::BeforeFrame, Self::before_frame),
            driver.subscribe(FramePhase::BeforeRenderPasses, Self::before_render_passes),
            driver.subscribe(FramePhase::AfterFrame, Self::after_frame),
        ]
    }

    /// Start of frame: refreshes what to capture and runs captures whose
    /// iteration count exceeds [`PccSettings::expensive_iterations`].
    pub fn before_frame(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }

        let threshold = self.settings.expensive_iterations;
        if self.is_automatic() {
            self.refresh_dirty_probes();
            let candidates = self.dirty_probes.clone();
            self.last_report = self.run_expensive(&candidates, threshold);
        } else {
            self.update_selection()?;
            let candidates: Vec<ProbeHandle> = self.selection.collected().collect();
            self.last_report = self.run_expensive(&candidates, threshold);
        }
        Ok(())
    }

    /// Right before the compositor runs: one capture pass per probe still
    /// needing it, then (manual) the blend or copy into the output.
    pub fn before_render_passes(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }

        if self.is_automatic() {
            let candidates = self.dirty_probes.clone();
            let report = self.run_cheap(&candidates);
            self.last_report.merge(report);
            Ok(())
        } else {
            let candidates: Vec<ProbeHandle> = self.selection.collected().collect();
            let report = self.run_cheap(&candidates);
            self.last_report.merge(report);
            self.render_blended()
        }
    }

    /// End of frame: sizes the manual-probe staging buffer for the next one.
    pub fn after_frame(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        self.feeder.check_staging_buffer(&mut self.backend)
    }

    /// Bakes every dirty probe to convergence, independent of the current
    /// selection. Tracked data is left as it was.
    pub fn update_all_dirty_probes(&mut self) -> Result<()> {
        self.backend.update_scene_graph();
        let result = if self.is_automatic() {
            self.update_all_dirty_automatic();
            Ok(())
        } else {
            self.update_all_dirty_manual()
        };
        self.backend.clear_frame_data();
        result
    }

    // === Scene clearing ===

    /// Drops scene objects the engine is about to clear.
    pub fn prepare_for_clear_scene(&mut self) {
        self.proxies.destroy(&mut self.backend);
    }

    /// Recreates or re-attaches scene objects after a scene clear.
    pub fn restore_from_clear_scene(&mut self) -> Result<()> {
        if let Some(SystemOutput::Blend(blend)) = &self.output {
            let camera = blend.camera;
            self.proxies.create(
                &mut self.backend,
                self.settings.reserved_render_queue,
                self.settings.proxy_visibility_mask,
            )?;
            self.backend.attach_camera_to_root(camera);
        }

        let cameras: Vec<CameraId> = self
            .registry
            .iter()
            .filter_map(|(_, probe)| probe.capture.map(|c| c.camera))
            .collect();
        for camera in cameras {
            self.backend.attach_camera_to_root(camera);
        }
        Ok(())
    }

    // === Internals ===

    fn require_manual(&self, operation: &'static str) -> Result<()> {
        if self.is_automatic() {
            Err(PccError::WrongMode {
                operation,
                mode: self.settings.mode,
            })
        } else {
            Ok(())
        }
    }

    fn require_automatic(&self, operation: &'static str) -> Result<()> {
        if self.is_automatic() {
            Ok(())
        } else {
            Err(PccError::WrongMode {
                operation,
                mode: self.settings.mode,
            })
        }
    }

    /// Points capture cameras of `handles` at their probes.
    fn prepare_for_rendering(&mut self, handles: &[ProbeHandle]) {
        for &handle in handles {
            let Some(probe) = self.registry.get(handle) else {
                continue;
            };
            let Some(capture) = probe.capture else {
                continue;
            };
            self.backend.set_camera_pose(
                capture.camera,
                probe.camera_pos(),
                Quat::from_mat3(&probe.orientation()),
            );
            if probe.is_static {
                self.backend.set_camera_light_culling(capture.camera, true);
            }
        }
    }
}

impl<B: PccBackend> Drop for CubemapSystem<B> {
    fn drop(&mut self) {
        if let Err(err) = self.set_enabled(false) {
            log::warn!("Failed to disable cubemap system on drop: {err}");
        }
        self.destroy_all_probes();
        self.tmp_rtts.clear(&mut self.backend);
        self.ibl_rtts.clear(&mut self.backend);
        self.feeder.release(&mut self.backend);
    }
}
