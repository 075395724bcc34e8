//! Probe lifecycle: creation, textures, capture workspaces, references.

use glam::{Mat3, Vec3};

use crate::backend::{CameraDesc, PccBackend, TextureDesc, TextureFlags, WorkspaceDesc, WorkspaceKind};
use crate::constant_buffer::PROBE_RECORD_SIZE;
use crate::errors::{PccError, Result};
use crate::math::{Aabb, max_mip_count};
use crate::probe::{CaptureRequest, CaptureState, CubemapProbe, ProbeHandle, ProbeTexture};
use crate::selection::SelectionResult;
use crate::texture_pool::RttKey;

use super::{CubemapSystem, SystemOutput};

/// Texture a manual probe captures into.
///
/// In automatic mode only `is_static` is used; the texture is a slice of
/// the shared array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureParams {
    pub width: u32,
    pub height: u32,
    pub use_mipmaps: bool,
    pub format: wgpu::TextureFormat,
    pub is_static: bool,
    /// Sample count for dynamic probes. Static probes always use 1.
    pub msaa: u32,
}

impl Default for TextureParams {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            use_mipmaps: true,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            is_static: true,
            msaa: 1,
        }
    }
}

impl<B: PccBackend> CubemapSystem<B> {
    // === Creation ===

    /// Adds a probe with default state. It captures nothing until it has a
    /// volume, texture parameters and a workspace.
    pub fn create_probe(&mut self) -> ProbeHandle {
        let mut probe = CubemapProbe::new();
        probe.num_iterations = self.settings.probe_iterations;
        let handle = self.registry.insert(probe);
        log::debug!("Created probe {handle:?}");
        handle
    }

    /// Sets the spatial description of a probe and marks it dirty.
    pub fn set_probe(
        &mut self,
        handle: ProbeHandle,
        camera_pos: Vec3,
        area: Aabb,
        area_inner_region: Vec3,
        orientation: Mat3,
        probe_shape: Aabb,
    ) -> Result<()> {
        let probe = self.registry.try_get_mut(handle)?;
        probe.set(camera_pos, area, area_inner_region, orientation, probe_shape);
        self.sync_internal_probe(handle);
        Ok(())
    }

    // === Textures ===

    /// Default texture parameters with the sample count from the settings.
    #[must_use]
    pub fn default_texture_params(&self) -> TextureParams {
        TextureParams {
            msaa: self.settings.probe_msaa.max(1),
            ..TextureParams::default()
        }
    }

    /// (Re)creates the probe texture. A capture workspace the probe had is
    /// recreated against the new texture.
    pub fn set_texture_params(&mut self, handle: ProbeHandle, params: &TextureParams) -> Result<()> {
        if self.is_automatic() {
            let probe = self.registry.try_get_mut(handle)?;
            probe.is_static = params.is_static;
            probe.mark_dirty();
            self.sync_internal_probe(handle);
            return Ok(());
        }

        let probe = self.registry.try_get(handle)?;
        let request = if probe.is_initialized() {
            probe.capture_request.clone()
        } else {
            None
        };

        self.teardown_capture(handle);
        self.destroy_probe_texture(handle);

        let mip_count = if params.use_mipmaps {
            max_mip_count(params.width, params.height)
        } else {
            1
        };
        let sample_count = if params.is_static { 1 } else { params.msaa.max(1) };
        let id = self.backend.create_texture(&TextureDesc {
            label: "Pcc Probe".to_owned(),
            width: params.width,
            height: params.height,
            cubemaps: 1,
            mip_level_count: mip_count,
            sample_count,
            format: params.format,
            flags: TextureFlags::RENDER_TO_TEXTURE | TextureFlags::ALLOW_AUTOMIPMAPS,
        })?;

        let probe = self.registry.try_get_mut(handle)?;
        probe.texture = Some(ProbeTexture {
            id,
            width: params.width,
            height: params.height,
            format: params.format,
            mip_count,
            msaa: sample_count,
        });
        probe.msaa = params.msaa.max(1);
        probe.is_static = params.is_static;
        probe.mark_dirty();

        if let Some(request) = request {
            self.init_workspace(handle, request.near, request.far, Some(&request.definition))?;
        }
        Ok(())
    }

    /// Switches between static (captured once) and dynamic (captured while
    /// relevant) probes. Manual probes with a texture get it recreated with
    /// the matching sample count.
    pub fn set_static(&mut self, handle: ProbeHandle, is_static: bool) -> Result<()> {
        let automatic = self.is_automatic();
        let probe = self.registry.try_get_mut(handle)?;
        if probe.is_static == is_static {
            return Ok(());
        }

        if !automatic && let Some(texture) = probe.texture {
            let params = TextureParams {
                width: texture.width,
                height: texture.height,
                use_mipmaps: texture.mip_count > 1,
                format: texture.format,
                is_static,
                msaa: probe.msaa,
            };
            return self.set_texture_params(handle, &params);
        }

        probe.is_static = is_static;
        self.sync_internal_probe(handle);
        Ok(())
    }

    // === Capture workspace ===

    /// Creates the capture camera and workspace of a probe.
    ///
    /// `definition` defaults to [`PccSettings::probe_workspace`]. In
    /// automatic mode the probe also gets an array slice; if none is left
    /// the probe is disabled with a warning.
    ///
    /// [`PccSettings::probe_workspace`]: crate::settings::PccSettings::probe_workspace
    pub fn init_workspace(
        &mut self,
        handle: ProbeHandle,
        near: f32,
        far: f32,
        definition: Option<&str>,
    ) -> Result<()> {
        let probe = self.registry.try_get(handle)?;
        if !self.is_automatic() && probe.texture.is_none() {
            log::warn!("init_workspace on probe {handle:?} before set_texture_params");
            return Err(PccError::MissingTextureParams(handle));
        }

        let request = CaptureRequest {
            near,
            far,
            definition: definition.map_or_else(|| self.settings.probe_workspace.clone(), str::to_owned),
        };

        self.teardown_capture(handle);

        if self.is_automatic() {
            self.assign_array_slot(handle, &request)?;
            let Some(probe) = self.registry.get(handle) else {
                return Ok(());
            };
            if probe.array_index.is_none() {
                return Ok(());
            }
        }

        let capture = match self.create_capture(handle, &request) {
            Ok(capture) => capture,
            Err(err) => {
                self.teardown_capture(handle);
                return Err(err);
            }
        };
        let probe = self.registry.try_get_mut(handle)?;
        probe.capture = Some(capture);
        probe.capture_request = Some(request);
        probe.mark_dirty();
        Ok(())
    }

    /// [`init_workspace`](Self::init_workspace) with the clip planes and
    /// workspace definition from the settings.
    pub fn init_default_workspace(&mut self, handle: ProbeHandle) -> Result<()> {
        let (near, far) = (self.settings.probe_near, self.settings.probe_far);
        self.init_workspace(handle, near, far, None)
    }

    /// Destroys the capture camera and workspace and forgets the request.
    pub fn destroy_workspace(&mut self, handle: ProbeHandle) -> Result<()> {
        self.registry.try_get(handle)?;
        self.teardown_capture(handle);
        if let Some(probe) = self.registry.get_mut(handle) {
            probe.capture_request = None;
        }
        Ok(())
    }

    fn assign_array_slot(&mut self, handle: ProbeHandle, request: &CaptureRequest) -> Result<()> {
        let Some(SystemOutput::Array(array)) = &self.output else {
            return Err(PccError::NotEnabled("automatic probes need the cubemap array"));
        };
        let array_texture = ProbeTexture {
            id: array.texture,
            width: self.settings.width,
            height: self.settings.height,
            format: self.settings.format,
            mip_count: array.mip_count,
            msaa: 1,
        };

        let Some(slot) = self.acquire_array_slot() else {
            log::warn!("Cubemap array is full; disabling probe {handle:?}");
            let probe = self.registry.try_get_mut(handle)?;
            probe.enabled = false;
            probe.capture_request = Some(request.clone());
            return Ok(());
        };

        let is_static = self.registry.try_get(handle)?.is_static;
        let internal = match self.backend.create_internal_probe(is_static) {
            Ok(internal) => internal,
            Err(err) => {
                self.release_array_slot(slot);
                return Err(err);
            }
        };

        let probe = self.registry.try_get_mut(handle)?;
        probe.array_index = Some(slot);
        probe.texture = Some(array_texture);
        probe.internal_probe = Some(internal);
        self.sync_internal_probe(handle);
        Ok(())
    }

    /// Creates camera, render target and workspaces; everything created so
    /// far is released again if a step fails.
    fn create_capture(&mut self, handle: ProbeHandle, request: &CaptureRequest) -> Result<CaptureState> {
        let probe = self.registry.try_get(handle)?;
        let is_static = probe.is_static;
        let Some(texture) = probe.texture else {
            return Err(PccError::MissingTextureParams(handle));
        };
        let automatic = self.is_automatic();

        let camera = self.backend.create_camera(&CameraDesc {
            label: "Pcc Probe Camera".to_owned(),
            fov_y_degrees: 90.0,
            aspect_ratio: 1.0,
            near: request.near,
            far: request.far,
            light_culling: !is_static,
        })?;

        let render_target = if automatic {
            let key = RttKey {
                width: texture.width,
                height: texture.height,
                format: texture.format,
                msaa: 1,
            };
            match self.tmp_rtts.acquire(&mut self.backend, key, texture.mip_count) {
                Ok(id) => id,
                Err(err) => {
                    self.backend.destroy_camera(camera);
                    return Err(err);
                }
            }
        } else {
            texture.id
        };

        let release = |system: &mut Self| {
            if automatic {
                system.tmp_rtts.release(&mut system.backend, render_target);
            }
            system.backend.destroy_camera(camera);
        };

        let workspace = match self.backend.create_workspace(&WorkspaceDesc {
            kind: WorkspaceKind::Capture,
            definition: request.definition.clone(),
            target: render_target,
            camera,
        }) {
            Ok(workspace) => workspace,
            Err(err) => {
                release(self);
                return Err(err);
            }
        };

        let clear_workspace = if is_static {
            None
        } else {
            match self.backend.create_workspace(&WorkspaceDesc {
                kind: WorkspaceKind::Clear,
                definition: String::new(),
                target: render_target,
                camera,
            }) {
                Ok(clear) => Some(clear),
                Err(err) => {
                    self.backend.destroy_workspace(workspace);
                    release(self);
                    return Err(err);
                }
            }
        };

        Ok(CaptureState {
            camera,
            workspace,
            clear_workspace,
            render_target,
        })
    }

    /// Releases everything `init_workspace` created. The capture request
    /// survives.
    pub(super) fn teardown_capture(&mut self, handle: ProbeHandle) {
        let automatic = self.is_automatic();
        let Some(probe) = self.registry.get_mut(handle) else {
            return;
        };
        let capture = probe.capture.take();
        let internal = probe.internal_probe.take();
        let slot = probe.array_index.take();
        if automatic {
            probe.texture = None;
        }

        if let Some(capture) = capture {
            if let Some(clear) = capture.clear_workspace {
                self.backend.destroy_workspace(clear);
            }
            self.backend.destroy_workspace(capture.workspace);
            self.backend.destroy_camera(capture.camera);
            if automatic {
                self.tmp_rtts.release(&mut self.backend, capture.render_target);
            }
        }
        if let Some(internal) = internal {
            self.backend.destroy_internal_probe(internal);
        }
        if let Some(slot) = slot {
            self.release_array_slot(slot);
        }
    }

    fn destroy_probe_texture(&mut self, handle: ProbeHandle) {
        if self.is_automatic() {
            return;
        }
        if let Some(texture) = self.registry.get_mut(handle).and_then(|p| p.texture.take()) {
            self.backend.destroy_texture(texture.id);
        }
    }

    // === Manual references ===

    /// Registers a material using this probe outside the regular
    /// selection. The first reference creates its constant buffer.
    pub fn add_reference(&mut self, handle: ProbeHandle) -> Result<()> {
        self.require_manual("add_reference")?;
        let probe = self.registry.try_get(handle)?;
        if probe.num_users == 0 {
            let buffer = self.backend.create_const_buffer(PROBE_RECORD_SIZE)?;
            let probe = self.registry.try_get_mut(handle)?;
            probe.const_buffer = Some(buffer);
        }

        let probe = self.registry.try_get_mut(handle)?;
        probe.num_users += 1;
        self.feeder.add_active(handle);
        Ok(())
    }

    /// Drops one material reference; the last one frees the constant
    /// buffer.
    pub fn remove_reference(&mut self, handle: ProbeHandle) -> Result<()> {
        self.require_manual("remove_reference")?;
        let probe = self.registry.try_get_mut(handle)?;
        if probe.num_users == 0 {
            log::warn!("remove_reference on probe {handle:?} without references");
            return Ok(());
        }

        probe.num_users -= 1;
        if probe.num_users == 0 {
            if let Some(buffer) = probe.const_buffer.take() {
                self.backend.destroy_const_buffer(buffer);
            }
            self.feeder.remove_active(handle, &mut self.backend);
        }
        Ok(())
    }

    // === Destruction ===

    /// Destroys a probe and every resource it owns.
    ///
    /// Fails with [`PccError::ProbeInUse`] while materials still reference
    /// it.
    pub fn destroy_probe(&mut self, handle: ProbeHandle) -> Result<()> {
        let probe = self.registry.try_get(handle)?;
        if probe.num_users > 0 {
            return Err(PccError::ProbeInUse {
                handle,
                users: probe.num_users,
            });
        }

        self.teardown_capture(handle);
        self.destroy_probe_texture(handle);

        let was_selected = self.selection.forget(handle);
        self.dirty_probes.retain(|h| *h != handle);
        self.registry.remove(handle)?;
        if was_selected {
            self.sync_proxies();
            self.blended_needs_update = true;
        }
        log::debug!("Destroyed probe {handle:?}");
        Ok(())
    }

    /// Destroys every probe, including referenced ones.
    pub fn destroy_all_probes(&mut self) {
        let handles: Vec<ProbeHandle> = self.registry.handles().to_vec();
        for &handle in &handles {
            self.teardown_capture(handle);
            self.destroy_probe_texture(handle);
            if let Some(buffer) = self.registry.get_mut(handle).and_then(|p| p.const_buffer.take()) {
                self.backend.destroy_const_buffer(buffer);
            }
            self.feeder.remove_active(handle, &mut self.backend);
        }

        self.registry.drain();
        self.selection = SelectionResult::empty();
        self.sync_proxies();
        self.dirty_probes.clear();
        self.blended_needs_update = true;
    }
}
