//! Manual mode: per-frame selection and blending into one cubemap.

use glam::{Mat4, Quat, Vec3};

use crate::backend::{
    CameraDesc, CameraId, PccBackend, SamplerPolicy, TextureId, WorkspaceDesc, WorkspaceId, WorkspaceKind,
};
use crate::constant_buffer::{ProbeShaderRecord, inverse_view_rotation, pack_probe_record};
use crate::errors::{PccError, Result};
use crate::frame::{PassInfo, PassKind};
use crate::math::{Aabb, max_mip_count};
use crate::probe::{ProbeHandle, ProbeRegistry, ProbeVolume};
use crate::selection::{MAX_CUBE_PROBES, ProbeSlot, SelectionResult};
use crate::texture_pool::RttKey;

use super::{BlendOutput, CubemapSystem, SystemOutput};

/// Pass identifier of the blend and copy passes that receive LOD updates.
const BLEND_PASS_IDENTIFIER: u32 = 10;

// ─── Pure helpers ──────────────────────────────────────────────────────────

/// Where the blend camera sits.
///
/// With a single probe it sits at that probe's capture position. With more,
/// the dominant weight (in `[1/count, 1]`) is remapped to `[0, 1]` and used
/// to move from the tracked position toward the dominant probe.
#[must_use]
pub fn blend_camera_position(
    tracked_position: Vec3,
    dominant_camera_pos: Vec3,
    dominant_weight: f32,
    count: usize,
) -> Vec3 {
    if count > 1 {
        tracked_position.lerp(dominant_camera_pos, dominant_weight * count as f32 - 1.0)
    } else {
        dominant_camera_pos
    }
}

/// The blended cubemap must be regenerated unless both the previous and
/// the current selection hold the same single probe (or none).
#[must_use]
pub fn blended_needs_update(
    prev_count: usize,
    prev_dominant: ProbeSlot,
    count: usize,
    dominant: ProbeSlot,
) -> bool {
    !(prev_count <= 1 && count <= 1 && prev_count == count && dominant == prev_dominant)
}

/// Volume the shading pass parallax-corrects the blended cubemap against.
///
/// Starts from the dominant probe; the shape grows toward each other
/// collected probe by its remapped weight, cubed.
#[must_use]
pub fn merge_final_volume(registry: &ProbeRegistry, selection: &SelectionResult) -> ProbeVolume {
    let mut volume = *registry.resolve(selection.slots[0]).volume();
    let count = selection.count.min(MAX_CUBE_PROBES);

    for i in 1..count {
        let rank = (i + 1) as f32;
        let mut weight = selection.weights[i] * rank;
        if i != count - 1 {
            weight -= rank / count as f32;
        }
        let blend = weight * weight * weight;

        let mut merged = volume.shape;
        merged.merge(registry.resolve(selection.slots[i]).shape());
        let min = volume.shape.min().lerp(merged.min(), blend);
        let max = volume.shape.max().lerp(merged.max(), blend);
        volume.shape = Aabb::from_extents(min, max);
    }

    volume
}

// ─── System: manual mode ───────────────────────────────────────────────────

impl<B: PccBackend> CubemapSystem<B> {
    pub(super) fn enable_blending(&mut self) -> Result<()> {
        let (width, height, format) = (self.settings.width, self.settings.height, self.settings.format);
        let key = RttKey {
            width,
            height,
            format,
            msaa: 1,
        };
        let texture = self.ibl_rtts.acquire(&mut self.backend, key, max_mip_count(width, height))?;
        let mip_count = self.ibl_rtts.mip_count(texture).unwrap_or(1);

        let camera = match self.backend.create_camera(&CameraDesc {
            label: "Pcc Blend Camera".to_owned(),
            fov_y_degrees: 90.0,
            aspect_ratio: 1.0,
            near: 0.01,
            far: 0.0,
            light_culling: true,
        }) {
            Ok(camera) => camera,
            Err(err) => {
                self.ibl_rtts.release(&mut self.backend, texture);
                return Err(err);
            }
        };

        let workspaces = self.create_blend_workspaces(texture, camera);
        let (blend_workspace, copy_workspace) = match workspaces {
            Ok(pair) => pair,
            Err(err) => {
                self.backend.destroy_camera(camera);
                self.ibl_rtts.release(&mut self.backend, texture);
                return Err(err);
            }
        };

        let blend = BlendOutput {
            texture,
            mip_count,
            camera,
            blend_workspace,
            copy_workspace,
        };

        if let Err(err) = self.proxies.create(
            &mut self.backend,
            self.settings.reserved_render_queue,
            self.settings.proxy_visibility_mask,
        ) {
            self.disable_blending(blend);
            return Err(err);
        }

        self.backend.notify_ibl_spec_mipmaps(mip_count);
        self.output = Some(SystemOutput::Blend(blend));
        self.blended_needs_update = true;
        Ok(())
    }

    fn create_blend_workspaces(
        &mut self,
        texture: TextureId,
        camera: CameraId,
    ) -> Result<(WorkspaceId, WorkspaceId)> {
        let blend = self.backend.create_workspace(&WorkspaceDesc {
            kind: WorkspaceKind::Blend,
            definition: String::new(),
            target: texture,
            camera,
        })?;
        match self.backend.create_workspace(&WorkspaceDesc {
            kind: WorkspaceKind::Copy,
            definition: String::new(),
            target: texture,
            camera,
        }) {
            Ok(copy) => Ok((blend, copy)),
            Err(err) => {
                self.backend.destroy_workspace(blend);
                Err(err)
            }
        }
    }

    pub(super) fn disable_blending(&mut self, blend: BlendOutput) {
        self.proxies.destroy(&mut self.backend);
        self.backend.destroy_workspace(blend.copy_workspace);
        self.backend.destroy_workspace(blend.blend_workspace);
        self.backend.destroy_camera(blend.camera);
        self.ibl_rtts.release(&mut self.backend, blend.texture);
    }

    fn blend_output(&self) -> Option<BlendOutput> {
        match &self.output {
            Some(SystemOutput::Blend(blend)) => Some(*blend),
            _ => None,
        }
    }

    /// Mirrors the current selection onto the proxies, hiding emptied slots.
    pub(super) fn sync_proxies(&mut self) {
        if let Some(blend) = self.blend_output() {
            self.proxies
                .sync(&mut self.backend, &self.registry, &self.selection, blend.mip_count);
        }
    }

    /// Selects the probes around the tracked position, weights them and
    /// mirrors the result onto the proxies and the blend camera.
    pub fn update_selection(&mut self) -> Result<()> {
        self.require_manual("update_selection")?;

        let prev_count = self.selection.count;
        let prev_dominant = self.selection.slots[0];

        self.selection = self
            .selector
            .select(&self.registry, self.tracked_position, &self.tracked_view_proj);

        let collected: Vec<ProbeHandle> = self.selection.collected().collect();
        self.prepare_for_rendering(&collected);

        let dominant = self.registry.resolve(self.selection.slots[0]);
        self.blend_camera_pos = blend_camera_position(
            self.tracked_position,
            dominant.camera_pos(),
            self.selection.weights[0],
            self.selection.count,
        );
        let dominant_orientation = Quat::from_mat3(&dominant.orientation());

        if let Some(blend) = self.blend_output() {
            self.proxies
                .sync(&mut self.backend, &self.registry, &self.selection, blend.mip_count);
            self.backend
                .set_camera_pose(blend.camera, self.blend_camera_pos, dominant_orientation);
        }

        self.blended_needs_update |= blended_needs_update(
            prev_count,
            prev_dominant,
            self.selection.count,
            self.selection.slots[0],
        );
        Ok(())
    }

    /// Final probe merge, then copy (one probe) or blend (several) into the
    /// output when the result changed.
    pub(super) fn render_blended(&mut self) -> Result<()> {
        self.final_volume = merge_final_volume(&self.registry, &self.selection);
        self.final_volume.camera_pos = self.blend_camera_pos;

        let Some(blend) = self.blend_output() else {
            return Ok(());
        };
        if !self.blended_needs_update {
            return Ok(());
        }

        let old_mask = self.backend.visibility_mask();
        self.backend.set_visibility_mask(super::CAPTURE_VISIBILITY_MASK);
        self.current_mip = 0;

        let result = match self.selection.count {
            0 => Ok(()),
            1 => {
                let dominant = self.registry.resolve(self.selection.slots[0]);
                let sampler = if dominant.mip_count() == blend.mip_count {
                    SamplerPolicy::Point
                } else {
                    SamplerPolicy::Trilinear
                };
                self.backend
                    .set_copy_source(dominant.texture().map(|t| t.id), sampler);
                self.backend.update_workspace(blend.copy_workspace)
            }
            _ => self.backend.update_workspace(blend.blend_workspace),
        };

        self.backend.set_visibility_mask(old_mask);
        if result.is_ok() {
            self.blended_needs_update = false;
        }
        result
    }

    /// Compositor hook, called right before each pass executes.
    ///
    /// Blend scene passes and copy quad passes tagged with identifier 10 get
    /// the LOD matching the mip being written, then the mip advances.
    pub fn pass_pre_execute(&mut self, pass: PassInfo) {
        let Some(blend) = self.blend_output() else {
            return;
        };
        if pass.identifier != BLEND_PASS_IDENTIFIER {
            return;
        }
        let bind_mips = blend.mip_count.max(1);

        match pass.kind {
            PassKind::Scene => {
                for slot in 0..MAX_CUBE_PROBES {
                    let probe = self.registry.resolve(self.selection.slots[slot]);
                    let lod = (self.current_mip * probe.mip_count()) / bind_mips;
                    self.backend.set_blend_lod(slot, lod as f32);
                }
                self.current_mip += 1;
            }
            PassKind::Quad => {
                let probe = self.registry.resolve(self.selection.slots[0]);
                let lod = (self.current_mip * probe.mip_count()) / bind_mips;
                self.backend.set_copy_lod(lod as f32);
                self.current_mip += 1;
            }
            PassKind::Other => {}
        }
    }

    /// Shader record of the blended result for a pass with `view`.
    pub fn pass_record(&self, view: &Mat4) -> Result<ProbeShaderRecord> {
        self.require_manual("pass_record")?;
        if !self.is_enabled() {
            return Err(PccError::NotEnabled("pass_record needs the blend target"));
        }
        Ok(pack_probe_record(&self.final_volume, view, &inverse_view_rotation(view)))
    }

    /// Uploads the records of manually referenced probes for a pass with
    /// `view`. Returns true if anything was uploaded.
    pub fn prepare_pass(&mut self, view: &Mat4) -> Result<bool> {
        self.require_manual("prepare_pass")?;
        self.feeder.prepare_pass(view, &self.registry, &mut self.backend)
    }

    pub(super) fn update_all_dirty_manual(&mut self) -> Result<()> {
        let saved_position = self.tracked_position;
        let system_mask = self.selector.system_mask;

        // Each probe is baked from its own capture position.
        let positions: Vec<Vec3> = self
            .registry
            .iter()
            .filter(|(_, p)| p.enabled && (p.mask & system_mask) != 0)
            .map(|(_, p)| p.camera_pos())
            .collect();

        let mut result = Ok(());
        for camera_pos in positions {
            self.tracked_position = camera_pos;
            if let Err(err) = self.update_selection() {
                result = Err(err);
                break;
            }
            let candidates: Vec<ProbeHandle> = self.selection.collected().collect();
            let report = self.run_expensive(&candidates, 0);
            self.last_report.merge(report);
        }

        self.tracked_position = saved_position;
        self.selection = SelectionResult::empty();
        self.blended_needs_update = true;
        result
    }
}
