//! Automatic mode: every probe lives in one slice of a cubemap array.

use glam::Quat;

use crate::backend::{PccBackend, ProbeTransform, TextureDesc, TextureFlags};
use crate::constant_buffer::pack_per_pixel_record;
use crate::errors::{PccError, Result};
use crate::math::max_mip_count;
use crate::probe::{CaptureRequest, ProbeHandle};
use crate::settings::PccMode;
use crate::slots::CubemapSlotAllocator;

use super::{ArrayOutput, CubemapSystem, SystemOutput};

impl<B: PccBackend> CubemapSystem<B> {
    pub(super) fn enable_array(&mut self) -> Result<()> {
        let PccMode::Automatic { max_probes } = self.settings.mode else {
            return Err(PccError::WrongMode {
                operation: "enable_array",
                mode: self.settings.mode,
            });
        };

        let (width, height) = (self.settings.width, self.settings.height);
        let mip_count = max_mip_count(width, height);
        let texture = self.backend.create_texture(&TextureDesc {
            label: "Pcc Cubemap Array".to_owned(),
            width,
            height,
            cubemaps: max_probes,
            mip_level_count: mip_count,
            sample_count: 1,
            format: self.settings.format,
            flags: TextureFlags::MANUAL | TextureFlags::CUBEMAP_ARRAY,
        })?;

        self.output = Some(SystemOutput::Array(ArrayOutput {
            texture,
            mip_count,
            slots: CubemapSlotAllocator::new(max_probes),
        }));

        let requests: Vec<(ProbeHandle, CaptureRequest)> = self
            .registry
            .iter()
            .filter_map(|(handle, probe)| probe.capture_request.clone().map(|r| (handle, r)))
            .collect();
        for (handle, request) in requests {
            if let Err(err) = self.init_workspace(handle, request.near, request.far, Some(&request.definition)) {
                log::warn!("Could not restore capture workspace of probe {handle:?}: {err}");
            }
        }
        Ok(())
    }

    /// Tears down every capture workspace but keeps the requests, so
    /// re-enabling restores them.
    pub(super) fn disable_array(&mut self, array: &ArrayOutput) {
        let handles: Vec<ProbeHandle> = self.registry.handles().to_vec();
        for handle in handles {
            self.teardown_capture(handle);
        }
        self.dirty_probes.clear();
        self.backend.destroy_texture(array.texture);
    }

    /// Rebuilds this frame's capture list: enabled probes that are dirty,
    /// or dynamic and containing the tracked position.
    pub(super) fn refresh_dirty_probes(&mut self) {
        let tracked = self.tracked_position;
        self.dirty_probes = self
            .registry
            .iter()
            .filter(|(_, probe)| {
                let near_dynamic = !probe.is_static && probe.volume.containing_ndf(tracked).is_some();
                probe.enabled && probe.is_initialized() && (probe.dirty || near_dynamic)
            })
            .map(|(handle, _)| handle)
            .collect();

        let dirty = std::mem::take(&mut self.dirty_probes);
        self.prepare_for_rendering(&dirty);
        self.dirty_probes = dirty;
    }

    pub(super) fn update_all_dirty_automatic(&mut self) {
        self.dirty_probes = self
            .registry
            .iter()
            .filter(|(_, probe)| probe.enabled && probe.dirty && probe.is_initialized())
            .map(|(handle, _)| handle)
            .collect();

        let dirty = std::mem::take(&mut self.dirty_probes);
        self.prepare_for_rendering(&dirty);
        let report = self.run_expensive(&dirty, 0);
        self.last_report.merge(report);
        self.dirty_probes = dirty;
    }

    /// Pushes a probe's volume to its per-pixel probe object.
    pub(super) fn sync_internal_probe(&mut self, handle: ProbeHandle) {
        let Some(probe) = self.registry.get(handle) else {
            return;
        };
        let Some(internal) = probe.internal_probe else {
            return;
        };

        let volume = probe.volume();
        let transform = ProbeTransform {
            position: volume.area.center,
            scale: volume.area.half_size * 2.0,
            orientation: Quat::from_mat3(&volume.orientation),
        };
        let record = pack_per_pixel_record(volume, probe.array_index.unwrap_or(u32::MAX));
        self.backend
            .update_internal_probe(internal, &transform, &record, probe.is_static);
    }

    fn array_output_mut(&mut self) -> Option<&mut ArrayOutput> {
        match &mut self.output {
            Some(SystemOutput::Array(array)) => Some(array),
            _ => None,
        }
    }

    /// Reserves an array slice, `None` when the array is missing or full.
    pub(super) fn acquire_array_slot(&mut self) -> Option<u32> {
        self.array_output_mut()?.slots.acquire()
    }

    pub(super) fn release_array_slot(&mut self, slot: u32) {
        if let Some(array) = self.array_output_mut() {
            array.slots.release(slot);
        }
    }
}
