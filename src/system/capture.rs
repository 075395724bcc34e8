//! Capture passes on top of the compositor.

use crate::backend::{PccBackend, SamplerPolicy, TextureId, WorkspaceDesc, WorkspaceId, WorkspaceKind};
use crate::errors::{PccError, Result};
use crate::probe::{CaptureState, CubemapProbe, ProbeHandle, ProbeRegistry, ProbeVolume};
use crate::scheduler::{CaptureExecutor, CaptureStep, ProbeRenderScheduler, ScheduleReport};

use super::{CAPTURE_VISIBILITY_MASK, CubemapSystem, SystemOutput};

/// Where a capture pass sends its result besides the probe's target.
#[derive(Debug, Clone, Copy)]
enum CaptureSink {
    /// Manual mode: before each pass the probe's current content is copied
    /// into the blend target so it reflects itself progressively.
    Copy {
        workspace: WorkspaceId,
        bind_mips: u32,
    },
    /// Automatic mode: the temporary target is copied into an array slice.
    Array { texture: TextureId },
    None,
}

struct SystemCapture<'a, B: PccBackend> {
    backend: &'a mut B,
    sink: CaptureSink,
    final_volume: &'a mut ProbeVolume,
    current_mip: &'a mut u32,
}

impl<B: PccBackend> SystemCapture<'_, B> {
    /// Static probes have no persistent clear workspace; one is created
    /// for the clear and destroyed right after.
    fn clear_cubemap(&mut self, capture: &CaptureState) -> Result<()> {
        if let Some(clear) = capture.clear_workspace {
            return self.backend.update_workspace(clear);
        }

        let clear = self.backend.create_workspace(&WorkspaceDesc {
            kind: WorkspaceKind::Clear,
            definition: String::new(),
            target: capture.render_target,
            camera: capture.camera,
        })?;
        let result = self.backend.update_workspace(clear);
        self.backend.destroy_workspace(clear);
        result
    }
}

impl<B: PccBackend> CaptureExecutor for SystemCapture<'_, B> {
    fn capture(&mut self, handle: ProbeHandle, probe: &CubemapProbe, step: CaptureStep) -> Result<()> {
        let Some(capture) = probe.capture else {
            return Err(PccError::Backend(format!("probe {handle:?} has no capture workspace")));
        };

        *self.final_volume = probe.volume;

        if step.standalone_frame {
            self.backend.begin_frame();
        }
        let copy_workspace = match self.sink {
            CaptureSink::Copy { workspace, bind_mips } => {
                let sampler = if probe.mip_count() == bind_mips {
                    SamplerPolicy::Point
                } else {
                    SamplerPolicy::Trilinear
                };
                self.backend.set_copy_source(probe.texture().map(|t| t.id), sampler);
                Some(workspace)
            }
            _ => None,
        };
        // Only standalone frames bracket the copy workspace.
        let bracket = copy_workspace.filter(|_| step.standalone_frame);
        if let Some(workspace) = bracket {
            self.backend.begin_update(workspace);
        }

        let mut result = Ok(());
        if step.clear {
            result = self.clear_cubemap(&capture);
        }
        if result.is_ok()
            && let Some(workspace) = copy_workspace
        {
            result = self.backend.update_workspace(workspace);
        }
        if result.is_ok() {
            result = self.backend.update_workspace(capture.workspace);
        }
        if result.is_ok() {
            if probe.is_static {
                self.backend.set_camera_light_culling(capture.camera, false);
            }
            if let (CaptureSink::Array { texture }, Some(slot)) = (self.sink, probe.array_index) {
                result = self.backend.copy_to_cubemap_array(capture.render_target, texture, slot);
            }
        }

        if let Some(workspace) = bracket {
            self.backend.end_update(workspace);
        }
        if step.standalone_frame {
            self.backend.end_frame();
        }
        *self.current_mip = 0;
        result
    }
}

impl<B: PccBackend> CubemapSystem<B> {
    fn capture_sink(&self) -> CaptureSink {
        match &self.output {
            Some(SystemOutput::Blend(blend)) => CaptureSink::Copy {
                workspace: blend.copy_workspace,
                bind_mips: blend.mip_count,
            },
            Some(SystemOutput::Array(array)) => CaptureSink::Array {
                texture: array.texture,
            },
            None => CaptureSink::None,
        }
    }

    /// Full capture loops for candidates above `threshold` iterations.
    pub(super) fn run_expensive(&mut self, candidates: &[ProbeHandle], threshold: u16) -> ScheduleReport {
        self.run_captures(|scheduler, registry, executor| {
            scheduler.update_expensive(registry, candidates, threshold, executor)
        })
    }

    /// One capture pass for each candidate needing one.
    pub(super) fn run_cheap(&mut self, candidates: &[ProbeHandle]) -> ScheduleReport {
        self.run_captures(|scheduler, registry, executor| {
            scheduler.update_cheap(registry, candidates, executor)
        })
    }

    fn run_captures<F>(&mut self, schedule: F) -> ScheduleReport
    where
        F: FnOnce(
            &ProbeRenderScheduler,
            &mut ProbeRegistry,
            &mut dyn CaptureExecutor,
        ) -> ScheduleReport,
    {
        let sink = self.capture_sink();
        let old_mask = self.backend.visibility_mask();
        self.backend.set_visibility_mask(CAPTURE_VISIBILITY_MASK);

        let report = {
            let mut executor = SystemCapture {
                backend: &mut self.backend,
                sink,
                final_volume: &mut self.final_volume,
                current_mip: &mut self.current_mip,
            };
            schedule(&self.scheduler, &mut self.registry, &mut executor)
        };

        self.backend.set_visibility_mask(old_mask);
        if report.passes > 0 {
            self.blended_needs_update = true;
        }
        report
    }
}
