//! Probe Render Scheduler
//!
//! Decides which probes are re-captured and drives the capture passes
//! through a [`CaptureExecutor`].
//!
//! # Overview
//!
//! A probe cycles through:
//!
//! ```text
//!          mark_dirty() / non-static
//!  Clean ─────────────────────────────► Dirty
//!    ▲                                    │ capture pass j = 0 .. N-1
//!    └────────────────────────────────────┘ (N = num_iterations)
//! ```
//!
//! Two policies share that state machine:
//!
//! | Policy                         | Called             | Work per call                        |
//! |--------------------------------|--------------------|--------------------------------------|
//! | [`update_expensive`]           | before the frame   | full loop for probes with N > limit  |
//! | [`update_cheap`]               | before rendering   | one pass per probe needing capture   |
//!
//! Passes for one probe always run in iteration order and the first pass
//! of a cycle clears the target. A failed pass leaves the probe exactly as
//! it was, so the next call retries it.
//!
//! [`update_expensive`]: ProbeRenderScheduler::update_expensive
//! [`update_cheap`]: ProbeRenderScheduler::update_cheap

use smallvec::SmallVec;

use crate::errors::Result;
use crate::probe::{CubemapProbe, ProbeHandle, ProbeRegistry};

// ─── Executor Seam ─────────────────────────────────────────────────────────

/// One capture pass request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStep {
    /// Zero-based pass index within the probe's current cycle.
    pub iteration: u16,
    /// The target must be cleared before this pass.
    pub clear: bool,
    /// The pass runs outside the regular frame and must open and submit
    /// its own.
    pub standalone_frame: bool,
    /// Last pass of the cycle.
    pub last: bool,
}

/// Runs capture passes on the GPU.
///
/// Implemented by the cubemap system on top of its compositor; tests plug
/// in a recorder.
pub trait CaptureExecutor {
    fn capture(&mut self, handle: ProbeHandle, probe: &CubemapProbe, step: CaptureStep) -> Result<()>;
}

// ─── Report ────────────────────────────────────────────────────────────────

/// What one scheduling call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Capture passes executed successfully.
    pub passes: u32,
    /// Probes that finished a cycle during this call.
    pub completed: SmallVec<[ProbeHandle; 4]>,
    /// Probes whose pass failed; they keep their state.
    pub failed: SmallVec<[ProbeHandle; 4]>,
}

impl ScheduleReport {
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.passes == 0 && self.failed.is_empty()
    }

    pub fn merge(&mut self, other: ScheduleReport) {
        self.passes += other.passes;
        self.completed.extend(other.completed);
        self.failed.extend(other.failed);
    }
}

// ─── Scheduler ─────────────────────────────────────────────────────────────

/// Stateless driver of the capture state machine. Probe progress lives on
/// the probes themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeRenderScheduler;

impl ProbeRenderScheduler {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs the whole capture loop of every candidate needing capture whose
    /// iteration count exceeds `threshold`.
    ///
    /// Each pass opens its own frame. A cycle interrupted by a failure is
    /// abandoned; the probe stays dirty and restarts from pass 0 next time.
    pub fn update_expensive<E: CaptureExecutor + ?Sized>(
        &self,
        registry: &mut ProbeRegistry,
        candidates: &[ProbeHandle],
        threshold: u16,
        executor: &mut E,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        for &handle in candidates {
            let Some(probe) = registry.get(handle) else {
                continue;
            };
            let iterations = probe.num_iterations;
            if !probe.needs_capture() || iterations <= threshold {
                continue;
            }

            let mut finished = true;
            for iteration in 0..iterations {
                let step = CaptureStep {
                    iteration,
                    clear: iteration == 0,
                    standalone_frame: true,
                    last: iteration + 1 == iterations,
                };
                if let Err(err) = executor.capture(handle, probe, step) {
                    log::debug!("Capture of probe {handle:?} failed at pass {iteration}: {err}");
                    finished = false;
                    break;
                }
                report.passes += 1;
            }

            if finished {
                if let Some(probe) = registry.get_mut(handle) {
                    probe.dirty = false;
                    probe.iterations_done = 0;
                }
                report.completed.push(handle);
            } else {
                report.failed.push(handle);
            }
        }

        report
    }

    /// Advances every candidate needing capture by a single pass.
    ///
    /// A probe with `num_iterations = N` returns to clean after N calls.
    /// Clean static probes are never touched.
    pub fn update_cheap<E: CaptureExecutor + ?Sized>(
        &self,
        registry: &mut ProbeRegistry,
        candidates: &[ProbeHandle],
        executor: &mut E,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        for &handle in candidates {
            let Some(probe) = registry.get(handle) else {
                continue;
            };
            if !probe.needs_capture() {
                continue;
            }

            let iterations = probe.num_iterations.max(1);
            let iteration = probe.iterations_done.min(iterations - 1);
            let step = CaptureStep {
                iteration,
                clear: iteration == 0,
                standalone_frame: false,
                last: iteration + 1 == iterations,
            };

            if let Err(err) = executor.capture(handle, probe, step) {
                log::debug!("Capture of probe {handle:?} failed at pass {iteration}, retrying next call: {err}");
                report.failed.push(handle);
                continue;
            }
            report.passes += 1;

            if let Some(probe) = registry.get_mut(handle) {
                if step.last {
                    probe.dirty = false;
                    probe.iterations_done = 0;
                    report.completed.push(handle);
                } else {
                    probe.iterations_done = iteration + 1;
                }
            }
        }

        report
    }
}
