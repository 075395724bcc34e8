//! Scheduler Integration Tests
//!
//! Tests for:
//! - Expensive policy: full loops above the threshold, failure handling
//! - Cheap policy: one pass per call, convergence after N calls
//! - Clean static probes are left alone

use parallax::errors::{PccError, Result};
use parallax::probe::{CubemapProbe, ProbeHandle, ProbeRegistry};
use parallax::scheduler::{CaptureExecutor, CaptureStep, ProbeRenderScheduler};

#[derive(Default)]
struct Recorder {
    steps: Vec<(ProbeHandle, CaptureStep)>,
    /// Fails the pass with this (zero-based) index among all calls.
    fail_at: Option<usize>,
}

impl CaptureExecutor for Recorder {
    fn capture(&mut self, handle: ProbeHandle, _probe: &CubemapProbe, step: CaptureStep) -> Result<()> {
        if self.fail_at == Some(self.steps.len()) {
            self.fail_at = None;
            return Err(PccError::Backend("injected".to_owned()));
        }
        self.steps.push((handle, step));
        Ok(())
    }
}

fn registry_with(iterations: &[u16]) -> (ProbeRegistry, Vec<ProbeHandle>) {
    let mut registry = ProbeRegistry::new();
    let handles = iterations
        .iter()
        .map(|&n| {
            let mut probe = CubemapProbe::new();
            probe.set_num_iterations(n);
            registry.insert(probe)
        })
        .collect();
    (registry, handles)
}

// ============================================================================
// Expensive policy
// ============================================================================

#[test]
fn expensive_runs_full_loop_above_threshold() {
    let (mut registry, handles) = registry_with(&[4, 1]);
    let mut recorder = Recorder::default();

    let report = ProbeRenderScheduler::new().update_expensive(&mut registry, &handles, 1, &mut recorder);

    assert_eq!(report.passes, 4);
    assert_eq!(report.completed.as_slice(), &[handles[0]]);
    assert!(recorder.steps.iter().all(|(h, s)| *h == handles[0] && s.standalone_frame));
    let iterations: Vec<u16> = recorder.steps.iter().map(|(_, s)| s.iteration).collect();
    assert_eq!(iterations, vec![0, 1, 2, 3]);
    assert!(recorder.steps[0].1.clear);
    assert!(recorder.steps[1..].iter().all(|(_, s)| !s.clear));
    assert!(recorder.steps[3].1.last);

    assert!(!registry.get(handles[0]).unwrap().is_dirty());
    // Below the threshold: left for the cheap policy.
    assert!(registry.get(handles[1]).unwrap().is_dirty());
}

#[test]
fn expensive_threshold_zero_takes_everything() {
    let (mut registry, handles) = registry_with(&[1, 2]);
    let mut recorder = Recorder::default();

    let report = ProbeRenderScheduler::new().update_expensive(&mut registry, &handles, 0, &mut recorder);

    assert_eq!(report.passes, 3);
    assert_eq!(report.completed.len(), 2);
}

#[test]
fn expensive_failure_keeps_probe_dirty() {
    let (mut registry, handles) = registry_with(&[4]);
    let mut recorder = Recorder {
        fail_at: Some(2),
        ..Default::default()
    };

    let report = ProbeRenderScheduler::new().update_expensive(&mut registry, &handles, 1, &mut recorder);

    assert_eq!(report.passes, 2);
    assert_eq!(report.failed.as_slice(), &[handles[0]]);
    assert!(report.completed.is_empty());
    let probe = registry.get(handles[0]).unwrap();
    assert!(probe.is_dirty());
    assert_eq!(probe.iterations_done(), 0);

    // Retried from scratch next time.
    recorder.steps.clear();
    let report = ProbeRenderScheduler::new().update_expensive(&mut registry, &handles, 1, &mut recorder);
    assert_eq!(report.passes, 4);
    assert_eq!(recorder.steps[0].1.iteration, 0);
}

#[test]
fn expensive_skips_clean_static_probes() {
    let (mut registry, handles) = registry_with(&[4]);
    let mut recorder = Recorder::default();
    let scheduler = ProbeRenderScheduler::new();

    scheduler.update_expensive(&mut registry, &handles, 1, &mut recorder);
    recorder.steps.clear();
    let report = scheduler.update_expensive(&mut registry, &handles, 1, &mut recorder);

    assert!(report.is_idle());
    assert!(recorder.steps.is_empty());
}

// ============================================================================
// Cheap policy
// ============================================================================

#[test]
fn cheap_converges_after_n_calls() {
    let (mut registry, handles) = registry_with(&[3]);
    let mut recorder = Recorder::default();
    let scheduler = ProbeRenderScheduler::new();

    for call in 0..3u16 {
        assert!(registry.get(handles[0]).unwrap().is_dirty());
        let report = scheduler.update_cheap(&mut registry, &handles, &mut recorder);
        assert_eq!(report.passes, 1);
        let (_, step) = recorder.steps.last().copied().unwrap();
        assert_eq!(step.iteration, call);
        assert_eq!(step.clear, call == 0);
        assert!(!step.standalone_frame);
    }

    let probe = registry.get(handles[0]).unwrap();
    assert!(!probe.is_dirty());
    assert_eq!(probe.iterations_done(), 0);

    let report = scheduler.update_cheap(&mut registry, &handles, &mut recorder);
    assert!(report.is_idle());
}

#[test]
fn cheap_failure_retries_same_pass() {
    let (mut registry, handles) = registry_with(&[2]);
    let mut recorder = Recorder {
        fail_at: Some(1),
        ..Default::default()
    };
    let scheduler = ProbeRenderScheduler::new();

    scheduler.update_cheap(&mut registry, &handles, &mut recorder);
    let report = scheduler.update_cheap(&mut registry, &handles, &mut recorder);
    assert_eq!(report.failed.as_slice(), &[handles[0]]);
    assert_eq!(registry.get(handles[0]).unwrap().iterations_done(), 1);

    let report = scheduler.update_cheap(&mut registry, &handles, &mut recorder);
    assert_eq!(report.completed.as_slice(), &[handles[0]]);
    assert_eq!(recorder.steps.last().unwrap().1.iteration, 1);
}

#[test]
fn cheap_ignores_clean_static_probes() {
    let (mut registry, handles) = registry_with(&[1]);
    let mut recorder = Recorder::default();
    let scheduler = ProbeRenderScheduler::new();

    let report = scheduler.update_cheap(&mut registry, &handles, &mut recorder);
    assert_eq!(report.completed.as_slice(), &[handles[0]]);

    let probe = registry.get(handles[0]).unwrap();
    assert!(probe.is_static());
    assert!(!probe.needs_capture());
    assert!(scheduler.update_cheap(&mut registry, &handles, &mut recorder).is_idle());
}

#[test]
fn cheap_mark_dirty_restarts_cycle() {
    let (mut registry, handles) = registry_with(&[3]);
    let mut recorder = Recorder::default();
    let scheduler = ProbeRenderScheduler::new();

    scheduler.update_cheap(&mut registry, &handles, &mut recorder);
    scheduler.update_cheap(&mut registry, &handles, &mut recorder);
    registry.get_mut(handles[0]).unwrap().mark_dirty();
    scheduler.update_cheap(&mut registry, &handles, &mut recorder);

    let (_, step) = recorder.steps.last().copied().unwrap();
    assert_eq!(step.iteration, 0);
    assert!(step.clear);
}
