//! Frame Driver Integration Tests
//!
//! Tests for:
//! - Phase order and registration order
//! - Unsubscribing
//! - Error propagation stopping the frame

use parallax::PccError;
use parallax::frame::{FrameDriver, FramePhase};

#[derive(Default)]
struct Log {
    entries: Vec<&'static str>,
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn phases_run_in_frame_order() {
    let mut driver = FrameDriver::new();
    driver.subscribe(FramePhase::AfterFrame, |log: &mut Log| {
        log.entries.push("after");
        Ok(())
    });
    driver.subscribe(FramePhase::BeforeRenderPasses, |log: &mut Log| {
        log.entries.push("passes");
        Ok(())
    });
    driver.subscribe(FramePhase::BeforeFrame, |log: &mut Log| {
        log.entries.push("before");
        Ok(())
    });

    let mut log = Log::default();
    driver.run_frame(&mut log).unwrap();
    assert_eq!(log.entries, vec!["before", "passes", "after"]);
}

#[test]
fn same_phase_runs_in_registration_order() {
    let mut driver = FrameDriver::new();
    driver.subscribe(FramePhase::BeforeFrame, |log: &mut Log| {
        log.entries.push("first");
        Ok(())
    });
    driver.subscribe(FramePhase::BeforeFrame, |log: &mut Log| {
        log.entries.push("second");
        Ok(())
    });

    let mut log = Log::default();
    driver.run_phase(FramePhase::BeforeFrame, &mut log).unwrap();
    driver.run_phase(FramePhase::AfterFrame, &mut log).unwrap();
    assert_eq!(log.entries, vec!["first", "second"]);
}

// ============================================================================
// Subscriptions
// ============================================================================

#[test]
fn unsubscribe_removes_callback_once() {
    let mut driver = FrameDriver::new();
    let id = driver.subscribe(FramePhase::BeforeFrame, |log: &mut Log| {
        log.entries.push("gone");
        Ok(())
    });
    assert_eq!(driver.len(), 1);

    assert!(driver.unsubscribe(id));
    assert!(!driver.unsubscribe(id));
    assert!(driver.is_empty());

    let mut log = Log::default();
    driver.run_frame(&mut log).unwrap();
    assert!(log.entries.is_empty());
}

#[test]
fn callbacks_keep_their_own_state() {
    let mut driver = FrameDriver::new();
    let mut frames = 0u32;
    driver.subscribe(FramePhase::AfterFrame, move |log: &mut Log| {
        frames += 1;
        if frames == 2 {
            log.entries.push("second frame");
        }
        Ok(())
    });

    let mut log = Log::default();
    driver.run_frame(&mut log).unwrap();
    driver.run_frame(&mut log).unwrap();
    assert_eq!(log.entries, vec!["second frame"]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn error_stops_the_frame() {
    let mut driver = FrameDriver::new();
    driver.subscribe(FramePhase::BeforeFrame, |_: &mut Log| {
        Err(PccError::Backend("device lost".to_owned()))
    });
    driver.subscribe(FramePhase::BeforeFrame, |log: &mut Log| {
        log.entries.push("skipped");
        Ok(())
    });
    driver.subscribe(FramePhase::AfterFrame, |log: &mut Log| {
        log.entries.push("skipped too");
        Ok(())
    });

    let mut log = Log::default();
    assert!(matches!(driver.run_frame(&mut log), Err(PccError::Backend(_))));
    assert!(log.entries.is_empty());
}
