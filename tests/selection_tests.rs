//! Selection Integration Tests
//!
//! Tests for:
//! - ProbeSelector: containment, inner-region short cut, mask filtering
//! - Fallback to screen coverage when no area contains the position
//! - Blend weights: normalization, one-hot cases, dominant promotion
//! - SelectionResult::forget

mod common;

use common::{EPSILON, approx, cube};
use glam::{Mat3, Mat4, Vec3};
use parallax::probe::{CubemapProbe, ProbeRegistry};
use parallax::selection::{
    MAX_CUBE_PROBES, ProbeSelector, ProbeSlot, SelectionResult, compute_weights, promote_dominant,
    screen_coverage,
};

fn probe_at(center: Vec3, half: f32, inner: f32) -> CubemapProbe {
    let mut probe = CubemapProbe::new();
    probe.set(center, cube(center, half), Vec3::splat(inner), Mat3::IDENTITY, cube(center, half));
    probe
}

fn two_overlapping() -> (ProbeRegistry, parallax::ProbeHandle, parallax::ProbeHandle) {
    let mut registry = ProbeRegistry::new();
    let a = registry.insert(probe_at(Vec3::ZERO, 2.0, 0.5));
    let b = registry.insert(probe_at(Vec3::new(3.0, 0.0, 0.0), 2.0, 0.5));
    (registry, a, b)
}

// ============================================================================
// Collection
// ============================================================================

#[test]
fn selector_collects_overlapping_probes() {
    let (registry, a, b) = two_overlapping();
    let selector = ProbeSelector::default();

    let result = selector.select(&registry, Vec3::new(1.2, 0.0, 0.0), &Mat4::IDENTITY);

    assert_eq!(result.count, 2);
    assert_eq!(result.dominant(), Some(a));
    assert_eq!(result.slots[1], ProbeSlot::Probe(b));
    assert!(approx(result.ndfs[0], 0.2));
    assert!(approx(result.ndfs[1], 0.8));
    assert!(approx(result.weights[0], 0.64 / 0.68));
    assert!(approx(result.weights[1], 0.04 / 0.68));
    assert!(approx(result.weights.iter().sum::<f32>(), 1.0));
}

#[test]
fn selector_inner_region_uses_single_probe() {
    let (registry, a, _) = two_overlapping();
    let selector = ProbeSelector::default();

    let result = selector.select(&registry, Vec3::new(0.5, 0.0, 0.0), &Mat4::IDENTITY);

    assert_eq!(result.count, 1);
    assert_eq!(result.dominant(), Some(a));
    assert!(approx(result.weights[0], 1.0));
    assert!(result.slots[1..].iter().all(ProbeSlot::is_blank));
}

#[test]
fn selector_skips_masked_and_disabled_probes() {
    let (mut registry, a, b) = two_overlapping();
    registry.get_mut(a).unwrap().set_mask(0b10);
    let selector = ProbeSelector::new(0b01);

    let result = selector.select(&registry, Vec3::new(1.2, 0.0, 0.0), &Mat4::IDENTITY);
    assert_eq!(result.count, 1);
    assert_eq!(result.dominant(), Some(b));

    registry.get_mut(b).unwrap().set_enabled(false);
    let result = selector.select(&registry, Vec3::new(1.2, 0.0, 0.0), &Mat4::IDENTITY);
    assert_eq!(result.count, 0);
    assert_eq!(result.dominant(), None);
}

#[test]
fn selector_keeps_lowest_metrics_when_full() {
    let mut registry = ProbeRegistry::new();
    let mut handles = Vec::new();
    // Centers spread on x; the metric at x = 2 shrinks with the index.
    for i in 0..6 {
        let center = Vec3::new(i as f32 * 0.2, 0.0, 0.0);
        handles.push(registry.insert(probe_at(center, 4.0, 0.1)));
    }
    let selector = ProbeSelector::default();

    let result = selector.collect(&registry, Vec3::new(2.0, 0.0, 0.0), &Mat4::IDENTITY);

    assert_eq!(result.count, MAX_CUBE_PROBES);
    let picked: Vec<_> = result.slots.iter().filter_map(ProbeSlot::handle).collect();
    for handle in &handles[2..] {
        assert!(picked.contains(handle));
    }
}

#[test]
fn selector_falls_back_to_screen_coverage() {
    let mut registry = ProbeRegistry::new();
    let visible = registry.insert(probe_at(Vec3::ZERO, 1.0, 0.5));
    let selector = ProbeSelector::default();

    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    let result = selector.select(&registry, Vec3::new(0.0, 0.0, 10.0), &(proj * view));

    assert_eq!(result.count, 1);
    assert_eq!(result.dominant(), Some(visible));
    assert!(result.ndfs[0] > 0.0 && result.ndfs[0] < f32::MAX);
    assert!(approx(result.weights[0], 1.0));
}

fn camera_at_z10() -> Mat4 {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    proj * view
}

#[test]
fn selector_disjoint_volumes_pick_the_containing_probe() {
    let mut registry = ProbeRegistry::new();
    let left = registry.insert(probe_at(Vec3::new(-5.0, 0.0, 0.0), 2.0, 0.25));
    let right = registry.insert(probe_at(Vec3::new(5.0, 0.0, 0.0), 2.0, 0.25));
    let selector = ProbeSelector::default();

    let result = selector.select(&registry, Vec3::new(6.5, 0.0, 0.0), &camera_at_z10());

    assert_eq!(result.count, 1);
    assert_eq!(result.dominant(), Some(right));
    assert_ne!(result.dominant(), Some(left));
    assert!(approx(result.weights[0], 1.0));
    assert!(result.slots[1..].iter().all(ProbeSlot::is_blank));
}

#[test]
fn selector_fallback_prefers_larger_screen_area() {
    let mut registry = ProbeRegistry::new();
    // Inserted first so scan order alone cannot make it win.
    let small = registry.insert(probe_at(Vec3::new(-3.0, 0.0, 0.0), 1.0, 0.5));
    let big = registry.insert(probe_at(Vec3::new(3.0, 0.0, 0.0), 2.0, 0.5));
    let selector = ProbeSelector::default();
    let view_proj = camera_at_z10();

    // The camera position lies outside both areas.
    let result = selector.select(&registry, Vec3::new(0.0, 0.0, 10.0), &view_proj);

    assert_eq!(result.count, 1);
    assert_eq!(result.dominant(), Some(big));
    assert_ne!(result.dominant(), Some(small));
    assert!(approx(result.weights[0], 1.0));

    let small_score = screen_coverage(registry.get(small).unwrap(), &view_proj).unwrap();
    let big_score = screen_coverage(registry.get(big).unwrap(), &view_proj).unwrap();
    assert!(big_score > small_score);
    assert!(approx(result.ndfs[0], big_score));
}

#[test]
fn selector_fallback_ignores_probes_behind_camera() {
    let mut registry = ProbeRegistry::new();
    let behind = registry.insert(probe_at(Vec3::new(0.0, 0.0, 20.0), 1.0, 0.5));
    let selector = ProbeSelector::default();
    let view_proj = camera_at_z10();

    assert!(screen_coverage(registry.get(behind).unwrap(), &view_proj).is_none());

    let result = selector.select(&registry, Vec3::new(0.0, 0.0, 10.0), &view_proj);
    assert_eq!(result.count, 0);
    assert_eq!(result.dominant(), None);
    assert_eq!(result.ndfs[0], f32::MAX);
}

// ============================================================================
// Weights
// ============================================================================

#[test]
fn weights_single_probe_is_one() {
    let weights = compute_weights(&[0.7, f32::MAX, f32::MAX, f32::MAX], 1);
    assert_eq!(weights, [1.0, 0.0, 0.0, 0.0]);

    let weights = compute_weights(&[f32::MAX; 4], 0);
    assert_eq!(weights, [1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn weights_sum_to_one() {
    let weights = compute_weights(&[0.1, 0.4, 0.6, 0.9], 4);
    let sum: f32 = weights.iter().sum();
    assert!((sum - 1.0).abs() < EPSILON);
    assert!(weights[0] > weights[1] && weights[1] > weights[2] && weights[2] > weights[3]);
}

#[test]
fn weights_probe_at_center_takes_everything() {
    let weights = compute_weights(&[0.5, 0.0, 0.3, f32::MAX], 3);
    assert_eq!(weights, [0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn weights_all_on_boundary_stay_finite() {
    let weights = compute_weights(&[1.0, 1.0, f32::MAX, f32::MAX], 2);
    assert!(weights.iter().all(|w| w.is_finite()));
}

#[test]
fn promote_dominant_swaps_slot_zero() {
    let (_registry, a, b) = two_overlapping();
    let mut result = SelectionResult::empty();
    result.slots[0] = ProbeSlot::Probe(a);
    result.slots[1] = ProbeSlot::Probe(b);
    result.ndfs = [0.8, 0.2, f32::MAX, f32::MAX];
    result.weights = [0.1, 0.9, 0.0, 0.0];
    result.count = 2;

    promote_dominant(&mut result);

    assert_eq!(result.slots[0], ProbeSlot::Probe(b));
    assert_eq!(result.slots[1], ProbeSlot::Probe(a));
    assert!(approx(result.ndfs[0], 0.2));
    assert!(approx(result.weights[0], 0.9));
}

#[test]
fn forget_compacts_and_reweights() {
    let (registry, a, b) = two_overlapping();
    let selector = ProbeSelector::default();
    let mut result = selector.select(&registry, Vec3::new(1.2, 0.0, 0.0), &Mat4::IDENTITY);

    assert!(result.forget(a));
    assert_eq!(result.count, 1);
    assert_eq!(result.dominant(), Some(b));
    assert!(approx(result.weights[0], 1.0));
    assert!(!result.forget(a));
}
