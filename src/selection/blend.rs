//! Dual-NDF blend weights.
//!
//! Each collected probe gets two weights which are multiplied and then
//! renormalized:
//!
//! - `1 - ndf / Σndf`: zero at a probe's boundary whatever the overlap
//! - `(1 - ndf) / (count - Σndf)`: full weight at a probe's center
//!
//! Their product satisfies both at once, so walking across a volume
//! boundary never pops and standing at a probe's center never dims it.

use super::{MAX_CUBE_PROBES, SelectionResult};

/// Normalized blend weights for the first `count` metrics.
///
/// Slots past `count` get zero. With one probe or none, slot 0 gets 1. A
/// metric at or below zero means the point sits inside that probe's inner
/// region: that probe takes the full weight.
#[must_use]
pub fn compute_weights(
    ndfs: &[f32; MAX_CUBE_PROBES],
    count: usize,
) -> [f32; MAX_CUBE_PROBES] {
    let count = count.min(MAX_CUBE_PROBES);
    let mut weights = [0.0; MAX_CUBE_PROBES];

    if count <= 1 {
        weights[0] = 1.0;
        return weights;
    }

    if let Some(inside) = ndfs[..count].iter().position(|ndf| *ndf <= 0.0) {
        weights[inside] = 1.0;
        return weights;
    }

    let sum_ndf: f32 = ndfs[..count].iter().sum();
    let inv_sum_ndf = 1.0 / sum_ndf;
    let reverse_sum_ndf = count as f32 - sum_ndf;
    // Every probe on its boundary: the factor is common to all slots anyway.
    let inv_reverse_sum_ndf = if reverse_sum_ndf > 0.0 {
        1.0 / reverse_sum_ndf
    } else {
        1.0
    };

    let mut sum_weights = 0.0;
    for (weight, ndf) in weights.iter_mut().zip(ndfs).take(count) {
        *weight = (1.0 - ndf * inv_sum_ndf) * ((1.0 - ndf) * inv_reverse_sum_ndf);
        sum_weights += *weight;
    }

    if sum_weights <= 0.0 {
        sum_weights = 1.0;
    }
    let inv_sum_weights = 1.0 / sum_weights;
    for weight in &mut weights[..count] {
        *weight *= inv_sum_weights;
    }

    weights
}

/// Swaps the heaviest collected probe into slot 0, carrying its metric and
/// handle along. Earlier slots win ties.
pub fn promote_dominant(result: &mut SelectionResult) {
    let mut highest = 0;
    for i in 1..result.count.min(MAX_CUBE_PROBES) {
        if result.weights[i] > result.weights[highest] {
            highest = i;
        }
    }

    if highest != 0 {
        result.weights.swap(0, highest);
        result.slots.swap(0, highest);
        result.ndfs.swap(0, highest);
    }
}
