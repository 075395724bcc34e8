//! Per-frame probe selection and blend weighting.
//!
//! # Overview
//!
//! ```text
//!  tracked position ──► ProbeSelector::collect ──► SelectionResult
//!                                                    │ slots / ndfs
//!                                                    ▼
//!                                  blend::compute_weights + promote_dominant
//!                                                    │ weights, slot 0 dominant
//!                                                    ▼
//!                                    proxies, scheduler, final probe
//! ```
//!
//! A [`SelectionResult`] always has [`MAX_CUBE_PROBES`] slots. Slots past
//! `count` reference the blank sentinel with an infinite metric and a zero
//! weight, so consumers never branch on the number of collected probes.

pub mod blend;
pub mod selector;

pub use blend::{compute_weights, promote_dominant};
pub use selector::{ProbeSelector, screen_coverage};

use crate::probe::ProbeHandle;

/// Maximum number of probes blended at once.
pub const MAX_CUBE_PROBES: usize = 4;

/// A selection slot: a live probe or the blank sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProbeSlot {
    #[default]
    Blank,
    Probe(ProbeHandle),
}

impl ProbeSlot {
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<ProbeHandle> {
        match self {
            Self::Probe(handle) => Some(*handle),
            Self::Blank => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }
}

/// Transient per-frame result of probe selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub slots: [ProbeSlot; MAX_CUBE_PROBES],
    /// Influence metric per slot; `f32::MAX` for blank slots.
    pub ndfs: [f32; MAX_CUBE_PROBES],
    /// Normalized blend weight per slot.
    pub weights: [f32; MAX_CUBE_PROBES],
    /// Number of probes actually collected.
    pub count: usize,
}

impl Default for SelectionResult {
    fn default() -> Self {
        Self::empty()
    }
}

impl SelectionResult {
    /// No probes: every slot blank.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            slots: [ProbeSlot::Blank; MAX_CUBE_PROBES],
            ndfs: [f32::MAX; MAX_CUBE_PROBES],
            weights: [0.0; MAX_CUBE_PROBES],
            count: 0,
        }
    }

    /// The dominant probe, if any was collected.
    #[inline]
    #[must_use]
    pub fn dominant(&self) -> Option<ProbeHandle> {
        if self.count == 0 {
            return None;
        }
        self.slots[0].handle()
    }

    /// Handles of the collected probes, dominant first.
    pub fn collected(&self) -> impl Iterator<Item = ProbeHandle> + '_ {
        self.slots[..self.count].iter().filter_map(ProbeSlot::handle)
    }

    /// Computes the blend weights and moves the heaviest probe to slot 0.
    pub fn finalize(&mut self) {
        self.weights = compute_weights(&self.ndfs, self.count);
        promote_dominant(self);
    }

    /// Replaces every reference to `handle` with the blank sentinel,
    /// compacting the collected slots.
    ///
    /// Returns true if the probe was part of the selection.
    pub fn forget(&mut self, handle: ProbeHandle) -> bool {
        let Some(index) = self.slots[..self.count]
            .iter()
            .position(|slot| *slot == ProbeSlot::Probe(handle))
        else {
            return false;
        };

        for i in index..self.count - 1 {
            self.slots[i] = self.slots[i + 1];
            self.ndfs[i] = self.ndfs[i + 1];
        }
        self.count -= 1;
        self.slots[self.count] = ProbeSlot::Blank;
        self.ndfs[self.count] = f32::MAX;
        self.finalize();
        true
    }
}
