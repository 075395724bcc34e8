//! Arena owning every probe of one cubemap system.

use std::sync::atomic::{AtomicU32, Ordering};

use slotmap::SlotMap;

use super::{CubemapProbe, ProbeHandle, ProbeKey};
use crate::errors::{PccError, Result};
use crate::selection::ProbeSlot;

static NEXT_REGISTRY_ID: AtomicU32 = AtomicU32::new(1);

/// Owns the probes of a single cubemap system.
///
/// Handles are generational, so a handle to a destroyed probe never aliases
/// a newer one. Each registry also stamps its own id into the handles it
/// returns, which lets it reject handles minted by another system.
///
/// Iteration follows creation order.
pub struct ProbeRegistry {
    id: u32,
    probes: SlotMap<ProbeKey, CubemapProbe>,
    order: Vec<ProbeHandle>,
    blank: CubemapProbe,
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            probes: SlotMap::with_key(),
            order: Vec::new(),
            blank: CubemapProbe::blank(),
        }
    }

    /// Adds a probe and returns its handle.
    pub fn insert(&mut self, probe: CubemapProbe) -> ProbeHandle {
        let key = self.probes.insert(probe);
        let handle = ProbeHandle {
            key,
            registry: self.id,
        };
        self.order.push(handle);
        handle
    }

    /// Removes a probe.
    ///
    /// Fails with [`PccError::ForeignProbe`] if the handle was minted by
    /// another registry and [`PccError::StaleHandle`] if the probe was
    /// already removed.
    pub fn remove(&mut self, handle: ProbeHandle) -> Result<CubemapProbe> {
        self.check(handle)?;
        let probe = self
            .probes
            .remove(handle.key)
            .ok_or(PccError::StaleHandle(handle))?;
        self.order.retain(|h| *h != handle);
        Ok(probe)
    }

    /// Removes every probe, in creation order.
    pub fn drain(&mut self) -> Vec<(ProbeHandle, CubemapProbe)> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|h| self.probes.remove(h.key).map(|p| (h, p)))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, handle: ProbeHandle) -> bool {
        handle.registry == self.id && self.probes.contains_key(handle.key)
    }

    #[must_use]
    pub fn get(&self, handle: ProbeHandle) -> Option<&CubemapProbe> {
        if handle.registry != self.id {
            return None;
        }
        self.probes.get(handle.key)
    }

    pub fn get_mut(&mut self, handle: ProbeHandle) -> Option<&mut CubemapProbe> {
        if handle.registry != self.id {
            return None;
        }
        self.probes.get_mut(handle.key)
    }

    /// Like [`get`](Self::get) but reports unknown handles as errors.
    pub fn try_get(&self, handle: ProbeHandle) -> Result<&CubemapProbe> {
        self.check(handle)?;
        self.probes
            .get(handle.key)
            .ok_or(PccError::StaleHandle(handle))
    }

    pub fn try_get_mut(&mut self, handle: ProbeHandle) -> Result<&mut CubemapProbe> {
        self.check(handle)?;
        self.probes
            .get_mut(handle.key)
            .ok_or(PccError::StaleHandle(handle))
    }

    fn check(&self, handle: ProbeHandle) -> Result<()> {
        if handle.registry == self.id {
            Ok(())
        } else {
            Err(PccError::ForeignProbe(handle))
        }
    }

    /// Resolves a selection slot. Blank slots and stale handles resolve to
    /// the blank sentinel.
    #[must_use]
    pub fn resolve(&self, slot: ProbeSlot) -> &CubemapProbe {
        match slot {
            ProbeSlot::Probe(handle) => self.get(handle).unwrap_or(&self.blank),
            ProbeSlot::Blank => &self.blank,
        }
    }

    /// The zero-weight sentinel used for unoccupied slots.
    #[inline]
    #[must_use]
    pub fn blank(&self) -> &CubemapProbe {
        &self.blank
    }

    /// Handles in creation order.
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &[ProbeHandle] {
        &self.order
    }

    /// Probes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ProbeHandle, &CubemapProbe)> {
        self.order
            .iter()
            .filter_map(|h| self.probes.get(h.key).map(|p| (*h, p)))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}
