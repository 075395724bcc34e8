//! Slice allocator for the shared cubemap array used in automatic mode.

/// Fixed-capacity allocator of cubemap array slices.
#[derive(Debug, Clone)]
pub struct CubemapSlotAllocator {
    capacity: u32,
    /// Free slices; `pop()` hands out the lowest first.
    free_list: Vec<u32>,
}

impl CubemapSlotAllocator {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free_list: (0..capacity).rev().collect(),
        }
    }

    /// Reserves a slice, or `None` when the array is full.
    pub fn acquire(&mut self) -> Option<u32> {
        self.free_list.pop()
    }

    /// Returns a slice for reuse. Out-of-range or already free slices are
    /// ignored.
    pub fn release(&mut self, slot: u32) {
        if slot >= self.capacity || self.free_list.contains(&slot) {
            log::warn!("Releasing cubemap array slot {slot} which is not in use");
            return;
        }
        self.free_list.push(slot);
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn in_use(&self) -> u32 {
        self.capacity - self.free_list.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_list.is_empty()
    }
}
