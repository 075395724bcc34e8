//! Reference-Counted Render Target Pool
//!
//! Probes that capture into a temporary render target (automatic mode) and
//! the blend output share textures through this pool instead of creating
//! one texture each.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    RttPool                       │
//! │                                                  │
//! │  entries: HashMap<RttKey, PooledRtt>             │
//! │           (width, height, format, msaa) → tex    │
//! │                                                  │
//! │  acquire() → TextureId   ref_count += 1          │
//! │  release(TextureId)      ref_count -= 1          │
//! │                          destroy at zero         │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! One texture exists per key. A key mismatch always creates a new texture.

use rustc_hash::FxHashMap;

use crate::backend::{TextureDesc, TextureFlags, TextureId, TextureManager};
use crate::errors::Result;
use crate::math::max_mip_count;

// ─── Public Types ──────────────────────────────────────────────────────────

/// Parameters a pooled texture must match exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RttKey {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub msaa: u32,
}

/// How a pool sizes the mip chain of the textures it creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipPolicy {
    /// Full chain for the resolution.
    Full,
    /// IBL targets: the coarsest four levels of `base_mips` are dropped,
    /// `max(base_mips, 5) - 4`.
    IblTrimmed,
}

// ─── Internal Types ────────────────────────────────────────────────────────

#[derive(Debug)]
struct PooledRtt {
    id: TextureId,
    mip_count: u32,
    ref_count: u32,
}

// ─── Pool Implementation ───────────────────────────────────────────────────

/// Pool of shared cubemap render targets.
#[derive(Debug)]
pub struct RttPool {
    label: &'static str,
    flags: TextureFlags,
    mips: MipPolicy,
    entries: FxHashMap<RttKey, PooledRtt>,
}

impl RttPool {
    /// Pool for capture temporaries (full mips, auto-mipmapped RTTs).
    #[must_use]
    pub fn temporary() -> Self {
        Self::new(
            "Pcc Temp RTT",
            TextureFlags::RENDER_TO_TEXTURE | TextureFlags::ALLOW_AUTOMIPMAPS,
            MipPolicy::Full,
        )
    }

    /// Pool for IBL targets such as the blend result.
    #[must_use]
    pub fn ibl(mips: MipPolicy) -> Self {
        Self::new(
            "Pcc IBL Target",
            TextureFlags::RENDER_TO_TEXTURE | TextureFlags::ALLOW_AUTOMIPMAPS,
            mips,
        )
    }

    #[must_use]
    pub fn new(label: &'static str, flags: TextureFlags, mips: MipPolicy) -> Self {
        Self {
            label,
            flags,
            mips,
            entries: FxHashMap::default(),
        }
    }

    /// Returns a texture matching `key`, creating it if none exists.
    ///
    /// `base_mips` is the mip count of the texture the target stands in
    /// for; it only matters for [`MipPolicy::IblTrimmed`].
    pub fn acquire<T: TextureManager + ?Sized>(
        &mut self,
        textures: &mut T,
        key: RttKey,
        base_mips: u32,
    ) -> Result<TextureId> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.ref_count += 1;
            return Ok(entry.id);
        }

        let mip_count = match self.mips {
            MipPolicy::Full => max_mip_count(key.width, key.height),
            MipPolicy::IblTrimmed => base_mips.max(5) - 4,
        };

        let id = textures.create_texture(&TextureDesc {
            label: format!("{} {}x{}", self.label, key.width, key.height),
            width: key.width,
            height: key.height,
            cubemaps: 1,
            mip_level_count: mip_count,
            sample_count: key.msaa,
            format: key.format,
            flags: self.flags,
        })?;
        log::info!(
            "{}: created {}x{} {:?} (msaa {}, {} mips)",
            self.label,
            key.width,
            key.height,
            key.format,
            key.msaa,
            mip_count
        );

        self.entries.insert(
            key,
            PooledRtt {
                id,
                mip_count,
                ref_count: 1,
            },
        );
        Ok(id)
    }

    /// Drops one reference; the texture is destroyed with the last one.
    ///
    /// Returns false if `id` did not come from this pool.
    pub fn release<T: TextureManager + ?Sized>(&mut self, textures: &mut T, id: TextureId) -> bool {
        let Some(key) = self.key_of(id) else {
            return false;
        };
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.ref_count -= 1;
            if entry.ref_count == 0 {
                textures.destroy_texture(entry.id);
                self.entries.remove(&key);
            }
        }
        true
    }

    /// Destroys every pooled texture regardless of references.
    pub fn clear<T: TextureManager + ?Sized>(&mut self, textures: &mut T) {
        for (_, entry) in self.entries.drain() {
            textures.destroy_texture(entry.id);
        }
    }

    fn key_of(&self, id: TextureId) -> Option<RttKey> {
        self.entries
            .iter()
            .find_map(|(key, entry)| (entry.id == id).then_some(*key))
    }

    #[must_use]
    pub fn ref_count(&self, id: TextureId) -> u32 {
        self.entries
            .values()
            .find(|entry| entry.id == id)
            .map_or(0, |entry| entry.ref_count)
    }

    #[must_use]
    pub fn mip_count(&self, id: TextureId) -> Option<u32> {
        self.entries
            .values()
            .find(|entry| entry.id == id)
            .map(|entry| entry.mip_count)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
