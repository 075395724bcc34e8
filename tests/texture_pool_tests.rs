//! Texture Pool Integration Tests
//!
//! Tests for:
//! - RttPool sharing, reference counting and destruction
//! - Mip policies (full chain, IBL trimmed)
//! - CubemapSlotAllocator

mod common;

use common::{Call, MockBackend};
use parallax::backend::{TextureFlags, TextureId};
use parallax::math::max_mip_count;
use parallax::slots::CubemapSlotAllocator;
use parallax::texture_pool::{MipPolicy, RttKey, RttPool};

fn key(width: u32, msaa: u32) -> RttKey {
    RttKey {
        width,
        height: width,
        format: wgpu::TextureFormat::Rgba16Float,
        msaa,
    }
}

// ============================================================================
// RttPool
// ============================================================================

#[test]
fn pool_shares_matching_keys() {
    let mut backend = MockBackend::new();
    let mut pool = RttPool::temporary();

    let a = pool.acquire(&mut backend, key(128, 1), 8).unwrap();
    let b = pool.acquire(&mut backend, key(128, 1), 8).unwrap();

    assert_eq!(a, b);
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.ref_count(a), 2);
    assert_eq!(backend.count(|c| matches!(c, Call::CreateTexture(_))), 1);
}

#[test]
fn pool_separates_different_keys() {
    let mut backend = MockBackend::new();
    let mut pool = RttPool::temporary();

    let a = pool.acquire(&mut backend, key(128, 1), 8).unwrap();
    let b = pool.acquire(&mut backend, key(128, 4), 8).unwrap();
    let c = pool.acquire(&mut backend, key(64, 1), 7).unwrap();

    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_eq!(pool.len(), 3);
    assert_eq!(backend.textures[&b].sample_count, 4);
}

#[test]
fn pool_destroys_with_last_reference() {
    let mut backend = MockBackend::new();
    let mut pool = RttPool::temporary();

    let id = pool.acquire(&mut backend, key(128, 1), 8).unwrap();
    pool.acquire(&mut backend, key(128, 1), 8).unwrap();

    assert!(pool.release(&mut backend, id));
    assert!(backend.textures.contains_key(&id));
    assert!(pool.release(&mut backend, id));
    assert!(!backend.textures.contains_key(&id));
    assert!(pool.is_empty());
    assert_eq!(pool.ref_count(id), 0);

    // Unknown ids are reported, not destroyed.
    assert!(!pool.release(&mut backend, TextureId(9999)));
}

#[test]
fn pool_temporary_uses_full_chain() {
    let mut backend = MockBackend::new();
    let mut pool = RttPool::temporary();

    let id = pool.acquire(&mut backend, key(256, 1), 1).unwrap();
    let desc = &backend.textures[&id];
    assert_eq!(desc.mip_level_count, max_mip_count(256, 256));
    assert_eq!(desc.mip_level_count, 9);
    assert_eq!(desc.cubemaps, 1);
    assert!(desc.flags.contains(TextureFlags::RENDER_TO_TEXTURE | TextureFlags::ALLOW_AUTOMIPMAPS));
    assert_eq!(pool.mip_count(id), Some(9));
}

#[test]
fn pool_ibl_trims_four_mips() {
    let mut backend = MockBackend::new();
    let mut pool = RttPool::ibl(MipPolicy::IblTrimmed);

    let id = pool.acquire(&mut backend, key(512, 1), 10).unwrap();
    assert_eq!(pool.mip_count(id), Some(6));

    // Never below one level.
    let small = pool.acquire(&mut backend, key(8, 1), 4).unwrap();
    assert_eq!(pool.mip_count(small), Some(1));
}

#[test]
fn pool_clear_destroys_everything() {
    let mut backend = MockBackend::new();
    let mut pool = RttPool::temporary();
    pool.acquire(&mut backend, key(128, 1), 8).unwrap();
    pool.acquire(&mut backend, key(64, 1), 7).unwrap();

    pool.clear(&mut backend);
    assert!(pool.is_empty());
    assert!(backend.textures.is_empty());
}

#[test]
fn pool_propagates_allocation_failure() {
    let mut backend = MockBackend::new();
    backend.fail_textures = true;
    let mut pool = RttPool::temporary();

    assert!(pool.acquire(&mut backend, key(128, 1), 8).is_err());
    assert!(pool.is_empty());
}

// ============================================================================
// Slot allocator
// ============================================================================

#[test]
fn slots_hand_out_lowest_first() {
    let mut slots = CubemapSlotAllocator::new(3);
    assert_eq!(slots.acquire(), Some(0));
    assert_eq!(slots.acquire(), Some(1));
    assert_eq!(slots.acquire(), Some(2));
    assert!(slots.is_full());
    assert_eq!(slots.acquire(), None);
    assert_eq!(slots.in_use(), 3);
}

#[test]
fn slots_reuse_released() {
    let mut slots = CubemapSlotAllocator::new(2);
    slots.acquire();
    slots.acquire();

    slots.release(0);
    assert_eq!(slots.in_use(), 1);
    assert_eq!(slots.acquire(), Some(0));
}

#[test]
fn slots_ignore_invalid_release() {
    let mut slots = CubemapSlotAllocator::new(2);
    slots.acquire();

    slots.release(1);
    slots.release(5);
    assert_eq!(slots.in_use(), 1);
    assert_eq!(slots.capacity(), 2);
}
