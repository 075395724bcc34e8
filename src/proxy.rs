//! Blend proxies: one render item per selection slot.
//!
//! The blend workspace renders these items into the output cubemap. Their
//! number never changes while the system is enabled; a sync only moves
//! them, toggles visibility and pushes new shader parameters, so the frame
//! graph referencing them is never rebuilt.

use glam::{Quat, Vec4};

use crate::backend::{
    BlendSlotParams, ItemId, NodeId, ProxyItemDesc, SamplerPolicy, SceneGraph, ShaderParams,
};
use crate::errors::Result;
use crate::math::make_transform;
use crate::probe::{CubemapProbe, ProbeRegistry};
use crate::selection::{MAX_CUBE_PROBES, SelectionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProxySlot {
    node: NodeId,
    item: ItemId,
}

/// Owns the proxy items of one cubemap system.
#[derive(Debug, Default)]
pub struct ProxyGeometryDriver {
    slots: Vec<ProxySlot>,
}

impl ProxyGeometryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Number of live proxies: [`MAX_CUBE_PROBES`] once created, else 0.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Render item of `slot`, if the proxies exist.
    #[must_use]
    pub fn item(&self, slot: usize) -> Option<ItemId> {
        self.slots.get(slot).map(|s| s.item)
    }

    /// Creates one node and item per slot. Does nothing if they exist.
    pub fn create<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        render_queue: u8,
        visibility_flags: u32,
    ) -> Result<()> {
        if self.is_created() {
            return Ok(());
        }

        for slot in 0..MAX_CUBE_PROBES {
            let item = scene.create_proxy_item(&ProxyItemDesc {
                slot,
                render_queue,
                visibility_flags,
            })?;
            let node = match scene.create_child_scene_node() {
                Ok(node) => node,
                Err(err) => {
                    scene.destroy_item(item);
                    return Err(err);
                }
            };
            scene.attach_object(node, item);
            scene.set_item_visible(item, false);
            self.slots.push(ProxySlot { node, item });
        }
        Ok(())
    }

    /// Detaches and destroys every proxy.
    pub fn destroy<S: SceneGraph + ?Sized>(&mut self, scene: &mut S) {
        for ProxySlot { node, item } in self.slots.drain(..) {
            scene.detach_object(node, item);
            scene.destroy_item(item);
            scene.destroy_scene_node(node);
        }
    }

    /// Mirrors the selection onto the proxies.
    ///
    /// `bind_mips` is the mip count of the output cubemap.
    pub fn sync<B: SceneGraph + ShaderParams + ?Sized>(
        &self,
        backend: &mut B,
        registry: &ProbeRegistry,
        selection: &SelectionResult,
        bind_mips: u32,
    ) {
        for (i, proxy) in self.slots.iter().enumerate() {
            let probe = registry.resolve(selection.slots[i]);
            let shape = probe.shape();

            backend.set_node_transform(
                proxy.node,
                shape.center,
                shape.half_size,
                Quat::from_mat3(&probe.orientation()),
            );
            backend.set_item_visible(proxy.item, i < selection.count);

            let params = blend_slot_params(probe, selection.weights[i], bind_mips);
            backend.set_blend_slot(i, &params);
        }
    }
}

/// Shader inputs of one blend slot.
///
/// The world matrix and camera position are divided by the shape's largest
/// half-size so the shader works on values near 1.
#[must_use]
pub fn blend_slot_params(probe: &CubemapProbe, weight: f32, bind_mips: u32) -> BlendSlotParams {
    let shape = probe.shape();
    let max_component = shape.max_half_extent();
    let inv_max = if max_component > 0.0 { 1.0 / max_component } else { 1.0 };

    let world_scaled = make_transform(
        shape.center * inv_max,
        shape.half_size * inv_max,
        probe.orientation(),
    )
    .transpose();

    let world_scaled_rows: [Vec4; 3] = [world_scaled.x_axis, world_scaled.y_axis, world_scaled.z_axis];

    let sampler = if probe.mip_count() == bind_mips {
        SamplerPolicy::Point
    } else {
        SamplerPolicy::Trilinear
    };

    BlendSlotParams {
        world_scaled_rows,
        probe_camera_pos_scaled: probe.camera_pos() * inv_max,
        weight,
        texture: probe.texture().map(|t| t.id),
        sampler,
    }
}
