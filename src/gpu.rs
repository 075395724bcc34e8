//! `wgpu` implementation of the [`TextureManager`] service.
//!
//! Probe textures are plain 2D textures with `6 * cubemaps` array layers;
//! a cube (or cube array) view is registered next to each one so the
//! shading side can bind it directly.

use rustc_hash::FxHashMap;

use crate::backend::{TextureDesc, TextureFlags, TextureId, TextureManager};
use crate::errors::{PccError, Result};

/// A probe texture together with its cube view.
pub struct GpuCubemap {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub desc: TextureDesc,
}

/// Creates and owns cubemap textures on a `wgpu::Device`.
pub struct WgpuTextureManager {
    device: wgpu::Device,
    textures: FxHashMap<TextureId, GpuCubemap>,
    next_id: u64,
}

impl WgpuTextureManager {
    #[must_use]
    pub fn new(device: wgpu::Device) -> Self {
        Self {
            device,
            textures: FxHashMap::default(),
            next_id: 0,
        }
    }

    #[must_use]
    pub fn get(&self, id: TextureId) -> Option<&GpuCubemap> {
        self.textures.get(&id)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn usage_for(flags: TextureFlags) -> wgpu::TextureUsages {
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if flags.contains(TextureFlags::RENDER_TO_TEXTURE) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
        }
        if flags.contains(TextureFlags::ALLOW_AUTOMIPMAPS) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        usage
    }
}

impl TextureManager for WgpuTextureManager {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 || desc.cubemaps == 0 {
            return Err(PccError::TextureAllocation(format!(
                "'{}' has an empty extent ({}x{}x{})",
                desc.label, desc.width, desc.height, desc.cubemaps
            )));
        }
        // Multisampled textures cannot be layered or mipmapped.
        if desc.sample_count > 1 {
            return Err(PccError::TextureAllocation(format!(
                "'{}' requests {} samples; multisampled cubemaps are unsupported",
                desc.label, desc.sample_count
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 6 * desc.cubemaps,
            },
            mip_level_count: desc.mip_level_count.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: Self::usage_for(desc.flags),
            view_formats: &[],
        });

        let dimension = if desc.flags.contains(TextureFlags::CUBEMAP_ARRAY) {
            wgpu::TextureViewDimension::CubeArray
        } else {
            wgpu::TextureViewDimension::Cube
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(dimension),
            ..Default::default()
        });

        let id = TextureId(self.next_id);
        self.next_id += 1;
        log::debug!("Created probe texture '{}' as {id:?}", desc.label);
        self.textures.insert(
            id,
            GpuCubemap {
                texture,
                view,
                desc: desc.clone(),
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(cubemap) = self.textures.remove(&id) {
            cubemap.texture.destroy();
        } else {
            log::warn!("Attempted to destroy unknown probe texture {id:?}");
        }
    }
}
