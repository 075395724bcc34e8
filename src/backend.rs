//! Injected Engine Services
//!
//! The probe system never reaches for global managers. Everything it needs
//! from the surrounding engine is expressed as a small trait here and handed
//! to [`CubemapSystem::new`](crate::system::CubemapSystem::new) as one
//! backend value implementing [`PccBackend`].
//!
//! ```text
//!  ┌──────────────────────┐
//!  │    CubemapSystem<B>  │
//!  └──────────┬───────────┘
//!             │ B: PccBackend
//!   ┌─────────┼──────────┬──────────────┬──────────────┐
//!   ▼         ▼          ▼              ▼              ▼
//! Texture   Scene     Compositor    ShaderParams   BufferManager
//! Manager   Graph     (workspaces)  (materials)    (const/staging)
//! ```
//!
//! All handles returned by the services are opaque ids owned by the engine;
//! the probe system only stores and hands them back.

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3, Vec4};

use crate::constant_buffer::PerPixelProbeRecord;
use crate::errors::Result;

// ─── Opaque Ids ────────────────────────────────────────────────────────────

macro_rules! opaque_id {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

opaque_id! {
    /// GPU texture owned by the [`TextureManager`].
    TextureId;
    /// Scene node created through [`SceneGraph::create_child_scene_node`].
    NodeId;
    /// Renderable item (blend proxy) owned by the scene graph.
    ItemId;
    /// Camera owned by the scene graph.
    CameraId;
    /// Per-pixel probe object used in automatic mode.
    InternalProbeId;
    /// Compositor workspace instance.
    WorkspaceId;
    /// Constant buffer owned by the [`BufferManager`].
    ConstBufferId;
    /// Staging buffer owned by the [`BufferManager`].
    StagingBufferId;
}

// ─── Textures ──────────────────────────────────────────────────────────────

bitflags! {
    /// Creation flags for probe related textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// Texture can be bound as a render target.
        const RENDER_TO_TEXTURE = 1 << 0;
        /// Mipmaps are generated on the GPU after rendering.
        const ALLOW_AUTOMIPMAPS = 1 << 1;
        /// Texture is an array of cubemaps rather than a single cube.
        const CUBEMAP_ARRAY = 1 << 2;
        /// Texture is only written through explicit copies.
        const MANUAL = 1 << 3;
    }
}

/// Everything needed to create a cubemap texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Number of cubemaps (1 unless [`TextureFlags::CUBEMAP_ARRAY`]).
    pub cubemaps: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub flags: TextureFlags,
}

pub trait TextureManager {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;
    fn destroy_texture(&mut self, id: TextureId);
}

// ─── Scene Graph ───────────────────────────────────────────────────────────

/// Creation parameters of a blend proxy item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyItemDesc {
    /// Slot index, used to pick the matching blend material.
    pub slot: usize,
    pub render_queue: u8,
    pub visibility_flags: u32,
}

/// Creation parameters of a capture or blend camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraDesc {
    pub label: String,
    pub fov_y_degrees: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    /// Light culling is skipped for static probes between captures.
    pub light_culling: bool,
}

/// Node transform of a per-pixel probe object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeTransform {
    pub position: Vec3,
    pub scale: Vec3,
    pub orientation: Quat,
}

pub trait SceneGraph {
    fn update_scene_graph(&mut self);
    fn clear_frame_data(&mut self);

    fn visibility_mask(&self) -> u32;
    fn set_visibility_mask(&mut self, mask: u32);

    fn create_child_scene_node(&mut self) -> Result<NodeId>;
    fn destroy_scene_node(&mut self, node: NodeId);
    fn set_node_transform(&mut self, node: NodeId, position: Vec3, scale: Vec3, orientation: Quat);

    fn create_proxy_item(&mut self, desc: &ProxyItemDesc) -> Result<ItemId>;
    fn destroy_item(&mut self, item: ItemId);
    fn attach_object(&mut self, node: NodeId, item: ItemId);
    fn detach_object(&mut self, node: NodeId, item: ItemId);
    fn set_item_visible(&mut self, item: ItemId, visible: bool);

    fn create_camera(&mut self, desc: &CameraDesc) -> Result<CameraId>;
    fn destroy_camera(&mut self, camera: CameraId);
    fn set_camera_pose(&mut self, camera: CameraId, position: Vec3, orientation: Quat);
    fn set_camera_light_culling(&mut self, camera: CameraId, enabled: bool);
    /// Re-attaches a camera to the root node after a scene clear.
    fn attach_camera_to_root(&mut self, camera: CameraId);

    fn create_internal_probe(&mut self, is_static: bool) -> Result<InternalProbeId>;
    fn destroy_internal_probe(&mut self, probe: InternalProbeId);
    fn update_internal_probe(
        &mut self,
        probe: InternalProbeId,
        transform: &ProbeTransform,
        record: &PerPixelProbeRecord,
        is_static: bool,
    );
}

/// Camera queries used to track the viewer.
pub trait CameraView {
    fn derived_position(&self) -> Vec3;
    fn projection_matrix(&self) -> Mat4;
    fn view_matrix(&self) -> Mat4;
}

// ─── Compositor ────────────────────────────────────────────────────────────

/// Frame graph flavour a workspace is instantiated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceKind {
    /// Six scene passes drawing the blend proxies into the output cubemap.
    Blend,
    /// Six quad passes copying one probe into the output cubemap.
    Copy,
    /// Six clear passes resetting a probe texture.
    Clear,
    /// User supplied frame graph capturing the scene into a probe.
    Capture,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceDesc {
    pub kind: WorkspaceKind,
    /// Definition name; only meaningful for [`WorkspaceKind::Capture`].
    pub definition: String,
    pub target: TextureId,
    pub camera: CameraId,
}

pub trait Compositor {
    fn create_workspace(&mut self, desc: &WorkspaceDesc) -> Result<WorkspaceId>;
    fn destroy_workspace(&mut self, workspace: WorkspaceId);
    fn update_workspace(&mut self, workspace: WorkspaceId) -> Result<()>;
    fn begin_update(&mut self, workspace: WorkspaceId);
    fn end_update(&mut self, workspace: WorkspaceId);
    /// Opens a standalone frame outside the regular frame loop.
    fn begin_frame(&mut self);
    /// Submits and closes the frame opened by [`begin_frame`](Self::begin_frame).
    fn end_frame(&mut self);
    fn copy_to_cubemap_array(&mut self, source: TextureId, array: TextureId, slice: u32)
    -> Result<()>;
}

// ─── Shader Parameters ─────────────────────────────────────────────────────

/// Mip filtering used when sampling a probe texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerPolicy {
    /// Probe mip chain differs from the output: filter across mips.
    Trilinear,
    /// Mip chains match: sample the exact level.
    Point,
}

/// Per-slot inputs of the blend material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendSlotParams {
    /// First three rows of the scaled world matrix.
    pub world_scaled_rows: [Vec4; 3],
    pub probe_camera_pos_scaled: Vec3,
    pub weight: f32,
    pub texture: Option<TextureId>,
    pub sampler: SamplerPolicy,
}

pub trait ShaderParams {
    fn set_blend_slot(&mut self, slot: usize, params: &BlendSlotParams);
    fn set_blend_lod(&mut self, slot: usize, lod: f32);
    /// Source probe of the six copy materials.
    fn set_copy_source(&mut self, texture: Option<TextureId>, sampler: SamplerPolicy);
    fn set_copy_lod(&mut self, lod: f32);
    /// Mip count of the final cubemap, used to clamp roughness to mip.
    fn notify_ibl_spec_mipmaps(&mut self, num_mipmaps: u32);
}

// ─── Buffers ───────────────────────────────────────────────────────────────

/// A staging buffer and the number of bytes it can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingBuffer {
    pub id: StagingBufferId,
    pub capacity: usize,
}

/// One region of a staging upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub destination: ConstBufferId,
    pub src_offset: usize,
    pub size: usize,
}

pub trait BufferManager {
    /// Frames in flight; dynamic data is replicated this many times.
    fn dynamic_buffer_multiplier(&self) -> usize;
    fn acquire_staging_buffer(&mut self, min_bytes: usize) -> Result<StagingBuffer>;
    fn release_staging_buffer(&mut self, buffer: StagingBufferId);
    fn create_const_buffer(&mut self, size: usize) -> Result<ConstBufferId>;
    fn destroy_const_buffer(&mut self, buffer: ConstBufferId);
    fn upload(&mut self, staging: StagingBufferId, data: &[u8], copies: &[BufferCopy]) -> Result<()>;
}

// ─── Aggregate ─────────────────────────────────────────────────────────────

/// Every service a cubemap system talks to.
pub trait PccBackend: TextureManager + SceneGraph + Compositor + ShaderParams + BufferManager {}

impl<T> PccBackend for T where T: TextureManager + SceneGraph + Compositor + ShaderParams + BufferManager {}
