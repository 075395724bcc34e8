//! Shared test fixtures: an in-memory backend recording every call.

#![allow(dead_code)]

use glam::{Mat3, Mat4, Quat, Vec3};
use parallax::PccError;
use parallax::backend::{
    BlendSlotParams, BufferCopy, BufferManager, CameraDesc, CameraId, CameraView, Compositor,
    ConstBufferId, InternalProbeId, ItemId, NodeId, ProbeTransform, ProxyItemDesc, SamplerPolicy,
    SceneGraph, ShaderParams, StagingBuffer, StagingBufferId, TextureDesc, TextureId,
    TextureManager, WorkspaceDesc, WorkspaceId, WorkspaceKind,
};
use parallax::constant_buffer::PerPixelProbeRecord;
use parallax::math::Aabb;
use rustc_hash::FxHashMap;

pub const EPSILON: f32 = 1e-4;

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

pub fn approx_vec3(a: Vec3, b: Vec3) -> bool {
    (a - b).abs().max_element() < EPSILON
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A probe-sized box: shape and area centered at `center`.
pub fn cube(center: Vec3, half: f32) -> Aabb {
    Aabb::new(center, Vec3::splat(half))
}

/// Every backend call the system made, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateTexture(TextureDesc),
    DestroyTexture(TextureId),
    UpdateSceneGraph,
    ClearFrameData,
    SetVisibilityMask(u32),
    CreateNode(NodeId),
    DestroyNode(NodeId),
    SetNodeTransform(NodeId),
    CreateItem(ItemId),
    DestroyItem(ItemId),
    Attach(NodeId, ItemId),
    Detach(NodeId, ItemId),
    SetItemVisible(ItemId, bool),
    CreateCamera(CameraId, CameraDesc),
    DestroyCamera(CameraId),
    SetCameraPose(CameraId, Vec3),
    SetLightCulling(CameraId, bool),
    AttachCameraToRoot(CameraId),
    CreateInternalProbe(InternalProbeId),
    DestroyInternalProbe(InternalProbeId),
    UpdateInternalProbe(InternalProbeId),
    CreateWorkspace(WorkspaceId, WorkspaceKind),
    DestroyWorkspace(WorkspaceId),
    UpdateWorkspace(WorkspaceId),
    BeginUpdate(WorkspaceId),
    EndUpdate(WorkspaceId),
    BeginFrame,
    EndFrame,
    CopyToArray(TextureId, TextureId, u32),
    SetBlendSlot(usize),
    SetBlendLod(usize, f32),
    SetCopySource(Option<TextureId>, SamplerPolicy),
    SetCopyLod(f32),
    NotifyIblMips(u32),
    AcquireStaging(usize),
    ReleaseStaging(StagingBufferId),
    CreateConstBuffer(ConstBufferId, usize),
    DestroyConstBuffer(ConstBufferId),
    Upload(StagingBufferId, usize, usize),
}

/// Records calls and hands out sequential ids.
#[derive(Debug)]
pub struct MockBackend {
    pub calls: Vec<Call>,
    next_id: u64,
    pub visibility_mask: u32,
    pub multiplier: usize,

    /// Live objects, for leak checks.
    pub textures: FxHashMap<TextureId, TextureDesc>,
    pub cameras: FxHashMap<CameraId, CameraDesc>,
    pub workspaces: FxHashMap<WorkspaceId, WorkspaceDesc>,
    pub const_buffers: FxHashMap<ConstBufferId, usize>,
    pub internal_probes: FxHashMap<InternalProbeId, (ProbeTransform, PerPixelProbeRecord, bool)>,
    pub blend_slots: FxHashMap<usize, BlendSlotParams>,
    pub uploads: Vec<Vec<u8>>,

    /// Failure injection.
    pub fail_textures: bool,
    pub fail_workspace_kind: Option<WorkspaceKind>,
    /// Workspace updates fail while this is non-zero; each failure
    /// decrements it.
    pub fail_updates: u32,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_id: 1,
            visibility_mask: 0x0000_00ff,
            multiplier: 3,
            textures: FxHashMap::default(),
            cameras: FxHashMap::default(),
            workspaces: FxHashMap::default(),
            const_buffers: FxHashMap::default(),
            internal_probes: FxHashMap::default(),
            blend_slots: FxHashMap::default(),
            uploads: Vec::new(),
            fail_textures: false,
            fail_workspace_kind: None,
            fail_updates: 0,
        }
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Workspace updates of workspaces of `kind` still alive.
    pub fn updates_of(&self, kind: WorkspaceKind) -> usize {
        self.calls
            .iter()
            .filter(|c| match c {
                Call::UpdateWorkspace(id) => self.workspaces.get(id).is_some_and(|d| d.kind == kind),
                _ => false,
            })
            .count()
    }

    pub fn workspaces_of(&self, kind: WorkspaceKind) -> usize {
        self.workspaces.values().filter(|d| d.kind == kind).count()
    }
}

impl TextureManager for MockBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> parallax::Result<TextureId> {
        if self.fail_textures {
            return Err(PccError::TextureAllocation("mock out of memory".to_owned()));
        }
        let id = TextureId(self.next());
        self.textures.insert(id, desc.clone());
        self.calls.push(Call::CreateTexture(desc.clone()));
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
        self.calls.push(Call::DestroyTexture(id));
    }
}

impl SceneGraph for MockBackend {
    fn update_scene_graph(&mut self) {
        self.calls.push(Call::UpdateSceneGraph);
    }

    fn clear_frame_data(&mut self) {
        self.calls.push(Call::ClearFrameData);
    }

    fn visibility_mask(&self) -> u32 {
        self.visibility_mask
    }

    fn set_visibility_mask(&mut self, mask: u32) {
        self.visibility_mask = mask;
        self.calls.push(Call::SetVisibilityMask(mask));
    }

    fn create_child_scene_node(&mut self) -> parallax::Result<NodeId> {
        let id = NodeId(self.next());
        self.calls.push(Call::CreateNode(id));
        Ok(id)
    }

    fn destroy_scene_node(&mut self, node: NodeId) {
        self.calls.push(Call::DestroyNode(node));
    }

    fn set_node_transform(&mut self, node: NodeId, _position: Vec3, _scale: Vec3, _orientation: Quat) {
        self.calls.push(Call::SetNodeTransform(node));
    }

    fn create_proxy_item(&mut self, _desc: &ProxyItemDesc) -> parallax::Result<ItemId> {
        let id = ItemId(self.next());
        self.calls.push(Call::CreateItem(id));
        Ok(id)
    }

    fn destroy_item(&mut self, item: ItemId) {
        self.calls.push(Call::DestroyItem(item));
    }

    fn attach_object(&mut self, node: NodeId, item: ItemId) {
        self.calls.push(Call::Attach(node, item));
    }

    fn detach_object(&mut self, node: NodeId, item: ItemId) {
        self.calls.push(Call::Detach(node, item));
    }

    fn set_item_visible(&mut self, item: ItemId, visible: bool) {
        self.calls.push(Call::SetItemVisible(item, visible));
    }

    fn create_camera(&mut self, desc: &CameraDesc) -> parallax::Result<CameraId> {
        let id = CameraId(self.next());
        self.cameras.insert(id, desc.clone());
        self.calls.push(Call::CreateCamera(id, desc.clone()));
        Ok(id)
    }

    fn destroy_camera(&mut self, camera: CameraId) {
        self.cameras.remove(&camera);
        self.calls.push(Call::DestroyCamera(camera));
    }

    fn set_camera_pose(&mut self, camera: CameraId, position: Vec3, _orientation: Quat) {
        self.calls.push(Call::SetCameraPose(camera, position));
    }

    fn set_camera_light_culling(&mut self, camera: CameraId, enabled: bool) {
        self.calls.push(Call::SetLightCulling(camera, enabled));
    }

    fn attach_camera_to_root(&mut self, camera: CameraId) {
        self.calls.push(Call::AttachCameraToRoot(camera));
    }

    fn create_internal_probe(&mut self, is_static: bool) -> parallax::Result<InternalProbeId> {
        let id = InternalProbeId(self.next());
        let transform = ProbeTransform {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            orientation: Quat::IDENTITY,
        };
        self.internal_probes
            .insert(id, (transform, PerPixelProbeRecord { rows: [[0.0; 4]; 7] }, is_static));
        self.calls.push(Call::CreateInternalProbe(id));
        Ok(id)
    }

    fn destroy_internal_probe(&mut self, probe: InternalProbeId) {
        self.internal_probes.remove(&probe);
        self.calls.push(Call::DestroyInternalProbe(probe));
    }

    fn update_internal_probe(
        &mut self,
        probe: InternalProbeId,
        transform: &ProbeTransform,
        record: &PerPixelProbeRecord,
        is_static: bool,
    ) {
        self.internal_probes.insert(probe, (*transform, *record, is_static));
        self.calls.push(Call::UpdateInternalProbe(probe));
    }
}

impl Compositor for MockBackend {
    fn create_workspace(&mut self, desc: &WorkspaceDesc) -> parallax::Result<WorkspaceId> {
        if self.fail_workspace_kind == Some(desc.kind) {
            return Err(PccError::Backend(format!("mock cannot create {:?}", desc.kind)));
        }
        let id = WorkspaceId(self.next());
        self.workspaces.insert(id, desc.clone());
        self.calls.push(Call::CreateWorkspace(id, desc.kind));
        Ok(id)
    }

    fn destroy_workspace(&mut self, workspace: WorkspaceId) {
        self.workspaces.remove(&workspace);
        self.calls.push(Call::DestroyWorkspace(workspace));
    }

    fn update_workspace(&mut self, workspace: WorkspaceId) -> parallax::Result<()> {
        if self.fail_updates > 0 {
            self.fail_updates -= 1;
            return Err(PccError::Backend("mock device lost".to_owned()));
        }
        self.calls.push(Call::UpdateWorkspace(workspace));
        Ok(())
    }

    fn begin_update(&mut self, workspace: WorkspaceId) {
        self.calls.push(Call::BeginUpdate(workspace));
    }

    fn end_update(&mut self, workspace: WorkspaceId) {
        self.calls.push(Call::EndUpdate(workspace));
    }

    fn begin_frame(&mut self) {
        self.calls.push(Call::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.calls.push(Call::EndFrame);
    }

    fn copy_to_cubemap_array(
        &mut self,
        source: TextureId,
        array: TextureId,
        slice: u32,
    ) -> parallax::Result<()> {
        self.calls.push(Call::CopyToArray(source, array, slice));
        Ok(())
    }
}

impl ShaderParams for MockBackend {
    fn set_blend_slot(&mut self, slot: usize, params: &BlendSlotParams) {
        self.blend_slots.insert(slot, *params);
        self.calls.push(Call::SetBlendSlot(slot));
    }

    fn set_blend_lod(&mut self, slot: usize, lod: f32) {
        self.calls.push(Call::SetBlendLod(slot, lod));
    }

    fn set_copy_source(&mut self, texture: Option<TextureId>, sampler: SamplerPolicy) {
        self.calls.push(Call::SetCopySource(texture, sampler));
    }

    fn set_copy_lod(&mut self, lod: f32) {
        self.calls.push(Call::SetCopyLod(lod));
    }

    fn notify_ibl_spec_mipmaps(&mut self, num_mipmaps: u32) {
        self.calls.push(Call::NotifyIblMips(num_mipmaps));
    }
}

impl BufferManager for MockBackend {
    fn dynamic_buffer_multiplier(&self) -> usize {
        self.multiplier
    }

    fn acquire_staging_buffer(&mut self, min_bytes: usize) -> parallax::Result<StagingBuffer> {
        let id = StagingBufferId(self.next());
        self.calls.push(Call::AcquireStaging(min_bytes));
        Ok(StagingBuffer {
            id,
            capacity: min_bytes,
        })
    }

    fn release_staging_buffer(&mut self, buffer: StagingBufferId) {
        self.calls.push(Call::ReleaseStaging(buffer));
    }

    fn create_const_buffer(&mut self, size: usize) -> parallax::Result<ConstBufferId> {
        let id = ConstBufferId(self.next());
        self.const_buffers.insert(id, size);
        self.calls.push(Call::CreateConstBuffer(id, size));
        Ok(id)
    }

    fn destroy_const_buffer(&mut self, buffer: ConstBufferId) {
        self.const_buffers.remove(&buffer);
        self.calls.push(Call::DestroyConstBuffer(buffer));
    }

    fn upload(&mut self, staging: StagingBufferId, data: &[u8], copies: &[BufferCopy]) -> parallax::Result<()> {
        self.uploads.push(data.to_vec());
        self.calls.push(Call::Upload(staging, data.len(), copies.len()));
        Ok(())
    }
}

/// A fixed camera for tracked-data tests.
pub struct FixedCamera {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl FixedCamera {
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            view: Mat4::look_at_rh(position, target, Vec3::Y),
            projection: Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0),
        }
    }
}

impl CameraView for FixedCamera {
    fn derived_position(&self) -> Vec3 {
        self.position
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn view_matrix(&self) -> Mat4 {
        self.view
    }
}

/// Identity orientation, for brevity.
pub const IDENTITY: Mat3 = Mat3::IDENTITY;
