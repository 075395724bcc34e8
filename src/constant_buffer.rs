//! GPU records for probe shading and the feeder that uploads them.
//!
//! # Overview
//!
//! [`ProbeShaderRecord`] is what the PBS shader reads to turn a view-space
//! position into probe-local space:
//!
//! ```text
//!  float4 row0_centerX;   // view→probe-local row 0 | shape center (VS).x
//!  float4 row1_centerY;   // view→probe-local row 1 | shape center (VS).y
//!  float4 row2_centerZ;   // view→probe-local row 2 | shape center (VS).z
//!  float4 halfSize;       // shape half-size         | 1
//!  float4 cubemapPosLS;   // capture position, probe-local | 1
//!  float4 cubemapPosVS;   // capture position, view space  | 1
//! ```
//!
//! [`pack_probe_record`] is a pure function of its inputs. The
//! [`ConstantBufferFeeder`] runs it for every manually active probe once per
//! distinct view matrix and streams the results through a staging buffer
//! that only ever grows.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::backend::{BufferCopy, BufferManager, StagingBuffer};
use crate::errors::Result;
use crate::probe::{ProbeHandle, ProbeRegistry, ProbeVolume};

// ─── Records ───────────────────────────────────────────────────────────────

/// Per-probe shading parameters (96 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ProbeShaderRecord {
    pub row0_center_x: [f32; 4],
    pub row1_center_y: [f32; 4],
    pub row2_center_z: [f32; 4],
    pub half_size: [f32; 4],
    pub cubemap_pos_ls: [f32; 4],
    pub cubemap_pos_vs: [f32; 4],
}

/// Size in bytes of one [`ProbeShaderRecord`].
pub const PROBE_RECORD_SIZE: usize = std::mem::size_of::<ProbeShaderRecord>();

impl ProbeShaderRecord {
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Per-probe data of an automatic-mode probe object (112 bytes).
///
/// Rows 0..=4 match [`ProbeShaderRecord`] packed with an identity view.
/// `rows[3][3]` holds the cubemap array slice. The offset from shape center
/// to area center (probe-local) is spread over `rows[4..=6][3]`. Row 5
/// holds the inner region extent and row 6 the area half-size.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PerPixelProbeRecord {
    pub rows: [[f32; 4]; 7],
}

// ─── Packing ───────────────────────────────────────────────────────────────

/// Inverse of the view matrix rotation, as expected by
/// [`pack_probe_record`].
#[inline]
#[must_use]
pub fn inverse_view_rotation(view: &Mat4) -> Mat3 {
    Mat3::from_mat4(*view).inverse()
}

/// Packs one probe for the shader. Pure: equal inputs give equal bytes.
#[must_use]
pub fn pack_probe_record(volume: &ProbeVolume, view: &Mat4, inv_view3: &Mat3) -> ProbeShaderRecord {
    let view_to_probe_local = volume.inv_orientation * *inv_view3;
    let shape = &volume.shape;
    let center_vs = view.project_point3(shape.center);

    let row = |i: usize, center: f32| {
        let r = view_to_probe_local.row(i);
        [r.x, r.y, r.z, center]
    };

    let pos_ls = volume.inv_orientation * (volume.camera_pos - shape.center);
    let pos_vs = view.project_point3(volume.camera_pos);

    ProbeShaderRecord {
        row0_center_x: row(0, center_vs.x),
        row1_center_y: row(1, center_vs.y),
        row2_center_z: row(2, center_vs.z),
        half_size: shape.half_size.extend(1.0).to_array(),
        cubemap_pos_ls: pos_ls.extend(1.0).to_array(),
        cubemap_pos_vs: pos_vs.extend(1.0).to_array(),
    }
}

/// Packs an automatic-mode probe living in `array_index`.
#[must_use]
pub fn pack_per_pixel_record(volume: &ProbeVolume, array_index: u32) -> PerPixelProbeRecord {
    let base = pack_probe_record(volume, &Mat4::IDENTITY, &Mat3::IDENTITY);
    let offset_ls: Vec3 = volume.inv_orientation * (volume.area.center - volume.shape.center);
    let inner = volume.area.half_size * volume.area_inner_region;
    let outer = volume.area.half_size;

    let mut rows = [[0.0; 4]; 7];
    rows[0] = base.row0_center_x;
    rows[1] = base.row1_center_y;
    rows[2] = base.row2_center_z;
    rows[3] = base.half_size;
    rows[3][3] = array_index as f32;
    rows[4] = base.cubemap_pos_ls;
    rows[4][3] = offset_ls.x;
    rows[5] = [inner.x, inner.y, inner.z, offset_ls.y];
    rows[6] = [outer.x, outer.y, outer.z, offset_ls.z];
    PerPixelProbeRecord { rows }
}

// ─── Feeder ────────────────────────────────────────────────────────────────

/// Uploads shading records of manually active probes.
///
/// Probes referenced by materials outside the normal selection (forced
/// per-object probes) each own a small constant buffer. Before a pass with
/// a new view matrix, all of them are repacked into one staging upload.
///
/// The staging buffer is sized for
/// `probes * record * frames_in_flight * view_matrices_last_frame` and is
/// re-acquired when that grows, when the frames-in-flight multiplier
/// increases, or when a pass would not fit the current capacity.
#[derive(Debug, Default)]
pub struct ConstantBufferFeeder {
    active: Vec<ProbeHandle>,
    staging: Option<StagingBuffer>,
    last_pass_num_view_matrices: usize,
    cached_last_view: Option<Mat4>,
    last_multiplier: usize,
}

impl ConstantBufferFeeder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn active(&self) -> &[ProbeHandle] {
        &self.active
    }

    #[inline]
    #[must_use]
    pub fn staging(&self) -> Option<&StagingBuffer> {
        self.staging.as_ref()
    }

    /// Number of distinct view matrices packed since the last staging check.
    #[inline]
    #[must_use]
    pub fn pass_view_matrices(&self) -> usize {
        self.last_pass_num_view_matrices
    }

    pub fn add_active(&mut self, handle: ProbeHandle) {
        if !self.active.contains(&handle) {
            self.active.push(handle);
        }
    }

    /// Removes a probe; the staging buffer is released with the last one.
    pub fn remove_active<B: BufferManager + ?Sized>(&mut self, handle: ProbeHandle, buffers: &mut B) {
        self.active.retain(|h| *h != handle);
        if self.active.is_empty() {
            self.release(buffers);
        }
    }

    /// Bytes the staging buffer needs for the coming frame.
    #[must_use]
    pub fn needed_bytes(&self, multiplier: usize) -> usize {
        self.active.len() * PROBE_RECORD_SIZE * multiplier * self.last_pass_num_view_matrices.max(1)
    }

    /// Grows the staging buffer if needed, then resets the view matrix
    /// cache so the next pass repacks.
    pub fn check_staging_buffer<B: BufferManager + ?Sized>(&mut self, buffers: &mut B) -> Result<()> {
        if !self.active.is_empty() {
            let multiplier = buffers.dynamic_buffer_multiplier();
            let needed = self.needed_bytes(multiplier);
            let must_grow = match &self.staging {
                None => true,
                Some(staging) => needed > staging.capacity || multiplier > self.last_multiplier,
            };
            if must_grow {
                self.reacquire_staging(buffers, needed)?;
            }
            self.last_multiplier = multiplier;
        }

        self.last_pass_num_view_matrices = 0;
        self.cached_last_view = None;
        Ok(())
    }

    /// Repacks every active probe for `view` unless it was the last view
    /// packed. Returns true if an upload happened.
    pub fn prepare_pass<B: BufferManager + ?Sized>(
        &mut self,
        view: &Mat4,
        registry: &ProbeRegistry,
        buffers: &mut B,
    ) -> Result<bool> {
        if self.active.is_empty() || self.cached_last_view.as_ref() == Some(view) {
            return Ok(false);
        }

        // References added since the last staging check may not fit.
        let upload_bytes = self.active.len() * PROBE_RECORD_SIZE;
        let staging = match self.staging {
            Some(staging) if staging.capacity >= upload_bytes => staging,
            _ => {
                let multiplier = buffers.dynamic_buffer_multiplier();
                let needed = self.needed_bytes(multiplier).max(upload_bytes);
                self.last_multiplier = multiplier;
                self.reacquire_staging(buffers, needed)?
            }
        };

        let inv_view3 = inverse_view_rotation(view);
        let mut data = Vec::with_capacity(self.active.len() * PROBE_RECORD_SIZE);
        let mut copies = Vec::with_capacity(self.active.len());

        for handle in &self.active {
            let Some(probe) = registry.get(*handle) else {
                continue;
            };
            let Some(destination) = probe.const_buffer else {
                continue;
            };
            copies.push(BufferCopy {
                destination,
                src_offset: data.len(),
                size: PROBE_RECORD_SIZE,
            });
            let record = pack_probe_record(&probe.volume, view, &inv_view3);
            data.extend_from_slice(record.as_bytes());
        }

        buffers.upload(staging.id, &data, &copies)?;
        self.cached_last_view = Some(*view);
        self.last_pass_num_view_matrices += 1;
        Ok(true)
    }

    fn reacquire_staging<B: BufferManager + ?Sized>(
        &mut self,
        buffers: &mut B,
        needed: usize,
    ) -> Result<StagingBuffer> {
        if let Some(old) = self.staging.take() {
            buffers.release_staging_buffer(old.id);
        }
        let staging = buffers.acquire_staging_buffer(needed)?;
        log::info!(
            "Probe staging buffer resized to {} bytes ({} manual probes)",
            staging.capacity,
            self.active.len()
        );
        self.staging = Some(staging);
        Ok(staging)
    }

    /// Returns the staging buffer to the buffer manager.
    pub fn release<B: BufferManager + ?Sized>(&mut self, buffers: &mut B) {
        if let Some(staging) = self.staging.take() {
            buffers.release_staging_buffer(staging.id);
        }
    }
}
