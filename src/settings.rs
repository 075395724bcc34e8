//! Cubemap System Settings & Operating Mode
//!
//! This module defines the configuration consumed once when a
//! [`CubemapSystem`](crate::system::CubemapSystem) is constructed.
//!
//! The core abstraction is [`PccMode`], which decides whether the system
//! blends a handful of selected probes into one output cubemap every frame
//! (manual mode) or keeps every probe resident in a shared cubemap array for
//! per-pixel lookup (automatic mode).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parallax::settings::{PccMode, PccSettings};
//!
//! // Default: manual blending into a 512x512 cubemap
//! let settings = PccSettings::default();
//!
//! // Automatic per-pixel mode with room for 32 probes
//! let settings = PccSettings {
//!     mode: PccMode::Automatic { max_probes: 32 },
//!     ..Default::default()
//! };
//!
//! // Or from a JSON file shipped with the level
//! let settings = PccSettings::from_json_str(&std::fs::read_to_string("pcc.json")?)?;
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ---------------------------------------------------------------------------
// PccMode
// ---------------------------------------------------------------------------

bitflags! {
    /// Capability set derived from the operating mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PccCapabilities: u32 {
        /// Each probe owns a standalone cubemap texture.
        const OWNS_PROBE_TEXTURES = 1 << 0;
        /// Probes render into pooled temporaries and are copied into one
        /// shared cubemap array.
        const SHARED_ARRAY_TEXTURE = 1 << 1;
        /// Selected probes are blended into a single output cubemap.
        const BLENDS_PROBES = 1 << 2;
    }
}

/// Operating mode of a cubemap system.
///
/// | Capability             | `Manual` | `Automatic` |
/// |------------------------|----------|-------------|
/// | Probe-owned textures   | ✅       | ❌          |
/// | Shared cubemap array   | ❌       | ✅          |
/// | Per-frame selection    | ✅       | ❌          |
/// | Manually active probes | ✅       | ❌          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PccMode {
    /// Select up to [`MAX_CUBE_PROBES`](crate::selection::MAX_CUBE_PROBES)
    /// probes around the tracked position and blend them every frame.
    Manual,
    /// Every probe lives in one slice of a cubemap array; the shading
    /// collaborator picks probes per pixel.
    Automatic {
        /// Number of slices in the cubemap array.
        max_probes: u32,
    },
}

impl Default for PccMode {
    #[inline]
    fn default() -> Self {
        Self::Manual
    }
}

impl PccMode {
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> PccCapabilities {
        match self {
            Self::Manual => PccCapabilities::OWNS_PROBE_TEXTURES | PccCapabilities::BLENDS_PROBES,
            Self::Automatic { .. } => PccCapabilities::SHARED_ARRAY_TEXTURE,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::Automatic { .. })
    }
}

// ---------------------------------------------------------------------------
// PccSettings
// ---------------------------------------------------------------------------

/// Configuration for one cubemap system.
///
/// # Fields
///
/// | Field                     | Description                                   | Default                 |
/// |---------------------------|-----------------------------------------------|-------------------------|
/// | `mode`                    | Manual blending or automatic array mode       | `Manual`                |
/// | `width` / `height`        | Output (blend or array) cubemap face size     | 512 x 512               |
/// | `format`                  | Output cubemap format                         | `Rgba8UnormSrgb`        |
/// | `ibl_specular`            | Trim the output mip chain for IBL specular    | `false`                 |
/// | `proxy_visibility_mask`   | Visibility flags of the blend proxies         | `1 << 25`               |
/// | `reserved_render_queue`   | Render queue reserved for the blend proxies   | 250                     |
/// | `system_mask`             | Probes with `mask & system_mask == 0` ignored | `0xffff_ffff`           |
/// | `expensive_iterations`    | Threshold for the out-of-frame capture loop   | 1                       |
/// | `probe_near` / `probe_far`| Capture camera clip planes                    | 0.5 / 500               |
/// | `probe_iterations`        | Capture passes per dirty probe                | 8                       |
/// | `probe_msaa`              | Sample count of dynamic probe textures        | 1                       |
/// | `probe_workspace`         | Frame graph used to capture a probe           | `"PccProbeWorkspace"`   |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PccSettings {
    // === Operating Mode ===
    /// Manual (blended) or automatic (cubemap array) operation.
    pub mode: PccMode,

    // === Output Texture ===
    /// Face width of the blended cubemap (manual) or of each array slice
    /// (automatic).
    pub width: u32,
    /// Face height, see [`width`](Self::width).
    pub height: u32,
    /// Pixel format of the output cubemap.
    pub format: wgpu::TextureFormat,
    /// When true, the blend target drops its four smallest mips
    /// (`max(mips, 5) - 4`); otherwise it carries a full chain.
    pub ibl_specular: bool,

    // === Blend Proxies ===
    /// Visibility flags carried by the proxy items; the blend pass only
    /// renders objects matching this mask.
    pub proxy_visibility_mask: u32,
    /// Render queue id the blend pass draws.
    pub reserved_render_queue: u8,

    // === Selection ===
    /// Mask ANDed with each probe's mask during selection.
    pub system_mask: u32,

    // === Capture ===
    /// Probes needing more iterations than this are captured in a full
    /// out-of-frame loop before workspaces update.
    pub expensive_iterations: u16,
    /// Near plane of capture cameras.
    pub probe_near: f32,
    /// Far plane of capture cameras.
    pub probe_far: f32,
    /// Default capture iteration count for new probes.
    pub probe_iterations: u16,
    /// Sample count used for non-static probe textures.
    pub probe_msaa: u32,
    /// Frame graph definition used to capture a probe.
    pub probe_workspace: String,
}

impl Default for PccSettings {
    fn default() -> Self {
        Self {
            mode: PccMode::default(),
            width: 512,
            height: 512,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            ibl_specular: false,
            proxy_visibility_mask: 1 << 25,
            reserved_render_queue: 250,
            system_mask: 0xffff_ffff,
            expensive_iterations: 1,
            probe_near: 0.5,
            probe_far: 500.0,
            probe_iterations: 8,
            probe_msaa: 1,
            probe_workspace: "PccProbeWorkspace".to_owned(),
        }
    }
}

impl PccSettings {
    /// Parses settings from JSON. Missing fields fall back to defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the settings as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> PccCapabilities {
        self.mode.capabilities()
    }
}
