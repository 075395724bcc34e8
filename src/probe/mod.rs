//! Reflection probes and the registry that owns them.

pub mod cubemap;
pub mod registry;

pub use cubemap::{CaptureRequest, CaptureState, CubemapProbe, ProbeTexture, ProbeVolume};
pub use registry::ProbeRegistry;

use slotmap::new_key_type;

new_key_type! {
    pub struct ProbeKey;
}

/// Stable handle to a probe: arena key plus the id of the owning registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeHandle {
    pub(crate) key: ProbeKey,
    pub(crate) registry: u32,
}
