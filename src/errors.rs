//! Error Types
//!
//! This module defines the error types used throughout the probe system.
//!
//! # Overview
//!
//! The main error type [`PccError`] covers three families of failure:
//! - Configuration errors (programmer mistakes such as destroying a probe
//!   that belongs to another system, or calling a blending-only operation
//!   on a system running in automatic mode)
//! - Resource errors reported by the injected GPU services
//! - Settings parse errors
//!
//! Capture failures inside the render scheduler are *not* errors: the probe
//! simply stays dirty and is retried on the next scheduling call.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, PccError>`.
//!
//! ```rust,ignore
//! use parallax::errors::{PccError, Result};
//!
//! fn bake(system: &mut CubemapSystem<MyBackend>) -> Result<()> {
//!     system.update_all_dirty_probes()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::probe::ProbeHandle;
use crate::settings::PccMode;

/// The main error type for the cubemap probe system.
#[derive(Error, Debug)]
pub enum PccError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// The probe handle does not belong to this system's registry.
    #[error("Probe {0:?} does not belong to this system")]
    ForeignProbe(ProbeHandle),

    /// The probe handle belongs to this system but its probe was destroyed.
    #[error("Probe {0:?} was already destroyed")]
    StaleHandle(ProbeHandle),

    /// The operation is not available in the system's current mode.
    #[error("`{operation}` is not available in {mode:?} mode")]
    WrongMode {
        /// Name of the rejected operation
        operation: &'static str,
        /// Mode the system was configured with
        mode: PccMode,
    },

    /// A probe workspace was requested before its texture parameters.
    #[error("Probe {0:?} has no texture; call set_texture_params first")]
    MissingTextureParams(ProbeHandle),

    /// The system must be enabled before this operation.
    #[error("Cubemap system is not enabled: {0}")]
    NotEnabled(&'static str),

    /// A probe still has material references and cannot be destroyed.
    #[error("Probe {handle:?} is still referenced by {users} material(s)")]
    ProbeInUse {
        /// The probe being destroyed
        handle: ProbeHandle,
        /// Outstanding reference count
        users: u32,
    },

    /// Grid placement received depth data for a different number of probes
    /// than it placed.
    #[error("Expected face depths for {expected} probes, got {actual}")]
    DepthCountMismatch {
        /// Probes placed by `build_start`
        expected: usize,
        /// Depth entries supplied
        actual: usize,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Texture allocation failed in the texture manager.
    #[error("Texture allocation failed: {0}")]
    TextureAllocation(String),

    /// Buffer allocation failed in the buffer manager.
    #[error("Buffer allocation failed: {0}")]
    BufferAllocation(String),

    /// Generic backend failure (workspace or scene graph).
    #[error("Backend error: {0}")]
    Backend(String),

    // ========================================================================
    // Settings Errors
    // ========================================================================
    /// JSON parsing error.
    #[error("Settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Alias for `Result<T, PccError>`.
pub type Result<T> = std::result::Result<T, PccError>;
