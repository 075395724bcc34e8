#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Parallax-corrected cubemap reflection probes.
//!
//! A [`CubemapSystem`] owns a set of [`CubemapProbe`]s and either blends
//! the few closest to a tracked position into one cubemap (manual mode) or
//! keeps every probe in a shared cubemap array for per-pixel lookup
//! (automatic mode). The engine is reached only through the traits in
//! [`backend`].

pub mod backend;
pub mod constant_buffer;
pub mod errors;
pub mod frame;
pub mod gpu;
pub mod math;
pub mod placement;
pub mod probe;
pub mod proxy;
pub mod scheduler;
pub mod selection;
pub mod settings;
pub mod slots;
pub mod system;
pub mod texture_pool;

pub use backend::PccBackend;
pub use errors::{PccError, Result};
pub use frame::{FrameDriver, FramePhase, PassInfo, PassKind};
pub use math::Aabb;
pub use placement::GridPlacement;
pub use probe::{CubemapProbe, ProbeHandle, ProbeRegistry};
pub use selection::{MAX_CUBE_PROBES, ProbeSelector, SelectionResult};
pub use settings::{PccMode, PccSettings};
pub use system::{CubemapSystem, TextureParams};
