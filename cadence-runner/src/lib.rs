//! Fixed-cadence interactive loop: the audio device paces simulation ticks, a vsync
//! thread paces redraws, and a [`Host`] supplies both.

pub mod audio;
pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod host;
pub mod input;
pub mod shutdown;
pub mod vsync;

mod app;
mod surface;

pub use app::{run, LoopSettings, ShowDirective};
pub use config::{FilteringMode, LoopConfig, RowOrder};
pub use error::{Failure, LoopError};
pub use host::{AudioFrame, Host, KeyCode, KeyHeld, Pointer, PointerState, ViewportFramebuffer};
