//! Windowed host loop for the swapline presenter.
//!
//! Opens a window, builds the GPU context, the triangle pipeline and a
//! [`Presenter`](swapline_gpu::Presenter), then renders one frame per event
//! loop iteration until the window is closed or a frame fails.
//!
//! # Example
//!
//! ```no_run
//! use swapline_app::{run_app, AppConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app(AppConfig::new("triangle").with_size(800, 600))
//! }
//! ```

mod runner;

pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use swapline_gpu::{FrameStatus, GpuContext, GpuContextBuilder, PresenterConfig, WindowSignal};
