//! Swapchain lifecycle and frame synchronization over Vulkan.
//!
//! This crate provides:
//! - Surface probing and swapchain parameter selection
//! - Swapchain creation, teardown and recreation
//! - A ring of frame slots bounding CPU/GPU overlap
//! - Per-frame command recording and submission
//! - The [`Presenter`] that drives acquire, record, submit and present
//!
//! All GPU access goes through the [`PresentDevice`] trait. [`VulkanDevice`]
//! implements it over `ash`; [`GpuContextBuilder`] creates one for a window.

pub mod command;
pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod presenter;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

#[cfg(test)]
mod mock;

pub use command::{CommandPool, CommandRecorder, PipelineBinding};
pub use context::{GpuContext, GpuContextBuilder};
pub use device::{PresentDevice, RenderPassBegin, SubmitDesc, SwapchainDesc};
pub use error::{ErrorCategory, FrameStage, GpuError, GpuResource, Result};
pub use pipeline::{PipelineBundle, ShaderStages};
pub use presenter::{FrameStatus, Presenter, PresenterConfig, PresenterState, WindowSignal};
pub use surface::{SurfaceCapabilities, SwapchainPreferences, PREFERRED_SURFACE_FORMAT};
pub use swapchain::{RenderTarget, Swapchain, SwapchainImage, SwapchainManager};
pub use sync::{FrameSlot, FrameSlotRing, FrameSyncHandles, DEFAULT_FRAMES_IN_FLIGHT};
pub use vulkan::{QueueFamilies, VulkanDevice};
