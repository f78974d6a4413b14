//! GPU error types.

use std::fmt;

use ash::vk;
use thiserror::Error;

/// A GPU object the presentation engine creates and owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    Swapchain,
    SwapchainImages,
    ImageView,
    Framebuffer,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
}

impl fmt::Display for GpuResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Swapchain => "swapchain",
            Self::SwapchainImages => "swapchain images",
            Self::ImageView => "image view",
            Self::Framebuffer => "framebuffer",
            Self::CommandPool => "command pool",
            Self::CommandBuffer => "command buffer",
            Self::Semaphore => "semaphore",
            Self::Fence => "fence",
        };
        f.write_str(name)
    }
}

/// The step of the frame protocol a device failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStage {
    Probe,
    Wait,
    Acquire,
    ResetFence,
    Record,
    Submit,
    Present,
    Recreate,
    Shutdown,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probe => "surface probe",
            Self::Wait => "fence wait",
            Self::Acquire => "image acquire",
            Self::ResetFence => "fence reset",
            Self::Record => "command recording",
            Self::Submit => "queue submit",
            Self::Present => "present",
            Self::Recreate => "swapchain recreation",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Broad failure class, deciding who handles an error.
///
/// Only [`ErrorCategory::Transient`] is absorbed by the presenter. Everything
/// else ends the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unsupported surface or device setup. Fatal at startup.
    Configuration,
    /// Stale or zero-sized surface. Recovered by swapchain recreation.
    Transient,
    /// A GPU object could not be created or allocated.
    Resource,
    /// Device loss or an unexpected queue/recording failure.
    Device,
}

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// The surface reports no formats at all.
    #[error("Surface reports no supported formats")]
    NoFormatsAvailable,

    /// The surface reports no present modes at all.
    #[error("Surface reports no supported present modes")]
    NoPresentModesAvailable,

    /// Frames in flight must be at least one.
    #[error("Invalid frames in flight count: {0}")]
    InvalidFramesInFlight(usize),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Shader compilation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// The surface no longer offers the format the render pass was built for.
    #[error("Surface format changed from {expected:?} to {found:?}")]
    SurfaceFormatChanged { expected: vk::Format, found: vk::Format },

    /// The surface no longer matches the swapchain.
    #[error("Surface is out of date")]
    SurfaceOutOfDate,

    /// The surface currently has a zero-sized extent (minimized window).
    #[error("Surface extent is zero")]
    ZeroExtent,

    /// Creating a GPU object failed.
    #[error("Failed to create {resource}: {result}")]
    ResourceCreation {
        resource: GpuResource,
        result: vk::Result,
    },

    /// Command buffer reset, begin or end was rejected.
    #[error("Command recording failed: {0}")]
    RecordingFailed(vk::Result),

    /// A queue or synchronization call failed during the frame protocol.
    #[error("Device error during {stage}: {result}")]
    Device { stage: FrameStage, result: vk::Result },

    /// A failure raised while the presenter was in `stage`.
    #[error("{source} (during {stage})")]
    AtStage {
        stage: FrameStage,
        #[source]
        source: Box<GpuError>,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Shorthand for a resource creation failure.
    pub const fn resource(resource: GpuResource, result: vk::Result) -> Self {
        Self::ResourceCreation { resource, result }
    }

    /// Shorthand for a device failure at a frame stage.
    pub const fn device(stage: FrameStage, result: vk::Result) -> Self {
        Self::Device { stage, result }
    }

    /// Attach the frame stage this error surfaced in.
    ///
    /// Errors that already name a stage are returned unchanged.
    #[must_use]
    pub fn at_stage(self, stage: FrameStage) -> Self {
        if self.stage().is_some() {
            return self;
        }
        Self::AtStage {
            stage,
            source: Box::new(self),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AtStage { source, .. } => source.category(),
            Self::NoFormatsAvailable
            | Self::NoPresentModesAvailable
            | Self::InvalidFramesInFlight(_)
            | Self::NoSuitableDevice
            | Self::ExtensionNotSupported(_)
            | Self::SurfaceCreation(_)
            | Self::ShaderCompilation(_)
            | Self::PipelineCreation(_)
            | Self::SurfaceFormatChanged { .. } => ErrorCategory::Configuration,
            Self::SurfaceOutOfDate | Self::ZeroExtent => ErrorCategory::Transient,
            Self::ResourceCreation { .. } => ErrorCategory::Resource,
            Self::RecordingFailed(_)
            | Self::Device { .. }
            | Self::InvalidState(_)
            | Self::Vulkan(_)
            | Self::Other(_) => ErrorCategory::Device,
        }
    }

    /// Whether swapchain recreation recovers from this error.
    pub fn is_transient(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    /// The frame stage this error was raised in, if any.
    pub const fn stage(&self) -> Option<FrameStage> {
        match self {
            Self::Device { stage, .. } | Self::AtStage { stage, .. } => Some(*stage),
            Self::RecordingFailed(_) => Some(FrameStage::Record),
            Self::SurfaceOutOfDate => Some(FrameStage::Acquire),
            _ => None,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
