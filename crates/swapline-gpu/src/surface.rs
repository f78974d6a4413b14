//! Surface capability probing and swapchain parameter selection.
//!
//! Nothing in here holds state: capabilities are re-queried every time a
//! swapchain is built because they change across resizes.

use ash::vk;
use tracing::{debug, warn};

use crate::device::{PresentDevice, SwapchainDesc};
use crate::error::{FrameStage, GpuError, Result};

/// The 8-bit sRGB format preferred for presentation.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Surface capabilities query result.
#[derive(Debug, Clone, Default)]
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// What the application would like the swapchain to look like.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainPreferences {
    pub surface_format: vk::SurfaceFormatKHR,
    pub vsync: bool,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            surface_format: PREFERRED_SURFACE_FORMAT,
            vsync: false,
        }
    }
}

/// Query the current surface capabilities from the device.
pub fn probe<D: PresentDevice>(device: &D) -> Result<SurfaceCapabilities> {
    device
        .surface_capabilities()
        .map_err(|e| GpuError::device(FrameStage::Probe, e))
}

impl SurfaceCapabilities {
    /// Choose every swapchain parameter for the given window size.
    ///
    /// Fails with a transient [`GpuError::ZeroExtent`] when the resolved
    /// extent has no area, which happens while a window is minimized.
    pub fn plan(
        &self,
        window_extent: vk::Extent2D,
        preferences: &SwapchainPreferences,
    ) -> Result<SwapchainDesc> {
        let surface_format = select_surface_format(&self.formats, preferences.surface_format)?;
        let present_mode = select_present_mode(&self.present_modes, preferences.vsync)?;
        let extent = calculate_extent(&self.capabilities, window_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::ZeroExtent);
        }

        Ok(SwapchainDesc {
            surface_format,
            present_mode,
            extent,
            image_count: select_image_count(&self.capabilities),
            pre_transform: self.capabilities.current_transform,
        })
    }
}

/// Select the best surface format.
pub fn select_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Result<vk::SurfaceFormatKHR> {
    let first = *available.first().ok_or(GpuError::NoFormatsAvailable)?;

    if let Some(format) = available
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
    {
        return Ok(*format);
    }

    warn!(
        "Preferred surface format {:?}/{:?} unavailable, falling back to {:?}/{:?}",
        preferred.format, preferred.color_space, first.format, first.color_space
    );
    Ok(first)
}

/// Select the best present mode.
///
/// Without vsync MAILBOX is preferred. FIFO is always supported and is the
/// fallback in every case.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    vsync: bool,
) -> Result<vk::PresentModeKHR> {
    if available.is_empty() {
        return Err(GpuError::NoPresentModesAvailable);
    }

    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        return Ok(vk::PresentModeKHR::MAILBOX);
    }

    debug!("Using FIFO present mode (vsync: {vsync})");
    Ok(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
///
/// The surface's current extent wins unless it is the `u32::MAX` sentinel,
/// in which case the window size is clamped to the supported range.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Determine image count: one more than the minimum, capped by the maximum
/// (zero means unbounded).
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}
