//! Swapchain management.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::{PresentDevice, SwapchainDesc};
use crate::error::{FrameStage, GpuError, GpuResource, Result};
use crate::surface::{probe, SwapchainPreferences};

/// One presentable image together with the objects rendering into it.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

/// Where one frame's commands render to.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub image_index: u32,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

/// Swapchain wrapper.
///
/// Owns the swapchain, one view and one framebuffer per image. Dropping it
/// releases framebuffers, then views, then the swapchain. The GPU must not be
/// using any of them at that point.
pub struct Swapchain<D: PresentDevice> {
    device: Arc<D>,
    handle: vk::SwapchainKHR,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<SwapchainImage>,
}

impl<D: PresentDevice> Swapchain<D> {
    /// Create a swapchain and its per-image views and framebuffers.
    ///
    /// Objects created before a failure are released on the way out.
    pub fn new(device: &Arc<D>, desc: &SwapchainDesc, render_pass: vk::RenderPass) -> Result<Self> {
        let handle = device
            .create_swapchain(desc)
            .map_err(|e| GpuError::resource(GpuResource::Swapchain, e))?;

        let mut swapchain = Self {
            device: Arc::clone(device),
            handle,
            surface_format: desc.surface_format,
            present_mode: desc.present_mode,
            extent: desc.extent,
            images: Vec::new(),
        };

        let images = device
            .swapchain_images(handle)
            .map_err(|e| GpuError::resource(GpuResource::SwapchainImages, e))?;
        swapchain.images.reserve(images.len());

        for image in images {
            let view = device
                .create_image_view(image, desc.surface_format.format)
                .map_err(|e| GpuError::resource(GpuResource::ImageView, e))?;
            let framebuffer = match device.create_framebuffer(render_pass, view, desc.extent) {
                Ok(framebuffer) => framebuffer,
                Err(e) => {
                    device.destroy_image_view(view);
                    return Err(GpuError::resource(GpuResource::Framebuffer, e));
                }
            };
            swapchain.images.push(SwapchainImage {
                image,
                view,
                framebuffer,
            });
        }

        Ok(swapchain)
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    /// The framebuffer and extent for an acquired image index.
    pub fn render_target(&self, image_index: u32) -> Result<RenderTarget> {
        let image = self.images.get(image_index as usize).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "image index {image_index} out of range for {} swapchain images",
                self.images.len()
            ))
        })?;
        Ok(RenderTarget {
            image_index,
            framebuffer: image.framebuffer,
            extent: self.extent,
        })
    }

    /// Acquire the next image, signaling `semaphore` once it is usable.
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    /// OUT_OF_DATE means no image was acquired; it maps to the transient
    /// [`GpuError::SurfaceOutOfDate`].
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout_ns: u64) -> Result<(u32, bool)> {
        match self
            .device
            .acquire_next_image(self.handle, semaphore, timeout_ns)
        {
            Ok((index, suboptimal)) => Ok((index, suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(GpuError::SurfaceOutOfDate),
            Err(e) => Err(GpuError::device(FrameStage::Acquire, e)),
        }
    }

    /// Present an image once `wait_semaphore` is signaled.
    ///
    /// Returns `true` when the swapchain should be recreated.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> Result<bool> {
        match self
            .device
            .queue_present(self.handle, image_index, wait_semaphore)
        {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(GpuError::device(FrameStage::Present, e)),
        }
    }
}

impl<D: PresentDevice> Drop for Swapchain<D> {
    fn drop(&mut self) {
        for image in &self.images {
            self.device.destroy_framebuffer(image.framebuffer);
        }
        for image in &self.images {
            self.device.destroy_image_view(image.view);
        }
        self.images.clear();
        self.device.destroy_swapchain(self.handle);
    }
}

/// Builds, tears down and rebuilds the swapchain for one surface.
pub struct SwapchainManager<D: PresentDevice> {
    device: Arc<D>,
    render_pass: vk::RenderPass,
    preferences: SwapchainPreferences,
    // Format the render pass was matched against by the first build
    pinned_format: Option<vk::SurfaceFormatKHR>,
    swapchain: Option<Swapchain<D>>,
    generation: u64,
}

impl<D: PresentDevice> SwapchainManager<D> {
    /// Create a manager with no swapchain built yet.
    pub fn new(device: Arc<D>, render_pass: vk::RenderPass, preferences: SwapchainPreferences) -> Self {
        Self {
            device,
            render_pass,
            preferences,
            pinned_format: None,
            swapchain: None,
            generation: 0,
        }
    }

    /// Query the surface and build a swapchain sized for `window_extent`.
    ///
    /// Any existing swapchain is torn down first. Fails with a transient
    /// [`GpuError::ZeroExtent`] if the surface currently has no area.
    ///
    /// The surface format chosen by the first build is kept for every later
    /// one, since the render pass only matches that format. If the surface
    /// stops offering it, the build fails with
    /// [`GpuError::SurfaceFormatChanged`].
    pub fn build(&mut self, window_extent: vk::Extent2D) -> Result<&Swapchain<D>> {
        self.teardown();

        let capabilities = probe(self.device.as_ref())?;
        let desc = capabilities.plan(window_extent, &self.preferences)?;
        if let Some(pinned) = self.pinned_format {
            let same = desc.surface_format.format == pinned.format
                && desc.surface_format.color_space == pinned.color_space;
            if !same {
                return Err(GpuError::SurfaceFormatChanged {
                    expected: pinned.format,
                    found: desc.surface_format.format,
                });
            }
        }
        let swapchain = Swapchain::new(&self.device, &desc, self.render_pass)?;
        self.generation += 1;
        if self.pinned_format.is_none() {
            self.pinned_format = Some(desc.surface_format);
            self.preferences.surface_format = desc.surface_format;
        }

        info!(
            "Swapchain created: {}x{} ({} images, {:?}, {:?})",
            desc.extent.width,
            desc.extent.height,
            swapchain.image_count(),
            desc.surface_format.format,
            desc.present_mode,
        );

        Ok(self.swapchain.insert(swapchain))
    }

    /// Destroy framebuffers, views and the swapchain. Safe to call repeatedly.
    ///
    /// The caller must have waited for the device to go idle.
    pub fn teardown(&mut self) {
        if self.swapchain.take().is_some() {
            tracing::debug!("Swapchain torn down");
        }
    }

    /// Tear down and rebuild from freshly queried capabilities.
    ///
    /// The caller must have waited for the device to go idle.
    pub fn recreate(&mut self, window_extent: vk::Extent2D) -> Result<&Swapchain<D>> {
        self.teardown();
        self.build(window_extent)
    }

    pub fn swapchain(&self) -> Option<&Swapchain<D>> {
        self.swapchain.as_ref()
    }

    pub fn is_built(&self) -> bool {
        self.swapchain.is_some()
    }

    /// Number of swapchains built so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn preferences(&self) -> &SwapchainPreferences {
        &self.preferences
    }
}
