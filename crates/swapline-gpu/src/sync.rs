//! Synchronization primitives.

use std::sync::Arc;

use ash::vk;

use crate::device::PresentDevice;
use crate::error::{FrameStage, GpuError, GpuResource, Result};

/// Default number of frames the host may record ahead of the GPU.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Create a semaphore.
pub fn create_semaphore<D: PresentDevice>(device: &D) -> Result<vk::Semaphore> {
    device
        .create_semaphore()
        .map_err(|e| GpuError::resource(GpuResource::Semaphore, e))
}

/// Create a fence.
pub fn create_fence<D: PresentDevice>(device: &D, signaled: bool) -> Result<vk::Fence> {
    device
        .create_fence(signaled)
        .map_err(|e| GpuError::resource(GpuResource::Fence, e))
}

/// Wait for a fence to be signaled.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn wait_for_fence<D: PresentDevice>(device: &D, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    device
        .wait_for_fence(fence, timeout_ns)
        .map_err(|e| GpuError::device(FrameStage::Wait, e))
}

/// Reset a fence to unsignaled state.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn reset_fence<D: PresentDevice>(device: &D, fence: vk::Fence) -> Result<()> {
    device
        .reset_fence(fence)
        .map_err(|e| GpuError::device(FrameStage::ResetFence, e))
}

/// Raw handles of one frame slot, copied out for the duration of a frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameSyncHandles {
    pub image_acquired: vk::Semaphore,
    pub render_complete: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Frame synchronization resources.
pub struct FrameSlot<D: PresentDevice> {
    device: Arc<D>,
    /// Signaled when the acquired swapchain image is ready to be rendered to.
    image_acquired: vk::Semaphore,
    /// Signaled when rendering is complete and the image may be presented.
    render_complete: vk::Semaphore,
    /// Signaled when the GPU has finished all work submitted for this slot.
    in_flight: vk::Fence,
}

impl<D: PresentDevice> FrameSlot<D> {
    /// Create frame synchronization resources.
    ///
    /// The fence starts signaled so the first wait on it returns at once.
    pub fn new(device: Arc<D>) -> Result<Self> {
        let image_acquired = create_semaphore(device.as_ref())?;
        let render_complete = match create_semaphore(device.as_ref()) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_acquired);
                return Err(e);
            }
        };
        let in_flight = match create_fence(device.as_ref(), true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_complete);
                device.destroy_semaphore(image_acquired);
                return Err(e);
            }
        };

        Ok(Self {
            device,
            image_acquired,
            render_complete,
            in_flight,
        })
    }

    pub fn handles(&self) -> FrameSyncHandles {
        FrameSyncHandles {
            image_acquired: self.image_acquired,
            render_complete: self.render_complete,
            in_flight: self.in_flight,
        }
    }

    /// Wait for this frame to be available.
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        wait_for_fence(self.device.as_ref(), self.in_flight, timeout_ns)
    }

    /// Reset the fence for the next frame.
    pub fn reset(&self) -> Result<()> {
        reset_fence(self.device.as_ref(), self.in_flight)
    }

    /// Replace the image-acquired semaphore.
    ///
    /// Used after an acquired image was abandoned: the old semaphore may hold
    /// a signal nothing will ever wait on. The device must be idle.
    pub fn renew_image_acquired(&mut self) -> Result<()> {
        let replacement = create_semaphore(self.device.as_ref())?;
        self.device.destroy_semaphore(self.image_acquired);
        self.image_acquired = replacement;
        Ok(())
    }
}

impl<D: PresentDevice> Drop for FrameSlot<D> {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.image_acquired);
        self.device.destroy_semaphore(self.render_complete);
        self.device.destroy_fence(self.in_flight);
    }
}

/// Manages synchronization for multiple frames in flight.
///
/// The slot count is fixed at creation and has no relation to the number of
/// swapchain images; slots survive swapchain recreation.
pub struct FrameSlotRing<D: PresentDevice> {
    slots: Vec<FrameSlot<D>>,
    current_frame: usize,
}

impl<D: PresentDevice> FrameSlotRing<D> {
    /// Create `frames_in_flight` slots: one pre-signaled fence and two
    /// semaphores each.
    pub fn new(device: &Arc<D>, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidFramesInFlight(frames_in_flight));
        }

        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(Arc::clone(device)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            slots,
            current_frame: 0,
        })
    }

    /// Get the current frame's sync resources.
    pub fn current(&self) -> &FrameSlot<D> {
        &self.slots[self.current_frame]
    }

    pub fn current_mut(&mut self) -> &mut FrameSlot<D> {
        &mut self.slots[self.current_frame]
    }

    /// Advance to the next frame and return its index.
    pub fn advance(&mut self) -> usize {
        self.current_frame = (self.current_frame + 1) % self.slots.len();
        self.current_frame
    }

    /// Get the current frame index.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FrameSlot<D>] {
        &self.slots
    }
}
