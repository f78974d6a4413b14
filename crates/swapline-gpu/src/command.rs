//! Command buffer management.

use std::sync::Arc;

use ash::vk;

use crate::device::{PresentDevice, RenderPassBegin, SubmitDesc};
use crate::error::{FrameStage, GpuError, GpuResource, Result};
use crate::swapchain::RenderTarget;

/// Command pool with one primary command buffer per frame slot.
///
/// Buffers are freed together with the pool on drop.
pub struct CommandPool<D: PresentDevice> {
    device: Arc<D>,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl<D: PresentDevice> CommandPool<D> {
    /// Create a pool and allocate `count` resettable command buffers.
    pub fn new(device: &Arc<D>, count: usize) -> Result<Self> {
        let pool = device
            .create_command_pool()
            .map_err(|e| GpuError::resource(GpuResource::CommandPool, e))?;

        let mut command_pool = Self {
            device: Arc::clone(device),
            pool,
            buffers: Vec::new(),
        };

        let count = u32::try_from(count)
            .map_err(|_| GpuError::InvalidFramesInFlight(count))?;
        command_pool.buffers = device
            .allocate_command_buffers(pool, count)
            .map_err(|e| GpuError::resource(GpuResource::CommandBuffer, e))?;

        Ok(command_pool)
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// The command buffer owned by frame slot `frame_index`.
    pub fn buffer(&self, frame_index: usize) -> vk::CommandBuffer {
        self.buffers[frame_index]
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl<D: PresentDevice> Drop for CommandPool<D> {
    fn drop(&mut self) {
        self.buffers.clear();
        self.device.destroy_command_pool(self.pool);
    }
}

/// The pipeline a frame is drawn with.
///
/// Both handles are owned by the caller. The pipeline must declare viewport
/// and scissor as dynamic state and be compatible with `render_pass`.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBinding {
    pub pipeline: vk::Pipeline,
    pub render_pass: vk::RenderPass,
}

/// Records the single-pass command sequence for one frame.
#[derive(Debug, Clone, Copy)]
pub struct CommandRecorder {
    clear_color: [f32; 4],
    vertex_count: u32,
}

impl CommandRecorder {
    pub fn new(clear_color: [f32; 4], vertex_count: u32) -> Self {
        Self {
            clear_color,
            vertex_count,
        }
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Reset `cmd` and record: begin render pass (clear), bind pipeline, set
    /// viewport and scissor to the full extent, draw, end render pass.
    ///
    /// On success the buffer is executable and must not be touched again
    /// until the fence of the submission using it signals.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn record<D: PresentDevice>(
        &self,
        device: &D,
        cmd: vk::CommandBuffer,
        target: &RenderTarget,
        pipeline: &PipelineBinding,
    ) -> Result<()> {
        device
            .reset_command_buffer(cmd)
            .map_err(GpuError::RecordingFailed)?;
        device
            .begin_command_buffer(cmd)
            .map_err(GpuError::RecordingFailed)?;

        let extent = target.extent;
        device.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass: pipeline.render_pass,
                framebuffer: target.framebuffer,
                extent,
                clear: vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.clear_color,
                    },
                },
            },
        );

        device.cmd_bind_pipeline(cmd, pipeline.pipeline);
        device.cmd_set_viewport(cmd, full_viewport(extent));
        device.cmd_set_scissor(
            cmd,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        );
        device.cmd_draw(cmd, self.vertex_count);
        device.cmd_end_render_pass(cmd);

        device
            .end_command_buffer(cmd)
            .map_err(GpuError::RecordingFailed)
    }
}

/// Top-left origin viewport covering `extent` with depth range [0, 1].
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Submit one command buffer to the graphics queue.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn submit_command_buffer<D: PresentDevice>(device: &D, submit: &SubmitDesc) -> Result<()> {
    device
        .queue_submit(submit)
        .map_err(|e| GpuError::device(FrameStage::Submit, e))
}
