//! Recording device used by the unit tests.
//!
//! Every call is logged, every created object is tracked until destroyed, and
//! fences/semaphores follow the signal rules of the real API closely enough
//! to catch protocol mistakes: waiting on a fence nobody will signal times
//! out, and acquiring into a semaphore that is still signaled panics.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;

use crate::device::{PresentDevice, RenderPassBegin, SubmitDesc, SwapchainDesc};
use crate::error::GpuResource;
use crate::surface::{SurfaceCapabilities, PREFERRED_SURFACE_FORMAT};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSwapchain {
        width: u32,
        height: u32,
        image_count: u32,
        format: vk::Format,
        present_mode: vk::PresentModeKHR,
    },
    DestroySwapchain,
    CreateImageView,
    DestroyImageView,
    CreateFramebuffer,
    DestroyFramebuffer,
    CreateSemaphore,
    DestroySemaphore,
    CreateFence { signaled: bool },
    DestroyFence,
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    CreateCommandPool,
    AllocateCommandBuffers(u32),
    DestroyCommandPool,
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass {
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
    },
    BindPipeline(vk::Pipeline),
    SetViewport([f32; 6]),
    SetScissor {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    Draw(u32),
    EndRenderPass,
    Submit(vk::CommandBuffer),
    Acquire,
    Present(u32),
    WaitIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Swapchain,
    ImageView,
    Framebuffer,
    Semaphore,
    Fence,
    CommandPool,
}

#[derive(Default)]
pub struct MockState {
    pub caps: SurfaceCapabilities,
    pub calls: Vec<Call>,
    pub live: HashMap<u64, Kind>,
    pub fence_signaled: HashMap<vk::Fence, bool>,
    pub fence_waits: HashMap<vk::Fence, u32>,
    pub fence_resets: HashMap<vk::Fence, u32>,
    pub semaphore_signaled: HashMap<vk::Semaphore, bool>,
    pub swapchain_image_counts: HashMap<vk::SwapchainKHR, u32>,
    pub next_image: u32,
    pub acquire_script: VecDeque<VkResult<(u32, bool)>>,
    pub present_script: VecDeque<VkResult<bool>>,
    pub fail_create: Option<GpuResource>,
    pub fail_begin: Option<vk::Result>,
    pub fail_submit: Option<vk::Result>,
}

pub struct MockDevice {
    pub state: Mutex<MockState>,
    next_handle: AtomicU64,
}

pub fn default_caps() -> SurfaceCapabilities {
    SurfaceCapabilities {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 1,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        },
        formats: vec![PREFERRED_SURFACE_FORMAT],
        present_modes: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_caps(default_caps())
    }

    pub fn with_caps(caps: SurfaceCapabilities) -> Self {
        Self {
            state: Mutex::new(MockState {
                caps,
                ..Default::default()
            }),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn set_extent(&self, width: u32, height: u32) {
        self.state.lock().caps.capabilities.current_extent = vk::Extent2D { width, height };
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live(&self, kind: Kind) -> usize {
        self.state.lock().live.values().filter(|k| **k == kind).count()
    }

    pub fn live_total(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn fence_waits(&self, fence: vk::Fence) -> u32 {
        self.state.lock().fence_waits.get(&fence).copied().unwrap_or(0)
    }

    pub fn fence_resets(&self, fence: vk::Fence) -> u32 {
        self.state.lock().fence_resets.get(&fence).copied().unwrap_or(0)
    }

    pub fn script_acquire(&self, result: VkResult<(u32, bool)>) {
        self.state.lock().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: VkResult<bool>) {
        self.state.lock().present_script.push_back(result);
    }

    fn alloc(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn create(&self, kind: Kind, resource: GpuResource, call: Call) -> VkResult<u64> {
        let mut state = self.state.lock();
        if state.fail_create == Some(resource) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let raw = self.alloc();
        state.live.insert(raw, kind);
        state.calls.push(call);
        Ok(raw)
    }

    fn destroy(&self, raw: u64, kind: Kind, call: Call) {
        let mut state = self.state.lock();
        match state.live.remove(&raw) {
            Some(k) if k == kind => {}
            other => panic!("destroying {kind:?} {raw} that is not live (found {other:?})"),
        }
        state.calls.push(call);
    }
}

impl PresentDevice for MockDevice {
    fn surface_capabilities(&self) -> VkResult<SurfaceCapabilities> {
        Ok(self.state.lock().caps.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let raw = self.create(
            Kind::Swapchain,
            GpuResource::Swapchain,
            Call::CreateSwapchain {
                width: desc.extent.width,
                height: desc.extent.height,
                image_count: desc.image_count,
                format: desc.surface_format.format,
                present_mode: desc.present_mode,
            },
        )?;
        let swapchain = vk::SwapchainKHR::from_raw(raw);
        self.state
            .lock()
            .swapchain_image_counts
            .insert(swapchain, desc.image_count);
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let count = self.state.lock().swapchain_image_counts[&swapchain];
        Ok((0..count).map(|_| vk::Image::from_raw(self.alloc())).collect())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.state.lock().swapchain_image_counts.remove(&swapchain);
        self.destroy(swapchain.as_raw(), Kind::Swapchain, Call::DestroySwapchain);
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        self.create(Kind::ImageView, GpuResource::ImageView, Call::CreateImageView)
            .map(vk::ImageView::from_raw)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.destroy(view.as_raw(), Kind::ImageView, Call::DestroyImageView);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        self.create(
            Kind::Framebuffer,
            GpuResource::Framebuffer,
            Call::CreateFramebuffer,
        )
        .map(vk::Framebuffer::from_raw)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy(
            framebuffer.as_raw(),
            Kind::Framebuffer,
            Call::DestroyFramebuffer,
        );
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.create(Kind::Semaphore, GpuResource::Semaphore, Call::CreateSemaphore)
            .map(vk::Semaphore::from_raw)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().semaphore_signaled.remove(&semaphore);
        self.destroy(semaphore.as_raw(), Kind::Semaphore, Call::DestroySemaphore);
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence = self
            .create(Kind::Fence, GpuResource::Fence, Call::CreateFence { signaled })
            .map(vk::Fence::from_raw)?;
        self.state.lock().fence_signaled.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.destroy(fence.as_raw(), Kind::Fence, Call::DestroyFence);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::WaitFence(fence));
        *state.fence_waits.entry(fence).or_default() += 1;
        if state.fence_signaled.get(&fence).copied().unwrap_or(false) {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::ResetFence(fence));
        *state.fence_resets.entry(fence).or_default() += 1;
        state.fence_signaled.insert(fence, false);
        Ok(())
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        self.create(
            Kind::CommandPool,
            GpuResource::CommandPool,
            Call::CreateCommandPool,
        )
        .map(vk::CommandPool::from_raw)
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        if state.fail_create == Some(GpuResource::CommandBuffer) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        state.calls.push(Call::AllocateCommandBuffers(count));
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(self.alloc()))
            .collect())
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.destroy(pool.as_raw(), Kind::CommandPool, Call::DestroyCommandPool);
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.state.lock().calls.push(Call::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_begin {
            return Err(err);
        }
        state.calls.push(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.state.lock().calls.push(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.state.lock().calls.push(Call::BeginRenderPass {
            framebuffer: begin.framebuffer,
            width: begin.extent.width,
            height: begin.extent.height,
        });
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state.lock().calls.push(Call::BindPipeline(pipeline));
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.lock().calls.push(Call::SetViewport([
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            viewport.min_depth,
            viewport.max_depth,
        ]));
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.lock().calls.push(Call::SetScissor {
            x: scissor.offset.x,
            y: scissor.offset.y,
            width: scissor.extent.width,
            height: scissor.extent.height,
        });
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32) {
        self.state.lock().calls.push(Call::Draw(vertex_count));
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.state.lock().calls.push(Call::EndRenderPass);
    }

    fn queue_submit(&self, submit: &SubmitDesc) -> VkResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.fail_submit {
            return Err(err);
        }
        assert!(
            state
                .semaphore_signaled
                .insert(submit.wait_semaphore, false)
                .unwrap_or(false),
            "submit waits on a semaphore nothing signaled"
        );
        assert_eq!(
            submit.wait_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        state.semaphore_signaled.insert(submit.signal_semaphore, true);
        // Work completes immediately.
        state.fence_signaled.insert(submit.fence, true);
        state.calls.push(Call::Submit(submit.command_buffer));
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.lock();
        state.calls.push(Call::Acquire);
        assert!(
            !state.semaphore_signaled.get(&semaphore).copied().unwrap_or(false),
            "acquire into a semaphore that is still signaled"
        );
        let result = match state.acquire_script.pop_front() {
            Some(result) => result,
            None => {
                let count = state.swapchain_image_counts[&swapchain];
                let index = state.next_image % count;
                state.next_image += 1;
                Ok((index, false))
            }
        };
        if result.is_ok() {
            state.semaphore_signaled.insert(semaphore, true);
        }
        result
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.calls.push(Call::Present(image_index));
        assert!(
            state
                .semaphore_signaled
                .insert(wait_semaphore, false)
                .unwrap_or(false),
            "present waits on a semaphore nothing signaled"
        );
        state.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.state.lock().calls.push(Call::WaitIdle);
        Ok(())
    }
}
