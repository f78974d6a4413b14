//! The per-frame acquire → record → submit → present protocol.
//!
//! A [`Presenter`] owns the swapchain, the frame-slot ring and the command
//! pool, and is driven by one host thread calling [`Presenter::render_frame`]
//! once per loop iteration. Stale or resized surfaces are handled in here by
//! rebuilding the swapchain; every other failure is returned to the caller
//! and ends the loop.

use std::collections::VecDeque;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, trace, warn};

use crate::command::{submit_command_buffer, CommandPool, CommandRecorder, PipelineBinding};
use crate::device::{PresentDevice, SubmitDesc};
use crate::error::{FrameStage, GpuError, Result};
use crate::surface::{SwapchainPreferences, PREFERRED_SURFACE_FORMAT};
use crate::swapchain::{Swapchain, SwapchainManager};
use crate::sync::{FrameSlotRing, DEFAULT_FRAMES_IN_FLIGHT};

/// Presenter configuration.
#[derive(Debug, Clone, Copy)]
pub struct PresenterConfig {
    /// Number of frame slots (fence + semaphore pair + command buffer).
    pub frames_in_flight: usize,
    /// Present with FIFO even when MAILBOX is available.
    pub vsync: bool,
    /// Surface format to look for before falling back to the first reported.
    pub preferred_format: vk::SurfaceFormatKHR,
    /// Clear color of the render pass.
    pub clear_color: [f32; 4],
    /// Vertices drawn per frame.
    pub vertex_count: u32,
    /// Timeout for the per-frame fence wait, in nanoseconds.
    pub fence_timeout_ns: u64,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            vsync: false,
            preferred_format: PREFERRED_SURFACE_FORMAT,
            clear_color: [0.02, 0.02, 0.04, 1.0],
            vertex_count: 3,
            fence_timeout_ns: u64::MAX,
        }
    }
}

impl PresenterConfig {
    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Set the preferred surface format.
    pub fn with_preferred_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.preferred_format = format;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, rgba: [f32; 4]) -> Self {
        self.clear_color = rgba;
        self
    }

    /// Set the number of vertices drawn per frame.
    pub fn with_vertex_count(mut self, count: u32) -> Self {
        self.vertex_count = count;
        self
    }

    fn preferences(&self) -> SwapchainPreferences {
        SwapchainPreferences {
            surface_format: self.preferred_format,
            vsync: self.vsync,
        }
    }
}

/// A change in window state reported by the windowing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    /// New framebuffer size in pixels. Zero in either dimension means minimized.
    Resized { width: u32, height: u32 },
    /// The window was minimized (`true`) or restored (`false`).
    Minimized(bool),
}

/// Where the presenter is in the frame protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterState {
    Idle,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Recreating,
    ShutDown,
}

/// Outcome of one [`Presenter::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and presented.
    Rendered { image_index: u32, frame_index: usize },
    /// Nothing was done: the window is minimized or has no area yet.
    Skipped,
    /// The frame was abandoned and the swapchain rebuilt. The frame cursor
    /// did not move.
    Recreated,
}

/// Drives swapchain, frame slots and command recording frame by frame.
pub struct Presenter<D: PresentDevice> {
    device: Arc<D>,
    config: PresenterConfig,
    pipeline: PipelineBinding,
    recorder: CommandRecorder,
    // Field order is release order.
    frames: Option<FrameSlotRing<D>>,
    commands: Option<CommandPool<D>>,
    swapchain: SwapchainManager<D>,
    state: PresenterState,
    window_extent: vk::Extent2D,
    minimized: bool,
    pending_resize: bool,
    signals: VecDeque<WindowSignal>,
    frame_count: u64,
}

impl<D: PresentDevice> Presenter<D> {
    /// Build the swapchain, command pool and frame slots.
    ///
    /// A zero-sized `initial_extent` starts the presenter minimized; the
    /// swapchain is then built on the first frame after a non-zero resize.
    pub fn initialize(
        device: Arc<D>,
        pipeline: PipelineBinding,
        initial_extent: vk::Extent2D,
        config: PresenterConfig,
    ) -> Result<Self> {
        if config.frames_in_flight == 0 {
            return Err(GpuError::InvalidFramesInFlight(0));
        }

        let mut swapchain =
            SwapchainManager::new(Arc::clone(&device), pipeline.render_pass, config.preferences());

        let minimized = is_zero(initial_extent);
        let mut pending_resize = false;
        if minimized {
            info!("Window starts minimized, deferring swapchain creation");
        } else {
            match swapchain.build(initial_extent) {
                Ok(_) => {}
                Err(e) if e.is_transient() => pending_resize = true,
                Err(e) => return Err(e),
            }
        }

        let commands = CommandPool::new(&device, config.frames_in_flight)?;
        let frames = FrameSlotRing::new(&device, config.frames_in_flight)?;

        info!(
            "Presenter ready ({} frames in flight)",
            config.frames_in_flight
        );

        Ok(Self {
            recorder: CommandRecorder::new(config.clear_color, config.vertex_count),
            device,
            config,
            pipeline,
            frames: Some(frames),
            commands: Some(commands),
            swapchain,
            state: PresenterState::Idle,
            window_extent: initial_extent,
            minimized,
            pending_resize,
            signals: VecDeque::new(),
            frame_count: 0,
        })
    }

    /// Queue a window signal; it takes effect at the start of the next frame.
    pub fn signal(&mut self, signal: WindowSignal) {
        self.signals.push_back(signal);
    }

    /// Render and present one frame.
    ///
    /// Stale surfaces, pending resizes and minimized windows are handled
    /// internally and reported through [`FrameStatus`]. An `Err` is terminal.
    pub fn render_frame(&mut self) -> Result<FrameStatus> {
        if self.state == PresenterState::ShutDown {
            return Err(GpuError::InvalidState(
                "render_frame called after shutdown".to_string(),
            ));
        }

        self.drain_signals();
        if self.minimized {
            return Ok(FrameStatus::Skipped);
        }
        if (self.pending_resize || !self.swapchain.is_built()) && !self.recreate(false)? {
            return Ok(FrameStatus::Skipped);
        }

        let (frames, commands, swapchain) = match (
            self.frames.as_ref(),
            self.commands.as_ref(),
            self.swapchain.swapchain(),
        ) {
            (Some(frames), Some(commands), Some(swapchain)) => (frames, commands, swapchain),
            _ => {
                return Err(GpuError::InvalidState(
                    "presenter resources missing".to_string(),
                ))
            }
        };
        let frame_index = frames.current_frame();
        let slot = frames.current();
        let sync = slot.handles();
        let cmd = commands.buffer(frame_index);

        // Wait until this slot's previous submission has retired.
        self.state = PresenterState::Acquiring;
        slot.wait(self.config.fence_timeout_ns)?;

        let image_index = match swapchain.acquire_next_image(sync.image_acquired, u64::MAX) {
            Ok((index, false)) => index,
            Ok((_, true)) => {
                debug!("Acquired image from a suboptimal swapchain, abandoning frame");
                self.recreate(true)?;
                return Ok(FrameStatus::Recreated);
            }
            Err(e) if e.is_transient() => {
                debug!("Swapchain out of date on acquire");
                self.recreate(false)?;
                return Ok(FrameStatus::Recreated);
            }
            Err(e) => return Err(e),
        };

        // Only now is this frame certain to submit work that signals the fence.
        slot.reset()?;

        self.state = PresenterState::Recording;
        let target = swapchain
            .render_target(image_index)
            .map_err(|e| e.at_stage(FrameStage::Record))?;
        self.recorder
            .record(self.device.as_ref(), cmd, &target, &self.pipeline)?;

        self.state = PresenterState::Submitting;
        submit_command_buffer(
            self.device.as_ref(),
            &SubmitDesc {
                command_buffer: cmd,
                wait_semaphore: sync.image_acquired,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: sync.render_complete,
                fence: sync.in_flight,
            },
        )?;

        self.state = PresenterState::Presenting;
        if swapchain.present(image_index, sync.render_complete)? {
            debug!("Swapchain stale after present, recreating");
            self.recreate(false)?;
            return Ok(FrameStatus::Recreated);
        }

        if let Some(frames) = self.frames.as_mut() {
            frames.advance();
        }
        self.frame_count += 1;
        self.state = PresenterState::Idle;
        trace!(frame_index, image_index, "Frame presented");

        Ok(FrameStatus::Rendered {
            image_index,
            frame_index,
        })
    }

    /// Wait for the device to go idle, then release frame slots, command
    /// pool, framebuffers, image views and the swapchain, in that order.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == PresenterState::ShutDown {
            return Ok(());
        }
        self.state = PresenterState::ShutDown;

        let idle = self
            .device
            .wait_idle()
            .map_err(|e| GpuError::device(FrameStage::Shutdown, e));

        self.frames = None;
        self.commands = None;
        self.swapchain.teardown();

        info!("Presenter shut down after {} frames", self.frame_count);
        idle
    }

    pub fn state(&self) -> PresenterState {
        self.state
    }

    /// Index of the frame slot the next frame will use.
    pub fn current_frame(&self) -> usize {
        self.frames.as_ref().map_or(0, FrameSlotRing::current_frame)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight
    }

    pub fn frame_slots(&self) -> Option<&FrameSlotRing<D>> {
        self.frames.as_ref()
    }

    pub fn swapchain(&self) -> Option<&Swapchain<D>> {
        self.swapchain.swapchain()
    }

    /// Number of swapchains built over the presenter's lifetime.
    pub fn swapchain_generation(&self) -> u64 {
        self.swapchain.generation()
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn config(&self) -> &PresenterConfig {
        &self.config
    }

    fn drain_signals(&mut self) {
        while let Some(signal) = self.signals.pop_front() {
            match signal {
                WindowSignal::Resized { width, height } => {
                    self.window_extent = vk::Extent2D { width, height };
                    let minimized = width == 0 || height == 0;
                    if minimized != self.minimized {
                        debug!(minimized, "Window minimize state changed");
                    }
                    self.minimized = minimized;
                    self.pending_resize = true;
                }
                WindowSignal::Minimized(minimized) => {
                    self.minimized = minimized || is_zero(self.window_extent);
                    if !minimized {
                        self.pending_resize = true;
                    }
                }
            }
        }
    }

    /// Rebuild the swapchain for the current window extent.
    ///
    /// Returns `false` when the surface has no area and recreation is
    /// deferred. `renew_acquire` replaces the current slot's image-acquired
    /// semaphore, which is needed when an acquired image was abandoned.
    fn recreate(&mut self, renew_acquire: bool) -> Result<bool> {
        self.state = PresenterState::Recreating;

        self.device
            .wait_idle()
            .map_err(|e| GpuError::device(FrameStage::Recreate, e))?;
        self.pending_resize = false;

        if renew_acquire {
            if let Some(frames) = self.frames.as_mut() {
                frames
                    .current_mut()
                    .renew_image_acquired()
                    .map_err(|e| e.at_stage(FrameStage::Recreate))?;
            }
        }

        let rebuilt = match self.swapchain.recreate(self.window_extent) {
            Ok(swapchain) => {
                let extent = swapchain.extent();
                info!("Swapchain recreated: {}x{}", extent.width, extent.height);
                true
            }
            Err(e) if e.is_transient() => {
                warn!("Surface has no area, deferring swapchain recreation");
                self.pending_resize = true;
                false
            }
            Err(e) => return Err(e.at_stage(FrameStage::Recreate)),
        };

        self.state = PresenterState::Idle;
        Ok(rebuilt)
    }
}

impl<D: PresentDevice> Drop for Presenter<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("Presenter shutdown failed: {e}");
        }
    }
}

fn is_zero(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, GpuResource};
    use crate::mock::{default_caps, Call, Kind, MockDevice};
    use ash::vk::Handle;

    const WINDOW: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn binding() -> PipelineBinding {
        PipelineBinding {
            pipeline: vk::Pipeline::from_raw(0xB1),
            render_pass: vk::RenderPass::from_raw(0xB2),
        }
    }

    fn presenter(device: &Arc<MockDevice>, frames: usize) -> Presenter<MockDevice> {
        Presenter::initialize(
            Arc::clone(device),
            binding(),
            WINDOW,
            PresenterConfig::default().with_frames_in_flight(frames),
        )
        .unwrap()
    }

    fn fences(presenter: &Presenter<MockDevice>) -> Vec<vk::Fence> {
        presenter
            .frame_slots()
            .unwrap()
            .slots()
            .iter()
            .map(|slot| slot.handles().in_flight)
            .collect()
    }

    fn swapchains_created(device: &MockDevice) -> usize {
        device.count(|c| matches!(c, Call::CreateSwapchain { .. }))
    }

    #[test]
    fn initialize_end_to_end() {
        let device = Arc::new(MockDevice::new());
        let presenter = presenter(&device, 2);

        let swapchain = presenter.swapchain().unwrap();
        assert_eq!(swapchain.format(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(swapchain.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(swapchain.image_count(), 2);
        assert_eq!(swapchain.extent().width, 800);
        assert_eq!(swapchain.extent().height, 600);
        assert_eq!(presenter.state(), PresenterState::Idle);
        assert_eq!(presenter.current_frame(), 0);
    }

    #[test]
    fn steady_state_frame_protocol() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        let fence = fences(&presenter)[0];
        device.clear_calls();

        let status = presenter.render_frame().unwrap();
        assert_eq!(
            status,
            FrameStatus::Rendered {
                image_index: 0,
                frame_index: 0
            }
        );

        let calls = device.calls();
        let position = |wanted: &Call| calls.iter().position(|c| c == wanted).unwrap();
        let wait = position(&Call::WaitFence(fence));
        let acquire = position(&Call::Acquire);
        let reset = position(&Call::ResetFence(fence));
        let draw = position(&Call::Draw(3));
        let submit = calls
            .iter()
            .position(|c| matches!(c, Call::Submit(_)))
            .unwrap();
        let present = position(&Call::Present(0));
        assert!(wait < acquire && acquire < reset && reset < draw);
        assert!(draw < submit && submit < present);
        assert_eq!(presenter.current_frame(), 1);
        assert_eq!(presenter.state(), PresenterState::Idle);
    }

    #[test]
    fn each_fence_waited_and_reset_three_times_over_3n_frames() {
        for n in 1..=4 {
            let device = Arc::new(MockDevice::new());
            let mut presenter = presenter(&device, n);
            let fences = fences(&presenter);

            let mut cursor = Vec::new();
            for _ in 0..3 * n {
                match presenter.render_frame().unwrap() {
                    FrameStatus::Rendered { frame_index, .. } => cursor.push(frame_index),
                    other => panic!("unexpected {other:?}"),
                }
            }

            for fence in &fences {
                assert_eq!(device.fence_waits(*fence), 3);
                assert_eq!(device.fence_resets(*fence), 3);
            }
            let expected: Vec<usize> = (0..3).flat_map(|_| 0..n).collect();
            assert_eq!(cursor, expected);
            assert_eq!(presenter.current_frame(), 0);
        }
    }

    #[test]
    fn frame_slots_independent_of_image_count() {
        let mut caps = default_caps();
        caps.capabilities.min_image_count = 3;
        caps.capabilities.max_image_count = 0;
        let device = Arc::new(MockDevice::with_caps(caps));
        let mut presenter = presenter(&device, 2);

        assert_eq!(presenter.swapchain().unwrap().image_count(), 4);
        assert_eq!(presenter.frame_slots().unwrap().len(), 2);

        let mut images = Vec::new();
        for _ in 0..4 {
            if let FrameStatus::Rendered { image_index, .. } = presenter.render_frame().unwrap() {
                images.push(image_index);
            }
        }
        assert_eq!(images, vec![0, 1, 2, 3]);
        assert_eq!(presenter.current_frame(), 0);
    }

    #[test]
    fn suboptimal_present_recreates_without_advancing() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        presenter.render_frame().unwrap();
        let before = presenter.current_frame();
        assert_eq!(before, 1);

        device.script_present(Ok(true));
        device.clear_calls();
        assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Recreated);

        let calls = device.calls();
        let present = calls
            .iter()
            .position(|c| matches!(c, Call::Present(_)))
            .unwrap();
        let idle = calls.iter().position(|c| *c == Call::WaitIdle).unwrap();
        let rebuilt = calls
            .iter()
            .position(|c| matches!(c, Call::CreateSwapchain { .. }))
            .unwrap();
        assert!(present < idle && idle < rebuilt);
        assert_eq!(presenter.current_frame(), before);

        let status = presenter.render_frame().unwrap();
        assert!(matches!(
            status,
            FrameStatus::Rendered { frame_index, .. } if frame_index == before
        ));
    }

    #[test]
    fn out_of_date_present_recreates() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        device.script_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Recreated);
        assert_eq!(presenter.swapchain_generation(), 2);
        assert_eq!(presenter.current_frame(), 0);
    }

    #[test]
    fn failed_rebuild_after_stale_present_names_recreate_stage() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        device.script_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        device.state.lock().fail_create = Some(GpuResource::Swapchain);

        let err = presenter.render_frame().unwrap_err();
        assert_eq!(err.stage(), Some(FrameStage::Recreate));
        assert_eq!(err.category(), ErrorCategory::Resource);
        assert!(!err.is_transient());
    }

    #[test]
    fn out_of_date_acquire_aborts_before_fence_reset() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        let fence = fences(&presenter)[0];
        device.script_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Recreated);
        assert_eq!(device.fence_resets(fence), 0);
        assert_eq!(device.count(|c| matches!(c, Call::Submit(_))), 0);
        assert_eq!(presenter.current_frame(), 0);

        // The untouched fence is still signaled, so the retry proceeds.
        assert!(matches!(
            presenter.render_frame().unwrap(),
            FrameStatus::Rendered { frame_index: 0, .. }
        ));
    }

    #[test]
    fn suboptimal_acquire_abandons_image_and_renews_semaphore() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        let before = presenter.frame_slots().unwrap().current().handles().image_acquired;
        device.script_acquire(Ok((0, true)));

        assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Recreated);
        let after = presenter.frame_slots().unwrap().current().handles().image_acquired;
        assert_ne!(before, after);
        assert_eq!(device.count(|c| matches!(c, Call::Submit(_))), 0);

        // Would panic in the mock if the abandoned signal were still pending.
        assert!(matches!(
            presenter.render_frame().unwrap(),
            FrameStatus::Rendered { .. }
        ));
    }

    #[test]
    fn resize_signal_rebuilds_then_renders() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        presenter.render_frame().unwrap();

        device.set_extent(1280, 720);
        presenter.signal(WindowSignal::Resized {
            width: 1280,
            height: 720,
        });
        let status = presenter.render_frame().unwrap();

        assert!(matches!(status, FrameStatus::Rendered { .. }));
        let extent = presenter.swapchain().unwrap().extent();
        assert_eq!((extent.width, extent.height), (1280, 720));
        assert_eq!(presenter.swapchain_generation(), 2);
    }

    #[test]
    fn minimized_window_never_builds() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        presenter.render_frame().unwrap();
        let built = swapchains_created(&device);

        device.set_extent(0, 0);
        presenter.signal(WindowSignal::Resized {
            width: 0,
            height: 0,
        });
        device.clear_calls();
        for _ in 0..5 {
            assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Skipped);
        }
        assert!(device.calls().is_empty(), "no GPU work while minimized");
        assert!(presenter.is_minimized());

        device.set_extent(640, 480);
        presenter.signal(WindowSignal::Resized {
            width: 640,
            height: 480,
        });
        assert!(matches!(
            presenter.render_frame().unwrap(),
            FrameStatus::Rendered { .. }
        ));
        assert_eq!(swapchains_created(&device), 1);
        assert!(built >= 1);
        assert_eq!(presenter.swapchain().unwrap().extent().width, 640);
    }

    #[test]
    fn minimize_flag_skips_frames() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);

        presenter.signal(WindowSignal::Minimized(true));
        assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Skipped);

        presenter.signal(WindowSignal::Minimized(false));
        assert!(matches!(
            presenter.render_frame().unwrap(),
            FrameStatus::Rendered { .. }
        ));
    }

    #[test]
    fn starts_minimized_and_builds_on_restore() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = Presenter::initialize(
            Arc::clone(&device),
            binding(),
            vk::Extent2D {
                width: 0,
                height: 0,
            },
            PresenterConfig::default(),
        )
        .unwrap();

        assert!(presenter.swapchain().is_none());
        assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Skipped);
        assert_eq!(swapchains_created(&device), 0);

        presenter.signal(WindowSignal::Resized {
            width: 800,
            height: 600,
        });
        assert!(matches!(
            presenter.render_frame().unwrap(),
            FrameStatus::Rendered { .. }
        ));
    }

    #[test]
    fn surface_without_area_defers_recreation() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);

        // Window says it has area, surface disagrees.
        device.set_extent(0, 0);
        presenter.signal(WindowSignal::Resized {
            width: 300,
            height: 200,
        });
        assert_eq!(presenter.render_frame().unwrap(), FrameStatus::Skipped);
        assert!(presenter.swapchain().is_none());

        device.set_extent(300, 200);
        assert!(matches!(
            presenter.render_frame().unwrap(),
            FrameStatus::Rendered { .. }
        ));
    }

    #[test]
    fn submit_failure_is_fatal_and_names_stage() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        device.state.lock().fail_submit = Some(vk::Result::ERROR_DEVICE_LOST);

        let err = presenter.render_frame().unwrap_err();
        assert_eq!(err.stage(), Some(FrameStage::Submit));
        assert_eq!(err.category(), ErrorCategory::Device);
    }

    #[test]
    fn recording_failure_is_fatal() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        device.state.lock().fail_begin = Some(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        let err = presenter.render_frame().unwrap_err();
        assert!(matches!(err, GpuError::RecordingFailed(_)));
    }

    #[test]
    fn device_loss_on_present_is_fatal() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        device.script_present(Err(vk::Result::ERROR_DEVICE_LOST));

        let err = presenter.render_frame().unwrap_err();
        assert_eq!(err.stage(), Some(FrameStage::Present));
    }

    #[test]
    fn resource_failure_at_startup_releases_partial_state() {
        let device = Arc::new(MockDevice::new());
        device.state.lock().fail_create = Some(GpuResource::Fence);

        let err = Presenter::initialize(
            Arc::clone(&device),
            binding(),
            WINDOW,
            PresenterConfig::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.category(), ErrorCategory::Resource);
        assert_eq!(device.live_total(), 0);
    }

    #[test]
    fn shutdown_releases_in_reverse_creation_order() {
        let device = Arc::new(MockDevice::new());
        let mut presenter = presenter(&device, 2);
        presenter.render_frame().unwrap();
        device.clear_calls();

        presenter.shutdown().unwrap();
        presenter.shutdown().unwrap();

        let calls = device.calls();
        assert_eq!(calls[0], Call::WaitIdle);
        let last_fence = calls
            .iter()
            .rposition(|c| *c == Call::DestroyFence)
            .unwrap();
        let pool = calls
            .iter()
            .position(|c| *c == Call::DestroyCommandPool)
            .unwrap();
        let first_fb = calls
            .iter()
            .position(|c| *c == Call::DestroyFramebuffer)
            .unwrap();
        let last_fb = calls
            .iter()
            .rposition(|c| *c == Call::DestroyFramebuffer)
            .unwrap();
        let first_view = calls
            .iter()
            .position(|c| *c == Call::DestroyImageView)
            .unwrap();
        let last_view = calls
            .iter()
            .rposition(|c| *c == Call::DestroyImageView)
            .unwrap();
        let swapchain = calls
            .iter()
            .position(|c| *c == Call::DestroySwapchain)
            .unwrap();
        assert!(last_fence < pool);
        assert!(pool < first_fb);
        assert!(last_fb < first_view);
        assert!(last_view < swapchain);
        assert_eq!(device.count(|c| *c == Call::WaitIdle), 1);

        assert_eq!(device.live_total(), 0);
        assert_eq!(presenter.state(), PresenterState::ShutDown);
        assert!(presenter.render_frame().is_err());
    }

    #[test]
    fn drop_releases_everything() {
        let device = Arc::new(MockDevice::new());
        {
            let mut presenter = presenter(&device, 3);
            for _ in 0..5 {
                presenter.render_frame().unwrap();
            }
        }
        assert_eq!(device.live_total(), 0);
        assert_eq!(device.live(Kind::Swapchain), 0);
    }
}
