//! Application runner and event loop.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use swapline_gpu::surface::{probe, select_surface_format};
use swapline_gpu::{
    FrameStatus, GpuContext, GpuContextBuilder, PipelineBundle, Presenter, PresenterConfig,
    ShaderStages, VulkanDevice, WindowSignal, DEFAULT_FRAMES_IN_FLIGHT,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "swapline".to_string(),
            width: 1280,
            height: 720,
            vsync: false,
            validation: cfg!(debug_assertions),
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Presenter settings derived from this config.
    pub fn presenter_config(&self) -> PresenterConfig {
        PresenterConfig::default()
            .with_frames_in_flight(self.frames_in_flight)
            .with_vsync(self.vsync)
            .with_vertex_count(swapline_shaders::TRIANGLE_VERTEX_COUNT)
    }
}

/// Log filter used when `RUST_LOG` is unset.
#[cfg(feature = "profiling-tracy")]
const DEFAULT_LOG_FILTER: &str = "info,swapline_app=trace,swapline_gpu=trace,swapline_triangle=trace";
#[cfg(not(feature = "profiling-tracy"))]
const DEFAULT_LOG_FILTER: &str = "info";

/// Run the triangle presenter with the given configuration.
///
/// Initializes logging, creates the window and GPU context, and runs the
/// event loop until the window is closed. A failed frame ends the loop and
/// is returned as the error.
pub fn run_app(config: AppConfig) -> anyhow::Result<()> {
    #[cfg(feature = "profiling-tracy")]
    {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
            )
            .init();
    }

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        state: None,
        failure: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner {
    config: AppConfig,
    state: Option<AppState>,
    failure: Option<anyhow::Error>,
}

/// Internal application state.
///
/// Fields drop in declaration order: the presenter waits for the device and
/// releases its objects before the pipeline, the device and the window go.
struct AppState {
    presenter: Presenter<VulkanDevice>,
    _pipeline: PipelineBundle,
    _gpu: GpuContext,
    window: Arc<Window>,
    minimized: bool,
    last_frame_time: Instant,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    rendered: u64,
    recreated: u64,
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match create_state(&self.config, event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                if let Err(e) = state.render_frame() {
                    error!("Render error: {e:#}");
                    if let Some(mut state) = self.state.take() {
                        state.cleanup();
                    }
                    self.failure = Some(e);
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    debug!("Resized to {}x{}", size.width, size.height);
                    state.presenter.signal(WindowSignal::Resized {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

fn create_state(config: &AppConfig, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
    let window_attrs = Window::default_attributes()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(config.width, config.height));

    let window = Arc::new(event_loop.create_window(window_attrs)?);

    let gpu = GpuContextBuilder::new()
        .app_name(&config.title)
        .validation(config.validation)
        .build(window.as_ref())?;

    info!("GPU: {}", gpu.device_name());

    let device = gpu.present_device();
    let presenter_config = config.presenter_config();

    // The render pass is built for the format the swapchain will pick.
    let capabilities = probe(device.as_ref())?;
    let format = select_surface_format(&capabilities.formats, presenter_config.preferred_format)?;
    let pipeline = PipelineBundle::new(
        &device,
        format.format,
        ShaderStages {
            vertex: swapline_shaders::triangle_vertex_shader(),
            fragment: swapline_shaders::triangle_fragment_shader(),
        },
    )?;

    let size = window.inner_size();
    let presenter = Presenter::initialize(
        device,
        pipeline.binding(),
        vk::Extent2D {
            width: size.width,
            height: size.height,
        },
        presenter_config,
    )?;

    Ok(AppState {
        presenter,
        _pipeline: pipeline,
        _gpu: gpu,
        window,
        minimized: false,
        last_frame_time: Instant::now(),
        min_fps: f64::MAX,
        max_fps: 0.0,
        fps_sum: 0.0,
        rendered: 0,
        recreated: 0,
    })
}

impl AppState {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        // Not every platform reports minimizing as a zero-sized resize
        if let Some(minimized) = self.window.is_minimized() {
            if minimized != self.minimized {
                self.minimized = minimized;
                self.presenter.signal(WindowSignal::Minimized(minimized));
            }
        }

        match self.presenter.render_frame()? {
            FrameStatus::Rendered { .. } => {
                let now = Instant::now();
                let dt = now.duration_since(self.last_frame_time).as_secs_f64();
                self.last_frame_time = now;
                if dt > 0.0 {
                    let fps = 1.0 / dt;
                    self.min_fps = self.min_fps.min(fps);
                    self.max_fps = self.max_fps.max(fps);
                    self.fps_sum += fps;
                    self.rendered += 1;
                }
            }
            FrameStatus::Recreated => self.recreated += 1,
            FrameStatus::Skipped => self.last_frame_time = Instant::now(),
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        // Print FPS statistics
        if self.rendered > 0 {
            let avg_fps = self.fps_sum / self.rendered as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", self.presenter.frame_count());
            info!("  Swapchain recreations: {}", self.recreated);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.presenter.shutdown() {
            error!("Presenter shutdown failed: {e}");
        }
        info!("Cleanup complete");
    }
}
