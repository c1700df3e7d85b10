//! Flow control and application event loop.
//!
//! A "flow" is the application code driving the engine. It builds its scene once the
//! window and GPU exist, reacts to window events and runs per-frame logic. The engine
//! owns the [`Context`] and the [`Scene`] and hands both to the flow.
//!
//! # User-facing types
//!
//! - [`AppConfig`] holds the window, timing and logging settings consumed by [`run`]
//! - [`GraphicsFlow`] is the trait the application implements
//! - [`Scene`] owns the layers, the camera and the projection
//! - [`UpdateContext`] carries the frame timing given to every update
//!
//! # Lifecycle Flow
//!
//! Each iteration of the event loop:
//! 1. Forward window events to the flow
//! 2. Advance the [`FrameTimer`] and call `on_update`
//! 3. Update every layer of the scene
//! 4. If the frame interval elapsed, clear, render every layer in order and present

use std::{any::Any, path::PathBuf, sync::Arc};

use cgmath::Deg;
use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::{
    camera::{Camera, Projection},
    context::{Context, GpuResource},
    data_structures::scene_graph::SceneLayer,
    error::GpuError,
    gpu::{wgpu_backend::WgpuGpu, ClearFlags, Gpu},
    resources::AssetLoader,
};

/// Settings for [`run`].
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Minimum time between two rendered frames.
    pub frame_interval: Duration,
    pub clear_colour: [f32; 4],
    /// Root directory of the file system asset source.
    pub asset_root: PathBuf,
    /// `env_logger` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "dusk".to_string(),
            width: 1024,
            height: 768,
            frame_interval: Duration::from_secs_f64(1.0 / 60.0),
            clear_colour: [0.0, 0.0, 0.0, 1.0],
            asset_root: PathBuf::from("."),
            log_filter: "info".to_string(),
        }
    }
}

/// Frame timing handed to every update.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpdateContext {
    /// Frames rendered during the last full second.
    pub fps: u32,
    /// Seconds since the previous update.
    pub delta_time: f32,
    /// Seconds since the last rendered frame.
    pub elapsed_time: f64,
    /// Seconds since the loop started.
    pub total_time: f64,
}

/// The outcome of one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTick {
    pub update: UpdateContext,
    /// The frame interval elapsed; render this iteration.
    pub render: bool,
}

/// Paces updates and rendering.
///
/// Updates run every iteration. A frame is rendered once at least `interval` has passed
/// since the previous rendered frame, and the frames rendered are counted per second.
#[derive(Debug)]
pub struct FrameTimer {
    interval: Duration,
    last: Option<Instant>,
    total: Duration,
    since_render: Duration,
    since_second: Duration,
    frames: u32,
    fps: u32,
}

impl FrameTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            total: Duration::ZERO,
            since_render: Duration::ZERO,
            since_second: Duration::ZERO,
            frames: 0,
            fps: 0,
        }
    }

    /// Advance by the wall-clock time since the previous call.
    pub fn tick(&mut self) -> FrameTick {
        let now = Instant::now();
        let delta = self.last.map(|last| now - last).unwrap_or_default();
        self.last = Some(now);
        self.advance(delta)
    }

    /// Advance by `delta`.
    pub fn advance(&mut self, delta: Duration) -> FrameTick {
        self.total += delta;
        self.since_render += delta;
        self.since_second += delta;

        let elapsed = self.since_render;
        let render = elapsed >= self.interval;
        if render {
            self.since_render = Duration::ZERO;
            self.frames += 1;
        }

        let second = Duration::from_secs(1);
        if self.since_second >= second {
            self.fps = self.frames;
            self.frames = 0;
            self.since_second -= second;
        }

        FrameTick {
            update: UpdateContext {
                fps: self.fps,
                delta_time: delta.as_secs_f32(),
                elapsed_time: elapsed.as_secs_f64(),
                total_time: self.total.as_secs_f64(),
            },
            render,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

/// The layers drawn each frame, with the camera and projection they are drawn with.
pub struct Scene {
    layers: Vec<Box<dyn SceneLayer>>,
    pub camera: Camera,
    projection: Projection,
    pub clear_colour: [f32; 4],
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("layers", &self.layers.len())
            .field("camera", &self.camera)
            .field("projection", &self.projection)
            .finish()
    }
}

impl Scene {
    /// An empty scene with a 45° perspective projection for a `width` × `height` view.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layers: Vec::new(),
            camera: Camera::default(),
            projection: Projection::new(width, height, Deg(45.0), 0.1, 100.0),
            clear_colour: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Append a layer; layers render in the order they were added.
    pub fn add_layer<L: SceneLayer>(&mut self, layer: L) -> usize {
        self.layers.push(Box::new(layer));
        self.layers.len() - 1
    }

    /// Take the layer at `index` out of the scene without releasing it.
    pub fn remove_layer(&mut self, index: usize) -> Option<Box<dyn SceneLayer>> {
        (index < self.layers.len()).then(|| self.layers.remove(index))
    }

    pub fn layer<L: SceneLayer>(&self, index: usize) -> Option<&L> {
        let layer: &dyn Any = self.layers.get(index)?.as_ref();
        layer.downcast_ref()
    }

    pub fn layer_mut<L: SceneLayer>(&mut self, index: usize) -> Option<&mut L> {
        let layer: &mut dyn Any = self.layers.get_mut(index)?.as_mut();
        layer.downcast_mut()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn update(&mut self, ctx: &UpdateContext) {
        for layer in self.layers.iter_mut() {
            layer.update(ctx);
        }
    }

    /// Clear the screen, render every layer and present the frame.
    pub fn render<G: Gpu>(&self, ctx: &mut Context<G>) -> Result<(), GpuError> {
        let projection = self.projection.calc_matrix();
        {
            let mut rc = ctx.render_context(&self.camera, projection);
            rc.gpu.bind_framebuffer(None);
            rc.gpu.clear(ClearFlags::COLOUR | ClearFlags::DEPTH, self.clear_colour);
            for layer in &self.layers {
                layer.render(&mut rc);
            }
        }
        ctx.gpu.end_frame()
    }

    /// Follow a new window size with the projection, the backend and every layer.
    pub fn resize(&mut self, gpu: &mut dyn Gpu, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.projection.resize(width, height);
        gpu.resize(width, height);
        for layer in self.layers.iter_mut() {
            layer.resize(gpu, width, height)?;
        }
        Ok(())
    }
}

impl GpuResource for Scene {
    fn release(&mut self, gpu: &mut dyn Gpu) {
        for mut layer in self.layers.drain(..) {
            layer.release(gpu);
        }
    }
}

/// Application code driven by [`run`].
pub trait GraphicsFlow {
    /// Called once the window, GPU and built-in shaders are ready.
    fn on_init(&mut self, ctx: &mut Context<WgpuGpu>, scene: &mut Scene) -> anyhow::Result<()>;

    /// Called every loop iteration before the scene is updated.
    fn on_update(&mut self, _ctx: &mut Context<WgpuGpu>, _scene: &mut Scene, _update: &UpdateContext) {}

    fn on_window_event(&mut self, _ctx: &mut Context<WgpuGpu>, _scene: &mut Scene, _event: &WindowEvent) {}
}

struct Running {
    window: Arc<Window>,
    ctx: Context<WgpuGpu>,
    scene: Scene,
}

struct App<F: GraphicsFlow> {
    config: AppConfig,
    flow: F,
    async_runtime: tokio::runtime::Runtime,
    running: Option<Running>,
    timer: FrameTimer,
    error: Option<anyhow::Error>,
}

impl<F: GraphicsFlow> App<F> {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<Running> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let gpu = self.async_runtime.block_on(WgpuGpu::new(Arc::clone(&window)))?;
        let mut ctx = Context::new(gpu, AssetLoader::with_defaults(self.config.asset_root.clone()))?;

        let size = window.inner_size();
        let mut scene = Scene::new(size.width, size.height);
        scene.clear_colour = self.config.clear_colour;
        self.flow.on_init(&mut ctx, &mut scene)?;

        Ok(Running { window, ctx, scene })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}

impl<F: GraphicsFlow> ApplicationHandler for App<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        self.flow.on_window_event(&mut running.ctx, &mut running.scene, &event);

        match event {
            WindowEvent::CloseRequested => {
                running.scene.release(&mut running.ctx.gpu);
                running.ctx.release();
                self.running = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Err(e) = running.scene.resize(&mut running.ctx.gpu, size.width, size.height) {
                    log::warn!("resize to {}x{} failed: {}", size.width, size.height, e);
                }
            }
            WindowEvent::RedrawRequested => {
                let tick = self.timer.tick();
                self.flow.on_update(&mut running.ctx, &mut running.scene, &tick.update);
                running.scene.update(&tick.update);
                if tick.render {
                    match running.scene.render(&mut running.ctx) {
                        Ok(()) => {}
                        Err(GpuError::Surface(e)) => log::warn!("skipping frame: {}", e),
                        Err(e) => {
                            self.fail(event_loop, e.into());
                            return;
                        }
                    }
                }
                running.window.request_redraw();
            }
            _ => {}
        }
    }
}

/// Open a window and drive `flow` until the window is closed.
pub fn run<F: GraphicsFlow>(config: AppConfig, flow: F) -> anyhow::Result<()> {
    let env = env_logger::Env::default().default_filter_or(config.log_filter.as_str());
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        log::warn!("Could not initialize logger: {}", e);
    }

    let async_runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        timer: FrameTimer::new(config.frame_interval),
        config,
        flow,
        async_runtime,
        running: None,
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_once_the_interval_elapsed() {
        let mut timer = FrameTimer::new(Duration::from_millis(10));
        let tick = timer.advance(Duration::from_millis(4));
        assert!(!tick.render);
        assert!((tick.update.delta_time - 0.004).abs() < 1e-6);

        let tick = timer.advance(Duration::from_millis(6));
        assert!(tick.render);
        assert!((tick.update.elapsed_time - 0.010).abs() < 1e-9);

        let tick = timer.advance(Duration::from_millis(1));
        assert!(!tick.render);
        assert!((tick.update.total_time - 0.011).abs() < 1e-9);
    }

    #[test]
    fn fps_counts_frames_per_second() {
        let mut timer = FrameTimer::new(Duration::from_millis(100));
        for _ in 0..9 {
            timer.advance(Duration::from_millis(100));
        }
        assert_eq!(timer.fps(), 0);
        let tick = timer.advance(Duration::from_millis(100));
        assert_eq!(tick.update.fps, 10);
    }

    #[test]
    fn default_config() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (1024, 768));
        assert_eq!(config.title, "dusk");
        assert_eq!(config.clear_colour, [0.0, 0.0, 0.0, 1.0]);
    }
}
