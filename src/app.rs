//! Windowed runner: opens a window, drives the [`DeferredRenderer`] every
//! redraw and forwards events to a user [`SceneFlow`].

use std::sync::Arc;
use std::time::Duration;

use cgmath::Deg;
use instant::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use crate::camera::{Camera, Projection};
use crate::context::Context;
use crate::pipelines::gui::TimingOverlay;
use crate::pipelines::{DeferredRenderer, RendererConfig};
use crate::scene::Scene;

/// User hooks of a running application.
pub trait SceneFlow: 'static {
    /// Fills the scene once the GPU is ready. An error stops the event loop.
    fn on_init(
        &mut self,
        ctx: &mut Context,
        renderer: &mut DeferredRenderer,
        scene: &mut Scene,
        camera: &mut Camera,
    ) -> anyhow::Result<()>;

    fn on_update(&mut self, _scene: &mut Scene, _camera: &mut Camera, _dt: Duration) {}

    fn on_window_event(&mut self, _event: &WindowEvent, _renderer: &mut DeferredRenderer) {}
}

struct Running {
    ctx: Context,
    renderer: DeferredRenderer,
    scene: Scene,
    camera: Camera,
    projection: Projection,
    overlay: TimingOverlay,
}

struct App<F: SceneFlow> {
    flow: F,
    state: Option<Running>,
    last_time: Instant,
    show_timings: bool,
}

impl<F: SceneFlow> App<F> {
    fn start(&mut self, window: Arc<Window>) -> anyhow::Result<Running> {
        let mut ctx = futures::executor::block_on(Context::new(window))?;
        let (width, height) = (ctx.config.width, ctx.config.height);
        let mut renderer = DeferredRenderer::new(
            &mut ctx,
            RendererConfig {
                width,
                height,
                ..Default::default()
            },
        );
        let mut scene = Scene::new();
        let mut camera = Camera::new((0.0, 2.0, 8.0), Deg(-90.0), Deg(-10.0));
        self.flow.on_init(&mut ctx, &mut renderer, &mut scene, &mut camera)?;
        Ok(Running {
            projection: Projection::new(width, height, Deg(45.0), 0.1, 100.0),
            ctx,
            renderer,
            scene,
            camera,
            overlay: TimingOverlay::default(),
        })
    }
}

impl<F: SceneFlow> ApplicationHandler for App<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let window = match event_loop.create_window(Window::default_attributes().with_title("defer-ngin")) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Cannot create window: {e}");
                event_loop.exit();
                return;
            }
        };
        match self.start(window.clone()) {
            Ok(state) => {
                self.state = Some(state);
                self.last_time = Instant::now();
                window.request_redraw();
            }
            Err(e) => {
                log::error!("Initialisation failed: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };
        self.flow.on_window_event(&event, &mut state.renderer);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.ctx.resize(size.width, size.height);
                state.renderer.resize(&mut state.ctx, size.width, size.height);
                state.projection.resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed()
                    && event.logical_key == winit::keyboard::Key::Named(winit::keyboard::NamedKey::F1) =>
            {
                self.show_timings = !self.show_timings;
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                self.flow.on_update(&mut state.scene, &mut state.camera, dt);

                let overlay = self
                    .show_timings
                    .then_some(&mut state.overlay as &mut dyn crate::pipelines::gui::Overlay);
                state.renderer.render(
                    &mut state.ctx,
                    &mut state.scene,
                    &state.camera,
                    &state.projection,
                    overlay,
                );
                if let Some(window) = state.ctx.window() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Runs `flow` in a window until it is closed. F1 toggles the timing overlay.
pub fn run<F: SceneFlow>(flow: F) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }
    let event_loop = EventLoop::new()?;
    let mut app = App {
        flow,
        state: None,
        last_time: Instant::now(),
        show_timings: true,
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}
