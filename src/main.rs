// =============================================================================
// HEARTH RENDERER - Demo application driving the Vulkan backend
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, input, redraw requests)              │
// │    └── EventBus (resize / key / quit routing)                   │
// │          └── Renderer frontend (RenderPacket per frame)         │
// │                └── VulkanBackend (begin / update / end frame)   │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. winit delivers window events, translated into bus events
// 2. Resize events are cached by the backend, applied on the next frame
// 3. RedrawRequested builds a RenderPacket from the orbiting camera
// 4. Renderer::draw_frame runs begin_frame → update_global_state → end_frame
//
// =============================================================================

use anyhow::Result;
use glam::{Mat4, Vec3, Vec4};
use hearth_renderer::config::Config;
use hearth_renderer::event::{Event, EventBus, EventCode, ListenerId};
use hearth_renderer::renderer::{RenderPacket, Renderer};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

const KEY_ESCAPE: u32 = 0x1B;
const KEY_SPACE: u32 = 0x20;
const KEY_ENTER: u32 = 0x0D;

const APP_LISTENER: ListenerId = ListenerId(1);

const CONFIG_PATH: &str = "config.toml";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml; problems are reported once logging is up
    let (config, config_error) = Config::load_or_default(CONFIG_PATH);

    init_logging(&config);
    if let Some(e) = config_error {
        log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e);
    }

    log::info!("Starting Hearth renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging. RUST_LOG wins over the configured level.
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let level = config.log_filter();
    let mut builder = Builder::new();
    builder.filter_level(level.unwrap_or(log::LevelFilter::Info));
    builder.parse_default_env();
    builder.init();

    if level.is_none() {
        log::warn!("Unknown log level '{}', defaulting to info", config.debug.log_level);
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// What event listeners are allowed to touch.
struct Frontend {
    renderer: Renderer,
    running: bool,
    /// Toggled with space; stops the camera orbit
    paused: bool,
}

/// IMPORTANT: Field order matters for Drop! The renderer (inside `frontend`)
/// must be destroyed before the window its surface was created from.
struct App {
    config: Config,
    bus: EventBus<Frontend>,
    frontend: Frontend,
    window: Option<Arc<Window>>,

    // ─────────────────────────────────────────────────────────────────────────
    // TIMING
    // ─────────────────────────────────────────────────────────────────────────
    start_time: Instant,
    orbit_time: f32,
    last_frame_time: Instant,
    last_fps_update: Instant,
    frames_since_update: u32,
}

impl App {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            bus: create_event_bus(),
            frontend: Frontend {
                renderer: Renderer::default(),
                running: true,
                paused: false,
            },
            window: None,
            start_time: now,
            orbit_time: 0.0,
            last_frame_time: now,
            last_fps_update: now,
            frames_since_update: 0,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_renderer(&mut self, window: &Window) -> Result<()> {
        let size = window.inner_size();
        let renderer = Renderer::initialize(
            &self.config.window.title,
            size.width,
            size.height,
            window,
            self.config.backend_config(),
        )?;
        self.frontend.renderer = renderer;
        Ok(())
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    fn render_frame(&mut self) -> Result<bool> {
        let now = Instant::now();
        let delta_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        if !self.frontend.paused {
            self.orbit_time += delta_time;
        }

        let aspect = self
            .window
            .as_ref()
            .map(|window| {
                let size = window.inner_size();
                size.width.max(1) as f32 / size.height.max(1) as f32
            })
            .unwrap_or(1.0);

        let packet = build_packet(delta_time, self.orbit_time, aspect);
        let drawn = self.frontend.renderer.draw_frame(&packet)?;
        Ok(drawn)
    }

    fn fire(&mut self, event: Event) {
        self.bus.fire(&event, &mut self.frontend);
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        let now = Instant::now();
        self.frames_since_update += 1;

        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frames_since_update as f32 / elapsed;
            if let Some(ref window) = self.window {
                window.set_title(&format!("{} - {:.0} FPS", self.config.window.title, fps));
            }
            log::debug!(
                "{:.0} FPS, {:.1}s since start",
                fps,
                now.duration_since(self.start_time).as_secs_f32()
            );

            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}

/// Orbiting camera looking at the origin.
fn build_packet(delta_time: f32, orbit_time: f32, aspect: f32) -> RenderPacket {
    let radius = 10.0;
    let angle = orbit_time * 0.5;
    let eye = Vec3::new(angle.cos() * radius, 3.0, angle.sin() * radius);

    RenderPacket {
        delta_time,
        projection: Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 1000.0),
        view: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
        view_position: eye,
        ambient_color: Vec4::new(0.25, 0.25, 0.25, 1.0),
        mode: 0,
    }
}

fn key_code(key: KeyCode) -> Option<u32> {
    match key {
        KeyCode::Escape => Some(KEY_ESCAPE),
        KeyCode::Space => Some(KEY_SPACE),
        KeyCode::Enter => Some(KEY_ENTER),
        _ => None,
    }
}

fn create_event_bus() -> EventBus<Frontend> {
    let mut bus = EventBus::new();

    bus.register(EventCode::Quit, APP_LISTENER, |_, frontend: &mut Frontend| {
        log::info!("Quit requested, shutting down...");
        frontend.running = false;
        true
    });

    bus.register(EventCode::Resized, APP_LISTENER, |event, frontend: &mut Frontend| {
        if let Event::Resized { width, height } = *event {
            frontend.renderer.on_resized(width, height);
        }
        false
    });

    bus.register(EventCode::KeyPressed, APP_LISTENER, |event, frontend: &mut Frontend| {
        match *event {
            Event::KeyPressed { key_code: KEY_ESCAPE } => {
                log::info!("ESC pressed, exiting...");
                frontend.running = false;
                true
            }
            Event::KeyPressed { key_code: KEY_SPACE } => {
                frontend.paused = !frontend.paused;
                log::info!("Camera {}", if frontend.paused { "paused" } else { "resumed" });
                true
            }
            _ => false,
        }
    });

    bus
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_renderer(&window) {
            log::error!("Failed to initialize renderer: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let Err(e) = self.frontend.renderer.wait_idle() {
            log::warn!("Device wait on suspend failed: {}", e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.fire(Event::Quit),

            // Zero sizes (minimized) are forwarded too; the backend skips
            // frames until the window has an area again
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.fire(Event::Resized {
                    width: size.width,
                    height: size.height,
                });
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                    self.frontend.running = false;
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if let Some(key_code) = key_code(key) {
                        if event.state.is_pressed() {
                            self.fire(Event::KeyPressed { key_code });
                        } else {
                            self.fire(Event::KeyReleased { key_code });
                        }
                    }
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.fire(Event::MouseMoved {
                    x: position.x,
                    y: position.y,
                });
            }

            _ => {}
        }

        if !self.frontend.running {
            event_loop.exit();
        }
    }

    /// Request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer...");
        self.bus.clear();
        self.frontend.renderer.shutdown();
        log::info!("Cleanup complete");
    }
}
