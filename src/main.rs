use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use glam::Vec2;
use log::{debug, info, warn};
use pollster::block_on;
use rand::rngs::StdRng;
use rand::SeedableRng;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use portal_scene::frame::{CountingScheduler, NullSink};
use portal_scene::tunables::FIREFLIES_SIZE;
use portal_scene::{
    load_texture, AnimationLoop, BlockingAssetLoader, FrameScheduler, LoadEvent, LoadQueue,
    MouseButton, PointerEvent, Renderer, SceneConfig, SceneContext, SystemClock,
    ThreadedAssetLoader, Viewport,
};

const WINDOW_TITLE: &str = "Portal Scene";
const FIREFLIES_SIZE_STEP: f32 = 1.0;

/// Animated portal scene viewer.
#[derive(Debug, Parser)]
#[command(name = "portal-scene", version, about)]
struct Cli {
    /// Directory holding the model container and baked texture.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// JSON file overriding the scene defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the tunable registry and enable arrow-key nudging of the firefly size.
    #[arg(long)]
    debug: bool,

    /// Seed for the firefly field.
    #[arg(long)]
    seed: Option<u64>,

    /// Build and tick the scene without a window, then print a summary.
    #[arg(long)]
    summary_only: bool,

    /// Frames to run in summary mode.
    #[arg(long, default_value_t = 120)]
    frames: u32,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SceneConfig::from_json_file(path)?,
        None => SceneConfig::default(),
    };
    if let Some(dir) = &cli.assets {
        config.asset_dir = dir.clone();
    }
    let options = RunOptions {
        seed: cli.seed,
        debug: cli.debug,
        frames: cli.frames,
    };

    if cli.summary_only {
        return run_headless(config, &options);
    }
    match run_interactive(config.clone(), &options) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
            );
            run_headless(config, &options)
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Copy)]
struct RunOptions {
    seed: Option<u64>,
    debug: bool,
    frames: u32,
}

impl RunOptions {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

fn run_headless(config: SceneConfig, options: &RunOptions) -> Result<()> {
    let mut scene = SceneContext::new(
        config,
        Viewport::new(1280, 720, 1.0),
        &mut options.rng(),
        options.debug,
    );

    let queue = LoadQueue::new();
    scene.start_loading(&BlockingAssetLoader, queue.callback());

    let mut animation = AnimationLoop::new(SystemClock::new()).with_load_queue(queue);
    let mut sink = NullSink::default();
    let mut scheduler = CountingScheduler::default();
    // The first tick applies the load completion.
    for _ in 0..options.frames.max(1) {
        match animation.tick(&mut scene, &mut sink, &mut scheduler) {
            Ok(_) => {}
            Err(never) => match never {},
        }
    }
    println!("Ran {} frame(s)", animation.frames());

    match load_texture(&scene.config().texture_path(), false) {
        Ok(image) => println!("Baked texture: {}x{}", image.width, image.height),
        Err(err) => println!("Baked texture: unavailable ({err})"),
    }
    println!("{}", scene.summary());

    match scene.load_state().failure() {
        Some(reason) => Err(anyhow!("scene model failed to load: {reason}")),
        None => Ok(()),
    }
}

/// Messages delivered to the window loop from other threads.
enum HostEvent {
    AssetLoaded(LoadEvent),
}

fn run_interactive(config: SceneConfig, options: &RunOptions) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(|| {
        EventLoopBuilder::<HostEvent>::with_user_event().build()
    }));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let scale_factor = window.scale_factor();
    let logical = logical_size(window.inner_size(), scale_factor);
    let mut scene = SceneContext::new(
        config,
        Viewport::new(logical.width, logical.height, scale_factor),
        &mut options.rng(),
        options.debug,
    );

    let mut renderer = block_on(Renderer::new(Arc::clone(&window), &scene))?;
    scene.configure_surface(&mut renderer);
    info!(
        "window ready at {}x{} (scale factor {scale_factor})",
        logical.width, logical.height
    );

    let proxy = event_loop.create_proxy();
    scene.start_loading(&ThreadedAssetLoader, asset_callback(proxy));

    let mut app = AppState {
        window,
        renderer,
        scene,
        animation: AnimationLoop::new(SystemClock::new()),
        last_error: None,
    };
    app.refresh_title();
    app.window.request_redraw();

    event_loop.run(|event, target| {
        target.set_control_flow(ControlFlow::Wait);
        if let Err(err) = app.process_event(event, target) {
            app.last_error = Some(err);
            target.exit();
        }
    })?;

    match app.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn asset_callback(proxy: EventLoopProxy<HostEvent>) -> portal_scene::load::LoadCallback {
    Box::new(move |event| {
        if proxy.send_event(HostEvent::AssetLoaded(event)).is_err() {
            warn!("window closed before the model finished loading");
        }
    })
}

fn logical_size(size: PhysicalSize<u32>, scale_factor: f64) -> LogicalSize<u32> {
    size.to_logical(scale_factor)
}

struct AppState {
    window: Arc<Window>,
    renderer: Renderer,
    scene: SceneContext,
    animation: AnimationLoop<SystemClock>,
    last_error: Option<anyhow::Error>,
}

/// Schedules the next frame as a redraw of the window.
struct RedrawScheduler<'a>(&'a Window);

impl FrameScheduler for RedrawScheduler<'_> {
    fn request_frame(&mut self) {
        self.0.request_redraw();
    }
}

impl AppState {
    fn process_event(
        &mut self,
        event: Event<HostEvent>,
        target: &EventLoopWindowTarget<HostEvent>,
    ) -> Result<()> {
        match event {
            Event::UserEvent(HostEvent::AssetLoaded(load)) => {
                // Failures are recorded in the load state and shown in the title.
                let _ = self.scene.handle_load_event(load);
                self.refresh_title();
            }
            Event::WindowEvent { event, window_id } if window_id == self.renderer.window_id() => {
                self.process_window_event(event, target)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn process_window_event(
        &mut self,
        event: WindowEvent,
        target: &EventLoopWindowTarget<HostEvent>,
    ) -> Result<()> {
        match event {
            WindowEvent::CloseRequested => target.exit(),
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => self.resize(self.window.inner_size()),
            WindowEvent::CursorMoved { position, .. } => {
                let position = position.to_logical::<f32>(self.window.scale_factor());
                self.scene
                    .handle_pointer(&PointerEvent::Moved(Vec2::new(position.x, position.y)));
            }
            WindowEvent::CursorLeft { .. } => self.scene.handle_pointer(&PointerEvent::Left),
            WindowEvent::MouseInput { state, button, .. } => {
                let Some(button) = map_mouse_button(button) else {
                    return Ok(());
                };
                let event = match state {
                    ElementState::Pressed => PointerEvent::Pressed(button),
                    ElementState::Released => PointerEvent::Released(button),
                };
                self.scene.handle_pointer(&event);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                // Scrolling toward the user dollies out.
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y,
                    MouseScrollDelta::PixelDelta(position) => -position.y as f32,
                };
                self.scene.handle_pointer(&PointerEvent::Wheel { delta_y });
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::RedrawRequested => self.redraw()?,
            _ => {}
        }
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let scale_factor = self.window.scale_factor();
        let logical = logical_size(size, scale_factor);
        debug!(
            "resize to {}x{} logical ({}x{} physical)",
            logical.width, logical.height, size.width, size.height
        );
        self.scene
            .resize(logical.width, logical.height, scale_factor, &mut self.renderer);
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        let visible = self.scene.tunables().is_visible();
        let Some(delta) = fireflies_size_nudge(&event.logical_key, visible) else {
            return;
        };
        match self
            .scene
            .nudge_tunable(FIREFLIES_SIZE, delta, &mut self.renderer)
        {
            Ok(value) => info!("{FIREFLIES_SIZE} = {value:.3}"),
            Err(err) => warn!("{err}"),
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let mut scheduler = RedrawScheduler(&self.window);
        let result = self
            .animation
            .tick(&mut self.scene, &mut self.renderer, &mut scheduler);
        match result {
            Ok(_) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.renderer.reconfigure();
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("GPU is out of memory")),
            Err(wgpu::SurfaceError::Timeout) => {
                info!("Surface timeout; retrying next frame");
                Ok(())
            }
        }
    }

    fn refresh_title(&self) {
        let mut problems = Vec::new();
        if let Some(reason) = self.scene.load_state().failure() {
            problems.push(reason.to_string());
        }
        if let Some(reason) = self.renderer.texture_error() {
            problems.push(reason.to_string());
        }
        let title = if problems.is_empty() {
            if self.scene.load_state().is_pending() {
                format!("{WINDOW_TITLE} (loading)")
            } else {
                WINDOW_TITLE.to_string()
            }
        } else {
            format!("{WINDOW_TITLE} - error: {}", problems.join("; "))
        };
        self.window.set_title(&title);
    }
}

fn map_mouse_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    use winit::event::MouseButton as Winit;
    Some(match button {
        Winit::Left => MouseButton::LEFT,
        Winit::Right => MouseButton::RIGHT,
        Winit::Middle => MouseButton::MIDDLE,
        Winit::Back => MouseButton::new(3),
        Winit::Forward => MouseButton::new(4),
        Winit::Other(index) => MouseButton::new(u8::try_from(index).ok()?),
    })
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

/// Arrow keys adjust the fireflies' size while the tunable controls are shown.
fn fireflies_size_nudge(key: &Key, controls_visible: bool) -> Option<f32> {
    if !controls_visible {
        return None;
    }
    match key {
        Key::Named(NamedKey::ArrowUp) => Some(FIREFLIES_SIZE_STEP),
        Key::Named(NamedKey::ArrowDown) => Some(-FIREFLIES_SIZE_STEP),
        _ => None,
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}
