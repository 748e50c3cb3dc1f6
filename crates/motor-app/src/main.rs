// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::cell::Cell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Result;
use clap::Parser;
use motor_core::events::{AxisInput, DeviceType, Event, EventDispatcher, EventKind, InputState, KeyInput};
use motor_core::init_tracing;
use motor_platform::WindowOptions;
use motor_render::{RegistryError, RenderSettings, Renderer, RendererRegistry};
use motor_render_vk::{VkRenderer, BACKEND_NAME};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use motor_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); missing file means defaults
    #[arg(long, default_value = "motor.toml")]
    config: PathBuf,

    /// Rendering backend to bind
    #[arg(long, default_value = BACKEND_NAME)]
    backend: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
struct RenderCfg {
    clear_color: [f32; 4],
    frames_in_flight: usize,
    depth_buffer: bool,
    validation: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let s = RenderSettings::default();
        RenderCfg {
            clear_color: s.clear_color,
            frames_in_flight: s.frames_in_flight,
            depth_buffer: s.depth_buffer,
            validation: s.validation,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
struct AppCfg {
    window: WindowOptions,
    render: RenderCfg,
}

impl AppCfg {
    fn settings(&self) -> RenderSettings {
        RenderSettings {
            size: self.window.render_size(),
            clear_color: self.render.clear_color,
            frames_in_flight: self.render.frames_in_flight,
            depth_buffer: self.render.depth_buffer,
            validation: self.render.validation,
        }
    }
}

fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found; using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}

fn bind_backend(registry: &mut RendererRegistry, name: &str) -> Result<(), RegistryError> {
    match name {
        BACKEND_NAME => registry.bind::<VkRenderer>(BACKEND_NAME),
        other => Err(RegistryError::UnknownBackend(other.to_owned())),
    }
}

/// Maps a pixel coordinate onto [-1, 1] across `extent`.
fn normalize_axis(pos: f64, extent: u32) -> f32 {
    if extent == 0 {
        return 0.0;
    }
    (pos / extent as f64 * 2.0 - 1.0) as f32
}

struct App {
    cfg: AppCfg,
    registry: RendererRegistry,
    events: EventDispatcher,
    close_requested: Rc<Cell<bool>>,
    // renderer before window: the surface must go first
    renderer: Option<Box<dyn Renderer>>,
    window: Option<Window>,
    frames: u64,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, registry: RendererRegistry) -> Self {
        let close_requested = Rc::new(Cell::new(false));
        let mut events = EventDispatcher::new();

        let flag = close_requested.clone();
        events.register(EventKind::WindowClose, move |_| flag.set(true));
        events.register(EventKind::Input, |event| {
            if let Event::Input(state) = event {
                debug!(?state, "input");
            }
        });

        App {
            cfg,
            registry,
            events,
            close_requested,
            renderer: None,
            window: None,
            frames: 0,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.renderer = None;
        self.window = None;
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn create(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop.create_window(self.cfg.window.attributes())?;
        let renderer = self
            .registry
            .create(&window, &window, &self.cfg.settings())?;
        info!(
            "renderer ready: backend={} window=\"{}\"",
            self.registry.backend_name().unwrap_or("?"),
            self.cfg.window.title
        );
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn input(&mut self, state: InputState) {
        self.events.dispatch(&Event::Input(state));
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.fatal.is_some() {
            return;
        }
        if let Err(e) = self.create(event_loop) {
            self.fail(event_loop, e);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.events.dispatch(&Event::WindowClose);
                if self.close_requested.get() {
                    info!("close requested after {} frame(s)", self.frames);
                    self.renderer = None;
                    self.window = None;
                    event_loop.exit();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                self.input(InputState {
                    keys: vec![KeyInput {
                        device: DeviceType::Keyboard,
                        key: format!("{:?}", event.logical_key),
                        is_down: event.state == ElementState::Pressed,
                    }],
                    axes: Vec::new(),
                });
            }

            WindowEvent::CursorMoved { position, .. } => {
                let Some(size) = self.window.as_ref().map(Window::inner_size) else {
                    return;
                };
                self.input(InputState {
                    keys: Vec::new(),
                    axes: vec![
                        AxisInput::new(DeviceType::Mouse, 0, normalize_axis(position.x, size.width)),
                        AxisInput::new(DeviceType::Mouse, 1, normalize_axis(position.y, size.height)),
                    ],
                });
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render() {
                    Ok(()) => self.frames += 1,
                    Err(e) => self.fail(event_loop, e.context("render")),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let cfg = load_cfg(&args.config);
    let mut registry = RendererRegistry::new();
    bind_backend(&mut registry, &args.backend)?;

    let event_loop = EventLoop::new()?;
    let mut app = App::new(cfg, registry);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        let s = cfg.settings();
        assert_eq!(s, RenderSettings::default());
    }

    #[test]
    fn full_config_round_trips_into_settings() {
        let cfg = parse_cfg(
            r#"
            [window]
            title = "demo"
            width = 1024
            height = 768

            [render]
            clear_color = [0.0, 0.0, 0.0, 1.0]
            frames_in_flight = 3
            depth_buffer = true
            validation = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "demo");
        let s = cfg.settings();
        assert_eq!((s.size.width, s.size.height), (1024, 768));
        assert_eq!(s.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(s.frames_in_flight, 3);
        assert!(s.depth_buffer && s.validation);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_cfg("[render]\ndepth_buffer = true\n").unwrap();
        assert!(cfg.render.depth_buffer);
        assert_eq!(cfg.render.frames_in_flight, 2);
        assert_eq!(cfg.window, WindowOptions::default());
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(parse_cfg("[render]\nframes_in_flight = \"two\"\n").is_err());
        assert!(parse_cfg("not toml at all [").is_err());
    }

    #[test]
    fn missing_config_file_falls_back() {
        let cfg = load_cfg(Path::new("definitely/not/here/motor.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn only_the_vulkan_backend_is_known() {
        let mut reg = RendererRegistry::new();
        assert_eq!(
            bind_backend(&mut reg, "gl"),
            Err(RegistryError::UnknownBackend("gl".into()))
        );
        assert_eq!(reg.backend_name(), None);

        bind_backend(&mut reg, "vk").unwrap();
        assert_eq!(reg.backend_name(), Some("vk"));
        assert!(matches!(
            bind_backend(&mut reg, "vk"),
            Err(RegistryError::AlreadyBound { .. })
        ));
    }

    #[test]
    fn cursor_positions_normalize_to_unit_range() {
        assert_eq!(normalize_axis(0.0, 800), -1.0);
        assert_eq!(normalize_axis(400.0, 800), 0.0);
        assert_eq!(normalize_axis(800.0, 800), 1.0);
        assert_eq!(normalize_axis(10.0, 0), 0.0);
    }

    #[test]
    fn close_handler_sets_flag() {
        let mut app = App::new(AppCfg::default(), RendererRegistry::new());
        assert!(!app.close_requested.get());
        assert!(app.events.dispatch(&Event::WindowClose));
        assert!(app.close_requested.get());
    }
}
