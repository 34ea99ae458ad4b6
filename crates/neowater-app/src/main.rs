// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use neowater_core::init_tracing;
use neowater_platform::SurfaceState;
use neowater_render::{ErrorScope, RenderError, RenderSize, Renderer};
use neowater_render_vk::VkRenderer;
use tracing::{error, info};

use neowater_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::{load_cfg, AppCfg, Args};

struct App {
    window: Option<Window>,
    renderer: Option<VkRenderer>,
    surface: SurfaceState,

    cfg: AppCfg,
    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,
    next_frame_deadline: Option<Instant>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        Self {
            window: None,
            renderer: None,
            surface: SurfaceState::new(1, 1),
            cfg,
            exiting: false,
            frames: 0,
            last_fps_instant: Instant::now(),
            next_frame_deadline: None,
        }
    }

    fn render_size(&self) -> RenderSize {
        let (width, height) = self.surface.size();
        RenderSize { width, height }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // Renderer first: it owns the surface created from this window.
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn request_redraw(&self) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}

/// Whether a process-level error was reported; frame-level ones never reach
/// the app.
fn is_fatal(e: &anyhow::Error) -> bool {
    e.downcast_ref::<RenderError>()
        .map_or(true, |r| r.scope() == ErrorScope::Process)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = match event_loop
                .create_window(Window::default_attributes().with_title("Neo Water"))
            {
                Ok(w) => w,
                Err(e) => {
                    error!("create_window failed: {e}");
                    self.shutdown(event_loop);
                    return;
                }
            };

            let size = window.inner_size();
            self.surface = SurfaceState::new(size.width, size.height);

            let renderer = VkRenderer::with_texture(
                &window,
                &window,
                self.render_size(),
                &self.cfg.render_config(),
                self.cfg.render.texture.as_deref(),
            );
            match renderer {
                Ok(r) => {
                    info!(
                        present_mode = ?self.cfg.render.present_mode,
                        frames_in_flight = self.cfg.render.frames_in_flight,
                        "renderer ready"
                    );
                    self.renderer = Some(r);
                    self.window = Some(window);
                }
                Err(e) => {
                    error!("vk init failed: {e:#}");
                    self.shutdown(event_loop);
                    return;
                }
            }
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        info!("resumed → paused={}", self.surface.paused());
        if !self.surface.paused() {
            self.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.surface.request_close();
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.surface.on_resized(new_size.width, new_size.height);
                if self.surface.take_resized() {
                    let size = self.render_size();
                    if let Some(r) = &mut self.renderer {
                        if let Err(e) = r.resize(size) {
                            error!("resize failed: {e:#}");
                        }
                    }
                    if !self.surface.paused() {
                        self.request_redraw();
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.surface.on_occluded(occluded);
                if !self.surface.paused() {
                    self.request_redraw();
                }
            }

            WindowEvent::Focused(focused) => {
                if self.surface.on_focused(focused) {
                    info!("Focused({})", focused);
                    if focused {
                        self.next_frame_deadline = None;
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.surface.paused() {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                match renderer.render() {
                    // count only frames that were actually submitted
                    Ok(()) => self.frames = self.frames.saturating_add(1),
                    Err(e) => {
                        error!("render error: {e:#}");
                        if is_fatal(&e) {
                            self.shutdown(event_loop);
                        }
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting || self.surface.should_close() {
            return;
        }

        if self.surface.paused() {
            // minimized or occluded → sleep until the next window event
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        let target_fps = if self.surface.focused() {
            0
        } else {
            self.cfg.unfocused_fps()
        };

        if target_fps == 0 {
            // The present mode paces us.
            event_loop.set_control_flow(ControlFlow::Wait);
            self.request_redraw();
        } else {
            let now = Instant::now();
            let frame_dt = Duration::from_nanos(1_000_000_000u64 / target_fps as u64);
            match self.next_frame_deadline {
                Some(t) if now < t => {
                    event_loop.set_control_flow(ControlFlow::WaitUntil(t));
                }
                _ => {
                    let next = now + frame_dt;
                    self.next_frame_deadline = Some(next);
                    event_loop.set_control_flow(ControlFlow::WaitUntil(next));
                    self.request_redraw();
                }
            }
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_cfg(&args.config);
    cfg.apply_args(&args);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_level_errors_are_not_fatal() {
        let frame = anyhow::Error::from(RenderError::NotRecorded { index: 1 });
        assert!(!is_fatal(&frame));
        let lost = anyhow::Error::from(RenderError::DeviceLost);
        assert!(is_fatal(&lost));
        assert!(is_fatal(&anyhow::anyhow!("surface gone")));
    }

    #[test]
    fn app_starts_unpaused_with_no_window() {
        let app = App::new(AppCfg::default());
        assert!(app.window.is_none());
        assert_eq!(app.render_size(), RenderSize { width: 1, height: 1 });
        assert!(!app.surface.paused());
    }
}
