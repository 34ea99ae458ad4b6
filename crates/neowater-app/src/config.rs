// SPDX-License-Identifier: CEPL-1.0
//! `neowater.toml` plus command-line overrides.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use neowater_render::{ClearValues, PresentMode, RenderConfig};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file; missing or malformed files fall back to defaults
    #[arg(long, default_value = "neowater.toml")]
    pub config: PathBuf,
    /// Frame slots in flight (overrides the config file)
    #[arg(long)]
    pub frames_in_flight: Option<usize>,
    /// Presentation mode (overrides the config file)
    #[arg(long, value_enum)]
    pub present_mode: Option<PresentModeCfg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
    Immediate,
}

impl From<PresentModeCfg> for PresentMode {
    fn from(m: PresentModeCfg) -> Self {
        match m {
            PresentModeCfg::Fifo => PresentMode::Fifo,
            PresentModeCfg::Mailbox => PresentMode::Mailbox,
            PresentModeCfg::Immediate => PresentMode::Immediate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnfocusedPolicy {
    None,
    #[default]
    Throttle,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: usize,
    #[serde(default)]
    pub texture: Option<PathBuf>,
    #[serde(default)]
    pub unfocused: UnfocusedPolicy,
    #[serde(default = "default_unfocused_fps")]
    pub unfocused_fps: u32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Mailbox,
            frames_in_flight: default_frames_in_flight(),
            texture: None,
            unfocused: UnfocusedPolicy::Throttle,
            unfocused_fps: default_unfocused_fps(),
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_frames_in_flight() -> usize {
    3
}
fn default_unfocused_fps() -> u32 {
    30
}

#[derive(Debug, Default, Deserialize)]
pub struct AppCfg {
    #[serde(default)]
    pub render: RenderCfg,
}

impl AppCfg {
    /// Command-line flags win over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(n) = args.frames_in_flight {
            self.render.frames_in_flight = n;
        }
        if let Some(m) = args.present_mode {
            self.render.present_mode = m;
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            frames_in_flight: self.render.frames_in_flight,
            present_mode: self.render.present_mode.into(),
            clear: ClearValues {
                color: self.render.clear_color,
                ..ClearValues::default()
            },
            ..RenderConfig::default()
        }
    }

    /// Target frame rate while unfocused; 0 means no cap.
    pub fn unfocused_fps(&self) -> u32 {
        match self.render.unfocused {
            UnfocusedPolicy::Throttle => self.render.unfocused_fps,
            UnfocusedPolicy::None => 0,
        }
    }
}

pub fn parse_cfg(s: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(s)
}

pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed config; using defaults");
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no config file; using defaults");
            AppCfg::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable config; using defaults");
            AppCfg::default()
        }
    }
}
