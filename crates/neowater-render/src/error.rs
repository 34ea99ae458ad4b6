// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

use crate::layout::ImageLayout;

/// How far a failure reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorScope {
    /// Collaborator misuse; the current frame is abandoned.
    Frame,
    /// The device can no longer be trusted; shut down.
    Process,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unsupported image layout transition {from:?} -> {to:?}")]
    UnsupportedTransition { from: ImageLayout, to: ImageLayout },

    #[error("fence wait timed out after {timeout_ns} ns (GPU hang?)")]
    FenceTimeout { timeout_ns: u64 },

    #[error("device lost")]
    DeviceLost,

    #[error("presentation failed: {0}")]
    Presentation(String),

    #[error("invalid render configuration: {0}")]
    InvalidConfig(String),

    #[error("no recorded command buffer for swapchain image {index}")]
    NotRecorded { index: usize },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl RenderError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            RenderError::UnsupportedTransition { .. }
            | RenderError::InvalidConfig(_)
            | RenderError::NotRecorded { .. } => ErrorScope::Frame,
            RenderError::FenceTimeout { .. }
            | RenderError::DeviceLost
            | RenderError::Presentation(_)
            | RenderError::Backend(_) => ErrorScope::Process,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
