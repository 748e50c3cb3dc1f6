// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use motor_render::RenderSize;
use serde::Deserialize;
use winit::{dpi::PhysicalSize, window::WindowAttributes};

/// What the engine asks of its window. `width`/`height` are frame-buffer
/// pixels, not logical points.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowOptions {
    fn default() -> Self {
        WindowOptions {
            title: "motor".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

impl WindowOptions {
    pub fn attributes(&self) -> WindowAttributes {
        WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(false)
    }

    pub fn render_size(&self) -> RenderSize {
        RenderSize {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_size_never_zero() {
        let opts = WindowOptions {
            width: 0,
            height: 0,
            ..Default::default()
        };
        assert_eq!(opts.render_size(), RenderSize { width: 1, height: 1 });
    }

    #[test]
    fn defaults_match_fallback_resolution() {
        let opts = WindowOptions::default();
        assert_eq!(opts.title, "motor");
        assert_eq!(opts.render_size(), RenderSize { width: 800, height: 600 });
    }
}
