// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

mod registry;
pub use registry::{RegistryError, RendererFactory, RendererRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("frames_in_flight must be at least 1")]
    NoFramesInFlight,
    #[error("render size {width}x{height} has a zero dimension")]
    EmptyExtent { width: u32, height: u32 },
}

/// Construction-time knobs handed to a backend. `size` doubles as the
/// fallback extent when the surface leaves the choice to the application.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub size: RenderSize,
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
    pub depth_buffer: bool,
    pub validation: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            size: RenderSize {
                width: 800,
                height: 600,
            },
            clear_color: [0.6, 0.6, 0.6, 0.0],
            frames_in_flight: 2,
            depth_buffer: false,
            validation: false,
        }
    }
}

impl RenderSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.frames_in_flight == 0 {
            return Err(SettingsError::NoFramesInFlight);
        }
        if self.size.width == 0 || self.size.height == 0 {
            return Err(SettingsError::EmptyExtent {
                width: self.size.width,
                height: self.size.height,
            });
        }
        Ok(())
    }
}

/// A rendering backend. Construction acquires every GPU object it needs,
/// `render` draws and presents one frame, and dropping the value releases
/// everything in reverse order.
pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    fn render(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let s = RenderSettings::default();
        assert_eq!(s.frames_in_flight, 2);
        assert_eq!(s.size, RenderSize { width: 800, height: 600 });
        assert!(s.validate().is_ok());
    }

    #[test]
    fn zero_frames_in_flight_rejected() {
        let s = RenderSettings {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert_eq!(s.validate(), Err(SettingsError::NoFramesInFlight));
    }

    #[test]
    fn zero_dimension_rejected() {
        let s = RenderSettings {
            size: RenderSize { width: 640, height: 0 },
            ..Default::default()
        };
        assert_eq!(
            s.validate(),
            Err(SettingsError::EmptyExtent { width: 640, height: 0 })
        );
    }
}
