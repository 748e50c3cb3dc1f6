// SPDX-License-Identifier: CEPL-1.0
//! Binds one concrete backend to the [`Renderer`] interface at startup.

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;
use tracing::info;

use crate::{RenderSettings, Renderer};

pub type RendererFactory = fn(
    &dyn HasWindowHandle,
    &dyn HasDisplayHandle,
    &RenderSettings,
) -> Result<Box<dyn Renderer>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("backend '{current}' already bound; refusing to bind '{rejected}'")]
    AlreadyBound {
        current: &'static str,
        rejected: &'static str,
    },
    #[error("no rendering backend has been bound")]
    NotBound,
    #[error("unknown rendering backend '{0}'")]
    UnknownBackend(String),
}

fn construct<R: Renderer + 'static>(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    settings: &RenderSettings,
) -> Result<Box<dyn Renderer>> {
    Ok(Box::new(R::new(window, display, settings)?))
}

#[derive(Default)]
pub struct RendererRegistry {
    bound: Option<(&'static str, RendererFactory)>,
}

impl RendererRegistry {
    pub const fn new() -> Self {
        Self { bound: None }
    }

    pub fn bind<R: Renderer + 'static>(&mut self, name: &'static str) -> Result<(), RegistryError> {
        self.bind_factory(name, construct::<R>)
    }

    pub fn bind_factory(
        &mut self,
        name: &'static str,
        factory: RendererFactory,
    ) -> Result<(), RegistryError> {
        if let Some((current, _)) = self.bound {
            return Err(RegistryError::AlreadyBound {
                current,
                rejected: name,
            });
        }
        info!("render backend bound: {name}");
        self.bound = Some((name, factory));
        Ok(())
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.bound.map(|(name, _)| name)
    }

    pub fn create(
        &self,
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> Result<Box<dyn Renderer>> {
        let (_, factory) = self.bound.ok_or(RegistryError::NotBound)?;
        factory(window, display, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{DisplayHandle, HandleError, WindowHandle};

    struct Headless;

    impl HasWindowHandle for Headless {
        fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl HasDisplayHandle for Headless {
        fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    struct Counting {
        frames: u32,
    }

    impl Renderer for Counting {
        fn new(
            _window: &dyn HasWindowHandle,
            _display: &dyn HasDisplayHandle,
            settings: &RenderSettings,
        ) -> Result<Self> {
            settings.validate()?;
            Ok(Counting { frames: 0 })
        }

        fn render(&mut self) -> Result<()> {
            self.frames += 1;
            Ok(())
        }
    }

    struct Other;

    impl Renderer for Other {
        fn new(
            _window: &dyn HasWindowHandle,
            _display: &dyn HasDisplayHandle,
            _settings: &RenderSettings,
        ) -> Result<Self> {
            Ok(Other)
        }

        fn render(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn create_without_binding_fails() {
        let reg = RendererRegistry::new();
        let err = reg
            .create(&Headless, &Headless, &RenderSettings::default())
            .err()
            .expect("unbound registry must fail");
        assert_eq!(
            err.downcast_ref::<RegistryError>(),
            Some(&RegistryError::NotBound)
        );
    }

    #[test]
    fn binds_once_and_creates() {
        let mut reg = RendererRegistry::new();
        reg.bind::<Counting>("counting").unwrap();
        assert_eq!(reg.backend_name(), Some("counting"));

        let mut r = reg
            .create(&Headless, &Headless, &RenderSettings::default())
            .unwrap();
        r.render().unwrap();
        r.render().unwrap();
    }

    #[test]
    fn second_bind_is_rejected_and_keeps_first() {
        let mut reg = RendererRegistry::new();
        reg.bind::<Counting>("counting").unwrap();
        assert_eq!(
            reg.bind::<Other>("other"),
            Err(RegistryError::AlreadyBound {
                current: "counting",
                rejected: "other",
            })
        );
        assert_eq!(reg.backend_name(), Some("counting"));
    }

    #[test]
    fn backend_construction_errors_propagate() {
        let mut reg = RendererRegistry::new();
        reg.bind::<Counting>("counting").unwrap();
        let bad = RenderSettings {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(reg.create(&Headless, &Headless, &bad).is_err());
    }
}
