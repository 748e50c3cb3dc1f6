// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device selection, swapchain, a fixed triangle pipeline,
//! prerecorded command buffers and an N-slot frame scheduler, composed by
//! [`VkRenderer`].
#![allow(clippy::missing_safety_doc)]

pub mod commands;
pub mod device;
mod error;
pub mod frame;
pub mod guard;
pub mod instance;
pub mod pipeline;
mod renderer;
pub mod swapchain;

pub use error::{ErrorKind, RenderError, RenderResult};
pub use renderer::{check_chain_lengths, VkRenderer};

/// Name this backend is registered under.
pub const BACKEND_NAME: &str = "vk";
