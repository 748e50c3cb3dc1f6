// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use motor_render::{RenderSettings, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info};

use crate::commands::CommandResources;
use crate::device::{pick_physical_device, LogicalDevice};
use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameScheduler, FrameSlot, VkFrameCycle};
use crate::instance::{
    create_debug_messenger, create_instance, create_surface, MessengerGuard, SurfaceGuard,
    VulkanInstance,
};
use crate::pipeline::PipelineObjects;
use crate::swapchain::{create_swapchain, DepthBuffer, SwapchainState};

/// Every per-image sequence must have one entry per swapchain image.
pub fn check_chain_lengths(
    images: usize,
    views: usize,
    framebuffers: usize,
    command_buffers: usize,
) -> RenderResult<()> {
    if images == views && views == framebuffers && framebuffers == command_buffers {
        Ok(())
    } else {
        Err(RenderError::ChainMismatch {
            images,
            views,
            framebuffers,
            command_buffers,
        })
    }
}

/// Vulkan backend. Fields are declared in reverse creation order, so the
/// default drop glue tears everything down after `Drop::drop` idles the
/// device.
pub struct VkRenderer {
    scheduler: FrameScheduler,
    frames: Vec<FrameSlot>,
    commands: CommandResources,
    pipeline: PipelineObjects,
    depth: Option<DepthBuffer>,
    swapchain: SwapchainState,
    device: LogicalDevice,
    messenger: Option<MessengerGuard>,
    surface: SurfaceGuard,
    instance: VulkanInstance,
}

impl VkRenderer {
    unsafe fn build(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> RenderResult<Self> {
        let (instance, validation) = create_instance(display, settings.validation)?;
        let messenger = if validation {
            Some(create_debug_messenger(&instance)?)
        } else {
            None
        };
        let surface = create_surface(&instance, window, display)?;

        let phys = pick_physical_device(instance.handle(), surface.owner(), surface.handle())?;
        let device = LogicalDevice::new(instance.handle(), &phys)?;

        let swapchain = create_swapchain(
            instance.handle(),
            device.handle(),
            surface.owner(),
            surface.handle(),
            phys.handle,
            settings.size,
        )?;
        let depth = if settings.depth_buffer {
            Some(DepthBuffer::new(
                instance.handle(),
                device.handle(),
                phys.handle,
                swapchain.extent(),
            )?)
        } else {
            None
        };

        let pipeline = PipelineObjects::new(
            device.handle(),
            swapchain.format(),
            swapchain.extent(),
            swapchain.views(),
        )?;
        let commands =
            CommandResources::new(device.handle(), device.queue_family(), swapchain.images().len())?;
        check_chain_lengths(
            swapchain.images().len(),
            swapchain.view_count(),
            pipeline.framebuffer_count(),
            commands.buffers().len(),
        )?;
        commands.record(&pipeline, swapchain.extent(), settings.clear_color)?;

        let frames = FrameSlot::create_all(device.handle(), settings.frames_in_flight)?;
        let scheduler = FrameScheduler::new(frames.len());

        info!(
            "vulkan renderer ready: {} image(s), {} frame(s) in flight, depth={}",
            swapchain.images().len(),
            frames.len(),
            depth.is_some()
        );

        Ok(Self {
            scheduler,
            frames,
            commands,
            pipeline,
            depth,
            swapchain,
            device,
            messenger,
            surface,
            instance,
        })
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.scheduler.frames_rendered()
    }

    /// Frame slot the next `render` call will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.scheduler.current_slot()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.swapchain.present_mode()
    }

    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.pipeline()
    }

    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        self.instance.handle()
    }

    #[inline]
    pub fn depth_buffer(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }

    #[inline]
    pub fn validation_enabled(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let built = unsafe { Self::build(window, display, settings) };
        built.context("vulkan renderer construction")
    }

    fn render(&mut self) -> Result<()> {
        let mut cycle = VkFrameCycle {
            device: self.device.handle(),
            queue: self.device.queue(),
            swapchain: &self.swapchain,
            command_buffers: self.commands.buffers(),
            slots: &self.frames,
        };
        self.scheduler.render_frame(&mut cycle)?;
        Ok(())
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        // nothing may be destroyed while frames are still in flight
        if let Err(e) = self.device.wait_idle() {
            error!("{e} during renderer teardown");
        }
        debug!(
            "vulkan renderer teardown after {} frame(s)",
            self.scheduler.frames_rendered()
        );
    }
}
