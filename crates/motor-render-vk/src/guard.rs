// SPDX-License-Identifier: CEPL-1.0
//! Scope-owning wrappers for Vulkan handles.
//!
//! A [`Guard`] pairs a handle with the object able to destroy it and
//! releases the handle on drop. Construction code keeps every freshly
//! created object in a guard local, so an early `?` return unwinds the
//! partial renderer in reverse creation order. Long-lived owners declare
//! their guard fields in reverse creation order for the same reason.

use std::sync::Arc;

use ash::khr::{surface, swapchain};
use ash::vk;

/// Knows how to release handles of type `H`.
pub trait Destroy<H> {
    /// # Safety
    /// `handle` must have been created through `self` and must no longer be
    /// in use by the GPU.
    unsafe fn destroy(&self, handle: H);
}

impl<H, D: Destroy<H> + ?Sized> Destroy<H> for Arc<D> {
    unsafe fn destroy(&self, handle: H) {
        (**self).destroy(handle)
    }
}

macro_rules! device_children {
    ($($handle:ty => $release:ident),* $(,)?) => {
        $(
            impl Destroy<$handle> for ash::Device {
                unsafe fn destroy(&self, handle: $handle) {
                    self.$release(handle, None);
                }
            }
        )*
    };
}

device_children! {
    vk::Semaphore => destroy_semaphore,
    vk::Fence => destroy_fence,
    vk::ImageView => destroy_image_view,
    vk::Image => destroy_image,
    vk::DeviceMemory => free_memory,
    vk::Framebuffer => destroy_framebuffer,
    vk::RenderPass => destroy_render_pass,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::Pipeline => destroy_pipeline,
    vk::ShaderModule => destroy_shader_module,
    vk::CommandPool => destroy_command_pool,
}

impl Destroy<vk::SwapchainKHR> for swapchain::Device {
    unsafe fn destroy(&self, handle: vk::SwapchainKHR) {
        self.destroy_swapchain(handle, None);
    }
}

impl Destroy<vk::SurfaceKHR> for surface::Instance {
    unsafe fn destroy(&self, handle: vk::SurfaceKHR) {
        self.destroy_surface(handle, None);
    }
}

impl Destroy<vk::DebugUtilsMessengerEXT> for ash::ext::debug_utils::Instance {
    unsafe fn destroy(&self, handle: vk::DebugUtilsMessengerEXT) {
        self.destroy_debug_utils_messenger(handle, None);
    }
}

pub struct Guard<H: Copy, D: Destroy<H>> {
    owner: D,
    handle: H,
}

/// Guard for a child of the logical device.
pub type DeviceGuard<H> = Guard<H, Arc<ash::Device>>;

impl<H: Copy, D: Destroy<H>> Guard<H, D> {
    pub fn new(owner: D, handle: H) -> Self {
        Self { owner, handle }
    }

    #[inline]
    pub fn handle(&self) -> H {
        self.handle
    }

    #[inline]
    pub fn owner(&self) -> &D {
        &self.owner
    }
}

impl<H: Copy, D: Destroy<H>> Drop for Guard<H, D> {
    fn drop(&mut self) {
        unsafe { self.owner.destroy(self.handle) }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records release order instead of talking to a driver.
    #[derive(Clone, Default)]
    pub(crate) struct Ledger(Rc<RefCell<Vec<&'static str>>>);

    impl Ledger {
        pub(crate) fn released(&self) -> Vec<&'static str> {
            self.0.borrow().clone()
        }
    }

    impl Destroy<&'static str> for Ledger {
        unsafe fn destroy(&self, handle: &'static str) {
            self.0.borrow_mut().push(handle);
        }
    }

    type Tracked = Guard<&'static str, Ledger>;

    // Field order mirrors the renderer: dependants first, device last.
    struct Stack {
        _sync: Tracked,
        _commands: Tracked,
        _framebuffers: Vec<Tracked>,
        _pipeline: Tracked,
        _depth: Option<Tracked>,
        _views: Vec<Tracked>,
        _swapchain: Tracked,
        _device: Tracked,
    }

    const CREATION_ORDER: [&str; 8] = [
        "device",
        "swapchain",
        "view",
        "depth",
        "pipeline",
        "framebuffer",
        "commands",
        "sync",
    ];

    fn build(ledger: &Ledger, fail_after: Option<usize>) -> Result<Stack, usize> {
        let step = |n: usize| match fail_after {
            Some(limit) if n >= limit => Err(n),
            _ => Ok(()),
        };
        let g = |name| Guard::new(ledger.clone(), name);

        step(0)?;
        let device = g("device");
        step(1)?;
        let swapchain = g("swapchain");
        step(2)?;
        let views = vec![g("view")];
        step(3)?;
        let depth = Some(g("depth"));
        step(4)?;
        let pipeline = g("pipeline");
        step(5)?;
        let framebuffers = vec![g("framebuffer")];
        step(6)?;
        let commands = g("commands");
        step(7)?;
        let sync = g("sync");
        step(8)?;

        Ok(Stack {
            _sync: sync,
            _commands: commands,
            _framebuffers: framebuffers,
            _pipeline: pipeline,
            _depth: depth,
            _views: views,
            _swapchain: swapchain,
            _device: device,
        })
    }

    #[test]
    fn guard_releases_on_drop() {
        let ledger = Ledger::default();
        {
            let g = Guard::new(ledger.clone(), "fence");
            assert_eq!(g.handle(), "fence");
            assert!(ledger.released().is_empty());
        }
        assert_eq!(ledger.released(), vec!["fence"]);
    }

    #[test]
    fn full_stack_tears_down_in_reverse_creation_order() {
        let ledger = Ledger::default();
        let stack = build(&ledger, None).unwrap_or_else(|n| panic!("failed at {n}"));
        drop(stack);

        let mut expected = CREATION_ORDER.to_vec();
        expected.reverse();
        assert_eq!(ledger.released(), expected);
    }

    #[test]
    fn aborted_construction_releases_dependants_before_device() {
        for fail_at in 1..CREATION_ORDER.len() {
            let ledger = Ledger::default();
            assert_eq!(build(&ledger, Some(fail_at)).err(), Some(fail_at));

            let mut expected = CREATION_ORDER[..fail_at].to_vec();
            expected.reverse();
            let released = ledger.released();
            assert_eq!(released, expected, "abort at step {fail_at}");
            assert_eq!(released.last(), Some(&"device"));
        }
    }

    #[test]
    fn abort_before_anything_exists_releases_nothing() {
        let ledger = Ledger::default();
        assert!(build(&ledger, Some(0)).is_err());
        assert!(ledger.released().is_empty());
    }
}
