// SPDX-License-Identifier: CEPL-1.0
//! Frames in flight.
//!
//! Each call to [`FrameScheduler::render_frame`] runs one cycle on slot
//! `k mod N`: wait for the slot's fence, reset it, acquire an image
//! (signalling the slot's image-available semaphore), submit the image's
//! command buffer (waiting on image-available, signalling render-finished
//! and the fence), then present (waiting on render-finished).

use std::sync::Arc;

use ash::vk;
use tracing::{info, trace};

use crate::error::{RenderError, RenderResult, VkContext};
use crate::guard::{DeviceGuard, Guard};
use crate::swapchain::SwapchainState;

/// Synchronization objects owned by one frame-in-flight slot.
pub struct FrameSlot {
    in_flight: DeviceGuard<vk::Fence>,
    render_finished: DeviceGuard<vk::Semaphore>,
    image_available: DeviceGuard<vk::Semaphore>,
}

impl FrameSlot {
    pub unsafe fn new(device: &Arc<ash::Device>) -> RenderResult<Self> {
        let sem_ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        // signalled so the first use of the slot does not block
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let image_available = Guard::new(
            device.clone(),
            device
                .create_semaphore(&sem_ci, None)
                .creating("create_semaphore(image_available)")?,
        );
        let render_finished = Guard::new(
            device.clone(),
            device
                .create_semaphore(&sem_ci, None)
                .creating("create_semaphore(render_finished)")?,
        );
        let in_flight = Guard::new(
            device.clone(),
            device
                .create_fence(&fence_ci, None)
                .creating("create_fence(in_flight)")?,
        );
        Ok(Self {
            in_flight,
            render_finished,
            image_available,
        })
    }

    pub unsafe fn create_all(device: &Arc<ash::Device>, count: usize) -> RenderResult<Vec<Self>> {
        let slots = (0..count)
            .map(|_| Self::new(device))
            .collect::<RenderResult<Vec<_>>>()?;
        info!("sync objects created: {} frame slot(s)", slots.len());
        Ok(slots)
    }
}

/// The GPU side of one frame cycle, addressed by slot.
pub trait FrameCycle {
    fn wait_for_fence(&mut self, slot: usize) -> RenderResult<()>;
    fn reset_fence(&mut self, slot: usize) -> RenderResult<()>;
    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32>;
    fn submit(&mut self, slot: usize, image: u32) -> RenderResult<()>;
    fn present(&mut self, slot: usize, image: u32) -> RenderResult<()>;
}

#[derive(Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    slot: usize,
    frames_rendered: u64,
}

impl FrameScheduler {
    /// `frames_in_flight` must be non-zero; settings validation guarantees it.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            slot: 0,
            frames_rendered: 0,
        }
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next call will use.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Runs one cycle and returns the presented image index. On error the
    /// slot does not advance.
    pub fn render_frame<C: FrameCycle>(&mut self, cycle: &mut C) -> RenderResult<u32> {
        let s = self.slot;

        cycle.wait_for_fence(s)?;
        cycle.reset_fence(s)?;
        let image = cycle.acquire_image(s)?;
        cycle.submit(s, image)?;
        cycle.present(s, image)?;

        trace!(slot = s, image, frame = self.frames_rendered, "frame presented");
        self.slot = (s + 1) % self.frames_in_flight;
        self.frames_rendered += 1;
        Ok(image)
    }
}

/// [`FrameCycle`] over the real queue and swapchain.
pub struct VkFrameCycle<'a> {
    pub device: &'a ash::Device,
    pub queue: vk::Queue,
    pub swapchain: &'a SwapchainState,
    pub command_buffers: &'a [vk::CommandBuffer],
    pub slots: &'a [FrameSlot],
}

impl VkFrameCycle<'_> {
    fn slot(&self, s: usize) -> &FrameSlot {
        &self.slots[s % self.slots.len()]
    }
}

impl FrameCycle for VkFrameCycle<'_> {
    fn wait_for_fence(&mut self, slot: usize) -> RenderResult<()> {
        let fence = self.slot(slot).in_flight.handle();
        let result = unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) };
        result.waiting("wait_for_fences")
    }

    fn reset_fence(&mut self, slot: usize) -> RenderResult<()> {
        let fence = self.slot(slot).in_flight.handle();
        let result = unsafe { self.device.reset_fences(&[fence]) };
        result.waiting("reset_fences")
    }

    fn acquire_image(&mut self, slot: usize) -> RenderResult<u32> {
        let sem = self.slot(slot).image_available.handle();
        let (index, suboptimal) = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                sem,
                vk::Fence::null(),
            )
        }
        .submitting("acquire_next_image")?;
        // no recreation path, so a stale swapchain is fatal
        if suboptimal {
            return Err(RenderError::Submission {
                op: "acquire_next_image",
                result: vk::Result::SUBOPTIMAL_KHR,
            });
        }
        Ok(index)
    }

    fn submit(&mut self, slot: usize, image: u32) -> RenderResult<()> {
        let cmd = *self
            .command_buffers
            .get(image as usize)
            .ok_or(RenderError::ImageOutOfRange {
                index: image,
                count: self.command_buffers.len(),
            })?;
        let s = self.slot(slot);
        let wait_sem = s.image_available.handle();
        let signal_sem = s.render_finished.handle();
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait_sem,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal_sem,
            ..Default::default()
        };
        let result = unsafe {
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit), s.in_flight.handle())
        };
        result.submitting("queue_submit")
    }

    fn present(&mut self, slot: usize, image: u32) -> RenderResult<()> {
        let wait_sem = self.slot(slot).render_finished.handle();
        let swapchain = self.swapchain.handle();
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait_sem,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image,
            ..Default::default()
        };
        let suboptimal = unsafe { self.swapchain.loader().queue_present(self.queue, &present) }
            .submitting("queue_present")?;
        if suboptimal {
            return Err(RenderError::Submission {
                op: "queue_present",
                result: vk::Result::SUBOPTIMAL_KHR,
            });
        }
        Ok(())
    }
}
