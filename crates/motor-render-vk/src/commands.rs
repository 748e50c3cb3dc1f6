// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RenderResult, VkContext};
use crate::guard::{DeviceGuard, Guard};
use crate::pipeline::PipelineObjects;

/// Vertices drawn per frame; positions live in the vertex shader.
pub const TRIANGLE_VERTICES: u32 = 3;

/// One pool on the graphics family and one primary buffer per swapchain
/// image. Buffers are freed before the pool goes.
pub struct CommandResources {
    buffers: Vec<vk::CommandBuffer>,
    pool: DeviceGuard<vk::CommandPool>,
}

impl CommandResources {
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        queue_family: u32,
        image_count: usize,
    ) -> RenderResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let pool = Guard::new(
            device.clone(),
            device
                .create_command_pool(&pool_info, None)
                .creating("create_command_pool")?,
        );
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool.handle(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: image_count as u32,
            ..Default::default()
        };
        let buffers = device
            .allocate_command_buffers(&alloc_info)
            .creating("allocate_command_buffers")?;
        info!("command buffers allocated: {}", buffers.len());
        Ok(Self { buffers, pool })
    }

    #[inline]
    pub fn buffers(&self) -> &[vk::CommandBuffer] {
        &self.buffers
    }

    /// Records the static frame into every buffer: clear, bind, one draw.
    pub unsafe fn record(
        &self,
        pipeline: &PipelineObjects,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        let device = self.pool.owner();
        let clears = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        // chain lengths are checked by the caller before recording
        for (&cmd, framebuffer) in self.buffers.iter().zip(pipeline.framebuffers()) {
            // resubmitted while an earlier submission may still be pending
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
                ..Default::default()
            };
            device
                .begin_command_buffer(cmd, &begin)
                .creating("begin_command_buffer")?;

            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: pipeline.render_pass(),
                framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline());
            device.cmd_draw(cmd, TRIANGLE_VERTICES, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .creating("end_command_buffer")?;
        }
        info!("command buffers recorded: {}", self.buffers.len());
        Ok(())
    }
}

impl Drop for CommandResources {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            unsafe {
                self.pool
                    .owner()
                    .free_command_buffers(self.pool.handle(), &self.buffers)
            };
            debug!("command buffers freed: {}", self.buffers.len());
        }
    }
}
