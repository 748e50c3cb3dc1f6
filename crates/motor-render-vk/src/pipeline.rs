// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;
use std::sync::Arc;

use ash::util::read_spv;
use ash::vk;
use tracing::info;

use crate::error::{RenderError, RenderResult, VkContext};
use crate::guard::{DeviceGuard, Guard};

const SHADER_ENTRY: &std::ffi::CStr = c"main";

static VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
static FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

/// Render pass, layout, pipeline and one framebuffer per swapchain view.
/// Field order is drop order.
pub struct PipelineObjects {
    framebuffers: Vec<DeviceGuard<vk::Framebuffer>>,
    pipeline: DeviceGuard<vk::Pipeline>,
    layout: DeviceGuard<vk::PipelineLayout>,
    render_pass: DeviceGuard<vk::RenderPass>,
}

impl PipelineObjects {
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        views: impl IntoIterator<Item = vk::ImageView>,
    ) -> RenderResult<Self> {
        let render_pass = create_render_pass(device, format)?;
        let layout = create_layout(device)?;
        let pipeline = create_pipeline(device, render_pass.handle(), layout.handle(), extent)?;
        let framebuffers = create_framebuffers(device, render_pass.handle(), extent, views)?;
        info!(
            "pipeline created: {:?}, {} framebuffer(s) at {}x{}",
            format,
            framebuffers.len(),
            extent.width,
            extent.height
        );
        Ok(Self {
            framebuffers,
            pipeline,
            layout,
            render_pass,
        })
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    pub fn framebuffers(&self) -> impl Iterator<Item = vk::Framebuffer> + '_ {
        self.framebuffers.iter().map(Guard::handle)
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

unsafe fn create_render_pass(
    device: &Arc<ash::Device>,
    format: vk::Format,
) -> RenderResult<DeviceGuard<vk::RenderPass>> {
    // single color attachment, cleared then handed to present
    let color_att = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let att_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &att_ref,
        ..Default::default()
    };
    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_att,
        subpass_count: 1,
        p_subpasses: &subpass,
        ..Default::default()
    };
    let rp = device
        .create_render_pass(&rp_info, None)
        .creating("create_render_pass")?;
    Ok(Guard::new(device.clone(), rp))
}

unsafe fn create_layout(device: &Arc<ash::Device>) -> RenderResult<DeviceGuard<vk::PipelineLayout>> {
    // no descriptor sets, no push constants
    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        ..Default::default()
    };
    let layout = device
        .create_pipeline_layout(&layout_info, None)
        .creating("create_pipeline_layout")?;
    Ok(Guard::new(device.clone(), layout))
}

unsafe fn create_shader_module(
    device: &Arc<ash::Device>,
    bytes: &[u8],
) -> RenderResult<DeviceGuard<vk::ShaderModule>> {
    let code = read_spv(&mut Cursor::new(bytes))?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    let module = device
        .create_shader_module(&ci, None)
        .creating("create_shader_module")?;
    Ok(Guard::new(device.clone(), module))
}

/// Viewport covering the whole extent, depth range [0, 1].
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

unsafe fn create_pipeline(
    device: &Arc<ash::Device>,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
) -> RenderResult<DeviceGuard<vk::Pipeline>> {
    // modules only need to live until the pipeline exists
    let vs = create_shader_module(device, VERT_SPV)?;
    let fs = create_shader_module(device, FRAG_SPV)?;

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs.handle(),
            p_name: SHADER_ENTRY.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs.handle(),
            p_name: SHADER_ENTRY.as_ptr(),
            ..Default::default()
        },
    ];

    // vertices come from gl_VertexIndex
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };

    let viewport = full_viewport(extent);
    let scissor = full_scissor(extent);
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let pipelines = device
        .create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        )
        .map_err(|(_, result)| RenderError::Creation {
            op: "create_graphics_pipelines",
            result,
        })?;
    let pipeline = pipelines
        .into_iter()
        .next()
        .ok_or(RenderError::Creation {
            op: "create_graphics_pipelines",
            result: vk::Result::ERROR_UNKNOWN,
        })?;
    Ok(Guard::new(device.clone(), pipeline))
}

unsafe fn create_framebuffers(
    device: &Arc<ash::Device>,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    views: impl IntoIterator<Item = vk::ImageView>,
) -> RenderResult<Vec<DeviceGuard<vk::Framebuffer>>> {
    let mut framebuffers = Vec::new();
    for view in views {
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: &view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        let fb = device
            .create_framebuffer(&fb_info, None)
            .creating("create_framebuffer")?;
        framebuffers.push(Guard::new(device.clone(), fb));
    }
    Ok(framebuffers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let vp = full_viewport(extent);
        assert_eq!((vp.x, vp.y), (0.0, 0.0));
        assert_eq!((vp.width, vp.height), (1280.0, 720.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));

        let sc = full_scissor(extent);
        assert_eq!((sc.offset.x, sc.offset.y), (0, 0));
        assert_eq!((sc.extent.width, sc.extent.height), (1280, 720));
    }

    #[test]
    fn embedded_shaders_are_valid_spirv() {
        for bytes in [VERT_SPV, FRAG_SPV] {
            let words = read_spv(&mut Cursor::new(bytes)).expect("spir-v");
            assert_eq!(words[0], 0x0723_0203);
        }
    }
}
