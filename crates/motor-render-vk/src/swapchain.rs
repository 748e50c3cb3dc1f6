// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::khr::{surface, swapchain};
use ash::vk;
use motor_render::RenderSize;
use tracing::info;

use crate::error::{RenderError, RenderResult, VkContext};
use crate::guard::{DeviceGuard, Guard};

/// Used when the surface reports no format preference.
pub const FALLBACK_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RenderResult<vk::SurfaceFormatKHR> {
    let first = formats
        .first()
        .copied()
        .ok_or_else(|| RenderError::Unsupported("surface reports no formats".into()))?;
    if first.format == vk::Format::UNDEFINED {
        Ok(FALLBACK_FORMAT)
    } else {
        Ok(first)
    }
}

/// Mailbox when offered, otherwise FIFO (always available).
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// A `u32::MAX` current extent means the surface size follows the
/// swapchain; use the configured size clamped into the surface bounds.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, fallback: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: fallback
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: fallback
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 == no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&m| supported.contains(m))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// The presentable image chain. Images belong to the swapchain; views are
/// ours and go first on drop.
pub struct SwapchainState {
    views: Vec<DeviceGuard<vk::ImageView>>,
    swapchain: Guard<vk::SwapchainKHR, swapchain::Device>,
    images: Vec<vk::Image>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl SwapchainState {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain.handle()
    }

    #[inline]
    pub fn loader(&self) -> &swapchain::Device {
        self.swapchain.owner()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        self.views.iter().map(Guard::handle)
    }

    #[inline]
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

pub unsafe fn create_image_view(
    device: &Arc<ash::Device>,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> RenderResult<DeviceGuard<vk::ImageView>> {
    let iv_info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    let view = device
        .create_image_view(&iv_info, None)
        .creating("create_image_view")?;
    Ok(Guard::new(device.clone(), view))
}

pub unsafe fn create_swapchain(
    instance: &ash::Instance,
    device: &Arc<ash::Device>,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    fallback: RenderSize,
) -> RenderResult<SwapchainState> {
    let caps = surface_loader
        .get_physical_device_surface_capabilities(phys, surface)
        .creating("get_physical_device_surface_capabilities")?;
    let formats = surface_loader
        .get_physical_device_surface_formats(phys, surface)
        .creating("get_physical_device_surface_formats")?;
    let modes = surface_loader
        .get_physical_device_surface_present_modes(phys, surface)
        .creating("get_physical_device_surface_present_modes")?;

    let surf_format = choose_surface_format(&formats)?;
    let present_mode = choose_present_mode(&modes);
    let extent = choose_extent(&caps, fallback);
    let min_count = choose_image_count(&caps);

    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: min_count,
        image_format: surf_format.format,
        image_color_space: surf_format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        // graphics and present share one family
        image_sharing_mode: vk::SharingMode::EXCLUSIVE,
        pre_transform: caps.current_transform,
        composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
        present_mode,
        clipped: vk::TRUE,
        ..Default::default()
    };

    let loader = swapchain::Device::new(instance, device);
    let handle = loader
        .create_swapchain(&swap_info, None)
        .creating("create_swapchain")?;
    let swapchain = Guard::new(loader, handle);
    let images = swapchain
        .owner()
        .get_swapchain_images(handle)
        .creating("get_swapchain_images")?;

    let mut views = Vec::with_capacity(images.len());
    for &img in &images {
        views.push(create_image_view(
            device,
            img,
            surf_format.format,
            vk::ImageAspectFlags::COLOR,
        )?);
    }

    info!(
        "swapchain created: format {:?} / {:?}, present_mode {}, extent {}x{}, images {} (min {} → requested {})",
        surf_format.format,
        surf_format.color_space,
        pm_name(present_mode),
        extent.width,
        extent.height,
        images.len(),
        caps.min_image_count,
        min_count
    );

    Ok(SwapchainState {
        views,
        swapchain,
        images,
        format: surf_format.format,
        extent,
        present_mode,
    })
}

/// Linear tiling when the format can be a depth attachment that way,
/// otherwise optimal. `None` when neither works.
pub fn choose_depth_tiling(props: &vk::FormatProperties) -> Option<vk::ImageTiling> {
    let attachment = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    if props.linear_tiling_features.contains(attachment) {
        Some(vk::ImageTiling::LINEAR)
    } else if props.optimal_tiling_features.contains(attachment) {
        Some(vk::ImageTiling::OPTIMAL)
    } else {
        None
    }
}

/// First device-local memory type allowed by `type_bits`.
pub fn find_device_local_memory(
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
) -> RenderResult<u32> {
    (0..mem_props.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && mem_props.memory_types[i as usize]
                    .property_flags
                    .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
        })
        .ok_or(RenderError::NoDeviceLocalMemory { type_bits })
}

/// Fixed-size depth target, independent of the swapchain image count.
pub struct DepthBuffer {
    view: DeviceGuard<vk::ImageView>,
    image: DeviceGuard<vk::Image>,
    // memory outlives the image bound to it
    memory: DeviceGuard<vk::DeviceMemory>,
    tiling: vk::ImageTiling,
}

impl DepthBuffer {
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &Arc<ash::Device>,
        phys: vk::PhysicalDevice,
        extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let props = instance.get_physical_device_format_properties(phys, DEPTH_FORMAT);
        let tiling = choose_depth_tiling(&props).ok_or_else(|| {
            RenderError::Unsupported(format!("{DEPTH_FORMAT:?} as a depth attachment"))
        })?;

        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: DEPTH_FORMAT,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = Guard::new(
            device.clone(),
            device.create_image(&img_ci, None).creating("create_image(depth)")?,
        );

        let mem_req = device.get_image_memory_requirements(image.handle());
        let mem_props = instance.get_physical_device_memory_properties(phys);
        let memory_type_index = find_device_local_memory(&mem_props, mem_req.memory_type_bits)?;
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: mem_req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = Guard::new(
            device.clone(),
            device
                .allocate_memory(&alloc, None)
                .creating("allocate_memory(depth)")?,
        );
        device
            .bind_image_memory(image.handle(), memory.handle(), 0)
            .creating("bind_image_memory(depth)")?;

        let view = create_image_view(device, image.handle(), DEPTH_FORMAT, vk::ImageAspectFlags::DEPTH)?;
        info!(
            "depth buffer created: {:?} {:?} {}x{}",
            DEPTH_FORMAT, tiling, extent.width, extent.height
        );

        Ok(Self {
            view,
            image,
            memory,
            tiling,
        })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.handle()
    }

    #[inline]
    pub fn tiling(&self) -> vk::ImageTiling {
        self.tiling
    }
}
