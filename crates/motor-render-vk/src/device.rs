// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection and logical device ownership.
//!
//! Selection works on [`DeviceProbe`]s: plain snapshots of what a physical
//! device reports against the target surface. Gathering probes is the only
//! part that talks to the driver.

use std::sync::Arc;

use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::{debug, error, info};

use crate::error::{RenderError, RenderResult, VkContext};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// The single family used for both rendering and presentation.
    pub fn shared_family(&self) -> RenderResult<u32> {
        match (self.graphics, self.present) {
            (Some(g), Some(p)) if g == p => Ok(g),
            (Some(graphics), Some(present)) => {
                Err(RenderError::UnsupportedQueueTopology { graphics, present })
            }
            (graphics, present) => Err(RenderError::IncompleteQueueFamilies { graphics, present }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilySupport {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub present: bool,
}

/// First family with graphics capability and, independently, the first the
/// surface accepts presentation from.
pub fn find_queue_families(families: &[QueueFamilySupport]) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if indices.graphics.is_none()
            && family.queue_count > 0
            && family.flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics = Some(i);
        }
        if indices.present.is_none() && family.present {
            indices.present = Some(i);
        }
    }
    indices
}

#[derive(Clone, Debug)]
pub struct DeviceProbe {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub name: String,
    pub queue_families: Vec<QueueFamilySupport>,
    pub has_swapchain_ext: bool,
    pub format_count: usize,
    pub present_mode_count: usize,
}

impl DeviceProbe {
    pub fn queue_indices(&self) -> QueueFamilyIndices {
        find_queue_families(&self.queue_families)
    }

    pub fn is_suitable(&self) -> bool {
        self.queue_indices().is_complete()
            && self.has_swapchain_ext
            && self.format_count > 0
            && self.present_mode_count > 0
    }
}

/// Immutable once selected.
#[derive(Clone, Debug)]
pub struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub name: String,
    pub queues: QueueFamilyIndices,
    pub queue_family: u32,
}

/// Picks among probed devices. No scoring: the last suitable one wins.
pub fn select_device(probes: &[DeviceProbe]) -> RenderResult<PhysicalDeviceInfo> {
    if probes.is_empty() {
        return Err(RenderError::NoDevices);
    }
    let chosen = probes
        .iter()
        .filter(|p| p.is_suitable())
        .last()
        .ok_or(RenderError::NoSuitableDevice(probes.len()))?;

    let queues = chosen.queue_indices();
    let queue_family = queues.shared_family()?;
    Ok(PhysicalDeviceInfo {
        handle: chosen.handle,
        properties: chosen.properties,
        name: chosen.name.clone(),
        queues,
        queue_family,
    })
}

unsafe fn probe_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> RenderResult<DeviceProbe> {
    let properties = instance.get_physical_device_properties(phys);
    let name = properties
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_owned());

    let mut queue_families = Vec::new();
    for (i, q) in instance
        .get_physical_device_queue_family_properties(phys)
        .iter()
        .enumerate()
    {
        let present = surface_loader
            .get_physical_device_surface_support(phys, i as u32, surface)
            .creating("get_physical_device_surface_support")?;
        queue_families.push(QueueFamilySupport {
            flags: q.queue_flags,
            queue_count: q.queue_count,
            present,
        });
    }

    let has_swapchain_ext = instance
        .enumerate_device_extension_properties(phys)
        .creating("enumerate_device_extension_properties")?
        .iter()
        .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == swapchain::NAME));
    let format_count = surface_loader
        .get_physical_device_surface_formats(phys, surface)
        .creating("get_physical_device_surface_formats")?
        .len();
    let present_mode_count = surface_loader
        .get_physical_device_surface_present_modes(phys, surface)
        .creating("get_physical_device_surface_present_modes")?
        .len();

    Ok(DeviceProbe {
        handle: phys,
        properties,
        name,
        queue_families,
        has_swapchain_ext,
        format_count,
        present_mode_count,
    })
}

pub unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> RenderResult<PhysicalDeviceInfo> {
    let devices = instance
        .enumerate_physical_devices()
        .creating("enumerate_physical_devices")?;

    let mut probes = Vec::with_capacity(devices.len());
    for phys in devices {
        let probe = probe_device(instance, surface_loader, surface, phys)?;
        let api = probe.properties.api_version;
        debug!(
            "found device: {} api {}.{}.{} driver {:#x} suitable={}",
            probe.name,
            vk::api_version_major(api),
            vk::api_version_minor(api),
            vk::api_version_patch(api),
            probe.properties.driver_version,
            probe.is_suitable()
        );
        probes.push(probe);
    }

    let info = select_device(&probes)?;
    info!(
        "physical device selected: {} (queue family {})",
        info.name, info.queue_family
    );
    Ok(info)
}

/// Owns the logical device and its single graphics/present queue. Dropping
/// it idles the device before destroying it.
pub struct LogicalDevice {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    queue_family: u32,
}

impl LogicalDevice {
    pub unsafe fn new(instance: &ash::Instance, phys: &PhysicalDeviceInfo) -> RenderResult<Self> {
        // Single queue, so priority is irrelevant.
        let priorities = [0.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: phys.queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };

        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };

        let device = instance
            .create_device(phys.handle, &dinfo, None)
            .creating("create_device")?;
        let queue = device.get_device_queue(phys.queue_family, 0);
        info!("logical device created");

        Ok(Self {
            device: Arc::new(device),
            queue,
            queue_family: phys.queue_family,
        })
    }

    #[inline]
    pub fn handle(&self) -> &Arc<ash::Device> {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn wait_idle(&self) -> RenderResult<()> {
        let result = unsafe { self.device.device_wait_idle() };
        result.waiting("device_wait_idle")
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            error!("{e} before device destruction");
        }
        unsafe { self.device.destroy_device(None) };
        debug!("logical device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn family(flags: vk::QueueFlags, present: bool) -> QueueFamilySupport {
        QueueFamilySupport {
            flags,
            queue_count: 1,
            present,
        }
    }

    fn probe(id: u64, families: Vec<QueueFamilySupport>) -> DeviceProbe {
        DeviceProbe {
            handle: vk::PhysicalDevice::from_raw(id),
            properties: vk::PhysicalDeviceProperties::default(),
            name: format!("gpu{id}"),
            queue_families: families,
            has_swapchain_ext: true,
            format_count: 2,
            present_mode_count: 1,
        }
    }

    fn capable(id: u64) -> DeviceProbe {
        probe(id, vec![family(vk::QueueFlags::GRAPHICS, true)])
    }

    #[test]
    fn first_matching_family_is_recorded() {
        let families = [
            family(vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            family(vk::QueueFlags::GRAPHICS, true),
            family(vk::QueueFlags::COMPUTE, true),
        ];
        let idx = find_queue_families(&families);
        assert_eq!(idx.graphics, Some(1));
        assert_eq!(idx.present, Some(2));
    }

    #[test]
    fn graphics_family_without_queues_is_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS, false);
        empty.queue_count = 0;
        let idx = find_queue_families(&[empty, family(vk::QueueFlags::GRAPHICS, true)]);
        assert_eq!(idx.graphics, Some(1));
    }

    #[test]
    fn shared_family_requires_equal_indices() {
        let same = QueueFamilyIndices {
            graphics: Some(2),
            present: Some(2),
        };
        assert_eq!(same.shared_family().unwrap(), 2);

        let split = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(1),
        };
        assert!(matches!(
            split.shared_family(),
            Err(RenderError::UnsupportedQueueTopology {
                graphics: 0,
                present: 1
            })
        ));

        let partial = QueueFamilyIndices {
            graphics: Some(0),
            present: None,
        };
        assert!(!partial.is_complete());
        assert!(matches!(
            partial.shared_family(),
            Err(RenderError::IncompleteQueueFamilies { .. })
        ));
    }

    #[test]
    fn suitability_needs_every_capability() {
        assert!(capable(1).is_suitable());

        let mut no_ext = capable(1);
        no_ext.has_swapchain_ext = false;
        assert!(!no_ext.is_suitable());

        let mut no_formats = capable(1);
        no_formats.format_count = 0;
        assert!(!no_formats.is_suitable());

        let mut no_modes = capable(1);
        no_modes.present_mode_count = 0;
        assert!(!no_modes.is_suitable());

        let no_present = probe(1, vec![family(vk::QueueFlags::GRAPHICS, false)]);
        assert!(!no_present.is_suitable());

        let no_graphics = probe(1, vec![family(vk::QueueFlags::COMPUTE, true)]);
        assert!(!no_graphics.is_suitable());
    }

    #[test]
    fn empty_device_list_fails() {
        let err = select_device(&[]).unwrap_err();
        assert!(matches!(err, RenderError::NoDevices));
    }

    #[test]
    fn no_suitable_device_fails() {
        let mut a = capable(1);
        a.has_swapchain_ext = false;
        let b = probe(2, vec![family(vk::QueueFlags::TRANSFER, true)]);
        let err = select_device(&[a, b]).unwrap_err();
        assert!(matches!(err, RenderError::NoSuitableDevice(2)));
    }

    #[test]
    fn last_suitable_device_wins() {
        let mut unsuitable = capable(3);
        unsuitable.format_count = 0;
        let picked = select_device(&[capable(1), capable(2), unsuitable]).unwrap();
        assert_eq!(picked.handle.as_raw(), 2);
        assert_eq!(picked.name, "gpu2");
        assert_eq!(picked.queue_family, 0);
    }

    #[test]
    fn split_families_on_chosen_device_fail() {
        let split = probe(
            7,
            vec![
                family(vk::QueueFlags::GRAPHICS, false),
                family(vk::QueueFlags::COMPUTE, true),
            ],
        );
        assert!(split.is_suitable());
        let err = select_device(&[split]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnsupportedQueueTopology {
                graphics: 0,
                present: 1
            }
        ));
    }
}
