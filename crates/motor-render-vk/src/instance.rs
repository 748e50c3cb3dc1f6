// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr};

use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, trace, warn};

use crate::error::{RenderError, RenderResult, VkContext};
use crate::guard::Guard;

const APP_NAME: &CStr = c"motor";
const ENGINE_NAME: &CStr = c"motor";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub type SurfaceGuard = Guard<vk::SurfaceKHR, surface::Instance>;
pub type MessengerGuard = Guard<vk::DebugUtilsMessengerEXT, debug_utils::Instance>;

/// Owns the loader entry and the instance; destroys the instance on drop.
/// Everything created from the instance must be gone by then.
pub struct VulkanInstance {
    instance: ash::Instance,
    entry: Entry,
}

impl VulkanInstance {
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe { self.instance.destroy_instance(None) };
        debug!("instance destroyed");
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "{msg}");
    } else {
        trace!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

unsafe fn validation_available(entry: &Entry) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER))
}

/// Creates the instance with the extensions the window's display requires.
/// Returns whether validation ended up enabled.
pub unsafe fn create_instance(
    display: &dyn HasDisplayHandle,
    want_validation: bool,
) -> RenderResult<(VulkanInstance, bool)> {
    let display_raw = display.display_handle()?.as_raw();
    let entry = Entry::linked();

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: 1,
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: 1,
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    let required = ash_window::enumerate_required_extensions(display_raw).map_err(|e| {
        RenderError::Unsupported(format!("surface extensions for this display: {e:?}"))
    })?;
    let mut extensions = required.to_vec();

    let validation = want_validation && validation_available(&entry);
    if want_validation && !validation {
        warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
    }
    if validation {
        extensions.push(debug_utils::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: if validation { layers.len() as u32 } else { 0 },
        pp_enabled_layer_names: if validation {
            layers.as_ptr()
        } else {
            std::ptr::null()
        },
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .creating("create_instance")?;
    info!(
        "instance created ({} extension(s), validation={validation})",
        extensions.len()
    );
    Ok((VulkanInstance { instance, entry }, validation))
}

pub unsafe fn create_debug_messenger(instance: &VulkanInstance) -> RenderResult<MessengerGuard> {
    let loader = debug_utils::Instance::new(instance.entry(), instance.handle());
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .creating("create_debug_utils_messenger")?;
    Ok(Guard::new(loader, messenger))
}

/// Surface must come from the same instance the device is later picked
/// against, or present support queries are meaningless.
pub unsafe fn create_surface(
    instance: &VulkanInstance,
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
) -> RenderResult<SurfaceGuard> {
    let dh = display.display_handle()?.as_raw();
    let wh = window.window_handle()?.as_raw();

    let loader = surface::Instance::new(instance.entry(), instance.handle());
    let surface = ash_window::create_surface(instance.entry(), instance.handle(), dh, wh, None)
        .creating("create_surface")?;
    info!("surface created");
    Ok(Guard::new(loader, surface))
}
