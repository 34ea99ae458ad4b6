// SPDX-License-Identifier: CEPL-1.0
//! Long-lived Vulkan objects: everything that outlives every swapchain
//! generation.

use std::ffi::{c_char, CStr, CString};

use anyhow::{anyhow, Context as _, Result};
#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::info;

use crate::surface::pick_depth_format;

#[cfg(debug_assertions)]
type DebugState = Option<vk::DebugUtilsMessengerEXT>;
#[cfg(not(debug_assertions))]
type DebugState = ();

pub struct Context {
    pub entry: Entry,
    pub instance: Instance,
    debug: DebugState,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,

    pub phys: vk::PhysicalDevice,
    pub graphics_family: u32,
    pub present_family: u32,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    pub swapchain_loader: swapchain::Device,
    pub cmd_pool: vk::CommandPool,
    pub depth_format: vk::Format,
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "{msg}");
    } else {
        tracing::debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Debug-utils extension and validation layer, each only if installed.
#[cfg(debug_assertions)]
unsafe fn debug_support(entry: &Entry) -> (bool, bool) {
    let ext = entry
        .enumerate_instance_extension_properties(None)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == ext_debug::NAME);
    let layer = entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
    (ext, layer)
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
    enabled: bool,
) -> Result<DebugState> {
    if !enabled {
        tracing::warn!("VK_EXT_debug_utils unavailable; validation messages not forwarded");
        return Ok(None);
    }
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    Ok(Some(loader.create_debug_utils_messenger(&ci, None)?))
}

#[cfg(not(debug_assertions))]
unsafe fn create_debug_messenger(
    _entry: &Entry,
    _instance: &Instance,
    _enabled: bool,
) -> Result<DebugState> {
    Ok(())
}

#[cfg(debug_assertions)]
unsafe fn destroy_debug_messenger(entry: &Entry, instance: &Instance, dbg: DebugState) {
    if let Some(dbg) = dbg {
        let loader = ext_debug::Instance::new(entry, instance);
        loader.destroy_debug_utils_messenger(dbg, None);
    }
}

#[cfg(not(debug_assertions))]
unsafe fn destroy_debug_messenger(_entry: &Entry, _instance: &Instance, _dbg: DebugState) {}

/// The instance, and whether the debug-utils extension was enabled on it.
unsafe fn create_instance(entry: &Entry, display_raw: RawDisplayHandle) -> Result<(Instance, bool)> {
    let app = CString::new("NeoWater")?;
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    #[allow(unused_mut)]
    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    #[allow(unused_mut)]
    let mut layers: Vec<*const c_char> = Vec::new();

    #[cfg(debug_assertions)]
    let debug_enabled = {
        let (ext, layer) = debug_support(entry);
        if ext {
            extensions.push(ext_debug::NAME.as_ptr());
        }
        if layer {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!("validation layer not installed");
        }
        ext
    };
    #[cfg(not(debug_assertions))]
    let debug_enabled = false;

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    Ok((entry.create_instance(&create_info, None)?, debug_enabled))
}

/// Graphics and present families for `phys`, preferring one family that
/// does both.
unsafe fn queue_families(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Option<(u32, u32)> {
    let props = instance.get_physical_device_queue_family_properties(phys);
    let presents = |i: u32| {
        surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false)
    };

    let mut graphics = None;
    let mut present = None;
    for (i, q) in props.iter().enumerate() {
        let i = i as u32;
        let is_graphics = q.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let can_present = presents(i);
        if is_graphics && can_present {
            return Some((i, i));
        }
        if is_graphics && graphics.is_none() {
            graphics = Some(i);
        }
        if can_present && present.is_none() {
            present = Some(i);
        }
    }
    graphics.zip(present)
}

unsafe fn supports_swapchain(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME)
}

unsafe fn pick_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32, u32)> {
    let mut fallback = None;
    for phys in instance.enumerate_physical_devices()? {
        if !supports_swapchain(instance, phys) {
            continue;
        }
        let Some((g, p)) = queue_families(instance, surface_loader, surface, phys) else {
            continue;
        };
        let props = instance.get_physical_device_properties(phys);
        if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            return Ok((phys, g, p));
        }
        fallback.get_or_insert((phys, g, p));
    }
    fallback.ok_or_else(|| anyhow!("no physical device can render to this surface"))
}

unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
) -> Result<ash::Device> {
    let priority = [1.0f32];
    let mut families = vec![graphics_family];
    if present_family != graphics_family {
        families.push(present_family);
    }
    let queue_infos: Vec<_> = families
        .iter()
        .map(|&family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priority.as_ptr(),
            ..Default::default()
        })
        .collect();

    let extensions = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    let ci = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    Ok(instance.create_device(phys, &ci, None)?)
}

impl Context {
    // STRICT ORDER:
    // 1) instance (WSI + debug extensions)
    // 2) surface from this instance
    // 3) physical device and families checked against this surface
    // 4) logical device, queues, pool
    pub unsafe fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window.window_handle().map_err(|e| anyhow!("{e}"))?.as_raw();

        let entry = Entry::linked();
        let (instance, debug_enabled) = create_instance(&entry, dh).context("create_instance")?;
        let debug = create_debug_messenger(&entry, &instance, debug_enabled)?;

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
            .context("ash_window::create_surface")?;

        let (phys, graphics_family, present_family) =
            pick_device(&instance, &surface_loader, surface)?;
        let props = instance.get_physical_device_properties(phys);
        let name = CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy();
        info!(
            device = %name,
            graphics_family,
            present_family,
            "selected physical device"
        );

        let depth_format = pick_depth_format(&instance, phys)
            .ok_or_else(|| anyhow!("no supported depth format"))?;

        let device = create_logical_device(&instance, phys, graphics_family, present_family)
            .context("create_device")?;
        let graphics_queue = device.get_device_queue(graphics_family, 0);
        let present_queue = device.get_device_queue(present_family, 0);
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: graphics_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let cmd_pool = device.create_command_pool(&pool_info, None)?;

        Ok(Self {
            entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            graphics_family,
            present_family,
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            cmd_pool,
            depth_format,
        })
    }

    /// Pool, device, debug messenger, surface, instance. Every child object
    /// must already be gone.
    pub unsafe fn destroy(&mut self) {
        self.device.destroy_command_pool(self.cmd_pool, None);
        self.device.destroy_device(None);
        destroy_debug_messenger(&self.entry, &self.instance, self.debug);
        self.surface_loader.destroy_surface(self.surface, None);
        self.instance.destroy_instance(None);
    }
}
