//! Vulkan instance creation and physical device selection.

use std::ffi::{c_char, c_void, CStr, CString};

use ash::vk;

use crate::error::{GpuError, Result};
use crate::vulkan::QueueFamilies;

/// Validation layers to enable when requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Device extensions the presenter cannot run without.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![ash::khr::swapchain::NAME]
}

/// Create a Vulkan instance.
///
/// `window_extensions` are the surface extensions the window system needs,
/// as reported by `ash_window::enumerate_required_extensions`. Returns the
/// instance and whether validation ended up enabled; `VK_EXT_debug_utils`
/// is only requested in that case.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    window_extensions: &[*const c_char],
) -> Result<(ash::Instance, bool)> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"swapline")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_1);

    let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };
    tracing::debug!("{} instance extensions available", available_extensions.len());
    for props in &available_extensions {
        if let Ok(name) = props.extension_name_as_c_str() {
            tracing::debug!("  {}", name.to_string_lossy());
        }
    }

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    // Missing layers are reported but not fatal
    let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == *layer));
            if !found {
                tracing::warn!("Validation layer {} not available", layer.to_string_lossy());
            }
            found
        })
        .collect();
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
    let validation = !layers.is_empty();

    let mut extension_names = window_extensions.to_vec();
    if validation {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    // Chained so instance creation and destruction are reported too
    let mut messenger_info = debug_messenger_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);
    if validation {
        create_info = create_info.push_next(&mut messenger_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok((instance, validation))
}

/// Validation output routed into `tracing`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Install the messenger on `instance`.
    ///
    /// # Safety
    /// The instance must have been created with `VK_EXT_debug_utils`.
    pub unsafe fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger =
            unsafe { loader.create_debug_utils_messenger(&debug_messenger_info(), None)? };
        tracing::debug!("Debug messenger installed");
        Ok(Self { loader, messenger })
    }

    /// Destroy the messenger. Must run before the instance is destroyed.
    ///
    /// # Safety
    /// Must be called exactly once, while the instance is still alive.
    pub unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.messenger, None) };
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Log level for a validation message of `severity`.
pub fn message_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> tracing::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::TRACE
    }
}

fn message_kind(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// # Safety
/// Called by the Vulkan loader with valid callback data or null.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let message = unsafe { (*p_callback_data).message_as_c_str() }
        .map_or_else(|| "(no message)".into(), CStr::to_string_lossy);
    let kind = message_kind(message_type);

    match message_level(message_severity) {
        tracing::Level::ERROR => tracing::error!(target: "vulkan", kind, "{message}"),
        tracing::Level::WARN => tracing::warn!(target: "vulkan", kind, "{message}"),
        tracing::Level::DEBUG => tracing::debug!(target: "vulkan", kind, "{message}"),
        _ => tracing::trace!(target: "vulkan", kind, "{message}"),
    }

    vk::FALSE
}

/// Select the best physical device that can present to `surface`.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let mut best = None;
    let mut best_score = -1i32;

    for device in devices {
        let Some(families) =
            (unsafe { find_queue_families(instance, surface_loader, device, surface) })
        else {
            continue;
        };
        let score = unsafe { score_physical_device(instance, device) };
        if score > best_score {
            best_score = score;
            best = Some((device, families));
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

/// Find a graphics family and a family that can present to `surface`.
///
/// A family that does both is preferred.
///
/// # Safety
/// The instance, physical device and surface must be valid.
pub unsafe fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Option<QueueFamilies> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut graphics = None;
    let mut present = None;

    for (index, family) in (0u32..).zip(queue_families.iter()) {
        let supports_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let supports_present = unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .unwrap_or(false)
        };

        if supports_graphics && supports_present {
            return Some(QueueFamilies {
                graphics: index,
                present: index,
            });
        }
        if supports_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if supports_present && present.is_none() {
            present = Some(index);
        }
    }

    Some(QueueFamilies {
        graphics: graphics?,
        present: present?,
    })
}

/// Score a physical device for selection. Negative means unusable.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i32 {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return -1;
    };
    let has_required = required_device_extensions().iter().all(|required| {
        extensions
            .iter()
            .any(|props| props.extension_name_as_c_str().is_ok_and(|name| name == *required))
    });
    if !has_required {
        return -1;
    }

    let properties = unsafe { instance.get_physical_device_properties(device) };
    let mut score = 0;

    // Prefer discrete GPUs
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 50,
        _ => {}
    }

    // Prefer more VRAM
    let memory = unsafe { instance.get_physical_device_memory_properties(device) };
    let vram_gb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024 * 1024))
        .sum();
    score += i32::try_from(vram_gb).unwrap_or(i32::MAX / 2).min(1000);

    score
}
