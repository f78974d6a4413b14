//! GPU context management.

use std::collections::HashSet;
use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{GpuError, Result};
use crate::instance::{
    create_instance, required_device_extensions, select_physical_device, DebugMessenger,
};
use crate::vulkan::{QueueFamilies, VulkanDevice};

/// Main GPU context: the device the presenter renders and presents with.
pub struct GpuContext {
    device: Arc<VulkanDevice>,
    device_name: String,
}

impl GpuContext {
    /// Shared handle to the device, for the presenter and pipeline.
    pub fn present_device(&self) -> Arc<VulkanDevice> {
        Arc::clone(&self.device)
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        self.device.device()
    }

    /// Name of the selected physical device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.device.queue_families()
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device().device_wait_idle()?;
        }
        Ok(())
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "swapline".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Create instance, surface and logical device for `window`.
    ///
    /// Everything created before a failure is destroyed again.
    pub fn build<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let window_extensions: &[*const c_char] =
            ash_window::enumerate_required_extensions(display.as_raw())
                .map_err(|e| GpuError::ExtensionNotSupported(e.to_string()))?;

        let (instance, validation) = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.enable_validation,
                window_extensions,
            )
        }?;

        let debug_messenger = if validation {
            match unsafe { DebugMessenger::new(&entry, &instance) } {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };
        let destroy_instance = |instance: &ash::Instance| unsafe {
            if let Some(messenger) = &debug_messenger {
                messenger.destroy();
            }
            instance.destroy_instance(None);
        };

        let surface = match unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        } {
            Ok(surface) => surface,
            Err(e) => {
                destroy_instance(&instance);
                return Err(GpuError::SurfaceCreation(e.to_string()));
            }
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let selected = unsafe { select_physical_device(&instance, &surface_loader, surface) }
            .and_then(|(physical_device, families)| {
                let device = unsafe { create_device(&instance, physical_device, families) }?;
                Ok((physical_device, families, device))
            });
        let (physical_device, queue_families, device) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                destroy_instance(&instance);
                return Err(e);
            }
        };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = properties
            .device_name_as_c_str()
            .map_or_else(|_| "unknown".to_string(), |n| n.to_string_lossy().into_owned());

        tracing::info!(
            "Selected GPU: {} (graphics family {}, present family {})",
            device_name,
            queue_families.graphics,
            queue_families.present
        );

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        Ok(GpuContext {
            device: Arc::new(VulkanDevice {
                entry,
                instance,
                debug_messenger,
                surface_loader,
                surface,
                physical_device,
                device,
                swapchain_loader,
                queue_families,
                graphics_queue,
                present_queue,
            }),
            device_name,
        })
    }
}

/// Create the logical device with one queue per unique family.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
) -> Result<ash::Device> {
    let mut unique_families = HashSet::new();
    unique_families.insert(queue_families.graphics);
    unique_families.insert(queue_families.present);

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
        .map_err(|e| match e {
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => {
                GpuError::ExtensionNotSupported("VK_KHR_swapchain".to_string())
            }
            e => GpuError::from(e),
        })?;

    Ok(device)
}
