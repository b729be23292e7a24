// Vulkan Context - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers and surface extensions
// - Physical device selection (scored by the configured preference)
// - Logical device + queue creation with descriptor indexing enabled
// - Extension loaders used by the backend (swapchain, surface, debug labels)

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

/// Which kind of GPU to favour when several are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Discrete,
    Integrated,
    Any,
}

impl DevicePreference {
    fn score(self, device_type: vk::PhysicalDeviceType) -> u32 {
        match (self, device_type) {
            (DevicePreference::Integrated, vk::PhysicalDeviceType::INTEGRATED_GPU) => 1000,
            (DevicePreference::Integrated, vk::PhysicalDeviceType::DISCRETE_GPU) => 100,
            (_, vk::PhysicalDeviceType::DISCRETE_GPU) => 1000,
            (_, vk::PhysicalDeviceType::INTEGRATED_GPU) => 100,
            _ => 1,
        }
    }
}

/// Instance-level settings for bringing up the backend
#[derive(Debug, Clone)]
pub struct VulkanSettings {
    pub app_name: String,
    pub enable_validation: bool,
    pub preference: DevicePreference,
    /// Display the surfaces will be created for; `None` runs headless
    pub display: Option<RawDisplayHandle>,
}

/// Required core features
fn required_features() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures::default()
        .fill_mode_non_solid(true)
        .sampler_anisotropy(true)
}

fn check_device_features(features: &vk::PhysicalDeviceFeatures) -> bool {
    features.fill_mode_non_solid == vk::TRUE && features.sampler_anisotropy == vk::TRUE
}

/// Instance, device and the loaders built on them
pub struct VulkanContext {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    pub entry: Entry,

    pub queue: vk::Queue,
    pub queue_family: u32,

    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
    /// Command buffer labels, present when validation is enabled
    pub debug_labels: Option<ash::ext::debug_utils::Device>,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanContext {
    pub fn new(settings: &VulkanSettings) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", settings.app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, settings)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_messenger = if settings.enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Pick physical device (GPU)
        let (physical_device, queue_family) =
            Self::pick_physical_device(&instance, settings.preference)?;

        // Step 5: Create logical device
        let (device, queue) = Self::create_logical_device(&instance, physical_device, queue_family)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        // Step 6: Extension loaders
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        let debug_labels = settings
            .enable_validation
            .then(|| ash::ext::debug_utils::Device::new(&instance, &device));

        Ok(Self {
            device,
            physical_device,
            instance,
            entry,
            queue,
            queue_family,
            surface_loader,
            swapchain_loader,
            debug_labels,
            debug_messenger,
            properties,
        })
    }

    fn create_instance(entry: &Entry, settings: &VulkanSettings) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(settings.app_name.as_str())?;
        let engine_name = c"vk-encoder";

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions = Vec::new();
        if settings.enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        // Platform surface extensions for the display we will present to
        if let Some(display) = settings.display {
            let surface_extensions = ash_window::enumerate_required_extensions(display)
                .context("Display has no Vulkan surface support")?;
            extensions.extend_from_slice(surface_extensions);
        }

        let layer_names = if settings.enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        preference: DevicePreference,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let features = unsafe { instance.get_physical_device_features(device) };

            if props.api_version < vk::API_VERSION_1_2 || !check_device_features(&features) {
                continue;
            }

            // One queue serves graphics, compute and transfer
            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let family = queue_families
                .iter()
                .position(|props| {
                    props
                        .queue_flags
                        .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                })
                .map(|i| i as u32);

            if let Some(family) = family {
                let score = preference.score(props.device_type);
                if score > best_score {
                    best_score = score;
                    best_device = Some((device, family));
                }
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities);

        let extensions = [ash::khr::swapchain::NAME.as_ptr()];

        // Variable-length descriptor arrays
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_variable_descriptor_count(true);

        let features = required_features();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut vulkan12);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        Ok((device, queue))
    }

    pub fn create_allocator(&self) -> Result<gpu_allocator::vulkan::Allocator> {
        let allocator =
            gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
                instance: self.instance.clone(),
                device: self.device.clone(),
                physical_device: self.physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })?;

        Ok(allocator)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = unsafe { self.device.device_wait_idle() };

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_scores_requested_type_highest() {
        let discrete = vk::PhysicalDeviceType::DISCRETE_GPU;
        let integrated = vk::PhysicalDeviceType::INTEGRATED_GPU;

        assert!(DevicePreference::Discrete.score(discrete) > DevicePreference::Discrete.score(integrated));
        assert!(
            DevicePreference::Integrated.score(integrated)
                > DevicePreference::Integrated.score(discrete)
        );
        assert_eq!(DevicePreference::Any.score(vk::PhysicalDeviceType::CPU), 1);
    }
}
