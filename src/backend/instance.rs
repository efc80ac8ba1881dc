// Vulkan instance, debug messenger and presentation surface
//
// The instance-level objects every other backend object hangs off. Dropped
// last: surface, then messenger, then the instance itself.

use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use super::error::{BackendError, BackendResult};
use super::utils;
use crate::platform::PlatformSurface;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct Instance {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: Surface,
    pub surface: vk::SurfaceKHR,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Loads Vulkan, creates the instance (with validation when asked), the
    /// debug messenger and the window surface.
    pub fn create(
        app_name: &str,
        platform: &dyn PlatformSurface,
        enable_validation: bool,
    ) -> BackendResult<Self> {
        log::info!("Initializing Vulkan instance...");

        let entry = unsafe { Entry::load()? };
        let instance = create_instance(&entry, app_name, platform, enable_validation)?;
        let surface_loader = Surface::new(&entry, &instance);

        let mut core = Self {
            entry,
            instance,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
            debug_utils: None,
        };

        if enable_validation {
            core.debug_utils = Some(setup_debug_messenger(&core.entry, &core.instance)?);
            log::debug!("Vulkan debugger created");
        }

        log::debug!("Creating Vulkan surface...");
        core.surface = unsafe { platform.create_surface(&core.entry, &core.instance)? };
        log::info!("Vulkan surface created");

        Ok(core)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                log::info!("Destroying Vulkan surface...");
                self.surface_loader.destroy_surface(self.surface, None);
            }

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                log::info!("Destroying Vulkan debugger...");
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            log::info!("Destroying Vulkan instance...");
            self.instance.destroy_instance(None);
        }
    }
}

/// Names from `required` that are absent from `available`, in request order.
pub fn missing_names<'a>(required: &[&'a CStr], available: &[String]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| {
            let name = name.to_string_lossy();
            !available.iter().any(|have| *have == name)
        })
        .collect()
}

fn create_instance(
    entry: &Entry,
    app_name: &str,
    platform: &dyn PlatformSurface,
    enable_validation: bool,
) -> BackendResult<ash::Instance> {
    let app_name_cstr = CString::new(app_name)
        .map_err(|e| BackendError::InvalidConfig(format!("application name: {}", e)))?;
    let engine_name = c"Hearth Engine";

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_2);

    // Surface extensions come from the platform
    let mut extensions = platform.required_extensions()?;
    if enable_validation {
        extensions.push(DebugUtils::name().as_ptr());
    }

    let required_extensions: Vec<&CStr> = extensions
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
        .collect();
    log::debug!("Required extensions:");
    for name in &required_extensions {
        log::debug!("  {}", name.to_string_lossy());
    }

    #[allow(unused_unsafe)]
    let available_extensions: Vec<String> = unsafe { entry.enumerate_instance_extension_properties(None)? }
        .iter()
        .map(|ext| name_to_string(&ext.extension_name))
        .collect();
    if let Some(missing) = missing_names(&required_extensions, &available_extensions).first() {
        log::error!("Required extension is missing: {}", missing.to_string_lossy());
        return Err(BackendError::MissingExtension(missing.to_string_lossy().into_owned()));
    }

    let layer_names: Vec<*const c_char> = if enable_validation {
        log::info!("Validation layers enabled. Enumerating...");

        #[allow(unused_unsafe)]
        let available_layers: Vec<String> = unsafe { entry.enumerate_instance_layer_properties()? }
            .iter()
            .map(|layer| name_to_string(&layer.layer_name))
            .collect();

        if let Some(missing) = missing_names(&[VALIDATION_LAYER], &available_layers).first() {
            log::error!("Required validation layer is missing: {}", missing.to_string_lossy());
            return Err(BackendError::MissingLayer(missing.to_string_lossy().into_owned()));
        }
        log::info!("All required validation layers are present.");
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| utils::log_failure("vkCreateInstance failed", e))?;
    log::info!("Vulkan instance created");

    Ok(instance)
}

fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> BackendResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
    log::debug!("Creating Vulkan debugger...");
    let debug_utils = DebugUtils::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(|e| utils::log_failure("Failed to create debug messenger", e))?;

    Ok((debug_utils, messenger))
}

fn name_to_string(raw: &[c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Log level a validation message is forwarded at.
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Trace
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);
    log::log!(severity_level(message_severity), "[Vulkan] {}", message.to_string_lossy());

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
        assert_eq!(severity_level(Severity::ERROR), log::Level::Error);
        assert_eq!(severity_level(Severity::WARNING), log::Level::Warn);
        assert_eq!(severity_level(Severity::INFO), log::Level::Info);
        assert_eq!(severity_level(Severity::VERBOSE), log::Level::Trace);
    }

    #[test]
    fn test_missing_names() {
        let available = vec!["VK_KHR_surface".to_string(), "VK_LAYER_KHRONOS_validation".to_string()];
        let required = [c"VK_KHR_surface", c"VK_KHR_xlib_surface", VALIDATION_LAYER];
        assert_eq!(missing_names(&required, &available), vec![c"VK_KHR_xlib_surface"]);
        assert!(missing_names(&[], &available).is_empty());
    }
}
