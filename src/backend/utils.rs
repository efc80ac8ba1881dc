// Vulkan result helpers
//
// Translates result codes into the code name (and optionally the description
// from the Vulkan registry) so call sites can log something a human can act on.

use ash::vk;

/// Success codes are non-negative, error codes negative.
pub fn result_is_success(result: vk::Result) -> bool {
    result.as_raw() >= 0
}

/// Code name of `result`, followed by its description when `extended` is set.
pub fn vk_result_string(result: vk::Result, extended: bool) -> &'static str {
    let (short, long) = match result {
        vk::Result::SUCCESS => (
            "VK_SUCCESS",
            "VK_SUCCESS Command successfully completed",
        ),
        vk::Result::NOT_READY => (
            "VK_NOT_READY",
            "VK_NOT_READY A fence or query has not yet completed",
        ),
        vk::Result::TIMEOUT => (
            "VK_TIMEOUT",
            "VK_TIMEOUT A wait operation has not completed in the specified time",
        ),
        vk::Result::EVENT_SET => ("VK_EVENT_SET", "VK_EVENT_SET An event is signaled"),
        vk::Result::EVENT_RESET => ("VK_EVENT_RESET", "VK_EVENT_RESET An event is unsignaled"),
        vk::Result::INCOMPLETE => (
            "VK_INCOMPLETE",
            "VK_INCOMPLETE A return array was too small for the result",
        ),
        vk::Result::SUBOPTIMAL_KHR => (
            "VK_SUBOPTIMAL_KHR",
            "VK_SUBOPTIMAL_KHR A swapchain no longer matches the surface properties exactly, \
             but can still be used to present to the surface successfully.",
        ),
        vk::Result::THREAD_IDLE_KHR => (
            "VK_THREAD_IDLE_KHR",
            "VK_THREAD_IDLE_KHR A deferred operation is not complete but there is currently \
             no work for this thread to do at the time of this call.",
        ),
        vk::Result::THREAD_DONE_KHR => (
            "VK_THREAD_DONE_KHR",
            "VK_THREAD_DONE_KHR A deferred operation is not complete but there is no work \
             remaining to assign to additional threads.",
        ),
        vk::Result::OPERATION_DEFERRED_KHR => (
            "VK_OPERATION_DEFERRED_KHR",
            "VK_OPERATION_DEFERRED_KHR A deferred operation was requested and at least some \
             of the work was deferred.",
        ),
        vk::Result::OPERATION_NOT_DEFERRED_KHR => (
            "VK_OPERATION_NOT_DEFERRED_KHR",
            "VK_OPERATION_NOT_DEFERRED_KHR A deferred operation was requested and no \
             operations were deferred.",
        ),
        vk::Result::PIPELINE_COMPILE_REQUIRED => (
            "VK_PIPELINE_COMPILE_REQUIRED",
            "VK_PIPELINE_COMPILE_REQUIRED A requested pipeline creation would have required \
             compilation, but the application requested compilation to not be performed.",
        ),
        vk::Result::ERROR_OUT_OF_HOST_MEMORY => (
            "VK_ERROR_OUT_OF_HOST_MEMORY",
            "VK_ERROR_OUT_OF_HOST_MEMORY A host memory allocation has failed.",
        ),
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => (
            "VK_ERROR_OUT_OF_DEVICE_MEMORY",
            "VK_ERROR_OUT_OF_DEVICE_MEMORY A device memory allocation has failed.",
        ),
        vk::Result::ERROR_INITIALIZATION_FAILED => (
            "VK_ERROR_INITIALIZATION_FAILED",
            "VK_ERROR_INITIALIZATION_FAILED Initialization of an object could not be completed \
             for implementation-specific reasons.",
        ),
        vk::Result::ERROR_DEVICE_LOST => (
            "VK_ERROR_DEVICE_LOST",
            "VK_ERROR_DEVICE_LOST The logical or physical device has been lost.",
        ),
        vk::Result::ERROR_MEMORY_MAP_FAILED => (
            "VK_ERROR_MEMORY_MAP_FAILED",
            "VK_ERROR_MEMORY_MAP_FAILED Mapping of a memory object has failed.",
        ),
        vk::Result::ERROR_LAYER_NOT_PRESENT => (
            "VK_ERROR_LAYER_NOT_PRESENT",
            "VK_ERROR_LAYER_NOT_PRESENT A requested layer is not present or could not be loaded.",
        ),
        vk::Result::ERROR_EXTENSION_NOT_PRESENT => (
            "VK_ERROR_EXTENSION_NOT_PRESENT",
            "VK_ERROR_EXTENSION_NOT_PRESENT A requested extension is not supported.",
        ),
        vk::Result::ERROR_FEATURE_NOT_PRESENT => (
            "VK_ERROR_FEATURE_NOT_PRESENT",
            "VK_ERROR_FEATURE_NOT_PRESENT A requested feature is not supported.",
        ),
        vk::Result::ERROR_INCOMPATIBLE_DRIVER => (
            "VK_ERROR_INCOMPATIBLE_DRIVER",
            "VK_ERROR_INCOMPATIBLE_DRIVER The requested version of Vulkan is not supported by \
             the driver or is otherwise incompatible for implementation-specific reasons.",
        ),
        vk::Result::ERROR_TOO_MANY_OBJECTS => (
            "VK_ERROR_TOO_MANY_OBJECTS",
            "VK_ERROR_TOO_MANY_OBJECTS Too many objects of the type have already been created.",
        ),
        vk::Result::ERROR_FORMAT_NOT_SUPPORTED => (
            "VK_ERROR_FORMAT_NOT_SUPPORTED",
            "VK_ERROR_FORMAT_NOT_SUPPORTED A requested format is not supported on this device.",
        ),
        vk::Result::ERROR_FRAGMENTED_POOL => (
            "VK_ERROR_FRAGMENTED_POOL",
            "VK_ERROR_FRAGMENTED_POOL A pool allocation has failed due to fragmentation of the \
             pool's memory.",
        ),
        vk::Result::ERROR_SURFACE_LOST_KHR => (
            "VK_ERROR_SURFACE_LOST_KHR",
            "VK_ERROR_SURFACE_LOST_KHR A surface is no longer available.",
        ),
        vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => (
            "VK_ERROR_NATIVE_WINDOW_IN_USE_KHR",
            "VK_ERROR_NATIVE_WINDOW_IN_USE_KHR The requested window is already in use by Vulkan \
             or another API in a manner which prevents it from being used again.",
        ),
        vk::Result::ERROR_OUT_OF_DATE_KHR => (
            "VK_ERROR_OUT_OF_DATE_KHR",
            "VK_ERROR_OUT_OF_DATE_KHR A surface has changed in such a way that it is no longer \
             compatible with the swapchain, and further presentation requests using the \
             swapchain will fail.",
        ),
        vk::Result::ERROR_INCOMPATIBLE_DISPLAY_KHR => (
            "VK_ERROR_INCOMPATIBLE_DISPLAY_KHR",
            "VK_ERROR_INCOMPATIBLE_DISPLAY_KHR The display used by a swapchain does not use the \
             same presentable image layout, or is incompatible in a way that prevents sharing \
             an image.",
        ),
        vk::Result::ERROR_INVALID_SHADER_NV => (
            "VK_ERROR_INVALID_SHADER_NV",
            "VK_ERROR_INVALID_SHADER_NV One or more shaders failed to compile or link.",
        ),
        vk::Result::ERROR_OUT_OF_POOL_MEMORY => (
            "VK_ERROR_OUT_OF_POOL_MEMORY",
            "VK_ERROR_OUT_OF_POOL_MEMORY A pool memory allocation has failed.",
        ),
        vk::Result::ERROR_INVALID_EXTERNAL_HANDLE => (
            "VK_ERROR_INVALID_EXTERNAL_HANDLE",
            "VK_ERROR_INVALID_EXTERNAL_HANDLE An external handle is not a valid handle of the \
             specified type.",
        ),
        vk::Result::ERROR_FRAGMENTATION => (
            "VK_ERROR_FRAGMENTATION",
            "VK_ERROR_FRAGMENTATION A descriptor pool creation has failed due to fragmentation.",
        ),
        vk::Result::ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS => (
            "VK_ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS",
            "VK_ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS A buffer creation or memory allocation \
             failed because the requested address is not available.",
        ),
        vk::Result::ERROR_UNKNOWN => (
            "VK_ERROR_UNKNOWN",
            "VK_ERROR_UNKNOWN An unknown error has occurred; either the application has \
             provided invalid input, or an implementation failure has occurred.",
        ),
        _ if result_is_success(result) => ("VK_UNKNOWN_SUCCESS", "VK_UNKNOWN_SUCCESS Unrecognized success code"),
        _ => ("VK_UNKNOWN_ERROR", "VK_UNKNOWN_ERROR Unrecognized error code"),
    };

    if extended {
        long
    } else {
        short
    }
}

/// Logs a failed call with its extended description and hands the result back.
pub fn log_failure(what: &str, result: vk::Result) -> vk::Result {
    log::error!("{}: {}", what, vk_result_string(result, true));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_codes() {
        assert!(result_is_success(vk::Result::SUCCESS));
        assert!(result_is_success(vk::Result::SUBOPTIMAL_KHR));
        assert!(result_is_success(vk::Result::TIMEOUT));
        assert!(result_is_success(vk::Result::INCOMPLETE));
    }

    #[test]
    fn test_error_codes() {
        assert!(!result_is_success(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert!(!result_is_success(vk::Result::ERROR_DEVICE_LOST));
        assert!(!result_is_success(vk::Result::ERROR_UNKNOWN));
    }

    #[test]
    fn test_short_and_extended_strings() {
        assert_eq!(
            vk_result_string(vk::Result::ERROR_OUT_OF_DATE_KHR, false),
            "VK_ERROR_OUT_OF_DATE_KHR"
        );
        let long = vk_result_string(vk::Result::ERROR_OUT_OF_DATE_KHR, true);
        assert!(long.starts_with("VK_ERROR_OUT_OF_DATE_KHR "));
        assert!(long.len() > "VK_ERROR_OUT_OF_DATE_KHR".len());
    }

    #[test]
    fn test_unrecognized_code() {
        assert_eq!(
            vk_result_string(vk::Result::from_raw(-123_456), false),
            "VK_UNKNOWN_ERROR"
        );
        assert_eq!(
            vk_result_string(vk::Result::from_raw(123_456), false),
            "VK_UNKNOWN_SUCCESS"
        );
    }
}
