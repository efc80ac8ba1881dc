// Backend error types
//
// Two kinds of failure leave the core: fatal ones (the engine cannot keep
// rendering) and programming errors (invalid state transitions). Conditions
// the frame loop is expected to ride out (out-of-date swapchain, zero-area
// window, recreation already in flight) are not errors; they surface as
// `Ok(false)` from the frame calls.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use super::utils;

#[derive(Error, Debug)]
pub enum BackendError {
    /// Vulkan API call failed
    #[error("Vulkan error: {}", utils::vk_result_string(*.0, true))]
    Vulkan(#[from] vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Required validation layer is missing: {0}")]
    MissingLayer(String),

    #[error("Required extension is missing: {0}")]
    MissingExtension(String),

    #[error("No physical device meets the requirements")]
    NoSuitableDevice,

    #[error("Failed to find a supported depth format")]
    UnsupportedDepthFormat,

    #[error("Required memory type not found")]
    NoMemoryType,

    /// Malformed or unusable shader bytecode
    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Unable to read shader module {path:?}: {source}")]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Surface error: {0}")]
    Surface(String),

    /// A resource was used outside its valid lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BackendError {
    /// Whether the error must stop the frame loop.
    ///
    /// Everything except an invalid-state report is fatal: device loss,
    /// missing layers, failed object creation and bad shaders all abort.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BackendError::InvalidState(_))
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vulkan_error_display_uses_extended_string() {
        let err = BackendError::from(vk::Result::ERROR_DEVICE_LOST);
        let text = err.to_string();
        assert!(text.contains("VK_ERROR_DEVICE_LOST"));
        assert!(text.contains("has been lost"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(BackendError::NoSuitableDevice.is_fatal());
        assert!(BackendError::UnsupportedDepthFormat.is_fatal());
        assert!(BackendError::Shader("bad".into()).is_fatal());
        assert!(!BackendError::InvalidState("begin twice".into()).is_fatal());
    }

    #[test]
    fn test_shader_io_error_mentions_path() {
        let err = BackendError::ShaderIo {
            path: PathBuf::from("assets/shaders/Missing.vert.spv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("Missing.vert.spv"));
    }
}
