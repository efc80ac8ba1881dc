// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section is optional; missing keys take their defaults. A missing or
// broken file falls back to the full default configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::backend::{BackendConfig, DeviceRequirements};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hearth Engine".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    /// Use MAILBOX when the surface offers it, FIFO otherwise
    pub prefer_mailbox: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.2, 1.0],
            prefer_mailbox: true,
        }
    }
}

/// Physical device requirements
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub require_discrete_gpu: bool,
    pub require_graphics: bool,
    pub require_present: bool,
    pub require_transfer: bool,
    pub require_compute: bool,
    pub require_sampler_anisotropy: bool,
    /// Device extensions on top of VK_KHR_swapchain
    pub extensions: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            require_discrete_gpu: false,
            require_graphics: true,
            require_present: true,
            require_transfer: true,
            require_compute: false,
            require_sampler_anisotropy: true,
            extensions: Vec::new(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    /// env_logger filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads `path`, falling back to the defaults when the file cannot be
    /// read or parsed. The failure is handed back instead of logged so it can
    /// be reported once logging is up.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// The configured level, or `None` when it is not a valid level name.
    pub fn log_filter(&self) -> Option<log::LevelFilter> {
        self.debug.log_level.parse().ok()
    }

    /// Settings handed to the Vulkan backend
    pub fn backend_config(&self) -> BackendConfig {
        let device = &self.device;
        let requirements = DeviceRequirements {
            graphics: device.require_graphics,
            present: device.require_present,
            compute: device.require_compute,
            transfer: device.require_transfer,
            sampler_anisotropy: device.require_sampler_anisotropy,
            discrete_gpu: device.require_discrete_gpu,
            extensions: device.extensions.clone(),
        }
        .with_swapchain();

        BackendConfig {
            device_requirements: requirements,
            clear_color: self.graphics.clear_color,
            enable_validation: self.debug.validation_layers,
            prefer_mailbox: self.graphics.prefer_mailbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.graphics.prefer_mailbox);
        assert!(!config.device.require_discrete_gpu);
        assert_eq!(config.log_filter(), Some(log::LevelFilter::Info));
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [window]
            width = 640

            [device]
            require_discrete_gpu = true
            extensions = ["VK_KHR_maintenance1"]

            [debug]
            log_level = "trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.window.title, "Hearth Engine");
        assert!(config.device.require_discrete_gpu);
        assert_eq!(config.log_filter(), Some(log::LevelFilter::Trace));
    }

    #[test]
    fn test_backend_config_always_requires_swapchain() {
        let config = Config::parse(
            r#"
            [graphics]
            clear_color = [1.0, 0.0, 0.0, 1.0]
            prefer_mailbox = false

            [device]
            extensions = ["VK_KHR_maintenance1"]
            "#,
        )
        .unwrap();
        let backend = config.backend_config();
        assert_eq!(backend.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert!(!backend.prefer_mailbox);
        assert_eq!(
            backend.device_requirements.extensions,
            vec!["VK_KHR_swapchain".to_string(), "VK_KHR_maintenance1".to_string()]
        );
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn test_unknown_log_level() {
        let config = Config::parse("[debug]\nlog_level = \"chatty\"").unwrap();
        assert_eq!(config.log_filter(), None);
    }

    #[test]
    fn test_broken_file_falls_back_with_error() {
        let path = std::env::temp_dir().join(format!("hearth-broken-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = ").unwrap();

        let (config, error) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 1280);
        let error = error.expect("broken config should report an error");
        assert!(format!("{:#}", error).contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.window.width, 1280);
    }
}
