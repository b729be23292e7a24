// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::backend::vulkan::{DevicePreference, VulkanSettings};
use crate::backend::BackendKind;
use crate::device::DeviceSettings;
use crate::frame::MAX_BUFFERING;
use crate::types::SwapchainDesc;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub frame: FrameConfig,
    pub descriptors: DescriptorConfig,
    pub encoder: EncoderConfig,
    pub swapchain: SwapchainConfig,
    pub debug: DebugConfig,
}

/// Backend and instance settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// "vulkan" or "stub"
    pub backend: String,
    pub app_name: String,
    pub validation_layers: bool,
    /// "discrete", "integrated" or "any"
    pub preferred_device_type: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: "stub".to_string(),
            app_name: "vk-encoder".to_string(),
            validation_layers: true,
            preferred_device_type: "discrete".to_string(),
        }
    }
}

/// Frame ring settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub buffering: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { buffering: 2 }
    }
}

/// Descriptor heap settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    pub pool_size: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self { pool_size: 1024 }
    }
}

/// Command encoder settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Bytes of render pass arguments each encoder may hold per pass
    pub arg_pool_capacity: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            arg_pool_capacity: 64 * 1024,
        }
    }
}

/// Swapchain preferences
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SwapchainConfig {
    pub width: u32,
    pub height: u32,
    pub present_mode: String,
    pub buffering: u32,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            present_mode: "fifo".to_string(),
            buffering: 3,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    /// Frames the demo records before exiting
    pub frames: u32,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vk_encoder.log".to_string(),
            frames: 3,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
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

    /// Parse and range-check a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        anyhow::ensure!(
            (1..=MAX_BUFFERING).contains(&config.frame.buffering),
            "frame.buffering must be within 1..={}, got {}",
            MAX_BUFFERING,
            config.frame.buffering
        );
        anyhow::ensure!(
            config.descriptors.pool_size > 0,
            "descriptors.pool_size must be non-zero"
        );
        config.backend_kind()?;

        Ok(config)
    }

    pub fn backend_kind(&self) -> Result<BackendKind> {
        match self.device.backend.to_lowercase().as_str() {
            "vulkan" => Ok(BackendKind::Vulkan),
            "stub" => Ok(BackendKind::Stub),
            other => anyhow::bail!("unknown backend '{}' (expected \"vulkan\" or \"stub\")", other),
        }
    }

    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            buffering: self.frame.buffering,
            descriptor_pool_size: self.descriptors.pool_size,
            arg_pool_capacity: self.encoder.arg_pool_capacity,
        }
    }

    /// Instance settings for the Vulkan backend; headless unless a display is supplied
    pub fn vulkan_settings(&self) -> VulkanSettings {
        VulkanSettings {
            app_name: self.device.app_name.clone(),
            enable_validation: self.device.validation_layers,
            preference: self.get_device_preference(),
            display: None,
        }
    }

    /// Swapchain description for `surface` built from the [swapchain] section
    pub fn swapchain_desc(&self, surface: ash::vk::SurfaceKHR) -> SwapchainDesc {
        SwapchainDesc {
            label: "main",
            surface,
            present_mode: self.get_present_mode(),
            preferred_buffering: self.swapchain.buffering,
            preferred_extent: ash::vk::Extent2D {
                width: self.swapchain.width,
                height: self.swapchain.height,
            },
            ..Default::default()
        }
    }

    pub fn get_device_preference(&self) -> DevicePreference {
        match self.device.preferred_device_type.to_lowercase().as_str() {
            "discrete" => DevicePreference::Discrete,
            "integrated" => DevicePreference::Integrated,
            "any" => DevicePreference::Any,
            _ => {
                log::warn!(
                    "Unknown device type '{}', preferring discrete",
                    self.device.preferred_device_type
                );
                DevicePreference::Discrete
            }
        }
    }

    /// Get log level as a `log` filter
    pub fn get_log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!(
                "Unknown log level '{}', defaulting to info",
                self.debug.log_level
            );
            log::LevelFilter::Info
        })
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.swapchain.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.swapchain.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.frame.buffering, 2);
        assert_eq!(config.descriptors.pool_size, 1024);
        assert_eq!(config.backend_kind().unwrap(), BackendKind::Stub);
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [device]
            backend = "Vulkan"
            preferred_device_type = "integrated"

            [frame]
            buffering = 3

            [encoder]
            arg_pool_capacity = 256

            [swapchain]
            present_mode = "mailbox"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend_kind().unwrap(), BackendKind::Vulkan);
        assert_eq!(config.get_device_preference(), DevicePreference::Integrated);
        assert_eq!(
            config.device_settings(),
            DeviceSettings {
                buffering: 3,
                descriptor_pool_size: 1024,
                arg_pool_capacity: 256,
            }
        );
        assert_eq!(config.get_present_mode(), ash::vk::PresentModeKHR::MAILBOX);

        let desc = config.swapchain_desc(ash::vk::SurfaceKHR::null());
        assert_eq!(desc.present_mode, ash::vk::PresentModeKHR::MAILBOX);
        assert_eq!(desc.preferred_extent.width, 1280);
    }

    #[test]
    fn out_of_range_buffering_is_rejected() {
        assert!(Config::parse("[frame]\nbuffering = 0").is_err());
        assert!(Config::parse("[frame]\nbuffering = 5").is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Config::parse("[device]\nbackend = \"metal\"").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.debug.frames, 3);
    }
}
