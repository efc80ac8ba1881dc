// Vulkan context - the aggregate every backend object is built from
//
// Owns the whole object graph. Children never hold a pointer back into the
// context; they are handed the device (or the context) per call. Teardown
// order is fixed: everything below the device is destroyed in `Drop`, then
// the fields drop in declaration order (device, then instance, surface and
// messenger).

use super::command_buffer::{self, CommandBuffer};
use super::device::{Device, DeviceRequirements};
use super::error::{BackendError, BackendResult};
use super::frame::FrameState;
use super::frame_protocol::RebuiltSwapchain;
use super::instance::Instance;
use super::object_shader::{ObjectShader, MAX_FRAMES_IN_FLIGHT};
use super::render_pass::{RenderArea, RenderPass};
use super::swapchain::Swapchain;
use super::sync::FrameSync;
use crate::platform::PlatformSurface;

/// Settings the backend is initialized with.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub device_requirements: DeviceRequirements,
    pub clear_color: [f32; 4],
    pub enable_validation: bool,
    pub prefer_mailbox: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            device_requirements: DeviceRequirements::default(),
            clear_color: [0.0, 0.0, 0.2, 1.0],
            enable_validation: cfg!(debug_assertions),
            prefer_mailbox: true,
        }
    }
}

/// Frame slots actually used for a swapchain offering `frames_in_flight`.
pub fn usable_frames_in_flight(frames_in_flight: u32) -> usize {
    (frames_in_flight as usize).clamp(1, MAX_FRAMES_IN_FLIGHT)
}

pub struct Context {
    pub frame: FrameState,
    pub config: BackendConfig,

    pub object_shader: ObjectShader,
    pub sync: FrameSync,
    pub graphics_command_buffers: Vec<CommandBuffer>,
    pub main_render_pass: RenderPass,
    pub swapchain: Swapchain,

    // Must drop before `instance`
    pub device: Device,
    pub instance: Instance,
}

impl Context {
    /// Builds the chain instance → debug messenger → surface → device →
    /// swapchain → render pass → framebuffers → command buffers → sync
    /// objects → object shader. On failure, whatever was built is torn down.
    pub fn create(
        app_name: &str,
        width: u32,
        height: u32,
        platform: &dyn PlatformSurface,
        config: BackendConfig,
    ) -> BackendResult<Self> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidConfig(format!(
                "framebuffer size {}x{} has a zero dimension",
                width, height
            )));
        }

        let instance = Instance::create(app_name, platform, config.enable_validation)?;

        let requirements = config.device_requirements.clone().with_swapchain();
        let device = Device::create(
            &instance.instance,
            &instance.surface_loader,
            instance.surface,
            &requirements,
        )?;

        let mut context = Self {
            frame: FrameState::new(width, height, 0, 1),
            config,
            object_shader: ObjectShader::default(),
            sync: FrameSync::default(),
            graphics_command_buffers: Vec::new(),
            main_render_pass: RenderPass::default(),
            swapchain: Swapchain::default(),
            device,
            instance,
        };

        context.build_presentation(width, height)?;
        log::info!("Vulkan renderer initialized successfully.");
        Ok(context)
    }

    fn build_presentation(&mut self, width: u32, height: u32) -> BackendResult<()> {
        self.swapchain = Swapchain::create(
            &mut self.device,
            &self.instance.surface_loader,
            self.instance.surface,
            width,
            height,
            self.config.prefer_mailbox,
        )?;
        let extent = self.swapchain.extent;

        self.main_render_pass = RenderPass::create(
            &self.device.logical_device,
            self.swapchain.image_format.format,
            self.device.depth_format(),
            RenderArea::new(0.0, 0.0, extent.width as f32, extent.height as f32),
            self.config.clear_color,
            1.0,
            0,
        )?;

        self.swapchain.regenerate_framebuffers(
            &self.device.logical_device,
            &self.main_render_pass,
            extent.width,
            extent.height,
        )?;

        self.graphics_command_buffers = command_buffer::allocate_per_image(
            &self.device.logical_device,
            self.device.graphics_command_pool,
            self.swapchain.image_count(),
        )?;

        let frames = usable_frames_in_flight(self.swapchain.frames_in_flight);
        self.sync = FrameSync::create(&self.device.logical_device, frames)?;

        self.frame = FrameState::new(extent.width, extent.height, self.swapchain.image_count(), frames);

        self.object_shader = ObjectShader::create(&self.device, &self.main_render_pass, extent.width, extent.height)
            .map_err(|e| {
                log::error!("Error loading built-in object shader");
                e
            })?;

        Ok(())
    }

    /// Rebuilds the swapchain, framebuffers, command buffers and (when the
    /// slot count changed) the sync objects. `Ok(None)` leaves everything as
    /// it was. The recreation guard is handled by `frame_protocol`.
    pub(crate) fn rebuild_presentation(&mut self, width: u32, height: u32) -> BackendResult<Option<RebuiltSwapchain>> {
        self.device.wait_idle()?;

        let rebuilt = self.swapchain.recreate(
            &mut self.device,
            &self.instance.surface_loader,
            self.instance.surface,
            width,
            height,
        )?;
        if !rebuilt {
            return Ok(None);
        }
        let extent = self.swapchain.extent;

        command_buffer::free_all(
            &mut self.graphics_command_buffers,
            &self.device.logical_device,
            self.device.graphics_command_pool,
        );

        self.main_render_pass.render_area = RenderArea::new(0.0, 0.0, extent.width as f32, extent.height as f32);
        self.swapchain.regenerate_framebuffers(
            &self.device.logical_device,
            &self.main_render_pass,
            extent.width,
            extent.height,
        )?;

        self.graphics_command_buffers = command_buffer::allocate_per_image(
            &self.device.logical_device,
            self.device.graphics_command_pool,
            self.swapchain.image_count(),
        )?;

        let frames = usable_frames_in_flight(self.swapchain.frames_in_flight);
        if frames != self.sync.len() {
            log::debug!("Frames in flight changed {} -> {}", self.sync.len(), frames);
            self.sync.destroy(&self.device.logical_device);
            self.sync = FrameSync::create(&self.device.logical_device, frames)?;
        }

        log::info!("Swapchain recreated: {}x{}", extent.width, extent.height);
        Ok(Some(RebuiltSwapchain {
            extent,
            image_count: self.swapchain.image_count(),
            frames_in_flight: frames,
        }))
    }

    fn destroy_resources(&mut self) {
        log::info!("Shutting down Vulkan renderer...");
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait before shutdown failed: {}", e);
        }

        let device = &self.device;
        let logical = &device.logical_device;

        log::debug!("Destroying object shader...");
        self.object_shader.destroy(device);

        log::debug!("Destroying sync objects...");
        self.sync.destroy(logical);

        log::debug!("Freeing command buffers...");
        command_buffer::free_all(&mut self.graphics_command_buffers, logical, device.graphics_command_pool);

        log::debug!("Destroying framebuffers...");
        self.swapchain.destroy_framebuffers(logical);

        log::debug!("Destroying render pass...");
        self.main_render_pass.destroy(logical);

        log::debug!("Destroying swapchain...");
        self.swapchain.destroy(device);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.destroy_resources();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_frames_in_flight_bounds() {
        assert_eq!(usable_frames_in_flight(0), 1);
        assert_eq!(usable_frames_in_flight(2), 2);
        assert_eq!(usable_frames_in_flight(7), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_default_config_requires_swapchain_path() {
        let config = BackendConfig::default();
        assert!(config.prefer_mailbox);
        assert!(config.device_requirements.graphics);
        assert!(config.device_requirements.present);
        assert!(!config.device_requirements.discrete_gpu);
    }
}
