// Renderer frontend - what the application loop talks to
//
// Holds the backend (if one was initialized) and turns a RenderPacket into
// one begin/update/end cycle.

use glam::{Mat4, Vec3, Vec4};

use crate::backend::{BackendConfig, BackendError, BackendResult, VulkanBackend};
use crate::platform::PlatformSurface;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Everything the backend needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderPacket {
    pub delta_time: f32,
    pub projection: Mat4,
    pub view: Mat4,
    pub view_position: Vec3,
    pub ambient_color: Vec4,
    pub mode: i32,
}

impl Default for RenderPacket {
    fn default() -> Self {
        Self {
            delta_time: 0.0,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            view_position: Vec3::ZERO,
            ambient_color: Vec4::ONE,
            mode: 0,
        }
    }
}

#[derive(Default)]
pub struct Renderer {
    backend: Option<VulkanBackend>,
}

/// Zero dimensions fall back to the default framebuffer size.
pub fn initial_size(width: u32, height: u32) -> (u32, u32) {
    let width = if width == 0 { DEFAULT_WIDTH } else { width };
    let height = if height == 0 { DEFAULT_HEIGHT } else { height };
    (width, height)
}

/// Fatal errors are logged and returned; anything else skips the frame.
fn skip_or_fail(stage: &str, e: BackendError) -> BackendResult<bool> {
    if e.is_fatal() {
        log::error!("Renderer {} failed: {}. Shutting down...", stage, e);
        Err(e)
    } else {
        log::warn!("Renderer {} failed: {}. Skipping frame.", stage, e);
        Ok(false)
    }
}

impl Renderer {
    pub fn initialize(
        app_name: &str,
        width: u32,
        height: u32,
        platform: &dyn PlatformSurface,
        config: BackendConfig,
    ) -> BackendResult<Self> {
        let (width, height) = initial_size(width, height);
        let backend = VulkanBackend::initialize(app_name, width, height, platform, config).map_err(|e| {
            log::error!("Renderer backend failed to initialize: {}", e);
            e
        })?;

        Ok(Self {
            backend: Some(backend),
        })
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&VulkanBackend> {
        self.backend.as_ref()
    }

    pub fn on_resized(&mut self, width: u32, height: u32) {
        match self.backend.as_mut() {
            Some(backend) => backend.on_resized(width, height),
            None => log::warn!(
                "Renderer backend does not exist on resize: {}x{}",
                width,
                height
            ),
        }
    }

    /// Draws one frame. A skipped frame (resize, recreation, zero-area
    /// window, or a non-fatal backend error) is `Ok(false)`; an error means
    /// rendering cannot continue.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> BackendResult<bool> {
        let Some(backend) = self.backend.as_mut() else {
            log::warn!("Renderer backend does not exist on draw_frame");
            return Ok(false);
        };

        match backend.begin_frame(packet.delta_time) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => return skip_or_fail("begin_frame", e),
        }

        // The frame is still ended so the acquired image gets presented
        if let Err(e) = backend.update_global_state(
            packet.projection,
            packet.view,
            packet.view_position,
            packet.ambient_color,
            packet.mode,
        ) {
            if e.is_fatal() {
                log::error!("Renderer update_global_state failed: {}. Shutting down...", e);
                return Err(e);
            }
            log::warn!("Renderer update_global_state failed: {}", e);
        }

        backend
            .end_frame(packet.delta_time)
            .or_else(|e| skip_or_fail("end_frame", e))
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> BackendResult<()> {
        match &self.backend {
            Some(backend) => backend.wait_idle(),
            None => Ok(()),
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(backend) = self.backend.take() {
            backend.shutdown();
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
