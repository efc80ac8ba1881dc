// Backend module - Vulkan abstraction layer
//
// Design: Thin wrappers around ash, one file per Vulkan object. Objects hold
// no back-pointers; the device (or the context) is passed in per call.

pub mod buffer;
pub mod command_buffer;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod frame_protocol;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod object_shader;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod utils;
pub mod vulkan_backend;

pub use context::{BackendConfig, Context};
pub use device::{Device, DeviceRequirements};
pub use error::{BackendError, BackendResult};
pub use frame::{FrameGate, FrameState};
pub use frame_protocol::{FrameOps, RebuiltSwapchain};
pub use render_pass::RenderArea;
pub use swapchain::Swapchain;
pub use vulkan_backend::VulkanBackend;
