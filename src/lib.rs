// Hearth renderer - Vulkan rendering backend core
//
// `backend` owns every Vulkan object. `renderer` is the frontend the
// application drives once per frame; `event` and `platform` connect it to
// the window system.

pub mod backend;
pub mod config;
pub mod event;
pub mod platform;
pub mod renderer;

pub use backend::{BackendConfig, BackendError, BackendResult, VulkanBackend};
pub use config::Config;
pub use renderer::{RenderPacket, Renderer};
