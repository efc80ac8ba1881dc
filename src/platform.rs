// Platform layer - the window-system hooks the backend needs
//
// The backend never touches the windowing library directly. It asks the
// platform for the instance extensions a surface needs, and later for the
// surface itself.

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::os::raw::c_char;

use crate::backend::{BackendError, BackendResult};

pub trait PlatformSurface {
    /// Instance extensions needed to present to this platform's windows.
    fn required_extensions(&self) -> BackendResult<Vec<*const c_char>>;

    /// Creates the presentation surface.
    ///
    /// # Safety
    /// `instance` must have been created by `entry` with the extensions from
    /// `required_extensions`, and must outlive the returned surface.
    unsafe fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> BackendResult<vk::SurfaceKHR>;
}

impl<W> PlatformSurface for W
where
    W: HasRawWindowHandle + HasRawDisplayHandle,
{
    fn required_extensions(&self) -> BackendResult<Vec<*const c_char>> {
        let extensions = ash_window::enumerate_required_extensions(self.raw_display_handle())
            .map_err(|e| BackendError::Surface(format!("unsupported display: {:?}", e)))?;
        Ok(extensions.to_vec())
    }

    unsafe fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> BackendResult<vk::SurfaceKHR> {
        ash_window::create_surface(
            entry,
            instance,
            self.raw_display_handle(),
            self.raw_window_handle(),
            None,
        )
        .map_err(|e| {
            log::error!("Failed to create platform surface: {:?}", e);
            BackendError::Surface(format!("failed to create surface: {:?}", e))
        })
    }
}
