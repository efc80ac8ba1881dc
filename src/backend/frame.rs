// Frame bookkeeping
//
// Every decision the frame protocol takes (which slot is current, which fence
// guards which swapchain image, whether a resize is pending, whether the
// frame must be skipped) lives here as plain data. `frame_protocol` sequences
// the device calls around it.

use ash::vk;

use super::error::{BackendError, BackendResult};
use super::render_pass::RenderArea;

/// What `begin_frame` should do this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameGate {
    /// Render normally.
    Proceed,
    /// A recreation is still in flight; wait idle and skip.
    Recreating,
    /// The window size changed; recreate at this size and skip.
    ResizePending { width: u32, height: u32 },
    /// The latest requested size has a zero dimension; skip until it changes.
    ZeroArea,
}

#[derive(Debug, Clone)]
pub struct FrameState {
    /// Frame-in-flight slot, cycles through `0..frames_in_flight`.
    pub current_frame: usize,
    /// Swapchain image acquired for the current frame.
    pub image_index: u32,
    frames_in_flight: usize,
    /// Per swapchain image: the in-flight fence slot that last rendered to it.
    images_in_flight: Vec<Option<usize>>,

    framebuffer_width: u32,
    framebuffer_height: u32,
    cached_width: u32,
    cached_height: u32,
    size_generation: u64,
    last_size_generation: u64,

    recreating: bool,
    frame_count: u64,
}

impl FrameState {
    pub fn new(width: u32, height: u32, image_count: usize, frames_in_flight: usize) -> Self {
        Self {
            current_frame: 0,
            image_index: 0,
            frames_in_flight: frames_in_flight.max(1),
            images_in_flight: vec![None; image_count],
            framebuffer_width: width,
            framebuffer_height: height,
            cached_width: width,
            cached_height: height,
            size_generation: 0,
            last_size_generation: 0,
            recreating: false,
            frame_count: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        (self.framebuffer_width, self.framebuffer_height)
    }

    pub fn size_generation(&self) -> u64 {
        self.size_generation
    }

    pub fn last_size_generation(&self) -> u64 {
        self.last_size_generation
    }

    pub fn is_recreating(&self) -> bool {
        self.recreating
    }

    /// Frames fully submitted since initialization.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Records a new window size. Every call bumps the generation; only the
    /// latest size is ever applied.
    pub fn on_resized(&mut self, width: u32, height: u32) {
        self.cached_width = width;
        self.cached_height = height;
        self.size_generation += 1;
        log::debug!(
            "Resize requested: {}x{} (generation {})",
            width,
            height,
            self.size_generation
        );
    }

    pub fn gate(&self) -> FrameGate {
        if self.recreating {
            return FrameGate::Recreating;
        }
        if self.size_generation != self.last_size_generation {
            if self.cached_width == 0 || self.cached_height == 0 {
                return FrameGate::ZeroArea;
            }
            return FrameGate::ResizePending {
                width: self.cached_width,
                height: self.cached_height,
            };
        }
        FrameGate::Proceed
    }

    /// Raises the recreation guard. Returns false if it is already raised.
    pub fn begin_recreate(&mut self) -> bool {
        if self.recreating {
            return false;
        }
        self.recreating = true;
        true
    }

    /// Lowers the guard without applying anything (recreation refused or failed).
    pub fn abort_recreate(&mut self) {
        self.recreating = false;
    }

    /// Applies a finished recreation: the swapchain `extent` becomes the
    /// framebuffer size, image tracking starts over, slot 0 is current.
    /// Pending resizes count as handled only when `requested` is the latest
    /// size asked for.
    pub fn finish_recreate(
        &mut self,
        requested: (u32, u32),
        extent: vk::Extent2D,
        image_count: usize,
        frames_in_flight: usize,
    ) {
        self.framebuffer_width = extent.width;
        self.framebuffer_height = extent.height;
        if requested == (self.cached_width, self.cached_height) {
            self.last_size_generation = self.size_generation;
        }
        self.images_in_flight = vec![None; image_count];
        self.frames_in_flight = frames_in_flight.max(1);
        self.current_frame = 0;
        self.recreating = false;
    }

    /// Fence slot that must be waited on before `image_index` is rendered again.
    pub fn fence_for_image(&self, image_index: u32) -> Option<usize> {
        self.images_in_flight.get(image_index as usize).copied().flatten()
    }

    /// Marks `image_index` as being rendered by the current slot's fence.
    pub fn claim_image(&mut self, image_index: u32) -> BackendResult<()> {
        let current = self.current_frame;
        let slot = self.images_in_flight.get_mut(image_index as usize).ok_or_else(|| {
            BackendError::InvalidState(format!("image index {} out of range", image_index))
        })?;
        *slot = Some(current);
        Ok(())
    }

    /// Moves to the next frame slot after a present.
    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
    }

    pub fn complete_frame(&mut self) {
        self.frame_count += 1;
    }

    pub fn render_area(&self) -> RenderArea {
        RenderArea::new(
            0.0,
            0.0,
            self.framebuffer_width as f32,
            self.framebuffer_height as f32,
        )
    }

    /// Viewport with the origin at the bottom-left: y at the framebuffer
    /// height, negative height.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: self.framebuffer_height as f32,
            width: self.framebuffer_width as f32,
            height: -(self.framebuffer_height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: self.framebuffer_width,
                height: self.framebuffer_height,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = FrameState::new(1280, 720, 3, 2);
        assert_eq!(state.current_frame, 0);
        assert_eq!(state.frames_in_flight(), 2);
        assert_eq!(state.image_count(), 3);
        assert_eq!(state.gate(), FrameGate::Proceed);
        assert_eq!(state.frame_count(), 0);
        assert!((0..3).all(|i| state.fence_for_image(i).is_none()));
    }

    #[test]
    fn test_image_tracks_last_fence() {
        let mut state = FrameState::new(800, 600, 3, 2);
        state.claim_image(2).unwrap();
        assert_eq!(state.fence_for_image(2), Some(0));
        state.advance();
        state.claim_image(2).unwrap();
        assert_eq!(state.fence_for_image(2), Some(1));
        assert!(state.claim_image(3).is_err());
        assert_eq!(state.fence_for_image(7), None);
    }

    #[test]
    fn test_duplicate_resizes_apply_latest_size() {
        let mut state = FrameState::new(1280, 720, 3, 2);
        state.on_resized(1024, 768);
        state.on_resized(1024, 768);
        state.on_resized(640, 480);
        assert_eq!(state.size_generation(), 3);
        assert_eq!(
            state.gate(),
            FrameGate::ResizePending {
                width: 640,
                height: 480
            }
        );

        assert!(state.begin_recreate());
        state.finish_recreate((640, 480), vk::Extent2D { width: 640, height: 480 }, 3, 2);
        assert_eq!(state.framebuffer_size(), (640, 480));
        assert_eq!(state.last_size_generation(), 3);
        assert_eq!(state.gate(), FrameGate::Proceed);
    }

    #[test]
    fn test_zero_area_defers_until_nonzero() {
        let mut state = FrameState::new(1280, 720, 3, 2);
        state.on_resized(0, 0);
        assert_eq!(state.gate(), FrameGate::ZeroArea);
        state.on_resized(300, 0);
        assert_eq!(state.gate(), FrameGate::ZeroArea);
        state.on_resized(300, 200);
        assert_eq!(
            state.gate(),
            FrameGate::ResizePending {
                width: 300,
                height: 200
            }
        );
        // The framebuffer keeps its size until a recreation applies
        assert_eq!(state.framebuffer_size(), (1280, 720));
    }

    #[test]
    fn test_slots_wrap_around() {
        let mut state = FrameState::new(800, 600, 4, 3);
        let slots: Vec<usize> = (0..7)
            .map(|_| {
                let slot = state.current_frame;
                state.advance();
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_recreation_guard() {
        let mut state = FrameState::new(800, 600, 3, 2);
        assert!(state.begin_recreate());
        assert!(!state.begin_recreate());
        assert_eq!(state.gate(), FrameGate::Recreating);
        state.abort_recreate();
        assert_eq!(state.gate(), FrameGate::Proceed);
    }

    #[test]
    fn test_recreation_resets_image_tracking() {
        let mut state = FrameState::new(800, 600, 3, 2);
        state.claim_image(0).unwrap();
        state.advance();
        state.on_resized(400, 300);
        assert!(state.begin_recreate());
        state.finish_recreate((400, 300), vk::Extent2D { width: 400, height: 300 }, 4, 3);
        assert_eq!(state.current_frame, 0);
        assert_eq!(state.image_count(), 4);
        assert_eq!(state.frames_in_flight(), 3);
        assert_eq!(state.fence_for_image(0), None);
        assert_eq!(state.gate(), FrameGate::Proceed);
    }

    #[test]
    fn test_recreation_at_stale_size_keeps_resize_pending() {
        let mut state = FrameState::new(800, 600, 3, 2);
        state.on_resized(400, 300);
        assert!(state.begin_recreate());
        state.finish_recreate((800, 600), vk::Extent2D { width: 800, height: 600 }, 3, 2);
        assert_eq!(
            state.gate(),
            FrameGate::ResizePending {
                width: 400,
                height: 300
            }
        );
    }

    #[test]
    fn test_surface_extent_becomes_framebuffer_size() {
        let mut state = FrameState::new(800, 600, 3, 2);
        state.on_resized(1000, 700);
        assert!(state.begin_recreate());
        state.finish_recreate((1000, 700), vk::Extent2D { width: 998, height: 700 }, 3, 2);
        assert_eq!(state.framebuffer_size(), (998, 700));
        assert_eq!(state.gate(), FrameGate::Proceed);
    }

    #[test]
    fn test_viewport_is_y_flipped() {
        let state = FrameState::new(1280, 720, 3, 2);
        let viewport = state.viewport();
        assert_eq!(viewport.y, 720.0);
        assert_eq!(viewport.height, -720.0);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(state.scissor().extent.width, 1280);
    }
}
