use std::num::NonZeroU32;
use std::sync::Arc;

use softbuffer::{Context, Surface};
use winit::dpi::PhysicalPosition;
use winit::event_loop::OwnedDisplayHandle;
use winit::window::Window;

use crate::compositor::{BlendFunction, LayeredBitmap, PresentError, Presenter};

/// Presents packed pixels to a window through softbuffer.
pub struct SoftbufferPresenter {
    window: Arc<Window>,
    surface: Surface<OwnedDisplayHandle, Arc<Window>>,
    size: (u32, u32),
}

impl SoftbufferPresenter {
    pub fn new(context: &Context<OwnedDisplayHandle>, window: Arc<Window>) -> Result<Self, String> {
        let surface = Surface::new(context, window.clone()).map_err(|e| e.to_string())?;
        Ok(Self {
            window,
            surface,
            size: (0, 0),
        })
    }

    fn copy_and_present(&mut self, pixels: &[u32], width: u32, height: u32) -> Result<(), PresentError> {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return Ok(());
        };
        if self.size != (width, height) {
            self.surface.resize(w, h).map_err(|e| PresentError::Resize(e.to_string()))?;
            self.size = (width, height);
        }

        let mut buffer = self.surface.buffer_mut().map_err(|e| PresentError::Buffer(e.to_string()))?;
        let len = buffer.len().min(pixels.len());
        buffer[..len].copy_from_slice(&pixels[..len]);

        self.window.pre_present_notify();
        buffer.present().map_err(|e| PresentError::Present(e.to_string()))
    }
}

impl Presenter for SoftbufferPresenter {
    fn present_opaque(&mut self, pixels: &[u32], width: u32, height: u32) -> Result<(), PresentError> {
        self.copy_and_present(pixels, width, height)
    }

    /// softbuffer 0.4 ignores the top byte of every pixel, so the premultiplied alpha
    /// never reaches the desktop compositor. The window is created transparent and
    /// undecorated, but what shows is the premultiplied colour over black, fully
    /// opaque. `_blend` is accepted for the trait and otherwise unused.
    fn present_layered(
        &mut self,
        bitmap: &LayeredBitmap,
        _blend: BlendFunction,
        position: (i32, i32),
    ) -> Result<(), PresentError> {
        if let Ok(current) = self.window.outer_position()
            && (current.x, current.y) != position
        {
            self.window.set_outer_position(PhysicalPosition::new(position.0, position.1));
        }
        self.copy_and_present(bitmap.pixels(), bitmap.width(), bitmap.height())
    }
}
